//! Status LED driven by the radio state.
//!
//! The radio task publishes an [`IndicatorState`] with
//! [`MessageQueue::overwrite`](crate::channel::MessageQueue::overwrite):
//! only the most recent state matters, so rapid churn collapses into the
//! last value.  The indicator task owns the LED pin exclusively.

use embassy_time::Duration;
use embedded_hal::digital::StatefulOutputPin;

use crate::channel::IndicatorQueue;

/// What the LED should show.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IndicatorState {
    /// Idle or disconnected.
    #[default]
    Off,
    /// Connected to a central.
    SteadyOn,
    /// Advertising.
    Blinking,
}

/// LED wrapper hiding the board's drive polarity.
pub struct StatusLed<P> {
    pin: P,
    active_low: bool,
}

impl<P: StatefulOutputPin> StatusLed<P> {
    pub fn new(pin: P, active_low: bool) -> Self {
        Self { pin, active_low }
    }

    pub fn set(&mut self, lit: bool) {
        let _ = if lit != self.active_low {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
    }

    pub fn toggle(&mut self) {
        let _ = self.pin.toggle();
    }

    /// Drive the LED to the static level for `state`.
    ///
    /// `Blinking` starts lit; the task toggles it from there.
    pub fn apply(&mut self, state: IndicatorState) {
        self.set(!matches!(state, IndicatorState::Off));
    }

    pub fn release(self) -> P {
        self.pin
    }
}

/// Indicator task body.
///
/// Applies each received state; while blinking, toggles the LED every
/// `blink_period` until a new state arrives.
pub async fn indicator_task<P: StatefulOutputPin>(
    queue: &IndicatorQueue,
    led: &mut StatusLed<P>,
    blink_period: Duration,
) -> ! {
    let mut state = IndicatorState::Off;
    led.apply(state);

    loop {
        let next = match state {
            IndicatorState::Blinking => queue.receive_timeout(blink_period).await,
            _ => Some(queue.receive().await),
        };

        match next {
            Some(new_state) => {
                if new_state != state {
                    debug!("indicator: {} -> {}", state, new_state);
                }
                state = new_state;
                led.apply(state);
            }
            None => led.toggle(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embassy_futures::block_on;
    use embassy_futures::select::{select, Either};
    use embassy_time::Timer;
    use embedded_hal::digital::{ErrorType, OutputPin};

    #[derive(Default)]
    struct MockPin {
        high: bool,
        toggles: usize,
    }

    impl ErrorType for MockPin {
        type Error = Infallible;
    }

    impl OutputPin for MockPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = true;
            Ok(())
        }
    }

    impl StatefulOutputPin for MockPin {
        fn is_set_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.high)
        }

        fn is_set_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.high)
        }

        fn toggle(&mut self) -> Result<(), Infallible> {
            self.high = !self.high;
            self.toggles += 1;
            Ok(())
        }
    }

    /// Run the indicator task for `window`, then hand the pin back.
    fn run_for(queue: &IndicatorQueue, led: &mut StatusLed<MockPin>, window: Duration) {
        block_on(async {
            match select(
                indicator_task(queue, led, Duration::from_millis(5)),
                Timer::after(window),
            )
            .await
            {
                Either::First(never) => never,
                Either::Second(()) => {}
            }
        });
    }

    #[test]
    fn states_map_to_led_levels() {
        let mut led = StatusLed::new(MockPin::default(), false);
        led.apply(IndicatorState::SteadyOn);
        assert!(led.pin.high);
        led.apply(IndicatorState::Off);
        assert!(!led.pin.high);
        led.apply(IndicatorState::Blinking);
        assert!(led.pin.high);
    }

    #[test]
    fn active_low_inverts_drive() {
        let mut led = StatusLed::new(MockPin::default(), true);
        led.apply(IndicatorState::SteadyOn);
        assert!(!led.pin.high);
        led.apply(IndicatorState::Off);
        assert!(led.pin.high);
    }

    #[test]
    fn task_applies_latest_state_only() {
        let queue = IndicatorQueue::new();
        queue.overwrite(IndicatorState::Blinking);
        queue.overwrite(IndicatorState::Off);
        queue.overwrite(IndicatorState::SteadyOn);

        let mut led = StatusLed::new(MockPin::default(), false);
        run_for(&queue, &mut led, Duration::from_millis(20));

        let pin = led.release();
        assert!(pin.high);
        assert_eq!(pin.toggles, 0);
    }

    #[test]
    fn repeated_state_is_idempotent() {
        let queue = IndicatorQueue::new();
        let mut led = StatusLed::new(MockPin::default(), false);

        queue.overwrite(IndicatorState::SteadyOn);
        run_for(&queue, &mut led, Duration::from_millis(10));
        queue.overwrite(IndicatorState::SteadyOn);
        run_for(&queue, &mut led, Duration::from_millis(10));

        assert!(led.pin.high);
        assert_eq!(led.pin.toggles, 0);
    }

    #[test]
    fn blinking_toggles_until_new_state() {
        let queue = IndicatorQueue::new();
        queue.overwrite(IndicatorState::Blinking);

        let mut led = StatusLed::new(MockPin::default(), false);
        run_for(&queue, &mut led, Duration::from_millis(40));
        assert!(led.pin.toggles >= 2);

        queue.overwrite(IndicatorState::Off);
        let toggles = led.pin.toggles;
        run_for(&queue, &mut led, Duration::from_millis(20));
        assert!(!led.pin.high);
        assert_eq!(led.pin.toggles, toggles);
    }
}
