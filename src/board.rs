//! nRF52840-DK board glue.
//!
//! Pin map:
//!   - LED1   P0.13 (active-low)  - status indicator
//!   - BTN1   P0.11 (active-low, internal pull-up)
//!   - UART   P0.06 TX            - debug output (VCOM)

use ble_battery::ble::producers;
use ble_battery::ble::stack::InterruptControl;
use ble_battery::config::BUTTON_DEBOUNCE_MS;
use ble_battery::debug::{DebugLog, DebugOutput};
use defmt::info;
use embassy_nrf::gpio::{AnyPin, Input, Pull};
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::peripherals::UARTE0;
use embassy_nrf::uarte::{self, UarteTx};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};

use crate::{COMMANDS, DEBUG};

/// Gate opened by the radio task once the button may produce commands.
pub static BUTTON_ENABLED: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Arms the button task and the radio-notification interrupt line.
pub struct BoardInterrupts;

impl InterruptControl for BoardInterrupts {
    fn enable_button_interrupt(&mut self) {
        BUTTON_ENABLED.signal(());
    }

    fn enable_controller_interrupt(&mut self) {
        interrupt::SWI1_EGU1.set_priority(Priority::P6);
        interrupt::SWI1_EGU1.unpend();
        unsafe { interrupt::SWI1_EGU1.enable() };
    }
}

/// Radio notification handler: the controller has finished a radio event.
#[no_mangle]
unsafe extern "C" fn SWI1_EGU1() {
    producers::on_controller_interrupt(&COMMANDS, &DebugLog::new(&DEBUG));
}

/// Debounced button loop.
///
/// Waits until the radio task arms the button, then forwards each press
/// as a front-of-queue command.  The GPIOTE edge interrupt only wakes this
/// task; the producer call happens here, after debouncing.
pub async fn button_task(pin: AnyPin) -> ! {
    let mut btn = Input::new(pin, Pull::Up);
    let log = DebugLog::new(&DEBUG);

    BUTTON_ENABLED.wait().await;

    loop {
        // Wait for falling edge (button press, active-low).
        btn.wait_for_falling_edge().await;

        // Debounce: wait and re-check.
        Timer::after(Duration::from_millis(BUTTON_DEBOUNCE_MS)).await;

        if btn.is_low() {
            info!("button pressed");
            producers::on_button_press(&COMMANDS, &log);

            // Wait for release to avoid repeat triggers.
            btn.wait_for_rising_edge().await;
            Timer::after(Duration::from_millis(BUTTON_DEBOUNCE_MS)).await;
        }
    }
}

/// Debug output device, owned by the debug task.
pub struct DebugUart {
    tx: UarteTx<'static, UARTE0>,
}

impl DebugUart {
    pub fn new(tx: UarteTx<'static, UARTE0>) -> Self {
        Self { tx }
    }
}

impl DebugOutput for DebugUart {
    type Error = uarte::Error;

    async fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        // EasyDMA: `bytes` is the sink's line buffer, which lives in RAM.
        self.tx.write(bytes).await
    }
}

/// UART settings for the DK's VCOM bridge.
pub fn debug_uart_config() -> uarte::Config {
    let mut config = uarte::Config::default();
    config.parity = uarte::Parity::EXCLUDED;
    config.baudrate = uarte::Baudrate::BAUD115200;
    config
}
