//! Simulated battery level source.
//!
//! There is no fuel gauge on the board: the level drops by a fixed step on
//! every tick and wraps back to full after reaching zero.  Each new level
//! is handed to the radio task as an `UpdateBatteryLevel` command.

use embassy_time::{Duration, Ticker};

use crate::ble::Command;
use crate::channel::CommandQueue;
use crate::debug::DebugLog;

pub struct BatteryLevelSource {
    level: u8,
    step: u8,
    max: u8,
}

impl BatteryLevelSource {
    /// Start at `max`, dropping by `step` per reading.
    pub const fn new(step: u8, max: u8) -> Self {
        Self {
            level: max,
            step,
            max,
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    /// Advance one reading and return the new level.
    pub fn next_level(&mut self) -> u8 {
        self.level = if self.level == 0 {
            self.max
        } else {
            self.level.saturating_sub(self.step)
        };
        self.level
    }
}

/// Battery task body: publish a new level every `period`.
///
/// Uses the non-blocking send; a full command queue drops the reading.
pub async fn battery_task(
    commands: &CommandQueue,
    log: DebugLog<'_>,
    source: &mut BatteryLevelSource,
    period: Duration,
) -> ! {
    let mut ticker = Ticker::every(period);
    loop {
        ticker.next().await;
        let level = source.next_level();
        trace!("battery level {}%", level);
        if commands.try_send(Command::UpdateBatteryLevel(level)).is_err() {
            log.error_msg("Command queue full, battery update dropped");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::DebugQueue;
    use crate::config::{BATTERY_LEVEL_MAX, BATTERY_LEVEL_STEP, COMMAND_QUEUE_DEPTH};
    use embassy_futures::block_on;
    use embassy_futures::select::{select, Either};
    use embassy_time::Timer;

    #[test]
    fn level_drops_by_step() {
        let mut src = BatteryLevelSource::new(BATTERY_LEVEL_STEP, BATTERY_LEVEL_MAX);
        assert_eq!(src.level(), 100);
        assert_eq!(src.next_level(), 98);
        assert_eq!(src.next_level(), 96);
    }

    #[test]
    fn level_wraps_after_empty() {
        let mut src = BatteryLevelSource::new(2, 100);
        for _ in 0..50 {
            src.next_level();
        }
        assert_eq!(src.level(), 0);
        assert_eq!(src.next_level(), 100);
    }

    #[test]
    fn uneven_step_saturates_at_zero() {
        let mut src = BatteryLevelSource::new(30, 100);
        assert_eq!(src.next_level(), 70);
        assert_eq!(src.next_level(), 40);
        assert_eq!(src.next_level(), 10);
        assert_eq!(src.next_level(), 0);
        assert_eq!(src.next_level(), 100);
    }

    fn run_for(commands: &CommandQueue, debug: &DebugQueue, src: &mut BatteryLevelSource, window: Duration) {
        block_on(async {
            match select(
                battery_task(commands, DebugLog::new(debug), src, Duration::from_millis(10)),
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
    fn task_enqueues_updates() {
        let commands = CommandQueue::new();
        let debug = DebugQueue::new();
        let mut src = BatteryLevelSource::new(BATTERY_LEVEL_STEP, BATTERY_LEVEL_MAX);

        run_for(&commands, &debug, &mut src, Duration::from_millis(35));

        assert!(commands.len() >= 2);
        assert_eq!(commands.try_receive(), Some(Command::UpdateBatteryLevel(98)));
        assert_eq!(commands.try_receive(), Some(Command::UpdateBatteryLevel(96)));
        assert!(debug.is_empty());
    }

    #[test]
    fn full_queue_drops_with_log() {
        let commands = CommandQueue::new();
        let debug = DebugQueue::new();
        for _ in 0..COMMAND_QUEUE_DEPTH {
            commands.try_send(Command::ProcessStackEvents).unwrap();
        }
        let mut src = BatteryLevelSource::new(BATTERY_LEVEL_STEP, BATTERY_LEVEL_MAX);

        run_for(&commands, &debug, &mut src, Duration::from_millis(25));

        assert_eq!(commands.len(), COMMAND_QUEUE_DEPTH);
        assert!(!debug.is_empty());
        assert!(src.level() < BATTERY_LEVEL_MAX);
    }
}
