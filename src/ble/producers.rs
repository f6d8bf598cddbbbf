//! Interrupt-context command producers.
//!
//! These are safe to call from interrupt handlers and never wait.  They
//! never touch the stack or radio state: each one pushes a single command
//! to the front of the command queue and returns whether the radio task
//! was woken.
//!
//! The controller producer runs in the radio-notification ISR.  With
//! Embassy the GPIOTE interrupt wakes the debounced button task instead
//! of calling out directly, so the button producer runs in that task,
//! still through the same non-blocking front insertion.  A full
//! queue drops the command; the radio task re-pumps on its own after
//! every action, so a lost wake-up costs latency, not correctness.

use crate::ble::Command;
use crate::channel::CommandQueue;
use crate::debug::{DebugLog, DebugRecord};

/// User button edge.
pub fn on_button_press(commands: &CommandQueue, log: &DebugLog<'_>) -> bool {
    push_front(commands, log, Command::HandleButtonPress)
}

/// BLE controller signalled pending stack work.
pub fn on_controller_interrupt(commands: &CommandQueue, log: &DebugLog<'_>) -> bool {
    push_front(commands, log, Command::ProcessStackEvents)
}

fn push_front(commands: &CommandQueue, log: &DebugLog<'_>, command: Command) -> bool {
    match commands.send_front_from_interrupt(command) {
        Ok(woken) => woken,
        Err(_) => {
            log.record_from_interrupt(
                DebugRecord::error("Command queue full, dropped", None).with_code(command.tag() as u32),
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::DebugQueue;
    use crate::config::COMMAND_QUEUE_DEPTH;
    use crate::debug::Level;

    #[test]
    fn button_goes_to_front() {
        let commands = CommandQueue::new();
        let debug = DebugQueue::new();
        let log = DebugLog::new(&debug);

        commands.try_send(Command::UpdateBatteryLevel(50)).unwrap();
        assert!(!on_button_press(&commands, &log));

        assert_eq!(commands.try_receive(), Some(Command::HandleButtonPress));
        assert_eq!(commands.try_receive(), Some(Command::UpdateBatteryLevel(50)));
    }

    #[test]
    fn controller_interrupt_requests_processing() {
        let commands = CommandQueue::new();
        let debug = DebugQueue::new();
        let log = DebugLog::new(&debug);

        on_controller_interrupt(&commands, &log);
        assert_eq!(commands.try_receive(), Some(Command::ProcessStackEvents));
        assert!(debug.is_empty());
    }

    #[test]
    fn full_queue_drops_and_logs() {
        let commands = CommandQueue::new();
        let debug = DebugQueue::new();
        let log = DebugLog::new(&debug);

        for _ in 0..COMMAND_QUEUE_DEPTH {
            commands.try_send(Command::UpdateBatteryLevel(1)).unwrap();
        }
        assert!(!on_controller_interrupt(&commands, &log));
        assert_eq!(commands.len(), COMMAND_QUEUE_DEPTH);

        let record = debug.try_receive().unwrap();
        assert_eq!(record.level, Level::Error);
        assert_eq!(record.code, Some(0x01));
    }
}
