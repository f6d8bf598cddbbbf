//! Debug record pipeline.
//!
//! Any task or interrupt handler can log through a [`DebugLog`] handle.
//! Records travel over the [`DebugQueue`] to [`debug_task`], the only
//! writer of the debug output device, so the device needs no lock.
//!
//! Logging is best effort: producers never wait for space.  A record that
//! does not fit is dropped and reported through `defmt` instead.

use core::fmt::Write;

use heapless::String;

use crate::channel::DebugQueue;
use crate::config::DEBUG_LINE_CAPACITY;

/// Severity of a debug record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Info,
    Error,
}

impl Level {
    fn prefix(self) -> &'static str {
        match self {
            Level::Info => "[Info]  ",
            Level::Error => "[Error] ",
        }
    }
}

/// One line destined for the debug output device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DebugRecord {
    pub level: Level,
    pub message: &'static str,
    pub code: Option<u32>,
}

impl DebugRecord {
    pub const fn info(message: &'static str) -> Self {
        Self {
            level: Level::Info,
            message,
            code: None,
        }
    }

    pub const fn error(message: &'static str, code: Option<u32>) -> Self {
        Self {
            level: Level::Error,
            message,
            code,
        }
    }

    pub const fn with_code(mut self, code: u32) -> Self {
        self.code = Some(code);
        self
    }
}

/// Producer handle for the debug queue.
#[derive(Clone, Copy)]
pub struct DebugLog<'a> {
    queue: &'a DebugQueue,
}

impl<'a> DebugLog<'a> {
    pub const fn new(queue: &'a DebugQueue) -> Self {
        Self { queue }
    }

    /// Queue an informational message.
    pub fn info(&self, message: &'static str) {
        self.record(DebugRecord::info(message));
    }

    /// Queue an informational message with a value rendered in hex.
    pub fn info_code(&self, message: &'static str, code: u32) {
        self.record(DebugRecord::info(message).with_code(code));
    }

    /// Queue an error message with its error code.
    pub fn error(&self, message: &'static str, code: u32) {
        self.record(DebugRecord::error(message, Some(code)));
    }

    /// Queue an error message that has no code.
    pub fn error_msg(&self, message: &'static str) {
        self.record(DebugRecord::error(message, None));
    }

    /// Queue a record from task context without waiting.
    pub fn record(&self, record: DebugRecord) {
        if self.queue.try_send(record).is_err() {
            warn!("debug queue full, dropped: {}", record.message);
        }
    }

    /// Queue a record from an interrupt handler.
    ///
    /// Returns whether the debug task was woken.
    pub fn record_from_interrupt(&self, record: DebugRecord) -> bool {
        self.queue.send_from_interrupt(record).unwrap_or(false)
    }
}

/// Render one record onto `out` in the debug line format.
///
/// `<prefix><message> <CODE> \r\n`, or `<prefix><message> \r\n` when the
/// record has no code.
pub fn write_record<W: Write>(out: &mut W, record: &DebugRecord) -> core::fmt::Result {
    out.write_str(record.level.prefix())?;
    match record.code {
        Some(code) => write!(out, "{} {:X} \r\n", record.message, code),
        None => write!(out, "{} \r\n", record.message),
    }
}

/// Output device written by the debug task.
#[allow(async_fn_in_trait)]
pub trait DebugOutput {
    type Error;

    async fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Debug sink task body.
///
/// Waits for records, formats each one into a line buffer and writes it
/// to `out`, which this task owns exclusively.  The write is awaited, so
/// other tasks run while the device drains.
pub async fn debug_task<O: DebugOutput>(queue: &DebugQueue, out: &mut O) -> ! {
    loop {
        let record = queue.receive().await;

        let mut line: String<DEBUG_LINE_CAPACITY> = String::new();
        if write_record(&mut line, &record).is_err() {
            warn!("debug line truncated: {}", record.message);
        }
        if out.write(line.as_bytes()).await.is_err() {
            error!("debug output write failed");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEBUG_QUEUE_DEPTH;
    use embassy_futures::block_on;
    use embassy_futures::select::{select, Either};

    /// Collects everything the sink writes.
    #[derive(Default)]
    struct Capture(std::string::String);

    impl DebugOutput for Capture {
        type Error = core::str::Utf8Error;

        async fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
            self.0.push_str(core::str::from_utf8(bytes)?);
            Ok(())
        }
    }

    fn render(record: DebugRecord) -> std::string::String {
        let mut out = std::string::String::new();
        write_record(&mut out, &record).unwrap();
        out
    }

    #[test]
    fn message_without_code() {
        assert_eq!(render(DebugRecord::info("Stack on")), "[Info]  Stack on \r\n");
    }

    #[test]
    fn error_code_rendered_in_upper_hex() {
        let line = render(DebugRecord::error("Failed to send notification", Some(0x1A2B)));
        assert_eq!(line, "[Error] Failed to send notification 1A2B \r\n");
    }

    #[test]
    fn info_with_code() {
        let line = render(DebugRecord::info("Other event:").with_code(0x0C));
        assert_eq!(line, "[Info]  Other event: C \r\n");
    }

    #[test]
    fn full_width_code() {
        let line = render(DebugRecord::error("Unknown command", Some(u32::MAX)));
        assert_eq!(line, "[Error] Unknown command FFFFFFFF \r\n");
    }

    #[test]
    fn log_handle_drops_when_full() {
        let q = DebugQueue::new();
        let log = DebugLog::new(&q);
        for _ in 0..DEBUG_QUEUE_DEPTH + 3 {
            log.info("spam");
        }
        assert_eq!(q.len(), DEBUG_QUEUE_DEPTH);
    }

    #[test]
    fn log_from_interrupt_never_blocks() {
        let q = DebugQueue::new();
        let log = DebugLog::new(&q);
        for _ in 0..DEBUG_QUEUE_DEPTH {
            assert!(!log.record_from_interrupt(DebugRecord::info("irq")));
        }
        // Full: dropped, still returns immediately.
        assert!(!log.record_from_interrupt(DebugRecord::info("irq")));
        assert!(q.is_full());
    }

    #[test]
    fn sink_writes_records_in_order() {
        let q = DebugQueue::new();
        let log = DebugLog::new(&q);
        log.info("first");
        log.error("second", 0xFF);

        let mut out = Capture::default();
        block_on(async {
            // The sink never returns; stop once both records are drained.
            match select(debug_task(&q, &mut out), async {
                while !q.is_empty() {
                    embassy_futures::yield_now().await;
                }
                embassy_futures::yield_now().await;
            })
            .await
            {
                Either::First(never) => never,
                Either::Second(()) => {}
            }
        });

        assert_eq!(out.0, "[Info]  first \r\n[Error] second FF \r\n");
    }
}
