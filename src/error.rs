//! Unified error types for the radio firmware.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! With the `defmt` feature they implement `defmt::Format` for efficient
//! on-target logging.

/// Top-level error type used across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The radio task hit a fatal fault and stopped processing commands.
    Fault(Fault),
}

/// Reason the radio task entered its halted state.
///
/// There is no retry: a fault is terminal for the current boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// Stack initialisation rejected the configuration.
    StackInit(StackError),
    /// Stack enable failed after a successful init.
    StackEnable(StackError),
    /// The stack did not report "on" before the start-up deadline.
    StartupTimeout,
}

impl Fault {
    /// Error code carried into the fatal debug record.
    pub fn code(&self) -> Option<u32> {
        match self {
            Fault::StackInit(e) | Fault::StackEnable(e) => Some(e.code()),
            Fault::StartupTimeout => None,
        }
    }
}

/// Result codes reported by the BLE stack collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackError {
    /// Peer has not enabled notifications on the characteristic.
    ///
    /// Expected during normal operation; never treated as a failure.
    NotificationsDisabled,
    /// Operation not allowed in the current stack state.
    InvalidState,
    /// A parameter was rejected by the stack.
    InvalidParameter,
    /// The stack ran out of buffers.
    NoMemory,
    /// The stack is busy with a previous request.
    Busy,
    /// Vendor error code without a dedicated variant.
    Raw(u32),
}

impl StackError {
    /// Numeric code logged for this error.
    pub fn code(&self) -> u32 {
        match *self {
            StackError::NotificationsDisabled => 0x0001,
            StackError::InvalidState => 0x0008,
            StackError::InvalidParameter => 0x0007,
            StackError::NoMemory => 0x0004,
            StackError::Busy => 0x0011,
            StackError::Raw(code) => code,
        }
    }
}

/// Returned by the non-blocking send family when the queue is full.
///
/// The rejected item is handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrySendError<T> {
    Full(T),
}

// Conversions

impl From<Fault> for Error {
    fn from(f: Fault) -> Self {
        Error::Fault(f)
    }
}
