//! Contract between the radio task and the vendor BLE stack.
//!
//! The stack is a collaborator: the radio task only decides *when* it
//! runs and *what* follows from the events it reports.  Every call here
//! is synchronous and non-blocking.
//!
//! Events are pulled with [`BleStack::poll_event`]; the radio task drains
//! them inside its own context, which replaces a registered C-style event
//! callback and keeps every stack call on a single task.

use crate::ble::security::{AuthInfo, SecurityKeyInfo};
use crate::ble::{
    AdvertisementState, AdvertisingMode, CharacteristicIndex, ConnectionHandle, DeviceAddress,
    ServiceIndex, StackEvent,
};
use crate::error::StackError;

pub trait BleStack {
    /// Stack-specific configuration handed to [`init`](Self::init).
    type Config;

    // Lifecycle

    fn init(&mut self, config: &Self::Config) -> Result<(), StackError>;

    fn enable(&mut self) -> Result<(), StackError>;

    /// Allow the stack to sleep between radio events.
    fn enable_low_power_mode(&mut self) {}

    fn is_on(&self) -> bool;

    /// Take the next pending event, if any.
    fn poll_event(&mut self) -> Option<StackEvent>;

    // Advertising / connections

    fn advertisement_state(&self) -> AdvertisementState;

    fn active_connection_count(&self) -> u8;

    fn start_advertising(&mut self, mode: AdvertisingMode, profile: u8) -> Result<(), StackError>;

    // GATT server

    /// Send a notification.
    ///
    /// Returns [`StackError::NotificationsDisabled`] when the peer has not
    /// enabled notifications on `characteristic`.
    fn send_notification(
        &mut self,
        conn: ConnectionHandle,
        service: ServiceIndex,
        characteristic: CharacteristicIndex,
        value: &[u8],
    ) -> Result<(), StackError>;

    // Security

    fn generate_keys(&mut self, info: &SecurityKeyInfo) -> Result<(), StackError>;

    fn set_security_keys(&mut self, info: &SecurityKeyInfo) -> Result<(), StackError>;

    fn set_identity_address(&mut self, address: &DeviceAddress) -> Result<(), StackError>;

    fn auth_reply(&mut self, info: &AuthInfo) -> Result<(), StackError>;
}

/// Interrupt lines the radio task arms before bringing the stack up.
///
/// Both handlers only enqueue commands; see [`crate::ble::producers`].
pub trait InterruptControl {
    fn enable_button_interrupt(&mut self);

    fn enable_controller_interrupt(&mut self);
}

/// A setting the stack only accepts while the radio is idle.
///
/// Stack adapters hold the latest request here and apply it once nothing
/// is advertising and no peer is connected.  A newer request replaces an
/// older one that was never applied.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdleDeferred<T> {
    pending: Option<T>,
}

impl<T> IdleDeferred<T> {
    pub const fn new() -> Self {
        Self { pending: None }
    }

    pub fn request(&mut self, value: T) {
        self.pending = Some(value);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Hand out the pending value if the radio is idle.
    pub fn take_if_idle(&mut self, advertising: bool, connections: u8) -> Option<T> {
        if advertising || connections > 0 {
            return None;
        }
        self.pending.take()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
