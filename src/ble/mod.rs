//! Bluetooth Low Energy subsystem.
//!
//! This module drives the BLE stack in **Peripheral** role:
//!
//! 1. **Orchestrator** - the radio task: brings the stack up, owns the
//!    command queue, and reacts to stack events.
//! 2. **Producers** - interrupt-context entry points that only enqueue
//!    commands for the radio task.
//! 3. **Stack** - the contract the vendor BLE stack is driven through.
//! 4. **Security** - pairing and key-distribution state.
//! 5. **Advertising** - the legacy advertising payload.
//!
//! Communication with other tasks is done via the queues in
//! [`crate::channel`].

pub mod advertising;
pub mod orchestrator;
pub mod producers;
pub mod security;
pub mod stack;

use security::SecurityKeyParam;

/// Requests serialised into the radio task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Let the stack drain its pending events.
    ProcessStackEvents,
    /// Notify the connected central of a new battery level (percent).
    UpdateBatteryLevel(u8),
    /// The user button was pressed.
    HandleButtonPress,
    /// Tag not understood by this firmware.
    Unknown(u8),
}

impl Command {
    const TAG_PROCESS_STACK_EVENTS: u8 = 0x01;
    const TAG_UPDATE_BATTERY_LEVEL: u8 = 0x02;
    const TAG_HANDLE_BUTTON_PRESS: u8 = 0x03;

    /// Decode a raw `(tag, data)` pair.
    pub fn from_raw(tag: u8, data: u8) -> Self {
        match tag {
            Self::TAG_PROCESS_STACK_EVENTS => Command::ProcessStackEvents,
            Self::TAG_UPDATE_BATTERY_LEVEL => Command::UpdateBatteryLevel(data),
            Self::TAG_HANDLE_BUTTON_PRESS => Command::HandleButtonPress,
            other => Command::Unknown(other),
        }
    }

    /// Raw tag of this command.
    pub fn tag(&self) -> u8 {
        match *self {
            Command::ProcessStackEvents => Self::TAG_PROCESS_STACK_EVENTS,
            Command::UpdateBatteryLevel(_) => Self::TAG_UPDATE_BATTERY_LEVEL,
            Command::HandleButtonPress => Self::TAG_HANDLE_BUTTON_PRESS,
            Command::Unknown(tag) => tag,
        }
    }
}

/// Identifies the live link to the central.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionHandle {
    /// Peer device handle (bonding / address table index).
    pub bd_handle: u8,
    /// ATT bearer instance.
    pub att_id: u8,
}

/// 48-bit device address, most significant byte first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceAddress {
    pub bytes: [u8; 6],
    pub kind: AddressKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressKind {
    Public,
    RandomStatic,
}

impl DeviceAddress {
    pub const fn public(bytes: [u8; 6]) -> Self {
        Self {
            bytes,
            kind: AddressKind::Public,
        }
    }

    pub const fn random_static(bytes: [u8; 6]) -> Self {
        Self {
            bytes,
            kind: AddressKind::RandomStatic,
        }
    }

    /// Bytes in over-the-air (little-endian) order.
    pub fn le_bytes(&self) -> [u8; 6] {
        let mut out = self.bytes;
        out.reverse();
        out
    }
}

/// Advertising state as reported by the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisementState {
    Stopped,
    Advertising,
}

/// Advertising interval profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisingMode {
    Fast,
    Slow,
}

/// GATT service a notification is sent on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServiceIndex {
    /// Battery Service (0x180F).
    Battery,
}

/// Characteristic within a [`ServiceIndex`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CharacteristicIndex {
    /// Battery Level (0x2A19).
    BatteryLevel,
}

/// Events the stack hands back while its event queue is pumped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackEvent {
    // General
    /// The stack finished starting up.
    StackOn,
    /// A stack procedure timed out.
    Timeout,
    /// LE event mask configured.
    SetEventMaskComplete,
    /// Device address configured.
    SetDeviceAddressComplete,
    /// TX power configured.
    SetTxPowerComplete,

    // GAP
    /// Advertising started or stopped; query the stack for which.
    AdvertisementStartStop,
    /// Link established with a central.
    GapDeviceConnected { bd_handle: u8 },
    /// Link lost or connection attempt failed.
    GapDeviceDisconnected { reason: u8 },
    /// Connection parameters updated.
    ConnectionUpdateComplete,
    /// Central requested pairing.
    AuthRequest { bd_handle: u8 },
    /// Pairing failed.
    AuthFailed { error: u8 },
    /// Local security keys generated.
    KeysGenerated(SecurityKeyParam),
    /// SMP pairing feature exchange complete.
    PairingFeatureExchanged,
    /// Pairing complete.
    AuthComplete,
    /// Link encryption changed.
    EncryptionChanged,

    // GATT
    /// ATT bearer established.
    GattConnected(ConnectionHandle),
    /// ATT bearer closed.
    GattDisconnected,
    /// Central requested an MTU exchange.
    MtuExchangeRequest,
    /// Central read an attribute.
    ReadRequest { attr_handle: u16 },

    // Battery Service
    /// Central enabled Battery Level notifications.
    BatteryNotificationsEnabled,
    /// Central disabled Battery Level notifications.
    BatteryNotificationsDisabled,
    /// Any other Battery Service event.
    BatteryOther,

    /// Event code not modelled above.
    Other(u32),
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_raw_tags_decode() {
        assert_eq!(Command::from_raw(0x01, 0), Command::ProcessStackEvents);
        assert_eq!(Command::from_raw(0x02, 42), Command::UpdateBatteryLevel(42));
        assert_eq!(Command::from_raw(0x03, 0), Command::HandleButtonPress);
        assert_eq!(Command::from_raw(0x7F, 9), Command::Unknown(0x7F));
    }

    #[test]
    fn command_tag_matches_decoder() {
        for cmd in [
            Command::ProcessStackEvents,
            Command::UpdateBatteryLevel(10),
            Command::HandleButtonPress,
            Command::Unknown(0x55),
        ] {
            let data = match cmd {
                Command::UpdateBatteryLevel(level) => level,
                _ => 0,
            };
            assert_eq!(Command::from_raw(cmd.tag(), data), cmd);
        }
    }

    #[test]
    fn address_air_order_is_reversed() {
        let addr = DeviceAddress::random_static([1, 2, 3, 4, 5, 6]);
        assert_eq!(addr.le_bytes(), [6, 5, 4, 3, 2, 1]);
        assert_eq!(addr.kind, AddressKind::RandomStatic);
    }
}
