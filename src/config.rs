//! Application-wide constants and compile-time configuration.
//!
//! All queue depths, timing parameters, and BLE profile constants live
//! here so they can be tuned in one place.

use embassy_time::Duration;

use crate::ble::security::{AuthInfo, SecurityKeyInfo};
use crate::ble::{AdvertisingMode, DeviceAddress};

// Queues

/// Depth of the command queue feeding the radio task.
pub const COMMAND_QUEUE_DEPTH: usize = 10;

/// Depth of the debug record queue feeding the debug task.
pub const DEBUG_QUEUE_DEPTH: usize = 16;

/// Line buffer handed to the debug output (prefix + message + code + CRLF).
pub const DEBUG_LINE_CAPACITY: usize = 96;

// BLE

/// Deadline for the stack to report "on" after enable.
pub const BLE_INIT_TIMEOUT_MS: u64 = 1000;

/// Stack events handled per iteration of the start-up wait.
pub const STARTUP_EVENTS_PER_POLL: usize = 8;

/// Maximum simultaneous connections (single-peripheral model).
pub const BLE_MAX_CONNECTIONS: u8 = 1;

/// Peripheral configuration index handed to start-advertising.
pub const BLE_PERIPHERAL_PROFILE: u8 = 0;

/// Static random identity address (MSB first, two top bits set).
pub const BLE_IDENTITY_ADDRESS: DeviceAddress = DeviceAddress::random_static([
    0xC7, 0x3A, 0x51, 0x09, 0x6E, 0x24,
]);

/// Advertised device name.
pub const BLE_DEVICE_NAME: &str = "Battery Level";

/// Fast advertising interval (in 0.625 ms units). 48 = 30 ms.
pub const BLE_ADV_INTERVAL_FAST: u32 = 48;

/// Fast advertising duration (in 10 ms units). 3000 = 30 s.
pub const BLE_ADV_DURATION_FAST: u16 = 3000;

/// Slow advertising interval (in 0.625 ms units). 1600 = 1 s.
pub const BLE_ADV_INTERVAL_SLOW: u32 = 1600;

/// Slow advertising duration. 0 = until stopped.
pub const BLE_ADV_DURATION_SLOW: u16 = 0;

// Battery

/// Period between simulated battery level updates (seconds).
pub const BATTERY_UPDATE_PERIOD_SECS: u64 = 5;

/// Amount the simulated battery level drops per update (percent).
pub const BATTERY_LEVEL_STEP: u8 = 2;

/// Full-charge battery level (percent).
pub const BATTERY_LEVEL_MAX: u8 = 100;

// Status LED

/// Half-period of the advertising blink (ms).
pub const LED_BLINK_PERIOD_MS: u64 = 500;

// Interrupts
//
// The SoftDevice reserves priorities 0, 1 and 4 on nRF52840, so the
// application lines are kept at 2, 3 and 6.
//
//   Radio notification (controller) → SWI1_EGU1, priority 6
//   Button                          → P0.11 via GPIOTE, priority 2
//   Time driver                     → RTC1, priority 2
//   Debug UART                      → UARTE0 TX P0.06, priority 3

/// Button debounce time (ms).
pub const BUTTON_DEBOUNCE_MS: u64 = 50;

/// Runtime configuration consumed by the radio orchestrator.
///
/// Defaults come from the constants above; tests shrink the deadline.
#[derive(Clone, Copy, Debug)]
pub struct RadioConfig {
    pub startup_timeout: Duration,
    pub max_connections: u8,
    pub advertising_mode: AdvertisingMode,
    pub peripheral_profile: u8,
    pub identity_address: DeviceAddress,
    pub security: AuthInfo,
    pub key_info: SecurityKeyInfo,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_millis(BLE_INIT_TIMEOUT_MS),
            max_connections: BLE_MAX_CONNECTIONS,
            advertising_mode: AdvertisingMode::Fast,
            peripheral_profile: BLE_PERIPHERAL_PROFILE,
            identity_address: BLE_IDENTITY_ADDRESS,
            security: AuthInfo::no_security(),
            key_info: SecurityKeyInfo::full_exchange(),
        }
    }
}
