//! Legacy advertising payload (31-byte AD structure list).
//!
//! Each AD structure is `[len, type, data...]` where `len` counts the type
//! byte plus data.  16-bit UUIDs are little-endian on air.

use heapless::Vec;

/// Maximum legacy advertising payload length.
pub const ADV_PAYLOAD_MAX: usize = 31;

const AD_FLAGS: u8 = 0x01;
const AD_UUID16_COMPLETE: u8 = 0x03;
const AD_NAME_SHORT: u8 = 0x08;
const AD_NAME_COMPLETE: u8 = 0x09;

/// LE General Discoverable, BR/EDR not supported.
pub const FLAGS_LE_ONLY_GENERAL_DISC: u8 = 0x06;

/// Battery Service UUID.
pub const BATTERY_SERVICE_UUID: u16 = 0x180F;

/// Battery Level characteristic UUID.
pub const BATTERY_LEVEL_UUID: u16 = 0x2A19;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdvertisingPayload {
    bytes: Vec<u8, ADV_PAYLOAD_MAX>,
}

impl AdvertisingPayload {
    pub const fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    fn push_structure(&mut self, ad_type: u8, data: &[u8]) -> bool {
        if self.bytes.len() + 2 + data.len() > ADV_PAYLOAD_MAX {
            return false;
        }
        // Capacity checked above.
        let _ = self.bytes.push(data.len() as u8 + 1);
        let _ = self.bytes.push(ad_type);
        let _ = self.bytes.extend_from_slice(data);
        true
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.push_structure(AD_FLAGS, &[flags]);
        self
    }

    pub fn services_16(mut self, uuids: &[u16]) -> Self {
        let mut data: Vec<u8, ADV_PAYLOAD_MAX> = Vec::new();
        for uuid in uuids {
            if data.extend_from_slice(&uuid.to_le_bytes()).is_err() {
                break;
            }
        }
        self.push_structure(AD_UUID16_COMPLETE, &data);
        self
    }

    /// Append the local name, shortening it to whatever space is left.
    pub fn name(mut self, name: &str) -> Self {
        let room = ADV_PAYLOAD_MAX.saturating_sub(self.bytes.len() + 2);
        if name.len() <= room {
            self.push_structure(AD_NAME_COMPLETE, name.as_bytes());
        } else if room > 0 {
            self.push_structure(AD_NAME_SHORT, &name.as_bytes()[..room]);
        }
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Payload advertised by this device: flags, Battery Service, name.
pub fn battery_advertisement(name: &str) -> AdvertisingPayload {
    AdvertisingPayload::new()
        .flags(FLAGS_LE_ONLY_GENERAL_DISC)
        .services_16(&[BATTERY_SERVICE_UUID])
        .name(name)
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battery_payload_layout() {
        let payload = battery_advertisement("Battery Level");
        assert_eq!(
            &payload.as_bytes()[..7],
            &[0x02, 0x01, 0x06, 0x03, 0x03, 0x0F, 0x18]
        );
        assert_eq!(payload.as_bytes()[7], 14);
        assert_eq!(payload.as_bytes()[8], AD_NAME_COMPLETE);
        assert_eq!(&payload.as_bytes()[9..], b"Battery Level");
        assert_eq!(payload.len(), 7 + 2 + 13);
    }

    #[test]
    fn long_name_is_shortened() {
        let payload = battery_advertisement("A very long peripheral device name");
        let bytes = payload.as_bytes();
        assert_eq!(payload.len(), ADV_PAYLOAD_MAX);
        assert_eq!(bytes[7], 23);
        assert_eq!(bytes[8], AD_NAME_SHORT);
        assert_eq!(&bytes[9..], b"A very long peripheral");
    }

    #[test]
    fn several_services_share_one_structure() {
        let payload = AdvertisingPayload::new().services_16(&[BATTERY_SERVICE_UUID, 0x180A]);
        assert_eq!(payload.as_bytes(), &[0x05, 0x03, 0x0F, 0x18, 0x0A, 0x18]);
    }

    #[test]
    fn structure_that_does_not_fit_is_skipped() {
        let payload = AdvertisingPayload::new()
            .name("0123456789012345678901234567")
            .flags(FLAGS_LE_ONLY_GENERAL_DISC);
        // 2 + 28 bytes of name leave one byte, too little for flags.
        assert_eq!(payload.len(), 30);
        assert_eq!(payload.as_bytes()[1], AD_NAME_COMPLETE);
    }

    #[test]
    fn no_room_for_name_adds_nothing() {
        let full = AdvertisingPayload::new().name("0123456789012345678901234567890");
        assert_eq!(full.len(), ADV_PAYLOAD_MAX);
        assert_eq!(full.as_bytes()[1], AD_NAME_SHORT);
        let again = full.clone().name("x");
        assert_eq!(again, full);
    }
}
