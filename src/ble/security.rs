//! Pairing and key-distribution state.
//!
//! [`SecurityKeyInfo`] moves through three steps during the radio task's
//! lifetime: keys are generated when the stack comes up, bound to the
//! peer's device handle when it connects, and handed to the stack for
//! distribution during pairing.  Everything stays in RAM; bonds do not
//! survive a reset.

/// SMP key distribution bits (initiator and responder sides).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyDistribution(u8);

impl KeyDistribution {
    pub const INIT_ENC: Self = Self(0x01);
    pub const INIT_IRK: Self = Self(0x02);
    pub const INIT_CSRK: Self = Self(0x04);
    pub const RESP_ENC: Self = Self(0x10);
    pub const RESP_IRK: Self = Self(0x20);
    pub const RESP_CSRK: Self = Self(0x40);

    pub const NONE: Self = Self(0);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for KeyDistribution {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Key material produced by the stack's key generation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SecurityKeyParam {
    /// Identity resolving key.
    pub irk: [u8; 16],
    /// Connection signature resolving key.
    pub csrk: [u8; 16],
    /// Peer device handle the keys are bound to.
    pub bd_handle: u8,
}

/// Key-exchange configuration plus the generated key material.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SecurityKeyInfo {
    /// Keys this device distributes.
    pub local_keys: KeyDistribution,
    /// Keys exchanged in both directions.
    pub exchange_keys: KeyDistribution,
    pub params: SecurityKeyParam,
}

impl SecurityKeyInfo {
    /// Distribute and exchange ENC, IRK and CSRK in both directions.
    pub const fn full_exchange() -> Self {
        let init = KeyDistribution::INIT_ENC
            .union(KeyDistribution::INIT_IRK)
            .union(KeyDistribution::INIT_CSRK);
        let resp = KeyDistribution::RESP_ENC
            .union(KeyDistribution::RESP_IRK)
            .union(KeyDistribution::RESP_CSRK);
        Self {
            local_keys: init,
            exchange_keys: init.union(resp),
            params: SecurityKeyParam {
                irk: [0; 16],
                csrk: [0; 16],
                bd_handle: 0,
            },
        }
    }

    /// Store freshly generated key material, keeping the current binding.
    pub fn store_generated(&mut self, generated: SecurityKeyParam) {
        let bd_handle = self.params.bd_handle;
        self.params = SecurityKeyParam {
            bd_handle,
            ..generated
        };
    }

    /// Bind the keys to the peer that just connected.
    pub fn bind_to(&mut self, bd_handle: u8) {
        self.params.bd_handle = bd_handle;
    }
}

/// Security mode and level pair (mode 1 = encryption based).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityLevel {
    /// Mode 1 Level 1: no security.
    NoSecurity,
    /// Mode 1 Level 2: unauthenticated pairing with encryption.
    Unauthenticated,
    /// Mode 1 Level 3: authenticated pairing with encryption.
    Authenticated,
    /// Mode 1 Level 4: authenticated LE Secure Connections.
    SecureConnections,
}

/// Error carried in a pairing reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AuthError {
    None,
    PairingNotSupported,
}

/// Pairing response parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AuthInfo {
    pub security: SecurityLevel,
    pub bonding: bool,
    pub encryption_key_size: u8,
    pub auth_error: AuthError,
    pub bd_handle: u8,
}

impl AuthInfo {
    pub const fn no_security() -> Self {
        Self {
            security: SecurityLevel::NoSecurity,
            bonding: false,
            encryption_key_size: 16,
            auth_error: AuthError::None,
            bd_handle: 0,
        }
    }

    pub const fn bonding(security: SecurityLevel) -> Self {
        Self {
            security,
            bonding: true,
            encryption_key_size: 16,
            auth_error: AuthError::None,
            bd_handle: 0,
        }
    }

    /// Reply to a pairing request from `bd_handle` under this template.
    ///
    /// A device configured for no security refuses pairing.
    pub fn reply_for(&self, bd_handle: u8) -> Self {
        let auth_error = match self.security {
            SecurityLevel::NoSecurity => AuthError::PairingNotSupported,
            _ => self.auth_error,
        };
        Self {
            bd_handle,
            auth_error,
            ..*self
        }
    }
}
