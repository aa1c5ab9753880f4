//! userAccountControl decoding
//!
//! Only the bits the probability model and loaders care about are named.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw userAccountControl bits (MS-ADTS 2.2.16)
pub mod flags {
    pub const ACCOUNTDISABLE: u32 = 0x0002;
    pub const LOCKOUT: u32 = 0x0010;
    pub const NORMAL_ACCOUNT: u32 = 0x0200;
    pub const WORKSTATION_TRUST_ACCOUNT: u32 = 0x1000;
    pub const SERVER_TRUST_ACCOUNT: u32 = 0x2000;
    pub const DONT_EXPIRE_PASSWORD: u32 = 0x10000;
    pub const TRUSTED_FOR_DELEGATION: u32 = 0x80000;
    pub const NOT_DELEGATED: u32 = 0x100000;
    /// AS-REP roastable
    pub const DONT_REQ_PREAUTH: u32 = 0x400000;
    pub const TRUSTED_TO_AUTH_FOR_DELEGATION: u32 = 0x1000000;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserAccountControl(u32);

impl UserAccountControl {
    pub fn new(raw: u32) -> Self {
        UserAccountControl(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn has(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub fn is_disabled(self) -> bool {
        self.has(flags::ACCOUNTDISABLE)
    }

    pub fn is_locked(self) -> bool {
        self.has(flags::LOCKOUT)
    }

    pub fn is_domain_controller(self) -> bool {
        self.has(flags::SERVER_TRUST_ACCOUNT)
    }

    pub fn requires_preauth(self) -> bool {
        !self.has(flags::DONT_REQ_PREAUTH)
    }

    pub fn unconstrained_delegation(self) -> bool {
        self.has(flags::TRUSTED_FOR_DELEGATION)
    }

    /// Protocol transition (S4U2Self) allowed
    pub fn protocol_transition(self) -> bool {
        self.has(flags::TRUSTED_TO_AUTH_FOR_DELEGATION)
    }

    /// "Account is sensitive and cannot be delegated"
    pub fn is_sensitive(self) -> bool {
        self.has(flags::NOT_DELEGATED)
    }
}

impl fmt::Display for UserAccountControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
