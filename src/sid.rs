//! Security Identifier (SID) codec
//!
//! Binary layout (MS-DTYP 2.4.2):
//! ```text
//! Offset  Size  Field
//! 0       1     Revision
//! 1       1     SubAuthorityCount
//! 2       6     IdentifierAuthority (big-endian)
//! 8       4*N   SubAuthorities (little-endian, N = SubAuthorityCount)
//! ```
//!
//! A [`Sid`] always holds exactly `8 + 4 * N` bytes; every constructor checks
//! this, so accessors never index out of bounds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{PwnError, Result};

/// Well-known SIDs referenced by the engine
pub mod well_known {
    /// NT AUTHORITY\SELF (principal self placeholder in ACEs)
    pub const SELF: &str = "S-1-5-10";
    /// CREATOR OWNER placeholder
    pub const CREATOR_OWNER: &str = "S-1-3-0";
    /// NT AUTHORITY\SYSTEM
    pub const SYSTEM: &str = "S-1-5-18";
    /// Everyone
    pub const EVERYONE: &str = "S-1-1-0";
    /// NT AUTHORITY\Authenticated Users
    pub const AUTHENTICATED_USERS: &str = "S-1-5-11";
    /// BUILTIN\Administrators
    pub const ADMINISTRATORS: &str = "S-1-5-32-544";
}

/// Windows security identifier in its binary form
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sid(Vec<u8>);

impl Sid {
    /// Parse a binary SID. Trailing bytes beyond the declared sub-authority
    /// count are ignored, as they are in ACE payloads.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(PwnError::InvalidSid(format!(
                "SID too short (minimum 8 bytes): {:02x?}",
                bytes
            )));
        }

        let sub_auth_count = bytes[1] as usize;
        let expected = 8 + sub_auth_count * 4;
        if bytes.len() < expected {
            return Err(PwnError::InvalidSid(format!(
                "SID data insufficient for {} sub-authorities: {:02x?}",
                sub_auth_count, bytes
            )));
        }

        Ok(Sid(bytes[..expected].to_vec()))
    }

    /// Parse the canonical `S-R-A-S1-S2-...` text form
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || PwnError::InvalidSid(text.to_string());

        let mut parts = text.split('-');
        if !parts.next().is_some_and(|p| p.eq_ignore_ascii_case("S")) {
            return Err(invalid());
        }
        let revision: u8 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;

        // Authority may be given in hex for values that do not fit 32 bits
        let authority_text = parts.next().ok_or_else(invalid)?;
        let authority = match authority_text.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).map_err(|_| invalid())?,
            None => authority_text.parse::<u64>().map_err(|_| invalid())?,
        };
        if authority >= 1 << 48 {
            return Err(invalid());
        }

        let sub_authorities = parts
            .map(|p| p.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>>>()?;
        if sub_authorities.len() > u8::MAX as usize {
            return Err(invalid());
        }

        let mut bytes = Vec::with_capacity(8 + sub_authorities.len() * 4);
        bytes.push(revision);
        bytes.push(sub_authorities.len() as u8);
        bytes.extend_from_slice(&authority.to_be_bytes()[2..]);
        for sub_auth in sub_authorities {
            bytes.extend_from_slice(&sub_auth.to_le_bytes());
        }
        Ok(Sid(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn revision(&self) -> u8 {
        self.0[0]
    }

    pub fn sub_authority_count(&self) -> usize {
        self.0[1] as usize
    }

    /// 48-bit identifier authority
    pub fn authority(&self) -> u64 {
        u64::from_be_bytes([
            0, 0, self.0[2], self.0[3], self.0[4], self.0[5], self.0[6], self.0[7],
        ])
    }

    /// Sub-authority at position `n`, if present
    pub fn component(&self, n: usize) -> Option<u32> {
        if n >= self.sub_authority_count() {
            return None;
        }
        let offset = 8 + n * 4;
        Some(u32::from_le_bytes([
            self.0[offset],
            self.0[offset + 1],
            self.0[offset + 2],
            self.0[offset + 3],
        ]))
    }

    /// Relative identifier (last sub-authority)
    pub fn rid(&self) -> Result<u32> {
        match self.sub_authority_count() {
            0 => Err(PwnError::InvalidSid(format!("{} has no RID", self))),
            n => self
                .component(n - 1)
                .ok_or_else(|| PwnError::InvalidSid(self.to_string())),
        }
    }

    /// SID with the last sub-authority removed (the domain SID for an account)
    pub fn strip_rid(&self) -> Result<Sid> {
        if self.0.len() < 12 {
            return Err(PwnError::InvalidSid(format!("{} has no RID to strip", self)));
        }
        let mut bytes = self.0[..self.0.len() - 4].to_vec();
        bytes[1] -= 1;
        Ok(Sid(bytes))
    }

    /// SID with `rid` appended as a new last sub-authority
    pub fn add_rid(&self, rid: u32) -> Result<Sid> {
        if self.sub_authority_count() == u8::MAX as usize {
            return Err(PwnError::InvalidSid(format!("{} cannot take another RID", self)));
        }
        let mut bytes = self.0.clone();
        bytes[1] += 1;
        bytes.extend_from_slice(&rid.to_le_bytes());
        Ok(Sid(bytes))
    }

    /// True for contextual placeholder principals that never act as attackers
    pub fn is_placeholder(&self) -> bool {
        let text = self.to_string();
        text == well_known::SELF || text == well_known::CREATOR_OWNER || text == well_known::SYSTEM
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let authority = self.authority();
        if authority >= 1 << 32 {
            write!(f, "S-{}-0x{:012x}", self.revision(), authority)?;
        } else {
            write!(f, "S-{}-{}", self.revision(), authority)?;
        }
        for n in 0..self.sub_authority_count() {
            if let Some(sub_auth) = self.component(n) {
                write!(f, "-{}", sub_auth)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sid({})", self)
    }
}

impl FromStr for Sid {
    type Err = PwnError;

    fn from_str(s: &str) -> Result<Self> {
        Sid::parse(s)
    }
}

impl Serialize for Sid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Sid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Sid::parse(&text).map_err(serde::de::Error::custom)
    }
}
