//! Compromise techniques and the edge bitmap
//!
//! Every edge in the pwn graph is a [`PwnMethodBitmap`]: one bit per
//! [`PwnMethod`] that lets the source take over the target. Bit `n` is the
//! method whose discriminant is `n`; discriminant 0 is never used so an empty
//! bitmap means "no edge".
//!
//! # Technique Reference
//!
//! | Method | Meaning |
//! |--------|---------|
//! | ACLContainsDeny | Target ACL holds a deny entry (informative only) |
//! | GenericAll / WriteAll / WriteDACL / TakeOwnership | Full or escalatable control |
//! | ResetPassword | User-Force-Change-Password extended right |
//! | AddMember / AddSelfMember / MemberOfGroup | Group membership |
//! | DCsync | Both replication extended rights on the domain head |
//! | AddKeyCredentialLink | Shadow credentials |
//! | WriteAllowedToAct / AllowedToAct | Resource-based constrained delegation |
//! | HasSession / RDPRights / DCOMRights / LocalAdminRights | Host level access |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{PwnError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PwnMethod {
    AclContainsDeny = 1,
    Owns,
    GenericAll,
    WriteAll,
    WritePropertyAll,
    WriteDacl,
    TakeOwnership,
    ResetPassword,
    AddMember,
    AddSelfMember,
    MemberOfGroup,
    HasSpn,
    DontRequirePreauth,
    WriteSpn,
    WriteAltSecurityIdentities,
    AddKeyCredentialLink,
    WriteAllowedToAct,
    AllowedToAct,
    AllowedToDelegate,
    UnconstrainedDelegation,
    DcReplicationGetChanges,
    DcReplicationSyncAll,
    DcSync,
    ReadLapsPassword,
    ReadGmsaPassword,
    WriteGpLink,
    GpoApplies,
    CertificateEnroll,
    SidHistoryEquality,
    ForeignIdentity,
    LocalAdminRights,
    RdpRights,
    DcomRights,
    HasSession,
}

impl PwnMethod {
    pub const ALL: [PwnMethod; 34] = [
        PwnMethod::AclContainsDeny,
        PwnMethod::Owns,
        PwnMethod::GenericAll,
        PwnMethod::WriteAll,
        PwnMethod::WritePropertyAll,
        PwnMethod::WriteDacl,
        PwnMethod::TakeOwnership,
        PwnMethod::ResetPassword,
        PwnMethod::AddMember,
        PwnMethod::AddSelfMember,
        PwnMethod::MemberOfGroup,
        PwnMethod::HasSpn,
        PwnMethod::DontRequirePreauth,
        PwnMethod::WriteSpn,
        PwnMethod::WriteAltSecurityIdentities,
        PwnMethod::AddKeyCredentialLink,
        PwnMethod::WriteAllowedToAct,
        PwnMethod::AllowedToAct,
        PwnMethod::AllowedToDelegate,
        PwnMethod::UnconstrainedDelegation,
        PwnMethod::DcReplicationGetChanges,
        PwnMethod::DcReplicationSyncAll,
        PwnMethod::DcSync,
        PwnMethod::ReadLapsPassword,
        PwnMethod::ReadGmsaPassword,
        PwnMethod::WriteGpLink,
        PwnMethod::GpoApplies,
        PwnMethod::CertificateEnroll,
        PwnMethod::SidHistoryEquality,
        PwnMethod::ForeignIdentity,
        PwnMethod::LocalAdminRights,
        PwnMethod::RdpRights,
        PwnMethod::DcomRights,
        PwnMethod::HasSession,
    ];

    pub fn from_index(index: u8) -> Option<PwnMethod> {
        PwnMethod::ALL.get(usize::from(index).checked_sub(1)?).copied()
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    fn bit(self) -> u64 {
        1u64 << (self as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            PwnMethod::AclContainsDeny => "ACLContainsDeny",
            PwnMethod::Owns => "Owns",
            PwnMethod::GenericAll => "GenericAll",
            PwnMethod::WriteAll => "WriteAll",
            PwnMethod::WritePropertyAll => "WritePropertyAll",
            PwnMethod::WriteDacl => "WriteDACL",
            PwnMethod::TakeOwnership => "TakeOwnership",
            PwnMethod::ResetPassword => "ResetPassword",
            PwnMethod::AddMember => "AddMember",
            PwnMethod::AddSelfMember => "AddSelfMember",
            PwnMethod::MemberOfGroup => "MemberOfGroup",
            PwnMethod::HasSpn => "HasSPN",
            PwnMethod::DontRequirePreauth => "DontReqPreauth",
            PwnMethod::WriteSpn => "WriteSPN",
            PwnMethod::WriteAltSecurityIdentities => "WriteAltSecurityIdentities",
            PwnMethod::AddKeyCredentialLink => "AddKeyCredentialLink",
            PwnMethod::WriteAllowedToAct => "WriteAllowedToAct",
            PwnMethod::AllowedToAct => "AllowedToAct",
            PwnMethod::AllowedToDelegate => "AllowedToDelegate",
            PwnMethod::UnconstrainedDelegation => "UnconstrainedDelegation",
            PwnMethod::DcReplicationGetChanges => "DCReplicationGetChanges",
            PwnMethod::DcReplicationSyncAll => "DCReplicationSyncAll",
            PwnMethod::DcSync => "DCsync",
            PwnMethod::ReadLapsPassword => "ReadLAPSPassword",
            PwnMethod::ReadGmsaPassword => "ReadGMSAPassword",
            PwnMethod::WriteGpLink => "WriteGPLink",
            PwnMethod::GpoApplies => "GPOApplies",
            PwnMethod::CertificateEnroll => "CertificateEnroll",
            PwnMethod::SidHistoryEquality => "SIDHistoryEquality",
            PwnMethod::ForeignIdentity => "ForeignIdentity",
            PwnMethod::LocalAdminRights => "LocalAdminRights",
            PwnMethod::RdpRights => "RDPRights",
            PwnMethod::DcomRights => "DCOMRights",
            PwnMethod::HasSession => "HasSession",
        }
    }
}

impl fmt::Display for PwnMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PwnMethod {
    type Err = PwnError;

    fn from_str(s: &str) -> Result<Self> {
        PwnMethod::ALL
            .iter()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| PwnError::UnknownMethod(s.to_string()))
    }
}

/// Set of techniques connecting one source to one target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PwnMethodBitmap(u64);

impl PwnMethodBitmap {
    pub const EMPTY: PwnMethodBitmap = PwnMethodBitmap(0);

    pub fn all() -> Self {
        PwnMethod::ALL.iter().copied().collect()
    }

    /// Every technique except the informative deny indicator
    pub fn all_usable() -> Self {
        Self::all().without(PwnMethod::AclContainsDeny)
    }

    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| name.as_ref().parse::<PwnMethod>())
            .collect()
    }

    pub fn set(&mut self, method: PwnMethod) {
        self.0 |= method.bit();
    }

    pub fn with(mut self, method: PwnMethod) -> Self {
        self.set(method);
        self
    }

    pub fn without(self, method: PwnMethod) -> Self {
        PwnMethodBitmap(self.0 & !method.bit())
    }

    pub fn is_set(self, method: PwnMethod) -> bool {
        self.0 & method.bit() != 0
    }

    pub fn intersect(self, other: PwnMethodBitmap) -> Self {
        PwnMethodBitmap(self.0 & other.0)
    }

    pub fn merge(self, other: PwnMethodBitmap) -> Self {
        PwnMethodBitmap(self.0 | other.0)
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when at least one technique other than the deny indicator is set
    pub fn is_usable(self) -> bool {
        !self.without(PwnMethod::AclContainsDeny).is_empty()
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn methods(self) -> impl Iterator<Item = PwnMethod> {
        PwnMethod::ALL.into_iter().filter(move |m| self.is_set(*m))
    }
}

impl FromIterator<PwnMethod> for PwnMethodBitmap {
    fn from_iter<T: IntoIterator<Item = PwnMethod>>(iter: T) -> Self {
        let mut bitmap = PwnMethodBitmap::EMPTY;
        for method in iter {
            bitmap.set(method);
        }
        bitmap
    }
}

impl From<PwnMethod> for PwnMethodBitmap {
    fn from(method: PwnMethod) -> Self {
        PwnMethodBitmap::EMPTY.with(method)
    }
}

impl fmt::Display for PwnMethodBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.methods().map(PwnMethod::name).collect();
        f.write_str(&names.join(", "))
    }
}

impl Serialize for PwnMethodBitmap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.methods().map(PwnMethod::name))
    }
}

impl<'de> Deserialize<'de> for PwnMethodBitmap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        PwnMethodBitmap::from_names(names).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_contiguous() {
        for (pos, method) in PwnMethod::ALL.iter().enumerate() {
            assert_eq!(method.index() as usize, pos + 1);
            assert_eq!(PwnMethod::from_index(method.index()), Some(*method));
        }
        assert_eq!(PwnMethod::from_index(0), None);
        assert!(PwnMethod::ALL.len() < 64);
    }

    #[test]
    fn test_set_intersect_count() {
        let edge = PwnMethodBitmap::from(PwnMethod::GenericAll).with(PwnMethod::WriteDacl);
        let filter = PwnMethodBitmap::from(PwnMethod::WriteDacl).with(PwnMethod::HasSession);
        let both = edge.intersect(filter);
        assert_eq!(both.count(), 1);
        assert!(both.is_set(PwnMethod::WriteDacl));
        assert!(!both.is_set(PwnMethod::GenericAll));
        assert_eq!(edge.merge(filter).count(), 3);
    }

    #[test]
    fn test_deny_indicator_not_usable() {
        let deny_only = PwnMethodBitmap::from(PwnMethod::AclContainsDeny);
        assert!(!deny_only.is_empty());
        assert!(!deny_only.is_usable());
        assert!(deny_only.with(PwnMethod::Owns).is_usable());
        assert!(!PwnMethodBitmap::all_usable().is_set(PwnMethod::AclContainsDeny));
    }

    #[test]
    fn test_names_round_trip() {
        let bitmap = PwnMethodBitmap::from_names(["dcsync", "ResetPassword"]).unwrap();
        assert_eq!(bitmap.to_string(), "ResetPassword, DCsync");
        assert!(PwnMethodBitmap::from_names(["NoSuchMethod"]).is_err());
    }

    #[test]
    fn test_serde_as_names() {
        let bitmap = PwnMethodBitmap::from(PwnMethod::AddMember);
        assert_eq!(serde_json::to_string(&bitmap).unwrap(), "[\"AddMember\"]");
        let back: PwnMethodBitmap = serde_json::from_str("[\"AddMember\"]").unwrap();
        assert_eq!(back, bitmap);
    }
}
