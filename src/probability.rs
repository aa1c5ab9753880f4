//! Edge probability model
//!
//! Heuristic 0-100 score of how likely one technique, applied by one source to
//! one target, ends in actual compromise. Nothing here is persisted: scores are
//! recomputed on every read, because they depend on target attributes (the
//! disabled flag in particular) that loaders may still change.
//!
//! # Scoring
//!
//! 1. Start from the per-technique base score ([`base_probability`]).
//! 2. Zero out structurally impossible cases, such as credential and session
//!    techniques aimed at a disabled account.
//! 3. Cap with the loader-supplied hint recorded on the edge, if any.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize};

use crate::object::Object;
use crate::pwn_method::{PwnMethod, PwnMethodBitmap};

/// Likelihood in percent, always within 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Probability(u8);

impl Probability {
    pub const NEVER: Probability = Probability(0);
    pub const CERTAIN: Probability = Probability(100);

    /// Values above 100 are clamped
    pub const fn new(value: u8) -> Self {
        if value > 100 {
            Probability(100)
        } else {
            Probability(value)
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Shortest-path edge weight: likelier techniques are cheaper
    pub fn weight(self) -> u32 {
        101u32.saturating_sub(u32::from(self.0))
    }

    pub fn risk_level(self) -> RiskLevel {
        RiskLevel::from_score(self.0)
    }
}

impl<'de> Deserialize<'de> for Probability {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        if value > 100 {
            return Err(de::Error::custom(format!(
                "probability {} out of range 0..=100",
                value
            )));
        }
        Ok(Probability(value))
    }
}

impl Default for Probability {
    fn default() -> Self {
        Probability::CERTAIN
    }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Risk severity bucket for a probability
///
/// - **Low**: 0-39
/// - **Medium**: 40-59
/// - **High**: 60-79
/// - **Critical**: 80-100
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        if score >= 80 {
            RiskLevel::Critical
        } else if score >= 60 {
            RiskLevel::High
        } else if score >= 40 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Per-technique ceilings supplied by loaders when recording an edge.
/// Techniques without an entry are uncapped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbabilityHints(Vec<(PwnMethod, Probability)>);

impl ProbabilityHints {
    pub fn get(&self, method: PwnMethod) -> Option<Probability> {
        self.0.iter().find(|(m, _)| *m == method).map(|(_, p)| *p)
    }

    /// Record a ceiling. A technique seen several times keeps the most
    /// permissive hint, so a certain hint lifts the cap for good.
    pub fn record(&mut self, method: PwnMethod, hint: Probability) {
        match self.0.iter_mut().find(|(m, _)| *m == method) {
            Some((_, existing)) => *existing = (*existing).max(hint),
            None => self.0.push((method, hint)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Base score of a technique before any source/target context is applied
pub fn base_probability(method: PwnMethod) -> Probability {
    let score = match method {
        PwnMethod::AclContainsDeny => 0,
        PwnMethod::DcReplicationGetChanges | PwnMethod::DcReplicationSyncAll => 10,
        PwnMethod::HasSession => 25,
        PwnMethod::RdpRights => 30,
        PwnMethod::HasSpn
        | PwnMethod::DontRequirePreauth
        | PwnMethod::WriteSpn
        | PwnMethod::CertificateEnroll
        | PwnMethod::DcomRights => 50,
        PwnMethod::WriteAltSecurityIdentities => 70,
        PwnMethod::WritePropertyAll | PwnMethod::WriteGpLink => 90,
        PwnMethod::Owns
        | PwnMethod::GenericAll
        | PwnMethod::WriteAll
        | PwnMethod::WriteDacl
        | PwnMethod::TakeOwnership
        | PwnMethod::ResetPassword
        | PwnMethod::AddMember
        | PwnMethod::AddSelfMember
        | PwnMethod::MemberOfGroup
        | PwnMethod::AddKeyCredentialLink
        | PwnMethod::WriteAllowedToAct
        | PwnMethod::AllowedToAct
        | PwnMethod::AllowedToDelegate
        | PwnMethod::UnconstrainedDelegation
        | PwnMethod::DcSync
        | PwnMethod::ReadLapsPassword
        | PwnMethod::ReadGmsaPassword
        | PwnMethod::GpoApplies
        | PwnMethod::SidHistoryEquality
        | PwnMethod::ForeignIdentity
        | PwnMethod::LocalAdminRights => 100,
    };
    Probability::new(score)
}

/// Techniques that only pay off while the target account can log on
fn requires_enabled_target(method: PwnMethod) -> bool {
    matches!(
        method,
        PwnMethod::ResetPassword
            | PwnMethod::HasSpn
            | PwnMethod::DontRequirePreauth
            | PwnMethod::WriteSpn
            | PwnMethod::WriteAltSecurityIdentities
            | PwnMethod::AddKeyCredentialLink
            | PwnMethod::ReadGmsaPassword
            | PwnMethod::HasSession
    )
}

/// Techniques where the source itself has to authenticate to the KDC
fn requires_enabled_source(method: PwnMethod) -> bool {
    matches!(
        method,
        PwnMethod::AllowedToDelegate | PwnMethod::UnconstrainedDelegation
    )
}

/// Score one technique in its source/target context
pub fn calculate_probability(source: &Object, target: &Object, method: PwnMethod) -> Probability {
    if requires_enabled_target(method) && target.object_type().is_account() && target.is_disabled() {
        return Probability::NEVER;
    }
    if requires_enabled_source(method) && source.object_type().is_account() && source.is_disabled() {
        return Probability::NEVER;
    }
    base_probability(method)
}

/// Highest score among `methods`, each capped by its hint.
/// An empty bitmap scores [`Probability::NEVER`].
pub fn max_probability(
    source: &Object,
    target: &Object,
    methods: PwnMethodBitmap,
    hints: &ProbabilityHints,
) -> Probability {
    methods
        .methods()
        .map(|method| {
            let calculated = calculate_probability(source, target, method);
            match hints.get(method) {
                Some(hint) => calculated.min(hint),
                None => calculated,
            }
        })
        .max()
        .unwrap_or(Probability::NEVER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute_value::AttributeValue;
    use crate::attributes;
    use crate::uac::flags;

    fn user(dn: &str, uac: u32) -> Object {
        let object = Object::new(dn);
        object.set_attr(attributes::OBJECT_CATEGORY, AttributeValue::from("Person"));
        object.set_attr(attributes::USER_ACCOUNT_CONTROL, AttributeValue::Int(i64::from(uac)));
        object
    }

    #[test]
    fn test_clamp_and_weight() {
        assert_eq!(Probability::new(250), Probability::CERTAIN);
        assert_eq!(Probability::CERTAIN.weight(), 1);
        assert_eq!(Probability::NEVER.weight(), 101);
        assert_eq!(Probability::new(50).weight(), 51);
    }

    #[test]
    fn test_deserialize_rejects_out_of_range() {
        assert_eq!(serde_json::from_str::<Probability>("40").unwrap(), Probability::new(40));
        assert_eq!(serde_json::from_str::<Probability>("100").unwrap(), Probability::CERTAIN);
        assert!(serde_json::from_str::<Probability>("250").is_err());
        assert!(serde_json::from_str::<Probability>("101").is_err());
    }

    #[test]
    fn test_risk_level_thresholds() {
        assert_eq!(Probability::new(39).risk_level(), RiskLevel::Low);
        assert_eq!(Probability::new(40).risk_level(), RiskLevel::Medium);
        assert_eq!(Probability::new(60).risk_level(), RiskLevel::High);
        assert_eq!(Probability::new(80).risk_level(), RiskLevel::Critical);
    }

    #[test]
    fn test_deny_indicator_never() {
        let a = user("CN=A,DC=x", 0x200);
        let b = user("CN=B,DC=x", 0x200);
        assert_eq!(calculate_probability(&a, &b, PwnMethod::AclContainsDeny), Probability::NEVER);
    }

    #[test]
    fn test_disabled_target() {
        let attacker = user("CN=A,DC=x", 0x200);
        let disabled = user("CN=B,DC=x", 0x200 | flags::ACCOUNTDISABLE);
        assert_eq!(
            calculate_probability(&attacker, &disabled, PwnMethod::ResetPassword),
            Probability::NEVER
        );
        // Control of the object itself is unaffected
        assert_eq!(
            calculate_probability(&attacker, &disabled, PwnMethod::GenericAll),
            Probability::CERTAIN
        );
    }

    #[test]
    fn test_hints_cap_and_merge() {
        let mut hints = ProbabilityHints::default();
        hints.record(PwnMethod::Owns, Probability::new(10));
        hints.record(PwnMethod::Owns, Probability::new(30));
        assert_eq!(hints.get(PwnMethod::Owns), Some(Probability::new(30)));
        hints.record(PwnMethod::Owns, Probability::CERTAIN);
        hints.record(PwnMethod::Owns, Probability::new(5));
        assert_eq!(hints.get(PwnMethod::Owns), Some(Probability::CERTAIN));
        assert!(hints.get(PwnMethod::GenericAll).is_none());
    }

    #[test]
    fn test_max_probability() {
        let a = user("CN=A,DC=x", 0x200);
        let b = user("CN=B,DC=x", 0x200);
        let methods = PwnMethodBitmap::from(PwnMethod::HasSession).with(PwnMethod::RdpRights);
        let hints = ProbabilityHints::default();
        assert_eq!(max_probability(&a, &b, methods, &hints), Probability::new(30));
        assert_eq!(
            max_probability(&a, &b, PwnMethodBitmap::EMPTY, &hints),
            Probability::NEVER
        );
    }
}
