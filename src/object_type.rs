//! Object type classification
//!
//! Directory objects carry their category as free text: either an
//! `objectCategory` DN such as `CN=Person,CN=Schema,CN=Configuration,...` or a
//! bare `type` string set by other collectors. The leading RDN value is
//! matched against a fixed table; anything unknown is [`ObjectType::Other`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectType {
    Other,
    User,
    Group,
    Computer,
    ManagedServiceAccount,
    ForeignSecurityPrincipal,
    OrganizationalUnit,
    Container,
    DomainDns,
    GroupPolicyContainer,
    CertificateTemplate,
    TrustedDomain,
    AttributeSchema,
    ClassSchema,
    ControlAccessRight,
    Service,
    Executable,
    /// Synthetic "what can an attacker do" placeholder
    Attacker,
}

/// Category string → type, compared case-insensitively
const CATEGORY_TABLE: &[(&str, ObjectType)] = &[
    ("Person", ObjectType::User),
    ("User", ObjectType::User),
    ("Group", ObjectType::Group),
    ("Computer", ObjectType::Computer),
    ("ms-DS-Group-Managed-Service-Account", ObjectType::ManagedServiceAccount),
    ("ms-DS-Managed-Service-Account", ObjectType::ManagedServiceAccount),
    ("Foreign-Security-Principal", ObjectType::ForeignSecurityPrincipal),
    ("Organizational-Unit", ObjectType::OrganizationalUnit),
    ("Container", ObjectType::Container),
    ("Builtin-Domain", ObjectType::Container),
    ("Domain-DNS", ObjectType::DomainDns),
    ("Group-Policy-Container", ObjectType::GroupPolicyContainer),
    ("PKI-Certificate-Template", ObjectType::CertificateTemplate),
    ("Trusted-Domain", ObjectType::TrustedDomain),
    ("Attribute-Schema", ObjectType::AttributeSchema),
    ("Class-Schema", ObjectType::ClassSchema),
    ("Control-Access-Right", ObjectType::ControlAccessRight),
    ("Service", ObjectType::Service),
    ("Executable", ObjectType::Executable),
    ("Attacker", ObjectType::Attacker),
];

impl ObjectType {
    pub const ALL: [ObjectType; 18] = [
        ObjectType::Other,
        ObjectType::User,
        ObjectType::Group,
        ObjectType::Computer,
        ObjectType::ManagedServiceAccount,
        ObjectType::ForeignSecurityPrincipal,
        ObjectType::OrganizationalUnit,
        ObjectType::Container,
        ObjectType::DomainDns,
        ObjectType::GroupPolicyContainer,
        ObjectType::CertificateTemplate,
        ObjectType::TrustedDomain,
        ObjectType::AttributeSchema,
        ObjectType::ClassSchema,
        ObjectType::ControlAccessRight,
        ObjectType::Service,
        ObjectType::Executable,
        ObjectType::Attacker,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Classify a category string (DN form or bare name)
    pub fn from_category(category: &str) -> ObjectType {
        let name = if category.contains('=') {
            dn::rdn_value(category).unwrap_or(category)
        } else {
            category
        };
        CATEGORY_TABLE
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name.trim()))
            .map(|(_, object_type)| *object_type)
            .unwrap_or(ObjectType::Other)
    }

    /// Dense position for per-type counters
    pub fn index(self) -> usize {
        self as usize
    }

    /// Account types that carry userAccountControl and can be disabled
    pub fn is_account(self) -> bool {
        matches!(
            self,
            ObjectType::User | ObjectType::Computer | ObjectType::ManagedServiceAccount
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ObjectType::Other => "Other",
            ObjectType::User => "User",
            ObjectType::Group => "Group",
            ObjectType::Computer => "Computer",
            ObjectType::ManagedServiceAccount => "ManagedServiceAccount",
            ObjectType::ForeignSecurityPrincipal => "ForeignSecurityPrincipal",
            ObjectType::OrganizationalUnit => "OrganizationalUnit",
            ObjectType::Container => "Container",
            ObjectType::DomainDns => "DomainDNS",
            ObjectType::GroupPolicyContainer => "GroupPolicyContainer",
            ObjectType::CertificateTemplate => "CertificateTemplate",
            ObjectType::TrustedDomain => "TrustedDomain",
            ObjectType::AttributeSchema => "AttributeSchema",
            ObjectType::ClassSchema => "ClassSchema",
            ObjectType::ControlAccessRight => "ControlAccessRight",
            ObjectType::Service => "Service",
            ObjectType::Executable => "Executable",
            ObjectType::Attacker => "Attacker",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
