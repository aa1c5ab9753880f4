//! Attribute names
//!
//! Directory attribute names compare case-insensitively (`objectSid` and
//! `objectsid` are the same key). The original spelling is kept for display.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Clone)]
pub struct Attribute(Cow<'static, str>);

impl Attribute {
    pub const fn from_static(name: &'static str) -> Self {
        Attribute(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Attribute(Cow::Owned(name.into()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

pub const DISTINGUISHED_NAME: Attribute = Attribute::from_static("distinguishedName");
pub const NAME: Attribute = Attribute::from_static("name");
pub const DISPLAY_NAME: Attribute = Attribute::from_static("displayName");
pub const OBJECT_CLASS: Attribute = Attribute::from_static("objectClass");
pub const OBJECT_CATEGORY: Attribute = Attribute::from_static("objectCategory");
pub const OBJECT_SID: Attribute = Attribute::from_static("objectSid");
pub const OBJECT_GUID: Attribute = Attribute::from_static("objectGUID");
pub const SAM_ACCOUNT_NAME: Attribute = Attribute::from_static("sAMAccountName");
pub const USER_ACCOUNT_CONTROL: Attribute = Attribute::from_static("userAccountControl");
pub const NT_SECURITY_DESCRIPTOR: Attribute = Attribute::from_static("nTSecurityDescriptor");
pub const MEMBER: Attribute = Attribute::from_static("member");
pub const MEMBER_OF: Attribute = Attribute::from_static("memberOf");
pub const SERVICE_PRINCIPAL_NAME: Attribute = Attribute::from_static("servicePrincipalName");
/// Free-text category set by non-directory collectors (local machine dumps, placeholders)
pub const TYPE: Attribute = Attribute::from_static("type");

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Attribute {}

impl Hash for Attribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
        state.write_u8(0xff);
    }
}

impl PartialOrd for Attribute {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Attribute {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.0.bytes().map(|b| b.to_ascii_lowercase());
        let rhs = other.0.bytes().map(|b| b.to_ascii_lowercase());
        lhs.cmp(rhs)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attribute({})", self.0)
    }
}

impl From<&str> for Attribute {
    fn from(name: &str) -> Self {
        Attribute::new(name)
    }
}

impl Serialize for Attribute {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Attribute {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Attribute::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_case_insensitive_equality() {
        assert_eq!(Attribute::new("OBJECTSID"), OBJECT_SID);
        assert_ne!(Attribute::new("objectSidX"), OBJECT_SID);
    }

    #[test]
    fn test_case_insensitive_hash_lookup() {
        let mut map = HashMap::new();
        map.insert(SAM_ACCOUNT_NAME, 1);
        assert_eq!(map.get(&Attribute::new("samaccountname")), Some(&1));
    }

    #[test]
    fn test_display_keeps_spelling() {
        assert_eq!(OBJECT_GUID.to_string(), "objectGUID");
        assert_eq!(Attribute::from("memberOf").name(), "memberOf");
    }
}
