//! Distinguished name helpers
//!
//! RDN separators are unescaped commas; `\,` and any other backslash escape
//! stay inside the component they appear in.

use crate::errors::{PwnError, Result};

/// Split a DN into its leading RDN and the remainder (parent DN).
///
/// Returns `Ok((rdn, None))` when the DN has a single component, and an error
/// when a trailing backslash leaves an escape unbalanced.
pub fn split_rdn(dn: &str) -> Result<(&str, Option<&str>)> {
    if dn.is_empty() {
        return Err(PwnError::InvalidDistinguishedName("empty DN".to_string()));
    }

    let mut escaped = false;
    for (idx, ch) in dn.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            ',' => {
                let parent = dn[idx + 1..].trim_start();
                return Ok((&dn[..idx], (!parent.is_empty()).then_some(parent)));
            }
            _ => {}
        }
    }

    if escaped {
        return Err(PwnError::InvalidDistinguishedName(dn.to_string()));
    }
    Ok((dn, None))
}

/// Parent DN, or `None` at the top of the tree or for malformed input
pub fn parent_dn(dn: &str) -> Option<&str> {
    split_rdn(dn).ok().and_then(|(_, parent)| parent)
}

/// Value of the leading RDN (`CN=Domain Admins,...` → `Domain Admins`)
pub fn rdn_value(dn: &str) -> Option<&str> {
    let (rdn, _) = split_rdn(dn).ok()?;
    rdn.split_once('=').map(|(_, value)| value)
}

/// Extract domain name from a distinguished name
///
/// # Example
/// ```
/// let dn = "CN=John,OU=Users,DC=example,DC=com";
/// assert_eq!(pwngraph::dn::domain_from_dn(dn), "example.com");
/// ```
pub fn domain_from_dn(dn: &str) -> String {
    let mut labels = Vec::new();
    let mut rest = Some(dn);
    while let Some(current) = rest {
        let Ok((rdn, parent)) = split_rdn(current) else {
            break;
        };
        let rdn = rdn.trim();
        if rdn.len() > 3 && rdn.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("DC=")) {
            labels.push(&rdn[3..]);
        }
        rest = parent;
    }
    labels.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple() {
        let (rdn, parent) = split_rdn("CN=John,OU=Users,DC=example,DC=com").unwrap();
        assert_eq!(rdn, "CN=John");
        assert_eq!(parent, Some("OU=Users,DC=example,DC=com"));
    }

    #[test]
    fn test_split_escaped_comma() {
        let (rdn, parent) = split_rdn("CN=Smith\\, John,OU=Users,DC=example,DC=com").unwrap();
        assert_eq!(rdn, "CN=Smith\\, John");
        assert_eq!(parent, Some("OU=Users,DC=example,DC=com"));
    }

    #[test]
    fn test_top_of_tree() {
        assert_eq!(split_rdn("DC=com").unwrap(), ("DC=com", None));
        assert_eq!(parent_dn("DC=com"), None);
        assert_eq!(parent_dn("DC=example,DC=com"), Some("DC=com"));
    }

    #[test]
    fn test_unbalanced_escape() {
        assert!(matches!(
            split_rdn("CN=broken\\"),
            Err(PwnError::InvalidDistinguishedName(_))
        ));
        assert!(split_rdn("").is_err());
        assert_eq!(parent_dn("CN=broken\\"), None);
    }

    #[test]
    fn test_rdn_value() {
        assert_eq!(rdn_value("CN=Domain Admins,CN=Users,DC=corp,DC=local"), Some("Domain Admins"));
        assert_eq!(rdn_value("garbage"), None);
    }

    #[test]
    fn test_domain_from_dn() {
        assert_eq!(domain_from_dn("CN=John,OU=Users,DC=example,DC=com"), "example.com");
        assert_eq!(domain_from_dn("CN=Admin,DC=corp,DC=contoso,DC=local"), "corp.contoso.local");
        assert_eq!(domain_from_dn("CN=Attacker"), "");
        assert_eq!(domain_from_dn("CN=Smith\\, DC=fake,DC=corp,DC=local"), "corp.local");
        assert_eq!(domain_from_dn(""), "");
    }
}
