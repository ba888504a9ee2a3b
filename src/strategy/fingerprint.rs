use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::commands::session::Role;

/// Prefix of every persisted strategy entry key.
pub const CACHE_KEY_PREFIX: &str = "lol_strategy_";

/// One analysis scenario: who we play, against whom, where, plus optional
/// free-text context (a video link, a one-trick's name, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchupQuery {
    pub my_champion: String,
    pub opponent: String,
    pub role: Role,
    #[serde(default)]
    pub context: Option<String>,
}

impl MatchupQuery {
    pub fn new(my_champion: &str, opponent: &str, role: Role, context: Option<&str>) -> Self {
        Self {
            my_champion: my_champion.to_string(),
            opponent: opponent.to_string(),
            role,
            context: context.map(str::to_string),
        }
    }

    /// Context with blank input treated as absent.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Key for this scenario at the given cache version. Built from the raw
    /// inputs; the base64 transform is reversible, so distinct inputs never
    /// collide.
    pub fn fingerprint(&self, version: &str) -> Fingerprint {
        let raw = format!(
            "{}-{}-{}-{}-{}",
            self.my_champion,
            self.opponent,
            self.role,
            self.context.as_deref().unwrap_or(""),
            version
        );
        Fingerprint(general_purpose::STANDARD.encode(raw.as_bytes()))
    }
}

/// Opaque cache key for a [`MatchupQuery`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key under which the entry is persisted.
    pub fn storage_key(&self) -> String {
        format!("{CACHE_KEY_PREFIX}{}", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSION: &str = "14.24.1";

    fn fp(my: &str, opp: &str, role: Role, ctx: Option<&str>) -> Fingerprint {
        MatchupQuery::new(my, opp, role, ctx).fingerprint(VERSION)
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        assert_eq!(
            fp("Ahri", "Zed", Role::Mid, None),
            fp("Ahri", "Zed", Role::Mid, None)
        );
        // Absent and empty context are the same scenario.
        assert_eq!(
            fp("Ahri", "Zed", Role::Mid, None),
            fp("Ahri", "Zed", Role::Mid, Some(""))
        );
    }

    #[test]
    fn test_role_changes_fingerprint() {
        assert_ne!(
            fp("Ahri", "Zed", Role::Mid, Some("")),
            fp("Ahri", "Zed", Role::Jungle, Some(""))
        );
    }

    #[test]
    fn test_every_input_changes_fingerprint() {
        let base = fp("Ahri", "Zed", Role::Mid, None);
        assert_ne!(base, fp("Lux", "Zed", Role::Mid, None));
        assert_ne!(base, fp("Ahri", "Yasuo", Role::Mid, None));
        assert_ne!(base, fp("Ahri", "Zed", Role::Top, None));
        assert_ne!(base, fp("Ahri", "Zed", Role::Mid, Some("faker")));
        assert_ne!(
            base,
            MatchupQuery::new("Ahri", "Zed", Role::Mid, None).fingerprint("15.1.1")
        );
    }

    #[test]
    fn test_fingerprint_encoding() {
        // base64("Ahri-Zed-MID--14.24.1")
        assert_eq!(
            fp("Ahri", "Zed", Role::Mid, None).as_str(),
            "QWhyaS1aZWQtTUlELS0xNC4yNC4x"
        );
        assert_eq!(
            fp("Ahri", "Zed", Role::Mid, None).storage_key(),
            "lol_strategy_QWhyaS1aZWQtTUlELS0xNC4yNC4x"
        );
    }

    #[test]
    fn test_non_ascii_names() {
        let a = fp("阿狸", "劫", Role::Mid, None);
        let b = fp("阿狸", "劫", Role::Mid, None);
        assert_eq!(a, b);
        assert!(a.as_str().is_ascii());
    }

    #[test]
    fn test_blank_context_reads_as_absent() {
        let query = MatchupQuery::new("Ahri", "Zed", Role::Mid, Some("   "));
        assert_eq!(query.context(), None);
    }
}
