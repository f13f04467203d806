use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};

use crate::token::BearerToken;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("failed to read policy file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse policy file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// `check(rule, attributes)` — the contract the HTTP layer asks before
/// serving a request (spec §6). `attributes` is whatever the caller has on
/// hand about the resource being acted on (project id, domain id); a file-
/// backed enforcer matches them against the roles a rule requires.
pub trait PolicyEnforcer: Send + Sync {
    fn check(&self, rule: &str, token: &BearerToken, attributes: &HashMap<String, String>) -> bool;
}

/// A rule grants access to any token holding at least one of its listed
/// roles, or unconditionally if the rule's role list is empty.
#[derive(Debug, Clone, serde::Deserialize)]
struct RuleDef {
    #[serde(default)]
    roles: Vec<String>,
}

/// Loads a flat JSON map of rule name -> required roles, in the shape
/// OpenStack's `policy.json` takes (the convention `OS_*` env vars in the
/// ambient configuration already assume). Unknown rules default-deny.
pub struct FilePolicyEnforcer {
    rules: HashMap<String, RuleDef>,
}

impl FilePolicyEnforcer {
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let rules: HashMap<String, RuleDef> =
            serde_json::from_str(&raw).map_err(|source| PolicyError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        debug!(rule_count = rules.len(), path = %path.display(), "loaded policy file");
        Ok(Self { rules })
    }

    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }
}

impl PolicyEnforcer for FilePolicyEnforcer {
    fn check(&self, rule: &str, token: &BearerToken, _attributes: &HashMap<String, String>) -> bool {
        match self.rules.get(rule) {
            Some(def) if def.roles.is_empty() => true,
            Some(def) => def.roles.iter().any(|role| token.has_role(role)),
            None => {
                warn!(rule, "policy check against unknown rule, default-denying");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_rule_denies() {
        let enforcer = FilePolicyEnforcer::empty();
        let token = BearerToken::new("alice");
        assert!(!enforcer.check("project:show:manila-shares", &token, &HashMap::new()));
    }

    #[test]
    fn rule_with_no_roles_is_open() {
        let mut rules = HashMap::new();
        rules.insert(
            "project:show:manila-shares".to_string(),
            RuleDef { roles: vec![] },
        );
        let enforcer = FilePolicyEnforcer { rules };
        let token = BearerToken::new("alice");
        assert!(enforcer.check("project:show:manila-shares", &token, &HashMap::new()));
    }

    #[test]
    fn rule_requires_matching_role() {
        let mut rules = HashMap::new();
        rules.insert(
            "project:edit:manila-shares".to_string(),
            RuleDef {
                roles: vec!["member".to_string()],
            },
        );
        let enforcer = FilePolicyEnforcer { rules };
        let reader = BearerToken::new("alice");
        let member = BearerToken::new("bob").with_role("member");

        assert!(!enforcer.check("project:edit:manila-shares", &reader, &HashMap::new()));
        assert!(enforcer.check("project:edit:manila-shares", &member, &HashMap::new()));
    }
}
