use std::collections::HashMap;

/// The caller identity and attributes extracted from a bearer token. How the
/// token itself is validated (a local HMAC secret, an upstream introspection
/// call) is out of scope for this crate's trait — only the already-verified
/// claims matter to `check()`.
#[derive(Debug, Clone, Default)]
pub struct BearerToken {
    pub subject: String,
    pub roles: Vec<String>,
    pub project_id: Option<String>,
    pub domain_id: Option<String>,
    pub attributes: HashMap<String, String>,
}

impl BearerToken {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
