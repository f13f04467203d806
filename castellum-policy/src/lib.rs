//! Bearer-token authorisation and the audit-event emitter (spec §6).
//!
//! A `PolicyEnforcer` answers one boolean question, `check(rule,
//! attributes)`; `castellum-api` derives the rule name from the asset-type
//! it is guarding (`project:show:<head>` / `project:edit:<head>`) and asks
//! the enforcer before doing anything else.

pub mod audit;
pub mod config;
pub mod enforcer;
pub mod token;

pub use audit::{AuditEvent, AuditPublisher};
pub use config::{PolicyConfig, PolicyConfigError};
pub use enforcer::{FilePolicyEnforcer, PolicyEnforcer};
pub use token::BearerToken;

/// Derives the policy rule name for a guarded request, per spec §6:
/// `project:show:<head>` for reads, `project:edit:<head>` for writes, where
/// `<head>` is the asset-type up to its first `:`.
pub fn rule_name(verb: &str, asset_type: &str) -> String {
    let head = asset_type.split(':').next().unwrap_or(asset_type);
    format!("project:{verb}:{head}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_name_takes_head_before_colon() {
        assert_eq!(rule_name("show", "manila-shares"), "project:show:manila-shares");
        assert_eq!(rule_name("edit", "cinder:volumes"), "project:edit:cinder");
    }
}
