//! The Authorizer and Policy Resolver: realm/SPN/group-SID checks
//! against a `Role`, and policy-list resolution into an `Auth` record.

use serde::Serialize;

use crate::config::Config;
use crate::error::CoreError;
use crate::role::{Role, TokenType};
use crate::validator::ValidationResult;

/// The record emitted on a successful login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Auth {
    pub policies: Vec<String>,
    pub metadata: AuthMetadata,
    pub display_name: String,
    pub token_type: TokenType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthMetadata {
    pub principal: String,
    pub realm: String,
    pub role: String,
    pub spn: String,
    pub sids_count: String,
}

/// Authorize `validation` against `role` and `config`, producing an
/// `Auth` record on success.
pub fn authorize(validation: &ValidationResult, role: &Role, config: &Config) -> Result<Auth, CoreError> {
    let realm = validation
        .domain
        .as_deref()
        .ok_or_else(|| CoreError::denied("no realm in validated identity"))?;

    if !role.allowed_realms.is_empty() && !role.allowed_realms.iter().any(|r| r.eq_ignore_ascii_case(realm)) {
        return Err(CoreError::denied("realm not allowed for this role"));
    }

    if !role.allowed_spns.is_empty() && !role.allowed_spns.iter().any(|s| s.eq_ignore_ascii_case(&config.spn)) {
        return Err(CoreError::denied("spn not allowed for this role"));
    }

    if !role.bound_group_sids.is_empty() {
        let matched = role
            .bound_group_sids
            .iter()
            .any(|sid| validation.group_sids.iter().any(|g| g == sid));
        if !matched {
            return Err(CoreError::denied("no bound group SID matched"));
        }
    }

    let policies = resolve_policies(&role.token_policies, &role.deny_policies);

    Ok(Auth {
        policies,
        metadata: AuthMetadata {
            principal: validation.principal.clone(),
            realm: realm.to_string(),
            role: role.name.clone(),
            spn: config.spn.clone(),
            sids_count: validation.group_sids.len().to_string(),
        },
        display_name: validation.principal.clone(),
        token_type: role.token_type,
        period: (role.period_seconds > 0).then_some(role.period_seconds),
        ttl: (role.max_ttl_seconds > 0).then_some(role.max_ttl_seconds),
    })
}

/// Deduplicate `token_policies` preserving first-seen order, then subtract
/// `deny_policies`.
fn resolve_policies(token_policies: &[String], deny_policies: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    token_policies
        .iter()
        .filter(|p| seen.insert((*p).clone()))
        .filter(|p| !deny_policies.contains(p))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::MergeStrategy;

    fn config() -> Config {
        Config {
            realm: "TEST.COM".into(),
            kdcs: vec!["kdc1.test.com".into()],
            keytab_bytes: String::new(),
            spn: "HTTP/vault.test.com".into(),
            require_channel_binding: false,
            clock_skew_seconds: 300,
        }
    }

    fn validation(group_sids: Vec<String>) -> ValidationResult {
        ValidationResult {
            principal: "alice@TEST.COM".into(),
            user_name: "alice".into(),
            domain: Some("TEST.COM".into()),
            group_sids,
            pac_found: true,
            pac_valid: true,
        }
    }

    #[test]
    fn happy_path_emits_policies_and_metadata() {
        let role = Role {
            name: "alpha".into(),
            token_policies: vec!["default".into(), "app".into()],
            ..Default::default()
        };
        let auth = authorize(&validation(vec!["S-1-5-21-1-2-3-512".into(), "S-1-5-21-1-2-3-513".into()]), &role, &config())
            .unwrap();
        assert_eq!(auth.policies, vec!["default", "app"]);
        assert_eq!(auth.display_name, "alice@TEST.COM");
        assert_eq!(auth.metadata.sids_count, "2");
    }

    #[test]
    fn rejects_realm_not_allowed() {
        let role = Role {
            name: "alpha".into(),
            allowed_realms: vec!["OTHER.COM".into()],
            ..Default::default()
        };
        assert!(authorize(&validation(vec![]), &role, &config()).is_err());
    }

    #[test]
    fn rejects_spn_not_allowed() {
        let role = Role {
            name: "alpha".into(),
            allowed_spns: vec!["HTTP/other.test.com".into()],
            ..Default::default()
        };
        assert!(authorize(&validation(vec![]), &role, &config()).is_err());
    }

    #[test]
    fn group_bound_not_matched_is_denied() {
        let role = Role {
            name: "beta".into(),
            bound_group_sids: vec!["S-1-5-21-1-2-3-1000".into()],
            ..Default::default()
        };
        let err = authorize(&validation(vec!["S-1-5-21-1-2-3-512".into()]), &role, &config()).unwrap_err();
        assert_eq!(err.safe_message(), "no bound group SID matched");
    }

    #[test]
    fn group_bound_matched_succeeds() {
        let role = Role {
            name: "beta".into(),
            bound_group_sids: vec!["S-1-5-21-1-2-3-512".into()],
            ..Default::default()
        };
        assert!(authorize(&validation(vec!["S-1-5-21-1-2-3-512".into()]), &role, &config()).is_ok());
    }

    #[test]
    fn deny_list_subtracts_and_dedups() {
        let role = Role {
            name: "gamma".into(),
            token_policies: vec!["a".into(), "b".into(), "c".into(), "a".into()],
            deny_policies: vec!["b".into()],
            merge_strategy: MergeStrategy::Union,
            ..Default::default()
        };
        let auth = authorize(&validation(vec![]), &role, &config()).unwrap();
        assert_eq!(auth.policies, vec!["a", "c"]);
    }
}
