//! The operator-managed [`Role`] record, keyed by name.
//!
//! A role binds identity properties (realm, SPN, group SIDs) to a policy
//! set and a token shape. Roles are validated on every write and read
//! fresh on every login.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Durations in the data model are bounded to one day.
pub const MAX_DURATION_SECONDS: u32 = 86_400;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Default,
    Service,
}

impl Default for TokenType {
    fn default() -> Self {
        Self::Default
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    Union,
    Override,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        Self::Union
    }
}

/// An operator-defined binding from identity properties to a policy set
/// and token shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields, default)]
pub struct Role {
    pub name: String,

    /// If non-empty, the caller's realm must match (case-insensitive) one
    /// of these.
    pub allowed_realms: Vec<String>,

    /// If non-empty, the caller's SPN must match (case-insensitive) one of
    /// these.
    pub allowed_spns: Vec<String>,

    /// If non-empty, the caller's group SIDs must intersect this set.
    pub bound_group_sids: Vec<String>,

    pub token_policies: Vec<String>,

    pub deny_policies: Vec<String>,

    pub token_type: TokenType,

    pub period_seconds: u32,

    pub max_ttl_seconds: u32,

    pub merge_strategy: MergeStrategy,
}

impl Default for Role {
    fn default() -> Self {
        Self {
            name: String::new(),
            allowed_realms: Vec::new(),
            allowed_spns: Vec::new(),
            bound_group_sids: Vec::new(),
            token_policies: Vec::new(),
            deny_policies: Vec::new(),
            token_type: TokenType::default(),
            period_seconds: 0,
            max_ttl_seconds: 0,
            merge_strategy: MergeStrategy::default(),
        }
    }
}

impl Role {
    /// Called on every write by the Role Store, never relied upon to have
    /// run on a value read back from storage.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.is_empty() || !self.name.chars().all(is_safe_identifier_char) {
            return Err(CoreError::invalid_input(
                "role name must be non-empty and match a safe identifier charset",
            ));
        }

        if self.period_seconds > MAX_DURATION_SECONDS {
            return Err(CoreError::invalid_input(format!(
                "period_seconds must be in [0, {MAX_DURATION_SECONDS}]"
            )));
        }
        if self.max_ttl_seconds > MAX_DURATION_SECONDS {
            return Err(CoreError::invalid_input(format!(
                "max_ttl_seconds must be in [0, {MAX_DURATION_SECONDS}]"
            )));
        }

        for sid in &self.bound_group_sids {
            if !is_valid_sid(sid) {
                return Err(CoreError::invalid_input(format!(
                    "invalid SID in bound_group_sids: {sid}"
                )));
            }
        }

        Ok(())
    }
}

fn is_safe_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'
}

/// `S-\d+-\d+(-\d+)+`
pub fn is_valid_sid(sid: &str) -> bool {
    let Some(rest) = sid.strip_prefix("S-") else {
        return false;
    };
    let parts: Vec<&str> = rest.split('-').collect();
    if parts.len() < 3 {
        return false;
    }
    parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}
