//! The Login Handler: binds the Validator Facade and Authorizer to one
//! request, under a 5-second deadline.

use std::time::Duration;

use jiff::Timestamp;
use tracing::warn;

use crate::authorize::{self, Auth};
use crate::center::Center;
use crate::error::CoreError;
use crate::validator;

/// Each login is cancelled after this long; expiry surfaces as a generic
/// `KerberosFailure` and increments `requests_abandoned_total` instead of
/// any login counter.
pub const LOGIN_DEADLINE: Duration = Duration::from_secs(5);

/// Run one login: read the current Config/Keytab snapshot and the named
/// Role, validate the SPNEGO token, and authorize the result.
pub async fn login(
    center: &Center,
    role_name: &str,
    spnego_base64: &str,
    channel_binding: Option<&[u8]>,
) -> Result<Auth, CoreError> {
    match tokio::time::timeout(LOGIN_DEADLINE, run(center, role_name, spnego_base64, channel_binding)).await {
        Ok(result) => {
            match &result {
                Ok(_) => center.metrics.counters().record_login_success(),
                Err(err) => {
                    if let crate::error::ErrorKind::PacError(kind) = err.kind() {
                        center.metrics.counters().record_pac_error(&kind);
                    }
                    if matches!(err.kind(), crate::error::ErrorKind::AuthorizationDenied) {
                        center.metrics.counters().record_login_denied();
                    }
                }
            }
            result
        }
        Err(_elapsed) => {
            center.metrics.counters().record_request_abandoned();
            warn!(role = role_name, "login request abandoned after deadline");
            Err(CoreError::kerberos("login request timed out"))
        }
    }
}

async fn run(
    center: &Center,
    role_name: &str,
    spnego_base64: &str,
    channel_binding: Option<&[u8]>,
) -> Result<Auth, CoreError> {
    let loaded = center
        .current()
        .ok_or_else(|| CoreError::not_configured("no configuration is present"))?;

    let role = center
        .roles
        .get_role(role_name)?
        .ok_or_else(|| CoreError::not_configured("no role with that name exists"))?;

    let validation = validator::validate_for_role(
        spnego_base64,
        &loaded.config,
        &loaded.keytab,
        &role,
        &center.replay_cache,
        channel_binding,
        Timestamp::now(),
    )?;

    authorize::authorize(&validation, &role, &loaded.config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::keytab::tests::sample_keytab_bytes;
    use crate::log::Logger;
    use crate::role::Role;
    use crate::store::{MemoryStorage, RoleStore};

    fn center_with(config: Config, role: Role) -> Center {
        let center = Center::new(RoleStore::new(MemoryStorage::new()), Logger::for_test());
        center.set_config(config).unwrap();
        center.roles.put_role(&role).unwrap();
        center
    }

    fn config() -> Config {
        Config {
            realm: "TEST.COM".into(),
            kdcs: vec!["kdc1.test.com".into()],
            keytab_bytes: {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD.encode(sample_keytab_bytes())
            },
            spn: "HTTP/vault.test.com".into(),
            require_channel_binding: false,
            clock_skew_seconds: 300,
        }
    }

    #[tokio::test]
    async fn rejects_unknown_role() {
        let center = Center::new(RoleStore::new(MemoryStorage::new()), Logger::for_test());
        center.set_config(config()).unwrap();
        let err = login(&center, "nope", "not base64 at all", None).await.unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::NotConfigured));
    }

    #[tokio::test]
    async fn rejects_before_config_present() {
        let center = Center::new(RoleStore::new(MemoryStorage::new()), Logger::for_test());
        let err = login(&center, "alpha", "anything", None).await.unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::NotConfigured));
    }

    #[tokio::test]
    async fn malformed_token_surfaces_as_kerberos_failure() {
        let role = Role {
            name: "alpha".into(),
            token_policies: vec!["default".into()],
            ..Default::default()
        };
        let center = center_with(config(), role);
        let err = login(&center, "alpha", "not valid base64!!", None).await.unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::KerberosFailure));
    }
}
