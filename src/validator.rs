//! The Validator Facade: orchestrates the SPNEGO acceptor, PAC codec,
//! and PAC verifier into one `ValidationResult`.

use jiff::Timestamp;

use crate::config::Config;
use crate::error::CoreError;
use crate::kerberos::{self, AcceptorConfig, ReplayCache};
use crate::keytab::{self, Keytab};
use crate::pac;
use crate::role::Role;

/// The outcome of validating one SPNEGO token against a `Config` and the
/// `Role` it will be authorized against.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub principal: String,
    pub user_name: String,
    pub domain: Option<String>,
    pub group_sids: Vec<String>,
    pub pac_found: bool,
    pub pac_valid: bool,
}

/// Run the Acceptor → Codec → Verifier pipeline.
///
/// If the ticket carries no PAC, returns success with empty `group_sids`
/// (a role with no `bound_group_sids` constraint can still authorize the
/// caller). If the PAC is present but fails verification, the caller
/// decides whether that's fatal based on whether `role` has a
/// `bound_group_sids` constraint — this function always returns the
/// PAC's outcome; `validate_for_role` applies that policy.
pub fn validate(
    spnego_base64: &str,
    config: &Config,
    keytab: &Keytab,
    replay_cache: &ReplayCache,
    channel_binding: Option<&[u8]>,
    now: Timestamp,
) -> Result<ValidationResult, CoreError> {
    let spn = config.spn()?;
    let acceptor_cfg = AcceptorConfig {
        keytab,
        expected_service: &spn.service,
        expected_host: &spn.host,
        expected_realm: &config.realm,
        clock_skew_seconds: config.clock_skew_seconds,
        require_channel_binding: config.require_channel_binding,
        channel_binding,
    };
    let accepted = kerberos::accept(spnego_base64, &acceptor_cfg, replay_cache, now.as_second())?;

    let Some(pac_bytes) = accepted.authorization_data.as_deref() else {
        return Ok(ValidationResult {
            principal: accepted.principal(),
            user_name: accepted.user_name,
            domain: accepted.domain,
            group_sids: Vec::new(),
            pac_found: false,
            pac_valid: false,
        });
    };

    let parsed = match pac::parse(pac_bytes) {
        Ok(parsed) => parsed,
        Err(_) => {
            // A PAC that fails to parse is treated the same as one that
            // fails to verify: the caller's bound_group_sids policy
            // decides whether that's fatal, not this function.
            return Ok(ValidationResult {
                principal: accepted.principal(),
                user_name: accepted.user_name,
                domain: accepted.domain,
                group_sids: Vec::new(),
                pac_found: true,
                pac_valid: false,
            });
        }
    };
    let server_key = keytab::resolve_key(keytab, &spn.service, &spn.host, &config.realm)?;
    let zeroed = pac::zero_signatures(pac_bytes);

    let result = pac::verify(&parsed, &zeroed, server_key, &config.realm, config.clock_skew_seconds, now);

    Ok(ValidationResult {
        principal: accepted.principal(),
        user_name: accepted.user_name,
        domain: accepted.domain,
        group_sids: result.group_sids,
        pac_found: true,
        pac_valid: result.valid,
    })
}

/// Apply the PAC-absent/PAC-failure fallback policy for `role`: a PAC
/// that's missing or failed to verify is only fatal when `role` has a
/// `bound_group_sids` constraint that an empty group-SID set can't
/// satisfy.
pub fn validate_for_role(
    spnego_base64: &str,
    config: &Config,
    keytab: &Keytab,
    role: &Role,
    replay_cache: &ReplayCache,
    channel_binding: Option<&[u8]>,
    now: Timestamp,
) -> Result<ValidationResult, CoreError> {
    let result = validate(spnego_base64, config, keytab, replay_cache, channel_binding, now)?;

    if result.pac_found && !result.pac_valid && !role.bound_group_sids.is_empty() {
        return Err(CoreError::pac(
            crate::error::PacErrorKind::SignatureInvalid,
            "PAC verification failed and role requires a bound group SID",
        ));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::keytab::{Enctype, Keytab, KeytabEntry, Principal};

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

    fn keytab() -> Keytab {
        Keytab {
            entries: vec![KeytabEntry {
                principal: Principal {
                    components: vec!["HTTP".into(), "vault.test.com".into()],
                    realm: "TEST.COM".into(),
                },
                kvno: 1,
                enctype: Enctype::Aes256CtsHmacSha196,
                key_bytes: vec![0x11; 32],
                timestamp: 0,
            }],
        }
    }

    #[test]
    fn malformed_token_surfaces_as_kerberos_failure() {
        let cfg = config();
        let kt = keytab();
        let replay_cache = ReplayCache::new();
        let result = validate("not valid base64!!", &cfg, &kt, &replay_cache, None, Timestamp::UNIX_EPOCH);
        assert!(result.is_err());
    }

    /// Builds a base64 SPNEGO/AP-REQ token that `validate_for_role` will
    /// accept at the Kerberos layer, carrying a PAC buffer table too
    /// short to parse.
    fn token_with_malformed_pac() -> String {
        use crate::kerberos::KEY_USAGE_AP_REQ_AUTHENTICATOR as USAGE_AUTH;
        use crate::kerberos::KEY_USAGE_TICKET as USAGE_TICKET;
        use crate::kerberos::spnego::tests::{aes_cts_hmac_encrypt, wrap_spnego};
        use crate::kerberos::ticket::tests as tk;
        use base64::Engine;

        let session_key = [0x77u8; 32];
        let service_key = [0x11u8; 32]; // must match keytab()'s key_bytes
        let malformed_pac = vec![0xFFu8; 4]; // too short to contain a buffer-count header

        let enc_ticket_part = tk::build_enc_ticket_part(
            &session_key,
            "TEST.COM",
            &["alice"],
            "20260101000000Z",
            "20260101100000Z",
            Some(&malformed_pac),
        );
        let ticket_confounder = [0x01u8; 16];
        let ticket_cipher = aes_cts_hmac_encrypt(&service_key, USAGE_TICKET, &ticket_confounder, &enc_ticket_part);
        let ticket = tk::build_ticket("TEST.COM", &["HTTP", "vault.test.com"], 18, &ticket_cipher);

        let authenticator = tk::build_authenticator("TEST.COM", &["alice"], "20260101000500Z", 0, None, None);
        let auth_confounder = [0x02u8; 16];
        let auth_cipher = aes_cts_hmac_encrypt(&session_key, USAGE_AUTH, &auth_confounder, &authenticator);
        let ap_req = tk::build_ap_req(ticket, 18, &auth_cipher);

        let spnego_blob = wrap_spnego(ap_req);
        base64::engine::general_purpose::STANDARD.encode(&spnego_blob)
    }

    /// The instant `token_with_malformed_pac`'s authenticator carries,
    /// as a [`Timestamp`] rather than the raw KerberosTime string.
    fn token_now() -> Timestamp {
        use crate::kerberos::der;
        let seconds = der::decode_kerberos_time(&der::Tlv {
            tag: der::Tag {
                class: der::Class::Universal,
                constructed: false,
                number: 24,
            },
            value: b"20260101000500Z",
        })
        .unwrap();
        Timestamp::from_second(seconds).unwrap()
    }

    #[test]
    fn role_without_group_bound_tolerates_malformed_pac() {
        let cfg = config();
        let kt = keytab();
        let replay_cache = ReplayCache::new();
        let role = Role {
            name: "alpha".into(),
            ..Default::default()
        };
        assert!(role.bound_group_sids.is_empty());

        let token = token_with_malformed_pac();
        let result = validate_for_role(&token, &cfg, &kt, &role, &replay_cache, None, token_now())
            .expect("a role with no bound group SIDs tolerates a PAC that fails to parse");
        assert!(result.pac_found);
        assert!(!result.pac_valid);
        assert!(result.group_sids.is_empty());
    }

    #[test]
    fn role_with_group_bound_rejects_malformed_pac() {
        let cfg = config();
        let kt = keytab();
        let replay_cache = ReplayCache::new();
        let role = Role {
            name: "alpha".into(),
            bound_group_sids: vec!["S-1-5-21-1-2-3-512".into()],
            ..Default::default()
        };

        let token = token_with_malformed_pac();
        let err = validate_for_role(&token, &cfg, &kt, &role, &replay_cache, None, token_now())
            .expect_err("a role with a bound group SID must not tolerate an unparsable PAC");
        assert!(matches!(err.kind(), crate::error::ErrorKind::PacError(_)));
    }
}
