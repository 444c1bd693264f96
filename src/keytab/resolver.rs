//! Resolving the service key for an SPN within an in-memory keytab.

use crate::error::CoreError;
use crate::keytab::{Enctype, Keytab, KeytabEntry};

/// Resolve the best-matching key for `SERVICE/host[@REALM]` within
/// `keytab`.
///
/// Matching strips an optional `@REALM` suffix and requires an exact,
/// two-component principal: `component[0] == SERVICE`,
/// `component[1] == host` (case-sensitive), `realm == REALM`. When
/// multiple enctypes match, AES256 is preferred over AES128 over RC4.
///
/// On no match, returns a distinguished, deliberately generic error: the
/// caller (the SPNEGO Acceptor) must surface this as a plain Kerberos
/// failure and never mention enctypes or key material.
pub fn resolve_key<'a>(
    keytab: &'a Keytab,
    service: &str,
    host: &str,
    realm: &str,
) -> Result<&'a KeytabEntry, CoreError> {
    keytab
        .entries
        .iter()
        .filter(|entry| {
            entry.principal.components.len() == 2
                && entry.principal.components[0] == service
                && entry.principal.components[1] == host
                && entry.principal.realm == realm
        })
        .max_by_key(|entry| (entry.enctype.preference_rank(), entry.kvno))
        .ok_or_else(no_matching_key)
}

/// As [`resolve_key`], but the ticket's encryption type dictates which
/// entry to use: it must match exactly rather than be preference-ranked,
/// since the key bytes must match the etype the KDC actually used.
pub fn resolve_key_for_enctype<'a>(
    keytab: &'a Keytab,
    service: &str,
    host: &str,
    realm: &str,
    enctype: Enctype,
) -> Result<&'a KeytabEntry, CoreError> {
    keytab
        .entries
        .iter()
        .find(|entry| {
            entry.principal.components.len() == 2
                && entry.principal.components[0] == service
                && entry.principal.components[1] == host
                && entry.principal.realm == realm
                && entry.enctype == enctype
        })
        .ok_or_else(no_matching_key)
}

fn no_matching_key() -> CoreError {
    CoreError::kerberos("kerberos negotiation failed")
        .with_detail("no matching key in keytab for requested SPN/realm")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keytab::Enctype;

    fn keytab_with(entries: Vec<(&str, &str, &str, u16, u32)>) -> Keytab {
        Keytab {
            entries: entries
                .into_iter()
                .map(|(service, host, realm, enctype, kvno)| crate::keytab::KeytabEntry {
                    principal: crate::keytab::Principal {
                        components: vec![service.into(), host.into()],
                        realm: realm.into(),
                    },
                    kvno,
                    enctype: Enctype::from_wire(enctype),
                    key_bytes: vec![0u8; 16],
                    timestamp: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn resolves_exact_match() {
        let kt = keytab_with(vec![("HTTP", "vault.test.com", "TEST.COM", Enctype::RC4_HMAC, 1)]);
        let entry = resolve_key(&kt, "HTTP", "vault.test.com", "TEST.COM").unwrap();
        assert_eq!(entry.enctype, Enctype::Rc4Hmac);
    }

    #[test]
    fn prefers_aes256_over_rc4() {
        let kt = keytab_with(vec![
            ("HTTP", "vault.test.com", "TEST.COM", Enctype::RC4_HMAC, 1),
            (
                "HTTP",
                "vault.test.com",
                "TEST.COM",
                Enctype::AES256_CTS_HMAC_SHA1_96,
                1,
            ),
        ]);
        let entry = resolve_key(&kt, "HTTP", "vault.test.com", "TEST.COM").unwrap();
        assert_eq!(entry.enctype, Enctype::Aes256CtsHmacSha196);
    }

    #[test]
    fn no_match_is_generic() {
        let kt = keytab_with(vec![]);
        let err = resolve_key(&kt, "HTTP", "vault.test.com", "TEST.COM").unwrap_err();
        assert!(!err.safe_message().contains("keytab"));
    }

    #[test]
    fn resolve_for_enctype_requires_exact_match() {
        let kt = keytab_with(vec![("HTTP", "vault.test.com", "TEST.COM", Enctype::RC4_HMAC, 1)]);
        assert!(resolve_key_for_enctype(&kt, "HTTP", "vault.test.com", "TEST.COM", Enctype::Rc4Hmac).is_ok());
        assert!(
            resolve_key_for_enctype(&kt, "HTTP", "vault.test.com", "TEST.COM", Enctype::Aes256CtsHmacSha196)
                .is_err()
        );
    }

    #[test]
    fn host_match_is_case_sensitive() {
        let kt = keytab_with(vec![("HTTP", "Vault.test.com", "TEST.COM", Enctype::RC4_HMAC, 1)]);
        assert!(resolve_key(&kt, "HTTP", "vault.test.com", "TEST.COM").is_err());
    }
}
