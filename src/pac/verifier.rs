//! Server/KDC signature, clock-skew, and UPN/DNS consistency checks over
//! a parsed PAC, plus group-SID synthesis.

use hmac::{Hmac, Mac};
use jiff::Timestamp;
use md5::Md5;
use ring::constant_time::verify_slices_are_equal;
use sha1::Sha1;

use crate::error::{CoreError, PacErrorKind};
use crate::keytab::KeytabEntry;
use crate::pac::codec::{Pac, Signature, SignatureAlgorithm};

/// Flags accumulated on a `PacValidationResult`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacValidationFlags {
    pub server_signature_valid: bool,
    /// Always `false` in this deployment: the plugin holds only the
    /// service keytab, never the domain krbtgt key.
    pub kdc_signature_checked: bool,
    pub kdc_signature_present: bool,
    pub clock_skew_valid: bool,
    pub upn_consistent: bool,
    /// Set when group SIDs could not be synthesized because
    /// `logon_domain_id` was absent from `LOGON_INFO`.
    pub domain_sid_unknown: bool,
}

#[derive(Debug, Clone)]
pub struct PacValidationResult {
    pub valid: bool,
    pub flags: PacValidationFlags,
    pub group_sids: Vec<String>,
    pub errors: Vec<CoreError>,
}

/// Verify a parsed PAC.
///
/// `zeroed_bytes` must be the PAC re-serialized with signature payloads
/// zeroed (see [`crate::pac::codec::zero_signatures`]); it is the
/// canonical HMAC input for both signatures.
pub fn verify(
    pac: &Pac,
    zeroed_bytes: &[u8],
    server_key: &KeytabEntry,
    realm: &str,
    clock_skew_seconds: u32,
    now: Timestamp,
) -> PacValidationResult {
    let mut flags = PacValidationFlags::default();
    let mut errors = Vec::new();

    let server_sig = pac.server_checksum();
    let privsvr_sig = pac.privsvr_checksum();

    match (server_sig, privsvr_sig) {
        (Some(server), Some(privsvr)) => {
            check_server_signature(server, zeroed_bytes, server_key, &mut flags, &mut errors);
            check_kdc_signature(privsvr, &mut flags, &mut errors);
        }
        _ => {
            errors.push(CoreError::pac(
                PacErrorKind::MissingSignature,
                "PAC is missing a required signature buffer",
            ));
        }
    }

    if let Some(info) = pac.logon_info() {
        check_clock_skew(info.logon_time, clock_skew_seconds, now, &mut flags, &mut errors);
    } else {
        errors.push(CoreError::pac(
            PacErrorKind::InvalidFormat,
            "PAC has no LOGON_INFO buffer",
        ));
    }

    if let Some(upn_info) = pac.upn_dns_info() {
        check_upn_consistency(&upn_info.upn, &upn_info.dns_domain, realm, &mut flags, &mut errors);
    } else {
        // UPN/DNS info is only checked when present.
        flags.upn_consistent = true;
    }

    let group_sids = synthesize_group_sids(pac, &mut flags);

    PacValidationResult {
        valid: errors.is_empty(),
        flags,
        group_sids,
        errors,
    }
}

fn check_server_signature(
    sig: &Signature,
    zeroed_bytes: &[u8],
    server_key: &KeytabEntry,
    flags: &mut PacValidationFlags,
    errors: &mut Vec<CoreError>,
) {
    let computed = match compute_hmac(sig.algorithm_type, &server_key.key_bytes, zeroed_bytes) {
        Ok(bytes) => bytes,
        Err(err) => {
            errors.push(err);
            return;
        }
    };

    if verify_slices_are_equal(&computed, &sig.bytes).is_ok() {
        flags.server_signature_valid = true;
    } else {
        errors.push(CoreError::pac(
            PacErrorKind::SignatureInvalid,
            "PAC server signature did not verify",
        ));
    }
}

/// The KDC signature is checked for presence/length only: this
/// deployment never holds the domain krbtgt key, so
/// `kdc_signature_checked` stays `false`. A buffer whose length doesn't
/// match its declared algorithm is still a hard failure.
fn check_kdc_signature(sig: &Signature, flags: &mut PacValidationFlags, errors: &mut Vec<CoreError>) {
    flags.kdc_signature_checked = false;
    flags.kdc_signature_present = expected_length(sig.algorithm_type)
        .map(|len| sig.bytes.len() == len)
        .unwrap_or(false);

    if !flags.kdc_signature_present {
        errors.push(CoreError::pac(
            PacErrorKind::SignatureInvalid,
            "PAC KDC signature buffer has unexpected length for its declared algorithm",
        ));
    }
}

fn expected_length(algorithm_type: u32) -> Option<usize> {
    match SignatureAlgorithm::from_wire(algorithm_type) {
        SignatureAlgorithm::HmacMd5 => Some(16),
        SignatureAlgorithm::HmacSha1Aes128 | SignatureAlgorithm::HmacSha1Aes256 => Some(12),
        SignatureAlgorithm::Unknown(_) => None,
    }
}

type HmacMd5 = Hmac<Md5>;
type HmacSha1 = Hmac<Sha1>;

/// Compute the HMAC specified by `algorithm_type` over `data` using
/// `key`, truncated as the algorithm requires.
fn compute_hmac(algorithm_type: u32, key: &[u8], data: &[u8]) -> Result<Vec<u8>, CoreError> {
    match SignatureAlgorithm::from_wire(algorithm_type) {
        SignatureAlgorithm::HmacMd5 => {
            let mut mac = HmacMd5::new_from_slice(key)
                .map_err(|_| CoreError::internal("invalid HMAC key length"))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        SignatureAlgorithm::HmacSha1Aes128 | SignatureAlgorithm::HmacSha1Aes256 => {
            let mut mac = HmacSha1::new_from_slice(key)
                .map_err(|_| CoreError::internal("invalid HMAC key length"))?;
            mac.update(data);
            let full = mac.finalize().into_bytes();
            Ok(full[..12].to_vec())
        }
        SignatureAlgorithm::Unknown(_) => Err(CoreError::pac(
            PacErrorKind::InvalidFormat,
            "PAC signature uses an unsupported algorithm",
        )),
    }
}

fn check_clock_skew(
    logon_time: Timestamp,
    clock_skew_seconds: u32,
    now: Timestamp,
    flags: &mut PacValidationFlags,
    errors: &mut Vec<CoreError>,
) {
    let diff = (now.as_second() - logon_time.as_second()).unsigned_abs();
    if diff <= clock_skew_seconds as u64 {
        flags.clock_skew_valid = true;
    } else {
        errors.push(CoreError::pac(
            PacErrorKind::ClockSkew,
            "PAC timestamp outside acceptable clock skew",
        ));
    }
}

fn check_upn_consistency(
    upn: &str,
    dns_domain: &str,
    realm: &str,
    flags: &mut PacValidationFlags,
    errors: &mut Vec<CoreError>,
) {
    let suffix = format!("@{realm}");
    let upn_ok = upn.to_ascii_uppercase().ends_with(&suffix.to_ascii_uppercase());
    let dns_ok = dns_domain.eq_ignore_ascii_case(realm);

    if upn_ok && dns_ok {
        flags.upn_consistent = true;
    } else {
        errors.push(CoreError::pac(
            PacErrorKind::UpnInconsistent,
            "PAC UPN_DNS_INFO inconsistent",
        ));
    }
}

fn synthesize_group_sids(pac: &Pac, flags: &mut PacValidationFlags) -> Vec<String> {
    let Some(info) = pac.logon_info() else {
        return Vec::new();
    };
    match &info.logon_domain_id {
        Some(domain_sid) => info
            .group_rids
            .iter()
            .map(|rid| format!("{domain_sid}-{rid}"))
            .collect(),
        None => {
            flags.domain_sid_unknown = true;
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keytab::{Enctype, Principal};
    use crate::pac::codec::tests::{
        assemble_pac, build_logon_info, build_signature_buffer, build_upn_dns_info,
    };
    use crate::pac::codec::{parse, zero_signatures, PacBufferType};

    fn server_key(key: Vec<u8>) -> KeytabEntry {
        KeytabEntry {
            principal: Principal {
                components: vec!["HTTP".into(), "vault.test.com".into()],
                realm: "TEST.COM".into(),
            },
            kvno: 1,
            enctype: Enctype::Aes256CtsHmacSha196,
            key_bytes: key,
            timestamp: 0,
        }
    }

    fn sign(key: &[u8], algorithm_type: u32, zeroed: &[u8]) -> Vec<u8> {
        compute_hmac(algorithm_type, key, zeroed).unwrap()
    }

    /// Build a complete, validly-signed PAC for `logon_time`/UPN, signed
    /// with `key` under AES256-flavored HMAC-SHA1-96.
    fn build_signed_pac(key: &[u8], logon_time_filetime: u64, upn: &str, dns: &str) -> Vec<u8> {
        let logon_info = build_logon_info(logon_time_filetime, 1000, 513, &[512, 513], Some("S-1-5-21-1-2-3"));
        let upn_info = build_upn_dns_info(upn, dns);
        // Placeholder signatures; real ones are computed after zeroing.
        let placeholder_server = build_signature_buffer(SignatureAlgorithm::HMAC_SHA1_96_AES256, &[0u8; 12]);
        let placeholder_privsvr = build_signature_buffer(SignatureAlgorithm::HMAC_SHA1_96_AES256, &[0u8; 12]);
        let unsigned = assemble_pac(&[
            (PacBufferType::LOGON_INFO, logon_info),
            (PacBufferType::UPN_DNS_INFO, upn_info),
            (PacBufferType::SERVER_CHECKSUM, placeholder_server),
            (PacBufferType::PRIVSVR_CHECKSUM, placeholder_privsvr),
        ]);

        let zeroed = zero_signatures(&unsigned);
        let server_sig = sign(key, SignatureAlgorithm::HMAC_SHA1_96_AES256, &zeroed);

        let logon_info = build_logon_info(logon_time_filetime, 1000, 513, &[512, 513], Some("S-1-5-21-1-2-3"));
        let upn_info = build_upn_dns_info(upn, dns);
        let server_buf = build_signature_buffer(SignatureAlgorithm::HMAC_SHA1_96_AES256, &server_sig);
        let privsvr_buf = build_signature_buffer(SignatureAlgorithm::HMAC_SHA1_96_AES256, &[0u8; 12]);
        assemble_pac(&[
            (PacBufferType::LOGON_INFO, logon_info),
            (PacBufferType::UPN_DNS_INFO, upn_info),
            (PacBufferType::SERVER_CHECKSUM, server_buf),
            (PacBufferType::PRIVSVR_CHECKSUM, privsvr_buf),
        ])
    }

    #[test]
    fn happy_path_validates() {
        let key = vec![0x42u8; 32];
        let pac_bytes = build_signed_pac(&key, 0, "alice@TEST.COM", "TEST.COM");
        let pac = parse(&pac_bytes).unwrap();
        let zeroed = zero_signatures(&pac_bytes);
        let entry = server_key(key);

        let result = verify(&pac, &zeroed, &entry, "TEST.COM", 300, Timestamp::UNIX_EPOCH);
        assert!(result.valid, "errors: {:?}", result.errors);
        assert!(result.flags.server_signature_valid);
        assert!(!result.flags.kdc_signature_checked);
        assert_eq!(result.group_sids, vec!["S-1-5-21-1-2-3-512", "S-1-5-21-1-2-3-513"]);
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let key = vec![0x42u8; 32];
        let mut pac_bytes = build_signed_pac(&key, 0, "alice@TEST.COM", "TEST.COM");
        let last = pac_bytes.len() - 1;
        pac_bytes[last] ^= 0xFF;
        let pac = parse(&pac_bytes).unwrap();
        let zeroed = zero_signatures(&pac_bytes);
        let entry = server_key(key);

        let result = verify(&pac, &zeroed, &entry, "TEST.COM", 300, Timestamp::UNIX_EPOCH);
        assert!(!result.valid);
    }

    #[test]
    fn clock_skew_boundary_passes_exactly_at_limit() {
        let key = vec![0x11u8; 32];
        // logon_time = Unix epoch (FILETIME 0 maps to it); now = epoch + 300s.
        let pac_bytes = build_signed_pac(&key, 0, "alice@TEST.COM", "TEST.COM");
        let pac = parse(&pac_bytes).unwrap();
        let zeroed = zero_signatures(&pac_bytes);
        let entry = server_key(key);
        let now = Timestamp::from_second(300).unwrap();

        let result = verify(&pac, &zeroed, &entry, "TEST.COM", 300, now);
        assert!(result.flags.clock_skew_valid);
    }

    #[test]
    fn clock_skew_beyond_limit_fails() {
        let key = vec![0x11u8; 32];
        let pac_bytes = build_signed_pac(&key, 0, "alice@TEST.COM", "TEST.COM");
        let pac = parse(&pac_bytes).unwrap();
        let zeroed = zero_signatures(&pac_bytes);
        let entry = server_key(key);
        let now = Timestamp::from_second(301).unwrap();

        let result = verify(&pac, &zeroed, &entry, "TEST.COM", 300, now);
        assert!(!result.flags.clock_skew_valid);
        assert!(!result.valid);
    }

    #[test]
    fn upn_realm_mismatch_is_rejected() {
        let key = vec![0x11u8; 32];
        let pac_bytes = build_signed_pac(&key, 0, "alice@WRONG.COM", "WRONG.COM");
        let pac = parse(&pac_bytes).unwrap();
        let zeroed = zero_signatures(&pac_bytes);
        let entry = server_key(key);

        let result = verify(&pac, &zeroed, &entry, "TEST.COM", 300, Timestamp::UNIX_EPOCH);
        assert!(!result.valid);
        assert!(!result.flags.upn_consistent);
    }

    #[test]
    fn upn_realm_check_is_case_insensitive() {
        let key = vec![0x11u8; 32];
        let pac_bytes = build_signed_pac(&key, 0, "alice@test.com", "test.com");
        let pac = parse(&pac_bytes).unwrap();
        let zeroed = zero_signatures(&pac_bytes);
        let entry = server_key(key);

        let result = verify(&pac, &zeroed, &entry, "TEST.COM", 300, Timestamp::UNIX_EPOCH);
        assert!(result.flags.upn_consistent);
    }

    #[test]
    fn kdc_signature_wrong_length_is_rejected() {
        let key = vec![0x42u8; 32];
        let logon_info = build_logon_info(0, 1000, 513, &[512, 513], Some("S-1-5-21-1-2-3"));
        let upn_info = build_upn_dns_info("alice@TEST.COM", "TEST.COM");
        let placeholder_server = build_signature_buffer(SignatureAlgorithm::HMAC_SHA1_96_AES256, &[0u8; 12]);
        // Declares AES256 HMAC (12-byte truncated digest) but carries 4 bytes.
        let placeholder_privsvr = build_signature_buffer(SignatureAlgorithm::HMAC_SHA1_96_AES256, &[0u8; 4]);
        let unsigned = assemble_pac(&[
            (PacBufferType::LOGON_INFO, logon_info.clone()),
            (PacBufferType::UPN_DNS_INFO, upn_info.clone()),
            (PacBufferType::SERVER_CHECKSUM, placeholder_server),
            (PacBufferType::PRIVSVR_CHECKSUM, placeholder_privsvr),
        ]);
        let zeroed = zero_signatures(&unsigned);
        let server_sig = sign(&key, SignatureAlgorithm::HMAC_SHA1_96_AES256, &zeroed);
        let server_buf = build_signature_buffer(SignatureAlgorithm::HMAC_SHA1_96_AES256, &server_sig);
        let privsvr_buf = build_signature_buffer(SignatureAlgorithm::HMAC_SHA1_96_AES256, &[0u8; 4]);
        let pac_bytes = assemble_pac(&[
            (PacBufferType::LOGON_INFO, logon_info),
            (PacBufferType::UPN_DNS_INFO, upn_info),
            (PacBufferType::SERVER_CHECKSUM, server_buf),
            (PacBufferType::PRIVSVR_CHECKSUM, privsvr_buf),
        ]);

        let pac = parse(&pac_bytes).unwrap();
        let zeroed = zero_signatures(&pac_bytes);
        let entry = server_key(key);
        let result = verify(&pac, &zeroed, &entry, "TEST.COM", 300, Timestamp::UNIX_EPOCH);

        assert!(!result.flags.kdc_signature_present);
        assert!(!result.valid, "a wrong-length KDC signature buffer must fail verification");
    }

    #[test]
    fn missing_signature_buffer_is_hard_failure() {
        let logon_info = build_logon_info(0, 1000, 513, &[512], Some("S-1-5-21-1-2-3"));
        let pac_bytes = assemble_pac(&[(PacBufferType::LOGON_INFO, logon_info)]);
        let pac = parse(&pac_bytes).unwrap();
        let zeroed = zero_signatures(&pac_bytes);
        let entry = server_key(vec![0x11u8; 32]);

        let result = verify(&pac, &zeroed, &entry, "TEST.COM", 300, Timestamp::UNIX_EPOCH);
        assert!(!result.valid);
    }

    #[test]
    fn missing_domain_sid_marks_flag_and_empties_groups() {
        let key = vec![0x11u8; 32];
        let logon_info = build_logon_info(0, 1000, 513, &[512, 513], None);
        let upn_info = build_upn_dns_info("alice@TEST.COM", "TEST.COM");
        let placeholder_server = build_signature_buffer(SignatureAlgorithm::HMAC_SHA1_96_AES256, &[0u8; 12]);
        let placeholder_privsvr = build_signature_buffer(SignatureAlgorithm::HMAC_SHA1_96_AES256, &[0u8; 12]);
        let unsigned = assemble_pac(&[
            (PacBufferType::LOGON_INFO, logon_info.clone()),
            (PacBufferType::UPN_DNS_INFO, upn_info.clone()),
            (PacBufferType::SERVER_CHECKSUM, placeholder_server),
            (PacBufferType::PRIVSVR_CHECKSUM, placeholder_privsvr),
        ]);
        let zeroed = zero_signatures(&unsigned);
        let server_sig = sign(&key, SignatureAlgorithm::HMAC_SHA1_96_AES256, &zeroed);
        let server_buf = build_signature_buffer(SignatureAlgorithm::HMAC_SHA1_96_AES256, &server_sig);
        let privsvr_buf = build_signature_buffer(SignatureAlgorithm::HMAC_SHA1_96_AES256, &[0u8; 12]);
        let pac_bytes = assemble_pac(&[
            (PacBufferType::LOGON_INFO, logon_info),
            (PacBufferType::UPN_DNS_INFO, upn_info),
            (PacBufferType::SERVER_CHECKSUM, server_buf),
            (PacBufferType::PRIVSVR_CHECKSUM, privsvr_buf),
        ]);

        let pac = parse(&pac_bytes).unwrap();
        let zeroed = zero_signatures(&pac_bytes);
        let entry = server_key(key);
        let result = verify(&pac, &zeroed, &entry, "TEST.COM", 300, Timestamp::UNIX_EPOCH);

        assert!(result.flags.domain_sid_unknown);
        assert!(result.group_sids.is_empty());
    }
}
