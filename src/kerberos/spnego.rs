//! The SPNEGO acceptor: base64 → SPNEGO unwrap → AP-REQ decode →
//! ticket/authenticator decrypt → the checks RFC 4120 requires of an
//! acceptor.

use std::time::Duration;

use base64::Engine;

use crate::error::CoreError;
use crate::kerberos::crypto::{self, KEY_USAGE_AP_REQ_AUTHENTICATOR, KEY_USAGE_TICKET};
use crate::kerberos::der::{self, expect_application, read_tlv_exact, DerError};
use crate::kerberos::replay::ReplayCache;
use crate::kerberos::ticket::{parse_ap_req, parse_authenticator, parse_enc_ticket_part};
use crate::keytab::{resolve_key_for_enctype, Enctype, Keytab};

/// Identity and PAC candidate bytes exported on a successful accept.
#[derive(Debug, Clone)]
pub struct AcceptedContext {
    pub user_name: String,
    pub domain: Option<String>,
    pub authorization_data: Option<Vec<u8>>,
}

impl AcceptedContext {
    /// `user@domain` when a domain is known, else just `user`.
    pub fn principal(&self) -> String {
        match &self.domain {
            Some(domain) => format!("{}@{domain}", self.user_name),
            None => self.user_name.clone(),
        }
    }
}

const MAX_SPNEGO_BLOB_BYTES: usize = 64 * 1024;
const KERBEROS_OID_TOKEN_ID_AP_REQ: [u8; 2] = [0x01, 0x00];

pub struct AcceptorConfig<'a> {
    pub keytab: &'a Keytab,
    pub expected_service: &'a str,
    pub expected_host: &'a str,
    pub expected_realm: &'a str,
    pub clock_skew_seconds: u32,
    pub require_channel_binding: bool,
    pub channel_binding: Option<&'a [u8]>,
}

/// Accept a base64 SPNEGO token against the given acceptor configuration
/// and replay cache. Never echoes token bytes in any error message.
pub fn accept(
    spnego_base64: &str,
    cfg: &AcceptorConfig<'_>,
    replay_cache: &ReplayCache,
    now_unix: i64,
) -> Result<AcceptedContext, CoreError> {
    if spnego_base64.is_empty() {
        return Err(invalid_base64());
    }
    let raw = base64::engine::general_purpose::STANDARD
        .decode(spnego_base64)
        .map_err(|_| invalid_base64())?;
    if raw.is_empty() || raw.len() > MAX_SPNEGO_BLOB_BYTES {
        return Err(invalid_base64());
    }

    let mech_token = spnego_unwrap(&raw).map_err(|_| spnego_unmarshal())?;
    let ap_req_bytes = extract_ap_req_bytes(mech_token).map_err(|_| spnego_unmarshal())?;
    let ap_req = parse_ap_req(ap_req_bytes).map_err(|_| kerberos_negotiation())?;

    if !ap_req.ticket.realm.eq_ignore_ascii_case(cfg.expected_realm) {
        return Err(kerberos_negotiation());
    }
    let sname_matches = ap_req.ticket.sname.components.len() == 2
        && ap_req.ticket.sname.components[0].eq_ignore_ascii_case(cfg.expected_service)
        && ap_req.ticket.sname.components[1].eq_ignore_ascii_case(cfg.expected_host);
    if !sname_matches {
        return Err(kerberos_negotiation());
    }

    let ticket_enctype = Enctype::from_wire(ap_req.ticket.enc_part.etype as u16);
    let server_key = resolve_key_for_enctype(
        cfg.keytab,
        cfg.expected_service,
        cfg.expected_host,
        cfg.expected_realm,
        ticket_enctype,
    )?;

    let enc_ticket_part_bytes = crypto::decrypt(
        server_key.enctype,
        &server_key.key_bytes,
        KEY_USAGE_TICKET,
        &ap_req.ticket.enc_part.cipher,
    )?;
    let enc_ticket_part = parse_enc_ticket_part(&enc_ticket_part_bytes).map_err(|_| kerberos_negotiation())?;

    if now_unix < enc_ticket_part.starttime.unwrap_or(enc_ticket_part.authtime) - cfg.clock_skew_seconds as i64 {
        return Err(kerberos_negotiation());
    }
    if now_unix > enc_ticket_part.endtime + cfg.clock_skew_seconds as i64 {
        return Err(kerberos_negotiation());
    }

    let session_key_enctype = Enctype::from_wire(enc_ticket_part.key.keytype as u16);
    let authenticator_bytes = crypto::decrypt(
        session_key_enctype,
        &enc_ticket_part.key.keyvalue,
        KEY_USAGE_AP_REQ_AUTHENTICATOR,
        &ap_req.authenticator.cipher,
    )?;
    let authenticator = parse_authenticator(&authenticator_bytes).map_err(|_| kerberos_negotiation())?;

    if (authenticator.ctime - now_unix).unsigned_abs() > cfg.clock_skew_seconds as u64 {
        return Err(kerberos_negotiation());
    }

    if cfg.require_channel_binding {
        let provided = cfg.channel_binding.filter(|cb| !cb.is_empty());
        let provided = provided.ok_or_else(missing_channel_binding)?;
        let asserted = authenticator.cksum.as_deref().ok_or_else(missing_channel_binding)?;
        if provided != asserted {
            return Err(missing_channel_binding());
        }
    }

    let principal = format!(
        "{}@{}",
        enc_ticket_part.cname.joined(),
        enc_ticket_part.crealm
    );
    if !replay_cache.check_and_insert(
        &principal,
        authenticator.ctime,
        authenticator.cusec,
        Duration::from_secs(2 * cfg.clock_skew_seconds as u64),
    ) {
        return Err(kerberos_negotiation());
    }

    if enc_ticket_part.cname.components.is_empty() {
        return Err(no_identity());
    }

    Ok(AcceptedContext {
        user_name: enc_ticket_part.cname.joined(),
        domain: Some(enc_ticket_part.crealm),
        authorization_data: enc_ticket_part.pac_data,
    })
}

/// Unwrap the outer SPNEGO `InitialContextToken`: `[APPLICATION 0]`
/// wrapping a mechanism OID and a `NegTokenInit`, and return the raw
/// `mechToken` octets.
fn spnego_unwrap(data: &[u8]) -> Result<&[u8], DerError> {
    let outer = read_tlv_exact(data)?;
    let app_value = expect_application(&outer, 0)?;

    let mut pos = 0;
    let _oid = der::read_tlv(app_value, &mut pos)?;

    let neg_token = der::read_tlv(app_value, &mut pos)?;
    if neg_token.tag.class != der::Class::ContextSpecific || neg_token.tag.number != 0 {
        return Err(DerError("expected negTokenInit [0]".to_string()));
    }
    let seq_tlv = read_tlv_exact(neg_token.value)?;
    let seq = der::expect_sequence(&seq_tlv)?;

    let mut spos = 0;
    while spos < seq.len() {
        let mut peek = spos;
        let field = der::read_tlv(seq, &mut peek)?;
        if field.tag.class == der::Class::ContextSpecific && field.tag.number == 2 {
            let inner = read_tlv_exact(field.value)?;
            return der::decode_octet_string(&inner);
        }
        spos = peek;
    }
    Err(DerError("negTokenInit carried no mechToken".to_string()))
}

/// `mechToken` may itself be a full GSS `InitialContextToken` (wrapping
/// the Kerberos OID and a 2-byte `TOK_ID`) or the bare AP-REQ; handle
/// both so a strictly-conforming client and a minimal one both work.
fn extract_ap_req_bytes(mech_token: &[u8]) -> Result<&[u8], DerError> {
    match mech_token.first() {
        Some(0x6E) => Ok(mech_token), // already [APPLICATION 14]
        Some(0x60) => {
            let outer = read_tlv_exact(mech_token)?;
            let app_value = expect_application(&outer, 0)?;
            let mut pos = 0;
            let _oid = der::read_tlv(app_value, &mut pos)?;
            let tok_id = app_value
                .get(pos..pos + 2)
                .ok_or_else(|| DerError("truncated GSS token id".to_string()))?;
            if tok_id != KERBEROS_OID_TOKEN_ID_AP_REQ {
                return Err(DerError("unexpected GSS token id".to_string()));
            }
            Ok(&app_value[pos + 2..])
        }
        _ => Err(DerError("mechToken is neither a GSS wrapper nor a bare AP-REQ".to_string())),
    }
}

fn invalid_base64() -> CoreError {
    CoreError::kerberos("authentication request was malformed").with_detail("INVALID_BASE64")
}
fn spnego_unmarshal() -> CoreError {
    CoreError::kerberos("authentication request was malformed").with_detail("SPNEGO_UNMARSHAL")
}
fn kerberos_negotiation() -> CoreError {
    CoreError::kerberos("kerberos negotiation failed").with_detail("KERBEROS_NEGOTIATION")
}
fn missing_channel_binding() -> CoreError {
    CoreError::kerberos("channel binding required").with_detail("MISSING_CHANNEL_BINDING")
}
fn no_identity() -> CoreError {
    CoreError::kerberos("no identity in ticket").with_detail("NO_IDENTITY")
}
