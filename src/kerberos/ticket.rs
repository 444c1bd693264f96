//! The subset of RFC 4120's ASN.1 module needed to accept an AP-REQ: the
//! `Ticket`, its decrypted `EncTicketPart`, and the `Authenticator`
//! decrypted from the AP-REQ's own `authenticator` field.

use crate::kerberos::der::{
    self, decode_bit_string, decode_general_string, decode_integer, decode_kerberos_time,
    decode_octet_string, expect_application, expect_sequence, peek_context_tag, read_context,
    read_tlv_exact, DerError,
};

#[derive(Debug, Clone)]
pub struct PrincipalName {
    pub name_type: i64,
    pub components: Vec<String>,
}

impl PrincipalName {
    /// `component[0]/component[1].../component[n]`, the conventional
    /// display form for a service principal.
    pub fn joined(&self) -> String {
        self.components.join("/")
    }
}

#[derive(Debug, Clone)]
pub struct EncryptedData {
    pub etype: i64,
    pub kvno: Option<i64>,
    pub cipher: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct EncryptionKey {
    pub keytype: i64,
    pub keyvalue: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Ticket {
    pub realm: String,
    pub sname: PrincipalName,
    pub enc_part: EncryptedData,
}

#[derive(Debug, Clone)]
pub struct ApReq {
    pub ap_options: Vec<u8>,
    pub ticket: Ticket,
    pub authenticator: EncryptedData,
}

#[derive(Debug, Clone)]
pub struct EncTicketPart {
    pub key: EncryptionKey,
    pub crealm: String,
    pub cname: PrincipalName,
    pub authtime: i64,
    pub starttime: Option<i64>,
    pub endtime: i64,
    pub renew_till: Option<i64>,
    /// Raw bytes of the AD-WIN2K-PAC entry (ad-type 128), unwrapped out
    /// of any enclosing AD-IF-RELEVANT (ad-type 1) container, if present.
    pub pac_data: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct Authenticator {
    pub crealm: String,
    pub cname: PrincipalName,
    /// Opaque checksum bytes; used here only as the channel-binding
    /// comparison value, never re-derived cryptographically.
    pub cksum: Option<Vec<u8>>,
    pub cusec: i64,
    pub ctime: i64,
    pub subkey: Option<EncryptionKey>,
    pub seq_number: Option<i64>,
}

const AD_IF_RELEVANT: i64 = 1;
const AD_WIN2K_PAC: i64 = 128;

fn parse_principal_name(data: &[u8]) -> Result<PrincipalName, DerError> {
    let seq = expect_sequence(&read_tlv_exact(data)?)?;
    let mut pos = 0;
    let name_type = decode_integer(read_context(seq, &mut pos, 0)?.value)?;

    let components_tlv = read_context(seq, &mut pos, 1)?;
    let components_seq = expect_sequence(&components_tlv)?;
    let mut cpos = 0;
    let mut components = Vec::new();
    while cpos < components_seq.len() {
        let mut p = cpos;
        let tlv = der::read_tlv(components_seq, &mut p)?;
        components.push(decode_general_string(&tlv)?);
        cpos = p;
    }

    Ok(PrincipalName { name_type, components })
}

fn parse_encrypted_data(data: &[u8]) -> Result<EncryptedData, DerError> {
    let seq = expect_sequence(&read_tlv_exact(data)?)?;
    let mut pos = 0;
    let etype = decode_integer(read_context(seq, &mut pos, 0)?.value)?;
    let kvno = if peek_context_tag(seq, pos) == Some(1) {
        Some(decode_integer(read_context(seq, &mut pos, 1)?.value)?)
    } else {
        None
    };
    let cipher_tlv = read_context(seq, &mut pos, 2)?;
    let cipher = decode_octet_string(&cipher_tlv)?.to_vec();
    Ok(EncryptedData { etype, kvno, cipher })
}

fn parse_encryption_key(data: &[u8]) -> Result<EncryptionKey, DerError> {
    let seq = expect_sequence(&read_tlv_exact(data)?)?;
    let mut pos = 0;
    let keytype = decode_integer(read_context(seq, &mut pos, 0)?.value)?;
    let keyvalue = decode_octet_string(&read_context(seq, &mut pos, 1)?).map(<[u8]>::to_vec)?;
    Ok(EncryptionKey { keytype, keyvalue })
}

fn parse_ticket(data: &[u8]) -> Result<Ticket, DerError> {
    let app = expect_application(&read_tlv_exact(data)?, 1)?;
    let seq = expect_sequence(&read_tlv_exact(app)?)?;
    let mut pos = 0;
    let _tkt_vno = decode_integer(read_context(seq, &mut pos, 0)?.value)?;
    let realm = decode_general_string(&read_context(seq, &mut pos, 1)?)?;
    let sname = parse_principal_name(read_context(seq, &mut pos, 2)?.value)?;
    let enc_part = parse_encrypted_data(read_context(seq, &mut pos, 3)?.value)?;
    Ok(Ticket { realm, sname, enc_part })
}

/// Parse an `AP-REQ` `[APPLICATION 14]` from the raw bytes handed over
/// by the SPNEGO layer.
pub fn parse_ap_req(data: &[u8]) -> Result<ApReq, DerError> {
    let app = expect_application(&read_tlv_exact(data)?, 14)?;
    let seq = expect_sequence(&read_tlv_exact(app)?)?;
    let mut pos = 0;
    let _pvno = decode_integer(read_context(seq, &mut pos, 0)?.value)?;
    let _msg_type = decode_integer(read_context(seq, &mut pos, 1)?.value)?;
    let ap_options = decode_bit_string(&read_context(seq, &mut pos, 2)?)?.to_vec();
    let ticket = parse_ticket(read_context(seq, &mut pos, 3)?.value)?;
    let authenticator = parse_encrypted_data(read_context(seq, &mut pos, 4)?.value)?;
    Ok(ApReq {
        ap_options,
        ticket,
        authenticator,
    })
}

/// Walk `AuthorizationData ::= SEQUENCE OF SEQUENCE { ad-type, ad-data }`,
/// unwrapping one level of `AD-IF-RELEVANT` nesting, looking for the
/// `AD-WIN2K-PAC` entry.
fn find_pac_in_authorization_data(data: &[u8]) -> Result<Option<Vec<u8>>, DerError> {
    let mut pos = 0;
    while pos < data.len() {
        let entry_tlv = der::read_tlv(data, &mut pos)?;
        let entry_seq = expect_sequence(&entry_tlv)?;
        let mut epos = 0;
        let ad_type = decode_integer(read_context(entry_seq, &mut epos, 0)?.value)?;
        let ad_data = decode_octet_string(&read_context(entry_seq, &mut epos, 1)?)?;

        if ad_type == AD_WIN2K_PAC {
            return Ok(Some(ad_data.to_vec()));
        }
        if ad_type == AD_IF_RELEVANT {
            if let Some(found) = find_pac_in_authorization_data(ad_data)? {
                return Ok(Some(found));
            }
        }
    }
    Ok(None)
}

/// Parse a decrypted `EncTicketPart` `[APPLICATION 3]`.
pub fn parse_enc_ticket_part(data: &[u8]) -> Result<EncTicketPart, DerError> {
    let app = expect_application(&read_tlv_exact(data)?, 3)?;
    let seq = expect_sequence(&read_tlv_exact(app)?)?;
    let mut pos = 0;
    let _flags = decode_bit_string(&read_context(seq, &mut pos, 0)?)?;
    let key = parse_encryption_key(read_context(seq, &mut pos, 1)?.value)?;
    let crealm = decode_general_string(&read_context(seq, &mut pos, 2)?)?;
    let cname = parse_principal_name(read_context(seq, &mut pos, 3)?.value)?;
    let _transited = read_context(seq, &mut pos, 4)?;
    let authtime = decode_kerberos_time(&read_context(seq, &mut pos, 5)?)?;
    let starttime = if peek_context_tag(seq, pos) == Some(6) {
        Some(decode_kerberos_time(&read_context(seq, &mut pos, 6)?)?)
    } else {
        None
    };
    let endtime = decode_kerberos_time(&read_context(seq, &mut pos, 7)?)?;
    let renew_till = if peek_context_tag(seq, pos) == Some(8) {
        Some(decode_kerberos_time(&read_context(seq, &mut pos, 8)?)?)
    } else {
        None
    };
    if peek_context_tag(seq, pos) == Some(9) {
        let _caddr = read_context(seq, &mut pos, 9)?;
    }
    let pac_data = if peek_context_tag(seq, pos) == Some(10) {
        let ad_tlv = read_context(seq, &mut pos, 10)?;
        let ad_seq = expect_sequence(&ad_tlv)?;
        find_pac_in_authorization_data(ad_seq)?
    } else {
        None
    };

    Ok(EncTicketPart {
        key,
        crealm,
        cname,
        authtime,
        starttime,
        endtime,
        renew_till,
        pac_data,
    })
}

/// Parse a decrypted `Authenticator` `[APPLICATION 2]`.
pub fn parse_authenticator(data: &[u8]) -> Result<Authenticator, DerError> {
    let app = expect_application(&read_tlv_exact(data)?, 2)?;
    let seq = expect_sequence(&read_tlv_exact(app)?)?;
    let mut pos = 0;
    let _vno = decode_integer(read_context(seq, &mut pos, 0)?.value)?;
    let crealm = decode_general_string(&read_context(seq, &mut pos, 1)?)?;
    let cname = parse_principal_name(read_context(seq, &mut pos, 2)?.value)?;
    let cksum = if peek_context_tag(seq, pos) == Some(3) {
        let cksum_tlv = read_context(seq, &mut pos, 3)?;
        let cksum_seq = expect_sequence(&cksum_tlv)?;
        let mut cpos = 0;
        let _cksumtype = decode_integer(read_context(cksum_seq, &mut cpos, 0)?.value)?;
        Some(decode_octet_string(&read_context(cksum_seq, &mut cpos, 1)?)?.to_vec())
    } else {
        None
    };
    let cusec = decode_integer(read_context(seq, &mut pos, 4)?.value)?;
    let ctime = decode_kerberos_time(&read_context(seq, &mut pos, 5)?)?;
    let subkey = if peek_context_tag(seq, pos) == Some(6) {
        Some(parse_encryption_key(read_context(seq, &mut pos, 6)?.value)?)
    } else {
        None
    };
    let seq_number = if peek_context_tag(seq, pos) == Some(7) {
        Some(decode_integer(read_context(seq, &mut pos, 7)?.value)?)
    } else {
        None
    };

    Ok(Authenticator {
        crealm,
        cname,
        cksum,
        cusec,
        ctime,
        subkey,
        seq_number,
    })
}
