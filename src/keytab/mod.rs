//! In-memory keytab: decoding the MIT keytab wire format and resolving a
//! service key for an SPN.

mod resolver;

pub use resolver::{resolve_key, resolve_key_for_enctype};

use std::fmt;

/// Kerberos encryption types the core understands, ordered so that
/// `Enctype::preference` matches "prefer AES256 > AES128 > RC4".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Enctype {
    Rc4Hmac,
    Aes128CtsHmacSha196,
    Aes256CtsHmacSha196,
    /// Anything else: kept so a keytab entry isn't silently dropped, but
    /// never selected by the resolver.
    Unknown(u16),
}

impl Enctype {
    pub const RC4_HMAC: u16 = 23;
    pub const AES128_CTS_HMAC_SHA1_96: u16 = 17;
    pub const AES256_CTS_HMAC_SHA1_96: u16 = 18;

    pub fn from_wire(value: u16) -> Self {
        match value {
            Self::RC4_HMAC => Self::Rc4Hmac,
            Self::AES128_CTS_HMAC_SHA1_96 => Self::Aes128CtsHmacSha196,
            Self::AES256_CTS_HMAC_SHA1_96 => Self::Aes256CtsHmacSha196,
            other => Self::Unknown(other),
        }
    }

    pub fn to_wire(self) -> u16 {
        match self {
            Self::Rc4Hmac => Self::RC4_HMAC,
            Self::Aes128CtsHmacSha196 => Self::AES128_CTS_HMAC_SHA1_96,
            Self::Aes256CtsHmacSha196 => Self::AES256_CTS_HMAC_SHA1_96,
            Self::Unknown(value) => value,
        }
    }

    /// Higher is more preferred; used to pick among multiple matching
    /// keytab entries.
    fn preference_rank(self) -> u8 {
        match self {
            Self::Aes256CtsHmacSha196 => 3,
            Self::Aes128CtsHmacSha196 => 2,
            Self::Rc4Hmac => 1,
            Self::Unknown(_) => 0,
        }
    }
}

impl fmt::Display for Enctype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rc4Hmac => f.write_str("rc4-hmac"),
            Self::Aes128CtsHmacSha196 => f.write_str("aes128-cts-hmac-sha1-96"),
            Self::Aes256CtsHmacSha196 => f.write_str("aes256-cts-hmac-sha1-96"),
            Self::Unknown(v) => write!(f, "enctype-{v}"),
        }
    }
}

/// A Kerberos principal: ordered name components plus a realm.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub components: Vec<String>,
    pub realm: String,
}

/// One entry of a decoded keytab.
#[derive(Clone, Debug)]
pub struct KeytabEntry {
    pub principal: Principal,
    pub kvno: u32,
    pub enctype: Enctype,
    pub key_bytes: Vec<u8>,
    pub timestamp: u32,
}

/// An ordered, in-memory keytab, decoded once from `Config.keytab_bytes`.
#[derive(Clone, Debug, Default)]
pub struct Keytab {
    pub entries: Vec<KeytabEntry>,
}

#[derive(Debug)]
pub enum KeytabDecodeError {
    Truncated,
    BadMagic(u16),
}

impl fmt::Display for KeytabDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => f.write_str("truncated keytab record"),
            Self::BadMagic(v) => write!(f, "unrecognized keytab file format version {v:#06x}"),
        }
    }
}
impl std::error::Error for KeytabDecodeError {}

/// Known MIT keytab file format version (v5.2, big-endian records).
const KEYTAB_MAGIC: u16 = 0x0502;

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], KeytabDecodeError> {
        if self.remaining() < n {
            return Err(KeytabDecodeError::Truncated);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, KeytabDecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, KeytabDecodeError> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32, KeytabDecodeError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i32(&mut self) -> Result<i32, KeytabDecodeError> {
        Ok(i32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    /// Length-prefixed (u16 length) byte string, as used for realm/name
    /// components and key material.
    fn counted_bytes(&mut self) -> Result<&'a [u8], KeytabDecodeError> {
        let len = self.u16()? as usize;
        self.take(len)
    }

    fn counted_string(&mut self) -> Result<String, KeytabDecodeError> {
        Ok(String::from_utf8_lossy(self.counted_bytes()?).into_owned())
    }
}

impl Keytab {
    /// Decode an MIT-format keytab: file format version 0x0502, then a
    /// sequence of 4-byte signed length-prefixed records; a negative
    /// length marks a deleted/hole entry.
    pub fn decode(data: &[u8]) -> Result<Self, KeytabDecodeError> {
        let mut c = Cursor::new(data);
        let magic = c.u16()?;
        if magic != KEYTAB_MAGIC {
            return Err(KeytabDecodeError::BadMagic(magic));
        }

        let mut entries = Vec::new();
        while c.remaining() >= 4 {
            let record_len = c.i32()?;
            if record_len < 0 {
                // Deleted/hole entry: skip its bytes verbatim.
                let _ = c.take((-record_len) as usize)?;
                continue;
            }
            let record_len = record_len as usize;
            let record_bytes = c.take(record_len)?;
            if let Some(entry) = decode_entry(record_bytes)? {
                entries.push(entry);
            }
        }

        Ok(Self { entries })
    }
}

fn decode_entry(record: &[u8]) -> Result<Option<KeytabEntry>, KeytabDecodeError> {
    let mut c = Cursor::new(record);

    let component_count = c.u16()?;
    let realm = c.counted_string()?;
    let mut components = Vec::with_capacity(component_count as usize);
    for _ in 0..component_count {
        components.push(c.counted_string()?);
    }

    let _name_type = c.u32()?;
    let timestamp = c.u32()?;
    let vno8 = c.u8()?;
    let enctype = Enctype::from_wire(c.u16()?);
    let key_bytes = c.counted_bytes()?.to_vec();

    // An optional trailing 32-bit key version number supersedes vno8 when
    // at least 4 bytes remain in the record.
    let kvno = if c.remaining() >= 4 {
        c.u32()?
    } else {
        vno8 as u32
    };

    Ok(Some(KeytabEntry {
        principal: Principal { components, realm },
        kvno,
        enctype,
        key_bytes,
        timestamp,
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn push_counted(buf: &mut Vec<u8>, s: &[u8]) {
        buf.extend_from_slice(&(s.len() as u16).to_be_bytes());
        buf.extend_from_slice(s);
    }

    fn encode_entry(
        realm: &str,
        components: &[&str],
        enctype: u16,
        key: &[u8],
        kvno: u32,
    ) -> Vec<u8> {
        let mut rec = Vec::new();
        rec.extend_from_slice(&(components.len() as u16).to_be_bytes());
        push_counted(&mut rec, realm.as_bytes());
        for comp in components {
            push_counted(&mut rec, comp.as_bytes());
        }
        rec.extend_from_slice(&1u32.to_be_bytes()); // name_type
        rec.extend_from_slice(&0u32.to_be_bytes()); // timestamp
        rec.push(kvno as u8); // vno8
        rec.extend_from_slice(&enctype.to_be_bytes());
        push_counted(&mut rec, key);
        rec.extend_from_slice(&kvno.to_be_bytes()); // trailing 32-bit vno
        rec
    }

    /// Build a minimal, well-formed keytab with a single
    /// `HTTP/vault.test.com@TEST.COM` AES256 entry, for use across the
    /// test suite.
    pub fn sample_keytab_bytes() -> Vec<u8> {
        sample_keytab_bytes_with_key(&[0x11; 32])
    }

    pub fn sample_keytab_bytes_with_key(key: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&KEYTAB_MAGIC.to_be_bytes());
        let entry = encode_entry(
            "TEST.COM",
            &["HTTP", "vault.test.com"],
            Enctype::AES256_CTS_HMAC_SHA1_96,
            key,
            1,
        );
        buf.extend_from_slice(&(entry.len() as i32).to_be_bytes());
        buf.extend_from_slice(&entry);
        buf
    }

    #[test]
    fn decodes_single_entry() {
        let keytab = Keytab::decode(&sample_keytab_bytes()).unwrap();
        assert_eq!(keytab.entries.len(), 1);
        let entry = &keytab.entries[0];
        assert_eq!(entry.principal.realm, "TEST.COM");
        assert_eq!(entry.principal.components, vec!["HTTP", "vault.test.com"]);
        assert_eq!(entry.enctype, Enctype::Aes256CtsHmacSha196);
        assert_eq!(entry.kvno, 1);
    }

    #[test]
    fn skips_deleted_holes() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&KEYTAB_MAGIC.to_be_bytes());
        // A hole entry of 8 zero bytes, followed by a real entry.
        buf.extend_from_slice(&(-8i32).to_be_bytes());
        buf.extend_from_slice(&[0u8; 8]);
        let entry = encode_entry("TEST.COM", &["HTTP", "vault.test.com"], Enctype::RC4_HMAC, &[0x22; 16], 3);
        buf.extend_from_slice(&(entry.len() as i32).to_be_bytes());
        buf.extend_from_slice(&entry);

        let keytab = Keytab::decode(&buf).unwrap();
        assert_eq!(keytab.entries.len(), 1);
        assert_eq!(keytab.entries[0].enctype, Enctype::Rc4Hmac);
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = vec![0u8, 0u8];
        assert!(Keytab::decode(&buf).is_err());
    }
}
