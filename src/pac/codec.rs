//! Parsing a PAC buffer table and its typed buffers, and re-serializing
//! the PAC with signature payloads zeroed for HMAC input.
//!
//! `LOGON_INFO`'s trailing character-string fields (EffectiveName,
//! LogonDomainName, the domain SID) are, in a real PAC, NDR-encoded with
//! conformant/varying arrays and referent pointers. Reproducing full NDR
//! is out of scope for this core; this codec instead reads them as a
//! simple, explicit sequence of `u16`-length-prefixed UTF-8 strings
//! immediately following the fixed-width fields and the group RID array.
//! Buffers too short to carry any of these fields simply yield `None` /
//! empty values, matching "may be empty on minimal inputs".

use std::fmt;

use jiff::Timestamp;

/// Buffer type codes the core understands; anything else is kept as
/// `Unknown` rather than silently dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacBufferType {
    LogonInfo,
    ServerChecksum,
    PrivsvrChecksum,
    UpnDnsInfo,
    Unknown(u32),
}

impl PacBufferType {
    pub const LOGON_INFO: u32 = 1;
    pub const SERVER_CHECKSUM: u32 = 6;
    pub const PRIVSVR_CHECKSUM: u32 = 7;
    pub const UPN_DNS_INFO: u32 = 12;

    fn from_wire(value: u32) -> Self {
        match value {
            Self::LOGON_INFO => Self::LogonInfo,
            Self::SERVER_CHECKSUM => Self::ServerChecksum,
            Self::PRIVSVR_CHECKSUM => Self::PrivsvrChecksum,
            Self::UPN_DNS_INFO => Self::UpnDnsInfo,
            other => Self::Unknown(other),
        }
    }
}

/// Microsoft `PAC_SIGNATURE_DATA` checksum type numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    HmacMd5,
    HmacSha1Aes128,
    HmacSha1Aes256,
    Unknown(u32),
}

impl SignatureAlgorithm {
    pub const HMAC_MD5: u32 = 0xFFFF_FF76;
    pub const HMAC_SHA1_96_AES128: u32 = 0x0000_000F;
    pub const HMAC_SHA1_96_AES256: u32 = 0x0000_0010;

    pub fn from_wire(value: u32) -> Self {
        match value {
            Self::HMAC_MD5 => Self::HmacMd5,
            Self::HMAC_SHA1_96_AES128 => Self::HmacSha1Aes128,
            Self::HMAC_SHA1_96_AES256 => Self::HmacSha1Aes256,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub algorithm_type: u32,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct LogonInfo {
    pub logon_time: Timestamp,
    pub user_rid: u32,
    pub primary_group_rid: u32,
    pub group_rids: Vec<u32>,
    pub effective_name: String,
    pub logon_domain_name: String,
    /// The textual domain SID (e.g. `"S-1-5-21-..."`), when the buffer
    /// carried one; absent means group SIDs cannot be synthesized
    /// (`DOMAIN_SID_UNKNOWN`).
    pub logon_domain_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpnDnsInfo {
    pub upn: String,
    pub dns_domain: String,
}

/// One parsed PAC buffer: a typed payload, or the raw bytes for types the
/// core doesn't interpret.
#[derive(Debug, Clone)]
pub enum PacBuffer {
    LogonInfo(LogonInfo),
    ServerChecksum(Signature),
    PrivsvrChecksum(Signature),
    UpnDnsInfo(UpnDnsInfo),
    Unknown { buffer_type: u32, bytes: Vec<u8> },
}

/// A single buffer-level parse failure; recorded and skipped rather than
/// aborting the whole PAC.
#[derive(Debug, Clone)]
pub struct PacParseError {
    pub buffer_type: u32,
    pub message: String,
}

impl fmt::Display for PacParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer type {}: {}", self.buffer_type, self.message)
    }
}

/// A parsed PAC: the successfully decoded buffers, plus any per-buffer
/// errors encountered along the way.
#[derive(Debug, Clone, Default)]
pub struct Pac {
    pub buffers: Vec<PacBuffer>,
    pub errors: Vec<PacParseError>,
}

impl Pac {
    pub fn logon_info(&self) -> Option<&LogonInfo> {
        self.buffers.iter().find_map(|b| match b {
            PacBuffer::LogonInfo(info) => Some(info),
            _ => None,
        })
    }

    pub fn upn_dns_info(&self) -> Option<&UpnDnsInfo> {
        self.buffers.iter().find_map(|b| match b {
            PacBuffer::UpnDnsInfo(info) => Some(info),
            _ => None,
        })
    }

    pub fn server_checksum(&self) -> Option<&Signature> {
        self.buffers.iter().find_map(|b| match b {
            PacBuffer::ServerChecksum(sig) => Some(sig),
            _ => None,
        })
    }

    pub fn privsvr_checksum(&self) -> Option<&Signature> {
        self.buffers.iter().find_map(|b| match b {
            PacBuffer::PrivsvrChecksum(sig) => Some(sig),
            _ => None,
        })
    }
}

/// Maximum number of buffer descriptors the header may declare.
const MAX_BUFFER_COUNT: u32 = 100;

struct Descriptor {
    buffer_type: u32,
    size: u32,
    offset: u64,
}

fn read_u32_le(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at + 4).map(|s| u32::from_le_bytes(s.try_into().unwrap()))
}

fn read_u64_le(data: &[u8], at: usize) -> Option<u64> {
    data.get(at..at + 8).map(|s| u64::from_le_bytes(s.try_into().unwrap()))
}

fn read_u16_le(data: &[u8], at: usize) -> Option<u16> {
    data.get(at..at + 2).map(|s| u16::from_le_bytes(s.try_into().unwrap()))
}

/// Parse the PAC buffer table and every typed buffer it describes.
pub fn parse(data: &[u8]) -> Result<Pac, PacParseError> {
    let count = read_u32_le(data, 0).ok_or_else(|| top_level_error("truncated header"))?;
    if count == 0 || count > MAX_BUFFER_COUNT {
        return Err(top_level_error("buffer count out of bounds"));
    }

    let mut descriptors = Vec::with_capacity(count as usize);
    for i in 0..count {
        let base = 4 + (i as usize) * 16;
        let buffer_type =
            read_u32_le(data, base).ok_or_else(|| top_level_error("truncated descriptor"))?;
        let size =
            read_u32_le(data, base + 4).ok_or_else(|| top_level_error("truncated descriptor"))?;
        let offset =
            read_u64_le(data, base + 8).ok_or_else(|| top_level_error("truncated descriptor"))?;
        descriptors.push(Descriptor {
            buffer_type,
            size,
            offset,
        });
    }

    let mut pac = Pac::default();
    for d in descriptors {
        match parse_buffer(data, &d) {
            Ok(buffer) => pac.buffers.push(buffer),
            Err(err) => pac.errors.push(err),
        }
    }
    Ok(pac)
}

fn top_level_error(message: &str) -> PacParseError {
    PacParseError {
        buffer_type: 0,
        message: message.to_string(),
    }
}

fn parse_buffer(data: &[u8], d: &Descriptor) -> Result<PacBuffer, PacParseError> {
    let offset = usize::try_from(d.offset).map_err(|_| oob(d))?;
    let size = d.size as usize;
    let end = offset.checked_add(size).ok_or_else(|| oob(d))?;
    if end > data.len() {
        return Err(oob(d));
    }
    let buf = &data[offset..end];

    let kind = PacBufferType::from_wire(d.buffer_type);
    match kind {
        PacBufferType::LogonInfo => parse_logon_info(buf).map(PacBuffer::LogonInfo).map_err(|m| err(d, m)),
        PacBufferType::UpnDnsInfo => parse_upn_dns_info(buf).map(PacBuffer::UpnDnsInfo).map_err(|m| err(d, m)),
        PacBufferType::ServerChecksum => {
            parse_signature(buf).map(PacBuffer::ServerChecksum).map_err(|m| err(d, m))
        }
        PacBufferType::PrivsvrChecksum => {
            parse_signature(buf).map(PacBuffer::PrivsvrChecksum).map_err(|m| err(d, m))
        }
        PacBufferType::Unknown(_) => Ok(PacBuffer::Unknown {
            buffer_type: d.buffer_type,
            bytes: buf.to_vec(),
        }),
    }
}

fn oob(d: &Descriptor) -> PacParseError {
    err(d, "buffer offset/size exceeds PAC length".to_string())
}

fn err(d: &Descriptor, message: String) -> PacParseError {
    PacParseError {
        buffer_type: d.buffer_type,
        message,
    }
}

/// FILETIME (100ns ticks since 1601-01-01 UTC) to Unix time. A zero
/// FILETIME maps to the Unix epoch rather than the arithmetic
/// (very negative) result.
pub fn filetime_to_timestamp(filetime: u64) -> Timestamp {
    if filetime == 0 {
        return Timestamp::UNIX_EPOCH;
    }
    let unix_seconds = (filetime / 10_000_000) as i64 - 11_644_473_600;
    Timestamp::from_second(unix_seconds).unwrap_or(Timestamp::UNIX_EPOCH)
}

fn parse_logon_info(buf: &[u8]) -> Result<LogonInfo, String> {
    if buf.len() < 20 {
        return Err("logon info buffer shorter than 20 bytes".to_string());
    }
    let filetime = read_u64_le(buf, 0).unwrap();
    let user_rid = read_u32_le(buf, 8).unwrap();
    let primary_group_rid = read_u32_le(buf, 12).unwrap();
    let group_count = read_u32_le(buf, 16).unwrap();

    let mut group_rids = Vec::new();
    let mut cursor = 20usize;
    if group_count > 0 {
        let needed = (group_count as usize).saturating_mul(4);
        if buf.len() >= cursor + needed {
            for i in 0..group_count as usize {
                group_rids.push(read_u32_le(buf, cursor + i * 4).unwrap());
            }
            cursor += needed;
        }
        // If the buffer is too short to carry the declared RIDs, we leave
        // `group_rids` empty rather than erroring: the header fields
        // above are still meaningful on their own.
    }

    let effective_name = read_trailing_string(buf, &mut cursor).unwrap_or_default();
    let logon_domain_name = read_trailing_string(buf, &mut cursor).unwrap_or_default();
    let logon_domain_id = read_trailing_string(buf, &mut cursor);

    Ok(LogonInfo {
        logon_time: filetime_to_timestamp(filetime),
        user_rid,
        primary_group_rid,
        group_rids,
        effective_name,
        logon_domain_name,
        logon_domain_id,
    })
}

/// Read one `u16`-length-prefixed UTF-8 string at `*cursor`, advancing it.
/// Returns `None` (without error) if fewer than 2 bytes remain.
fn read_trailing_string(buf: &[u8], cursor: &mut usize) -> Option<String> {
    let len = read_u16_le(buf, *cursor)? as usize;
    let start = *cursor + 2;
    let end = start.checked_add(len)?;
    let bytes = buf.get(start..end)?;
    *cursor = end;
    Some(String::from_utf8_lossy(bytes).into_owned())
}

fn parse_upn_dns_info(buf: &[u8]) -> Result<UpnDnsInfo, String> {
    if buf.len() < 4 {
        return Err("upn/dns info buffer shorter than 4 bytes".to_string());
    }
    let upn_length = read_u16_le(buf, 0).unwrap() as usize;
    let dns_length = read_u16_le(buf, 2).unwrap() as usize;

    let upn_start = 4;
    let upn_end = upn_start.checked_add(upn_length).ok_or("upn length overflow")?;
    let dns_start = upn_end;
    let dns_end = dns_start.checked_add(dns_length).ok_or("dns length overflow")?;

    let upn_bytes = buf
        .get(upn_start..upn_end)
        .ok_or("upn field exceeds buffer")?;
    let dns_bytes = buf
        .get(dns_start..dns_end)
        .ok_or("dns field exceeds buffer")?;

    Ok(UpnDnsInfo {
        upn: decode_utf16le(upn_bytes),
        dns_domain: decode_utf16le(dns_bytes),
    })
}

fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Parse a signature buffer: `algorithm_type:u32`, a declared `size:u32`,
/// then `declared_size - 8` bytes of signature.
fn parse_signature(buf: &[u8]) -> Result<Signature, String> {
    if buf.len() < 8 {
        return Err("signature buffer shorter than 8 bytes".to_string());
    }
    let algorithm_type = read_u32_le(buf, 0).unwrap();
    let declared_size = read_u32_le(buf, 4).unwrap() as usize;
    if declared_size < 8 {
        return Err("declared signature size below minimum".to_string());
    }
    if declared_size > buf.len() {
        return Err("declared signature size exceeds buffer length".to_string());
    }
    let bytes = buf[8..declared_size].to_vec();
    Ok(Signature {
        algorithm_type,
        bytes,
    })
}

/// Re-serialize `data` for HMAC input: the descriptor table is kept
/// as-is, and the signature payload region of every `SERVER_CHECKSUM`
/// / `PRIVSVR_CHECKSUM` buffer is overwritten with zeros.
///
/// Idempotent: calling this twice on its own output yields the same
/// bytes, since the signature region is already zero the second time.
pub fn zero_signatures(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();

    let Some(count) = read_u32_le(data, 0) else {
        return out;
    };
    if count == 0 || count > MAX_BUFFER_COUNT {
        return out;
    }

    for i in 0..count {
        let base = 4 + (i as usize) * 16;
        let (Some(buffer_type), Some(size), Some(offset)) = (
            read_u32_le(data, base),
            read_u32_le(data, base + 4),
            read_u64_le(data, base + 8),
        ) else {
            continue;
        };
        if buffer_type != PacBufferType::SERVER_CHECKSUM && buffer_type != PacBufferType::PRIVSVR_CHECKSUM {
            continue;
        }
        let Ok(offset) = usize::try_from(offset) else {
            continue;
        };
        let size = size as usize;
        let Some(end) = offset.checked_add(size) else {
            continue;
        };
        if end > data.len() || size < 8 {
            continue;
        }
        // Zero only the signature payload (after algorithm_type + the
        // declared-size field), mirroring `parse_signature`.
        let declared_size = read_u32_le(data, offset + 4).unwrap_or(size as u32) as usize;
        let declared_size = declared_size.min(size);
        if declared_size < 8 {
            continue;
        }
        let zero_start = offset + 8;
        let zero_end = (offset + declared_size).min(data.len());
        if zero_end > zero_start {
            out[zero_start..zero_end].fill(0);
        }
    }

    out
}
