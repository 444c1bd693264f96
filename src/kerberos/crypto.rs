//! Kerberos enctype decryption: RC4-HMAC (RFC 4757) and
//! AES-CTS-HMAC-SHA1-96 (RFC 3962/3961), the two enctypes a gMSA's
//! keytab realistically carries.
//!
//! `ring` (the crate's usual crypto dependency) deliberately omits
//! MD4/MD5/RC4 and raw CBC, so enctype handling goes through RustCrypto
//! (`aes`, `cbc`, `hmac`, `sha1`, `md-5`, `rc4`) instead; constant-time
//! comparisons still go through `ring::constant_time`.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256};
use hmac::{Hmac, Mac};
use md5::Md5;
use rc4::{KeyInit as Rc4KeyInit, Rc4, StreamCipher};
use ring::constant_time::verify_slices_are_equal;
use sha1::Sha1;

use crate::error::CoreError;
use crate::keytab::Enctype;

pub const KEY_USAGE_TICKET: u32 = 2;
pub const KEY_USAGE_AP_REQ_AUTHENTICATOR: u32 = 11;

const AES_BLOCK_SIZE: usize = 16;

/// Decrypt `ciphertext` (an `EncryptedData.cipher` value) under `key`
/// for the given key usage, returning the inner plaintext with its
/// confounder stripped.
pub fn decrypt(enctype: Enctype, key: &[u8], usage: u32, ciphertext: &[u8]) -> Result<Vec<u8>, CoreError> {
    match enctype {
        Enctype::Rc4Hmac => rc4_hmac_decrypt(key, usage, ciphertext),
        Enctype::Aes128CtsHmacSha196 => aes_cts_hmac_decrypt::<Aes128>(key, usage, ciphertext, 16),
        Enctype::Aes256CtsHmacSha196 => aes_cts_hmac_decrypt::<Aes256>(key, usage, ciphertext, 32),
        Enctype::Unknown(_) => Err(CoreError::kerberos("kerberos negotiation failed")
            .with_detail("unsupported enctype on decrypt")),
    }
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// RFC 3961 §5.1 n-fold: replicate/rotate `input` until its length is
/// `lcm(len(input), out_len)` bits, then ones'-complement-add the
/// `out_len`-byte chunks together.
fn nfold(input: &[u8], out_len: usize) -> Vec<u8> {
    let in_len = input.len();
    let l = in_len / gcd(in_len, out_len) * out_len;
    let mut out = vec![0u8; out_len];
    let mut carry: i32 = 0;

    for i in (0..l).rev() {
        let msbit = ((in_len * 8) - 1 + (((in_len * 8) + 13) * (i / in_len)) + (in_len - (i % in_len)) * 8)
            % (in_len * 8);
        let hi = input[((in_len - 1) - (msbit >> 3)) % in_len] as u32;
        let lo = input[(in_len - (msbit >> 3)) % in_len] as u32;
        let combined = (hi << 8) | lo;
        let byte_val = (combined >> ((msbit & 7) + 1)) & 0xff;

        let mut acc = byte_val as i32 + carry;
        acc += out[i % out_len] as i32;
        out[i % out_len] = (acc & 0xff) as u8;
        carry = acc >> 8;
    }

    if carry != 0 {
        let mut acc = carry;
        for slot in out.iter_mut().rev() {
            acc += *slot as i32;
            *slot = (acc & 0xff) as u8;
            acc >>= 8;
        }
    }

    out
}

fn aes_ecb_block<C: BlockEncrypt + KeyInit>(key: &[u8], block: &[u8; AES_BLOCK_SIZE]) -> [u8; AES_BLOCK_SIZE] {
    let cipher = C::new(GenericArray::from_slice(key));
    let mut buf = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut buf);
    buf.into()
}

/// RFC 3961 §5.2 `DR`/`DK`: derive a `key_size`-byte key from `base_key`
/// for the 5-octet usage constant `usage_be || suffix`.
fn derive_key<C: BlockEncrypt + KeyInit>(base_key: &[u8], usage: u32, suffix: u8, key_size: usize) -> Vec<u8> {
    let mut constant = Vec::with_capacity(5);
    constant.extend_from_slice(&usage.to_be_bytes());
    constant.push(suffix);
    let mut block: [u8; AES_BLOCK_SIZE] = nfold(&constant, AES_BLOCK_SIZE).try_into().unwrap();

    let mut out = Vec::with_capacity(key_size);
    while out.len() < key_size {
        block = aes_ecb_block::<C>(base_key, &block);
        out.extend_from_slice(&block);
    }
    out.truncate(key_size);
    out
}

type HmacSha1 = Hmac<Sha1>;

fn hmac_sha1(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Ciphertext-stealing AES-CBC decrypt (CTS, "CS3" variant, RFC 3962
/// §6): the final two ciphertext blocks are swapped so the output is
/// exactly as long as the input, with no block-size padding.
fn cts_decrypt<C: BlockDecrypt + KeyInit>(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CoreError> {
    let n = ciphertext.len();
    if n < AES_BLOCK_SIZE {
        return Err(invalid_ciphertext());
    }
    let cipher = C::new(GenericArray::from_slice(key));
    let r = n % AES_BLOCK_SIZE;

    if r == 0 {
        // Exact multiple of the block size: plain CBC, no stealing.
        let mut iv = [0u8; AES_BLOCK_SIZE];
        let mut out = Vec::with_capacity(n);
        for block in ciphertext.chunks_exact(AES_BLOCK_SIZE) {
            let mut buf = GenericArray::clone_from_slice(block);
            cipher.decrypt_block(&mut buf);
            for (b, iv_b) in buf.iter_mut().zip(iv.iter()) {
                *b ^= iv_b;
            }
            out.extend_from_slice(&buf);
            iv.copy_from_slice(block);
        }
        return Ok(out);
    }

    let full_blocks_len = n - AES_BLOCK_SIZE - r;
    let (leading, tail) = ciphertext.split_at(full_blocks_len);
    let (e_n, e_trunc) = tail.split_at(AES_BLOCK_SIZE);

    let mut d_n_full = GenericArray::clone_from_slice(e_n);
    cipher.decrypt_block(&mut d_n_full);

    let mut c_prev = vec![0u8; AES_BLOCK_SIZE];
    c_prev[..r].copy_from_slice(e_trunc);
    c_prev[r..].copy_from_slice(&d_n_full[r..]);

    let mut p_n = vec![0u8; r];
    for i in 0..r {
        p_n[i] = d_n_full[i] ^ e_trunc[i];
    }

    let mut d_prev_full = GenericArray::clone_from_slice(&c_prev);
    cipher.decrypt_block(&mut d_prev_full);

    let mut iv = [0u8; AES_BLOCK_SIZE];
    let mut out = Vec::with_capacity(n);
    for block in leading.chunks_exact(AES_BLOCK_SIZE) {
        let mut buf = GenericArray::clone_from_slice(block);
        cipher.decrypt_block(&mut buf);
        for (b, iv_b) in buf.iter_mut().zip(iv.iter()) {
            *b ^= iv_b;
        }
        out.extend_from_slice(&buf);
        iv.copy_from_slice(block);
    }
    let p_prev: Vec<u8> = d_prev_full.iter().zip(iv.iter()).map(|(b, i)| b ^ i).collect();
    out.extend_from_slice(&p_prev);
    out.extend_from_slice(&p_n);

    Ok(out)
}

/// Ciphertext-stealing AES-CBC encrypt, the inverse of [`cts_decrypt`].
/// Used only by this module's own round-trip tests.
#[cfg(test)]
fn cts_encrypt<C: BlockEncrypt + KeyInit>(key: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let n = plaintext.len();
    assert!(n >= AES_BLOCK_SIZE, "CTS requires at least one full block");
    let cipher = C::new(GenericArray::from_slice(key));
    let r = n % AES_BLOCK_SIZE;

    if r == 0 {
        let mut iv = [0u8; AES_BLOCK_SIZE];
        let mut out = Vec::with_capacity(n);
        for block in plaintext.chunks_exact(AES_BLOCK_SIZE) {
            let mut buf = [0u8; AES_BLOCK_SIZE];
            for i in 0..AES_BLOCK_SIZE {
                buf[i] = block[i] ^ iv[i];
            }
            let mut ga = GenericArray::clone_from_slice(&buf);
            cipher.encrypt_block(&mut ga);
            out.extend_from_slice(&ga);
            iv.copy_from_slice(&ga);
        }
        return out;
    }

    let mut padded = plaintext.to_vec();
    padded.resize(n + (AES_BLOCK_SIZE - r), 0);

    let mut iv = [0u8; AES_BLOCK_SIZE];
    let mut blocks = Vec::new();
    for block in padded.chunks_exact(AES_BLOCK_SIZE) {
        let mut buf = [0u8; AES_BLOCK_SIZE];
        for i in 0..AES_BLOCK_SIZE {
            buf[i] = block[i] ^ iv[i];
        }
        let mut ga = GenericArray::clone_from_slice(&buf);
        cipher.encrypt_block(&mut ga);
        blocks.push(ga);
        iv.copy_from_slice(&ga);
    }

    let c_last: GenericArray<u8, _> = blocks.pop().unwrap();
    let c_second_last = blocks.pop().unwrap();

    let mut out = Vec::with_capacity(n);
    for b in &blocks {
        out.extend_from_slice(b);
    }
    out.extend_from_slice(&c_last);
    out.extend_from_slice(&c_second_last[..r]);
    out
}

/// AES-CTS-HMAC-SHA1-96 decrypt (RFC 3962): `Ke`/`Ki` derived per RFC
/// 3961, CBC-CTS decrypt under `Ke`, HMAC-SHA1-96 integrity check under
/// `Ki` over the recovered plaintext.
fn aes_cts_hmac_decrypt<C: BlockEncrypt + BlockDecrypt + KeyInit>(
    base_key: &[u8],
    usage: u32,
    ciphertext: &[u8],
    key_size: usize,
) -> Result<Vec<u8>, CoreError> {
    if ciphertext.len() < 12 + AES_BLOCK_SIZE {
        return Err(invalid_ciphertext());
    }
    let (cts_bytes, mac) = ciphertext.split_at(ciphertext.len() - 12);

    let ke = derive_key::<C>(base_key, usage, 0xAA, key_size);
    let ki = derive_key::<C>(base_key, usage, 0x55, key_size);

    let plaintext = cts_decrypt::<C>(&ke, cts_bytes)?;

    let expected_mac = &hmac_sha1(&ki, &plaintext)[..12];
    if verify_slices_are_equal(expected_mac, mac).is_err() {
        return Err(CoreError::kerberos("kerberos negotiation failed")
            .with_detail("AP-REQ integrity check failed (AES-CTS-HMAC)"));
    }

    if plaintext.len() < AES_BLOCK_SIZE {
        return Err(invalid_ciphertext());
    }
    Ok(plaintext[AES_BLOCK_SIZE..].to_vec())
}

type HmacMd5 = Hmac<Md5>;

fn hmac_md5(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacMd5::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

const RC4_CONFOUNDER_LEN: usize = 8;

/// RC4-HMAC decrypt (RFC 4757 §3). Note: this implementation uses the
/// RFC 4120 key usage numbers directly; it does not apply the legacy
/// usage-number translation RFC 4757 §7.2 describes for interop with
/// Windows' original (pre-RFC) RC4-HMAC implementation.
fn rc4_hmac_decrypt(key: &[u8], usage: u32, ciphertext: &[u8]) -> Result<Vec<u8>, CoreError> {
    if ciphertext.len() < 16 + RC4_CONFOUNDER_LEN {
        return Err(invalid_ciphertext());
    }
    let (checksum, rc4_cipher) = ciphertext.split_at(16);

    let k1 = hmac_md5(key, &usage.to_le_bytes());
    let k3 = hmac_md5(&k1, checksum);

    let mut plaintext = rc4_cipher.to_vec();
    let mut cipher =
        Rc4::new_from_slice(&k3).map_err(|_| CoreError::internal("invalid RC4 key length"))?;
    cipher.apply_keystream(&mut plaintext);

    let expected_checksum = hmac_md5(&k1, &plaintext);
    if verify_slices_are_equal(&expected_checksum, checksum).is_err() {
        return Err(CoreError::kerberos("kerberos negotiation failed")
            .with_detail("AP-REQ integrity check failed (RC4-HMAC)"));
    }

    if plaintext.len() < RC4_CONFOUNDER_LEN {
        return Err(invalid_ciphertext());
    }
    Ok(plaintext[RC4_CONFOUNDER_LEN..].to_vec())
}

fn invalid_ciphertext() -> CoreError {
    CoreError::kerberos("kerberos negotiation failed").with_detail("ciphertext shorter than minimum for enctype")
}
