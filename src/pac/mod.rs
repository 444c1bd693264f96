//! PAC binary parsing, re-serialization, and signature/consistency
//! verification.

mod codec;
mod verifier;

pub use codec::{
    parse, zero_signatures, Pac, PacBuffer, PacBufferType, PacParseError, LogonInfo, Signature, UpnDnsInfo,
};
pub use verifier::{verify, PacValidationFlags, PacValidationResult};
