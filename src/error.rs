//! The core's error taxonomy.
//!
//! Every failure path in this crate produces a [`CoreError`]: a safe,
//! terse message suitable for the caller, plus a [`ErrorKind`] used for
//! structured logging and metrics on the operator side. Nothing below
//! `CoreError::safe_message` is ever meant to reach a client.

use std::fmt;

/// The taxonomy of failures the core can produce.
///
/// Every error raised anywhere in the validator, verifier, keytab resolver,
/// or authorizer is tagged with exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Base64 decode failure, size limit exceeded, missing required field.
    InvalidInput,
    /// Login attempted before Config exists, or the named role is missing.
    NotConfigured,
    /// Ticket rejected, clock skew on the AP-REQ, unknown SPN, channel
    /// binding mismatch.
    KerberosFailure,
    /// PAC parsing or verification failed; see [`PacErrorKind`] for the
    /// specific subkind.
    PacError(PacErrorKind),
    /// Realm, SPN, or group-SID authorization check failed.
    AuthorizationDenied,
    /// Persistence I/O or other operator-only failure.
    Internal,
}

/// PAC-specific error subkinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacErrorKind {
    InvalidFormat,
    MissingSignature,
    SignatureInvalid,
    ClockSkew,
    UpnInconsistent,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput => f.write_str("invalid input"),
            Self::NotConfigured => f.write_str("not configured"),
            Self::KerberosFailure => f.write_str("kerberos failure"),
            Self::PacError(kind) => write!(f, "pac error ({kind})"),
            Self::AuthorizationDenied => f.write_str("authorization denied"),
            Self::Internal => f.write_str("internal"),
        }
    }
}

impl fmt::Display for PacErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat => f.write_str("invalid format"),
            Self::MissingSignature => f.write_str("missing signature"),
            Self::SignatureInvalid => f.write_str("signature invalid"),
            Self::ClockSkew => f.write_str("clock skew"),
            Self::UpnInconsistent => f.write_str("upn inconsistent"),
        }
    }
}

/// A two-layered core error: a [`ErrorKind`] for operator logs, and a safe
/// message for the caller.
///
/// The `Display` impl intentionally renders only `safe_message` so that
/// `format!("authentication failed: {err}")` can never leak internal
/// detail; call [`CoreError::kind`] to get the structured code for logging.
#[derive(Debug, Clone)]
pub struct CoreError {
    kind: ErrorKind,
    safe_message: String,
    /// Extra detail for operator logs only; never rendered by `Display`.
    internal_detail: Option<String>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, safe_message: impl Into<String>) -> Self {
        Self {
            kind,
            safe_message: safe_message.into(),
            internal_detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.internal_detail = Some(detail.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn safe_message(&self) -> &str {
        &self.safe_message
    }

    /// Full internal detail for operator logs, falling back to the safe
    /// message when no extra detail was attached.
    pub fn internal_detail(&self) -> &str {
        self.internal_detail.as_deref().unwrap_or(&self.safe_message)
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, msg)
    }

    pub fn not_configured(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotConfigured, msg)
    }

    pub fn kerberos(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::KerberosFailure, msg)
    }

    pub fn pac(subkind: PacErrorKind, msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::PacError(subkind), msg)
    }

    pub fn denied(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthorizationDenied, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, msg)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.safe_message)
    }
}

impl std::error::Error for CoreError {}
