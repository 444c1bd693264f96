//! Core of a gMSA-backed Kerberos/SPNEGO authentication plugin.
//!
//! This crate implements the subsystem described as "the core" of the
//! plugin: accepting a SPNEGO/AP-REQ token against a service keytab,
//! parsing and verifying the ticket's embedded PAC, and authorizing the
//! resulting identity against an operator-defined role. The outer plugin
//! framework (HTTP routing, persistent key/value storage, keytab rotation
//! scheduling) is modeled here as a concrete, in-process implementation of
//! the small interfaces the core actually needs, so the whole thing can be
//! built and exercised as one binary.

pub mod authorize;
pub mod center;
pub mod config;
pub mod error;
pub mod http;
pub mod kerberos;
pub mod keytab;
pub mod log;
pub mod login;
pub mod metrics;
pub mod pac;
pub mod redact;
pub mod role;
pub mod store;
pub mod validator;

pub use crate::center::Center;
pub use crate::config::Config;
pub use crate::error::{CoreError, ErrorKind};
pub use crate::role::Role;
