//! Kerberos/SPNEGO plumbing: a minimal DER reader, the RFC 4120 ticket
//! types it decodes, enctype decryption, the replay cache, and the
//! SPNEGO acceptor that ties them together.

pub(crate) mod crypto;
pub(crate) mod der;
mod replay;
pub(crate) mod spnego;
pub(crate) mod ticket;

pub use crypto::{decrypt, KEY_USAGE_AP_REQ_AUTHENTICATOR, KEY_USAGE_TICKET};
pub use replay::ReplayCache;
pub use spnego::{accept, AcceptedContext, AcceptorConfig};
pub use ticket::{ApReq, Authenticator, EncTicketPart, EncryptedData, EncryptionKey, PrincipalName, Ticket};
