//! Mailbox access and message decoding.
//!
//! The client half talks IMAP and knows nothing about alerts; the decoder
//! half turns raw RFC 5322 bytes into the plain text the extractor works on.

pub mod client;
pub mod decoder;
pub mod error;

pub use client::{ImapConnector, ImapSession, MailboxConnector, MailboxSession};
pub use decoder::{decode_subject, extract_body, extract_body_from_raw};
pub use error::EmailError;
