pub mod config;
pub mod domains;
pub mod envelope;
pub mod error;
pub mod interfaces;
pub mod services;

pub use crate::config::MailboxConfig;
pub use crate::domains::message::{Message, PayloadExpectation};
pub use crate::envelope::key::{IvPolicy, KeyDerivation, SharedSecret};
pub use crate::envelope::EnvelopeCodec;
pub use crate::error::{MailboxError, Result};
pub use crate::services::mailbox::{Exchanged, MailboxSession, SessionOptions};
