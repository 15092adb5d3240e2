use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("decoding error: {0}")]
    Decoding(String),
    #[error("replay suspected: {0}")]
    Replay(String),
}

impl MailboxError {
    /// Prefixes the message with the operation and mailbox it came from.
    /// The variant is preserved so callers can still match on the kind.
    pub fn with_context(self, operation: &str, mailbox: &str) -> Self {
        let wrap = |msg: String| format!("{operation} on mailbox '{mailbox}': {msg}");
        match self {
            MailboxError::Config(msg) => MailboxError::Config(wrap(msg)),
            MailboxError::Transport(msg) => MailboxError::Transport(wrap(msg)),
            MailboxError::Encoding(msg) => MailboxError::Encoding(wrap(msg)),
            MailboxError::Decoding(msg) => MailboxError::Decoding(wrap(msg)),
            MailboxError::Replay(msg) => MailboxError::Replay(wrap(msg)),
        }
    }
}

pub type Result<T> = std::result::Result<T, MailboxError>;
