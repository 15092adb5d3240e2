use async_trait::async_trait;

use crate::domains::record::MailboxRecord;
use crate::error::Result;

/// A store holding one latest value per mailbox.
#[async_trait]
pub trait MailboxTransport: Send + Sync {
    /// Writes `envelope` as the mailbox's current value and returns the store's acknowledgement.
    async fn publish(&self, mailbox: &str, envelope: &str) -> Result<MailboxRecord>;

    /// Fetches the mailbox's current record; `None` when nothing was ever written.
    async fn poll(&self, mailbox: &str) -> Result<Option<MailboxRecord>>;
}
