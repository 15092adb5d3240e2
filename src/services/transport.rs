use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;

use crate::domains::record::MailboxRecord;
use crate::error::{MailboxError, Result};
use crate::interfaces::transport::MailboxTransport;

pub const DEFAULT_BASE_URL: &str = "https://dweet.io";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct DweetReply {
    this: String,
    #[serde(default)]
    with: Value,
    #[serde(default)]
    because: Option<String>,
}

impl DweetReply {
    fn succeeded(&self) -> bool {
        self.this == "succeeded"
    }

    fn not_found(&self) -> bool {
        self.with.as_u64() == Some(404)
            || self
                .because
                .as_deref()
                .is_some_and(|reason| reason.contains("couldn't find"))
    }

    fn failure(&self) -> String {
        self.because
            .clone()
            .unwrap_or_else(|| format!("store replied '{}'", self.this))
    }
}

/// HTTP adapter for dweet.io and stores speaking the same JSON API.
pub struct DweetTransport {
    client: reqwest::Client,
    base_url: String,
}

impl DweetTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(MailboxError::Config("Missing base_url".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MailboxError::Config(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, route: &str, mailbox: &str) -> String {
        format!(
            "{}/{route}/{}",
            self.base_url,
            urlencoding::encode(mailbox)
        )
    }

    async fn read_reply(response: reqwest::Response) -> Result<DweetReply> {
        let text = response
            .text()
            .await
            .map_err(|e| MailboxError::Transport(e.to_string()))?;
        serde_json::from_str(&text)
            .map_err(|e| MailboxError::Transport(format!("unexpected store reply: {e}")))
    }
}

#[async_trait]
impl MailboxTransport for DweetTransport {
    async fn publish(&self, mailbox: &str, envelope: &str) -> Result<MailboxRecord> {
        let url = self.url("dweet/for", mailbox);
        debug!(%url, "publishing envelope");
        let response = self
            .client
            .post(&url)
            .json(&MailboxRecord::content_for(envelope))
            .send()
            .await
            .map_err(|e| MailboxError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MailboxError::Transport(format!(
                "store returned HTTP {}",
                status.as_u16()
            )));
        }
        let reply = Self::read_reply(response).await?;
        if !reply.succeeded() {
            return Err(MailboxError::Transport(reply.failure()));
        }
        serde_json::from_value(reply.with)
            .map_err(|e| MailboxError::Transport(format!("unexpected publish record: {e}")))
    }

    async fn poll(&self, mailbox: &str) -> Result<Option<MailboxRecord>> {
        let url = self.url("get/latest/dweet/for", mailbox);
        debug!(%url, "polling mailbox");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MailboxError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(MailboxError::Transport(format!(
                "store returned HTTP {}",
                status.as_u16()
            )));
        }
        let reply = Self::read_reply(response).await?;
        if !reply.succeeded() {
            if reply.not_found() {
                return Ok(None);
            }
            return Err(MailboxError::Transport(reply.failure()));
        }
        let first = match reply.with {
            Value::Array(mut records) if !records.is_empty() => records.swap_remove(0),
            Value::Array(_) => return Ok(None),
            other => other,
        };
        serde_json::from_value(first)
            .map(Some)
            .map_err(|e| MailboxError::Transport(format!("unexpected poll record: {e}")))
    }
}

/// In-process store keyed by mailbox. Sessions sharing one instance see each other's writes.
pub struct MemoryTransport {
    records: Mutex<HashMap<String, MailboxRecord>>,
    transactions: Mutex<u64>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            transactions: Mutex::new(0),
        }
    }

    /// Replaces a mailbox's record verbatim, as a third party writing to the store would.
    pub fn insert_record(&self, record: MailboxRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| MailboxError::Transport("memory store poisoned".to_string()))?;
        records.insert(record.thing.clone(), record);
        Ok(())
    }

    fn next_transaction(&self) -> Result<String> {
        let mut counter = self
            .transactions
            .lock()
            .map_err(|_| MailboxError::Transport("memory store poisoned".to_string()))?;
        *counter += 1;
        Ok(format!("tx-{}", *counter))
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailboxTransport for MemoryTransport {
    async fn publish(&self, mailbox: &str, envelope: &str) -> Result<MailboxRecord> {
        let created = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| MailboxError::Transport(e.to_string()))?;
        let record = MailboxRecord {
            thing: mailbox.to_string(),
            created: Some(created),
            content: MailboxRecord::content_for(envelope),
            transaction: Some(self.next_transaction()?),
        };
        self.insert_record(record.clone())?;
        debug!(mailbox, "stored envelope in memory");
        Ok(record)
    }

    async fn poll(&self, mailbox: &str) -> Result<Option<MailboxRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| MailboxError::Transport("memory store poisoned".to_string()))?;
        Ok(records.get(mailbox).cloned())
    }
}
