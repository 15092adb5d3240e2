use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::MailboxConfig;
use crate::domains::message::{Message, PayloadExpectation};
use crate::domains::record::MailboxRecord;
use crate::envelope::key::{IvPolicy, KeyDerivation, SharedSecret};
use crate::envelope::{now_ms, EnvelopeCodec, OpenedEnvelope};
use crate::error::{MailboxError, Result};
use crate::interfaces::transport::MailboxTransport;
use crate::services::transport::DweetTransport;

/// Gap the original tool tolerated between sent-at and the store timestamp.
pub const RECOMMENDED_REPLAY_WINDOW: Duration = Duration::from_secs(10);

/// Per-session parameters. Nothing here is process-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub key_derivation: KeyDerivation,
    pub iv_policy: IvPolicy,
    pub expect: PayloadExpectation,
    /// Largest tolerated gap between the envelope's sent-at and the store's
    /// `created` timestamp. `None` (the default) leaves `created` unread.
    pub replay_window: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            key_derivation: KeyDerivation::default(),
            iv_policy: IvPolicy::default(),
            expect: PayloadExpectation::default(),
            replay_window: None,
        }
    }
}

/// A message this session sent or delivered, with the sender's timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchanged {
    pub message: Message,
    /// Milliseconds since the unix epoch, as sealed into the envelope header.
    pub sent_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SeenState {
    NoMessageSeen,
    MessageSeen(String),
}

impl SeenState {
    fn is_seen(&self, envelope: &str) -> bool {
        matches!(self, SeenState::MessageSeen(seen) if seen == envelope)
    }
}

/// One party's view of a mailbox.
///
/// `get_new` is edge-triggered: each distinct envelope is reported at most once per
/// session, comparing envelope strings rather than store timestamps.
pub struct MailboxSession {
    mailbox: String,
    codec: EnvelopeCodec,
    transport: Arc<dyn MailboxTransport>,
    options: SessionOptions,
    seen: SeenState,
    last_sent: Option<Exchanged>,
    last_received: Option<Exchanged>,
}

impl MailboxSession {
    pub fn new(
        mailbox: &str,
        secret: &SharedSecret,
        transport: Arc<dyn MailboxTransport>,
        options: SessionOptions,
    ) -> Result<Self> {
        if mailbox.trim().is_empty() {
            return Err(MailboxError::Config("mailbox identifier is empty".to_string()));
        }
        let codec = EnvelopeCodec::new(secret, options.key_derivation, options.iv_policy)?;
        Ok(Self {
            mailbox: mailbox.to_string(),
            codec,
            transport,
            options,
            seen: SeenState::NoMessageSeen,
            last_sent: None,
            last_received: None,
        })
    }

    /// Builds a session talking to the dweet store named in the config.
    pub fn from_config(config: &MailboxConfig) -> Result<Self> {
        let transport = DweetTransport::new(&config.base_url(), config.timeout())?;
        Self::new(
            &config.mailbox,
            &config.shared_secret()?,
            Arc::new(transport),
            config.session_options(),
        )
    }

    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn last_seen_envelope(&self) -> Option<&str> {
        match &self.seen {
            SeenState::NoMessageSeen => None,
            SeenState::MessageSeen(envelope) => Some(envelope),
        }
    }

    /// Last message this session published successfully.
    pub fn last_sent(&self) -> Option<&Exchanged> {
        self.last_sent.as_ref()
    }

    /// Last message `get_new` delivered. `get_latest` leaves it alone.
    pub fn last_received(&self) -> Option<&Exchanged> {
        self.last_received.as_ref()
    }

    /// Encrypts and publishes `message`, returning the store's acknowledgement unmodified.
    pub async fn send(&mut self, message: impl Into<Message>) -> Result<MailboxRecord> {
        let message = message.into();
        let sent_at_ms = now_ms().map_err(|e| e.with_context("send", &self.mailbox))?;
        let envelope = self
            .codec
            .encode_at(&message, sent_at_ms)
            .map_err(|e| e.with_context("send", &self.mailbox))?;
        let record = self
            .transport
            .publish(&self.mailbox, &envelope)
            .await
            .map_err(|e| e.with_context("send", &self.mailbox))?;
        debug!(mailbox = %self.mailbox, bytes = message.as_bytes().len(), "message sent");
        self.last_sent = Some(Exchanged {
            message,
            sent_at_ms,
        });
        Ok(record)
    }

    /// Current message in the mailbox. Does not touch the new-message state.
    pub async fn get_latest(&self) -> Result<Option<Message>> {
        let Some(record) = self.fetch("get_latest").await? else {
            return Ok(None);
        };
        let envelope = record
            .envelope()
            .map_err(|e| e.with_context("get_latest", &self.mailbox))?;
        let opened = self
            .open(&record, envelope)
            .map_err(|e| e.with_context("get_latest", &self.mailbox))?;
        Ok(Some(opened.message))
    }

    /// The current message if this session has not yet returned it from `get_new`.
    pub async fn get_new(&mut self) -> Result<Option<Message>> {
        let Some(record) = self.fetch("get_new").await? else {
            return Ok(None);
        };
        let envelope = record
            .envelope()
            .map_err(|e| e.with_context("get_new", &self.mailbox))?;
        if self.seen.is_seen(envelope) {
            debug!(mailbox = %self.mailbox, "no new message");
            return Ok(None);
        }
        let opened = self
            .open(&record, envelope)
            .map_err(|e| e.with_context("get_new", &self.mailbox))?;
        self.seen = SeenState::MessageSeen(envelope.to_string());
        info!(mailbox = %self.mailbox, sent_at_ms = opened.sent_at_ms, "new message delivered");
        self.last_received = Some(opened.clone());
        Ok(Some(opened.message))
    }

    async fn fetch(&self, operation: &str) -> Result<Option<MailboxRecord>> {
        let record = self
            .transport
            .poll(&self.mailbox)
            .await
            .map_err(|e| e.with_context(operation, &self.mailbox))?;
        if record.is_none() {
            debug!(mailbox = %self.mailbox, "mailbox is empty");
        }
        Ok(record)
    }

    fn open(&self, record: &MailboxRecord, envelope: &str) -> Result<Exchanged> {
        let OpenedEnvelope {
            message,
            sent_at_ms,
        } = self.codec.open(envelope)?;
        self.check_replay(record, sent_at_ms)?;
        Ok(Exchanged {
            message: message.shape(self.options.expect)?,
            sent_at_ms,
        })
    }

    fn check_replay(&self, record: &MailboxRecord, sent_at_ms: u64) -> Result<()> {
        let (Some(window), Some(created_ms)) = (self.options.replay_window, record.created_at_ms())
        else {
            return Ok(());
        };
        let gap = Duration::from_millis(created_ms.abs_diff(sent_at_ms));
        if gap > window {
            warn!(
                mailbox = %self.mailbox,
                gap_ms = gap.as_millis() as u64,
                "envelope timestamp too far from store timestamp"
            );
            return Err(MailboxError::Replay(format!(
                "sent {}ms away from store timestamp (window {}ms)",
                gap.as_millis(),
                window.as_millis()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::transport::MemoryTransport;

    fn session(transport: Arc<MemoryTransport>, options: SessionOptions) -> MailboxSession {
        MailboxSession::new("M", &SharedSecret::from_text("K"), transport, options).unwrap()
    }

    #[test]
    fn empty_mailbox_name_is_rejected() {
        let err = MailboxSession::new(
            " ",
            &SharedSecret::from_text("K"),
            Arc::new(MemoryTransport::new()),
            SessionOptions::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, MailboxError::Config(_)));
    }

    #[tokio::test]
    async fn seen_state_tracks_last_delivery() {
        let store = Arc::new(MemoryTransport::new());
        let mut receiver = session(store.clone(), SessionOptions::default());
        let mut sender = session(store.clone(), SessionOptions::default());
        assert_eq!(receiver.last_seen_envelope(), None);

        sender.send("hello").await.unwrap();
        receiver.get_new().await.unwrap().unwrap();
        let stored = store.poll("M").await.unwrap().unwrap();
        assert_eq!(receiver.last_seen_envelope(), Some(stored.envelope().unwrap()));
    }

    #[test]
    fn replay_window_bounds_gap() {
        let store = Arc::new(MemoryTransport::new());
        let session = session(
            store,
            SessionOptions {
                replay_window: Some(RECOMMENDED_REPLAY_WINDOW),
                ..SessionOptions::default()
            },
        );
        let record = MailboxRecord {
            thing: "M".to_string(),
            created: Some("2019-02-11T03:44:36.179Z".to_string()),
            content: serde_json::Value::Null,
            transaction: None,
        };
        let created = record.created_at_ms().unwrap();
        assert!(session.check_replay(&record, created - 9_000).is_ok());
        assert!(session.check_replay(&record, created + 9_000).is_ok());
        assert!(matches!(
            session.check_replay(&record, created - 11_000),
            Err(MailboxError::Replay(_))
        ));

        let default = self::session(Arc::new(MemoryTransport::new()), SessionOptions::default());
        assert!(default.check_replay(&record, created - 3_600_000).is_ok());
    }
}
