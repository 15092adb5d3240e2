#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use dweet_mailbox::domains::record::MailboxRecord;
use dweet_mailbox::error::{MailboxError, Result};
use dweet_mailbox::interfaces::transport::MailboxTransport;
use dweet_mailbox::services::transport::MemoryTransport;
use dweet_mailbox::{MailboxSession, SessionOptions, SharedSecret};

pub fn session_on(
    store: Arc<dyn MailboxTransport>,
    mailbox: &str,
    secret: &str,
    options: SessionOptions,
) -> MailboxSession {
    MailboxSession::new(mailbox, &SharedSecret::from_text(secret), store, options).unwrap()
}

pub struct FailingTransport;

#[async_trait]
impl MailboxTransport for FailingTransport {
    async fn publish(&self, _mailbox: &str, _envelope: &str) -> Result<MailboxRecord> {
        Err(MailboxError::Transport("connection refused".to_string()))
    }

    async fn poll(&self, _mailbox: &str) -> Result<Option<MailboxRecord>> {
        Err(MailboxError::Transport("connection refused".to_string()))
    }
}

/// Counts round trips made against an in-memory store.
pub struct CountingTransport {
    pub inner: MemoryTransport,
    publishes: AtomicUsize,
    polls: AtomicUsize,
}

impl CountingTransport {
    pub fn new() -> Self {
        Self {
            inner: MemoryTransport::new(),
            publishes: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
        }
    }

    pub fn publishes(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailboxTransport for CountingTransport {
    async fn publish(&self, mailbox: &str, envelope: &str) -> Result<MailboxRecord> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        self.inner.publish(mailbox, envelope).await
    }

    async fn poll(&self, mailbox: &str) -> Result<Option<MailboxRecord>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.inner.poll(mailbox).await
    }
}
