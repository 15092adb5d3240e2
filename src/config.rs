use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::domains::message::PayloadExpectation;
use crate::envelope::key::{IvPolicy, KeyDerivation, SharedSecret};
use crate::error::{MailboxError, Result};
use crate::services::mailbox::SessionOptions;
use crate::services::transport::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};

/// On-disk session description, read as JSON.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MailboxConfig {
    pub mailbox: String,
    /// Text secret, used as its UTF-8 bytes.
    pub secret: Option<String>,
    /// Raw-bytes secret, base64 encoded. Takes precedence over `secret`.
    pub secret_base64: Option<String>,
    pub key_derivation: Option<KeyDerivation>,
    /// Fixed IV text. When absent every envelope gets a random IV.
    pub iv: Option<String>,
    pub expect: Option<PayloadExpectation>,
    /// Enables the replay check with this window. Absent or `0` leaves it off.
    pub replay_window_secs: Option<u64>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl MailboxConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| MailboxError::Config(e.to_string()))?;
        let config: MailboxConfig =
            serde_json::from_str(&content).map_err(|e| MailboxError::Config(e.to_string()))?;
        Ok(config)
    }

    pub fn shared_secret(&self) -> Result<SharedSecret> {
        if let Some(encoded) = &self.secret_base64 {
            return SharedSecret::from_base64(encoded);
        }
        self.secret
            .as_deref()
            .map(SharedSecret::from_text)
            .ok_or_else(|| MailboxError::Config("Missing secret or secret_base64".to_string()))
    }

    pub fn session_options(&self) -> SessionOptions {
        let replay_window = self
            .replay_window_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        SessionOptions {
            key_derivation: self.key_derivation.unwrap_or_default(),
            iv_policy: self
                .iv
                .as_deref()
                .map(IvPolicy::fixed_from_text)
                .unwrap_or_default(),
            expect: self.expect.unwrap_or_default(),
            replay_window,
        }
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .to_string()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}
