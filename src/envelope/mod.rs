use std::time::{SystemTime, UNIX_EPOCH};

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::domains::message::{Message, PayloadKind};
use crate::error::{MailboxError, Result};

pub mod key;

use key::{CipherKey, IvPolicy, KeyDerivation, SharedSecret, IV_LEN};

type HmacSha256 = Hmac<Sha256>;

const ENVELOPE_VERSION: u8 = 1;
const BLOCK_LEN: usize = 16;
const MAC_LEN: usize = 32;
// version, kind, sent-at, iv
const HEADER_LEN: usize = 1 + 1 + 8 + IV_LEN;
const MIN_ENVELOPE_LEN: usize = HEADER_LEN + BLOCK_LEN + MAC_LEN;
const MAC_CONTEXT: &[u8] = b"dweet-mailbox/mac/v1";

/// A decoded envelope together with the sender's authenticated timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedEnvelope {
    pub message: Message,
    pub sent_at_ms: u64,
}

/// Turns messages into hex envelopes and back.
///
/// Wire layout: `version | kind | sent_at_ms (BE u64) | iv | AES-CBC ciphertext | HMAC-SHA256`,
/// hex-encoded. The MAC covers everything before it and is checked before decryption.
pub struct EnvelopeCodec {
    key: CipherKey,
    mac_key: [u8; 32],
    iv_policy: IvPolicy,
}

impl EnvelopeCodec {
    pub fn new(secret: &SharedSecret, derivation: KeyDerivation, iv_policy: IvPolicy) -> Result<Self> {
        let key = derivation.derive(secret)?;
        let hk = Hkdf::<Sha256>::new(None, key.as_bytes());
        let mut mac_key = [0u8; 32];
        hk.expand(MAC_CONTEXT, &mut mac_key)
            .map_err(|_| MailboxError::Config("HKDF expand failed".to_string()))?;
        Ok(Self {
            key,
            mac_key,
            iv_policy,
        })
    }

    pub fn encode(&self, message: &Message) -> Result<String> {
        self.encode_at(message, now_ms()?)
    }

    /// Encodes a dynamically typed value; only strings and byte arrays are accepted.
    pub fn encode_value(&self, value: &Value) -> Result<String> {
        let message = Message::from_json(value)?;
        self.encode(&message)
    }

    pub fn encode_at(&self, message: &Message, sent_at_ms: u64) -> Result<String> {
        let iv = self.iv_policy.next_iv();
        let ciphertext = self.key.encrypt(&iv, message.as_bytes())?;

        let mut raw = Vec::with_capacity(HEADER_LEN + ciphertext.len() + MAC_LEN);
        raw.push(ENVELOPE_VERSION);
        raw.push(message.kind().tag());
        raw.extend_from_slice(&sent_at_ms.to_be_bytes());
        raw.extend_from_slice(&iv);
        raw.extend_from_slice(&ciphertext);

        let mut mac = self.mac()?;
        mac.update(&raw);
        raw.extend_from_slice(&mac.finalize().into_bytes());
        Ok(hex::encode(raw))
    }

    pub fn decode(&self, envelope: &str) -> Result<Message> {
        Ok(self.open(envelope)?.message)
    }

    pub fn open(&self, envelope: &str) -> Result<OpenedEnvelope> {
        let raw = hex::decode(envelope)
            .map_err(|e| MailboxError::Decoding(format!("envelope is not valid hex: {e}")))?;
        if raw.len() < MIN_ENVELOPE_LEN {
            return Err(MailboxError::Decoding(format!(
                "envelope too short: {} bytes",
                raw.len()
            )));
        }
        let (signed, tag) = raw.split_at(raw.len() - MAC_LEN);
        if (signed.len() - HEADER_LEN) % BLOCK_LEN != 0 {
            return Err(MailboxError::Decoding(
                "ciphertext is not a whole number of blocks".to_string(),
            ));
        }
        if signed[0] != ENVELOPE_VERSION {
            return Err(MailboxError::Decoding(format!(
                "unsupported envelope version {}",
                signed[0]
            )));
        }

        let mut mac = self.mac()?;
        mac.update(signed);
        mac.verify_slice(tag).map_err(|_| {
            MailboxError::Decoding(
                "authentication failed: wrong key or foreign envelope".to_string(),
            )
        })?;

        let kind = PayloadKind::from_tag(signed[1])?;
        let sent_at_ms = u64::from_be_bytes(
            <[u8; 8]>::try_from(&signed[2..10])
                .map_err(|e| MailboxError::Decoding(e.to_string()))?,
        );
        let iv = <[u8; IV_LEN]>::try_from(&signed[10..HEADER_LEN])
            .map_err(|e| MailboxError::Decoding(e.to_string()))?;
        let plaintext = self.key.decrypt(&iv, &signed[HEADER_LEN..])?;

        Ok(OpenedEnvelope {
            message: Message::from_parts(kind, plaintext)?,
            sent_at_ms,
        })
    }

    fn mac(&self) -> Result<HmacSha256> {
        <HmacSha256 as Mac>::new_from_slice(&self.mac_key)
            .map_err(|e| MailboxError::Config(e.to_string()))
    }
}

pub fn now_ms() -> Result<u64> {
    epoch_ms(SystemTime::now())
}

fn epoch_ms(at: SystemTime) -> Result<u64> {
    let elapsed = at
        .duration_since(UNIX_EPOCH)
        .map_err(|e| MailboxError::Config(format!("system clock before unix epoch: {e}")))?;
    Ok(elapsed.as_millis() as u64)
}
