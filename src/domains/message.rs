use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MailboxError, Result};

/// Plaintext carried by an envelope. Text is always encoded as UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Bytes(Vec<u8>),
}

/// Kind tag stored in the envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Text,
    Bytes,
}

impl PayloadKind {
    pub fn tag(self) -> u8 {
        match self {
            PayloadKind::Text => 0x01,
            PayloadKind::Bytes => 0x02,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0x01 => Ok(PayloadKind::Text),
            0x02 => Ok(PayloadKind::Bytes),
            other => Err(MailboxError::Decoding(format!(
                "unknown payload kind tag 0x{other:02x}"
            ))),
        }
    }
}

/// How a session shapes decoded payloads before handing them back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadExpectation {
    /// Follow the kind tag in the envelope.
    #[default]
    Tagged,
    Text,
    Bytes,
}

impl Message {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Message::Text(_) => PayloadKind::Text,
            Message::Bytes(_) => PayloadKind::Bytes,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(text) => text.as_bytes(),
            Message::Bytes(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            Message::Bytes(_) => None,
        }
    }

    /// Rebuilds a message from decrypted bytes and the header's kind tag.
    pub fn from_parts(kind: PayloadKind, bytes: Vec<u8>) -> Result<Self> {
        match kind {
            PayloadKind::Bytes => Ok(Message::Bytes(bytes)),
            PayloadKind::Text => String::from_utf8(bytes)
                .map(Message::Text)
                .map_err(|e| MailboxError::Decoding(format!("text payload is not UTF-8: {e}"))),
        }
    }

    pub fn shape(self, expectation: PayloadExpectation) -> Result<Self> {
        match (expectation, self) {
            (PayloadExpectation::Tagged, message) => Ok(message),
            (PayloadExpectation::Bytes, message) => Ok(Message::Bytes(message.into_bytes())),
            (PayloadExpectation::Text, Message::Text(text)) => Ok(Message::Text(text)),
            (PayloadExpectation::Text, Message::Bytes(bytes)) => {
                Message::from_parts(PayloadKind::Text, bytes)
            }
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Message::Text(text) => text.into_bytes(),
            Message::Bytes(bytes) => bytes,
        }
    }

    /// Accepts a JSON string as text, or an array of integers in `0..=255` as bytes.
    /// Every other JSON shape is an unsupported plaintext type.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(text) => Ok(Message::Text(text.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| {
                            MailboxError::Encoding(format!(
                                "byte arrays may only hold integers 0..=255, found {item}"
                            ))
                        })
                })
                .collect::<Result<Vec<u8>>>()
                .map(Message::Bytes),
            other => Err(MailboxError::Encoding(format!(
                "unsupported plaintext type: {}",
                json_type_name(other)
            ))),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Message::Text(value)
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Message::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Message {
    fn from(value: Vec<u8>) -> Self {
        Message::Bytes(value)
    }
}

impl From<&[u8]> for Message {
    fn from(value: &[u8]) -> Self {
        Message::Bytes(value.to_vec())
    }
}
