use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::{MailboxError, Result};

/// Field of `content` that holds the hex envelope.
pub const ENVELOPE_FIELD: &str = "envelope";

/// The latest value a store holds for a mailbox. `created` and `transaction`
/// are assigned by the store and never used to decide whether a message is new.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailboxRecord {
    pub thing: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub transaction: Option<String>,
}

impl MailboxRecord {
    pub fn content_for(envelope: &str) -> Value {
        serde_json::json!({ ENVELOPE_FIELD: envelope })
    }

    pub fn envelope(&self) -> Result<&str> {
        self.content
            .get(ENVELOPE_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                MailboxError::Decoding("record content carries no envelope".to_string())
            })
    }

    /// Store timestamp in unix milliseconds, when present and parseable.
    pub fn created_at_ms(&self) -> Option<u64> {
        let created = self.created.as_deref()?;
        let parsed = OffsetDateTime::parse(created, &Rfc3339).ok()?;
        u64::try_from(parsed.unix_timestamp_nanos() / 1_000_000).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_dweet_style_record() {
        let record: MailboxRecord = serde_json::from_value(json!({
            "thing": "M",
            "created": "2019-02-11T03:44:36.179Z",
            "content": {"envelope": "abcd"},
        }))
        .unwrap();
        assert_eq!(record.envelope().unwrap(), "abcd");
        assert_eq!(record.created_at_ms(), Some(1_549_856_676_179));
        assert!(record.transaction.is_none());
    }

    #[test]
    fn missing_envelope_is_a_decoding_error() {
        let record = MailboxRecord {
            thing: "M".to_string(),
            created: Some("not a date".to_string()),
            content: json!({"temperature": 21}),
            transaction: None,
        };
        assert!(matches!(record.envelope(), Err(MailboxError::Decoding(_))));
        assert_eq!(record.created_at_ms(), None);
    }
}
