//! News article input model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::errors::{DomainError, DomainResult};

/// A news article under assessment.
///
/// Articles are immutable once ingested. `metadata` holds every field of the
/// source record except its identifier (title, url, publication date, body…);
/// this object is what the backend sees as "the article".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Identifier from the source record (`docid` or `id`).
    pub id: String,
    /// Body text.
    pub text: String,
    /// Every source field except the identifier.
    pub metadata: Map<String, Value>,
}

impl Article {
    /// Article with `text` as its only metadata (`body`).
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut metadata = Map::new();
        metadata.insert("body".to_string(), Value::String(text.clone()));
        Self {
            id: id.into(),
            text,
            metadata,
        }
    }

    /// Attach an extra metadata field (title, url, published date, …).
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Parse one JSONL record. `docid` (or `id`) is the identifier; all other
    /// fields become metadata. The text is `body`, `text` or `contents`,
    /// whichever is present first.
    pub fn from_json_line(line: &str) -> DomainResult<Self> {
        let value: Value = serde_json::from_str(line)?;
        let Value::Object(mut fields) = value else {
            return Err(DomainError::ValidationFailed(
                "article record must be a JSON object".to_string(),
            ));
        };

        let id = fields
            .remove("docid")
            .or_else(|| fields.remove("id"))
            .and_then(|v| match v {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| {
                DomainError::ValidationFailed("article record has no docid/id".to_string())
            })?;

        let text = ["body", "text", "contents"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            id,
            text,
            metadata: fields,
        })
    }

    /// The `title` metadata field, if it is a string.
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(Value::as_str)
    }

    /// Pretty JSON of the article without its identifier, used as backend context.
    pub fn context_json(&self) -> String {
        serde_json::to_string_pretty(&self.metadata).unwrap_or_else(|_| self.text.clone())
    }
}
