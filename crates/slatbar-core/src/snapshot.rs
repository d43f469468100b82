//! Widget snapshots and their wire encoding.
//!
//! A [`Snapshot`] is the unit of hand-off between a widget worker and
//! the render consumer: one immutable, self-contained record of a
//! widget's state at one update cycle. Workers serialize a snapshot
//! into its wire form before pushing it onto the delivery channel, and
//! the consumer decodes it back on the UI side.
//!
//! Wire form: `{"widget":"<tag>","data":{...}}` where `data` is an
//! ordered tree of strings, numbers, booleans, arrays, and objects.

use serde_json::{Map, Value, json};
use thiserror::Error;

/// Tag identifying which widget produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetKind {
    /// Window-manager desktop/window state.
    Desktop,
    /// Weather conditions.
    Weather,
    /// Unread mail count.
    Email,
}

impl WidgetKind {
    /// Stable wire name for this widget kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetKind::Desktop => "desktop",
            WidgetKind::Weather => "weather",
            WidgetKind::Email => "email",
        }
    }

    /// Parse a wire name back into a kind.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "desktop" => Some(WidgetKind::Desktop),
            "weather" => Some(WidgetKind::Weather),
            "email" => Some(WidgetKind::Email),
            _ => None,
        }
    }
}

impl std::fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from encoding or decoding a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("payload is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("payload is missing the \"{0}\" field")]
    MissingField(&'static str),
    #[error("unknown widget tag \"{0}\"")]
    UnknownWidget(String),
}

/// One widget's state at one update cycle.
///
/// Immutable once constructed and fully self-contained: the payload
/// owns all of its data, so a snapshot can be moved across thread
/// boundaries freely.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Which widget produced this snapshot.
    pub kind: WidgetKind,
    /// Ordered tree of widget-specific data.
    pub data: Map<String, Value>,
}

impl Snapshot {
    /// Build a snapshot from a widget kind and payload tree.
    pub fn new(kind: WidgetKind, data: Map<String, Value>) -> Self {
        Self { kind, data }
    }

    /// Serialize into the wire form pushed onto the delivery channel.
    pub fn encode(&self) -> Result<String, SnapshotError> {
        let wire = json!({
            "widget": self.kind.as_str(),
            "data": Value::Object(self.data.clone()),
        });
        Ok(serde_json::to_string(&wire)?)
    }

    /// Decode a wire payload back into a snapshot.
    ///
    /// Malformed payloads are reported as errors so the consumer can
    /// drop them; decoding never panics.
    pub fn decode(payload: &str) -> Result<Self, SnapshotError> {
        let wire: Value = serde_json::from_str(payload)?;

        let tag = wire
            .get("widget")
            .and_then(|v| v.as_str())
            .ok_or(SnapshotError::MissingField("widget"))?;
        let kind = WidgetKind::from_str(tag)
            .ok_or_else(|| SnapshotError::UnknownWidget(tag.to_string()))?;

        let data = match wire.get("data") {
            Some(Value::Object(map)) => map.clone(),
            _ => return Err(SnapshotError::MissingField("data")),
        };

        Ok(Self { kind, data })
    }
}
