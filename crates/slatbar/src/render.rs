//! Render consumer: the single thread that applies snapshots.
//!
//! The consumer drains the delivery channel, decodes each wire
//! payload, and hands the structured data to the [`RenderSurface`].
//! A malformed payload is logged and dropped; it never takes the
//! consumer down or disturbs the regions of other widgets. Updates are
//! last-write-wins per widget kind.

use std::io::Write;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use slatbar_core::{Snapshot, WidgetKind};

use crate::delivery::DeliveryReceiver;
use crate::worker::ShutdownToken;

/// How long the consumer blocks on the channel before re-checking the
/// shutdown token.
const CONSUMER_WAIT: Duration = Duration::from_millis(500);

/// The visual surface a snapshot is applied to.
///
/// Implementations are only ever called from the consumer thread and
/// must not perform blocking I/O beyond their own cheap output.
pub trait RenderSurface {
    /// Update the region belonging to `kind` with a decoded payload.
    fn apply(&mut self, kind: WidgetKind, data: &Map<String, Value>);
}

/// Drain the delivery channel until shutdown or all senders are gone.
///
/// Runs on the caller's thread; this is the pipeline's single
/// consumer.
pub fn run_consumer<S: RenderSurface>(
    rx: DeliveryReceiver,
    surface: &mut S,
    shutdown: &ShutdownToken,
) {
    loop {
        if shutdown.is_triggered() {
            debug!("render consumer: shutdown requested");
            return;
        }

        let delivery = match rx.recv_timeout(CONSUMER_WAIT) {
            Ok(d) => d,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("render consumer: all workers gone");
                return;
            }
        };

        match Snapshot::decode(&delivery.payload) {
            Ok(snapshot) => {
                trace!("applying {} update", snapshot.kind);
                surface.apply(snapshot.kind, &snapshot.data);
            }
            Err(err) => {
                warn!(
                    "dropping malformed payload from {} widget: {}",
                    delivery.kind, err
                );
            }
        }
    }
}

/// A one-line text surface.
///
/// Keeps the last rendered segment per widget kind, in the order kinds
/// first appeared, and rewrites the whole line after every update. The
/// original bar painted into a browser view; the paint mechanism is an
/// external concern, so a plain status line is the surface this host
/// ships with.
pub struct StatusLine<W: Write = std::io::Stdout> {
    segments: Vec<(WidgetKind, String)>,
    out: W,
}

impl StatusLine {
    pub fn new() -> Self {
        StatusLine {
            segments: Vec::new(),
            out: std::io::stdout(),
        }
    }
}

impl Default for StatusLine {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> StatusLine<W> {
    /// Build a status line writing to an arbitrary sink.
    pub fn with_writer(out: W) -> Self {
        StatusLine {
            segments: Vec::new(),
            out,
        }
    }

    fn set_segment(&mut self, kind: WidgetKind, text: String) {
        if let Some(slot) = self.segments.iter_mut().find(|(k, _)| *k == kind) {
            slot.1 = text;
        } else {
            self.segments.push((kind, text));
        }
    }

    fn render_line(&self) -> String {
        self.segments
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join("  |  ")
    }

    fn format_desktop(data: &Map<String, Value>) -> String {
        let current = data.get("current_desktop").and_then(|v| v.as_u64());
        let mut parts = Vec::new();

        if let Some(desktops) = data.get("desktops").and_then(|v| v.as_array()) {
            for (i, desktop) in desktops.iter().enumerate() {
                let urgent = desktop
                    .get("is_urgent")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let mark = if current == Some(i as u64) {
                    "*"
                } else if urgent {
                    "!"
                } else {
                    ""
                };
                parts.push(format!("{}{}", i + 1, mark));
            }
        }

        let title = data
            .get("current_window")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        format!("[{}] {}", parts.join(" "), title)
    }

    fn format_weather(data: &Map<String, Value>) -> String {
        let temp = data.get("temp").and_then(|v| v.as_i64()).unwrap_or(0);
        let unit = data.get("unit").and_then(|v| v.as_str()).unwrap_or("c");
        format!("{}°{}", temp, unit)
    }

    fn format_email(data: &Map<String, Value>) -> String {
        let unread = data.get("unread").and_then(|v| v.as_u64()).unwrap_or(0);
        format!("mail: {}", unread)
    }
}

impl<W: Write> RenderSurface for StatusLine<W> {
    fn apply(&mut self, kind: WidgetKind, data: &Map<String, Value>) {
        let text = match kind {
            WidgetKind::Desktop => Self::format_desktop(data),
            WidgetKind::Weather => Self::format_weather(data),
            WidgetKind::Email => Self::format_email(data),
        };
        self.set_segment(kind, text);

        let line = self.render_line();
        if let Err(err) = writeln!(self.out, "{line}") {
            warn!("status line write failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::delivery_channel;
    use serde_json::json;

    fn desktop_data() -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("current_window".into(), json!("editor"));
        data.insert("current_desktop".into(), json!(1));
        data.insert(
            "desktops".into(),
            json!([
                {"clients_len": 0, "is_urgent": false},
                {"clients_len": 2, "is_urgent": false},
                {"clients_len": 1, "is_urgent": true},
            ]),
        );
        data
    }

    #[test]
    fn test_status_line_formats_desktops() {
        let mut surface = StatusLine::with_writer(Vec::new());
        surface.apply(WidgetKind::Desktop, &desktop_data());

        let line = String::from_utf8(surface.out.clone()).unwrap();
        assert_eq!(line, "[1 2* 3!] editor\n");
    }

    #[test]
    fn test_status_line_last_write_wins_per_widget() {
        let mut surface = StatusLine::with_writer(Vec::new());

        let mut weather = Map::new();
        weather.insert("temp".into(), json!(18));
        weather.insert("unit".into(), json!("c"));
        surface.apply(WidgetKind::Weather, &weather);

        weather.insert("temp".into(), json!(21));
        surface.apply(WidgetKind::Weather, &weather);

        assert_eq!(surface.render_line(), "21°c");
        assert_eq!(surface.segments.len(), 1);
    }

    #[test]
    fn test_consumer_drops_malformed_payload() {
        let (tx, rx) = delivery_channel(8);
        let shutdown = ShutdownToken::new();
        let mut surface = StatusLine::with_writer(Vec::new());

        tx.send(WidgetKind::Email, "{broken".into()).unwrap();
        tx.send(
            WidgetKind::Email,
            r#"{"widget":"email","data":{"unread":4}}"#.into(),
        )
        .unwrap();
        drop(tx);

        run_consumer(rx, &mut surface, &shutdown);

        // The malformed payload is skipped, the valid one still lands.
        assert_eq!(surface.render_line(), "mail: 4");
    }

    #[test]
    fn test_consumer_exits_on_shutdown() {
        let (_tx, rx) = delivery_channel(1);
        let shutdown = ShutdownToken::new();
        shutdown.trigger();

        let mut surface = StatusLine::with_writer(Vec::new());
        run_consumer(rx, &mut surface, &shutdown);
    }
}
