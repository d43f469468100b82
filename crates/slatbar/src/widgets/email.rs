//! Timed-poll unread-mail widget.
//!
//! The mailbox session itself stays behind the [`MailboxCheck`] seam -
//! one exchange in, an unread count or a failure out. The widget ships
//! with a maildir-backed checker; protocol-level backends (IMAP etc.)
//! plug in through the same trait.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::{Map, json};
use tracing::debug;

use slatbar_core::{Snapshot, WidgetEntry, WidgetKind};

use crate::delivery::DeliverySender;
use crate::errors::WidgetError;
use crate::worker::{ShutdownToken, run_polling};

/// Email widget configuration.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Mailbox address shown on the surface.
    pub address: String,
    /// Maildir to count unread mail in.
    pub maildir: String,
    /// Poll cadence in seconds.
    pub refresh_interval: u64,
}

impl EmailConfig {
    pub fn from_entry(entry: &WidgetEntry) -> Self {
        entry.warn_unknown_options(&["address", "maildir", "refresh_interval"]);
        Self {
            address: entry.option_str("address", "INBOX"),
            maildir: entry.option_str("maildir", ""),
            refresh_interval: entry.refresh_interval(),
        }
    }
}

/// The mailbox collaborator: one unread-count exchange per cycle.
pub trait MailboxCheck: Send {
    fn unread_count(&mut self) -> Result<u32, WidgetError>;
}

/// Counts messages in a maildir's `new/` subdirectory.
#[derive(Debug)]
pub struct MaildirCheck {
    new_dir: PathBuf,
}

impl MaildirCheck {
    /// Build a checker from the configured maildir path.
    pub fn new(config: &EmailConfig) -> Result<Self, WidgetError> {
        if config.maildir.is_empty() {
            return Err(WidgetError::Configuration(
                "email widget needs a maildir option".into(),
            ));
        }
        Ok(Self {
            new_dir: PathBuf::from(&config.maildir).join("new"),
        })
    }
}

impl MailboxCheck for MaildirCheck {
    fn unread_count(&mut self) -> Result<u32, WidgetError> {
        let entries = std::fs::read_dir(&self.new_dir)
            .map_err(|e| WidgetError::Collaborator(format!("{}: {e}", self.new_dir.display())))?;
        let count = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
            .count();
        Ok(count as u32)
    }
}

fn build_snapshot(unread: u32, address: &str) -> Snapshot {
    let mut data = Map::new();
    data.insert("unread".into(), json!(unread));
    data.insert("address".into(), json!(address));
    Snapshot::new(WidgetKind::Email, data)
}

/// Run the mail poll loop until shutdown.
pub fn run(
    config: EmailConfig,
    mut checker: Box<dyn MailboxCheck>,
    sender: DeliverySender,
    shutdown: ShutdownToken,
) {
    let interval = Duration::from_secs(config.refresh_interval);
    run_polling("email", interval, &shutdown, || {
        let unread = checker.unread_count()?;
        debug!("email: {} unread", unread);
        let wire = build_snapshot(unread, &config.address).encode()?;
        sender.send(WidgetKind::Email, wire)?;
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::delivery_channel;

    struct MockMailbox {
        counts: Vec<Result<u32, ()>>,
        cycle: usize,
        stop: ShutdownToken,
    }

    impl MailboxCheck for MockMailbox {
        fn unread_count(&mut self) -> Result<u32, WidgetError> {
            let result = self.counts.get(self.cycle).copied();
            self.cycle += 1;
            if self.cycle >= self.counts.len() {
                self.stop.trigger();
            }
            match result {
                Some(Ok(n)) => Ok(n),
                _ => Err(WidgetError::Collaborator("session dropped".into())),
            }
        }
    }

    fn entry_with(options: &str) -> WidgetEntry {
        let config = slatbar_core::BarConfig::parse(&format!(
            "[[widgets]]\nname = \"email\"\noptions = {options}\n"
        ))
        .unwrap();
        config.widgets[0].clone()
    }

    #[test]
    fn test_config_defaults() {
        let config = EmailConfig::from_entry(&entry_with("{}"));
        assert_eq!(config.address, "INBOX");
        assert_eq!(config.maildir, "");
        assert_eq!(config.refresh_interval, 60);
    }

    #[test]
    fn test_missing_maildir_is_configuration_error() {
        let config = EmailConfig::from_entry(&entry_with("{}"));
        let err = MaildirCheck::new(&config).unwrap_err();
        assert!(err.is_fatal_to_worker());
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let wire = build_snapshot(3, "INBOX").encode().unwrap();
        assert_eq!(
            wire,
            r#"{"widget":"email","data":{"unread":3,"address":"INBOX"}}"#
        );
    }

    #[test]
    fn test_failed_cycles_skip_but_polling_continues() {
        let (tx, rx) = delivery_channel(8);
        let shutdown = ShutdownToken::new();

        let mailbox = MockMailbox {
            counts: vec![Ok(2), Err(()), Err(()), Ok(5)],
            cycle: 0,
            stop: shutdown.clone(),
        };
        let config = EmailConfig {
            address: "INBOX".into(),
            maildir: String::new(),
            refresh_interval: 1,
        };

        run(config, Box::new(mailbox), tx, shutdown);

        // Two emissions survive, the failed cycles emit nothing, and
        // the worker kept polling through the failures.
        let payloads: Vec<_> = rx.try_iter().collect();
        assert_eq!(payloads.len(), 2);
        assert!(payloads[0].payload.contains("\"unread\":2"));
        assert!(payloads[1].payload.contains("\"unread\":5"));
    }
}
