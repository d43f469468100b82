//! Widget implementations and the factory that spawns them.
//!
//! Each widget is an independent worker: the factory matches a config
//! entry to its widget, builds the collaborators it needs, and spawns
//! the worker thread. An unknown widget name is warned about and
//! skipped; one widget failing to start never stops the others.

pub mod desktops;
pub mod email;
pub mod ewmh;
pub mod weather;

use tracing::{error, warn};

use slatbar_core::WidgetEntry;

use crate::delivery::DeliverySender;
use crate::http::BlockingHttp;
use crate::worker::{ShutdownToken, WorkerHandle, spawn};

/// Spawn the worker for one config entry.
///
/// Returns `None` when the widget name is unknown or the thread could
/// not be spawned; collaborator construction failures are handled on
/// the worker thread itself so a broken widget never blocks startup.
pub fn spawn_widget(
    entry: &WidgetEntry,
    sender: &DeliverySender,
    shutdown: &ShutdownToken,
) -> Option<WorkerHandle> {
    let sender = sender.clone();
    let shutdown = shutdown.clone();

    let result = match entry.name.as_str() {
        "desktops" => {
            entry.warn_unknown_options(&[]);
            spawn("desktops", move || match ewmh::EwmhLink::connect() {
                Ok(link) => desktops::run(link, sender, shutdown),
                Err(err) => error!("desktops: {}, widget not started", err),
            })
        }
        "weather" => {
            let config = weather::WeatherConfig::from_entry(entry);
            spawn("weather", move || match BlockingHttp::new() {
                Ok(http) => weather::run(config, Box::new(http), sender, shutdown),
                Err(err) => error!("weather: {}, widget not started", err),
            })
        }
        "email" => {
            let config = email::EmailConfig::from_entry(entry);
            spawn("email", move || {
                match email::MaildirCheck::new(&config) {
                    Ok(checker) => email::run(config, Box::new(checker), sender, shutdown),
                    Err(err) => error!("email: {}, widget not started", err),
                }
            })
        }
        name => {
            warn!("Unknown widget type: '{}', skipping", name);
            return None;
        }
    };

    match result {
        Ok(handle) => Some(handle),
        Err(err) => {
            error!("could not spawn worker for '{}': {}", entry.name, err);
            None
        }
    }
}
