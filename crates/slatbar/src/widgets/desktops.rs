//! Event-driven desktops widget.
//!
//! Blocks on window-manager property-change notifications and, on each
//! wake, re-derives the *entire* desktop state through the [`WmLink`]
//! collaborator: active window title, desktop count, current desktop,
//! and the per-desktop client/urgency tallies. A cycle either produces
//! a whole snapshot or nothing - a failed required exchange aborts the
//! cycle without emitting, and the worker goes back to waiting.
//!
//! Each worker owns its own link, so no request/reply exchange can
//! interleave with another thread's. [`SharedWmLink`] covers the case
//! where one connection genuinely must be shared: it serializes whole
//! exchanges behind a mutex.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tracing::{debug, error, trace, warn};

use slatbar_core::{Snapshot, WidgetKind};

use crate::delivery::DeliverySender;
use crate::errors::WidgetError;
use crate::worker::ShutdownToken;

/// Upper bound on the active window title, in bytes. Longer titles are
/// truncated on a char boundary; the loss is accepted.
pub const TITLE_MAX_LEN: usize = 256;

/// How long one event wait blocks before re-checking shutdown.
const EVENT_WAIT: Duration = Duration::from_millis(500);

/// Pause after a failed wait so a dead connection does not spin.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Opaque window identifier handed out by the link.
pub type WindowId = u32;

/// The window-manager collaborator.
///
/// All accessors are single request/reply exchanges that may fail
/// independently; failure is reported, never raised as fatal. The
/// `&mut self` receivers encode the connection's one-exchange-at-a-time
/// precondition in the type system.
pub trait WmLink: Send {
    /// Request state-change notifications. Called once before the
    /// event loop; failure means this widget cannot function.
    fn subscribe(&mut self) -> Result<(), WidgetError>;

    /// Block up to `timeout` for the next relevant event.
    ///
    /// `Ok(true)` when an event arrived, `Ok(false)` on timeout.
    fn wait_for_event(&mut self, timeout: Duration) -> Result<bool, WidgetError>;

    fn active_window(&mut self) -> Result<WindowId, WidgetError>;
    fn window_title(&mut self, window: WindowId) -> Result<String, WidgetError>;
    fn desktop_count(&mut self) -> Result<u32, WidgetError>;
    fn current_desktop(&mut self) -> Result<u32, WidgetError>;
    fn client_list(&mut self) -> Result<Vec<WindowId>, WidgetError>;
    fn window_desktop(&mut self, window: WindowId) -> Result<u32, WidgetError>;
    fn window_urgency(&mut self, window: WindowId) -> Result<bool, WidgetError>;
}

/// Mutex adapter for a link that must be shared across workers.
///
/// The lock is held for exactly one trait-method call, i.e. one
/// logical exchange. Prefer giving each worker its own link; this
/// exists for displays that cap the number of client connections.
pub struct SharedWmLink<L: WmLink> {
    inner: Arc<Mutex<L>>,
}

impl<L: WmLink> SharedWmLink<L> {
    pub fn new(link: L) -> Self {
        Self {
            inner: Arc::new(Mutex::new(link)),
        }
    }
}

impl<L: WmLink> Clone for SharedWmLink<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: WmLink> WmLink for SharedWmLink<L> {
    fn subscribe(&mut self) -> Result<(), WidgetError> {
        self.inner.lock().subscribe()
    }

    fn wait_for_event(&mut self, timeout: Duration) -> Result<bool, WidgetError> {
        self.inner.lock().wait_for_event(timeout)
    }

    fn active_window(&mut self) -> Result<WindowId, WidgetError> {
        self.inner.lock().active_window()
    }

    fn window_title(&mut self, window: WindowId) -> Result<String, WidgetError> {
        self.inner.lock().window_title(window)
    }

    fn desktop_count(&mut self) -> Result<u32, WidgetError> {
        self.inner.lock().desktop_count()
    }

    fn current_desktop(&mut self) -> Result<u32, WidgetError> {
        self.inner.lock().current_desktop()
    }

    fn client_list(&mut self) -> Result<Vec<WindowId>, WidgetError> {
        self.inner.lock().client_list()
    }

    fn window_desktop(&mut self, window: WindowId) -> Result<u32, WidgetError> {
        self.inner.lock().window_desktop(window)
    }

    fn window_urgency(&mut self, window: WindowId) -> Result<bool, WidgetError> {
        self.inner.lock().window_urgency(window)
    }
}

/// One desktop's tallies for the current cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Desktop {
    /// Number of client windows resolved onto this desktop.
    pub clients_len: u32,
    /// Whether any resolved client carries the urgency hint.
    pub is_urgent: bool,
}

/// Fully re-derived desktop state, ready to become a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DesktopState {
    /// One entry per desktop slot, ascending index order.
    pub desktops: Vec<Desktop>,
    /// Selected desktop index, when the reported index is in range.
    pub current: Option<u32>,
    /// Active window title, bounded to [`TITLE_MAX_LEN`] bytes.
    pub active_window: String,
}

impl DesktopState {
    /// Assemble the wire payload.
    ///
    /// `current_desktop` is present only when exactly one desktop is
    /// selected; an out-of-range index omits it entirely.
    pub fn into_snapshot(self) -> Snapshot {
        let desktops: Vec<Value> = self
            .desktops
            .iter()
            .map(|d| {
                json!({
                    "clients_len": d.clients_len,
                    "is_urgent": d.is_urgent,
                })
            })
            .collect();

        let mut data = Map::new();
        data.insert("current_window".into(), json!(self.active_window));
        if let Some(current) = self.current {
            data.insert("current_desktop".into(), json!(current));
        }
        data.insert("desktops".into(), Value::Array(desktops));

        Snapshot::new(WidgetKind::Desktop, data)
    }
}

/// Truncate a title to [`TITLE_MAX_LEN`] bytes on a char boundary.
fn bound_title(mut title: String) -> String {
    if title.len() > TITLE_MAX_LEN {
        let mut end = TITLE_MAX_LEN;
        while !title.is_char_boundary(end) {
            end -= 1;
        }
        title.truncate(end);
    }
    title
}

/// Re-derive the whole desktop state from the link.
///
/// Required exchanges (active window, title, desktop count, current
/// desktop, client list) abort the cycle on failure. Per-client
/// exchanges degrade instead: a window with no resolvable desktop is
/// skipped, and a failed urgency fetch counts the window but never
/// marks its desktop urgent.
pub fn reconcile(link: &mut dyn WmLink) -> Result<DesktopState, WidgetError> {
    let window = link.active_window()?;
    let active_window = bound_title(link.window_title(window)?);

    let count = link.desktop_count()?;
    let reported = link.current_desktop()?;
    let current = (reported < count).then_some(reported);
    if current.is_none() {
        warn!(
            "desktops: current desktop {} out of range (count {}), marking none selected",
            reported, count
        );
    }

    let mut desktops = vec![Desktop::default(); count as usize];

    for client in link.client_list()? {
        let desktop = match link.window_desktop(client) {
            Ok(d) => d,
            Err(_) => {
                // Window isn't associated with any desktop.
                trace!("desktops: window {} has no desktop, skipping", client);
                continue;
            }
        };
        let Some(slot) = desktops.get_mut(desktop as usize) else {
            trace!(
                "desktops: window {} claims desktop {} outside 0..{}, skipping",
                client, desktop, count
            );
            continue;
        };

        slot.clients_len += 1;

        match link.window_urgency(client) {
            Ok(true) => slot.is_urgent = true,
            Ok(false) => {}
            Err(err) => {
                warn!(
                    "desktops: could not read urgency hint for window {}: {}, treating as non-urgent",
                    client, err
                );
            }
        }
    }

    Ok(DesktopState {
        desktops,
        current,
        active_window,
    })
}

fn emit(state: DesktopState, sender: &DeliverySender) -> Result<(), WidgetError> {
    let wire = state.into_snapshot().encode()?;
    sender.send(WidgetKind::Desktop, wire)?;
    Ok(())
}

/// Run the event-driven loop until shutdown.
///
/// Two states: waiting and reconciling. An event moves the loop into a
/// full reconcile; the loop returns to waiting unconditionally after
/// emit-or-abort. A failed wait is retried forever - the worker
/// degrades, it never dies.
pub fn run<L: WmLink>(mut link: L, sender: DeliverySender, shutdown: ShutdownToken) {
    if let Err(err) = link.subscribe() {
        error!("desktops: {}, stopping this widget", err);
        return;
    }

    while !shutdown.is_triggered() {
        match link.wait_for_event(EVENT_WAIT) {
            Ok(false) => continue,
            Ok(true) => match reconcile(&mut link) {
                Ok(state) => {
                    if let Err(err) = emit(state, &sender) {
                        warn!("desktops: {}, dropping this update", err);
                    }
                }
                Err(err) => {
                    warn!("desktops: {}, not updating", err);
                }
            },
            Err(err) => {
                warn!("desktops: {}, retrying wait", err);
                if shutdown.wait_timeout(RETRY_DELAY) {
                    break;
                }
            }
        }
    }

    debug!("desktops: event loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::delivery_channel;

    /// Scripted link for driving the worker without a display server.
    #[derive(Default)]
    struct MockLink {
        desktop_count: u32,
        /// None makes the current-desktop exchange fail.
        current_desktop: Option<u32>,
        clients: Vec<MockClient>,
        title: String,
        fail_title: bool,
        /// Events still to deliver from `wait_for_event`.
        pending_events: u32,
        /// Makes every wait fail instead.
        wait_fails: bool,
        wait_calls: u32,
        /// Fired when the script runs out, so `run` tests terminate.
        stop: Option<ShutdownToken>,
    }

    #[derive(Clone, Copy)]
    struct MockClient {
        /// None = window has no resolvable desktop.
        desktop: Option<u32>,
        /// None = urgency fetch fails.
        urgent: Option<bool>,
    }

    impl WmLink for MockLink {
        fn subscribe(&mut self) -> Result<(), WidgetError> {
            Ok(())
        }

        fn wait_for_event(&mut self, _timeout: Duration) -> Result<bool, WidgetError> {
            self.wait_calls += 1;
            if self.wait_fails {
                if self.wait_calls >= 2
                    && let Some(stop) = &self.stop
                {
                    stop.trigger();
                }
                return Err(WidgetError::Collaborator("connection reset".into()));
            }
            if self.pending_events > 0 {
                self.pending_events -= 1;
                Ok(true)
            } else {
                if let Some(stop) = &self.stop {
                    stop.trigger();
                }
                Ok(false)
            }
        }

        fn active_window(&mut self) -> Result<WindowId, WidgetError> {
            Ok(1)
        }

        fn window_title(&mut self, _window: WindowId) -> Result<String, WidgetError> {
            if self.fail_title {
                Err(WidgetError::Collaborator("no WM_NAME".into()))
            } else {
                Ok(self.title.clone())
            }
        }

        fn desktop_count(&mut self) -> Result<u32, WidgetError> {
            Ok(self.desktop_count)
        }

        fn current_desktop(&mut self) -> Result<u32, WidgetError> {
            self.current_desktop
                .ok_or_else(|| WidgetError::Collaborator("no current desktop".into()))
        }

        fn client_list(&mut self) -> Result<Vec<WindowId>, WidgetError> {
            Ok((0..self.clients.len() as u32).collect())
        }

        fn window_desktop(&mut self, window: WindowId) -> Result<u32, WidgetError> {
            self.clients[window as usize]
                .desktop
                .ok_or_else(|| WidgetError::Collaborator("no desktop association".into()))
        }

        fn window_urgency(&mut self, window: WindowId) -> Result<bool, WidgetError> {
            self.clients[window as usize]
                .urgent
                .ok_or_else(|| WidgetError::Collaborator("no WM_HINTS".into()))
        }
    }

    #[test]
    fn test_reconcile_scenario() {
        // Current desktop 2 of 3, one urgent client on desktop 1, one
        // plain client on desktop 2.
        let mut link = MockLink {
            desktop_count: 3,
            current_desktop: Some(2),
            clients: vec![
                MockClient {
                    desktop: Some(1),
                    urgent: Some(true),
                },
                MockClient {
                    desktop: Some(2),
                    urgent: Some(false),
                },
            ],
            title: "editor".into(),
            ..Default::default()
        };

        let state = reconcile(&mut link).unwrap();

        assert_eq!(
            state.desktops,
            vec![
                Desktop {
                    clients_len: 0,
                    is_urgent: false
                },
                Desktop {
                    clients_len: 1,
                    is_urgent: true
                },
                Desktop {
                    clients_len: 1,
                    is_urgent: false
                },
            ]
        );
        assert_eq!(state.current, Some(2));
        assert_eq!(state.active_window, "editor");
    }

    #[test]
    fn test_wire_payload_shape() {
        let state = DesktopState {
            desktops: vec![
                Desktop {
                    clients_len: 0,
                    is_urgent: false,
                },
                Desktop {
                    clients_len: 1,
                    is_urgent: true,
                },
            ],
            current: Some(0),
            active_window: "shell".into(),
        };

        let wire = state.into_snapshot().encode().unwrap();
        assert_eq!(
            wire,
            r#"{"widget":"desktop","data":{"current_window":"shell","current_desktop":0,"desktops":[{"clients_len":0,"is_urgent":false},{"clients_len":1,"is_urgent":true}]}}"#
        );
    }

    #[test]
    fn test_out_of_range_current_omits_selection() {
        let mut link = MockLink {
            desktop_count: 2,
            current_desktop: Some(7),
            ..Default::default()
        };

        let state = reconcile(&mut link).unwrap();
        assert_eq!(state.current, None);

        let snapshot = state.into_snapshot();
        assert!(!snapshot.data.contains_key("current_desktop"));
    }

    #[test]
    fn test_failed_required_exchange_aborts_cycle() {
        let mut link = MockLink {
            desktop_count: 2,
            current_desktop: None,
            ..Default::default()
        };
        assert!(reconcile(&mut link).is_err());

        let mut link = MockLink {
            desktop_count: 2,
            current_desktop: Some(0),
            fail_title: true,
            ..Default::default()
        };
        assert!(reconcile(&mut link).is_err());
    }

    #[test]
    fn test_unresolvable_client_excluded_from_counts() {
        let mut link = MockLink {
            desktop_count: 2,
            current_desktop: Some(0),
            clients: vec![
                MockClient {
                    desktop: Some(0),
                    urgent: Some(false),
                },
                MockClient {
                    desktop: None,
                    urgent: Some(true),
                },
            ],
            ..Default::default()
        };

        let state = reconcile(&mut link).unwrap();
        let total: u32 = state.desktops.iter().map(|d| d.clients_len).sum();
        assert_eq!(total, 1);
        assert!(!state.desktops[0].is_urgent);
    }

    #[test]
    fn test_out_of_range_client_skipped() {
        let mut link = MockLink {
            desktop_count: 2,
            current_desktop: Some(0),
            clients: vec![MockClient {
                desktop: Some(9),
                urgent: Some(true),
            }],
            ..Default::default()
        };

        let state = reconcile(&mut link).unwrap();
        assert!(state.desktops.iter().all(|d| d.clients_len == 0));
    }

    #[test]
    fn test_urgency_failure_counts_client_as_non_urgent() {
        let mut link = MockLink {
            desktop_count: 1,
            current_desktop: Some(0),
            clients: vec![MockClient {
                desktop: Some(0),
                urgent: None,
            }],
            ..Default::default()
        };

        let state = reconcile(&mut link).unwrap();
        assert_eq!(state.desktops[0].clients_len, 1);
        assert!(!state.desktops[0].is_urgent);
    }

    #[test]
    fn test_title_truncated_on_char_boundary() {
        let long = "ü".repeat(TITLE_MAX_LEN);
        let bounded = bound_title(long);
        assert!(bounded.len() <= TITLE_MAX_LEN);
        assert!(bounded.chars().all(|c| c == 'ü'));
    }

    #[test]
    fn test_run_emits_on_event_and_exits_on_shutdown() {
        let (tx, rx) = delivery_channel(8);
        let shutdown = ShutdownToken::new();

        let link = MockLink {
            desktop_count: 1,
            current_desktop: Some(0),
            title: "shell".into(),
            pending_events: 2,
            stop: Some(shutdown.clone()),
            ..Default::default()
        };

        run(link, tx, shutdown.clone());
        assert!(shutdown.is_triggered());

        let payloads: Vec<_> = rx.try_iter().collect();
        assert_eq!(payloads.len(), 2);
        for delivery in payloads {
            Snapshot::decode(&delivery.payload).unwrap();
        }
    }

    #[test]
    fn test_run_survives_repeated_wait_failures() {
        let (tx, rx) = delivery_channel(8);
        let shutdown = ShutdownToken::new();

        let link = MockLink {
            wait_fails: true,
            stop: Some(shutdown.clone()),
            ..Default::default()
        };

        // Waits keep failing; the worker never emits and never
        // crashes, and it leaves once shutdown fires.
        run(link, tx, shutdown);
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_shared_link_serializes_exchanges() {
        let link = SharedWmLink::new(MockLink {
            desktop_count: 2,
            current_desktop: Some(1),
            ..Default::default()
        });

        let mut a = link.clone();
        let mut b = link;
        assert_eq!(a.desktop_count().unwrap(), 2);
        assert_eq!(b.current_desktop().unwrap(), 1);
    }
}
