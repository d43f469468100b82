//! EWMH-backed [`WmLink`] over an X11 connection.
//!
//! One connection per worker: the X protocol multiplexes replies by
//! sequence number over a single channel, so sharing an unsynchronized
//! connection across threads can hand one thread another thread's
//! reply. Owning the connection removes that hazard instead of hiding
//! it behind a lock.
//!
//! Property set mirrors what the bar needs: `_NET_ACTIVE_WINDOW`,
//! `_NET_WM_NAME`, `_NET_NUMBER_OF_DESKTOPS`, `_NET_CURRENT_DESKTOP`,
//! `_NET_CLIENT_LIST`, `_NET_WM_DESKTOP`, and the ICCCM `WM_HINTS`
//! urgency flag.

use std::time::{Duration, Instant};

use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ChangeWindowAttributesAux, ConnectionExt, EventMask, Window,
};
use x11rb::rust_connection::RustConnection;

use crate::errors::WidgetError;
use crate::widgets::desktops::{WindowId, WmLink};

/// ICCCM WM_HINTS urgency flag (XUrgencyHint).
const WM_HINT_URGENCY: u32 = 1 << 8;

/// Granularity of the cancellable event wait.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Atoms {
    net_active_window: Atom,
    net_wm_name: Atom,
    utf8_string: Atom,
    net_number_of_desktops: Atom,
    net_current_desktop: Atom,
    net_client_list: Atom,
    net_wm_desktop: Atom,
}

/// X11 window-manager link, owned by one desktops worker.
pub struct EwmhLink {
    conn: RustConnection,
    root: Window,
    atoms: Atoms,
}

fn exchange_err(context: &str, err: impl std::fmt::Display) -> WidgetError {
    WidgetError::Collaborator(format!("{context}: {err}"))
}

impl EwmhLink {
    /// Connect to the display named by `$DISPLAY`.
    ///
    /// Failure here means the widget cannot start at all, so it is
    /// reported as a configuration error rather than a cycle failure.
    pub fn connect() -> Result<Self, WidgetError> {
        let (conn, screen_num) = x11rb::connect(None)
            .map_err(|e| WidgetError::Configuration(format!("cannot open display: {e}")))?;
        let root = conn.setup().roots[screen_num].root;

        let atoms = Atoms {
            net_active_window: Self::intern(&conn, "_NET_ACTIVE_WINDOW")?,
            net_wm_name: Self::intern(&conn, "_NET_WM_NAME")?,
            utf8_string: Self::intern(&conn, "UTF8_STRING")?,
            net_number_of_desktops: Self::intern(&conn, "_NET_NUMBER_OF_DESKTOPS")?,
            net_current_desktop: Self::intern(&conn, "_NET_CURRENT_DESKTOP")?,
            net_client_list: Self::intern(&conn, "_NET_CLIENT_LIST")?,
            net_wm_desktop: Self::intern(&conn, "_NET_WM_DESKTOP")?,
        };

        debug!("ewmh: connected, root window {:#x}", root);
        Ok(Self { conn, root, atoms })
    }

    fn intern(conn: &RustConnection, name: &str) -> Result<Atom, WidgetError> {
        Ok(conn
            .intern_atom(false, name.as_bytes())
            .map_err(|e| WidgetError::Configuration(format!("intern {name}: {e}")))?
            .reply()
            .map_err(|e| WidgetError::Configuration(format!("intern {name}: {e}")))?
            .atom)
    }

    /// Fetch a 32-bit property, requiring it to exist.
    fn property_u32(&self, window: Window, atom: Atom, name: &str) -> Result<u32, WidgetError> {
        let reply = self
            .conn
            .get_property(false, window, atom, AtomEnum::ANY, 0, 1)
            .map_err(|e| exchange_err(name, e))?
            .reply()
            .map_err(|e| exchange_err(name, e))?;

        reply
            .value32()
            .and_then(|mut values| values.next())
            .ok_or_else(|| WidgetError::Collaborator(format!("{name}: property not set")))
    }
}

impl WmLink for EwmhLink {
    fn subscribe(&mut self) -> Result<(), WidgetError> {
        let values = ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE);
        self.conn
            .change_window_attributes(self.root, &values)
            .map_err(|e| {
                WidgetError::Configuration(format!("property change subscription: {e}"))
            })?
            .check()
            .map_err(|e| {
                WidgetError::Configuration(format!("property change subscription: {e}"))
            })?;
        Ok(())
    }

    fn wait_for_event(&mut self, timeout: Duration) -> Result<bool, WidgetError> {
        let deadline = Instant::now() + timeout;
        loop {
            while let Some(event) = self
                .conn
                .poll_for_event()
                .map_err(|e| exchange_err("event wait", e))?
            {
                if matches!(event, Event::PropertyNotify(_)) {
                    return Ok(true);
                }
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn active_window(&mut self) -> Result<WindowId, WidgetError> {
        let window = self.property_u32(self.root, self.atoms.net_active_window, "active window")?;
        if window == 0 {
            return Err(WidgetError::Collaborator("no active window".into()));
        }
        Ok(window)
    }

    fn window_title(&mut self, window: WindowId) -> Result<String, WidgetError> {
        let reply = self
            .conn
            .get_property(
                false,
                window,
                self.atoms.net_wm_name,
                self.atoms.utf8_string,
                0,
                u32::MAX,
            )
            .map_err(|e| exchange_err("window title", e))?
            .reply()
            .map_err(|e| exchange_err("window title", e))?;

        if reply.format == 0 {
            return Err(WidgetError::Collaborator(
                "window has no _NET_WM_NAME".into(),
            ));
        }
        Ok(String::from_utf8_lossy(&reply.value).into_owned())
    }

    fn desktop_count(&mut self) -> Result<u32, WidgetError> {
        self.property_u32(self.root, self.atoms.net_number_of_desktops, "desktop count")
    }

    fn current_desktop(&mut self) -> Result<u32, WidgetError> {
        self.property_u32(self.root, self.atoms.net_current_desktop, "current desktop")
    }

    fn client_list(&mut self) -> Result<Vec<WindowId>, WidgetError> {
        let reply = self
            .conn
            .get_property(
                false,
                self.root,
                self.atoms.net_client_list,
                AtomEnum::WINDOW,
                0,
                u32::MAX,
            )
            .map_err(|e| exchange_err("client list", e))?
            .reply()
            .map_err(|e| exchange_err("client list", e))?;

        reply
            .value32()
            .map(|values| values.collect())
            .ok_or_else(|| WidgetError::Collaborator("client list: property not set".into()))
    }

    fn window_desktop(&mut self, window: WindowId) -> Result<u32, WidgetError> {
        self.property_u32(window, self.atoms.net_wm_desktop, "window desktop")
    }

    fn window_urgency(&mut self, window: WindowId) -> Result<bool, WidgetError> {
        let flags = self.property_u32(window, AtomEnum::WM_HINTS.into(), "window hints")?;
        Ok(flags & WM_HINT_URGENCY != 0)
    }
}
