//! slatbar - a status-bar host for independent widget workers.
//!
//! Each configured widget runs on its own worker thread for the process
//! lifetime, under one of two scheduling disciplines: event-driven
//! (block on a window-manager notification, re-derive whole state) or
//! timed poll (fetch on a fixed cadence). Workers build immutable
//! snapshots, serialize them, and push them onto a bounded delivery
//! channel; a single consumer thread drains the channel and applies
//! each payload to the render surface. Workers never block on the
//! consumer and never read render state back.

pub mod delivery;
pub mod errors;
pub mod http;
pub mod render;
pub mod widgets;
pub mod worker;

pub use delivery::{DeliveryError, DeliveryReceiver, DeliverySender, delivery_channel};
pub use errors::WidgetError;
pub use render::{RenderSurface, StatusLine, run_consumer};
pub use worker::{ShutdownToken, WorkerHandle};
