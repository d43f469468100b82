//! Shared data model for the slatbar status bar.
//!
//! This crate holds the pieces that both the widget workers and the
//! render side agree on: the bar configuration and the [`snapshot`]
//! wire contract. It deliberately knows nothing about threads, X11,
//! or HTTP - those live in the `slatbar` crate.

pub mod config;
pub mod snapshot;

pub use config::{BarConfig, WidgetEntry};
pub use snapshot::{Snapshot, SnapshotError, WidgetKind};
