//! Error taxonomy for widget workers.

use slatbar_core::SnapshotError;
use thiserror::Error;

use crate::delivery::DeliveryError;

/// What can go wrong inside one widget's update cycle.
///
/// Severity is encoded in the variant: [`WidgetError::Configuration`]
/// ends that one worker (required static input is absent with no
/// fallback); every other variant aborts only the current cycle and
/// the worker carries on at its normal cadence. No variant is ever
/// fatal to the process, and no error crosses a worker boundary.
#[derive(Debug, Error)]
pub enum WidgetError {
    /// A single request/reply exchange with a collaborator failed.
    #[error("collaborator request failed: {0}")]
    Collaborator(String),

    /// A collaborator's response could not be parsed.
    #[error("malformed collaborator response: {0}")]
    Parse(String),

    /// Required static input is missing and there is no fallback.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The render surface could not accept the payload.
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// A snapshot could not be serialized.
    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] SnapshotError),
}

impl WidgetError {
    /// Whether this error should end the worker rather than one cycle.
    pub fn is_fatal_to_worker(&self) -> bool {
        matches!(self, WidgetError::Configuration(_))
    }
}
