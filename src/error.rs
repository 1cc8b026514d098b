//! Unified error handling for the guidance engine.
//!
//! Geometry never fails (it returns sentinels instead), so everything here
//! comes from session lifecycle, route construction and recalculation.

use thiserror::Error;

use crate::session::NavigationState;

/// Errors produced by the guidance engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GuidanceError {
    /// Malformed fix, route or destination. The session is left untouched.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Instruction lookup outside `[0, len)`. A programming error on the caller side.
    #[error("instruction index {index} out of range (route has {len} instructions)")]
    IndexOutOfRange { index: usize, len: usize },

    /// The route provider could not deliver a route (network or parsing failure).
    #[error("route unavailable: {0}")]
    RouteUnavailable(String),

    /// A recalculation is already in flight for this session.
    #[error("recalculation already in progress")]
    AlreadyInProgress,

    /// Navigation cannot start on a route without geometry or instructions.
    #[error("route has no usable geometry or instructions")]
    EmptyRoute,

    /// Navigation cannot start towards an invalid destination.
    #[error("destination is not a valid coordinate")]
    InvalidDestination,

    /// The requested operation is not allowed in the current session state.
    #[error("cannot {operation} while session is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: NavigationState,
    },
}

impl GuidanceError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        GuidanceError::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Whether the error leaves an active session able to continue guiding.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GuidanceError::InvalidInput { .. }
                | GuidanceError::RouteUnavailable(_)
                | GuidanceError::AlreadyInProgress
                | GuidanceError::InvalidState { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, GuidanceError>;

/// Convenience conversions from `Option` into guidance errors.
pub trait OptionExt<T> {
    fn ok_or_index_out_of_range(self, index: usize, len: usize) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_index_out_of_range(self, index: usize, len: usize) -> Result<T> {
        self.ok_or(GuidanceError::IndexOutOfRange { index, len })
    }
}
