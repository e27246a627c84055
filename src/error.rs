//! # Error Types
//!
//! Custom error types for the external module pulse driver using `thiserror`.

use thiserror::Error;

use crate::pulses::driver::DriverState;
use crate::pulses::protocol::ProtocolKind;

/// Main error type for the pulse driver
#[derive(Debug, Error)]
pub enum ExtModuleError {
    /// Operation called from a driver state that does not allow it
    #[error("{operation} not allowed while driver is {state:?}")]
    IllegalState {
        operation: &'static str,
        state: DriverState,
    },

    /// Frame protocol does not match the protocol the module was started with
    #[error("frame protocol {frame:?} does not match session protocol {session:?}")]
    ProtocolMismatch {
        session: ProtocolKind,
        frame: ProtocolKind,
    },

    /// The driver service task is no longer running
    #[error("pulse service is closed")]
    ServiceClosed,

    /// The service queue had no room for an interrupt event
    #[error("interrupt queue full, {0:?} dropped")]
    IrqQueueFull(crate::service::IrqEvent),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the pulse driver
pub type Result<T> = std::result::Result<T, ExtModuleError>;
