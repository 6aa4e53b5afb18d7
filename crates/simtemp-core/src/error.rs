//! Error types for the sampling engine.
//!
//! `SimtempError` is the single error type surfaced by every fallible engine
//! operation. It is built with `thiserror` so lower-level errors (`figment`
//! configuration errors, `std::io::Error` from runtime construction or from a
//! consumer's destination writer) convert with `?`.
//!
//! ## Error Categories
//!
//! - **`InvalidArgument`**: a control-surface write or a configuration value was
//!   rejected. Engine state is left untouched.
//! - **`WouldBlock`**: a non-blocking read found the store empty. This is an
//!   expected outcome and is never logged as an error.
//! - **`Interrupted`**: a blocking read or readiness wait was aborted from the
//!   outside (interrupt request or engine shutdown).
//! - **`Fault`**: copying a record to the caller's destination failed. The
//!   sample is put back and remains readable.
//!
//! Every variant maps to a stable errno-style code through [`SimtempError::code`];
//! the engine statistics record these codes in `last_error`.

use std::io;

use thiserror::Error;

/// Errno-style code for an invalid argument.
pub const EINVAL: u32 = 22;
/// Errno-style code for "try again" (non-blocking read on an empty store).
pub const EAGAIN: u32 = 11;
/// Errno-style code for an interrupted wait.
pub const EINTR: u32 = 4;
/// Errno-style code for a failed copy to the caller's destination.
pub const EFAULT: u32 = 14;
/// Errno-style code for generic I/O or runtime failures.
pub const EIO: u32 = 5;

/// Convenience alias for results using the engine error type.
pub type SimtempResult<T> = std::result::Result<T, SimtempError>;

/// Primary error type for the simulated sensor engine.
#[derive(Error, Debug)]
pub enum SimtempError {
    /// A configuration or control-surface value failed validation.
    ///
    /// **Recovery Strategy**: report to the caller; the previous value stays in
    /// effect.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A non-blocking read was issued while no sample was available.
    ///
    /// **Recovery Strategy**: wait for readiness or retry later.
    #[error("No sample available")]
    WouldBlock,

    /// A blocking read or readiness wait was interrupted before a sample
    /// arrived.
    #[error("Wait interrupted")]
    Interrupted,

    /// Copying a record to the caller's destination failed.
    ///
    /// The sample is not consumed.
    #[error("Failed to copy record to destination: {0}")]
    Fault(#[source] io::Error),

    /// Configuration sources could not be parsed or merged.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Runtime or other I/O failure (e.g. the scheduler runtime could not be
    /// built).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A sampler task ended abnormally during shutdown.
    ///
    /// The engine is still fully stopped; `last_error` holds [`EIO`].
    #[error("Sampler runtime failure: {0}")]
    Runtime(String),
}

impl SimtempError {
    /// Errno-style code for this error, as recorded in `last_error`.
    pub fn code(&self) -> u32 {
        match self {
            SimtempError::InvalidArgument(_) | SimtempError::Config(_) => EINVAL,
            SimtempError::WouldBlock => EAGAIN,
            SimtempError::Interrupted => EINTR,
            SimtempError::Fault(_) => EFAULT,
            SimtempError::Io(_) | SimtempError::Runtime(_) => EIO,
        }
    }

    /// Shorthand for building an [`SimtempError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        SimtempError::InvalidArgument(message.into())
    }
}

impl From<figment::Error> for SimtempError {
    fn from(err: figment::Error) -> Self {
        SimtempError::Config(Box::new(err))
    }
}

impl From<SimtempError> for io::Error {
    fn from(err: SimtempError) -> Self {
        match err {
            SimtempError::WouldBlock => io::Error::from(io::ErrorKind::WouldBlock),
            SimtempError::Interrupted => io::Error::from(io::ErrorKind::Interrupted),
            SimtempError::InvalidArgument(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            SimtempError::Fault(inner) | SimtempError::Io(inner) => inner,
            other => io::Error::other(other.to_string()),
        }
    }
}
