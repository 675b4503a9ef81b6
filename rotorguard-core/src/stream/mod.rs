//! Stream processing for vibration samples
//!
//! ## Module Organization
//!
//! - Core errors (this file)
//! - `memory` - In-memory streams for replay and testing
//!
//! The windowing adapter that turns a sample stream into analysis windows
//! lives in [`crate::window::StreamWindower`].

use core::fmt;

use crate::errors::InputError;

#[cfg(feature = "stream-memory")]
pub mod memory;

#[cfg(feature = "stream-memory")]
pub use memory::MemoryStream;

/// Errors that can occur during stream processing
#[derive(Debug, Clone, PartialEq)]
pub enum StreamError<E> {
    /// Transport-level error from the underlying source
    Transport(E),
    /// Data format error
    Format(&'static str),
    /// Trailing samples could not fill a whole window
    Incomplete {
        /// Samples a window needs
        required: usize,
        /// Samples left over
        available: usize,
    },
    /// Sample timestamp went backwards
    OutOfOrder {
        /// Timestamp of the previous sample
        previous: u64,
        /// Timestamp of the rejected sample
        current: u64,
    },
    /// End of stream reached
    EndOfStream,
    /// Buffer overflow
    Overflow,
}

impl<E> StreamError<E> {
    /// Input error carried by this stream error, if it describes bad samples
    pub fn as_input_error(&self) -> Option<InputError> {
        match *self {
            Self::Incomplete { required, available } => {
                Some(InputError::InsufficientData { required, available })
            }
            Self::OutOfOrder { previous, current } => {
                Some(InputError::OutOfOrder { previous, current })
            }
            _ => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for StreamError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Format(msg) => write!(f, "Format error: {}", msg),
            Self::Incomplete { required, available } => {
                write!(f, "Incomplete window: need {}, have {}", required, available)
            }
            Self::OutOfOrder { previous, current } => {
                write!(f, "Out-of-order sample: {} after {}", current, previous)
            }
            Self::EndOfStream => write!(f, "End of stream"),
            Self::Overflow => write!(f, "Buffer overflow"),
        }
    }
}

// Re-export trait for convenience
pub use crate::traits::Stream;
