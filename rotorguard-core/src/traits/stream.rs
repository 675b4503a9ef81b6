//! Stream Processing Traits
//!
//! The sample source feeding an asset pipeline is modeled as a pull-based
//! stream using the `nb` crate. The consumer decides when to read, a source
//! with nothing buffered answers `WouldBlock`, and no async runtime is needed
//! at this layer.
//!
//! ## Common Patterns
//!
//! ```rust
//! use rotorguard_core::traits::Stream;
//! use rotorguard_core::stream::StreamError;
//!
//! fn drain<S>(stream: &mut S) -> Vec<S::Item>
//! where
//!     S: Stream<Error = StreamError<()>>,
//! {
//!     let mut items = Vec::new();
//!     loop {
//!         match stream.poll_next() {
//!             Ok(item) => items.push(item),
//!             Err(nb::Error::WouldBlock) => break,
//!             Err(nb::Error::Other(StreamError::EndOfStream)) => break,
//!             Err(nb::Error::Other(_)) => break,
//!         }
//!     }
//!     items
//! }
//! ```

/// Core stream trait for sample sources
///
/// ## Error Handling
///
/// Streams use a two-level error model:
/// - `nb::Error::WouldBlock` - Temporary unavailability
/// - `nb::Error::Other(E)` - Actual stream errors, including end of stream
pub trait Stream {
    /// Type of items produced by the stream
    type Item;

    /// Type of errors that can occur
    type Error;

    /// Attempt to pull the next item from the stream
    ///
    /// ## Contract
    ///
    /// - This method should not block indefinitely
    /// - Multiple `WouldBlock` returns are normal and expected
    /// - `EndOfStream` errors should be consistent (sticky)
    fn poll_next(&mut self) -> nb::Result<Self::Item, Self::Error>;

    /// Returns bounds on remaining items
    ///
    /// Default implementation returns `(0, None)` indicating unknown size.
    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, None)
    }
}
