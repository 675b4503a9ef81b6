//! Memory-based streams for testing and replay
//!
//! Useful for replaying recorded vibration captures and for feeding synthetic
//! signals to the pipeline in tests.

use super::{Stream, StreamError};

/// Memory-based stream over a slice of items
///
/// ## Example
///
/// ```rust
/// use rotorguard_core::stream::MemoryStream;
/// use rotorguard_core::traits::Stream;
/// use rotorguard_core::window::RawSample;
///
/// let samples: Vec<RawSample> = (0..4)
///     .map(|i| RawSample::new(i * 50, 0.1 * i as f64))
///     .collect();
///
/// let mut stream = MemoryStream::new(&samples);
/// let mut count = 0;
/// while let Ok(_sample) = stream.poll_next() {
///     count += 1;
/// }
/// assert_eq!(count, 4);
/// ```
pub struct MemoryStream<'a, T> {
    /// Slice of items to stream
    items: &'a [T],
    /// Current position
    position: usize,
    /// Items released per poll before yielding `WouldBlock`, `None` for no limit
    burst: Option<usize>,
    /// Items released since the last `WouldBlock`
    released: usize,
}

impl<'a, T: Clone> MemoryStream<'a, T> {
    /// Create new memory stream from slice
    pub fn new(items: &'a [T]) -> Self {
        Self {
            items,
            position: 0,
            burst: None,
            released: 0,
        }
    }

    /// Release at most `burst` items before reporting `WouldBlock` once
    ///
    /// Simulates a live acquisition source that delivers samples in chunks.
    pub fn with_burst(mut self, burst: usize) -> Self {
        self.burst = Some(burst.max(1));
        self
    }

    /// Reset to beginning
    pub fn reset(&mut self) {
        self.position = 0;
        self.released = 0;
    }

    /// Get current position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Check if stream is exhausted
    pub fn is_exhausted(&self) -> bool {
        self.position >= self.items.len()
    }
}

impl<'a, T: Clone> Stream for MemoryStream<'a, T> {
    type Item = T;
    type Error = StreamError<()>;

    fn poll_next(&mut self) -> nb::Result<Self::Item, Self::Error> {
        if self.position >= self.items.len() {
            return Err(nb::Error::Other(StreamError::EndOfStream));
        }

        if let Some(burst) = self.burst {
            if self.released >= burst {
                self.released = 0;
                return Err(nb::Error::WouldBlock);
            }
        }

        let item = self.items[self.position].clone();
        self.position += 1;
        self.released += 1;
        Ok(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.items.len() - self.position;
        (remaining, Some(remaining))
    }
}
