//! Windowing of vibration sample streams
//!
//! Feature extraction works on fixed-length analysis windows that overlap by
//! `window_size - hop_size` samples. Two producers are provided:
//!
//! - [`Windower`] slices an in-memory capture. Its iterator is lazy and can be
//!   restarted any number of times; every window copies its own samples so
//!   no mutable state is shared between windows.
//! - [`StreamWindower`] adapts a pull [`Stream`] of samples and keeps only one
//!   window's worth of samples buffered.
//!
//! Both drop a trailing partial window instead of padding it (zero padding
//! would smear energy across the spectrum) and report the drop once as
//! [`InputError::InsufficientData`].
//!
//! ```text
//! samples:  |-------------------------------------------|
//! window 0: |==========|
//! window 1:       |==========|
//! window 2:             |==========|
//! window 3:                   |==========|
//! tail:                             |.........|   → InsufficientData
//!           <-hop->
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::InputError;
use crate::stream::StreamError;
use crate::time::Timestamp;
use crate::traits::Stream;

/// Default analysis window length in samples
pub const DEFAULT_WINDOW_SIZE: usize = 1024;

/// Default stride between window starts (50% overlap)
pub const DEFAULT_HOP_SIZE: usize = 512;

/// Smallest window the feature extractor can work with
pub const MIN_WINDOW_SIZE: usize = 8;

/// Single vibration reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Acquisition time in microseconds
    pub timestamp: Timestamp,
    /// Acceleration amplitude
    pub amplitude: f64,
}

impl RawSample {
    /// Create a sample
    pub fn new(timestamp: Timestamp, amplitude: f64) -> Self {
        Self { timestamp, amplitude }
    }
}

/// Window geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Samples per window (N)
    pub window_size: usize,
    /// Samples between consecutive window starts (S)
    pub hop_size: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            hop_size: DEFAULT_HOP_SIZE,
        }
    }
}

impl WindowConfig {
    /// Check geometry
    pub fn validate(&self) -> Result<(), InputError> {
        if self.window_size < MIN_WINDOW_SIZE {
            return Err(InputError::InvalidConfig(format!(
                "window_size must be at least {}, got {}",
                MIN_WINDOW_SIZE, self.window_size
            )));
        }
        if self.hop_size == 0 {
            return Err(InputError::InvalidConfig("hop_size must be positive".into()));
        }
        Ok(())
    }

    /// Samples shared by consecutive windows
    pub fn overlap(&self) -> usize {
        self.window_size.saturating_sub(self.hop_size)
    }

    /// Number of full windows in `len` samples
    pub fn window_count(&self, len: usize) -> usize {
        if len < self.window_size || self.hop_size == 0 {
            return 0;
        }
        (len - self.window_size) / self.hop_size + 1
    }
}

/// Immutable analysis window
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    index: u64,
    start: Timestamp,
    hop: usize,
    samples: Arc<[f64]>,
}

impl Window {
    /// Build a window from already-sliced amplitudes
    pub fn new(index: u64, start: Timestamp, hop: usize, samples: Vec<f64>) -> Self {
        Self {
            index,
            start,
            hop,
            samples: samples.into(),
        }
    }

    fn from_samples(index: u64, hop: usize, samples: &[RawSample]) -> Self {
        let start = samples.first().map(|s| s.timestamp).unwrap_or_default();
        Self {
            index,
            start,
            hop,
            samples: samples.iter().map(|s| s.amplitude).collect(),
        }
    }

    /// Position of this window in its stream
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Timestamp of the first sample
    pub fn start(&self) -> Timestamp {
        self.start
    }

    /// Stride used to produce this window
    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Samples shared with the next window
    pub fn overlap(&self) -> usize {
        self.samples.len().saturating_sub(self.hop)
    }

    /// Amplitudes in acquisition order
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True for a window without samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Restartable windowing over an in-memory capture
#[derive(Debug, Clone, Copy)]
pub struct Windower<'a> {
    samples: &'a [RawSample],
    config: WindowConfig,
}

impl<'a> Windower<'a> {
    /// Create a windower after validating `config`
    pub fn new(samples: &'a [RawSample], config: WindowConfig) -> Result<Self, InputError> {
        config.validate()?;
        Ok(Self { samples, config })
    }

    /// Fresh lazy iterator starting at the first window
    pub fn iter(&self) -> Windows<'a> {
        Windows {
            samples: self.samples,
            config: self.config,
            next_start: 0,
            last_end: 0,
            index: 0,
            done: false,
        }
    }

    /// Number of full windows this capture yields
    pub fn window_count(&self) -> usize {
        self.config.window_count(self.samples.len())
    }

    /// Geometry in use
    pub fn config(&self) -> &WindowConfig {
        &self.config
    }
}

impl<'a> IntoIterator for &Windower<'a> {
    type Item = Result<Window, InputError>;
    type IntoIter = Windows<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator produced by [`Windower::iter`]
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    samples: &'a [RawSample],
    config: WindowConfig,
    next_start: usize,
    last_end: usize,
    index: u64,
    done: bool,
}

impl<'a> Iterator for Windows<'a> {
    type Item = Result<Window, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let len = self.samples.len();
        let size = self.config.window_size;

        if self.next_start + size <= len {
            let slice = &self.samples[self.next_start..self.next_start + size];
            let window = Window::from_samples(self.index, self.config.hop_size, slice);
            self.last_end = self.next_start + size;
            self.next_start += self.config.hop_size;
            self.index += 1;
            return Some(Ok(window));
        }

        self.done = true;

        // Samples past both the last window and the next start form an unfillable tail
        let uncovered = len > self.next_start.max(self.last_end);
        if uncovered || self.index == 0 {
            return Some(Err(InputError::InsufficientData {
                required: size,
                available: len.saturating_sub(self.next_start),
            }));
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let remaining = self.samples.len().saturating_sub(self.next_start);
        let windows = self.config.window_count(remaining);
        (windows, Some(windows + 1))
    }
}

/// Windowing adapter over a pull stream of samples
///
/// Emits a [`Window`] as soon as `window_size` samples are buffered. At end of
/// stream a partial window is reported once as [`StreamError::Incomplete`],
/// then `EndOfStream` is returned from then on.
pub struct StreamWindower<S> {
    source: S,
    config: WindowConfig,
    buffer: VecDeque<RawSample>,
    /// Samples to discard before the next window when hop exceeds the window
    skip: usize,
    /// Samples buffered since the last emitted window
    fresh: usize,
    index: u64,
    last_timestamp: Option<Timestamp>,
    finished: bool,
}

impl<S> StreamWindower<S> {
    /// Wrap `source` after validating `config`
    pub fn new(source: S, config: WindowConfig) -> Result<Self, InputError> {
        config.validate()?;
        Ok(Self {
            source,
            config,
            buffer: VecDeque::with_capacity(config.window_size),
            skip: 0,
            fresh: 0,
            index: 0,
            last_timestamp: None,
            finished: false,
        })
    }

    /// Windows emitted so far
    pub fn windows_emitted(&self) -> u64 {
        self.index
    }

    /// Samples currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Recover the wrapped source
    pub fn into_inner(self) -> S {
        self.source
    }

    fn emit(&mut self) -> Window {
        let size = self.config.window_size;
        let hop = self.config.hop_size;
        let samples: Vec<RawSample> = self.buffer.iter().take(size).copied().collect();
        let window = Window::from_samples(self.index, hop, &samples);

        let drain = hop.min(self.buffer.len());
        self.buffer.drain(..drain);
        self.skip = hop.saturating_sub(size);
        self.fresh = 0;
        self.index += 1;
        window
    }
}

impl<S, E> Stream for StreamWindower<S>
where
    S: Stream<Item = RawSample, Error = StreamError<E>>,
{
    type Item = Window;
    type Error = StreamError<E>;

    fn poll_next(&mut self) -> nb::Result<Self::Item, Self::Error> {
        if self.finished {
            return Err(nb::Error::Other(StreamError::EndOfStream));
        }

        loop {
            if self.buffer.len() >= self.config.window_size {
                return Ok(self.emit());
            }

            match self.source.poll_next() {
                Ok(sample) => {
                    if let Some(previous) = self.last_timestamp {
                        if sample.timestamp < previous {
                            return Err(nb::Error::Other(StreamError::OutOfOrder {
                                previous,
                                current: sample.timestamp,
                            }));
                        }
                    }
                    self.last_timestamp = Some(sample.timestamp);

                    if self.skip > 0 {
                        self.skip -= 1;
                        continue;
                    }
                    self.buffer.push_back(sample);
                    self.fresh += 1;
                }
                Err(nb::Error::WouldBlock) => return Err(nb::Error::WouldBlock),
                Err(nb::Error::Other(StreamError::EndOfStream)) => {
                    self.finished = true;
                    if self.fresh > 0 || self.index == 0 {
                        let available = self.buffer.len();
                        self.buffer.clear();
                        return Err(nb::Error::Other(StreamError::Incomplete {
                            required: self.config.window_size,
                            available,
                        }));
                    }
                    return Err(nb::Error::Other(StreamError::EndOfStream));
                }
                Err(nb::Error::Other(err)) => return Err(nb::Error::Other(err)),
            }
        }
    }
}
