//! Pull-stream windowing against the batch windower

mod common;

use rotorguard_core::stream::{MemoryStream, StreamError};
use rotorguard_core::traits::Stream;
use rotorguard_core::window::{RawSample, StreamWindower, Window, WindowConfig, Windower};

use common::generators::VibrationGenerator;
use common::timestamped;

/// Drain a windower, counting `WouldBlock`s and collecting terminal errors
fn drain<S>(mut windower: StreamWindower<S>) -> (Vec<Window>, usize, Vec<StreamError<()>>)
where
    S: Stream<Item = RawSample, Error = StreamError<()>>,
{
    let mut windows = Vec::new();
    let mut blocked = 0;
    let mut errors = Vec::new();
    loop {
        match windower.poll_next() {
            Ok(w) => windows.push(w),
            Err(nb::Error::WouldBlock) => blocked += 1,
            Err(nb::Error::Other(StreamError::EndOfStream)) => break,
            Err(nb::Error::Other(e)) => errors.push(e),
        }
    }
    (windows, blocked, errors)
}

#[test]
fn stream_and_batch_agree() {
    let mut generator = VibrationGenerator::new(11);
    let samples = timestamped(&generator.healthy(6_000), 0);

    let batch: Vec<Window> = Windower::new(&samples, WindowConfig::default())
        .unwrap()
        .iter()
        .filter_map(|w| w.ok())
        .collect();

    let source = MemoryStream::new(&samples).with_burst(300);
    let (streamed, blocked, errors) = drain(StreamWindower::new(source, WindowConfig::default()).unwrap());

    assert!(blocked > 0);
    assert_eq!(streamed, batch);
    assert_eq!(
        errors,
        vec![StreamError::Incomplete { required: 1024, available: 1024 - 512 + (6_000 - 1024) % 512 }]
    );
}

#[test]
fn exact_fit_ends_cleanly() {
    let mut generator = VibrationGenerator::new(12);
    let samples = timestamped(&generator.healthy(1024 + 512 * 3), 0);
    let source = MemoryStream::new(&samples);
    let (windows, _, errors) = drain(StreamWindower::new(source, WindowConfig::default()).unwrap());
    assert_eq!(windows.len(), 4);
    assert!(errors.is_empty());
}

#[test]
fn short_stream_reports_shortfall() {
    let samples = timestamped(&[0.1; 300], 0);
    let source = MemoryStream::new(&samples);
    let (windows, _, errors) = drain(StreamWindower::new(source, WindowConfig::default()).unwrap());
    assert!(windows.is_empty());
    assert_eq!(errors, vec![StreamError::Incomplete { required: 1024, available: 300 }]);
    assert_eq!(
        errors[0].as_input_error(),
        Some(rotorguard_core::InputError::InsufficientData { required: 1024, available: 300 })
    );
}
