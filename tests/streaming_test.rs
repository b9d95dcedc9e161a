use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use num_complex::Complex32;

use iqbridge::mock::MockRadio;
use iqbridge::{IqSource, SessionState, SourceError, SourceEvent};

/// Pull until `target` samples have been produced or a deadline passes.
fn pull_at_least(source: &mut IqSource<MockRadio>, channel: usize, target: u64) -> u64 {
    let mut out = vec![Complex32::default(); 4096];
    let mut total = 0u64;
    let deadline = Instant::now() + Duration::from_secs(10);
    while total < target && Instant::now() < deadline {
        source
            .wait_available(channel, Duration::from_millis(20))
            .unwrap();
        total += source.pull(channel, &mut out).unwrap() as u64;
    }
    total
}

#[test]
fn test_stream_delivers_scaled_contiguous_samples() {
    let mut source = IqSource::select(MockRadio::single(), 1).unwrap();
    assert_eq!(source.state(), SessionState::Selected);
    source.start().unwrap();

    let mut out = vec![Complex32::default(); 4096];
    let mut produced = 0;
    let deadline = Instant::now() + Duration::from_secs(5);
    while produced == 0 && Instant::now() < deadline {
        source.wait_available(0, Duration::from_millis(20)).unwrap();
        produced = source.pull(0, &mut out).unwrap();
    }
    assert!(produced > 0, "no samples within deadline");
    assert_eq!(source.state(), SessionState::Running);

    // The mock emits a half-scale tone, so every sample sits on a circle
    // of radius 0.5 after conversion
    for sample in &out[..produced] {
        assert_relative_eq!(sample.norm(), 0.5, epsilon = 0.01);
    }

    source.stop().unwrap();
    assert_eq!(source.state(), SessionState::Stopped);
}

#[test]
fn test_drain_never_outruns_delivery() {
    let mut source = IqSource::select(MockRadio::single(), 1).unwrap();
    source.start().unwrap();

    let total = pull_at_least(&mut source, 0, 100_000);
    assert!(total >= 100_000, "expected 100k samples, got {}", total);

    let stats = source.channel_stats(0).unwrap();
    assert!(
        stats.delivered >= total,
        "pulled {} but only {} delivered",
        total,
        stats.delivered
    );
    assert_eq!(stats.gaps, 0);
    assert_eq!(stats.samples_lost, 0);

    source.stop().unwrap();
}

#[test]
fn test_pull_before_start_is_precondition_error() {
    let mut source = IqSource::select(MockRadio::single(), 1).unwrap();
    let mut out = vec![Complex32::default(); 64];
    let err = source.pull(0, &mut out).unwrap_err();
    assert!(matches!(err, SourceError::InvalidState { .. }));
    // No state mutation on misuse
    assert_eq!(source.state(), SessionState::Selected);
}

#[test]
fn test_stop_is_idempotent() {
    let mut source = IqSource::select(MockRadio::single(), 1).unwrap();
    source.start().unwrap();
    source.stop().unwrap();
    source.stop().unwrap();
    assert_eq!(source.state(), SessionState::Stopped);

    // The device is closed; nothing may be reconfigured or pulled
    assert!(matches!(
        source.set_center_freq(0, 7.1e6),
        Err(SourceError::InvalidState { .. })
    ));
    let mut out = vec![Complex32::default(); 64];
    assert!(matches!(
        source.pull(0, &mut out),
        Err(SourceError::InvalidState { .. })
    ));
}

#[test]
fn test_stop_without_start_is_safe() {
    let mut source = IqSource::select(MockRadio::single(), 1).unwrap();
    source.stop().unwrap();
    assert_eq!(source.state(), SessionState::Stopped);
}

#[test]
fn test_overflow_reports_one_event_per_episode() {
    let mut source = IqSource::select(MockRadio::single(), 1)
        .unwrap()
        .with_ring_capacity(2048);
    let events = source.events();
    source.start().unwrap();

    // Never pull: the ring fills and stays full for the whole window
    std::thread::sleep(Duration::from_millis(300));
    source.stop().unwrap();

    let overflows = events
        .try_iter()
        .filter(|e| matches!(e, SourceEvent::Overflow { .. }))
        .count();
    assert_eq!(overflows, 1, "expected a single overflow episode");

    let stats = source.channel_stats(0);
    assert!(stats.is_none(), "buffers are released at stop");
}

#[test]
fn test_dual_channels_stream_independently() {
    let mut source = IqSource::select(MockRadio::duo(), 2).unwrap();
    assert_eq!(source.num_channels(), 2);
    source.start().unwrap();

    let first = pull_at_least(&mut source, 0, 20_000);
    let second = pull_at_least(&mut source, 1, 20_000);
    assert!(first >= 20_000);
    assert!(second >= 20_000);

    for channel in 0..2 {
        let stats = source.channel_stats(channel).unwrap();
        assert_eq!(stats.gaps, 0, "channel {} saw gaps", channel);
    }
    source.stop().unwrap();
}
