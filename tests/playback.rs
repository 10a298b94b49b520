use dicom_stack_viewer::{PlaybackController, PlaybackError};
use std::time::Duration;
use tokio::time::{self, Instant};

// ---------------------------------------------------------------------------
// Start / stop
// ---------------------------------------------------------------------------

#[test]
fn test_start_needs_a_runtime() {
    let mut playback = PlaybackController::new(100);
    assert_eq!(playback.start(100), Err(PlaybackError::NoRuntime));
    assert!(!playback.is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_is_rejected() {
    let mut playback = PlaybackController::new(100);
    assert_eq!(playback.start(0), Err(PlaybackError::InvalidInterval));
    assert_eq!(playback.set_interval(0), Err(PlaybackError::InvalidInterval));
    assert_eq!(playback.interval_ms(), 100);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let mut playback = PlaybackController::new(100);
    assert!(!playback.stop());

    playback.start(100).unwrap();
    assert!(playback.is_playing());
    assert!(playback.stop());
    assert!(!playback.stop());
    assert_eq!(playback.next_tick().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_flips_state() {
    let mut playback = PlaybackController::new(40);
    assert_eq!(playback.toggle(), Ok(true));
    assert_eq!(playback.toggle(), Ok(false));
    assert!(!playback.is_playing());
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_ticks_follow_interval() {
    let mut playback = PlaybackController::new(100);
    playback.start(100).unwrap();

    let started = Instant::now();
    for expected in [100, 200, 300] {
        assert!(playback.next_tick().await.is_some());
        assert_eq!(started.elapsed(), Duration::from_millis(expected));
    }
}

#[tokio::test(start_paused = true)]
async fn test_interval_change_restarts_timer() {
    let mut playback = PlaybackController::new(100);
    playback.start(100).unwrap();
    time::sleep(Duration::from_millis(350)).await;

    playback.set_interval(250).unwrap();
    assert!(playback.is_playing());
    assert_eq!(playback.interval_ms(), 250);
    // ticks queued by the old timer are dropped
    assert!(playback.drain_ticks().is_empty());

    let restarted = Instant::now();
    assert!(playback.next_tick().await.is_some());
    assert_eq!(restarted.elapsed(), Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn test_interval_change_while_stopped_does_not_start() {
    let mut playback = PlaybackController::new(100);
    playback.set_interval(30).unwrap();
    assert!(!playback.is_playing());
    assert_eq!(playback.interval_ms(), 30);
}

#[tokio::test(start_paused = true)]
async fn test_drain_collects_elapsed_ticks() {
    let mut playback = PlaybackController::new(50);
    playback.start(50).unwrap();
    time::sleep(Duration::from_millis(120)).await;
    assert_eq!(playback.drain_ticks().len(), 2);
    assert!(playback.drain_ticks().is_empty());
}
