//! Fixed-interval frame pacing.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::config::ConfigError;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Time budget of a single frame, `1s / fps`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInterval {
    nanos: u64,
}

impl FrameInterval {
    pub fn from_fps(fps: u32) -> Result<Self, ConfigError> {
        if fps == 0 {
            return Err(ConfigError::ZeroFrameRate);
        }
        Ok(Self {
            nanos: NANOS_PER_SEC / fps as u64,
        })
    }

    pub fn as_nanos(&self) -> u64 {
        self.nanos
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_nanos(self.nanos)
    }
}

/// Sleeps one full frame interval after every frame.
///
/// Processing time is not subtracted, so the achieved rate is always at or
/// below the target. There is no catch-up after a slow frame.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    interval: FrameInterval,
}

impl Pacer {
    pub fn new(interval: FrameInterval) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> FrameInterval {
        self.interval
    }

    pub async fn pace(&self, frame_start: Instant) {
        trace!("frame took {:?}", frame_start.elapsed());
        tokio::time::sleep(self.interval.as_duration()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_from_fps() {
        assert_eq!(FrameInterval::from_fps(30).unwrap().as_nanos(), 33_333_333);
        assert_eq!(FrameInterval::from_fps(1).unwrap().as_nanos(), 1_000_000_000);
        assert_eq!(
            FrameInterval::from_fps(60).unwrap().as_duration(),
            Duration::from_nanos(16_666_666)
        );
        assert!(matches!(FrameInterval::from_fps(0), Err(ConfigError::ZeroFrameRate)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_full_interval_per_frame() {
        let pacer = Pacer::new(FrameInterval::from_fps(50).unwrap());
        let start = Instant::now();

        for _ in 0..100 {
            pacer.pace(Instant::now()).await;
        }

        // 100 frames at 50 fps with no work take 2 s, never less
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_processing_time_is_not_subtracted() {
        let pacer = Pacer::new(FrameInterval::from_fps(10).unwrap());
        let start = Instant::now();

        for _ in 0..10 {
            let frame_start = Instant::now();
            tokio::time::advance(Duration::from_millis(30)).await;
            pacer.pace(frame_start).await;
        }

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1300));
        let rate = 10.0 / elapsed.as_secs_f64();
        assert!(rate < 10.0);
    }
}
