//! Time primitives for the animation process
//!
//! Two clocks are in play:
//! - `StreamTime`: milliseconds relative to the start of the streaming
//!   animation, advanced by exactly one tick per update
//! - `ClockTime`: monotonic process time used for timeouts and cooldowns

use std::ops::{Add, Sub};
use std::time::Duration;

/// Animation tick period in milliseconds
pub const ANIM_TIME_STEP_MS: u32 = 33;

/// Animation tick period as a `Duration`
pub const ANIM_TIME_STEP: Duration = Duration::from_millis(ANIM_TIME_STEP_MS as u64);

/// Relative animation time in milliseconds
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamTime(pub u32);

impl StreamTime {
    pub const ZERO: StreamTime = StreamTime(0);
    pub const MAX: StreamTime = StreamTime(u32::MAX);

    #[inline]
    pub fn from_millis(millis: u32) -> Self {
        StreamTime(millis)
    }

    #[inline]
    pub fn as_millis(self) -> u32 {
        self.0
    }

    /// Stream time of the given tick index
    #[inline]
    pub fn from_ticks(ticks: u32) -> Self {
        StreamTime(ticks.saturating_mul(ANIM_TIME_STEP_MS))
    }

    /// Round down to the nearest tick boundary
    #[inline]
    pub fn floor_to_tick(self) -> Self {
        StreamTime(self.0 - self.0 % ANIM_TIME_STEP_MS)
    }

    #[inline]
    pub fn is_tick_aligned(self) -> bool {
        self.0 % ANIM_TIME_STEP_MS == 0
    }

    #[inline]
    pub fn saturating_add_ms(self, millis: u32) -> Self {
        StreamTime(self.0.saturating_add(millis))
    }

    #[inline]
    pub fn saturating_sub_ms(self, millis: u32) -> Self {
        StreamTime(self.0.saturating_sub(millis))
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is later
    #[inline]
    pub fn since(self, earlier: StreamTime) -> u32 {
        self.0.saturating_sub(earlier.0)
    }
}

impl std::fmt::Debug for StreamTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t({}ms)", self.0)
    }
}

impl std::fmt::Display for StreamTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Monotonic process clock, nanoseconds since process start
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClockTime(pub u64);

impl ClockTime {
    pub const ZERO: ClockTime = ClockTime(0);

    #[inline]
    pub fn from_nanos(nanos: u64) -> Self {
        ClockTime(nanos)
    }

    #[inline]
    pub fn from_millis(millis: u64) -> Self {
        ClockTime(millis.saturating_mul(1_000_000))
    }

    #[inline]
    pub fn from_secs_f64(secs: f64) -> Self {
        ClockTime((secs * 1_000_000_000.0) as u64)
    }

    #[inline]
    pub fn as_nanos(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    #[inline]
    pub fn saturating_add(self, duration: Duration) -> Self {
        ClockTime(self.0.saturating_add(duration.as_nanos() as u64))
    }
}

impl Add<Duration> for ClockTime {
    type Output = ClockTime;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl Sub<ClockTime> for ClockTime {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: ClockTime) -> Self::Output {
        Duration::from_nanos(self.0.saturating_sub(rhs.0))
    }
}

impl std::fmt::Debug for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "clock({:.3}s)", self.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_floor_to_tick() {
        assert_eq!(StreamTime(0).floor_to_tick(), StreamTime(0));
        assert_eq!(StreamTime(32).floor_to_tick(), StreamTime(0));
        assert_eq!(StreamTime(33).floor_to_tick(), StreamTime(33));
        assert_eq!(StreamTime(100).floor_to_tick(), StreamTime(99));
        assert!(StreamTime(66).is_tick_aligned());
        assert!(!StreamTime(67).is_tick_aligned());
    }

    #[test]
    fn test_stream_time_saturates() {
        assert_eq!(StreamTime(5).saturating_sub_ms(10), StreamTime::ZERO);
        assert_eq!(StreamTime::MAX.saturating_add_ms(1), StreamTime::MAX);
        assert_eq!(StreamTime(10).since(StreamTime(40)), 0);
        assert_eq!(StreamTime::from_ticks(3), StreamTime(99));
    }

    #[test]
    fn test_clock_arithmetic() {
        let t0 = ClockTime::from_millis(1_000);
        let t1 = t0 + Duration::from_millis(500);
        assert_eq!(t1.as_millis(), 1_500);
        assert_eq!(t1 - t0, Duration::from_millis(500));
        assert_eq!(t0 - t1, Duration::ZERO);
    }

    proptest! {
        #[test]
        fn prop_floor_is_aligned_and_within_a_tick(ms in any::<u32>()) {
            let floored = StreamTime(ms).floor_to_tick();
            prop_assert!(floored.is_tick_aligned());
            prop_assert!(floored <= StreamTime(ms));
            prop_assert!(ms - floored.as_millis() < ANIM_TIME_STEP_MS);
        }
    }
}
