//! Monotonic timestamp source and its affine mapping to wall-clock time.
//!
//! The producer reads a cheap monotonic counter on every log call
//! ([`Ticks::now`]); the backend samples a wall-clock reference once at
//! startup and converts ticks to wall time by the affine mapping
//! `wall = base_wall + (ticks - base_ticks) * scale`, recomputed whenever
//! [`WallClockMapping::resync`] runs. This mirrors the base+scale rdtsc
//! calibration every TSC-based logging clock uses, generalized here over
//! `std::time::Instant` so it needs no architecture-specific intrinsics.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// A monotonic timestamp, nanoseconds since an arbitrary fixed epoch (the
/// process's `Instant` origin). Only meaningful relative to other `Ticks`
/// values from the same process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticks(pub u64);

impl Ticks {
    /// Captures the current monotonic time relative to `origin`.
    #[inline]
    pub fn since(origin: Instant) -> Self {
        Ticks(origin.elapsed().as_nanos() as u64)
    }
}

/// Shared origin for [`Ticks`], created once per process (ideally at
/// backend start) so every producer thread measures against the same
/// reference instant.
#[derive(Debug, Clone, Copy)]
pub struct ClockOrigin(Instant);

impl ClockOrigin {
    pub fn capture() -> Self {
        Self(Instant::now())
    }

    #[inline]
    pub fn ticks_now(&self) -> Ticks {
        Ticks::since(self.0)
    }
}

impl Default for ClockOrigin {
    fn default() -> Self {
        Self::capture()
    }
}

/// The affine base+scale mapping from [`Ticks`] to a wall-clock
/// [`DateTime<Utc>`], computed once at backend start and optionally
/// recalibrated on an interval (`rdtsc_resync_interval` in the backend
/// options) to correct for clock drift over long-running processes.
#[derive(Debug, Clone, Copy)]
pub struct WallClockMapping {
    base_ticks: u64,
    base_wall_nanos: i128,
    /// Nanoseconds of wall time per nanosecond of tick time. 1.0 unless a
    /// resync detected drift between the monotonic and wall clocks.
    scale: f64,
}

impl WallClockMapping {
    /// Calibrates against the given origin at the current moment.
    pub fn calibrate(origin: &ClockOrigin) -> Self {
        let base_ticks = origin.ticks_now().0;
        let base_wall_nanos = wall_now_nanos();
        Self { base_ticks, base_wall_nanos, scale: 1.0 }
    }

    /// Recomputes the mapping, adjusting `scale` to account for any drift
    /// observed between the ticks elapsed and the wall time elapsed since
    /// the last calibration.
    pub fn resync(&mut self, origin: &ClockOrigin) {
        let now_ticks = origin.ticks_now().0;
        let now_wall = wall_now_nanos();

        let tick_delta = now_ticks.saturating_sub(self.base_ticks);
        let wall_delta = (now_wall - self.base_wall_nanos).max(0) as u64;
        if tick_delta > 0 {
            self.scale = wall_delta as f64 / tick_delta as f64;
        }
        self.base_ticks = now_ticks;
        self.base_wall_nanos = now_wall;
    }

    /// Maps a tick value to wall-clock nanoseconds since the Unix epoch,
    /// rounding toward negative infinity.
    pub fn to_wall_nanos(&self, ticks: Ticks) -> i128 {
        let delta = ticks.0 as i128 - self.base_ticks as i128;
        self.base_wall_nanos + (delta as f64 * self.scale).floor() as i128
    }

    pub fn to_datetime(&self, ticks: Ticks) -> DateTime<Utc> {
        let nanos = self.to_wall_nanos(ticks);
        let secs = nanos.div_euclid(1_000_000_000) as i64;
        let sub_nanos = nanos.rem_euclid(1_000_000_000) as u32;
        DateTime::<Utc>::from_timestamp(secs, sub_nanos).unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH)
    }
}

fn wall_now_nanos() -> i128 {
    let dur: Duration = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    dur.as_nanos() as i128
}

/// Formats a sub-second fraction of `ticks`' wall time to the precision
/// requested by a `%Qms`/`%Qus`/`%Qns` pattern specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubSecondPrecision {
    Millis,
    Micros,
    Nanos,
}

pub fn format_sub_second(datetime: DateTime<Utc>, precision: SubSecondPrecision) -> String {
    use chrono::Timelike;
    let nanos = datetime.nanosecond();
    match precision {
        SubSecondPrecision::Millis => format!("{:03}", nanos / 1_000_000),
        SubSecondPrecision::Micros => format!("{:06}", nanos / 1_000),
        SubSecondPrecision::Nanos => format!("{:09}", nanos % 1_000_000_000),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_are_monotonic_across_calls() {
        let origin = ClockOrigin::capture();
        let a = origin.ticks_now();
        std::thread::sleep(Duration::from_millis(1));
        let b = origin.ticks_now();
        assert!(b >= a);
    }

    #[test]
    fn wall_mapping_advances_with_ticks() {
        let origin = ClockOrigin::capture();
        let mapping = WallClockMapping::calibrate(&origin);
        let t0 = origin.ticks_now();
        std::thread::sleep(Duration::from_millis(5));
        let t1 = origin.ticks_now();

        let d0 = mapping.to_datetime(t0);
        let d1 = mapping.to_datetime(t1);
        assert!(d1 >= d0);
    }

    #[test]
    fn sub_second_formatting_has_fixed_width() {
        let dt = DateTime::<Utc>::from_timestamp(0, 123_456_789).unwrap();
        assert_eq!(format_sub_second(dt, SubSecondPrecision::Millis), "123");
        assert_eq!(format_sub_second(dt, SubSecondPrecision::Micros), "123456");
        assert_eq!(format_sub_second(dt, SubSecondPrecision::Nanos), "123456789");
    }

    #[test]
    fn resync_updates_base_without_panicking() {
        let origin = ClockOrigin::capture();
        let mut mapping = WallClockMapping::calibrate(&origin);
        std::thread::sleep(Duration::from_millis(2));
        mapping.resync(&origin);
        let now = origin.ticks_now();
        let _ = mapping.to_datetime(now);
    }
}
