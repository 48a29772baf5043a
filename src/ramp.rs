use crate::utils::clamp_unit;

/// Shortest ramp we will run; anything shorter would be an audible jump.
pub const MIN_DURATION_SECS: f64 = 0.05;

/// A linear volume ramp between two levels over a fixed wall-clock window.
///
/// The ramp holds no reference to the element it drives. Whoever owns it
/// samples it once per frame and applies the result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ramp {
    from: f64,
    to: f64,
    start_ms: f64,
    duration_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampSample {
    pub volume: f64,
    pub done: bool,
}

impl Ramp {
    pub fn new(from: f64, to: f64, duration_secs: f64, start_ms: f64) -> Self {
        Self {
            from,
            to,
            start_ms,
            duration_secs: clamp_duration(duration_secs),
        }
    }

    pub fn from(&self) -> f64 {
        self.from
    }

    pub fn to(&self) -> f64 {
        self.to
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    /// Elapsed fraction of the ramp at `now_ms`, in `[0, 1]`.
    pub fn progress(&self, now_ms: f64) -> f64 {
        clamp_unit(
            (now_ms - self.start_ms) / (self.duration_secs * 1000.0),
            0.0,
            1.0,
        )
    }

    pub fn sample(&self, now_ms: f64) -> RampSample {
        let t = self.progress(now_ms);
        RampSample {
            volume: clamp_unit(self.from + (self.to - self.from) * t, 0.0, 1.0),
            done: t >= 1.0,
        }
    }

    /// The value the ramp settles on once finished.
    pub fn end_volume(&self) -> f64 {
        clamp_unit(self.to, 0.0, 1.0)
    }
}

fn clamp_duration(secs: f64) -> f64 {
    if secs.is_finite() {
        secs.max(MIN_DURATION_SECS)
    } else {
        MIN_DURATION_SECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_interpolate_linearly() {
        // given
        let ramp = Ramp::new(1.0, 0.0, 1.0, 1000.0);

        // when
        let halfway = ramp.sample(1500.0);

        // then
        assert!((halfway.volume - 0.5).abs() < 1e-9);
        assert!(!halfway.done);
    }

    #[test]
    fn should_finish_exactly_on_target() {
        // given
        let ramp = Ramp::new(0.8, 0.0, 0.1, 0.0);

        // when
        let before = ramp.sample(99.0);
        let after = ramp.sample(250.0);

        // then
        assert!(!before.done);
        assert!(after.done);
        assert_eq!(after.volume, 0.0);
    }

    #[test]
    fn should_clamp_short_and_invalid_durations() {
        assert_eq!(Ramp::new(0.0, 1.0, 0.0, 0.0).duration_secs(), MIN_DURATION_SECS);
        assert_eq!(Ramp::new(0.0, 1.0, -3.0, 0.0).duration_secs(), MIN_DURATION_SECS);
        assert_eq!(
            Ramp::new(0.0, 1.0, f64::NAN, 0.0).duration_secs(),
            MIN_DURATION_SECS
        );
        assert_eq!(Ramp::new(0.0, 1.0, 2.5, 0.0).duration_secs(), 2.5);
    }

    #[test]
    fn should_not_run_backwards_before_start() {
        // given
        let ramp = Ramp::new(0.2, 0.6, 1.0, 500.0);

        // when
        let sample = ramp.sample(100.0);

        // then
        assert_eq!(sample.volume, 0.2);
        assert!(!sample.done);
    }

    #[test]
    fn should_keep_volume_in_unit_range() {
        // given
        let ramp = Ramp::new(0.0, 1.7, 1.0, 0.0);

        // then
        assert_eq!(ramp.sample(2000.0).volume, 1.0);
        assert_eq!(ramp.end_volume(), 1.0);
    }
}
