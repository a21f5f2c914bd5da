//! Tempo-ramp time integration
//!
//! Tempo ramps linearly from the previous segment's tempo (at beat 0) to
//! the current segment's tempo (at beat = total). Elapsed seconds at a
//! beat position is the definite integral of this curve, not simple
//! division: that is what keeps tempo continuous across segment
//! boundaries.
//!
//! For tempo(b) = from + (to - from) * b / total (BPM), seconds at p is
//!
//!   ∫₀ᵖ 60 / tempo(b) db
//!     = (60 * total / (to - from)) * ln(tempo(p) / from)   when to ≠ from
//!     = 60 * p / from                                       otherwise

use weft_common::{Error, Result};

/// Tempo curves are considered flat below this BPM difference.
const FLAT_TEMPO_EPSILON: f64 = 1e-9;

/// Computes elapsed seconds at beat positions on one segment's ramp.
#[derive(Debug, Clone, Copy)]
pub struct TimeComputer {
    from_tempo: f64,
    to_tempo: f64,
    total_beats: f64,
}

impl TimeComputer {
    /// Build a computer for one segment. Zero total beats, from-tempo, or
    /// to-tempo is a fatal error: it would make the ramp degenerate.
    pub fn new(total_beats: u32, from_tempo: f64, to_tempo: f64) -> Result<Self> {
        if total_beats == 0 {
            return Err(Error::Fatal("time computer requires nonzero total beats".into()));
        }
        if from_tempo <= 0.0 || to_tempo <= 0.0 {
            return Err(Error::Fatal(format!(
                "time computer requires positive tempos, got {from_tempo} -> {to_tempo}"
            )));
        }
        Ok(Self {
            from_tempo,
            to_tempo,
            total_beats: f64::from(total_beats),
        })
    }

    /// Elapsed seconds from beat 0 to `position` (beats; may be
    /// fractional, and may exceed total for carry-over computations).
    pub fn seconds_at_position(&self, position: f64) -> f64 {
        let slope = (self.to_tempo - self.from_tempo) / self.total_beats;
        if slope.abs() < FLAT_TEMPO_EPSILON {
            return 60.0 * position / self.from_tempo;
        }
        let tempo_at = self.from_tempo + slope * position;
        (60.0 / slope) * (tempo_at / self.from_tempo).ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-6;

    #[test]
    fn flat_tempo_is_simple_division() {
        let t = TimeComputer::new(16, 120.0, 120.0).unwrap();
        // 120 BPM = 0.5 s per beat
        assert!((t.seconds_at_position(16.0) - 8.0).abs() < TOLERANCE);
        assert!((t.seconds_at_position(4.0) - 2.0).abs() < TOLERANCE);
        assert!(t.seconds_at_position(0.0).abs() < TOLERANCE);
    }

    #[test]
    fn ramp_integral_matches_numeric_sum() {
        let t = TimeComputer::new(32, 60.0, 120.0).unwrap();
        // Numerically integrate 60/tempo(b) db with small steps
        let steps = 1_000_000;
        let dp = 32.0 / steps as f64;
        let mut sum = 0.0;
        for i in 0..steps {
            let b = (i as f64 + 0.5) * dp;
            let tempo = 60.0 + (120.0 - 60.0) * b / 32.0;
            sum += 60.0 / tempo * dp;
        }
        assert!((t.seconds_at_position(32.0) - sum).abs() < 1e-4);
    }

    #[test]
    fn ramp_is_slower_than_end_tempo_and_faster_than_start() {
        let t = TimeComputer::new(16, 60.0, 120.0).unwrap();
        let full = t.seconds_at_position(16.0);
        // Between all-at-120 (8s) and all-at-60 (16s)
        assert!(full > 8.0 && full < 16.0, "got {full}");
    }

    #[test]
    fn seconds_increase_monotonically() {
        let t = TimeComputer::new(8, 140.0, 90.0).unwrap();
        let mut last = 0.0;
        for i in 1..=8 {
            let s = t.seconds_at_position(f64::from(i));
            assert!(s > last);
            last = s;
        }
    }

    #[test]
    fn zero_inputs_are_fatal() {
        assert!(matches!(TimeComputer::new(0, 120.0, 120.0), Err(Error::Fatal(_))));
        assert!(matches!(TimeComputer::new(16, 0.0, 120.0), Err(Error::Fatal(_))));
        assert!(matches!(TimeComputer::new(16, 120.0, 0.0), Err(Error::Fatal(_))));
    }
}
