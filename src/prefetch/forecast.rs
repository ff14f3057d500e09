//! Double exponential smoothing (Holt's linear trend method) used by the
//! SMART prefetch scheme to forecast a session's next-segment throughput
//! (§4.4, §8). Not present in the original implementation; derived
//! directly from the smoothing formulas.

/// Smoothing weight for the level term.
pub const ALPHA: f64 = 0.8;
/// Smoothing weight for the trend term.
pub const DELTA: f64 = 0.2;

/// Per-session forecaster state: level (`f`) and trend (`t`) estimates.
/// Bootstraps at zero and is updated once per observed throughput sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ForecastState {
    pub f: f64,
    pub t: f64,
}

impl ForecastState {
    pub fn new() -> Self {
        Self { f: 0.0, t: 0.0 }
    }

    /// Folds in an observed throughput sample `observed` (bits/sec), then
    /// returns the forecast for the *next* sample: `F_t + T_t`.
    ///
    /// `F_t = F_{t-1} + alpha * (observed - F_{t-1})`
    /// `T_t = T_{t-1} + delta * (F_t - F_{t-1})`
    pub fn observe(&mut self, observed: f64) -> f64 {
        let previous_f = self.f;
        self.f = previous_f + ALPHA * (observed - previous_f);
        self.t = self.t + DELTA * (self.f - previous_f);
        self.f + self.t
    }

    /// The current forecast without folding in a new observation.
    pub fn forecast(&self) -> f64 {
        self.f + self.t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstraps_from_zero() {
        let state = ForecastState::new();
        assert_eq!(state.forecast(), 0.0);
    }

    #[test]
    fn first_observation_moves_level_toward_it_by_alpha() {
        let mut state = ForecastState::new();
        let forecast = state.observe(1_000_000.0);
        // F_1 = 0 + 0.8 * (1_000_000 - 0) = 800_000
        // T_1 = 0 + 0.2 * (800_000 - 0) = 160_000
        assert!((state.f - 800_000.0).abs() < 1e-6);
        assert!((state.t - 160_000.0).abs() < 1e-6);
        assert!((forecast - 960_000.0).abs() < 1e-6);
    }

    #[test]
    fn converges_toward_a_steady_throughput() {
        let mut state = ForecastState::new();
        let mut forecast = 0.0;
        for _ in 0..50 {
            forecast = state.observe(500_000.0);
        }
        assert!((forecast - 500_000.0).abs() < 1.0);
    }

    #[test]
    fn tracks_rising_throughput_with_positive_trend() {
        let mut state = ForecastState::new();
        for sample in [100_000.0, 200_000.0, 300_000.0, 400_000.0] {
            state.observe(sample);
        }
        assert!(state.t > 0.0);
    }
}
