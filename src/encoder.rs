//! Quadrature encoder decoding and wheel velocity estimation
//!
//! Each wheel has two phase-offset digital lines. The platform samples both
//! on a hardware edge interrupt from one designated line per wheel and feeds
//! the samples to [`QuadratureDecoder::on_edge`]; decoding on a timer is not
//! supported because edges between polls would be lost. The tick counter is
//! single-writer (the edge callback) / single-reader (the main loop), so a
//! relaxed atomic is sufficient where the platform guarantees word-width
//! atomic reads.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Tick delta per 4-bit transition code
///
/// The code is `previous_state << 2 | B << 1 | (A xor B)`. Codes
/// {1, 7, 8, 14} decrement, {2, 4, 11, 13} increment; everything else is a
/// glitch and leaves the counter unchanged.
pub const TRANSITION_TABLE: [i8; 16] = [0, -1, 1, 0, 1, 0, 0, -1, -1, 0, 0, 1, 0, 1, -1, 0];

/// Per-wheel quadrature decoder
///
/// Holds the previous 2-bit line state and the shared signed tick counter.
/// Mutated only by the wheel's edge callback.
pub struct QuadratureDecoder {
    state: u8,
    ticks: Arc<AtomicI32>,
}

/// Read handle for a wheel's tick counter
///
/// Cloneable; reads are relaxed atomic loads.
#[derive(Clone)]
pub struct TickCounter {
    ticks: Arc<AtomicI32>,
}

impl QuadratureDecoder {
    /// Create a decoder with a zeroed counter
    pub fn new() -> Self {
        Self {
            state: 0,
            ticks: Arc::new(AtomicI32::new(0)),
        }
    }

    /// Get a read handle for the tick counter
    pub fn counter(&self) -> TickCounter {
        TickCounter {
            ticks: Arc::clone(&self.ticks),
        }
    }

    /// Seed the previous state from the current line levels
    ///
    /// Call once at init, before enabling the edge interrupt, so the first
    /// real edge forms a valid transition code.
    pub fn prime(&mut self, a: bool, b: bool) {
        let phase = a ^ b;
        self.state = (b as u8) << 1 | phase as u8;
    }

    /// Decode one edge given the freshly sampled line levels
    ///
    /// Safe to call from interrupt context: one table lookup and at most one
    /// relaxed atomic add.
    pub fn on_edge(&mut self, a: bool, b: bool) {
        let phase = a ^ b;
        let code = (self.state << 2 | (b as u8) << 1 | phase as u8) & 0x0f;
        let delta = TRANSITION_TABLE[code as usize];
        if delta != 0 {
            self.ticks.fetch_add(delta as i32, Ordering::Relaxed);
        }
        self.state = code & 0b11;
    }
}

impl Default for QuadratureDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TickCounter {
    /// Current signed tick count
    pub fn count(&self) -> i32 {
        self.ticks.load(Ordering::Relaxed)
    }
}

/// Fixed-cadence wheel speed estimator
///
/// Computes `(count_now - count_prev) / elapsed_seconds` in ticks per second,
/// optionally smoothed by a short moving average. Smoothing is a tuning aid,
/// not a correctness requirement.
pub struct WheelSpeedEstimator {
    last_count: Option<i32>,
    last_ms: u64,
    window: Vec<f32>,
    window_len: usize,
    estimate: f32,
}

impl WheelSpeedEstimator {
    /// Create an estimator; `smoothing_samples` of 0 or 1 disables smoothing
    pub fn new(smoothing_samples: usize) -> Self {
        Self {
            last_count: None,
            last_ms: 0,
            window: Vec::new(),
            window_len: smoothing_samples.max(1),
            estimate: 0.0,
        }
    }

    /// Feed the current tick count; returns the speed estimate in ticks/s
    ///
    /// The first sample establishes the baseline and returns 0. A zero
    /// elapsed time repeats the previous estimate.
    pub fn sample(&mut self, count: i32, now_ms: u64) -> f32 {
        let last_count = match self.last_count {
            Some(c) => c,
            None => {
                self.last_count = Some(count);
                self.last_ms = now_ms;
                return self.estimate;
            }
        };

        let dt_ms = now_ms.saturating_sub(self.last_ms);
        if dt_ms == 0 {
            return self.estimate;
        }

        let raw = (count - last_count) as f32 / (dt_ms as f32 / 1000.0);
        self.last_count = Some(count);
        self.last_ms = now_ms;

        if self.window.len() == self.window_len {
            self.window.remove(0);
        }
        self.window.push(raw);
        self.estimate = self.window.iter().sum::<f32>() / self.window.len() as f32;
        self.estimate
    }

    /// Last computed estimate in ticks/s
    pub fn speed(&self) -> f32 {
        self.estimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Quadrature line levels (a, b) stepped forward give +1 per transition.
    /// Derived from state = (B, A xor B): forward is 0 -> 2 -> 3 -> 1 -> 0.
    const FORWARD_SEQ: [(bool, bool); 4] =
        [(false, false), (true, true), (false, true), (true, false)];

    fn feed_revolution(decoder: &mut QuadratureDecoder, transitions: u32, forward: bool) {
        let mut idx = 0usize;
        decoder.prime(FORWARD_SEQ[0].0, FORWARD_SEQ[0].1);
        for _ in 0..transitions {
            idx = if forward {
                (idx + 1) % 4
            } else {
                (idx + 3) % 4
            };
            let (a, b) = FORWARD_SEQ[idx];
            decoder.on_edge(a, b);
        }
    }

    #[test]
    fn test_glitch_codes_leave_counter_unchanged() {
        let valid: [u8; 8] = [1, 2, 4, 7, 8, 11, 13, 14];

        for code in 0u8..16 {
            if valid.contains(&code) {
                continue;
            }
            let mut decoder = QuadratureDecoder::new();
            let counter = decoder.counter();

            // Craft line levels so on_edge sees exactly this code
            let prev = code >> 2;
            let prev_b = prev >> 1 & 1 == 1;
            let prev_phase = prev & 1 == 1;
            decoder.prime(prev_phase ^ prev_b, prev_b);

            let b = code >> 1 & 1 == 1;
            let phase = code & 1 == 1;
            decoder.on_edge(phase ^ b, b);

            assert_eq!(counter.count(), 0, "code {} moved the counter", code);
        }
    }

    #[test]
    fn test_valid_codes_move_counter_by_one() {
        for (codes, expected) in [([1u8, 7, 8, 14], -1i32), ([2, 4, 11, 13], 1)] {
            for code in codes {
                let mut decoder = QuadratureDecoder::new();
                let counter = decoder.counter();

                let prev = code >> 2;
                let prev_b = prev >> 1 & 1 == 1;
                let prev_phase = prev & 1 == 1;
                decoder.prime(prev_phase ^ prev_b, prev_b);

                let b = code >> 1 & 1 == 1;
                let phase = code & 1 == 1;
                decoder.on_edge(phase ^ b, b);

                assert_eq!(counter.count(), expected, "code {}", code);
            }
        }
    }

    #[test]
    fn test_full_revolution_forward_and_back() {
        let ticks_per_rev = 360;

        let mut decoder = QuadratureDecoder::new();
        let counter = decoder.counter();
        feed_revolution(&mut decoder, ticks_per_rev, true);
        assert_eq!(counter.count(), ticks_per_rev as i32);

        let mut decoder = QuadratureDecoder::new();
        let counter = decoder.counter();
        feed_revolution(&mut decoder, ticks_per_rev, false);
        assert_eq!(counter.count(), -(ticks_per_rev as i32));
    }

    #[test]
    fn test_speed_estimate() {
        let mut est = WheelSpeedEstimator::new(1);

        // Baseline
        assert_eq!(est.sample(0, 0), 0.0);

        // 100 ticks in 20ms = 5000 ticks/s
        let speed = est.sample(100, 20);
        assert!((speed - 5000.0).abs() < 0.01);

        // Zero elapsed repeats the previous estimate
        assert_eq!(est.sample(150, 20), speed);
    }

    #[test]
    fn test_speed_smoothing() {
        let mut est = WheelSpeedEstimator::new(2);
        est.sample(0, 0);
        est.sample(100, 20); // 5000
        let speed = est.sample(140, 40); // raw 2000, mean 3500
        assert!((speed - 3500.0).abs() < 0.01);
    }
}
