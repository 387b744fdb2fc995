/// Exponential moving average used as a slow baseline tracker. Each instance
/// owns its own state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialMovingAverage {
    alpha: f64,
    initial: f64,
    value: f64,
}

impl ExponentialMovingAverage {
    /// `alpha` in (0, 1]; larger values follow the input faster.
    pub fn new(alpha: f64, initial: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            initial,
            value: initial,
        }
    }

    pub fn update(&mut self, sample: f64) -> f64 {
        self.value = self.alpha * sample + (1.0 - self.alpha) * self.value;
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = self.initial;
    }
}

impl Default for ExponentialMovingAverage {
    // Mid-scale of a 10-bit ADC
    fn default() -> Self {
        Self::new(0.1, 512.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_towards_constant_input() {
        let mut ema = ExponentialMovingAverage::default();
        assert!((ema.update(612.0) - 522.0).abs() < 1e-9);
        for _ in 0..200 {
            ema.update(612.0);
        }
        assert!((ema.value() - 612.0).abs() < 1e-6);

        ema.reset();
        assert_eq!(ema.value(), 512.0);
    }

    #[test]
    fn instances_do_not_share_state() {
        let mut a = ExponentialMovingAverage::default();
        let b = ExponentialMovingAverage::default();
        a.update(1000.0);
        assert_eq!(b.value(), 512.0);
    }
}
