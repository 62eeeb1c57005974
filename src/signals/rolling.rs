//! Fixed-capacity rolling statistics and exponential smoothing.
//!
//! [`RollingWindow`] keeps a circular buffer with sliding Welford updates, so
//! mean and standard deviation are O(1) per push. Running moments are rebuilt
//! from the buffer once per full rotation to stop drift.

/// Std-devs at or below this fraction of the window's scale count as flat.
const FLAT_STD_TOLERANCE: f64 = 1e-10;

/// Circular buffer with rolling mean and sample standard deviation.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    buf: Vec<f64>,
    capacity: usize,
    head: usize,
    mean: f64,
    m2: f64,
    pushes_since_rebuild: usize,
}

impl RollingWindow {
    /// Create a window holding `capacity` values (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            head: 0,
            mean: 0.0,
            m2: 0.0,
            pushes_since_rebuild: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() == self.capacity
    }

    /// Push a value, evicting the oldest one once full.
    pub fn push(&mut self, x: f64) {
        if self.buf.len() < self.capacity {
            self.buf.push(x);
            let n = self.buf.len() as f64;
            let delta = x - self.mean;
            self.mean += delta / n;
            self.m2 += delta * (x - self.mean);
        } else {
            let old = self.buf[self.head];
            self.buf[self.head] = x;
            self.head = (self.head + 1) % self.capacity;

            let n = self.capacity as f64;
            let old_mean = self.mean;
            self.mean += (x - old) / n;
            self.m2 += (x - old) * (x - self.mean + old - old_mean);
            if self.m2 < 0.0 {
                self.m2 = 0.0;
            }

            self.pushes_since_rebuild += 1;
            if self.pushes_since_rebuild >= self.capacity {
                self.rebuild();
            }
        }
    }

    fn rebuild(&mut self) {
        let n = self.buf.len() as f64;
        self.mean = self.buf.iter().sum::<f64>() / n;
        self.m2 = self.buf.iter().map(|v| (v - self.mean).powi(2)).sum();
        self.pushes_since_rebuild = 0;
    }

    /// Mean of the window, once full.
    pub fn mean(&self) -> Option<f64> {
        self.is_full().then_some(self.mean)
    }

    /// Sample standard deviation (ddof = 1), once full.
    pub fn std_dev(&self) -> Option<f64> {
        if !self.is_full() || self.capacity < 2 {
            return None;
        }
        Some((self.m2 / (self.capacity as f64 - 1.0)).sqrt())
    }

    /// Whether the window holds a constant series, up to rounding.
    fn is_flat(&self, std: f64) -> bool {
        std <= FLAT_STD_TOLERANCE * self.mean.abs().max(1.0)
    }

    /// Rolling z-score of `x` against the current window. A flat window yields 0.
    pub fn zscore(&self, x: f64) -> Option<f64> {
        let mean = self.mean()?;
        let std = self.std_dev()?;
        if self.is_flat(std) {
            return Some(0.0);
        }
        Some((x - mean) / std)
    }
}

/// Exponential moving average with `alpha = 2 / (span + 1)`, seeded with the
/// first value. Reports a value only after `span` inputs.
#[derive(Debug, Clone)]
pub struct Ema {
    span: usize,
    alpha: f64,
    value: Option<f64>,
    count: usize,
}

impl Ema {
    pub fn new(span: usize) -> Self {
        let span = span.max(1);
        Self {
            span,
            alpha: 2.0 / (span as f64 + 1.0),
            value: None,
            count: 0,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Feed one value; returns the smoothed value once warmed up.
    pub fn update(&mut self, x: f64) -> Option<f64> {
        let next = match self.value {
            None => x,
            Some(prev) => self.alpha * x + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        self.count += 1;
        (self.count >= self.span).then_some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_stats(values: &[f64]) -> (f64, f64) {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        (mean, var.sqrt())
    }

    #[test]
    fn test_window_matches_naive_stats() {
        let data: Vec<f64> = (0..50).map(|i| ((i * 7 % 11) as f64).sin() * 3.0 + i as f64 * 0.1).collect();
        let mut window = RollingWindow::new(12);
        for (i, x) in data.iter().enumerate() {
            window.push(*x);
            if i + 1 >= 12 {
                let (mean, std) = naive_stats(&data[i + 1 - 12..=i]);
                assert!((window.mean().unwrap() - mean).abs() < 1e-9);
                assert!((window.std_dev().unwrap() - std).abs() < 1e-9);
            } else {
                assert!(window.mean().is_none());
            }
        }
    }

    #[test]
    fn test_flat_window_zscore_is_zero() {
        let mut window = RollingWindow::new(5);
        for _ in 0..20 {
            window.push(0.1);
        }
        assert_eq!(window.zscore(0.1), Some(0.0));
        assert_eq!(window.zscore(5.0), Some(0.0));
    }

    #[test]
    fn test_flat_after_variation() {
        let mut window = RollingWindow::new(3);
        for x in [1.0, 7.5, -3.2, 0.3, 0.3, 0.3] {
            window.push(x);
        }
        assert_eq!(window.zscore(0.3), Some(0.0));
    }

    #[test]
    fn test_zscore_value() {
        let mut window = RollingWindow::new(3);
        for x in [1.0, 2.0, 3.0] {
            window.push(x);
        }
        // mean 2, sample std 1
        assert!((window.zscore(3.0).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ema_seed_and_warmup() {
        let mut ema = Ema::new(3);
        assert!((ema.alpha() - 0.5).abs() < 1e-12);
        assert_eq!(ema.update(4.0), None);
        assert_eq!(ema.update(0.0), None);
        // 4 -> 2 -> 0.5*2 + 0.5*2 = 2
        assert_eq!(ema.update(2.0), Some(2.0));
        assert_eq!(ema.update(4.0), Some(3.0));
    }

    #[test]
    fn test_ema_span_one_is_identity() {
        let mut ema = Ema::new(1);
        assert_eq!(ema.update(1.5), Some(1.5));
        assert_eq!(ema.update(-2.0), Some(-2.0));
    }
}
