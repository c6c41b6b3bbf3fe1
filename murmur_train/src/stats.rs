/// Mean of a stream of values, optionally weighted by sample count.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(self, value: f64) -> Self {
        self.push_weighted(value, 1)
    }

    /// Counts `value` `weight` times, e.g. a batch mean over `weight` samples.
    pub fn push_weighted(self, value: f64, weight: usize) -> Self {
        Self {
            sum: self.sum + value * weight as f64,
            count: self.count + weight,
        }
    }

    pub fn avg(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Peak and mean of a per-epoch series.
#[derive(Clone, Copy, Debug)]
pub struct Stats {
    max: f64,
    mean: RunningAverage,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            max: f64::NEG_INFINITY,
            mean: RunningAverage::new(),
        }
    }

    pub fn push(self, value: f64) -> Self {
        Self {
            max: self.max.max(value),
            mean: self.mean.push(value),
        }
    }

    pub fn max(&self) -> Option<f64> {
        (self.count() > 0).then_some(self.max)
    }

    pub fn avg(&self) -> Option<f64> {
        self.mean.avg()
    }

    pub fn count(&self) -> usize {
        self.mean.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_no_average() {
        assert!(RunningAverage::new().avg().is_none());
        let stats = Stats::new();
        assert!(stats.max().is_none());
        assert!(stats.avg().is_none());
        assert_eq!(0, stats.count());
    }

    #[test]
    fn batch_means_weighted_by_size() {
        // two batches: 3 samples at 0.5, 1 sample at 1.0
        let avg = RunningAverage::new().push_weighted(0.5, 3).push_weighted(1.0, 1);
        assert_eq!(4, avg.count());
        assert_eq!(Some(0.625), avg.avg());
    }

    #[test]
    fn epoch_series() {
        let stats = [0.61, 0.74, 0.70, 0.79].into_iter().fold(Stats::new(), Stats::push);
        assert_eq!(Some(0.79), stats.max());
        assert_eq!(4, stats.count());
        assert!((stats.avg().unwrap() - 0.71).abs() < 1e-12);
    }
}
