/// Summary of one sector under one battery.
///
/// When every attempt failed, the three cycle fields are zero and
/// `num_failures` equals the attempt count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlashSectorTiming {
    pub min_cycles: u32,
    pub max_cycles: u32,
    pub mean_cycles: u32,
    pub num_failures: u32,
}

impl FlashSectorTiming {
    pub fn from_samples(samples: &[u32], max_possible: u32) -> Self {
        let mut timing = FlashSectorTiming::default();
        save_results(&mut timing, samples, max_possible);
        timing
    }

    /// Zero when `max_possible` is smaller than the failure count.
    pub fn successes(&self, max_possible: u32) -> u32 {
        max_possible.saturating_sub(self.num_failures)
    }
}

/// Reduces the successful samples of a sector to min/max/mean. The mean is
/// kept to one decimal in fixed point and rounded half up.
pub fn save_results(timing: &mut FlashSectorTiming, samples: &[u32], max_possible: u32) {
    debug_assert!(samples.len() as u64 <= max_possible as u64);
    let num_successful = samples.len() as u64;

    if num_successful == 0 {
        *timing = FlashSectorTiming { num_failures: max_possible, ..FlashSectorTiming::default() };
        return;
    }

    let mut total: u64 = 0;
    let mut min = u32::MAX;
    let mut max = 0;
    for &s in samples {
        min = min.min(s);
        max = max.max(s);
        total += s as u64;
    }

    let fixed = total * 10 / num_successful;
    let mut mean = fixed / 10;
    if fixed % 10 >= 5 {
        mean += 1;
    }

    timing.min_cycles = min;
    timing.max_cycles = max;
    // mean never exceeds max, so it fits
    timing.mean_cycles = mean as u32;
    timing.num_failures = max_possible - num_successful as u32;
}
