//! Percentiles, log-decade histograms and cutoff curves over microsecond
//! samples.

use serde::{Deserialize, Serialize};

/// Value at percentile `p` (0-100) of an ascending sample: index
/// `floor(len * p / 100)`, clamped to the last element. Zero when empty.
#[must_use]
pub fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = (sorted.len() as f64 * p / 100.0).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Percentile summary of one latency sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySummary {
    /// Samples
    pub count: usize,
    /// Median
    pub p50: u64,
    /// 75th percentile
    pub p75: u64,
    /// 90th percentile
    pub p90: u64,
    /// 95th percentile
    pub p95: u64,
    /// 99th percentile
    pub p99: u64,
    /// 99.9th percentile
    #[serde(rename = "p99.9")]
    pub p999: u64,
    /// Largest sample
    pub max: u64,
}

impl LatencySummary {
    /// Summarize an ascending sample
    #[must_use]
    pub fn from_sorted(sorted: &[u64]) -> Self {
        Self {
            count: sorted.len(),
            p50: percentile(sorted, 50.0),
            p75: percentile(sorted, 75.0),
            p90: percentile(sorted, 90.0),
            p95: percentile(sorted, 95.0),
            p99: percentile(sorted, 99.0),
            p999: percentile(sorted, 99.9),
            max: sorted.last().copied().unwrap_or(0),
        }
    }
}

/// Decade of a latency: `floor(log10(max(1, value - 1)))`
#[must_use]
pub fn decade(value: u64) -> u32 {
    value.saturating_sub(1).max(1).ilog10()
}

/// One row of a log-decade histogram
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecadeBucket {
    /// Power of ten
    pub decade: u32,
    /// `10^decade`, microseconds
    pub lower_us: u64,
    /// Samples in this decade
    pub count: usize,
    /// Share of all samples in this decade or above
    pub fraction_at_or_above: f64,
}

/// Histogram with power-of-ten bucket boundaries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogDecadeHistogram {
    counts: Vec<usize>,
    total: usize,
}

impl LogDecadeHistogram {
    /// Bucket every sample
    #[must_use]
    pub fn from_samples(samples: &[u64]) -> Self {
        let mut counts: Vec<usize> = Vec::new();
        for &value in samples {
            let d = decade(value) as usize;
            if counts.len() <= d {
                counts.resize(d + 1, 0);
            }
            counts[d] += 1;
        }
        Self {
            counts,
            total: samples.len(),
        }
    }

    /// Samples bucketed
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Rows from the lowest decade up to the highest occupied one
    #[must_use]
    pub fn buckets(&self) -> Vec<DecadeBucket> {
        let mut remaining = self.total;
        self.counts
            .iter()
            .enumerate()
            .map(|(d, &count)| {
                let fraction_at_or_above = if self.total == 0 {
                    0.0
                } else {
                    remaining as f64 / self.total as f64
                };
                remaining -= count;
                DecadeBucket {
                    decade: d as u32,
                    lower_us: 10u64.saturating_pow(d as u32),
                    count,
                    fraction_at_or_above,
                }
            })
            .collect()
    }

    /// `decade_us,count,fraction_at_or_above` rows
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("decade_us,count,fraction_at_or_above\n");
        for b in self.buckets() {
            csv.push_str(&format!("{},{},{}\n", b.lower_us, b.count, b.fraction_at_or_above));
        }
        csv
    }
}

/// A point of the "fraction of samples still above the cutoff" curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CutoffPoint {
    /// Cutoff, milliseconds
    pub cutoff_ms: f64,
    /// Share of samples at or above the first one exceeding the cutoff
    pub fraction_left: f64,
}

const CUTOFF_GROWTH: f64 = 1.3;

/// Walk an ascending sample with a cutoff starting at 1 µs. Each time a
/// sample exceeds the cutoff, emit the share of samples not yet passed and
/// grow the cutoff to `floor(cutoff * 1.3) + 1`.
#[must_use]
pub fn cutoff_curve(sorted: &[u64]) -> Vec<CutoffPoint> {
    let total = sorted.len() as f64;
    let mut cutoff: u64 = 1;
    let mut points = Vec::new();
    for (passed, &value) in sorted.iter().enumerate() {
        if value > cutoff {
            points.push(CutoffPoint {
                cutoff_ms: cutoff as f64 / 1000.0,
                fraction_left: (total - passed as f64) / total,
            });
            cutoff = (cutoff as f64 * CUTOFF_GROWTH).floor() as u64 + 1;
        }
    }
    points
}

/// CSV form of a cutoff curve
#[must_use]
pub fn cutoff_csv(points: &[CutoffPoint]) -> String {
    let mut csv = String::from("cutoff time,count left\n");
    for p in points {
        csv.push_str(&format!("{},{}\n", p.cutoff_ms, p.fraction_left));
    }
    csv
}
