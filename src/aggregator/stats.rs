// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Window statistics.
//!
//! Percentiles use the nearest-rank method: index `ceil(p·n) − 1`, clamped to
//! `[0, n − 1]`, over an ascending copy of the values.

/// count/sum/avg/min/max/percentiles/std_dev of one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Summary {
    pub count: u64,
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub std_dev: f64,
}

/// Nearest-rank percentile of an ascending slice. `sorted` must be non-empty.
pub(crate) fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let rank = (p * n as f64).ceil() as i64 - 1;
    let idx = rank.clamp(0, n as i64 - 1) as usize;
    sorted[idx]
}

/// Population mean and standard deviation.
pub(crate) fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Summarize raw values. Returns `None` for an empty window.
pub(crate) fn summarize(values: &[f64]) -> Option<Summary> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted_copy(values);
    let (avg, std_dev) = mean_std(&sorted);
    Some(Summary {
        count: sorted.len() as u64,
        sum: sorted.iter().sum(),
        avg,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        p50: percentile(&sorted, 0.50),
        p90: percentile(&sorted, 0.90),
        p95: percentile(&sorted, 0.95),
        p99: percentile(&sorted, 0.99),
        std_dev,
    })
}

/// Merge child summaries into one coarser summary.
///
/// Counts and sums add, min/max fold, each percentile is the nearest-rank
/// percentile of the children's matching percentile, and the standard
/// deviation is the pooled (combined population) deviation.
pub(crate) fn combine(children: &[Summary]) -> Option<Summary> {
    let children: Vec<&Summary> = children.iter().filter(|c| c.count > 0).collect();
    if children.is_empty() {
        return None;
    }
    let count: u64 = children.iter().map(|c| c.count).sum();
    let sum: f64 = children.iter().map(|c| c.sum).sum();
    let avg = sum / count as f64;
    let min = children.iter().map(|c| c.min).fold(f64::INFINITY, f64::min);
    let max = children.iter().map(|c| c.max).fold(f64::NEG_INFINITY, f64::max);

    let pick = |f: fn(&Summary) -> f64, p: f64| {
        let values: Vec<f64> = children.iter().map(|c| f(c)).collect();
        percentile(&sorted_copy(&values), p)
    };

    // E[x²] per child is σ² + μ²; weight by count and subtract the new mean².
    let second_moment: f64 = children
        .iter()
        .map(|c| c.count as f64 * (c.std_dev.powi(2) + c.avg.powi(2)))
        .sum::<f64>()
        / count as f64;
    let std_dev = (second_moment - avg.powi(2)).max(0.0).sqrt();

    Some(Summary {
        count,
        sum,
        avg,
        min,
        max,
        p50: pick(|c| c.p50, 0.50),
        p90: pick(|c| c.p90, 0.90),
        p95: pick(|c| c.p95, 0.95),
        p99: pick(|c| c.p99, 0.99),
        std_dev,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_rank() {
        let sorted: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 0.50), 5.0);
        assert_eq!(percentile(&sorted, 0.90), 9.0);
        assert_eq!(percentile(&sorted, 0.95), 10.0);
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&[7.0], 0.99), 7.0);
    }

    #[test]
    fn test_summarize_basic() {
        let s = summarize(&[4.0, 2.0, 6.0, 8.0]).unwrap();
        assert_eq!(s.count, 4);
        assert_eq!(s.sum, 20.0);
        assert_eq!(s.avg, 5.0);
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 8.0);
        assert_eq!(s.p50, 4.0);
        assert!((s.std_dev - 5.0f64.sqrt()).abs() < 1e-9);
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_combine_matches_flat_moments() {
        let a = [1.0, 2.0, 3.0];
        let b = [10.0, 20.0];
        let all = [1.0, 2.0, 3.0, 10.0, 20.0];

        let merged = combine(&[summarize(&a).unwrap(), summarize(&b).unwrap()]).unwrap();
        let flat = summarize(&all).unwrap();

        assert_eq!(merged.count, flat.count);
        assert_eq!(merged.sum, flat.sum);
        assert!((merged.avg - flat.avg).abs() < 1e-9);
        assert_eq!(merged.min, 1.0);
        assert_eq!(merged.max, 20.0);
        assert!((merged.std_dev - flat.std_dev).abs() < 1e-9);
    }

    #[test]
    fn test_combine_percentiles_use_child_percentiles() {
        let children: Vec<Summary> = [1.0, 5.0, 9.0]
            .iter()
            .map(|v| summarize(&[*v]).unwrap())
            .collect();
        let merged = combine(&children).unwrap();
        assert_eq!(merged.p50, 5.0);
        assert_eq!(merged.p99, 9.0);
        assert!(combine(&[]).is_none());
    }
}
