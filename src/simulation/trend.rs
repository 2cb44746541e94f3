//! Robust statistics used to smooth and extrapolate historical series.
use itertools::Itertools;

/// The median of a set of values, or `None` if there are none
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    Some(median)
}

/// Smooth values with a centred rolling median.
///
/// Near the ends of the series, the window is truncated to the points available.
pub fn rolling_median(values: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    (0..values.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(values.len());

            // Window can never be empty as it always includes i
            median(&values[start..end]).unwrap_or(values[i])
        })
        .collect()
}

/// A straight line fitted to some data
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTrend {
    /// Change in value per unit of x
    pub slope: f64,
    /// Value at x = 0
    pub intercept: f64,
}

impl LinearTrend {
    /// The value of the trend line at `x`
    pub fn value_at(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Fit a line to the data with the Theil-Sen estimator.
///
/// The slope is the median of the slopes between every pair of points and the intercept is the
/// median of `y - slope * x`. This makes the fit insensitive to outliers.
///
/// Returns `None` if there are fewer than two points with distinct x values.
pub fn theil_sen(xs: &[f64], ys: &[f64]) -> Option<LinearTrend> {
    assert_eq!(xs.len(), ys.len(), "xs and ys must have the same length");

    let slopes = xs
        .iter()
        .zip(ys)
        .tuple_combinations()
        .filter(|((x1, _), (x2, _))| x1 != x2)
        .map(|((x1, y1), (x2, y2))| (y2 - y1) / (x2 - x1))
        .collect_vec();
    let slope = median(&slopes)?;

    let residuals = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| y - slope * x)
        .collect_vec();
    let intercept = median(&residuals)?;

    Some(LinearTrend { slope, intercept })
}
