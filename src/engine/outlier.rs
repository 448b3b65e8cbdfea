/// Descriptive statistics backing an outlier pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierStats {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutlierResult<T: Clone> {
    pub filtered: Vec<T>,
    pub removed: Vec<T>,
    pub stats: Option<OutlierStats>,
}

/// Median of a sorted slice; ties fall back to the average of the two
/// middle values.
fn median_of_sorted(values: &[f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// IQR-based outlier removal. `|observations| <= 2` returns
/// everything unchanged since quartiles are undefined at that size.
pub fn detect_outliers<T, F>(observations: &[T], price_of: F) -> OutlierResult<T>
where
    T: Clone,
    F: Fn(&T) -> f64,
{
    if observations.len() <= 2 {
        return OutlierResult {
            filtered: observations.to_vec(),
            removed: Vec::new(),
            stats: None,
        };
    }

    let mut prices: Vec<f64> = observations.iter().map(&price_of).collect();
    prices.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let n = prices.len();
    let mid = n / 2;
    let (lower_half, upper_half) = if n % 2 == 0 {
        (&prices[..mid], &prices[mid..])
    } else {
        (&prices[..mid], &prices[mid + 1..])
    };

    let q1 = median_of_sorted(lower_half);
    let q3 = median_of_sorted(upper_half);
    let median = median_of_sorted(&prices);
    let iqr = q3 - q1;
    let lower_bound = q1 - 1.5 * iqr;
    let upper_bound = q3 + 1.5 * iqr;

    let mut filtered = Vec::with_capacity(n);
    let mut removed = Vec::new();
    for obs in observations {
        let price = price_of(obs);
        if price < lower_bound || price > upper_bound {
            removed.push(obs.clone());
        } else {
            filtered.push(obs.clone());
        }
    }

    OutlierResult {
        filtered,
        removed,
        stats: Some(OutlierStats {
            q1,
            median,
            q3,
            iqr,
            lower_bound,
            upper_bound,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_scenario_one() {
        let observations = [10.0, 12.0, 11.0, 13.0, 11.5, 100.0, 1.0, 12.5];
        let result = detect_outliers(&observations, |v| *v);
        assert_eq!(result.filtered.len(), 6);
        assert!(result.removed.contains(&100.0));
        assert!(result.removed.contains(&1.0));
    }

    #[test]
    fn leaves_small_samples_unchanged() {
        let observations = [10.0, 1000.0];
        let result = detect_outliers(&observations, |v| *v);
        assert_eq!(result.filtered.len(), 2);
        assert!(result.removed.is_empty());
    }

    #[test]
    fn is_idempotent() {
        let observations = [10.0, 12.0, 11.0, 13.0, 11.5, 100.0, 1.0, 12.5];
        let once = detect_outliers(&observations, |v| *v);
        let twice = detect_outliers(&once.filtered, |v| *v);
        assert_eq!(once.filtered, twice.filtered);
    }

    #[test]
    fn filtered_is_subset_within_bounds() {
        let observations = [5.0, 6.0, 7.0, 8.0, 9.0, 50.0];
        let result = detect_outliers(&observations, |v| *v);
        let stats = result.stats.unwrap();
        for price in &result.filtered {
            assert!(*price >= stats.lower_bound && *price <= stats.upper_bound);
        }
    }
}
