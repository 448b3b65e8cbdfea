use chrono::{DateTime, Utc};

/// A priced observation as seen by the confidence scorer; timestamp is
/// optional since not every caller tracks freshness.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceObservation {
    pub price: f64,
    pub observed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceBreakdown {
    pub confidence: f64,
    pub source_score: f64,
    pub variance_score: f64,
    pub freshness_score: f64,
    pub mean: f64,
    pub stddev: f64,
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn stddev(values: &[f64], avg: f64) -> f64 {
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// [0,1] confidence combining source count, dispersion, and freshness.
pub fn calculate_confidence(observations: &[ConfidenceObservation]) -> f64 {
    detailed_confidence(observations).confidence
}

/// Same computation as [`calculate_confidence`] plus the component
/// breakdown and descriptive statistics.
pub fn detailed_confidence(observations: &[ConfidenceObservation]) -> ConfidenceBreakdown {
    let n = observations.len();

    if n == 0 {
        return ConfidenceBreakdown {
            confidence: 0.0,
            source_score: 0.0,
            variance_score: 0.0,
            freshness_score: 0.0,
            mean: 0.0,
            stddev: 0.0,
        };
    }

    let prices: Vec<f64> = observations.iter().map(|o| o.price).collect();
    let avg = mean(&prices);
    let sd = stddev(&prices, avg);

    let now = Utc::now();
    let freshness_score = observations
        .iter()
        .map(|o| match o.observed_at {
            Some(ts) => {
                let age_days = (now - ts).num_seconds() as f64 / 86_400.0;
                2f64.powf(-age_days.max(0.0) / 30.0)
            }
            None => 1.0,
        })
        .sum::<f64>()
        / n as f64;

    if n == 1 {
        // Single-source ceiling: confidence is capped at 0.6 regardless of
        // how fresh the one observation is.
        return ConfidenceBreakdown {
            confidence: (0.6 * freshness_score).clamp(0.0, 1.0),
            source_score: 0.2,
            variance_score: 0.0,
            freshness_score,
            mean: avg,
            stddev: sd,
        };
    }

    let source_score = (n as f64 / 5.0).min(1.0);
    let variance_score = if avg == 0.0 {
        0.0
    } else {
        (1.0 - (sd / avg).min(1.0)).max(0.0)
    };

    let confidence = (0.4 * source_score + 0.4 * variance_score + 0.2 * freshness_score).clamp(0.0, 1.0);

    ConfidenceBreakdown {
        confidence,
        source_score,
        variance_score,
        freshness_score,
        mean: avg,
        stddev: sd,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn obs(price: f64, age_secs: i64) -> ConfidenceObservation {
        ConfidenceObservation {
            price,
            observed_at: Some(Utc::now() - Duration::seconds(age_secs)),
        }
    }

    #[test]
    fn zero_observations_yield_zero() {
        assert_eq!(calculate_confidence(&[]), 0.0);
    }

    #[test]
    fn single_observation_is_capped_at_point_six() {
        let confidence = calculate_confidence(&[obs(10.0, 0)]);
        assert!(confidence <= 0.6);
    }

    #[test]
    fn boundary_scenario_two() {
        let observations = [
            obs(10.0, 0),
            obs(10.2, 3600),
            obs(10.1, 0),
            obs(10.3, 7200),
            obs(10.15, 0),
        ];
        assert!(calculate_confidence(&observations) > 0.8);
    }

    #[test]
    fn monotonic_in_source_count() {
        let low = calculate_confidence(&[obs(10.0, 0), obs(10.0, 0)]);
        let high = calculate_confidence(&[obs(10.0, 0), obs(10.0, 0), obs(10.0, 0), obs(10.0, 0)]);
        assert!(high >= low);
    }

    #[test]
    fn confidence_always_in_unit_range() {
        let observations = [obs(1.0, 0), obs(1000.0, 999_999)];
        let confidence = calculate_confidence(&observations);
        assert!((0.0..=1.0).contains(&confidence));
    }
}
