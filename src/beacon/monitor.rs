use std::collections::HashMap;

use chrono::{DateTime, Timelike, Utc};
use parking_lot::RwLock;

use super::error::{BeaconError, Result};
use super::types::{BeaconPath, DayPart, PathReport};

const MAX_OBSERVATIONS_PER_TARGET: usize = 64;
const RECENCY_HALF_LIFE_SECS: f64 = 3600.0;

/// Oracle consumed by the scheduler and dispatcher for path-quality ranking
/// (spec.md §4.9). Holds no transfer logic: it only records what has been
/// heard over the air and reports derived metrics on request.
pub struct BeaconMonitor {
    observations: RwLock<HashMap<String, Vec<BeaconPath>>>,
}

impl Default for BeaconMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl BeaconMonitor {
    pub fn new() -> Self {
        Self { observations: RwLock::new(HashMap::new()) }
    }

    /// Record one heard path, evicting the oldest observation for that
    /// target if the per-target log is full.
    pub fn observe(&self, path: BeaconPath) {
        let mut observations = self.observations.write();
        let log = observations.entry(path.target.clone()).or_default();
        log.push(path);
        if log.len() > MAX_OBSERVATIONS_PER_TARGET {
            log.remove(0);
        }
    }

    fn recency_weight(last_heard: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_secs = (now - last_heard).num_seconds().max(0) as f64;
        0.5f64.powf(age_secs / RECENCY_HALF_LIFE_SECS)
    }

    /// Derived metrics for `target`: mean signal strength, a reliability
    /// score that penalizes variance and rewards recency, and a day/night
    /// split of the same.
    pub fn report(&self, target: &str) -> Result<PathReport> {
        let observations = self.observations.read();
        let log = observations
            .get(target)
            .filter(|log| !log.is_empty())
            .ok_or_else(|| BeaconError::NoObservations(target.to_string()))?;

        let now = Utc::now();
        let n = log.len() as f32;
        let mean = log.iter().map(|p| p.signal_strength).sum::<f32>() / n;
        let variance = log.iter().map(|p| (p.signal_strength - mean).powi(2)).sum::<f32>() / n;
        let coefficient_of_variation = if mean.abs() > f32::EPSILON {
            (variance.sqrt() / mean.abs()).min(1.0)
        } else {
            1.0
        };

        let recency = log
            .iter()
            .map(|p| Self::recency_weight(p.last_heard, now))
            .fold(0.0_f64, f64::max);

        let reliability =
            (mean.clamp(0.0, 1.0) * (1.0 - coefficient_of_variation) * recency as f32).clamp(0.0, 1.0);

        let (day, night): (Vec<_>, Vec<_>) = log
            .iter()
            .partition(|p| DayPart::from_hour(p.last_heard.hour()) == DayPart::Day);

        let day_reliability = Self::bucket_reliability(&day);
        let night_reliability = Self::bucket_reliability(&night);

        Ok(PathReport {
            target: target.to_string(),
            average_signal_strength: mean,
            reliability,
            observations: log.len(),
            day_reliability,
            night_reliability,
            last_heard: log.iter().map(|p| p.last_heard).max().unwrap(),
        })
    }

    fn bucket_reliability(bucket: &[&BeaconPath]) -> f32 {
        if bucket.is_empty() {
            return 0.0;
        }
        let n = bucket.len() as f32;
        let mean = bucket.iter().map(|p| p.signal_strength).sum::<f32>() / n;
        mean.clamp(0.0, 1.0)
    }

    /// Reachability matrix: every target with at least one observation,
    /// paired with its current reliability score.
    pub fn reachability_matrix(&self) -> Vec<(String, f32)> {
        self.observations
            .read()
            .keys()
            .filter_map(|target| self.report(target).ok().map(|r| (target.clone(), r.reliability)))
            .collect()
    }

    /// Rough coverage radius in km, estimated from the best hop_count/signal
    /// tradeoff heard across all targets. This is a coarse oracle hint, not
    /// a physical model.
    pub fn estimated_coverage_radius_km(&self) -> Option<f32> {
        let observations = self.observations.read();
        observations
            .values()
            .flatten()
            .map(|p| p.signal_strength * (p.hop_count as f32 + 1.0) * 50.0)
            .fold(None, |acc, r| Some(acc.map_or(r, |a: f32| a.max(r))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn path(target: &str, strength: f32, age_secs: i64) -> BeaconPath {
        BeaconPath {
            origin: "home".into(),
            target: target.into(),
            hop_count: 1,
            signal_strength: strength,
            last_heard: Utc::now() - ChronoDuration::seconds(age_secs),
            band: 20,
            frequency_hz: 14_070_000,
        }
    }

    #[test]
    fn report_without_observations_errors() {
        let monitor = BeaconMonitor::new();
        assert!(monitor.report("ke0abc").is_err());
    }

    #[test]
    fn stable_signal_scores_higher_than_noisy_signal() {
        let monitor = BeaconMonitor::new();
        monitor.observe(path("stable", 0.9, 0));
        monitor.observe(path("stable", 0.9, 0));
        monitor.observe(path("stable", 0.9, 0));

        monitor.observe(path("noisy", 0.9, 0));
        monitor.observe(path("noisy", 0.1, 0));
        monitor.observe(path("noisy", 0.9, 0));

        let stable = monitor.report("stable").unwrap();
        let noisy = monitor.report("noisy").unwrap();
        assert!(stable.reliability > noisy.reliability);
    }

    #[test]
    fn stale_observations_score_lower_than_fresh() {
        let monitor = BeaconMonitor::new();
        monitor.observe(path("fresh", 0.8, 0));
        monitor.observe(path("stale", 0.8, 7200));

        let fresh = monitor.report("fresh").unwrap();
        let stale = monitor.report("stale").unwrap();
        assert!(fresh.reliability > stale.reliability);
    }

    #[test]
    fn reachability_matrix_lists_all_targets() {
        let monitor = BeaconMonitor::new();
        monitor.observe(path("a", 0.5, 0));
        monitor.observe(path("b", 0.6, 0));
        let matrix = monitor.reachability_matrix();
        assert_eq!(matrix.len(), 2);
    }
}
