// ── MindGraph Graph: History Analytics ──────────────────────────────────────
// Trend and volatility over a relationship's event log. Trend looks at a
// short recent window; volatility looks at the whole history.

use log::debug;

use crate::atoms::error::GraphResult;
use crate::atoms::results::{TrendDirection, TrendReport, VolatilityLevel, VolatilityReport};
use crate::atoms::types::RelationshipEvent;
use crate::graph::GraphService;

/// Average absolute step between consecutive events above which a window
/// is called volatile regardless of its net change.
const VOLATILE_STEP: f64 = 0.5;
/// Net change beyond which a window counts as improving/worsening.
const TREND_CHANGE: f64 = 0.2;

impl GraphService {
    /// The raw event log for a relationship, newest first.
    pub fn get_relationship_events(
        &self,
        rel_id: &str,
        limit: Option<usize>,
    ) -> GraphResult<Vec<RelationshipEvent>> {
        self.store.list_events(rel_id, limit, false)
    }

    /// Direction of the signed valence over the last `window` events.
    /// Change is newest minus oldest within the window; a window whose
    /// consecutive steps are large is volatile even when the net change
    /// looks like a clean trend.
    pub fn get_relationship_trend(&self, rel_id: &str, window: usize) -> GraphResult<TrendReport> {
        let events = self.store.list_events(rel_id, Some(window.max(1)), false)?;

        let report = match events.len() {
            0 => TrendReport {
                rel_id: rel_id.to_string(),
                direction: TrendDirection::Unknown,
                change: 0.0,
                current_valence: None,
                oldest_valence: None,
                events_considered: 0,
                window,
            },
            1 => TrendReport {
                rel_id: rel_id.to_string(),
                direction: TrendDirection::Stable,
                change: 0.0,
                current_valence: Some(events[0].valence),
                oldest_valence: Some(events[0].valence),
                events_considered: 1,
                window,
            },
            n => {
                let current = events[0].valence;
                let oldest = events[n - 1].valence;
                let change = current - oldest;

                let avg_step = events
                    .windows(2)
                    .map(|pair| (pair[0].valence - pair[1].valence).abs())
                    .sum::<f64>()
                    / (n - 1) as f64;

                let direction = if avg_step > VOLATILE_STEP {
                    TrendDirection::Volatile
                } else if change > TREND_CHANGE {
                    TrendDirection::Improving
                } else if change < -TREND_CHANGE {
                    TrendDirection::Worsening
                } else {
                    TrendDirection::Stable
                };

                TrendReport {
                    rel_id: rel_id.to_string(),
                    direction,
                    change,
                    current_valence: Some(current),
                    oldest_valence: Some(oldest),
                    events_considered: n,
                    window,
                }
            }
        };

        debug!(
            "[graph] Trend for {}: {:?} (change={:.2}, events={})",
            rel_id, report.direction, report.change, report.events_considered
        );
        Ok(report)
    }

    /// Volatility of the full event history: population stddev of the
    /// signed valence plus a penalty for sign flips, capped at 1.0.
    pub fn get_relationship_volatility(&self, rel_id: &str) -> GraphResult<VolatilityReport> {
        let events = self.store.list_events(rel_id, None, true)?;
        let n = events.len();

        if n < 2 {
            return Ok(VolatilityReport {
                rel_id: rel_id.to_string(),
                level: VolatilityLevel::InsufficientData,
                volatility: 0.0,
                stddev: 0.0,
                sign_changes: 0,
                events_considered: n,
            });
        }

        let values: Vec<f64> = events.iter().map(|e| e.valence).collect();
        let mean = values.iter().sum::<f64>() / n as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        let stddev = variance.sqrt();

        let sign_changes = values
            .windows(2)
            .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
            .count();
        let flip_ratio = sign_changes as f64 / (n - 1) as f64;

        let volatility = (stddev.min(1.0) + flip_ratio * 0.3).min(1.0);
        let level = if volatility < 0.2 {
            VolatilityLevel::Stable
        } else if volatility < 0.5 {
            VolatilityLevel::Fluctuating
        } else {
            VolatilityLevel::HighlyUnstable
        };

        debug!(
            "[graph] Volatility for {}: {:?} ({:.3}, stddev={:.3}, flips={})",
            rel_id, level, volatility, stddev, sign_changes
        );
        Ok(VolatilityReport {
            rel_id: rel_id.to_string(),
            level,
            volatility,
            stddev,
            sign_changes,
            events_considered: n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::{NormalizationMethod, RelationCategory};
    use crate::graph::test_support::bare_service;
    use crate::store::now_ts;
    use crate::store::relationships::test_support::sample_relationship;

    fn seed_events(svc: &crate::graph::GraphService, valences: &[f64]) {
        svc.store
            .insert_relationship(&sample_relationship(
                "rel:1",
                "person:a",
                "food:pizza",
                RelationCategory::Sentiment,
            ))
            .unwrap();
        for (i, valence) in valences.iter().enumerate() {
            svc.store
                .insert_event(&RelationshipEvent {
                    event_id: format!("evt:{i}"),
                    rel_id: "rel:1".to_string(),
                    predicate: "amare".to_string(),
                    valence: *valence,
                    intensity: valence.abs(),
                    source_sentence: None,
                    timestamp: now_ts(),
                    normalization_method: NormalizationMethod::Direct,
                    normalization_confidence: 0.95,
                    metadata: serde_json::Value::Null,
                })
                .unwrap();
        }
    }

    #[tokio::test]
    async fn no_events_is_unknown() {
        let svc = bare_service();
        seed_events(&svc, &[]);
        let trend = svc.get_relationship_trend("rel:1", 3).unwrap();
        assert_eq!(trend.direction, TrendDirection::Unknown);
        assert!(trend.current_valence.is_none());
    }

    #[tokio::test]
    async fn single_event_is_stable() {
        let svc = bare_service();
        seed_events(&svc, &[0.7]);
        let trend = svc.get_relationship_trend("rel:1", 3).unwrap();
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert_eq!(trend.current_valence, Some(0.7));
        assert_eq!(trend.events_considered, 1);
    }

    #[tokio::test]
    async fn rising_valence_is_improving() {
        let svc = bare_service();
        seed_events(&svc, &[0.2, 0.5, 0.6]);
        let trend = svc.get_relationship_trend("rel:1", 3).unwrap();
        assert_eq!(trend.direction, TrendDirection::Improving);
        assert!((trend.change - 0.4).abs() < 1e-9);
        assert_eq!(trend.current_valence, Some(0.6));
        assert_eq!(trend.oldest_valence, Some(0.2));
    }

    #[tokio::test]
    async fn falling_valence_is_worsening() {
        let svc = bare_service();
        seed_events(&svc, &[0.6, 0.4, 0.1]);
        let trend = svc.get_relationship_trend("rel:1", 3).unwrap();
        assert_eq!(trend.direction, TrendDirection::Worsening);
    }

    #[tokio::test]
    async fn wild_swings_beat_the_net_change() {
        let svc = bare_service();
        // net change +1.7 would read as improving, but the steps are huge
        seed_events(&svc, &[-0.8, 0.1, 0.9]);
        let trend = svc.get_relationship_trend("rel:1", 3).unwrap();
        assert_eq!(trend.direction, TrendDirection::Volatile);
    }

    #[tokio::test]
    async fn window_only_sees_recent_events() {
        let svc = bare_service();
        seed_events(&svc, &[-0.9, 0.3, 0.4, 0.5]);
        let trend = svc.get_relationship_trend("rel:1", 3).unwrap();
        assert_eq!(trend.events_considered, 3);
        assert_eq!(trend.oldest_valence, Some(0.3));
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[tokio::test]
    async fn volatility_needs_two_events() {
        let svc = bare_service();
        seed_events(&svc, &[0.5]);
        let report = svc.get_relationship_volatility("rel:1").unwrap();
        assert_eq!(report.level, VolatilityLevel::InsufficientData);
    }

    #[tokio::test]
    async fn steady_history_is_stable() {
        let svc = bare_service();
        seed_events(&svc, &[0.5, 0.52, 0.48, 0.5]);
        let report = svc.get_relationship_volatility("rel:1").unwrap();
        assert_eq!(report.level, VolatilityLevel::Stable);
        assert_eq!(report.sign_changes, 0);
    }

    #[tokio::test]
    async fn alternating_signs_are_highly_unstable() {
        let svc = bare_service();
        seed_events(&svc, &[0.8, -0.8, 0.8, -0.8]);
        let report = svc.get_relationship_volatility("rel:1").unwrap();
        assert_eq!(report.level, VolatilityLevel::HighlyUnstable);
        assert_eq!(report.sign_changes, 3);
        assert!((report.volatility - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn events_surface_newest_first() {
        let svc = bare_service();
        seed_events(&svc, &[0.1, 0.2, 0.3]);
        let events = svc.get_relationship_events("rel:1", Some(2)).unwrap();
        assert_eq!(events.len(), 2);
        assert!((events[0].valence - 0.3).abs() < 1e-9);
    }
}
