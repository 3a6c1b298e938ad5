//! Multi-criteria score aggregation
//!
//! Folds per-criterion scores into one weighted result plus summary
//! statistics. Scores are keyed by criterion name and processed in name
//! order, so the result does not depend on the order the judge listed them.

use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::criteria::CriteriaSet;
use crate::parser::{CriterionScore, ParseStrategy, ParsedEvaluation};

/// Final result of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedResult {
    /// Weighted mean of criterion scores
    pub overall_score: f64,
    /// Weighted mean of criterion confidences
    pub confidence: f64,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Scores that matched a definition, sorted by criterion name
    pub criterion_scores: Vec<CriterionScore>,
    pub reasoning: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub suggestions: Vec<String>,
    /// Provider name, "cache" or "none"
    pub served_by: String,
    pub degraded: bool,
    pub parse_strategy: Option<ParseStrategy>,
}

impl AggregatedResult {
    /// Carry over the judge's narrative from a parsed reply
    pub fn with_narrative(mut self, parsed: &ParsedEvaluation) -> Self {
        self.reasoning = if parsed.reasoning.trim().is_empty() {
            self.criterion_scores
                .iter()
                .map(|s| format!("{}: {}", s.criterion, s.reasoning))
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            parsed.reasoning.clone()
        };
        self.strengths = parsed.strengths.clone();
        self.weaknesses = parsed.weaknesses.clone();
        self.suggestions = parsed.suggestions.clone();
        self.parse_strategy = Some(parsed.strategy);
        self
    }

    /// Record where the underlying reply came from
    pub fn with_source(mut self, served_by: impl Into<String>, degraded: bool) -> Self {
        self.served_by = served_by.into();
        self.degraded = degraded;
        self
    }

    /// Scale confidence down, e.g. for replies replayed from cache
    pub fn discount_confidence(mut self, factor: f64) -> Self {
        let factor = factor.clamp(0.0, 1.0);
        self.confidence *= factor;
        for score in &mut self.criterion_scores {
            score.confidence *= factor;
        }
        self
    }

    /// Score for one criterion, if present
    pub fn score_for(&self, criterion: &str) -> Option<&CriterionScore> {
        self.criterion_scores.iter().find(|s| s.criterion == criterion)
    }
}

/// Aggregate `scores` against their definitions
///
/// Scores naming an unknown criterion are dropped. A repeated criterion keeps
/// the score with the higher confidence, then the higher score, so input
/// order never matters. With no usable scores every statistic is zero.
pub fn aggregate(scores: &[CriterionScore], criteria: &CriteriaSet) -> AggregatedResult {
    let mut keyed: BTreeMap<&str, &CriterionScore> = BTreeMap::new();
    for score in scores.iter().filter(|s| criteria.get(&s.criterion).is_some()) {
        match keyed.entry(score.criterion.as_str()) {
            Entry::Vacant(slot) => {
                slot.insert(score);
            }
            Entry::Occupied(mut slot) => {
                warn!(criterion = %score.criterion, "Duplicate criterion score, keeping the stronger one");
                if prefer(score, slot.get()) == Ordering::Greater {
                    slot.insert(score);
                }
            }
        }
    }

    let weighted: Vec<(&CriterionScore, f64)> = keyed
        .values()
        .filter_map(|s| criteria.get(&s.criterion).map(|d| (*s, d.weight)))
        .collect();

    let values: Vec<f64> = weighted.iter().map(|(s, _)| s.score).collect();
    let total_weight: f64 = weighted.iter().map(|(_, w)| w).sum();

    let (overall_score, confidence) = if weighted.is_empty() {
        (0.0, 0.0)
    } else if total_weight > 0.0 {
        (
            weighted.iter().map(|(s, w)| s.score * w).sum::<f64>() / total_weight,
            weighted.iter().map(|(s, w)| s.confidence * w).sum::<f64>() / total_weight,
        )
    } else {
        let n = weighted.len() as f64;
        (
            values.iter().sum::<f64>() / n,
            weighted.iter().map(|(s, _)| s.confidence).sum::<f64>() / n,
        )
    };

    AggregatedResult {
        overall_score,
        confidence: confidence.clamp(0.0, 1.0),
        mean: mean(&values),
        median: median(&values),
        std_dev: std_dev(&values),
        min: values.iter().copied().reduce(f64::min).unwrap_or(0.0),
        max: values.iter().copied().reduce(f64::max).unwrap_or(0.0),
        criterion_scores: weighted.iter().map(|(s, _)| (*s).clone()).collect(),
        reasoning: String::new(),
        strengths: Vec::new(),
        weaknesses: Vec::new(),
        suggestions: Vec::new(),
        served_by: String::new(),
        degraded: false,
        parse_strategy: None,
    }
}

fn prefer(a: &CriterionScore, b: &CriterionScore) -> Ordering {
    a.confidence
        .total_cmp(&b.confidence)
        .then(a.score.total_cmp(&b.score))
        .then_with(|| a.reasoning.cmp(&b.reasoning))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{CriteriaOptions, CriterionDefinition};

    fn score(name: &str, value: f64, confidence: f64) -> CriterionScore {
        CriterionScore {
            criterion: name.to_string(),
            score: value,
            reasoning: format!("{} reasoning", name),
            confidence,
        }
    }

    fn criteria(weights: &[(&str, f64)]) -> CriteriaSet {
        CriteriaSet::build(
            weights
                .iter()
                .map(|(name, w)| CriterionDefinition::new(*name, "", *w))
                .collect(),
            CriteriaOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_weighted_overall() {
        let set = criteria(&[("a", 0.75), ("b", 0.25)]);
        let result = aggregate(&[score("a", 4.0, 0.8), score("b", 2.0, 0.4)], &set);
        assert!((result.overall_score - 3.5).abs() < 1e-12);
        assert!((result.confidence - 0.7).abs() < 1e-12);
        assert_eq!(result.mean, 3.0);
        assert_eq!(result.median, 3.0);
        assert_eq!(result.std_dev, 1.0);
        assert_eq!(result.min, 2.0);
        assert_eq!(result.max, 4.0);
    }

    #[test]
    fn test_uniform_scores() {
        let set = criteria(&[("a", 0.5), ("b", 0.3), ("c", 0.2)]);
        let result = aggregate(
            &[score("a", 4.0, 0.9), score("b", 4.0, 0.9), score("c", 4.0, 0.9)],
            &set,
        );
        assert!((result.overall_score - 4.0).abs() < 1e-12);
        assert!((result.confidence - 0.9).abs() < 1e-12);
        assert_eq!(result.std_dev, 0.0);
    }

    #[test]
    fn test_zero_weights_use_plain_mean() {
        let set = criteria(&[("a", 0.0), ("b", 0.0)]);
        let result = aggregate(&[score("a", 5.0, 1.0), score("b", 1.0, 0.5)], &set);
        assert_eq!(result.overall_score, 3.0);
        assert_eq!(result.confidence, 0.75);
    }

    #[test]
    fn test_unknown_criteria_dropped() {
        let set = criteria(&[("a", 1.0)]);
        let result = aggregate(&[score("a", 4.0, 0.9), score("zzz", 1.0, 0.9)], &set);
        assert_eq!(result.criterion_scores.len(), 1);
        assert_eq!(result.overall_score, 4.0);
        assert_eq!(result.min, 4.0);
    }

    #[test]
    fn test_order_independent() {
        let set = criteria(&[("a", 0.2), ("b", 0.3), ("c", 0.5)]);
        let forward = [score("a", 1.0, 0.3), score("b", 3.5, 0.6), score("c", 4.5, 0.9)];
        let mut backward = forward.clone();
        backward.reverse();
        assert_eq!(aggregate(&forward, &set), aggregate(&backward, &set));
    }

    #[test]
    fn test_duplicate_criterion_keeps_stronger_score() {
        let set = criteria(&[("a", 0.5), ("b", 0.5)]);
        let scores = [
            score("a", 2.0, 0.4),
            score("b", 3.0, 0.7),
            score("a", 5.0, 0.9),
            score("b", 4.0, 0.7),
        ];
        let mut reversed = scores.clone();
        reversed.reverse();

        let result = aggregate(&scores, &set);
        assert_eq!(result, aggregate(&reversed, &set));
        assert_eq!(result.criterion_scores.len(), 2);
        assert_eq!(result.score_for("a").map(|s| s.score), Some(5.0));
        // Equal confidence falls back to the higher score
        assert_eq!(result.score_for("b").map(|s| s.score), Some(4.0));
    }

    #[test]
    fn test_overall_within_bounds() {
        let set = criteria(&[("a", 0.1), ("b", 0.2), ("c", 0.3), ("d", 0.4)]);
        let cases = [
            [1.0, 5.0, 3.0, 2.0],
            [5.0, 5.0, 5.0, 1.0],
            [2.5, 2.5, 2.5, 2.5],
            [1.0, 1.0, 1.0, 1.0],
        ];
        for values in cases {
            let scores: Vec<_> = ["a", "b", "c", "d"]
                .iter()
                .zip(values)
                .map(|(n, v)| score(n, v, 0.5))
                .collect();
            let result = aggregate(&scores, &set);
            assert!(result.overall_score >= result.min - 1e-9);
            assert!(result.overall_score <= result.max + 1e-9);
        }
    }

    #[test]
    fn test_empty_scores() {
        let set = criteria(&[("a", 1.0)]);
        let result = aggregate(&[], &set);
        assert_eq!(result.overall_score, 0.0);
        assert_eq!(result.confidence, 0.0);
        assert!(result.criterion_scores.is_empty());
    }

    #[test]
    fn test_discount_confidence() {
        let set = criteria(&[("a", 1.0)]);
        let result = aggregate(&[score("a", 4.0, 0.8)], &set).discount_confidence(0.5);
        assert!((result.confidence - 0.4).abs() < 1e-12);
        assert!((result.criterion_scores[0].confidence - 0.4).abs() < 1e-12);
    }
}
