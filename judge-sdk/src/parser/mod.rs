//! Tolerant parsing of judge model output
//!
//! Judge models are asked for JSON but reply with whatever they like: bare
//! JSON, JSON in a code fence, JSON buried in prose, or prose alone. The
//! parser tries progressively looser strategies and never fails; the weaker
//! the strategy, the lower the confidence it reports.

mod extract;

pub use extract::{extract_fenced_block, find_balanced_object};

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::criteria::{CriteriaSet, CriterionDefinition};
use crate::util::truncate_string;

/// Confidence used when a reply gives none
pub const DEFAULT_CONFIDENCE: f64 = 0.7;

/// Confidence attached to criteria the reply did not score
pub const MISSING_CRITERION_CONFIDENCE: f64 = 0.2;

/// Upper bound on confidence from the keyword heuristic
pub const HEURISTIC_CONFIDENCE: f64 = 0.3;

/// Confidence when the heuristic finds nothing at all
pub const NO_SIGNAL_CONFIDENCE: f64 = 0.1;

/// Which strategy produced a parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    /// The whole reply was JSON
    Direct,
    /// JSON inside the first fenced code block
    FencedBlock,
    /// First balanced `{...}` found in the text
    BraceMatch,
    /// Keyword scan of free text
    Heuristic,
}

impl fmt::Display for ParseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParseStrategy::Direct => "direct",
            ParseStrategy::FencedBlock => "fenced_block",
            ParseStrategy::BraceMatch => "brace_match",
            ParseStrategy::Heuristic => "heuristic",
        };
        f.write_str(name)
    }
}

/// Score for a single criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion: String,
    pub score: f64,
    pub reasoning: String,
    pub confidence: f64,
}

/// Structured evaluation extracted from a judge reply
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedEvaluation {
    /// One score per expected criterion, in criteria order
    pub scores: Vec<CriterionScore>,
    pub reasoning: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub suggestions: Vec<String>,
    pub strategy: ParseStrategy,
}

/// Winner of a pairwise comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    A,
    B,
    Tie,
}

impl Winner {
    /// Accepts the usual spellings: "A", "response_a", "Response B", "tie", "draw"...
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match normalized.as_str() {
            "a" | "responsea" | "answera" | "candidatea" | "first" | "1" => Some(Winner::A),
            "b" | "responseb" | "answerb" | "candidateb" | "second" | "2" => Some(Winner::B),
            "tie" | "draw" | "equal" | "neither" | "both" | "none" => Some(Winner::Tie),
            _ => None,
        }
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::A => write!(f, "A"),
            Winner::B => write!(f, "B"),
            Winner::Tie => write!(f, "tie"),
        }
    }
}

/// Structured comparison extracted from a judge reply
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonVerdict {
    pub winner: Winner,
    pub reasoning: String,
    pub confidence: f64,
    pub strategy: ParseStrategy,
}

/// Parser for judge replies
#[derive(Debug, Clone)]
pub struct ResponseParser {
    default_confidence: f64,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self {
            default_confidence: DEFAULT_CONFIDENCE,
        }
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the confidence used when a reply gives none
    pub fn with_default_confidence(mut self, confidence: f64) -> Self {
        self.default_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Parse an evaluation reply against the expected criteria
    pub fn parse(&self, raw: &str, criteria: &CriteriaSet) -> ParsedEvaluation {
        for (strategy, value) in json_candidates(raw) {
            if let Some(parsed) = self.interpret_evaluation(&value, criteria, strategy) {
                debug!(strategy = %strategy, "Parsed judge evaluation");
                return parsed;
            }
        }

        warn!(
            preview = %truncate_string(raw, 200),
            "Judge reply held no usable JSON, falling back to keyword heuristic"
        );
        heuristic_evaluation(raw, criteria)
    }

    /// Parse a pairwise comparison reply
    pub fn parse_comparison(&self, raw: &str) -> ComparisonVerdict {
        for (strategy, value) in json_candidates(raw) {
            if let Some(verdict) = self.interpret_comparison(&value, strategy) {
                debug!(strategy = %strategy, winner = %verdict.winner, "Parsed judge comparison");
                return verdict;
            }
        }

        warn!(
            preview = %truncate_string(raw, 200),
            "Comparison reply held no usable JSON, falling back to keyword heuristic"
        );
        heuristic_comparison(raw)
    }

    fn interpret_evaluation(
        &self,
        value: &Value,
        criteria: &CriteriaSet,
        strategy: ParseStrategy,
    ) -> Option<ParsedEvaluation> {
        let obj = value.as_object()?;
        let reasoning = text_field(obj, &["reasoning", "overall_reasoning", "explanation", "summary", "rationale"])
            .unwrap_or_default();
        let top_confidence = number_field(obj, &["confidence", "overall_confidence"]);

        let found = self
            .scores_object(obj, criteria)
            .or_else(|| self.scores_array(obj, criteria))
            .or_else(|| self.flat_scores(obj, criteria))
            .or_else(|| self.single_score(obj, criteria, &reasoning, top_confidence))?;

        let scores = criteria
            .iter()
            .map(|definition| {
                match found.iter().find(|entry| entry.criterion == definition.name) {
                    Some(entry) => entry.clone(),
                    None => missing_score(definition),
                }
            })
            .collect();

        Some(ParsedEvaluation {
            scores,
            reasoning,
            strengths: list_field(obj, &["strengths", "pros"]),
            weaknesses: list_field(obj, &["weaknesses", "cons"]),
            suggestions: list_field(obj, &["suggestions", "improvements", "recommendations"]),
            strategy,
        })
    }

    // {"scores": {"accuracy": {"score": 4, ...}, "clarity": 3}}
    fn scores_object(&self, obj: &Map<String, Value>, criteria: &CriteriaSet) -> Option<Vec<CriterionScore>> {
        let scores = field(obj, &["scores", "criteria_scores", "criteria"])?.as_object()?;
        non_empty(
            criteria
                .iter()
                .filter_map(|definition| {
                    let entry = lookup(scores, &definition.name)?;
                    self.score_entry(definition, entry, None, None)
                })
                .collect(),
        )
    }

    // {"scores": [{"criterion": "accuracy", "score": 4, ...}]}
    fn scores_array(&self, obj: &Map<String, Value>, criteria: &CriteriaSet) -> Option<Vec<CriterionScore>> {
        let items = field(obj, &["scores", "criteria_scores", "criteria"])?.as_array()?;
        non_empty(
            criteria
                .iter()
                .filter_map(|definition| {
                    let entry = items.iter().find(|item| {
                        item.as_object()
                            .and_then(|o| text_field(o, &["criterion", "name"]))
                            .map(|name| same_name(&name, &definition.name))
                            .unwrap_or(false)
                    })?;
                    self.score_entry(definition, entry, None, None)
                })
                .collect(),
        )
    }

    // {"accuracy": 4, "clarity": {"score": 3, ...}}
    fn flat_scores(&self, obj: &Map<String, Value>, criteria: &CriteriaSet) -> Option<Vec<CriterionScore>> {
        non_empty(
            criteria
                .iter()
                .filter_map(|definition| {
                    let entry = lookup(obj, &definition.name)?;
                    self.score_entry(definition, entry, None, None)
                })
                .collect(),
        )
    }

    // {"score": 4, "reasoning": "...", "confidence": 0.9} applies to every criterion
    fn single_score(
        &self,
        obj: &Map<String, Value>,
        criteria: &CriteriaSet,
        reasoning: &str,
        confidence: Option<f64>,
    ) -> Option<Vec<CriterionScore>> {
        let raw = field(obj, &["score", "overall_score", "rating"])?;
        let score = number_value(raw)?;
        non_empty(
            criteria
                .iter()
                .filter_map(|definition| {
                    self.score_entry(definition, &Value::from(score), Some(reasoning), confidence)
                })
                .collect(),
        )
    }

    fn score_entry(
        &self,
        definition: &CriterionDefinition,
        entry: &Value,
        fallback_reasoning: Option<&str>,
        fallback_confidence: Option<f64>,
    ) -> Option<CriterionScore> {
        let (score, reasoning, confidence) = match entry {
            Value::Object(inner) => (
                number_value(field(inner, &["score", "rating", "value"])?)?,
                text_field(inner, &["reasoning", "explanation", "rationale", "justification"]),
                number_field(inner, &["confidence"]),
            ),
            other => (number_value(other)?, None, None),
        };

        let score = definition.clamp(score);
        let reasoning = reasoning
            .or_else(|| fallback_reasoning.map(str::to_string))
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| format!("Scored {:.1} on {} without stated reasoning", score, definition.name));
        let confidence = confidence
            .or(fallback_confidence)
            .filter(|c| c.is_finite())
            .unwrap_or(self.default_confidence)
            .clamp(0.0, 1.0);

        Some(CriterionScore {
            criterion: definition.name.clone(),
            score,
            reasoning,
            confidence,
        })
    }

    fn interpret_comparison(&self, value: &Value, strategy: ParseStrategy) -> Option<ComparisonVerdict> {
        let obj = value.as_object()?;
        let winner = text_field(obj, &["winner", "preferred", "better_response", "choice", "verdict"])
            .and_then(|w| Winner::parse(&w))?;
        let reasoning = text_field(obj, &["reasoning", "explanation", "rationale", "summary"])
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| format!("Judge preferred {} without stated reasoning", winner));
        let confidence = number_field(obj, &["confidence"])
            .filter(|c| c.is_finite())
            .unwrap_or(self.default_confidence)
            .clamp(0.0, 1.0);

        Some(ComparisonVerdict {
            winner,
            reasoning,
            confidence,
            strategy,
        })
    }
}

/// JSON values to try, strongest strategy first
fn json_candidates(raw: &str) -> Vec<(ParseStrategy, Value)> {
    let mut candidates = Vec::new();
    let trimmed = raw.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        candidates.push((ParseStrategy::Direct, value));
    }
    if let Some(block) = extract_fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(block.trim()) {
            candidates.push((ParseStrategy::FencedBlock, value));
        }
    }
    if let Some(object) = find_balanced_object(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(object) {
            candidates.push((ParseStrategy::BraceMatch, value));
        }
    }

    candidates
}

fn missing_score(definition: &CriterionDefinition) -> CriterionScore {
    CriterionScore {
        criterion: definition.name.clone(),
        score: definition.midpoint(),
        reasoning: format!("No score given for {}; using the scale midpoint", definition.name),
        confidence: MISSING_CRITERION_CONFIDENCE,
    }
}

fn non_empty(scores: Vec<CriterionScore>) -> Option<Vec<CriterionScore>> {
    if scores.is_empty() {
        None
    } else {
        Some(scores)
    }
}

fn same_name(a: &str, b: &str) -> bool {
    let norm = |s: &str| -> String {
        s.trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect()
    };
    norm(a) == norm(b)
}

fn lookup<'a>(obj: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    obj.get(name)
        .or_else(|| obj.iter().find(|(key, _)| same_name(key, name)).map(|(_, v)| v))
}

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| lookup(obj, key))
}

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    field(obj, keys).and_then(|v| v.as_str()).map(str::to_string)
}

fn number_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    field(obj, keys).and_then(number_value)
}

fn list_field(obj: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    match field(obj, keys) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

static LEADING_NUMBER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\s*(-?\d+(?:\.\d+)?)").ok());

/// Numbers, or strings such as "4", "4.5", "4/5", "4 out of 5"
fn number_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => LEADING_NUMBER
            .as_ref()?
            .captures(s)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok()),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

// (pattern, fraction of the scale)
static QUALITY_KEYWORDS: Lazy<Vec<(Regex, f64)>> = Lazy::new(|| {
    [
        (r"\b(excellent|outstanding|exceptional|superb)\b", 0.9),
        (r"\b(good|solid|strong|well[- ]written)\b", 0.7),
        (r"\b(adequate|average|acceptable|mediocre|fair)\b", 0.5),
        (r"\b(poor|weak|lacking|inaccurate)\b", 0.3),
        (r"\b(terrible|awful|useless|wrong)\b", 0.1),
    ]
    .into_iter()
    .filter_map(|(pattern, fraction)| Regex::new(pattern).ok().map(|re| (re, fraction)))
    .collect()
});

fn heuristic_evaluation(raw: &str, criteria: &CriteriaSet) -> ParsedEvaluation {
    let lower = raw.to_lowercase();
    let hits: Vec<f64> = QUALITY_KEYWORDS
        .iter()
        .filter(|(re, _)| re.is_match(&lower))
        .map(|(_, fraction)| *fraction)
        .collect();

    let (fraction, confidence, reasoning) = if hits.is_empty() {
        (
            0.5,
            NO_SIGNAL_CONFIDENCE,
            "Judge reply could not be interpreted; defaulted to the scale midpoint".to_string(),
        )
    } else {
        (
            hits.iter().sum::<f64>() / hits.len() as f64,
            HEURISTIC_CONFIDENCE,
            format!(
                "Estimated from wording in an unstructured judge reply: {}",
                truncate_string(raw.trim(), 200)
            ),
        )
    };

    let scores = criteria
        .iter()
        .map(|definition| CriterionScore {
            criterion: definition.name.clone(),
            score: definition.at_fraction(fraction),
            reasoning: reasoning.clone(),
            confidence,
        })
        .collect();

    ParsedEvaluation {
        scores,
        reasoning,
        strengths: Vec::new(),
        weaknesses: Vec::new(),
        suggestions: Vec::new(),
        strategy: ParseStrategy::Heuristic,
    }
}

static PREFERS_A: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"\b(response|answer|candidate)?\s*a\s+is\s+(better|superior|stronger|preferred|preferable)\b|\bprefer\s+(response|answer|candidate)\s+a\b|\bwinner\s*(is|:)\s*(response\s+)?a\b").ok()
});

static PREFERS_B: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"\b(response|answer|candidate)?\s*b\s+is\s+(better|superior|stronger|preferred|preferable)\b|\bprefer\s+(response|answer|candidate)\s+b\b|\bwinner\s*(is|:)\s*(response\s+)?b\b").ok()
});

fn heuristic_comparison(raw: &str) -> ComparisonVerdict {
    let lower = raw.to_lowercase();
    let matches = |re: &Lazy<Option<Regex>>| re.as_ref().map(|re| re.is_match(&lower)).unwrap_or(false);

    let (winner, confidence) = match (matches(&PREFERS_A), matches(&PREFERS_B)) {
        (true, false) => (Winner::A, HEURISTIC_CONFIDENCE),
        (false, true) => (Winner::B, HEURISTIC_CONFIDENCE),
        _ => (Winner::Tie, NO_SIGNAL_CONFIDENCE),
    };

    ComparisonVerdict {
        winner,
        reasoning: format!(
            "Inferred from an unstructured judge reply: {}",
            truncate_string(raw.trim(), 200)
        ),
        confidence,
        strategy: ParseStrategy::Heuristic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{CriteriaOptions, DefaultCriteria};

    fn criteria() -> CriteriaSet {
        CriteriaSet::build(
            vec![
                CriterionDefinition::new("accuracy", "correct", 0.5),
                CriterionDefinition::new("clarity", "clear", 0.5),
            ],
            CriteriaOptions::validated(),
        )
        .unwrap()
    }

    #[test]
    fn test_single_score_applies_to_all() {
        let parsed = ResponseParser::new().parse(
            r#"{"score": 4, "reasoning": "Solid answer", "confidence": 0.9}"#,
            &criteria(),
        );
        assert_eq!(parsed.strategy, ParseStrategy::Direct);
        assert_eq!(parsed.scores.len(), 2);
        for score in &parsed.scores {
            assert_eq!(score.score, 4.0);
            assert_eq!(score.confidence, 0.9);
            assert_eq!(score.reasoning, "Solid answer");
        }
    }

    #[test]
    fn test_scores_object_shape() {
        let raw = r#"{"scores": {"accuracy": {"score": 5, "reasoning": "all correct", "confidence": 0.8}, "Clarity": "3/5"},
                     "strengths": ["precise"], "weaknesses": "terse", "reasoning": "overall fine"}"#;
        let parsed = ResponseParser::new().parse(raw, &criteria());
        assert_eq!(parsed.scores[0].score, 5.0);
        assert_eq!(parsed.scores[0].confidence, 0.8);
        assert_eq!(parsed.scores[1].score, 3.0);
        assert_eq!(parsed.scores[1].confidence, DEFAULT_CONFIDENCE);
        assert!(!parsed.scores[1].reasoning.is_empty());
        assert_eq!(parsed.strengths, vec!["precise"]);
        assert_eq!(parsed.weaknesses, vec!["terse"]);
        assert_eq!(parsed.reasoning, "overall fine");
    }

    #[test]
    fn test_scores_array_shape() {
        let raw = r#"{"scores": [{"criterion": "clarity", "score": 2, "reasoning": "muddled"},
                                 {"name": "accuracy", "score": 4.5}]}"#;
        let parsed = ResponseParser::new().parse(raw, &criteria());
        assert_eq!(parsed.scores[0].criterion, "accuracy");
        assert_eq!(parsed.scores[0].score, 4.5);
        assert_eq!(parsed.scores[1].reasoning, "muddled");
    }

    #[test]
    fn test_flat_shape_and_missing_criterion() {
        let parsed = ResponseParser::new().parse(r#"{"accuracy": 2}"#, &criteria());
        assert_eq!(parsed.scores[0].score, 2.0);
        assert_eq!(parsed.scores[1].score, 3.0);
        assert_eq!(parsed.scores[1].confidence, MISSING_CRITERION_CONFIDENCE);
    }

    #[test]
    fn test_out_of_range_scores_clamped() {
        let parsed = ResponseParser::new().parse(r#"{"accuracy": 7, "clarity": -3}"#, &criteria());
        assert_eq!(parsed.scores[0].score, 5.0);
        assert_eq!(parsed.scores[1].score, 1.0);
    }

    #[test]
    fn test_confidence_clamped() {
        let parsed = ResponseParser::new().parse(r#"{"score": 3, "confidence": 1.7}"#, &criteria());
        assert!(parsed.scores.iter().all(|s| s.confidence == 1.0));
    }

    #[test]
    fn test_fenced_block() {
        let raw = "Here is my evaluation:\n```json\n{\"score\": 2, \"reasoning\": \"thin\"}\n```\nThanks!";
        let parsed = ResponseParser::new().parse(raw, &criteria());
        assert_eq!(parsed.strategy, ParseStrategy::FencedBlock);
        assert_eq!(parsed.scores[0].score, 2.0);
    }

    #[test]
    fn test_brace_match_in_prose() {
        let raw = r#"My verdict {"score": 5, "reasoning": "uses {braces} in text"} end"#;
        let parsed = ResponseParser::new().parse(raw, &criteria());
        assert_eq!(parsed.strategy, ParseStrategy::BraceMatch);
        assert_eq!(parsed.scores[0].reasoning, "uses {braces} in text");
    }

    #[test]
    fn test_json_without_scores_falls_through() {
        let parsed = ResponseParser::new().parse(r#"{"note": "excellent work"}"#, &criteria());
        assert_eq!(parsed.strategy, ParseStrategy::Heuristic);
    }

    #[test]
    fn test_heuristic_on_garbage() {
        let parsed = ResponseParser::new().parse("This answer is excellent and thorough.", &criteria());
        assert_eq!(parsed.strategy, ParseStrategy::Heuristic);
        assert!(parsed.scores.iter().all(|s| s.confidence <= HEURISTIC_CONFIDENCE));
        assert!(parsed.scores.iter().all(|s| s.score > 4.0));

        let parsed = ResponseParser::new().parse("%%%", &DefaultCriteria::Basic.criteria());
        assert!(parsed.scores.iter().all(|s| s.confidence == NO_SIGNAL_CONFIDENCE));
        assert!(parsed.scores.iter().all(|s| s.score == 3.0));
    }

    #[test]
    fn test_heuristic_uses_word_boundaries() {
        // "goodness" and "wrongly" alone should not count as verdicts
        let parsed = ResponseParser::new().parse("goodness gracious, wrongly formatted", &criteria());
        assert_eq!(parsed.scores[0].confidence, NO_SIGNAL_CONFIDENCE);
    }

    #[test]
    fn test_comparison_json() {
        let verdict = ResponseParser::new()
            .parse_comparison(r#"{"winner": "A", "reasoning": "more accurate", "confidence": 0.85}"#);
        assert_eq!(verdict.winner, Winner::A);
        assert_eq!(verdict.confidence, 0.85);
        assert_eq!(verdict.reasoning, "more accurate");
        assert_eq!(verdict.strategy, ParseStrategy::Direct);
    }

    #[test]
    fn test_winner_spellings() {
        assert_eq!(Winner::parse("response_b"), Some(Winner::B));
        assert_eq!(Winner::parse("Response A"), Some(Winner::A));
        assert_eq!(Winner::parse("draw"), Some(Winner::Tie));
        assert_eq!(Winner::parse("EQUAL"), Some(Winner::Tie));
        assert_eq!(Winner::parse("maybe"), None);
    }

    #[test]
    fn test_comparison_heuristic() {
        let verdict = ResponseParser::new().parse_comparison("Overall, Response B is better because it cites sources.");
        assert_eq!(verdict.winner, Winner::B);
        assert!(verdict.confidence <= HEURISTIC_CONFIDENCE);

        let verdict = ResponseParser::new().parse_comparison("Both have merit.");
        assert_eq!(verdict.winner, Winner::Tie);
        assert_eq!(verdict.confidence, NO_SIGNAL_CONFIDENCE);
    }
}
