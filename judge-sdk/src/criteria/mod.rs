//! Evaluation criteria
//!
//! A `CriteriaSet` is a validated, ordered list of criterion definitions.
//! Validation happens once at build time; everything downstream may assume
//! unique names, finite non-negative weights and a proper scale.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{JudgeError, Result};

/// One dimension a candidate is scored on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionDefinition {
    pub name: String,
    pub description: String,
    pub weight: f64,
    pub scale_min: f64,
    pub scale_max: f64,
}

impl CriterionDefinition {
    /// Criterion on the default 1–5 scale
    pub fn new(name: impl Into<String>, description: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            weight,
            scale_min: 1.0,
            scale_max: 5.0,
        }
    }

    pub fn with_scale(mut self, scale_min: f64, scale_max: f64) -> Self {
        self.scale_min = scale_min;
        self.scale_max = scale_max;
        self
    }

    pub fn midpoint(&self) -> f64 {
        (self.scale_min + self.scale_max) / 2.0
    }

    /// Clamp `score` into this criterion's scale
    pub fn clamp(&self, score: f64) -> f64 {
        score.clamp(self.scale_min, self.scale_max)
    }

    /// Score at `fraction` of the way up the scale
    pub fn at_fraction(&self, fraction: f64) -> f64 {
        self.scale_min + (self.scale_max - self.scale_min) * fraction.clamp(0.0, 1.0)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(JudgeError::invalid_criteria("criterion name must not be empty"));
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(JudgeError::invalid_criteria(format!(
                "criterion '{}' has invalid weight {}",
                self.name, self.weight
            )));
        }
        if !self.scale_min.is_finite() || !self.scale_max.is_finite() || self.scale_min >= self.scale_max {
            return Err(JudgeError::invalid_criteria(format!(
                "criterion '{}' has invalid scale [{}, {}]",
                self.name, self.scale_min, self.scale_max
            )));
        }
        Ok(())
    }
}

/// How weights are checked when building a set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CriteriaOptions {
    /// Divide every weight by the total so they sum to 1
    pub normalize_weights: bool,
    /// Reject sets whose weights do not already sum to 1
    pub validate_weights: bool,
    pub epsilon: f64,
}

impl Default for CriteriaOptions {
    fn default() -> Self {
        Self {
            normalize_weights: false,
            validate_weights: false,
            epsilon: 1e-6,
        }
    }
}

impl CriteriaOptions {
    pub fn normalized() -> Self {
        Self {
            normalize_weights: true,
            ..Self::default()
        }
    }

    pub fn validated() -> Self {
        Self {
            validate_weights: true,
            ..Self::default()
        }
    }
}

/// Validated, ordered collection of criteria
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriteriaSet {
    criteria: Vec<CriterionDefinition>,
}

impl CriteriaSet {
    /// Validate and build a set
    pub fn build(criteria: Vec<CriterionDefinition>, options: CriteriaOptions) -> Result<Self> {
        if criteria.is_empty() {
            return Err(JudgeError::invalid_criteria("at least one criterion is required"));
        }

        let mut seen = HashSet::new();
        for criterion in &criteria {
            criterion.validate()?;
            if !seen.insert(criterion.name.as_str()) {
                return Err(JudgeError::invalid_criteria(format!(
                    "duplicate criterion name '{}'",
                    criterion.name
                )));
            }
        }

        let total: f64 = criteria.iter().map(|c| c.weight).sum();

        if options.validate_weights && (total - 1.0).abs() > options.epsilon {
            return Err(JudgeError::invalid_criteria(format!(
                "weights sum to {}, expected 1.0",
                total
            )));
        }

        let criteria = if options.normalize_weights {
            if total <= 0.0 {
                return Err(JudgeError::invalid_criteria(
                    "cannot normalise weights that sum to zero",
                ));
            }
            criteria
                .into_iter()
                .map(|mut c| {
                    c.weight /= total;
                    c
                })
                .collect()
        } else {
            criteria
        };

        Ok(Self { criteria })
    }

    /// One of the built-in sets, by name
    pub fn named(name: &str) -> Result<Self> {
        let preset: DefaultCriteria = name.parse()?;
        Ok(preset.criteria())
    }

    pub fn get(&self, name: &str) -> Option<&CriterionDefinition> {
        self.criteria.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CriterionDefinition> {
        self.criteria.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.criteria.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.criteria.iter().map(|c| c.weight).sum()
    }
}

impl<'a> IntoIterator for &'a CriteriaSet {
    type Item = &'a CriterionDefinition;
    type IntoIter = std::slice::Iter<'a, CriterionDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.criteria.iter()
    }
}

/// Built-in criteria presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultCriteria {
    Comprehensive,
    Basic,
    Technical,
    Creative,
}

impl DefaultCriteria {
    pub const ALL: [DefaultCriteria; 4] = [
        DefaultCriteria::Comprehensive,
        DefaultCriteria::Basic,
        DefaultCriteria::Technical,
        DefaultCriteria::Creative,
    ];

    fn definitions(self) -> Vec<CriterionDefinition> {
        let c = CriterionDefinition::new;
        match self {
            DefaultCriteria::Comprehensive => vec![
                c("accuracy", "Factual correctness of the information provided", 0.25),
                c("relevance", "How directly the response addresses the question", 0.20),
                c("completeness", "Coverage of every part of the question", 0.20),
                c("clarity", "Organisation and readability of the response", 0.15),
                c("helpfulness", "Practical value of the response to the asker", 0.20),
            ],
            DefaultCriteria::Basic => vec![
                c("accuracy", "Factual correctness of the information provided", 0.4),
                c("relevance", "How directly the response addresses the question", 0.3),
                c("clarity", "Organisation and readability of the response", 0.3),
            ],
            DefaultCriteria::Technical => vec![
                c("correctness", "Technical accuracy of code, commands and claims", 0.35),
                c("completeness", "Whether every requirement is handled", 0.20),
                c("clarity", "Quality of explanation and structure", 0.15),
                c("best_practices", "Adherence to idiomatic, maintainable approaches", 0.15),
                c("efficiency", "Performance and resource awareness of the solution", 0.15),
            ],
            DefaultCriteria::Creative => vec![
                c("originality", "Novelty of ideas and framing", 0.30),
                c("engagement", "How compelling the piece is to read", 0.25),
                c("coherence", "Internal consistency and flow", 0.25),
                c("style", "Command of voice, tone and language", 0.20),
            ],
        }
    }

    /// The preset as a validated set
    pub fn criteria(self) -> CriteriaSet {
        // Presets are fixed data that always pass validation.
        CriteriaSet {
            criteria: self.definitions(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DefaultCriteria::Comprehensive => "comprehensive",
            DefaultCriteria::Basic => "basic",
            DefaultCriteria::Technical => "technical",
            DefaultCriteria::Creative => "creative",
        }
    }
}

impl FromStr for DefaultCriteria {
    type Err = JudgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "comprehensive" => Ok(DefaultCriteria::Comprehensive),
            "basic" => Ok(DefaultCriteria::Basic),
            "technical" => Ok(DefaultCriteria::Technical),
            "creative" => Ok(DefaultCriteria::Creative),
            other => Err(JudgeError::invalid_criteria(format!(
                "unknown criteria preset '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for DefaultCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
