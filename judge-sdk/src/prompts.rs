//! Judge prompt templates
//!
//! Renders the system and user messages for evaluation and pairwise
//! comparison. User supplied text is wrapped in XML-style tags and escaped so
//! it cannot close a tag early. The schemas described here are the shapes
//! [`crate::parser::ResponseParser`] reads first.

use crate::core::JudgeMessage;
use crate::criteria::CriteriaSet;

const EVALUATION_SYSTEM: &str = "\
You are an impartial expert judge. Evaluate the candidate response against \
each criterion listed by the user. Judge only what is written; do not reward \
length or confident tone. Reply with a single JSON object and nothing else.";

const COMPARISON_SYSTEM: &str = "\
You are an impartial expert judge. Compare two candidate responses and decide \
which one better serves the user. Ignore the order in which they are shown. \
Reply with a single JSON object and nothing else.";

const COMPARISON_SCHEMA: &str = r#"{
  "winner": "A" | "B" | "tie",
  "reasoning": "<why>",
  "confidence": <number between 0 and 1>
}"#;

/// Escape XML special characters
fn escape_xml_chars(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn tagged(tag: &str, body: &str) -> String {
    format!("<{tag}>\n{}\n</{tag}>", escape_xml_chars(body.trim()), tag = tag)
}

fn format_bound(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

fn evaluation_schema(criteria: &CriteriaSet) -> String {
    let entries: Vec<String> = criteria
        .iter()
        .map(|c| {
            format!(
                "    \"{}\": {{\"score\": <number {} to {}>, \"reasoning\": \"<why>\", \"confidence\": <0 to 1>}}",
                c.name,
                format_bound(c.scale_min),
                format_bound(c.scale_max)
            )
        })
        .collect();

    format!(
        "{{\n  \"scores\": {{\n{}\n  }},\n  \"reasoning\": \"<overall assessment>\",\n  \"strengths\": [\"...\"],\n  \"weaknesses\": [\"...\"],\n  \"suggestions\": [\"...\"]\n}}",
        entries.join(",\n")
    )
}

/// Messages asking a judge to score `candidate` on every criterion
pub fn build_evaluation_messages(
    candidate: &str,
    context: Option<&str>,
    criteria: &CriteriaSet,
) -> Vec<JudgeMessage> {
    let rubric: Vec<String> = criteria
        .iter()
        .map(|c| {
            let description = if c.description.trim().is_empty() {
                String::new()
            } else {
                format!(": {}", escape_xml_chars(c.description.trim()))
            };
            format!(
                "- {} (scale {} to {}, weight {:.2}){}",
                c.name,
                format_bound(c.scale_min),
                format_bound(c.scale_max),
                c.weight,
                description
            )
        })
        .collect();

    let mut parts = Vec::new();
    if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
        parts.push(tagged("context", ctx));
    }
    parts.push(tagged("candidate_response", candidate));
    parts.push(format!("<criteria>\n{}\n</criteria>", rubric.join("\n")));
    parts.push(format!(
        "Score every criterion on its own scale. Respond with JSON in exactly this shape:\n{}",
        evaluation_schema(criteria)
    ));

    vec![
        JudgeMessage::system(EVALUATION_SYSTEM),
        JudgeMessage::user(parts.join("\n\n")),
    ]
}

/// Messages asking a judge to pick between two responses
pub fn build_comparison_messages(a: &str, b: &str, context: Option<&str>) -> Vec<JudgeMessage> {
    let mut parts = Vec::new();
    if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
        parts.push(tagged("context", ctx));
    }
    parts.push(tagged("response_a", a));
    parts.push(tagged("response_b", b));
    parts.push(format!(
        "Which response is better? Respond with JSON in exactly this shape:\n{}",
        COMPARISON_SCHEMA
    ));

    vec![
        JudgeMessage::system(COMPARISON_SYSTEM),
        JudgeMessage::user(parts.join("\n\n")),
    ]
}
