//! Reviewer decision parsing
//!
//! The reviewer is asked to end its answer with a JSON object such as
//! `{"decision": "approve", "feedback": "...", "specificIssues": [], "suggestedImprovements": []}`.
//! Models do not always comply exactly, so extraction is lenient: a fenced
//! ```json block wins, otherwise the last balanced `{...}` carrying a
//! `decision` key is used.

use super::types::{ReviewDecision, ReviewerFeedback};
use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDecision {
    decision: String,
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default, alias = "specific_issues")]
    specific_issues: Vec<String>,
    #[serde(default, alias = "suggested_improvements")]
    suggested_improvements: Vec<String>,
}

fn fenced_json_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```json\s*\n([\s\S]*?)```").unwrap())
}

/// Extract ```json fenced blocks from markdown content
pub fn extract_json_blocks(content: &str) -> Vec<String> {
    fenced_json_regex()
        .captures_iter(content)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().trim().to_string()))
        .collect()
}

/// All balanced object candidates, ordered by start position.
///
/// Single pass: open braces go on a stack and each close pairs with the
/// latest open one. Quotes only count inside an object. A raw newline inside
/// a string is never valid JSON, so it discards the unclosed braces seen so
/// far and scanning starts over.
pub fn extract_balanced_objects(text: &str) -> Vec<&str> {
    let mut objects: Vec<(usize, &str)> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                '\n' => {
                    open.clear();
                    in_string = false;
                }
                _ => {}
            }
            continue;
        }

        match c {
            '"' if !open.is_empty() => in_string = true,
            '{' => open.push(i),
            '}' => {
                if let Some(start) = open.pop() {
                    objects.push((start, &text[start..=i]));
                }
            }
            _ => {}
        }
    }

    // Inner objects close first
    objects.sort_by_key(|(start, _)| *start);
    objects.into_iter().map(|(_, object)| object).collect()
}

fn has_decision_key(candidate: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    value.get("decision")?;
    Some(value)
}

fn parse_decision(decision: &str) -> Option<ReviewDecision> {
    match decision.trim().to_lowercase().as_str() {
        "approve" | "approved" => Some(ReviewDecision::Approve),
        "reject" | "rejected" => Some(ReviewDecision::Reject),
        _ => None,
    }
}

fn to_feedback(value: Value, iteration: u32) -> Result<ReviewerFeedback, String> {
    let raw: RawDecision = serde_json::from_value(value)
        .map_err(|e| format!("Reviewer decision has an invalid shape: {}", e))?;

    let decision = parse_decision(&raw.decision)
        .ok_or_else(|| format!("Unknown reviewer decision: {}", raw.decision))?;

    Ok(ReviewerFeedback {
        iteration,
        decision,
        feedback: raw.feedback.unwrap_or_default().trim().to_string(),
        specific_issues: raw.specific_issues,
        suggested_improvements: raw.suggested_improvements,
        timestamp: Utc::now(),
    })
}

/// Parse the reviewer's verdict from its full text output
pub fn parse_reviewer_decision(output: &str, iteration: u32) -> Result<ReviewerFeedback, String> {
    let fenced = extract_json_blocks(output)
        .into_iter()
        .rev()
        .find_map(|block| has_decision_key(&block));

    let value = match fenced {
        Some(value) => value,
        None => extract_balanced_objects(output)
            .into_iter()
            .rev()
            .find_map(has_decision_key)
            .ok_or_else(|| "Reviewer output did not contain a decision JSON object".to_string())?,
    };

    to_feedback(value, iteration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_block_preferred() {
        let output = r#"I looked at the changes. {"decision": "approve"} was my first thought.

```json
{
  "decision": "reject",
  "feedback": "Tests are missing",
  "specificIssues": ["no unit tests for parser"],
  "suggestedImprovements": ["add tests"]
}
```"#;
        let feedback = parse_reviewer_decision(output, 2).unwrap();
        assert_eq!(feedback.decision, ReviewDecision::Reject);
        assert_eq!(feedback.iteration, 2);
        assert_eq!(feedback.feedback, "Tests are missing");
        assert_eq!(feedback.specific_issues, vec!["no unit tests for parser"]);
        assert_eq!(feedback.suggested_improvements, vec!["add tests"]);
    }

    #[test]
    fn test_last_balanced_object_used() {
        let output = r#"Config looks like {"a": {"b": 1}}.
Early verdict: {"decision": "reject", "feedback": "draft"}
Final: {"decision": "APPROVE", "feedback": "Looks good, handles \"quoted\" braces } fine"}"#;
        let feedback = parse_reviewer_decision(output, 1).unwrap();
        assert_eq!(feedback.decision, ReviewDecision::Approve);
        assert!(feedback.feedback.contains("quoted"));
        assert!(feedback.specific_issues.is_empty());
    }

    #[test]
    fn test_fenced_block_without_decision_ignored() {
        let output = "```json\n{\"files\": [\"a.rs\"]}\n```\nVerdict: {\"decision\": \"approved\"}";
        let feedback = parse_reviewer_decision(output, 1).unwrap();
        assert_eq!(feedback.decision, ReviewDecision::Approve);
        assert_eq!(feedback.feedback, "");
    }

    #[test]
    fn test_missing_decision_is_error() {
        assert!(parse_reviewer_decision("The work looks fine to me.", 1).is_err());
        assert!(parse_reviewer_decision("{\"decision\": \"maybe\"}", 1)
            .unwrap_err()
            .contains("Unknown reviewer decision"));
    }

    #[test]
    fn test_unbalanced_braces_tolerated() {
        let output = "Use `fn main() {` carefully. {\"decision\": \"reject\", \"feedback\": \"x\"}";
        assert_eq!(
            parse_reviewer_decision(output, 1).unwrap().decision,
            ReviewDecision::Reject
        );
    }

    #[test]
    fn test_unterminated_string_in_prose_recovers() {
        let output = "Call it like { \"unterminated\nthen {\"decision\": \"reject\", \"feedback\": \"y\"}";
        let feedback = parse_reviewer_decision(output, 1).unwrap();
        assert_eq!(feedback.decision, ReviewDecision::Reject);
        assert_eq!(feedback.feedback, "y");
    }

    #[test]
    fn test_brace_heavy_output() {
        let mut output = "{".repeat(200_000);
        output.push_str(r#" {"decision": "approve", "feedback": "ok", "specificIssues": [{"x": 1}]}"#);
        output.push_str(&"}".repeat(10));

        let feedback = parse_reviewer_decision(&output, 3).unwrap();
        assert_eq!(feedback.decision, ReviewDecision::Approve);
        assert_eq!(feedback.feedback, "ok");
    }

    #[test]
    fn test_extract_balanced_objects_order() {
        let objects = extract_balanced_objects(r#"a {"x": {"y": 1}} b {"z": "}"}"#);
        assert_eq!(objects, vec![r#"{"x": {"y": 1}}"#, r#"{"y": 1}"#, r#"{"z": "}"}"#]);
    }

    #[test]
    fn test_extract_json_blocks() {
        let content = "a\n```json\n{\"x\":1}\n```\nb\n```json\n[1]\n```";
        assert_eq!(extract_json_blocks(content), vec!["{\"x\":1}", "[1]"]);
    }
}
