//! Prompt Builder - Generates worker and reviewer prompts for each iteration
//!
//! Every agent run is a fresh CLI process, so each prompt carries the full
//! context it needs: the task, and for the worker the previous review.

use super::types::{ReviewerFeedback, WorkerSummary};

/// Reviewer output longer than this is cut when fed back to the worker
const MAX_FEEDBACK_CHARS: usize = 8_000;
/// Worker output longer than this is cut when handed to the reviewer
const MAX_WORKER_OUTPUT_CHARS: usize = 20_000;

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}\n\n[... output truncated ...]", head)
}

/// Build the worker prompt for an iteration
pub fn build_worker_prompt(
    task: &str,
    iteration: u32,
    max_turns: u32,
    previous_feedback: Option<&ReviewerFeedback>,
) -> String {
    let mut prompt = String::new();

    prompt.push_str("You are the WORKER in an iterative worker/reviewer loop.\n");
    prompt.push_str(&format!("This is iteration {} of {}.\n\n", iteration, max_turns));

    prompt.push_str("## Task\n\n");
    prompt.push_str(task.trim());
    prompt.push_str("\n\n");

    if let Some(feedback) = previous_feedback {
        prompt.push_str("## Reviewer feedback from the previous iteration\n\n");
        prompt.push_str("Your previous attempt was rejected. Address this feedback:\n\n");
        prompt.push_str(&clip(&feedback.feedback, MAX_FEEDBACK_CHARS));
        prompt.push_str("\n\n");

        if !feedback.specific_issues.is_empty() {
            prompt.push_str("### Specific issues\n\n");
            prompt.push_str(&bullet_list(&feedback.specific_issues));
            prompt.push_str("\n\n");
        }
        if !feedback.suggested_improvements.is_empty() {
            prompt.push_str("### Suggested improvements\n\n");
            prompt.push_str(&bullet_list(&feedback.suggested_improvements));
            prompt.push_str("\n\n");
        }
    }

    prompt.push_str("## Instructions\n\n");
    prompt.push_str("- Make the changes directly in the working directory.\n");
    prompt.push_str("- Finish with a short summary of what you changed and why.\n");

    prompt
}

/// Build the reviewer prompt for an iteration
pub fn build_reviewer_prompt(task: &str, worker: &WorkerSummary) -> String {
    let mut prompt = String::new();

    prompt.push_str("You are the REVIEWER in an iterative worker/reviewer loop.\n");
    prompt.push_str(&format!(
        "Review the worker's changes for iteration {}. Inspect the working directory \
         (for example with `git diff`) instead of trusting the summary alone.\n\n",
        worker.iteration
    ));

    prompt.push_str("## Task\n\n");
    prompt.push_str(task.trim());
    prompt.push_str("\n\n");

    prompt.push_str("## Worker summary\n\n");
    prompt.push_str(&clip(&worker.output, MAX_WORKER_OUTPUT_CHARS));
    prompt.push_str("\n\n");

    prompt.push_str("## Response format\n\n");
    prompt.push_str(
        "End your answer with a JSON block in exactly this shape. Use \"approve\" only \
         when the task is fully and correctly done.\n\n",
    );
    prompt.push_str("```json\n");
    prompt.push_str("{\n");
    prompt.push_str("  \"decision\": \"approve\" | \"reject\",\n");
    prompt.push_str("  \"feedback\": \"overall assessment\",\n");
    prompt.push_str("  \"specificIssues\": [\"issue\"],\n");
    prompt.push_str("  \"suggestedImprovements\": [\"improvement\"]\n");
    prompt.push_str("}\n");
    prompt.push_str("```\n");

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ralph_loop::types::ReviewDecision;
    use chrono::Utc;

    #[test]
    fn test_first_worker_prompt_has_no_feedback() {
        let prompt = build_worker_prompt("Add logging", 1, 3, None);
        assert!(prompt.contains("iteration 1 of 3"));
        assert!(prompt.contains("Add logging"));
        assert!(!prompt.contains("Reviewer feedback"));
    }

    #[test]
    fn test_worker_prompt_includes_feedback() {
        let feedback = ReviewerFeedback {
            iteration: 1,
            decision: ReviewDecision::Reject,
            feedback: "Logging is too noisy".to_string(),
            specific_issues: vec!["debug logs at info level".to_string()],
            suggested_improvements: vec![],
            timestamp: Utc::now(),
        };
        let prompt = build_worker_prompt("Add logging", 2, 3, Some(&feedback));
        assert!(prompt.contains("Logging is too noisy"));
        assert!(prompt.contains("- debug logs at info level"));
        assert!(!prompt.contains("Suggested improvements"));
    }

    #[test]
    fn test_reviewer_prompt() {
        let worker = WorkerSummary {
            iteration: 2,
            output: "Added a logger module".to_string(),
            session_id: None,
            cost_usd: None,
            duration_ms: None,
            timestamp: Utc::now(),
        };
        let prompt = build_reviewer_prompt("Add logging", &worker);
        assert!(prompt.contains("iteration 2"));
        assert!(prompt.contains("Added a logger module"));
        assert!(prompt.contains("```json"));
        assert!(prompt.contains("\"decision\""));
    }

    #[test]
    fn test_clip() {
        assert_eq!(clip("short", 10), "short");
        assert!(clip(&"x".repeat(20), 10).starts_with(&"x".repeat(10)));
        assert!(clip(&"x".repeat(20), 10).contains("truncated"));
    }
}
