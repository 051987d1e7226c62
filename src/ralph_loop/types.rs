//! Type definitions for the Ralph Loop
//!
//! The loop state is persisted after every phase so a loop can be inspected
//! (and resumed) from disk:
//! - `ralph-loops/{task_id}/state.json`: the full `RalphLoopState`
//! - `ralph-loops/{task_id}/iteration-{n}/worker.json`: `WorkerSummary`
//! - `ralph-loops/{task_id}/iteration-{n}/reviewer.json`: `ReviewerFeedback`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Configuration for a single loop run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RalphLoopConfig {
    /// Maximum worker/reviewer iterations
    pub max_turns: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_model: Option<String>,
    pub task_description: String,
}

/// Request body for starting a loop. Unset fields fall back to settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRalphLoopInput {
    pub task_description: String,
    pub max_turns: Option<u32>,
    pub worker_model: Option<String>,
    pub reviewer_model: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RalphLoopStatus {
    Idle,
    WorkerRunning,
    ReviewerRunning,
    Paused,
    Completed,
    Failed,
    Stopped,
    /// The server went away while the loop was running
    Interrupted,
}

impl RalphLoopStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RalphLoopStatus::Idle => "idle",
            RalphLoopStatus::WorkerRunning => "worker_running",
            RalphLoopStatus::ReviewerRunning => "reviewer_running",
            RalphLoopStatus::Paused => "paused",
            RalphLoopStatus::Completed => "completed",
            RalphLoopStatus::Failed => "failed",
            RalphLoopStatus::Stopped => "stopped",
            RalphLoopStatus::Interrupted => "interrupted",
        }
    }

    /// A process is (or should be) running for this status
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            RalphLoopStatus::WorkerRunning | RalphLoopStatus::ReviewerRunning
        )
    }

    /// No further transitions happen from this status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RalphLoopStatus::Completed
                | RalphLoopStatus::Failed
                | RalphLoopStatus::Stopped
                | RalphLoopStatus::Interrupted
        )
    }
}

impl std::fmt::Display for RalphLoopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a completed loop ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RalphLoopFinalStatus {
    Approved,
    MaxTurnsReached,
}

/// Output of one worker run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSummary {
    pub iteration: u32,
    pub output: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// Structured verdict of one reviewer run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewerFeedback {
    pub iteration: u32,
    pub decision: ReviewDecision,
    pub feedback: String,
    #[serde(default)]
    pub specific_issues: Vec<String>,
    #[serde(default)]
    pub suggested_improvements: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Which agent runs next when a loop (re)starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Worker,
    Reviewer,
}

/// Persisted state of a loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RalphLoopState {
    pub task_id: String,
    pub project_id: String,
    pub config: RalphLoopConfig,
    pub status: RalphLoopStatus,
    /// 1-based; 0 before the first worker run
    pub current_iteration: u32,
    #[serde(default)]
    pub worker_summaries: Vec<WorkerSummary>,
    #[serde(default)]
    pub reviewer_feedback: Vec<ReviewerFeedback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_status: Option<RalphLoopFinalStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RalphLoopState {
    pub fn new(task_id: String, project_id: String, config: RalphLoopConfig) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            project_id,
            config,
            status: RalphLoopStatus::Idle,
            current_iteration: 0,
            worker_summaries: Vec::new(),
            reviewer_feedback: Vec::new(),
            final_status: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: RalphLoopStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn last_feedback(&self) -> Option<&ReviewerFeedback> {
        self.reviewer_feedback.last()
    }

    pub fn worker_summary_for(&self, iteration: u32) -> Option<&WorkerSummary> {
        self.worker_summaries
            .iter()
            .rev()
            .find(|s| s.iteration == iteration)
    }

    /// Where to continue from. An iteration whose worker never finished is
    /// run again; finished but unreviewed worker output goes to the reviewer.
    pub fn next_phase(&self) -> (u32, LoopPhase) {
        let current = self.current_iteration;
        if current == 0 {
            return (1, LoopPhase::Worker);
        }
        if self.worker_summary_for(current).is_none() {
            return (current, LoopPhase::Worker);
        }

        let reviewed = self.reviewer_feedback.iter().any(|f| f.iteration == current);
        if reviewed {
            (current + 1, LoopPhase::Worker)
        } else {
            (current, LoopPhase::Reviewer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RalphLoopConfig {
        RalphLoopConfig {
            max_turns: 3,
            worker_model: None,
            reviewer_model: None,
            task_description: "Add a README".to_string(),
        }
    }

    fn summary(iteration: u32) -> WorkerSummary {
        WorkerSummary {
            iteration,
            output: "done".to_string(),
            session_id: None,
            cost_usd: None,
            duration_ms: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&RalphLoopStatus::WorkerRunning).unwrap(),
            "\"worker_running\""
        );
        assert_eq!(
            serde_json::to_string(&RalphLoopFinalStatus::MaxTurnsReached).unwrap(),
            "\"max_turns_reached\""
        );
        assert!(RalphLoopStatus::ReviewerRunning.is_running());
        assert!(!RalphLoopStatus::Paused.is_terminal());
        assert!(RalphLoopStatus::Interrupted.is_terminal());
    }

    #[test]
    fn test_next_phase() {
        let mut state = RalphLoopState::new("t".into(), "p".into(), config());
        assert_eq!(state.next_phase(), (1, LoopPhase::Worker));

        // Interrupted while the worker was running
        state.current_iteration = 1;
        assert_eq!(state.next_phase(), (1, LoopPhase::Worker));

        state.worker_summaries.push(summary(1));
        assert_eq!(state.next_phase(), (1, LoopPhase::Reviewer));

        state.reviewer_feedback.push(ReviewerFeedback {
            iteration: 1,
            decision: ReviewDecision::Reject,
            feedback: "missing tests".to_string(),
            specific_issues: vec![],
            suggested_improvements: vec![],
            timestamp: Utc::now(),
        });
        assert_eq!(state.next_phase(), (2, LoopPhase::Worker));
    }

    #[test]
    fn test_state_json_shape() {
        let state = RalphLoopState::new("task_1".into(), "proj_1".into(), config());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["taskId"], "task_1");
        assert_eq!(json["status"], "idle");
        assert_eq!(json["config"]["maxTurns"], 3);
        assert!(json.get("finalStatus").is_none());
    }
}
