// User settings model, partial updates and validation

use serde::{Deserialize, Serialize};

pub const MAX_CONCURRENT_AGENTS_LIMIT: u32 = 10;
pub const MAX_RALPH_TURNS_LIMIT: u32 = 20;
pub const MAX_TOOL_ENTRIES: usize = 100;
pub const MAX_SYSTEM_PROMPT_CHARS: usize = 10_000;

/// Default template used to wrap interactive agent messages.
/// `{{message}}` is replaced with the user's text.
pub const DEFAULT_AGENT_PROMPT_TEMPLATE: &str = "{{message}}";

/// Permission flags passed to the Claude CLI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ClaudePermissions {
    /// Pass `--dangerously-skip-permissions`
    pub skip_permissions: bool,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
}

impl Default for ClaudePermissions {
    fn default() -> Self {
        Self {
            skip_permissions: true,
            allowed_tools: Vec::new(),
            disallowed_tools: Vec::new(),
        }
    }
}

/// Defaults applied to new Ralph loops
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RalphLoopDefaults {
    pub default_max_turns: u32,
    pub worker_model: Option<String>,
    pub reviewer_model: Option<String>,
}

impl Default for RalphLoopDefaults {
    fn default() -> Self {
        Self {
            default_max_turns: 5,
            worker_model: None,
            reviewer_model: None,
        }
    }
}

/// Missing fields take their default, so older settings files keep loading
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub max_concurrent_agents: u32,
    pub claude_permissions: ClaudePermissions,
    pub append_system_prompt: String,
    pub agent_prompt_template: String,
    pub ralph_loop: RalphLoopDefaults,
    pub send_with_ctrl_enter: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrent_agents: 3,
            claude_permissions: ClaudePermissions::default(),
            append_system_prompt: String::new(),
            agent_prompt_template: DEFAULT_AGENT_PROMPT_TEMPLATE.to_string(),
            ralph_loop: RalphLoopDefaults::default(),
            send_with_ctrl_enter: false,
        }
    }
}

/// Partial settings for updates.
/// Every field is optional; only the provided ones are applied.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PartialSettings {
    pub max_concurrent_agents: Option<u32>,
    pub claude_permissions: Option<PartialClaudePermissions>,
    pub append_system_prompt: Option<String>,
    pub agent_prompt_template: Option<String>,
    pub ralph_loop: Option<PartialRalphLoopDefaults>,
    pub send_with_ctrl_enter: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PartialClaudePermissions {
    pub skip_permissions: Option<bool>,
    pub allowed_tools: Option<Vec<String>>,
    pub disallowed_tools: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PartialRalphLoopDefaults {
    pub default_max_turns: Option<u32>,
    /// `Some(None)` clears the model, absent leaves it unchanged
    #[serde(default, with = "double_option")]
    pub worker_model: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    pub reviewer_model: Option<Option<String>>,
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Option<String>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<String>>, D::Error> {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

/// A single settings validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for SettingsValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Settings {
    /// Apply a partial update on top of these settings
    pub fn merged_with(&self, patch: &PartialSettings) -> Settings {
        let mut result = self.clone();

        if let Some(v) = patch.max_concurrent_agents {
            result.max_concurrent_agents = v;
        }
        if let Some(ref perms) = patch.claude_permissions {
            if let Some(v) = perms.skip_permissions {
                result.claude_permissions.skip_permissions = v;
            }
            if let Some(ref v) = perms.allowed_tools {
                result.claude_permissions.allowed_tools = v.clone();
            }
            if let Some(ref v) = perms.disallowed_tools {
                result.claude_permissions.disallowed_tools = v.clone();
            }
        }
        if let Some(ref v) = patch.append_system_prompt {
            result.append_system_prompt = v.clone();
        }
        if let Some(ref v) = patch.agent_prompt_template {
            result.agent_prompt_template = v.clone();
        }
        if let Some(ref ralph) = patch.ralph_loop {
            if let Some(v) = ralph.default_max_turns {
                result.ralph_loop.default_max_turns = v;
            }
            if let Some(ref v) = ralph.worker_model {
                result.ralph_loop.worker_model = normalize_model(v.clone());
            }
            if let Some(ref v) = ralph.reviewer_model {
                result.ralph_loop.reviewer_model = normalize_model(v.clone());
            }
        }
        if let Some(v) = patch.send_with_ctrl_enter {
            result.send_with_ctrl_enter = v;
        }

        result
    }

    /// Validate all fields, collecting every failure
    pub fn validate(&self) -> Result<(), Vec<SettingsValidationError>> {
        let mut errors = Vec::new();
        let mut fail = |field: &str, message: String| {
            errors.push(SettingsValidationError {
                field: field.to_string(),
                message,
            })
        };

        if !(1..=MAX_CONCURRENT_AGENTS_LIMIT).contains(&self.max_concurrent_agents) {
            fail(
                "maxConcurrentAgents",
                format!("must be between 1 and {}", MAX_CONCURRENT_AGENTS_LIMIT),
            );
        }

        if !(1..=MAX_RALPH_TURNS_LIMIT).contains(&self.ralph_loop.default_max_turns) {
            fail(
                "ralphLoop.defaultMaxTurns",
                format!("must be between 1 and {}", MAX_RALPH_TURNS_LIMIT),
            );
        }

        for (field, tools) in [
            (
                "claudePermissions.allowedTools",
                &self.claude_permissions.allowed_tools,
            ),
            (
                "claudePermissions.disallowedTools",
                &self.claude_permissions.disallowed_tools,
            ),
        ] {
            if tools.len() > MAX_TOOL_ENTRIES {
                fail(field, format!("at most {} entries allowed", MAX_TOOL_ENTRIES));
            }
            if let Some(bad) = tools
                .iter()
                .find(|t| t.trim().is_empty() || t.chars().any(char::is_whitespace))
            {
                fail(
                    field,
                    format!("invalid tool name '{}': must be non-empty without whitespace", bad),
                );
            }
        }

        if self.append_system_prompt.chars().count() > MAX_SYSTEM_PROMPT_CHARS {
            fail(
                "appendSystemPrompt",
                format!("must be at most {} characters", MAX_SYSTEM_PROMPT_CHARS),
            );
        }

        if self.agent_prompt_template.trim().is_empty() {
            fail("agentPromptTemplate", "cannot be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Render the interactive prompt for a user message
    pub fn render_agent_prompt(&self, message: &str) -> String {
        if self.agent_prompt_template.contains("{{message}}") {
            self.agent_prompt_template.replace("{{message}}", message)
        } else {
            format!("{}\n\n{}", self.agent_prompt_template, message)
        }
    }
}

fn normalize_model(model: Option<String>) -> Option<String> {
    model
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_merge_partial() {
        let patch: PartialSettings = serde_json::from_value(serde_json::json!({
            "maxConcurrentAgents": 5,
            "claudePermissions": { "allowedTools": ["Read", "Bash(git:*)"] },
            "ralphLoop": { "workerModel": "sonnet" }
        }))
        .unwrap();

        let merged = Settings::default().merged_with(&patch);
        assert_eq!(merged.max_concurrent_agents, 5);
        assert_eq!(merged.claude_permissions.allowed_tools.len(), 2);
        assert!(merged.claude_permissions.skip_permissions);
        assert_eq!(merged.ralph_loop.worker_model.as_deref(), Some("sonnet"));
        assert_eq!(merged.ralph_loop.default_max_turns, 5);
    }

    #[test]
    fn test_merge_clears_model_with_null() {
        let mut settings = Settings::default();
        settings.ralph_loop.reviewer_model = Some("opus".to_string());

        let patch: PartialSettings = serde_json::from_value(serde_json::json!({
            "ralphLoop": { "reviewerModel": null }
        }))
        .unwrap();
        assert_eq!(settings.merged_with(&patch).ralph_loop.reviewer_model, None);

        let untouched: PartialSettings =
            serde_json::from_value(serde_json::json!({ "ralphLoop": {} })).unwrap();
        assert_eq!(
            settings.merged_with(&untouched).ralph_loop.reviewer_model.as_deref(),
            Some("opus")
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<PartialSettings, _> =
            serde_json::from_value(serde_json::json!({ "bogus": 1 }));
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_collects_errors() {
        let mut settings = Settings::default();
        settings.max_concurrent_agents = 0;
        settings.ralph_loop.default_max_turns = 21;
        settings.claude_permissions.allowed_tools = vec!["Read".into(), "bad tool".into()];
        settings.agent_prompt_template = "   ".to_string();

        let errors = settings.validate().unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "maxConcurrentAgents",
                "ralphLoop.defaultMaxTurns",
                "claudePermissions.allowedTools",
                "agentPromptTemplate"
            ]
        );
    }

    #[test]
    fn test_system_prompt_limit() {
        let mut settings = Settings::default();
        settings.append_system_prompt = "x".repeat(MAX_SYSTEM_PROMPT_CHARS + 1);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_render_agent_prompt() {
        let mut settings = Settings::default();
        assert_eq!(settings.render_agent_prompt("hi"), "hi");

        settings.agent_prompt_template = "Be concise.".to_string();
        assert_eq!(settings.render_agent_prompt("hi"), "Be concise.\n\nhi");
    }
}
