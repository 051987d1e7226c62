//! User settings persistence
//!
//! Stored in `{data_dir}/settings.json`. Missing files yield defaults.

use super::{read_json, with_file_lock, write_json, FileResult};
use crate::models::settings::{PartialSettings, Settings, SettingsValidationError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure modes of a settings update
#[derive(Debug, Error)]
pub enum SettingsUpdateError {
    #[error("Invalid settings: {}", join_errors(.0))]
    Invalid(Vec<SettingsValidationError>),
    #[error("{0}")]
    Storage(String),
}

fn join_errors(errors: &[SettingsValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn get_settings_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}

/// Load settings, falling back to defaults when the file is missing or corrupt
pub fn load_settings(data_dir: &Path) -> Settings {
    let path = get_settings_file_path(data_dir);
    if !path.exists() {
        return Settings::default();
    }

    match read_json::<Settings>(&path) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("Failed to load settings, using defaults: {}", e);
            Settings::default()
        }
    }
}

pub fn save_settings(data_dir: &Path, settings: &Settings) -> FileResult<()> {
    write_json(&get_settings_file_path(data_dir), settings)
}

/// Merge a partial update into the stored settings, validate and persist
pub fn update_settings(
    data_dir: &Path,
    patch: &PartialSettings,
) -> Result<Settings, SettingsUpdateError> {
    let path = get_settings_file_path(data_dir);

    let outcome = with_file_lock(&path, || {
        let updated = load_settings(data_dir).merged_with(patch);
        if let Err(errors) = updated.validate() {
            return Ok(Err(errors));
        }
        save_settings(data_dir, &updated)?;
        Ok(Ok(updated))
    })
    .map_err(SettingsUpdateError::Storage)?;

    outcome.map_err(SettingsUpdateError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_partial_file_keeps_stored_fields() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            get_settings_file_path(temp_dir.path()),
            r#"{"appendSystemPrompt": "be brief", "ralphLoop": {"workerModel": "sonnet"}}"#,
        )
        .unwrap();

        let settings = load_settings(temp_dir.path());
        assert_eq!(settings.append_system_prompt, "be brief");
        assert_eq!(settings.ralph_loop.worker_model.as_deref(), Some("sonnet"));
        let defaults = Settings::default();
        assert_eq!(settings.max_concurrent_agents, defaults.max_concurrent_agents);
        assert_eq!(settings.agent_prompt_template, defaults.agent_prompt_template);
        assert_eq!(
            settings.ralph_loop.default_max_turns,
            defaults.ralph_loop.default_max_turns
        );
    }

    #[test]
    fn test_invalid_update_message_lists_fields() {
        let temp_dir = TempDir::new().unwrap();
        let patch: PartialSettings = serde_json::from_value(serde_json::json!({
            "maxConcurrentAgents": 0,
            "ralphLoop": { "defaultMaxTurns": 99 }
        }))
        .unwrap();

        let message = update_settings(temp_dir.path(), &patch)
            .unwrap_err()
            .to_string();
        assert!(message.starts_with("Invalid settings: "));
        assert!(message.contains("maxConcurrentAgents"));
        assert!(message.contains("ralphLoop.defaultMaxTurns"));
    }

    #[test]
    fn test_load_defaults_when_missing() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(load_settings(temp_dir.path()), Settings::default());
    }

    #[test]
    fn test_load_defaults_when_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(get_settings_file_path(temp_dir.path()), "not json").unwrap();
        assert_eq!(load_settings(temp_dir.path()), Settings::default());
    }

    #[test]
    fn test_update_persists() {
        let temp_dir = TempDir::new().unwrap();
        let patch = PartialSettings {
            max_concurrent_agents: Some(7),
            ..Default::default()
        };

        let updated = update_settings(temp_dir.path(), &patch).unwrap();
        assert_eq!(updated.max_concurrent_agents, 7);
        assert_eq!(load_settings(temp_dir.path()).max_concurrent_agents, 7);
    }

    #[test]
    fn test_invalid_update_not_persisted() {
        let temp_dir = TempDir::new().unwrap();
        let patch = PartialSettings {
            max_concurrent_agents: Some(99),
            ..Default::default()
        };

        match update_settings(temp_dir.path(), &patch) {
            Err(SettingsUpdateError::Invalid(errors)) => {
                assert_eq!(errors[0].field, "maxConcurrentAgents");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(!get_settings_file_path(temp_dir.path()).exists());
    }
}
