//! Project registry
//!
//! Stores the project list in `{data_dir}/projects.json`. Per-project data
//! (conversations, loop state) lives under `{data_dir}/projects/{id}/`.

use super::{
    ensure_dir, project_data_dir, read_json, remove_dir_if_exists, with_file_lock, write_json,
    FileResult,
};
use crate::utils::{generate_id, ResultExt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Version of the projects registry format
const PROJECTS_FILE_VERSION: u32 = 1;

/// Projects registry file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectsRegistry {
    /// File format version
    pub version: u32,
    /// When this registry was last updated
    pub updated_at: DateTime<Utc>,
    /// Registered projects
    pub projects: Vec<Project>,
}

impl Default for ProjectsRegistry {
    fn default() -> Self {
        Self {
            version: PROJECTS_FILE_VERSION,
            updated_at: Utc::now(),
            projects: Vec::new(),
        }
    }
}

/// A project entry in the registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Unique project ID
    pub id: String,
    /// Display name for the project
    pub name: String,
    /// Absolute path to the project directory
    pub path: String,
    /// When the project was first registered
    pub created_at: DateTime<Utc>,
    /// When the project was last used
    pub last_used_at: DateTime<Utc>,
    #[serde(default)]
    pub is_favorite: bool,
}

impl Project {
    /// Create a new project entry, deriving the name from the last path
    /// component when none is given
    pub fn new(path: &str, name: Option<&str>) -> Self {
        let derived_name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| {
                path.trim_end_matches(['/', '\\'])
                    .rsplit(['/', '\\'])
                    .next()
                    .unwrap_or(path)
            });

        let now = Utc::now();

        Self {
            id: generate_id("proj"),
            name: derived_name.to_string(),
            path: path.to_string(),
            created_at: now,
            last_used_at: now,
            is_favorite: false,
        }
    }
}

/// Input for creating (registering) a project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectInput {
    pub path: String,
    pub name: Option<String>,
    /// Create the directory if it does not exist yet
    #[serde(default)]
    pub create_new: bool,
}

/// Get the path to the projects registry file
pub fn get_projects_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join("projects.json")
}

/// Read the projects registry, returning an empty one if the file is missing
pub fn read_projects_registry(data_dir: &Path) -> FileResult<ProjectsRegistry> {
    let file_path = get_projects_file_path(data_dir);

    if !file_path.exists() {
        return Ok(ProjectsRegistry::default());
    }

    read_json(&file_path)
}

/// Write the projects registry
pub fn write_projects_registry(data_dir: &Path, registry: &ProjectsRegistry) -> FileResult<()> {
    ensure_dir(data_dir)?;
    write_json(&get_projects_file_path(data_dir), registry)
}

/// Apply a mutation to the registry under the registry file lock
fn update_registry<T, F>(data_dir: &Path, f: F) -> FileResult<T>
where
    F: FnOnce(&mut ProjectsRegistry) -> FileResult<Option<T>>,
{
    let file_path = get_projects_file_path(data_dir);
    with_file_lock(&file_path, || {
        let mut registry = read_projects_registry(data_dir)?;
        match f(&mut registry)? {
            Some(result) => {
                registry.updated_at = Utc::now();
                write_projects_registry(data_dir, &registry)?;
                Ok(result)
            }
            None => Err("Project not found".to_string()),
        }
    })
}

/// Validate the input path and register the project.
///
/// Existing entries with the same path are upserted (touched and optionally
/// renamed) instead of duplicated.
pub fn create_project(data_dir: &Path, input: &CreateProjectInput) -> FileResult<Project> {
    let path_str = input.path.trim();
    if path_str.is_empty() {
        return Err("Project path is required".to_string());
    }

    let path = Path::new(path_str);
    if !path.is_absolute() {
        return Err(format!("Project path must be absolute: {}", path_str));
    }

    if input.create_new {
        ensure_dir(path)?;
    } else if !path.exists() {
        return Err(format!("Project path does not exist: {}", path_str));
    } else if !path.is_dir() {
        return Err(format!("Project path is not a directory: {}", path_str));
    }

    register_project(data_dir, path_str, input.name.as_deref())
}

/// Canonical form of a project directory, so `P`, `P/` and `P/./` are one project
fn canonical_project_path(path: &str) -> FileResult<String> {
    let canonical = Path::new(path)
        .canonicalize()
        .with_context(&format!("Failed to resolve project path {}", path))?;
    let canonical = canonical.to_string_lossy();
    // Windows canonical paths carry a verbatim prefix clients never send
    Ok(canonical
        .strip_prefix(r"\\?\")
        .unwrap_or(&canonical)
        .to_string())
}

/// Register a project (upsert by canonical path)
pub fn register_project(data_dir: &Path, path: &str, name: Option<&str>) -> FileResult<Project> {
    let path = canonical_project_path(path)?;
    let path = path.as_str();
    update_registry(data_dir, |registry| {
        if let Some(project) = registry.projects.iter_mut().find(|p| p.path == path) {
            project.last_used_at = Utc::now();
            if let Some(new_name) = name.map(str::trim).filter(|n| !n.is_empty()) {
                project.name = new_name.to_string();
            }
            return Ok(Some(project.clone()));
        }

        let project = Project::new(path, name);
        registry.projects.push(project.clone());
        log::info!("Registered project {} at {}", project.id, project.path);
        Ok(Some(project))
    })
}

/// Get a project by ID
pub fn get_project(data_dir: &Path, project_id: &str) -> FileResult<Option<Project>> {
    let registry = read_projects_registry(data_dir)?;
    Ok(registry.projects.into_iter().find(|p| p.id == project_id))
}

/// Get all projects sorted by last_used_at descending
pub fn list_projects(data_dir: &Path) -> FileResult<Vec<Project>> {
    let registry = read_projects_registry(data_dir)?;
    let mut projects = registry.projects;
    projects.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
    Ok(projects)
}

/// Rename a project
pub fn rename_project(data_dir: &Path, project_id: &str, name: &str) -> FileResult<Project> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Project name cannot be empty".to_string());
    }

    update_registry(data_dir, |registry| {
        Ok(registry
            .projects
            .iter_mut()
            .find(|p| p.id == project_id)
            .map(|project| {
                project.name = trimmed.to_string();
                project.clone()
            }))
    })
}

/// Toggle project favorite status, returning the new value
pub fn toggle_project_favorite(data_dir: &Path, project_id: &str) -> FileResult<bool> {
    update_registry(data_dir, |registry| {
        Ok(registry
            .projects
            .iter_mut()
            .find(|p| p.id == project_id)
            .map(|project| {
                project.is_favorite = !project.is_favorite;
                project.is_favorite
            }))
    })
}

/// Touch project (update last_used_at)
pub fn touch_project(data_dir: &Path, project_id: &str) -> FileResult<()> {
    update_registry(data_dir, |registry| {
        Ok(registry
            .projects
            .iter_mut()
            .find(|p| p.id == project_id)
            .map(|project| {
                project.last_used_at = Utc::now();
            }))
    })
}

/// Delete a project from the registry along with its Claudito data.
/// The project directory itself is never touched.
pub fn delete_project(data_dir: &Path, project_id: &str) -> FileResult<()> {
    update_registry(data_dir, |registry| {
        let initial_len = registry.projects.len();
        registry.projects.retain(|p| p.id != project_id);
        Ok((registry.projects.len() != initial_len).then_some(()))
    })?;

    remove_dir_if_exists(&project_data_dir(data_dir, project_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, TempDir) {
        (TempDir::new().unwrap(), TempDir::new().unwrap())
    }

    #[test]
    fn test_project_new_derives_name() {
        let project = Project::new("/home/user/my-app/", None);
        assert_eq!(project.name, "my-app");
        assert!(project.id.starts_with("proj_"));
        assert!(!project.is_favorite);
    }

    #[test]
    fn test_register_project_upserts_by_path() {
        let (data, workspace) = setup();
        let path = workspace.path().to_string_lossy().to_string();

        let first = register_project(data.path(), &path, Some("First")).unwrap();
        let second = register_project(data.path(), &path, Some("Renamed")).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Renamed");
        assert_eq!(list_projects(data.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_register_project_normalises_path() {
        let (data, workspace) = setup();
        let base = workspace.path().to_string_lossy().to_string();
        let sep = std::path::MAIN_SEPARATOR;

        let plain = register_project(data.path(), &base, None).unwrap();
        let trailing = register_project(data.path(), &format!("{}{}", base, sep), None).unwrap();
        let dotted =
            register_project(data.path(), &format!("{}{}.{}", base, sep, sep), None).unwrap();

        assert_eq!(plain.id, trailing.id);
        assert_eq!(plain.id, dotted.id);
        assert_eq!(list_projects(data.path()).unwrap().len(), 1);
        assert_eq!(
            Path::new(&plain.path).canonicalize().unwrap(),
            workspace.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_create_project_requires_absolute_path() {
        let (data, _) = setup();
        let input = CreateProjectInput {
            path: "relative/path".to_string(),
            name: None,
            create_new: false,
        };
        let err = create_project(data.path(), &input).unwrap_err();
        assert!(err.contains("absolute"));
    }

    #[test]
    fn test_create_project_missing_dir() {
        let (data, workspace) = setup();
        let missing = workspace.path().join("nope");
        let input = CreateProjectInput {
            path: missing.to_string_lossy().to_string(),
            name: None,
            create_new: false,
        };
        assert!(create_project(data.path(), &input)
            .unwrap_err()
            .contains("does not exist"));

        let input = CreateProjectInput {
            create_new: true,
            ..input
        };
        let project = create_project(data.path(), &input).unwrap();
        assert!(missing.is_dir());
        assert_eq!(project.name, "nope");
    }

    #[test]
    fn test_create_project_rejects_file() {
        let (data, workspace) = setup();
        let file = workspace.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        let input = CreateProjectInput {
            path: file.to_string_lossy().to_string(),
            name: None,
            create_new: false,
        };
        assert!(create_project(data.path(), &input)
            .unwrap_err()
            .contains("not a directory"));
    }

    #[test]
    fn test_rename_and_favorite() {
        let (data, workspace) = setup();
        let path = workspace.path().to_string_lossy().to_string();
        let project = register_project(data.path(), &path, None).unwrap();

        let renamed = rename_project(data.path(), &project.id, "  New Name ").unwrap();
        assert_eq!(renamed.name, "New Name");
        assert!(rename_project(data.path(), &project.id, "   ").is_err());

        assert!(toggle_project_favorite(data.path(), &project.id).unwrap());
        assert!(!toggle_project_favorite(data.path(), &project.id).unwrap());
        assert!(toggle_project_favorite(data.path(), "proj_missing").is_err());
    }

    #[test]
    fn test_list_sorted_by_last_used() {
        let (data, workspace) = setup();
        let a = workspace.path().join("a");
        let b = workspace.path().join("b");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();

        let pa = register_project(data.path(), &a.to_string_lossy(), None).unwrap();
        let pb = register_project(data.path(), &b.to_string_lossy(), None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        touch_project(data.path(), &pa.id).unwrap();

        let projects = list_projects(data.path()).unwrap();
        assert_eq!(projects[0].id, pa.id);
        assert_eq!(projects[1].id, pb.id);
    }

    #[test]
    fn test_delete_project_removes_data_but_not_directory() {
        let (data, workspace) = setup();
        let path = workspace.path().to_string_lossy().to_string();
        let project = register_project(data.path(), &path, None).unwrap();

        let project_dir = project_data_dir(data.path(), &project.id);
        ensure_dir(&project_dir).unwrap();

        delete_project(data.path(), &project.id).unwrap();

        assert!(get_project(data.path(), &project.id).unwrap().is_none());
        assert!(!project_dir.exists());
        assert!(workspace.path().exists());
        assert!(delete_project(data.path(), &project.id).is_err());
    }
}
