//! Tests for GitManager

use crate::git::{GitManager, GitState};
use git2::{Repository, Signature};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn setup_test_repo() -> (TempDir, GitManager) {
    let temp_dir = TempDir::new().unwrap();
    let repo_path = temp_dir.path();

    let repo = Repository::init(repo_path).unwrap();

    // Create initial commit
    let sig = Signature::now("Test User", "test@example.com").unwrap();
    let tree_id = {
        let mut index = repo.index().unwrap();
        fs::write(repo_path.join("test.txt"), "Hello, World!\n").unwrap();
        index.add_path(Path::new("test.txt")).unwrap();
        index.write().unwrap();
        index.write_tree().unwrap()
    };

    let tree = repo.find_tree(tree_id).unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
        .unwrap();

    let manager = GitManager::new(repo_path).unwrap();
    (temp_dir, manager)
}

fn paths(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_is_repository_and_init() {
    let temp_dir = TempDir::new().unwrap();
    assert!(!GitManager::is_repository(temp_dir.path()));

    let manager = GitManager::init(temp_dir.path()).unwrap();
    assert!(manager.repo_path().exists());
    assert!(GitManager::is_repository(temp_dir.path()));

    // Re-init opens the existing repository
    assert!(GitManager::init(temp_dir.path()).is_ok());
}

#[test]
fn test_create_branch() {
    let (_temp_dir, manager) = setup_test_repo();

    let branch = manager.create_branch("feature-test", false).unwrap();
    assert_eq!(branch.name, "feature-test");
    assert!(!branch.is_head);

    assert!(manager.create_branch("  ", false).is_err());
    // Already exists
    assert!(manager.create_branch("feature-test", false).is_err());
}

#[test]
fn test_create_branch_and_checkout() {
    let (_temp_dir, manager) = setup_test_repo();

    let branch = manager.create_branch("feature-x", true).unwrap();
    assert!(branch.is_head);
    assert_eq!(manager.current_branch().unwrap().as_deref(), Some("feature-x"));
}

#[test]
fn test_list_branches_current_first() {
    let (_temp_dir, manager) = setup_test_repo();

    manager.create_branch("branch1", false).unwrap();
    manager.create_branch("branch2", false).unwrap();

    let branches = manager.list_branches().unwrap();
    assert_eq!(branches.len(), 3);
    assert!(branches[0].is_head);

    let names: Vec<&str> = branches.iter().map(|b| b.name.as_str()).collect();
    assert!(names.contains(&"branch1"));
    assert!(names.contains(&"branch2"));
}

#[test]
fn test_current_branch() {
    let (_temp_dir, manager) = setup_test_repo();

    let branch = manager.current_branch().unwrap().unwrap();
    assert!(branch == "main" || branch == "master");
}

#[test]
fn test_current_branch_unborn() {
    let temp_dir = TempDir::new().unwrap();
    let manager = GitManager::init(temp_dir.path()).unwrap();

    let branch = manager.current_branch().unwrap().unwrap();
    assert!(!branch.is_empty());
    assert!(manager.get_commit_history(10).unwrap().is_empty());
}

#[test]
fn test_checkout_branch() {
    let (temp_dir, manager) = setup_test_repo();
    let original = manager.current_branch().unwrap().unwrap();

    manager.create_branch("feature", true).unwrap();
    fs::write(temp_dir.path().join("feature.txt"), "feature work").unwrap();
    manager.stage_files(&paths(&["feature.txt"])).unwrap();
    manager.create_commit("Add feature file").unwrap();

    manager.checkout_branch(&original).unwrap();
    assert_eq!(manager.current_branch().unwrap().as_deref(), Some(original.as_str()));
    assert!(!temp_dir.path().join("feature.txt").exists());

    assert!(manager.checkout_branch("does-not-exist").is_err());
}

#[test]
fn test_status_groups() {
    let (temp_dir, manager) = setup_test_repo();
    assert!(manager.get_status().unwrap().is_clean());

    fs::write(temp_dir.path().join("test.txt"), "changed\n").unwrap();
    fs::write(temp_dir.path().join("staged.txt"), "new\n").unwrap();
    fs::write(temp_dir.path().join("untracked.txt"), "?\n").unwrap();
    manager.stage_files(&paths(&["staged.txt"])).unwrap();

    let status = manager.get_status().unwrap();
    assert!(status.branch.is_some());
    assert_eq!(status.staged.len(), 1);
    assert_eq!(status.staged[0].path, "staged.txt");
    assert_eq!(status.staged[0].status, "added");
    assert_eq!(status.unstaged.len(), 1);
    assert_eq!(status.unstaged[0].path, "test.txt");
    assert_eq!(status.unstaged[0].status, "modified");
    assert_eq!(status.untracked, vec!["untracked.txt".to_string()]);
}

#[test]
fn test_stage_and_unstage() {
    let (temp_dir, manager) = setup_test_repo();

    fs::write(temp_dir.path().join("a.txt"), "a").unwrap();
    manager.stage_files(&paths(&["a.txt"])).unwrap();
    assert!(manager.has_staged_changes().unwrap());

    manager.unstage_files(&paths(&["a.txt"])).unwrap();
    assert!(!manager.has_staged_changes().unwrap());
    assert_eq!(manager.get_status().unwrap().untracked, vec!["a.txt".to_string()]);
}

#[test]
fn test_stage_deleted_file() {
    let (temp_dir, manager) = setup_test_repo();

    fs::remove_file(temp_dir.path().join("test.txt")).unwrap();
    manager.stage_files(&paths(&["test.txt"])).unwrap();

    let status = manager.get_status().unwrap();
    assert_eq!(status.staged[0].status, "deleted");
}

#[test]
fn test_stage_rejects_escaping_paths() {
    let (_temp_dir, manager) = setup_test_repo();

    assert!(manager.stage_files(&paths(&["../outside.txt"])).is_err());
    assert!(manager.stage_files(&paths(&["/etc/passwd"])).is_err());
}

#[test]
fn test_stage_all_and_commit() {
    let (temp_dir, manager) = setup_test_repo();

    fs::write(temp_dir.path().join("new_file.txt"), "New content").unwrap();
    manager.stage_all().unwrap();

    let commit = manager.create_commit("Add new file").unwrap();
    assert_eq!(commit.message, "Add new file");
    assert_eq!(commit.short_id.len(), 7);
    assert_eq!(commit.parent_ids.len(), 1);

    let history = manager.get_commit_history(10).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, commit.id);

    let limited = manager.get_commit_history(1).unwrap();
    assert_eq!(limited.len(), 1);
}

#[test]
fn test_commit_requires_message_and_staged_changes() {
    let (temp_dir, manager) = setup_test_repo();

    assert!(manager.create_commit("nothing staged").is_err());

    fs::write(temp_dir.path().join("x.txt"), "x").unwrap();
    manager.stage_all().unwrap();
    assert!(manager.create_commit("   ").is_err());
    assert!(manager.create_commit("real message").is_ok());
}

#[test]
fn test_first_commit_in_empty_repository() {
    let temp_dir = TempDir::new().unwrap();
    let manager = GitManager::init(temp_dir.path()).unwrap();

    fs::write(temp_dir.path().join("README.md"), "# hi\n").unwrap();
    manager.stage_all().unwrap();
    let commit = manager.create_commit("First").unwrap();
    assert!(commit.parent_ids.is_empty());
    assert_eq!(manager.get_commit_history(5).unwrap().len(), 1);
}

#[test]
fn test_unstage_in_empty_repository() {
    let temp_dir = TempDir::new().unwrap();
    let manager = GitManager::init(temp_dir.path()).unwrap();

    fs::write(temp_dir.path().join("a.txt"), "a").unwrap();
    manager.stage_files(&paths(&["a.txt"])).unwrap();
    manager.unstage_files(&paths(&["a.txt"])).unwrap();

    let status = manager.get_status().unwrap();
    assert!(status.staged.is_empty());
    assert_eq!(status.untracked, vec!["a.txt".to_string()]);
}

#[test]
fn test_working_diff() {
    let (temp_dir, manager) = setup_test_repo();

    fs::write(temp_dir.path().join("test.txt"), "Hello, World!\nSecond line\n").unwrap();

    let diff = manager.get_working_diff().unwrap();
    assert_eq!(diff.files_changed, 1);
    assert_eq!(diff.files[0].status, "modified");
    assert_eq!(diff.files[0].insertions, 1);
    assert_eq!(diff.files[0].deletions, 0);
}

#[test]
fn test_file_diff_staged_and_unstaged() {
    let (temp_dir, manager) = setup_test_repo();

    fs::write(temp_dir.path().join("test.txt"), "Hello, Rust!\n").unwrap();

    let unstaged = manager.get_file_diff("test.txt", false).unwrap();
    assert!(!unstaged.staged);
    assert!(unstaged.patch.contains("-Hello, World!"));
    assert!(unstaged.patch.contains("+Hello, Rust!"));
    assert!(unstaged.patch.contains("@@"));

    // Nothing staged yet
    assert!(manager.get_file_diff("test.txt", true).unwrap().patch.is_empty());

    manager.stage_files(&paths(&["test.txt"])).unwrap();
    let staged = manager.get_file_diff("test.txt", true).unwrap();
    assert!(staged.patch.contains("+Hello, Rust!"));
    assert!(manager.get_file_diff("test.txt", false).unwrap().patch.is_empty());
}

#[test]
fn test_file_diff_untracked() {
    let (temp_dir, manager) = setup_test_repo();

    fs::write(temp_dir.path().join("brand_new.txt"), "fresh\n").unwrap();
    let diff = manager.get_file_diff("brand_new.txt", false).unwrap();
    assert!(diff.patch.contains("+fresh"));
}

#[test]
fn test_discard_changes() {
    let (temp_dir, manager) = setup_test_repo();

    fs::write(temp_dir.path().join("test.txt"), "scratch").unwrap();
    fs::write(temp_dir.path().join("junk.txt"), "junk").unwrap();

    manager
        .discard_changes(&paths(&["test.txt", "junk.txt"]))
        .unwrap();

    assert_eq!(
        fs::read_to_string(temp_dir.path().join("test.txt")).unwrap(),
        "Hello, World!\n"
    );
    assert!(!temp_dir.path().join("junk.txt").exists());
    assert!(manager.get_status().unwrap().is_clean());
}

#[test]
fn test_push_without_remote_fails() {
    let (_temp_dir, manager) = setup_test_repo();
    assert!(manager.push_branch(None).is_err());
}

#[test]
fn test_push_to_local_bare_remote() {
    let (_temp_dir, manager) = setup_test_repo();
    let remote_dir = TempDir::new().unwrap();
    Repository::init_bare(remote_dir.path()).unwrap();
    manager
        .repo
        .remote("origin", remote_dir.path().to_str().unwrap())
        .unwrap();

    let branch = manager.current_branch().unwrap().unwrap();
    manager.push_branch(Some(&branch)).unwrap();

    let remote = Repository::open_bare(remote_dir.path()).unwrap();
    assert!(remote
        .find_reference(&format!("refs/heads/{}", branch))
        .is_ok());
}

#[test]
fn test_git_state_caches_and_forgets() {
    let (temp_dir, _manager) = setup_test_repo();
    let state = GitState::new();
    let path = temp_dir.path().to_str().unwrap();

    let branch = state.with_manager(path, |m| m.current_branch()).unwrap();
    assert!(branch.is_some());
    state.forget(path);

    let other = TempDir::new().unwrap();
    let err = state
        .with_manager(other.path().to_str().unwrap(), |m| m.get_status())
        .unwrap_err();
    assert!(err.contains("Not a git repository"));

    state.init(other.path().to_str().unwrap()).unwrap();
    assert!(state
        .with_manager(other.path().to_str().unwrap(), |m| m.get_status())
        .is_ok());
}
