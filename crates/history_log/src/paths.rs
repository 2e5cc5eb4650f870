use std::path::{Path, PathBuf};

pub const HISTORY_DIR: &str = ".tabular_history";
pub const SNAPSHOT_DIR: &str = "snapshots";
pub const BASELINE_FILE: &str = "baseline.json";
pub const CURRENT_FILE: &str = "current.json";

#[must_use]
pub fn history_root(cwd: &Path) -> PathBuf {
    cwd.join(HISTORY_DIR)
}

#[must_use]
pub fn history_file_name(session_id: &str) -> String {
    format!("history_{session_id}.json")
}

#[must_use]
pub fn history_file(root: &Path, session_id: &str) -> PathBuf {
    root.join(history_file_name(session_id))
}

#[must_use]
pub fn snapshot_dir(root: &Path, session_id: &str) -> PathBuf {
    root.join(SNAPSHOT_DIR).join(session_id)
}

#[must_use]
pub fn snapshot_file(root: &Path, session_id: &str, operation_id: &str) -> PathBuf {
    snapshot_dir(root, session_id).join(format!("{operation_id}.json"))
}
