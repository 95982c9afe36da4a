use std::path::{Path, PathBuf};

/// Absolute export root. A relative root is resolved against current_dir().
pub fn export_root(root: &str) -> PathBuf {
    let p = PathBuf::from(root);
    if p.is_absolute() {
        p
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(p)
    }
}

/// True when `s` can be used as a single path component under the export root.
///
/// Only ASCII alphanumerics, `_`, `-` and `.` are accepted, and `.`/`..` are rejected,
/// so identifiers can never climb out of their task directory.
pub fn is_safe_component(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

// ─── Export task tree ──────────────────────────────

// {EXPORT_ROOT}/achieve/extract/{task_id}
pub fn task_dir(root: &Path, task_id: i64) -> PathBuf {
    root.join("achieve").join("extract").join(task_id.to_string())
}

// {EXPORT_ROOT}/achieve/extract/{task_id}/{owner}
pub fn owner_task_dir(root: &Path, task_id: i64, owner: &str) -> PathBuf {
    task_dir(root, task_id).join(owner)
}

// Staging area: .../{owner}/prepare
pub fn prepare_dir(root: &Path, task_id: i64, owner: &str) -> PathBuf {
    owner_task_dir(root, task_id, owner).join("prepare")
}

/// One staged file per user: .../{owner}/prepare/{user_id}.json
pub fn staged_file_path(root: &Path, task_id: i64, owner: &str, user_id: &str) -> PathBuf {
    prepare_dir(root, task_id, owner).join(format!("{user_id}.json"))
}

/// Final archive name, derived from the task id only.
#[inline]
pub fn archive_file_name(task_id: i64) -> String {
    format!("extract_{task_id}.zip")
}

/// Scratch file a staged document is written to before being renamed into `prepare/`.
/// It sits beside `prepare/` so an archive of that directory never picks it up.
pub fn staging_temp_path(
    root: &Path,
    task_id: i64,
    owner: &str,
    user_id: &str,
    seq: u64,
) -> PathBuf {
    owner_task_dir(root, task_id, owner).join(format!(".{user_id}.json.{seq}.tmp"))
}

// .../{owner}/extract_{task_id}.zip
pub fn archive_path(root: &Path, task_id: i64, owner: &str) -> PathBuf {
    owner_task_dir(root, task_id, owner).join(archive_file_name(task_id))
}

// .../{owner}/extract_{task_id}.zip.prepare
pub fn provisional_archive_path(root: &Path, task_id: i64, owner: &str) -> PathBuf {
    owner_task_dir(root, task_id, owner).join(format!("{}.prepare", archive_file_name(task_id)))
}
