use tempfile::TempDir;

/// Creates a unique temporary export root. The directory is removed when the
/// returned `TempDir` is dropped, so keep it in scope for as long as you need the files.
pub fn setup_test_export_root() -> TempDir {
    TempDir::new().expect("failed to create tempdir")
}

/// Canonical absolute path of a temporary root, as the export engine would resolve it.
pub fn root_path(tmp: &TempDir) -> std::path::PathBuf {
    tmp.path()
        .canonicalize()
        .unwrap_or_else(|_| tmp.path().to_path_buf())
}
