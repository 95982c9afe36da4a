use anyhow::{Context, Result};
use std::{
    fs::{self, File},
    io::{Seek, Write},
    path::Path,
};
use walkdir::WalkDir;
use zip::{CompressionMethod, ZipWriter};

/// Zips everything under `src_dir` into `writer`.
/// Keeps paths relative to `src_dir`, with forward slashes in the ZIP.
/// Entries are visited in file-name order so the same tree always yields the same entry order.
pub fn zip_dir_into<W: Write + Seek>(src_dir: &Path, writer: W) -> Result<W> {
    let mut zip = ZipWriter::new(writer);
    let options: zip::write::FileOptions<'_, ()> =
        zip::write::FileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(src_dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walk {}", src_dir.display()))?;
        let path = entry.path();

        // Skip the root dir itself
        let rel = match path.strip_prefix(src_dir).ok() {
            Some(r) if !r.as_os_str().is_empty() => r,
            _ => continue,
        };

        let rel_str = rel.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{rel_str}/"), options.clone())
                .with_context(|| format!("add dir {}", rel.display()))?;
        } else {
            zip.start_file(rel_str, options.clone())
                .with_context(|| format!("start file {}", rel.display()))?;
            let bytes = fs::read(path).with_context(|| format!("read file {}", path.display()))?;
            zip.write_all(&bytes)
                .with_context(|| format!("write file {}", rel.display()))?;
        }
    }

    zip.finish().context("finalize zip")
}

/// Sync zipper: zips everything under `src_dir` into a new file at `zip_path`.
pub fn zip_dir_sync(src_dir: &Path, zip_path: &Path) -> Result<()> {
    let file = File::create(zip_path)
        .with_context(|| format!("create zip at {}", zip_path.display()))?;
    let file = zip_dir_into(src_dir, file)?;
    file.sync_all().context("flush zip to disk")?;
    Ok(())
}

/// Async wrapper around `zip_dir_into` for an already opened file (runs in blocking thread).
pub async fn zip_dir_to_file(src_dir: &Path, file: File) -> Result<()> {
    let src = src_dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = zip_dir_into(&src, file)?;
        file.sync_all().context("flush zip to disk")
    })
    .await
    .context("join zip blocking task")?
}
