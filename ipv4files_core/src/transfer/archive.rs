//! Zip packaging of shared directories.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::utils::{EventSender, emit, unique_destination};
use crate::AppEvent;
use crate::error::{Result, TransferError};

/// Packaging progress after one more file was added
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackProgress {
    pub processed: usize,
    pub total: usize,
}

impl PackProgress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (self.processed * 100 / self.total).min(100) as u8
    }
}

/// Temporary archive of a directory, removed when dropped
#[derive(Debug)]
pub struct ArchiveArtifact {
    path: PathBuf,
    file_count: usize,
}

impl ArchiveArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Regular files stored in the archive
    pub fn file_count(&self) -> usize {
        self.file_count
    }

    pub async fn size(&self) -> Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }
}

impl Drop for ArchiveArtifact {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed archive artifact {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove archive artifact {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Deterministic artifact location for a directory
pub fn artifact_path(staging_dir: &Path, directory_root: &Path) -> PathBuf {
    let name = directory_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    staging_dir.join(format!("{}.zip", name))
}

/// `/`-separated archive name of a path relative to the packed root
fn archive_entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn regular_files(root: &Path) -> std::result::Result<Vec<PathBuf>, ZipError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Write every regular file under `root` into a deflate zip at `artifact`
pub fn pack_blocking(
    root: &Path,
    artifact: &Path,
    mut progress: impl FnMut(PackProgress),
) -> std::result::Result<usize, ZipError> {
    let files = regular_files(root)?;
    let total = files.len();

    if let Some(parent) = artifact.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut zip = ZipWriter::new(File::create(artifact)?);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    for (index, path) in files.iter().enumerate() {
        let relative = path
            .strip_prefix(root)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        zip.start_file(archive_entry_name(relative), options)?;
        let mut source = File::open(path)?;
        io::copy(&mut source, &mut zip)?;

        progress(PackProgress {
            processed: index + 1,
            total,
        });
    }

    zip.finish()?;
    Ok(total)
}

/// Extract every entry of `archive` below `destination_root`
///
/// Returns the relative paths of the extracted files. Entries that would
/// land outside `destination_root` are skipped.
pub fn unpack_blocking(
    archive: &Path,
    destination_root: &Path,
) -> std::result::Result<Vec<PathBuf>, ZipError> {
    let mut archive = ZipArchive::new(File::open(archive)?)?;
    let mut extracted = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let relative = match entry.enclosed_name() {
            Some(p) => p.to_path_buf(),
            None => {
                tracing::warn!("Skipping unsafe archive entry: {}", entry.name());
                continue;
            }
        };
        let out_path = destination_root.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
        extracted.push(relative);
    }

    Ok(extracted)
}

/// Package `directory_root` into the staging dir on a blocking worker
pub async fn pack_directory(
    directory_root: &Path,
    staging_dir: &Path,
    event_tx: &EventSender,
) -> Result<ArchiveArtifact> {
    // An unrelated file already holding the name is left alone
    let path = unique_destination(&artifact_path(staging_dir, directory_root)).await?;
    // Guard first so a half-written archive is removed on failure
    let mut artifact = ArchiveArtifact {
        path: path.clone(),
        file_count: 0,
    };

    let root = directory_root.to_path_buf();
    let tx = event_tx.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        pack_blocking(&root, &path, |p| {
            tracing::debug!("Packaging {}/{} ({}%)", p.processed, p.total, p.percent());
            emit(
                &tx,
                AppEvent::PackagingProgress {
                    processed: p.processed,
                    total: p.total,
                    percent: p.percent(),
                },
            );
        })
    })
    .await
    .map_err(io::Error::other)?;

    artifact.file_count = outcome.map_err(|source| TransferError::PackagingFailure {
        path: directory_root.to_path_buf(),
        source,
    })?;

    tracing::info!(
        "Packaged {} files from {} into {}",
        artifact.file_count,
        directory_root.display(),
        artifact.path.display()
    );
    Ok(artifact)
}

/// Extract `archive` under `destination_root` on a blocking worker
pub async fn unpack_archive(archive: &Path, destination_root: &Path) -> Result<Vec<PathBuf>> {
    let src = archive.to_path_buf();
    let dest = destination_root.to_path_buf();

    tokio::task::spawn_blocking(move || unpack_blocking(&src, &dest))
        .await
        .map_err(io::Error::other)?
        .map_err(|source| TransferError::ExtractionFailure {
            path: archive.to_path_buf(),
            source,
        })
}
