use memmap2::Mmap;
use serde::Serialize;
use std::fs::File;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractSummary {
    pub root: PathBuf,
    pub files: usize,
    pub directories: usize,
    pub skipped: usize,
}

/// Unpacks every entry of `archive_path` below `target_dir`.
///
/// The target directory is created when missing. Files already present are
/// overwritten, so extracting the same archive twice yields the same tree.
/// Entries whose name would land outside `target_dir` are skipped.
pub fn extract_archive(archive_path: &Path, target_dir: &Path) -> Result<ExtractSummary> {
    if !archive_path.is_file() {
        return Err(Error::NotFound {
            path: archive_path.to_path_buf(),
        });
    }

    let file = File::open(archive_path).map_err(|e| open_error(archive_path, e))?;
    let len = file
        .metadata()
        .map_err(|e| open_error(archive_path, e))?
        .len();
    if len == 0 {
        return Err(malformed(archive_path, "archive is empty"));
    }

    // SAFETY: The file is opened read-only and outlives the mapping, which is
    // dropped at the end of this function.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| open_error(archive_path, e))?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .map_err(|e| malformed(archive_path, zip_reason(&e)))?;

    std::fs::create_dir_all(target_dir).map_err(|source| Error::Io {
        path: target_dir.to_path_buf(),
        source,
    })?;

    let mut summary = ExtractSummary {
        root: target_dir.to_path_buf(),
        ..ExtractSummary::default()
    };

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| malformed(archive_path, zip_reason(&e)))?;

        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!(entry = entry.name(), "skipping entry outside the extraction root");
            summary.skipped += 1;
            continue;
        };
        let out_path = target_dir.join(&relative);

        if entry.is_dir() {
            create_dir(&out_path)?;
            summary.directories += 1;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            create_dir(parent)?;
        }

        let mut out = File::create(&out_path).map_err(|source| Error::Io {
            path: out_path.clone(),
            source,
        })?;
        io::copy(&mut entry, &mut out).map_err(|source| match source.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => malformed(
                archive_path,
                format!("corrupt entry {}: {source}", relative.display()),
            ),
            _ => Error::Io {
                path: out_path.clone(),
                source,
            },
        })?;

        // Owner read/write is always kept so the file can be decompiled and overwritten.
        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode((mode & 0o777) | 0o600);
            if let Err(e) = std::fs::set_permissions(&out_path, perms) {
                debug!(path = %out_path.display(), error = %e, "could not apply entry permissions");
            }
        }

        summary.files += 1;
    }

    debug!(
        archive = %archive_path.display(),
        files = summary.files,
        directories = summary.directories,
        skipped = summary.skipped,
        "archive extracted"
    );
    Ok(summary)
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn open_error(path: &Path, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        Error::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        Error::Io {
            path: path.to_path_buf(),
            source: e,
        }
    }
}

fn malformed(path: &Path, reason: impl Into<String>) -> Error {
    Error::MalformedArchive {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn zip_reason(e: &ZipError) -> String {
    match e {
        ZipError::Io(io) => format!("unreadable zip structure: {io}"),
        other => other.to_string(),
    }
}
