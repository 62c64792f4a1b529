use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::llm::media::extension_for_mime;

pub const UPLOADS_MOUNT: &str = "uploads";
pub const OUTPUTS_MOUNT: &str = "outputs";

const MAX_FILENAME_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub file_name: String,
}

impl StoredFile {
    pub fn public_url(&self, mount: &str) -> String {
        format!("/{}/{}", mount.trim_matches('/'), self.file_name)
    }
}

pub fn ensure_dirs(dirs: &[&Path]) -> io::Result<()> {
    for dir in dirs {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let sanitized: String = base
        .chars()
        .filter(|&c| c != '\0')
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut sanitized = sanitized;
    while sanitized.contains("..") {
        sanitized = sanitized.replace("..", ".");
    }
    let sanitized = sanitized.trim_start_matches('.');
    let sanitized: String = sanitized.chars().take(MAX_FILENAME_CHARS).collect();

    if sanitized.is_empty() {
        "image".to_string()
    } else {
        sanitized
    }
}

fn timestamp_millis() -> i64 {
    Utc::now().timestamp_millis()
}

const MAX_NAME_ATTEMPTS: usize = 1000;

fn candidate_name(millis: i64, attempt: usize, suffix: &str) -> String {
    if attempt == 0 {
        format!("{millis}-{suffix}")
    } else {
        format!("{millis}-{attempt}-{suffix}")
    }
}

/// Never overwrites: a taken name is retried as `<millis>-<n>-<suffix>`.
async fn write_new_file(dir: &Path, suffix: &str, bytes: &[u8]) -> io::Result<StoredFile> {
    let millis = timestamp_millis();
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let file_name = candidate_name(millis, attempt, suffix);
        let path = dir.join(&file_name);
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        };

        let written = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;
        if let Err(err) = written {
            drop(file);
            remove_file(&path).await;
            return Err(err);
        }
        return Ok(StoredFile { path, file_name });
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for {suffix} in {}", dir.display()),
    ))
}

/// Stores the upload as `<unix-millis>-<sanitized original name>`.
pub async fn save_upload(dir: &Path, original_name: &str, bytes: &[u8]) -> io::Result<StoredFile> {
    let stored = write_new_file(dir, &sanitize_filename(original_name), bytes).await?;
    info!("Saved upload {} ({} bytes)", stored.path.display(), bytes.len());
    Ok(stored)
}

pub async fn save_generated(dir: &Path, bytes: &[u8], mime_type: &str) -> io::Result<StoredFile> {
    let suffix = format!("generated.{}", extension_for_mime(mime_type));
    let stored = write_new_file(dir, &suffix, bytes).await?;
    info!("Image saved: {}", stored.path.display());
    Ok(stored)
}

/// Best-effort delete; a file that is already gone is not an error.
pub async fn remove_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("Removed upload {}", path.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!("Failed to remove {}: {}", path.display(), err),
    }
}
