// src/resource/file.rs

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

use super::{Resource, ResourceSettings, Signature};

/// Local file or directory, `file://relative/path` or `file:///absolute/path`.
#[derive(Debug, Clone)]
pub struct FileResource {
    url: String,
    path: PathBuf,
}

impl FileResource {
    pub fn new(url: &str, path_part: &str, settings: &ResourceSettings) -> Self {
        let raw = Path::new(path_part);
        let path = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            settings.workspace.join(raw)
        };
        Self {
            url: url.to_string(),
            path,
        }
    }
}

impl Resource for FileResource {
    fn url(&self) -> &str {
        &self.url
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn remove(&self) -> Result<()> {
        if self.path.is_dir() {
            fs::remove_dir_all(&self.path)
                .with_context(|| format!("removing directory {:?}", self.path))?;
        } else {
            fs::remove_file(&self.path)
                .with_context(|| format!("removing file {:?}", self.path))?;
        }
        debug!(url = %self.url, "resource removed");
        Ok(())
    }

    fn signature(&self) -> Result<Signature> {
        if self.path.is_dir() {
            compute_dir_hash(&self.path)
        } else {
            compute_file_hash(&self.path)
        }
    }
}

/// Hash the contents of a single file.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file =
        File::open(path).with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Hash a directory tree: relative path and content hash of every file,
/// visited in sorted order so the result does not depend on the filesystem.
/// Each path is length-prefixed so that no two trees feed the same bytes.
fn compute_dir_hash(root: &Path) -> Result<String> {
    let mut files = Vec::new();
    collect_files(root, &mut files)?;
    files.sort();

    let mut hasher = Hasher::new();
    for file in files {
        let relative = file.strip_prefix(root).unwrap_or(&file);
        let relative = relative.to_string_lossy();
        hasher.update(&(relative.len() as u64).to_le_bytes());
        hasher.update(relative.as_bytes());
        hasher.update(compute_file_hash(&file)?.as_bytes());
    }
    Ok(hasher.finalize().to_hex().to_string())
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("reading dir {:?}", dir))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
