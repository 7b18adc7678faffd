//! Flat directory of recorded and uploaded `.mp4` files

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::errors::{RecorderError, Result};

/// Extension of recorder-generated files
pub const RECORDING_EXTENSION: &str = "mp4";

const MAX_NAME_SUFFIX: u32 = 1000;

#[derive(Debug, Clone)]
pub struct RecordingStore {
    root: PathBuf,
}

impl RecordingStore {
    /// Open the store, creating the directory if needed
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            RecorderError::Io(format!(
                "Failed to create recordings directory {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{unix seconds}.mp4`; two starts within the same second share a name
    pub fn timestamp_name(at: DateTime<Utc>) -> String {
        format!("{}.{}", at.timestamp(), RECORDING_EXTENSION)
    }

    /// Allocate a recorder-generated name for `at`.
    ///
    /// Falls back to `{secs}-{n}.mp4` when the plain timestamp is taken, so a
    /// new recording never replaces an upload or an earlier recording.
    pub fn allocate_timestamped(&self, at: DateTime<Utc>) -> Result<(String, PathBuf)> {
        let base = Self::timestamp_name(at);
        if let Ok(path) = self.allocate(&base) {
            return Ok((base, path));
        }
        for n in 1..MAX_NAME_SUFFIX {
            let name = format!("{}-{}.{}", at.timestamp(), n, RECORDING_EXTENSION);
            if let Ok(path) = self.allocate(&name) {
                log::debug!("{} is taken, recording to {}", base, name);
                return Ok((name, path));
            }
        }
        Err(RecorderError::Encode(format!(
            "no free file name for timestamp {} in {}",
            at.timestamp(),
            self.root.display()
        )))
    }

    /// Path for `name` after validating it as a bare file name
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Reserve a path for a new recording; never reuses an existing file
    pub fn allocate(&self, name: &str) -> Result<PathBuf> {
        let path = self.path_for(name)?;
        if path.exists() {
            return Err(RecorderError::Encode(format!(
                "{} already exists in {}",
                name,
                self.root.display()
            )));
        }
        Ok(path)
    }

    /// Store an uploaded file, replacing any file of the same name
    pub fn save(&self, name: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(name)?;
        let partial = self.root.join(format!(".{}.part", name));

        fs::write(&partial, data)?;
        if let Err(e) = fs::rename(&partial, &path) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }

        log::info!("Stored upload {} ({} bytes)", name, data.len());
        Ok(path)
    }

    pub fn read(&self, name: &str) -> Result<Bytes> {
        let path = self.path_for(name)?;
        match fs::read(&path) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RecorderError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Names of stored files, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if validate_name(&name).is_ok() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Accept only bare, visible file names
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| Err(RecorderError::InvalidRequest(format!("{:?}: {}", name, reason)));

    if name.trim().is_empty() {
        return invalid("file name is empty");
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return invalid("file name must not contain path separators");
    }
    if name == ".." || name.starts_with('.') {
        return invalid("file name must not start with a dot");
    }
    Ok(())
}
