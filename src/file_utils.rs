use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::errors::StoreError;

// @module: File and directory utilities

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_file()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.as_os_str().is_empty() && !path.exists() {
            fs::create_dir_all(path)?;
        }
        Ok(())
    }

    // @generates: Output path for a translated document
    // @params: input_file, target_language
    pub fn generate_output_path<P: AsRef<Path>>(input_file: P, target_language: &str) -> PathBuf {
        let input_file = input_file.as_ref();
        let stem = input_file.file_stem().unwrap_or_default().to_string_lossy();
        let extension = input_file
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "txt".to_string());

        let output_filename = format!("{}.{}.{}", stem, target_language, extension);
        match input_file.parent() {
            Some(parent) => parent.join(output_filename),
            None => PathBuf::from(output_filename),
        }
    }

    /// Read a file to a string
    pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
        fs::read_to_string(&path).with_context(|| format!("Failed to read file: {:?}", path.as_ref()))
    }

    /// Replace `path` with `contents` so that readers only ever observe the
    /// old file or the complete new one.
    pub fn write_atomic<P: AsRef<Path>>(path: P, contents: &[u8]) -> io::Result<()> {
        Self::write_atomic_with(path, |file| file.write_all(contents))
    }

    /// Replace `path` with whatever `write` produces.
    ///
    /// The data goes to a temporary file in the same directory (same
    /// filesystem, so the final rename is atomic), is synced, and is then
    /// renamed over the target. If `write` or anything else fails before the
    /// rename, the temporary file is removed and the previous file is
    /// untouched.
    pub fn write_atomic_with<P, F>(path: P, write: F) -> io::Result<()>
    where
        P: AsRef<Path>,
        F: FnOnce(&mut fs::File) -> io::Result<()>,
    {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        write(tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Load a JSON store from disk.
///
/// Returns `Ok(None)` when the file does not exist yet (cold start). A file
/// that exists but cannot be read or parsed is reported as
/// [`StoreError::Corrupt`] so that the caller never silently starts over.
pub fn load_json_store<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Serialize a store as pretty JSON and atomically replace the file on disk
pub fn save_json_store<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    FileManager::write_atomic_with(path, |file| {
        let mut writer = io::BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()
    })
    .map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
