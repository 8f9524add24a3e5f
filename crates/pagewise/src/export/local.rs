use std::io::Write;
use std::path::{Path, PathBuf};

use super::ExportError;

/// Prefix of the relative path handed back to callers.
pub const DOWNLOAD_PREFIX: &str = "downloads";

/// A workbook staged on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifact {
    pub path: PathBuf,
    /// `downloads/<sub-id>/<file>`
    pub download_path: String,
}

/// Writes export files under `<export_dir>/<sub-id>/`.
#[derive(Debug, Clone)]
pub struct LocalStaging {
    export_dir: PathBuf,
}

impl LocalStaging {
    pub fn new<P: AsRef<Path>>(export_dir: P) -> Self {
        Self {
            export_dir: export_dir.as_ref().to_path_buf(),
        }
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// Writes `content` to `<export_dir>/<sub_id>/<filename>`, replacing any
    /// previous file of that name. The file appears atomically.
    pub fn write(
        &self,
        sub_id: &str,
        filename: &str,
        content: &[u8],
    ) -> Result<LocalArtifact, ExportError> {
        let dir = self.export_dir.join(sub_id);
        std::fs::create_dir_all(&dir).map_err(|e| ExportError::CreateDirectory {
            path: dir.clone(),
            source: e,
        })?;

        let path = dir.join(filename);
        let partial = dir.join(format!(".{}.partial", filename));
        let write_err = |source| ExportError::WriteFile {
            path: path.clone(),
            source,
        };

        let mut file = std::fs::File::create(&partial).map_err(write_err)?;
        file.write_all(content).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        if let Err(e) = std::fs::rename(&partial, &path) {
            let _ = std::fs::remove_file(&partial);
            return Err(write_err(e));
        }

        Ok(LocalArtifact {
            download_path: format!("{}/{}/{}", DOWNLOAD_PREFIX, sub_id, filename),
            path,
        })
    }
}
