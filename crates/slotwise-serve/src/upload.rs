//! Files uploaded with a prediction request.
//!
//! Uploads are spooled to named temp files so predictors can read them by
//! path. The files belong to the request and are removed when its
//! [`RequestArtifacts`] is dropped, whether inference succeeded or not.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

pub struct UploadedFile {
    pub field: String,
    pub file_name: Option<String>,
    file: NamedTempFile,
}

impl UploadedFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[derive(Default)]
pub struct RequestArtifacts {
    files: Vec<UploadedFile>,
}

impl RequestArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `bytes` to a new temp file, keeping the upload's extension.
    pub fn spool(
        &mut self,
        field: &str,
        file_name: Option<&str>,
        bytes: &[u8],
    ) -> std::io::Result<&Path> {
        let suffix = file_name
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        let mut file = tempfile::Builder::new()
            .prefix("slotwise-upload-")
            .suffix(&suffix)
            .tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;
        debug!(field, bytes = bytes.len(), path = %file.path().display(), "spooled upload");

        self.files.push(UploadedFile {
            field: field.to_string(),
            file_name: file_name.map(str::to_owned),
            file,
        });
        let last = self.files.len() - 1;
        Ok(self.files[last].path())
    }

    pub fn get(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == field)
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Drop for RequestArtifacts {
    fn drop(&mut self) {
        if !self.files.is_empty() {
            debug!(files = self.files.len(), "removing request artifacts");
        }
    }
}
