//! The document-buffer interface the (out-of-scope, per spec.md §1)
//! editor UI drives: line-buffer management, scrolling and selection are
//! the external collaborator's concern, but `rebuild` (spec.md §4.K step
//! 1) needs a concrete [`station_runtime::DocumentBuffer`] to call, so
//! this is the minimal bound-to-a-path text buffer that interface
//! requires — load, mutate, track dirtiness, save.

use alloc::string::{String, ToString};

use station_fs::FilesystemKind;
use station_hal::FirmwareServices;
use station_runtime::DocumentBuffer;
use station_storage::block::BlockDevice;

#[derive(Debug, Clone)]
pub struct TextDocument {
    fw: FirmwareServices,
    device: BlockDevice,
    kind: FilesystemKind,
    path: String,
    text: String,
    modified: bool,
}

impl TextDocument {
    /// A fresh, unsaved buffer bound to `path` on the currently mounted
    /// volume — what "new file" in the editor screen produces.
    pub fn new(fw: FirmwareServices, device: BlockDevice, kind: FilesystemKind, path: &str) -> Self {
        Self {
            fw,
            device,
            kind,
            path: path.to_string(),
            text: String::new(),
            modified: false,
        }
    }

    /// Loads an existing file's contents. Invalid UTF-8 is tolerated via
    /// lossy conversion rather than refusing to open the file at all.
    pub fn open(fw: FirmwareServices, device: BlockDevice, kind: FilesystemKind, path: &str) -> Result<Self, station_fs::VolumeError> {
        let mut io = station_fs::FirmwareBlockIo { fw: &fw, device };
        let bytes = station_fs::readfile(&mut io, kind, path)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        Ok(Self { fw, device, kind, path: path.to_string(), text, modified: false })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Appends `s` at the end of the buffer. The real line-buffer/cursor
    /// semantics belong to the editor UI this module only feeds; this is
    /// the minimal mutation the interface needs to demonstrate dirtiness
    /// tracking and the save path.
    pub fn insert_str(&mut self, s: &str) {
        self.text.push_str(s);
        self.modified = true;
    }
}

impl DocumentBuffer for TextDocument {
    fn is_modified(&self) -> bool {
        self.modified
    }

    fn save(&mut self) -> Result<(), String> {
        let mut io = station_fs::FirmwareBlockIo { fw: &self.fw, device: self.device };
        station_fs::writefile(&mut io, self.kind, &self.path, self.text.as_bytes())
            .map_err(|e| alloc::format!("{:?}", e))?;
        self.modified = false;
        Ok(())
    }
}

/// Always-saved stand-in used by the launcher loop before any file has
/// been opened, so `rebuild` can be offered immediately without a special
/// "no document" case threaded through every call site.
#[derive(Debug, Default)]
pub struct NoDocument;

impl DocumentBuffer for NoDocument {
    fn is_modified(&self) -> bool {
        false
    }

    fn save(&mut self) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_document_is_never_modified() {
        let mut doc = NoDocument;
        assert!(!doc.is_modified());
        assert!(doc.save().is_ok());
    }
}
