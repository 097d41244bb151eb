use crate::StorageError;
use mindcanvas_core::{CanvasDocument, ImportError};
use std::fs;
use std::path::Path;

pub fn export_json(document: &CanvasDocument) -> Result<String, StorageError> {
    Ok(serde_json::to_string_pretty(document)?)
}

/// Parse and structurally validate an exported document. Nothing is returned unless
/// the whole document is consistent.
pub fn import_json(text: &str) -> Result<CanvasDocument, StorageError> {
    let document: CanvasDocument =
        serde_json::from_str(text).map_err(|e| ImportError::Parse(e.to_string()))?;
    document.validate()?;
    Ok(document)
}

pub fn read_document<P: AsRef<Path>>(path: P) -> Result<CanvasDocument, StorageError> {
    let text = fs::read_to_string(path)?;
    import_json(&text)
}

/// Write through a sibling temp file so a failed write never truncates the target.
pub fn write_document<P: AsRef<Path>>(
    path: P,
    document: &CanvasDocument,
) -> Result<(), StorageError> {
    let path = path.as_ref();
    let json = export_json(document)?;
    let tmp = path.with_extension("json.tmp");
    let written = fs::write(&tmp, json).and_then(|()| fs::rename(&tmp, path));
    if let Err(err) = written {
        if let Err(cleanup) = fs::remove_file(&tmp) {
            tracing::debug!("Could not remove {:?}: {}", tmp, cleanup);
        }
        return Err(err.into());
    }
    Ok(())
}
