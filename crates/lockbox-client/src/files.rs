//! Local file helpers for uploads and listings

use lockbox_core::types::Metadata;
use serde_json::Value;
use std::io;
use std::path::Path;

/// Metadata attached to an uploaded file record.
///
/// `file_size` is the plaintext size; the stored blob is larger by the
/// envelope overhead.
pub fn file_metadata(path: &Path) -> io::Result<Metadata> {
    let info = std::fs::metadata(path)?;
    if !info.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a regular file: {}", path.display()),
        ));
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_type = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string());

    let mut meta = Metadata::new();
    meta.insert("file_name".into(), Value::from(name));
    meta.insert("file_path".into(), Value::from(path.display().to_string()));
    meta.insert("file_size".into(), Value::from(info.len()));
    meta.insert("file_type".into(), Value::from(file_type));
    Ok(meta)
}

pub fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
