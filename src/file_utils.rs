//! File helpers: MIME detection, size formatting and upload limits

use std::path::Path;

/// Fallback MIME type for unknown extensions
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Default upload limit in megabytes
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 10;

/// MIME type for a file extension (case-insensitive, without the dot)
pub fn mime_type_for_extension(extension: &str) -> Option<&'static str> {
    let mime = match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        _ => return None,
    };
    Some(mime)
}

/// MIME type for a path, falling back to [`OCTET_STREAM`]
///
/// # Examples
///
/// ```
/// use chatdroid::file_utils::mime_type_for_path;
///
/// assert_eq!(mime_type_for_path("photo.JPG"), "image/jpeg");
/// assert_eq!(mime_type_for_path("archive.tar.zst"), "application/octet-stream");
/// ```
pub fn mime_type_for_path<P: AsRef<Path>>(path: P) -> &'static str {
    mime_type_for_extension(&file_extension(path)).unwrap_or(OCTET_STREAM)
}

/// Text after the last dot of the file name, or empty
pub fn file_extension<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .extension()
        .map(|ext| ext.to_string_lossy().to_string())
        .unwrap_or_default()
}

pub fn is_image(mime_type: Option<&str>) -> bool {
    mime_type.is_some_and(|m| m.starts_with("image/"))
}

pub fn is_video(mime_type: Option<&str>) -> bool {
    mime_type.is_some_and(|m| m.starts_with("video/"))
}

pub fn is_audio(mime_type: Option<&str>) -> bool {
    mime_type.is_some_and(|m| m.starts_with("audio/"))
}

/// Human-readable size: whole bytes below 1 KB, one decimal above
///
/// # Examples
///
/// ```
/// use chatdroid::file_utils::format_file_size;
///
/// assert_eq!(format_file_size(512), "512 B");
/// assert_eq!(format_file_size(1536), "1.5 KB");
/// ```
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut size = bytes as f64 / 1024.0;
    let mut unit_idx = 0;
    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.1} {}", size, UNITS[unit_idx])
}

/// Whether `bytes` fits within `max_mb` megabytes (inclusive)
pub fn is_file_size_valid(bytes: u64, max_mb: u64) -> bool {
    bytes <= max_mb * 1024 * 1024
}
