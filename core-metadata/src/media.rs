//! Media type classification by file extension

use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "jpe", "png", "gif", "bmp", "tif", "tiff", "webp", "ico",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "avi", "mkv", "wmv", "webm", "mpg", "mpeg", "3gp", "mts",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

/// Classify a file by its extension, case-insensitively
pub fn classify(path: &Path) -> MediaKind {
    let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
        return MediaKind::Other;
    };
    let extension = extension.to_ascii_lowercase();

    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        MediaKind::Image
    } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        MediaKind::Video
    } else {
        MediaKind::Other
    }
}
