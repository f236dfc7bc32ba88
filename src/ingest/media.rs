//! Upload boundary: decide whether a path is an image, a video, or neither.

use std::path::Path;

use crate::error::UnsupportedInput;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "wmv"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// Classify by extension, case-insensitively.
pub fn classify(path: &Path) -> Result<MediaKind, UnsupportedInput> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Ok(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        Ok(MediaKind::Video)
    } else {
        Err(UnsupportedInput { extension })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_extensions() {
        assert_eq!(classify(Path::new("a/b/car.JPG")), Ok(MediaKind::Image));
        assert_eq!(classify(Path::new("street.gif")), Ok(MediaKind::Image));
        assert_eq!(classify(Path::new("clip.mkv")), Ok(MediaKind::Video));
        assert_eq!(classify(Path::new("clip.WMV")), Ok(MediaKind::Video));
    }

    #[test]
    fn rejects_everything_else() {
        let err = classify(Path::new("notes.txt")).unwrap_err();
        assert_eq!(err.extension, "txt");
        assert_eq!(classify(Path::new("no_extension")).unwrap_err().extension, "");
    }
}
