// src/utils.rs

use std::path::Path;

/// Guesses the MIME type of an image from its file extension.
pub fn guess_image_mime(file_path: &str) -> Option<&'static str> {
    let extension = Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match extension.as_str() {
        "jpg" | "jpeg" | "jpe" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

/// Joins a base URL and an absolute path without doubling the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_image_mime() {
        assert_eq!(guess_image_mime("/sdcard/DCIM/cat.JPG"), Some("image/jpeg"));
        assert_eq!(guess_image_mime("shot.png"), Some("image/png"));
        assert_eq!(guess_image_mime("notes.txt"), None);
        assert_eq!(guess_image_mime("no_extension"), None);
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://localhost:5001/", "/chat"),
            "http://localhost:5001/chat"
        );
        assert_eq!(join_url("http://host", "/v1/x"), "http://host/v1/x");
    }
}
