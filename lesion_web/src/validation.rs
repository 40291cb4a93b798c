//! Filename based upload check. This only looks at the extension and is not
//! a security boundary: any file can be renamed to pass it.

pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub fn is_allowed(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, extension)) => ALLOWED_EXTENSIONS.contains(&extension.to_lowercase().as_str()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_extensions() {
        for name in ["lesion.jpg", "lesion.JPEG", "scan.final.png", "x.Png", ".jpg"] {
            assert!(is_allowed(name), "{} should be allowed", name);
        }
    }

    #[test]
    fn test_rejected_names() {
        for name in [
            "malware.exe",
            "notes.txt",
            "jpg",
            "",
            "archive.jpg.zip",
            "image.",
            "photo.gif",
        ] {
            assert!(!is_allowed(name), "{} should be rejected", name);
        }
    }
}
