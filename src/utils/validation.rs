
/// Fallback used when an upload name sanitizes down to nothing
pub const DEFAULT_ARCHIVE_NAME: &str = "download.apk";

/// ZIP local file header, the container format of every APK
const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Accepted upload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Single installable package (`.apk`)
    Apk,
    /// Split-APK bundle (`.apks`), not analyzed yet
    Bundle,
}

impl ArchiveKind {
    /// Classifies a file name by extension, case-insensitively
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        // Suffix match, so a bare ".apk" still counts
        let lower = file_name.to_lowercase();
        if lower.ends_with(".apks") {
            Some(ArchiveKind::Bundle)
        } else if lower.ends_with(".apk") {
            Some(ArchiveKind::Apk)
        } else {
            None
        }
    }
}

/// Sanitizes an attacker-controlled upload name for use as a path component.
/// Only ASCII letters, digits, `.`, `_` and `-` survive; everything else becomes `_`.
pub fn sanitize_file_name(file_name: &str) -> String {
    // Drop any directory part first
    let name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("");

    if name != file_name {
        tracing::warn!("Path separators in upload name: {}", file_name);
    }

    let mut sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    // Every kept char is ASCII, so byte truncation is safe
    sanitized.truncate(255);

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        return DEFAULT_ARCHIVE_NAME.to_string();
    }

    sanitized
}

/// Checks that the first bytes look like a ZIP container
pub fn has_zip_signature(header: &[u8]) -> bool {
    header.starts_with(&ZIP_SIGNATURE)
}
