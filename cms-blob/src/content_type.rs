//! Content-type inference from file names.

use cms_core::extension;

/// Archive types extraction dispatch depends on; checked before the generic table.
const ARCHIVE_TYPES: &[(&str, &str)] = &[
    ("zip", "application/zip"),
    ("7z", "application/x-7z-compressed"),
    ("gz", "application/gzip"),
    ("bz2", "application/x-bzip2"),
    ("tar", "application/x-tar"),
    ("rar", "application/vnd.rar"),
];

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Guess the MIME type of `file_name` from its extension.
pub fn guess_content_type(file_name: &str) -> String {
    let Some(ext) = extension(file_name) else {
        return DEFAULT_CONTENT_TYPE.to_string();
    };
    if let Some((_, mime)) = ARCHIVE_TYPES.iter().find(|(e, _)| *e == ext) {
        return (*mime).to_string();
    }
    mime_guess::from_ext(&ext)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// Use the explicit type when present, otherwise guess from the name.
pub fn resolve_content_type(explicit: Option<&str>, file_name: &str) -> String {
    match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(ct) => ct.to_string(),
        None => guess_content_type(file_name),
    }
}
