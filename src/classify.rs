//! File classification and code normalization.
//!
//! Classification decides how a file is stored: binaries are always kept as
//! full snapshots, text is diffed against its predecessor, and code text is
//! normalized first so incidental whitespace does not show up in diffs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{Error, Result};

/// Extensions (lower-case, without the dot) treated as source code.
pub const CODE_EXTENSIONS: &[&str] = &[
    "go", "js", "ts", "jsx", "tsx", "py", "java", "cpp", "c", "h", "hpp", "rs", "rb", "php",
    "cs", "swift", "kt", "scala", "m", "mm",
];

/// A file is binary if it contains a zero byte.
///
/// This is a heuristic, not content-type detection.
pub fn is_binary(data: &[u8]) -> bool {
    data.contains(&0)
}

/// Whether `path` names a source-code file, judged by its extension.
pub fn is_code(path: &str) -> bool {
    match extension(path) {
        Some(ext) => {
            let ext = ext.to_ascii_lowercase();
            CODE_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// The text after the last `.` of the final path segment.
fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rfind('.').map(|i| &name[i + 1..])
}

/// Trim every line, drop lines that end up empty, and rejoin with `\n`.
///
/// Idempotent. The result never ends with a newline.
pub fn normalize_code(text: &str) -> String {
    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Blob encoding
// ---------------------------------------------------------------------------

/// Encode raw bytes as a stored content string.
///
/// Binary data is base64-encoded; anything else must be UTF-8 text.
///
/// # Errors
/// Returns [`Error::Validation`] if non-binary data is not UTF-8.
pub fn encode_content(data: &[u8], is_binary: bool) -> Result<String> {
    if is_binary {
        return Ok(STANDARD.encode(data));
    }
    String::from_utf8(data.to_vec())
        .map_err(|e| Error::validation(format!("text file is not valid UTF-8: {}", e)))
}

/// Decode a stored full-content string back into raw bytes.
///
/// # Errors
/// Returns [`Error::Integrity`] if a binary payload is not valid base64.
pub fn decode_content(content: String, is_binary: bool) -> Result<Vec<u8>> {
    if is_binary {
        return STANDARD
            .decode(content.as_bytes())
            .map_err(|e| Error::integrity(format!("binary payload is not base64: {}", e)));
    }
    Ok(content.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_needs_zero_byte() {
        assert!(is_binary(b"\x89PNG\r\n\x1a\n\x00\x00"));
        assert!(!is_binary(b"plain text\n"));
        assert!(!is_binary(b""));
        assert!(!is_binary("héllo wörld".as_bytes()));
    }

    #[test]
    fn code_by_extension() {
        assert!(is_code("main.go"));
        assert!(is_code("src/lib.rs"));
        assert!(is_code("App.TSX"));
        assert!(is_code("dir.v2/module.py"));
        assert!(!is_code("README.md"));
        assert!(!is_code("Makefile"));
        assert!(!is_code("archive.tar.gz"));
        assert!(!is_code("dir.go/notes"));
    }

    #[test]
    fn normalize_strips_indentation_and_blank_lines() {
        let src = "package main\n\nfunc main() {\n\tprintln(\"hi\")\n}\n";
        assert_eq!(
            normalize_code(src),
            "package main\nfunc main() {\nprintln(\"hi\")\n}"
        );
    }

    #[test]
    fn normalize_handles_crlf_and_whitespace_only() {
        assert_eq!(normalize_code("a\r\n  \r\n b \r\n"), "a\nb");
        assert_eq!(normalize_code(" \n\t\n"), "");
        assert_eq!(normalize_code(""), "");
    }

    #[test]
    fn binary_payload_round_trips() {
        let data = [0u8, 159, 146, 150, 255];
        let stored = encode_content(&data, true).unwrap();
        assert_eq!(decode_content(stored, true).unwrap(), data);
    }

    #[test]
    fn text_payload_must_be_utf8() {
        assert_eq!(encode_content(b"plain", false).unwrap(), "plain");
        assert!(encode_content(&[0xff, 0xfe], false).is_err());
        assert!(decode_content("%%%".into(), true).is_err());
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_code("  x = 1\n\n\n    y = 2  \n");
        assert_eq!(normalize_code(&once), once);
    }
}
