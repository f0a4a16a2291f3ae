//! Flat, collision-free attachment names for the single-folder target.
//!
//! `img_<hash8>_<seq:03><ext>` where `hash8` is the first eight hex digits of
//! SHA-256 over `"<page flat name>_<original filename>"` and `seq` comes from
//! the per-run [`AttachmentSequence`]. Hash collisions are not probed for;
//! the sequence number alone keeps names unique within one run.

use std::path::Path;

use sha2::{Digest, Sha256};

/// Monotonic counter shared by every page processed in one run. It is never
/// reset between pages.
#[derive(Debug, Clone, Default)]
pub struct AttachmentSequence {
    issued: u32,
}

impl AttachmentSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next index, starting at 1.
    pub fn next_index(&mut self) -> u32 {
        self.issued += 1;
        self.issued
    }

    pub fn issued(&self) -> u32 {
        self.issued
    }
}

pub fn flatten(page_flat_name: &str, original_filename: &str, sequence_index: u32) -> String {
    let digest = Sha256::digest(format!("{page_flat_name}_{original_filename}").as_bytes());
    let mut short_hash = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        short_hash.push_str(&format!("{byte:02x}"));
    }
    format!(
        "img_{short_hash}_{sequence_index:03}{}",
        lowercase_extension(original_filename)
    )
}

/// `.PNG` → `.png`; empty when the name has no extension.
pub fn lowercase_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

pub fn has_extension(filename: &str, extensions: &[&str]) -> bool {
    let ext = lowercase_extension(filename);
    !ext.is_empty() && extensions.iter().any(|candidate| ext[1..] == **candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_is_deterministic() {
        let first = flatten("A › B", "img.png", 1);
        let second = flatten("A › B", "img.png", 1);
        assert_eq!(first, second);
    }

    #[test]
    fn flatten_shape() {
        let name = flatten("Dev › Design", "Diagram 1.PNG", 7);
        assert!(name.starts_with("img_"));
        assert!(name.ends_with("_007.png"));
        let hash = &name[4..12];
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn flatten_differs_by_page_and_file() {
        assert_ne!(flatten("A", "x.png", 1)[..12], flatten("B", "x.png", 1)[..12]);
        assert_ne!(flatten("A", "x.png", 1)[..12], flatten("A", "y.png", 1)[..12]);
    }

    #[test]
    fn extensionless_files_keep_no_suffix() {
        assert_eq!(flatten("A", "README", 12), format!("{}_012", &flatten("A", "README", 12)[..12]));
        assert_eq!(lowercase_extension(".hidden"), "");
        assert_eq!(lowercase_extension("archive.tar.GZ"), ".gz");
    }

    #[test]
    fn sequence_is_monotonic_from_one() {
        let mut sequence = AttachmentSequence::new();
        assert_eq!(sequence.next_index(), 1);
        assert_eq!(sequence.next_index(), 2);
        assert_eq!(sequence.issued(), 2);
    }

    #[test]
    fn has_extension_is_case_insensitive() {
        assert!(has_extension("photo.JPG", &["jpg", "png"]));
        assert!(!has_extension("notes.txt", &["jpg", "png"]));
        assert!(!has_extension("png", &["png"]));
    }
}
