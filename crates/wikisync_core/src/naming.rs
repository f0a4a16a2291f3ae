//! Page-name codec: hierarchical page names to folder paths and flat names.
//!
//! A page name such as `Dev/Design/01 Overview` is split on `/` into segments.
//! Each segment becomes one folder after sanitization (spaces to `_`, the
//! characters `< > : " | ? *` dropped). Sanitization is one-way: a folder name
//! alone cannot tell `a b` from `a_b`, or `a?b` from `ab`. The marker file
//! written next to each materialized page keeps the original name, and that is
//! the only way back.

use std::fmt;
use std::path::PathBuf;

use crate::error::SyncError;

pub const DEFAULT_SEPARATOR: &str = " › ";

const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Ordered, non-empty sequence of page-name segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageName {
    segments: Vec<String>,
}

impl PageName {
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        if raw.is_empty() {
            return Err(SyncError::InvalidName {
                name: raw.to_string(),
                reason: "page name is empty",
            });
        }
        let segments = segments(raw);
        if segments.iter().any(String::is_empty) {
            return Err(SyncError::InvalidName {
                name: raw.to_string(),
                reason: "page name contains an empty segment",
            });
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Sanitized folder path relative to the wiki root.
    ///
    /// Fails when a segment sanitizes down to nothing or to a dot-only name,
    /// since that would either collapse into the parent folder or escape it.
    pub fn relative_dir(&self) -> Result<PathBuf, SyncError> {
        let mut path = PathBuf::new();
        for segment in &self.segments {
            let folder = sanitize_segment(segment);
            if folder.is_empty() || folder.chars().all(|ch| ch == '.') {
                return Err(SyncError::InvalidName {
                    name: self.to_string(),
                    reason: "segment is empty or dot-only after sanitization",
                });
            }
            path.push(folder);
        }
        Ok(path)
    }
}

impl fmt::Display for PageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

pub fn segments(page_name: &str) -> Vec<String> {
    page_name.split('/').map(ToString::to_string).collect()
}

/// Folder-safe form of one segment. Also used for attachment filenames, so the
/// in-body references rewritten by the notation converter match what lands on
/// disk.
pub fn sanitize_segment(raw: &str) -> String {
    raw.chars()
        .filter(|ch| !FORBIDDEN_CHARS.contains(ch))
        .map(|ch| if ch == ' ' { '_' } else { ch })
        .collect()
}

pub fn to_flat_name<S: AsRef<str>>(segments: &[S], separator: &str) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_split_on_slash() {
        assert_eq!(segments("Dev/Design/Overview"), ["Dev", "Design", "Overview"]);
        assert_eq!(segments("Single"), ["Single"]);
    }

    #[test]
    fn sanitize_replaces_spaces_and_strips_forbidden() {
        assert_eq!(sanitize_segment("01 Overview"), "01_Overview");
        assert_eq!(sanitize_segment("a<b>c:d\"e|f?g*h"), "abcdefgh");
        assert_eq!(sanitize_segment("diagram 1.png"), "diagram_1.png");
        assert_eq!(sanitize_segment("設計書 v2"), "設計書_v2");
    }

    #[test]
    fn parse_rejects_empty_names_and_segments() {
        let error = PageName::parse("").expect_err("empty must fail");
        assert_eq!(error.kind(), "invalid_name");
        assert!(PageName::parse("Dev//Design").is_err());
        assert!(PageName::parse("Dev/").is_err());
    }

    #[test]
    fn single_segment_maps_to_single_folder() {
        let name = PageName::parse("Home").expect("parse");
        assert_eq!(name.relative_dir().expect("dir"), PathBuf::from("Home"));
        assert_eq!(name.segments(), ["Home"]);
    }

    #[test]
    fn relative_dir_nests_sanitized_segments() {
        let name = PageName::parse("Dev/Design Docs/01 Overview").expect("parse");
        assert_eq!(
            name.relative_dir().expect("dir"),
            PathBuf::from("Dev").join("Design_Docs").join("01_Overview")
        );
    }

    #[test]
    fn relative_dir_rejects_traversal_segments() {
        let name = PageName::parse("Dev/../secrets").expect("parse");
        assert!(name.relative_dir().is_err());
        let name = PageName::parse("Dev/???").expect("parse");
        assert!(name.relative_dir().is_err());
    }

    #[test]
    fn flat_name_joins_raw_segments() {
        let name = PageName::parse("Dev/Design Docs").expect("parse");
        assert_eq!(
            to_flat_name(name.segments(), DEFAULT_SEPARATOR),
            "Dev › Design Docs"
        );
        assert_eq!(to_flat_name(&["a", "b", "c"], "--"), "a--b--c");
    }

    #[test]
    fn clean_names_survive_folder_and_flat_mapping() {
        let name = PageName::parse("Dev/Design/Overview").expect("parse");
        let dir = name.relative_dir().expect("dir");
        let folders: Vec<String> = dir
            .components()
            .map(|component| component.as_os_str().to_string_lossy().to_string())
            .collect();
        assert_eq!(folders, name.segments());
        assert_eq!(
            to_flat_name(&folders, " › "),
            to_flat_name(name.segments(), " › ")
        );
    }

    #[test]
    fn ordering_is_segment_wise() {
        let mut names = vec![
            PageName::parse("Dev/Design/Overview").expect("parse"),
            PageName::parse("Dev").expect("parse"),
            PageName::parse("Dev/Design").expect("parse"),
            PageName::parse("Alpha/Zeta").expect("parse"),
        ];
        names.sort();
        let rendered: Vec<String> = names.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            ["Alpha/Zeta", "Dev", "Dev/Design", "Dev/Design/Overview"]
        );
    }
}
