//! The two-line marker stored beside every materialized page.
//!
//! ```text
//! https://space.example.com/alias/wiki/12345
//! Dev/Design/01 Overview
//! ```
//!
//! Line one is the canonical page URL carrying the numeric page id; line two
//! is the original, unsanitized page name.

use std::path::Path;

use crate::error::SyncError;
use crate::naming::PageName;
use crate::remote::extract_page_id;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMarker {
    pub url: String,
    pub page_id: u64,
    pub page_name: PageName,
}

impl SyncMarker {
    pub fn new(url: String, page_name: PageName) -> Result<Self, SyncError> {
        let page_id = extract_page_id(&url).ok_or_else(|| SyncError::InvalidName {
            name: page_name.to_string(),
            reason: "canonical URL carries no page id",
        })?;
        Ok(Self {
            url,
            page_id,
            page_name,
        })
    }

    pub fn render(&self) -> String {
        format!("{}\n{}\n", self.url, self.page_name)
    }

    /// `path` is only used for diagnostics.
    pub fn parse(content: &str, path: &Path) -> Result<Self, SyncError> {
        let lines: Vec<&str> = content.lines().collect();
        if lines.len() < 2 {
            return Err(SyncError::marker(
                path,
                format!("expected 2 lines, found {}", lines.len()),
            ));
        }
        let url = lines[0].trim();
        let raw_name = lines[1].trim();
        let page_id = extract_page_id(url)
            .ok_or_else(|| SyncError::marker(path, format!("no page id in URL {url:?}")))?;
        let page_name = PageName::parse(raw_name)
            .map_err(|error| SyncError::marker(path, error.to_string()))?;
        Ok(Self {
            url: url.to_string(),
            page_id,
            page_name,
        })
    }
}
