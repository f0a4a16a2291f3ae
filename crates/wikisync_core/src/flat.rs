//! Export of the local mirror into a single-folder wiki (GitHub wiki layout).
//!
//! Every materialized page becomes `<flat name>.md` in the output folder, its
//! images are copied alongside under collision-free names, and `_Sidebar.md`
//! carries the folder hierarchy as nested disclosure sections.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::attachments::{AttachmentSequence, flatten, has_extension};
use crate::cancel::CancelFlag;
use crate::error::SyncError;
use crate::filesystem::{BODY_FILENAME, display_path};
use crate::naming::to_flat_name;
use crate::tree::{build_tree, render_presentation};

pub const SIDEBAR_FILENAME: &str = "_Sidebar.md";
pub const FLAT_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg"];
/// Hand-maintained pages the clean step never touches.
pub const PRESERVED_PAGES: &[&str] = &["_Sidebar.md", "Home.md", "_Footer.md", "_Header.md"];

#[derive(Debug, Clone)]
pub struct FlatOptions {
    pub separator: String,
    pub expand_level: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlatPageResult {
    pub name: String,
    pub source: String,
    pub action: String,
    pub images: usize,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlatReport {
    pub success: bool,
    pub input_dir: String,
    pub output_dir: String,
    pub removed_files: usize,
    pub sidebar_entries: usize,
    pub pages_written: usize,
    pub images_copied: usize,
    pub failed: usize,
    pub interrupted: bool,
    pub errors: Vec<String>,
    pub pages: Vec<FlatPageResult>,
}

pub fn build_flat_wiki(
    input_dir: &Path,
    output_dir: &Path,
    options: &FlatOptions,
    sequence: &mut AttachmentSequence,
    cancel: &CancelFlag,
) -> Result<FlatReport> {
    if options.separator.is_empty() || options.separator.contains(['/', '\\']) {
        bail!("flat separator must be non-empty and must not contain a path separator");
    }
    if !input_dir.is_dir() {
        bail!(
            "wiki folder not found: {} (run `wikisync download` first)",
            display_path(input_dir)
        );
    }
    if !output_dir.is_dir() {
        bail!(
            "output folder not found: {} (clone the target wiki repository there first)",
            display_path(output_dir)
        );
    }
    let input_canonical = fs::canonicalize(input_dir)
        .with_context(|| format!("failed to resolve {}", display_path(input_dir)))?;
    let output_canonical = fs::canonicalize(output_dir)
        .with_context(|| format!("failed to resolve {}", display_path(output_dir)))?;
    if input_canonical == output_canonical {
        bail!("output folder must differ from the wiki folder");
    }

    let mut report = FlatReport {
        success: true,
        input_dir: display_path(input_dir),
        output_dir: display_path(output_dir),
        removed_files: 0,
        sidebar_entries: 0,
        pages_written: 0,
        images_copied: 0,
        failed: 0,
        interrupted: false,
        errors: Vec::new(),
        pages: Vec::new(),
    };

    report.removed_files = clean_output(output_dir)?;

    let tree = build_tree(input_dir)?;
    let sidebar = render_presentation(&tree, &options.separator, options.expand_level);
    let sidebar_path = output_dir.join(SIDEBAR_FILENAME);
    fs::write(&sidebar_path, sidebar)
        .with_context(|| format!("failed to write {}", display_path(&sidebar_path)))?;
    report.sidebar_entries = tree.node_count();
    info!("wrote {SIDEBAR_FILENAME} ({} entries)", report.sidebar_entries);

    for folder in page_folders(input_dir)? {
        if cancel.is_cancelled() {
            warn!("interrupted before {}", display_path(&folder));
            report.interrupted = true;
            break;
        }
        let relative = folder.strip_prefix(input_dir).with_context(|| {
            format!(
                "failed to derive relative path from {} for {}",
                display_path(input_dir),
                display_path(&folder)
            )
        })?;
        let parts: Vec<String> = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().to_string())
            .collect();
        let flat_name = to_flat_name(&parts, &options.separator);
        let source = display_path(relative);

        match export_page(&folder, output_dir, &flat_name, sequence) {
            Ok(images) => {
                debug!("{flat_name}: written with {images} image(s)");
                report.pages_written += 1;
                report.images_copied += images;
                report.pages.push(FlatPageResult {
                    name: flat_name,
                    source,
                    action: "written".to_string(),
                    images,
                    detail: None,
                });
            }
            Err(failure) => {
                error!("{flat_name}: {failure}");
                report.failed += 1;
                report.errors.push(format!("{flat_name}: {failure}"));
                report.pages.push(FlatPageResult {
                    name: flat_name,
                    source,
                    action: "failed".to_string(),
                    images: 0,
                    detail: Some(failure.kind().to_string()),
                });
            }
        }
    }

    report.success = report.errors.is_empty() && !report.interrupted;
    info!(
        "flat export: {} page(s), {} image(s)",
        report.pages_written, report.images_copied
    );
    Ok(report)
}

/// Remove what a previous export produced: an `images/` folder, loose image
/// files, and every `.md` file except the preserved pages. Returns the number
/// of removed entries.
pub fn clean_output(output_dir: &Path) -> Result<usize> {
    let mut removed = 0;
    let images_dir = output_dir.join("images");
    if images_dir.is_dir() {
        fs::remove_dir_all(&images_dir)
            .with_context(|| format!("failed to remove {}", display_path(&images_dir)))?;
        removed += 1;
    }

    let entries = fs::read_dir(output_dir)
        .with_context(|| format!("failed to read {}", display_path(output_dir)))?;
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read {}", display_path(output_dir)))?;
        if !entry.file_type().is_ok_and(|kind| kind.is_file()) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let stale = has_extension(&name, FLAT_IMAGE_EXTENSIONS)
            || (name.ends_with(".md") && !PRESERVED_PAGES.contains(&name.as_str()));
        if stale {
            fs::remove_file(entry.path())
                .with_context(|| format!("failed to remove {}", display_path(&entry.path())))?;
            removed += 1;
        }
    }
    if removed > 0 {
        info!("removed {removed} stale file(s) from {}", display_path(output_dir));
    }
    Ok(removed)
}

/// Drop a leading `# ` heading and the blank lines after it.
pub fn strip_leading_title(content: &str) -> String {
    let mut lines: Vec<&str> = content.split('\n').collect();
    if !lines.first().is_some_and(|line| line.starts_with("# ")) {
        return content.to_string();
    }
    lines.remove(0);
    let first_text = lines
        .iter()
        .position(|line| !line.trim().is_empty())
        .unwrap_or(lines.len());
    lines[first_text..].join("\n")
}

/// Point `](original)` references at the renamed file.
pub fn rewrite_reference(content: &str, original: &str, renamed: &str) -> String {
    content.replace(&format!("]({original})"), &format!("]({renamed})"))
}

fn page_folders(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut folders = Vec::new();
    for entry in WalkDir::new(input_dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("failed to walk {}", display_path(input_dir)))?;
        if entry.file_type().is_dir() && entry.path().join(BODY_FILENAME).is_file() {
            folders.push(entry.into_path());
        }
    }
    Ok(folders)
}

fn export_page(
    folder: &Path,
    output_dir: &Path,
    flat_name: &str,
    sequence: &mut AttachmentSequence,
) -> Result<usize, SyncError> {
    let body_path = folder.join(BODY_FILENAME);
    let body = fs::read_to_string(&body_path)
        .map_err(|error| SyncError::filesystem(&body_path, error))?;
    let mut content = strip_leading_title(&body);

    let mut images = Vec::new();
    let entries = fs::read_dir(folder).map_err(|error| SyncError::filesystem(folder, error))?;
    for entry in entries {
        let entry = entry.map_err(|error| SyncError::filesystem(folder, error))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type().is_ok_and(|kind| kind.is_file())
            && has_extension(&name, FLAT_IMAGE_EXTENSIONS)
        {
            images.push(name);
        }
    }
    images.sort();

    for original in &images {
        let renamed = flatten(flat_name, original, sequence.next_index());
        let source = folder.join(original);
        let target = output_dir.join(&renamed);
        fs::copy(&source, &target).map_err(|error| SyncError::filesystem(&target, error))?;
        content = rewrite_reference(&content, original, &renamed);
    }

    let page_path = output_dir.join(format!("{flat_name}.md"));
    fs::write(&page_path, content).map_err(|error| SyncError::filesystem(&page_path, error))?;
    Ok(images.len())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::*;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(path, content).expect("write file");
    }

    fn options() -> FlatOptions {
        FlatOptions {
            separator: " › ".to_string(),
            expand_level: 2,
        }
    }

    #[test]
    fn strip_leading_title_removes_heading_and_blank_lines() {
        assert_eq!(strip_leading_title("# Title\n\n\nBody\n"), "Body\n");
        assert_eq!(strip_leading_title("## Sub\nBody"), "## Sub\nBody");
        assert_eq!(strip_leading_title("Intro\n# Later"), "Intro\n# Later");
        assert_eq!(strip_leading_title("# Only"), "");
    }

    #[test]
    fn rewrite_reference_only_touches_link_targets() {
        let content = "![a](diagram_1.png) and diagram_1.png";
        assert_eq!(
            rewrite_reference(content, "diagram_1.png", "img_x_001.png"),
            "![a](img_x_001.png) and diagram_1.png"
        );
    }

    #[test]
    fn clean_output_keeps_preserved_pages_and_other_files() {
        let temp = tempdir().expect("tempdir");
        let out = temp.path();
        write_file(&out.join("Home.md"), "home");
        write_file(&out.join("_Footer.md"), "footer");
        write_file(&out.join("Old Page.md"), "old");
        write_file(&out.join("img_1.PNG"), "img");
        write_file(&out.join("images/a.png"), "img");
        write_file(&out.join("README.txt"), "keep");

        let removed = clean_output(out).expect("clean");
        assert_eq!(removed, 3);
        assert!(out.join("Home.md").is_file());
        assert!(out.join("_Footer.md").is_file());
        assert!(out.join("README.txt").is_file());
        assert!(!out.join("Old Page.md").exists());
        assert!(!out.join("img_1.PNG").exists());
        assert!(!out.join("images").exists());
    }

    #[test]
    fn build_flat_wiki_exports_pages_images_and_sidebar() {
        let temp = tempdir().expect("tempdir");
        let wiki = temp.path().join("Wiki");
        let out = temp.path().join("site.wiki");
        fs::create_dir_all(&out).expect("create output");
        write_file(
            &wiki.join("Dev/Design/index.md"),
            "# Design\n\n- item\n![d](diagram_1.png)\n",
        );
        write_file(&wiki.join("Dev/Design/diagram_1.png"), "png-1");
        write_file(&wiki.join("Dev/Design/memo.md"), "marker");
        write_file(&wiki.join("Dev/Design/Overview/index.md"), "![o](shot.JPG)\n");
        write_file(&wiki.join("Dev/Design/Overview/shot.JPG"), "jpg");
        write_file(&out.join("Stale.md"), "stale");

        let mut sequence = AttachmentSequence::new();
        let report =
            build_flat_wiki(&wiki, &out, &options(), &mut sequence, &CancelFlag::new())
                .expect("build");

        assert!(report.success);
        assert_eq!(report.pages_written, 2);
        assert_eq!(report.images_copied, 2);
        assert_eq!(report.removed_files, 1);
        assert_eq!(sequence.issued(), 2);
        assert!(!out.join("Stale.md").exists());

        let first_image = flatten("Dev › Design", "diagram_1.png", 1);
        let second_image = flatten("Dev › Design › Overview", "shot.JPG", 2);
        assert!(second_image.ends_with("_002.jpg"));
        let design = fs::read_to_string(out.join("Dev › Design.md")).expect("read page");
        assert_eq!(design, format!("- item\n![d]({first_image})\n"));
        let overview =
            fs::read_to_string(out.join("Dev › Design › Overview.md")).expect("read page");
        assert_eq!(overview, format!("![o]({second_image})\n"));
        assert_eq!(
            fs::read_to_string(out.join(&first_image)).expect("read image"),
            "png-1"
        );

        let sidebar = fs::read_to_string(out.join(SIDEBAR_FILENAME)).expect("read sidebar");
        assert!(sidebar.starts_with("<details open>\n<summary>Dev</summary>"));
        assert!(sidebar.contains("<li><a href=\"Dev › Design › Overview\">Overview</a></li>"));
    }

    #[test]
    fn build_flat_wiki_requires_existing_output() {
        let temp = tempdir().expect("tempdir");
        let wiki = temp.path().join("Wiki");
        fs::create_dir_all(&wiki).expect("create wiki");
        let error = build_flat_wiki(
            &wiki,
            &temp.path().join("missing"),
            &options(),
            &mut AttachmentSequence::new(),
            &CancelFlag::new(),
        )
        .expect_err("must fail");
        assert!(error.to_string().contains("output folder not found"));
    }

    #[test]
    fn build_flat_wiki_rejects_same_input_and_output() {
        let temp = tempdir().expect("tempdir");
        let wiki = temp.path().join("Wiki");
        fs::create_dir_all(&wiki).expect("create wiki");
        let error = build_flat_wiki(
            &wiki,
            &wiki,
            &options(),
            &mut AttachmentSequence::new(),
            &CancelFlag::new(),
        )
        .expect_err("must fail");
        assert!(error.to_string().contains("must differ"));
    }
}
