//! Folder-tree indexing and the navigation document rendered from it.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::filesystem::BODY_FILENAME;
use crate::naming::to_flat_name;

/// Folder name → subtree. An empty subtree is a leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryTree {
    children: BTreeMap<String, DirectoryTree>,
}

impl DirectoryTree {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&DirectoryTree> {
        self.children.get(key)
    }

    pub fn insert_path<S: AsRef<str>>(&mut self, parts: &[S]) {
        let mut current = self;
        for part in parts {
            current = current
                .children
                .entry(part.as_ref().to_string())
                .or_default();
        }
    }

    /// Child keys in natural order.
    pub fn sorted_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.children.keys().map(String::as_str).collect();
        keys.sort_by(|left, right| natural_order(left, right));
        keys
    }

    /// Number of nodes in the whole tree, excluding the root.
    pub fn node_count(&self) -> usize {
        self.children
            .values()
            .map(|child| 1 + child.node_count())
            .sum()
    }
}

/// Walk `root` and record every folder holding a body document, together
/// with its ancestors. The root folder itself is never a node.
pub fn build_tree(root: &Path) -> Result<DirectoryTree> {
    let mut tree = DirectoryTree::default();
    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_dir() || !entry.path().join(BODY_FILENAME).is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).with_context(|| {
            format!(
                "failed to derive relative path from {} for {}",
                root.display(),
                entry.path().display()
            )
        })?;
        let parts: Vec<String> = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().to_string())
            .collect();
        tree.insert_path(&parts);
    }
    Ok(tree)
}

/// Numeric-prefix-aware ordering: keys whose prefix (before the first `.`,
/// then before the first `_`) is all digits sort first by that number; all
/// other keys sort after them. Ties fall back to the full key.
pub fn natural_order(left: &str, right: &str) -> Ordering {
    match (numeric_prefix(left), numeric_prefix(right)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| left.cmp(right))
}

fn numeric_prefix(key: &str) -> Option<u128> {
    let head = key.split('.').next().unwrap_or(key);
    let head = head.split('_').next().unwrap_or(head);
    if head.is_empty() || !head.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    head.parse().ok()
}

pub fn display_name(folder_name: &str) -> String {
    folder_name.replace('_', " ")
}

/// Render the nested disclosure navigation. Sections shallower than
/// `expand_depth` start open.
pub fn render_presentation(tree: &DirectoryTree, separator: &str, expand_depth: usize) -> String {
    render_level(tree, separator, expand_depth, &[], 0)
}

fn render_level(
    tree: &DirectoryTree,
    separator: &str,
    expand_depth: usize,
    path_parts: &[&str],
    depth: usize,
) -> String {
    let indent = "  ".repeat(depth);
    let mut lines = Vec::new();

    for key in tree.sorted_keys() {
        let Some(subtree) = tree.get(key) else {
            continue;
        };
        let mut current_path = path_parts.to_vec();
        current_path.push(key);
        let label = display_name(key);

        if subtree.is_leaf() {
            let link = to_flat_name(&current_path, separator);
            lines.push(format!("{indent}<li><a href=\"{link}\">{label}</a></li>"));
            continue;
        }

        let open_tag = if depth < expand_depth {
            "<details open>"
        } else {
            "<details>"
        };
        lines.push(format!("{indent}{open_tag}"));
        lines.push(format!("{indent}<summary>{label}</summary>"));
        lines.push(format!("{indent}<ul>"));
        lines.push(render_level(
            subtree,
            separator,
            expand_depth,
            &current_path,
            depth + 1,
        ));
        lines.push(format!("{indent}</ul>"));
        lines.push(format!("{indent}</details>"));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    fn touch_body(root: &Path, relative: &str) {
        let dir = root.join(relative);
        fs::create_dir_all(&dir).expect("create page dir");
        fs::write(dir.join(BODY_FILENAME), "body").expect("write body");
    }

    #[test]
    fn natural_order_puts_numbers_first_by_value() {
        let mut keys = vec!["10_x", "2_x", "background"];
        keys.sort_by(|a, b| natural_order(a, b));
        assert_eq!(keys, ["2_x", "10_x", "background"]);

        let mut keys = vec!["background", "02_setup", "01_intro"];
        keys.sort_by(|a, b| natural_order(a, b));
        assert_eq!(keys, ["01_intro", "02_setup", "background"]);
    }

    #[test]
    fn natural_order_handles_dots_and_bare_numbers() {
        let mut keys = vec!["3.notes", "12", "1_a", "a1", "_x"];
        keys.sort_by(|a, b| natural_order(a, b));
        assert_eq!(keys, ["1_a", "3.notes", "12", "_x", "a1"]);
    }

    #[test]
    fn build_tree_keeps_intermediate_folders_with_materialized_descendants() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        touch_body(root, "Dev/Design");
        touch_body(root, "Dev/Design/Overview");
        touch_body(root, "Home");
        fs::create_dir_all(root.join("Empty/Nested")).expect("create empty dirs");
        fs::write(root.join("Empty/Nested/memo.md"), "x").expect("write stray file");

        let tree = build_tree(root).expect("build tree");
        assert_eq!(tree.sorted_keys(), ["Dev", "Home"]);
        let dev = tree.get("Dev").expect("dev");
        let design = dev.get("Design").expect("design");
        assert!(design.get("Overview").expect("overview").is_leaf());
        assert!(tree.get("Home").expect("home").is_leaf());
        assert!(tree.get("Empty").is_none());
        assert_eq!(tree.node_count(), 4);
    }

    #[test]
    fn render_presentation_expands_to_depth() {
        let mut tree = DirectoryTree::default();
        tree.insert_path(&["Dev", "Design", "Deep_Page"]);
        tree.insert_path(&["01_Intro"]);

        let html = render_presentation(&tree, " › ", 1);
        let expected = [
            "<li><a href=\"01_Intro\">01 Intro</a></li>",
            "<details open>",
            "<summary>Dev</summary>",
            "<ul>",
            "  <details>",
            "  <summary>Design</summary>",
            "  <ul>",
            "    <li><a href=\"Dev › Design › Deep_Page\">Deep Page</a></li>",
            "  </ul>",
            "  </details>",
            "</ul>",
            "</details>",
        ]
        .join("\n");
        assert_eq!(html, expected);
    }

    #[test]
    fn render_empty_tree_is_empty() {
        assert_eq!(render_presentation(&DirectoryTree::default(), " › ", 2), "");
    }
}
