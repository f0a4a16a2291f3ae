//! Line-oriented conversion between the remote wiki markup and Markdown.
//!
//! Only two constructs are rewritten: list items and image references.
//!
//! | construct | remote (`Backlog`)  | local (`Markdown`)  |
//! |-----------|---------------------|---------------------|
//! | list      | `*`, `**`, `***`    | `- `, `  - `, …     |
//! | image     | `![alt][file]`      | `![alt](file)`      |
//!
//! Everything else passes through untouched. Neither direction is a parser:
//! brackets nested inside `alt` or the target are not handled and give
//! unspecified output.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::naming::sanitize_segment;

static BRACKET_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\[([^\]]+)\]").expect("bracket image pattern"));
static PAREN_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").expect("paren image pattern"));
static STAR_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\*+)\s").expect("star list pattern"));
static DASH_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)-\s").expect("dash list pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Backlog,
    Markdown,
}

impl Dialect {
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        if value.eq_ignore_ascii_case("backlog") {
            return Ok(Self::Backlog);
        }
        if value.eq_ignore_ascii_case("markdown") || value.eq_ignore_ascii_case("md") {
            return Ok(Self::Markdown);
        }
        anyhow::bail!("unsupported dialect: {value} (expected backlog|markdown)")
    }
}

/// Convert `content` into the `target` dialect.
pub fn convert(content: &str, target: Dialect) -> String {
    match target {
        Dialect::Markdown => backlog_to_markdown(content),
        Dialect::Backlog => markdown_to_backlog(content),
    }
}

/// Remote markup to Markdown. Image targets are sanitized the same way
/// attachment files are when they are written next to the page.
pub fn backlog_to_markdown(content: &str) -> String {
    let content = BRACKET_IMAGE_RE.replace_all(content, |caps: &Captures<'_>| {
        format!("![{}]({})", &caps[1], sanitize_segment(&caps[2]))
    });
    map_lines(&content, star_item_to_dash)
}

/// Markdown to remote markup. Image targets are kept verbatim.
pub fn markdown_to_backlog(content: &str) -> String {
    let content = PAREN_IMAGE_RE.replace_all(content, "![$1][$2]");
    map_lines(&content, dash_item_to_star)
}

fn map_lines(content: &str, convert_line: fn(&str) -> Option<String>) -> String {
    content
        .split('\n')
        .map(|line| convert_line(line).unwrap_or_else(|| line.to_string()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `**␠item` → two spaces per level beyond the first, then `- item`.
fn star_item_to_dash(line: &str) -> Option<String> {
    let caps = STAR_ITEM_RE.captures(line)?;
    let stars = caps[1].len();
    let rest = &line[caps.get(0)?.end()..];
    Some(format!("{}- {rest}", "  ".repeat(stars - 1)))
}

/// Indented `- item` → one star per two columns of indent, plus one.
/// Odd indentation rounds down.
fn dash_item_to_star(line: &str) -> Option<String> {
    let caps = DASH_ITEM_RE.captures(line)?;
    let indent = caps[1].chars().count();
    let rest = &line[caps.get(0)?.end()..];
    Some(format!("{} {rest}", "*".repeat(indent / 2 + 1)))
}
