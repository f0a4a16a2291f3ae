//! Download and upload reconciliation between the remote wiki and the local
//! mirror.
//!
//! Pages are processed one at a time in name order. A page is either
//! pending (no body document on disk) or materialized; materialized pages are
//! never fetched again. Attachments are either absent or present, decided by
//! name only. Per-page failures are recorded in the report and the run moves
//! on; only a missing wiki folder or bad settings abort a run.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::attachments::has_extension;
use crate::cancel::CancelFlag;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::filesystem::{
    BODY_FILENAME, DiskStore, LocalStore, MARKER_FILENAME, MarkedPage, display_path, scan_markers,
};
use crate::marker::SyncMarker;
use crate::naming::{PageName, sanitize_segment};
use crate::notation::{backlog_to_markdown, markdown_to_backlog};
use crate::remote::{
    BacklogClient, BacklogClientConfig, RemotePageSummary, WikiApi, extract_page_id,
};

/// Only these attachment types are pushed to the remote wiki.
pub const UPLOAD_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "svg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Pending,
    Materialized,
}

pub fn page_state(body_exists: bool) -> PageState {
    if body_exists {
        PageState::Materialized
    } else {
        PageState::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    Absent,
    Present,
}

/// Presence is a pure name check against whatever `is_present` knows about.
pub fn attachment_state<P>(name: &str, is_present: P) -> AttachmentState
where
    P: Fn(&str) -> bool,
{
    if is_present(name) {
        AttachmentState::Present
    } else {
        AttachmentState::Absent
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    Download,
    Upload,
}

impl SyncDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Upload => "upload",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncPageResult {
    pub name: String,
    pub action: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AttachmentCounts {
    pub transferred: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub direction: SyncDirection,
    pub success: bool,
    pub dry_run: bool,
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub attachments: AttachmentCounts,
    pub interrupted: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub pages: Vec<SyncPageResult>,
    pub request_count: usize,
}

impl SyncReport {
    fn new(direction: SyncDirection, dry_run: bool) -> Self {
        Self {
            direction,
            success: true,
            dry_run,
            total: 0,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            attachments: AttachmentCounts::default(),
            interrupted: false,
            warnings: Vec::new(),
            errors: Vec::new(),
            pages: Vec::new(),
            request_count: 0,
        }
    }

    fn record(&mut self, name: &str, action: &str, detail: Option<String>) {
        self.pages.push(SyncPageResult {
            name: name.to_string(),
            action: action.to_string(),
            detail,
        });
    }

    fn record_failure(&mut self, name: &str, failure: &SyncError) {
        error!("{name}: {failure}");
        self.failed += 1;
        self.errors.push(format!("{name}: {failure}"));
        self.record(name, "failed", Some(failure.kind().to_string()));
    }

    fn finish(mut self, request_count: usize) -> Self {
        self.request_count = request_count;
        self.success = self.errors.is_empty() && !self.interrupted;
        self
    }
}

struct PageOutcome {
    action: &'static str,
    detail: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    /// Page-name prefix, or the URL of a page whose name is the prefix.
    /// Leading and trailing `/` are ignored.
    pub wiki_prefix: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub target_page_id: Option<u64>,
    pub dry_run: bool,
}

pub fn download(wiki_dir: &Path, config: &SyncConfig, cancel: &CancelFlag) -> Result<SyncReport> {
    let mut client = BacklogClient::new(BacklogClientConfig::from_config(config)?)?;
    let options = DownloadOptions {
        wiki_prefix: config.wiki_prefix(),
    };
    download_with_api(wiki_dir, &options, &mut client, &mut DiskStore, cancel)
}

pub fn download_with_api<A, S>(
    wiki_dir: &Path,
    options: &DownloadOptions,
    api: &mut A,
    store: &mut S,
    cancel: &CancelFlag,
) -> Result<SyncReport>
where
    A: WikiApi,
    S: LocalStore,
{
    store
        .create_dir_all(wiki_dir)
        .with_context(|| format!("failed to prepare wiki folder {}", display_path(wiki_dir)))?;
    let mut report = SyncReport::new(SyncDirection::Download, false);

    let prefix = options
        .wiki_prefix
        .as_deref()
        .map(|raw| resolve_prefix(api, raw))
        .map(|resolved| resolved.trim_matches('/').to_string())
        .filter(|resolved| !resolved.is_empty());

    let mut pages = match api.list_pages() {
        Ok(pages) => pages,
        Err(failure) => {
            error!("failed to list remote pages: {failure}");
            report.errors.push(format!("list pages: {failure}"));
            return Ok(report.finish(api.request_count()));
        }
    };
    pages.retain(|page| {
        prefix
            .as_deref()
            .is_none_or(|prefix| page.name.starts_with(prefix))
    });
    pages.sort_by(|left, right| left.name.cmp(&right.name));
    report.total = pages.len();
    info!(
        "downloading {} page(s) into {}",
        pages.len(),
        display_path(wiki_dir)
    );

    for summary in &pages {
        if cancel.is_cancelled() {
            warn!("interrupted before {}", summary.name);
            report.interrupted = true;
            break;
        }
        match download_page(wiki_dir, summary, api, store, &mut report) {
            Ok(outcome) => {
                if outcome.action == "skipped" {
                    report.skipped += 1;
                } else {
                    report.succeeded += 1;
                }
                report.record(&summary.name, outcome.action, outcome.detail);
            }
            Err(failure) => report.record_failure(&summary.name, &failure),
        }
    }

    Ok(report.finish(api.request_count()))
}

fn resolve_prefix<A: WikiApi>(api: &mut A, raw: &str) -> String {
    let Some(page_id) = extract_page_id(raw) else {
        return raw.to_string();
    };
    match api.get_page(page_id) {
        Ok(page) => {
            info!("prefix {raw} resolved to page name {}", page.name);
            page.name
        }
        Err(failure) => {
            warn!("could not resolve prefix {raw} ({failure}); using it verbatim");
            raw.to_string()
        }
    }
}

fn download_page<A, S>(
    wiki_dir: &Path,
    summary: &RemotePageSummary,
    api: &mut A,
    store: &mut S,
    report: &mut SyncReport,
) -> Result<PageOutcome, SyncError>
where
    A: WikiApi,
    S: LocalStore,
{
    let name = PageName::parse(&summary.name)?;
    let folder = wiki_dir.join(name.relative_dir()?);
    let body_path = folder.join(BODY_FILENAME);
    if page_state(store.file_exists(&body_path)) == PageState::Materialized {
        debug!("{name}: already materialized");
        return Ok(PageOutcome {
            action: "skipped",
            detail: Some("already materialized".to_string()),
        });
    }

    store.create_dir_all(&folder)?;
    let page = api.get_page(summary.id)?;
    let marker = SyncMarker::new(api.page_url(summary.id), name.clone())?;
    store.write_file(&folder.join(MARKER_FILENAME), marker.render().as_bytes())?;

    let attachments = api.list_attachments(summary.id)?;
    for attachment in &attachments {
        let local_name = match local_attachment_name(&attachment.name) {
            Ok(local_name) => local_name,
            Err(failure) => {
                warn!("{name}: {failure}");
                report.attachments.failed += 1;
                report.errors.push(format!("{name}: {failure}"));
                continue;
            }
        };
        let is_present = |candidate: &str| store.file_exists(&folder.join(candidate));
        if attachment_state(&local_name, is_present) == AttachmentState::Present {
            debug!("{name}: attachment {local_name} already present");
            report.attachments.skipped += 1;
            continue;
        }
        let target = folder.join(&local_name);
        let fetched = api
            .get_attachment_bytes(summary.id, attachment.id)
            .and_then(|bytes| store.write_file(&target, &bytes));
        match fetched {
            Ok(()) => {
                debug!("{name}: saved attachment {local_name}");
                report.attachments.transferred += 1;
            }
            Err(failure) => {
                warn!("{name}: attachment {}: {failure}", attachment.name);
                report.attachments.failed += 1;
                report
                    .errors
                    .push(format!("{name}: attachment {}: {failure}", attachment.name));
            }
        }
    }

    store.write_file(&body_path, backlog_to_markdown(&page.content).as_bytes())?;
    info!("{name}: downloaded ({} attachment(s))", attachments.len());
    Ok(PageOutcome {
        action: "created",
        detail: None,
    })
}

/// Attachment names go through the same sanitizer as folder segments so that
/// rewritten image references in the body point at the saved file.
fn local_attachment_name(raw: &str) -> Result<String, SyncError> {
    let local = sanitize_segment(raw);
    if local.is_empty()
        || local.chars().all(|ch| ch == '.')
        || local.contains(['/', '\\'])
        || local == BODY_FILENAME
        || local == MARKER_FILENAME
    {
        return Err(SyncError::InvalidName {
            name: raw.to_string(),
            reason: "attachment name cannot be stored in a page folder",
        });
    }
    Ok(local)
}

pub fn upload(
    wiki_dir: &Path,
    config: &SyncConfig,
    dry_run: bool,
    cancel: &CancelFlag,
) -> Result<SyncReport> {
    let target_url = config.target_url();
    let target_page_id = match target_url.as_deref() {
        Some(url) => Some(
            extract_page_id(url)
                .ok_or_else(|| anyhow::anyhow!("target URL carries no page id: {url}"))?,
        ),
        None => None,
    };
    let mut client = BacklogClient::new(BacklogClientConfig::with_space(
        config,
        target_url.as_deref(),
    )?)?;
    let options = UploadOptions {
        target_page_id,
        dry_run,
    };
    upload_with_api(wiki_dir, &options, &mut client, &mut DiskStore, cancel)
}

pub fn upload_with_api<A, S>(
    wiki_dir: &Path,
    options: &UploadOptions,
    api: &mut A,
    store: &mut S,
    cancel: &CancelFlag,
) -> Result<SyncReport>
where
    A: WikiApi,
    S: LocalStore,
{
    if !store.dir_exists(wiki_dir) {
        bail!("wiki folder not found: {}", display_path(wiki_dir));
    }
    let scan = scan_markers(&*store, wiki_dir)
        .with_context(|| format!("failed to scan {}", display_path(wiki_dir)))?;
    let mut report = SyncReport::new(SyncDirection::Upload, options.dry_run);

    let mut pages = scan.pages;
    if let Some(page_id) = options.target_page_id {
        pages.retain(|page| page.marker.page_id == page_id);
        if pages.is_empty() {
            error!("no local page carries a marker for page id {page_id}");
            report
                .errors
                .push(format!("no local page carries a marker for page id {page_id}"));
            return Ok(report.finish(api.request_count()));
        }
    } else {
        for (path, reason) in &scan.unresolved {
            let label = display_path(path);
            report.total += 1;
            report.skipped += 1;
            report.warnings.push(format!("{label}: {reason}"));
            report.record(&label, "skipped", Some(reason.clone()));
        }
    }
    report.total += pages.len();
    info!(
        "{} {} page(s) from {}",
        if options.dry_run { "checking" } else { "uploading" },
        pages.len(),
        display_path(wiki_dir)
    );

    for page in &pages {
        let name = page.marker.page_name.to_string();
        if cancel.is_cancelled() {
            warn!("interrupted before {name}");
            report.interrupted = true;
            break;
        }
        match upload_page(page, options.dry_run, api, store, &mut report) {
            Ok(outcome) => {
                report.succeeded += 1;
                report.record(&name, outcome.action, outcome.detail);
            }
            Err(failure) => report.record_failure(&name, &failure),
        }
    }

    Ok(report.finish(api.request_count()))
}

fn upload_page<A, S>(
    page: &MarkedPage,
    dry_run: bool,
    api: &mut A,
    store: &mut S,
    report: &mut SyncReport,
) -> Result<PageOutcome, SyncError>
where
    A: WikiApi,
    S: LocalStore,
{
    let name = &page.marker.page_name;
    let page_id = page.marker.page_id;
    let content = store.read_to_string(&page.folder.join(BODY_FILENAME))?;
    let candidates: Vec<String> = store
        .list_files(&page.folder)?
        .into_iter()
        .filter(|file| file != BODY_FILENAME && file != MARKER_FILENAME)
        .filter(|file| has_extension(file, UPLOAD_IMAGE_EXTENSIONS))
        .collect();
    let converted = markdown_to_backlog(&content);

    if dry_run {
        info!("{name}: would update page {page_id}");
        return Ok(PageOutcome {
            action: "would_update",
            detail: (!candidates.is_empty())
                .then(|| format!("would upload {}", candidates.join(", "))),
        });
    }

    if !candidates.is_empty() {
        let remote: BTreeSet<String> = api
            .list_attachments(page_id)?
            .into_iter()
            .map(|attachment| attachment.name)
            .collect();
        for filename in &candidates {
            if attachment_state(filename, |candidate| remote.contains(candidate))
                == AttachmentState::Present
            {
                debug!("{name}: attachment {filename} already on remote");
                report.attachments.skipped += 1;
                continue;
            }
            let pushed = store
                .read_bytes(&page.folder.join(filename))
                .and_then(|bytes| api.upload_attachment(filename, bytes))
                .and_then(|attachment_id| api.attach_to_page(page_id, attachment_id));
            match pushed {
                Ok(()) => {
                    debug!("{name}: uploaded attachment {filename}");
                    report.attachments.transferred += 1;
                }
                Err(failure) => {
                    warn!("{name}: attachment {filename}: {failure}");
                    report.attachments.failed += 1;
                    report
                        .errors
                        .push(format!("{name}: attachment {filename}: {failure}"));
                }
            }
        }
    }

    api.update_page(page_id, &name.to_string(), &converted)?;
    info!("{name}: updated page {page_id}");
    Ok(PageOutcome {
        action: "updated",
        detail: None,
    })
}
