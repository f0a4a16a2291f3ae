use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use regex::Regex;
use reqwest::Url;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::SyncConfig;
use crate::error::SyncError;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 60_000;

static PAGE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/alias/wiki/(\d+)").expect("page id pattern"));

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RemotePageSummary {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RemotePage {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RemoteAttachment {
    pub id: u64,
    pub name: String,
}

/// Remote wiki operations the reconciler depends on. Each call blocks and is
/// attempted exactly once.
pub trait WikiApi {
    fn list_pages(&mut self) -> Result<Vec<RemotePageSummary>, SyncError>;
    fn get_page(&mut self, page_id: u64) -> Result<RemotePage, SyncError>;
    fn list_attachments(&mut self, page_id: u64) -> Result<Vec<RemoteAttachment>, SyncError>;
    fn get_attachment_bytes(
        &mut self,
        page_id: u64,
        attachment_id: u64,
    ) -> Result<Vec<u8>, SyncError>;
    fn update_page(&mut self, page_id: u64, name: &str, content: &str) -> Result<(), SyncError>;
    /// Uploads into the space's attachment pool and returns the new attachment id.
    fn upload_attachment(&mut self, filename: &str, bytes: Vec<u8>) -> Result<u64, SyncError>;
    fn attach_to_page(&mut self, page_id: u64, attachment_id: u64) -> Result<(), SyncError>;
    fn page_url(&self, page_id: u64) -> String;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct BacklogClientConfig {
    pub space_url: String,
    pub api_key: String,
    pub project_key: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub upload_timeout_ms: u64,
}

impl BacklogClientConfig {
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Self::with_space(config, None)
    }

    /// Like [`Self::from_config`], but any page URL in `space_from` decides the
    /// space instead of the configured one.
    pub fn with_space(config: &SyncConfig, space_from: Option<&str>) -> Result<Self> {
        let raw_space = space_from
            .map(ToString::to_string)
            .or_else(|| config.space_url())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "space URL is required (set [remote].space_url or WIKISYNC_SPACE_URL)"
                )
            })?;
        let space_url = base_url(&raw_space)
            .ok_or_else(|| anyhow::anyhow!("invalid space URL: {raw_space}"))?;
        let api_key = config.api_key().ok_or_else(|| {
            anyhow::anyhow!("API key is required (set [remote].api_key or WIKISYNC_API_KEY)")
        })?;
        Ok(Self {
            space_url,
            api_key,
            project_key: config.project_key().unwrap_or_default(),
            user_agent: config.user_agent(),
            timeout_ms: config.timeout_ms(),
            upload_timeout_ms: config.upload_timeout_ms(),
        })
    }
}

pub struct BacklogClient {
    client: Client,
    config: BacklogClientConfig,
    request_count: usize,
}

impl BacklogClient {
    pub fn new(config: BacklogClientConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            bail!("API key must not be empty");
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .context("failed to build wiki HTTP client")?;
        Ok(Self {
            client,
            config,
            request_count: 0,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v2/{path}", self.config.space_url)
    }

    fn send(
        &mut self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, SyncError> {
        self.request_count += 1;
        let response = request
            .query(&[("apiKey", self.config.api_key.as_str())])
            .send()
            .map_err(|error| SyncError::transport(operation, describe_request_error(&error)))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(SyncError::transport(
            operation,
            format!("HTTP {status}: {}", body.trim()),
        ))
    }

    fn get_json<T: DeserializeOwned>(
        &mut self,
        operation: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SyncError> {
        let request = self.client.get(self.endpoint(path)).query(query);
        let response = self.send(operation, request)?;
        response
            .json::<T>()
            .map_err(|error| SyncError::transport(operation, format!("invalid JSON: {error}")))
    }
}

impl WikiApi for BacklogClient {
    fn list_pages(&mut self) -> Result<Vec<RemotePageSummary>, SyncError> {
        if self.config.project_key.trim().is_empty() {
            return Err(SyncError::transport(
                "list pages",
                "project key is not configured",
            ));
        }
        let project = self.config.project_key.clone();
        self.get_json("list pages", "wikis", &[("projectIdOrKey", project)])
    }

    fn get_page(&mut self, page_id: u64) -> Result<RemotePage, SyncError> {
        self.get_json("get page", &format!("wikis/{page_id}"), &[])
    }

    fn list_attachments(&mut self, page_id: u64) -> Result<Vec<RemoteAttachment>, SyncError> {
        self.get_json(
            "list attachments",
            &format!("wikis/{page_id}/attachments"),
            &[],
        )
    }

    fn get_attachment_bytes(
        &mut self,
        page_id: u64,
        attachment_id: u64,
    ) -> Result<Vec<u8>, SyncError> {
        let request = self
            .client
            .get(self.endpoint(&format!("wikis/{page_id}/attachments/{attachment_id}")));
        let response = self.send("download attachment", request)?;
        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|error| SyncError::transport("download attachment", error.to_string()))
    }

    fn update_page(&mut self, page_id: u64, name: &str, content: &str) -> Result<(), SyncError> {
        let request = self
            .client
            .patch(self.endpoint(&format!("wikis/{page_id}")))
            .form(&[("name", name), ("content", content)]);
        self.send("update page", request).map(|_| ())
    }

    fn upload_attachment(&mut self, filename: &str, bytes: Vec<u8>) -> Result<u64, SyncError> {
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(|error| SyncError::transport("upload attachment", error.to_string()))?;
        let request = self
            .client
            .post(self.endpoint("space/attachment"))
            .timeout(Duration::from_millis(self.config.upload_timeout_ms))
            .multipart(Form::new().part("file", part));
        let response = self.send("upload attachment", request)?;
        let uploaded: RemoteAttachment = response.json().map_err(|error| {
            SyncError::transport("upload attachment", format!("invalid JSON: {error}"))
        })?;
        Ok(uploaded.id)
    }

    fn attach_to_page(&mut self, page_id: u64, attachment_id: u64) -> Result<(), SyncError> {
        let request = self
            .client
            .post(self.endpoint(&format!("wikis/{page_id}/attachments")))
            .timeout(Duration::from_millis(self.config.upload_timeout_ms))
            .form(&[("attachmentId[]", attachment_id.to_string())]);
        self.send("attach to page", request).map(|_| ())
    }

    fn page_url(&self, page_id: u64) -> String {
        page_url(&self.config.space_url, page_id)
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

fn describe_request_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("timed out: {error}")
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        error.to_string()
    }
}

/// Reduce any URL to `scheme://host[:port]`. Inputs without a scheme are
/// treated as `https`.
pub fn base_url(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let parsed = Url::parse(&candidate).ok()?;
    let host = parsed.host_str()?;
    let mut base = format!("{}://{host}", parsed.scheme());
    if let Some(port) = parsed.port() {
        base.push_str(&format!(":{port}"));
    }
    Some(base)
}

pub fn page_url(space_url: &str, page_id: u64) -> String {
    format!("{}/alias/wiki/{page_id}", space_url.trim_end_matches('/'))
}

pub fn extract_page_id(url: &str) -> Option<u64> {
    PAGE_ID_RE
        .captures(url)
        .and_then(|caps| caps[1].parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_strips_path_and_adds_scheme() {
        assert_eq!(
            base_url("https://acme.backlog.com/wiki/EX/Home").as_deref(),
            Some("https://acme.backlog.com")
        );
        assert_eq!(
            base_url("acme.backlog.jp").as_deref(),
            Some("https://acme.backlog.jp")
        );
        assert_eq!(
            base_url("http://localhost:8080/alias/wiki/1").as_deref(),
            Some("http://localhost:8080")
        );
        assert_eq!(base_url("   "), None);
    }

    #[test]
    fn page_url_and_id_extraction_agree() {
        let url = page_url("https://acme.backlog.com/", 12345);
        assert_eq!(url, "https://acme.backlog.com/alias/wiki/12345");
        assert_eq!(extract_page_id(&url), Some(12345));
        assert_eq!(extract_page_id("https://acme.backlog.com/wiki/EX/Home"), None);
        assert_eq!(extract_page_id("Dev/Design"), None);
    }

    #[test]
    fn client_requires_api_key() {
        let result = BacklogClient::new(BacklogClientConfig {
            space_url: "https://acme.backlog.com".to_string(),
            api_key: " ".to_string(),
            project_key: "EX".to_string(),
            user_agent: "wikisync/test".to_string(),
            timeout_ms: 1_000,
            upload_timeout_ms: 1_000,
        });
        assert!(result.is_err());
    }

    #[test]
    fn list_pages_without_project_key_fails_without_network() {
        let mut client = BacklogClient::new(BacklogClientConfig {
            space_url: "https://acme.backlog.com".to_string(),
            api_key: "secret".to_string(),
            project_key: String::new(),
            user_agent: "wikisync/test".to_string(),
            timeout_ms: 1_000,
            upload_timeout_ms: 1_000,
        })
        .expect("client");
        let error = client.list_pages().expect_err("must fail");
        assert_eq!(error.kind(), "transport");
        assert_eq!(client.request_count(), 0);
        assert_eq!(client.page_url(9), "https://acme.backlog.com/alias/wiki/9");
    }

    #[test]
    fn page_payloads_decode_with_missing_optional_fields() {
        let page: RemotePage =
            serde_json::from_str(r#"{"id": 3, "name": "Dev/Design"}"#).expect("decode page");
        assert_eq!(page.content, "");
        let attachments: Vec<RemoteAttachment> = serde_json::from_str(
            r#"[{"id": 1, "name": "diagram 1.png", "size": 120, "createdUser": {"id": 5}}]"#,
        )
        .expect("decode attachments");
        assert_eq!(attachments[0].id, 1);
        assert_eq!(attachments[0].name, "diagram 1.png");
    }
}
