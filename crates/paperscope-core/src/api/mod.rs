//! Client contract for the paper backend and its implementations.

pub mod http;
pub mod mock;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::{AdvancedSearchOptions, ConditionGroup};
use crate::models::{
    ChatMessage, LoginResponse, PaperDto, PaperId, Project, ProjectId, ProjectWithPapers,
};

pub use http::HttpApi;
pub use mock::{MockApi, MockPdf, MockReply};

/// Raw bytes of a PDF, shared between the cache and its callers.
pub type PdfBlob = Arc<[u8]>;

/// Boxed future returned by every [`PaperApi`] method.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Errors from a backend call. None of these are retried or cached by the
/// library; callers decide on retry and messaging.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate limited (429){}", fmt_retry_after(.retry_after))]
    RateLimited { retry_after: Option<Duration> },
    #[error("not authorized (HTTP {0})")]
    Unauthorized(u16),
    #[error("server returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("{0}")]
    Other(String),
}

fn fmt_retry_after(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(", retry after {:.1}s", d.as_secs_f64()),
        None => String::new(),
    }
}

/// The backend operations the client layer consumes.
pub trait PaperApi: Send + Sync {
    /// Download the PDF of a paper.
    fn fetch_pdf(&self, paper_id: PaperId) -> ApiFuture<'_, PdfBlob>;

    /// Run a search. `filter` is only sent when it is active.
    fn search<'a>(
        &'a self,
        query: &'a str,
        filter: Option<&'a AdvancedSearchOptions>,
    ) -> ApiFuture<'a, Vec<PaperDto>>;

    /// Summarise a paper, optionally focused by `query`.
    fn summarize<'a>(&'a self, paper_id: PaperId, query: &'a str) -> ApiFuture<'a, String>;

    /// Ask a question about a paper. `history` holds the prior turns only.
    fn chat<'a>(
        &'a self,
        paper_id: PaperId,
        message: &'a str,
        history: &'a [ChatMessage],
    ) -> ApiFuture<'a, String>;

    fn login<'a>(&'a self, username: &'a str) -> ApiFuture<'a, LoginResponse>;

    fn list_projects(&self) -> ApiFuture<'_, Vec<Project>>;

    fn create_project<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Project>;

    fn delete_project(&self, project_id: ProjectId) -> ApiFuture<'_, ()>;

    fn project_papers(&self, project_id: ProjectId) -> ApiFuture<'_, ProjectWithPapers>;

    fn add_paper_to_project(
        &self,
        project_id: ProjectId,
        paper_id: PaperId,
    ) -> ApiFuture<'_, ProjectWithPapers>;

    fn remove_paper_from_project(
        &self,
        project_id: ProjectId,
        paper_id: PaperId,
    ) -> ApiFuture<'_, ProjectWithPapers>;

    /// Bearer token sent with subsequent requests; `None` signs out.
    fn set_access_token(&self, token: Option<String>);
}

/// Body of `POST /search`.
#[derive(Debug, Serialize)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<SearchFilter<'a>>,
}

impl<'a> SearchRequest<'a> {
    /// Attach `filter` only when it constrains something.
    pub fn new(query: &'a str, filter: Option<&'a AdvancedSearchOptions>) -> Self {
        Self {
            query,
            filter: filter
                .filter(|options| options.is_active())
                .map(SearchFilter::from),
        }
    }
}

/// The backend spells the year bounds in snake case; the tree is shared
/// with the URL form.
#[derive(Debug, Serialize)]
pub struct SearchFilter<'a> {
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub root: TaggedRoot<'a>,
}

impl<'a> From<&'a AdvancedSearchOptions> for SearchFilter<'a> {
    fn from(options: &'a AdvancedSearchOptions) -> Self {
        Self {
            year_from: options.year_from,
            year_to: options.year_to,
            root: TaggedRoot::Group(&options.root),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaggedRoot<'a> {
    Group(&'a ConditionGroup),
}

#[derive(Debug, Serialize)]
pub struct SummaryRequest<'a> {
    pub paper_id: PaperId,
    pub query: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
    pub history: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ProjectCreate<'a> {
    pub project_name: &'a str,
}

/// Map a non-success status to an [`ApiError`].
pub fn check_response(resp: &reqwest::Response) -> Result<(), ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    match status.as_u16() {
        429 => {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            Err(ApiError::RateLimited { retry_after })
        }
        code @ (401 | 403) => Err(ApiError::Unauthorized(code)),
        code => Err(ApiError::Status {
            status: code,
            message: status.canonical_reason().unwrap_or("unknown").to_string(),
        }),
    }
}

/// Parse a Retry-After header value (seconds or HTTP-date).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // HTTP-date: wait a conservative fixed interval rather than parse it
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{TextCondition, TextField};

    // ── parse_retry_after ──────────────────────────────────────────────

    #[test]
    fn parse_integer_seconds() {
        assert_eq!(parse_retry_after("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_retry_after(" 3 "), Some(Duration::from_secs(3)));
    }

    #[test]
    fn parse_http_date_falls_back() {
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn parse_garbage_none() {
        assert_eq!(parse_retry_after("soon"), None);
    }

    // ── check_response ─────────────────────────────────────────────────

    fn response(status: u16) -> reqwest::Response {
        let http_resp = ::http::Response::builder().status(status).body("").unwrap();
        reqwest::Response::from(http_resp)
    }

    #[test]
    fn ok_on_200() {
        assert!(check_response(&response(200)).is_ok());
    }

    #[test]
    fn rate_limited_with_retry_after() {
        let http_resp = ::http::Response::builder()
            .status(429)
            .header("retry-after", "30")
            .body("")
            .unwrap();
        let resp = reqwest::Response::from(http_resp);
        match check_response(&resp).unwrap_err() {
            ApiError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(30)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn unauthorized_on_401_and_403() {
        assert!(matches!(
            check_response(&response(401)),
            Err(ApiError::Unauthorized(401))
        ));
        assert!(matches!(
            check_response(&response(403)),
            Err(ApiError::Unauthorized(403))
        ));
    }

    #[test]
    fn other_status_carries_reason() {
        match check_response(&response(404)).unwrap_err() {
            ApiError::Status { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Not Found");
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn rate_limited_display() {
        let err = ApiError::RateLimited {
            retry_after: Some(Duration::from_millis(1500)),
        };
        assert_eq!(err.to_string(), "rate limited (429), retry after 1.5s");
        let err = ApiError::RateLimited { retry_after: None };
        assert_eq!(err.to_string(), "rate limited (429)");
    }

    // ── request bodies ─────────────────────────────────────────────────

    #[test]
    fn search_request_omits_inactive_filter() {
        let options = AdvancedSearchOptions::default();
        let body = serde_json::to_value(SearchRequest::new("graphs", Some(&options))).unwrap();
        assert_eq!(body, serde_json::json!({ "query": "graphs" }));
    }

    #[test]
    fn search_request_uses_backend_field_names() {
        let mut options = AdvancedSearchOptions::default();
        options.year_from = Some(2019);
        options
            .root
            .push(TextCondition::contains(TextField::Abstract, "graph"));
        let body = serde_json::to_value(SearchRequest::new("gnn", Some(&options))).unwrap();
        assert_eq!(body["filter"]["year_from"], 2019);
        assert!(body["filter"]["year_to"].is_null());
        assert_eq!(body["filter"]["root"]["type"], "group");
        assert_eq!(body["filter"]["root"]["children"][0]["field"], "abstract");
    }
}
