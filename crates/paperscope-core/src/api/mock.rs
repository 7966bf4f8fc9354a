//! In-memory [`PaperApi`] for tests and offline runs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use super::{ApiError, ApiFuture, PaperApi, PdfBlob, SearchRequest};
use crate::filter::AdvancedSearchOptions;
use crate::lock;
use crate::models::{
    ChatMessage, LoginResponse, PaperDto, PaperId, Project, ProjectId, ProjectWithPapers, User,
};

/// A configurable PDF response for [`MockApi`].
#[derive(Clone, Debug)]
pub enum MockPdf {
    /// Serve these bytes.
    Found(Vec<u8>),
    /// Simulate a 404.
    NotFound,
    /// Simulate a transport failure.
    Error(String),
}

/// A configurable text response (summary or chat answer).
#[derive(Clone, Debug)]
pub enum MockReply {
    Text(String),
    Error(String),
}

/// Responses served in order; the last one repeats once the rest are used.
struct Sequence<T> {
    remaining: Vec<T>,
    last: T,
}

impl<T: Clone> Sequence<T> {
    fn new(mut responses: Vec<T>) -> Option<Self> {
        let last = responses.last()?.clone();
        responses.reverse();
        Some(Self {
            remaining: responses,
            last,
        })
    }

    fn next(&mut self) -> T {
        self.remaining.pop().unwrap_or_else(|| self.last.clone())
    }
}

/// A hand-rolled mock implementing [`PaperApi`].
///
/// Supports:
/// - Per-paper PDF responses, fixed or as a sequence.
/// - Search over a fixed paper list, honouring the filter tree.
/// - Per-paper summaries and a shared sequence of chat answers.
/// - Optional per-call latency.
/// - Call counting and capture of the last request bodies.
pub struct MockApi {
    papers: Vec<PaperDto>,
    pdfs: Mutex<HashMap<PaperId, Sequence<MockPdf>>>,
    summaries: Mutex<HashMap<PaperId, Sequence<MockReply>>>,
    chat_replies: Mutex<Option<Sequence<MockReply>>>,
    delay: Option<Duration>,
    pdf_calls: Mutex<HashMap<PaperId, usize>>,
    search_calls: AtomicUsize,
    summary_calls: AtomicUsize,
    last_search_body: Mutex<Option<serde_json::Value>>,
    chat_requests: Mutex<Vec<(PaperId, String, Vec<ChatMessage>)>>,
    projects: Mutex<Vec<ProjectWithPapers>>,
    next_project_id: AtomicI64,
    access_token: Mutex<Option<String>>,
}

impl Default for MockApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockApi {
    /// A mock with no papers. Unknown PDFs resolve to a small fake document.
    pub fn new() -> Self {
        Self {
            papers: Vec::new(),
            pdfs: Mutex::new(HashMap::new()),
            summaries: Mutex::new(HashMap::new()),
            chat_replies: Mutex::new(None),
            delay: None,
            pdf_calls: Mutex::new(HashMap::new()),
            search_calls: AtomicUsize::new(0),
            summary_calls: AtomicUsize::new(0),
            last_search_body: Mutex::new(None),
            chat_requests: Mutex::new(Vec::new()),
            projects: Mutex::new(Vec::new()),
            next_project_id: AtomicI64::new(1),
            access_token: Mutex::new(None),
        }
    }

    pub fn with_papers(mut self, papers: Vec<PaperDto>) -> Self {
        self.papers = papers;
        self
    }

    pub fn with_pdf(self, paper_id: PaperId, response: MockPdf) -> Self {
        self.with_pdf_sequence(paper_id, vec![response])
    }

    pub fn with_pdf_sequence(self, paper_id: PaperId, responses: Vec<MockPdf>) -> Self {
        if let Some(seq) = Sequence::new(responses) {
            lock(&self.pdfs).insert(paper_id, seq);
        }
        self
    }

    pub fn with_summary_sequence(self, paper_id: PaperId, replies: Vec<MockReply>) -> Self {
        if let Some(seq) = Sequence::new(replies) {
            lock(&self.summaries).insert(paper_id, seq);
        }
        self
    }

    pub fn with_chat_replies(self, replies: Vec<MockReply>) -> Self {
        *lock(&self.chat_replies) = Sequence::new(replies);
        self
    }

    /// Set simulated network latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Bytes served for a paper with no configured PDF response.
    pub fn default_pdf(paper_id: PaperId) -> Vec<u8> {
        format!("%PDF-1.7\n% paper {paper_id}\n%%EOF\n").into_bytes()
    }

    /// How many times `fetch_pdf` has been called for `paper_id`.
    pub fn pdf_calls(&self, paper_id: PaperId) -> usize {
        lock(&self.pdf_calls).get(&paper_id).copied().unwrap_or(0)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }

    /// JSON body of the most recent search, exactly as it would be posted.
    pub fn last_search_body(&self) -> Option<serde_json::Value> {
        lock(&self.last_search_body).clone()
    }

    /// Every chat call: paper, message and the history that accompanied it.
    pub fn chat_requests(&self) -> Vec<(PaperId, String, Vec<ChatMessage>)> {
        lock(&self.chat_requests).clone()
    }

    pub fn access_token(&self) -> Option<String> {
        lock(&self.access_token).clone()
    }

    fn finish<'a, T: Send + 'a>(&self, result: Result<T, ApiError>) -> ApiFuture<'a, T> {
        let delay = self.delay;
        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            result
        })
    }

    fn with_project<T>(
        &self,
        project_id: ProjectId,
        f: impl FnOnce(&mut ProjectWithPapers) -> T,
    ) -> Result<T, ApiError> {
        let mut projects = lock(&self.projects);
        projects
            .iter_mut()
            .find(|p| p.project.project_id == project_id)
            .map(f)
            .ok_or_else(not_found)
    }

    fn paper(&self, paper_id: PaperId) -> Option<PaperDto> {
        self.papers.iter().find(|p| p.paper_id == paper_id).cloned()
    }
}

fn not_found() -> ApiError {
    ApiError::Status {
        status: 404,
        message: "Not Found".to_string(),
    }
}

fn matches_query(paper: &PaperDto, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    paper.title.to_lowercase().contains(&query)
        || paper
            .abstract_text
            .as_deref()
            .is_some_and(|a| a.to_lowercase().contains(&query))
}

impl PaperApi for MockApi {
    fn fetch_pdf(&self, paper_id: PaperId) -> ApiFuture<'_, PdfBlob> {
        *lock(&self.pdf_calls).entry(paper_id).or_insert(0) += 1;
        let response = lock(&self.pdfs)
            .get_mut(&paper_id)
            .map(Sequence::next)
            .unwrap_or_else(|| MockPdf::Found(Self::default_pdf(paper_id)));
        let result = match response {
            MockPdf::Found(bytes) => Ok(PdfBlob::from(bytes)),
            MockPdf::NotFound => Err(not_found()),
            MockPdf::Error(msg) => Err(ApiError::Other(msg)),
        };
        self.finish(result)
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
        filter: Option<&'a AdvancedSearchOptions>,
    ) -> ApiFuture<'a, Vec<PaperDto>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let body = serde_json::to_value(SearchRequest::new(query, filter)).ok();
        *lock(&self.last_search_body) = body;

        let active = filter.filter(|options| options.is_active());
        let papers = self
            .papers
            .iter()
            .filter(|p| matches_query(p, query))
            .filter(|p| active.is_none_or(|options| options.matches(p)))
            .cloned()
            .collect();
        self.finish(Ok(papers))
    }

    fn summarize<'a>(&'a self, paper_id: PaperId, _query: &'a str) -> ApiFuture<'a, String> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        let reply = lock(&self.summaries)
            .get_mut(&paper_id)
            .map(Sequence::next)
            .unwrap_or_else(|| MockReply::Text(format!("Summary of paper {paper_id}.")));
        let result = match reply {
            MockReply::Text(text) => Ok(text),
            MockReply::Error(msg) => Err(ApiError::Other(msg)),
        };
        self.finish(result)
    }

    fn chat<'a>(
        &'a self,
        paper_id: PaperId,
        message: &'a str,
        history: &'a [ChatMessage],
    ) -> ApiFuture<'a, String> {
        lock(&self.chat_requests).push((paper_id, message.to_string(), history.to_vec()));
        let reply = lock(&self.chat_replies)
            .as_mut()
            .map(Sequence::next)
            .unwrap_or_else(|| MockReply::Text(format!("You asked: {message}")));
        let result = match reply {
            MockReply::Text(text) => Ok(text),
            MockReply::Error(msg) => Err(ApiError::Other(msg)),
        };
        self.finish(result)
    }

    fn login<'a>(&'a self, username: &'a str) -> ApiFuture<'a, LoginResponse> {
        let result = if username.trim().is_empty() {
            Err(ApiError::Unauthorized(401))
        } else {
            Ok(LoginResponse {
                access_token: format!("access-{username}"),
                refresh_token: format!("refresh-{username}"),
                token_type: "bearer".to_string(),
                user: User {
                    user_id: 1,
                    user_name: username.to_string(),
                    created_at: "2024-01-01T00:00:00".to_string(),
                },
            })
        };
        self.finish(result)
    }

    fn list_projects(&self) -> ApiFuture<'_, Vec<Project>> {
        let projects = lock(&self.projects)
            .iter()
            .map(|p| p.project.clone())
            .collect();
        self.finish(Ok(projects))
    }

    fn create_project<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Project> {
        let project = Project {
            project_id: self.next_project_id.fetch_add(1, Ordering::SeqCst),
            project_name: name.to_string(),
            created_at: "2024-01-01T00:00:00".to_string(),
        };
        lock(&self.projects).push(ProjectWithPapers {
            project: project.clone(),
            papers: Vec::new(),
        });
        self.finish(Ok(project))
    }

    fn delete_project(&self, project_id: ProjectId) -> ApiFuture<'_, ()> {
        let result = {
            let mut projects = lock(&self.projects);
            let before = projects.len();
            projects.retain(|p| p.project.project_id != project_id);
            if projects.len() < before {
                Ok(())
            } else {
                Err(not_found())
            }
        };
        self.finish(result)
    }

    fn project_papers(&self, project_id: ProjectId) -> ApiFuture<'_, ProjectWithPapers> {
        let result = self.with_project(project_id, |p| p.clone());
        self.finish(result)
    }

    fn add_paper_to_project(
        &self,
        project_id: ProjectId,
        paper_id: PaperId,
    ) -> ApiFuture<'_, ProjectWithPapers> {
        let result = match self.paper(paper_id) {
            Some(paper) => self.with_project(project_id, |p| {
                if !p.papers.iter().any(|existing| existing.paper_id == paper_id) {
                    p.papers.push(paper);
                }
                p.clone()
            }),
            None => Err(not_found()),
        };
        self.finish(result)
    }

    fn remove_paper_from_project(
        &self,
        project_id: ProjectId,
        paper_id: PaperId,
    ) -> ApiFuture<'_, ProjectWithPapers> {
        let result = self.with_project(project_id, |p| {
            p.papers.retain(|paper| paper.paper_id != paper_id);
            p.clone()
        });
        self.finish(result)
    }

    fn set_access_token(&self, token: Option<String>) {
        *lock(&self.access_token) = token;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{ConditionGroup, TextCondition, TextField};

    fn papers() -> Vec<PaperDto> {
        vec![
            PaperDto {
                paper_id: 1,
                title: "Graph Attention Networks".into(),
                abstract_text: Some("Attention over graph neighbourhoods.".into()),
                published_at: Some("2018-02-01".into()),
                ..Default::default()
            },
            PaperDto {
                paper_id: 2,
                title: "Deep Residual Learning".into(),
                abstract_text: Some("Residual connections for image recognition.".into()),
                published_at: Some("2016-06-01".into()),
                ..Default::default()
            },
        ]
    }

    #[tokio::test]
    async fn pdf_sequence_repeats_last() {
        let api = MockApi::new().with_pdf_sequence(
            5,
            vec![MockPdf::Error("boom".into()), MockPdf::Found(b"ok".to_vec())],
        );
        assert!(api.fetch_pdf(5).await.is_err());
        assert_eq!(&*api.fetch_pdf(5).await.unwrap(), b"ok");
        assert_eq!(&*api.fetch_pdf(5).await.unwrap(), b"ok");
        assert_eq!(api.pdf_calls(5), 3);
        assert_eq!(api.pdf_calls(6), 0);
    }

    #[tokio::test]
    async fn unknown_pdf_gets_default_document() {
        let api = MockApi::new();
        let blob = api.fetch_pdf(9).await.unwrap();
        assert_eq!(&*blob, MockApi::default_pdf(9).as_slice());
    }

    #[tokio::test]
    async fn search_applies_query_and_filter() {
        let api = MockApi::new().with_papers(papers());
        assert_eq!(api.search("", None).await.unwrap().len(), 2);
        assert_eq!(api.search("residual", None).await.unwrap()[0].paper_id, 2);

        let options = AdvancedSearchOptions::new(
            Some(2017),
            None,
            ConditionGroup::all(vec![
                TextCondition::contains(TextField::Abstract, "graph").into(),
            ]),
        );
        let hits = api.search("", Some(&options)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].paper_id, 1);
        assert_eq!(api.search_calls(), 3);
        let body = api.last_search_body().unwrap();
        assert_eq!(body["filter"]["year_from"], 2017);
    }

    #[tokio::test]
    async fn projects_track_papers() {
        let api = MockApi::new().with_papers(papers());
        let project = api.create_project("Reading list").await.unwrap();
        let with = api.add_paper_to_project(project.project_id, 1).await.unwrap();
        assert_eq!(with.papers.len(), 1);
        // Adding twice keeps one copy
        let with = api.add_paper_to_project(project.project_id, 1).await.unwrap();
        assert_eq!(with.papers.len(), 1);
        assert!(api.add_paper_to_project(project.project_id, 99).await.is_err());

        let with = api
            .remove_paper_from_project(project.project_id, 1)
            .await
            .unwrap();
        assert!(with.papers.is_empty());

        api.delete_project(project.project_id).await.unwrap();
        assert!(api.list_projects().await.unwrap().is_empty());
        assert!(api.delete_project(project.project_id).await.is_err());
    }

    #[tokio::test]
    async fn login_rejects_blank_username() {
        let api = MockApi::new();
        assert!(matches!(
            api.login(" ").await,
            Err(ApiError::Unauthorized(401))
        ));
        let resp = api.login("ada").await.unwrap();
        assert_eq!(resp.user.user_name, "ada");
        assert_eq!(resp.access_token, "access-ada");
    }
}
