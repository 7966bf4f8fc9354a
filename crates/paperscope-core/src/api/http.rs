use std::sync::RwLock;
use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;

use super::{
    ApiError, ApiFuture, ChatRequest, ChatResponse, LoginRequest, PaperApi, PdfBlob,
    ProjectCreate, SearchRequest, SummaryRequest, SummaryResponse, check_response,
};
use crate::Config;
use crate::filter::AdvancedSearchOptions;
use crate::models::{
    ChatMessage, LoginResponse, PaperDto, PaperId, Project, ProjectId, ProjectWithPapers,
    SearchResponse,
};

/// [`PaperApi`] over HTTP with `reqwest`.
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    access_token: RwLock<Option<String>>,
}

impl HttpApi {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            timeout,
            access_token: RwLock::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("paperscope/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let api = Self::new(
            client,
            config.api_base_url.clone(),
            Duration::from_secs(config.timeout_secs),
        );
        api.set_access_token(config.access_token.clone());
        Ok(api)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        tracing::debug!(%method, %url, "api request");
        let builder = self.client.request(method, url).timeout(self.timeout);
        let token = self
            .access_token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let resp = builder.send().await?;
        check_response(&resp)?;
        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let resp = self.send(builder).await?;
        Ok(resp.json::<T>().await?)
    }
}

impl PaperApi for HttpApi {
    fn fetch_pdf(&self, paper_id: PaperId) -> ApiFuture<'_, PdfBlob> {
        Box::pin(async move {
            let builder = self.request(Method::GET, &format!("/papers/{paper_id}/pdf"));
            let resp = self.send(builder).await?;
            let bytes = resp.bytes().await?;
            Ok(PdfBlob::from(bytes.as_ref()))
        })
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
        filter: Option<&'a AdvancedSearchOptions>,
    ) -> ApiFuture<'a, Vec<PaperDto>> {
        Box::pin(async move {
            let body = SearchRequest::new(query, filter);
            let builder = self.request(Method::POST, "/search").json(&body);
            let response: SearchResponse = self.send_json(builder).await?;
            Ok(response.papers)
        })
    }

    fn summarize<'a>(&'a self, paper_id: PaperId, query: &'a str) -> ApiFuture<'a, String> {
        Box::pin(async move {
            let body = SummaryRequest { paper_id, query };
            let builder = self
                .request(Method::POST, &format!("/papers/{paper_id}/summary"))
                .json(&body);
            let response: SummaryResponse = self.send_json(builder).await?;
            Ok(response.summary)
        })
    }

    fn chat<'a>(
        &'a self,
        paper_id: PaperId,
        message: &'a str,
        history: &'a [ChatMessage],
    ) -> ApiFuture<'a, String> {
        Box::pin(async move {
            let body = ChatRequest { message, history };
            let builder = self
                .request(Method::POST, &format!("/papers/{paper_id}/chat"))
                .json(&body);
            let response: ChatResponse = self.send_json(builder).await?;
            Ok(response.answer)
        })
    }

    fn login<'a>(&'a self, username: &'a str) -> ApiFuture<'a, LoginResponse> {
        Box::pin(async move {
            let builder = self
                .request(Method::POST, "/auth/login")
                .json(&LoginRequest { username });
            self.send_json(builder).await
        })
    }

    fn list_projects(&self) -> ApiFuture<'_, Vec<Project>> {
        Box::pin(async move { self.send_json(self.request(Method::GET, "/projects")).await })
    }

    fn create_project<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Project> {
        Box::pin(async move {
            let builder = self
                .request(Method::POST, "/projects")
                .json(&ProjectCreate { project_name: name });
            self.send_json(builder).await
        })
    }

    fn delete_project(&self, project_id: ProjectId) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            let builder = self.request(Method::DELETE, &format!("/projects/{project_id}"));
            self.send(builder).await?;
            Ok(())
        })
    }

    fn project_papers(&self, project_id: ProjectId) -> ApiFuture<'_, ProjectWithPapers> {
        Box::pin(async move {
            let builder = self.request(Method::GET, &format!("/projects/{project_id}/papers"));
            self.send_json(builder).await
        })
    }

    fn add_paper_to_project(
        &self,
        project_id: ProjectId,
        paper_id: PaperId,
    ) -> ApiFuture<'_, ProjectWithPapers> {
        Box::pin(async move {
            let builder = self.request(
                Method::POST,
                &format!("/projects/{project_id}/papers/{paper_id}"),
            );
            self.send_json(builder).await
        })
    }

    fn remove_paper_from_project(
        &self,
        project_id: ProjectId,
        paper_id: PaperId,
    ) -> ApiFuture<'_, ProjectWithPapers> {
        Box::pin(async move {
            let builder = self.request(
                Method::DELETE,
                &format!("/projects/{project_id}/papers/{paper_id}"),
            );
            self.send_json(builder).await
        })
    }

    fn set_access_token(&self, token: Option<String>) {
        let mut slot = self
            .access_token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = token;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let api = HttpApi::new(
            reqwest::Client::new(),
            "http://localhost:8000/",
            Duration::from_secs(5),
        );
        assert_eq!(api.base_url(), "http://localhost:8000");
        assert_eq!(api.url("/search"), "http://localhost:8000/search");
    }

    #[test]
    fn token_is_attached_as_bearer() {
        let api = HttpApi::new(
            reqwest::Client::new(),
            "http://localhost:8000",
            Duration::from_secs(5),
        );
        api.set_access_token(Some("abc".into()));
        let req = api.request(Method::GET, "/projects").build().unwrap();
        assert_eq!(
            req.headers().get("authorization").unwrap(),
            "Bearer abc"
        );

        api.set_access_token(None);
        let req = api.request(Method::GET, "/projects").build().unwrap();
        assert!(req.headers().get("authorization").is_none());
    }

    #[test]
    fn from_config_carries_token_and_timeout() {
        let config = Config {
            api_base_url: "https://api.example.org".into(),
            access_token: Some("tok".into()),
            timeout_secs: 7,
            ..Config::default()
        };
        let api = HttpApi::from_config(&config).unwrap();
        let req = api.request(Method::GET, "/papers/1/pdf").build().unwrap();
        assert_eq!(req.url().as_str(), "https://api.example.org/papers/1/pdf");
        assert_eq!(req.timeout(), Some(&Duration::from_secs(7)));
        assert_eq!(req.headers().get("authorization").unwrap(), "Bearer tok");
    }
}
