//! Everything one signed-in user works with, owned in one place.

use std::sync::{Arc, Mutex};

use crate::Config;
use crate::api::{ApiError, HttpApi, PaperApi, PdfBlob};
use crate::chat::ChatSessions;
use crate::filter::AdvancedSearchOptions;
use crate::lock;
use crate::models::{LoginResponse, Paper, PaperId, User, to_papers};
use crate::pdf_cache::PdfCache;
use crate::summaries::SummaryStore;

/// Application context: the API handle plus the per-session caches.
///
/// Logging out clears every piece of per-user state so nothing leaks into
/// the next user's session.
pub struct Session {
    api: Arc<dyn PaperApi>,
    pdfs: PdfCache,
    summaries: SummaryStore,
    chat: ChatSessions,
    user: Mutex<Option<User>>,
}

impl Session {
    pub fn new(api: Arc<dyn PaperApi>, pdf_capacity: usize) -> Self {
        Self {
            pdfs: PdfCache::new(api.clone(), pdf_capacity),
            summaries: SummaryStore::new(api.clone()),
            chat: ChatSessions::new(api.clone()),
            user: Mutex::new(None),
            api,
        }
    }

    /// Build a session talking HTTP to the configured backend.
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let api = Arc::new(HttpApi::from_config(config)?);
        Ok(Self::new(api, config.pdf_cache_capacity))
    }

    pub fn api(&self) -> &dyn PaperApi {
        self.api.as_ref()
    }

    pub fn pdfs(&self) -> &PdfCache {
        &self.pdfs
    }

    pub fn summaries(&self) -> &SummaryStore {
        &self.summaries
    }

    pub fn chat(&self) -> &ChatSessions {
        &self.chat
    }

    pub fn user(&self) -> Option<User> {
        lock(&self.user).clone()
    }

    pub fn is_authenticated(&self) -> bool {
        lock(&self.user).is_some()
    }

    /// Sign in and use the returned token for every later request.
    pub async fn login(&self, username: &str) -> Result<LoginResponse, ApiError> {
        let response = self.api.login(username).await?;
        self.api.set_access_token(Some(response.access_token.clone()));
        *lock(&self.user) = Some(response.user.clone());
        tracing::info!(user = %response.user.user_name, "logged in");
        Ok(response)
    }

    /// Drop the token and all per-user state.
    pub fn logout(&self) {
        self.api.set_access_token(None);
        let user = lock(&self.user).take();
        self.pdfs.clear();
        self.summaries.clear_all();
        self.chat.clear_all();
        if let Some(user) = user {
            tracing::info!(user = %user.user_name, "logged out");
        }
    }

    pub async fn search(
        &self,
        query: &str,
        options: Option<&AdvancedSearchOptions>,
    ) -> Result<Vec<Paper>, ApiError> {
        let dtos = self.api.search(query, options).await?;
        tracing::debug!(query, results = dtos.len(), "search finished");
        Ok(to_papers(&dtos))
    }

    pub async fn pdf(&self, paper_id: PaperId) -> Result<PdfBlob, ApiError> {
        self.pdfs.get(paper_id).await
    }
}
