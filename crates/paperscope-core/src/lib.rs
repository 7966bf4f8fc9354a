use std::sync::{Mutex, MutexGuard};

pub mod api;
pub mod chat;
pub mod config_file;
pub mod filter;
pub mod models;
pub mod pdf_cache;
pub mod session;
pub mod summaries;
pub mod url_state;

// Re-export for convenience
pub use api::{ApiError, HttpApi, MockApi, PaperApi, PdfBlob};
pub use chat::{CHAT_ERROR_REPLY, ChatSessions};
pub use filter::{
    AdvancedSearchOptions, ConditionGroup, FilterNode, GroupOperator, MatchOperator,
    TextCondition, TextField, deserialize_options, has_active_filters, serialize_options,
};
pub use models::{ChatMessage, ChatRole, Paper, PaperDto, PaperId, Project, ProjectId, User};
pub use pdf_cache::{DEFAULT_PDF_CACHE_CAPACITY, PdfCache};
pub use session::Session;
pub use summaries::{SummaryEntry, SummaryStatus, SummaryStore};
pub use url_state::{parse_search_query_string, search_query_string};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Lock a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Configuration for talking to the paper backend.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub api_base_url: String,
    pub timeout_secs: u64,
    pub pdf_cache_capacity: usize,
    /// Bearer token to start with, e.g. from `PAPERSCOPE_TOKEN`.
    pub access_token: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base_url", &self.api_base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("pdf_cache_capacity", &self.pdf_cache_capacity)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            pdf_cache_capacity: DEFAULT_PDF_CACHE_CAPACITY,
            access_token: None,
        }
    }
}

impl Config {
    /// Defaults overridden by whatever the config file sets.
    pub fn from_config_file(file: &config_file::ConfigFile) -> Self {
        let mut config = Self::default();
        if let Some(api) = &file.api {
            if let Some(url) = &api.base_url {
                config.api_base_url = url.clone();
            }
            if let Some(secs) = api.timeout_secs {
                config.timeout_secs = secs;
            }
        }
        if let Some(capacity) = file.cache.as_ref().and_then(|c| c.pdf_capacity) {
            config.pdf_cache_capacity = capacity;
        }
        config
    }
}
