//! Wire types exchanged with the paper backend, plus the flattened view
//! models the front ends render.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Backend identifier of a paper.
pub type PaperId = i64;

/// Backend identifier of a project.
pub type ProjectId = i64;

/// A paper as returned by the search and project endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperDto {
    pub paper_id: PaperId,
    pub title: String,
    /// The backend sends either a list of names or an object keyed by
    /// position (`{"0": "...", "1": "..."}`); both land here in order.
    #[serde(default, deserialize_with = "deserialize_authors")]
    pub authors: Vec<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
}

impl PaperDto {
    /// Year component of `published_at` (`YYYY-MM-DD` or a full timestamp).
    pub fn published_year(&self) -> Option<i32> {
        self.published_at
            .as_deref()
            .and_then(|date| date.get(..4))
            .and_then(|year| year.parse().ok())
    }
}

fn deserialize_authors<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Authors {
        List(Vec<String>),
        Map(BTreeMap<String, String>),
    }

    Ok(match Option::<Authors>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Authors::List(names)) => names,
        Some(Authors::Map(map)) => {
            // Positional keys sort numerically ("10" after "9"); anything
            // else keeps its lexical order at the end.
            let mut entries: Vec<(String, String)> = map.into_iter().collect();
            entries.sort_by_key(|(key, _)| key.parse::<usize>().unwrap_or(usize::MAX));
            entries.into_iter().map(|(_, name)| name).collect()
        }
    })
}

/// Flattened paper used by list views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paper {
    pub paper_id: PaperId,
    pub title: String,
    /// Authors joined with `", "`; empty when unknown.
    pub author: String,
    /// Publication year, `0` when unknown.
    pub year: i32,
    pub abstract_text: Option<String>,
}

impl From<&PaperDto> for Paper {
    fn from(dto: &PaperDto) -> Self {
        Self {
            paper_id: dto.paper_id,
            title: dto.title.clone(),
            author: dto.authors.join(", "),
            year: dto.published_year().unwrap_or(0),
            abstract_text: dto.abstract_text.clone(),
        }
    }
}

/// Map a batch of DTOs to view models.
pub fn to_papers(dtos: &[PaperDto]) -> Vec<Paper> {
    dtos.iter().map(Paper::from).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub papers: Vec<PaperDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: ProjectId,
    pub project_name: String,
    pub created_at: String,
}

impl Project {
    /// Date part of `created_at`, as shown in the project sidebar.
    pub fn created_date(&self) -> &str {
        self.created_at
            .split_once('T')
            .map_or(self.created_at.as_str(), |(date, _)| date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectWithPapers {
    pub project: Project,
    #[serde(default)]
    pub papers: Vec<PaperDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub user_name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub user: User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of a paper chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}
