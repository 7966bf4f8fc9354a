//! Advanced search filters.
//!
//! A filter is a tree of text conditions combined by AND/OR groups, plus
//! optional publication-year bounds. The tree travels in two forms:
//!
//! - as the `filter` object of a search request (see [`crate::api`]);
//! - as a single URL query value: compact JSON, percent-encoded.
//!
//! Decoding the URL form is best-effort. A value that fails to decode,
//! fails to parse, or lacks the `root` group yields `None` (no filter),
//! never an error, so stale or hand-edited links fall back to an
//! unfiltered search.

use serde::{Deserialize, Serialize};

use crate::models::PaperDto;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    Title,
    Abstract,
}

impl TextField {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextField::Title => "title",
            TextField::Abstract => "abstract",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOperator {
    Contains,
    NotContains,
}

impl MatchOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOperator::Contains => "contains",
            MatchOperator::NotContains => "not_contains",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupOperator {
    #[default]
    And,
    Or,
}

impl GroupOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupOperator::And => "AND",
            GroupOperator::Or => "OR",
        }
    }
}

/// Leaf of the filter tree: `field operator value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextCondition {
    pub field: TextField,
    pub operator: MatchOperator,
    pub value: String,
}

impl TextCondition {
    pub fn new(field: TextField, operator: MatchOperator, value: impl Into<String>) -> Self {
        Self {
            field,
            operator,
            value: value.into(),
        }
    }

    pub fn contains(field: TextField, value: impl Into<String>) -> Self {
        Self::new(field, MatchOperator::Contains, value)
    }

    pub fn not_contains(field: TextField, value: impl Into<String>) -> Self {
        Self::new(field, MatchOperator::NotContains, value)
    }

    /// Case-insensitive substring test against the selected field.
    pub fn matches(&self, title: &str, abstract_text: &str) -> bool {
        let haystack = match self.field {
            TextField::Title => title,
            TextField::Abstract => abstract_text,
        };
        let found = haystack
            .to_lowercase()
            .contains(&self.value.to_lowercase());
        match self.operator {
            MatchOperator::Contains => found,
            MatchOperator::NotContains => !found,
        }
    }
}

/// Internal node: children combined with AND or OR.
///
/// An empty group places no restriction on results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub operator: GroupOperator,
    #[serde(default)]
    pub children: Vec<FilterNode>,
}

impl ConditionGroup {
    pub fn new(operator: GroupOperator) -> Self {
        Self {
            operator,
            children: Vec::new(),
        }
    }

    /// AND group over `children`.
    pub fn all(children: Vec<FilterNode>) -> Self {
        Self {
            operator: GroupOperator::And,
            children,
        }
    }

    /// OR group over `children`.
    pub fn any(children: Vec<FilterNode>) -> Self {
        Self {
            operator: GroupOperator::Or,
            children,
        }
    }

    pub fn push(&mut self, node: impl Into<FilterNode>) {
        self.children.push(node.into());
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of leaf conditions anywhere below this group.
    pub fn condition_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                FilterNode::Condition(_) => 1,
                FilterNode::Group(group) => group.condition_count(),
            })
            .sum()
    }

    pub fn matches(&self, title: &str, abstract_text: &str) -> bool {
        if self.children.is_empty() {
            return true;
        }
        let mut results = self
            .children
            .iter()
            .map(|child| child.matches(title, abstract_text));
        match self.operator {
            GroupOperator::And => results.all(|r| r),
            GroupOperator::Or => results.any(|r| r),
        }
    }
}

/// A node of the filter tree.
///
/// On the wire each node carries a `"type"` of `"condition"` or `"group"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterNode {
    Condition(TextCondition),
    Group(ConditionGroup),
}

impl FilterNode {
    pub fn matches(&self, title: &str, abstract_text: &str) -> bool {
        match self {
            FilterNode::Condition(condition) => condition.matches(title, abstract_text),
            FilterNode::Group(group) => group.matches(title, abstract_text),
        }
    }
}

impl From<TextCondition> for FilterNode {
    fn from(condition: TextCondition) -> Self {
        FilterNode::Condition(condition)
    }
}

impl From<ConditionGroup> for FilterNode {
    fn from(group: ConditionGroup) -> Self {
        FilterNode::Group(group)
    }
}

/// Everything the filter builder produces for one search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedSearchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_from: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_to: Option<i32>,
    /// The root is written with its `"type": "group"` tag like any other
    /// group node.
    #[serde(with = "tagged_group")]
    pub root: ConditionGroup,
}

impl AdvancedSearchOptions {
    pub fn new(year_from: Option<i32>, year_to: Option<i32>, root: ConditionGroup) -> Self {
        Self {
            year_from,
            year_to,
            root,
        }
    }

    /// True when at least one constraint is set: a year bound or a
    /// non-empty root group.
    pub fn is_active(&self) -> bool {
        self.year_from.is_some() || self.year_to.is_some() || !self.root.is_empty()
    }

    /// URL query value for these options, or `None` when nothing is active.
    pub fn to_url_param(&self) -> Option<String> {
        if !self.is_active() {
            return None;
        }
        let json = serde_json::to_string(self).ok()?;
        Some(urlencoding::encode(&json).into_owned())
    }

    /// Inverse of [`to_url_param`](Self::to_url_param). Any failure yields
    /// `None`.
    pub fn from_url_param(encoded: &str) -> Option<Self> {
        if encoded.is_empty() {
            return None;
        }
        let decoded = match urlencoding::decode(encoded) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(error = %e, "filter parameter is not valid UTF-8");
                return None;
            }
        };
        match serde_json::from_str(&decoded) {
            Ok(options) => Some(options),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unreadable filter parameter");
                None
            }
        }
    }

    /// Reference evaluation of the filter against one paper.
    ///
    /// Year bounds are inclusive; a paper without a publication year fails
    /// any bound that is set.
    pub fn matches(&self, paper: &PaperDto) -> bool {
        if self.year_from.is_some() || self.year_to.is_some() {
            let Some(year) = paper.published_year() else {
                return false;
            };
            if self.year_from.is_some_and(|from| year < from) {
                return false;
            }
            if self.year_to.is_some_and(|to| year > to) {
                return false;
            }
        }
        self.root
            .matches(&paper.title, paper.abstract_text.as_deref().unwrap_or(""))
    }
}

/// `options` is present and has at least one active constraint.
pub fn has_active_filters(options: Option<&AdvancedSearchOptions>) -> bool {
    options.is_some_and(AdvancedSearchOptions::is_active)
}

/// URL query value for `options`; `None` keeps the parameter off the URL.
pub fn serialize_options(options: Option<&AdvancedSearchOptions>) -> Option<String> {
    options.and_then(AdvancedSearchOptions::to_url_param)
}

/// Parse a URL query value back into options; `None` means "no filter".
pub fn deserialize_options(encoded: Option<&str>) -> Option<AdvancedSearchOptions> {
    encoded.and_then(AdvancedSearchOptions::from_url_param)
}

mod tagged_group {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::ConditionGroup;

    #[derive(Serialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    enum TaggedRef<'a> {
        Group(&'a ConditionGroup),
    }

    /// Hand-written links may leave the root's tag out; any other tag is
    /// still rejected.
    #[derive(Deserialize)]
    struct Root {
        #[serde(rename = "type", default)]
        kind: Option<String>,
        #[serde(flatten)]
        group: ConditionGroup,
    }

    pub fn serialize<S: Serializer>(group: &ConditionGroup, serializer: S) -> Result<S::Ok, S::Error> {
        TaggedRef::Group(group).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ConditionGroup, D::Error> {
        let root = Root::deserialize(deserializer)?;
        match root.kind.as_deref() {
            None | Some("group") => Ok(root.group),
            Some(other) => Err(D::Error::custom(format!("root must be a group, got {other:?}"))),
        }
    }
}
