//! Query-string form of a search, so a search can be shared as a link.

use crate::filter::AdvancedSearchOptions;

pub const QUERY_PARAM: &str = "q";
pub const FILTERS_PARAM: &str = "filters";

/// Build `q=<query>` plus `&filters=<encoded>` when the options are active.
pub fn search_query_string(query: &str, options: Option<&AdvancedSearchOptions>) -> String {
    let mut out = format!("{QUERY_PARAM}={}", urlencoding::encode(query));
    if let Some(filters) = options.and_then(AdvancedSearchOptions::to_url_param) {
        out.push('&');
        out.push_str(FILTERS_PARAM);
        out.push('=');
        out.push_str(&filters);
    }
    out
}

/// Read a query string back into a query and optional filter.
///
/// Never fails: a leading `?` is allowed, unknown parameters are ignored,
/// and an unreadable `filters` value means no filter.
pub fn parse_search_query_string(text: &str) -> (String, Option<AdvancedSearchOptions>) {
    let text = text.strip_prefix('?').unwrap_or(text);
    let mut query = String::new();
    let mut options = None;

    for pair in text.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match key {
            QUERY_PARAM => query = decode_component(value),
            FILTERS_PARAM => options = AdvancedSearchOptions::from_url_param(value),
            _ => {}
        }
    }
    (query, options)
}

/// Form-style decoding: `+` is a space.
fn decode_component(value: &str) -> String {
    let spaced = value.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{ConditionGroup, TextCondition, TextField};

    fn active() -> AdvancedSearchOptions {
        AdvancedSearchOptions::new(
            Some(2020),
            Some(2023),
            ConditionGroup::all(vec![
                TextCondition::not_contains(TextField::Title, "survey").into(),
            ]),
        )
    }

    #[test]
    fn inactive_filter_stays_off_the_url() {
        let qs = search_query_string("graph neural nets", Some(&AdvancedSearchOptions::default()));
        assert_eq!(qs, "q=graph%20neural%20nets");
        assert_eq!(search_query_string("x", None), "q=x");
    }

    #[test]
    fn active_filter_survives_the_link() {
        let options = active();
        let qs = search_query_string("diffusion & friends", Some(&options));
        assert!(qs.contains("&filters="));

        let (query, parsed) = parse_search_query_string(&qs);
        assert_eq!(query, "diffusion & friends");
        assert_eq!(parsed, Some(options));
    }

    #[test]
    fn leading_question_mark_and_unknown_params() {
        let (query, options) = parse_search_query_string("?page=2&q=bert+fine-tuning&sort=date");
        assert_eq!(query, "bert fine-tuning");
        assert_eq!(options, None);
    }

    #[test]
    fn bad_filters_value_means_no_filter() {
        let (query, options) = parse_search_query_string("q=llm&filters=not%20json!!");
        assert_eq!(query, "llm");
        assert_eq!(options, None);
    }

    #[test]
    fn empty_input() {
        assert_eq!(parse_search_query_string(""), (String::new(), None));
    }
}
