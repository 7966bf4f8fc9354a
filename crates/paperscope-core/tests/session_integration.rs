//! End-to-end tests for [`Session`] over the in-memory [`MockApi`].
//!
//! Nothing here touches the network; the mock records what would have been
//! sent so the tests can check request bodies and call counts.

use std::sync::Arc;
use std::time::Duration;

use paperscope_core::api::MockPdf;
use paperscope_core::{
    AdvancedSearchOptions, ApiError, ConditionGroup, MockApi, PaperDto, Session, SummaryStatus,
    TextCondition, TextField, parse_search_query_string, search_query_string,
};

fn corpus() -> Vec<PaperDto> {
    vec![
        PaperDto {
            paper_id: 1,
            title: "Attention Is All You Need".into(),
            authors: vec!["Ashish Vaswani".into(), "Noam Shazeer".into()],
            abstract_text: Some("The Transformer, based solely on attention.".into()),
            published_at: Some("2017-06-12T00:00:00".into()),
            ..Default::default()
        },
        PaperDto {
            paper_id: 2,
            title: "A Survey of Transformers".into(),
            authors: vec!["Tianyang Lin".into()],
            abstract_text: Some("We review transformer variants.".into()),
            published_at: Some("2021-06-08".into()),
            ..Default::default()
        },
        PaperDto {
            paper_id: 3,
            title: "Untitled preprint".into(),
            ..Default::default()
        },
    ]
}

fn session(api: &Arc<MockApi>, capacity: usize) -> Session {
    Session::new(api.clone(), capacity)
}

#[tokio::test]
async fn search_maps_results_to_view_models() {
    let api = Arc::new(MockApi::new().with_papers(corpus()));
    let session = session(&api, 4);

    let papers = session.search("", None).await.unwrap();
    assert_eq!(papers.len(), 3);
    assert_eq!(papers[0].author, "Ashish Vaswani, Noam Shazeer");
    assert_eq!(papers[0].year, 2017);
    assert_eq!(papers[2].author, "");
    assert_eq!(papers[2].year, 0);
}

#[tokio::test]
async fn filtered_search_sends_tree_and_honours_it() {
    let api = Arc::new(MockApi::new().with_papers(corpus()));
    let session = session(&api, 4);

    let options = AdvancedSearchOptions::new(
        Some(2017),
        None,
        ConditionGroup::all(vec![
            TextCondition::contains(TextField::Abstract, "transformer").into(),
            TextCondition::not_contains(TextField::Title, "survey").into(),
        ]),
    );
    let papers = session.search("", Some(&options)).await.unwrap();
    assert_eq!(papers.iter().map(|p| p.paper_id).collect::<Vec<_>>(), vec![1]);

    let body = api.last_search_body().unwrap();
    assert_eq!(body["filter"]["year_from"], 2017);
    assert_eq!(body["filter"]["root"]["operator"], "AND");
    assert_eq!(body["filter"]["root"]["children"][1]["operator"], "not_contains");
}

#[tokio::test]
async fn inactive_filter_is_not_sent() {
    let api = Arc::new(MockApi::new().with_papers(corpus()));
    let session = session(&api, 4);

    session
        .search("transformer", Some(&AdvancedSearchOptions::default()))
        .await
        .unwrap();
    let body = api.last_search_body().unwrap();
    assert!(body.get("filter").is_none());
}

#[tokio::test]
async fn shared_link_reproduces_search() {
    let api = Arc::new(MockApi::new().with_papers(corpus()));
    let session = session(&api, 4);
    let options = AdvancedSearchOptions::new(None, Some(2020), ConditionGroup::default());

    let link = search_query_string("attention", Some(&options));
    let (query, parsed) = parse_search_query_string(&link);
    let papers = session.search(&query, parsed.as_ref()).await.unwrap();
    assert_eq!(papers.len(), 1);
    assert_eq!(papers[0].paper_id, 1);
}

#[tokio::test]
async fn pdf_cache_evicts_least_recently_used() {
    let api = Arc::new(MockApi::new());
    let session = session(&api, 2);

    session.pdf(1).await.unwrap();
    session.pdf(2).await.unwrap();
    session.pdf(3).await.unwrap();
    assert_eq!(session.pdfs().cached_ids(), vec![2, 3]);

    session.pdf(2).await.unwrap();
    session.pdf(4).await.unwrap();
    assert_eq!(session.pdfs().cached_ids(), vec![2, 4]);
    assert_eq!(api.pdf_calls(2), 1);
}

#[tokio::test]
async fn pdf_errors_reach_the_caller() {
    let api = Arc::new(MockApi::new().with_pdf(7, MockPdf::NotFound));
    let session = session(&api, 2);
    assert!(matches!(
        session.pdf(7).await,
        Err(ApiError::Status { status: 404, .. })
    ));
    assert!(session.pdfs().is_empty());
}

#[tokio::test]
async fn login_sets_token_and_logout_clears_everything() {
    let api = Arc::new(MockApi::new().with_papers(corpus()));
    let session = session(&api, 4);

    let response = session.login("ada").await.unwrap();
    assert!(session.is_authenticated());
    assert_eq!(session.user().unwrap().user_name, "ada");
    assert_eq!(api.access_token(), Some(response.access_token));

    session.pdf(1).await.unwrap();
    session.summaries().summarise(1, false).await;
    session.chat().send_message(1, "What is new here?").await.unwrap();
    assert!(!session.pdfs().is_empty());
    assert!(session.summaries().has_summary(1));
    assert_eq!(session.chat().messages(1).len(), 2);

    session.logout();
    assert!(!session.is_authenticated());
    assert_eq!(api.access_token(), None);
    assert!(session.pdfs().is_empty());
    assert_eq!(session.summaries().entry(1).status, SummaryStatus::Idle);
    assert!(session.chat().messages(1).is_empty());

    // The next user starts cold
    session.pdf(1).await.unwrap();
    assert_eq!(api.pdf_calls(1), 2);
}

#[tokio::test(start_paused = true)]
async fn logout_mid_request_leaves_next_user_clean() {
    let api = Arc::new(MockApi::new().with_delay(Duration::from_millis(100)));
    let session = session(&api, 4);
    session.login("ada").await.unwrap();

    let (ada_chat, ada_summary, (grace, grace_chat, grace_summary)) = tokio::join!(
        session.chat().send_message(1, "ada's question"),
        session.summaries().summarise(1, false),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            session.logout();
            tokio::join!(
                session.login("grace"),
                session.chat().send_message(1, "grace's question"),
                session.summaries().summarise(1, false),
            )
        }
    );

    // The first user's requests complete but their results go nowhere
    assert!(ada_chat.unwrap().is_some());
    assert_eq!(ada_summary.status, SummaryStatus::Idle);

    assert_eq!(grace.unwrap().user.user_name, "grace");
    assert_eq!(session.user().unwrap().user_name, "grace");
    assert!(grace_chat.unwrap().is_some());
    let history: Vec<String> = session
        .chat()
        .messages(1)
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(history, vec!["grace's question", "You asked: grace's question"]);

    assert_eq!(grace_summary.status, SummaryStatus::Success);
    assert_eq!(session.summaries().entry(1), grace_summary);
    assert_eq!(api.summary_calls(), 2);
}

#[tokio::test]
async fn failed_login_keeps_session_anonymous() {
    let api = Arc::new(MockApi::new());
    let session = session(&api, 4);
    assert!(session.login("  ").await.is_err());
    assert!(!session.is_authenticated());
    assert_eq!(api.access_token(), None);
}

#[tokio::test(start_paused = true)]
async fn concurrent_opens_of_one_pdf_fetch_once() {
    let api = Arc::new(MockApi::new().with_delay(Duration::from_millis(20)));
    let session = session(&api, 4);

    let (a, b) = tokio::join!(session.pdf(9), session.pdf(9));
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(api.pdf_calls(9), 1);
}

#[tokio::test]
async fn projects_round_trip_through_api() {
    let api = Arc::new(MockApi::new().with_papers(corpus()));
    let session = session(&api, 4);

    let project = session.api().create_project("Transformers").await.unwrap();
    session
        .api()
        .add_paper_to_project(project.project_id, 2)
        .await
        .unwrap();
    let with = session.api().project_papers(project.project_id).await.unwrap();
    assert_eq!(with.project.project_name, "Transformers");
    assert_eq!(with.papers[0].paper_id, 2);
    assert_eq!(session.api().list_projects().await.unwrap().len(), 1);
}
