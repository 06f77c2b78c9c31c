use actix_web::{http::StatusCode, test, web, App};
use change_feed::{callback, ChangeFeed, InMemoryChangeFeed, RowFilter};
use direct_messaging_service::{
    middleware::VIEWER_HEADER,
    models::{Message, Profile},
    routes::{
        configure_routes,
        messages::{HistoryResponse, MessageResponse},
    },
    state::AppState,
    store::{InMemoryMessageStore, PublishingStore},
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

fn state(store: &InMemoryMessageStore, feed: &InMemoryChangeFeed) -> AppState {
    AppState::new(Arc::new(PublishingStore::new(
        store.clone(),
        Arc::new(feed.clone()),
    )))
}

fn messages_uri(counterpart: Uuid) -> String {
    format!("/api/v1/conversations/{counterpart}/messages")
}

#[actix_web::test]
async fn test_health() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(
                &InMemoryMessageStore::new(),
                &InMemoryChangeFeed::new(),
            )))
            .configure(configure_routes),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_send_then_read_history_from_both_sides() {
    let store = InMemoryMessageStore::new();
    let feed = InMemoryChangeFeed::new();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    store
        .add_profile(Profile {
            id: a,
            full_name: Some("ada lovelace".into()),
        })
        .await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(&store, &feed)))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&messages_uri(b))
        .insert_header((VIEWER_HEADER, a.to_string()))
        .set_json(json!({ "content": "  hello bob  " }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let sent: MessageResponse = test::read_body_json(resp).await;
    assert_eq!(sent.content, "hello bob");
    assert_eq!(sent.sender_id, a);
    assert!(sent.is_own);

    // Bob reads the conversation with Ada.
    let req = test::TestRequest::get()
        .uri(&messages_uri(a))
        .insert_header((VIEWER_HEADER, b.to_string()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let history: HistoryResponse = test::read_body_json(resp).await;
    assert_eq!(history.counterpart.display_name, "ada lovelace");
    assert_eq!(history.counterpart.avatar_initial, Some('A'));
    assert_eq!(history.messages.len(), 1);
    assert_eq!(history.messages[0].id, sent.id);
    assert!(!history.messages[0].is_own);

    // Ada reads hers; Bob has no profile.
    let req = test::TestRequest::get()
        .uri(&messages_uri(b))
        .insert_header((VIEWER_HEADER, a.to_string()))
        .to_request();
    let history: HistoryResponse = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(history.counterpart.display_name, Profile::UNKNOWN_NAME);
    assert!(history.messages[0].is_own);
}

#[actix_web::test]
async fn test_send_is_announced_to_receiver() {
    let store = InMemoryMessageStore::new();
    let feed = InMemoryChangeFeed::new();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let seen = Arc::new(AtomicUsize::new(0));

    let counter = seen.clone();
    let _inbound = feed
        .subscribe(
            RowFilter::eq(Message::TABLE, "receiver_id", b),
            callback(move |_event| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
        )
        .await
        .unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(&store, &feed)))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&messages_uri(b))
        .insert_header((VIEWER_HEADER, a.to_string()))
        .set_json(json!({ "content": "ping" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[actix_web::test]
async fn test_rejected_requests() {
    let store = InMemoryMessageStore::new();
    let feed = InMemoryChangeFeed::new();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(&store, &feed)))
            .configure(configure_routes),
    )
    .await;

    // No viewer
    let req = test::TestRequest::get().uri(&messages_uri(b)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    // Blank content
    let req = test::TestRequest::post()
        .uri(&messages_uri(b))
        .insert_header((VIEWER_HEADER, a.to_string()))
        .set_json(json!({ "content": " \n " }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    // Conversation with oneself
    let req = test::TestRequest::post()
        .uri(&messages_uri(a))
        .insert_header((VIEWER_HEADER, a.to_string()))
        .set_json(json!({ "content": "me" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    assert!(store.all_messages().await.is_empty());
}

#[actix_web::test]
async fn test_store_outage_maps_to_upstream_errors() {
    let store = InMemoryMessageStore::new();
    let feed = InMemoryChangeFeed::new();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    store.set_unavailable(true);
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(&store, &feed)))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::get()
        .uri(&messages_uri(b))
        .insert_header((VIEWER_HEADER, a.to_string()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "HISTORY_UNAVAILABLE");

    let req = test::TestRequest::post()
        .uri(&messages_uri(b))
        .insert_header((VIEWER_HEADER, a.to_string()))
        .set_json(json!({ "content": "lost" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "SEND_FAILED");
}
