use super::*;
use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shared::{
    domain::{Step, UserId},
    error::ErrorCode,
    protocol::{Answers, ImageSelections, LogType},
};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct StoreState {
    documents: Arc<Mutex<HashMap<String, Value>>>,
    next_id: Arc<Mutex<u32>>,
}

async fn insert_document(
    State(state): State<StoreState>,
    Path(collection): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<ApiError>)> {
    if collection != "responses" {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiError::new(ErrorCode::NotFound, "unknown collection")),
        ));
    }
    let mut next_id = state.next_id.lock().await;
    *next_id += 1;
    let id = format!("doc-{next_id}");
    state.documents.lock().await.insert(id.clone(), body);
    Ok(Json(json!({ "id": id })))
}

async fn fetch_document(
    State(state): State<StoreState>,
    Path((_collection, id)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    state
        .documents
        .lock()
        .await
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn list_documents(
    State(state): State<StoreState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let session_id = query.get("sessionId").cloned().unwrap_or_default();
    let documents = state.documents.lock().await;
    let mut ids: Vec<&String> = documents.keys().collect();
    ids.sort();
    let matching: Vec<Value> = ids
        .into_iter()
        .filter(|id| documents[*id]["sessionId"] == Value::String(session_id.clone()))
        .map(|id| json!({ "id": id, "document": documents[id] }))
        .collect();
    Json(Value::Array(matching))
}

async fn serve(app: Router) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

async fn spawn_store() -> anyhow::Result<String> {
    spawn_store_with(StoreState::default()).await
}

async fn spawn_store_with(state: StoreState) -> anyhow::Result<String> {
    let app = Router::new()
        .route(
            "/collections/:collection/documents",
            post(insert_document).get(list_documents),
        )
        .route("/collections/:collection/documents/:id", get(fetch_document))
        .with_state(state);
    serve(app).await
}

fn record(session_id: SessionId, log_type: LogType) -> LogRecord {
    LogRecord {
        answers: Answers {
            name: "Ada".into(),
            email: "ada@example.org".into(),
            ..Answers::default()
        },
        session_id,
        user_id: UserId::random(),
        current_step: Step(4),
        log_type,
        image_selections: ImageSelections::default(),
        image_comparisons: Vec::new(),
        plan: None,
        ip_address: Some("203.0.113.9".into()),
        user_location: None,
        screen_size: None,
        duration: 3.5,
        timestamp: None,
    }
}

#[tokio::test]
async fn rest_store_inserts_and_fetches_documents() -> anyhow::Result<()> {
    let base = spawn_store().await?;
    let store = RestDocumentStore::new(format!("{base}/"), "responses");
    let written = record(SessionId::random(), LogType::Temp);

    let id = store.insert(&written).await?;
    assert_eq!(id, DocumentId::from("doc-1"));

    let fetched = store.fetch(&id).await?.expect("document stored");
    assert_eq!(fetched, written);
    Ok(())
}

#[tokio::test]
async fn rest_store_treats_404_as_absent() -> anyhow::Result<()> {
    let base = spawn_store().await?;
    let store = RestDocumentStore::new(base, "responses");

    assert!(store.fetch(&DocumentId::from("missing")).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn rest_store_escapes_document_ids_in_the_path() -> anyhow::Result<()> {
    let state = StoreState::default();
    let written = record(SessionId::random(), LogType::Temp);
    state
        .documents
        .lock()
        .await
        .insert("odd?id#part".into(), serde_json::to_value(&written)?);
    let base = spawn_store_with(state).await?;
    let store = RestDocumentStore::new(base, "responses");

    let url = store.document_url(&DocumentId::from("odd?id#part"))?;
    assert!(url.path().ends_with("/documents/odd%3Fid%23part"), "{url}");
    assert_eq!(url.query(), None);

    let fetched = store.fetch(&DocumentId::from("odd?id#part")).await?;
    assert_eq!(fetched, Some(written));
    Ok(())
}

#[tokio::test]
async fn rest_store_surfaces_error_envelope() -> anyhow::Result<()> {
    let base = spawn_store().await?;
    let store = RestDocumentStore::new(base, "elsewhere");

    let err = store
        .insert(&record(SessionId::random(), LogType::Temp))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("404"), "{message}");
    assert!(message.contains("unknown collection"), "{message}");
    Ok(())
}

#[tokio::test]
async fn rest_store_lists_one_session() -> anyhow::Result<()> {
    let base = spawn_store().await?;
    let store = RestDocumentStore::new(base, "responses");
    let session = SessionId::random();

    store.insert(&record(session, LogType::Temp)).await?;
    store.insert(&record(SessionId::random(), LogType::Temp)).await?;
    store.insert(&record(session, LogType::Final)).await?;

    let logs = store.list_for_session(session).await?;
    let types: Vec<LogType> = logs.iter().map(|log| log.record.log_type).collect();
    assert_eq!(types, vec![LogType::Temp, LogType::Final]);
    assert_eq!(logs[1].id, DocumentId::from("doc-3"));
    Ok(())
}

#[tokio::test]
async fn ip_and_geo_lookups_read_json_endpoints() -> anyhow::Result<()> {
    let app = Router::new()
        .route("/ip", get(|| async { Json(json!({ "ip": "198.51.100.7" })) }))
        .route(
            "/geo",
            get(|| async { Json(json!({ "latitude": 52.52, "longitude": 13.405 })) }),
        )
        .route("/broken", get(|| async { StatusCode::BAD_GATEWAY }));
    let base = serve(app).await?;

    assert_eq!(
        HttpIpLookup::new(format!("{base}/ip")).public_ip().await?,
        "198.51.100.7"
    );
    let location = HttpGeoLocator::new(format!("{base}/geo")).locate().await?;
    assert_eq!(
        location,
        GeoLocation {
            latitude: 52.52,
            longitude: 13.405
        }
    );
    assert!(HttpIpLookup::new(format!("{base}/broken"))
        .public_ip()
        .await
        .is_err());
    Ok(())
}

#[tokio::test]
async fn mailer_posts_credentials_and_template_params() -> anyhow::Result<()> {
    let received: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route(
            "/send",
            post(
                |State(received): State<Arc<Mutex<Vec<Value>>>>, Json(body): Json<Value>| async move {
                    received.lock().await.push(body);
                    StatusCode::OK
                },
            ),
        )
        .with_state(received.clone());
    let base = serve(app).await?;

    let mailer = HttpMailer::new(
        format!("{base}/send"),
        EmailCredentials {
            service_id: "svc".into(),
            template_id: "tpl".into(),
            user_id: "pub-key".into(),
        },
    );
    mailer
        .send(&EmailRequest {
            to_email: "ada@example.org".into(),
            continuation_link: "https://example.org/survey/doc-1".into(),
            from_name: "Your Survey App".into(),
            to_name: "Ada".into(),
        })
        .await?;

    let received = received.lock().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["service_id"], "svc");
    assert_eq!(received[0]["template_id"], "tpl");
    assert_eq!(received[0]["user_id"], "pub-key");
    assert_eq!(
        received[0]["template_params"]["continuation_link"],
        "https://example.org/survey/doc-1"
    );
    Ok(())
}

#[tokio::test]
async fn analytics_posts_tagged_events() -> anyhow::Result<()> {
    let received: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route(
            "/collect",
            post(
                |State(received): State<Arc<Mutex<Vec<Value>>>>, Json(body): Json<Value>| async move {
                    received.lock().await.push(body);
                    "ignored"
                },
            ),
        )
        .with_state(received.clone());
    let base = serve(app).await?;

    HttpAnalytics::new(format!("{base}/collect"))
        .track(&AnalyticsEvent::SurveyExit {
            step: Step(14),
            timestamp: chrono::Utc::now(),
        })
        .await?;

    let received = received.lock().await;
    assert_eq!(received[0]["event"], "survey_exit");
    assert_eq!(received[0]["step"], 14);
    Ok(())
}
