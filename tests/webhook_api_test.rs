//! Webhook API Integration Tests

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use callbridge::application::{CallOrchestrator, OrchestratorConfig, ToolDispatcher};
use callbridge::domain::agent::{AgentDirectory, AgentProfile};
use callbridge::domain::call::{
    CallEvent, CallRecord, CallRecordStore, CallStatus, PersistenceError,
};
use callbridge::domain::shared::value_objects::CallId;
use callbridge::domain::tool::{BusinessOperations, OperationError, ToolContext, ToolInvocation};
use callbridge::infrastructure::carrier::{
    CarrierClient, CarrierError, PlaceCallRequest, SignatureValidator, SIGNATURE_HEADER,
};
use callbridge::infrastructure::persistence::InMemoryCallRecordStore;
use callbridge::infrastructure::realtime::{
    RealtimeError, RealtimeSessionClient, RealtimeSettings, SessionChannel, SessionConnector,
};
use callbridge::infrastructure::retry::RetryPolicy;
use callbridge::interface::api::{build_router, AppState};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // For `oneshot`

const AUTH_TOKEN: &str = "test-auth-token";
const PUBLIC_BASE: &str = "https://bridge.example.com";

mockall::mock! {
    pub Carrier {}

    #[async_trait]
    impl CarrierClient for Carrier {
        async fn place_call(&self, request: &PlaceCallRequest) -> Result<String, CarrierError>;
        async fn hangup(&self, carrier_call_id: &str) -> Result<(), CarrierError>;
    }
}

/// Model endpoint that is never reachable; webhook tests never open sessions
struct UnreachableModel;

#[async_trait]
impl SessionConnector for UnreachableModel {
    async fn connect(&self) -> Result<SessionChannel, RealtimeError> {
        Err(RealtimeError::Transport("unreachable".into()))
    }
}

struct NoOperations;

#[async_trait]
impl BusinessOperations for NoOperations {
    async fn execute(
        &self,
        _context: &ToolContext,
        _invocation: &ToolInvocation,
    ) -> Result<Value, OperationError> {
        Err(OperationError::Rejected("not wired".into()))
    }
}

/// Store whose every operation fails
struct BrokenStore;

#[async_trait]
impl CallRecordStore for BrokenStore {
    async fn create(&self, _record: &CallRecord) -> Result<(), PersistenceError> {
        Err(PersistenceError::Database("connection refused".into()))
    }

    async fn find_by_id(&self, _id: &CallId) -> Result<Option<CallRecord>, PersistenceError> {
        Err(PersistenceError::Database("connection refused".into()))
    }

    async fn find_by_carrier_call_id(
        &self,
        _carrier_call_id: &str,
    ) -> Result<Option<CallRecord>, PersistenceError> {
        Err(PersistenceError::Database("connection refused".into()))
    }

    async fn set_carrier_call_id(
        &self,
        _id: &CallId,
        _carrier_call_id: &str,
    ) -> Result<(), PersistenceError> {
        Err(PersistenceError::Database("connection refused".into()))
    }

    async fn update_status(
        &self,
        _id: &CallId,
        _status: CallStatus,
        _ended_at: Option<DateTime<Utc>>,
    ) -> Result<bool, PersistenceError> {
        Err(PersistenceError::Database("connection refused".into()))
    }

    async fn append_event(&self, _event: &CallEvent) -> Result<(), PersistenceError> {
        Err(PersistenceError::Database("connection refused".into()))
    }

    async fn list_events(&self, _call_id: &CallId) -> Result<Vec<CallEvent>, PersistenceError> {
        Err(PersistenceError::Database("connection refused".into()))
    }
}

fn setup_api_test(store: Arc<dyn CallRecordStore>, carrier: MockCarrier) -> Router {
    let sessions = RealtimeSessionClient::new(
        Arc::new(UnreachableModel),
        RealtimeSettings::default(),
        RetryPolicy::default(),
    );
    let dispatcher = ToolDispatcher::new(
        Arc::new(NoOperations),
        Duration::from_secs(8),
        RetryPolicy::default(),
    );
    let agents = AgentDirectory::new(
        Some("concierge".into()),
        HashMap::new(),
        vec![AgentProfile {
            id: "concierge".into(),
            instructions: "Greet the caller and help.".into(),
            voice: None,
        }],
        "Be helpful.",
    );
    let orchestrator = CallOrchestrator::new(
        store.clone(),
        Arc::new(sessions),
        Arc::new(carrier),
        agents,
        Arc::new(dispatcher),
        OrchestratorConfig {
            media_relay_url: "wss://bridge.example.com/media-stream".into(),
            caller_id: "+250788999000".into(),
            status_callback_url: format!("{}/webhooks/status", PUBLIC_BASE),
            keep_open_seconds: 60,
            persistence_timeout: Duration::from_millis(500),
            stream_start_timeout: Duration::from_secs(120),
        },
    );

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        store,
        signature: Some(Arc::new(SignatureValidator::new(AUTH_TOKEN, PUBLIC_BASE))),
    };
    // Not installed globally, so tests can build as many as they like
    let prometheus_handle = PrometheusBuilder::new().build_recorder().handle();
    build_router(state, prometheus_handle)
}

fn validator() -> SignatureValidator {
    SignatureValidator::new(AUTH_TOKEN, PUBLIC_BASE)
}

fn signed_form(uri: &str, body: &str) -> Request<Body> {
    let signature = validator().sign(uri, body.as_bytes(), true);
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn signed_json(uri: &str, body: &Value) -> Request<Body> {
    let body = body.to_string();
    let signature = validator().sign(uri, body.as_bytes(), false);
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

fn inbound_form(sid: &str) -> String {
    format!("CallSid={}&From=%2B250788000111&To=%2B250788100200", sid)
}

#[tokio::test]
async fn test_inbound_call_returns_directive() {
    let store = Arc::new(InMemoryCallRecordStore::new());
    let app = setup_api_test(store.clone(), MockCarrier::new());

    let response = app
        .oneshot(signed_form("/webhooks/inbound", &inbound_form("CA123")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/xml");
    assert!(response.headers().get("x-callbridge-degraded").is_none());

    let xml = body_text(response).await;
    assert!(xml.contains("\"CA123\""));
    assert!(xml.contains("<Stream url=\"wss://bridge.example.com/media-stream\">"));
    assert!(xml.contains("<Pause length=\"60\"/>"));

    let record = store.find_by_carrier_call_id("CA123").await.unwrap().unwrap();
    assert_eq!(record.status(), CallStatus::InProgress);
    assert_eq!(record.agent_id(), Some("concierge"));
    assert!(xml.contains(&record.id().to_string()));
}

#[tokio::test]
async fn test_repeated_inbound_webhook_keeps_first_call() {
    let store = Arc::new(InMemoryCallRecordStore::new());
    let app = setup_api_test(store.clone(), MockCarrier::new());

    let first = app
        .clone()
        .oneshot(signed_form("/webhooks/inbound", &inbound_form("CA130")))
        .await
        .unwrap();
    let first_xml = body_text(first).await;

    let retry = app
        .oneshot(signed_form("/webhooks/inbound", &inbound_form("CA130")))
        .await
        .unwrap();
    assert_eq!(retry.status(), StatusCode::OK);
    assert!(retry.headers().get("x-callbridge-degraded").is_none());
    assert_eq!(body_text(retry).await, first_xml);

    let record = store.find_by_carrier_call_id("CA130").await.unwrap().unwrap();
    assert!(first_xml.contains(&record.id().to_string()));
}

#[tokio::test]
async fn test_bad_signature_rejected_without_side_effects() {
    let store = Arc::new(InMemoryCallRecordStore::new());
    let app = setup_api_test(store.clone(), MockCarrier::new());

    let forged = Request::builder()
        .method("POST")
        .uri("/webhooks/inbound")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(SIGNATURE_HEADER, "bm90IGEgc2lnbmF0dXJl")
        .body(Body::from(inbound_form("CA124")))
        .unwrap();
    let response = app.clone().oneshot(forged).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let unsigned = Request::builder()
        .method("POST")
        .uri("/webhooks/inbound")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(inbound_form("CA124")))
        .unwrap();
    let response = app.clone().oneshot(unsigned).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // signed for a different body
    let mut tampered = signed_form("/webhooks/inbound", &inbound_form("CA125"));
    *tampered.body_mut() = Body::from(inbound_form("CA124"));
    let response = app.oneshot(tampered).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    assert!(store.find_by_carrier_call_id("CA124").await.unwrap().is_none());
}

#[tokio::test]
async fn test_inbound_call_degraded_when_store_down() {
    let app = setup_api_test(Arc::new(BrokenStore), MockCarrier::new());

    let response = app
        .oneshot(signed_form("/webhooks/inbound", &inbound_form("CA126")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-callbridge-degraded"], "true");
    assert!(body_text(response).await.contains("CA126"));
}

#[tokio::test]
async fn test_status_callbacks_are_idempotent() {
    let store = Arc::new(InMemoryCallRecordStore::new());
    let app = setup_api_test(store.clone(), MockCarrier::new());

    app.clone()
        .oneshot(signed_form("/webhooks/inbound", &inbound_form("CA200")))
        .await
        .unwrap();

    let mut ended_at = Vec::new();
    for status in ["answered", "completed", "completed"] {
        let body = format!("CallSid=CA200&CallStatus={}", status);
        let response = app
            .clone()
            .oneshot(signed_form("/webhooks/status", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let record = store.find_by_carrier_call_id("CA200").await.unwrap().unwrap();
        ended_at.push((record.status(), record.ended_at()));
    }

    assert_eq!(ended_at[0], (CallStatus::InProgress, None));
    assert_eq!(ended_at[1].0, CallStatus::Completed);
    assert!(ended_at[1].1.is_some());
    assert_eq!(ended_at[1], ended_at[2]);
}

#[tokio::test]
async fn test_unrecognized_status_ignored() {
    let store = Arc::new(InMemoryCallRecordStore::new());
    let app = setup_api_test(store.clone(), MockCarrier::new());

    app.clone()
        .oneshot(signed_form("/webhooks/inbound", &inbound_form("CA201")))
        .await
        .unwrap();
    let response = app
        .oneshot(signed_form(
            "/webhooks/status",
            "CallSid=CA201&CallStatus=on-hold-forever",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let record = store.find_by_carrier_call_id("CA201").await.unwrap().unwrap();
    assert_eq!(record.status(), CallStatus::InProgress);
}

#[tokio::test]
async fn test_outbound_call_and_lookup() {
    let store = Arc::new(InMemoryCallRecordStore::new());
    let mut carrier = MockCarrier::new();
    carrier
        .expect_place_call()
        .withf(|req| req.to == "+250788555666" && req.from == "+250788999000")
        .times(1)
        .returning(|_| Ok("CA900".to_string()));
    let app = setup_api_test(store.clone(), carrier);

    let response = app
        .clone()
        .oneshot(signed_json(
            "/webhooks/outbound",
            &json!({ "to": "+250788555666", "agent_id": "concierge" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["carrier_call_id"], "CA900");
    assert_eq!(json["data"]["degraded"], false);

    let call_id = json["data"]["call_id"].as_str().unwrap().to_string();
    let response = app
        .clone()
        .oneshot(get(&format!("/calls/{}", call_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "queued");
    assert_eq!(json["data"]["direction"], "outbound");
    assert_eq!(json["data"]["carrier_call_id"], "CA900");
    assert_eq!(json["data"]["ended_at"], Value::Null);

    // outbound status callbacks carry our call id in the query
    let uri = format!("/webhooks/status?callId={}", call_id);
    let response = app
        .clone()
        .oneshot(signed_form(&uri, "CallSid=CA900&CallStatus=ringing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let record = store.find_by_carrier_call_id("CA900").await.unwrap().unwrap();
    assert_eq!(record.status(), CallStatus::Ringing);
}

#[tokio::test]
async fn test_outbound_unknown_agent() {
    let store = Arc::new(InMemoryCallRecordStore::new());
    let app = setup_api_test(store, MockCarrier::new());

    let response = app
        .oneshot(signed_json(
            "/webhooks/outbound",
            &json!({ "to": "+250788555666", "agent_id": "ghost" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_outbound_carrier_refusal() {
    let store = Arc::new(InMemoryCallRecordStore::new());
    let mut carrier = MockCarrier::new();
    carrier.expect_place_call().times(1).returning(|_| {
        Err(CarrierError::Api {
            status: 400,
            body: "invalid To".into(),
        })
    });
    let app = setup_api_test(store, carrier);

    let response = app
        .oneshot(signed_json("/webhooks/outbound", &json!({ "to": "+1" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_sdp_offer_answered() {
    let store = Arc::new(InMemoryCallRecordStore::new());
    let app = setup_api_test(store, MockCarrier::new());
    let offer = "v=0\r\n\
        o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
        s=-\r\n\
        t=0 0\r\n\
        a=group:BUNDLE audio0\r\n\
        m=audio 9 UDP/TLS/RTP/SAVPF 111 0 8 101\r\n\
        c=IN IP4 0.0.0.0\r\n\
        a=mid:audio0\r\n\
        a=setup:actpass\r\n\
        a=ice-ufrag:offr\r\n\
        a=ice-pwd:offerpasswordoffer12345\r\n";

    let response = app
        .clone()
        .oneshot(signed_json(
            "/webhooks/sdp",
            &json!({ "carrier_call_id": "CA500", "sdp": offer }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["sdp_type"], "answer");
    let sdp = json["sdp"].as_str().unwrap();
    assert_eq!(sdp.matches("m=audio ").count(), 1);
    assert!(sdp.contains("a=mid:audio0"));

    let response = app
        .oneshot(signed_json(
            "/webhooks/sdp",
            &json!({ "carrier_call_id": "CA501", "sdp": "" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_call_queries() {
    let store = Arc::new(InMemoryCallRecordStore::new());
    let app = setup_api_test(store.clone(), MockCarrier::new());

    let response = app.clone().oneshot(get("/calls/not-a-uuid")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(get(&format!("/calls/{}", CallId::new())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.clone()
        .oneshot(signed_form("/webhooks/inbound", &inbound_form("CA300")))
        .await
        .unwrap();
    let record = store.find_by_carrier_call_id("CA300").await.unwrap().unwrap();
    store
        .append_event(&CallEvent::stop(*record.id(), "carrier_stopped"))
        .await
        .unwrap();

    let response = app
        .oneshot(get(&format!("/calls/{}/events", record.id())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let events = json["data"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event_type"], "stop");
    assert_eq!(events[0]["payload"]["reason"], "carrier_stopped");
}

#[tokio::test]
async fn test_health_and_metrics() {
    let store = Arc::new(InMemoryCallRecordStore::new());
    let app = setup_api_test(store, MockCarrier::new());

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "ok");
    assert_eq!(json["data"]["active_calls"], 0);

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
