//! The live client against a local stub of the chat-completions API.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use ctr_studio::engine::{
    Batch, BatchOrchestrator, ClickPredictor, LiveClient, OrchestratorConfig, PredictorSpec,
};
use ctr_types::{AdContext, Identity, Platform, PredictionSource, ProviderErrorKind};
use serde_json::{Value, json};
use silicon_sampler::Population;

/// What the stub answers to every call.
#[derive(Clone)]
enum Reply {
    Content(&'static str),
    Status(StatusCode),
    Garbage,
}

async fn completions(State(reply): State<Reply>, Json(body): Json<Value>) -> Response {
    assert_eq!(
        body["messages"][0]["content"],
        "You are a precise decision engine that outputs strict JSON."
    );
    match reply {
        Reply::Content(content) => Json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
        .into_response(),
        Reply::Status(status) => (status, "nope").into_response(),
        Reply::Garbage => "not json at all".into_response(),
    }
}

async fn stub(reply: Reply) -> String {
    let app = Router::new()
        .route("/chat/completions", post(completions))
        .with_state(reply);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base: &str) -> LiveClient {
    let spec = PredictorSpec::new("openai").with_api_key(Some("sk-test".into()));
    LiveClient::openai(&spec).with_base_url(base)
}

fn two_identities() -> Population {
    Population::new(
        7,
        vec![
            Identity::from_pairs([("age", "25-34"), ("interest", "food")]),
            Identity::from_pairs([("age", "65+"), ("interest", "gaming")]),
        ],
    )
}

fn whole(population: &Population) -> Batch {
    Batch::new(0, 0, population.len(), population.seed(), population.shared())
}

fn ad() -> AdContext {
    AdContext::new("Special offer on premium coffee", Platform::Facebook)
}

#[tokio::test]
async fn test_parses_fenced_reply() {
    let base = stub(Reply::Content("```json\n{\"clicks\": [1, 0]}\n```")).await;
    let population = two_identities();

    let predictions = client(&base).predict(&whole(&population), &ad()).await.unwrap();
    let labels: Vec<u8> = predictions.iter().map(|p| p.label()).collect();
    assert_eq!(labels, vec![1, 0]);
    assert!(predictions.iter().all(|p| p.source == PredictionSource::Live));
}

#[tokio::test]
async fn test_status_classification() {
    let population = two_identities();
    let cases = [
        (StatusCode::UNAUTHORIZED, ProviderErrorKind::Authentication),
        (StatusCode::TOO_MANY_REQUESTS, ProviderErrorKind::RateLimited),
        (StatusCode::INTERNAL_SERVER_ERROR, ProviderErrorKind::Status(500)),
    ];
    for (status, kind) in cases {
        let base = stub(Reply::Status(status)).await;
        let err = client(&base)
            .predict(&whole(&population), &ad())
            .await
            .unwrap_err();
        assert_eq!(err.kind, kind);
        assert_eq!(err.provider, "openai");
    }
}

#[tokio::test]
async fn test_malformed_replies() {
    let population = two_identities();
    for reply in [
        Reply::Garbage,
        Reply::Content("{\"clicks\": [1]}"),
        Reply::Content("{\"clicks\": [1, 7]}"),
    ] {
        let base = stub(reply).await;
        let err = client(&base)
            .predict(&whole(&population), &ad())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::MalformedResponse);
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_is_network_error() {
    // Bind then drop, leaving a port nobody listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let population = two_identities();
    let err = client(&base)
        .predict(&whole(&population), &ad())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::Network);
}

#[tokio::test]
async fn test_rate_limited_provider_falls_back_through_orchestrator() {
    let base = stub(Reply::Status(StatusCode::TOO_MANY_REQUESTS)).await;
    let population = two_identities();

    let run = BatchOrchestrator::new(OrchestratorConfig::default().with_batch_size(1))
        .run(&population, &ad(), Arc::new(client(&base)))
        .await
        .unwrap();

    assert_eq!(run.fallback_batches, 2);
    assert!(
        run.predictions
            .iter()
            .all(|p| p.source == PredictionSource::MockFallback)
    );
}
