//! HTTP API tests against a server bound to an ephemeral port.

use std::path::Path;

use ctr_studio::StudioConfig;
use ctr_studio::api::{AppState, router};
use serde_json::{Value, json};

const BANK: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data/identity_bank.json");

async fn spawn_server(bank_path: &Path) -> String {
    let config = StudioConfig::default().with_bank_path(bank_path);
    let app = router(AppState::new(config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn post(url: &str, body: Value) -> (u16, Value) {
    let response = reqwest::Client::new().post(url).json(&body).send().await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

async fn get(url: &str) -> (u16, Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_health_and_providers() {
    let base = spawn_server(Path::new(BANK)).await;

    let (status, body) = get(&format!("{}/health", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["available_providers"], json!(["openai", "deepseek", "mock"]));

    let (status, body) = get(&format!("{}/providers", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["available_providers"]["openai"]["default_model"], "gpt-4o-mini");
    assert_eq!(body["available_providers"]["deepseek"]["env_var"], "DEEPSEEK_API_KEY");
    assert_eq!(body["platforms"], json!(["facebook", "tiktok", "amazon"]));

    let (status, body) = get(&format!("{}/", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["endpoints"]["predict"], "/predict-ctr");
}

#[tokio::test]
async fn test_predict_ctr_with_mock() {
    let base = spawn_server(Path::new(BANK)).await;

    let (status, body) = post(
        &format!("{}/predict-ctr?include_details=true", base),
        json!({
            "ad_text": "Special offer on premium coffee",
            "ad_platform": "facebook",
            "population_size": 100,
            "use_mock": true,
            "use_sync": true
        }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["ctr"], 0.27);
    assert_eq!(body["total_identities"], 100);
    assert_eq!(body["provider_used"], "mock");
    assert_eq!(body["model_used"], "mock model (no LLM)");
    assert_eq!(body["processing_mode"], "synchronous sequential");
    assert_eq!(body["ad_platform"], "facebook");

    let details = body["detailed_results"].as_array().unwrap();
    assert_eq!(details.len(), 100);
    assert_eq!(details[0]["id"], 0);
    assert!(details[0]["profile"]["age"].is_string());
    let clicks: u64 = details
        .iter()
        .map(|d| d["click_prediction"].as_u64().unwrap())
        .sum();
    assert_eq!(clicks, body["total_clicks"].as_u64().unwrap());
}

#[tokio::test]
async fn test_predict_ctr_rejects_bad_input() {
    let base = spawn_server(Path::new(BANK)).await;
    let url = format!("{}/predict-ctr", base);

    let (status, body) = post(&url, json!({"ad_text": "  ", "use_mock": true})).await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "bad_request");

    let (status, _) = post(
        &url,
        json!({"ad_text": "coffee", "ad_platform": "myspace", "use_mock": true}),
    )
    .await;
    assert_eq!(status, 400);

    let (status, body) = post(
        &url,
        json!({"ad_text": "coffee", "provider": "gemini", "use_mock": true}),
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["message"].as_str().unwrap().contains("gemini"));

    let (status, _) = post(
        &url,
        json!({"ad_text": "coffee", "population_size": 20000, "use_mock": true}),
    )
    .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_batch_endpoint() {
    let base = spawn_server(Path::new(BANK)).await;
    let url = format!("{}/predict-ctr-batch", base);

    let good = json!({"ad_text": "premium coffee", "population_size": 20, "use_mock": true});
    let bad = json!({"ad_text": "premium coffee", "ad_platform": "radio", "use_mock": true});

    let (status, body) = post(&url, json!([good, bad])).await;
    assert_eq!(status, 200);
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["success"], true);
    assert_eq!(items[0]["total_identities"], 20);
    assert!(items[0].get("detailed_results").is_none());
    assert_eq!(items[1]["success"], false);

    let too_many: Vec<Value> = (0..11).map(|_| good.clone()).collect();
    let (status, body) = post(&url, Value::Array(too_many)).await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_identities_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bank.json");
    std::fs::write(
        &path,
        r#"{"categories": {"age": {"values": ["25-34", "65+"]}}}"#,
    )
    .unwrap();
    let base = spawn_server(&path).await;

    let (status, body) = get(&format!("{}/identities", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["categories"], 1);
    assert_eq!(body["bank"]["categories"]["age"]["values"], json!(["25-34", "65+"]));

    std::fs::write(
        &path,
        r#"{"categories": {"age": {"values": ["25-34"]}, "interest": {"values": ["food"]}}}"#,
    )
    .unwrap();
    let (status, body) = post(&format!("{}/identities/reload", base), json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["categories"], 2);

    // A broken file is rejected and the previous bank stays active.
    std::fs::write(&path, "{ nope").unwrap();
    let (status, body) = post(&format!("{}/identities/reload", base), json!({})).await;
    assert_eq!(status, 503);
    assert_eq!(body["error"], "unavailable");

    let (_, body) = get(&format!("{}/identities", base)).await;
    assert_eq!(body["categories"], 2);
}

#[tokio::test]
async fn test_missing_bank_is_unavailable() {
    let base = spawn_server(Path::new("/no/such/bank.json")).await;
    let (status, body) = post(
        &format!("{}/predict-ctr", base),
        json!({"ad_text": "coffee", "use_mock": true}),
    )
    .await;
    assert_eq!(status, 503);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_request_bank_path_overrides_shared_bank() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seniors.json");
    std::fs::write(
        &path,
        r#"{"categories": {"age": {"values": ["65+"]}, "annual_salary": {"values": [41000.5]}}}"#,
    )
    .unwrap();
    let base = spawn_server(Path::new(BANK)).await;
    let url = format!("{}/predict-ctr?include_details=true", base);

    let (status, body) = post(
        &url,
        json!({
            "ad_text": "premium coffee",
            "population_size": 12,
            "use_mock": true,
            "identity_bank_path": path.to_str().unwrap()
        }),
    )
    .await;
    assert_eq!(status, 200);
    let details = body["detailed_results"].as_array().unwrap();
    assert_eq!(details.len(), 12);
    assert!(details.iter().all(|d| d["profile"]["age"] == "65+"));
    assert!(details.iter().all(|d| d["profile"]["annual_salary"] == 41000.5));
    assert!(details.iter().all(|d| d["profile"].get("gender").is_none()));

    let (status, body) = post(
        &url,
        json!({
            "ad_text": "premium coffee",
            "use_mock": true,
            "identity_bank_path": dir.path().join("missing.json").to_str().unwrap()
        }),
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["message"].as_str().unwrap().contains("missing.json"));
}
