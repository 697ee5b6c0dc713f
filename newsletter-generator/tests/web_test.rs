mod common;

use common::{start_fixture_server, test_config};
use newsletter_generator::web::{create_app, AppState};
use newsletter_generator::{LlmAdapter, MockLlmAdapter, NewsletterPipeline, OutputFormat, Result};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

async fn start_gui(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_app(Arc::new(state));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn post(client: &reqwest::Client, url: String, body: Value) -> (u16, Value) {
    let response = client.post(url).json(&body).send().await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap_or(Value::Null))
}

async fn wait_for_finish(client: &reqwest::Client, gui: SocketAddr) -> Value {
    for _ in 0..200 {
        let status: Value = client
            .get(format!("http://{}/api/status", gui))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if status["state"] != "generating" {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("generation did not finish in time");
}

#[tokio::test]
async fn test_gui_workflow_generates_and_serves_outputs() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let fixture = start_fixture_server().await;
    let output = tempfile::tempdir()?;
    let profiles = tempfile::tempdir()?;
    let mut config = test_config(fixture, output.path());
    config.newsletter.output_formats = vec![OutputFormat::Markdown];
    config.newsletter.profiles_dir = profiles.path().to_path_buf();
    config.filter.relevance_threshold = 0.0;

    let adapter: Arc<dyn LlmAdapter> = Arc::new(MockLlmAdapter::new("gui".to_string()));
    let pipeline = NewsletterPipeline::new(&config, Some(adapter))?;
    let gui = start_gui(AppState::new(config, pipeline)).await;
    let client = reqwest::Client::new();
    let api = |path: &str| format!("http://{}{}", gui, path);

    let page = client.get(api("/")).send().await.unwrap().text().await.unwrap();
    assert!(page.contains("Newsletter Generator"));

    // Nothing can happen before interests are entered
    let (code, _) = post(&client, api("/api/configure"), json!({ "max_articles": 2 })).await;
    assert_eq!(code, 409);

    let (code, body) = post(&client, api("/api/interests"), json!({ "text": "Rust, AI" })).await;
    info!("Interests response: {}", body);
    assert_eq!(code, 200);
    assert_eq!(body["state"], "interests_entered");
    let interests: Vec<String> = serde_json::from_value(body["interests"].clone())?;
    assert!(interests.contains(&"rust".to_string()));

    // Generation needs a configuration step first
    let (code, _) = post(&client, api("/api/generate"), json!({})).await;
    assert_eq!(code, 409);

    let (code, body) = post(&client, api("/api/configure"), json!({ "max_articles": 2, "include_images": false })).await;
    assert_eq!(code, 200);
    assert_eq!(body["state"], "configured");

    let (code, _) = post(&client, api("/api/configure"), json!({ "relevance_threshold": 1.5 })).await;
    assert_eq!(code, 400);

    let (code, body) = post(&client, api("/api/generate"), json!({})).await;
    assert_eq!(code, 202);
    assert!(body["run_id"].is_string());

    let status = wait_for_finish(&client, gui).await;
    info!("Final status: {}", status);
    assert_eq!(status["state"], "completed");
    assert_eq!(status["article_count"], 2);
    assert_eq!(status["stage"], "done");

    let preview = client.get(api("/api/preview")).send().await.unwrap();
    assert_eq!(preview.status().as_u16(), 200);
    let preview = preview.text().await.unwrap();
    assert!(preview.starts_with("# Daily Tech Digest"));
    assert!(preview.contains("summarized by gui."));
    // Preview follows the run's overrides, not the base config
    assert!(!preview.contains("!["));

    let download = client.get(api("/api/download/markdown")).send().await.unwrap();
    assert_eq!(download.status().as_u16(), 200);
    let disposition = download
        .headers()
        .get("content-disposition")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(disposition.contains("newsletter_"));
    assert_eq!(download.text().await.unwrap(), preview);

    let missing = client.get(api("/api/download/pdf")).send().await.unwrap();
    assert_eq!(missing.status().as_u16(), 404);
    let unknown = client.get(api("/api/download/docx")).send().await.unwrap();
    assert_eq!(unknown.status().as_u16(), 400);

    // Save the session interests as a profile
    let (code, body) = post(&client, api("/api/profiles"), json!({ "name": "Web Reader" })).await;
    assert_eq!(code, 201);
    assert_eq!(body["name"], "Web Reader");
    let names: Vec<String> = client.get(api("/api/profiles")).send().await.unwrap().json().await.unwrap();
    assert_eq!(names, vec!["Web Reader".to_string()]);

    // A later failed run must not keep serving the earlier newsletter
    let blocker = output.path().join("blocker");
    std::fs::write(&blocker, b"occupied")?;
    let (code, _) = post(&client, api("/api/configure"), json!({ "output_dir": blocker })).await;
    assert_eq!(code, 200);
    let (code, _) = post(&client, api("/api/generate"), json!({})).await;
    assert_eq!(code, 202);
    let status = wait_for_finish(&client, gui).await;
    info!("Status after failing run: {}", status);
    assert_eq!(status["state"], "failed");

    let preview = client.get(api("/api/preview")).send().await.unwrap();
    assert_eq!(preview.status().as_u16(), 404);
    let download = client.get(api("/api/download/markdown")).send().await.unwrap();
    assert_eq!(download.status().as_u16(), 404);

    Ok(())
}

#[tokio::test]
async fn test_gui_cancel_discards_the_run() -> Result<()> {
    let fixture = start_fixture_server().await;
    let output = tempfile::tempdir()?;
    let profiles = tempfile::tempdir()?;
    let mut config = test_config(fixture, output.path());
    config.newsletter.output_formats = vec![OutputFormat::Markdown];
    config.newsletter.profiles_dir = profiles.path().to_path_buf();

    let adapter: Arc<dyn LlmAdapter> = Arc::new(MockLlmAdapter::new("slow".to_string()).with_delay(2_000));
    let pipeline = NewsletterPipeline::new(&config, Some(adapter))?;
    let gui = start_gui(AppState::new(config, pipeline)).await;
    let client = reqwest::Client::new();
    let api = |path: &str| format!("http://{}{}", gui, path);

    post(&client, api("/api/interests"), json!({ "interests": ["rust"] })).await;
    post(&client, api("/api/configure"), json!({})).await;
    let (code, _) = post(&client, api("/api/generate"), json!({})).await;
    assert_eq!(code, 202);

    let (code, body) = post(&client, api("/api/cancel"), json!({})).await;
    assert_eq!(code, 200);
    assert_eq!(body["state"], "failed");

    // A second cancel has nothing to act on
    let (code, _) = post(&client, api("/api/cancel"), json!({})).await;
    assert_eq!(code, 409);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let status: Value = client.get(api("/api/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(status["state"], "failed");
    assert_eq!(status["failure"], "cancelled");
    assert!(status["outputs"].as_array().map(|o| o.is_empty()).unwrap_or(false));
    assert!(std::fs::read_dir(output.path())?.next().is_none());

    // No report is kept from the cancelled run
    let preview = client.get(api("/api/preview")).send().await.unwrap();
    assert_eq!(preview.status().as_u16(), 404);

    Ok(())
}
