use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use mf_snapshot::config::{PortalConfig, Timings};
use mf_snapshot::models::{PortfolioSnapshot, SheetTarget};
use mf_snapshot::pipeline::{AppendOutcome, SnapshotSink, UpdateSummary};
use mf_snapshot::portal::{PortalScraper, PortalScript, ScriptedPortal};
use mf_snapshot_server::{router, AppState};
use serde_json::{json, Value};

#[derive(Default)]
struct RecordingSink {
    targets: Mutex<Vec<SheetTarget>>,
}

#[async_trait]
impl SnapshotSink for RecordingSink {
    async fn append(
        &self,
        _snapshot: &PortfolioSnapshot,
        target: &SheetTarget,
    ) -> mf_snapshot::Result<AppendOutcome> {
        self.targets
            .lock()
            .expect("sink lock poisoned")
            .push(target.clone());
        Ok(AppendOutcome {
            spreadsheet_id: Some(target.spreadsheet_id.clone()),
            table_range: None,
            updates: Some(UpdateSummary {
                updated_cells: Some(3),
                ..UpdateSummary::default()
            }),
        })
    }
}

struct TestServer {
    base: String,
    portal: ScriptedPortal,
    sink: Arc<RecordingSink>,
}

async fn spawn(script: PortalScript) -> Result<TestServer> {
    let portal = ScriptedPortal::new(script);
    let scraper = PortalScraper::new(portal.clone(), &PortalConfig::default(), Timings::instant())?
        .with_screenshot_path(std::env::temp_dir().join("mf-snapshot-server-test.png"));
    let sink = Arc::new(RecordingSink::default());

    let app = router(AppState::new(Arc::new(scraper), sink.clone()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok(TestServer {
        base: format!("http://{addr}"),
        portal,
        sink,
    })
}

async fn post(server: &TestServer, body: Value) -> Result<(u16, Value)> {
    let response = reqwest::Client::new()
        .post(format!("{}/api/scrape", server.base))
        .json(&body)
        .send()
        .await?;
    let status = response.status().as_u16();
    Ok((status, response.json().await?))
}

#[tokio::test]
async fn missing_credentials_are_rejected_without_scraping() -> Result<()> {
    let server = spawn(PortalScript::default()).await?;

    let (status, body) = post(&server, json!({ "pan": "ABCDE1234F", "password": "" })).await?;

    assert_eq!(status, 400);
    assert_eq!(body["error"], "Missing credentials");
    assert_eq!(body["success"], false);
    assert_eq!(server.portal.record().launches, 0);
    Ok(())
}

#[tokio::test]
async fn scrape_without_spreadsheet_skips_append() -> Result<()> {
    let server = spawn(PortalScript::default().with_question("Q1")).await?;

    let (status, body) = post(
        &server,
        json!({
            "pan": "ABCDE1234F",
            "password": "s3cret",
            "securityQuestions": { "Q1": "A1" }
        }),
    )
    .await?;

    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["investedValue"], "100000.00");
    assert_eq!(body["data"]["marketValue"], "110000.00");
    assert_eq!(body["data"]["gainLossPercentage"], "10");
    assert!(body["sheetResult"].is_null());
    assert!(server.sink.targets.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn spreadsheet_target_is_forwarded_to_sink() -> Result<()> {
    let server = spawn(PortalScript::default().with_question("Q1")).await?;

    let (status, body) = post(
        &server,
        json!({
            "pan": "ABCDE1234F",
            "password": "s3cret",
            "securityQuestions": { "Q1": "A1" },
            "spreadsheetId": "sheet-123",
            "sheetName": ""
        }),
    )
    .await?;

    assert_eq!(status, 200);
    assert_eq!(body["sheetResult"]["spreadsheetId"], "sheet-123");
    assert_eq!(body["sheetResult"]["updates"]["updatedCells"], 3);

    let targets = server.sink.targets.lock().unwrap().clone();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].spreadsheet_id, "sheet-123");
    assert_eq!(targets[0].tab(), None);
    Ok(())
}

#[tokio::test]
async fn scrape_failure_is_a_500_with_message() -> Result<()> {
    let server = spawn(PortalScript::default().with_question("Q9")).await?;

    let (status, body) = post(
        &server,
        json!({
            "pan": "ABCDE1234F",
            "password": "s3cret",
            "securityQuestions": { "Q1": "A1" }
        }),
    )
    .await?;

    assert_eq!(status, 500);
    assert_eq!(body["success"], false);
    assert!(body["error"]
        .as_str()
        .unwrap_or_default()
        .contains("security questions"));
    assert!(server.portal.record().closed);
    Ok(())
}

#[tokio::test]
async fn malformed_body_is_a_400() -> Result<()> {
    let server = spawn(PortalScript::default()).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/scrape", server.base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await?;

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["success"], false);
    Ok(())
}

#[tokio::test]
async fn form_is_served_at_root() -> Result<()> {
    let server = spawn(PortalScript::default()).await?;

    let html = reqwest::get(format!("{}/", server.base)).await?.text().await?;

    assert!(html.contains("/api/scrape"));
    assert!(html.contains("Mutual Funds"));
    Ok(())
}
