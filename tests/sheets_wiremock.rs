#![cfg(feature = "sheets")]

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use mf_snapshot::clock::FixedClock;
use mf_snapshot::config::SheetsSettings;
use mf_snapshot::models::{PortfolioSnapshot, SheetTarget};
use mf_snapshot::pipeline::SnapshotSink;
use mf_snapshot::sheets::{SheetAppender, SheetsClient, StaticToken};
use mf_snapshot::Error;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn appender(server: &MockServer) -> SheetAppender {
    let client =
        SheetsClient::new(Arc::new(StaticToken::new("test-token"))).with_base_url(server.uri());
    let today = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
    SheetAppender::new(client, &SheetsSettings::default()).with_clock(Arc::new(FixedClock::new(today)))
}

fn snapshot() -> PortfolioSnapshot {
    PortfolioSnapshot::from_display("₹16,69,587.70", "₹24,35,259.14", "₹7,65,671.44", "45.86%")
}

fn append_response() -> Value {
    json!({
        "spreadsheetId": "sheet-1",
        "tableRange": "'Mutual Funds'!A1:C4",
        "updates": {
            "spreadsheetId": "sheet-1",
            "updatedRange": "'Mutual Funds'!A5:C5",
            "updatedRows": 1,
            "updatedColumns": 3,
            "updatedCells": 3
        }
    })
}

async fn mount_append(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/v4/spreadsheets/sheet-1/values/.+:append$"))
        .and(query_param("valueInputOption", "USER_ENTERED"))
        .and(query_param("insertDataOption", "INSERT_ROWS"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(append_response()))
        .mount(server)
        .await;
}

async fn append_request(server: &MockServer) -> (String, Value) {
    let requests = server.received_requests().await.unwrap_or_default();
    let append = requests
        .iter()
        .find(|r| r.method.as_str() == "POST")
        .expect("expected an append request");
    let range = append
        .url
        .path()
        .trim_start_matches("/v4/spreadsheets/sheet-1/values/")
        .trim_end_matches(":append");
    let range = urlencoding::decode(range).unwrap().into_owned();
    let body: Value = serde_json::from_slice(&append.body).unwrap();
    (range, body)
}

#[tokio::test]
async fn auto_resolves_preferred_tab_and_writes_row() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-1"))
        .and(query_param("fields", "sheets(properties(title))"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sheets": [
                { "properties": { "title": "Summary" } },
                { "properties": { "title": "Mutual Funds" } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_append(&server).await;

    let outcome = appender(&server)
        .append(&snapshot(), &SheetTarget::new("sheet-1"))
        .await?;
    assert_eq!(outcome.updated_cells(), Some(3));

    let (range, body) = append_request(&server).await;
    assert_eq!(range, "'Mutual Funds'!A:C");
    assert_eq!(
        body,
        json!({ "values": [["07-03-2024", "1669587.70", "2435259.14"]] })
    );
    Ok(())
}

#[tokio::test]
async fn falls_back_to_first_tab() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sheets": [{ "properties": { "title": "Holdings" } }]
        })))
        .mount(&server)
        .await;
    mount_append(&server).await;

    appender(&server)
        .append(&snapshot(), &SheetTarget::new("sheet-1"))
        .await?;

    let (range, _) = append_request(&server).await;
    assert_eq!(range, "Holdings!A:C");
    Ok(())
}

#[tokio::test]
async fn empty_document_uses_sheet1() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    mount_append(&server).await;

    appender(&server)
        .append(&snapshot(), &SheetTarget::new("sheet-1"))
        .await?;

    let (range, _) = append_request(&server).await;
    assert_eq!(range, "Sheet1!A:C");
    Ok(())
}

#[tokio::test]
async fn explicit_tab_skips_metadata_request() -> Result<()> {
    let server = MockServer::start().await;
    mount_append(&server).await;

    let target = SheetTarget::new("sheet-1").with_tab(Some("Funds 2024"));
    appender(&server).append(&snapshot(), &target).await?;

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(
        requests.iter().all(|r| r.method.as_str() == "POST"),
        "expected no metadata request"
    );
    let (range, _) = append_request(&server).await;
    assert_eq!(range, "'Funds 2024'!A:C");
    Ok(())
}

#[tokio::test]
async fn api_failure_surfaces_generic_error() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": 403, "message": "The caller does not have permission" }
        })))
        .mount(&server)
        .await;

    let target = SheetTarget::new("sheet-1").with_tab(Some("Mutual Funds"));
    let err = appender(&server)
        .append(&snapshot(), &target)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::SheetAppend));
    assert_eq!(err.to_string(), "failed to append data to the spreadsheet");
    Ok(())
}

#[tokio::test]
async fn metadata_failure_surfaces_generic_error() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = appender(&server)
        .append(&snapshot(), &SheetTarget::new("sheet-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::SheetAppend));
    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.iter().all(|r| r.method.as_str() == "GET"));
    Ok(())
}
