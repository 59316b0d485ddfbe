use std::process::Output;

use assert_cmd::assert::OutputAssertExt;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn sheetsync(server: &str, args: &[&str]) -> Output {
    let server = server.to_string();
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    tokio::task::spawn_blocking(move || {
        Command::cargo_bin("sheetsync")
            .expect("sheetsync binary")
            .env("SHEETSYNC_SERVER", server)
            .env("NO_COLOR", "1")
            .args(args)
            .output()
            .expect("run sheetsync")
    })
    .await
    .expect("join")
}

fn mapping_json(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "sourceSheetId": "SheetA",
        "sourceTab": "Tab1",
        "destSheetId": "SheetB",
        "destTab": "Mirror",
        "name": name,
        "description": "",
    })
}

fn status_json() -> Value {
    json!({
        "isRunning": true,
        "lastSync": null,
        "nextSync": null,
        "totalSyncs": 4,
        "errors": 1,
    })
}

#[tokio::test]
async fn status_renders_table() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sync/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_json()))
        .mount(&server)
        .await;

    sheetsync(&server.uri(), &["status"])
        .await
        .assert()
        .success()
        .stdout(predicate::str::contains("RUNNING"))
        .stdout(predicate::str::contains("total syncs"))
        .stdout(predicate::str::contains("never"));
}

#[tokio::test]
async fn status_json_passes_body_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sync/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_json()))
        .mount(&server)
        .await;

    let output = sheetsync(&server.uri(), &["status", "--json"]).await;
    output.clone().assert().success();
    let body: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["totalSyncs"], 4);
    assert_eq!(body["isRunning"], true);
}

#[tokio::test]
async fn trigger_conflict_surfaces_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sync/trigger"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({ "error": "A sync cycle is already in progress" })),
        )
        .mount(&server)
        .await;

    sheetsync(&server.uri(), &["trigger"])
        .await
        .assert()
        .failure()
        .stderr(predicate::str::contains("409"))
        .stderr(predicate::str::contains("already in progress"));
}

#[tokio::test]
async fn trigger_prints_cycle_report() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sync/trigger"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Manual sync completed successfully",
            "status": status_json(),
            "report": {
                "outcome": "completed",
                "startedAt": "2026-01-01T00:00:00Z",
                "mappingsChecked": 1,
                "mappingsSkipped": 0,
                "decisions": [{
                    "mappingId": "1",
                    "mappingName": "A to B",
                    "direction": "forward",
                    "applied": true,
                }],
                "updatesApplied": 1,
                "sheetsFailed": [],
                "writesFailed": [],
                "writesDeferred": false,
            },
        })))
        .mount(&server)
        .await;

    sheetsync(&server.uri(), &["trigger"])
        .await
        .assert()
        .success()
        .stdout(predicate::str::contains("Manual sync completed successfully"))
        .stdout(predicate::str::contains("A to B [forward]"));
}

#[tokio::test]
async fn mappings_add_posts_camel_case_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/mappings"))
        .and(body_partial_json(json!({
            "sourceSheetId": "SheetA",
            "sourceTab": "Tab1",
            "destSheetId": "SheetB",
            "destTab": "Mirror",
            "name": "A to B",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(mapping_json("1700000000000", "A to B")))
        .expect(1)
        .mount(&server)
        .await;

    sheetsync(
        &server.uri(),
        &[
            "mappings",
            "add",
            "--source-sheet",
            "SheetA",
            "--source-tab",
            "Tab1",
            "--dest-sheet",
            "SheetB",
            "--dest-tab",
            "Mirror",
            "--name",
            "A to B",
        ],
    )
    .await
    .assert()
    .success()
    .stdout(predicate::str::contains("Added mapping 'A to B' (1700000000000)"));
}

#[tokio::test]
async fn mappings_list_handles_empty_and_populated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/mappings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/mappings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([mapping_json("7", "Orders")])))
        .mount(&server)
        .await;

    sheetsync(&server.uri(), &["mappings", "list"])
        .await
        .assert()
        .success()
        .stdout(predicate::str::contains("No mappings configured."));

    sheetsync(&server.uri(), &["mappings", "list"])
        .await
        .assert()
        .success()
        .stdout(predicate::str::contains("Orders"))
        .stdout(predicate::str::contains("SheetB / Mirror"));
}

#[tokio::test]
async fn mappings_update_requires_a_change() {
    let server = MockServer::start().await;
    sheetsync(&server.uri(), &["mappings", "update", "7"])
        .await
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to change"));
}

#[tokio::test]
async fn mappings_remove_unknown_id_fails() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/mappings/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "Mapping not found" })))
        .mount(&server)
        .await;

    sheetsync(&server.uri(), &["mappings", "remove", "missing"])
        .await
        .assert()
        .failure()
        .stderr(predicate::str::contains("Mapping not found"));
}

#[tokio::test]
async fn config_set_reports_validation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sync/config"))
        .and(body_partial_json(json!({ "interval": 5000 })))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "error": "Interval must be at least 10 seconds" })),
        )
        .mount(&server)
        .await;

    sheetsync(&server.uri(), &["config", "set", "--interval-ms", "5000"])
        .await
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 10 seconds"));
}

#[tokio::test]
async fn config_show_prints_settings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sync/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "interval": 60000, "autoStart": true })))
        .mount(&server)
        .await;

    sheetsync(&server.uri(), &["config", "show"])
        .await
        .assert()
        .success()
        .stdout(predicate::str::contains("60000 ms"))
        .stdout(predicate::str::contains("auto start: true"));
}

#[tokio::test]
async fn push_sends_webhook_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .and(body_partial_json(json!({
            "sheetName": "Tab1",
            "range": "B2",
            "values": [["x", 1]],
            "changeType": "EDIT",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Webhook processed successfully",
            "result": {
                "outcome": "applied",
                "mappingId": "1",
                "destSheetId": "SheetB",
                "destRange": "Mirror!B2",
            },
        })))
        .expect(1)
        .mount(&server)
        .await;

    sheetsync(
        &server.uri(),
        &["push", "--sheet-name", "Tab1", "--range", "B2", "--values", r#"[["x", 1]]"#],
    )
    .await
    .assert()
    .success()
    .stdout(predicate::str::contains("Pushed to SheetB Mirror!B2"));
}

#[tokio::test]
async fn push_rejects_malformed_values() {
    let server = MockServer::start().await;
    sheetsync(
        &server.uri(),
        &["push", "--sheet-name", "Tab1", "--range", "A1", "--values", "not json"],
    )
    .await
    .assert()
    .failure()
    .stderr(predicate::str::contains("--values must be a JSON array of rows"));
}

#[tokio::test]
async fn cache_reset_prints_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/cache/reset"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "Checksum cache reset" })))
        .mount(&server)
        .await;

    sheetsync(&server.uri(), &["cache", "reset"])
        .await
        .assert()
        .success()
        .stdout(predicate::str::contains("Checksum cache reset"));
}

#[tokio::test]
async fn unreachable_daemon_is_reported() {
    sheetsync("http://127.0.0.1:9", &["status"])
        .await
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not reach sheetsync daemon"));
}
