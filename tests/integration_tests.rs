// Integration tests: publisher output and HTTP endpoints

mod common;

use axum_test::TestServer;
use common::{T, order, result};
use pingboard::publisher::{IndexPublisher, SnapshotPublisher, render_html};
use pingboard::routes;
use pingboard::series::Series;
use tempfile::TempDir;

fn published_series() -> (Series, pingboard::models::TargetOrder) {
    let order = order(&["tokyo", "paris"]);
    let mut series = Series::new(10);
    series.insert(&result("tokyo", 120, T), &order);
    series.insert(&result("paris", 6000, T), &order);
    series.insert(&result("tokyo", -1, T + 60), &order);
    (series, order)
}

#[test]
fn snapshot_cells_follow_target_order() {
    let (series, order) = published_series();
    let snapshot = pingboard::models::Snapshot::build(
        &order,
        series.buckets(),
        5000,
        chrono::Local::now(),
    );
    assert_eq!(snapshot.names, vec!["tokyo", "paris"]);
    assert_eq!(snapshot.rows.len(), 2);
    assert_eq!(snapshot.rows[0].minute, T + 60);
    assert_eq!(snapshot.rows[0].latencies, vec![Some(-1), None]);
    assert_eq!(snapshot.rows[1].latencies, vec![Some(120), Some(6000)]);
    assert!(snapshot.is_slow(6000));
    assert!(snapshot.is_slow(-1));
    assert!(!snapshot.is_slow(120));
}

#[test]
fn html_marks_slow_cells_and_escapes_names() {
    let order = order(&["<a&b>"]);
    let mut series = Series::new(10);
    series.insert(&result("<a&b>", 9000, T), &order);
    let snapshot =
        pingboard::models::Snapshot::build(&order, series.buckets(), 5000, chrono::Local::now());
    let html = render_html(&snapshot);
    assert!(html.contains("<th>&lt;a&amp;b&gt;</th>"));
    assert!(html.contains("<td class=\"slow\">9000</td>"));
}

#[tokio::test]
async fn test_index_is_404_before_first_publish() {
    let dir = TempDir::new().unwrap();
    let (publisher, snapshots) = IndexPublisher::new(dir.path(), 5000);
    let server = TestServer::new(routes::app(publisher.path().to_path_buf(), snapshots)).unwrap();

    let response = server.get("/").await;
    response.assert_status_not_found();
    response.assert_text("not found");
    server.get("/api/snapshot").await.assert_status_not_found();
}

#[tokio::test]
async fn test_index_and_snapshot_after_publish() {
    let dir = TempDir::new().unwrap();
    let (mut publisher, snapshots) = IndexPublisher::new(dir.path(), 5000);
    let (series, order) = published_series();
    publisher.publish(&order, series.buckets());
    assert!(dir.path().join("index.htm").exists());

    let server = TestServer::new(routes::app(publisher.path().to_path_buf(), snapshots)).unwrap();

    let response = server.get("/").await;
    response.assert_status_ok();
    assert_eq!(
        response.header("content-type").to_str().unwrap(),
        "text/html; charset=UTF-8"
    );
    let body = response.text();
    assert!(body.contains("<th>tokyo</th><th>paris</th>"));
    assert!(body.contains("<td class=\"slow\">6000</td>"));

    let json: serde_json::Value = server.get("/api/snapshot").await.json();
    assert_eq!(json["names"], serde_json::json!(["tokyo", "paris"]));
    assert_eq!(json["slowThresholdMs"], 5000);
    assert_eq!(json["rows"][0]["minute"], T + 60);
    assert_eq!(json["rows"][0]["latencies"], serde_json::json!([-1, null]));
}

#[tokio::test]
async fn test_version_endpoint() {
    let dir = TempDir::new().unwrap();
    let (publisher, snapshots) = IndexPublisher::new(dir.path(), 5000);
    let server = TestServer::new(routes::app(publisher.path().to_path_buf(), snapshots)).unwrap();
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(
        json.get("name").and_then(|v| v.as_str()),
        Some("pingboard")
    );
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}
