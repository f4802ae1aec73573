mod common;

use std::sync::Arc;

use common::*;
use futures_util::future::join_all;
use hostelwatch_backend_sqlite::db;
use hostelwatch_backend_sqlite::models::identity::Role;
use hostelwatch_backend_sqlite::pipeline::alert::LogNotifier;
use hostelwatch_backend_sqlite::AppState;
use reqwest::StatusCode;
use serde_json::json;

const GREEN: [u8; 3] = [30, 200, 30];
const RED: [u8; 3] = [220, 30, 30];

fn square_boundary() -> serde_json::Value {
    json!({ "boundary": [
        { "x": 0.0, "y": 0.0 },
        { "x": 64.0, "y": 0.0 },
        { "x": 64.0, "y": 64.0 },
        { "x": 0.0, "y": 64.0 }
    ]})
}

async fn fenced_app(faces: Vec<FakeFace>) -> TestApp {
    let app = spawn_app(
        vec![seed("HST-0001", Role::Hostelite, axis(0)), seed("WDN-01", Role::Warden, axis(1))],
        faces,
    )
    .await;
    let (status, body) = app.post_json("/save_geo_fence_boundary", square_boundary()).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    app
}

#[tokio::test]
async fn test_geofence_requires_boundary() {
    let face = face_at(16.0, 16.0, GREEN, axis(0));
    let app = spawn_app(vec![], vec![face.clone()]).await;

    let (status, body) = app.get_json("/get_geo_fence_boundary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["boundary"].as_array().unwrap().len(), 0);

    let (status, body) = app.post_frame("/process_geo_fence", &[face]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Geo-fence boundary not set");
}

#[tokio::test]
async fn test_boundary_validation_and_round_trip() {
    let app = spawn_app(vec![], vec![]).await;

    let two = json!({ "boundary": [{ "x": 0.0, "y": 0.0 }, { "x": 5.0, "y": 5.0 }] });
    let (status, body) = app.post_json("/save_geo_fence_boundary", two).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid boundary: Minimum 3 points required");

    let (status, _) = app.post_json("/save_geo_fence_boundary", json!({ "boundary": [{ "x": "a" }] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.post_json("/save_geo_fence_boundary", square_boundary()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Geo-fence boundary saved successfully");

    let (_, body) = app.get_json("/get_geo_fence_boundary").await;
    let points = body["boundary"].as_array().unwrap();
    assert_eq!(points.len(), 4);
    assert_eq!(points[2]["x"].as_f64().unwrap(), 64.0);
    assert_eq!(app.count("SELECT COUNT(*) FROM geo_fence_boundary"), 1);

    // A fresh state over the same store picks the boundary back up.
    let config = app.state.config.clone();
    let pool = db::create_pool(config.db_path(), 2).unwrap();
    let fake = Arc::new(FakeInference::new(vec![]));
    let reloaded = AppState::build(config, pool, fake.clone(), fake, Arc::new(LogNotifier)).await.unwrap();
    assert_eq!(reloaded.boundary.get().unwrap().points().len(), 4);
}

#[tokio::test]
async fn test_faces_outside_boundary_are_ignored() {
    let outside = face_at(80.0, 80.0, RED, axis(0));
    let app = fenced_app(vec![outside.clone()]).await;

    let (status, body) = app.post_frame("/process_geo_fence", &[outside]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "No faces detected in boundary");
    assert_eq!(body["results"].as_array().unwrap().len(), 0);
    assert_eq!(app.count("SELECT COUNT(*) FROM geo_fence"), 0);
}

#[tokio::test]
async fn test_warden_inside_is_authorized() {
    let warden = face_at(16.0, 16.0, GREEN, at_distance(1, 2, 0.2));
    let app = fenced_app(vec![warden.clone()]).await;

    let (status, body) = app.post_frame("/process_geo_fence", &[warden]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["status"], "Authorized in Zone");
    assert_eq!(body["results"][0]["user_id"], "WDN-01");
    assert_eq!(body["message"], "Authorized warden WDN-01 in zone");
    assert_eq!(app.count("SELECT COUNT(*) FROM geo_fence"), 0);
    assert!(app.photo_files("breach_").is_empty());
}

#[tokio::test]
async fn test_hostelite_and_unknown_inside_are_breaches() {
    let hostelite = face_at(2.0, 2.0, GREEN, at_distance(0, 2, 0.2));
    let stranger = face_at(34.0, 34.0, RED, axis(6));
    let app = fenced_app(vec![hostelite.clone(), stranger.clone()]).await;

    let (status, body) = app.post_frame("/process_geo_fence", &[hostelite, stranger]).await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["status"], "Zone Breach");
    assert_eq!(results[0]["user_id"], "HST-0001");
    assert_eq!(results[1]["status"], "Zone Breach");
    assert!(results[1]["user_id"].is_null());
    assert_eq!(
        body["message"],
        "Hostelite breach: HST-0001 (face 1); Unauthorized breach detected (face 2)"
    );

    assert_eq!(app.count("SELECT COUNT(*) FROM geo_fence"), 2);
    assert_eq!(app.count("SELECT COUNT(*) FROM geo_fence WHERE user_id = 'HST-0001'"), 1);
    assert_eq!(app.photo_files("breach_").len(), 2);

    let mut alerts = app.wait_for_alerts(2).await;
    alerts.sort();
    assert_eq!(alerts.len(), 2);
    assert!(alerts[0].starts_with("An Unknown Zone Breach Detected at "));
    assert!(alerts[1].starts_with("Zone Breach Detected for HST-0001 at "));

    let (_, insights) = app.get_json("/insights").await;
    assert_eq!(insights["zone_breaches"][0]["user_id"], "HST-0001");
    assert_eq!(insights["zone_breaches"][0]["breach_count"], 1);

    let (_, notes) = app.get_json("/notifications").await;
    assert_eq!(notes["alerts"].as_array().unwrap().len(), 2);
    let (status, cleared) = app.post_json("/clear_notifications", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["breaches_removed"], 2);
    let (_, notes) = app.get_json("/notifications").await;
    assert!(notes["alerts"].as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_boundary_saves_agree_with_store() {
    let app = spawn_app(vec![], vec![]).await;

    let saves = (3..9).map(|n| {
        let points: Vec<_> = (0..n)
            .map(|i| {
                let a = i as f64 / n as f64 * std::f64::consts::TAU;
                json!({ "x": 32.0 + 30.0 * a.cos(), "y": 32.0 + 30.0 * a.sin() })
            })
            .collect();
        app.post_json("/save_geo_fence_boundary", json!({ "boundary": points }))
    });
    for (status, body) in join_all(saves).await {
        assert_eq!(status, StatusCode::OK, "{}", body);
    }

    let (_, body) = app.get_json("/get_geo_fence_boundary").await;
    let live = body["boundary"].as_array().unwrap().len();
    let conn = app.state.pool.get().unwrap();
    let stored: String = conn.query_row("SELECT points_json FROM geo_fence_boundary", [], |r| r.get(0)).unwrap();
    let stored: Vec<serde_json::Value> = serde_json::from_str(&stored).unwrap();
    assert_eq!(stored.len(), live);
}
