use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, Local, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;

use crate::api::error::ApiError;
use crate::db::{query, writer};
use crate::error::ProcessError;
use crate::AppState;

/// Run a read or write against a pooled connection on the blocking pool.
pub(crate) async fn with_conn<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
{
    let pool = state.pool.clone();
    let res = tokio::task::spawn_blocking(move || -> Result<T, ProcessError> {
        let conn = pool.get()?;
        f(&conn).map_err(ProcessError::Store)
    })
    .await
    .map_err(ProcessError::from)?;
    Ok(res?)
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "database": "SQLite",
        "identities": state.cache.len(),
        "boundary_set": state.boundary.get().is_some(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.stats.snapshot())
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], state.stats.metrics_text())
}

pub async fn photo(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    let Some(path) = state.recorder.photos().resolve(&name) else {
        return ApiError(ProcessError::input("Invalid photo name")).into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Serialize)]
struct AbsentRow {
    user_id: String,
    name: String,
    time: &'static str,
    status: &'static str,
}

fn absent_rows(rows: Vec<query::AbsentEntry>) -> Vec<AbsentRow> {
    rows.into_iter()
        .map(|r| AbsentRow { user_id: r.user_id, name: r.name, time: "-", status: "Absent" })
        .collect()
}

fn parse_date(raw: &str) -> Result<String, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| ApiError(ProcessError::input("Invalid date, expected YYYY-MM-DD")))
}

pub async fn attendance_today(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let date = Local::now().format("%Y-%m-%d").to_string();
    let d = date.clone();
    let (present, absent) =
        with_conn(&state, move |conn| Ok((query::attendance_for_date(conn, &d)?, query::absent_for_date(conn, &d)?)))
            .await?;
    Ok(Json(json!({ "date": date, "present_list": present, "absent_list": absent_rows(absent) })))
}

pub async fn date_report(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let date = parse_date(&raw)?;
    let (present, absent) = with_conn(&state, move |conn| {
        let present: Vec<_> = query::attendance_for_date(conn, &date)?
            .into_iter()
            .filter(|r| r.status == "Present")
            .collect();
        Ok((present, query::absent_for_date(conn, &date)?))
    })
    .await?;
    Ok(Json(json!({ "present_list": present, "absent_list": absent_rows(absent) })))
}

pub async fn individual_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = with_conn(&state, move |conn| query::individual_history(conn, &user_id)).await?;
    Ok(Json(rows))
}

#[derive(Debug, Serialize)]
struct Notification {
    #[serde(rename = "type")]
    kind: String,
    user_id: Option<String>,
    date: String,
    time: String,
    message: &'static str,
    photo: String,
    #[serde(skip)]
    timestamp: String,
}

fn split_timestamp(ts: &str) -> (String, String) {
    match ts.split_once(' ') {
        Some((d, t)) => (d.to_string(), t.to_string()),
        None => (ts.to_string(), "00:00:00".to_string()),
    }
}

pub async fn notifications(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let (visitors, breaches) =
        with_conn(&state, |conn| Ok((query::list_visitors(conn)?, query::list_breaches(conn)?))).await?;
    let mut alerts: Vec<Notification> = Vec::with_capacity(visitors.len() + breaches.len());
    for v in visitors {
        let (date, time) = split_timestamp(&v.timestamp);
        alerts.push(Notification {
            kind: v.status,
            user_id: None,
            date,
            time,
            message: "Visitor detected",
            photo: v.photo_path,
            timestamp: v.timestamp,
        });
    }
    for b in breaches {
        let (date, time) = split_timestamp(&b.timestamp);
        alerts.push(Notification {
            kind: b.status,
            user_id: b.user_id,
            date,
            time,
            message: "Zone breach detected",
            photo: b.photo_path,
            timestamp: b.timestamp,
        });
    }
    alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(Json(json!({ "status": "success", "alerts": alerts })))
}

pub async fn clear_notifications(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let (visitors, breaches) = with_conn(&state, writer::clear_notifications).await?;
    tracing::info!(visitors, breaches, "notifications cleared");
    Ok(Json(json!({
        "status": "success",
        "message": "All notifications cleared successfully",
        "visitors_removed": visitors,
        "breaches_removed": breaches,
    })))
}

pub async fn insights(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let since = (Local::now() - Duration::days(30)).format("%Y-%m-%d").to_string();
    let (daily, breaches) = with_conn(&state, move |conn| {
        Ok((query::daily_present_counts(conn, &since)?, query::breach_counts_by_user(conn)?))
    })
    .await?;
    let attendance_data: Vec<_> =
        daily.into_iter().map(|(date, count)| json!({ "date": date, "present_count": count })).collect();
    let zone_breaches: Vec<_> =
        breaches.into_iter().map(|(user_id, count)| json!({ "user_id": user_id, "breach_count": count })).collect();
    Ok(Json(json!({ "attendance_data": attendance_data, "zone_breaches": zone_breaches })))
}
