use std::ops::RangeInclusive;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;

use crate::models::event::{CoordinateInput, Event, NewEvent};
use crate::utils::error::AppError;
use crate::utils::response::{empty_success, success};

const LATITUDE_RANGE: RangeInclusive<f64> = -90.0..=90.0;
const LONGITUDE_RANGE: RangeInclusive<f64> = -180.0..=180.0;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn root() -> Response {
    empty_success("geoevents API is running").into_response()
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "geoevents-api",
    };

    success(payload, "Health check successful").into_response()
}

/// `GET /api/events` — every event, newest first. The client replaces its
/// whole local list with this response, so no pagination.
pub async fn list_events(State(pool): State<PgPool>) -> Result<Json<Vec<Event>>, AppError> {
    let events = sqlx::query_as::<_, Event>(
        "SELECT id, title, description, lat, lng, created_at, updated_at \
         FROM events_entries \
         ORDER BY created_at DESC",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(events))
}

/// `POST /api/events` — validates the draft, persists one row, returns it
/// with the assigned id. Nothing is written when validation fails.
pub async fn create_event(
    State(pool): State<PgPool>,
    Json(input): Json<NewEvent>,
) -> Result<Response, AppError> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(AppError::ValidationError(
            "title must not be empty".to_string(),
        ));
    }

    let lat = validated_coordinate(&input.lat, "lat", LATITUDE_RANGE)?;
    let lng = validated_coordinate(&input.lng, "lng", LONGITUDE_RANGE)?;

    let description = input
        .description
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty());

    // One instant for both timestamps; there is no update path.
    let now = Utc::now();

    let event = sqlx::query_as::<_, Event>(
        "INSERT INTO events_entries (title, description, lat, lng, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id, title, description, lat, lng, created_at, updated_at",
    )
    .bind(title)
    .bind(description)
    .bind(lat)
    .bind(lng)
    .bind(now)
    .bind(now)
    .fetch_one(&pool)
    .await?;

    tracing::info!(event_id = event.id, lat, lng, "Event created");

    Ok((StatusCode::CREATED, Json(event)).into_response())
}

fn validated_coordinate(
    raw: &CoordinateInput,
    field: &str,
    range: RangeInclusive<f64>,
) -> Result<f64, AppError> {
    let value = raw.parse().ok_or_else(|| {
        AppError::ValidationError(format!("{field} must be a number in decimal degrees"))
    })?;

    // NaN fails the range check as well
    if !range.contains(&value) {
        return Err(AppError::ValidationError(format!(
            "{field} must be between {} and {}",
            range.start(),
            range.end()
        )));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::routes::create_routes;

    // Lazy pool: validation failures must reject before any connection is made.
    fn test_app() -> Router {
        let pool =
            sqlx::PgPool::connect_lazy("postgres://localhost/events_db_test").expect("test pool");
        create_routes(pool)
    }

    async fn post_event(app: Router, body: Value) -> axum::response::Response {
        app.oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/events")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn boundary_coordinates_are_accepted() {
        for value in ["90", "-90"] {
            let raw = CoordinateInput::Text(value.to_string());
            assert!(validated_coordinate(&raw, "lat", LATITUDE_RANGE).is_ok());
        }
        for value in ["180", "-180"] {
            let raw = CoordinateInput::Text(value.to_string());
            assert!(validated_coordinate(&raw, "lng", LONGITUDE_RANGE).is_ok());
        }
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let lat = CoordinateInput::Number(90.0001);
        assert!(validated_coordinate(&lat, "lat", LATITUDE_RANGE).is_err());

        let lng = CoordinateInput::Number(-200.0);
        assert!(validated_coordinate(&lng, "lng", LONGITUDE_RANGE).is_err());
    }

    #[test]
    fn nan_text_is_rejected() {
        let raw = CoordinateInput::Text("NaN".to_string());
        assert!(validated_coordinate(&raw, "lat", LATITUDE_RANGE).is_err());
    }

    #[tokio::test]
    async fn root_reports_liveness() {
        let response = test_app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["status"], "ok");
    }

    #[tokio::test]
    async fn create_rejects_out_of_range_latitude() {
        let response = post_event(
            test_app(),
            json!({"title": "Bad", "lat": "91", "lng": "0"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn create_rejects_out_of_range_longitude() {
        let response = post_event(
            test_app(),
            json!({"title": "Bad", "lat": 0, "lng": -200}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_rejects_non_numeric_coordinates() {
        let response = post_event(
            test_app(),
            json!({"title": "Bad", "lat": "somewhere", "lng": "0"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn create_rejects_blank_title() {
        let response = post_event(
            test_app(),
            json!({"title": "   ", "lat": "10", "lng": "20"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    #[ignore = "needs a live Postgres at DATABASE_URL"]
    async fn created_event_appears_once_in_listing() {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = sqlx::PgPool::connect(&database_url).await.expect("connect");
        sqlx::migrate!().run(&pool).await.expect("migrations");
        let app = create_routes(pool);

        let created = post_event(
            app.clone(),
            json!({
                "title": "Launch",
                "description": "Roundtrip check",
                "lat": "37.7749",
                "lng": "-122.4194"
            }),
        )
        .await;
        assert_eq!(created.status(), StatusCode::CREATED);
        let created = body_json(created).await;
        assert_eq!(created["title"], "Launch");
        assert_eq!(created["lat"], 37.7749);
        assert_eq!(created["created_at"], created["updated_at"]);
        let id = created["id"].as_i64().unwrap();

        let listed = app
            .oneshot(
                Request::builder()
                    .uri("/api/events")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(listed.status(), StatusCode::OK);
        let listed = body_json(listed).await;
        let matches = listed
            .as_array()
            .unwrap()
            .iter()
            .filter(|event| event["id"].as_i64() == Some(id))
            .count();
        assert_eq!(matches, 1);
    }
}
