//! End-to-end dispatcher tests: real `axum::Router` from `server::router`,
//! driven with `tower::ServiceExt::oneshot` rather than a bound TCP listener
//! (spec §4.6, §4.7; SPEC_FULL §A.1 "integration-style tests... for the
//! dispatcher").

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use mtconnect_agent::adapter::AdapterConnection;
use mtconnect_agent::app_state::AppState;
use mtconnect_agent::buffer::Buffer;
use mtconnect_agent::device_model::{Category, Component, DataItem, DeviceModel};
use mtconnect_agent::ingestion::IngestionPipeline;
use mtconnect_agent::observation::{Observation, Value};
use mtconnect_agent::render::JsonRenderer;
use mtconnect_agent::server::{router, standard_routes};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

fn test_state() -> AppState {
    let mut model = DeviceModel::new();
    model.add_agent_device().unwrap();
    let mut device = Component::new("mill1", "Mill01", "Device");
    device.add_data_item(DataItem::new("temp1", "TEMPERATURE", Category::Sample));
    device.add_data_item(DataItem::new("pos1", "POSITION", Category::Sample));
    model.add_device(device).unwrap();

    let buffer = Buffer::new(64, 8);
    buffer.append(Observation::new("temp1", OffsetDateTime::now_utc(), Value::Numeric(21.5)));
    buffer.append(Observation::new("pos1", OffsetDateTime::now_utc(), Value::Numeric(4.0)));

    let pipeline = Arc::new(IngestionPipeline::new(model, buffer));
    AppState {
        pipeline,
        adapters: Arc::new(Vec::<Arc<AdapterConnection>>::new()),
        routes: Arc::new(standard_routes()),
        renderer: Arc::new(JsonRenderer),
        cancellation_token: CancellationToken::new(),
    }
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn probe_returns_all_devices() {
    let app = router(test_state());
    let response = app
        .oneshot(Request::builder().uri("/probe").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.contains("Mill01"));
    assert!(text.contains("Agent"));
}

#[tokio::test]
async fn current_for_unknown_device_is_an_error_response() {
    let app = router(test_state());
    let response = app
        .oneshot(Request::builder().uri("/NoSuchDevice/current").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_ne!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.contains("errorCode"));
}

#[tokio::test]
async fn current_with_path_filters_to_matching_data_item() {
    let app = router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/current?path=//temp1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.contains("temp1"));
    assert!(!text.contains("pos1"));
}

#[tokio::test]
async fn sample_with_path_filters_observations() {
    let app = router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/sample?from=1&count=10&path=//DataItem[@type='POSITION']")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.contains("pos1"));
    assert!(!text.contains("temp1"));
}

#[tokio::test]
async fn unknown_route_maps_to_no_matching_route_error() {
    let app = router(test_state());
    let response = app
        .oneshot(Request::builder().uri("/not/a/real/route/at/all").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_ne!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.contains("errorCode"));
}
