mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use callbridge_api::{config::Config, router::create_router, state::AppState};
use callbridge_core::profile::{AudioFormat, StreamTrack};
use common::test_config;
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceExt;

fn app_with(config: Config) -> (Router, Arc<AppState>) {
    let profile = config.session_profile();
    let state = Arc::new(AppState::new(config, profile));
    (create_router(state.clone()), state)
}

fn app() -> (Router, Arc<AppState>) {
    app_with(test_config(SocketAddr::from(([127, 0, 0, 1], 9))))
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_incoming_call_returns_stream_directive() {
    let (app, _) = app();
    let request = Request::builder()
        .method("POST")
        .uri("/call")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("CallSid=CA123&From=%2B15550100"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/xml"
    );

    let xml = body_text(response).await;
    assert!(xml.contains("<Connect>"));
    assert!(xml.contains(r#"url="wss://relay.example.com/twilio-stream""#));
    assert!(xml.contains(r#"track="inbound_track""#));
    assert!(xml.contains(r#"audio-format="audio/x-pcm;bitrate=24000""#));
}

#[tokio::test]
async fn test_incoming_call_honours_track_and_rate() {
    let mut config = test_config(SocketAddr::from(([127, 0, 0, 1], 9)));
    config.stream_track = StreamTrack::BothTracks;
    config.audio_format = AudioFormat { sample_rate: 8000 };
    let (app, _) = app_with(config);

    let request = Request::builder()
        .method("POST")
        .uri("/call")
        .body(Body::empty())
        .unwrap();
    let xml = body_text(app.oneshot(request).await.unwrap()).await;
    assert!(xml.contains(r#"track="both_tracks""#));
    assert!(xml.contains(r#"audio-format="audio/x-pcm;bitrate=8000""#));
}

#[tokio::test]
async fn test_get_on_call_route_is_rejected() {
    let (app, _) = app();
    let request = Request::builder().uri("/call").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_list_calls_starts_empty() {
    let (app, _) = app();
    let request = Request::builder().uri("/calls").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "[]");
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let (app, _) = app();
    let request = Request::builder().uri("/media").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_plain_get_on_stream_path_opens_no_session() {
    let (app, state) = app();
    let request = Request::builder()
        .uri("/twilio-stream")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
    assert!(state.calls.list().await.is_empty());
}
