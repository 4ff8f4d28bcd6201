//! YandexProvider against a local stand-in for the Yandex HTTP APIs

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::Query;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use gdedoctor::config::UpstreamConfig;
use gdedoctor::geo_errors::ProviderError;
use gdedoctor::provider::{GeoProvider, StaticMapRequest, YandexProvider};
use tokio::net::TcpListener;

const TEST_KEY: &str = "test-key";

const KALUGA_RESPONSE: &str = r#"{
    "response": {
        "GeoObjectCollection": {
            "featureMember": [{
                "GeoObject": {
                    "metaDataProperty": {
                        "GeocoderMetaData": {"text": "Россия, Калуга, улица Ленина, 1"}
                    },
                    "Point": {"pos": "36.261215 54.513845"}
                }
            }]
        }
    }
}"#;

const EMPTY_RESPONSE: &str = r#"{"response":{"GeoObjectCollection":{"featureMember":[]}}}"#;

async fn fake_geocoder(Query(params): Query<HashMap<String, String>>) -> Response {
    if params.get("apikey").map(String::as_str) != Some(TEST_KEY) {
        return (StatusCode::FORBIDDEN, "Invalid api key").into_response();
    }
    if params.get("format").map(String::as_str) != Some("json") {
        return (StatusCode::BAD_REQUEST, "format required").into_response();
    }

    match params.get("geocode").map(String::as_str) {
        Some("Калуга, Ленина 1") => json(KALUGA_RESPONSE),
        Some("broken") => (StatusCode::INTERNAL_SERVER_ERROR, "oops").into_response(),
        Some("throttled") => (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response(),
        Some("garbage") => json("{\"unexpected\": true}"),
        Some("slow") => {
            tokio::time::sleep(Duration::from_millis(500)).await;
            json(KALUGA_RESPONSE)
        }
        _ => json(EMPTY_RESPONSE),
    }
}

// Echoes the parameters it received as the "image" body
async fn fake_static_map(Query(params): Query<HashMap<String, String>>) -> Response {
    let mut keys: Vec<_> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
    keys.sort();
    ([(header::CONTENT_TYPE, "image/png")], keys.join("&")).into_response()
}

fn json(body: &'static str) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn spawn_fake_yandex() -> String {
    let app = Router::new()
        .route("/1.x/", get(fake_geocoder))
        .route("/static/1.x/", get(fake_static_map));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn provider_with(api_key: Option<&str>, request_timeout: Duration) -> YandexProvider {
    let base = spawn_fake_yandex().await;
    YandexProvider::new(UpstreamConfig {
        geocoder_url: format!("{base}/1.x/"),
        static_map_url: format!("{base}/static/1.x/"),
        api_key: api_key.map(str::to_string),
        request_timeout,
        ..Default::default()
    })
    .unwrap()
}

async fn provider() -> YandexProvider {
    provider_with(Some(TEST_KEY), Duration::from_secs(5)).await
}

#[tokio::test]
async fn test_geocode_match() {
    let provider = provider().await;

    let result = provider.geocode("Калуга, Ленина 1").await.unwrap().unwrap();
    assert_eq!(result.lon, 36.261215);
    assert_eq!(result.lat, 54.513845);
    assert_eq!(result.label, "Россия, Калуга, улица Ленина, 1");
}

#[tokio::test]
async fn test_geocode_no_match() {
    let provider = provider().await;
    assert_eq!(provider.geocode("Нигдевск").await, Ok(None));
}

#[tokio::test]
async fn test_rejected_key_is_classified_as_rejected() {
    let provider = provider_with(Some("wrong-key"), Duration::from_secs(5)).await;

    match provider.geocode("Калуга, Ленина 1").await {
        Err(ProviderError::Rejected { status, message }) => {
            assert_eq!(status, 403);
            assert_eq!(message, "Invalid api key");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_server_errors_are_transient() {
    let provider = provider().await;

    assert_eq!(provider.geocode("broken").await, Err(ProviderError::Status(500)));
    assert_eq!(provider.geocode("throttled").await, Err(ProviderError::Status(429)));
}

#[tokio::test]
async fn test_unexpected_body_is_malformed() {
    let provider = provider().await;

    assert!(matches!(
        provider.geocode("garbage").await,
        Err(ProviderError::MalformedResponse(_))
    ));
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let provider = provider_with(Some(TEST_KEY), Duration::from_millis(100)).await;
    assert_eq!(provider.geocode("slow").await, Err(ProviderError::Timeout));
}

#[tokio::test]
async fn test_unreachable_upstream_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let provider = YandexProvider::new(UpstreamConfig {
        geocoder_url: format!("http://{addr}/1.x/"),
        api_key: Some(TEST_KEY.to_string()),
        ..Default::default()
    })
    .unwrap();

    assert!(matches!(
        provider.geocode("Калуга").await,
        Err(ProviderError::Transport(_))
    ));
}

#[tokio::test]
async fn test_static_map_returns_bytes_and_content_type() {
    // Static maps do not need a key
    let provider = provider_with(None, Duration::from_secs(5)).await;

    let image = provider
        .static_map(StaticMapRequest {
            lon: 36.25,
            lat: 54.5,
            with_marker: true,
        })
        .await
        .unwrap();

    assert_eq!(image.content_type, "image/png");
    let echoed = String::from_utf8(image.bytes).unwrap();
    assert_eq!(
        echoed,
        "l=map&ll=36.25,54.5&pt=36.25,54.5,pm2rdm&size=400,300&z=15"
    );
}

#[tokio::test]
async fn test_static_map_without_marker() {
    let provider = provider().await;

    let image = provider
        .static_map(StaticMapRequest {
            lon: 36.25,
            lat: 54.5,
            with_marker: false,
        })
        .await
        .unwrap();

    let echoed = String::from_utf8(image.bytes).unwrap();
    assert!(!echoed.contains("pt="));
}
