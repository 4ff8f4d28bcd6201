//! # Upstream Provider Module
//!
//! The `GeoProvider` trait is the seam between the gateway and the third-party
//! geocoding/mapping service. `YandexProvider` talks to the Yandex geocoder and
//! static maps HTTP APIs; tests substitute their own implementations.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::UpstreamConfig;
use crate::geo_cache::GeocodeResult;
use crate::geo_errors::{classify_status, ProviderError};

/// Center and marker flag for a static map render
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticMapRequest {
    pub lon: f64,
    pub lat: f64,
    pub with_marker: bool,
}

/// Raw image payload as returned by upstream
#[derive(Debug, Clone, PartialEq)]
pub struct MapImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub const DEFAULT_IMAGE_CONTENT_TYPE: &str = "image/png";

#[async_trait]
pub trait GeoProvider: Send + Sync {
    /// Resolve a free-text address. `Ok(None)` means upstream had no match.
    async fn geocode(&self, address: &str) -> Result<Option<GeocodeResult>, ProviderError>;

    /// Render a static map tile centered on the request coordinate.
    async fn static_map(&self, request: StaticMapRequest) -> Result<MapImage, ProviderError>;
}

// --- Yandex geocoder response shape ---
#[derive(Debug, Deserialize)]
struct YandexEnvelope {
    response: YandexResponse,
}

#[derive(Debug, Deserialize)]
struct YandexResponse {
    #[serde(rename = "GeoObjectCollection")]
    collection: GeoObjectCollection,
}

#[derive(Debug, Deserialize)]
struct GeoObjectCollection {
    #[serde(rename = "featureMember", default)]
    feature_member: Vec<FeatureMember>,
}

#[derive(Debug, Deserialize)]
struct FeatureMember {
    #[serde(rename = "GeoObject")]
    geo_object: GeoObject,
}

#[derive(Debug, Deserialize)]
struct GeoObject {
    #[serde(rename = "Point")]
    point: Point,
    #[serde(rename = "metaDataProperty")]
    meta: MetaDataProperty,
}

#[derive(Debug, Deserialize)]
struct Point {
    pos: String,
}

#[derive(Debug, Deserialize)]
struct MetaDataProperty {
    #[serde(rename = "GeocoderMetaData")]
    geocoder: GeocoderMetaData,
}

#[derive(Debug, Deserialize)]
struct GeocoderMetaData {
    text: String,
}

/// Parse a Yandex geocoder JSON body.
///
/// An empty `featureMember` list is a "no match", not an error. The position
/// is a space-separated `"lon lat"` pair.
pub fn parse_geocode_response(body: &str) -> Result<Option<GeocodeResult>, ProviderError> {
    let envelope: YandexEnvelope = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

    let Some(first) = envelope.response.collection.feature_member.into_iter().next() else {
        return Ok(None);
    };

    let mut parts = first.geo_object.point.pos.split_whitespace();
    let (lon, lat) = match (parts.next(), parts.next()) {
        (Some(lon), Some(lat)) => (lon, lat),
        _ => {
            return Err(ProviderError::MalformedResponse(format!(
                "Unexpected position format: {}",
                first.geo_object.point.pos
            )))
        }
    };
    let parse = |raw: &str| {
        raw.parse::<f64>()
            .map_err(|e| ProviderError::MalformedResponse(format!("Bad coordinate {raw}: {e}")))
    };

    Ok(Some(GeocodeResult {
        lon: parse(lon)?,
        lat: parse(lat)?,
        label: first.geo_object.meta.geocoder.text,
    }))
}

/// Yandex geocoder and static maps client
pub struct YandexProvider {
    client: Client,
    config: UpstreamConfig,
}

impl YandexProvider {
    pub fn new(config: UpstreamConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Query parameters for a static map request
    pub fn static_map_params(&self, request: &StaticMapRequest) -> Vec<(&'static str, String)> {
        let center = format!("{},{}", request.lon, request.lat);
        let (width, height) = self.config.map_size;
        let mut params = vec![
            ("ll", center.clone()),
            ("size", format!("{width},{height}")),
            ("z", self.config.map_zoom.to_string()),
            ("l", "map".to_string()),
        ];
        if request.with_marker {
            params.push(("pt", format!("{center},{}", self.config.marker_style)));
        }
        params
    }
}

#[async_trait]
impl GeoProvider for YandexProvider {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodeResult>, ProviderError> {
        let api_key = self.config.api_key.as_deref().ok_or(ProviderError::MissingApiKey)?;

        info!("Requesting upstream geocode for address: {address}");
        let response = self
            .client
            .get(&self.config.geocoder_url)
            .query(&[
                ("apikey", api_key),
                ("geocode", address),
                ("format", "json"),
                ("results", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body));
        }

        let result = parse_geocode_response(&body)?;
        debug!("Upstream geocode for {address} matched: {}", result.is_some());
        Ok(result)
    }

    async fn static_map(&self, request: StaticMapRequest) -> Result<MapImage, ProviderError> {
        // Static Maps v1 works without an API key
        let params = self.static_map_params(&request);
        info!("Requesting upstream static map at {},{}", request.lon, request.lat);

        let response = self
            .client
            .get(&self.config.static_map_url)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_IMAGE_CONTENT_TYPE)
            .to_string();
        let bytes = response.bytes().await?.to_vec();

        Ok(MapImage {
            bytes,
            content_type,
        })
    }
}
