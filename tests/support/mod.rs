//! Shared fixtures for integration tests: a scripted upstream provider with
//! call counters and a small seeded directory.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use gdedoctor::config::GatewayConfig;
use gdedoctor::db;
use gdedoctor::gateway::GeocodingGateway;
use gdedoctor::geo_cache::{GeocodeCache, GeocodeResult};
use gdedoctor::geo_errors::ProviderError;
use gdedoctor::provider::{GeoProvider, MapImage, StaticMapRequest};
use sqlx::SqlitePool;

/// What the fake upstream answers for an address
#[derive(Debug, Clone)]
pub enum Scripted {
    Match(GeocodeResult),
    NoMatch,
    Fail(ProviderError),
}

pub struct FakeProvider {
    pub geocode_calls: AtomicUsize,
    pub static_map_calls: AtomicUsize,
    pub last_map_request: Mutex<Option<StaticMapRequest>>,
    /// Address of the latest geocode call, as received
    pub last_address: Mutex<Option<String>>,
    responses: Mutex<HashMap<String, Scripted>>,
    map_outcome: Mutex<Result<MapImage, ProviderError>>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self {
            geocode_calls: AtomicUsize::new(0),
            static_map_calls: AtomicUsize::new(0),
            last_map_request: Mutex::new(None),
            last_address: Mutex::new(None),
            responses: Mutex::new(HashMap::new()),
            map_outcome: Mutex::new(Ok(MapImage {
                bytes: b"\x89PNG\r\n\x1a\nfake".to_vec(),
                content_type: "image/png".to_string(),
            })),
        }
    }
}

impl FakeProvider {
    /// Script the answer for `address`; unscripted addresses have no match
    pub fn script(&self, address: &str, outcome: Scripted) {
        self.responses
            .lock()
            .unwrap()
            .insert(address.trim().to_string(), outcome);
    }

    pub fn script_map(&self, outcome: Result<MapImage, ProviderError>) {
        *self.map_outcome.lock().unwrap() = outcome;
    }

    pub fn geocode_calls(&self) -> usize {
        self.geocode_calls.load(Ordering::SeqCst)
    }

    pub fn last_address(&self) -> Option<String> {
        self.last_address.lock().unwrap().clone()
    }

    pub fn static_map_calls(&self) -> usize {
        self.static_map_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoProvider for FakeProvider {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodeResult>, ProviderError> {
        self.geocode_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_address.lock().unwrap() = Some(address.to_string());
        let scripted = self.responses.lock().unwrap().get(address.trim()).cloned();
        match scripted {
            Some(Scripted::Match(result)) => Ok(Some(result)),
            Some(Scripted::NoMatch) | None => Ok(None),
            Some(Scripted::Fail(err)) => Err(err),
        }
    }

    async fn static_map(&self, request: StaticMapRequest) -> Result<MapImage, ProviderError> {
        self.static_map_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_map_request.lock().unwrap() = Some(request);
        self.map_outcome.lock().unwrap().clone()
    }
}

pub fn kaluga_center() -> GeocodeResult {
    GeocodeResult {
        lon: 36.261215,
        lat: 54.513845,
        label: "Россия, Калуга, улица Ленина, 1".to_string(),
    }
}

pub fn gateway_with(config: GatewayConfig) -> (GeocodingGateway, Arc<FakeProvider>) {
    let provider = Arc::new(FakeProvider::default());
    let gateway = GeocodingGateway::new(provider.clone(), Arc::new(GeocodeCache::new(64)), config);
    (gateway, provider)
}

pub fn gateway() -> (GeocodingGateway, Arc<FakeProvider>) {
    gateway_with(GatewayConfig::default())
}

/// Ids of the seeded directory rows
pub struct Seeded {
    pub therapist: i64,
    pub surgeon: i64,
    pub polyclinic: i64,
    pub hospital: i64,
    pub ivanov: i64,
    pub petrov: i64,
}

pub async fn setup_test_db() -> Result<SqlitePool> {
    let pool = db::connect_in_memory().await?;
    db::init_database_schema(&pool).await?;
    Ok(pool)
}

/// Two specialties, two hospitals, two doctors; Ivanov works in both hospitals
pub async fn seed_directory(pool: &SqlitePool) -> Result<Seeded> {
    let therapist = db::insert_specialty(pool, "Терапевт").await?;
    let surgeon = db::insert_specialty(pool, "Хирург").await?;
    let polyclinic = db::insert_hospital(pool, "Городская поликлиника №1", Some("Калуга, ул. Ленина, 1")).await?;
    let hospital = db::insert_hospital(pool, "Областная больница", None).await?;
    let ivanov = db::insert_doctor(pool, "Иванов Иван Иванович").await?;
    let petrov = db::insert_doctor(pool, "Петров Пётр Петрович").await?;

    db::insert_placement(pool, ivanov, polyclinic, therapist).await?;
    db::insert_placement(pool, ivanov, hospital, therapist).await?;
    db::insert_placement(pool, petrov, hospital, surgeon).await?;

    Ok(Seeded {
        therapist,
        surgeon,
        polyclinic,
        hospital,
        ivanov,
        petrov,
    })
}

pub const SHORT_DELAY: Duration = Duration::from_millis(50);
