//! # GdeDoctor Directory API
//!
//! A REST backend serving a medical directory (specialties, hospitals,
//! doctors and patient reviews) together with a caching geocoding gateway
//! in front of the Yandex geocoder and static maps.

pub mod api;
pub mod config;
pub mod db;
pub mod gateway;
pub mod geo_cache;
pub mod geo_errors;
pub mod provider;
pub mod validation;
