//! # Directory Store Module
//!
//! SQLite-backed storage for specialties, hospitals, doctors (through their
//! work placements) and patient reviews. Every list operation is paginated
//! with offset/limit and reports the total row count for its filter.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::info;

use crate::validation::{NewReview, PageParams};

/// Shown when a hospital has no linked address
pub const NO_ADDRESS: &str = "Адрес не указан";

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Specialty {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Hospital {
    pub id: i64,
    pub name: String,
}

/// A doctor as listed under a hospital and specialty
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct DoctorSummary {
    pub id: i64,
    pub name: String,
    pub hospital_name: String,
    pub specialty_name: String,
}

/// A doctor card, including the hospital address
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoctorDetail {
    pub id: i64,
    pub name: String,
    pub hospital_name: String,
    pub address: String,
    pub specialty_name: String,
}

#[derive(FromRow)]
struct DoctorDetailRow {
    id: i64,
    name: String,
    hospital_name: String,
    address: Option<String>,
    specialty_name: String,
}

/// A name search hit
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct DoctorMatch {
    pub id: i64,
    pub name: String,
    pub hospital_name: String,
    pub specialty_name: String,
    pub hospital_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Review {
    pub id: i64,
    pub doctor_id: i64,
    pub hospital_id: i64,
    pub user_name: String,
    pub review_text: String,
    pub created_at: DateTime<Utc>,
}

/// One page of a filtered, ordered collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
}

impl<T> Page<T> {
    fn new(items: Vec<T>, total: i64, page: PageParams) -> Self {
        Self {
            items,
            total,
            skip: page.skip,
            limit: page.limit,
        }
    }
}

/// Open (creating if missing) the SQLite database at `path`
pub async fn connect(path: &str) -> Result<SqlitePool> {
    info!("Opening directory database at: {}", path);

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database at {path}"))
}

/// Open a private in-memory database, used by tests
pub async fn connect_in_memory() -> Result<SqlitePool> {
    // A single connection so every query sees the same in-memory database
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .context("Failed to open in-memory database")
}

/// Initialize the database schema
pub async fn init_database_schema(pool: &SqlitePool) -> Result<()> {
    info!("Initializing database schema...");

    let statements = [
        "CREATE TABLE IF NOT EXISTS specialties (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS hospitals (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS addresses (
            id INTEGER PRIMARY KEY,
            full_address TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS hospital_addresses (
            hospital_id INTEGER NOT NULL REFERENCES hospitals (id),
            address_id INTEGER NOT NULL REFERENCES addresses (id),
            PRIMARY KEY (hospital_id, address_id)
        )",
        "CREATE TABLE IF NOT EXISTS doctors (
            id INTEGER PRIMARY KEY,
            full_name TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS doctor_work_placements (
            id INTEGER PRIMARY KEY,
            doctor_id INTEGER NOT NULL REFERENCES doctors (id),
            hospital_id INTEGER NOT NULL REFERENCES hospitals (id),
            specialty_id INTEGER NOT NULL REFERENCES specialties (id)
        )",
        "CREATE TABLE IF NOT EXISTS doctor_reviews (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            doctor_id INTEGER NOT NULL,
            hospital_id INTEGER NOT NULL,
            user_name TEXT NOT NULL,
            review_text TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_placements_hospital_specialty
            ON doctor_work_placements (hospital_id, specialty_id)",
        "CREATE INDEX IF NOT EXISTS idx_reviews_doctor
            ON doctor_reviews (doctor_id, created_at)",
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to apply schema statement: {statement}"))?;
    }

    info!("Database schema initialized successfully");
    Ok(())
}

// --- Seeding helpers ---

pub async fn insert_specialty(pool: &SqlitePool, name: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO specialties (name) VALUES (?1)")
        .bind(name)
        .execute(pool)
        .await
        .context("Failed to insert specialty")?;
    Ok(result.last_insert_rowid())
}

/// Insert a hospital and, when given, link it to a new address row
pub async fn insert_hospital(pool: &SqlitePool, name: &str, address: Option<&str>) -> Result<i64> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let hospital_id = sqlx::query("INSERT INTO hospitals (name) VALUES (?1)")
        .bind(name)
        .execute(&mut *tx)
        .await
        .context("Failed to insert hospital")?
        .last_insert_rowid();

    if let Some(address) = address {
        let address_id = sqlx::query("INSERT INTO addresses (full_address) VALUES (?1)")
            .bind(address)
            .execute(&mut *tx)
            .await
            .context("Failed to insert address")?
            .last_insert_rowid();
        sqlx::query("INSERT INTO hospital_addresses (hospital_id, address_id) VALUES (?1, ?2)")
            .bind(hospital_id)
            .bind(address_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link hospital address")?;
    }

    tx.commit().await.context("Failed to commit hospital")?;
    Ok(hospital_id)
}

pub async fn insert_doctor(pool: &SqlitePool, full_name: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO doctors (full_name) VALUES (?1)")
        .bind(full_name)
        .execute(pool)
        .await
        .context("Failed to insert doctor")?;
    Ok(result.last_insert_rowid())
}

/// Record that a doctor works at a hospital under a specialty
pub async fn insert_placement(
    pool: &SqlitePool,
    doctor_id: i64,
    hospital_id: i64,
    specialty_id: i64,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO doctor_work_placements (doctor_id, hospital_id, specialty_id) VALUES (?1, ?2, ?3)",
    )
    .bind(doctor_id)
    .bind(hospital_id)
    .bind(specialty_id)
    .execute(pool)
    .await
    .context("Failed to insert work placement")?;
    Ok(result.last_insert_rowid())
}

// --- Specialties ---

pub async fn list_specialties(pool: &SqlitePool, page: PageParams) -> Result<Page<Specialty>> {
    let items = sqlx::query_as::<_, Specialty>(
        "SELECT id, name FROM specialties ORDER BY name, id LIMIT ?1 OFFSET ?2",
    )
    .bind(page.limit)
    .bind(page.skip)
    .fetch_all(pool)
    .await
    .context("Failed to list specialties")?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM specialties")
        .fetch_one(pool)
        .await
        .context("Failed to count specialties")?;

    Ok(Page::new(items, total, page))
}

pub async fn get_specialty(pool: &SqlitePool, id: i64) -> Result<Option<Specialty>> {
    sqlx::query_as::<_, Specialty>("SELECT id, name FROM specialties WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to read specialty")
}

// --- Hospitals ---

/// List hospitals, optionally only those with a placement under `specialty_id`
pub async fn list_hospitals(
    pool: &SqlitePool,
    specialty_id: Option<i64>,
    page: PageParams,
) -> Result<Page<Hospital>> {
    const FILTER: &str = "?1 IS NULL OR EXISTS (
        SELECT 1 FROM doctor_work_placements dwp
        WHERE dwp.hospital_id = h.id AND dwp.specialty_id = ?1
    )";

    let items = sqlx::query_as::<_, Hospital>(&format!(
        "SELECT h.id, h.name FROM hospitals h WHERE {FILTER} ORDER BY h.name, h.id LIMIT ?2 OFFSET ?3"
    ))
    .bind(specialty_id)
    .bind(page.limit)
    .bind(page.skip)
    .fetch_all(pool)
    .await
    .context("Failed to list hospitals")?;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM hospitals h WHERE {FILTER}"))
        .bind(specialty_id)
        .fetch_one(pool)
        .await
        .context("Failed to count hospitals")?;

    Ok(Page::new(items, total, page))
}

pub async fn get_hospital(pool: &SqlitePool, id: i64) -> Result<Option<Hospital>> {
    sqlx::query_as::<_, Hospital>("SELECT id, name FROM hospitals WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to read hospital")
}

// --- Doctors ---

/// List doctor placements, filtered by hospital and/or specialty
pub async fn list_doctors(
    pool: &SqlitePool,
    hospital_id: Option<i64>,
    specialty_id: Option<i64>,
    page: PageParams,
) -> Result<Page<DoctorSummary>> {
    const FILTER: &str = "(?1 IS NULL OR dwp.hospital_id = ?1) AND (?2 IS NULL OR dwp.specialty_id = ?2)";

    let items = sqlx::query_as::<_, DoctorSummary>(&format!(
        "SELECT d.id, d.full_name AS name, h.name AS hospital_name, s.name AS specialty_name
         FROM doctor_work_placements dwp
         JOIN doctors d ON d.id = dwp.doctor_id
         JOIN hospitals h ON h.id = dwp.hospital_id
         JOIN specialties s ON s.id = dwp.specialty_id
         WHERE {FILTER}
         ORDER BY d.full_name, dwp.id
         LIMIT ?3 OFFSET ?4"
    ))
    .bind(hospital_id)
    .bind(specialty_id)
    .bind(page.limit)
    .bind(page.skip)
    .fetch_all(pool)
    .await
    .context("Failed to list doctors")?;

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM doctor_work_placements dwp WHERE {FILTER}"
    ))
    .bind(hospital_id)
    .bind(specialty_id)
    .fetch_one(pool)
    .await
    .context("Failed to count doctors")?;

    Ok(Page::new(items, total, page))
}

/// Read a doctor card as seen from one of the doctor's hospitals
pub async fn get_doctor(pool: &SqlitePool, id: i64, hospital_id: i64) -> Result<Option<DoctorDetail>> {
    let row = sqlx::query_as::<_, DoctorDetailRow>(
        "SELECT d.id, d.full_name AS name, h.name AS hospital_name,
                a.full_address AS address, s.name AS specialty_name
         FROM doctors d
         JOIN doctor_work_placements dwp ON d.id = dwp.doctor_id
         JOIN hospitals h ON dwp.hospital_id = h.id
         JOIN specialties s ON dwp.specialty_id = s.id
         LEFT JOIN hospital_addresses ha ON h.id = ha.hospital_id
         LEFT JOIN addresses a ON ha.address_id = a.id
         WHERE d.id = ?1 AND dwp.hospital_id = ?2
         ORDER BY dwp.id
         LIMIT 1",
    )
    .bind(id)
    .bind(hospital_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read doctor")?;

    Ok(row.map(|row| DoctorDetail {
        id: row.id,
        name: row.name,
        hospital_name: row.hospital_name,
        address: row.address.unwrap_or_else(|| NO_ADDRESS.to_string()),
        specialty_name: row.specialty_name,
    }))
}

/// Escape LIKE wildcards so user input matches literally
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Substring search on doctor names, one hit per placement
pub async fn search_doctors(pool: &SqlitePool, name: &str) -> Result<Vec<DoctorMatch>> {
    info!("Searching doctors by name: {}", name);

    sqlx::query_as::<_, DoctorMatch>(
        "SELECT d.id, d.full_name AS name, h.name AS hospital_name,
                s.name AS specialty_name, h.id AS hospital_id
         FROM doctors d
         JOIN doctor_work_placements dwp ON d.id = dwp.doctor_id
         JOIN hospitals h ON dwp.hospital_id = h.id
         JOIN specialties s ON dwp.specialty_id = s.id
         WHERE d.full_name LIKE ?1 ESCAPE '\\'
         ORDER BY d.full_name, dwp.id",
    )
    .bind(like_pattern(name))
    .fetch_all(pool)
    .await
    .context("Failed to search doctors")
}

// --- Reviews ---

/// List reviews newest first, optionally for one doctor
pub async fn list_reviews(pool: &SqlitePool, doctor_id: Option<i64>, page: PageParams) -> Result<Page<Review>> {
    let items = sqlx::query_as::<_, Review>(
        "SELECT id, doctor_id, hospital_id, user_name, review_text, created_at
         FROM doctor_reviews
         WHERE ?1 IS NULL OR doctor_id = ?1
         ORDER BY created_at DESC, id DESC
         LIMIT ?2 OFFSET ?3",
    )
    .bind(doctor_id)
    .bind(page.limit)
    .bind(page.skip)
    .fetch_all(pool)
    .await
    .context("Failed to list reviews")?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM doctor_reviews WHERE ?1 IS NULL OR doctor_id = ?1")
        .bind(doctor_id)
        .fetch_one(pool)
        .await
        .context("Failed to count reviews")?;

    Ok(Page::new(items, total, page))
}

/// Store a validated review and return it as persisted
pub async fn create_review(pool: &SqlitePool, review: &NewReview) -> Result<Review> {
    info!("Creating review for doctor_id: {}", review.doctor_id);

    // Fixed-width timestamps so TEXT ordering matches time ordering
    let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    let id = sqlx::query(
        "INSERT INTO doctor_reviews (doctor_id, hospital_id, user_name, review_text, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(review.doctor_id)
    .bind(review.hospital_id)
    .bind(&review.user_name)
    .bind(&review.review_text)
    .bind(&created_at)
    .execute(pool)
    .await
    .context("Failed to insert review")?
    .last_insert_rowid();

    info!("Review created with ID: {}", id);

    get_review(pool, id)
        .await?
        .with_context(|| format!("Review {id} missing right after insert"))
}

pub async fn get_review(pool: &SqlitePool, id: i64) -> Result<Option<Review>> {
    sqlx::query_as::<_, Review>(
        "SELECT id, doctor_id, hospital_id, user_name, review_text, created_at
         FROM doctor_reviews WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to read review")
}
