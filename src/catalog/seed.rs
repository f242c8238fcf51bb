use rand::seq::SliceRandom;
use rand::Rng;
use sqlx::PgPool;

use crate::model::{Possession, PropertyListing, PropertyType, AREAS};

use super::CatalogError;

/// Rows below this count trigger sample-data generation on startup.
const MIN_ROWS: i64 = 4000;
const SAMPLE_COUNT: usize = 5000;
const INSERT_CHUNK: usize = 500;

const POSSESSIONS: &[&str] = &[
    "Ready",
    "Q4 2025",
    "Q1 2026",
    "Q2 2026",
    "Q3 2026",
    "Under Construction",
];

const BUILDINGS: &[&str] = &[
    "Marina Gate",
    "Princess Tower",
    "The Address Residences",
    "Burj Vista",
    "Creek Edge",
    "Bluewaters Residences",
    "Opera Grand",
    "Vida Residences",
    "Beach Vista",
    "Harbour Views",
    "Stella Maris",
    "One JBR",
];

pub async fn init_schema(pool: &PgPool) -> Result<(), CatalogError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS properties (
            id          BIGSERIAL PRIMARY KEY,
            location    TEXT NOT NULL,
            building    TEXT,
            price       BIGINT NOT NULL,
            type        TEXT NOT NULL,
            bedrooms    INTEGER NOT NULL,
            size_sqft   INTEGER,
            pool        BOOLEAN,
            gym         BOOLEAN,
            balcony     BOOLEAN,
            available   BOOLEAN NOT NULL,
            possession  TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| CatalogError::Execution(e.to_string()))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_properties_location ON properties (location)")
        .execute(pool)
        .await
        .map_err(|e| CatalogError::Execution(e.to_string()))?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_properties_price ON properties (price)")
        .execute(pool)
        .await
        .map_err(|e| CatalogError::Execution(e.to_string()))?;

    Ok(())
}

/// Populate the table with generated listings unless it already holds a
/// realistic dataset. Returns the number of rows inserted.
pub async fn populate_if_sparse(pool: &PgPool) -> Result<usize, CatalogError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM properties")
        .fetch_one(pool)
        .await
        .map_err(|e| CatalogError::Execution(e.to_string()))?;

    if count >= MIN_ROWS {
        tracing::info!("properties table already has {} rows, skipping seed", count);
        return Ok(0);
    }

    tracing::info!("generating ~{} sample properties", SAMPLE_COUNT);
    let mut rng = rand::thread_rng();
    let listings = generate_listings(SAMPLE_COUNT, &mut rng);

    for chunk in listings.chunks(INSERT_CHUNK) {
        let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            "INSERT INTO properties \
             (location, building, price, type, bedrooms, size_sqft, pool, gym, balcony, available, possession) ",
        );
        builder.push_values(chunk, |mut b, p| {
            b.push_bind(&p.location)
                .push_bind(&p.building)
                .push_bind(p.price)
                .push_bind(p.property_type.as_str())
                .push_bind(p.bedrooms)
                .push_bind(p.size_sqft)
                .push_bind(p.pool)
                .push_bind(p.gym)
                .push_bind(p.balcony)
                .push_bind(p.available)
                .push_bind(p.possession.as_catalog_text());
        });
        builder
            .build()
            .execute(pool)
            .await
            .map_err(|e| CatalogError::Execution(e.to_string()))?;
    }

    tracing::info!("inserted {} sample properties", listings.len());
    Ok(listings.len())
}

/// Generate listings with type-correlated bedroom/price/size ranges.
/// Villas skew larger and pricier than apartments; prices land on 50k
/// boundaries so they read like real asking prices.
pub fn generate_listings<R: Rng>(n: usize, rng: &mut R) -> Vec<PropertyListing> {
    let types = [
        PropertyType::Apartment,
        PropertyType::Villa,
        PropertyType::Townhouse,
        PropertyType::Penthouse,
    ];

    (0..n)
        .map(|i| {
            let location = AREAS.choose(rng).unwrap().to_string();
            let property_type = *types.choose(rng).unwrap();

            let (bedrooms, price, size_sqft) = match property_type {
                PropertyType::Villa => (
                    rng.gen_range(4..=7),
                    rng.gen_range(7_000_000..=65_000_000i64),
                    rng.gen_range(4_500..=12_000),
                ),
                PropertyType::Penthouse => (
                    rng.gen_range(3..=6),
                    rng.gen_range(9_000_000..=50_000_000i64),
                    rng.gen_range(3_000..=9_000),
                ),
                PropertyType::Townhouse => (
                    rng.gen_range(3..=5),
                    rng.gen_range(2_800_000..=14_000_000i64),
                    rng.gen_range(2_200..=4_500),
                ),
                PropertyType::Apartment => (
                    rng.gen_range(1..=4),
                    rng.gen_range(800_000..=18_000_000i64),
                    rng.gen_range(450..=3_200),
                ),
            };
            let price = (price as f64 / 50_000.0).round() as i64 * 50_000;

            // Towers get a building name, villas and townhouses a community only.
            let building = match property_type {
                PropertyType::Apartment | PropertyType::Penthouse => {
                    Some(BUILDINGS.choose(rng).unwrap().to_string())
                }
                _ => None,
            };

            let possession_text = *POSSESSIONS.choose(rng).unwrap();

            PropertyListing {
                id: i as i64 + 1,
                location,
                building,
                price,
                property_type,
                bedrooms,
                size_sqft: Some(size_sqft),
                pool: Some(rng.gen_bool(0.5)),
                gym: Some(rng.gen_bool(0.6)),
                balcony: Some(rng.gen_bool(0.7)),
                available: rng.gen_bool(0.8),
                possession: Possession::from(possession_text.to_string()),
            }
        })
        .collect()
}
