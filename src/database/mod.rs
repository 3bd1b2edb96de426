pub mod schema;

use crate::error::AppError;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

/// Apply the declarative schema. Statements are all idempotent
/// (CREATE ... IF NOT EXISTS), so this runs at every startup and against
/// fresh in-memory databases in tests.
#[instrument(skip(pool))]
pub async fn apply_schema(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    info!("Applying database schema");
    sqlx::raw_sql(schema::CURRENT_SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to apply schema: {}", e)))?;
    Ok(())
}
