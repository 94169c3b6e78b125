//! Storage schema for pricelist items.
//!
//! Declares the indexed columns of `product_pricelist_item` that the cache
//! lookups filter on, plus the skipped-flag column, and applies them to a
//! Postgres database. All statements are idempotent.

use sqlx::PgPool;
use tracing::info;

pub const PRICELIST_ITEM_TABLE: &str = "product_pricelist_item";

pub const CACHE_UPDATE_SKIPPED_COLUMN: &str = "pricelist_cache_update_skipped";

/// Columns of `product_pricelist_item` that get a b-tree index.
pub const PRICELIST_ITEM_INDEXED_COLUMNS: &[&str] = &[
    "base_pricelist_id",
    "product_tmpl_id",
    "product_id",
    "date_start",
    "date_end",
    "applied_on",
    "categ_id",
    "min_quantity",
    "company_id",
];

pub fn index_name(column: &str) -> String {
    format!("{PRICELIST_ITEM_TABLE}_{column}_index")
}

/// DDL adding the skipped flag to an existing item table.
pub fn skipped_column_statement() -> String {
    format!(
        "ALTER TABLE {PRICELIST_ITEM_TABLE} \
         ADD COLUMN IF NOT EXISTS {CACHE_UPDATE_SKIPPED_COLUMN} BOOLEAN NOT NULL DEFAULT FALSE"
    )
}

pub fn index_statements() -> Vec<String> {
    PRICELIST_ITEM_INDEXED_COLUMNS
        .iter()
        .map(|column| {
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {PRICELIST_ITEM_TABLE} ({column})",
                index_name(column)
            )
        })
        .collect()
}

/// Apply the skipped-flag column and every index.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    let statements =
        std::iter::once(skipped_column_statement()).chain(index_statements());
    for statement in statements {
        sqlx::query(&statement).execute(pool).await?;
    }
    info!(
        table = PRICELIST_ITEM_TABLE,
        indexes = PRICELIST_ITEM_INDEXED_COLUMNS.len(),
        "pricelist item schema ensured"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_index_per_declared_column() {
        let statements = index_statements();
        assert_eq!(statements.len(), PRICELIST_ITEM_INDEXED_COLUMNS.len());
        assert_eq!(
            statements[0],
            "CREATE INDEX IF NOT EXISTS product_pricelist_item_base_pricelist_id_index \
             ON product_pricelist_item (base_pricelist_id)"
        );
        assert!(statements.iter().all(|s| s.starts_with("CREATE INDEX IF NOT EXISTS")));
    }

    #[test]
    fn skipped_flag_is_not_indexed() {
        assert!(!PRICELIST_ITEM_INDEXED_COLUMNS.contains(&CACHE_UPDATE_SKIPPED_COLUMN));
        assert!(skipped_column_statement().contains("ADD COLUMN IF NOT EXISTS pricelist_cache_update_skipped"));
    }

    /// Database URL for the Postgres-backed test below.
    const TEST_DATABASE_URL: &str = "PRICECACHE_TEST_DATABASE_URL";

    #[tokio::test]
    #[ignore = "requires PRICECACHE_TEST_DATABASE_URL"]
    async fn ensure_schema_is_idempotent_on_postgres() {
        let Ok(url) = std::env::var(TEST_DATABASE_URL) else {
            return;
        };
        let pool = PgPool::connect(&url).await.unwrap();
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS product_pricelist_item (
                id BIGSERIAL PRIMARY KEY,
                base_pricelist_id BIGINT,
                product_tmpl_id BIGINT,
                product_id BIGINT,
                date_start TIMESTAMPTZ,
                date_end TIMESTAMPTZ,
                applied_on TEXT NOT NULL DEFAULT '3_global',
                categ_id BIGINT,
                min_quantity DOUBLE PRECISION NOT NULL DEFAULT 0,
                company_id BIGINT
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        ensure_schema(&pool).await.unwrap();
        ensure_schema(&pool).await.unwrap();

        let names: Vec<String> = PRICELIST_ITEM_INDEXED_COLUMNS
            .iter()
            .map(|column| index_name(column))
            .collect();
        let indexes: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pg_indexes WHERE tablename = $1 AND indexname = ANY($2)",
        )
        .bind(PRICELIST_ITEM_TABLE)
        .bind(&names)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(indexes, PRICELIST_ITEM_INDEXED_COLUMNS.len() as i64);

        let skipped_columns: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.columns \
             WHERE table_name = $1 AND column_name = $2 AND data_type = 'boolean'",
        )
        .bind(PRICELIST_ITEM_TABLE)
        .bind(CACHE_UPDATE_SKIPPED_COLUMN)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(skipped_columns, 1);
    }
}
