use sqlx::Row;

use deskflow_core::ports::StorageError;

use crate::connection::DbPool;
use crate::repositories::storage_error;

const SEED_CATEGORY_IDS: &[&str] = &["cat-hardware", "cat-software", "cat-procurement"];

const SEED_USER_IDS: &[&str] = &["alice", "bob", "carol", "dave", "erin", "frank"];

const SEED_TICKET_IDS: &[&str] = &["tkt-demo-001", "tkt-demo-002", "tkt-demo-003"];

/// Demo seed dataset covering the three approval postures: no approval,
/// line-manager only, and line-manager plus head-of-department with an
/// amount threshold.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// SQL fixture content for the demo dataset.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Load the demo dataset into the database. Idempotent; rows are
    /// replaced on re-seed.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, StorageError> {
        let mut tx = pool.begin().await.map_err(storage_error)?;
        sqlx::raw_sql(Self::SQL).execute(&mut *tx).await.map_err(storage_error)?;
        tx.commit().await.map_err(storage_error)?;

        Ok(SeedResult {
            categories: SEED_CATEGORY_IDS.len(),
            users: SEED_USER_IDS.len(),
            tickets: SEED_TICKET_IDS.len(),
        })
    }

    /// Verify that the seed rows exist as the dataset contract expects.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, StorageError> {
        let mut checks = Vec::new();

        for (name, table, ids) in [
            ("categories", "category", SEED_CATEGORY_IDS),
            ("org users", "org_user", SEED_USER_IDS),
            ("tickets", "ticket", SEED_TICKET_IDS),
        ] {
            let key = if table == "org_user" { "user_id" } else { "id" };
            let placeholders = vec!["?"; ids.len()].join(", ");
            let sql =
                format!("SELECT COUNT(*) AS count FROM {table} WHERE {key} IN ({placeholders})");
            let mut query = sqlx::query(&sql);
            for id in ids {
                query = query.bind(*id);
            }
            let count: i64 = query
                .fetch_one(pool)
                .await
                .map_err(storage_error)?
                .try_get("count")
                .map_err(|e| StorageError::Decode(e.to_string()))?;

            checks.push(SeedCheck {
                name,
                passed: count == ids.len() as i64,
                detail: format!("{count} of {} expected rows present", ids.len()),
            });
        }

        Ok(VerificationResult { checks })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub categories: usize,
    pub users: usize,
    pub tickets: usize,
}

#[derive(Clone, Debug)]
pub struct SeedCheck {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

#[derive(Clone, Debug)]
pub struct VerificationResult {
    pub checks: Vec<SeedCheck>,
}

impl VerificationResult {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }
}
