use rust_decimal::Decimal;
use sqlx::Row;

use deskflow_core::domain::category::CategoryApprovalRule;
use deskflow_core::domain::ticket::CategoryId;
use deskflow_core::ports::{CategoryPolicyLookup, StorageError};

use super::{decode_error, storage_error};
use crate::DbPool;

pub struct SqlCategoryRepository {
    pool: DbPool,
}

impl SqlCategoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CategoryPolicyLookup for SqlCategoryRepository {
    async fn approval_rule(
        &self,
        category: &CategoryId,
    ) -> Result<Option<CategoryApprovalRule>, StorageError> {
        let row = sqlx::query(
            "SELECT requires_approval, requires_hod_approval, hod_approval_threshold
             FROM category WHERE id = ?",
        )
        .bind(&category.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let requires_approval: bool =
            row.try_get("requires_approval").map_err(decode_error)?;
        let requires_hod_approval: bool =
            row.try_get("requires_hod_approval").map_err(decode_error)?;
        let threshold_str: Option<String> =
            row.try_get("hod_approval_threshold").map_err(decode_error)?;

        let hod_approval_threshold = match threshold_str {
            Some(raw) => Some(raw.parse::<Decimal>().map_err(|e| {
                StorageError::Decode(format!("hod_approval_threshold: {e}"))
            })?),
            None => None,
        };

        Ok(Some(CategoryApprovalRule {
            requires_approval,
            requires_hod_approval,
            hod_approval_threshold,
        }))
    }
}
