use sqlx::Row;

use deskflow_core::domain::approval::Capability;
use deskflow_core::domain::ticket::{DepartmentId, UserId};
use deskflow_core::ports::{StorageError, UserDirectory};

use super::approval::capability_as_str;
use super::{decode_error, storage_error};
use crate::DbPool;

/// Org chart lookups backed by the `org_user` table. Capabilities are a
/// comma-separated list; unknown entries are ignored rather than failing
/// the lookup.
pub struct SqlUserDirectory {
    pool: DbPool,
}

impl SqlUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn column_of(&self, user: &UserId, column: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query(&format!("SELECT {column} FROM org_user WHERE user_id = ?"))
            .bind(&user.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        match row {
            Some(ref r) => r.try_get::<Option<String>, _>(column).map_err(decode_error),
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl UserDirectory for SqlUserDirectory {
    async fn reporting_manager_of(&self, user: &UserId) -> Result<Option<UserId>, StorageError> {
        Ok(self.column_of(user, "manager_user_id").await?.map(UserId))
    }

    async fn department_of(&self, user: &UserId) -> Result<Option<DepartmentId>, StorageError> {
        Ok(self.column_of(user, "department_id").await?.map(DepartmentId))
    }

    async fn department_head_of(
        &self,
        department: &DepartmentId,
    ) -> Result<Option<UserId>, StorageError> {
        let row = sqlx::query(
            "SELECT user_id FROM org_user
             WHERE department_id = ? AND is_department_head = 1
             ORDER BY user_id LIMIT 1",
        )
        .bind(&department.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        match row {
            Some(ref r) => {
                Ok(Some(UserId(r.try_get::<String, _>("user_id").map_err(decode_error)?)))
            }
            None => Ok(None),
        }
    }

    async fn has_capability(
        &self,
        user: &UserId,
        capability: Capability,
    ) -> Result<bool, StorageError> {
        let Some(raw) = self.column_of(user, "capabilities").await? else {
            return Ok(false);
        };

        let wanted = capability_as_str(&capability);
        Ok(raw.split(',').map(str::trim).any(|entry| entry == wanted))
    }
}

#[cfg(test)]
mod tests {
    use deskflow_core::domain::approval::Capability;
    use deskflow_core::domain::ticket::{DepartmentId, UserId};
    use deskflow_core::ports::UserDirectory;

    use super::SqlUserDirectory;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let rows = [
            ("alice", "Alice Nguyen", Some("bob"), Some("it"), 0, ""),
            ("bob", "Bob Osei", Some("carol"), Some("it"), 0, ""),
            ("carol", "Carol Diaz", None, Some("it"), 1, ""),
            ("dave", "Dave Lim", None, Some("ops"), 0, "decide_approvals"),
            ("erin", "Erin Park", None, Some("ops"), 0, "decide_approvals,override_approvals"),
        ];
        for (user_id, name, manager, department, is_head, capabilities) in rows {
            sqlx::query(
                "INSERT INTO org_user (user_id, display_name, manager_user_id, department_id,
                                       is_department_head, capabilities)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(user_id)
            .bind(name)
            .bind(manager)
            .bind(department)
            .bind(is_head)
            .bind(capabilities)
            .execute(&pool)
            .await
            .expect("insert org user");
        }
        pool
    }

    fn user(name: &str) -> UserId {
        UserId(name.to_string())
    }

    #[tokio::test]
    async fn manager_and_department_lookups() {
        let directory = SqlUserDirectory::new(setup().await);

        let manager =
            directory.reporting_manager_of(&user("alice")).await.expect("manager lookup");
        assert_eq!(manager, Some(user("bob")));

        let department = directory.department_of(&user("alice")).await.expect("dept lookup");
        assert_eq!(department, Some(DepartmentId("it".to_string())));

        // carol has no manager row; unknown users resolve to nothing.
        assert_eq!(directory.reporting_manager_of(&user("carol")).await.expect("lookup"), None);
        assert_eq!(directory.reporting_manager_of(&user("nobody")).await.expect("lookup"), None);
    }

    #[tokio::test]
    async fn department_head_resolution() {
        let directory = SqlUserDirectory::new(setup().await);

        let head = directory
            .department_head_of(&DepartmentId("it".to_string()))
            .await
            .expect("head lookup");
        assert_eq!(head, Some(user("carol")));

        let none = directory
            .department_head_of(&DepartmentId("finance".to_string()))
            .await
            .expect("head lookup");
        assert_eq!(none, None);
    }

    #[tokio::test]
    async fn capability_list_is_parsed() {
        let directory = SqlUserDirectory::new(setup().await);

        assert!(directory
            .has_capability(&user("dave"), Capability::DecideApprovals)
            .await
            .expect("lookup"));
        assert!(!directory
            .has_capability(&user("dave"), Capability::OverrideApprovals)
            .await
            .expect("lookup"));
        assert!(directory
            .has_capability(&user("erin"), Capability::OverrideApprovals)
            .await
            .expect("lookup"));
        assert!(!directory
            .has_capability(&user("alice"), Capability::DecideApprovals)
            .await
            .expect("lookup"));
    }
}
