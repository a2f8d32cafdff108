use async_trait::async_trait;
use time::Date;

use crate::{
    application::repos::{AccountsRepo, RepoError},
    domain::accounts::{AccountRecord, Plan, UsageWindow},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct AccountRow {
    account_id: String,
    plan: String,
    admin_override: bool,
    usage_date: Option<Date>,
    usage_count: i32,
}

impl From<AccountRow> for AccountRecord {
    fn from(row: AccountRow) -> Self {
        let usage = row.usage_date.map(|date| UsageWindow {
            date,
            count: row.usage_count.max(0) as u32,
        });
        Self {
            account_id: row.account_id,
            plan: Plan::parse(&row.plan),
            admin_override: row.admin_override,
            usage,
        }
    }
}

#[async_trait]
impl AccountsRepo for PostgresRepositories {
    async fn fetch_account(&self, account_id: &str) -> Result<Option<AccountRecord>, RepoError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT account_id,
                   plan,
                   admin_override,
                   usage_date,
                   usage_count
            FROM accounts
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(AccountRecord::from))
    }

    async fn advance_usage(&self, account_id: &str, today: Date) -> Result<u32, RepoError> {
        // Single statement so concurrent commits for one account serialize
        // on the row and never read-modify-write from the same base. A
        // stale usage date (or a never-seen account) resets the counter.
        let count: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO accounts (account_id, plan, admin_override, usage_date, usage_count)
            VALUES ($1, 'FREE', FALSE, $2, 1)
            ON CONFLICT (account_id) DO UPDATE SET
                usage_count = CASE
                    WHEN accounts.usage_date = EXCLUDED.usage_date
                        THEN accounts.usage_count + 1
                    ELSE 1
                END,
                usage_date = EXCLUDED.usage_date
            RETURNING usage_count
            "#,
        )
        .bind(account_id)
        .bind(today)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        count
            .try_into()
            .map_err(|_| RepoError::from_persistence("usage count out of range"))
    }
}
