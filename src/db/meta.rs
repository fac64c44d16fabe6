//! Key/value settings stored next to the jobs. Holds the retry policy.

use async_trait::async_trait;

use super::Db;
use crate::error::{Error, Result};
use crate::model::RetryPolicy;
use crate::store::PolicySource;

const POLICY_KEY: &str = "config";

impl Db {
    /// Overwrite the stored retry policy.
    pub async fn set_retry_policy(&self, policy: &RetryPolicy) -> Result<()> {
        let value = serde_json::to_string(policy)
            .map_err(|e| Error::Other(format!("serialize retry policy: {e}")))?;
        sqlx::query(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(POLICY_KEY)
        .bind(value)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Change one policy value by key and return the resulting policy.
    pub async fn set_policy_value(&self, key: &str, value: u32) -> Result<RetryPolicy> {
        let mut policy = self.retry_policy().await?;
        policy.set(key, value)?;
        self.set_retry_policy(&policy).await?;
        Ok(policy)
    }
}

#[async_trait]
impl PolicySource for Db {
    /// Stored policy merged over the defaults. Never cached.
    async fn retry_policy(&self) -> Result<RetryPolicy> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM meta WHERE key = ?1")
            .bind(POLICY_KEY)
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some((value,)) => serde_json::from_str(&value)
                .map_err(|e| Error::Config(format!("stored retry policy is corrupt: {e}"))),
            None => Ok(RetryPolicy::default()),
        }
    }
}
