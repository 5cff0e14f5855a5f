use course_core::model::UserId;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, parse_id, ser};
use crate::repository::{AuthRecord, AuthRepository, StorageError};

#[async_trait::async_trait]
impl AuthRepository for SqliteRepository {
    async fn save_auth(&self, record: &AuthRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO auth (id, user_id, token, saved_at)
            VALUES (1, ?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                token = excluded.token,
                saved_at = excluded.saved_at
            ",
        )
        .bind(record.user_id.as_str())
        .bind(&record.token)
        .bind(record.saved_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_auth(&self) -> Result<Option<AuthRecord>, StorageError> {
        let row = sqlx::query("SELECT user_id, token, saved_at FROM auth WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.map(|row| -> Result<AuthRecord, StorageError> {
            Ok(AuthRecord {
                user_id: parse_id::<UserId>(&row, "user_id")?,
                token: row.try_get("token").map_err(ser)?,
                saved_at: row.try_get("saved_at").map_err(ser)?,
            })
        })
        .transpose()
    }

    async fn clear_auth(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM auth WHERE id = 1")
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}
