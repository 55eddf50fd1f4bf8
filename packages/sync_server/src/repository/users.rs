use sqlx::Row;
use sync_protocol::Participant;

use super::{ChatRepository, StoreError, StoreResult, now_millis};

impl ChatRepository {
    /// Create or update a participant's display profile.
    pub async fn upsert_user(
        &self,
        id: &str,
        name: &str,
        email: Option<&str>,
    ) -> StoreResult<Participant> {
        let id = id.trim();
        let name = name.trim();
        if id.is_empty() {
            return Err(StoreError::Validation("participant id is required".into()));
        }
        if name.is_empty() {
            return Err(StoreError::Validation("name is required".into()));
        }
        let email = email.map(str::trim).filter(|e| !e.is_empty());
        let now = now_millis();

        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Participant {
            id: id.to_string(),
            name: name.to_string(),
            email: email.map(String::from),
        })
    }

    pub async fn get_user(&self, id: &str) -> StoreResult<Option<Participant>> {
        let row = sqlx::query("SELECT id, name, email FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| Participant {
            id: r.get("id"),
            name: r.get("name"),
            email: r.get("email"),
        }))
    }

    /// Case-insensitive substring match on name or email, excluding the caller.
    /// A blank query matches nobody.
    pub async fn search_users(&self, query: &str, exclude_id: &str) -> StoreResult<Vec<Participant>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, name, email
            FROM users
            WHERE id <> ?
              AND (instr(lower(name), lower(?)) > 0
                   OR instr(lower(COALESCE(email, '')), lower(?)) > 0)
            ORDER BY name COLLATE NOCASE
            LIMIT 50
            "#,
        )
        .bind(exclude_id)
        .bind(query)
        .bind(query)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Participant {
                id: r.get("id"),
                name: r.get("name"),
                email: r.get("email"),
            })
            .collect())
    }
}
