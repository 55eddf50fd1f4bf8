use sqlx::Row;
use sync_protocol::{Message, Sender, normalize_content};
use uuid::Uuid;

use super::{ChatRepository, StoreError, StoreResult, from_millis, now_millis, sender};

impl ChatRepository {
    /// History of a conversation, oldest first. Only its participants may read it.
    pub async fn fetch_messages(
        &self,
        conversation_id: &str,
        participant_id: &str,
    ) -> StoreResult<Vec<Message>> {
        self.authorize_member(conversation_id, participant_id).await?;

        let rows = sqlx::query(
            r#"
            SELECT m.id, m.conversation_id, m.sender_id, m.content, m.created_at,
                   u.name AS s_name, u.email AS s_email
            FROM messages m
            LEFT JOIN users u ON u.id = m.sender_id
            WHERE m.conversation_id = ?
            ORDER BY m.created_at ASC, m.rowid ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Message {
                id: r.get("id"),
                conversation_id: r.get("conversation_id"),
                sender: sender(r.get("sender_id"), r.get("s_name"), r.get("s_email")),
                content: r.get("content"),
                created_at: from_millis(r.get("created_at")),
            })
            .collect())
    }

    /// Persist a message and make it the conversation's latest activity.
    ///
    /// Content is trimmed; whitespace-only content is rejected before any
    /// lookup happens.
    pub async fn create_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
    ) -> StoreResult<Message> {
        let content = normalize_content(content)
            .ok_or_else(|| StoreError::Validation("content must not be empty".into()))?;
        if conversation_id.trim().is_empty() {
            return Err(StoreError::Validation("conversationId is required".into()));
        }

        self.authorize_member(conversation_id, sender_id).await?;

        let id = Uuid::now_v7().to_string();
        let now = now_millis();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, content, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(sender_id)
        .bind(content)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversations SET last_message_id = ?, updated_at = ? WHERE id = ?")
            .bind(&id)
            .bind(now)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let sender = match self.get_user(sender_id).await? {
            Some(profile) => Sender::Profile(profile),
            None => Sender::Id(sender_id.to_string()),
        };

        Ok(Message {
            id,
            conversation_id: conversation_id.to_string(),
            sender,
            content: content.to_string(),
            created_at: from_millis(now),
        })
    }
}
