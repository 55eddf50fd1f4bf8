use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use sync_protocol::{Conversation, Message};
use tracing::debug;
use uuid::Uuid;

use super::{
    ChatRepository, StoreError, StoreResult, from_millis, now_millis, ordered_pair, participant,
    sender,
};

const CONVERSATION_SELECT: &str = r#"
    SELECT c.id, c.participant_a, c.participant_b, c.created_at, c.updated_at,
           ua.name AS a_name, ua.email AS a_email,
           ub.name AS b_name, ub.email AS b_email,
           m.id AS m_id, m.sender_id AS m_sender, m.content AS m_content,
           m.created_at AS m_created_at,
           us.name AS s_name, us.email AS s_email
    FROM conversations c
    LEFT JOIN users ua ON ua.id = c.participant_a
    LEFT JOIN users ub ON ub.id = c.participant_b
    LEFT JOIN messages m ON m.id = c.last_message_id
    LEFT JOIN users us ON us.id = m.sender_id
"#;

fn conversation_from_row(r: &SqliteRow) -> Conversation {
    let id: String = r.get("id");
    let last_message = r.get::<Option<String>, _>("m_id").map(|m_id| Message {
        id: m_id,
        conversation_id: id.clone(),
        sender: sender(r.get("m_sender"), r.get("s_name"), r.get("s_email")),
        content: r.get("m_content"),
        created_at: from_millis(r.get("m_created_at")),
    });

    Conversation {
        id,
        participants: vec![
            participant(r.get("participant_a"), r.get("a_name"), r.get("a_email")),
            participant(r.get("participant_b"), r.get("b_name"), r.get("b_email")),
        ],
        last_message,
        updated_at: from_millis(r.get("updated_at")),
        created_at: from_millis(r.get("created_at")),
    }
}

impl ChatRepository {
    /// Every conversation `participant_id` belongs to, most recently active first.
    pub async fn fetch_conversations(&self, participant_id: &str) -> StoreResult<Vec<Conversation>> {
        let sql = format!(
            "{CONVERSATION_SELECT}
             WHERE c.participant_a = ? OR c.participant_b = ?
             ORDER BY c.updated_at DESC, c.rowid DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(participant_id)
            .bind(participant_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(conversation_from_row).collect())
    }

    pub async fn get_conversation(&self, id: &str) -> StoreResult<Option<Conversation>> {
        let sql = format!("{CONVERSATION_SELECT} WHERE c.id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn conversation_by_pair(&self, lo: &str, hi: &str) -> StoreResult<Option<Conversation>> {
        let sql =
            format!("{CONVERSATION_SELECT} WHERE c.participant_a = ? AND c.participant_b = ?");
        let row = sqlx::query(&sql)
            .bind(lo)
            .bind(hi)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(conversation_from_row))
    }

    /// Return the conversation between the two participants, creating it when
    /// none exists. The flag is true when this call created it.
    ///
    /// The pair is stored sorted, so concurrent calls from either side converge
    /// on one row: the insert is skipped on a unique conflict and the winner is
    /// re-read.
    pub async fn create_or_get_conversation(
        &self,
        requester_id: &str,
        recipient_id: &str,
    ) -> StoreResult<(Conversation, bool)> {
        let recipient_id = recipient_id.trim();
        if recipient_id.is_empty() {
            return Err(StoreError::Validation("recipientId is required".into()));
        }
        if recipient_id == requester_id {
            return Err(StoreError::Validation(
                "cannot start a conversation with yourself".into(),
            ));
        }

        let (lo, hi) = ordered_pair(requester_id, recipient_id);
        if let Some(existing) = self.conversation_by_pair(lo, hi).await? {
            return Ok((existing, false));
        }

        let id = Uuid::now_v7().to_string();
        let now = now_millis();
        let inserted = sqlx::query(
            r#"
            INSERT INTO conversations
                (id, participant_a, participant_b, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(participant_a, participant_b) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(lo)
        .bind(hi)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected()
            == 1;

        if inserted {
            debug!(conversation = %id, "Created conversation");
        }

        let conversation = self
            .conversation_by_pair(lo, hi)
            .await?
            .ok_or(StoreError::NotFound("conversation"))?;
        Ok((conversation, inserted))
    }

    /// The two participant ids of a conversation.
    pub(crate) async fn conversation_members(
        &self,
        conversation_id: &str,
    ) -> StoreResult<Option<(String, String)>> {
        let row = sqlx::query("SELECT participant_a, participant_b FROM conversations WHERE id = ?")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| (r.get("participant_a"), r.get("participant_b"))))
    }

    /// Resolve a conversation the caller is allowed to touch.
    pub(crate) async fn authorize_member(
        &self,
        conversation_id: &str,
        participant_id: &str,
    ) -> StoreResult<()> {
        match self.conversation_members(conversation_id).await? {
            None => Err(StoreError::NotFound("conversation")),
            Some((a, b)) if a == participant_id || b == participant_id => Ok(()),
            Some(_) => Err(StoreError::Forbidden),
        }
    }
}
