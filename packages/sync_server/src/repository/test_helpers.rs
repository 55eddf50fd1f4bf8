use crate::db::Database;

/// Create a fresh ChatRepository backed by an in-memory SQLite database.
/// Each call returns an isolated database with all migrations applied.
pub async fn test_repository() -> super::ChatRepository {
    let db = Database::in_memory()
        .await
        .expect("Failed to create in-memory database");
    super::ChatRepository::new(db.pool)
}

/// Repository with `u-alice`, `u-bob` and `u-carol` profiles registered.
pub async fn seeded_repository() -> super::ChatRepository {
    let repo = test_repository().await;
    for (id, name) in [("u-alice", "Alice"), ("u-bob", "Bob"), ("u-carol", "Carol")] {
        let email = format!("{}@example.com", name.to_lowercase());
        repo.upsert_user(id, name, Some(&email))
            .await
            .expect("Failed to seed user");
    }
    repo
}
