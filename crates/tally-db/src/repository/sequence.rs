//! Human-facing ledger numbers.
//!
//! One counter row per kind, bumped with a single upsert so two ledgers
//! opened at the same time can never share a number.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;

/// Which counter to draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    Tab,
    Sale,
}

impl SequenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SequenceKind::Tab => "tab",
            SequenceKind::Sale => "sale",
        }
    }
}

/// Allocates the next number for `kind`, starting at 1.
///
/// Runs on the caller's connection so the allocation commits or rolls back
/// with the ledger that uses it.
pub async fn next_value(conn: &mut SqliteConnection, kind: SequenceKind) -> DbResult<i64> {
    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sequences (kind, last_value) VALUES (?1, 1)
        ON CONFLICT (kind) DO UPDATE SET last_value = last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(kind.as_str())
    .fetch_one(&mut *conn)
    .await?;

    debug!(kind = kind.as_str(), value, "Allocated sequence number");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_sequences_are_independent_and_increasing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        assert_eq!(next_value(&mut conn, SequenceKind::Tab).await.unwrap(), 1);
        assert_eq!(next_value(&mut conn, SequenceKind::Tab).await.unwrap(), 2);
        assert_eq!(next_value(&mut conn, SequenceKind::Sale).await.unwrap(), 1);
        assert_eq!(next_value(&mut conn, SequenceKind::Tab).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_rolled_back_allocation_is_reused() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        assert_eq!(next_value(&mut tx, SequenceKind::Sale).await.unwrap(), 1);
        tx.rollback().await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(next_value(&mut conn, SequenceKind::Sale).await.unwrap(), 1);
    }
}
