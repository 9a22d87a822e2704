// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session CRUD operations.

use recall_core::{ChatSession, RecallError};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};

const SESSION_COLUMNS: &str = "id, title, last_modified";

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatSession> {
    Ok(ChatSession {
        id: row.get(0)?,
        title: row.get(1)?,
        last_modified: row.get(2)?,
    })
}

/// Insert a session, replacing any existing row with the same id.
pub async fn upsert_session(db: &Database, session: &ChatSession) -> Result<(), RecallError> {
    let session = session.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO chat_sessions (id, title, last_modified) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET title = excluded.title,
                                               last_modified = excluded.last_modified",
                params![session.id, session.title, session.last_modified],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a session by ID.
pub async fn get_session(db: &Database, id: &str) -> Result<Option<ChatSession>, RecallError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<_, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = ?1"),
                params![id],
                row_to_session,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// All sessions, most recently modified first.
pub async fn list_sessions(db: &Database) -> Result<Vec<ChatSession>, RecallError> {
    db.connection()
        .call(|conn| -> Result<_, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM chat_sessions ORDER BY last_modified DESC, rowid DESC"
            ))?;
            let sessions = stmt
                .query_map([], row_to_session)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(sessions)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn update_title(db: &Database, id: &str, title: &str) -> Result<(), RecallError> {
    let id = id.to_string();
    let title = title.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE chat_sessions SET title = ?1 WHERE id = ?2",
                params![title, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a session. Its messages go with it through the foreign key.
pub async fn delete_session(db: &Database, id: &str) -> Result<(), RecallError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute("DELETE FROM chat_sessions WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Remove every session that has no messages.
pub async fn delete_empty_sessions(db: &Database) -> Result<usize, RecallError> {
    db.connection()
        .call(|conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "DELETE FROM chat_sessions
                 WHERE id NOT IN (SELECT DISTINCT session_id FROM chat_messages)",
                [],
            )
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_session(id: &str, last_modified: i64) -> ChatSession {
        ChatSession {
            id: id.to_string(),
            title: "New Conversation".to_string(),
            last_modified,
        }
    }

    #[tokio::test]
    async fn upsert_and_get_session_roundtrips() {
        let (db, _dir) = setup_db().await;
        upsert_session(&db, &make_session("sess-1", 10)).await.unwrap();

        let retrieved = get_session(&db, "sess-1").await.unwrap().unwrap();
        assert_eq!(retrieved.title, "New Conversation");
        assert_eq!(retrieved.last_modified, 10);

        let mut renamed = retrieved.clone();
        renamed.title = "Trip planning".to_string();
        upsert_session(&db, &renamed).await.unwrap();
        let again = get_session(&db, "sess-1").await.unwrap().unwrap();
        assert_eq!(again.title, "Trip planning");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_nonexistent_session_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_session(&db, "no-such-session").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_orders_by_recency() {
        let (db, _dir) = setup_db().await;
        upsert_session(&db, &make_session("old", 100)).await.unwrap();
        upsert_session(&db, &make_session("new", 300)).await.unwrap();
        upsert_session(&db, &make_session("mid", 200)).await.unwrap();

        let ids: Vec<String> = list_sessions(&db)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_title_changes_only_title() {
        let (db, _dir) = setup_db().await;
        upsert_session(&db, &make_session("s", 42)).await.unwrap();
        update_title(&db, "s", "Paris questions").await.unwrap();
        let s = get_session(&db, "s").await.unwrap().unwrap();
        assert_eq!(s.title, "Paris questions");
        assert_eq!(s.last_modified, 42);
        db.close().await.unwrap();
    }
}
