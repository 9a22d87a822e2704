// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message CRUD operations.

use recall_core::{ChatMessage, RecallError};
use rusqlite::params;

use crate::database::{Database, map_tr_err};

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        text: row.get(2)?,
        is_user: row.get::<_, i64>(3)? != 0,
        timestamp: row.get(4)?,
    })
}

/// Insert or replace a message and bump its session's `last_modified`.
///
/// Both writes commit in one transaction.
pub async fn upsert_message(db: &Database, message: &ChatMessage) -> Result<(), RecallError> {
    let msg = message.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO chat_messages (id, session_id, text, is_user, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET text = excluded.text,
                                               is_user = excluded.is_user,
                                               timestamp = excluded.timestamp",
                params![msg.id, msg.session_id, msg.text, msg.is_user as i64, msg.timestamp],
            )?;
            tx.execute(
                "UPDATE chat_sessions SET last_modified = MAX(last_modified, ?1) WHERE id = ?2",
                params![msg.timestamp, msg.session_id],
            )?;
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

/// Messages for a session in conversation order.
pub async fn messages_for_session(
    db: &Database,
    session_id: &str,
) -> Result<Vec<ChatMessage>, RecallError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| -> Result<_, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, text, is_user, timestamp FROM chat_messages
                 WHERE session_id = ?1 ORDER BY timestamp ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map(params![session_id], row_to_message)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::sessions;
    use recall_core::ChatSession;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        sessions::upsert_session(
            &db,
            &ChatSession {
                id: "sess-1".into(),
                title: "New Conversation".into(),
                last_modified: 1,
            },
        )
        .await
        .unwrap();
        (db, dir)
    }

    fn make_message(id: &str, text: &str, is_user: bool, timestamp: i64) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            session_id: "sess-1".into(),
            text: text.into(),
            is_user,
            timestamp,
        }
    }

    #[tokio::test]
    async fn messages_come_back_in_timestamp_order() {
        let (db, _dir) = setup_db().await;
        upsert_message(&db, &make_message("b", "Hello Sam", false, 20)).await.unwrap();
        upsert_message(&db, &make_message("a", "Hi, I'm Sam", true, 10)).await.unwrap();

        let msgs = messages_for_session(&db, "sess-1").await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].id, "a");
        assert!(msgs[0].is_user);
        assert_eq!(msgs[1].text, "Hello Sam");
        assert!(!msgs[1].is_user);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn upsert_bumps_session_last_modified() {
        let (db, _dir) = setup_db().await;
        upsert_message(&db, &make_message("a", "hi", true, 500)).await.unwrap();
        let session = sessions::get_session(&db, "sess-1").await.unwrap().unwrap();
        assert_eq!(session.last_modified, 500);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn upsert_replaces_existing_text() {
        let (db, _dir) = setup_db().await;
        upsert_message(&db, &make_message("a", "draft", false, 10)).await.unwrap();
        upsert_message(&db, &make_message("a", "final answer", false, 10)).await.unwrap();
        let msgs = messages_for_session(&db, "sess-1").await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].text, "final answer");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn message_for_unknown_session_is_rejected() {
        let (db, _dir) = setup_db().await;
        let mut orphan = make_message("x", "lost", true, 1);
        orphan.session_id = "missing".into();
        assert!(upsert_message(&db, &orphan).await.is_err());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn deleting_session_cascades_and_prune_keeps_non_empty() {
        let (db, _dir) = setup_db().await;
        sessions::upsert_session(
            &db,
            &ChatSession {
                id: "empty".into(),
                title: "New Conversation".into(),
                last_modified: 2,
            },
        )
        .await
        .unwrap();
        upsert_message(&db, &make_message("a", "hi", true, 5)).await.unwrap();

        assert_eq!(sessions::delete_empty_sessions(&db).await.unwrap(), 1);
        assert!(sessions::get_session(&db, "empty").await.unwrap().is_none());
        assert!(sessions::get_session(&db, "sess-1").await.unwrap().is_some());

        sessions::delete_session(&db, "sess-1").await.unwrap();
        assert!(messages_for_session(&db, "sess-1").await.unwrap().is_empty());
        db.close().await.unwrap();
    }
}
