// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite storage for the Recall assistant.
//!
//! Holds chat sessions, their messages, and the memory table used by
//! retrieval. Migrations are embedded and run on open.

pub mod adapter;
pub mod changes;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::SqliteStorage;
pub use changes::{ChangeFeed, Table};
pub use database::{Database, map_tr_err};
