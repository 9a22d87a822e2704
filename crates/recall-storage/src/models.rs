// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage model types.
//!
//! Session and message rows map one-to-one onto the core types, so they are
//! re-exported rather than duplicated.

pub use recall_core::{ChatMessage, ChatSession};
