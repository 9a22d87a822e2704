// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt augmentation with retrieved memories.

use std::fmt::Write;

use crate::types::RetrievalMatch;

const RULE: &str = "---------------------\n";

/// Wrap `query` in the context block, or return it unchanged with no matches.
pub fn augment_prompt(query: &str, matches: &[RetrievalMatch]) -> String {
    if matches.is_empty() {
        return query.to_string();
    }
    let mut prompt = String::from("Context information is below.\n");
    prompt.push_str(RULE);
    for (i, m) in matches.iter().enumerate() {
        let _ = writeln!(prompt, "[Memory {}]: {}", i + 1, m.text);
    }
    prompt.push_str(RULE);
    prompt.push_str("Given the context information and not prior knowledge, answer the query.\n");
    let _ = write!(prompt, "Query: {query}");
    prompt
}
