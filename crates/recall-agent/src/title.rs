// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation titles generated from the first exchange.

pub fn title_prompt(user: &str, assistant: &str) -> String {
    format!(
        "Generate a short, concise title (max 5 words) for this conversation. \
         Output strictly just the title text, no quotes or prefixes. \
         Conversation:\nUser: {user}\nAI: {assistant}"
    )
}

/// Strip quotes and a `Title:` prefix. `None` if nothing is left.
pub fn clean_title(raw: &str) -> Option<String> {
    let cleaned = raw.trim().replace('"', "").replace("Title:", "");
    let cleaned = cleaned.trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_quotes_both_turns() {
        let p = title_prompt("My name is Sam", "Nice to meet you, Sam");
        assert!(p.ends_with("User: My name is Sam\nAI: Nice to meet you, Sam"));
        assert!(p.contains("max 5 words"));
    }

    #[test]
    fn cleaning() {
        assert_eq!(clean_title("  \"Title: Trip to Paris\" \n").as_deref(), Some("Trip to Paris"));
        assert_eq!(clean_title("Greetings"), Some("Greetings".to_string()));
        assert_eq!(clean_title(" \"\" "), None);
        assert_eq!(clean_title("Title:"), None);
    }
}
