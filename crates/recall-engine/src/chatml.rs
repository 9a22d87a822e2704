// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ChatML prompt formatting.

use recall_core::ChatMessage;

pub const IM_START: &str = "<|im_start|>";
pub const IM_END: &str = "<|im_end|>";

/// Appended after a streamed reply to close the assistant turn.
pub const ASSISTANT_CLOSE: &str = "<|im_end|>\n";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful on-device assistant. You remember the user's name and details provided in the conversation.";

pub fn turn(role: &str, text: &str) -> String {
    format!("{IM_START}{role}\n{text}{IM_END}\n")
}

/// A user turn followed by the opening of the assistant's reply.
pub fn user_prompt(prompt: &str) -> String {
    format!("{}{IM_START}assistant\n", turn("user", prompt))
}

/// System turn plus the last `max_turns` messages of `history`.
pub fn replay(system_prompt: &str, history: &[ChatMessage], max_turns: usize) -> String {
    let start = history.len().saturating_sub(max_turns);
    let mut text = turn("system", system_prompt);
    for message in &history[start..] {
        text.push_str(&turn(message.role(), &message.text));
    }
    text
}

/// A self-contained prompt that does not depend on any session context.
pub fn stateless_prompt(system_prompt: &str, prompt: &str) -> String {
    format!("{}{}", turn("system", system_prompt), user_prompt(prompt))
}
