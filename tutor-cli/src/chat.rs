//! Console rendering of tutor replies.

use std::time::Duration;

use crate::api_client::ApiResult;

/// Words that end an interactive chat.
pub const EXIT_COMMANDS: [&str; 2] = ["exit", "quit"];

pub fn format_reply(result: &ApiResult<String>, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    match result {
        Ok(answer) => format!("Bot ({:.2}s): {}", secs, answer),
        Err(e) => format!("Error ({:.2}s): {}", secs, e),
    }
}

/// What to do with one line typed at the chat prompt.
#[derive(Debug, PartialEq, Eq)]
pub enum ChatInput<'a> {
    Skip,
    Exit,
    Question(&'a str),
}

pub fn parse_input(line: &str) -> ChatInput<'_> {
    let line = line.trim();
    if line.is_empty() {
        ChatInput::Skip
    } else if EXIT_COMMANDS.contains(&line.to_lowercase().as_str()) {
        ChatInput::Exit
    } else {
        ChatInput::Question(line)
    }
}
