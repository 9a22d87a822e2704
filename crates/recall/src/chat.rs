// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `recall chat` command implementation.
//!
//! An interactive REPL over the session orchestrator. Replies stream from
//! the orchestrator's pending response, so a switched-away session never
//! prints into the current one.

use std::io::Write;

use colored::Colorize;
use recall_agent::{ChatState, EngineStatus, SessionOrchestrator};
use recall_core::RecallError;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::{oneshot, watch};
use tracing::warn;

use crate::services::Services;

const LABEL: &str = "recall>";

/// Runs the `recall chat` interactive REPL.
pub async fn run_chat(services: &Services) -> Result<(), RecallError> {
    let engine = services.engine();
    let orchestrator = services.orchestrator(engine);
    orchestrator.start().await?;

    let loading = tokio::spawn(report_loading(orchestrator.subscribe()));
    let init = orchestrator.initialize_engine().await;
    loading.abort();
    eprintln!();
    if let Err(e) = init {
        eprintln!("{}: {}", "engine".red(), e.user_message());
        eprintln!("Type {} to try again.", "/retry".yellow());
    }

    let mut rl = DefaultEditor::new()
        .map_err(|e| RecallError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", services.config.agent.name.bold().green());
    println!(
        "Commands: {} {} {} {} {}\n",
        "/new".yellow(),
        "/sessions".yellow(),
        "/switch <n>".yellow(),
        "/retry".yellow(),
        "/quit".yellow()
    );

    let prompt = format!("{}> ", "you".green());
    loop {
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(trimmed);

        let outcome = match trimmed {
            "/quit" | "/exit" => break,
            "/new" => new_chat(&orchestrator).await,
            "/sessions" => {
                print_sessions(&orchestrator.state());
                Ok(())
            }
            "/retry" => retry(&orchestrator).await,
            command if command.starts_with("/switch") => {
                switch(&orchestrator, command.trim_start_matches("/switch").trim());
                Ok(())
            }
            text => stream_reply(&orchestrator, text).await,
        };
        if let Err(e) = outcome {
            eprintln!("{}: {}", "error".red(), e.user_message());
        }
    }

    orchestrator.cancel_generation();
    orchestrator.wait_background().await;
    Ok(())
}

async fn report_loading(mut rx: watch::Receiver<ChatState>) {
    while rx.changed().await.is_ok() {
        if let EngineStatus::Loading(p) = rx.borrow_and_update().engine {
            eprint!("\r{} {:>3.0}%", "loading model".dimmed(), p * 100.0);
        }
    }
}

async fn new_chat(orchestrator: &SessionOrchestrator) -> Result<(), RecallError> {
    match orchestrator.create_new_chat().await? {
        Some(_) => println!("{}", "started a new conversation".dimmed()),
        None => println!("{}", "this conversation is still empty".dimmed()),
    }
    Ok(())
}

async fn retry(orchestrator: &SessionOrchestrator) -> Result<(), RecallError> {
    if orchestrator.retry_initialization().await? {
        println!("{}", "engine ready".green());
    } else {
        println!("{}", "engine is already ready or loading".dimmed());
    }
    Ok(())
}

fn print_sessions(state: &ChatState) {
    if state.sessions.is_empty() {
        println!("{}", "no conversations yet".dimmed());
        return;
    }
    for (i, session) in state.sessions.iter().enumerate() {
        let marker = if state.is_current(&session.id) { "*" } else { " " };
        println!("{marker} {:>2}. {}", i + 1, session.title);
    }
}

fn switch(orchestrator: &SessionOrchestrator, arg: &str) {
    let state = orchestrator.state();
    let target = arg
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| state.sessions.get(i));
    match target {
        Some(session) => {
            orchestrator.select_session(&session.id);
            println!("{} {}", "switched to".dimmed(), session.title.bold());
        }
        None => println!("{}", "usage: /switch <n>, see /sessions".yellow()),
    }
}

/// Send `text` and print the reply as it grows.
async fn stream_reply(orchestrator: &SessionOrchestrator, text: &str) -> Result<(), RecallError> {
    let (done_tx, done_rx) = oneshot::channel();
    let printer = tokio::spawn(print_pending(orchestrator.subscribe(), done_rx));
    let reply = orchestrator.send_message(text).await;
    let _ = done_tx.send(());
    let printed = match printer.await {
        Ok(printed) => printed,
        Err(e) => {
            warn!(error = %e, "reply printer failed");
            return reply.map(|_| ());
        }
    };
    if let Ok(Some(full)) = &reply
        && let Some(rest) = full.strip_prefix(printed.as_str())
    {
        if printed.is_empty() {
            print!("{} ", LABEL.cyan());
        }
        print!("{rest}");
    }
    println!();
    reply.map(|_| ())
}

/// Echo pending-response growth until `done` fires. Returns what was printed.
async fn print_pending(mut rx: watch::Receiver<ChatState>, mut done: oneshot::Receiver<()>) -> String {
    let mut printed = String::new();
    loop {
        let pending = rx.borrow_and_update().visible_pending().map(str::to_string);
        if let Some(text) = pending
            && text.len() > printed.len()
            && let Some(delta) = text.strip_prefix(printed.as_str())
        {
            if printed.is_empty() {
                print!("{} ", LABEL.cyan());
            }
            print!("{delta}");
            let _ = std::io::stdout().flush();
            printed = text;
        }
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return printed;
                }
            }
            _ = &mut done => return printed,
        }
    }
}
