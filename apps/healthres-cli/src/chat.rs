use std::io::Write as _;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use healthres_core::types::{BackendKind, ChatMessage};
use healthres_llm::Responder;
use healthres_retrieval::Session;

use crate::commands;

const HELP: &str = "Commands:
  /backend [local|remote]  show or switch the search backend
  /help                    show this help
  /quit                    leave the chat
Anything else is sent as a research question.";

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Empty,
    Quit,
    Help,
    ShowBackend,
    SetBackend(BackendKind),
    Invalid(String),
    Query(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Query(line.to_string());
    };
    let mut parts = command.split_whitespace();
    match (parts.next().unwrap_or_default(), parts.next()) {
        ("quit" | "exit" | "q", _) => Input::Quit,
        ("help" | "h" | "?", _) => Input::Help,
        ("backend", None) => Input::ShowBackend,
        ("backend", Some(arg)) => match arg.parse() {
            Ok(kind) => Input::SetBackend(kind),
            Err(_) => Input::Invalid(format!("unknown backend '{arg}', expected local or remote")),
        },
        (other, _) => Input::Invalid(format!("unknown command '/{other}', try /help")),
    }
}

/// Interactive loop. The transcript lives only as long as the loop.
pub async fn run(session: &Session, responder: &Responder, mut backend: BackendKind, k: usize, stream: bool) -> Result<()> {
    let retriever = session.ready().await?;
    println!("HealthRes chat ({backend} backend). Type /help for commands.");
    let mut history: Vec<ChatMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else { break };
        match parse_input(&line) {
            Input::Empty => {}
            Input::Quit => break,
            Input::Help => println!("{HELP}"),
            Input::ShowBackend => println!("backend: {backend}"),
            Input::SetBackend(kind) if !retriever.has_backend(kind) => {
                println!("the {kind} backend is not available in this session");
            }
            Input::SetBackend(kind) => {
                backend = kind;
                println!("backend: {backend}");
            }
            Input::Invalid(msg) => println!("{msg}"),
            Input::Query(query) => {
                let turn = async {
                    let matches = retriever.search(&query, backend, k).await?;
                    commands::answer(responder, &query, &matches, &history, stream).await
                };
                match turn.await {
                    Ok(text) => {
                        history.push(ChatMessage::user(query));
                        history.push(ChatMessage::assistant(text));
                    }
                    Err(e) => {
                        warn!(error = %e, "chat turn failed");
                        println!("{}", crate::user_message(&e));
                    }
                }
            }
        }
    }
    Ok(())
}
