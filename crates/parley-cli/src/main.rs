//! Parley CLI: a terminal client for the streaming chat relay.

mod interrupt;
mod prompt;

use anyhow::{Context, Result, bail};
use clap::Parser;
use parley_config::{ClientConfig, ClientOverrides};
use parley_core::{ChatSession, ClientError, RelayClient, StreamState};
use parley_session::ChatSummary;
use parley_types::{Attachment, StreamEvent};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "parley", version, about = "Chat with LLMs through a Parley relay")]
struct Cli {
    /// Send a single message and print the reply (non-interactive)
    #[arg(short, long)]
    print: Option<String>,

    /// Attach a text file to the --print message (repeatable)
    #[arg(long = "attach", value_name = "FILE")]
    attach: Vec<PathBuf>,

    /// Relay server URL
    #[arg(long)]
    server: Option<String>,

    /// Bearer token for the relay server
    #[arg(long)]
    token: Option<String>,

    /// Model to use, as provider:model
    #[arg(long)]
    model: Option<String>,

    /// Sampling temperature override
    #[arg(long)]
    temperature: Option<f32>,

    /// Open a stored chat by ID or prefix
    #[arg(long)]
    resume: Option<String>,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();
    interrupt::install();

    let config = ClientConfig::load(ClientOverrides {
        server_url: cli.server,
        token: cli.token,
        model: cli.model,
    });

    let client = RelayClient::new(&config.server_url, config.token.clone())
        .context("Failed to create relay client")?;
    let mut session = ChatSession::new(client, config.model.clone());
    session.set_temperature(cli.temperature);

    if let Some(prompt) = cli.print {
        // Print mode: one message, reply on stdout
        let mut attachments = Vec::new();
        for path in &cli.attach {
            attachments.push(read_attachment(path).await?);
        }
        let state = send(&mut session, &prompt, attachments).await?;
        if state != StreamState::Completed {
            bail!("Reply did not complete ({state})");
        }
        return Ok(());
    }

    if let Some(prefix) = &cli.resume {
        open_by_prefix(&mut session, prefix).await?;
    }
    repl(session, &config).await
}

async fn repl(mut session: ChatSession, config: &ClientConfig) -> Result<()> {
    let stdin = io::stdin();
    let mut pending: Vec<Attachment> = Vec::new();

    eprintln!(
        "parley v{} (server: {}, model: {})",
        env!("CARGO_PKG_VERSION"),
        config.server_url,
        session.model()
    );
    if !session.client().has_token() {
        eprintln!("No token configured. Use /login to sign in.");
    }
    eprintln!("Type your message. Ctrl+C stops a reply or exits at the prompt; Ctrl+D exits.\n");

    loop {
        eprint!("> ");
        io::stderr().flush()?;

        let mut input = String::new();
        let bytes_read = stdin.lock().read_line(&mut input)?;
        if bytes_read == 0 {
            eprintln!();
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(handled) = handle_slash_command(input, &mut session, &mut pending).await {
            match handled {
                SlashResult::Continue => continue,
                SlashResult::Break => break,
                SlashResult::Unknown => {
                    eprintln!("Unknown command: {input}. Type /help for available commands.");
                    continue;
                }
            }
        }

        if let Err(e) = send(&mut session, input, std::mem::take(&mut pending)).await {
            eprintln!("\nError: {e}");
        }
        println!();
    }

    Ok(())
}

enum SlashResult {
    Continue,
    Break,
    Unknown,
}

async fn handle_slash_command(
    input: &str,
    session: &mut ChatSession,
    pending: &mut Vec<Attachment>,
) -> Option<SlashResult> {
    if !input.starts_with('/') {
        return None;
    }

    let (cmd, args) = match input.split_once(' ') {
        Some((c, a)) => (c, Some(a.trim()).filter(|a| !a.is_empty())),
        None => (input, None),
    };

    match cmd {
        "/quit" | "/exit" => Some(SlashResult::Break),
        "/help" => {
            print_help();
            Some(SlashResult::Continue)
        }
        "/new" => {
            session.reset();
            pending.clear();
            eprintln!("Started a new chat.");
            Some(SlashResult::Continue)
        }
        "/retry" => {
            if let Err(e) = retry(session).await {
                eprintln!("\nError: {e}");
            }
            println!();
            Some(SlashResult::Continue)
        }
        "/model" => {
            match args {
                Some(model) => {
                    session.set_model(model);
                    eprintln!("Model set to {model}");
                }
                None => eprintln!("Current model: {}", session.model()),
            }
            Some(SlashResult::Continue)
        }
        "/models" => {
            match session.client().models().await {
                Ok(models) => {
                    for m in models {
                        let marker = if m == session.model() { "*" } else { " " };
                        eprintln!("  {marker} {m}");
                    }
                }
                Err(e) => eprintln!("Failed to list models: {e}"),
            }
            Some(SlashResult::Continue)
        }
        "/chats" => {
            handle_chats_list(session).await;
            Some(SlashResult::Continue)
        }
        "/open" => {
            match args {
                Some(prefix) => {
                    if let Err(e) = open_by_prefix(session, prefix).await {
                        eprintln!("Failed to open chat: {e}");
                    }
                }
                None => eprintln!("Usage: /open <chat-id-prefix>"),
            }
            Some(SlashResult::Continue)
        }
        "/delete" => {
            match args {
                Some(prefix) => handle_delete(session, prefix).await,
                None => eprintln!("Usage: /delete <chat-id-prefix>"),
            }
            Some(SlashResult::Continue)
        }
        "/attach" => {
            match args {
                Some(path) => match read_attachment(Path::new(path)).await {
                    Ok(attachment) => {
                        eprintln!("Attached {} to the next message.", attachment.name);
                        pending.push(attachment);
                    }
                    Err(e) => eprintln!("{e:#}"),
                },
                None => eprintln!("Usage: /attach <path>"),
            }
            Some(SlashResult::Continue)
        }
        "/login" => {
            login(session).await;
            Some(SlashResult::Continue)
        }
        _ => Some(SlashResult::Unknown),
    }
}

/// Send one message, streaming the reply to stdout.
///
/// A rejected credential prompts for a new one and retries the same turn.
async fn send(session: &mut ChatSession, text: &str, attachments: Vec<Attachment>) -> Result<StreamState> {
    let cancel = interrupt::begin_reply();
    let result = session
        .send(text, attachments, cancel, print_event)
        .await;
    interrupt::end_reply();

    match result {
        Ok(state) => Ok(report(session, state)),
        Err(ClientError::Unauthorized) => {
            eprintln!("The server rejected your token.");
            if login(session).await {
                retry(session).await
            } else {
                bail!("not signed in")
            }
        }
        Err(e) => Err(e.into()),
    }
}

async fn retry(session: &mut ChatSession) -> Result<StreamState> {
    let cancel = interrupt::begin_reply();
    let result = session.retry(cancel, print_event).await;
    interrupt::end_reply();

    let state = result?;
    Ok(report(session, state))
}

/// Stream output goes to stdout as it arrives.
fn print_event(event: &StreamEvent) {
    let mut out = io::stdout();
    match event {
        StreamEvent::Token { text } => {
            let _ = write!(out, "{text}");
            let _ = out.flush();
        }
        StreamEvent::Done => {
            let _ = writeln!(out);
        }
        StreamEvent::Error { message, .. } => {
            tracing::debug!("relay error frame: {message}");
        }
    }
}

/// Print whatever the terminal state adds beyond the streamed text.
fn report(session: &ChatSession, state: StreamState) -> StreamState {
    match state {
        StreamState::Failed => {
            if let Some(turn) = session.conversation().last() {
                eprintln!("\n{}", turn.content);
            }
            eprintln!("Use /retry to try again.");
        }
        StreamState::Cancelled => eprintln!("\n[stopped]"),
        StreamState::Interrupted => {
            eprintln!("\n[connection closed before the reply finished; use /retry]")
        }
        _ => {}
    }
    state
}

/// Ask for a token and install it. Returns whether one was entered.
async fn login(session: &mut ChatSession) -> bool {
    eprintln!("Enter the bearer token issued for this server.");
    match prompt::read_token().await {
        Some(token) => {
            session.client_mut().set_token(Some(token));
            eprintln!("Token updated.");
            true
        }
        None => {
            eprintln!("No token entered.");
            false
        }
    }
}

async fn handle_chats_list(session: &ChatSession) {
    match session.client().list_chats().await {
        Ok(summaries) => {
            if summaries.is_empty() {
                eprintln!("No saved chats.");
                return;
            }
            eprintln!("Saved chats:");
            for s in &summaries {
                let current = if Some(s.id) == session.chat_id() { "*" } else { " " };
                eprintln!(
                    "{current} {} {:>8}  {:>3} turns  {}  {}",
                    s.short_id(),
                    s.age(),
                    s.turn_count,
                    s.model,
                    if s.title.is_empty() { "(untitled)" } else { &s.title }
                );
            }
        }
        Err(e) => eprintln!("Failed to list chats: {e}"),
    }
}

async fn open_by_prefix(session: &mut ChatSession, prefix: &str) -> Result<()> {
    let id = resolve_chat(session, prefix).await?;
    session.open(id).await?;
    eprintln!(
        "Opened chat {} ({} turns, model: {})",
        &id.to_string()[..8],
        session.conversation().len(),
        session.model()
    );
    for turn in session.conversation().turns() {
        eprintln!("[{:?}] {}", turn.role, turn.content);
    }
    Ok(())
}

async fn handle_delete(session: &mut ChatSession, prefix: &str) {
    let id = match resolve_chat(session, prefix).await {
        Ok(id) => id,
        Err(e) => {
            eprintln!("{e}");
            return;
        }
    };
    match session.client().delete_chat(id).await {
        Ok(()) => {
            eprintln!("Deleted chat {}", &id.to_string()[..8]);
            if session.chat_id() == Some(id) {
                session.reset();
            }
        }
        Err(e) => eprintln!("Failed to delete chat: {e}"),
    }
}

/// Find the one stored chat whose id starts with `prefix`.
async fn resolve_chat(session: &ChatSession, prefix: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(prefix) {
        return Ok(id);
    }
    let chats = session.client().list_chats().await?;
    match_prefix(&chats, prefix)
}

fn match_prefix(chats: &[ChatSummary], prefix: &str) -> Result<Uuid> {
    let matches: Vec<&ChatSummary> = chats
        .iter()
        .filter(|c| c.id.to_string().starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [one] => Ok(one.id),
        [] => bail!("No chat matches '{prefix}'"),
        _ => bail!("'{prefix}' matches {} chats; use a longer prefix", matches.len()),
    }
}

async fn read_attachment(path: &Path) -> Result<Attachment> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Attachment { name, content })
}

fn print_help() {
    eprintln!("Available commands:");
    eprintln!("  /help           Show this help");
    eprintln!("  /retry          Re-send the last message");
    eprintln!("  /new            Start a new chat");
    eprintln!("  /chats          List saved chats");
    eprintln!("  /open <id>      Open a saved chat by ID prefix");
    eprintln!("  /delete <id>    Delete a saved chat by ID prefix");
    eprintln!("  /models         List models offered by the server");
    eprintln!("  /model [ref]    Show or set the model (provider:model)");
    eprintln!("  /attach <path>  Attach a text file to the next message");
    eprintln!("  /login          Enter a new bearer token");
    eprintln!("  /quit           Exit");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str) -> ChatSummary {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": "t",
            "model": "demo:echo",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z",
            "turn_count": 0,
            "preview": "",
        }))
        .unwrap()
    }

    #[test]
    fn prefix_must_be_unique() {
        let chats = vec![
            summary("aaaa1111-0000-4000-8000-000000000000"),
            summary("aaaa2222-0000-4000-8000-000000000000"),
        ];
        assert_eq!(match_prefix(&chats, "aaaa2").unwrap(), chats[1].id);
        assert!(match_prefix(&chats, "aaaa").is_err());
        assert!(match_prefix(&chats, "b").is_err());
    }
}
