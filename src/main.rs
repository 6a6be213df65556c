use std::collections::HashMap;
use std::io::Write as _;

use color_eyre::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use rill::client::SearchClient;
use rill::config::ClientConfig;
use rill::history::{Conversation, HistoryStore};
use rill::session::Session;
use rill::state::{StepStatus, StreamState};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    println!("rill {VERSION} - streaming chat client for agent-graph search backends");
    println!();
    println!("Usage: rill [--url <base-url>] [query...]");
    println!();
    println!("With a query argument, runs one turn and exits. Without one,");
    println!("reads queries interactively (/new starts a fresh conversation,");
    println!("/quit exits, Ctrl+C cancels the in-flight answer).");
    println!();
    println!("The base URL can also be set via RILL_BASE_URL.");
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = ClientConfig::from_env();
    let mut query_words: Vec<String> = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--url" => {
                let Some(url) = args.next() else {
                    eprintln!("--url requires a value");
                    std::process::exit(2);
                };
                config = config.with_base_url(url);
            }
            "--version" | "-V" => {
                println!("rill {VERSION}");
                return Ok(());
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            word => query_words.push(word.to_string()),
        }
    }

    let history = HistoryStore::open_default()?;
    let mut session = Session::new(SearchClient::new(config));
    let mut conversation_id: Option<String> = None;

    if !query_words.is_empty() {
        run_turn(&mut session, &history, &mut conversation_id, &query_words.join(" ")).await;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/new" => {
                session.reset().await;
                conversation_id = None;
                println!("Started a new conversation.");
            }
            query => run_turn(&mut session, &history, &mut conversation_id, query).await,
        }
    }

    session.stop().await;
    Ok(())
}

/// Run one query to completion, rendering progress and saving history.
async fn run_turn(
    session: &mut Session,
    history: &HistoryStore,
    conversation_id: &mut Option<String>,
    query: &str,
) {
    let mut snapshots = session.subscribe();
    if let Err(e) = session.submit(query).await {
        eprintln!("Error: {e}");
        return;
    }

    let mut renderer = TurnRenderer::default();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                eprintln!("Cancelling...");
                session.stop().await;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                renderer.render(&snapshot);
                if !snapshot.is_streaming() {
                    finish_turn(history, conversation_id, &snapshot);
                    break;
                }
            }
        }
    }
}

fn finish_turn(
    history: &HistoryStore,
    conversation_id: &mut Option<String>,
    snapshot: &StreamState,
) {
    println!();
    if let Some(error) = &snapshot.error {
        eprintln!("Error: {error}");
        return;
    }

    let conversation = match conversation_id.take() {
        Some(id) => Conversation::updated(id, snapshot.messages.clone()),
        None => Conversation::new(snapshot.messages.clone()),
    };
    *conversation_id = Some(conversation.id.clone());
    if let Err(e) = history.upsert(conversation) {
        tracing::warn!("failed to save history: {e}");
    }
}

/// Diffs consecutive snapshots into terminal output: one line per step
/// transition, token deltas appended in place.
#[derive(Default)]
struct TurnRenderer {
    seen_steps: HashMap<u64, StepStatus>,
    printed: usize,
}

impl TurnRenderer {
    fn render(&mut self, snapshot: &StreamState) {
        for step in &snapshot.steps {
            match self.seen_steps.get(&step.id) {
                None => {
                    match step.status {
                        StepStatus::Pending => eprintln!("... {}", step.node),
                        StepStatus::Success => eprintln!(" ok {}", step.node),
                    }
                    self.seen_steps.insert(step.id, step.status);
                }
                Some(StepStatus::Pending) if step.status == StepStatus::Success => {
                    eprintln!(" ok {}", step.node);
                    self.seen_steps.insert(step.id, step.status);
                }
                Some(_) => {}
            }
        }

        // The buffer restarts when a new answer begins streaming.
        if snapshot.token_buffer.len() < self.printed {
            println!();
            self.printed = 0;
        }
        if snapshot.token_buffer.len() > self.printed {
            print!("{}", &snapshot.token_buffer[self.printed..]);
            let _ = std::io::stdout().flush();
            self.printed = snapshot.token_buffer.len();
        }
    }
}
