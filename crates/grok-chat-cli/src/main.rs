//! `grok-chat`: stream one reply from a Grok-compatible API to the terminal.

mod args;
mod history;
mod printer;

use std::path::Path;

use anyhow::Context as _;
use clap::Parser as _;
use grok_chat_core::observability::init_observability;
use grok_chat_core::prelude::*;
use grok_chat_core::RequestMessage;
use tracing::warn;

use crate::args::Args;
use crate::history::History;
use crate::printer::TerminalPrinter;

/// Loads `.env` from the crate directory, then from the working directory.
fn load_dotenv() {
    let _ = dotenvy::from_path(Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/.env")));
    dotenvy::dotenv().ok();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    init_observability("warn");
    let args = Args::parse();

    let mut history = History::open(&args)?;
    if let Some(store) = history.store_mut()
        && let Some(name) = &args.delete_session
    {
        let id = store
            .find_by_name(name)
            .map(|s| s.session_id.clone())
            .with_context(|| format!("no session named {name:?}"))?;
        store.delete_session(&id)?;
        println!("deleted session {name:?}");
    }
    if args.list_sessions
        && let Some(store) = history.store()
    {
        print_sessions(store);
    }
    if args.list_sessions || args.delete_session.is_some() {
        history.save(grok_chat_core::config::DEFAULT_MODEL)?;
        return Ok(());
    }

    let config = args.apply(ChatClientConfig::from_env()?, history.model_used());
    let client = ChatClient::new(config)?;
    let model = client.config().model.clone();

    if args.check_key {
        client.verify_api_key().await.map_err(explain)?;
        println!("API key accepted by {}", client.config().base_url);
        return Ok(());
    }

    let Some(prompt) = args.prompt.clone().filter(|p| !p.trim().is_empty()) else {
        if args.import.is_some() {
            history.save(&model)?;
            println!("imported as session {:?}", history.conversation()?.name);
            return Ok(());
        }
        anyhow::bail!("a prompt is required (or pass --check-key)");
    };

    history.conversation_mut()?.push(ChatMessage::user(prompt));
    history.save(&model)?;

    let request = history.conversation()?.request_messages();
    let reply = if client.config().stream {
        stream_reply(&client, request).await?
    } else {
        let reply = client.complete(request).await.map_err(explain)?;
        println!("{reply}");
        reply
    };
    history.conversation_mut()?.push(ChatMessage::assistant(reply.clone()));
    history.save(&model)?;

    if args.html {
        println!("{}", PulldownMarkdownRenderer.render(&reply));
    }
    Ok(())
}

fn print_sessions(store: &SessionStore) {
    for session in store.sessions() {
        let marker = if store.active_id() == Some(session.session_id.as_str()) {
            '*'
        } else {
            ' '
        };
        println!(
            "{marker} {} ({} messages)",
            session.name,
            session.messages.len()
        );
    }
}

/// Streams the reply to stdout; Ctrl-C stops it but keeps what arrived.
async fn stream_reply(
    client: &ChatClient,
    request: Vec<RequestMessage>,
) -> anyhow::Result<String> {
    let mut exchange = client.start_exchange(request).await.map_err(explain)?;

    let abort = exchange.abort_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    let mut printer = TerminalPrinter::new(std::io::stdout().lock());
    while let Some(event) = exchange.next_event().await {
        match event {
            ExchangeEvent::Updated { content, .. } => printer.update(&content)?,
            ExchangeEvent::Finalized { message, .. } => {
                printer.update(message.content())?;
                break;
            }
            ExchangeEvent::Started { .. } => {}
        }
    }
    ctrl_c.abort();
    printer.finish()?;

    let outcome = exchange.finish().await?;
    if let Some(failure) = &outcome.failure {
        warn!(%failure, "reply ended before the server closed the stream");
    }
    Ok(outcome.message.content().to_string())
}

fn explain(err: ChatError) -> anyhow::Error {
    if err.is_auth_rejected() {
        anyhow::Error::new(err).context("the API key was rejected; check GROK_API_KEY")
    } else {
        err.into()
    }
}
