//! Command dispatch
//!
//! Wires configuration, credentials and the session client together for
//! each subcommand. Output for humans goes to stdout/stderr; diagnostics go
//! through `tracing`.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{AsyncBufRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zenedit_core::{ApproveTarget, Selection, SessionNotice, SessionState};

use crate::agent::api::AgentApi;
use crate::agent::client::{CancelHandle, SessionClient, StreamOutcome, SuggestParams};
use crate::agent::credentials::CredentialStore;
use crate::agent::transport::HttpTransport;
use crate::cli::args::{Cli, Command, EditArgs};
use crate::cli::repl::{next_command, ReplCommand, HELP};
use crate::cli::{exit_code, EXIT_FAILURE, EXIT_SUCCESS};
use crate::config::{ConfigManager, ZenEditConfig};
use crate::editor::EditorBuffer;

/// Run a parsed command line and return the process exit code
pub async fn run_cli(cli: Cli, config: ConfigManager) -> i32 {
    match dispatch(cli.command, &config).await {
        Ok(()) => EXIT_SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            if exit_code(&err) != EXIT_FAILURE {
                eprintln!("Please log in again: zenedit login --username <name> --password <password>");
            }
            exit_code(&err)
        }
    }
}

async fn dispatch(command: Command, config: &ConfigManager) -> Result<()> {
    match command {
        Command::Login { username, password } => {
            let mut api = build_api(config)?;
            api.login(&username, &password).await?;
            println!("Logged in as {}", username);
            Ok(())
        }
        Command::Books => {
            let mut api = build_api(config)?;
            let books = api.fetch_books().await.context("Failed to fetch books")?;
            if books.is_empty() {
                println!("No books yet");
            }
            for book in books {
                println!("{}\t{}", book.slug, book.title);
            }
            Ok(())
        }
        Command::Edit(args) => edit(args, config).await,
        Command::InsertLinks { file, urls } => insert_links(&file, &urls),
    }
}

/// Build the service API from configuration
pub fn build_api(config: &ConfigManager) -> Result<AgentApi> {
    let settings: &ZenEditConfig = config.get_config();
    let token_file = config.token_file()?;
    let mut credentials = CredentialStore::load(&token_file)
        .with_context(|| format!("Failed to read credential cache {:?}", token_file))?;
    if let Some(token) = &settings.auth.token {
        credentials.set_in_memory(token.clone());
    }

    let transport = HttpTransport::with_timeout(Duration::from_secs(
        settings.server.request_timeout_seconds,
    ))?;
    Ok(AgentApi::new(transport, &settings.server.base_url, credentials)
        .with_retry(settings.retry.policy()))
}

async fn edit(args: EditArgs, config: &ConfigManager) -> Result<()> {
    let mut api = build_api(config)?;
    if !api.is_authenticated() {
        debug!("no cached credential; the service will decide");
    }

    let mut buffer = match &args.file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            EditorBuffer::with_local_edits(content)
        }
        None => {
            let chapter = api
                .fetch_chapter(&args.book, &args.chapter)
                .await
                .context("Failed to fetch chapter")?;
            EditorBuffer::new(chapter.content)
        }
    };

    let selection = if args.all {
        buffer.select_all()
    } else {
        let (from, to) = args
            .from
            .zip(args.to)
            .ok_or_else(|| anyhow!("--from and --to are required without --all"))?;
        buffer.select(from, to)?
    };
    let selection = selection.ok_or_else(|| anyhow!("Selection is empty"))?;

    let provider = args.provider.unwrap_or(config.get_config().agent.provider);
    let mut client = SessionClient::new(api).with_provider(provider);
    let printer = spawn_printer(&mut client);
    let interrupted = CancellationToken::new();
    let interrupt = spawn_interrupt_listener(client.cancel_handle(), interrupted.clone());

    let result = run_edit(&mut client, &mut buffer, &args, selection, &interrupted).await;

    interrupt.abort();
    drop(client);
    let _ = printer.await;
    result
}

async fn run_edit(
    client: &mut SessionClient,
    buffer: &mut EditorBuffer,
    args: &EditArgs,
    selection: Selection,
    interrupted: &CancellationToken,
) -> Result<()> {
    let outcome = client
        .suggest(suggest_params(args, buffer, selection, &args.prompt))
        .await?;
    merge_outcome(buffer, &outcome)?;
    let target = approve_target(args);

    if args.interactive {
        let mut input = BufReader::new(tokio::io::stdin());
        review(client, buffer, args, target, &mut input, interrupted).await
    } else if interrupted.is_cancelled() {
        bail!("Interrupted")
    } else if buffer.has_pending_suggestion() {
        approve(client, buffer, args, target).await
    } else {
        Err(anyhow!("No suggestion to approve"))
    }
}

fn suggest_params(
    args: &EditArgs,
    buffer: &EditorBuffer,
    selection: Selection,
    prompt: &str,
) -> SuggestParams {
    SuggestParams {
        book_slug: args.book.clone(),
        chapter_slug: args.chapter.clone(),
        selection,
        prompt: prompt.to_string(),
        content: buffer.unsaved_content(),
    }
}

/// Ctrl-C for the whole edit session
///
/// Cancels the stream in flight; with none in flight it ends the review.
fn spawn_interrupt_listener(cancel: CancelHandle, interrupted: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt(&cancel, &interrupted);
        }
    })
}

fn on_interrupt(cancel: &CancelHandle, interrupted: &CancellationToken) {
    if cancel.cancel() {
        debug!("interrupt: stream cancelled");
    } else {
        debug!("interrupt: leaving edit session");
        interrupted.cancel();
    }
}

fn approve_target(args: &EditArgs) -> ApproveTarget {
    ApproveTarget::for_buffer(args.file.is_some(), &args.book, &args.chapter)
}

/// Auto-apply a completed suggestion; partial output is never merged
fn merge_outcome(buffer: &mut EditorBuffer, outcome: &StreamOutcome) -> Result<bool> {
    match outcome {
        StreamOutcome::Completed { text } => {
            let merged = buffer.apply_suggestion(text)?;
            Ok(merged)
        }
        StreamOutcome::Failed { error, partial } => {
            eprintln!("Suggestion failed: {}", error);
            if !partial.is_empty() {
                eprintln!("Partial output ({} bytes) was kept but not applied", partial.len());
            }
            Ok(false)
        }
        StreamOutcome::Cancelled => {
            eprintln!("Cancelled");
            Ok(false)
        }
    }
}

async fn review<R>(
    client: &mut SessionClient,
    buffer: &mut EditorBuffer,
    args: &EditArgs,
    target: ApproveTarget,
    input: &mut R,
    interrupted: &CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    eprintln!("{}", HELP);

    loop {
        let command = tokio::select! {
            _ = interrupted.cancelled() => {
                eprintln!("Interrupted");
                None
            }
            command = next_command(input) => command?,
        };
        let Some(command) = command else { break };

        let streamed = match command {
            ReplCommand::Revise(prompt) => client.revise(&prompt).await,
            ReplCommand::Suggest(prompt) => {
                buffer.discard_suggestion();
                let Some(selection) = buffer.selection().cloned() else {
                    eprintln!("Nothing selected");
                    continue;
                };
                client
                    .suggest(suggest_params(args, buffer, selection, &prompt))
                    .await
            }
            ReplCommand::Approve => {
                if !buffer.has_pending_suggestion() {
                    eprintln!("Nothing to approve; try suggest <prompt>");
                    continue;
                }
                match approve(client, buffer, args, target.clone()).await {
                    Ok(()) => return Ok(()),
                    Err(err) if exit_code(&err) != EXIT_FAILURE => return Err(err),
                    Err(err) => eprintln!("{:#}", err),
                }
                continue;
            }
            ReplCommand::Discard => {
                if client.session().state() != SessionState::Idle {
                    client.discard()?;
                }
                buffer.discard_suggestion();
                eprintln!("Suggestion discarded");
                return Ok(());
            }
            ReplCommand::Cancel => {
                client.cancel();
                buffer.discard_suggestion();
                eprintln!("Session cancelled");
                return Ok(());
            }
            ReplCommand::Show => {
                println!("{}", buffer.content());
                continue;
            }
            ReplCommand::Help => {
                eprintln!("{}", HELP);
                continue;
            }
        };

        match streamed {
            Ok(outcome) => {
                merge_outcome(buffer, &outcome)?;
            }
            Err(err) if err.is_unauthorized() => return Err(err.into()),
            Err(err) => eprintln!("{}", err),
        }
    }
    client.cancel();
    buffer.discard_suggestion();
    Ok(())
}

async fn approve(
    client: &mut SessionClient,
    buffer: &mut EditorBuffer,
    args: &EditArgs,
    target: ApproveTarget,
) -> Result<()> {
    let local = target == ApproveTarget::LocalBuffer;
    if local {
        if let Some(path) = &args.file {
            std::fs::write(path, buffer.content())
                .with_context(|| format!("Failed to write {:?}", path))?;
        }
    }

    client.approve(target).await.context("Approval failed")?;
    buffer.accept_suggestion();
    buffer.mark_saved();

    match &args.file {
        Some(path) if local => println!("Saved {}", path.display()),
        _ => println!("Applied to {}/{}", args.book, args.chapter),
    }
    info!(book = %args.book, chapter = %args.chapter, local, "edit approved");
    Ok(())
}

/// Stream notices to the terminal while the client works
fn spawn_printer(client: &mut SessionClient) -> JoinHandle<()> {
    let mut notices = client.subscribe();
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            match notice {
                SessionNotice::Delta { text } => {
                    print!("{}", text);
                    let _ = std::io::stdout().flush();
                }
                SessionNotice::SuggestionComplete { .. } => println!(),
                SessionNotice::StreamFailed { .. } => println!(),
                SessionNotice::SessionStarted { session_id } => {
                    debug!(session_id = %session_id, "session started");
                }
                SessionNotice::Approved | SessionNotice::Discarded | SessionNotice::Cancelled => {}
            }
        }
    })
}

fn insert_links(file: &Path, urls: &[String]) -> Result<()> {
    let content = std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    let mut buffer = EditorBuffer::new(content);
    let inserted = buffer.insert_links(urls.iter().map(String::as_str));
    if inserted == 0 {
        bail!("No links to insert");
    }
    std::fs::write(file, buffer.content()).with_context(|| format!("Failed to write {:?}", file))?;
    println!("Inserted {} link(s) into {}", inserted, file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::transport::{FakeTransport, TransportError};

    const WORLD: &str = "event: done\ndata: {\"replacement\": \"world\"}\n\nevent: session\ndata: {\"sessionId\": \"s-1\"}\n\n";

    fn edit_args() -> EditArgs {
        EditArgs {
            book: "book".to_string(),
            chapter: "ch-1".to_string(),
            from: Some(6),
            to: Some(10),
            all: false,
            prompt: "fix typos".to_string(),
            file: None,
            provider: None,
            interactive: true,
        }
    }

    fn client_with(fake: &FakeTransport) -> SessionClient {
        SessionClient::new(AgentApi::new(
            fake.clone(),
            "http://svc/api",
            CredentialStore::in_memory(Some("tok".to_string())),
        ))
    }

    /// "Hello wrld" with "wrld" selected
    fn buffer() -> (EditorBuffer, Selection) {
        let mut buffer = EditorBuffer::new("Hello wrld");
        let selection = buffer.select(6, 10).unwrap().unwrap();
        (buffer, selection)
    }

    async fn run_review(
        client: &mut SessionClient,
        buffer: &mut EditorBuffer,
        script: &str,
        interrupted: &CancellationToken,
    ) -> Result<()> {
        let mut input = BufReader::new(script.as_bytes());
        review(client, buffer, &edit_args(), ApproveTarget::LocalBuffer, &mut input, interrupted).await
    }

    #[tokio::test]
    async fn test_discard_from_idle_rolls_back_only() {
        let fake = FakeTransport::new();
        let mut client = client_with(&fake);
        let (mut buffer, _) = buffer();

        run_review(&mut client, &mut buffer, "discard\n", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(client.session().state(), SessionState::Idle);
        assert_eq!(buffer.content(), "Hello wrld");
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn test_suggest_command_starts_over_after_failure() {
        let fake = FakeTransport::new();
        fake.push_error(TransportError::Http {
            status: 503,
            message: "HTTP 503".to_string(),
        })
        .push_stream(WORLD, 9);
        let mut client = client_with(&fake);
        let (mut buffer, selection) = buffer();

        let outcome = client
            .suggest(suggest_params(&edit_args(), &buffer, selection, "fix typos"))
            .await
            .unwrap();
        assert!(matches!(outcome, StreamOutcome::Failed { .. }));
        assert!(client.session().session_id().is_none());

        let script = "approve\nsuggest fix typos\napprove\n";
        run_review(&mut client, &mut buffer, script, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(buffer.content(), "Hello world");
        assert!(!buffer.has_pending_suggestion());
        assert_eq!(client.session().state(), SessionState::Approved);
        assert_eq!(fake.requests().len(), 2);
        assert_eq!(fake.requests()[1].json()["selectionStart"], 6);
    }

    #[tokio::test]
    async fn test_interrupt_leaves_review() {
        let fake = FakeTransport::new();
        fake.push_stream(WORLD, 64);
        let mut client = client_with(&fake);
        let (mut buffer, selection) = buffer();
        let outcome = client
            .suggest(suggest_params(&edit_args(), &buffer, selection, "fix typos"))
            .await
            .unwrap();
        merge_outcome(&mut buffer, &outcome).unwrap();
        assert_eq!(buffer.content(), "Hello world");

        let interrupted = CancellationToken::new();
        on_interrupt(&client.cancel_handle(), &interrupted);
        assert!(interrupted.is_cancelled(), "no stream in flight");

        // Input that never arrives
        let (_keyboard, stdin) = tokio::io::duplex(64);
        let mut input = BufReader::new(stdin);
        let reviewed = tokio::time::timeout(
            Duration::from_secs(5),
            review(
                &mut client,
                &mut buffer,
                &edit_args(),
                ApproveTarget::LocalBuffer,
                &mut input,
                &interrupted,
            ),
        )
        .await
        .expect("interrupt should end the review");

        assert!(reviewed.is_ok());
        assert_eq!(buffer.content(), "Hello wrld");
        assert_eq!(client.session().state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_interrupt_cancels_stream_first() {
        let fake = FakeTransport::new();
        fake.push_stalled_open();
        let mut client = client_with(&fake);
        let cancel = client.cancel_handle();
        let interrupted = CancellationToken::new();
        let (buffer, selection) = buffer();

        let (outcome, ()) = tokio::join!(
            client.suggest(suggest_params(&edit_args(), &buffer, selection, "fix typos")),
            async {
                while !cancel.is_in_flight() {
                    tokio::task::yield_now().await;
                }
                on_interrupt(&cancel, &interrupted);
                assert!(!interrupted.is_cancelled());
            }
        );
        assert_eq!(outcome.unwrap(), StreamOutcome::Cancelled);

        // The listener keeps running: the next Ctrl-C ends the session
        on_interrupt(&cancel, &interrupted);
        assert!(interrupted.is_cancelled());
    }
}
