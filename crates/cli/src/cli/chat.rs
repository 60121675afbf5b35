//! `imsim chat`: interactive conversation over stdin/stdout.
//!
//! Issues a token, creates a conversation and subscribes to its event
//! stream. Every stream event is printed to stdout as one JSON line; each
//! stdin line is sent as a message (`/file <path> [caption]` uploads an
//! attachment). A stream that ends on an expired token
//! is reopened with a refreshed token from the last delivered event id.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use im_conversation::{ConversationService, RestConversationClient};
use im_credentials::{SessionState, TokenIssuer};
use im_domain::config::Config;
use im_domain::StreamEvent;
use im_stream::{CloseReason, EventStreamConsumer, StreamHandle, StreamTarget};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat(
    config: Arc<Config>,
    language: Option<String>,
    keep_open: bool,
) -> anyhow::Result<()> {
    // 1. Credentials.
    let session = Arc::new(SessionState::from_config(&config.session));
    let issuer = Arc::new(TokenIssuer::from_config(&config, session.clone())?);
    let token = issuer.valid_token().await?;

    // 2. Conversation.
    let client = RestConversationClient::new(&config, session.clone())?.with_issuer(issuer.clone());
    let created = client.create_conversation(language.as_deref(), None).await?;
    eprintln!(
        "Conversation {}  |  Type /typing, /stop, /file <path> [caption], or /quit; Ctrl+D to exit",
        created.conversation_id
    );

    // 3. Event stream.
    let target = StreamTarget::resolve(&config, &session)?;
    let consumer = EventStreamConsumer::new(target, &config.stream)?.with_session(session.clone());
    let mut handle = Some(consumer.open(token, None));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // 4. Loop until stdin closes, Ctrl+C, or the stream gives up.
    loop {
        let Some(active) = handle.as_mut() else { break };

        tokio::select! {
            event = active.next() => match event {
                Some(event) => print_event(&event)?,
                None => {
                    let Some(finished) = handle.take() else { break };
                    match reopen(finished, &consumer, &issuer).await? {
                        Some(next) => handle = Some(next),
                        None => break,
                    }
                }
            },
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !handle_line(&client, line.trim()).await {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, closing");
                break;
            }
        }
    }

    // 5. Teardown.
    if let Some(handle) = handle {
        let outcome = handle.close().await;
        tracing::info!(
            events = outcome.events_delivered,
            last_event_id = ?outcome.last_event_id,
            "stream closed"
        );
    }
    if !keep_open {
        if let Err(e) = client.close_conversation().await {
            tracing::warn!(error = %e, "failed to close conversation");
        }
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Reopen after a token expiry; any other close reason ends the chat.
async fn reopen(
    finished: StreamHandle,
    consumer: &EventStreamConsumer,
    issuer: &TokenIssuer,
) -> anyhow::Result<Option<StreamHandle>> {
    let outcome = finished.join().await;
    match outcome.reason {
        CloseReason::TokenExpired => {
            tracing::info!(
                last_event_id = ?outcome.last_event_id,
                "stream token expired, refreshing"
            );
            let token = issuer.refresh().await?;
            Ok(Some(consumer.open(token, outcome.last_event_id)))
        }
        reason => {
            tracing::warn!(?reason, "stream ended");
            Ok(None)
        }
    }
}

/// Returns `false` when the user asked to quit.
async fn handle_line(client: &RestConversationClient, line: &str) -> bool {
    let result = match line {
        "" => return true,
        "/quit" | "/exit" => return false,
        "/typing" => client.send_typing(true).await.map(|_| ()),
        "/stop" => client.send_typing(false).await.map(|_| ()),
        _ if line.starts_with("/file ") => {
            let (path, caption) = parse_file_command(line);
            client.send_file(Path::new(path), caption).await.map(|sent| {
                eprintln!("sent {} ({} bytes)", sent.file_name, sent.size);
            })
        }
        text => client.send_message(text).await.map(|sent| {
            tracing::debug!(message_id = %sent.message_id, "sent");
        }),
    };
    if let Err(e) = result {
        eprintln!("error: {e}");
    }
    true
}

/// `/file <path> [caption]`; the path ends at the first space.
fn parse_file_command(line: &str) -> (&str, Option<&str>) {
    let rest = line.trim_start_matches("/file").trim();
    match rest.split_once(' ') {
        Some((path, caption)) => (path, Some(caption.trim()).filter(|c| !c.is_empty())),
        None => (rest, None),
    }
}

fn print_event(event: &StreamEvent) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_command_splits_path_and_caption() {
        assert_eq!(
            parse_file_command("/file ./scan.pdf  my receipt "),
            ("./scan.pdf", Some("my receipt"))
        );
        assert_eq!(parse_file_command("/file notes.txt"), ("notes.txt", None));
        assert_eq!(parse_file_command("/file notes.txt   "), ("notes.txt", None));
    }
}
