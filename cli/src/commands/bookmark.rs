//! `phx bookmark`: create one bookmark over a token-scoped channel.

use crate::commands::{close_socket, open_socket};
use crate::error::Result;
use phoenix_link::{PhoenixSocket, SocketOptions};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

pub const CREATE_EVENT: &str = "bookmark:create";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct BookmarkOptions {
    pub url: String,
    pub token: String,
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub socket: SocketOptions,
}

/// How the server answered `bookmark:create`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Created(Value),
    Rejected(String),
    NoResponse,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Created(_) => write!(f, "Bookmark saved"),
            Outcome::Rejected(errors) => write!(f, "Bookmark rejected: {}", errors),
            Outcome::NoResponse => write!(
                f,
                "No response from server after {}s; the bookmark may not have been saved",
                REPLY_TIMEOUT.as_secs()
            ),
        }
    }
}

pub fn topic_for(token: &str) -> String {
    format!("bookmark:client:{}", token)
}

pub fn bookmark_payload(options: &BookmarkOptions) -> Value {
    json!({
        "title": options.title,
        "url": options.link,
        "description": options.description.as_deref().unwrap_or_default(),
        "tags": options.tags,
    })
}

/// Flatten a changeset error response into `field: msg1, msg2; field2: msg`.
///
/// Falls back to `reason`, then to the raw response.
pub fn format_errors(response: &Value) -> String {
    if let Some(errors) = response.get("errors").and_then(Value::as_object) {
        return errors
            .iter()
            .map(|(field, messages)| {
                let messages = match messages {
                    Value::Array(items) => items
                        .iter()
                        .map(|m| m.as_str().map(str::to_string).unwrap_or_else(|| m.to_string()))
                        .collect::<Vec<_>>()
                        .join(", "),
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("{}: {}", field, messages)
            })
            .collect::<Vec<_>>()
            .join("; ");
    }

    match response.get("reason").and_then(Value::as_str) {
        Some(reason) => reason.to_string(),
        None => response.to_string(),
    }
}

pub async fn run(options: BookmarkOptions) -> Result<Outcome> {
    let socket_options = options.socket.clone().with_param("token", options.token.clone());
    let socket = open_socket(&options.url, socket_options)?;
    socket.connect();

    let result = create(&socket, &options).await;
    close_socket(&socket).await;
    result
}

async fn create(socket: &PhoenixSocket, options: &BookmarkOptions) -> Result<Outcome> {
    socket.wait_connected(CONNECT_TIMEOUT).await?;

    let channel = socket.channel(topic_for(&options.token), json!({}));
    channel.join().await?;
    log::debug!("Joined {}", channel.topic());

    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let rejected_tx = outcome_tx.clone();
    channel
        .push(CREATE_EVENT, bookmark_payload(options))
        .await?
        .receive("ok", move |response| {
            let _ = outcome_tx.send(Outcome::Created(response));
        })
        .receive("error", move |response| {
            let _ = rejected_tx.send(Outcome::Rejected(format_errors(&response)));
        });

    let outcome = match tokio::time::timeout(REPLY_TIMEOUT, outcome_rx.recv()).await {
        Ok(Some(outcome)) => outcome,
        Ok(None) | Err(_) => Outcome::NoResponse,
    };
    channel.leave();
    Ok(outcome)
}
