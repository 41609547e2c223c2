//! `phx chat`: an interactive line chat on one topic.
//!
//! Every stdin line is pushed as `new_message`. Lines of the form
//! `r:<id>: text` reply to an earlier message; `quit` exits.

use crate::commands::{close_socket, open_socket};
use crate::error::{CLIError, Result};
use phoenix_link::SocketOptions;
use serde_json::{json, Value};
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

pub const DEFAULT_TOPIC: &str = "skeet:lobby";
pub const MESSAGE_EVENT: &str = "new_message";
pub const MAX_USERNAME_LEN: usize = 16;
pub const MAX_BODY_LEN: usize = 250;

const QUIT_COMMAND: &str = "quit";
const REPLY_PREFIX: &str = "r:";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub url: String,
    pub topic: String,
    pub user: Option<String>,
    pub socket: SocketOptions,
}

/// One parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Quit,
    Empty,
    Message {
        body: String,
        reply_to: Option<String>,
    },
}

/// Trim and check a username: 1 to 16 characters.
pub fn validate_username(raw: &str) -> Result<String> {
    let name = raw.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_USERNAME_LEN {
        return Err(CLIError::InputError(format!(
            "Username must be 1-{} characters",
            MAX_USERNAME_LEN
        )));
    }
    Ok(name.to_string())
}

pub fn parse_input(line: &str) -> Result<ChatInput> {
    let line = line.trim();
    if line.eq_ignore_ascii_case(QUIT_COMMAND) {
        return Ok(ChatInput::Quit);
    }

    let (body, reply_to) = match line.strip_prefix(REPLY_PREFIX) {
        Some(rest) => {
            let (id, body) = rest.split_once(':').ok_or_else(|| {
                CLIError::InputError("Invalid reply format. Use: r:message_id: your message".into())
            })?;
            (body.trim(), Some(id.trim().to_string()))
        },
        None => (line, None),
    };

    if body.is_empty() {
        return Ok(ChatInput::Empty);
    }
    if body.chars().count() > MAX_BODY_LEN {
        return Err(CLIError::InputError(format!(
            "Message too long (max {} chars)",
            MAX_BODY_LEN
        )));
    }

    Ok(ChatInput::Message {
        body: body.to_string(),
        reply_to,
    })
}

pub fn message_payload(body: &str, user: &str, reply_to: Option<&str>) -> Value {
    json!({
        "body": body,
        "user": user,
        "reply_to": reply_to,
    })
}

/// Render a `new_message` broadcast for the terminal.
pub fn format_broadcast(payload: &Value) -> String {
    let user = payload["user"].as_str().unwrap_or("unknown");
    let body = payload["body"].as_str().unwrap_or_default();
    let mut out = format!("[{}] {}", user, body);
    let id = match &payload["id"] {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    if let Some(id) = id {
        out.push_str(&format!("  (id: {})", id));
    }
    if let Some(reply_to) = payload["reply_to"].as_str() {
        out.push_str(&format!("\n  -> reply to {}", reply_to));
    }
    out
}

fn prompt(text: &str) {
    print!("{}", text);
    let _ = std::io::stdout().flush();
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>) -> Result<String> {
    lines.next_line().await?.ok_or(CLIError::Cancelled)
}

async fn ask_username(lines: &mut Lines<BufReader<Stdin>>) -> Result<String> {
    prompt(&format!("Enter your username (max {} chars): ", MAX_USERNAME_LEN));
    loop {
        match validate_username(&read_line(lines).await?) {
            Ok(name) => return Ok(name),
            Err(_) => prompt(&format!(
                "Please enter a valid username (1-{} chars): ",
                MAX_USERNAME_LEN
            )),
        }
    }
}

pub async fn run(options: ChatOptions) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let username = match options.user.as_deref() {
        Some(user) => validate_username(user)?,
        None => ask_username(&mut lines).await?,
    };

    let socket = open_socket(&options.url, options.socket.clone())?;
    println!("Connecting to {}...", socket.url());
    socket.connect();
    if let Err(e) = socket.wait_connected(CONNECT_TIMEOUT).await {
        close_socket(&socket).await;
        return Err(e.into());
    }

    let channel = socket.channel(options.topic.as_str(), json!({}));
    let me = username.clone();
    channel.on(MESSAGE_EVENT, move |payload, _ref| {
        if payload["user"].as_str() != Some(me.as_str()) {
            println!("\n{}", format_broadcast(payload));
        }
    });

    if let Err(e) = channel.join().await {
        close_socket(&socket).await;
        return Err(e.into());
    }

    println!("Joined {} as {}.", options.topic, username);
    println!("To reply to a message, start with 'r:<message_id>:'");
    println!("Enter '{}' to exit", QUIT_COMMAND);

    loop {
        let line = match read_line(&mut lines).await {
            Ok(line) => line,
            Err(CLIError::Cancelled) => break,
            Err(e) => {
                close_socket(&socket).await;
                return Err(e);
            },
        };

        let (body, reply_to) = match parse_input(&line) {
            Ok(ChatInput::Quit) => break,
            Ok(ChatInput::Empty) => continue,
            Ok(ChatInput::Message { body, reply_to }) => (body, reply_to),
            Err(e) => {
                eprintln!("{}", e);
                continue;
            },
        };

        let payload = message_payload(&body, &username, reply_to.as_deref());
        match channel.push(MESSAGE_EVENT, payload).await {
            Ok(push) => {
                push.receive("ok", |response| match response.get("id") {
                    Some(id) => println!("Message sent (ID: {})", id),
                    None => println!("Message sent"),
                })
                .receive("error", |response| eprintln!("Message rejected: {}", response));
            },
            Err(e) => eprintln!("Error sending message: {}", e),
        }
    }

    channel.leave();
    close_socket(&socket).await;
    println!("Goodbye!");
    Ok(())
}
