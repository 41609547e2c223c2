use clap::{Args, Parser, Subcommand};
use phoenix_cli::commands::chat::DEFAULT_TOPIC;
use phoenix_cli::config::DEFAULT_CONFIG_PATH;
use std::path::PathBuf;

/// phx - Terminal client for Phoenix Channels servers
#[derive(Parser, Debug)]
#[command(name = "phx")]
#[command(version)]
#[command(about = "Terminal client for Phoenix Channels servers", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(long = "config", global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Chat on a topic from the terminal
    Chat(ChatArgs),

    /// Create a bookmark through a token-scoped channel
    Bookmark(BookmarkArgs),
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Socket endpoint (e.g., ws://localhost:4000/socket)
    #[arg(short = 'u', long = "url")]
    pub url: Option<String>,

    /// Topic to join
    #[arg(short = 't', long = "topic", default_value = DEFAULT_TOPIC)]
    pub topic: String,

    /// Username; prompted for when omitted
    #[arg(long = "user")]
    pub user: Option<String>,
}

#[derive(Args, Debug)]
pub struct BookmarkArgs {
    /// Socket endpoint (e.g., ws://localhost:4000/socket)
    #[arg(short = 'u', long = "url")]
    pub url: Option<String>,

    /// Client token; also selects the channel topic
    #[arg(long = "token", env = "PHX_TOKEN")]
    pub token: String,

    #[arg(long = "title")]
    pub title: String,

    /// Bookmarked URL
    #[arg(long = "link")]
    pub link: String,

    #[arg(long = "description")]
    pub description: Option<String>,

    /// Tag to attach (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}
