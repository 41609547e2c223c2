//! phx - Terminal client for Phoenix Channels servers
//!
//! # Usage
//!
//! ```bash
//! # Chat on the default topic
//! phx chat --url ws://localhost:4000/socket --user ada
//!
//! # Create a bookmark
//! phx bookmark --token <TOKEN> --title "Rust" --link https://www.rust-lang.org --tag lang
//! ```

use clap::Parser;

use phoenix_cli::commands::bookmark::{self, BookmarkOptions, Outcome};
use phoenix_cli::commands::chat::{self, ChatOptions};
use phoenix_cli::{CLIConfiguration, Result};

mod args;

use args::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = CLIConfiguration::load(&cli.config)?;
    let socket_options = config.to_socket_options();

    match cli.command {
        Command::Chat(args) => {
            chat::run(ChatOptions {
                url: config.resolve_url(args.url.as_deref()),
                topic: args.topic,
                user: args.user,
                socket: socket_options,
            })
            .await
        },
        Command::Bookmark(args) => {
            let outcome = bookmark::run(BookmarkOptions {
                url: config.resolve_url(args.url.as_deref()),
                token: args.token,
                title: args.title,
                link: args.link,
                description: args.description,
                tags: args.tags,
                socket: socket_options,
            })
            .await?;

            match outcome {
                Outcome::Created(_) => println!("{}", outcome),
                Outcome::Rejected(_) | Outcome::NoResponse => eprintln!("{}", outcome),
            }
            Ok(())
        },
    }
}
