//! Gmail from the command line
//!
//! A thin terminal front-end over the Gmail API: list, read, send, reply,
//! forward, flag and watch mail, with the OAuth session persisted between
//! runs.
//!
//! # Overview
//!
//! - **Session**: saved login state and the OAuth token cache
//! - **Provider**: the [`client::MailProvider`] trait and its Gmail implementation
//! - **Dispatch**: one handler per subcommand, writing to any `Write` sink
//! - **Watch**: fixed-interval poll loop for new inbox mail
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_cli::{cli, config::{AppPaths, Config}, session::SessionStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let paths = AppPaths::resolve(None)?;
//!     let config = Config::load(&paths.config_file()).await?;
//!     let store = SessionStore::from_paths(&paths);
//!
//!     let (session, provider) = cli::open_provider(&paths, &config, &store).await?;
//!     let ctx = cli::Context {
//!         provider: &provider,
//!         config: &config,
//!         session: &session,
//!         interactive: false,
//!     };
//!     cli::cmd_ls(&ctx, &mut std::io::stdout(), "inbox", 10, 0).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 consent flow and hub construction
//! - [`cli`] - Argument parsing and command handlers
//! - [`client`] - Provider adapter over `google-gmail1`
//! - [`compose`] - Outgoing message construction
//! - [`config`] - Paths and the optional TOML config file
//! - [`error`] - Error types and result alias
//! - [`format`] - Terminal output
//! - [`models`] - Core data structures
//! - [`references`] - Index/id message references
//! - [`session`] - Session persistence
//! - [`watch`] - The `watch` poll loop

pub mod auth;
pub mod cli;
pub mod client;
pub mod compose;
pub mod config;
pub mod error;
pub mod format;
pub mod models;
pub mod references;
pub mod session;
pub mod watch;

// Re-export commonly used types for convenience
pub use error::{MailError, Result};

pub use client::{GmailProvider, MailProvider};
pub use config::{AppPaths, Config};
pub use models::{
    Account, Address, Folder, FolderSelector, MessageDetail, MessageSummary, Mutation,
};
pub use references::{MessageRef, ReferenceTable};
pub use session::{Session, SessionStore};
pub use watch::{WatchOptions, WatchReport};

// CLI types (for binary usage)
pub use cli::{Cli, Commands, Context};
