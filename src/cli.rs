//! Command-line interface and command dispatch
//!
//! Every subcommand is one handler here. Handlers take the provider as
//! `&dyn MailProvider` and write their output to an injected writer, so the
//! binary and the tests drive exactly the same code.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::auth::{self, ChallengeMode, REQUIRED_SCOPES};
use crate::client::{GmailProvider, MailProvider};
use crate::compose::{forward_body, forward_subject, reply_draft, AttachmentFile, Draft};
use crate::config::{AppPaths, Config};
use crate::error::{MailError, Result};
use crate::format;
use crate::models::{FolderSelector, Mutation};
use crate::references::{
    resolve_ref, resolve_refs, resolve_thread_ref, MessageRef, ReferenceTable,
};
use crate::session::{Session, SessionStore};
use crate::watch::{run_watch, WatchOptions, WatchReport};

/// Highest `ls --page` accepted; deeper pages mean listing most of a mailbox
pub const MAX_PAGE: i64 = 1000;

#[derive(Parser, Debug)]
#[command(name = "gmail")]
#[command(version)]
#[command(about = "Read, send and manage Gmail from the terminal", long_about = None)]
pub struct Cli {
    /// Directory holding session, token and config files
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Authorize this machine and save the session
    Login {
        /// Paste the authorization code instead of using a local redirect
        #[arg(long)]
        no_browser: bool,

        /// Discard the saved token and authorize again
        #[arg(long)]
        force: bool,
    },

    /// Remove the saved session
    Logout,

    /// Show current account info
    Whoami,

    /// List messages. FOLDER: inbox, sent, drafts, starred, archive, spam, trash, all, or a label id
    Ls {
        #[arg(default_value = "inbox")]
        folder: String,

        /// Number of messages to show
        #[arg(short = 'n', long, value_parser = clap::value_parser!(u32).range(1..=500))]
        limit: Option<u32>,

        /// Page number (0-indexed)
        #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=MAX_PAGE))]
        page: u32,
    },

    /// Read a message by ID or index number from the last inbox listing
    Read {
        message: String,

        /// Show the raw HTML body
        #[arg(long)]
        html: bool,

        /// Don't mark as read
        #[arg(long)]
        no_mark_read: bool,
    },

    /// Show every message of a conversation
    Thread { thread: String },

    /// Show message counts per folder
    Count,

    /// List folders and labels
    Folders,

    /// Send an email
    Send {
        /// Recipient email(s)
        #[arg(short, long)]
        to: Vec<String>,

        /// CC recipient(s)
        #[arg(long)]
        cc: Vec<String>,

        /// BCC recipient(s)
        #[arg(long)]
        bcc: Vec<String>,

        /// Subject line
        #[arg(short, long)]
        subject: String,

        /// Message body. Omit to read from stdin.
        #[arg(short, long)]
        body: Option<String>,

        /// Treat body as HTML
        #[arg(long)]
        html: bool,

        /// File attachment(s)
        #[arg(short, long)]
        attach: Vec<PathBuf>,
    },

    /// Reply to a message
    Reply {
        message: String,

        /// Reply body. Omit to read from stdin.
        #[arg(short, long)]
        body: Option<String>,

        /// Reply to all recipients
        #[arg(long)]
        all: bool,
    },

    /// Forward a message (with its attachments)
    Forward {
        message: String,

        /// Forward to email(s)
        #[arg(short, long)]
        to: Vec<String>,

        /// Note placed above the forwarded message
        #[arg(short, long)]
        body: Option<String>,
    },

    /// Archive message(s)
    Archive {
        #[arg(required = true)]
        messages: Vec<String>,
    },

    /// Move message(s) to the trash
    Delete {
        #[arg(required = true)]
        messages: Vec<String>,
    },

    /// Star message(s)
    Star {
        #[arg(required = true)]
        messages: Vec<String>,
    },

    /// Mark message(s) as spam
    Spam {
        #[arg(required = true)]
        messages: Vec<String>,
    },

    /// Mark message(s) as unread
    Unread {
        #[arg(required = true)]
        messages: Vec<String>,
    },

    /// Download attachments from a message
    Download {
        message: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Watch for new messages
    Watch {
        /// Poll interval in seconds
        #[arg(short, long)]
        interval: Option<u64>,

        /// Stop after this many seconds (0 = run until Ctrl+C)
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Write an example config file
    InitConfig {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    /// Commands that run without an authorized session
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Commands::Login { .. } | Commands::Logout | Commands::InitConfig { .. }
        )
    }

    /// Argument checks that need neither the session nor the network
    pub fn validate(&self) -> Result<()> {
        match self {
            Commands::Send { to, .. } | Commands::Forward { to, .. } if !has_recipient(to) => {
                Err(MailError::RecipientRequired)
            }
            _ => Ok(()),
        }
    }
}

fn has_recipient(to: &[String]) -> bool {
    to.iter().any(|t| !t.trim().is_empty())
}

/// Spinner shown on stderr while a provider call is in flight.
///
/// Hidden automatically when stderr is not a terminal.
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub fn start(msg: &str) -> Self {
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar = ProgressBar::new_spinner();
        bar.set_style(style);
        bar.set_message(msg.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

/// Run one future behind a spinner
async fn with_spinner<T, F>(msg: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let _spinner = Spinner::start(msg);
    fut.await
}

/// Everything a provider-backed command needs
pub struct Context<'a> {
    pub provider: &'a dyn MailProvider,
    pub config: &'a Config,
    pub session: &'a Session,
    /// Stdin is a terminal, so body prompts make sense
    pub interactive: bool,
}

/// Body from the flag, or everything on stdin
fn read_body(
    body: Option<String>,
    ctx: &Context<'_>,
    input: &mut dyn Read,
    prompt: &str,
) -> Result<String> {
    if let Some(body) = body {
        return Ok(body);
    }
    if ctx.interactive {
        eprintln!("{}", prompt);
    }
    let mut text = String::new();
    input.read_to_string(&mut text)?;
    Ok(text)
}

fn refs_from(args: &[String]) -> Vec<MessageRef> {
    args.iter().map(|a| MessageRef::parse(a)).collect()
}

/// Execute a provider-backed command
pub async fn dispatch<F>(
    command: Commands,
    ctx: &Context<'_>,
    out: &mut dyn Write,
    input: &mut dyn Read,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    debug!("Dispatching {:?}", command);
    match command {
        Commands::Ls {
            folder,
            limit,
            page,
        } => {
            let limit = limit.map(|l| l as usize).unwrap_or(ctx.config.list.default_limit);
            cmd_ls(ctx, out, &folder, limit, page as usize).await.map(|_| ())
        }
        Commands::Read {
            message,
            html,
            no_mark_read,
        } => cmd_read(ctx, out, &MessageRef::parse(&message), html, !no_mark_read).await,
        Commands::Thread { thread } => cmd_thread(ctx, out, &MessageRef::parse(&thread)).await,
        Commands::Count => cmd_count(ctx, out).await,
        Commands::Folders => cmd_folders(ctx, out).await,
        Commands::Whoami => cmd_whoami(ctx, out).await,
        Commands::Send {
            to,
            cc,
            bcc,
            subject,
            body,
            html,
            attach,
        } => {
            let request = SendRequest {
                to,
                cc,
                bcc,
                subject,
                body,
                html,
                attach,
            };
            cmd_send(ctx, out, input, request).await
        }
        Commands::Reply { message, body, all } => {
            cmd_reply(ctx, out, input, &MessageRef::parse(&message), body, all).await
        }
        Commands::Forward { message, to, body } => {
            cmd_forward(ctx, out, input, &MessageRef::parse(&message), to, body).await
        }
        Commands::Archive { messages } => cmd_mutate(ctx, out, &messages, Mutation::Archive).await,
        Commands::Delete { messages } => cmd_mutate(ctx, out, &messages, Mutation::Trash).await,
        Commands::Star { messages } => cmd_mutate(ctx, out, &messages, Mutation::Star).await,
        Commands::Spam { messages } => cmd_mutate(ctx, out, &messages, Mutation::Spam).await,
        Commands::Unread { messages } => {
            cmd_mutate(ctx, out, &messages, Mutation::MarkUnread).await
        }
        Commands::Download { message, output } => {
            cmd_download(ctx, out, &MessageRef::parse(&message), &output).await
        }
        Commands::Watch { interval, timeout } => {
            let options = WatchOptions::from_secs(
                interval.unwrap_or(ctx.config.watch.interval_secs),
                timeout.unwrap_or(ctx.config.watch.timeout_secs),
            );
            cmd_watch(ctx, out, &options, shutdown).await.map(|_| ())
        }
        Commands::Login { .. } | Commands::Logout | Commands::InitConfig { .. } => {
            Err(MailError::ConfigError(
                "login, logout and init-config do not use a provider session".to_string(),
            ))
        }
    }
}

/// List a folder; returns the index table for the rows printed
pub async fn cmd_ls(
    ctx: &Context<'_>,
    out: &mut dyn Write,
    folder: &str,
    limit: usize,
    page: usize,
) -> Result<ReferenceTable> {
    let selector = FolderSelector::parse(folder);
    let mut messages = with_spinner(
        &format!("Fetching {}...", selector.name),
        ctx.provider.list_messages(&selector, limit, page),
    )
    .await?;
    messages.truncate(limit);

    if messages.is_empty() {
        writeln!(out, "No messages in {}.", selector.name)?;
        return Ok(ReferenceTable::default());
    }

    format::print_message_list(out, &messages, &selector.name)?;
    if selector == FolderSelector::inbox() && page == 0 {
        writeln!(out, "\nUse `gmail read <#>` with the # from this list.")?;
    }
    Ok(ReferenceTable::from_listing(&messages))
}

pub async fn cmd_read(
    ctx: &Context<'_>,
    out: &mut dyn Write,
    reference: &MessageRef,
    raw_html: bool,
    mark_read: bool,
) -> Result<()> {
    let id = resolve_ref(ctx.provider, reference).await?;
    let message = with_spinner("Fetching message...", ctx.provider.get_message(&id)).await?;

    format::print_message(out, &message, raw_html)?;

    if mark_read && message.summary.unread {
        ctx.provider.mutate(&[id], Mutation::MarkRead).await?;
    }
    Ok(())
}

pub async fn cmd_thread(
    ctx: &Context<'_>,
    out: &mut dyn Write,
    reference: &MessageRef,
) -> Result<()> {
    let thread_id = resolve_thread_ref(ctx.provider, reference).await?;
    let messages = with_spinner("Fetching thread...", ctx.provider.get_thread(&thread_id)).await?;

    let subject = messages
        .first()
        .map(|m| m.summary.subject.as_str())
        .unwrap_or_default();
    writeln!(out, "Thread: {} ({} messages)", subject, messages.len())?;
    writeln!(out)?;
    for message in &messages {
        format::print_message(out, message, false)?;
    }
    Ok(())
}

pub async fn cmd_count(ctx: &Context<'_>, out: &mut dyn Write) -> Result<()> {
    let counts = with_spinner("Fetching counts...", ctx.provider.folder_counts()).await?;
    format::print_counts(out, &counts)?;
    Ok(())
}

pub async fn cmd_folders(ctx: &Context<'_>, out: &mut dyn Write) -> Result<()> {
    let labels = with_spinner("Fetching folders...", ctx.provider.list_labels()).await?;
    format::print_folders(out, &labels)?;
    Ok(())
}

pub async fn cmd_whoami(ctx: &Context<'_>, out: &mut dyn Write) -> Result<()> {
    let account = ctx.provider.account().await?;
    if !account.email.eq_ignore_ascii_case(&ctx.session.account) {
        warn!(
            "Session was saved for {} but the token belongs to {}",
            ctx.session.account, account.email
        );
    }
    let identities = ctx.provider.identities().await?;
    format::print_identities(out, &account, &identities)?;
    Ok(())
}

/// Arguments of `send`
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: Option<String>,
    pub html: bool,
    pub attach: Vec<PathBuf>,
}

pub async fn cmd_send(
    ctx: &Context<'_>,
    out: &mut dyn Write,
    input: &mut dyn Read,
    request: SendRequest,
) -> Result<()> {
    if !has_recipient(&request.to) {
        return Err(MailError::RecipientRequired);
    }

    let body = read_body(
        request.body,
        ctx,
        input,
        "Enter message body (Ctrl+D to finish):",
    )?;

    let mut attachments = Vec::with_capacity(request.attach.len());
    for path in &request.attach {
        attachments.push(AttachmentFile::load(path).await?);
    }

    let draft = Draft {
        from: ctx.session.account.clone(),
        to: request.to,
        cc: request.cc,
        bcc: request.bcc,
        subject: request.subject,
        body,
        html: request.html,
        attachments,
        ..Default::default()
    };
    let message = draft.build()?;

    let sent = with_spinner("Sending...", ctx.provider.send(&message)).await?;
    info!("Sent message {}", sent.id);
    writeln!(out, "Sent! Subject: {}", draft.subject)?;
    Ok(())
}

/// Addresses that belong to the user: the session account plus send-as aliases
async fn own_addresses(ctx: &Context<'_>) -> Result<Vec<String>> {
    let mut own = vec![ctx.session.account.clone()];
    for identity in ctx.provider.identities().await? {
        if !own.iter().any(|o| o.eq_ignore_ascii_case(&identity.email)) {
            own.push(identity.email);
        }
    }
    Ok(own)
}

pub async fn cmd_reply(
    ctx: &Context<'_>,
    out: &mut dyn Write,
    input: &mut dyn Read,
    reference: &MessageRef,
    body: Option<String>,
    reply_all: bool,
) -> Result<()> {
    let id = resolve_ref(ctx.provider, reference).await?;
    let original = with_spinner("Reading original...", ctx.provider.get_message(&id)).await?;

    let prompt = format!(
        "Replying to: {}\nFrom: {}\nEnter reply (Ctrl+D to finish):",
        original.summary.subject, original.summary.from.email
    );
    let body = read_body(body, ctx, input, &prompt)?;

    let own = if reply_all {
        own_addresses(ctx).await?
    } else {
        vec![ctx.session.account.clone()]
    };

    let draft = reply_draft(&original, &ctx.session.account, body, reply_all, &own);
    let message = draft.build()?;
    with_spinner("Sending reply...", ctx.provider.send(&message)).await?;

    writeln!(out, "Reply sent! To: {}", draft.to.join(", "))?;
    Ok(())
}

pub async fn cmd_forward(
    ctx: &Context<'_>,
    out: &mut dyn Write,
    input: &mut dyn Read,
    reference: &MessageRef,
    to: Vec<String>,
    note: Option<String>,
) -> Result<()> {
    if !has_recipient(&to) {
        return Err(MailError::RecipientRequired);
    }

    let id = resolve_ref(ctx.provider, reference).await?;
    let original = with_spinner("Reading original...", ctx.provider.get_message(&id)).await?;

    // Without -b, only ask for a note when someone is at the keyboard
    let note = match note {
        Some(note) => Some(note),
        None if ctx.interactive => Some(read_body(
            None,
            ctx,
            input,
            "Add a note (Ctrl+D to finish, or just Ctrl+D for none):",
        )?),
        None => None,
    };

    let mut attachments = Vec::with_capacity(original.attachments.len());
    for attachment in &original.attachments {
        let data = ctx.provider.download_attachment(&id, attachment).await?;
        attachments.push(AttachmentFile {
            filename: attachment.filename.clone(),
            content_type: attachment.mime_type.clone(),
            data,
        });
    }

    let draft = Draft {
        from: ctx.session.account.clone(),
        to,
        subject: forward_subject(&original.summary.subject),
        body: forward_body(note.as_deref(), &original),
        attachments,
        ..Default::default()
    };
    let message = draft.build()?;
    with_spinner("Forwarding...", ctx.provider.send(&message)).await?;

    writeln!(out, "Forwarded! To: {}", draft.to.join(", "))?;
    Ok(())
}

pub async fn cmd_mutate(
    ctx: &Context<'_>,
    out: &mut dyn Write,
    messages: &[String],
    mutation: Mutation,
) -> Result<()> {
    let ids = resolve_refs(ctx.provider, &refs_from(messages)).await?;
    let count = with_spinner(mutation.in_progress(), ctx.provider.mutate(&ids, mutation)).await?;
    writeln!(out, "{}", mutation.summary(count))?;
    Ok(())
}

/// Keep only the final path component so a hostile filename can't escape `dir`
fn safe_filename(name: &str) -> Option<&str> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
}

pub async fn cmd_download(
    ctx: &Context<'_>,
    out: &mut dyn Write,
    reference: &MessageRef,
    output: &Path,
) -> Result<()> {
    let id = resolve_ref(ctx.provider, reference).await?;
    let message = with_spinner("Reading message...", ctx.provider.get_message(&id)).await?;

    if message.attachments.is_empty() {
        writeln!(out, "No attachments.")?;
        return Ok(());
    }

    tokio::fs::create_dir_all(output).await?;

    for attachment in &message.attachments {
        let Some(filename) = safe_filename(&attachment.filename) else {
            writeln!(out, "Skipped: {} (unsafe file name)", attachment.filename)?;
            continue;
        };

        let data = with_spinner(
            &format!("Downloading {}...", filename),
            ctx.provider.download_attachment(&id, attachment),
        )
        .await?;

        let path = output.join(filename);
        tokio::fs::write(&path, &data).await?;
        writeln!(
            out,
            "Saved: {} ({})",
            path.display(),
            format::format_size(data.len() as u64)
        )?;
    }
    Ok(())
}

pub async fn cmd_watch<F>(
    ctx: &Context<'_>,
    out: &mut dyn Write,
    options: &WatchOptions,
    shutdown: F,
) -> Result<WatchReport>
where
    F: Future<Output = ()>,
{
    run_watch(ctx.provider, options, out, shutdown).await
}

/// Record a successful authorization: look up the account and save the session
pub async fn complete_login(
    provider: &dyn MailProvider,
    store: &SessionStore,
    out: &mut dyn Write,
) -> Result<Session> {
    let account = provider.account().await?;
    let session = Session::new(account.email, REQUIRED_SCOPES);
    store.save(&session).await?;

    writeln!(out, "Logged in as {}", session.account)?;
    writeln!(out, "Session saved to {}", store.session_path().display())?;
    Ok(session)
}

/// Run the consent flow (prompting if needed) and save the session
pub async fn login(
    paths: &AppPaths,
    config: &Config,
    store: &SessionStore,
    no_browser: bool,
    force: bool,
    out: &mut dyn Write,
) -> Result<Session> {
    if force && store.delete().await? {
        info!("Removed existing session and token cache");
    }

    let secret = auth::load_application_secret(&config.credentials_path(paths)).await?;
    let open_browser = config.auth.open_browser && !no_browser;
    let hub = auth::connect(secret, store, ChallengeMode::Prompt, open_browser).await?;
    let provider = GmailProvider::new(hub, config.list.fetch_concurrency);

    complete_login(&provider, store, out).await
}

pub async fn logout(store: &SessionStore, out: &mut dyn Write) -> Result<()> {
    if store.delete().await? {
        writeln!(out, "Session removed.")?;
    } else {
        writeln!(out, "No active session.")?;
    }
    Ok(())
}

pub async fn init_config(paths: &AppPaths, force: bool, out: &mut dyn Write) -> Result<()> {
    let path = paths.config_file();
    if path.exists() && !force {
        return Err(MailError::ConfigError(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    Config::create_example(&path).await?;
    writeln!(out, "Wrote example config to {}", path.display())?;
    Ok(())
}

/// Load the session and open an authorized provider without prompting.
///
/// Fails with `NotLoggedIn` before touching the network when there is no
/// session, and with `AuthChallengeRequired` if the token can no longer be
/// refreshed silently.
pub async fn open_provider(
    paths: &AppPaths,
    config: &Config,
    store: &SessionStore,
) -> Result<(Session, GmailProvider)> {
    let mut session = store.require().await?;

    let secret = auth::load_application_secret(&config.credentials_path(paths)).await?;
    let hub = auth::connect(secret, store, ChallengeMode::Refuse, config.auth.open_browser).await?;
    store.touch(&mut session).await?;

    Ok((session, GmailProvider::new(hub, config.list.fetch_concurrency)))
}
