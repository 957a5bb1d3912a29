use anyhow::{Context as _, Result};
use clap::Parser;
use gmail_cli::cli::{self, Cli, Commands, Context};
use gmail_cli::config::{AppPaths, Config};
use gmail_cli::error::MailError;
use gmail_cli::session::SessionStore;
use std::io::{IsTerminal, Write};
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Exit with proper code on error
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        let mail_error = e.downcast_ref::<MailError>();
        let hint = match mail_error.and_then(MailError::hint) {
            Some(hint) => hint,
            None if mail_error.map_or(false, MailError::is_usage_error) => {
                "For usage, run: gmail help <command>"
            }
            None => "For help, run: gmail --help",
        };
        eprintln!("\n{}", hint);
        process::exit(1);
    }
}

/// Logs go to stderr so command output on stdout stays pipeable
fn init_tracing(verbose: bool, format: &str) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gmail_cli=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gmail_cli=warn,error"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // On non-Windows platforms, use aws-lc-rs; on Windows, use ring
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let paths = AppPaths::resolve(cli.config_dir.as_deref())?;
    let config = Config::load(&paths.config_file()).await?;
    init_tracing(cli.verbose, &config.logging.format);
    tracing::debug!("Using config directory {:?}", paths.config_dir);

    // Bad arguments fail before the session or the network is touched
    cli.command.validate()?;

    let store = SessionStore::from_paths(&paths);
    let mut stdout = std::io::stdout();

    match cli.command {
        Commands::Login { no_browser, force } => {
            cli::login(&paths, &config, &store, no_browser, force, &mut stdout).await?;
        }
        Commands::Logout => cli::logout(&store, &mut stdout).await?,
        Commands::InitConfig { force } => cli::init_config(&paths, force, &mut stdout).await?,
        command => {
            let (session, provider) = cli::open_provider(&paths, &config, &store).await?;
            let ctx = Context {
                provider: &provider,
                config: &config,
                session: &session,
                interactive: std::io::stdin().is_terminal(),
            };

            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("Could not listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
            };

            cli::dispatch(command, &ctx, &mut stdout, &mut std::io::stdin(), shutdown).await?;
        }
    }

    stdout.flush().context("Failed to flush output")?;
    Ok(())
}
