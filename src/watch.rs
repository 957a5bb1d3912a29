//! `watch`: poll the inbox for new mail
//!
//! The loop takes a baseline checkpoint, then repeatedly sleeps for the
//! interval and asks the provider what arrived since the last checkpoint.
//! The next sleep starts only after the previous poll has completed, so a
//! slow round-trip delays the schedule instead of overlapping polls.
//!
//! ```text
//! baseline ─► [sleep interval] ─► poll ─► print ─┐
//!                  ▲                             │
//!                  └──── elapsed + interval ≤ timeout
//! ```
//!
//! The loop stops when the next sleep would run past the timeout, or as soon
//! as the shutdown future resolves (Ctrl-C in the binary).

use std::future::Future;
use std::io::Write;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::MailProvider;
use crate::error::{MailError, Result};
use crate::models::{Checkpoint, MessageSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub interval: Duration,
    /// `None` watches until interrupted
    pub timeout: Option<Duration>,
}

impl WatchOptions {
    /// A timeout of 0 seconds means "no timeout"
    pub fn from_secs(interval_secs: u64, timeout_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs.max(1)),
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchReport {
    pub polls: usize,
    pub new_messages: usize,
    pub interrupted: bool,
}

fn print_new(out: &mut dyn Write, message: &MessageSummary) -> Result<()> {
    let subject = if message.subject.trim().is_empty() {
        "(no subject)"
    } else {
        &message.subject
    };
    writeln!(out, "New: {} - {}", message.from.short(), subject)?;
    Ok(())
}

fn stopped(out: &mut dyn Write, mut report: WatchReport) -> Result<WatchReport> {
    writeln!(out, "\nStopped watching.")?;
    out.flush()?;
    report.interrupted = true;
    Ok(report)
}

/// Poll for new inbox messages until the timeout elapses or `shutdown` resolves
pub async fn run_watch<F>(
    provider: &dyn MailProvider,
    options: &WatchOptions,
    out: &mut dyn Write,
    shutdown: F,
) -> Result<WatchReport>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let started = Instant::now();
    let mut report = WatchReport::default();

    writeln!(
        out,
        "Watching for new messages (poll every {}s)... Press Ctrl+C to stop.",
        options.interval.as_secs()
    )?;
    out.flush()?;

    let mut checkpoint: Checkpoint = tokio::select! {
        biased;
        _ = &mut shutdown => return stopped(out, report),
        checkpoint = provider.checkpoint() => checkpoint?,
    };
    debug!("Watch baseline checkpoint: {:?}", checkpoint);

    loop {
        if let Some(timeout) = options.timeout {
            if started.elapsed() + options.interval > timeout {
                info!(
                    "Watch finished after {} polls ({} new messages)",
                    report.polls, report.new_messages
                );
                return Ok(report);
            }
        }

        tokio::select! {
            biased;
            _ = &mut shutdown => return stopped(out, report),
            _ = tokio::time::sleep(options.interval) => {}
        }

        let result = tokio::select! {
            biased;
            _ = &mut shutdown => return stopped(out, report),
            result = provider.poll_changes(checkpoint) => result,
        };
        report.polls += 1;

        match result {
            Ok(delta) => {
                debug!(
                    "Poll {}: {} new messages, checkpoint {:?}",
                    report.polls,
                    delta.new_messages.len(),
                    delta.checkpoint
                );
                for message in &delta.new_messages {
                    print_new(out, message)?;
                }
                out.flush()?;
                report.new_messages += delta.new_messages.len();
                checkpoint = delta.checkpoint;
            }
            Err(MailError::MessageNotFound(_)) => {
                // History ids expire; start over from the current position
                warn!("Checkpoint {:?} expired, re-baselining", checkpoint);
                checkpoint = provider.checkpoint().await?;
            }
            Err(e) => return Err(e),
        }
    }
}
