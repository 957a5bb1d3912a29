//! Gmail API adapter
//!
//! [`MailProvider`] is the seam between the command dispatcher and the Gmail
//! client library. Each method is a thin pass-through to one (or, for
//! listings, one list plus per-message metadata) library call. Errors are
//! converted into [`MailError`] and returned as-is; nothing is retried.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use google_gmail1::api::{BatchModifyMessagesRequest, Message, MessagePart};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::{GmailHub, GMAIL_SCOPE};
use crate::error::{MailError, Result};
use crate::models::{
    labels, Account, Address, AttachmentInfo, Checkpoint, Folder, FolderCount, FolderSelector,
    Identity, LabelInfo, LabelKind, MessageBody, MessageDetail, MessageSummary, Mutation,
    OutgoingMessage, PollDelta, SentMessage,
};

const USER: &str = "me";

/// Gmail's maximum page size for messages.list
const MAX_PAGE_SIZE: usize = 500;

/// Upper bound on any single API round-trip
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Headers requested for listing rows
const SUMMARY_HEADERS: &[&str] = &["From", "Subject", "Date"];

/// Operations the CLI needs from the mail provider
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Profile of the authenticated account
    async fn account(&self) -> Result<Account>;

    /// Addresses the account may send as
    async fn identities(&self) -> Result<Vec<Identity>>;

    /// Up to `limit` messages of a folder, newest first, skipping `page * limit`.
    ///
    /// Order must be stable across calls: the first `n` rows of a listing of
    /// `m >= n` are the same as a listing of `n`.
    async fn list_messages(
        &self,
        folder: &FolderSelector,
        limit: usize,
        page: usize,
    ) -> Result<Vec<MessageSummary>>;

    /// Full message including body and attachment metadata
    async fn get_message(&self, id: &str) -> Result<MessageDetail>;

    /// Every message of a conversation, oldest first
    async fn get_thread(&self, thread_id: &str) -> Result<Vec<MessageDetail>>;

    async fn send(&self, message: &OutgoingMessage) -> Result<SentMessage>;

    /// Apply a flag/folder change; returns the number of messages touched
    async fn mutate(&self, ids: &[String], mutation: Mutation) -> Result<usize>;

    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Total/unread per system folder
    async fn folder_counts(&self) -> Result<Vec<FolderCount>>;

    async fn download_attachment(
        &self,
        message_id: &str,
        attachment: &AttachmentInfo,
    ) -> Result<Vec<u8>>;

    /// Current position in the change feed
    async fn checkpoint(&self) -> Result<Checkpoint>;

    /// Inbox messages added since `since`
    async fn poll_changes(&self, since: Checkpoint) -> Result<PollDelta>;
}

/// Production adapter over the `google-gmail1` hub
pub struct GmailProvider {
    hub: GmailHub,
    fetch_concurrency: usize,
}

impl GmailProvider {
    /// # Arguments
    /// * `hub` - Authenticated Gmail API hub
    /// * `fetch_concurrency` - Parallel metadata fetches when building a listing
    pub fn new(hub: GmailHub, fetch_concurrency: usize) -> Self {
        Self {
            hub,
            fetch_concurrency: fetch_concurrency.max(1),
        }
    }

    /// Run one API call with a timeout so a stalled connection cannot hang the CLI
    async fn timed<T, F>(operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, google_gmail1::Error>>,
    {
        debug!("Calling Gmail API: {}", operation);
        match tokio::time::timeout(API_TIMEOUT, call).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!("Gmail API {} timed out after {:?}", operation, API_TIMEOUT);
                Err(MailError::NetworkError(format!(
                    "API call timed out after {:?}",
                    API_TIMEOUT
                )))
            }
        }
    }

    /// Collect up to `wanted` message ids for a folder, following page tokens
    async fn list_message_ids(&self, folder: &FolderSelector, wanted: usize) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(wanted);
        let mut page_token: Option<String> = None;

        while ids.len() < wanted {
            let page_size = (wanted - ids.len()).min(MAX_PAGE_SIZE);
            let mut call = self
                .hub
                .users()
                .messages_list(USER)
                .max_results(page_size as u32)
                .include_spam_trash(folder.include_spam_trash);

            for label_id in &folder.label_ids {
                call = call.add_label_ids(label_id);
            }
            if let Some(query) = folder.query.as_deref() {
                call = call.q(query);
            }
            if let Some(token) = page_token.as_deref() {
                call = call.page_token(token);
            }

            let (_, response) =
                Self::timed("messages.list", call.add_scope(GMAIL_SCOPE).doit()).await?;

            ids.extend(
                response
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id),
            );

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        ids.truncate(wanted);
        Ok(ids)
    }

    async fn fetch_summary(&self, id: &str) -> Result<MessageSummary> {
        let mut call = self.hub.users().messages_get(USER, id).format("metadata");
        for header in SUMMARY_HEADERS {
            call = call.add_metadata_headers(header);
        }
        let (_, message) = Self::timed("messages.get", call.add_scope(GMAIL_SCOPE).doit()).await?;
        summary_from_message(&message)
    }

    /// Fetch summaries concurrently while keeping the input order
    async fn fetch_summaries(&self, ids: Vec<String>) -> Result<Vec<MessageSummary>> {
        stream::iter(ids)
            .map(|id| async move { self.fetch_summary(&id).await })
            .buffered(self.fetch_concurrency)
            .try_collect()
            .await
    }
}

#[async_trait]
impl MailProvider for GmailProvider {
    async fn account(&self) -> Result<Account> {
        let (_, profile) = Self::timed(
            "users.getProfile",
            self.hub.users().get_profile(USER).add_scope(GMAIL_SCOPE).doit(),
        )
        .await?;

        Ok(Account {
            email: profile.email_address.ok_or_else(|| {
                MailError::InvalidMessageFormat("Profile has no email address".to_string())
            })?,
            messages_total: profile.messages_total.unwrap_or(0).max(0) as u64,
            threads_total: profile.threads_total.unwrap_or(0).max(0) as u64,
        })
    }

    async fn identities(&self) -> Result<Vec<Identity>> {
        let (_, response) = Self::timed(
            "settings.sendAs.list",
            self.hub
                .users()
                .settings_send_as_list(USER)
                .add_scope(GMAIL_SCOPE)
                .doit(),
        )
        .await?;

        let mut identities: Vec<Identity> = response
            .send_as
            .unwrap_or_default()
            .into_iter()
            .filter_map(|send_as| {
                Some(Identity {
                    email: send_as.send_as_email?,
                    display_name: send_as.display_name.filter(|n| !n.is_empty()),
                    primary: send_as.is_primary.unwrap_or(false),
                })
            })
            .collect();

        // Primary address first
        identities.sort_by_key(|i| !i.primary);
        Ok(identities)
    }

    async fn list_messages(
        &self,
        folder: &FolderSelector,
        limit: usize,
        page: usize,
    ) -> Result<Vec<MessageSummary>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let skip = limit
            .checked_mul(page)
            .filter(|s| s.checked_add(limit).is_some())
            .ok_or_else(|| MailError::BadRequest(format!("page {} is out of range", page)))?;

        let ids = self.list_message_ids(folder, skip + limit).await?;
        let page_ids: Vec<String> = ids.into_iter().skip(skip).take(limit).collect();
        debug!("Fetching metadata for {} messages", page_ids.len());

        // Keep messages.list order (newest first) so a shorter listing is
        // always a prefix of a longer one; index references depend on it.
        self.fetch_summaries(page_ids).await
    }

    async fn get_message(&self, id: &str) -> Result<MessageDetail> {
        let (_, message) = Self::timed(
            "messages.get",
            self.hub
                .users()
                .messages_get(USER, id)
                .format("full")
                .add_scope(GMAIL_SCOPE)
                .doit(),
        )
        .await?;

        detail_from_message(&message)
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Vec<MessageDetail>> {
        let (_, thread) = Self::timed(
            "threads.get",
            self.hub
                .users()
                .threads_get(USER, thread_id)
                .format("full")
                .add_scope(GMAIL_SCOPE)
                .doit(),
        )
        .await?;

        let mut messages = thread
            .messages
            .unwrap_or_default()
            .iter()
            .map(detail_from_message)
            .collect::<Result<Vec<_>>>()?;

        messages.sort_by_key(|m| m.summary.date);
        Ok(messages)
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<SentMessage> {
        let envelope = Message {
            thread_id: message.thread_id.clone(),
            ..Default::default()
        };
        let mime_type: mime_guess::mime::Mime = "message/rfc822"
            .parse()
            .map_err(|e| MailError::ComposeError(format!("Invalid MIME type: {}", e)))?;

        let (_, sent) = Self::timed(
            "messages.send",
            self.hub
                .users()
                .messages_send(envelope, USER)
                .add_scope(GMAIL_SCOPE)
                .upload(std::io::Cursor::new(message.raw.clone()), mime_type),
        )
        .await?;

        Ok(SentMessage {
            id: sent.id.ok_or_else(|| {
                MailError::InvalidMessageFormat("Sent message has no ID".to_string())
            })?,
            thread_id: sent.thread_id,
        })
    }

    async fn mutate(&self, ids: &[String], mutation: Mutation) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        // Trash has a dedicated endpoint; everything else is a label change
        if mutation == Mutation::Trash {
            for id in ids {
                Self::timed(
                    "messages.trash",
                    self.hub
                        .users()
                        .messages_trash(USER, id)
                        .add_scope(GMAIL_SCOPE)
                        .doit(),
                )
                .await?;
            }
            return Ok(ids.len());
        }

        let (add, remove) = mutation.label_changes();
        // Gmail API allows up to 1000 messages per batch request
        const BATCH_SIZE: usize = 1000;
        let mut total_modified = 0;

        for chunk in ids.chunks(BATCH_SIZE) {
            let request = BatchModifyMessagesRequest {
                ids: Some(chunk.to_vec()),
                add_label_ids: if add.is_empty() { None } else { Some(add.clone()) },
                remove_label_ids: if remove.is_empty() {
                    None
                } else {
                    Some(remove.clone())
                },
            };

            Self::timed(
                "messages.batchModify",
                self.hub
                    .users()
                    .messages_batch_modify(request, USER)
                    .add_scope(GMAIL_SCOPE)
                    .doit(),
            )
            .await?;

            total_modified += chunk.len();
        }

        Ok(total_modified)
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        let (_, response) = Self::timed(
            "labels.list",
            self.hub.users().labels_list(USER).add_scope(GMAIL_SCOPE).doit(),
        )
        .await?;

        let mut labels: Vec<LabelInfo> = response
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| match (label.id, label.name) {
                (Some(id), Some(name)) => Some(LabelInfo {
                    id,
                    name,
                    kind: match label.type_.as_deref() {
                        Some("system") => LabelKind::System,
                        _ => LabelKind::User,
                    },
                }),
                _ => None,
            })
            .collect();

        labels.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        debug!("Successfully parsed {} labels", labels.len());
        Ok(labels)
    }

    async fn folder_counts(&self) -> Result<Vec<FolderCount>> {
        let mut counts = Vec::new();

        for folder in Folder::ALL {
            let Some(label_id) = folder.label_id() else {
                continue;
            };

            let (_, label) = Self::timed(
                "labels.get",
                self.hub
                    .users()
                    .labels_get(USER, label_id)
                    .add_scope(GMAIL_SCOPE)
                    .doit(),
            )
            .await?;

            counts.push(FolderCount {
                name: folder.display_name().to_string(),
                total: label.messages_total.unwrap_or(0).max(0) as u64,
                unread: label.messages_unread.unwrap_or(0).max(0) as u64,
            });
        }

        Ok(counts)
    }

    async fn download_attachment(
        &self,
        message_id: &str,
        attachment: &AttachmentInfo,
    ) -> Result<Vec<u8>> {
        let (_, body) = Self::timed(
            "messages.attachments.get",
            self.hub
                .users()
                .messages_attachments_get(USER, message_id, &attachment.attachment_id)
                .add_scope(GMAIL_SCOPE)
                .doit(),
        )
        .await?;

        body.data.ok_or_else(|| {
            MailError::InvalidMessageFormat(format!(
                "Attachment {} has no data",
                attachment.filename
            ))
        })
    }

    async fn checkpoint(&self) -> Result<Checkpoint> {
        let (_, profile) = Self::timed(
            "users.getProfile",
            self.hub.users().get_profile(USER).add_scope(GMAIL_SCOPE).doit(),
        )
        .await?;

        profile
            .history_id
            .map(Checkpoint)
            .ok_or_else(|| MailError::InvalidMessageFormat("Profile has no history ID".to_string()))
    }

    async fn poll_changes(&self, since: Checkpoint) -> Result<PollDelta> {
        let mut latest = since;
        let mut seen = HashSet::new();
        let mut new_ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut call = self
                .hub
                .users()
                .history_list(USER)
                .start_history_id(since.0)
                .add_history_types("messageAdded")
                .label_id(labels::INBOX);
            if let Some(token) = page_token.as_deref() {
                call = call.page_token(token);
            }

            let (_, response) =
                Self::timed("history.list", call.add_scope(GMAIL_SCOPE).doit()).await?;

            if let Some(history_id) = response.history_id {
                latest = latest.max(Checkpoint(history_id));
            }

            for record in response.history.unwrap_or_default() {
                for added in record.messages_added.unwrap_or_default() {
                    let Some(message) = added.message else {
                        continue;
                    };
                    let in_inbox = message
                        .label_ids
                        .as_ref()
                        .map_or(true, |l| l.iter().any(|id| id == labels::INBOX));
                    if let Some(id) = message.id {
                        if in_inbox && seen.insert(id.clone()) {
                            new_ids.push(id);
                        }
                    }
                }
            }

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        let mut new_messages = self.fetch_summaries(new_ids).await?;
        sort_newest_first(&mut new_messages);

        Ok(PollDelta {
            new_messages,
            checkpoint: latest,
        })
    }
}

/// Stable sort by date, newest first
pub fn sort_newest_first(messages: &mut [MessageSummary]) {
    messages.sort_by(|a, b| b.date.cmp(&a.date));
}

/// Look up a header value (case-insensitive) on the top-level part
fn header<'a>(part: Option<&'a MessagePart>, name: &str) -> Option<&'a str> {
    part?
        .headers
        .as_ref()?
        .iter()
        .find(|h| h.name.as_deref().map_or(false, |n| n.eq_ignore_ascii_case(name)))
        .and_then(|h| h.value.as_deref())
}

/// Parse RFC 2822 date string
fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(date_str)
        .or_else(|_| DateTime::parse_from_rfc3339(date_str))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Build a listing row from a Gmail message (metadata or full format)
pub fn summary_from_message(message: &Message) -> Result<MessageSummary> {
    let id = message
        .id
        .clone()
        .ok_or_else(|| MailError::InvalidMessageFormat("Missing message ID".to_string()))?;
    let thread_id = message.thread_id.clone().unwrap_or_else(|| id.clone());
    let payload = message.payload.as_ref();
    let labels = message.label_ids.clone().unwrap_or_default();

    // internalDate is when Gmail received the message; prefer it over the header
    let date = message
        .internal_date
        .and_then(DateTime::from_timestamp_millis)
        .or_else(|| header(payload, "Date").and_then(parse_date))
        .unwrap_or_else(Utc::now);

    Ok(MessageSummary {
        from: header(payload, "From").map(Address::parse).unwrap_or_default(),
        subject: header(payload, "Subject").unwrap_or_default().to_string(),
        unread: labels.iter().any(|l| l == labels::UNREAD),
        size: message.size_estimate.unwrap_or(0).max(0) as u64,
        id,
        thread_id,
        date,
        labels,
    })
}

/// Walk the MIME tree collecting text bodies and attachments
fn collect_parts(part: &MessagePart, body: &mut MessageBody, attachments: &mut Vec<AttachmentInfo>) {
    let mime_type = part.mime_type.as_deref().unwrap_or("").to_lowercase();
    let filename = part.filename.as_deref().unwrap_or("");
    let part_body = part.body.as_ref();

    if !filename.is_empty() {
        if let Some(attachment_id) = part_body.and_then(|b| b.attachment_id.clone()) {
            attachments.push(AttachmentInfo {
                attachment_id,
                filename: filename.to_string(),
                mime_type: mime_type.clone(),
                size: part_body.and_then(|b| b.size).unwrap_or(0).max(0) as u64,
            });
            return;
        }
    }

    let text = part_body
        .and_then(|b| b.data.as_ref())
        .map(|data| String::from_utf8_lossy(data).into_owned());

    match (mime_type.as_str(), text) {
        ("text/plain", Some(text)) if body.plain.is_none() => body.plain = Some(text),
        ("text/html", Some(text)) if body.html.is_none() => body.html = Some(text),
        _ => {}
    }

    for child in part.parts.iter().flatten() {
        collect_parts(child, body, attachments);
    }
}

/// Build a full message view from a `format=full` Gmail message
pub fn detail_from_message(message: &Message) -> Result<MessageDetail> {
    let summary = summary_from_message(message)?;
    let payload = message.payload.as_ref();

    let mut body = MessageBody::default();
    let mut attachments = Vec::new();
    if let Some(part) = payload {
        collect_parts(part, &mut body, &mut attachments);
    }

    Ok(MessageDetail {
        to: header(payload, "To").map(Address::parse_list).unwrap_or_default(),
        cc: header(payload, "Cc").map(Address::parse_list).unwrap_or_default(),
        message_id_header: header(payload, "Message-ID").map(str::to_string),
        references: header(payload, "References").map(str::to_string),
        summary,
        body,
        attachments,
    })
}
