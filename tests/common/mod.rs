//! Common test utilities and fixtures

#![allow(dead_code)]

use chrono::{Duration, Utc};
use gmail_cli::error::Result;
use gmail_cli::models::{
    Account, Address, AttachmentInfo, Checkpoint, FolderCount, FolderSelector, Identity,
    LabelInfo, MessageBody, MessageDetail, MessageSummary, Mutation, OutgoingMessage, PollDelta,
    SentMessage,
};
use gmail_cli::session::Session;
use gmail_cli::{Config, MailProvider};
use mockall::mock;
use serde_json::json;

/// Create a test message `age_minutes` old
pub fn create_test_summary(id: &str, sender: &str, subject: &str, age_minutes: i64) -> MessageSummary {
    MessageSummary {
        id: id.to_string(),
        thread_id: format!("thread_{}", id),
        from: Address::parse(sender),
        subject: subject.to_string(),
        date: Utc::now() - Duration::minutes(age_minutes),
        unread: true,
        size: 1234,
        labels: vec!["INBOX".to_string(), "UNREAD".to_string()],
    }
}

/// A listing of `count` messages, newest first, ids `msg0..msgN`
pub fn create_inbox(count: usize) -> Vec<MessageSummary> {
    (0..count)
        .map(|i| {
            create_test_summary(
                &format!("msg{}", i),
                &format!("Sender {} <sender{}@example.com>", i, i),
                &format!("Subject {}", i),
                i as i64 * 10,
            )
        })
        .collect()
}

pub fn create_test_detail(summary: MessageSummary, body: &str) -> MessageDetail {
    MessageDetail {
        summary,
        to: vec![Address::new("me@example.com")],
        cc: vec![],
        body: MessageBody::plain(body),
        attachments: vec![],
        message_id_header: Some("<original@mail.example.com>".to_string()),
        references: None,
    }
}

pub fn create_attachment(id: &str, filename: &str, size: u64) -> AttachmentInfo {
    AttachmentInfo {
        attachment_id: id.to_string(),
        filename: filename.to_string(),
        mime_type: "application/octet-stream".to_string(),
        size,
    }
}

pub fn test_account(email: &str) -> Account {
    Account {
        email: email.to_string(),
        messages_total: 120,
        threads_total: 80,
    }
}

pub fn test_session(email: &str) -> Session {
    Session::new(email, &["https://www.googleapis.com/auth/gmail.modify"])
}

pub fn test_config() -> Config {
    Config::default()
}

/// Gmail API message resource (JSON) in `metadata` format
pub fn mock_gmail_message_response(
    id: &str,
    thread_id: &str,
    from: &str,
    subject: &str,
    internal_date_ms: i64,
) -> serde_json::Value {
    json!({
        "id": id,
        "threadId": thread_id,
        "labelIds": ["INBOX", "UNREAD"],
        "snippet": "Email snippet...",
        "payload": {
            "mimeType": "multipart/alternative",
            "headers": [
                {"name": "From", "value": from},
                {"name": "Subject", "value": subject},
                {"name": "Date", "value": "Mon, 1 Jan 2024 10:00:00 -0800"},
                {"name": "To", "value": "me@example.com"}
            ]
        },
        "internalDate": internal_date_ms.to_string(),
        "sizeEstimate": 1234
    })
}

/// Gmail API messages.list response (JSON)
pub fn mock_gmail_list_response(
    message_ids: Vec<&str>,
    next_page_token: Option<&str>,
) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = message_ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "threadId": format!("thread_{}", id)
            })
        })
        .collect();

    let mut response = json!({
        "messages": messages,
        "resultSizeEstimate": messages.len()
    });

    if let Some(token) = next_page_token {
        response["nextPageToken"] = json!(token);
    }

    response
}

// Mock implementation of MailProvider for testing
mock! {
    pub Provider {}

    #[async_trait::async_trait]
    impl MailProvider for Provider {
        async fn account(&self) -> Result<Account>;
        async fn identities(&self) -> Result<Vec<Identity>>;
        async fn list_messages(
            &self,
            folder: &FolderSelector,
            limit: usize,
            page: usize,
        ) -> Result<Vec<MessageSummary>>;
        async fn get_message(&self, id: &str) -> Result<MessageDetail>;
        async fn get_thread(&self, thread_id: &str) -> Result<Vec<MessageDetail>>;
        async fn send(&self, message: &OutgoingMessage) -> Result<SentMessage>;
        async fn mutate(&self, ids: &[String], mutation: Mutation) -> Result<usize>;
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn folder_counts(&self) -> Result<Vec<FolderCount>>;
        async fn download_attachment(
            &self,
            message_id: &str,
            attachment: &AttachmentInfo,
        ) -> Result<Vec<u8>>;
        async fn checkpoint(&self) -> Result<Checkpoint>;
        async fn poll_changes(&self, since: Checkpoint) -> Result<PollDelta>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_inbox_is_newest_first() {
        let inbox = create_inbox(3);
        assert_eq!(inbox.len(), 3);
        assert!(inbox[0].date > inbox[1].date);
        assert_eq!(inbox[2].id, "msg2");
        assert_eq!(inbox[1].from.email, "sender1@example.com");
    }

    #[test]
    fn test_mock_list_response_page_token() {
        let response = mock_gmail_list_response(vec!["a", "b"], Some("next"));
        assert_eq!(response["messages"].as_array().unwrap().len(), 2);
        assert_eq!(response["nextPageToken"], "next");
    }
}
