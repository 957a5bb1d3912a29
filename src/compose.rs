//! Building outgoing messages
//!
//! The Gmail send endpoint takes a complete RFC 5322 message, so sending,
//! replying and forwarding all end in [`Draft::build`], which assembles one
//! with `lettre`'s message builder.

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use std::path::Path;

use crate::error::{MailError, Result};
use crate::format::{display_body, format_timestamp};
use crate::models::{MessageDetail, OutgoingMessage};

/// A file to attach, already read into memory
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentFile {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl AttachmentFile {
    /// Read a file from disk and guess its content type from the extension
    pub async fn load(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            MailError::ComposeError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();

        Ok(Self {
            filename,
            content_type: mime_guess::from_path(path)
                .first_or_octet_stream()
                .to_string(),
            data,
        })
    }
}

/// Everything needed to send one message
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub html: bool,
    pub attachments: Vec<AttachmentFile>,
    /// `Message-ID` of the message being answered
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    /// Provider conversation the message belongs to
    pub thread_id: Option<String>,
}

fn parse_mailbox(kind: &str, address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| MailError::ComposeError(format!("invalid {} '{}': {}", kind, address, e)))
}

impl Draft {
    /// Fails with `RecipientRequired` when there is nobody to send to
    pub fn validate(&self) -> Result<()> {
        if self.to.iter().all(|t| t.trim().is_empty()) {
            return Err(MailError::RecipientRequired);
        }
        Ok(())
    }

    /// Assemble the RFC 5322 message
    pub fn build(&self) -> Result<OutgoingMessage> {
        self.validate()?;

        let mut builder = lettre::Message::builder()
            .from(parse_mailbox("from", &self.from)?)
            .subject(self.subject.clone());

        for addr in self.to.iter().filter(|a| !a.trim().is_empty()) {
            builder = builder.to(parse_mailbox("to", addr)?);
        }
        for addr in &self.cc {
            builder = builder.cc(parse_mailbox("cc", addr)?);
        }
        for addr in &self.bcc {
            builder = builder.bcc(parse_mailbox("bcc", addr)?);
        }
        if !self.bcc.is_empty() {
            // Gmail reads Bcc from the raw message and strips it before delivery
            builder = builder.keep_bcc();
        }

        if let Some(message_id) = &self.in_reply_to {
            builder = builder.in_reply_to(message_id.clone());
        }
        if let Some(references) = &self.references {
            builder = builder.references(references.clone());
        }

        let text_part = if self.html {
            SinglePart::html(self.body.clone())
        } else {
            SinglePart::plain(self.body.clone())
        };

        let built = if self.attachments.is_empty() {
            builder.singlepart(text_part)
        } else {
            let mut multi = MultiPart::mixed().singlepart(text_part);
            for file in &self.attachments {
                let content_type = ContentType::parse(&file.content_type).map_err(|e| {
                    MailError::ComposeError(format!(
                        "invalid content type '{}': {}",
                        file.content_type, e
                    ))
                })?;
                multi = multi.singlepart(
                    Attachment::new(file.filename.clone()).body(file.data.clone(), content_type),
                );
            }
            builder.multipart(multi)
        };
        let message =
            built.map_err(|e| MailError::ComposeError(format!("email build: {}", e)))?;

        Ok(OutgoingMessage {
            raw: message.formatted(),
            thread_id: self.thread_id.clone(),
        })
    }
}

fn has_prefix(subject: &str, prefix: &str) -> bool {
    subject
        .get(..prefix.len())
        .map_or(false, |head| head.eq_ignore_ascii_case(prefix))
}

/// `Re: <subject>` unless the subject already is a reply
pub fn reply_subject(subject: &str) -> String {
    if has_prefix(subject, "Re:") {
        subject.to_string()
    } else {
        format!("Re: {}", subject)
    }
}

/// `Fwd: <subject>` unless the subject already is a forward
pub fn forward_subject(subject: &str) -> String {
    if has_prefix(subject, "Fwd:") {
        subject.to_string()
    } else {
        format!("Fwd: {}", subject)
    }
}

/// Work out (to, cc) for a reply.
///
/// The original sender always gets the reply. With `reply_all`, the original
/// To and CC lists are added, minus the user's own addresses.
pub fn reply_recipients(
    original: &MessageDetail,
    reply_all: bool,
    own_addresses: &[String],
) -> (Vec<String>, Vec<String>) {
    let is_own = |email: &str| own_addresses.iter().any(|o| o.eq_ignore_ascii_case(email));

    let mut to = vec![original.summary.from.email.clone()];
    let mut cc = Vec::new();

    if reply_all {
        for addr in &original.to {
            if !is_own(&addr.email) && !to.iter().any(|t| t.eq_ignore_ascii_case(&addr.email)) {
                to.push(addr.email.clone());
            }
        }
        for addr in &original.cc {
            let seen = to.iter().chain(cc.iter()).any(|t| t.eq_ignore_ascii_case(&addr.email));
            if !is_own(&addr.email) && !seen {
                cc.push(addr.email.clone());
            }
        }
    }

    (to, cc)
}

/// `References` header for a reply: the original chain plus its Message-ID
pub fn reply_references(original: &MessageDetail) -> Option<String> {
    match (&original.references, &original.message_id_header) {
        (Some(refs), Some(id)) => Some(format!("{} {}", refs.trim(), id)),
        (None, Some(id)) => Some(id.clone()),
        (Some(refs), None) => Some(refs.clone()),
        (None, None) => None,
    }
}

/// Reply draft threaded onto the original message
pub fn reply_draft(
    original: &MessageDetail,
    from: &str,
    body: String,
    reply_all: bool,
    own_addresses: &[String],
) -> Draft {
    let (to, cc) = reply_recipients(original, reply_all, own_addresses);
    Draft {
        from: from.to_string(),
        to,
        cc,
        subject: reply_subject(&original.summary.subject),
        body,
        in_reply_to: original.message_id_header.clone(),
        references: reply_references(original),
        thread_id: Some(original.summary.thread_id.clone()),
        ..Default::default()
    }
}

/// Optional note, then the forwarded header block and original body
pub fn forward_body(note: Option<&str>, original: &MessageDetail) -> String {
    let mut body = String::new();
    if let Some(note) = note.map(str::trim_end).filter(|n| !n.trim().is_empty()) {
        body.push_str(note);
        body.push_str("\n\n");
    }

    body.push_str("---------- Forwarded message ----------\n");
    body.push_str(&format!("From: {}\n", original.summary.from));
    body.push_str(&format!("Date: {}\n", format_timestamp(original.summary.date)));
    body.push_str(&format!("Subject: {}\n", original.summary.subject));
    body.push('\n');
    body.push_str(&display_body(original, false));
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Address, MessageBody, MessageSummary};
    use chrono::Utc;
    use tempfile::TempDir;

    fn original() -> MessageDetail {
        MessageDetail {
            summary: MessageSummary {
                id: "m1".to_string(),
                thread_id: "t1".to_string(),
                from: Address::parse("Alice <alice@example.com>"),
                subject: "Lunch?".to_string(),
                date: Utc::now(),
                unread: true,
                size: 100,
                labels: vec![],
            },
            to: vec![Address::new("me@example.com"), Address::new("bob@example.com")],
            cc: vec![Address::new("carol@example.com"), Address::new("ME@example.com")],
            body: MessageBody::plain("Are you free at noon?"),
            attachments: vec![],
            message_id_header: Some("<orig@mail.example.com>".to_string()),
            references: Some("<root@mail.example.com>".to_string()),
        }
    }

    fn raw_text(message: &OutgoingMessage) -> String {
        String::from_utf8_lossy(&message.raw).into_owned()
    }

    #[test]
    fn test_validate_requires_recipient() {
        let draft = Draft {
            from: "me@example.com".to_string(),
            subject: "hi".to_string(),
            ..Default::default()
        };
        assert!(matches!(draft.validate(), Err(MailError::RecipientRequired)));
        assert!(matches!(draft.build(), Err(MailError::RecipientRequired)));
    }

    #[test]
    fn test_build_plain_message() {
        let draft = Draft {
            from: "me@example.com".to_string(),
            to: vec!["Bob <bob@example.com>".to_string()],
            cc: vec!["carol@example.com".to_string()],
            bcc: vec!["dave@example.com".to_string()],
            subject: "Status".to_string(),
            body: "All good".to_string(),
            ..Default::default()
        };

        let message = draft.build().unwrap();
        let raw = raw_text(&message);
        assert!(raw.contains("From: me@example.com"));
        assert!(raw.contains("To: Bob <bob@example.com>"));
        assert!(raw.contains("Cc: carol@example.com"));
        assert!(raw.contains("Bcc: dave@example.com"));
        assert!(raw.contains("Subject: Status"));
        assert!(raw.contains("Content-Type: text/plain"));
        assert!(raw.contains("All good"));
        assert!(message.thread_id.is_none());
    }

    #[test]
    fn test_build_html_with_attachment() {
        let draft = Draft {
            from: "me@example.com".to_string(),
            to: vec!["bob@example.com".to_string()],
            subject: "Report".to_string(),
            body: "<b>see attached</b>".to_string(),
            html: true,
            attachments: vec![AttachmentFile {
                filename: "report.csv".to_string(),
                content_type: "text/csv".to_string(),
                data: b"a,b\n1,2\n".to_vec(),
            }],
            ..Default::default()
        };

        let raw = raw_text(&draft.build().unwrap());
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("Content-Type: text/html"));
        assert!(raw.contains("filename=\"report.csv\""));
    }

    #[test]
    fn test_build_rejects_bad_address() {
        let draft = Draft {
            from: "me@example.com".to_string(),
            to: vec!["not an address".to_string()],
            ..Default::default()
        };
        assert!(matches!(draft.build(), Err(MailError::ComposeError(_))));
    }

    #[test]
    fn test_subject_prefixes() {
        assert_eq!(reply_subject("Lunch?"), "Re: Lunch?");
        assert_eq!(reply_subject("Re: Lunch?"), "Re: Lunch?");
        assert_eq!(reply_subject("RE: Lunch?"), "RE: Lunch?");
        assert_eq!(forward_subject("Lunch?"), "Fwd: Lunch?");
        assert_eq!(forward_subject("Fwd: Lunch?"), "Fwd: Lunch?");
        assert_eq!(reply_subject(""), "Re: ");
    }

    #[test]
    fn test_reply_recipients() {
        let own = vec!["me@example.com".to_string()];

        let (to, cc) = reply_recipients(&original(), false, &own);
        assert_eq!(to, vec!["alice@example.com".to_string()]);
        assert!(cc.is_empty());

        let (to, cc) = reply_recipients(&original(), true, &own);
        assert_eq!(
            to,
            vec!["alice@example.com".to_string(), "bob@example.com".to_string()]
        );
        assert_eq!(cc, vec!["carol@example.com".to_string()]);
    }

    #[test]
    fn test_reply_draft_threads() {
        let draft = reply_draft(&original(), "me@example.com", "Yes".to_string(), false, &[]);
        assert_eq!(draft.subject, "Re: Lunch?");
        assert_eq!(draft.thread_id.as_deref(), Some("t1"));
        assert_eq!(draft.in_reply_to.as_deref(), Some("<orig@mail.example.com>"));
        assert_eq!(
            draft.references.as_deref(),
            Some("<root@mail.example.com> <orig@mail.example.com>")
        );

        let raw = raw_text(&draft.build().unwrap());
        assert!(raw.contains("In-Reply-To: <orig@mail.example.com>"));
    }

    #[test]
    fn test_forward_body() {
        let body = forward_body(Some("FYI"), &original());
        assert!(body.starts_with("FYI\n\n---------- Forwarded message ----------\n"));
        assert!(body.contains("From: Alice <alice@example.com>\n"));
        assert!(body.contains("Subject: Lunch?\n"));
        assert!(body.ends_with("Are you free at noon?"));

        let without_note = forward_body(Some("   "), &original());
        assert!(without_note.starts_with("---------- Forwarded message ----------"));
    }

    #[tokio::test]
    async fn test_attachment_load_guesses_type() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.png");
        tokio::fs::write(&path, [0x89, b'P', b'N', b'G']).await.unwrap();

        let file = AttachmentFile::load(&path).await.unwrap();
        assert_eq!(file.filename, "photo.png");
        assert_eq!(file.content_type, "image/png");
        assert_eq!(file.data.len(), 4);
    }

    #[tokio::test]
    async fn test_attachment_load_through_parent_dir() {
        let dir = TempDir::new().unwrap();
        tokio::fs::create_dir(dir.path().join("sub")).await.unwrap();
        tokio::fs::write(dir.path().join("report.pdf"), b"%PDF").await.unwrap();

        let file = AttachmentFile::load(&dir.path().join("sub").join("..").join("report.pdf"))
            .await
            .unwrap();
        assert_eq!(file.filename, "report.pdf");
        assert_eq!(file.content_type, "application/pdf");
    }

    #[tokio::test]
    async fn test_attachment_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = AttachmentFile::load(&dir.path().join("missing.txt"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing.txt"));
    }
}
