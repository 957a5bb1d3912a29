use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gmail system label ids
pub mod labels {
    pub const INBOX: &str = "INBOX";
    pub const SENT: &str = "SENT";
    pub const DRAFT: &str = "DRAFT";
    pub const STARRED: &str = "STARRED";
    pub const SPAM: &str = "SPAM";
    pub const TRASH: &str = "TRASH";
    pub const UNREAD: &str = "UNREAD";
}

/// Search query for "archived" mail: everything not sitting in another system folder
pub const ARCHIVE_QUERY: &str = "-in:inbox -in:spam -in:trash -in:draft -in:sent";

/// Well-known folders a user can name on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Folder {
    Inbox,
    Sent,
    Drafts,
    Starred,
    Archive,
    All,
    Spam,
    Trash,
}

impl Folder {
    pub const ALL: [Folder; 8] = [
        Folder::Inbox,
        Folder::Drafts,
        Folder::Sent,
        Folder::Starred,
        Folder::Archive,
        Folder::All,
        Folder::Spam,
        Folder::Trash,
    ];

    /// Parse a user-supplied folder name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "inbox" => Some(Folder::Inbox),
            "sent" => Some(Folder::Sent),
            "drafts" | "draft" => Some(Folder::Drafts),
            "starred" => Some(Folder::Starred),
            "archive" => Some(Folder::Archive),
            "all" => Some(Folder::All),
            "spam" => Some(Folder::Spam),
            "trash" => Some(Folder::Trash),
            _ => None,
        }
    }

    /// Human-readable title used in table headings
    pub fn display_name(&self) -> &'static str {
        match self {
            Folder::Inbox => "Inbox",
            Folder::Sent => "Sent",
            Folder::Drafts => "Drafts",
            Folder::Starred => "Starred",
            Folder::Archive => "Archive",
            Folder::All => "All Mail",
            Folder::Spam => "Spam",
            Folder::Trash => "Trash",
        }
    }

    /// Gmail label backing this folder, if there is one
    pub fn label_id(&self) -> Option<&'static str> {
        match self {
            Folder::Inbox => Some(labels::INBOX),
            Folder::Sent => Some(labels::SENT),
            Folder::Drafts => Some(labels::DRAFT),
            Folder::Starred => Some(labels::STARRED),
            Folder::Spam => Some(labels::SPAM),
            Folder::Trash => Some(labels::TRASH),
            Folder::Archive | Folder::All => None,
        }
    }

    pub fn selector(&self) -> FolderSelector {
        FolderSelector {
            name: self.display_name().to_string(),
            label_ids: self.label_id().map(|l| vec![l.to_string()]).unwrap_or_default(),
            query: match self {
                Folder::Archive => Some(ARCHIVE_QUERY.to_string()),
                _ => None,
            },
            include_spam_trash: matches!(self, Folder::Spam | Folder::Trash),
        }
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// What to ask the provider for when listing a folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderSelector {
    pub name: String,
    pub label_ids: Vec<String>,
    pub query: Option<String>,
    pub include_spam_trash: bool,
}

impl FolderSelector {
    /// Resolve a folder argument. Unknown names are treated as raw label ids
    /// so custom labels can be listed too.
    pub fn parse(name: &str) -> Self {
        match Folder::from_name(name) {
            Some(folder) => folder.selector(),
            None => FolderSelector {
                name: name.to_string(),
                label_ids: vec![name.to_string()],
                query: None,
                include_spam_trash: false,
            },
        }
    }

    pub fn inbox() -> Self {
        Folder::Inbox.selector()
    }
}

/// Email address with optional display name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: Option<String>,
    pub email: String,
}

impl Address {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Parse a single header value in `Name <email@example.com>` or bare form
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if let (Some(start), Some(end)) = (value.rfind('<'), value.rfind('>')) {
            if start < end {
                let name = value[..start].trim().trim_matches('"').trim();
                return Self {
                    name: if name.is_empty() {
                        None
                    } else {
                        Some(name.to_string())
                    },
                    email: value[start + 1..end].trim().to_string(),
                };
            }
        }
        Self::new(value.trim_matches('"'))
    }

    /// Parse a comma-separated address list, respecting quoted display names
    pub fn parse_list(value: &str) -> Vec<Self> {
        let mut out = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut in_angle = false;

        for c in value.chars() {
            match c {
                '"' => {
                    in_quotes = !in_quotes;
                    current.push(c);
                }
                '<' => {
                    in_angle = true;
                    current.push(c);
                }
                '>' => {
                    in_angle = false;
                    current.push(c);
                }
                ',' if !in_quotes && !in_angle => {
                    if !current.trim().is_empty() {
                        out.push(Self::parse(&current));
                    }
                    current.clear();
                }
                _ => current.push(c),
            }
        }
        if !current.trim().is_empty() {
            out.push(Self::parse(&current));
        }
        out
    }

    /// Name if present, otherwise the address
    pub fn short(&self) -> &str {
        match &self.name {
            Some(name) if !name.is_empty() => name,
            _ => &self.email,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) if !name.is_empty() => write!(f, "{} <{}>", name, self.email),
            _ => f.write_str(&self.email),
        }
    }
}

/// One row of a folder listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: String,
    pub thread_id: String,
    pub from: Address,
    pub subject: String,
    pub date: DateTime<Utc>,
    pub unread: bool,
    pub size: u64,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    pub attachment_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
}

/// Text alternatives found in a message; either may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    pub plain: Option<String>,
    pub html: Option<String>,
}

impl MessageBody {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            plain: Some(text.into()),
            html: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.plain.as_deref().map_or(true, str::is_empty)
            && self.html.as_deref().map_or(true, str::is_empty)
    }
}

/// A fully fetched message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDetail {
    pub summary: MessageSummary,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub body: MessageBody,
    pub attachments: Vec<AttachmentInfo>,
    /// RFC 5322 `Message-ID` header, used to thread replies
    pub message_id_header: Option<String>,
    pub references: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelKind {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
    pub kind: LabelKind,
}

/// Totals for one folder, as shown by `count`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderCount {
    pub name: String,
    pub total: u64,
    pub unread: u64,
}

/// The authenticated account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub email: String,
    pub messages_total: u64,
    pub threads_total: u64,
}

/// An address the account can send as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub display_name: Option<String>,
    pub primary: bool,
}

/// Outgoing message handed to the provider
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    /// Fully formatted RFC 5322 message
    pub raw: Vec<u8>,
    /// Provider thread to attach this message to (replies)
    pub thread_id: Option<String>,
}

/// Result of a successful send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: String,
    pub thread_id: Option<String>,
}

/// Flag/folder changes applied to a set of messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Archive,
    Trash,
    Star,
    Spam,
    MarkRead,
    MarkUnread,
}

impl Mutation {
    /// Labels to (add, remove) for this mutation
    pub fn label_changes(&self) -> (Vec<String>, Vec<String>) {
        let (add, remove): (&[&str], &[&str]) = match self {
            Mutation::Archive => (&[], &[labels::INBOX]),
            Mutation::Trash => (&[labels::TRASH], &[labels::INBOX]),
            Mutation::Star => (&[labels::STARRED], &[]),
            Mutation::Spam => (&[labels::SPAM], &[labels::INBOX]),
            Mutation::MarkRead => (&[], &[labels::UNREAD]),
            Mutation::MarkUnread => (&[labels::UNREAD], &[]),
        };
        (
            add.iter().map(|l| l.to_string()).collect(),
            remove.iter().map(|l| l.to_string()).collect(),
        )
    }

    /// Spinner text while the change is applied
    pub fn in_progress(&self) -> &'static str {
        match self {
            Mutation::Archive => "Archiving...",
            Mutation::Trash => "Deleting...",
            Mutation::Star => "Starring...",
            Mutation::Spam => "Marking as spam...",
            Mutation::MarkRead => "Marking as read...",
            Mutation::MarkUnread => "Marking as unread...",
        }
    }

    /// Confirmation line printed once the provider accepted the change
    pub fn summary(&self, count: usize) -> String {
        match self {
            Mutation::Archive => format!("Archived {} message(s).", count),
            Mutation::Trash => format!("Deleted {} message(s).", count),
            Mutation::Star => format!("Starred {} message(s).", count),
            Mutation::Spam => format!("Marked {} message(s) as spam.", count),
            Mutation::MarkRead => format!("Marked {} message(s) as read.", count),
            Mutation::MarkUnread => format!("Marked {} message(s) as unread.", count),
        }
    }
}

/// Opaque position in the mailbox change feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Checkpoint(pub u64);

/// New mail found since a checkpoint
#[derive(Debug, Clone, PartialEq)]
pub struct PollDelta {
    pub new_messages: Vec<MessageSummary>,
    pub checkpoint: Checkpoint,
}
