//! Message references typed on the command line
//!
//! A reference is either a display index from the most recent listing
//! (`0`, `1`, ...) or a raw provider message id. Indices are resolved against
//! a fresh inbox listing every time; nothing is cached between runs, so an
//! index only means something for the listing that produced it.

use std::fmt;

use crate::client::MailProvider;
use crate::error::{MailError, Result};
use crate::models::{FolderSelector, MessageSummary};

/// Longest string still treated as an index. Gmail ids are 16 hex digits and
/// can be all-numeric, so anything longer is an id.
const MAX_INDEX_DIGITS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRef {
    Index(usize),
    Id(String),
}

impl MessageRef {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let is_index = !input.is_empty()
            && input.len() <= MAX_INDEX_DIGITS
            && input.bytes().all(|b| b.is_ascii_digit());

        match input.parse::<usize>() {
            Ok(index) if is_index => MessageRef::Index(index),
            _ => MessageRef::Id(input.to_string()),
        }
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRef::Index(index) => write!(f, "#{}", index),
            MessageRef::Id(id) => f.write_str(id),
        }
    }
}

/// Index-to-id lookup produced by one listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceTable {
    ids: Vec<String>,
    thread_ids: Vec<String>,
}

impl ReferenceTable {
    pub fn from_listing(messages: &[MessageSummary]) -> Self {
        Self {
            ids: messages.iter().map(|m| m.id.clone()).collect(),
            thread_ids: messages.iter().map(|m| m.thread_id.clone()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn resolve(&self, index: usize) -> Result<&str> {
        self.ids
            .get(index)
            .map(String::as_str)
            .ok_or(MailError::InvalidReference {
                index,
                available: self.ids.len(),
            })
    }

    /// Conversation of the message at `index`
    pub fn resolve_thread(&self, index: usize) -> Result<&str> {
        self.thread_ids
            .get(index)
            .map(String::as_str)
            .ok_or(MailError::InvalidReference {
                index,
                available: self.thread_ids.len(),
            })
    }
}

/// Resolve references to provider ids.
///
/// Ids pass straight through. If any index is present, the inbox is listed
/// once with just enough rows to cover the largest index.
pub async fn resolve_refs(provider: &dyn MailProvider, refs: &[MessageRef]) -> Result<Vec<String>> {
    let table = index_table(provider, refs).await?;

    refs.iter()
        .map(|r| match r {
            MessageRef::Index(index) => table.resolve(*index).map(str::to_string),
            MessageRef::Id(id) => Ok(id.clone()),
        })
        .collect()
}

/// List just enough of the inbox to cover every index in `refs`
async fn index_table(provider: &dyn MailProvider, refs: &[MessageRef]) -> Result<ReferenceTable> {
    let max_index = refs
        .iter()
        .filter_map(|r| match r {
            MessageRef::Index(index) => Some(*index),
            MessageRef::Id(_) => None,
        })
        .max();

    let table = match max_index {
        Some(max) => {
            tracing::debug!("Listing inbox to resolve indices up to {}", max);
            let listing = provider
                .list_messages(&FolderSelector::inbox(), max + 1, 0)
                .await?;
            ReferenceTable::from_listing(&listing)
        }
        None => ReferenceTable::default(),
    };
    Ok(table)
}

pub async fn resolve_ref(provider: &dyn MailProvider, reference: &MessageRef) -> Result<String> {
    match reference {
        MessageRef::Id(id) => Ok(id.clone()),
        MessageRef::Index(index) => index_table(provider, std::slice::from_ref(reference))
            .await?
            .resolve(*index)
            .map(str::to_string),
    }
}

/// Resolve a reference to a conversation id; a raw id is taken as a thread id
pub async fn resolve_thread_ref(
    provider: &dyn MailProvider,
    reference: &MessageRef,
) -> Result<String> {
    match reference {
        MessageRef::Id(id) => Ok(id.clone()),
        MessageRef::Index(index) => index_table(provider, std::slice::from_ref(reference))
            .await?
            .resolve_thread(*index)
            .map(str::to_string),
    }
}
