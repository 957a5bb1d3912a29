//! Terminal output formatting

use chrono::{DateTime, Datelike, Local, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{self, Write};

use crate::models::{
    Account, Address, FolderCount, Identity, LabelInfo, LabelKind, MessageDetail, MessageSummary,
};

static BR_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));
static P_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<p[^>]*>").expect("valid regex"));
static P_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</p>").expect("valid regex"));
static BLOCK_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("valid regex")
});
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

const RULE: &str = "────────────────────────────────────────────────────────────";

/// Decode one HTML entity body (the part between `&` and `;`)
fn decode_entity(entity: &str) -> Option<String> {
    if let Some(num) = entity.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }

    let decoded = match entity {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        "mdash" => "—",
        "ndash" => "–",
        "hellip" => "…",
        "copy" => "©",
        _ => return None,
    };
    Some(decoded.to_string())
}

/// Strip HTML tags and decode entities to plain text
pub fn strip_html(html: &str) -> String {
    let text = BLOCK_TAG.replace_all(html, "");
    let text = BR_TAG.replace_all(&text, "\n");
    let text = P_OPEN.replace_all(&text, "\n");
    let text = P_CLOSE.replace_all(&text, "");
    let text = ANY_TAG.replace_all(&text, "");
    let text = ENTITY.replace_all(&text, |caps: &regex::Captures| {
        decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Body text suitable for a terminal: plain part if present, else stripped HTML
pub fn display_body(message: &MessageDetail, raw_html: bool) -> String {
    let body = &message.body;
    let text = if raw_html {
        body.html.clone().or_else(|| body.plain.clone())
    } else {
        body.plain
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| body.html.as_deref().map(strip_html))
    };

    match text {
        Some(text) if !text.trim().is_empty() => text,
        _ => "(empty)".to_string(),
    }
}

/// Format a timestamp relative to now: time only for today, month/day for this year
pub fn format_timestamp(date: DateTime<Utc>) -> String {
    format_timestamp_at(date, Local::now())
}

fn format_timestamp_at(date: DateTime<Utc>, now: DateTime<Local>) -> String {
    let local = date.with_timezone(&Local);
    if local.date_naive() == now.date_naive() {
        local.format("%H:%M").to_string()
    } else if local.year() == now.year() {
        local.format("%b %d %H:%M").to_string()
    } else {
        local.format("%Y-%m-%d %H:%M").to_string()
    }
}

/// Format byte size to human-readable (B/KB/MB/GB, then TB with one decimal)
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{:.0}{}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1}TB", size)
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!(
            "{}...",
            s.chars().take(max_len.saturating_sub(3)).collect::<String>()
        )
    }
}

fn join_addresses(addresses: &[Address]) -> String {
    addresses
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn subject_or_placeholder(subject: &str) -> &str {
    if subject.trim().is_empty() {
        "(no subject)"
    } else {
        subject
    }
}

/// Print a numbered table of messages; `#` is the index `read` and friends accept
pub fn print_message_list(
    out: &mut dyn Write,
    messages: &[MessageSummary],
    folder_name: &str,
) -> io::Result<()> {
    writeln!(out, "{} ({} messages)", folder_name, messages.len())?;
    writeln!(
        out,
        "{:>4} {:1} {:<30} {:<50} {:>14} {:>6}",
        "#", "", "From", "Subject", "Date", "Size"
    )?;

    for (index, message) in messages.iter().enumerate() {
        writeln!(
            out,
            "{:>4} {:1} {:<30} {:<50} {:>14} {:>6}",
            index,
            if message.unread { "*" } else { " " },
            truncate_string(message.from.short(), 30),
            truncate_string(subject_or_placeholder(&message.subject), 50),
            format_timestamp(message.date),
            format_size(message.size),
        )?;
    }
    Ok(())
}

/// Print header pane followed by the body
pub fn print_message(out: &mut dyn Write, message: &MessageDetail, raw_html: bool) -> io::Result<()> {
    let summary = &message.summary;

    writeln!(out, "{}", RULE)?;
    writeln!(out, "From:    {}", summary.from)?;
    writeln!(out, "To:      {}", join_addresses(&message.to))?;
    if !message.cc.is_empty() {
        writeln!(out, "CC:      {}", join_addresses(&message.cc))?;
    }
    writeln!(out, "Date:    {}", format_timestamp(summary.date))?;
    writeln!(out, "Subject: {}", summary.subject)?;
    if !message.attachments.is_empty() {
        let files = message
            .attachments
            .iter()
            .map(|a| format!("{} ({})", a.filename, format_size(a.size)))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(out, "Files:   {}", files)?;
    }
    writeln!(out, "ID: {}", summary.id)?;
    writeln!(out, "{}", RULE)?;
    writeln!(out)?;
    writeln!(out, "{}", display_body(message, raw_html))?;
    writeln!(out)?;
    Ok(())
}

/// System folders first, then user labels
pub fn print_folders(out: &mut dyn Write, labels: &[LabelInfo]) -> io::Result<()> {
    let (system, user): (Vec<&LabelInfo>, Vec<&LabelInfo>) =
        labels.iter().partition(|l| l.kind == LabelKind::System);

    writeln!(out, "System folders:")?;
    for label in &system {
        writeln!(out, "  {:<20} (id: {})", label.name, label.id)?;
    }

    if !user.is_empty() {
        writeln!(out)?;
        writeln!(out, "Labels:")?;
        for label in &user {
            writeln!(out, "  {:<20} (id: {})", label.name, label.id)?;
        }
    }
    Ok(())
}

pub fn print_counts(out: &mut dyn Write, counts: &[FolderCount]) -> io::Result<()> {
    writeln!(out, "Message counts")?;
    writeln!(out, "{:<12} {:>8} {:>8}", "Folder", "Total", "Unread")?;
    for count in counts {
        let unread = if count.unread > 0 {
            count.unread.to_string()
        } else {
            String::new()
        };
        writeln!(out, "{:<12} {:>8} {:>8}", count.name, count.total, unread)?;
    }
    Ok(())
}

/// One line per send-as identity, primary first
pub fn print_identities(
    out: &mut dyn Write,
    account: &Account,
    identities: &[Identity],
) -> io::Result<()> {
    if identities.is_empty() {
        writeln!(out, "{}", account.email)?;
        return Ok(());
    }

    for identity in identities {
        let name = identity
            .display_name
            .as_deref()
            .map(|n| format!(" ({})", n))
            .unwrap_or_default();
        writeln!(out, "{}{}", identity.email, name)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttachmentInfo, MessageBody};
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn summary(subject: &str, unread: bool) -> MessageSummary {
        MessageSummary {
            id: "m1".to_string(),
            thread_id: "t1".to_string(),
            from: Address {
                name: Some("Alice".to_string()),
                email: "alice@example.com".to_string(),
            },
            subject: subject.to_string(),
            date: Utc::now(),
            unread,
            size: 2048,
            labels: vec![],
        }
    }

    fn detail(body: MessageBody) -> MessageDetail {
        MessageDetail {
            summary: summary("Hello", false),
            to: vec![Address::new("me@example.com")],
            cc: vec![],
            body,
            attachments: vec![],
            message_id_header: None,
            references: None,
        }
    }

    #[test]
    fn test_strip_html() {
        let html = "<p>Hello&nbsp;<b>world</b></p><p>Line&amp;two<br/>three</p>";
        assert_eq!(strip_html(html), "Hello world\nLine&two\nthree");
    }

    #[test]
    fn test_strip_html_collapses_blank_lines_and_drops_styles() {
        let html = "<style>p { color: red }</style>A<br><br><br><br>B &#65;&#x42; &unknown;";
        assert_eq!(strip_html(html), "A\n\nB AB &unknown;");
    }

    #[test]
    fn test_display_body_prefers_plain() {
        let message = detail(MessageBody {
            plain: Some("plain text".to_string()),
            html: Some("<p>html text</p>".to_string()),
        });
        assert_eq!(display_body(&message, false), "plain text");
        assert_eq!(display_body(&message, true), "<p>html text</p>");
    }

    #[test]
    fn test_display_body_falls_back_to_stripped_html() {
        let message = detail(MessageBody {
            plain: None,
            html: Some("<p>only html</p>".to_string()),
        });
        assert_eq!(display_body(&message, false), "only html");
        assert_eq!(display_body(&detail(MessageBody::default()), false), "(empty)");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0B");
        assert_eq!(format_size(1023), "1023B");
        assert_eq!(format_size(2048), "2KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3GB");
        assert_eq!(format_size(1024u64.pow(4) * 3 / 2), "1.5TB");
    }

    #[test]
    fn test_format_timestamp_ranges() {
        let now = Local.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();

        let today = Local.with_ymd_and_hms(2024, 6, 15, 9, 5, 0).unwrap();
        assert_eq!(format_timestamp_at(today.with_timezone(&Utc), now), "09:05");

        let this_year = Local.with_ymd_and_hms(2024, 2, 3, 14, 30, 0).unwrap();
        assert_eq!(
            format_timestamp_at(this_year.with_timezone(&Utc), now),
            "Feb 03 14:30"
        );

        let last_year = Local.with_ymd_and_hms(2023, 12, 31, 23, 59, 0).unwrap();
        assert_eq!(
            format_timestamp_at(last_year.with_timezone(&Utc), now),
            "2023-12-31 23:59"
        );
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("a much longer subject", 10), "a much ...");
    }

    #[test]
    fn test_print_message_list() {
        let mut out = Vec::new();
        let mut older = summary("", false);
        older.date = Utc::now() - Duration::days(400);
        print_message_list(&mut out, &[summary("First", true), older], "Inbox").unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Inbox (2 messages)");
        assert!(lines[2].trim_start().starts_with("0 *"));
        assert!(lines[2].contains("Alice"));
        assert!(lines[2].contains("First"));
        assert!(lines[3].contains("(no subject)"));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_print_message_pane() {
        let mut message = detail(MessageBody::plain("Body here"));
        message.cc = vec![Address::new("cc@example.com")];
        message.attachments = vec![AttachmentInfo {
            attachment_id: "a1".to_string(),
            filename: "notes.txt".to_string(),
            mime_type: "text/plain".to_string(),
            size: 10,
        }];

        let mut out = Vec::new();
        print_message(&mut out, &message, false).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("From:    Alice <alice@example.com>"));
        assert!(text.contains("To:      me@example.com"));
        assert!(text.contains("CC:      cc@example.com"));
        assert!(text.contains("Subject: Hello"));
        assert!(text.contains("Files:   notes.txt (10B)"));
        assert!(text.contains("ID: m1"));
        assert!(text.contains("Body here"));
    }

    #[test]
    fn test_print_folders_and_counts() {
        let labels = vec![
            LabelInfo {
                id: "INBOX".to_string(),
                name: "INBOX".to_string(),
                kind: LabelKind::System,
            },
            LabelInfo {
                id: "Label_1".to_string(),
                name: "Receipts".to_string(),
                kind: LabelKind::User,
            },
        ];
        let mut out = Vec::new();
        print_folders(&mut out, &labels).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("System folders:\n  INBOX"));
        assert!(text.contains("Labels:\n  Receipts"));
        assert!(text.contains("(id: Label_1)"));

        let mut out = Vec::new();
        print_counts(
            &mut out,
            &[FolderCount {
                name: "Inbox".to_string(),
                total: 42,
                unread: 0,
            }],
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Inbox"));
        assert!(text.contains("42"));
    }

    proptest! {
        #[test]
        fn prop_truncate_never_exceeds_limit(s in ".{0,200}", max in 3usize..100) {
            prop_assert!(truncate_string(&s, max).chars().count() <= max);
        }

        #[test]
        fn prop_strip_html_leaves_no_tags(s in "[a-z <>/p]{0,100}") {
            let stripped = strip_html(&format!("<div>{}</div>", s));
            prop_assert!(!ANY_TAG.is_match(&stripped));
        }
    }
}
