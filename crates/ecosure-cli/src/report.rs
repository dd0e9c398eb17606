//! Report assembly from the newest assistant message.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::LazyLock;

use colored::Colorize;
use ecosure_contracts::{ContentPart, NormalizedMessage, Role};
use regex::Regex;
use serde::Serialize;

use crate::client::file_url;
use crate::theme::Biome;

const SLUG_MAX_CHARS: usize = 80;
const SUMMARY_MAX_CHARS: usize = 280;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#{1,3})\s+(.+?)\s*$").expect("Invalid regex"));
static ANY_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+").expect("Invalid regex"));
static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]]+)\]\((https?://[^\s)]+)\)").expect("Invalid regex")
});
static SLUG_STRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\s-]").expect("Invalid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("Invalid regex"));
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("Invalid regex"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heading {
    pub level: usize,
    pub text: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reference {
    pub label: String,
    pub href: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportAttachment {
    pub kind: AttachmentKind,
    pub file_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub message_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub headings: Vec<Heading>,
    pub references: Vec<Reference>,
    pub attachments: Vec<ReportAttachment>,
}

impl Report {
    /// Builds the report for the most recent assistant message, if any.
    pub fn latest(messages: &[NormalizedMessage], base_url: &str) -> Option<Self> {
        messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
            .map(|message| Self::from_message(message, base_url))
    }

    pub fn from_message(message: &NormalizedMessage, base_url: &str) -> Self {
        let text = message.text();
        let attachments = message
            .attachments()
            .filter_map(|part| match part {
                ContentPart::Image { file_id } => Some(ReportAttachment {
                    kind: AttachmentKind::Image,
                    file_id: file_id.clone(),
                    filename: None,
                    url: file_url(base_url, file_id),
                }),
                ContentPart::File { file_id, filename } => Some(ReportAttachment {
                    kind: AttachmentKind::File,
                    file_id: file_id.clone(),
                    filename: (!filename.is_empty()).then(|| filename.clone()),
                    url: file_url(base_url, file_id),
                }),
                _ => None,
            })
            .collect();

        Self {
            message_id: message.id.clone(),
            summary: summarize(&text),
            headings: extract_headings(&text),
            references: extract_references(&text),
            attachments,
            text,
        }
    }

    /// Coloured terminal rendering. `with_body` is false when the body was
    /// already shown while streaming and did not change on reconciliation.
    pub fn render(&self, biome: Biome, with_body: bool) -> String {
        let mut out = String::new();
        let rule = biome.paint(&"─".repeat(48)).to_string();
        let _ = writeln!(out, "{rule}");

        if let Some(summary) = &self.summary {
            let _ = writeln!(out, "{}", biome.heading("Summary"));
            let _ = writeln!(out, "  {}\n", summary.italic());
        }

        if self.headings.len() > 1 {
            let _ = writeln!(out, "{}", biome.heading("Contents"));
            for heading in &self.headings {
                let indent = "  ".repeat(heading.level);
                let _ = writeln!(
                    out,
                    "{indent}{} {}",
                    heading.text,
                    format!("#{}", heading.slug).dimmed()
                );
            }
            let _ = writeln!(out);
        }

        if with_body {
            for line in self.text.lines() {
                match HEADING.captures(line) {
                    Some(caps) => {
                        let _ = writeln!(out, "\n{}", biome.heading(&caps[2]));
                    }
                    None => {
                        let _ = writeln!(out, "{line}");
                    }
                }
            }
            let _ = writeln!(out);
        }

        if !self.attachments.is_empty() {
            let _ = writeln!(out, "{}", biome.heading("Attachments"));
            for attachment in &self.attachments {
                let label = match (&attachment.kind, &attachment.filename) {
                    (_, Some(name)) => name.clone(),
                    (AttachmentKind::Image, None) => "image".to_string(),
                    (AttachmentKind::File, None) => attachment.file_id.clone(),
                };
                let _ = writeln!(out, "  • {label}  {}", attachment.url.underline());
            }
            let _ = writeln!(out);
        }

        if !self.references.is_empty() {
            let _ = writeln!(out, "{}", biome.heading("References"));
            for reference in &self.references {
                let _ = writeln!(
                    out,
                    "  • {}  {}",
                    reference.label,
                    reference.href.dimmed()
                );
            }
            let _ = writeln!(out);
        }

        let _ = write!(out, "{rule}");
        out
    }

    /// Plain markdown suitable for saving next to other documents.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        if let Some(summary) = &self.summary {
            let _ = writeln!(out, "> {summary}\n");
        }
        let _ = writeln!(out, "{}", self.text.trim_end());

        if !self.attachments.is_empty() {
            let _ = writeln!(out, "\n## Attachments\n");
            for attachment in &self.attachments {
                let label = attachment
                    .filename
                    .as_deref()
                    .unwrap_or(&attachment.file_id);
                match attachment.kind {
                    AttachmentKind::Image => {
                        let _ = writeln!(out, "![{label}]({})", attachment.url);
                    }
                    AttachmentKind::File => {
                        let _ = writeln!(out, "- [{label}]({})", attachment.url);
                    }
                }
            }
        }

        if !self.references.is_empty() {
            let _ = writeln!(out, "\n## References\n");
            for reference in &self.references {
                let _ = writeln!(out, "- [{}]({})", reference.label, reference.href);
            }
        }
        out
    }
}

/// Anchor id for a heading.
pub fn slugify(text: &str) -> String {
    let lower = text.to_lowercase();
    let stripped = SLUG_STRIP.replace_all(&lower, "");
    let dashed = WHITESPACE.replace_all(stripped.trim(), "-");
    dashed.chars().take(SLUG_MAX_CHARS).collect()
}

/// Level 1 to 3 headings, in document order.
pub fn extract_headings(text: &str) -> Vec<Heading> {
    HEADING
        .captures_iter(text)
        .map(|caps| {
            let title = caps[2].to_string();
            Heading {
                level: caps[1].len(),
                slug: slugify(&title),
                text: title,
            }
        })
        .collect()
}

/// Markdown links to web pages, one per target; the first label wins.
pub fn extract_references(text: &str) -> Vec<Reference> {
    let mut seen = HashSet::new();
    LINK.captures_iter(text)
        .filter(|caps| seen.insert(caps[2].to_string()))
        .map(|caps| Reference {
            label: caps[1].to_string(),
            href: caps[2].to_string(),
        })
        .collect()
}

/// First paragraph of the preamble before the first heading. A message that
/// opens with a heading is summarized from its start.
pub fn summarize(text: &str) -> Option<String> {
    let preamble = match ANY_HEADING.find(text) {
        Some(found) if found.start() > 0 => &text[..found.start()],
        _ => text,
    };
    let paragraph = PARAGRAPH_BREAK
        .split(preamble)
        .next()
        .unwrap_or_default()
        .trim();
    if paragraph.is_empty() {
        return None;
    }
    if paragraph.chars().count() > SUMMARY_MAX_CHARS {
        let cut: String = paragraph.chars().take(SUMMARY_MAX_CHARS).collect();
        return Some(format!("{cut}…"));
    }
    Some(paragraph.to_string())
}
