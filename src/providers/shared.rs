//! Request-building helpers common to several vendors.

use std::collections::{HashMap, HashSet};

use crate::types::{Content, StopReason};

/// Text sent alongside images when a tool result or message has no text.
pub const IMAGE_ONLY_PLACEHOLDER: &str = "(see attached image)";

/// Tool-call id constraints of one vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStyle {
    /// `[A-Za-z0-9_-]`, at most `max` characters.
    Safe { max: usize },
    /// Exactly nine ASCII alphanumerics.
    Mistral,
}

/// Maps caller tool-call ids onto ids a vendor accepts.
///
/// One map lives for one request, so a call and its result always agree,
/// and two distinct ids never collapse onto the same vendor id.
#[derive(Debug)]
pub struct ToolIdMap {
    style: IdStyle,
    assigned: HashMap<String, String>,
    taken: HashSet<String>,
}

impl ToolIdMap {
    pub fn new(style: IdStyle) -> Self {
        Self {
            style,
            assigned: HashMap::new(),
            taken: HashSet::new(),
        }
    }

    pub fn normalize(&mut self, id: &str) -> String {
        if let Some(existing) = self.assigned.get(id) {
            return existing.clone();
        }

        let base = match self.style {
            IdStyle::Safe { max } => id
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
                .take(max)
                .collect::<String>(),
            IdStyle::Mistral => {
                let mut base: String =
                    id.chars().filter(char::is_ascii_alphanumeric).take(9).collect();
                while base.len() < 9 {
                    base.push('0');
                }
                base
            }
        };

        let mut candidate = base.clone();
        let mut suffix = 2usize;
        while self.taken.contains(&candidate) {
            candidate = self.with_suffix(&base, suffix);
            suffix += 1;
        }

        self.taken.insert(candidate.clone());
        self.assigned.insert(id.to_string(), candidate.clone());
        candidate
    }

    fn with_suffix(&self, base: &str, n: usize) -> String {
        match self.style {
            IdStyle::Safe { max } => {
                let tail = format!("_{n}");
                let keep = max.saturating_sub(tail.len()).min(base.len());
                format!("{}{tail}", &base[..keep])
            }
            IdStyle::Mistral => {
                let tail = n.to_string();
                let keep = 9usize.saturating_sub(tail.len());
                format!("{}{tail}", &base[..keep])
            }
        }
    }
}

/// Collapsed message or tool-result content.
#[derive(Debug, Clone, PartialEq)]
pub enum Collapsed {
    Text(String),
    /// Mixed content, led by a placeholder when there was no text.
    Blocks(Vec<Content>),
}

/// Collapse text-only content to a string; keep blocks when images are present.
pub fn collapse(content: &[Content]) -> Collapsed {
    if !content.iter().any(|c| matches!(c, Content::Image(_) | Content::Document(_))) {
        let text = content
            .iter()
            .filter_map(Content::as_text)
            .collect::<Vec<_>>()
            .join("\n");
        return Collapsed::Text(text);
    }

    let mut blocks: Vec<Content> = content
        .iter()
        .filter(|c| matches!(c, Content::Text(_) | Content::Image(_) | Content::Document(_)))
        .cloned()
        .collect();
    if !blocks.iter().any(|c| c.as_text().is_some_and(|t| !t.is_empty())) {
        blocks.insert(0, Content::text(IMAGE_ONLY_PLACEHOLDER));
    }
    Collapsed::Blocks(blocks)
}

/// Fallback for stop codes missing from a vendor's table.
pub fn unknown_stop_reason(provider: &str, code: &str) -> StopReason {
    tracing::warn!(provider, code, "unknown stop reason, treating as stop");
    StopReason::Stop
}
