//! Extraction of inline reasoning markers from streamed text.
//!
//! Some vendors leak reasoning into ordinary content as `<thinking>…</thinking>`
//! (or `<think>…</think>`). Tags may be split across arbitrary chunk
//! boundaries, so an unterminated partial tag is held back until the next
//! chunk decides it.

/// A run of text on one side of a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub is_thinking: bool,
}

/// Output of [`ThinkingTagParser::process`] for one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Processed {
    pub thinking: String,
    pub text: String,
}

/// Stateful tag splitter. One instance per stream.
#[derive(Debug, Clone)]
pub struct ThinkingTagParser {
    /// Recognized `(open, close)` pairs. No open tag occurs inside another.
    pairs: Vec<(String, String)>,
    /// Pair whose open tag started the current thinking run.
    active: Option<usize>,
    pending: String,
}

impl Default for ThinkingTagParser {
    /// Recognizes both `<thinking>` and `<think>`.
    fn default() -> Self {
        Self {
            pairs: vec![
                ("<thinking>".to_string(), "</thinking>".to_string()),
                ("<think>".to_string(), "</think>".to_string()),
            ],
            active: None,
            pending: String::new(),
        }
    }
}

impl ThinkingTagParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser for a single custom tag pair.
    pub fn with_tags(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            pairs: vec![(open.into(), close.into())],
            active: None,
            pending: String::new(),
        }
    }

    pub fn in_thinking(&self) -> bool {
        self.active.is_some()
    }

    /// Route a chunk. Chunks the vendor already marked as reasoning pass
    /// through untouched; everything else is split on tags.
    pub fn process(&mut self, chunk: &str, marked: bool) -> Processed {
        if marked {
            return Processed {
                thinking: chunk.to_string(),
                text: String::new(),
            };
        }

        let mut out = Processed::default();
        for segment in self.split(chunk) {
            if segment.is_thinking {
                out.thinking.push_str(&segment.text);
            } else {
                out.text.push_str(&segment.text);
            }
        }
        out
    }

    /// Split a chunk into text and thinking runs, consuming complete tags.
    pub fn split(&mut self, chunk: &str) -> Vec<Segment> {
        let mut buffer = std::mem::take(&mut self.pending);
        buffer.push_str(chunk);

        let mut segments: Vec<Segment> = Vec::new();
        let mut rest = buffer.as_str();

        loop {
            let in_thinking = self.in_thinking();

            if let Some((at, len, next)) = self.next_tag(rest) {
                push_segment(&mut segments, &rest[..at], in_thinking);
                rest = &rest[at + len..];
                self.active = next;
                continue;
            }

            let held = self.held_suffix(rest);
            let (emit, keep) = rest.split_at(rest.len() - held);
            push_segment(&mut segments, emit, in_thinking);
            self.pending = keep.to_string();
            break;
        }

        segments
    }

    /// Earliest complete tag in `text` that changes state: its offset, its
    /// length and the state after it.
    fn next_tag(&self, text: &str) -> Option<(usize, usize, Option<usize>)> {
        match self.active {
            Some(pair) => {
                let close = &self.pairs[pair].1;
                text.find(close.as_str()).map(|at| (at, close.len(), None))
            }
            None => self
                .pairs
                .iter()
                .enumerate()
                .filter_map(|(i, (open, _))| {
                    text.find(open.as_str()).map(|at| (at, open.len(), Some(i)))
                })
                .min_by_key(|&(at, _, _)| at),
        }
    }

    /// Bytes at the end of `text` that may still grow into a tag.
    fn held_suffix(&self, text: &str) -> usize {
        match self.active {
            Some(pair) => partial_tag_suffix(text, &self.pairs[pair].1),
            None => self
                .pairs
                .iter()
                .map(|(open, _)| partial_tag_suffix(text, open))
                .max()
                .unwrap_or(0),
        }
    }

    /// Release a dangling partial tag as literal text at end of stream.
    pub fn flush(&mut self) -> Option<Segment> {
        if self.pending.is_empty() {
            return None;
        }
        Some(Segment {
            text: std::mem::take(&mut self.pending),
            is_thinking: self.in_thinking(),
        })
    }
}

fn push_segment(segments: &mut Vec<Segment>, text: &str, is_thinking: bool) {
    if text.is_empty() {
        return;
    }
    match segments.last_mut() {
        Some(last) if last.is_thinking == is_thinking => last.text.push_str(text),
        _ => segments.push(Segment {
            text: text.to_string(),
            is_thinking,
        }),
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of `tag`.
fn partial_tag_suffix(text: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .filter(|&k| tag.is_char_boundary(k))
        .find(|&k| text.ends_with(&tag[..k]))
        .unwrap_or(0)
}

/// Whether a vendor part is reasoning. Parts flagged as thought are; so is a
/// whitespace-only part whose only payload is a thought signature.
pub fn is_thinking_part(thought: bool, text: &str, signature: Option<&str>) -> bool {
    thought || (signature.is_some_and(|s| !s.is_empty()) && text.trim().is_empty())
}
