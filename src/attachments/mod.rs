//! Image limits applied before a request leaves the process.
//!
//! Vendors reject oversized or too-numerous images with an error that kills
//! the whole turn. The sanitizer drops offending images instead and leaves
//! a single note so the model knows something was omitted.

pub mod dimensions;

use crate::types::{Api, Content, Message, Model};

pub use dimensions::{decode_base64, image_dimensions};

const MB: u64 = 1024 * 1024;

/// Text left in a message whose every block was an omitted image.
pub const IMAGE_OMITTED_PLACEHOLDER: &str = "(image omitted)";

/// Stricter dimension cap applied once a request carries many images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManyImageLimit {
    pub threshold: usize,
    pub max_dimension: u32,
}

/// Effective limits for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizeConfig {
    /// Vendor name used in the omission note.
    pub provider_label: String,
    pub max_bytes: u64,
    pub max_dimension: Option<u32>,
    pub many_image_limit: Option<ManyImageLimit>,
    pub max_images: Option<usize>,
}

/// Per-call overrides; unset fields keep the model defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageLimitOverrides {
    pub provider_label: Option<String>,
    pub max_bytes: Option<u64>,
    pub max_dimension: Option<u32>,
    pub many_image_limit: Option<ManyImageLimit>,
    pub max_images: Option<usize>,
}

impl SanitizeConfig {
    /// Documented defaults for the vendor behind `model`.
    pub fn for_model(model: &Model) -> Self {
        let provider_label = model.provider.clone();
        match model.api {
            Api::AnthropicMessages => Self {
                provider_label,
                max_bytes: 5 * MB,
                max_dimension: Some(8000),
                many_image_limit: Some(ManyImageLimit {
                    threshold: 20,
                    max_dimension: 2000,
                }),
                max_images: Some(100),
            },
            Api::OpenAICompletions | Api::OpenAIResponses | Api::OpenAICodexResponses => Self {
                provider_label,
                max_bytes: 20 * MB,
                max_dimension: None,
                many_image_limit: None,
                max_images: Some(500),
            },
            Api::GoogleGenerativeAI | Api::GoogleGeminiCli | Api::GoogleVertex => Self {
                provider_label,
                max_bytes: 20 * MB,
                max_dimension: None,
                many_image_limit: None,
                max_images: Some(3000),
            },
            Api::Custom(_) => Self {
                provider_label,
                max_bytes: 30 * MB,
                max_dimension: None,
                many_image_limit: None,
                max_images: None,
            },
        }
    }

    pub fn apply(mut self, overrides: &ImageLimitOverrides) -> Self {
        if let Some(label) = &overrides.provider_label {
            self.provider_label = label.clone();
        }
        if let Some(max_bytes) = overrides.max_bytes {
            self.max_bytes = max_bytes;
        }
        if overrides.max_dimension.is_some() {
            self.max_dimension = overrides.max_dimension;
        }
        if overrides.many_image_limit.is_some() {
            self.many_image_limit = overrides.many_image_limit;
        }
        if overrides.max_images.is_some() {
            self.max_images = overrides.max_images;
        }
        self
    }
}

/// Sanitizer output. `note` repeats the text appended to the history.
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub messages: Vec<Message>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Omission {
    Bytes,
    Dimension,
    ManyImages,
    Count,
}

struct ImageSlot {
    message: usize,
    block: usize,
    bytes: u64,
    longest_side: u32,
    omitted: Option<Omission>,
}

/// Drop images that break the vendor limits in `config`. Never fails.
pub fn sanitize_images(messages: &[Message], config: &SanitizeConfig) -> Sanitized {
    let mut slots = collect_images(messages);

    for slot in &mut slots {
        if slot.bytes > config.max_bytes {
            slot.omitted = Some(Omission::Bytes);
        } else if config.max_dimension.is_some_and(|max| slot.longest_side > max) {
            slot.omitted = Some(Omission::Dimension);
        }
    }

    if let Some(limit) = config.many_image_limit {
        if surviving(&slots) > limit.threshold {
            for slot in slots.iter_mut().filter(|s| s.omitted.is_none()) {
                if slot.longest_side > limit.max_dimension {
                    slot.omitted = Some(Omission::ManyImages);
                }
            }
        }
    }

    if let Some(max_images) = config.max_images {
        let excess = surviving(&slots).saturating_sub(max_images);
        for slot in slots.iter_mut().filter(|s| s.omitted.is_none()).take(excess) {
            slot.omitted = Some(Omission::Count);
        }
    }

    let omitted: Vec<&ImageSlot> = slots.iter().filter(|s| s.omitted.is_some()).collect();
    if omitted.is_empty() {
        return Sanitized {
            messages: messages.to_vec(),
            note: None,
        };
    }

    let note = omission_note(&omitted, config);
    let note_target = omitted.iter().map(|s| s.message).max().unwrap_or_default();

    let mut out = messages.to_vec();
    for (index, message) in out.iter_mut().enumerate() {
        let dropped: Vec<usize> = omitted
            .iter()
            .filter(|s| s.message == index)
            .map(|s| s.block)
            .collect();
        if dropped.is_empty() {
            continue;
        }
        let Some(content) = message.content_mut() else {
            continue;
        };
        let kept: Vec<Content> = std::mem::take(content)
            .into_iter()
            .enumerate()
            .filter(|(block, _)| !dropped.contains(block))
            .map(|(_, c)| c)
            .collect();
        *content = kept;

        if index == note_target {
            content.push(Content::text(note.clone()));
        } else if content.is_empty() {
            content.push(Content::text(IMAGE_OMITTED_PLACEHOLDER));
        }
    }

    tracing::debug!(
        provider = %config.provider_label,
        omitted = omitted.len(),
        "sanitized image attachments"
    );

    Sanitized {
        messages: out,
        note: Some(note),
    }
}

fn collect_images(messages: &[Message]) -> Vec<ImageSlot> {
    let mut slots = Vec::new();
    for (index, message) in messages.iter().enumerate() {
        let content = match message {
            Message::User(m) => &m.content,
            Message::ToolResult(m) => &m.content,
            _ => continue,
        };
        for (block, item) in content.iter().enumerate() {
            let Content::Image(image) = item else {
                continue;
            };
            let decoded = decode_base64(&image.data);
            let bytes = decoded
                .as_ref()
                .map(|b| b.len() as u64)
                .unwrap_or_else(|| dimensions::estimated_decoded_len(&image.data));
            let longest_side = decoded
                .as_deref()
                .and_then(image_dimensions)
                .map(|(w, h)| w.max(h))
                .unwrap_or(0);
            slots.push(ImageSlot {
                message: index,
                block,
                bytes,
                longest_side,
                omitted: None,
            });
        }
    }
    slots
}

fn surviving(slots: &[ImageSlot]) -> usize {
    slots.iter().filter(|s| s.omitted.is_none()).count()
}

fn omission_note(omitted: &[&ImageSlot], config: &SanitizeConfig) -> String {
    let count = |kind: Omission| omitted.iter().filter(|s| s.omitted == Some(kind)).count();

    let mut reasons = Vec::new();
    if count(Omission::Bytes) > 0 {
        reasons.push(format!("exceeded {} limit", format_bytes(config.max_bytes)));
    }
    if count(Omission::Dimension) > 0 {
        if let Some(max) = config.max_dimension {
            reasons.push(format!("exceeded {max}px dimension limit"));
        }
    }
    if count(Omission::ManyImages) > 0 {
        if let Some(limit) = config.many_image_limit {
            reasons.push(format!(
                "exceeded {}px dimension limit for requests with more than {} images",
                limit.max_dimension, limit.threshold
            ));
        }
    }
    if count(Omission::Count) > 0 {
        if let Some(max) = config.max_images {
            reasons.push(format!("{} accepts at most {max} images", config.provider_label));
        }
    }

    let total = omitted.len();
    let noun = if total == 1 { "image" } else { "images" };
    format!("{total} {noun} omitted: {}", reasons.join("; "))
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if bytes >= MB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else {
        format!("{}KB", bytes.div_ceil(1024))
    }
}
