//! Reasoning-effort resolution for the Responses family of APIs.
//!
//! Each model family accepts a different subset of effort tiers. Families
//! are matched by an ordered rule table; the first matching rule decides the
//! default tier and how unsupported tiers are coerced.

use serde::Serialize;

use crate::types::ThinkingLevel;

/// Effort tier as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    None,
    Minimal,
    Low,
    Medium,
    High,
    Xhigh,
}

impl From<ThinkingLevel> for Effort {
    fn from(level: ThinkingLevel) -> Self {
        match level {
            ThinkingLevel::Minimal => Effort::Minimal,
            ThinkingLevel::Low => Effort::Low,
            ThinkingLevel::Medium => Effort::Medium,
            ThinkingLevel::High => Effort::High,
            ThinkingLevel::Xhigh => Effort::Xhigh,
        }
    }
}

/// One row of the family table.
#[derive(Debug)]
pub struct FamilyRule {
    pub family: &'static str,
    matches: fn(&str) -> bool,
    pub default: Effort,
    /// Lowest and highest accepted tier; anything outside is clamped.
    min: Effort,
    max: Effort,
    /// Instruction set used by Codex for this family.
    pub prompt: &'static str,
}

impl FamilyRule {
    /// Clamp `requested` into this family's accepted range.
    pub fn coerce(&self, requested: Effort) -> Effort {
        requested.clamp(self.min, self.max)
    }
}

/// Evaluated top to bottom; the last rule matches everything.
pub static FAMILY_RULES: &[FamilyRule] = &[
    FamilyRule {
        family: "gpt-5.2-codex",
        matches: |id| id.contains("gpt-5.2-codex"),
        default: Effort::High,
        min: Effort::Low,
        max: Effort::Xhigh,
        prompt: "gpt-5.2-codex",
    },
    FamilyRule {
        family: "codex-max",
        matches: |id| id.contains("codex-max"),
        default: Effort::High,
        min: Effort::Low,
        max: Effort::Xhigh,
        prompt: "codex-max",
    },
    FamilyRule {
        family: "codex-mini",
        matches: |id| id.contains("codex-mini"),
        default: Effort::Medium,
        min: Effort::Medium,
        max: Effort::High,
        prompt: "codex",
    },
    FamilyRule {
        family: "codex",
        matches: |id| id.contains("codex"),
        default: Effort::Medium,
        min: Effort::Low,
        max: Effort::High,
        prompt: "codex",
    },
    FamilyRule {
        family: "gpt-5.2",
        matches: |id| id.contains("gpt-5.2"),
        default: Effort::High,
        min: Effort::None,
        max: Effort::Xhigh,
        prompt: "gpt-5.2",
    },
    FamilyRule {
        family: "gpt-5.1",
        matches: |id| id.contains("gpt-5.1"),
        default: Effort::Medium,
        min: Effort::None,
        max: Effort::High,
        prompt: "gpt-5.1",
    },
    FamilyRule {
        family: "lightweight",
        matches: |id| id.contains("mini") || id.contains("nano"),
        default: Effort::Minimal,
        min: Effort::Minimal,
        max: Effort::High,
        prompt: "gpt-5.1",
    },
    FamilyRule {
        family: "general",
        matches: |_| true,
        default: Effort::Medium,
        min: Effort::Minimal,
        max: Effort::High,
        prompt: "gpt-5.1",
    },
];

/// The rule governing `model_id`.
pub fn family_for(model_id: &str) -> &'static FamilyRule {
    let id = model_id.to_ascii_lowercase();
    let id = id.rsplit('/').next().unwrap_or(&id);
    FAMILY_RULES
        .iter()
        .find(|rule| (rule.matches)(id))
        .unwrap_or(&FAMILY_RULES[FAMILY_RULES.len() - 1])
}

/// Resolve the tier to send. `None` asks for the family default.
pub fn resolve_effort(model_id: &str, requested: Option<Effort>) -> Effort {
    let rule = family_for(model_id);
    requested.map_or(rule.default, |effort| rule.coerce(effort))
}
