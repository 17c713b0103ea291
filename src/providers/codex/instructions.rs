use std::collections::HashMap;
use std::path::Path;

use crate::providers::openai::reasoning::family_for;
use crate::Error;

/// Vendor instruction prompts for the Codex backend, keyed by model family.
///
/// The backend rejects requests whose `instructions` differ from the
/// published prompt for the model family, so these are supplied by the
/// embedding application rather than written by the caller.
#[derive(Debug, Clone, Default)]
pub struct CodexInstructions {
    prompts: HashMap<String, String>,
}

impl CodexInstructions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the prompt for `family` (e.g. `gpt-5.1`, `codex-max`).
    pub fn with(mut self, family: impl Into<String>, prompt: impl Into<String>) -> Self {
        self.insert(family, prompt);
        self
    }

    pub fn insert(&mut self, family: impl Into<String>, prompt: impl Into<String>) {
        self.prompts.insert(family.into(), prompt.into());
    }

    /// Load every `<family>.md` file in `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::missing_asset(format!("{}: {e}", dir.display()))
        })?;

        let mut instructions = Self::new();
        for entry in entries {
            let path = entry
                .map_err(|e| Error::missing_asset(format!("{}: {e}", dir.display())))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(family) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let prompt = std::fs::read_to_string(&path)
                .map_err(|e| Error::missing_asset(format!("{}: {e}", path.display())))?;
            instructions.insert(family, prompt);
        }
        tracing::debug!(
            dir = %dir.display(),
            families = instructions.len(),
            "loaded codex instructions"
        );
        Ok(instructions)
    }

    /// The prompt for `model_id`'s family.
    pub fn for_model(&self, model_id: &str) -> Result<&str, Error> {
        let family = family_for(model_id).prompt;
        self.prompts
            .get(family)
            .map(String::as_str)
            .ok_or_else(|| Error::missing_asset(format!("codex instructions for {family}")))
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}
