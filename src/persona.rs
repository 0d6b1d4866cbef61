//! Profile text composition.
//!
//! A [`TextGenerator`] may rewrite a user's answers into a persona statement
//! per kind and polish match explanations. It is an external collaborator:
//! whenever it fails, returns nothing, or is absent, the template path
//! composes text from the answers alone.

use crate::accounts::Account;
use crate::types::{UserId, VectorKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum TextGenerationError {
    #[error("Text generator unavailable: {0}")]
    Unavailable(String),

    #[error("Text generator refused the request: {0}")]
    Rejected(String),
}

/// Pluggable text function (typically an LLM).
pub trait TextGenerator: Send + Sync {
    /// Rewrite the answers for one kind into a single profile statement.
    fn persona_text(
        &self,
        user: &UserId,
        kind: VectorKind,
        answers: &[String],
    ) -> Result<String, TextGenerationError>;

    /// Rephrase a template explanation.
    fn polish_explanation(&self, explanation: &str) -> Result<String, TextGenerationError>;
}

/// Join answers into one statement without adding content.
pub fn template_text(answers: &[String]) -> String {
    answers
        .iter()
        .map(|answer| answer.trim().trim_end_matches(['.', ';', ',']))
        .filter(|answer| !answer.is_empty())
        .collect::<Vec<_>>()
        .join(". ")
}

#[derive(Clone, Default)]
pub struct PersonaComposer {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl PersonaComposer {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { generator }
    }

    pub fn generator(&self) -> Option<&Arc<dyn TextGenerator>> {
        self.generator.as_ref()
    }

    /// Regenerate profile text for every kind the account has answers for.
    pub fn profile_texts(&self, account: &Account) -> BTreeMap<VectorKind, String> {
        account
            .texts_by_kind()
            .into_iter()
            .map(|(kind, answers)| (kind, self.compose(&account.user_id, kind, &answers)))
            .filter(|(_, text)| !text.trim().is_empty())
            .collect()
    }

    fn compose(&self, user: &UserId, kind: VectorKind, answers: &[String]) -> String {
        let Some(generator) = &self.generator else {
            return template_text(answers);
        };

        match generator.persona_text(user, kind, answers) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!(user_id = %user, %kind, "text generator returned nothing, using template");
                template_text(answers)
            }
            Err(e) => {
                warn!(user_id = %user, %kind, error = %e, "text generator failed, using template");
                template_text(answers)
            }
        }
    }
}
