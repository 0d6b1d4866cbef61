//! Human-readable match explanations.

use crate::matching::DimensionScore;
use crate::persona::TextGenerator;
use crate::types::Tier;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const FALLBACK: &str = "Compatible based on profile analysis.";
const MAX_HIGHLIGHTS: usize = 3;
const DEFAULT_POLISH_TIMEOUT: Duration = Duration::from_secs(2);

/// Explanation built only from the tier and the breakdown.
///
/// Names up to three dimensions at or above `highlight_floor`, strongest
/// first.
pub fn template_explanation(tier: Tier, dimensions: &[DimensionScore], highlight_floor: f64) -> String {
    let mut parts: Vec<String> = Vec::new();
    match tier {
        Tier::Excellent => parts.push("Excellent match across all dimensions.".to_string()),
        Tier::Good => parts.push("Strong compatibility.".to_string()),
        Tier::Fair | Tier::Poor => {}
    }

    let mut strong: Vec<&DimensionScore> = dimensions
        .iter()
        .filter(|d| d.similarity >= highlight_floor)
        .collect();
    strong.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.kind.cmp(&b.kind))
    });
    if !strong.is_empty() {
        let names: Vec<&str> = strong
            .iter()
            .take(MAX_HIGHLIGHTS)
            .map(|d| d.kind.as_str())
            .collect();
        parts.push(format!("Best alignment: {}.", names.join(", ")));
    }

    if parts.is_empty() {
        FALLBACK.to_string()
    } else {
        parts.join(" ")
    }
}

/// Template explanations, optionally polished by a text generator.
#[derive(Clone)]
pub struct Explainer {
    generator: Option<Arc<dyn TextGenerator>>,
    polish: bool,
    highlight_floor: f64,
    timeout: Duration,
}

impl Explainer {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, polish: bool, highlight_floor: f64) -> Self {
        Self {
            generator,
            polish,
            highlight_floor,
            timeout: DEFAULT_POLISH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn explain(&self, tier: Tier, dimensions: &[DimensionScore]) -> String {
        let template = template_explanation(tier, dimensions, self.highlight_floor);
        let Some(generator) = self.generator.as_ref().filter(|_| self.polish) else {
            return template;
        };
        self.polish_within(Arc::clone(generator), &template)
            .unwrap_or(template)
    }

    /// Run the generator on its own thread and give up after `timeout`.
    /// A generator that overruns finishes in the background, unread.
    fn polish_within(&self, generator: Arc<dyn TextGenerator>, template: &str) -> Option<String> {
        let (tx, rx) = mpsc::sync_channel(1);
        let draft = template.to_string();
        let spawned = thread::Builder::new()
            .name("explain-polish".to_string())
            .spawn(move || {
                let _ = tx.send(generator.polish_explanation(&draft));
            });
        if let Err(e) = spawned {
            debug!(error = %e, "could not start polishing, using template");
            return None;
        }

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(polished)) if !polished.trim().is_empty() => Some(polished),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                debug!(error = %e, "explanation polishing unavailable, using template");
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "explanation polishing timed out, using template"
                );
                None
            }
        }
    }
}
