use crate::config::FeedbackConfig;
use crate::error::{MatchError, MatchResult};
use crate::feedback::{
    AdjustmentStats, FeedbackLog, FeedbackRecord, FeedbackSubmission, FeedbackTarget,
    SentimentClassifier, SentimentGrade,
};
use crate::types::{Sentiment, UserId, VectorKind};
use crate::vector::{VectorStore, nudge};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Own kind moved, and the subject's kind it moves relative to.
const ADJUSTED_PAIRS: [(VectorKind, VectorKind); 2] = [
    (VectorKind::Requirements, VectorKind::Offerings),
    (VectorKind::Offerings, VectorKind::Requirements),
];

/// Applies feedback to stored vectors. Does not touch match records or
/// dirty flags; the next batch that re-matches the user picks it up.
pub struct FeedbackAdjuster {
    vectors: Arc<dyn VectorStore>,
    classifier: Arc<dyn SentimentClassifier>,
    config: FeedbackConfig,
    log: Arc<FeedbackLog>,
}

impl FeedbackAdjuster {
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        classifier: Arc<dyn SentimentClassifier>,
        config: FeedbackConfig,
        log: Arc<FeedbackLog>,
    ) -> Self {
        Self {
            vectors,
            classifier,
            config,
            log,
        }
    }

    pub fn log(&self) -> &Arc<FeedbackLog> {
        &self.log
    }

    /// Signed step for a grade after intensity scaling, clamped to
    /// `max_step`.
    pub fn step_for(&self, grade: SentimentGrade) -> f32 {
        let intensity = if grade.is_intense() {
            self.config.intensity_multiplier
        } else {
            1.0
        };
        let step = match grade {
            SentimentGrade::VeryPositive | SentimentGrade::Positive => {
                self.config.positive_step * intensity
            }
            SentimentGrade::Neutral => 0.0,
            SentimentGrade::Negative | SentimentGrade::VeryNegative => {
                -self.config.negative_step * intensity
            }
        };
        step.clamp(-self.config.max_step, self.config.max_step)
    }

    /// Classify free text and apply it. Classifier failures degrade to
    /// neutral; the submission is always recorded.
    pub fn submit(&self, submission: &FeedbackSubmission) -> MatchResult<FeedbackRecord> {
        let grade = match self.classifier.classify(&submission.text) {
            Ok(grade) => grade,
            Err(e) => {
                warn!(
                    user_id = %submission.user_id,
                    error = %e,
                    "classification failed, treating feedback as neutral"
                );
                SentimentGrade::Neutral
            }
        };
        let step = self.step_for(grade);
        self.apply(
            &submission.user_id,
            &submission.subject_id,
            grade,
            step,
            submission.target,
            &submission.text,
        )
    }

    /// Apply a known sentiment. With `weight` the step is used as given
    /// (direction from the sentiment) instead of the configured steps.
    pub fn apply_feedback(
        &self,
        user: &UserId,
        subject: &UserId,
        sentiment: impl Into<SentimentGrade>,
        weight: Option<f32>,
    ) -> MatchResult<FeedbackRecord> {
        let grade = sentiment.into();
        let step = match weight {
            Some(w) if !(0.0..=1.0).contains(&w) => {
                return Err(MatchError::InvalidProfile {
                    user_id: user.clone(),
                    reason: format!("feedback weight {w} outside [0, 1]"),
                });
            }
            Some(w) => match grade.sentiment() {
                Sentiment::Positive => w,
                Sentiment::Negative => -w,
                Sentiment::Neutral => 0.0,
            },
            None => self.step_for(grade),
        };
        self.apply(user, subject, grade, step, FeedbackTarget::Match, "")
    }

    fn apply(
        &self,
        user: &UserId,
        subject: &UserId,
        grade: SentimentGrade,
        step: f32,
        target: FeedbackTarget,
        raw_text: &str,
    ) -> MatchResult<FeedbackRecord> {
        let mut adjusted = Vec::new();

        // Learning is best effort: the record is kept even when the store is down
        if step != 0.0 && user != subject {
            if let Err(e) = self.nudge_vectors(user, subject, step, &mut adjusted) {
                warn!(
                    user_id = %user,
                    subject_id = %subject,
                    code = %e.status_code(),
                    error = %e,
                    "feedback recorded, vector adjustment skipped"
                );
            }
        }

        let record = FeedbackRecord {
            user_id: user.clone(),
            subject_id: subject.clone(),
            target,
            sentiment: grade.sentiment(),
            grade,
            raw_text: raw_text.to_string(),
            step,
            adjusted,
            created_at: Utc::now(),
        };

        if record.adjusted.is_empty() {
            debug!(user_id = %user, subject_id = %subject, %grade, "feedback recorded without adjustment");
        } else {
            info!(
                user_id = %user,
                subject_id = %subject,
                %grade,
                step,
                kinds = record.adjusted.len(),
                "applied feedback adjustment"
            );
        }
        self.log.append(record.clone());
        Ok(record)
    }

    /// Move the author's vectors relative to the subject's, pushing each
    /// written kind onto `adjusted` as it lands.
    fn nudge_vectors(
        &self,
        user: &UserId,
        subject: &UserId,
        step: f32,
        adjusted: &mut Vec<VectorKind>,
    ) -> MatchResult<()> {
        let ours = self.vectors.vectors_for(user)?;
        let theirs = self.vectors.vectors_for(subject)?;

        for (own_kind, their_kind) in ADJUSTED_PAIRS {
            let (Some(own), Some(toward)) = (ours.get(&own_kind), theirs.get(&their_kind)) else {
                continue;
            };
            if own.values.len() != toward.values.len() {
                warn!(
                    user_id = %user,
                    kind = %own_kind,
                    "skipping adjustment across mismatched dimensions"
                );
                continue;
            }

            let mut moved = own.clone();
            moved.values = nudge(&own.values, &toward.values, step);
            moved.updated_at = Utc::now();
            self.vectors.upsert(moved)?;
            adjusted.push(own_kind);
        }

        if self.config.adjust_both_users && step > 0.0 {
            let reverse = (
                theirs.get(&VectorKind::Requirements),
                ours.get(&VectorKind::Offerings),
            );
            if let (Some(their_needs), Some(our_offer)) = reverse {
                if their_needs.values.len() == our_offer.values.len() {
                    let mut moved = their_needs.clone();
                    moved.values = nudge(&their_needs.values, &our_offer.values, step * 0.5);
                    moved.updated_at = Utc::now();
                    self.vectors.upsert(moved)?;
                    debug!(user_id = %subject, author = %user, "moved subject toward author");
                }
            }
        }
        Ok(())
    }

    pub fn history(&self, user: &UserId) -> Vec<FeedbackRecord> {
        self.log.history(user, self.config.history_limit)
    }

    pub fn adjustment_stats(&self, user: &UserId) -> AdjustmentStats {
        self.log.stats(user, self.config.history_limit)
    }
}
