use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque user identifier as issued by the account system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of one batch run; doubles as the batch webhook idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    /// Fresh random batch id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named category of embedding. Each kind has its own fixed dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorKind {
    Requirements,
    Offerings,
    Skills,
    Industry,
    Stage,
    Culture,
}

impl VectorKind {
    pub const ALL: [VectorKind; 6] = [
        VectorKind::Requirements,
        VectorKind::Offerings,
        VectorKind::Skills,
        VectorKind::Industry,
        VectorKind::Stage,
        VectorKind::Culture,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VectorKind::Requirements => "requirements",
            VectorKind::Offerings => "offerings",
            VectorKind::Skills => "skills",
            VectorKind::Industry => "industry",
            VectorKind::Stage => "stage",
            VectorKind::Culture => "culture",
        }
    }
}

impl fmt::Display for VectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "requirements" => Ok(VectorKind::Requirements),
            "offerings" => Ok(VectorKind::Offerings),
            "skills" => Ok(VectorKind::Skills),
            "industry" => Ok(VectorKind::Industry),
            "stage" => Ok(VectorKind::Stage),
            "culture" => Ok(VectorKind::Culture),
            other => Err(format!(
                "Unknown vector kind '{other}'. Expected one of: requirements, offerings, skills, industry, stage, culture"
            )),
        }
    }
}

/// Directionality of a comparison between two users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// What the user needs against what candidates offer.
    RequirementsToOfferings,
    /// What the user offers against what candidates need.
    OfferingsToRequirements,
}

impl MatchType {
    pub const ALL: [MatchType; 2] = [
        MatchType::RequirementsToOfferings,
        MatchType::OfferingsToRequirements,
    ];

    /// The match type stored on the counterpart's side of a pair.
    pub fn reciprocal(self) -> MatchType {
        match self {
            MatchType::RequirementsToOfferings => MatchType::OfferingsToRequirements,
            MatchType::OfferingsToRequirements => MatchType::RequirementsToOfferings,
        }
    }

    /// Pairs of (user-side kind, candidate-side kind) compared for this direction.
    ///
    /// The first pair is the primary dimension; the rest are shared kinds
    /// compared like-for-like.
    pub fn dimension_pairs(self) -> [(VectorKind, VectorKind); 5] {
        let primary = match self {
            MatchType::RequirementsToOfferings => (VectorKind::Requirements, VectorKind::Offerings),
            MatchType::OfferingsToRequirements => (VectorKind::Offerings, VectorKind::Requirements),
        };
        [
            primary,
            (VectorKind::Skills, VectorKind::Skills),
            (VectorKind::Industry, VectorKind::Industry),
            (VectorKind::Stage, VectorKind::Stage),
            (VectorKind::Culture, VectorKind::Culture),
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::RequirementsToOfferings => "requirements_to_offerings",
            MatchType::OfferingsToRequirements => "offerings_to_requirements",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "requirements_to_offerings" | "requirements" | "r2o" => {
                Ok(MatchType::RequirementsToOfferings)
            }
            "offerings_to_requirements" | "offerings" | "o2r" => {
                Ok(MatchType::OfferingsToRequirements)
            }
            other => Err(format!(
                "Unknown match type '{other}'. Expected requirements_to_offerings or offerings_to_requirements"
            )),
        }
    }
}

/// Discrete match quality bucket. Ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Poor => "poor",
            Tier::Fair => "fair",
            Tier::Good => "good",
            Tier::Excellent => "excellent",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sentiment tag produced by a classifier. The adjuster only looks at this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
