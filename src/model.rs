use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A request to harvest one URL. Created on submit and never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub url: String,
    pub requested_at: DateTime<Utc>,
}

impl ExtractionRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            requested_at: Utc::now(),
        }
    }
}

/// Where a URL points to. `Website` is the catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    #[default]
    Website,
    Youtube,
    Tiktok,
    Instagram,
    Facebook,
    X,
}

impl PlatformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Website => "website",
            PlatformKind::Youtube => "youtube",
            PlatformKind::Tiktok => "tiktok",
            PlatformKind::Instagram => "instagram",
            PlatformKind::Facebook => "facebook",
            PlatformKind::X => "x",
        }
    }

    pub fn is_video(&self) -> bool {
        !matches!(self, PlatformKind::Website)
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named amount, used for both ingredients and nutrition facts.
///
/// `quantity` and `unit` are only present when the source text states them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based and gap-free within a draft
    pub step_number: u32,
    pub instructions: String,
}

/// The normalized recipe produced by a successful job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RecipeDraft {
    pub title: String,
    pub servings: Option<f64>,
    /// Minutes
    pub preparation_time: Option<f64>,
    pub description: String,
    /// Page image URL or an opaque blob-store reference for video covers
    pub image_ref: Option<String>,
    pub ingredients: Vec<Quantity>,
    pub steps: Vec<Step>,
    pub nutrition: Vec<Quantity>,
}
