//! Mentor records and client-side filtering
//!
//! The search page keeps the full mentor list in memory and derives the
//! visible subset from the active filter on every change. [`MentorFilter`]
//! is that derivation: a conjunction of optional predicates.

use crate::{AbroadError, Result};
use serde::{Deserialize, Serialize};

/// Tutor/mentor offering sessions on the marketplace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mentor {
    pub id: i64,
    pub name: String,
    pub university: String,
    pub major: String,
    #[serde(default)]
    pub languages: Vec<String>,
    /// Price per session hour
    pub hourly_rate: f64,
    #[serde(default)]
    pub rating: f32,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Ordering applied after filtering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Keep the input order
    #[default]
    Relevance,
    PriceAsc,
    PriceDesc,
    RatingDesc,
}

impl std::str::FromStr for SortBy {
    type Err = AbroadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "relevance" => Ok(Self::Relevance),
            "price_asc" | "price" => Ok(Self::PriceAsc),
            "price_desc" => Ok(Self::PriceDesc),
            "rating" | "rating_desc" => Ok(Self::RatingDesc),
            other => Err(AbroadError::ValidationError(format!("unknown sort order: {other}"))),
        }
    }
}

/// Predicates over a mentor list. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MentorFilter {
    pub major: Option<String>,
    pub university: Option<String>,
    pub language: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Free text matched against name, bio, university and major
    pub text: Option<String>,
}

impl MentorFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn major(mut self, major: impl Into<String>) -> Self {
        self.major = non_blank(major.into());
        self
    }

    pub fn university(mut self, university: impl Into<String>) -> Self {
        self.university = non_blank(university.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = non_blank(language.into());
        self
    }

    pub fn price_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = non_blank(text.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Reject price ranges that can never match
    pub fn validate(&self) -> Result<()> {
        for price in [self.min_price, self.max_price].into_iter().flatten() {
            if !price.is_finite() || price < 0.0 {
                return Err(AbroadError::ValidationError(format!(
                    "invalid price bound: {price}"
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(AbroadError::ValidationError(format!(
                    "min price {min} exceeds max price {max}"
                )));
            }
        }
        Ok(())
    }

    /// True when every set predicate holds for `mentor`
    pub fn matches(&self, mentor: &Mentor) -> bool {
        let major = self
            .major
            .as_deref()
            .map_or(true, |m| contains_ci(&mentor.major, m));
        let university = self
            .university
            .as_deref()
            .map_or(true, |u| contains_ci(&mentor.university, u));
        let language = self.language.as_deref().map_or(true, |l| {
            mentor.languages.iter().any(|known| known.eq_ignore_ascii_case(l.trim()))
        });
        let min = self.min_price.map_or(true, |min| mentor.hourly_rate >= min);
        let max = self.max_price.map_or(true, |max| mentor.hourly_rate <= max);
        let text = self.text.as_deref().map_or(true, |t| {
            contains_ci(&mentor.name, t)
                || contains_ci(&mentor.university, t)
                || contains_ci(&mentor.major, t)
                || mentor.bio.as_deref().is_some_and(|bio| contains_ci(bio, t))
        });

        major && university && language && min && max && text
    }

    /// Filter `mentors`, preserving their order
    pub fn apply<'a>(&self, mentors: &'a [Mentor]) -> Vec<&'a Mentor> {
        mentors.iter().filter(|m| self.matches(m)).collect()
    }

    /// Filter then sort
    pub fn apply_sorted<'a>(&self, mentors: &'a [Mentor], sort: SortBy) -> Vec<&'a Mentor> {
        let mut visible = self.apply(mentors);
        match sort {
            SortBy::Relevance => {}
            SortBy::PriceAsc => visible.sort_by(|a, b| a.hourly_rate.total_cmp(&b.hourly_rate)),
            SortBy::PriceDesc => visible.sort_by(|a, b| b.hourly_rate.total_cmp(&a.hourly_rate)),
            SortBy::RatingDesc => visible.sort_by(|a, b| b.rating.total_cmp(&a.rating)),
        }
        visible
    }
}

/// Server-side search, `GET /api/v1/mentors/search`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MentorSearchQuery {
    pub filter: MentorFilter,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl MentorSearchQuery {
    pub fn new(filter: MentorFilter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query string pairs; unset predicates are omitted
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let f = &self.filter;
        let mut pairs = Vec::new();
        if let Some(major) = &f.major {
            pairs.push(("major", major.clone()));
        }
        if let Some(university) = &f.university {
            pairs.push(("university", university.clone()));
        }
        if let Some(language) = &f.language {
            pairs.push(("language", language.clone()));
        }
        if let Some(min) = f.min_price {
            pairs.push(("min_price", min.to_string()));
        }
        if let Some(max) = f.max_price {
            pairs.push(("max_price", max.to_string()));
        }
        if let Some(text) = &f.text {
            pairs.push(("q", text.clone()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset", offset.to_string()));
        }
        pairs
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack
        .to_lowercase()
        .contains(needle.trim().to_lowercase().as_str())
}
