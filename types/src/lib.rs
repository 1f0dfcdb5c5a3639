//! Core domain types for Lingqian.
//!
//! This crate contains pure domain types with no IO, no async, and minimal
//! dependencies. Field invariants live in the serde boundary: a
//! [`FortuneRecord`] that deserializes successfully is valid by construction,
//! so no separate validation pass exists (or is needed) downstream.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// NonEmpty Text
// ============================================================================

/// A string guaranteed to be non-empty (after trimming).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyText(String);

#[derive(Debug, Error)]
#[error("text field must not be empty")]
pub struct EmptyTextError;

impl NonEmptyText {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyTextError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyTextError)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for NonEmptyText {
    type Error = EmptyTextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for NonEmptyText {
    type Error = EmptyTextError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyText> for String {
    fn from(value: NonEmptyText) -> Self {
        value.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Luck Level
// ============================================================================

/// The closed set of luck tiers a fortune can carry.
///
/// Serialized as the canonical Chinese labels; any other value is rejected
/// at the deserialization boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LuckLevel {
    /// 上上签
    #[serde(rename = "上上签")]
    GreatBlessing,
    /// 上吉签
    #[serde(rename = "上吉签")]
    UpperBlessing,
    /// 中吉签
    #[serde(rename = "中吉签")]
    MiddleBlessing,
    /// 中平签
    #[serde(rename = "中平签")]
    Neutral,
    /// 下下签
    #[serde(rename = "下下签")]
    GreatMisfortune,
}

const LUCK_LEVEL_LABELS: &[&str] = &["上上签", "上吉签", "中吉签", "中平签", "下下签"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid luck level '{raw}'; expected one of: {expected:?}")]
pub struct LuckLevelParseError {
    raw: String,
    expected: &'static [&'static str],
}

impl LuckLevel {
    /// Every level, in canonical (best to worst) order.
    pub const ALL: [LuckLevel; 5] = [
        LuckLevel::GreatBlessing,
        LuckLevel::UpperBlessing,
        LuckLevel::MiddleBlessing,
        LuckLevel::Neutral,
        LuckLevel::GreatMisfortune,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LuckLevel::GreatBlessing => "上上签",
            LuckLevel::UpperBlessing => "上吉签",
            LuckLevel::MiddleBlessing => "中吉签",
            LuckLevel::Neutral => "中平签",
            LuckLevel::GreatMisfortune => "下下签",
        }
    }
}

impl FromStr for LuckLevel {
    type Err = LuckLevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "上上签" => Ok(LuckLevel::GreatBlessing),
            "上吉签" => Ok(LuckLevel::UpperBlessing),
            "中吉签" => Ok(LuckLevel::MiddleBlessing),
            "中平签" => Ok(LuckLevel::Neutral),
            "下下签" => Ok(LuckLevel::GreatMisfortune),
            other => Err(LuckLevelParseError {
                raw: other.to_string(),
                expected: LUCK_LEVEL_LABELS,
            }),
        }
    }
}

impl fmt::Display for LuckLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Poem
// ============================================================================

/// A fortune poem: exactly two non-empty lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Poem([NonEmptyText; 2]);

#[derive(Debug, Error)]
pub enum PoemError {
    #[error("poem must have exactly 2 lines, got {0}")]
    LineCount(usize),
    #[error("poem line must not be empty")]
    EmptyLine(#[from] EmptyTextError),
}

impl Poem {
    pub fn new(
        first: impl Into<String>,
        second: impl Into<String>,
    ) -> Result<Self, PoemError> {
        Ok(Self([
            NonEmptyText::new(first)?,
            NonEmptyText::new(second)?,
        ]))
    }

    #[must_use]
    pub fn lines(&self) -> [&str; 2] {
        [self.0[0].as_str(), self.0[1].as_str()]
    }
}

impl TryFrom<Vec<String>> for Poem {
    type Error = PoemError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        let [first, second]: [String; 2] = value
            .try_into()
            .map_err(|v: Vec<String>| PoemError::LineCount(v.len()))?;
        Poem::new(first, second)
    }
}

impl From<Poem> for Vec<String> {
    fn from(value: Poem) -> Self {
        let [first, second] = value.0;
        vec![first.into_inner(), second.into_inner()]
    }
}

// ============================================================================
// Fortune Record
// ============================================================================

/// Per-domain guidance attached to a fortune. All four fields are required
/// and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advice {
    pub career: NonEmptyText,
    pub love: NonEmptyText,
    pub health: NonEmptyText,
    pub wealth: NonEmptyText,
}

/// An immutable fortune, the unit of output of the whole system.
///
/// Deserialization enforces every invariant: the level is one of the five
/// [`LuckLevel`] values, the poem has exactly two lines, and every text
/// field is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FortuneRecord {
    pub level: LuckLevel,
    /// Short philosophical title, conventionally four characters.
    pub title: NonEmptyText,
    pub poem: Poem,
    /// Colloquial explanation of the poem.
    pub interpretation: NonEmptyText,
    pub advice: Advice,
}

// ============================================================================
// Theme
// ============================================================================

/// A static thematic bias applied to a generation request to diversify
/// output tone. Themes are process-wide constants; `levels` restricts which
/// luck tiers the theme is allowed to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub name: &'static str,
    pub direction: &'static str,
    pub keywords: &'static str,
    pub levels: &'static [LuckLevel],
}
