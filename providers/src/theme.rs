//! Thematic bias selection.
//!
//! Left to its own devices the generation service regresses to the mean and
//! produces near-identical fortunes; each request therefore carries one of a
//! fixed set of themes that steers tone and restricts the luck tiers the
//! service may answer with.

use lingqian_types::{LuckLevel, Theme};

/// Fixed table of themes. Read-only, never mutated at runtime.
pub const THEMES: [Theme; 5] = [
    Theme {
        name: "Bold Action",
        direction: "Encourage bold progress. The time is now. Take risks.",
        keywords: "Courage, Breakthrough, Initiative, Speed",
        levels: &[LuckLevel::GreatBlessing, LuckLevel::UpperBlessing],
    },
    Theme {
        name: "Extreme Caution",
        direction: "Warn against risks. Stay put and conserve energy. Danger ahead.",
        keywords: "Patience, Defense, Observation, Retreat",
        levels: &[LuckLevel::GreatMisfortune, LuckLevel::Neutral],
    },
    Theme {
        name: "Steady Growth",
        direction: "Focus on slow, steady accumulation. Hard work pays off. No shortcuts.",
        keywords: "Perseverance, Learning, Steadiness, Diligence",
        levels: &[LuckLevel::MiddleBlessing, LuckLevel::UpperBlessing],
    },
    Theme {
        name: "Harmony & People",
        direction: "Seek harmony in relationships. Rely on others. Don't go it alone.",
        keywords: "Harmony, Peace, Compromise, Networking",
        levels: &[LuckLevel::Neutral, LuckLevel::MiddleBlessing],
    },
    Theme {
        name: "Windfall / Serendipity",
        direction: "Unexpected good luck or help from others (Noble People). A surprise awaits.",
        keywords: "Serendipity, Opportunity, Help, Luck",
        levels: &[LuckLevel::GreatBlessing, LuckLevel::UpperBlessing],
    },
];

/// Pick a theme uniformly at random. The table is non-empty by construction,
/// so there is no error case.
#[must_use]
pub fn pick_theme() -> &'static Theme {
    &THEMES[rand::random_range(0..THEMES.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_theme_returns_a_table_entry() {
        for _ in 0..50 {
            let theme = pick_theme();
            assert!(THEMES.iter().any(|t| t == theme));
        }
    }

    #[test]
    fn every_theme_restricts_to_a_nonempty_level_subset() {
        for theme in &THEMES {
            assert!(!theme.levels.is_empty(), "theme {} has no levels", theme.name);
            assert!(theme.levels.len() < LuckLevel::ALL.len());
        }
    }
}
