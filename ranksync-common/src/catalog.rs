//! Catalog domain types shared by storage and the ranking-service clients
//!
//! Remote services spell characteristics, difficulties and statuses in their
//! own ways. Every parser here returns `None` for values it does not know, so
//! a single unexpected record can be skipped instead of failing a whole batch.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Beatmap characteristic (game mode a difficulty is authored for)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Characteristic {
    Standard,
    OneSaber,
    NoArrows,
    #[serde(rename = "90Degree")]
    Degree90,
    #[serde(rename = "360Degree")]
    Degree360,
    Lightshow,
    Lawless,
    Legacy,
}

impl Characteristic {
    pub const ALL: [Characteristic; 8] = [
        Characteristic::Standard,
        Characteristic::OneSaber,
        Characteristic::NoArrows,
        Characteristic::Degree90,
        Characteristic::Degree360,
        Characteristic::Lightshow,
        Characteristic::Lawless,
        Characteristic::Legacy,
    ];

    /// Name as stored in the `difficulties.characteristic` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Characteristic::Standard => "Standard",
            Characteristic::OneSaber => "OneSaber",
            Characteristic::NoArrows => "NoArrows",
            Characteristic::Degree90 => "90Degree",
            Characteristic::Degree360 => "360Degree",
            Characteristic::Lightshow => "Lightshow",
            Characteristic::Lawless => "Lawless",
            Characteristic::Legacy => "Legacy",
        }
    }

    /// Parse a bare mode name (`Standard`, `90Degree`, ...).
    ///
    /// Matching is case-insensitive. Mod-created characteristics return `None`.
    pub fn from_mode_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))
    }

    /// Parse a ScoreSaber style game mode (`SoloStandard`, `Solo90Degree`, ...)
    pub fn from_game_mode(game_mode: &str) -> Option<Self> {
        let name = game_mode.strip_prefix("Solo").unwrap_or(game_mode);
        Self::from_mode_name(name)
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Difficulty tier within a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DifficultyTier {
    Easy,
    Normal,
    Hard,
    Expert,
    ExpertPlus,
}

impl DifficultyTier {
    pub const ALL: [DifficultyTier; 5] = [
        DifficultyTier::Easy,
        DifficultyTier::Normal,
        DifficultyTier::Hard,
        DifficultyTier::Expert,
        DifficultyTier::ExpertPlus,
    ];

    /// Name as stored in the `difficulties.difficulty` column
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyTier::Easy => "Easy",
            DifficultyTier::Normal => "Normal",
            DifficultyTier::Hard => "Hard",
            DifficultyTier::Expert => "Expert",
            DifficultyTier::ExpertPlus => "ExpertPlus",
        }
    }

    /// Numeric rank used by the game (1, 3, 5, 7, 9)
    pub fn code(&self) -> i64 {
        match self {
            DifficultyTier::Easy => 1,
            DifficultyTier::Normal => 3,
            DifficultyTier::Hard => 5,
            DifficultyTier::Expert => 7,
            DifficultyTier::ExpertPlus => 9,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.code() == code)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for DifficultyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ranking status of a leaderboard as reported by a ranking service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RankStatus {
    Unranked,
    Nominated,
    Qualified,
    Ranked,
}

impl RankStatus {
    /// Map a numeric status code (0 unranked, 1 nominated, 2 qualified, 3 ranked).
    ///
    /// Every other code (unrankable, outdated, event-only, ...) collapses to
    /// `Unranked` and never to `Qualified` or `Ranked`.
    pub fn from_status_code(code: i64) -> Self {
        match code {
            1 => RankStatus::Nominated,
            2 => RankStatus::Qualified,
            3 => RankStatus::Ranked,
            _ => RankStatus::Unranked,
        }
    }

    /// Map a pair of boolean flags (services that expose `ranked` / `qualified`)
    pub fn from_flags(ranked: bool, qualified: bool) -> Self {
        if ranked {
            RankStatus::Ranked
        } else if qualified {
            RankStatus::Qualified
        } else {
            RankStatus::Unranked
        }
    }
}

/// Ranking service a catalog column set belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    ScoreSaber,
    BeatLeader,
}

/// Column names owned by one ranking service on `maps` and `difficulties`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceColumns {
    pub map_qualified: &'static str,
    pub map_qualified_at: &'static str,
    pub map_ranked: &'static str,
    pub map_ranked_at: &'static str,
    pub diff_stars: &'static str,
    pub diff_qualified_at: &'static str,
    pub diff_ranked_at: &'static str,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::ScoreSaber, SourceKind::BeatLeader];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::ScoreSaber => "scoresaber",
            SourceKind::BeatLeader => "beatleader",
        }
    }

    /// Storage columns written by this source's loops.
    ///
    /// Column names are compile-time constants, so building SQL from them
    /// with `format!` cannot inject anything.
    pub fn columns(&self) -> SourceColumns {
        match self {
            SourceKind::ScoreSaber => SourceColumns {
                map_qualified: "ss_qualified",
                map_qualified_at: "ss_qualified_at",
                map_ranked: "ss_ranked",
                map_ranked_at: "ss_ranked_at",
                diff_stars: "ss_stars",
                diff_qualified_at: "ss_qualified_at",
                diff_ranked_at: "ss_ranked_at",
            },
            SourceKind::BeatLeader => SourceColumns {
                map_qualified: "bl_qualified",
                map_qualified_at: "bl_qualified_at",
                map_ranked: "bl_ranked",
                map_ranked_at: "bl_ranked_at",
                diff_stars: "bl_stars",
                diff_qualified_at: "bl_qualified_at",
                diff_ranked_at: "bl_ranked_at",
            },
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
