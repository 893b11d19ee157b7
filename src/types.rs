//! Common types used throughout the ranking pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External identifier of a player
pub type PlayerId = u64;

/// External identifier of a comparison subject (a beatmap)
pub type SubjectId = u64;

/// Game discipline; every gamemode is ranked independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gamemode {
    Catch,
    Taiko,
    Mania,
    Osu,
}

impl Gamemode {
    /// The fixed processing order of a full run
    pub const ALL: [Gamemode; 4] = [
        Gamemode::Catch,
        Gamemode::Taiko,
        Gamemode::Mania,
        Gamemode::Osu,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Gamemode::Catch => "catch",
            Gamemode::Taiko => "taiko",
            Gamemode::Mania => "mania",
            Gamemode::Osu => "osu",
        }
    }
}

impl fmt::Display for Gamemode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown gamemode: {0}")]
pub struct UnknownGamemode(pub String);

impl FromStr for Gamemode {
    type Err = UnknownGamemode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Gamemode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| UnknownGamemode(s.to_string()))
    }
}

/// A single gameplay modifier, e.g. `HD` with optional settings
///
/// Settings are kept as their compact JSON text so that the modifier has
/// well-defined equality, ordering and hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawModifier", into = "RawModifier")]
pub struct Modifier {
    pub acronym: String,
    settings: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct RawModifier {
    acronym: String,
    #[serde(default)]
    settings: Option<serde_json::Value>,
}

impl From<RawModifier> for Modifier {
    fn from(raw: RawModifier) -> Self {
        Self {
            acronym: raw.acronym,
            settings: raw
                .settings
                .filter(|value| !value.is_null())
                .map(|value| value.to_string()),
        }
    }
}

impl From<Modifier> for RawModifier {
    fn from(modifier: Modifier) -> Self {
        Self {
            acronym: modifier.acronym,
            settings: modifier
                .settings
                .and_then(|text| serde_json::from_str(&text).ok()),
        }
    }
}

impl Modifier {
    pub fn new(acronym: impl Into<String>) -> Self {
        Self {
            acronym: acronym.into(),
            settings: None,
        }
    }

    pub fn with_settings(acronym: impl Into<String>, settings: serde_json::Value) -> Self {
        RawModifier {
            acronym: acronym.into(),
            settings: Some(settings),
        }
        .into()
    }

    /// Compact JSON text of the settings, if any
    pub fn settings(&self) -> Option<&str> {
        self.settings.as_deref()
    }
}

/// Ordered list of modifiers a score was set with
///
/// Order is significant for equality: `[HD, DT]` and `[DT, HD]` are distinct
/// unless [`ModifierSet::canonical`] is applied first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModifierSet(pub Vec<Modifier>);

impl ModifierSet {
    pub fn new(modifiers: Vec<Modifier>) -> Self {
        Self(modifiers)
    }

    /// Order-independent form of this set
    pub fn canonical(&self) -> Self {
        let mut modifiers = self.0.clone();
        modifiers.sort();
        Self(modifiers)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ModifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("NM");
        }
        for modifier in &self.0 {
            f.write_str(&modifier.acronym)?;
        }
        Ok(())
    }
}

/// Composite key under which scores are mutually comparable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey {
    pub subject: SubjectId,
    pub modifiers: ModifierSet,
}

impl ContextKey {
    pub fn new(subject: SubjectId, modifiers: ModifierSet) -> Self {
        Self { subject, modifiers }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.subject, self.modifiers)
    }
}

/// One row of a score events file: `[player, subject, modifiers, score]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ScoreEventRow", into = "ScoreEventRow")]
pub struct ScoreEvent {
    pub player: PlayerId,
    pub subject: SubjectId,
    pub modifiers: ModifierSet,
    pub score: f64,
}

#[derive(Serialize, Deserialize)]
struct ScoreEventRow(PlayerId, SubjectId, ModifierSet, f64);

impl From<ScoreEventRow> for ScoreEvent {
    fn from(ScoreEventRow(player, subject, modifiers, score): ScoreEventRow) -> Self {
        Self {
            player,
            subject,
            modifiers,
            score,
        }
    }
}

impl From<ScoreEvent> for ScoreEventRow {
    fn from(event: ScoreEvent) -> Self {
        ScoreEventRow(event.player, event.subject, event.modifiers, event.score)
    }
}

impl ScoreEvent {
    pub fn new(player: PlayerId, subject: SubjectId, modifiers: ModifierSet, score: f64) -> Self {
        Self {
            player,
            subject,
            modifiers,
            score,
        }
    }

    pub fn context_key(&self) -> ContextKey {
        ContextKey::new(self.subject, self.modifiers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gamemode_round_trip_names() {
        for mode in Gamemode::ALL {
            assert_eq!(mode.as_str().parse::<Gamemode>().unwrap(), mode);
        }
        assert!("fruits".parse::<Gamemode>().is_err());
        assert_eq!(Gamemode::ALL[0], Gamemode::Catch);
        assert_eq!(Gamemode::ALL[3], Gamemode::Osu);
    }

    #[test]
    fn test_score_event_reads_array_rows() {
        let json = r#"[123, 456, [{"acronym": "HD", "settings": null}, {"acronym": "DT"}], 987654]"#;
        let event: ScoreEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.player, 123);
        assert_eq!(event.subject, 456);
        assert_eq!(event.modifiers.0.len(), 2);
        assert_eq!(event.modifiers.0[0], Modifier::new("HD"));
        assert_eq!(event.score, 987654.0);
    }

    #[test]
    fn test_modifier_settings_equality() {
        let a = Modifier::with_settings("DT", serde_json::json!({"speed_change": 1.2}));
        let b: Modifier =
            serde_json::from_str(r#"{"acronym": "DT", "settings": {"speed_change": 1.2}}"#)
                .unwrap();
        let c = Modifier::new("DT");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.settings(), Some(r#"{"speed_change":1.2}"#));
    }

    #[test]
    fn test_modifier_set_order_sensitivity() {
        let hd_dt = ModifierSet::new(vec![Modifier::new("HD"), Modifier::new("DT")]);
        let dt_hd = ModifierSet::new(vec![Modifier::new("DT"), Modifier::new("HD")]);

        assert_ne!(hd_dt, dt_hd);
        assert_eq!(hd_dt.canonical(), dt_hd.canonical());
        assert_eq!(hd_dt.to_string(), "HDDT");
        assert_eq!(ModifierSet::default().to_string(), "NM");
    }
}
