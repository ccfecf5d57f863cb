use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::badges::BadgeType;
use crate::error::ProgressError;

/// Points needed per level: level = floor(total_score / 50) + 1
pub const POINTS_PER_LEVEL: u64 = 50;

// ==================== CATEGORY ====================

/// Key of a category outside the known set. Only built by `Category::parse`,
/// so it is always trimmed, lower-case and never a known category name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CustomCategory(String);

impl CustomCategory {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Operation category used to partition statistics.
/// Unknown keys are kept as `Other` so new game modes work without a schema change.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    /// Multi-term problems
    SuperMode,
    /// Missing-operand problems
    Detective,
    Other(CustomCategory),
}

impl Category {
    pub const KNOWN: [Category; 6] = [
        Category::Addition,
        Category::Subtraction,
        Category::Multiplication,
        Category::Division,
        Category::SuperMode,
        Category::Detective,
    ];

    /// Parse a category key, case-insensitive
    pub fn parse(key: &str) -> Self {
        let key = key.trim().to_lowercase();
        match key.as_str() {
            "addition" => Category::Addition,
            "subtraction" => Category::Subtraction,
            "multiplication" => Category::Multiplication,
            "division" => Category::Division,
            "supermode" | "super_mode" => Category::SuperMode,
            "detective" => Category::Detective,
            _ => Category::Other(CustomCategory(key)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Category::Addition => "addition",
            Category::Subtraction => "subtraction",
            Category::Multiplication => "multiplication",
            Category::Division => "division",
            Category::SuperMode => "supermode",
            Category::Detective => "detective",
            Category::Other(key) => key.as_str(),
        }
    }
}

impl From<&str> for Category {
    fn from(key: &str) -> Self {
        Category::parse(key)
    }
}

impl From<String> for Category {
    fn from(key: String) -> Self {
        Category::parse(&key)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.as_str().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==================== RECORD PARTS ====================

/// Per-category counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationStats {
    pub score: u64,
    pub questions_answered: u32,
    pub correct_answers: u32,
}

/// Earned state of a single streak badge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BadgeRecord {
    pub earned: bool,
    pub count: u32,
    /// Epoch milliseconds in the snapshot
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_earned: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// Player settings. Keys this module does not interpret are carried in `extra`
/// so a newer client can store options without losing them on the next save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub difficulty: Difficulty,
    pub sound_enabled: bool,
    pub music_enabled: bool,
    pub animation_speed: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::Medium,
            sound_enabled: true,
            music_enabled: true,
            animation_speed: "normal".to_string(),
            extra: Map::new(),
        }
    }
}

// ==================== PLAYER RECORD ====================

/// Cumulative progress for one player. Mutated only through its methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerRecord {
    total_score: u64,
    level: u32,
    streak: u32,
    best_streak: u32,
    operation_stats: BTreeMap<Category, OperationStats>,
    achievements: BTreeSet<String>,
    badges: BTreeMap<BadgeType, BadgeRecord>,
    settings: Settings,
}

impl Default for PlayerRecord {
    fn default() -> Self {
        Self {
            total_score: 0,
            level: 1,
            streak: 0,
            best_streak: 0,
            operation_stats: BTreeMap::new(),
            achievements: BTreeSet::new(),
            badges: BadgeType::ALL
                .iter()
                .map(|badge| (*badge, BadgeRecord::default()))
                .collect(),
            settings: Settings::default(),
        }
    }
}

fn level_for_score(total_score: u64) -> u32 {
    u32::try_from(total_score / POINTS_PER_LEVEL)
        .unwrap_or(u32::MAX - 1)
        .saturating_add(1)
}

/// Percentage rounded to two decimals, 0 when nothing was answered
fn accuracy_percent(correct: u32, answered: u32) -> f64 {
    if answered == 0 {
        return 0.0;
    }
    let pct = f64::from(correct) / f64::from(answered) * 100.0;
    (pct * 100.0).round() / 100.0
}

impl PlayerRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_score(&self) -> u64 {
        self.total_score
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn best_streak(&self) -> u32 {
        self.best_streak
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn achievements(&self) -> &BTreeSet<String> {
        &self.achievements
    }

    pub fn operation_stats(&self) -> &BTreeMap<Category, OperationStats> {
        &self.operation_stats
    }

    /// Stats for a category; zeroed if the category has never been played
    pub fn stats_for(&self, category: &Category) -> OperationStats {
        self.operation_stats.get(category).cloned().unwrap_or_default()
    }

    /// Report one answered question.
    /// `points` is ignored for incorrect answers.
    pub fn record_answer(&mut self, category: impl Into<Category>, is_correct: bool, points: u32) {
        let stats = self.operation_stats.entry(category.into()).or_default();
        stats.questions_answered = stats.questions_answered.saturating_add(1);

        if is_correct {
            stats.correct_answers = stats.correct_answers.saturating_add(1);
            stats.score = stats.score.saturating_add(u64::from(points));
            self.streak = self.streak.saturating_add(1);
            self.best_streak = self.best_streak.max(self.streak);
            self.add_points(u64::from(points));
        } else {
            self.streak = 0;
        }
    }

    /// Add to the total score. Negative deltas are rejected and leave state unchanged.
    pub fn add_score(&mut self, delta: i64) -> Result<(), ProgressError> {
        let points = u64::try_from(delta).map_err(|_| ProgressError::InvalidScoreDelta(delta))?;
        self.add_points(points);
        Ok(())
    }

    pub(crate) fn add_points(&mut self, points: u64) {
        self.total_score = self.total_score.saturating_add(points);
        self.level = level_for_score(self.total_score);
    }

    /// Points still missing before the next level
    pub fn points_to_next_level(&self) -> u64 {
        POINTS_PER_LEVEL - self.total_score % POINTS_PER_LEVEL
    }

    pub fn accuracy(&self, category: &Category) -> f64 {
        self.operation_stats
            .get(category)
            .map(|s| accuracy_percent(s.correct_answers, s.questions_answered))
            .unwrap_or(0.0)
    }

    pub fn total_questions(&self) -> u32 {
        self.operation_stats
            .values()
            .fold(0u32, |acc, s| acc.saturating_add(s.questions_answered))
    }

    pub fn total_correct(&self) -> u32 {
        self.operation_stats
            .values()
            .fold(0u32, |acc, s| acc.saturating_add(s.correct_answers))
    }

    pub fn overall_accuracy(&self) -> f64 {
        accuracy_percent(self.total_correct(), self.total_questions())
    }

    /// Returns true if the id was not unlocked before
    pub fn add_achievement(&mut self, id: impl Into<String>) -> bool {
        self.achievements.insert(id.into())
    }

    pub fn has_achievement(&self, id: &str) -> bool {
        self.achievements.contains(id)
    }

    pub fn badge(&self, badge: BadgeType) -> BadgeRecord {
        self.badges.get(&badge).cloned().unwrap_or_default()
    }

    pub fn has_badge(&self, badge: BadgeType) -> bool {
        self.badges.get(&badge).is_some_and(|b| b.earned)
    }

    /// Earned badges in threshold order
    pub fn earned_badges(&self) -> Vec<BadgeType> {
        self.badges
            .iter()
            .filter(|(_, record)| record.earned)
            .map(|(badge, _)| *badge)
            .collect()
    }

    /// Mark a badge earned. Repeat awards only bump `count` and `last_earned`.
    pub fn award_badge(&mut self, badge: BadgeType, now: DateTime<Utc>) {
        let record = self.badges.entry(badge).or_default();
        record.earned = true;
        record.count = record.count.saturating_add(1);
        // Snapshots keep millisecond precision
        record.last_earned = Some(now.trunc_subsecs(3));
    }

    /// Shallow-merge a partial settings object. Unspecified keys keep their values.
    pub fn update_settings(&mut self, partial: &Value) -> Result<(), ProgressError> {
        let patch = partial
            .as_object()
            .ok_or_else(|| ProgressError::InvalidSettings("expected a JSON object".to_string()))?;

        let Value::Object(mut merged) = serde_json::to_value(&self.settings)? else {
            return Err(ProgressError::InvalidSettings("settings are not an object".to_string()));
        };
        for (key, value) in patch {
            merged.insert(key.clone(), value.clone());
        }

        self.settings = serde_json::from_value(Value::Object(merged))
            .map_err(|e| ProgressError::InvalidSettings(e.to_string()))?;
        Ok(())
    }

    /// Wipe progress. Settings survive when `keep_settings` is set.
    pub fn reset(&mut self, keep_settings: bool) {
        let settings = std::mem::take(&mut self.settings);
        *self = Self::default();
        if keep_settings {
            self.settings = settings;
        }
    }

    pub fn to_json(&self) -> Result<String, ProgressError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restore from a snapshot. Derived fields are recomputed so a hand-edited
    /// snapshot cannot break the level or streak invariants.
    pub fn from_json(json: &str) -> Result<Self, ProgressError> {
        let mut record: PlayerRecord = serde_json::from_str(json)?;
        record.level = level_for_score(record.total_score);
        record.best_streak = record.best_streak.max(record.streak);
        for badge in BadgeType::ALL {
            record.badges.entry(badge).or_default();
        }
        Ok(record)
    }

    /// Missing or corrupt snapshots mean "no prior state"
    pub fn from_json_or_default(json: &str) -> Self {
        if json.trim().is_empty() {
            return Self::default();
        }
        match Self::from_json(json) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("[SNAPSHOT] unreadable player snapshot, using defaults: {}", e);
                Self::default()
            }
        }
    }
}
