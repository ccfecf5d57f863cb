use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::PlayerRecord;

/// Streak badge identifiers, in ascending threshold order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeType {
    Badge1,
    Bronze,
    Silver,
    Gold,
}

impl BadgeType {
    pub const ALL: [BadgeType; 4] = [
        BadgeType::Badge1,
        BadgeType::Bronze,
        BadgeType::Silver,
        BadgeType::Gold,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeType::Badge1 => "badge1",
            BadgeType::Bronze => "bronze",
            BadgeType::Silver => "silver",
            BadgeType::Gold => "gold",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        BadgeType::ALL
            .into_iter()
            .find(|badge| badge.as_str().eq_ignore_ascii_case(key.trim()))
    }
}

/// One row of the streak badge table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeThreshold {
    pub badge_type: BadgeType,
    /// Consecutive correct answers required
    pub threshold: u32,
    pub name: String,
    pub description: String,
}

impl BadgeThreshold {
    pub fn new(badge_type: BadgeType, threshold: u32, name: &str, description: &str) -> Self {
        Self {
            badge_type,
            threshold,
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

/// Notification payload for a newly awarded badge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeAward {
    pub badge_type: BadgeType,
    pub streak: u32,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextBadgeTarget {
    pub badge_type: BadgeType,
    pub threshold: u32,
    /// Zero when the streak already qualifies but the badge was not awarded yet
    pub remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakProgress {
    pub current_streak: u32,
    pub next_target: Option<NextBadgeTarget>,
    /// Percent toward `next_target`, capped at 100
    pub progress: f64,
}

/// Immutable streak badge table, kept sorted by ascending threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeTable {
    thresholds: Vec<BadgeThreshold>,
}

impl Default for BadgeTable {
    fn default() -> Self {
        Self::new(vec![
            BadgeThreshold::new(
                BadgeType::Badge1,
                3,
                "Hot Start",
                "3 correct answers in a row!",
            ),
            BadgeThreshold::new(
                BadgeType::Bronze,
                5,
                "Bronze Streak",
                "5 correct answers in a row!",
            ),
            BadgeThreshold::new(
                BadgeType::Silver,
                10,
                "Silver Streak",
                "10 correct answers in a row!",
            ),
            BadgeThreshold::new(
                BadgeType::Gold,
                15,
                "Gold Streak",
                "15 correct answers in a row!",
            ),
        ])
    }
}

impl BadgeTable {
    pub fn new(mut thresholds: Vec<BadgeThreshold>) -> Self {
        thresholds.sort_by_key(|t| t.threshold);
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &[BadgeThreshold] {
        &self.thresholds
    }

    pub fn get(&self, badge_type: BadgeType) -> Option<&BadgeThreshold> {
        self.thresholds.iter().find(|t| t.badge_type == badge_type)
    }

    /// Award the first (lowest) unearned badge the streak qualifies for.
    ///
    /// At most one badge is awarded per call: a streak that jumps past several
    /// thresholds at once walks up one badge per call.
    pub fn check_and_award(
        &self,
        player: &mut PlayerRecord,
        current_streak: u32,
        now: DateTime<Utc>,
    ) -> Option<BadgeAward> {
        let badge = self
            .thresholds
            .iter()
            .find(|t| current_streak >= t.threshold && !player.has_badge(t.badge_type))?;

        player.award_badge(badge.badge_type, now);
        log::info!(
            "[BADGE] awarded badge:{} streak:{} threshold:{}",
            badge.badge_type.as_str(),
            current_streak,
            badge.threshold
        );

        Some(BadgeAward {
            badge_type: badge.badge_type,
            streak: current_streak,
            name: badge.name.clone(),
            description: badge.description.clone(),
        })
    }

    /// Highest badge whose threshold the streak reaches, regardless of what is earned
    pub fn badge_for_streak(&self, streak: u32) -> Option<&BadgeThreshold> {
        self.thresholds.iter().rev().find(|t| streak >= t.threshold)
    }

    /// Lowest-threshold badge the player has not earned yet
    pub fn next_target(
        &self,
        player: &PlayerRecord,
        current_streak: u32,
    ) -> Option<NextBadgeTarget> {
        self.thresholds
            .iter()
            .find(|t| !player.has_badge(t.badge_type))
            .map(|t| NextBadgeTarget {
                badge_type: t.badge_type,
                threshold: t.threshold,
                remaining: t.threshold.saturating_sub(current_streak),
            })
    }

    /// Current streak against the next unearned badge.
    ///
    /// `progress` is `streak / threshold * 100`, capped at 100 when the streak
    /// has already passed an unearned threshold; 100 once every badge is earned.
    pub fn streak_progress(&self, player: &PlayerRecord) -> StreakProgress {
        let current_streak = player.streak();
        let next_target = self.next_target(player, current_streak);
        let progress = match &next_target {
            Some(target) if target.threshold > 0 => {
                (f64::from(current_streak) / f64::from(target.threshold) * 100.0).min(100.0)
            }
            _ => 100.0,
        };

        StreakProgress {
            current_streak,
            next_target,
            progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_badge_type_names() {
        for badge in BadgeType::ALL {
            assert_eq!(BadgeType::parse(badge.as_str()), Some(badge));
        }
        assert_eq!(BadgeType::parse("GOLD"), Some(BadgeType::Gold));
        assert_eq!(BadgeType::parse("platinum"), None);
    }

    #[test]
    fn test_default_table_thresholds() {
        let table = BadgeTable::default();
        let thresholds: Vec<_> = table
            .thresholds()
            .iter()
            .map(|t| (t.badge_type, t.threshold))
            .collect();
        assert_eq!(
            thresholds,
            vec![
                (BadgeType::Badge1, 3),
                (BadgeType::Bronze, 5),
                (BadgeType::Silver, 10),
                (BadgeType::Gold, 15),
            ]
        );
    }

    #[test]
    fn test_table_is_sorted_on_construction() {
        let table = BadgeTable::new(vec![
            BadgeThreshold::new(BadgeType::Gold, 9, "G", ""),
            BadgeThreshold::new(BadgeType::Badge1, 1, "B", ""),
        ]);
        assert_eq!(table.thresholds()[0].badge_type, BadgeType::Badge1);
    }

    #[test]
    fn test_no_badge_below_first_threshold() {
        let table = BadgeTable::default();
        let mut p = PlayerRecord::new();
        assert_eq!(table.check_and_award(&mut p, 2, now()), None);
        assert!(p.earned_badges().is_empty());
    }

    #[test]
    fn test_streak_jump_awards_only_first_eligible() {
        let table = BadgeTable::default();
        let mut p = PlayerRecord::new();

        let award = table.check_and_award(&mut p, 20, now()).unwrap();
        assert_eq!(award.badge_type, BadgeType::Badge1);
        assert_eq!(award.streak, 20);
        assert_eq!(award.name, "Hot Start");
        assert_eq!(p.earned_badges(), vec![BadgeType::Badge1]);

        // Repeated calls walk up one badge at a time
        let walked: Vec<_> = std::iter::from_fn(|| table.check_and_award(&mut p, 20, now()))
            .map(|a| a.badge_type)
            .collect();
        assert_eq!(walked, vec![BadgeType::Bronze, BadgeType::Silver, BadgeType::Gold]);
    }

    #[test]
    fn test_earned_badge_not_awarded_twice() {
        let table = BadgeTable::default();
        let mut p = PlayerRecord::new();
        assert!(table.check_and_award(&mut p, 3, now()).is_some());
        assert!(table.check_and_award(&mut p, 3, now()).is_none());
        assert_eq!(p.badge(BadgeType::Badge1).count, 1);
    }

    #[test]
    fn test_badge_for_streak_is_highest() {
        let table = BadgeTable::default();
        assert!(table.badge_for_streak(2).is_none());
        assert_eq!(table.badge_for_streak(3).unwrap().badge_type, BadgeType::Badge1);
        assert_eq!(table.badge_for_streak(12).unwrap().badge_type, BadgeType::Silver);
        assert_eq!(table.badge_for_streak(99).unwrap().badge_type, BadgeType::Gold);
    }

    #[test]
    fn test_next_target() {
        let table = BadgeTable::default();
        let mut p = PlayerRecord::new();
        assert_eq!(
            table.next_target(&p, 1),
            Some(NextBadgeTarget {
                badge_type: BadgeType::Badge1,
                threshold: 3,
                remaining: 2,
            })
        );

        p.award_badge(BadgeType::Badge1, now());
        let target = table.next_target(&p, 7).unwrap();
        assert_eq!(target.badge_type, BadgeType::Bronze);
        assert_eq!(target.remaining, 0);

        for badge in BadgeType::ALL {
            p.award_badge(badge, now());
        }
        assert_eq!(table.next_target(&p, 0), None);
    }

    #[test]
    fn test_streak_progress() {
        let table = BadgeTable::default();
        let mut p = PlayerRecord::new();
        p.record_answer("addition", true, 1);
        p.record_answer("addition", true, 1);

        let progress = table.streak_progress(&p);
        assert_eq!(progress.current_streak, 2);
        assert_eq!(progress.next_target.unwrap().badge_type, BadgeType::Badge1);
        assert!((progress.progress - 66.666).abs() < 0.01);

        for badge in BadgeType::ALL {
            p.award_badge(badge, now());
        }
        let done = table.streak_progress(&p);
        assert_eq!(done.next_target, None);
        assert_eq!(done.progress, 100.0);
    }
}
