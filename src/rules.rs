use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::achievements::{check_achievements, AchievementCatalog, AchievementUnlock};
use crate::badges::{BadgeAward, BadgeTable};
use crate::error::ProgressError;
use crate::record::{Category, PlayerRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelUp {
    pub old_level: u32,
    pub new_level: u32,
}

/// Everything that changed for the UI after one answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerReport {
    pub badge: Option<BadgeAward>,
    pub achievements: Vec<AchievementUnlock>,
    pub level_up: Option<LevelUp>,
    /// Bonus points granted by unlocked achievements
    pub bonus_points: u64,
}

impl AnswerReport {
    pub fn has_news(&self) -> bool {
        self.badge.is_some() || !self.achievements.is_empty() || self.level_up.is_some()
    }
}

/// Badge and achievement tables used to judge answers
#[derive(Debug, Clone, Default)]
pub struct GameRules {
    pub badges: BadgeTable,
    pub achievements: AchievementCatalog,
}

impl GameRules {
    pub fn new(badges: BadgeTable, achievements: AchievementCatalog) -> Self {
        Self { badges, achievements }
    }

    /// Apply one answer and re-check badges and achievements against the updated record.
    pub fn submit_answer(
        &self,
        player: &mut PlayerRecord,
        category: impl Into<Category>,
        is_correct: bool,
        points: u32,
        now: DateTime<Utc>,
    ) -> AnswerReport {
        let old_level = player.level();
        player.record_answer(category, is_correct, points);

        let streak = player.streak();
        let badge = self.badges.check_and_award(player, streak, now);

        AnswerReport {
            badge,
            ..self.settle(player, old_level)
        }
    }

    /// Add points outside of an answer and run the same achievement and level checks.
    /// Negative amounts are rejected with the record untouched.
    pub fn grant_bonus(
        &self,
        player: &mut PlayerRecord,
        points: i64,
    ) -> Result<AnswerReport, ProgressError> {
        let old_level = player.level();
        player.add_score(points)?;
        Ok(self.settle(player, old_level))
    }

    /// Unlock achievements until nothing new qualifies, then report any level change.
    ///
    /// Achievement rewards are added to the score, which can unlock score
    /// achievements in turn.
    fn settle(&self, player: &mut PlayerRecord, old_level: u32) -> AnswerReport {
        let mut achievements = Vec::new();
        let mut bonus_points = 0u64;
        loop {
            let fresh = check_achievements(player, self.achievements.definitions());
            if fresh.is_empty() {
                break;
            }
            for def in fresh {
                player.add_points(u64::from(def.point_reward));
                bonus_points += u64::from(def.point_reward);
                log::info!(
                    "[ACHIEVEMENT] unlocked id:{} tier:{} bonus:{}",
                    def.id,
                    def.tier.as_str(),
                    def.point_reward
                );
                achievements.push(AchievementUnlock::from(def));
            }
        }

        let new_level = player.level();
        let level_up = (new_level > old_level).then_some(LevelUp { old_level, new_level });
        if let Some(up) = &level_up {
            log::info!(
                "[LEVEL] {} -> {} score:{}",
                up.old_level,
                up.new_level,
                player.total_score()
            );
        }

        AnswerReport {
            badge: None,
            achievements,
            level_up,
            bonus_points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::achievements::{AchievementCategory, AchievementDefinition, Tier};
    use crate::badges::BadgeType;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_incorrect_answer_reports_nothing() {
        let rules = GameRules::default();
        let mut p = PlayerRecord::new();
        let report = rules.submit_answer(&mut p, "addition", false, 10, now());
        assert!(!report.has_news());
        assert_eq!(report, AnswerReport::default());
    }

    #[test]
    fn test_third_correct_answer_awards_badge1() {
        let rules = GameRules::default();
        let mut p = PlayerRecord::new();
        assert!(rules.submit_answer(&mut p, "addition", true, 1, now()).badge.is_none());
        assert!(rules.submit_answer(&mut p, "addition", true, 1, now()).badge.is_none());
        let report = rules.submit_answer(&mut p, "addition", true, 1, now());
        assert_eq!(report.badge.unwrap().badge_type, BadgeType::Badge1);
    }

    #[test]
    fn test_level_up_reported() {
        let rules = GameRules::new(BadgeTable::default(), AchievementCatalog::new(Vec::new()));
        let mut p = PlayerRecord::new();
        let report = rules.submit_answer(&mut p, "multiplication", true, 55, now());
        assert_eq!(report.level_up, Some(LevelUp { old_level: 1, new_level: 2 }));
    }

    #[test]
    fn test_bonus_points_can_chain_unlocks() {
        let catalog = AchievementCatalog::new(vec![
            AchievementDefinition::new(
                "first_addition",
                "First Sum",
                "",
                AchievementCategory::OperationCorrect(Category::Addition),
                1,
                Tier::Gold,
            ),
            AchievementDefinition::new(
                "score_50",
                "Fifty",
                "",
                AchievementCategory::TotalScore,
                50,
                Tier::Bronze,
            ),
        ]);
        let rules = GameRules::new(BadgeTable::default(), catalog);
        let mut p = PlayerRecord::new();

        let report = rules.submit_answer(&mut p, "addition", true, 5, now());
        let ids: Vec<_> = report.achievements.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["first_addition", "score_50"]);
        assert_eq!(report.bonus_points, 60);
        assert_eq!(p.total_score(), 65);
        assert_eq!(report.level_up, Some(LevelUp { old_level: 1, new_level: 2 }));
    }

    #[test]
    fn test_bonus_points_unlock_score_achievements() {
        let rules = GameRules::default();
        let mut p = PlayerRecord::new();

        let report = rules.grant_bonus(&mut p, 100).unwrap();
        let ids: Vec<_> = report.achievements.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["score_100"]);
        assert!(p.has_achievement("score_100"));
        assert_eq!(report.bonus_points, 10);
        assert_eq!(p.total_score(), 110);
        assert_eq!(report.level_up, Some(LevelUp { old_level: 1, new_level: 3 }));
        assert!(report.badge.is_none());

        assert!(!rules.grant_bonus(&mut p, 5).unwrap().has_news());
    }

    #[test]
    fn test_negative_bonus_rejected() {
        let rules = GameRules::default();
        let mut p = PlayerRecord::new();
        let before = p.clone();
        assert!(matches!(
            rules.grant_bonus(&mut p, -10),
            Err(ProgressError::InvalidScoreDelta(-10))
        ));
        assert_eq!(p, before);
    }
}
