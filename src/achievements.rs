use serde::{Deserialize, Serialize};

use crate::record::{Category, PlayerRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
}

impl Tier {
    /// Default bonus points granted when an achievement of this tier unlocks
    pub const fn point_reward(&self) -> u32 {
        match self {
            Tier::Bronze => 10,
            Tier::Silver => 25,
            Tier::Gold => 50,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
        }
    }
}

/// Which player stat an achievement measures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AchievementCategory {
    /// Correct answers in one operation category
    OperationCorrect(Category),
    TotalScore,
    BestStreak,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AchievementDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: AchievementCategory,
    pub requirement: u64,
    pub point_reward: u32,
    pub tier: Tier,
}

impl AchievementDefinition {
    pub fn new(
        id: &str,
        name: &str,
        description: &str,
        category: AchievementCategory,
        requirement: u64,
        tier: Tier,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            category,
            requirement,
            point_reward: tier.point_reward(),
            tier,
        }
    }

    /// Current value of the measured stat
    pub fn measure(&self, player: &PlayerRecord) -> u64 {
        match &self.category {
            AchievementCategory::OperationCorrect(category) => {
                u64::from(player.stats_for(category).correct_answers)
            }
            AchievementCategory::TotalScore => player.total_score(),
            AchievementCategory::BestStreak => u64::from(player.best_streak()),
        }
    }
}

/// Notification payload for a newly unlocked achievement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementUnlock {
    pub id: String,
    pub name: String,
    pub description: String,
    pub points: u32,
    pub tier: Tier,
}

impl From<&AchievementDefinition> for AchievementUnlock {
    fn from(def: &AchievementDefinition) -> Self {
        Self {
            id: def.id.clone(),
            name: def.name.clone(),
            description: def.description.clone(),
            points: def.point_reward,
            tier: def.tier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementProgress {
    pub id: String,
    pub current: u64,
    pub requirement: u64,
    pub percent: f64,
    pub unlocked: bool,
}

pub fn is_unlocked(def: &AchievementDefinition, player: &PlayerRecord) -> bool {
    def.measure(player) >= def.requirement
}

/// Unlock every definition the player now qualifies for and return the new ones.
/// Already-unlocked ids are skipped; the only side effect is inserting into
/// the player's achievement set.
pub fn check_achievements<'a>(
    player: &mut PlayerRecord,
    definitions: &'a [AchievementDefinition],
) -> Vec<&'a AchievementDefinition> {
    let fresh: Vec<&AchievementDefinition> = definitions
        .iter()
        .filter(|def| !player.has_achievement(&def.id) && is_unlocked(def, player))
        .collect();

    for def in &fresh {
        player.add_achievement(def.id.clone());
    }
    fresh
}

pub fn progress(def: &AchievementDefinition, player: &PlayerRecord) -> AchievementProgress {
    let current = def.measure(player);
    let percent = if def.requirement == 0 {
        100.0
    } else {
        (current as f64 / def.requirement as f64 * 100.0).min(100.0)
    };

    AchievementProgress {
        id: def.id.clone(),
        current,
        requirement: def.requirement,
        percent,
        unlocked: player.has_achievement(&def.id),
    }
}

/// Immutable achievement table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AchievementCatalog {
    definitions: Vec<AchievementDefinition>,
}

impl AchievementCatalog {
    pub fn new(definitions: Vec<AchievementDefinition>) -> Self {
        Self { definitions }
    }

    pub fn definitions(&self) -> &[AchievementDefinition] {
        &self.definitions
    }

    pub fn get(&self, id: &str) -> Option<&AchievementDefinition> {
        self.definitions.iter().find(|def| def.id == id)
    }
}

fn operation_tiers(category: Category, label: &str, definitions: &mut Vec<AchievementDefinition>) {
    let key = category.as_str().to_string();
    for (requirement, tier, title) in [
        (10, Tier::Bronze, "Starter"),
        (50, Tier::Silver, "Star"),
        (100, Tier::Gold, "Master"),
    ] {
        definitions.push(AchievementDefinition::new(
            &format!("{}_{}", key, tier.as_str()),
            &format!("{} {}", label, title),
            &format!("Solve {} {} problems correctly", requirement, key),
            AchievementCategory::OperationCorrect(category.clone()),
            requirement,
            tier,
        ));
    }
}

impl Default for AchievementCatalog {
    fn default() -> Self {
        let mut definitions = Vec::new();
        operation_tiers(Category::Addition, "Addition", &mut definitions);
        operation_tiers(Category::Subtraction, "Subtraction", &mut definitions);
        operation_tiers(Category::Multiplication, "Multiplication", &mut definitions);
        operation_tiers(Category::Division, "Division", &mut definitions);

        definitions.push(AchievementDefinition::new(
            "supermode_silver",
            "Super Solver",
            "Solve 25 Super Mode problems correctly",
            AchievementCategory::OperationCorrect(Category::SuperMode),
            25,
            Tier::Silver,
        ));
        definitions.push(AchievementDefinition::new(
            "detective_silver",
            "Number Detective",
            "Find 25 missing numbers in Detective Mode",
            AchievementCategory::OperationCorrect(Category::Detective),
            25,
            Tier::Silver,
        ));

        for (requirement, tier, name) in [
            (100, Tier::Bronze, "Point Collector"),
            (500, Tier::Silver, "Point Hoarder"),
            (1000, Tier::Gold, "Point Champion"),
        ] {
            definitions.push(AchievementDefinition::new(
                &format!("score_{}", requirement),
                name,
                &format!("Earn {} points in total", requirement),
                AchievementCategory::TotalScore,
                requirement,
                tier,
            ));
        }

        for (requirement, tier, name) in [
            (5, Tier::Bronze, "On a Roll"),
            (10, Tier::Silver, "Unstoppable"),
            (20, Tier::Gold, "Streak Legend"),
        ] {
            definitions.push(AchievementDefinition::new(
                &format!("streak_{}", requirement),
                name,
                &format!("Answer {} questions in a row correctly", requirement),
                AchievementCategory::BestStreak,
                requirement,
                tier,
            ));
        }

        Self::new(definitions)
    }
}
