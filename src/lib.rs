use spacetimedb::{reducer, table, view, Identity, ReducerContext, ScheduleAt, Table, Timestamp};
use chrono::{DateTime, Utc};
use serde_json::Value;

pub mod achievements;
pub mod badges;
pub mod error;
pub mod record;
pub mod rules;

// Bulk restore reducers for disaster recovery
mod restore;

pub use achievements::{AchievementCatalog, AchievementDefinition, AchievementUnlock, Tier};
pub use badges::{BadgeAward, BadgeTable, BadgeThreshold, BadgeType};
pub use error::ProgressError;
pub use record::{Category, PlayerRecord, Settings};
pub use rules::{AnswerReport, GameRules, LevelUp};

// ==================== CONSTANTS ====================

/// Notification rows older than this are pruned by the cleanup scheduler
const NOTIFICATION_TTL_SECS: u64 = 10 * 60;

/// How often the cleanup scheduler runs
const CLEANUP_INTERVAL_SECS: u64 = 60;

/// Longest accepted player name (emoji avatars count as several bytes)
const MAX_NAME_LEN: usize = 32;

// ==================== HELPER FUNCTIONS ====================

/// Convert a SpacetimeDB timestamp for the progress core
fn to_utc(ts: Timestamp) -> DateTime<Utc> {
    let micros = ts.to_micros_since_unix_epoch();
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos).unwrap_or_default()
}

/// First 8 hex chars of an identity, for log lines
fn short_id(identity: &Identity) -> String {
    let hex = identity.to_string();
    hex[..8.min(hex.len())].to_string()
}

fn is_authorized(ctx: &ReducerContext) -> bool {
    ctx.db.authorized_worker().identity().find(&ctx.sender).is_some()
}

/// Load the caller's player row and decoded record
fn load_player(ctx: &ReducerContext) -> Result<(Player, PlayerRecord), String> {
    let player = ctx.db.player()
        .identity()
        .find(&ctx.sender)
        .ok_or("Player not found - call connect first".to_string())?;
    let record = PlayerRecord::from_json_or_default(&player.snapshot);
    Ok((player, record))
}

/// Write the record back to the player row
fn save_player(ctx: &ReducerContext, mut player: Player, record: &PlayerRecord) -> Result<(), String> {
    player.snapshot = record.to_json().map_err(|e| e.to_string())?;
    player.last_played = ctx.timestamp;
    ctx.db.player().identity().update(player);
    Ok(())
}

/// Publish notification rows for the client to animate
fn publish_report(ctx: &ReducerContext, identity: Identity, report: &AnswerReport) {
    if let Some(badge) = &report.badge {
        ctx.db.badge_award().insert(BadgeAwardRow {
            id: 0, // auto_inc
            player_identity: identity,
            badge_type: badge.badge_type.as_str().to_string(),
            streak: badge.streak,
            name: badge.name.clone(),
            description: badge.description.clone(),
            awarded_at: ctx.timestamp,
        });
    }

    for unlock in &report.achievements {
        ctx.db.achievement_unlock().insert(AchievementUnlockRow {
            id: 0, // auto_inc
            player_identity: identity,
            achievement_id: unlock.id.clone(),
            name: unlock.name.clone(),
            description: unlock.description.clone(),
            points: unlock.points,
            tier: unlock.tier.as_str().to_string(),
            unlocked_at: ctx.timestamp,
        });
    }

    if let Some(up) = report.level_up {
        ctx.db.level_up().insert(LevelUpRow {
            id: 0, // auto_inc
            player_identity: identity,
            old_level: up.old_level,
            new_level: up.new_level,
            reached_at: ctx.timestamp,
        });
    }
}

/// Drop every pending notification for a player
fn clear_notifications(ctx: &ReducerContext, identity: Identity) -> usize {
    let badges: Vec<u64> = ctx.db.badge_award()
        .player_identity().filter(&identity)
        .map(|r| r.id)
        .collect();
    let unlocks: Vec<u64> = ctx.db.achievement_unlock()
        .player_identity().filter(&identity)
        .map(|r| r.id)
        .collect();
    let levels: Vec<u64> = ctx.db.level_up()
        .player_identity().filter(&identity)
        .map(|r| r.id)
        .collect();
    let count = badges.len() + unlocks.len() + levels.len();

    for id in badges {
        ctx.db.badge_award().id().delete(&id);
    }
    for id in unlocks {
        ctx.db.achievement_unlock().id().delete(&id);
    }
    for id in levels {
        ctx.db.level_up().id().delete(&id);
    }
    count
}

// ==================== TABLES ====================

/// Player profile with the serialized progress record
/// PRIVATE: Clients access via my_player view
#[table(name = player)]
#[derive(Clone, Debug)]
pub struct Player {
    #[primary_key]
    pub identity: Identity,

    /// Display name (emoji avatar)
    pub name: String,

    /// PlayerRecord snapshot as JSON
    /// Example: {"totalScore": 60, "level": 2, "streak": 6, "bestStreak": 6, "operationStats": {...}}
    pub snapshot: String,

    pub created_at: Timestamp,

    /// Updated on every save
    pub last_played: Timestamp,
}

// ==================== VIEWS ====================

/// View: Returns only the current user's player data
#[view(name = my_player, public)]
fn my_player(ctx: &spacetimedb::ViewContext) -> Option<Player> {
    ctx.db.player().identity().find(ctx.sender)
}

/// Identities allowed to call admin and restore reducers
#[table(name = authorized_worker)]
pub struct AuthorizedWorker {
    #[primary_key]
    pub identity: Identity,
}

/// Streak badge notification
#[table(name = badge_award, public)]  // Client subscribes to animate the award
pub struct BadgeAwardRow {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    #[index(btree)]
    pub player_identity: Identity,

    /// "badge1" | "bronze" | "silver" | "gold"
    pub badge_type: String,

    /// Streak length when the badge was awarded
    pub streak: u32,

    pub name: String,
    pub description: String,

    #[index(btree)]
    pub awarded_at: Timestamp,
}

/// Achievement unlock notification
#[table(name = achievement_unlock, public)]
pub struct AchievementUnlockRow {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    #[index(btree)]
    pub player_identity: Identity,

    pub achievement_id: String,
    pub name: String,
    pub description: String,

    /// Bonus points already added to the player's score
    pub points: u32,

    /// "bronze" | "silver" | "gold"
    pub tier: String,

    #[index(btree)]
    pub unlocked_at: Timestamp,
}

/// Level change notification
#[table(name = level_up, public)]
pub struct LevelUpRow {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    #[index(btree)]
    pub player_identity: Identity,

    pub old_level: u32,
    pub new_level: u32,

    #[index(btree)]
    pub reached_at: Timestamp,
}

/// Schedule table for notification pruning
#[table(name = notification_cleanup_schedule, scheduled(cleanup_notifications))]
pub struct NotificationCleanupSchedule {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub scheduled_at: ScheduleAt,
}

// ==================== REDUCERS ====================

/// Initialize module - register owner and schedule cleanup
#[reducer(init)]
pub fn init(ctx: &ReducerContext) {
    // In init, ctx.sender is the module owner identity
    if !is_authorized(ctx) {
        ctx.db.authorized_worker().insert(AuthorizedWorker {
            identity: ctx.sender,
        });
    }

    // Avoid duplicate schedulers on hot-reload
    if ctx.db.notification_cleanup_schedule().iter().count() == 0 {
        ctx.db.notification_cleanup_schedule().insert(NotificationCleanupSchedule {
            id: 0, // auto_inc
            scheduled_at: ScheduleAt::Interval(std::time::Duration::from_secs(CLEANUP_INTERVAL_SECS).into()),
        });
    }

    log::info!("Number Blocks module initialized successfully");
}

/// Player connects to the game: create on first visit, otherwise refresh
#[reducer]
pub fn connect(ctx: &ReducerContext, name: String) -> Result<(), String> {
    let name = name.trim().to_string();
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(format!("Name must be 1-{} bytes", MAX_NAME_LEN));
    }
    let pid = short_id(&ctx.sender);

    if let Some(mut existing) = ctx.db.player().identity().find(&ctx.sender) {
        // Corrupt snapshots are replaced with a fresh record rather than failing every answer
        let record = match PlayerRecord::from_json(&existing.snapshot) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("[CONNECT] player_id={} snapshot unreadable, resetting: {}", pid, e);
                PlayerRecord::default()
            }
        };
        existing.name = name;
        save_player(ctx, existing.clone(), &record)?;

        // Wide event: one canonical log with full player context
        log::info!("[CONNECT] player=\"{}\" player_id={} type=returning level={} score={} best_streak={} badges={} achievements={}",
            existing.name, pid, record.level(), record.total_score(), record.best_streak(),
            record.earned_badges().len(), record.achievements().len());
    } else {
        let record = PlayerRecord::default();
        let snapshot = record.to_json().map_err(|e| e.to_string())?;
        ctx.db.player().insert(Player {
            identity: ctx.sender,
            name: name.clone(),
            snapshot,
            created_at: ctx.timestamp,
            last_played: ctx.timestamp,
        });
        log::info!("[CONNECT] player=\"{}\" player_id={} type=new", name, pid);
    }
    Ok(())
}

/// Report an answered question from the game loop
#[reducer]
pub fn submit_answer(ctx: &ReducerContext, category: String, is_correct: bool, points: u32) -> Result<(), String> {
    if category.trim().is_empty() {
        return Err("Category must not be empty".to_string());
    }
    let (player, mut record) = load_player(ctx)?;
    let identity = player.identity;
    let category = Category::parse(&category);

    let report = GameRules::default().submit_answer(&mut record, category.clone(), is_correct, points, to_utc(ctx.timestamp));
    save_player(ctx, player, &record)?;
    publish_report(ctx, identity, &report);

    // One canonical log line per answer
    log::info!("[ANSWER] player_id={} category={} correct={} points={} streak={} best_streak={} score={} level={} badge={} achievements={} bonus={}",
        short_id(&identity), category, is_correct, if is_correct { points } else { 0 },
        record.streak(), record.best_streak(), record.total_score(), record.level(),
        report.badge.as_ref().map(|b| b.badge_type.as_str()).unwrap_or("none"),
        report.achievements.len(), report.bonus_points);
    Ok(())
}

/// Grant extra points outside of answers (mini-game rewards etc.)
#[reducer]
pub fn add_bonus_points(ctx: &ReducerContext, points: i64) -> Result<(), String> {
    let (player, mut record) = load_player(ctx)?;
    let report = GameRules::default().grant_bonus(&mut record, points).map_err(|e| e.to_string())?;
    let identity = player.identity;
    save_player(ctx, player, &record)?;
    publish_report(ctx, identity, &report);

    log::info!("[SCORE] player_id={} bonus={} achievements={} score={}",
        short_id(&identity), points, report.achievements.len(), record.total_score());
    Ok(())
}

/// Shallow-merge settings from a JSON object, e.g. {"soundEnabled": false}
#[reducer]
pub fn update_settings(ctx: &ReducerContext, settings_json: String) -> Result<(), String> {
    let partial: Value = serde_json::from_str(&settings_json)
        .map_err(|e| format!("Invalid JSON: {}", e))?;
    let (player, mut record) = load_player(ctx)?;
    record.update_settings(&partial).map_err(|e| e.to_string())?;

    let pid = short_id(&player.identity);
    save_player(ctx, player, &record)?;
    log::info!("[SETTINGS] player_id={} difficulty={:?} sound={} music={}",
        pid, record.settings().difficulty, record.settings().sound_enabled, record.settings().music_enabled);
    Ok(())
}

/// Player starts over (settings are kept)
#[reducer]
pub fn reset_progress(ctx: &ReducerContext) -> Result<(), String> {
    let (player, mut record) = load_player(ctx)?;
    let old_score = record.total_score();
    record.reset(true);

    let identity = player.identity;
    save_player(ctx, player, &record)?;
    let cleared = clear_notifications(ctx, identity);
    log::info!("[RESET] player_id={} old_score={} notifications:{}", short_id(&identity), old_score, cleared);
    Ok(())
}

/// Admin: Reset a player's progress (keep identity and name, wipe stats and settings)
/// Used when a sibling plays on the wrong account, demo resets, etc.
#[reducer]
pub fn admin_reset_player(ctx: &ReducerContext, identity_hex: String) -> Result<(), String> {
    if !is_authorized(ctx) {
        log::warn!("Unauthorized admin_reset_player attempt by {}", ctx.sender);
        return Err("Unauthorized".to_string());
    }

    let identity = Identity::from_hex(identity_hex.trim().trim_start_matches("0x"))
        .map_err(|e| format!("Invalid identity hex: {}", e))?;
    let mut player = ctx.db.player()
        .identity()
        .find(&identity)
        .ok_or(format!("Player {} not found", identity_hex))?;

    player.snapshot = PlayerRecord::default().to_json().map_err(|e| e.to_string())?;
    player.last_played = ctx.timestamp;
    let player_name = player.name.clone();
    ctx.db.player().identity().update(player);

    let cleared = clear_notifications(ctx, identity);
    log::info!("[ADMIN] reset player:{} notifications:{}", player_name, cleared);
    Ok(())
}

/// Prune notification rows the client has had time to display
#[reducer]
pub fn cleanup_notifications(ctx: &ReducerContext, _schedule: NotificationCleanupSchedule) {
    let expired = |at: Timestamp| {
        ctx.timestamp.duration_since(at).unwrap_or_default().as_secs() >= NOTIFICATION_TTL_SECS
    };

    let badges: Vec<u64> = ctx.db.badge_award().iter()
        .filter(|r| expired(r.awarded_at))
        .map(|r| r.id)
        .collect();
    let unlocks: Vec<u64> = ctx.db.achievement_unlock().iter()
        .filter(|r| expired(r.unlocked_at))
        .map(|r| r.id)
        .collect();
    let levels: Vec<u64> = ctx.db.level_up().iter()
        .filter(|r| expired(r.reached_at))
        .map(|r| r.id)
        .collect();

    let total = badges.len() + unlocks.len() + levels.len();
    for id in badges {
        ctx.db.badge_award().id().delete(&id);
    }
    for id in unlocks {
        ctx.db.achievement_unlock().id().delete(&id);
    }
    for id in levels {
        ctx.db.level_up().id().delete(&id);
    }

    if total > 0 {
        log::debug!("[CLEANUP] pruned {} notification rows", total);
    }
}
