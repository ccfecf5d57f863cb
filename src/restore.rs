// Bulk restore reducers for disaster recovery
// Accept JSON arrays exported from admin panel (TypeScript SDK format)

use spacetimedb::{reducer, Identity, ReducerContext, Table, Timestamp};
use crate::{player, is_authorized, Player, PlayerRecord};
use serde_json::Value;

/// Parse Timestamp from SDK JSON format: {"__timestamp_micros_since_unix_epoch__": "123456"}
fn parse_timestamp_json(val: &Value) -> Result<Timestamp, String> {
    let micros_str = val.get("__timestamp_micros_since_unix_epoch__")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid timestamp field")?;

    let micros: i64 = micros_str.parse()
        .map_err(|e| format!("Invalid timestamp micros: {}", e))?;

    Ok(Timestamp::from_micros_since_unix_epoch(micros))
}

/// Parse Identity from SDK JSON format: {"__identity__": "0xc200..."} or a bare hex string
fn parse_identity_json(val: &Value) -> Result<Identity, String> {
    let hex = val.get("__identity__")
        .and_then(|v| v.as_str())
        .or_else(|| val.as_str())
        .ok_or("Missing or invalid identity field")?;

    Identity::from_hex(hex.trim_start_matches("0x"))
        .map_err(|e| format!("Invalid identity hex: {}", e))
}

/// Snapshot may be exported as a JSON string column or as an inline object.
/// Either way it must decode as a PlayerRecord before it is accepted.
fn parse_snapshot_json(val: &Value) -> Result<String, String> {
    let raw = match val {
        Value::String(s) => s.clone(),
        Value::Object(_) => val.to_string(),
        _ => return Err("Snapshot must be a string or object".to_string()),
    };
    let record = PlayerRecord::from_json(&raw).map_err(|e| e.to_string())?;
    record.to_json().map_err(|e| e.to_string())
}

/// Decode one exported player row
fn parse_player(p: &Value, i: usize) -> Result<Player, String> {
    let last_played = parse_timestamp_json(p.get("lastPlayed").ok_or(format!("Player {}: missing lastPlayed", i))?)
        .map_err(|e| format!("Player {}: {}", i, e))?;

    Ok(Player {
        identity: parse_identity_json(p.get("identity").ok_or(format!("Player {}: missing identity", i))?)
            .map_err(|e| format!("Player {}: {}", i, e))?,
        name: p.get("name").and_then(|v| v.as_str()).ok_or(format!("Player {}: missing name", i))?.to_string(),
        snapshot: parse_snapshot_json(p.get("snapshot").ok_or(format!("Player {}: missing snapshot", i))?)
            .map_err(|e| format!("Player {}: {}", i, e))?,
        // Default to last_played for old backups
        created_at: p.get("createdAt").and_then(|v| parse_timestamp_json(v).ok()).unwrap_or(last_played),
        last_played,
    })
}

/// Bulk restore player table from JSON array
/// Protected by authorization check - only authorized workers can call this
/// All rows are validated before any is written
#[reducer]
pub fn bulk_restore_player(ctx: &ReducerContext, json_data: String) -> Result<(), String> {
    // Authorization check: only authorized workers can restore data
    if !is_authorized(ctx) {
        log::warn!("Unauthorized bulk_restore_player attempt by {}", ctx.sender);
        return Err("Unauthorized".to_string());
    }

    let data: Value = serde_json::from_str(&json_data)
        .map_err(|e| format!("Invalid JSON: {}", e))?;

    let players = data.as_array()
        .ok_or("Expected JSON array of players")?
        .iter()
        .enumerate()
        .map(|(i, p)| parse_player(p, i))
        .collect::<Result<Vec<_>, _>>()?;

    let mut inserted = 0;
    let mut updated = 0;
    for player in players {
        if ctx.db.player().identity().find(&player.identity).is_some() {
            ctx.db.player().identity().update(player);
            updated += 1;
        } else {
            ctx.db.player().insert(player);
            inserted += 1;
        }
    }

    log::info!("[RESTORE] player records inserted:{} updated:{}", inserted, updated);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_timestamp_json() {
        let ts = parse_timestamp_json(&json!({"__timestamp_micros_since_unix_epoch__": "1700000000000000"})).unwrap();
        assert_eq!(ts.to_micros_since_unix_epoch(), 1_700_000_000_000_000);
        assert!(parse_timestamp_json(&json!({"micros": 5})).is_err());
        assert!(parse_timestamp_json(&json!({"__timestamp_micros_since_unix_epoch__": "soon"})).is_err());
    }

    #[test]
    fn test_parse_snapshot_accepts_string_and_object() {
        let from_object = parse_snapshot_json(&json!({"totalScore": 75})).unwrap();
        let from_string = parse_snapshot_json(&json!("{\"totalScore\": 75}")).unwrap();
        assert_eq!(from_object, from_string);
        assert_eq!(PlayerRecord::from_json(&from_object).unwrap().level(), 2);
    }

    #[test]
    fn test_parse_snapshot_rejects_garbage() {
        assert!(parse_snapshot_json(&json!(12)).is_err());
        assert!(parse_snapshot_json(&json!("{broken")).is_err());
    }

    #[test]
    fn test_parse_player_requires_identity() {
        let row = json!({
            "name": "🦊",
            "snapshot": {},
            "lastPlayed": {"__timestamp_micros_since_unix_epoch__": "1"}
        });
        let err = parse_player(&row, 3).unwrap_err();
        assert!(err.contains("Player 3: missing identity"), "{}", err);
    }
}
