use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::MAX_ENTITY_ID_LEN;

/// Trims an entity id; empty or oversized ids are rejected.
pub fn sanitize_entity_id(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_ENTITY_ID_LEN {
        return None;
    }
    Some(trimmed.to_string())
}

pub fn parse_ranking_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|value| value.parse::<usize>().ok())
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
