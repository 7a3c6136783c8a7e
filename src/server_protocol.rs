use serde_json::Value;

use crate::server_utils::sanitize_entity_id;
use crate::types::Vec3;

/// Messages the host bridge sends over the socket.
#[derive(Debug, PartialEq)]
pub enum ParsedHostMessage {
    Join {
        entity_id: String,
    },
    Leave {
        entity_id: String,
    },
    Move {
        entity_id: String,
        position: Vec3,
        airborne: bool,
        mounted: bool,
        at_ms: Option<u64>,
    },
    Command {
        entity_id: String,
    },
    Condition {
        entity_id: String,
        instruction: String,
    },
    Ping {
        t: f64,
    },
}

pub fn parse_host_message(raw: &str) -> Option<ParsedHostMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "join" => Some(ParsedHostMessage::Join {
            entity_id: parse_entity_id(object.get("entityId"))?,
        }),
        "leave" => Some(ParsedHostMessage::Leave {
            entity_id: parse_entity_id(object.get("entityId"))?,
        }),
        "move" => {
            let entity_id = parse_entity_id(object.get("entityId"))?;
            let position = Vec3::new(
                parse_finite(object.get("x"))?,
                parse_finite(object.get("y"))?,
                parse_finite(object.get("z"))?,
            );
            let airborne = parse_optional_bool(object.get("airborne"))?;
            let mounted = parse_optional_bool(object.get("mounted"))?;
            let at_ms = match object.get("atMs") {
                None => None,
                Some(value) => Some(value.as_u64()?),
            };
            Some(ParsedHostMessage::Move {
                entity_id,
                position,
                airborne,
                mounted,
                at_ms,
            })
        }
        "command" => Some(ParsedHostMessage::Command {
            entity_id: parse_entity_id(object.get("entityId"))?,
        }),
        "condition" => {
            let entity_id = parse_entity_id(object.get("entityId"))?;
            let instruction = object.get("instruction")?.as_str()?.to_string();
            Some(ParsedHostMessage::Condition {
                entity_id,
                instruction,
            })
        }
        "ping" => {
            let t = parse_finite(object.get("t"))?;
            Some(ParsedHostMessage::Ping { t })
        }
        _ => None,
    }
}

fn parse_entity_id(value: Option<&Value>) -> Option<String> {
    sanitize_entity_id(value?.as_str()?)
}

fn parse_finite(value: Option<&Value>) -> Option<f64> {
    value?.as_f64().filter(|number| number.is_finite())
}

fn parse_optional_bool(value: Option<&Value>) -> Option<bool> {
    match value {
        None => Some(false),
        Some(value) => value.as_bool(),
    }
}
