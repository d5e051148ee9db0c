use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::game::Color;

/// Uniform reply wrapper for every client command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiResponse {
    pub fn ok(data: Value) -> ApiResponse {
        ApiResponse {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn ok_empty() -> ApiResponse {
        ApiResponse {
            success: true,
            message: None,
            data: None,
        }
    }

    pub fn err(message: impl Into<String>) -> ApiResponse {
        ApiResponse {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// Client-to-server command vocabulary, tagged by `action`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    SearchMatch {
        game_type: String,
        variant: crate::models::game::GameVariant,
        time_control: crate::models::game::TimeControl,
    },
    CancelSearch {},
    GetSearchStatus {},
    StartGame {
        game_id: String,
    },
    Rejoin {
        game_id: String,
    },
    Move {
        game_id: String,
        #[serde(rename = "move")]
        san: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<String>,
    },
    Resign {
        game_id: String,
    },
    OfferDraw {
        game_id: String,
    },
    AcceptDraw {
        game_id: String,
    },
    DeclineDraw {
        game_id: String,
    },
    OfferRematch {
        game_id: String,
    },
    AcceptRematch {
        game_id: String,
    },
    TimeUp {
        game_id: String,
        player_color: Color,
    },
    RequestTimeSync {
        game_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_parses_tagged_json() {
        let json = r#"{"action":"move","payload":{"game_id":"g-1","move":"Nf3"}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Move { game_id, san, from, to } => {
                assert_eq!(game_id, "g-1");
                assert_eq!(san, "Nf3");
                assert!(from.is_none());
                assert!(to.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let json = r#"{"action":"cancel_search","payload":{}}"#;
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(json).unwrap(),
            ClientMessage::CancelSearch {}
        ));
    }

    #[test]
    fn failure_response_carries_message_only() {
        let resp = ApiResponse::err("not your turn");
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"success":false,"message":"not your turn"}"#);
    }
}
