use serde_json::json;
use tracing::info;

use matchmaker::TickResult;
use shared::models::response::{ApiResponse, ClientMessage};
use time_manager::TimeUpVerdict;

use crate::state::AppState;

/// Route one authenticated client message to its owning service and wrap the
/// outcome. Errors stay on the caller's channel; room broadcasts ride the
/// event bus after the authoritative write.
pub async fn handle_client_message(
    state: &AppState,
    player_id: &str,
    connection_id: &str,
    message: ClientMessage,
) -> ApiResponse {
    match message {
        ClientMessage::SearchMatch {
            game_type,
            variant,
            time_control,
        } => {
            let rating = match state.profiles.get_profile(player_id).await {
                Ok(profile) => profile.ratings.get(variant),
                Err(e) => return ApiResponse::err(e.to_string()),
            };
            if let Err(e) = state
                .matchmaking
                .start_search(
                    player_id,
                    &game_type,
                    variant,
                    time_control,
                    rating,
                    connection_id,
                )
                .await
            {
                return ApiResponse::err(e.to_string());
            }
            match state.matchmaking.tick(player_id).await {
                Ok(TickResult::Found {
                    game_id,
                    opponent,
                    current_range,
                    search_duration_ms,
                }) => ApiResponse::ok(json!({
                    "found": true,
                    "gameId": game_id,
                    "opponent": opponent,
                    "finalRange": current_range,
                    "searchDuration": search_duration_ms,
                })),
                Ok(TickResult::Searching {
                    current_range,
                    search_duration_ms,
                }) => ApiResponse::ok(json!({
                    "found": false,
                    "currentRange": current_range,
                    "searchDuration": search_duration_ms,
                })),
                Err(e) => ApiResponse::err(e.to_string()),
            }
        }
        ClientMessage::CancelSearch {} => match state.matchmaking.cancel(player_id).await {
            Ok(()) => ApiResponse::ok_empty(),
            Err(e) => ApiResponse::err(e.to_string()),
        },
        ClientMessage::GetSearchStatus {} => match state.matchmaking.status(player_id).await {
            Ok(status) => match serde_json::to_value(&status) {
                Ok(value) => ApiResponse::ok(value),
                Err(e) => ApiResponse::err(e.to_string()),
            },
            Err(e) => ApiResponse::err(e.to_string()),
        },
        ClientMessage::StartGame { game_id } | ClientMessage::Rejoin { game_id } => {
            match state.games.rejoin(&game_id, player_id).await {
                Ok(game) => match serde_json::to_value(&game) {
                    Ok(value) => ApiResponse::ok(value),
                    Err(e) => ApiResponse::err(e.to_string()),
                },
                Err(e) => ApiResponse::err(e.to_string()),
            }
        }
        ClientMessage::Move {
            game_id,
            san,
            from,
            to,
        } => {
            match state
                .games
                .make_move(&game_id, player_id, &san, from.as_deref(), to.as_deref())
                .await
            {
                Ok(outcome) => {
                    let game_over = outcome.game_end.as_ref().map(|end| {
                        json!({
                            "winner": end.winner,
                            "reason": end.reason,
                            "score": end.score.as_str(),
                            "ratingChanges": end.rating_changes,
                        })
                    });
                    ApiResponse::ok(json!({
                        "san": outcome.san,
                        "fen": outcome.fen,
                        "pgn": outcome.game.pgn,
                        "moveNumber": outcome.move_number,
                        "timeLeftMs": outcome.game.time_left_ms,
                        "turn": outcome.game.turn,
                        "gameOver": game_over,
                    }))
                }
                Err(e) => ApiResponse::err(e.to_string()),
            }
        }
        ClientMessage::Resign { game_id } => match state.games.resign(&game_id, player_id).await {
            Ok(end) => ApiResponse::ok(json!({
                "winner": end.winner,
                "reason": end.reason,
                "score": end.score.as_str(),
                "ratingChanges": end.rating_changes,
            })),
            Err(e) => ApiResponse::err(e.to_string()),
        },
        ClientMessage::OfferDraw { game_id } => {
            match state.games.offer_draw(&game_id, player_id).await {
                Ok(()) => ApiResponse::ok_empty(),
                Err(e) => ApiResponse::err(e.to_string()),
            }
        }
        ClientMessage::AcceptDraw { game_id } => {
            match state.games.accept_draw(&game_id, player_id).await {
                Ok(end) => ApiResponse::ok(json!({
                    "winner": end.winner,
                    "reason": end.reason,
                    "score": end.score.as_str(),
                    "ratingChanges": end.rating_changes,
                })),
                Err(e) => ApiResponse::err(e.to_string()),
            }
        }
        ClientMessage::DeclineDraw { game_id } => {
            match state.games.decline_draw(&game_id, player_id).await {
                Ok(()) => ApiResponse::ok_empty(),
                Err(e) => ApiResponse::err(e.to_string()),
            }
        }
        ClientMessage::OfferRematch { game_id } => {
            match state.games.offer_rematch(&game_id, player_id).await {
                Ok(()) => ApiResponse::ok_empty(),
                Err(e) => ApiResponse::err(e.to_string()),
            }
        }
        ClientMessage::AcceptRematch { game_id } => {
            match state.games.accept_rematch(&game_id, player_id).await {
                Ok(game) => ApiResponse::ok(json!({
                    "gameId": game.game_id,
                    "players": game.players,
                    "timeLeftMs": game.time_left_ms,
                })),
                Err(e) => ApiResponse::err(e.to_string()),
            }
        }
        ClientMessage::TimeUp {
            game_id,
            player_color,
        } => match state.time_manager.report_time_up(&game_id, player_color).await {
            TimeUpVerdict::Forfeited => ApiResponse::ok(json!({ "forfeited": true })),
            TimeUpVerdict::Corrected(sync) => match serde_json::to_value(sync) {
                Ok(value) => ApiResponse::ok(json!({ "forfeited": false, "timeSync": value })),
                Err(e) => ApiResponse::err(e.to_string()),
            },
            TimeUpVerdict::UnknownGame => ApiResponse::err("Game not found"),
        },
        ClientMessage::RequestTimeSync { game_id } => {
            match state.time_manager.time_sync(&game_id) {
                Some(sync) => match serde_json::to_value(sync) {
                    Ok(value) => ApiResponse::ok(value),
                    Err(e) => ApiResponse::err(e.to_string()),
                },
                None => ApiResponse::err("Game not found"),
            }
        }
    }
}

/// A dropped socket cancels the search but never the game: the clock freezes
/// and a reconnect resumes it.
pub async fn handle_disconnect(state: &AppState, player_id: &str, live_game_id: Option<&str>) {
    info!("Player {} disconnected", player_id);
    if let Err(e) = state.matchmaking.cancel(player_id).await {
        tracing::warn!("Search cleanup failed for {}: {}", player_id, e);
    }
    if let Some(game_id) = live_game_id {
        state.time_manager.pause(game_id);
    }
}
