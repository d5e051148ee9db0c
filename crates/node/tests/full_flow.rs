use std::sync::Arc;

use chrono::Utc;

use event_bus::LocalEventBus;
use node::dispatch::{handle_client_message, handle_disconnect};
use node::runtime::{start_background, Background};
use node::state::AppState;
use shared::bus::EventBus;
use shared::models::durable::GameStatus;
use shared::models::game::{Color, EndReason, GameScore, GameVariant, TimeControl, TimeLeft};
use shared::models::player::{PlayerProfile, Ratings};
use shared::models::response::{ApiResponse, ClientMessage};
use shared::repositories::{
    InMemoryGameStore, InMemoryLiveStore, InMemoryUserProfileStore, LiveGameRepository, LiveStore,
    UserProfileStore,
};

struct TestNode {
    state: AppState,
    live_games: LiveGameRepository,
    game_store: Arc<InMemoryGameStore>,
    profiles: Arc<InMemoryUserProfileStore>,
    background: Background,
}

async fn test_node() -> TestNode {
    let live_store: Arc<dyn LiveStore> = Arc::new(InMemoryLiveStore::new());
    let game_store = Arc::new(InMemoryGameStore::new());
    let profiles = Arc::new(InMemoryUserProfileStore::new());
    let bus: Arc<dyn EventBus> = Arc::new(LocalEventBus::new());

    let state = AppState::build(
        live_store.clone(),
        game_store.clone(),
        profiles.clone(),
        bus.clone(),
        "node-1",
    );
    let background = start_background(&state, bus, game_store.clone())
        .await
        .unwrap();

    TestNode {
        state,
        live_games: LiveGameRepository::new(live_store),
        game_store,
        profiles,
        background,
    }
}

fn seed_profile(node: &TestNode, player_id: &str, rating: i32, games_played: u32) {
    let mut profile = PlayerProfile::new(player_id);
    profile.ratings = Ratings {
        rapid: rating,
        blitz: rating,
        bullet: rating,
    };
    profile.games_played = games_played;
    node.profiles.seed(profile);
}

fn rapid() -> TimeControl {
    TimeControl {
        time: 600,
        increment: 0,
    }
}

/// Let the bus forwarder hand everything to the pipeline before stopping it.
async fn drain() {
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
}

async fn search(node: &TestNode, player_id: &str) -> ApiResponse {
    handle_client_message(
        &node.state,
        player_id,
        &format!("ws-{}", player_id),
        ClientMessage::SearchMatch {
            game_type: "RAPID_10_0".to_string(),
            variant: GameVariant::Rapid,
            time_control: rapid(),
        },
    )
    .await
}

async fn play(node: &TestNode, player_id: &str, game_id: &str, san: &str) -> ApiResponse {
    handle_client_message(
        &node.state,
        player_id,
        "ws",
        ClientMessage::Move {
            game_id: game_id.to_string(),
            san: san.to_string(),
            from: None,
            to: None,
        },
    )
    .await
}

#[tokio::test]
async fn matchmaking_through_resignation_persists_the_game() {
    let node = test_node().await;
    seed_profile(&node, "alice", 1200, 50);
    seed_profile(&node, "bob", 1240, 50);

    let first = search(&node, "alice").await;
    assert!(first.success);
    assert_eq!(first.data.as_ref().unwrap()["found"], false);

    let second = search(&node, "bob").await;
    assert!(second.success);
    let data = second.data.unwrap();
    assert_eq!(data["found"], true, "bob's tick pairs with alice: {}", data);
    assert_eq!(data["opponent"], "alice");
    let game_id = data["gameId"].as_str().unwrap().to_string();

    let game = node.live_games.load(&game_id).await.unwrap().unwrap();
    assert_eq!(game.time_left_ms.white, 600_000);
    assert_eq!(game.time_left_ms.black, 600_000);
    let white = game.player_of(Color::White).player_id.clone();
    let black = game.player_of(Color::Black).player_id.clone();

    // A few moves through the dispatch surface.
    let response = play(&node, &white, &game_id, "e4").await;
    assert!(response.success, "{:?}", response.message);
    assert_eq!(response.data.as_ref().unwrap()["pgn"], "1. e4");
    let response = play(&node, &black, &game_id, "e5").await;
    assert!(response.success);
    assert_eq!(response.data.as_ref().unwrap()["pgn"], "1. e4 e5");

    // Out-of-turn and non-player moves stay on the caller's channel as
    // failures.
    let response = play(&node, &black, &game_id, "Nf6").await;
    assert!(!response.success);
    let response = play(&node, "mallory", &game_id, "Nf3").await;
    assert!(!response.success);

    let response = handle_client_message(
        &node.state,
        &black,
        "ws",
        ClientMessage::Resign {
            game_id: game_id.clone(),
        },
    )
    .await;
    assert!(response.success);
    let end = response.data.unwrap();
    assert_eq!(end["reason"], "resignation");
    assert_eq!(end["score"], "1-0");

    // A second resignation loses the finalization race.
    let response = handle_client_message(
        &node.state,
        &white,
        "ws",
        ClientMessage::Resign {
            game_id: game_id.clone(),
        },
    )
    .await;
    assert!(!response.success);

    // Ratings applied exactly once, symmetric at equal K.
    let white_profile = node.profiles.get_profile(&white).await.unwrap();
    let black_profile = node.profiles.get_profile(&black).await.unwrap();
    assert_eq!(white_profile.games_played, 51);
    assert_eq!(black_profile.games_played, 51);
    assert_eq!(white_profile.wins, 1);
    assert_eq!(black_profile.losses, 1);

    // Shutdown drains the pipeline; the durable record is complete.
    drain().await;
    node.background.shutdown().await;
    let durable = node.game_store.game(&game_id).unwrap();
    assert_eq!(durable.status, GameStatus::Completed);
    assert_eq!(durable.moves.len(), 2);
    assert_eq!(durable.pgn, "1. e4 e5");
    let result = durable.result.unwrap();
    assert_eq!(result.reason, EndReason::Resignation);
    assert_eq!(result.score, GameScore::WhiteWins);
    for player in &durable.players {
        assert!(player.post_rating.is_some());
    }
}

#[tokio::test]
async fn move_applies_elapsed_time_and_increment() {
    let node = test_node().await;
    let game = node
        .state
        .games
        .create_game(
            game_core::PlayerDto {
                player_id: "alice".to_string(),
                rating: 1200,
                connection_id: None,
            },
            game_core::PlayerDto {
                player_id: "bob".to_string(),
                rating: 1200,
                connection_id: None,
            },
            GameVariant::Blitz,
            TimeControl {
                time: 300,
                increment: 2,
            },
            None,
        )
        .await
        .unwrap();

    // White thinks for 4 s.
    let mut stored = node.live_games.load(&game.game_id).await.unwrap().unwrap();
    stored.last_move_at -= 4000;
    node.live_games.save(&stored).await.unwrap();

    let response = play(&node, "alice", &game.game_id, "e4").await;
    assert!(response.success);
    let data = response.data.unwrap();
    let white_ms = data["timeLeftMs"]["white"].as_u64().unwrap();
    assert!(white_ms <= 298_000, "got {}", white_ms);
    assert!(white_ms >= 297_500, "got {}", white_ms);
    assert_eq!(data["turn"], "black");
    assert_eq!(data["moveNumber"], 1);
    assert_eq!(data["pgn"], "1. e4");

    node.background.shutdown().await;
}

#[tokio::test]
async fn a_flag_fall_is_caught_within_one_scan() {
    let node = test_node().await;
    let game = node
        .state
        .games
        .create_game(
            game_core::PlayerDto {
                player_id: "alice".to_string(),
                rating: 1200,
                connection_id: None,
            },
            game_core::PlayerDto {
                player_id: "bob".to_string(),
                rating: 1200,
                connection_id: None,
            },
            GameVariant::Rapid,
            rapid(),
            None,
        )
        .await
        .unwrap();

    // White has been burning its last half second for two seconds now.
    node.state.time_manager.on_move(
        &game.game_id,
        Utc::now().timestamp_millis() - 2000,
        Color::White,
        TimeLeft {
            white: 500,
            black: 600_000,
        },
    );
    node.state.time_manager.scan().await;

    let stored = node.live_games.load(&game.game_id).await.unwrap().unwrap();
    assert!(stored.game_over);
    assert_eq!(stored.winner, Some(Color::Black));
    assert_eq!(stored.end_reason, Some(EndReason::Timeout));
    assert_eq!(stored.result, Some(GameScore::BlackWins));
    assert_eq!(stored.time_left_ms.white, 0);

    drain().await;
    node.background.shutdown().await;
    let durable = node.game_store.game(&game.game_id).unwrap();
    assert_eq!(durable.status, GameStatus::Completed);
    assert_eq!(durable.result.unwrap().reason, EndReason::Timeout);
}

#[tokio::test]
async fn disconnect_freezes_the_clock_and_rejoin_resumes() {
    let node = test_node().await;
    let game = node
        .state
        .games
        .create_game(
            game_core::PlayerDto {
                player_id: "alice".to_string(),
                rating: 1200,
                connection_id: None,
            },
            game_core::PlayerDto {
                player_id: "bob".to_string(),
                rating: 1200,
                connection_id: None,
            },
            GameVariant::Rapid,
            rapid(),
            None,
        )
        .await
        .unwrap();

    handle_disconnect(&node.state, "alice", Some(&game.game_id)).await;
    let frozen = node.state.time_manager.time_sync(&game.game_id).unwrap();
    let later = node.state.time_manager.time_sync(&game.game_id).unwrap();
    assert_eq!(frozen.white_ms, later.white_ms);

    let response = handle_client_message(
        &node.state,
        "alice",
        "ws-new",
        ClientMessage::Rejoin {
            game_id: game.game_id.clone(),
        },
    )
    .await;
    assert!(response.success);
    assert_eq!(response.data.unwrap()["gameId"], game.game_id.as_str());

    node.background.shutdown().await;
}

#[tokio::test]
async fn premature_time_up_reports_are_corrected_not_honored() {
    let node = test_node().await;
    let game = node
        .state
        .games
        .create_game(
            game_core::PlayerDto {
                player_id: "alice".to_string(),
                rating: 1200,
                connection_id: None,
            },
            game_core::PlayerDto {
                player_id: "bob".to_string(),
                rating: 1200,
                connection_id: None,
            },
            GameVariant::Rapid,
            rapid(),
            None,
        )
        .await
        .unwrap();

    let response = handle_client_message(
        &node.state,
        "alice",
        "ws",
        ClientMessage::TimeUp {
            game_id: game.game_id.clone(),
            player_color: Color::Black,
        },
    )
    .await;
    assert!(response.success);
    let data = response.data.unwrap();
    assert_eq!(data["forfeited"], false);
    assert!(data["timeSync"]["blackMs"].as_u64().unwrap() > 590_000);

    // The game is untouched.
    let stored = node.live_games.load(&game.game_id).await.unwrap().unwrap();
    assert!(!stored.game_over);

    node.background.shutdown().await;
}

#[tokio::test]
async fn moves_on_unknown_games_fail_cleanly() {
    let node = test_node().await;
    let response = play(&node, "alice", "no-such-game", "e4").await;
    assert!(!response.success);
    assert_eq!(response.message.as_deref(), Some("Game not found"));
    node.background.shutdown().await;
}
