use std::{sync::Arc, time::Duration};

use futures_util::{FutureExt, future::BoxFuture};
use pairstudio_core::{
    Direction, GameError, GameSession, LevelCatalog, LevelConfig, Settings, TracingObserver,
    rules::{Medal, Outcome},
};

fn session(settings: Settings) -> GameSession {
    GameSession::new(settings, LevelCatalog::builtin().unwrap(), Arc::new(TracingObserver))
}

#[tokio::test]
async fn level_001_known_solution_wins() {
    let mut game = session(Settings::instant());
    game.load_level("level_001").unwrap();

    // the whole program is issued before anything runs
    let program: Vec<BoxFuture<'static, Result<bool, GameError>>> = vec![
        game.move_forward(1).boxed(),
        game.pickup_item().boxed(),
        game.rotate_right().boxed(),
        game.rotate_right().boxed(),
        game.move_forward(5).boxed(),
        game.drop_item().boxed(),
    ];
    for (i, step) in program.into_iter().enumerate() {
        assert!(step.await.unwrap(), "instruction {i} failed");
    }

    let scene = game.subscribe_scene().borrow().clone().unwrap();
    assert_eq!(scene.outcome, Some(Outcome::Won));
    assert_eq!(scene.steps, 10);
    assert_eq!(game.completed_levels(), vec!["level_001".to_string()]);
}

#[tokio::test]
async fn blocked_move_stops_early_and_counts_only_real_steps() {
    let mut game = session(Settings::instant());
    game.load_level("level_001").unwrap();
    // (2, 2) facing north: one free tile, then the input conveyor
    assert!(!game.move_forward(3).await.unwrap());
    let state = game.get_state().unwrap();
    assert_eq!((state.row, state.col), (1, 2));
    assert_eq!(game.subscribe_scene().borrow().as_ref().unwrap().steps, 1);
}

#[tokio::test]
async fn holes_block_the_obstacle_course() {
    let mut game = session(Settings::instant());
    game.load_level("level_005").unwrap();
    // (5, 0) facing east; turn north and walk up column 0
    assert!(game.face(Direction::North).await.unwrap());
    assert!(game.move_forward(2).await.unwrap());
    assert!(game.face(Direction::East).await.unwrap());
    assert_eq!(game.survey_front().await.unwrap().type_name(), "floor");
    assert!(game.move_forward(1).await.unwrap());
    assert!(game.face(Direction::North).await.unwrap());
    assert_eq!(game.survey_front().await.unwrap().type_name(), "wall");
    assert!(!game.move_forward(1).await.unwrap());
    let state = game.get_state().unwrap();
    assert_eq!((state.row, state.col), (3, 1));
}

#[tokio::test]
async fn backward_moves_and_teleports() {
    let mut game = session(Settings::instant());
    game.load_level("level_002").unwrap();
    // (3, 3) facing west
    assert!(game.move_backward(2).await.unwrap());
    let state = game.get_state().unwrap();
    assert_eq!((state.row, state.col, state.direction), (3, 5, Direction::West));

    assert!(!game.set_position(3, 1).await.unwrap(), "conveyor cell");
    assert!(!game.set_position(9, 9).await.unwrap(), "off the board");
    assert!(game.set_position(0, 0).await.unwrap());
    assert_eq!(game.subscribe_scene().borrow().as_ref().unwrap().steps, 2);
}

#[tokio::test(start_paused = true)]
async fn state_reports_motion_mid_step() {
    let mut game = session(Settings::default());
    game.load_level("level_001").unwrap();
    game.ready().await.unwrap();

    let moving = game.move_forward(1);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let mid = game.get_state().unwrap();
    assert!(mid.is_moving);
    assert_eq!((mid.row, mid.col), (2, 2));

    assert!(moving.await.unwrap());
    let done = game.get_state().unwrap();
    assert!(!done.is_moving);
    assert_eq!((done.row, done.col), (1, 2));
}

#[tokio::test]
async fn medals_and_delivery_to_a_named_conveyor() {
    let level = LevelConfig::from_json(
        r#"{
            "id": "sorting_drill",
            "map": {"data": [[1, 1, 1], [1, 1, 1]]},
            "objects": {
                "stationary": [
                    {"type": "conveyor", "id": "in", "row": 0, "col": 0},
                    {"type": "conveyor", "id": "out", "row": 0, "col": 2}
                ],
                "moveable": [{"type": "box", "id": "parcel", "row": 0, "col": 0}]
            },
            "player": {"startRow": 0, "startCol": 1, "startDir": "WEST"},
            "winConditions": [
                {"type": "itemOnStationary", "itemId": "parcel", "stationaryId": "out"}
            ],
            "medals": {"gold": 3, "silver": 5}
        }"#,
    )
    .unwrap();

    let mut game = session(Settings::instant());
    game.load_config(level).unwrap();
    assert!(game.pickup_item().await.unwrap());
    assert!(game.face(Direction::East).await.unwrap());
    assert!(game.drop_item().await.unwrap());

    let scene = game.subscribe_scene().borrow().clone().unwrap();
    assert_eq!(scene.outcome, Some(Outcome::Won));
    assert_eq!(game.current_level().unwrap().medals.grade(scene.steps), Some(Medal::Gold));
}
