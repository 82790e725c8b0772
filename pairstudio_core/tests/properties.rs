use std::{collections::HashSet, time::Duration};

use futures_util::future::join_all;
use pairstudio_core::{
    Direction, GameError, GridPosition, ObjectId, Timing, Turn,
    board::Board,
    controller::{Controller, Heading},
    iso,
    object::{GridObject, MoveableConfig, StationaryConfig},
    queue::ActionQueue,
    rules::{self, Outcome, WinCondition},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

fn at(row: usize, col: usize) -> GridPosition {
    GridPosition::new(row, col)
}

fn floor(rows: usize, cols: usize) -> Board {
    let mut board = Board::new(64, 32);
    board.create_floor(&vec![vec![0; cols]; rows]).unwrap();
    board
}

fn controller() -> Controller {
    Controller::new(Timing::instant())
}

#[test]
fn projection_round_trips_for_even_tile_sizes() {
    for (tw, th) in [(64.0, 32.0), (2.0, 2.0), (128.0, 64.0), (30.0, 18.0)] {
        for row in 0..50 {
            for col in 0..50 {
                let p = iso::grid_to_screen(row as f64, col as f64, tw, th, 0.0);
                assert_eq!(iso::screen_to_grid(p.x, p.y, tw, th), (row, col), "tile {tw}x{th}");
            }
        }
    }
}

#[tokio::test]
async fn four_turns_come_full_circle() {
    let mut board = floor(1, 1);
    board.place_agent(at(0, 0), Direction::West).unwrap();
    let c = controller();
    for _ in 0..4 {
        assert!(c.rotate(&mut board, Turn::Clockwise).await.unwrap());
    }
    assert_eq!(board.agent().unwrap().direction(), Direction::West);
    c.rotate(&mut board, Turn::Clockwise).await.unwrap();
    c.rotate(&mut board, Turn::CounterClockwise).await.unwrap();
    assert_eq!(board.agent().unwrap().direction(), Direction::West);
}

#[tokio::test]
async fn random_programs_never_stack_resting_items() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..20 {
        let mut board = floor(6, 6);
        board.add_stationary_object(at(0, 0), StationaryConfig::conveyor("a")).unwrap();
        board.add_stationary_object(at(5, 5), StationaryConfig::conveyor("b")).unwrap();
        for (i, pos) in [at(0, 0), at(2, 3), at(4, 1)].into_iter().enumerate() {
            board.add_moveable_object(pos, MoveableConfig::boxed(format!("box{i}"))).unwrap();
        }
        board.place_agent(at(3, 3), Direction::North).unwrap();
        let c = controller();

        for _ in 0..300 {
            match rng.random_range(0..7) {
                0 => c.step(&mut board, Heading::Forward).await.unwrap(),
                1 => c.step(&mut board, Heading::Backward).await.unwrap(),
                2 => c.rotate(&mut board, Turn::Clockwise).await.unwrap(),
                3 => c.face(&mut board, Direction::ALL[rng.random_range(0..4)]).await.unwrap(),
                4 => c.pick_up(&mut board).await.unwrap(),
                5 => c.drop_item(&mut board).await.unwrap(),
                _ => {
                    let to = at(rng.random_range(0..7), rng.random_range(0..7));
                    c.set_position(&mut board, to).await.unwrap()
                }
            };

            let mut seen = HashSet::new();
            for item in board.resting_moveables() {
                assert!(seen.insert(item.position()), "two items rest on {}", item.position());
            }
            let agent = board.agent().unwrap();
            assert!(!seen.contains(&agent.position()), "agent stands on an item");
            if let Some(id) = agent.carrying() {
                let carried = board.moveable_by_id(id).unwrap();
                assert!(carried.is_carried());
                assert_eq!(carried.position(), agent.position());
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn queue_completes_in_enqueue_order_despite_delays() {
    let mut rng = StdRng::seed_from_u64(7);
    let queue = ActionQueue::with_state(Vec::<usize>::new());
    let pending: Vec<_> = (0..25)
        .map(|i| {
            let delay = Duration::from_millis(rng.random_range(0..200));
            queue.enqueue(format!("op {i}"), move |log: &mut Vec<usize>| {
                Box::pin(async move {
                    tokio::time::sleep(delay).await;
                    log.push(i);
                    Ok::<_, GameError>(log.clone())
                })
            })
        })
        .collect();

    let results = join_all(pending).await;
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap(), (0..=i).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn move_into_fixture_changes_nothing() {
    let mut board = floor(3, 3);
    board
        .add_stationary_object(at(1, 2), StationaryConfig::new("crate_stack"))
        .unwrap();
    board.place_agent(at(1, 1), Direction::East).unwrap();
    let before = board.agent().unwrap().state();
    assert!(!controller().step(&mut board, Heading::Forward).await.unwrap());
    assert_eq!(board.agent().unwrap().state(), before);
}

#[tokio::test]
async fn drop_on_bare_floor_succeeds_then_fails_the_level() {
    let mut board = floor(3, 3);
    board.add_stationary_object(at(0, 0), StationaryConfig::conveyor("belt")).unwrap();
    board.add_moveable_object(at(0, 0), MoveableConfig::boxed("box")).unwrap();
    board.place_agent(at(0, 1), Direction::West).unwrap();
    let c = controller();
    assert!(c.pick_up(&mut board).await.unwrap());
    assert!(c.face(&mut board, Direction::East).await.unwrap());

    assert!(c.drop_item(&mut board).await.unwrap());
    assert_eq!(board.moveable_by_id(&ObjectId::from("box")).unwrap().position(), at(0, 2));
    let outcome = rules::evaluate(&[], &board);
    assert!(matches!(outcome, Some(Outcome::Failed(_))));
}

#[tokio::test]
async fn delivering_to_the_target_conveyor_wins() {
    let mut board = floor(3, 3);
    board.add_stationary_object(at(0, 0), StationaryConfig::conveyor("in")).unwrap();
    board.add_stationary_object(at(2, 2), StationaryConfig::conveyor("out")).unwrap();
    board.add_moveable_object(at(0, 0), MoveableConfig::boxed("box1")).unwrap();
    board.place_agent(at(1, 0), Direction::North).unwrap();
    let conditions = [WinCondition::ItemAtPos {
        item_id: ObjectId::from("box1"),
        row: 2,
        col: 2,
    }];
    let c = controller();

    assert!(c.pick_up(&mut board).await.unwrap());
    assert_eq!(rules::evaluate(&conditions, &board), None);
    c.face(&mut board, Direction::South).await.unwrap();
    assert!(c.step(&mut board, Heading::Forward).await.unwrap());
    c.face(&mut board, Direction::East).await.unwrap();
    assert!(c.step(&mut board, Heading::Forward).await.unwrap());
    assert!(c.drop_item(&mut board).await.unwrap());
    assert_eq!(rules::evaluate(&conditions, &board), Some(Outcome::Won));
}

#[tokio::test]
async fn second_pickup_is_refused() {
    let mut board = floor(2, 3);
    board.add_moveable_object(at(0, 0), MoveableConfig::boxed("held")).unwrap();
    board.add_moveable_object(at(1, 2), MoveableConfig::boxed("other")).unwrap();
    board.place_agent(at(1, 0), Direction::North).unwrap();
    let c = controller();
    assert!(c.pick_up(&mut board).await.unwrap());
    c.face(&mut board, Direction::East).await.unwrap();
    c.step(&mut board, Heading::Forward).await.unwrap();
    assert!(!c.pick_up(&mut board).await.unwrap());
    assert_eq!(board.agent().unwrap().carrying(), Some(&ObjectId::from("held")));
}

#[tokio::test]
async fn facing_off_the_top_left_corner_cannot_move() {
    let mut board = floor(2, 2);
    board.place_agent(at(0, 0), Direction::North).unwrap();
    assert!(!controller().step(&mut board, Heading::Forward).await.unwrap());
    assert_eq!(board.agent().unwrap().position(), at(0, 0));
}
