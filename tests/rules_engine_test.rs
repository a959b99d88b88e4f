//! Behavioral tests for the tic-tac-toe rules engine.

use duplex_tictactoe::{GameStatus, Mark, Replay, RulesEngine, RulesError, Square};

fn started() -> RulesEngine {
    let mut engine = RulesEngine::new();
    engine.join("server-a".into()).unwrap();
    engine.join("server-b".into()).unwrap();
    engine
}

fn play(engine: &mut RulesEngine, moves: &[(usize, usize)]) {
    for &(row, col) in moves {
        let mark = *engine.state().next_turn();
        engine.apply_move(row, col, mark).unwrap();
    }
}

#[test]
fn test_versions_strictly_increase_and_marks_stay_balanced() {
    let mut engine = started();
    let mut last = engine.version();
    for (row, col) in [(0, 0), (1, 1), (0, 1), (2, 2), (1, 0)] {
        let mark = *engine.state().next_turn();
        let snapshot = engine.apply_move(row, col, mark).unwrap();
        assert!(*snapshot.version() > last);
        last = *snapshot.version();

        let x = snapshot.board().count(Mark::X);
        let o = snapshot.board().count(Mark::O);
        assert!(x == o || x == o + 1, "x={x} o={o}");
    }
}

#[test]
fn test_stale_remote_move_is_noop() {
    let mut engine = started();
    engine.apply_move(1, 1, Mark::X).unwrap();
    let before = engine.snapshot();

    let replay = engine
        .apply_remote_move(0, 0, Mark::O, before.version() - 1)
        .unwrap();
    assert!(!replay.is_applied());
    assert_eq!(engine.snapshot(), before);

    let replay = engine
        .apply_remote_move(0, 0, Mark::O, *before.version())
        .unwrap();
    assert!(!replay.is_applied());
    assert_eq!(engine.snapshot(), before);
}

#[test]
fn test_won_game_rejects_further_moves() {
    let mut engine = started();
    play(&mut engine, &[(0, 0), (1, 0), (0, 1), (1, 1), (0, 2)]);
    assert_eq!(*engine.state().status(), GameStatus::Won(Mark::X));

    let before = engine.snapshot();
    assert_eq!(engine.apply_move(1, 2, Mark::O), Err(RulesError::GameOver));
    assert_eq!(engine.snapshot(), before);
}

#[test]
fn test_full_board_without_line_is_draw() {
    let mut engine = started();
    // X O X / X O O / O X X
    play(
        &mut engine,
        &[
            (0, 0),
            (0, 1),
            (0, 2),
            (1, 1),
            (1, 0),
            (1, 2),
            (2, 1),
            (2, 0),
            (2, 2),
        ],
    );
    assert_eq!(*engine.state().status(), GameStatus::Draw);
}

#[test]
fn test_third_join_fails() {
    let mut engine = RulesEngine::new();
    assert_eq!(engine.join("a".into()), Ok(Mark::X));
    assert_eq!(engine.join("b".into()), Ok(Mark::O));
    assert_eq!(engine.join("a".into()), Err(RulesError::GameFull));
}

#[test]
fn test_reset_from_any_state() {
    let mut engine = started();
    play(&mut engine, &[(0, 0), (1, 1), (2, 2)]);
    let before = engine.version();

    let snapshot = engine.reset();
    assert!(snapshot.board().squares().iter().all(|s| *s == Square::Empty));
    assert_eq!(*snapshot.status(), GameStatus::WaitingForPlayers);
    assert_eq!(*snapshot.player_count(), 0);
    assert_eq!(*snapshot.version(), before + 1);
}

#[test]
fn test_remote_move_converges_peer() {
    let mut a = started();
    let mut b = RulesEngine::from_snapshot(a.snapshot()).unwrap();

    let published = a.apply_move(1, 1, Mark::X).unwrap();
    let replay = b
        .apply_remote_move(1, 1, Mark::X, *published.version())
        .unwrap();

    let Replay::Applied(snapshot) = replay else {
        panic!("expected the move to apply");
    };
    assert_eq!(snapshot, published);
    assert_eq!(b.state().board().get(1, 1), Some(Square::Occupied(Mark::X)));
}

#[test]
fn test_move_error_messages() {
    let mut engine = started();
    assert_eq!(
        engine.apply_move(3, 0, Mark::X).unwrap_err().to_string(),
        "Invalid move"
    );
    assert_eq!(
        engine.apply_move(0, 0, Mark::O).unwrap_err().to_string(),
        "Not your turn"
    );
    engine.apply_move(0, 0, Mark::X).unwrap();
    assert_eq!(
        engine.apply_move(0, 0, Mark::O).unwrap_err().to_string(),
        "Cell already occupied"
    );
}
