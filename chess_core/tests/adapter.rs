mod fake_engine;

use chess_core::engine::protocol;
use chess_core::{
    AdapterSettings, DifficultyTier, EngineAdapter, EngineError, EngineStatus, MoveSource,
    Position,
};
use fake_engine::{FakeEngine, GoReply, Script};
use std::sync::Arc;
use std::time::Duration;

const QUICK: Duration = Duration::from_millis(50);

fn settings() -> AdapterSettings {
    AdapterSettings {
        init_timeout: Duration::from_millis(500),
        response_grace: QUICK,
    }
}

fn connect(script: Script) -> (EngineAdapter, FakeEngine) {
    let (ours, theirs) = tokio::io::duplex(4096);
    let engine = fake_engine::start(theirs, script);
    let (reader, writer) = tokio::io::split(ours);
    (EngineAdapter::from_io(reader, writer, settings()), engine)
}

async fn wait_for_line(engine: &FakeEngine, prefix: &str) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !engine.received().iter().any(|l| l.starts_with(prefix)) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("engine never received the line");
}

#[tokio::test]
async fn test_handshake_reaches_ready() {
    let (adapter, engine) = connect(Script::default());
    assert_eq!(adapter.status(), EngineStatus::Initializing);

    adapter.ensure_ready().await.unwrap();
    assert_eq!(adapter.status(), EngineStatus::Ready);
    assert_eq!(engine.received(), vec!["uci", "isready"]);
}

#[tokio::test]
async fn test_concurrent_callers_share_initialization() {
    let (adapter, engine) = connect(Script::default());
    let (a, b) = tokio::join!(adapter.ensure_ready(), adapter.ensure_ready());
    a.unwrap();
    b.unwrap();
    let handshakes = engine.received().iter().filter(|l| *l == "uci").count();
    assert_eq!(handshakes, 1);
}

#[tokio::test]
async fn test_best_move_ignores_ponder_and_returns_to_ready() {
    let (adapter, engine) = connect(Script::default());
    let best = adapter
        .get_best_move(&Position::initial(), DifficultyTier::Easy, Duration::from_millis(300))
        .await
        .unwrap();

    assert_eq!(best.address, "e7e5");
    assert_eq!(adapter.status(), EngineStatus::Ready);
    assert_eq!(
        engine.received(),
        vec![
            "uci".to_string(),
            "isready".to_string(),
            "setoption name Skill Level value 1".to_string(),
            protocol::position_command(Position::initial().as_fen()),
            "go movetime 300".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_rating_directives_precede_position() {
    let (adapter, engine) = connect(Script::default());
    adapter
        .get_best_move(&Position::initial(), DifficultyTier::VeryHard, QUICK)
        .await
        .unwrap();

    let received = engine.received();
    let search: Vec<&str> = received.iter().skip(2).map(String::as_str).collect();
    assert_eq!(
        search.get(..3),
        Some(
            &[
                "setoption name Skill Level value 20",
                "setoption name UCI_LimitStrength value true",
                "setoption name UCI_Elo value 2000",
            ][..]
        )
    );
    assert!(search.get(3).is_some_and(|l| l.starts_with("position fen ")));
    assert!(search.get(4).is_some_and(|l| l.starts_with("go movetime")));
}

#[tokio::test]
async fn test_silent_engine_times_out_into_error() {
    let (adapter, _engine) = connect(Script::replies([GoReply::Silent]));
    let err = adapter
        .get_best_move(&Position::initial(), DifficultyTier::Medium, QUICK)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Timeout(limit) if limit == QUICK * 2));
    assert_eq!(adapter.status(), EngineStatus::Error);

    // Error is sticky.
    let again = adapter
        .get_best_move(&Position::initial(), DifficultyTier::Medium, QUICK)
        .await;
    assert!(matches!(again, Err(EngineError::Initialization(_))));
}

#[tokio::test]
async fn test_bestmove_without_move_is_protocol_error() {
    let (adapter, _engine) = connect(Script::replies([GoReply::Immediate("bestmove")]));
    let result = adapter
        .get_best_move(&Position::initial(), DifficultyTier::Easy, QUICK)
        .await;
    assert!(matches!(result, Err(EngineError::Protocol(_))));
    assert_eq!(adapter.status(), EngineStatus::Error);
}

#[tokio::test]
async fn test_init_timeout_moves_to_error() {
    let (ours, theirs) = tokio::io::duplex(4096);
    let _engine = fake_engine::start(theirs, Script::mute());
    let (reader, writer) = tokio::io::split(ours);
    let adapter = EngineAdapter::from_io(
        reader,
        writer,
        AdapterSettings {
            init_timeout: QUICK,
            response_grace: QUICK,
        },
    );

    let err = adapter.ensure_ready().await.unwrap_err();
    assert!(matches!(err, EngineError::Initialization(reason) if reason.contains("handshake")));
    assert_eq!(adapter.status(), EngineStatus::Error);
}

#[tokio::test]
async fn test_terminate_is_idempotent() {
    let (adapter, engine) = connect(Script::default());
    adapter.ensure_ready().await.unwrap();

    adapter.terminate().await;
    assert_eq!(adapter.status(), EngineStatus::Idle);
    adapter.terminate().await;
    assert_eq!(adapter.status(), EngineStatus::Idle);

    wait_for_line(&engine, "quit").await;
    let result = adapter
        .get_best_move(&Position::initial(), DifficultyTier::Easy, QUICK)
        .await;
    assert!(matches!(result, Err(EngineError::Terminated)));
    assert!(adapter.ensure_ready().await.is_err());
}

#[tokio::test]
async fn test_terminate_releases_pending_search() {
    let (adapter, engine) = connect(Script::replies([GoReply::Silent]));
    let adapter = Arc::new(adapter);

    let searching = {
        let adapter = Arc::clone(&adapter);
        tokio::spawn(async move {
            adapter
                .get_best_move(&Position::initial(), DifficultyTier::Easy, Duration::from_secs(5))
                .await
        })
    };
    wait_for_line(&engine, "go").await;
    adapter.terminate().await;

    let result = searching.await.unwrap();
    assert!(matches!(result, Err(EngineError::Terminated)));
    assert_eq!(adapter.status(), EngineStatus::Idle);
}

#[tokio::test]
async fn test_later_search_stops_and_waits_for_earlier_one() {
    let (adapter, engine) = connect(Script::replies([
        GoReply::OnStop("bestmove a7a6"),
        GoReply::Immediate("bestmove e7e5"),
    ]));
    let adapter = Arc::new(adapter);

    let first = {
        let adapter = Arc::clone(&adapter);
        tokio::spawn(async move {
            adapter
                .get_best_move(&Position::initial(), DifficultyTier::Easy, Duration::from_secs(2))
                .await
        })
    };
    wait_for_line(&engine, "go").await;

    let second = adapter
        .get_best_move(&Position::initial(), DifficultyTier::Easy, Duration::from_secs(2))
        .await
        .unwrap();
    let first = first.await.unwrap().unwrap();

    assert_eq!(first.address, "a7a6");
    assert_eq!(second.address, "e7e5");

    let received = engine.received();
    let stop = received.iter().position(|l| l == "stop").unwrap();
    let gos: Vec<usize> = received
        .iter()
        .enumerate()
        .filter(|(_, l)| l.starts_with("go "))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(gos.len(), 2);
    assert!(gos[0] < stop && stop < gos[1]);
}

#[tokio::test]
async fn test_waiting_callers_stop_a_search_only_once() {
    let (adapter, engine) = connect(Script::replies([
        GoReply::After(Duration::from_millis(300), "bestmove a7a6"),
        GoReply::After(Duration::from_millis(100), "bestmove b7b6"),
        GoReply::Immediate("bestmove c7c6"),
    ]));
    let adapter = Arc::new(adapter);
    let search = |adapter: &Arc<EngineAdapter>| {
        let adapter = Arc::clone(adapter);
        tokio::spawn(async move {
            adapter
                .get_best_move(&Position::initial(), DifficultyTier::Easy, Duration::from_secs(2))
                .await
        })
    };

    let first = search(&adapter);
    wait_for_line(&engine, "go").await;
    let second = search(&adapter);
    wait_for_line(&engine, "stop").await;
    let third = search(&adapter);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(first.await.unwrap().unwrap().address, "a7a6");
    assert_eq!(second.await.unwrap().unwrap().address, "b7b6");
    assert_eq!(third.await.unwrap().unwrap().address, "c7c6");

    let received = engine.received();
    let stops = received.iter().filter(|l| *l == "stop").count();
    let gos = received.iter().filter(|l| l.starts_with("go ")).count();
    assert_eq!(stops, 1);
    assert_eq!(gos, 3);
}

#[tokio::test]
async fn test_status_changes_reach_move_source_subscribers() {
    let (adapter, _engine) = connect(Script::default());
    let source: &dyn MoveSource = &adapter;
    let mut changes = source.subscribe();
    assert_eq!(*changes.borrow_and_update(), EngineStatus::Initializing);

    tokio::time::timeout(Duration::from_secs(1), changes.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(*changes.borrow_and_update(), EngineStatus::Ready);
    assert_eq!(source.status(), EngineStatus::Ready);

    source.shutdown().await;
    assert_eq!(*changes.borrow_and_update(), EngineStatus::Idle);
}

#[tokio::test]
async fn test_engine_exit_moves_to_error() {
    let (adapter, engine) = connect(Script::default());
    adapter.ensure_ready().await.unwrap();

    engine.task.abort();
    let mut status = adapter.subscribe();
    tokio::time::timeout(
        Duration::from_secs(1),
        status.wait_for(|s| *s == EngineStatus::Error),
    )
    .await
    .unwrap()
    .unwrap();
}

#[tokio::test]
async fn test_missing_executable_yields_error_adapter() {
    let adapter = EngineAdapter::spawn(
        "/nonexistent/uci-engine",
        std::iter::empty::<&str>(),
        AdapterSettings::default(),
    );
    assert_eq!(adapter.status(), EngineStatus::Error);
    assert!(matches!(
        adapter.ensure_ready().await,
        Err(EngineError::Initialization(reason)) if reason.contains("could not start")
    ));
}
