//! Performance benchmarks for critical session systems

use server::machine::{Input, Machine, NextStates};
use server::pubsub::{Publisher, Target};
use server::session::SessionHandle;
use server::store::{MemoryStore, Storer};
use shared::{Category, Command, Event, GameData, Question};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn lorem_ipsum() -> GameData {
    let category = |name: &str, texts: [&str; 3]| Category {
        name: name.to_string(),
        questions: texts
            .iter()
            .map(|text| Question {
                question: text.to_string(),
                answers: vec![],
            })
            .collect(),
    };

    GameData {
        categories: vec![
            category("Lorem Ipsum 1", ["1", "2", "3"]),
            category("Lorem Ipsum 2", ["4", "5", "6"]),
        ],
        score_multiplier: Some(100.0),
    }
}

/// Benchmarks fan-out of one event to many connection publishers
#[test]
fn benchmark_publish_fan_out() {
    let root = Publisher::new();
    let cancel = CancellationToken::new();
    let mut queues = Vec::new();

    for _ in 0..1000 {
        let (tx, rx) = mpsc::channel(128);
        let connection = Arc::new(Publisher::new());
        connection.subscribe(Target::Queue(tx));
        root.subscribe(Target::Publisher(connection));
        queues.push(rx);
    }

    let event = Event::ButtonPressed {
        player_name: "Player 1".to_string(),
    };
    let iterations = 100;
    let start = Instant::now();

    for _ in 0..iterations {
        assert_eq!(root.publish(&event, &cancel), 1000);
    }

    let duration = start.elapsed();
    println!(
        "Publish fan-out: {} events × {} subscribers in {:?} ({:.2} μs/event)",
        iterations,
        queues.len(),
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks a full subscriber being dropped instead of blocking
#[test]
fn stress_test_slow_subscribers() {
    let root = Publisher::new();
    let cancel = CancellationToken::new();
    let mut queues = Vec::new();

    for _ in 0..500 {
        let (tx, rx) = mpsc::channel(1);
        root.subscribe(Target::Queue(tx));
        queues.push(rx);
    }

    let start = Instant::now();

    assert_eq!(root.publish(&Event::GameStarted, &cancel), 500);
    assert_eq!(root.publish(&Event::GameStarted, &cancel), 0);
    assert!(root.is_empty());

    let duration = start.elapsed();
    println!("Slow subscribers: {} dropped in {:?}", queues.len(), duration);

    // Should complete in under 100ms
    assert!(duration.as_millis() < 100);
}

/// Benchmarks decoding of client commands
#[test]
fn benchmark_command_decoding() {
    let frames = [
        r#"{"type":"JoinGame","gameID":"abcd1234","playerName":"Player 1","adminPassword":"admin"}"#,
        r#"{"type":"BeginGame"}"#,
        r#"{"type":"ChooseQuestion","category":1,"question":2}"#,
        r#"{"type":"PressButton"}"#,
        r#"{"type":"PlayerJudgment","correct":true}"#,
    ];

    let iterations = 20_000;
    let start = Instant::now();

    for _ in 0..iterations {
        for frame in frames {
            let _command: Command = serde_json::from_str(frame).unwrap();
        }
    }

    let duration = start.elapsed();
    println!(
        "Command decoding: {} frames in {:?} ({:.2} ns/frame)",
        iterations * frames.len(),
        duration,
        duration.as_nanos() as f64 / (iterations * frames.len()) as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks encoding of the largest event the server sends
#[test]
fn benchmark_event_encoding() {
    let data = lorem_ipsum();
    let event = Event::JoinedGame {
        game_id: "abcd1234".to_string(),
        is_admin: true,
        game_info: data.info(),
        game_data: Some(data),
    };

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _text = serde_json::to_string(&event).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Event encoding: {} events in {:?} ({:.2} μs/event)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Step {
    Tick,
    Tock,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Input for Step {
    type Kind = Step;

    fn kind(&self) -> Step {
        *self
    }
}

/// Benchmarks raw transition throughput of the engine
#[test]
fn benchmark_machine_transitions() {
    let mut machine: Machine<u64, (), Step, fmt::Error> = Machine::new(|_| NextStates::of([Step::Tick]))
        .on(Step::Tick, |count, _, _| {
            *count += 1;
            Ok(NextStates::of([Step::Tock]))
        })
        .on(Step::Tock, |count, _, _| {
            *count += 1;
            Ok(NextStates::of([Step::Tick]))
        });

    let mut count = 0;
    machine.start(&count).unwrap();

    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let step = if i % 2 == 0 { Step::Tick } else { Step::Tock };
        machine.change(&mut count, &mut (), step).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Machine transitions: {} transitions in {:?} ({:.2} ns/transition)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(count, iterations);
    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks complete games played through session actors
#[tokio::test]
async fn benchmark_full_games() {
    let store = Arc::new(MemoryStore::new());
    let games = 20;
    let start = Instant::now();

    for _ in 0..games {
        let id = store
            .create_game(lorem_ipsum(), Some("admin".to_string()))
            .unwrap();
        let session = SessionHandle::spawn(
            id.clone(),
            lorem_ipsum(),
            store.clone(),
            64,
            CancellationToken::new(),
        )
        .unwrap();

        let (tx, _player_rx) = mpsc::channel(64);
        let mut player = session.connect(tx, CancellationToken::new());
        let (tx, _admin_rx) = mpsc::channel(64);
        let mut admin = session.connect(tx, CancellationToken::new());

        let join = |name: &str, password: Option<&str>| Command::JoinGame {
            game_id: id.clone(),
            player_name: name.to_string(),
            admin_password: password.map(str::to_string),
        };

        session
            .handle_command(&mut player, join("Player 1", None))
            .await
            .unwrap();
        session
            .handle_command(&mut admin, join("Admin", Some("admin")))
            .await
            .unwrap();
        session
            .handle_command(&mut admin, Command::BeginGame)
            .await
            .unwrap();

        for category in 0..2 {
            for question in 0..3 {
                session
                    .handle_command(&mut player, Command::ChooseQuestion { category, question })
                    .await
                    .unwrap();
                session
                    .handle_command(&mut player, Command::PressButton)
                    .await
                    .unwrap();
                session
                    .handle_command(&mut admin, Command::PlayerJudgment { correct: true })
                    .await
                    .unwrap();
            }
        }
    }

    let duration = start.elapsed();
    println!(
        "Full games: {} games in {:?} ({:.2} ms/game)",
        games,
        duration,
        duration.as_millis() as f64 / games as f64
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}
