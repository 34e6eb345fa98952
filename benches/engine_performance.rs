//! Performance benchmarks for the move engine, pairing and move submission

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tictac_parlor::engine::{apply_move, check_winner, Board};
use tictac_parlor::matchmaking::MatchmakingQueue;
use tictac_parlor::session::{InMemorySessionStore, InMemoryStatsSink, Session, SessionRegistry};
use tictac_parlor::types::{Participant, Symbol};
use std::sync::Arc;

fn create_bench_registry() -> Arc<SessionRegistry> {
    Arc::new(
        SessionRegistry::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryStatsSink::new()),
        )
        .unwrap()
        .with_seed(1),
    )
}

fn bench_check_winner(c: &mut Criterion) {
    let boards = [
        Board::new(),
        Board::from_rows(["XXX", "OO.", "..."]).unwrap(),
        Board::from_rows(["XOX", "XOO", "OXX"]).unwrap(),
    ];

    c.bench_function("check_winner_3_boards", |b| {
        b.iter(|| {
            for board in &boards {
                black_box(check_winner(board));
            }
        })
    });
}

fn bench_apply_move(c: &mut Criterion) {
    let session = Session::new_paired(
        Participant::new("alice", "Alice", "conn-a"),
        Symbol::X,
        Participant::new("bob", "Bob", "conn-b"),
    );

    c.bench_function("apply_move_opening", |b| {
        b.iter(|| black_box(apply_move(&session, "alice", 1, 1)))
    });
}

fn bench_pairing(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("enqueue_pair", |b| {
        b.iter(|| {
            rt.block_on(async {
                let queue = MatchmakingQueue::new(create_bench_registry());
                let _ = queue.enqueue("alice", "Alice", "conn-a");
                black_box(queue.enqueue("bob", "Bob", "conn-b"))
            })
        })
    });
}

fn bench_full_game(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let moves = [(0, 0), (1, 1), (0, 1), (1, 0), (0, 2)];

    c.bench_function("submit_five_move_game", |b| {
        b.iter(|| {
            rt.block_on(async {
                let registry = create_bench_registry();
                let session = registry
                    .create_paired_session(
                        Participant::new("alice", "Alice", "conn-a"),
                        Participant::new("bob", "Bob", "conn-b"),
                    )
                    .unwrap();
                let x = session
                    .participant_by_symbol(Symbol::X)
                    .map(|p| p.participant_id.clone())
                    .unwrap();
                let o = session
                    .participant_by_symbol(Symbol::O)
                    .map(|p| p.participant_id.clone())
                    .unwrap();

                for (i, (row, col)) in moves.iter().enumerate() {
                    let actor = if i % 2 == 0 { &x } else { &o };
                    let _ = registry.submit_move(session.id, actor, *row, *col).await;
                }
                black_box(registry.get_stats())
            })
        })
    });
}

criterion_group!(
    benches,
    bench_check_winner,
    bench_apply_move,
    bench_pairing,
    bench_full_game
);
criterion_main!(benches);
