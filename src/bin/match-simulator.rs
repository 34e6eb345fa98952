//! Match Simulator CLI Tool
//!
//! Runs a crowd of simulated players through an in-process gateway. Each
//! player queues, plays random legal moves until the game ends, and queues
//! again until it has finished the requested number of games.
//!
//! Usage:
//!   cargo run --bin match-simulator -- --players 10 --games 3
//!   cargo run --bin match-simulator -- --players 50 --games 5 --seed 42 --move-delay-ms 5

use anyhow::Result;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tictac_parlor::config::AppConfig;
use tictac_parlor::gateway::{ClientCommand, EventGateway, ServerEvent};
use tictac_parlor::service::ServiceComponents;
use tictac_parlor::session::{InMemorySessionStore, InMemoryStatsSink};
use tictac_parlor::types::{SessionId, Symbol};
use tictac_parlor::Board;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "match-simulator")]
#[command(about = "Simulate many players queueing and playing tic-tac-toe in-process")]
struct Cli {
    /// Number of simulated players
    #[arg(short, long, default_value = "10")]
    players: usize,

    /// Games each player finishes before leaving
    #[arg(short, long, default_value = "3")]
    games: u32,

    /// Pause before each move, in milliseconds
    #[arg(long, default_value = "0")]
    move_delay_ms: u64,

    /// Seed for symbol assignment and move choice
    #[arg(long)]
    seed: Option<u64>,

    /// Give up on players still running after this many seconds
    #[arg(long, default_value = "30")]
    timeout_seconds: u64,
}

/// What one simulated player saw
#[derive(Debug, Default)]
struct PlayerReport {
    participant_id: String,
    games: u32,
    wins: u32,
    losses: u32,
    draws: u32,
    abandoned: u32,
    moves: u32,
    errors: u32,
}

struct SimulatedPlayer {
    participant_id: String,
    handle: String,
    gateway: Arc<EventGateway>,
    rng: StdRng,
    games_target: u32,
    move_delay: Duration,
    current: Option<(SessionId, Symbol)>,
    /// Latest move seen for a session before its `gameFound` arrived
    early_moves: HashMap<SessionId, (Board, Symbol)>,
    report: PlayerReport,
}

impl SimulatedPlayer {
    async fn run(mut self, mut events: mpsc::Receiver<ServerEvent>) -> PlayerReport {
        self.join_queue().await;

        while let Some(event) = events.recv().await {
            match event {
                ServerEvent::QueueJoined { position, .. } => {
                    debug!("[{}] In queue, position: {}", self.participant_id, position);
                }
                ServerEvent::GameFound {
                    session_id,
                    your_symbol,
                    board,
                    current_turn,
                    opponent,
                } => {
                    debug!(
                        "[{}] Game found! Playing as {} vs {}",
                        self.participant_id, your_symbol, opponent.display_name
                    );
                    self.current = Some((session_id, your_symbol));
                    let (board, current_turn) = self
                        .early_moves
                        .remove(&session_id)
                        .unwrap_or((board, current_turn));
                    if current_turn == your_symbol {
                        self.play(session_id, &board).await;
                    }
                }
                ServerEvent::MoveMade {
                    session_id,
                    board,
                    current_turn,
                    game_over,
                    winner,
                    is_draw,
                    ..
                } => {
                    // The opponent may move before our `gameFound` is delivered.
                    let symbol = match self.current {
                        Some((current_session, symbol)) if current_session == session_id => symbol,
                        _ => {
                            self.early_moves.insert(session_id, (board, current_turn));
                            continue;
                        }
                    };

                    if game_over {
                        self.report.games += 1;
                        match winner {
                            _ if is_draw => self.report.draws += 1,
                            Some(w) if w.participant_id == self.participant_id => {
                                self.report.wins += 1
                            }
                            _ => self.report.losses += 1,
                        }
                        if self.finish_game().await {
                            break;
                        }
                    } else if current_turn == symbol {
                        self.play(session_id, &board).await;
                    }
                }
                ServerEvent::GameAbandoned { .. } => {
                    self.report.abandoned += 1;
                    if self.finish_game().await {
                        break;
                    }
                }
                ServerEvent::Error { message } => {
                    self.report.errors += 1;
                    warn!("[{}] Error: {}", self.participant_id, message);
                }
                ServerEvent::QueueLeft { .. } | ServerEvent::InviteCreated { .. } => {}
            }
        }

        self.report
    }

    /// Returns true once the player has finished all its games
    async fn finish_game(&mut self) -> bool {
        self.current = None;
        if self.report.games + self.report.abandoned >= self.games_target {
            return true;
        }
        self.join_queue().await;
        false
    }

    async fn join_queue(&self) {
        let command = ClientCommand::JoinQueue {
            participant_id: self.participant_id.clone(),
            display_name: self.participant_id.clone(),
        };
        let _ = self.gateway.handle_command(&self.handle, command).await;
    }

    async fn play(&mut self, session_id: SessionId, board: &Board) {
        let empty = board.empty_cells();
        if empty.is_empty() {
            return;
        }
        let at = empty[self.rng.gen_range(0..empty.len())];

        if !self.move_delay.is_zero() {
            tokio::time::sleep(self.move_delay).await;
        }

        let command = ClientCommand::MakeMove {
            session_id: session_id.to_string(),
            participant_id: self.participant_id.clone(),
            row: at.row as i64,
            col: at.col as i64,
        };
        if self.gateway.handle_command(&self.handle, command).await.is_ok() {
            self.report.moves += 1;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    if cli.players < 2 {
        anyhow::bail!("At least two players are needed");
    }

    let mut config = AppConfig::default();
    config.session.symbol_seed = cli.seed;
    config.service.connection_buffer_size = 256;

    let stats_sink = Arc::new(InMemoryStatsSink::new());
    let components = ServiceComponents::build_with(
        &config,
        Arc::new(InMemorySessionStore::new()),
        stats_sink.clone(),
    )?;

    println!(
        "🎮 Simulating {} players, {} games each",
        cli.players, cli.games
    );

    let mut seed_rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let start_time = Instant::now();
    let mut tasks = Vec::with_capacity(cli.players);
    for i in 0..cli.players {
        let handle = format!("sim-conn-{}", i);
        let events = components.hub().register(&handle)?;
        let participant_id = format!("Bot_{}", i);
        let player = SimulatedPlayer {
            participant_id: participant_id.clone(),
            handle,
            gateway: components.gateway(),
            rng: StdRng::seed_from_u64(seed_rng.gen()),
            games_target: cli.games,
            move_delay: Duration::from_millis(cli.move_delay_ms),
            current: None,
            early_moves: HashMap::new(),
            report: PlayerReport {
                participant_id,
                ..PlayerReport::default()
            },
        };
        tasks.push(tokio::spawn(player.run(events)));
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(cli.timeout_seconds);
    let mut reports = Vec::with_capacity(tasks.len());
    let mut timed_out = 0;
    for task in tasks {
        match tokio::time::timeout_at(deadline, task).await {
            Ok(Ok(report)) => reports.push(report),
            Ok(Err(e)) => warn!("Player task failed: {}", e),
            Err(_) => timed_out += 1,
        }
    }
    let elapsed = start_time.elapsed();

    components.registry().flush().await?;

    println!("\n📊 Results");
    println!(
        "{:<10} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6} {:>7}",
        "player", "games", "wins", "losses", "draws", "moves", "errors", "score"
    );
    reports.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
    for report in &reports {
        let score = stats_sink
            .get(&report.participant_id)
            .map(|s| s.total_score)
            .unwrap_or(0);
        println!(
            "{:<10} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6} {:>7}",
            report.participant_id,
            report.games,
            report.wins,
            report.losses,
            report.draws,
            report.moves,
            report.errors,
            score
        );
    }

    let games: u32 = reports.iter().map(|r| r.games).sum();
    let moves: u32 = reports.iter().map(|r| r.moves).sum();
    let registry_stats = components.registry().get_stats()?;
    println!("\n⏱️  Finished in {:.2}ms", elapsed.as_secs_f64() * 1000.0);
    println!("   Sessions created: {}", registry_stats.sessions_created);
    println!("   Sessions completed: {}", registry_stats.sessions_completed);
    println!("   Player-games finished: {}", games);
    println!(
        "   Moves applied: {} ({:.1} per second)",
        moves,
        moves as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    if timed_out > 0 {
        println!("   ⚠️  {} players still waiting at the deadline", timed_out);
    }

    Ok(())
}
