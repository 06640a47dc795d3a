//! Strikezone Server
//!
//! Runs the authoritative simulation either as a fixed-rate session until
//! Ctrl-C, or as a headless demo with scripted bots.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use strikezone::{
    config::LoggingConfig,
    core::vec3::{Rotation, Vec3},
    game::{
        events::NotificationData,
        intent::{CastIntent, Intent, MoveIntent, ShootIntent},
    },
    network::{spawn_results_task, JsonLinesSink, LogSink, MatchSession, ResultsSink, SessionConfig},
    PlayerId, ServerConfig, Simulation, VERSION,
};

#[derive(Parser, Debug)]
#[command(name = "strikezone-server")]
#[command(about = "Authoritative simulation server for Strikezone")]
#[command(version)]
struct Args {
    /// Configuration file path (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level, overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Run a headless demo for this many ticks instead of a session
    #[arg(long)]
    demo_ticks: Option<u64>,

    /// Append match results as JSON lines to this file
    #[arg(long)]
    results: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ServerConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    init_tracing(&config.logging, args.log_level.as_deref());

    info!("Strikezone Server v{}", VERSION);
    info!(
        tick_rate = config.simulation.tick_rate,
        seed = config.simulation.seed,
        max_players = config.match_rules.max_players,
        "Configuration ready"
    );

    let simulation = Simulation::with_rapier(config).context("building simulation")?;

    match args.demo_ticks {
        Some(ticks) => {
            demo_match(simulation, ticks);
            Ok(())
        }
        None => run_session(simulation, args.results).await,
    }
}

fn init_tracing(logging: &LoggingConfig, override_level: Option<&str>) {
    let level = override_level.unwrap_or(logging.level.as_str());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_session(simulation: Simulation, results_path: Option<PathBuf>) -> Result<()> {
    let sink: Box<dyn ResultsSink> = match results_path {
        Some(path) => {
            let sink = JsonLinesSink::open(&path).with_context(|| format!("opening {}", path.display()))?;
            info!(path = %sink.path().display(), "Writing match results");
            Box::new(sink)
        }
        None => Box::new(LogSink),
    };
    let (results_tx, results_task) = spawn_results_task(sink, 16);

    let (session, handle) = MatchSession::new(simulation, SessionConfig::default());
    let session = session.with_results(results_tx);
    info!(session = %hex::encode(handle.id()), "Session ready");
    let session_task = tokio::spawn(session.run());

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Ctrl-C received, stopping");
    handle.shutdown();

    let simulation = session_task.await.context("session task panicked")?;
    let stored = results_task.await.context("results task panicked")?;
    info!(
        ticks = simulation.current_tick(),
        rounds = stored,
        hash = %simulation.snapshot().state_hash,
        "Server stopped"
    );
    Ok(())
}

// =============================================================================
// DEMO
// =============================================================================

/// Preferred fighting distance for bots
const BOT_RANGE: f32 = 12.0;
/// Per-tick step, inside the default move bound
const BOT_STEP: f32 = 0.3;
/// Ticks between shots
const BOT_FIRE_EVERY: u64 = 20;
/// Ticks between spell casts
const BOT_CAST_EVERY: u64 = 240;
/// Eye height above the body center
const EYE_OFFSET: f32 = 0.6;

/// Run a match with scripted bots and log what happens.
fn demo_match(mut sim: Simulation, ticks: u64) {
    info!("=== Starting Demo Match ===");

    let bots: Vec<PlayerId> = (1..=4u8).map(|i| PlayerId::new([i; 16])).collect();
    for (i, id) in bots.iter().enumerate() {
        sim.submit(Intent::Join { player_id: *id, name: format!("bot-{}", i + 1) });
    }

    let mut damage_events = 0usize;
    for _ in 0..ticks {
        let tick = sim.current_tick() + 1;
        for (i, id) in bots.iter().enumerate() {
            for intent in bot_intents(&sim, *id, i as u32, tick) {
                sim.submit(intent);
            }
        }

        let result = sim.tick();
        for n in &result.notifications {
            match &n.data {
                NotificationData::DamageApplied { .. } => damage_events += 1,
                NotificationData::PlayerDied { victim, killer, .. } => {
                    info!(
                        tick = n.tick,
                        victim = %short(victim),
                        killer = %killer.as_ref().map(short).unwrap_or_else(|| "-".into()),
                        "Player died"
                    );
                }
                NotificationData::MatchStarted { match_number } => info!(tick = n.tick, match_number, "Match started"),
                NotificationData::MatchEnded { results } => {
                    info!(
                        tick = n.tick,
                        winner = ?results.winner,
                        red = results.team_scores[0],
                        blue = results.team_scores[1],
                        reason = ?results.reason,
                        "Match ended"
                    );
                }
                _ => {}
            }
        }
    }

    let snapshot = sim.snapshot();
    info!("=== Demo Results ===");
    for p in &snapshot.players {
        info!(
            player = %short(&p.player_id),
            team = ?p.team,
            kills = p.kills,
            deaths = p.deaths,
            score = p.score,
            "Final line"
        );
    }
    info!(ticks = snapshot.tick, damage_events, hash = %snapshot.state_hash, "Demo complete");
}

/// Intents for one bot: close in on the nearest enemy, circle at range,
/// shoot on a fixed cadence and cast now and then.
fn bot_intents(sim: &Simulation, id: PlayerId, index: u32, tick: u64) -> Vec<Intent> {
    let world = sim.world();
    let Some(entity) = world.entity_of(&id) else {
        return Vec::new();
    };
    let (Some(me), Some(pos)) = (world.player(entity), world.position(entity)) else {
        return Vec::new();
    };
    if !me.is_alive {
        return Vec::new();
    }
    let here = pos.translation;

    let nearest = world
        .player_entities()
        .filter_map(|(other_id, e)| {
            let other = world.player(e)?;
            (other.team != me.team && other.is_alive).then_some(())?;
            let at = world.position(e)?.translation;
            Some((other_id, at, here.distance(at)))
        })
        .min_by(|a, b| a.2.total_cmp(&b.2));

    let Some((target_id, target_at, distance)) = nearest else {
        return Vec::new();
    };

    let to_target = (target_at - here).horizontal().normalize();
    let heading = if distance > BOT_RANGE {
        to_target
    } else {
        // Strafe, alternating direction per bot
        let side = if index % 2 == 0 { 1.0 } else { -1.0 };
        Vec3::new(-to_target.z * side, 0.0, to_target.x * side)
    };

    let mut intents = vec![Intent::Move(MoveIntent {
        player_id: id,
        position: here + heading * BOT_STEP,
        velocity: heading * (BOT_STEP * sim.config().simulation.tick_rate as f32),
        rotation: Rotation::new(0.0, to_target.x.atan2(to_target.z)),
        timestamp: tick,
    })];

    if (tick + index as u64) % BOT_FIRE_EVERY == 0 {
        let origin = here + Vec3::UP * EYE_OFFSET;
        intents.push(Intent::Shoot(ShootIntent {
            player_id: id,
            weapon_id: 1 + index % 2,
            origin,
            direction: target_at - origin,
            timestamp: tick,
        }));
    }

    if (tick + index as u64 * 60) % BOT_CAST_EVERY == 0 {
        if let Some(spell) = sim.config().spells.first() {
            intents.push(Intent::CastSpell(CastIntent {
                player_id: id,
                spell_id: spell.id,
                position: target_at,
                direction: to_target,
                targets: vec![target_id],
            }));
        } else {
            warn!("No spells configured");
        }
    }

    intents
}

fn short(id: &PlayerId) -> String {
    hex::encode(&id.as_bytes()[..4])
}
