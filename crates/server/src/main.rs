use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use skintrack_engine::tick::TickScheduler;
use skintrack_engine::world::WorldId;
use skintrack_engine::world::position::Location;
use skintrack_server::npc_registry::NpcRegistry;
use skintrack_server::player_registry::{PlayerInfo, PlayerRegistry};
use skintrack_server::settings::Settings;
use skintrack_server::skin::SkinCache;
use skintrack_server::tick_loop::{self, TickLoop};
use skintrack_server::transport::{ClientboundPacket, PacketRouter};
use skintrack_server::visibility::SyncContext;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// NPC used by the demo timeline.
const DEMO_NPC: u32 = 1;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config_path: PathBuf = std::env::args()
        .skip_while(|a| a != "--config")
        .nth(1)
        .unwrap_or_else(|| "skintrack.json".into())
        .into();
    let skins_path: PathBuf = std::env::args()
        .skip_while(|a| a != "--skins")
        .nth(1)
        .unwrap_or_else(|| "skins.json".into())
        .into();
    let max_ticks: u64 = std::env::args()
        .skip_while(|a| a != "--ticks")
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(200);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("skintrack -- fake player skin/player-list sync");

    let settings = Settings::load(&config_path)?;
    let skins = Arc::new(SkinCache::load_from(&skins_path)?);

    // ── Wire the subsystem ──────────────────────────────────────────────
    let scheduler = Arc::new(TickScheduler::new());
    let router = Arc::new(PacketRouter::new());
    let players = Arc::new(PlayerRegistry::new());
    let ctx = Arc::new(SyncContext::new(
        &settings,
        scheduler.clone(),
        router.clone(),
        Arc::clone(&players),
        skins,
    ));
    let npcs = Arc::new(NpcRegistry::new(Arc::clone(&ctx), settings.nearby_radius));
    let tick_loop = Arc::new(TickLoop::new(
        Arc::clone(&scheduler),
        Arc::clone(&ctx),
        Arc::clone(&npcs),
        settings.nearby_sweep_ticks,
    ));

    let tick_duration = Duration::from_millis(settings.tick_millis.max(1));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = tick_loop::start(Arc::clone(&tick_loop), tick_duration, shutdown_rx);

    // ── Demo: one NPC, one viewer walking in and out of range ──────────
    let spawn = Location::new(WorldId::OVERWORLD, 0.0, 64.0, 0.0);
    npcs.spawn(DEMO_NPC, "Guide", spawn);

    let viewer = Uuid::new_v3(&Uuid::NAMESPACE_URL, b"OfflinePlayer:Alice");
    let far = Location::new(WorldId::OVERWORLD, 500.0, 64.0, 500.0);
    let near = Location::new(WorldId::OVERWORLD, 8.0, 64.0, 8.0);
    let outbox = router.open(viewer);
    players.register(PlayerInfo::new(viewer, "Alice", far));
    let logger = tokio::spawn(log_packets("Alice", outbox));

    let timeline = run_timeline(
        &tick_loop,
        tick_duration,
        max_ticks,
        |tick| match tick {
            10 => {
                tracing::info!("Alice walks up to the NPC");
                players.update_location(viewer, near);
            }
            60 => {
                tracing::info!("NPC skin changes");
                npcs.set_skin(DEMO_NPC, "Notch");
            }
            90 => {
                tracing::info!("Alice walks away");
                players.update_location(viewer, far);
            }
            120 => {
                tracing::info!("NPC despawns");
                npcs.despawn(DEMO_NPC);
            }
            150 => {
                tracing::info!("Alice disconnects");
                players.deregister(viewer);
                router.close(viewer);
            }
            _ => {}
        },
    );

    tokio::select! {
        _ = timeline => {
            tracing::info!("Demo finished after {} ticks", tick_loop.ticks());
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, shutting down...");
        }
    }

    let _ = shutdown_tx.send(true);
    ticker.await?;
    router.close(viewer);
    logger.abort();
    Ok(())
}

/// Call `step` once for every tick the loop completes, until `max_ticks`.
async fn run_timeline<F>(tick_loop: &TickLoop, tick_duration: Duration, max_ticks: u64, mut step: F)
where
    F: FnMut(u64),
{
    let mut seen = 0;
    while seen < max_ticks {
        tokio::time::sleep(tick_duration).await;
        let now = tick_loop.ticks();
        while seen < now.min(max_ticks) {
            seen += 1;
            step(seen);
        }
    }
}

async fn log_packets(viewer: &'static str, mut outbox: mpsc::UnboundedReceiver<ClientboundPacket>) {
    while let Some(packet) = outbox.recv().await {
        match serde_json::to_string(&packet) {
            Ok(json) => tracing::info!("-> {}: {}", viewer, json),
            Err(e) => tracing::warn!("Unprintable packet for {}: {}", viewer, e),
        }
    }
}
