//! NPC registry and tick loop: spawn/despawn/respawn driven through whole
//! ticks, the way the server runs them.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Harness, at, harness};
use skintrack_server::npc_registry::NpcRegistry;
use skintrack_server::tick_loop::{self, TickLoop};
use skintrack_server::visibility::ViewerState;
use tokio::sync::watch;

fn world(h: &Harness, sweep_every: u64) -> (Arc<NpcRegistry>, TickLoop) {
    let npcs = Arc::new(NpcRegistry::new(Arc::clone(&h.ctx), 32.0));
    let tick_loop = TickLoop::new(
        Arc::clone(&h.scheduler),
        Arc::clone(&h.ctx),
        Arc::clone(&npcs),
        sweep_every,
    );
    (npcs, tick_loop)
}

#[test]
fn spawn_registers_fake_player_and_greets_nearby_viewers() {
    let h = harness();
    let (npcs, _) = world(&h, 20);
    let near = h.viewer("Near", at(4.0, 4.0));
    let far = h.viewer("Far", at(400.0, 4.0));

    let npc = npcs.spawn(7, "Guide", at(0.0, 0.0));

    let info = h.players.get(npc.uuid).unwrap();
    assert!(info.fake);
    assert!(npc.applied_skin().is_some());
    assert_eq!(h.transport.adds_to(near.uuid), 1);
    assert_eq!(h.transport.adds_to(far.uuid), 0);
    assert_eq!(npcs.len(), 1);
}

#[test]
fn tick_pumps_disconnects_before_running_follow_ups() {
    let h = harness();
    let (npcs, tick_loop) = world(&h, 100);
    let v = h.viewer("Alice", at(1.0, 1.0));
    npcs.spawn(1, "Guide", at(0.0, 0.0));
    assert_eq!(h.transport.adds_to(v.uuid), 1);

    h.players.deregister(v.uuid);
    let report = tick_loop.tick();

    assert_eq!(report.disconnects, 1);
    assert_eq!(report.tasks, 0);
    assert_eq!(h.transport.removes_to(v.uuid), 0);
}

#[test]
fn reconnect_between_ticks_keeps_the_new_cycle() {
    let h = harness();
    let (npcs, tick_loop) = world(&h, 100);
    let v = h.viewer("Alice", at(1.0, 1.0));
    npcs.spawn(1, "Guide", at(0.0, 0.0));
    let tracker = npcs.tracker(1).unwrap();
    for _ in 0..5 {
        tick_loop.tick();
    }
    assert_eq!(h.transport.removes_to(v.uuid), 2);

    h.players.deregister(v.uuid);
    let v = h.viewer("Alice", at(1.0, 1.0));
    tracker.update_viewer(&v);

    let mut disconnects = 0;
    for _ in 0..5 {
        disconnects += tick_loop.tick().disconnects;
    }
    assert_eq!(disconnects, 0);
    assert_eq!(h.transport.adds_to(v.uuid), 2);
    assert_eq!(h.transport.removes_to(v.uuid), 4);
    assert_eq!(tracker.viewer_state(v.uuid), ViewerState::Idle);
}

#[test]
fn reconnect_mid_cycle_restarts_it_for_the_new_connection() {
    let h = harness();
    let (npcs, tick_loop) = world(&h, 100);
    let v = h.viewer("Alice", at(1.0, 1.0));
    npcs.spawn(1, "Guide", at(0.0, 0.0));
    let tracker = npcs.tracker(1).unwrap();
    tick_loop.tick();
    assert_eq!(h.transport.removes_to(v.uuid), 1);

    h.players.deregister(v.uuid);
    let v = h.viewer("Alice", at(1.0, 1.0));
    tracker.update_viewer(&v);

    for _ in 0..5 {
        tick_loop.tick();
    }
    assert_eq!(h.transport.adds_to(v.uuid), 2);
    assert_eq!(h.transport.removes_to(v.uuid), 3);
    assert_eq!(tracker.viewer_state(v.uuid), ViewerState::Idle);
}

#[test]
fn skin_change_leaves_far_viewers_alone() {
    let h = harness();
    let (npcs, tick_loop) = world(&h, 100);
    let near = h.viewer("Near", at(4.0, 4.0));
    let far = h.viewer("Far", at(500.0, 0.0));
    h.skin("Notch", "notch-texture");
    npcs.spawn(1, "Guide", at(0.0, 0.0));

    assert!(npcs.set_skin(1, "Notch"));
    for _ in 0..50 {
        tick_loop.tick();
    }

    let to_far = h.transport.adds_to(far.uuid)
        + h.transport.respawns_to(far.uuid)
        + h.transport.removes_to(far.uuid);
    assert_eq!(to_far, 0);
    // Near was mid-cycle at the skin change, so its follow-ups still remove.
    assert_eq!(h.transport.adds_to(near.uuid), 1);
    assert_eq!(h.transport.respawns_to(near.uuid), 1);
    assert_eq!(h.transport.removes_to(near.uuid), 2);
}

#[test]
fn periodic_sweep_restarts_cycles() {
    let h = harness();
    let (npcs, tick_loop) = world(&h, 5);
    let v = h.viewer("Alice", at(1.0, 1.0));
    npcs.spawn(1, "Guide", at(0.0, 0.0));

    let mut swept = Vec::new();
    for _ in 0..10 {
        swept.push(tick_loop.tick().swept);
    }

    assert_eq!(swept, vec![0, 0, 0, 0, 1, 0, 0, 0, 0, 1]);
    // Spawn, tick 5 and tick 10: three cycles started.
    assert_eq!(h.transport.adds_to(v.uuid), 3);
    assert_eq!(tick_loop.ticks(), 10);
}

#[test]
fn walking_into_range_is_picked_up_by_sweep() {
    let h = harness();
    let (npcs, tick_loop) = world(&h, 2);
    let v = h.viewer("Alice", at(300.0, 0.0));
    npcs.spawn(1, "Guide", at(0.0, 0.0));
    assert_eq!(h.transport.adds_to(v.uuid), 0);

    h.players.update_location(v.uuid, at(10.0, 0.0));
    tick_loop.tick();
    tick_loop.tick();
    assert_eq!(h.transport.adds_to(v.uuid), 1);
}

#[test]
fn despawn_removes_twice_and_forgets_npc() {
    let h = harness();
    let (npcs, tick_loop) = world(&h, 100);
    let v = h.viewer("Alice", at(1.0, 1.0));
    let npc = npcs.spawn(1, "Guide", at(0.0, 0.0));
    let tracker = npcs.tracker(1).unwrap();

    assert!(npcs.despawn(1));
    assert!(!npcs.despawn(1));
    assert!(tracker.is_removed());
    assert!(!h.players.is_online(npc.uuid));
    assert!(npcs.get(1).is_none());

    tick_loop.tick();
    tick_loop.tick();
    // One add, then immediate + delayed removal; the counted follow-ups
    // were dropped with the tracker's state.
    assert_eq!(h.transport.adds_to(v.uuid), 1);
    assert_eq!(h.transport.removes_to(v.uuid), 2);
}

#[test]
fn respawn_cancels_the_old_final_removal() {
    let h = harness();
    let (npcs, tick_loop) = world(&h, 100);
    let v = h.viewer("Alice", at(1.0, 1.0));
    npcs.spawn(1, "Guide", at(0.0, 0.0));
    tick_loop.tick();
    tick_loop.tick();
    let removes_before = h.transport.removes_to(v.uuid);

    // Respawn in the same tick as the despawn: the new tracker's first
    // update must cancel the pending final removal for this entity.
    npcs.spawn(1, "Guide", at(0.0, 0.0));
    assert_eq!(h.transport.removes_to(v.uuid), removes_before + 1);

    tick_loop.tick();
    tick_loop.tick();
    tick_loop.tick();
    assert_eq!(h.transport.adds_to(v.uuid), 2);
    assert_eq!(h.transport.removes_to(v.uuid), removes_before + 1 + 2);
    let tracker = npcs.tracker(1).unwrap();
    assert_eq!(tracker.viewer_state(v.uuid), ViewerState::Idle);
}

#[test]
fn set_skin_and_override_go_through_registry() {
    let h = harness();
    let (npcs, _) = world(&h, 100);
    let v = h.viewer("Alice", at(1.0, 1.0));
    h.skin("Notch", "notch-texture");
    let npc = npcs.spawn(1, "Guide", at(0.0, 0.0));

    assert!(npcs.set_skin(1, "Notch"));
    assert_eq!(npc.applied_skin().unwrap().texture, "notch-texture");
    assert_eq!(h.transport.respawns_to(v.uuid), 1);

    assert!(npcs.set_remove_from_player_list(1, Some(false)));
    assert!(!npcs.tracker(1).unwrap().should_remove_from_player_list());

    assert!(npcs.move_to(1, at(50.0, 50.0)));
    assert_eq!(h.players.get(npc.uuid).unwrap().location, at(50.0, 50.0));

    assert!(!npcs.set_skin(99, "Notch"));
    assert!(!npcs.move_to(99, at(0.0, 0.0)));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn tick_loop_runs_on_interval_until_shutdown() {
    let h = harness();
    let (npcs, tick_loop) = world(&h, 100);
    let v = h.viewer("Alice", at(1.0, 1.0));
    npcs.spawn(1, "Guide", at(0.0, 0.0));

    let tick_loop = Arc::new(tick_loop);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tick_loop::start(Arc::clone(&tick_loop), Duration::from_millis(50), shutdown_rx);

    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert!(tick_loop.ticks() >= 2);
    assert_eq!(h.transport.removes_to(v.uuid), 2);
}
