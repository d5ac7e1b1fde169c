//! Outbox routing for the production transport.

use std::sync::Arc;

use skintrack_engine::world::position::Location;
use skintrack_server::npc::FakePlayer;
use skintrack_server::skin::SkinRecord;
use skintrack_server::transport::{ClientboundPacket, PacketRouter, PlayerListTransport};
use uuid::Uuid;

fn guide() -> FakePlayer {
    let npc = FakePlayer::new(42, "Guide", Location::default());
    npc.apply_skin(&Arc::new(
        SkinRecord::new(Uuid::nil(), "Guide", "tex").with_signature("sig"),
    ));
    npc
}

#[tokio::test]
async fn respawn_is_destroy_then_info_then_spawn() {
    let router = PacketRouter::new();
    let viewer = Uuid::new_v4();
    let mut outbox = router.open(viewer);
    let npc = guide();

    router.respawn_for_viewer(viewer, &npc);

    assert_eq!(
        outbox.recv().await.unwrap(),
        ClientboundPacket::RemoveEntities {
            entity_ids: vec![npc.entity_id]
        }
    );
    match outbox.recv().await.unwrap() {
        ClientboundPacket::PlayerInfoAdd {
            uuid,
            texture,
            signature,
            ..
        } => {
            assert_eq!(uuid, npc.uuid);
            assert_eq!(texture, "tex");
            assert_eq!(signature.as_deref(), Some("sig"));
        }
        other => panic!("expected PlayerInfoAdd, got {:?}", other),
    }
    assert!(matches!(
        outbox.recv().await.unwrap(),
        ClientboundPacket::AddPlayer { entity_id, .. } if entity_id == npc.entity_id
    ));
}

#[tokio::test]
async fn unknown_or_closed_viewer_is_silently_dropped() {
    let router = PacketRouter::new();
    let npc = guide();
    let viewer = Uuid::new_v4();

    assert!(!router.send(viewer, ClientboundPacket::player_info_remove(&npc)));

    let outbox = router.open(viewer);
    assert!(router.is_open(viewer));
    drop(outbox);
    assert!(!router.send(viewer, ClientboundPacket::player_info_remove(&npc)));

    router.close(viewer);
    assert!(!router.is_open(viewer));
    router.send_remove_from_list(viewer, &npc);
}

#[test]
fn packets_serialize_with_type_tag() {
    let npc = guide();
    let json = serde_json::to_value(ClientboundPacket::player_info_remove(&npc)).unwrap();
    assert_eq!(json["type"], "player_info_remove");
    assert_eq!(json["uuids"][0], npc.uuid.to_string());
}
