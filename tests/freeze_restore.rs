//! Freeze/restore tests: snapshot integrity, three-phase rebuild, deferred
//! space entries.

mod common;

use common::*;
use serde_json::json;
use std::collections::HashMap;
use warren::entity::{EnterSpaceRequest, EntityFreezeData, FreezeData};
use warren::prelude::*;

fn freeze_info(type_name: &str, attrs: AttrMap) -> EntityFreezeData {
    EntityFreezeData {
        type_name: type_name.to_string(),
        attrs,
        pos: Position::default(),
        yaw: 0.0,
        client: None,
        space_id: None,
        timer_data: None,
        esr: None,
    }
}

#[test]
fn freeze_without_nil_space_fails() {
    run_local(async {
        let log = new_log();
        let core = EntityCore::builder().build();
        register_player_type(&core, &log, false);
        core.create_entity_locally("Player", Some(player_attrs(1, "a")), None);

        assert!(matches!(core.freeze(1), Err(FreezeError::NilSpaceMissing)));
        assert_eq!(core.entity_count(), 1);
    });
}

#[test]
fn freeze_with_duplicate_nil_space_fails() {
    run_local(async {
        let core = EntityCore::builder().build();
        register_space_type(&core);
        core.create_entity_locally(SPACE_ENTITY_TYPE, Some(space_attrs(0)), None);
        core.create_entity_locally(SPACE_ENTITY_TYPE, Some(space_attrs(0)), None);

        assert!(matches!(core.freeze(1), Err(FreezeError::DuplicateNilSpace)));
        // The running state is untouched.
        assert_eq!(core.entity_count(), 2);
    });
}

#[test]
fn freeze_restore_roundtrip_preserves_resident_set() {
    run_local(async {
        // Source server: a nil space, one real space, one player inside it
        // with a bound client and a service declaration.
        let log_a = new_log();
        let core_a = EntityCore::builder().build();
        register_space_type(&core_a);
        register_player_type(&core_a, &log_a, true);

        let n = core_a.create_entity_locally(SPACE_ENTITY_TYPE, Some(space_attrs(0)), None);
        let s = core_a.create_entity_locally(SPACE_ENTITY_TYPE, Some(space_attrs(1)), None);

        let client = GameClient::new(ClientId::new("c1"), 4);
        let p = core_a.create_entity_locally(
            "Player",
            Some(player_attrs(77, "frozen")),
            Some(client.clone()),
        );
        let player = core_a.get_entity(&p).unwrap();
        player.enter_space(&s, Position::new(3.0, 0.0, 9.0));

        let peer_provider = EntityId::generate();
        core_a.declare_service("match", p.clone());
        core_a.declare_service("match", peer_provider.clone());

        let snapshot = core_a.freeze(1).expect("freeze should succeed");
        assert_eq!(snapshot.entities.len(), 3);

        // Target server: same type registrations, fresh state.
        let log_b = new_log();
        let core_b = EntityCore::builder().build();
        register_space_type(&core_b);
        register_player_type(&core_b, &log_b, true);

        core_b
            .restore_freezed_entities(&snapshot)
            .expect("restore should succeed");

        assert_eq!(core_b.entity_count(), 3);
        for id in [&n, &s, &p] {
            assert!(core_b.get_entity(id).is_some(), "{id} missing after restore");
        }

        let restored = core_b.get_entity(&p).unwrap();
        assert_eq!(restored.type_name(), "Player");
        assert_eq!(restored.get_attr("hp"), Some(json!(77)));
        assert_eq!(restored.get_attr("name"), Some(json!("frozen")));
        assert_eq!(restored.position(), Position::new(3.0, 0.0, 9.0));
        assert_eq!(restored.client(), Some(client.clone()));
        assert_eq!(restored.space().unwrap().id(), &s);
        assert!(core_b.spaces().get_space(&s).unwrap().contains(&p));

        // Restore is silent: on_restored fired, not on_created, and the
        // client was bound without the connect hook.
        assert_eq!(count_events(&log_b, &p, "restored"), 1);
        assert_eq!(count_events(&log_b, &p, "created"), 0);
        assert_eq!(count_events(&log_b, &p, "client_connected"), 0);

        // The ownership index came back with the binding.
        core_b.on_client_disconnected(&client.client_id);
        assert_eq!(count_events(&log_b, &p, "client_disconnected"), 1);

        // The directory carried over, peer declarations included, and a
        // re-freeze materializes it identically.
        assert_eq!(
            core_b.service_providers("match"),
            [p.clone(), peer_provider].into_iter().collect()
        );
        let resnapshot = core_b.freeze(1).expect("re-freeze should succeed");
        assert_eq!(resnapshot.services, snapshot.services);
    });
}

#[test]
fn restore_rebuilds_in_three_phases_and_defers_pending_entry() {
    run_local(async {
        let log = new_log();
        let core = EntityCore::builder().build();
        core.register_entity(SPACE_ENTITY_TYPE, recording_prototype(&log, false));
        register_player_type(&core, &log, false);

        let n = EntityId::generate();
        let s = EntityId::generate();
        let p = EntityId::generate();

        let mut entities = HashMap::new();
        entities.insert(n.clone(), freeze_info(SPACE_ENTITY_TYPE, space_attrs(0)));
        entities.insert(s.clone(), freeze_info(SPACE_ENTITY_TYPE, space_attrs(1)));
        let mut player_info = freeze_info("Player", player_attrs(1, "p"));
        player_info.esr = Some(EnterSpaceRequest {
            space_id: s.clone(),
            enter_pos: Position::new(7.0, 0.0, 7.0),
        });
        entities.insert(p.clone(), player_info);

        let snapshot = FreezeData {
            entities,
            services: Default::default(),
        };

        core.restore_freezed_entities(&snapshot)
            .expect("restore should succeed");

        // Nil space first, then the other space, then the player.
        assert_eq!(events_of_kind(&log, "restored"), vec![n.clone(), s.clone(), p.clone()]);

        // The pending entry replays strictly after all three phases.
        let space = core.spaces().get_space(&s).unwrap();
        assert!(!space.contains(&p));
        settle().await;
        assert!(space.contains(&p));

        let player = core.get_entity(&p).unwrap();
        assert_eq!(player.space().unwrap().id(), &s);
        assert_eq!(player.position(), Position::new(7.0, 0.0, 7.0));
    });
}

#[test]
fn pending_space_entry_survives_freeze() {
    run_local(async {
        let log = new_log();
        let core = EntityCore::builder().build();
        register_space_type(&core);
        register_player_type(&core, &log, false);

        core.create_entity_locally(SPACE_ENTITY_TYPE, Some(space_attrs(0)), None);
        let p = core.create_entity_locally("Player", Some(player_attrs(1, "p")), None);

        // The target space is not resident here; the entry stays pending.
        let elsewhere = EntityId::generate();
        core.get_entity(&p)
            .unwrap()
            .enter_space(&elsewhere, Position::new(1.0, 2.0, 3.0));

        let snapshot = core.freeze(1).expect("freeze should succeed");
        let esr = snapshot.entities[&p].esr.clone().expect("entry should be captured");
        assert_eq!(esr.space_id, elsewhere);
        assert_eq!(esr.enter_pos, Position::new(1.0, 2.0, 3.0));
    });
}

#[test]
fn restore_panic_is_captured_as_error() {
    run_local(async {
        let core = EntityCore::builder().build();
        // No types registered; the first recreation panics.
        let mut entities = HashMap::new();
        entities.insert(
            EntityId::generate(),
            freeze_info(SPACE_ENTITY_TYPE, space_attrs(0)),
        );
        let snapshot = FreezeData {
            entities,
            services: Default::default(),
        };

        let err = core
            .restore_freezed_entities(&snapshot)
            .expect_err("restore should fail");
        let RestoreError::Panicked(message) = err;
        assert!(message.contains("unknown entity type"), "got: {message}");
    });
}

#[test]
fn snapshot_survives_serialization() {
    run_local(async {
        let log = new_log();
        let core_a = EntityCore::builder().build();
        register_space_type(&core_a);
        register_player_type(&core_a, &log, true);

        core_a.create_entity_locally(SPACE_ENTITY_TYPE, Some(space_attrs(0)), None);
        let p = core_a.create_entity_locally("Player", Some(player_attrs(5, "wire")), None);
        core_a.declare_service("match", p.clone());

        let snapshot = core_a.freeze(9).unwrap();
        let bytes = serde_json::to_vec(&snapshot).expect("snapshot should serialize");
        let decoded: FreezeData = serde_json::from_slice(&bytes).expect("snapshot should decode");

        let log_b = new_log();
        let core_b = EntityCore::builder().build();
        register_space_type(&core_b);
        register_player_type(&core_b, &log_b, true);
        core_b.restore_freezed_entities(&decoded).unwrap();

        assert_eq!(core_b.entity_count(), 2);
        assert_eq!(
            core_b.get_entity(&p).unwrap().get_attr("name"),
            Some(json!("wire"))
        );
    });
}
