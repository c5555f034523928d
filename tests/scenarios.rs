//! End-to-end scenarios over the CPU half of the simulation.
//!
//! These tests drive the store, behavior manager, formation controller,
//! and picker together the way the scene does each tick, with synthetic
//! snapshots standing in for GPU readbacks. No GPU device is required.

use crowd::{
    AgentId, BehaviorManager, BehaviorState, EventQueue, FormationController, InstanceStore,
    PickAction, Picker, Ray, SimEvent, SimParams, Snapshot, TALK_DURATION_MS, PLAYER,
};
use glam::{Vec2, Vec3};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn world(count: u32) -> (InstanceStore, BehaviorManager, EventQueue) {
    let mut rng = StdRng::seed_from_u64(1234);
    let store = InstanceStore::new(count, SimParams::default(), &mut rng);
    let behavior = BehaviorManager::with_seed(count, 1234);
    (store, behavior, EventQueue::new())
}

fn snapshot(positions: &[[f32; 3]]) -> Snapshot {
    Snapshot::from_positions(positions.iter().map(|p| Vec3::from(*p)).collect())
}

// ============================================================================
// Commands against world bounds
// ============================================================================

#[test]
fn test_out_of_world_waypoint_leaves_agent_untouched() {
    let (mut store, _, _) = world(4);
    store.set_state(AgentId(2), BehaviorState::Seeking);
    store.set_waypoint(AgentId(2), 10.0, -10.0);

    // World half-extent is 25; both coordinates are out of range.
    store.set_waypoint(AgentId(2), 26.0, 0.0);
    store.set_waypoint(AgentId(2), 0.0, -30.0);
    store.set_waypoint(AgentId(2), f32::NAN, 0.0);

    assert_eq!(store.waypoint(AgentId(2)), Some(Vec2::new(10.0, -10.0)));
    assert_eq!(store.state(AgentId(2)), Some(BehaviorState::Seeking));
}

// ============================================================================
// Conversation lifecycle
// ============================================================================

#[test]
fn test_collision_pair_full_lifecycle() {
    let (mut store, mut behavior, mut events) = world(4);
    let colliding = snapshot(&[
        [20.0, 0.0, 20.0],
        [1.0, 0.0, 1.0],
        [1.5, 0.0, 1.0],
        [-20.0, 0.0, -20.0],
    ]);

    behavior.tick(&colliding, 10_000, &mut store, &mut events);

    // Both members entered Talking, facing each other, with one speaker.
    let pair = *behavior.pair_of(AgentId(1)).expect("pair should form");
    assert_eq!(store.state(AgentId(1)), Some(BehaviorState::Talking));
    assert_eq!(store.state(AgentId(2)), Some(BehaviorState::Talking));
    assert_eq!(pair.expires_at, 10_000 + TALK_DURATION_MS);
    assert!(store.is_speaking(pair.speaker));
    assert_eq!(store.waypoint(AgentId(1)), Some(Vec2::new(1.5, 1.0)));
    assert_eq!(store.waypoint(AgentId(2)), Some(Vec2::new(1.0, 1.0)));

    // Conversation members do not join additional pairs while talking.
    behavior.tick(&colliding, 10_100, &mut store, &mut events);
    assert_eq!(behavior.active_pairs().len(), 1);

    // Past the expiry both return to flocking in the same tick.
    let apart = snapshot(&[
        [20.0, 0.0, 20.0],
        [1.0, 0.0, 1.0],
        [8.0, 0.0, 1.0],
        [-20.0, 0.0, -20.0],
    ]);
    behavior.tick(&apart, 10_000 + TALK_DURATION_MS + 1, &mut store, &mut events);
    assert!(behavior.active_pairs().is_empty());
    assert_eq!(store.state(AgentId(1)), Some(BehaviorState::Flocking));
    assert_eq!(store.state(AgentId(2)), Some(BehaviorState::Flocking));
    assert!(!store.is_speaking(AgentId(1)));
    assert!(!store.is_speaking(AgentId(2)));
}

#[test]
fn test_chat_request_yields_to_in_progress_walk() {
    let (mut store, mut behavior, mut events) = world(3);
    let snap = snapshot(&[[0.0, 0.0, 0.0], [5.0, 0.0, 0.0], [-5.0, 0.0, 0.0]]);

    // Agent 2 is mid-walk toward an explicit waypoint.
    store.set_waypoint(AgentId(2), 4.0, 4.0);
    store.set_state(AgentId(2), BehaviorState::Seeking);

    behavior.start_chat(AgentId(2), &snap, &mut store, &mut events);

    // The walk wins: no freeze, no pending chat, player untouched.
    assert_eq!(store.state(AgentId(2)), Some(BehaviorState::Seeking));
    assert_eq!(store.waypoint(AgentId(2)), Some(Vec2::new(4.0, 4.0)));
    assert_eq!(store.state(PLAYER), Some(BehaviorState::Frozen));
    assert_eq!(behavior.pending_chat(), None);

    // The same request against an idle agent goes through.
    behavior.start_chat(AgentId(1), &snap, &mut store, &mut events);
    assert_eq!(store.state(AgentId(1)), Some(BehaviorState::Frozen));
    assert_eq!(store.state(PLAYER), Some(BehaviorState::Seeking));
    assert_eq!(behavior.pending_chat(), Some(AgentId(1)));
}

#[test]
fn test_chat_walk_arrival_then_end_chat() {
    let (mut store, mut behavior, mut events) = world(2);
    let snap = snapshot(&[[0.0, 0.0, 0.0], [6.0, 0.0, 0.0]]);
    behavior.start_chat(AgentId(1), &snap, &mut store, &mut events);
    events.drain();

    // Teleport the snapshot to the player's approach waypoint.
    let wp = store.waypoint(PLAYER).unwrap();
    let arrived = snapshot(&[[wp.x, 0.0, wp.y], [6.0, 0.0, 0.0]]);
    behavior.tick(&arrived, 500, &mut store, &mut events);

    assert_eq!(store.state(PLAYER), Some(BehaviorState::Frozen));
    assert!(events
        .drain()
        .contains(&SimEvent::ArrivedAtTarget(AgentId(1))));

    behavior.end_chat(AgentId(1), &mut store);
    assert_eq!(store.state(AgentId(1)), Some(BehaviorState::Flocking));
    assert_eq!(behavior.pending_chat(), None);
}

// ============================================================================
// Formation + behavior interplay
// ============================================================================

#[test]
fn test_formation_slots_then_release() {
    let (mut store, mut behavior, mut events) = world(5);
    let mut formation = FormationController::new();

    formation.enter(&mut store);
    for i in 1..5 {
        assert_eq!(store.state(AgentId(i)), Some(BehaviorState::Seeking));
    }

    // While everyone is walking, chat requests are dropped wholesale.
    let start = snapshot(&[[0.0; 3]; 5]);
    behavior.start_chat(AgentId(3), &start, &mut store, &mut events);
    assert_eq!(store.state(AgentId(3)), Some(BehaviorState::Seeking));

    // Everyone arrives: frozen, facing the center.
    let arrived = Snapshot::from_positions(
        (0..5)
            .map(|i| {
                formation
                    .slot_of(AgentId(i))
                    .map(|s| Vec3::new(s.x, 0.0, s.y))
                    .unwrap_or(Vec3::ZERO)
            })
            .collect(),
    );
    formation.tick(&arrived, &mut store);
    for i in 1..5 {
        assert_eq!(store.state(AgentId(i)), Some(BehaviorState::Frozen));
        assert_eq!(store.waypoint(AgentId(i)), Some(Vec2::ZERO));
    }

    formation.exit(&mut store);
    for i in 1..5 {
        assert_eq!(store.state(AgentId(i)), Some(BehaviorState::Flocking));
    }
}

// ============================================================================
// Picking
// ============================================================================

#[test]
fn test_pick_hit_miss_and_ground_walk() {
    let mut picker = Picker::new(25.0);
    let snap = snapshot(&[[0.0, 0.0, 0.0], [4.0, 0.0, 4.0]]);

    let hit_ray = Ray {
        origin: Vec3::new(4.0, 10.0, 4.0),
        dir: Vec3::NEG_Y,
    };
    assert_eq!(picker.pick(hit_ray, &snap), Some(AgentId(1)));

    let miss_ray = Ray {
        origin: Vec3::new(15.0, 10.0, 15.0),
        dir: Vec3::NEG_Y,
    };
    assert_eq!(picker.pick(miss_ray, &snap), None);

    // A clean click on empty ground resolves to a walk target.
    let px = Vec2::new(50.0, 50.0);
    picker.pointer_down(px);
    assert_eq!(
        picker.pointer_up(px, miss_ray, &snap),
        PickAction::MoveTo(Vec2::new(15.0, 15.0))
    );

    // The same click outside the world resolves to nothing.
    let outside = Ray {
        origin: Vec3::new(40.0, 10.0, 0.0),
        dir: Vec3::NEG_Y,
    };
    picker.pointer_down(px);
    assert_eq!(picker.pointer_up(px, outside, &snap), PickAction::None);
}
