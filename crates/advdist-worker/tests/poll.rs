// Exercises the worker's pure, synchronous decision logic without a
// live coordinator: the version-poll ordering plan and the wire framing
// it consumes once a blob is re-fetched.

use advdist_core::model::Versions;
use advdist_core::wire::{decode_id_prefixed, encode_id_prefixed};
use advdist_worker::{plan_updates, UpdateKind};

fn versions(attack_id: u64, model_id: u64, model_state_id: u64) -> Versions {
    Versions {
        attack_id,
        model_id,
        model_state_id,
    }
}

#[test]
fn plan_is_empty_when_nothing_advanced() {
    let snapshot = versions(3, 3, 3);
    assert!(plan_updates(snapshot, snapshot).is_empty());
}

#[test]
fn plan_orders_model_state_before_attack_before_model() {
    let old = versions(0, 0, 0);
    let new = versions(1, 1, 1);
    assert_eq!(
        plan_updates(old, new),
        vec![UpdateKind::ModelState, UpdateKind::Attack, UpdateKind::Model]
    );
}

#[test]
fn clean_batch_wire_format_round_trips_through_the_worker_side_decoder() {
    let encoded = encode_id_prefixed(7, b"clean-payload");
    let (id, payload) = decode_id_prefixed(&encoded).unwrap();
    assert_eq!(id, 7);
    assert_eq!(&payload[..], b"clean-payload");
}
