//! Store contract scenarios exercised through the public crate surface.

use std::sync::Arc;
use std::thread;

use chrono::Utc;
use uuid::Uuid;

use weft_common::entity::chain::{BindingTarget, Chain, ChainBinding, ChainState, ChainType};
use weft_common::entity::segment::Segment;
use weft_common::payload::Payload;
use weft_common::store::EntityStore;
use weft_common::Error;

fn demo_chain() -> Chain {
    Chain {
        id: Uuid::new_v4(),
        account_id: Uuid::new_v4(),
        kind: ChainType::Production,
        state: ChainState::Draft,
        name: "demo".into(),
        start_at: Utc::now(),
        stop_at: None,
        embed_key: Some("demo".into()),
    }
}

#[test]
fn racing_appends_claim_exactly_one_slot() {
    let store = Arc::new(EntityStore::new());
    let chain_id = Uuid::new_v4();
    let begin_at = Utc::now();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                store.insert_segment_if_absent(Segment::template(chain_id, 1, begin_at))
            })
        })
        .collect();

    let mut wins = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(_) => wins += 1,
            Err(Error::Validation(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(store.segments_of_chain(chain_id).unwrap().len(), 1);
}

#[test]
fn stored_chain_exports_with_its_bindings() {
    let store = EntityStore::new();
    let chain = demo_chain();
    let chain_id = chain.id;
    store.put_chain(chain).unwrap();
    store
        .put_chain_binding(ChainBinding {
            id: Uuid::new_v4(),
            chain_id,
            target: BindingTarget::Library,
            target_id: Uuid::new_v4(),
        })
        .unwrap();

    let read = store.chain(chain_id).unwrap();
    let bindings = store.bindings_of_chain(chain_id).unwrap();
    let mut payload = Payload::one(&read).unwrap();
    payload.include(&bindings).unwrap();
    payload.link("embed", "/embed/demo");

    let value = serde_json::to_value(&payload).unwrap();
    assert_eq!(value["data"]["name"], "demo");
    assert_eq!(value["included"].as_array().unwrap().len(), 1);
    assert_eq!(value["links"]["embed"], "/embed/demo");
}
