//! Authoring → wire → runtime replay

use crate::temp_registry;
use statekit::{collect_actions, Action, ActionBuilder, Scope, StorageKind, StoreError, Value};

#[test]
fn test_authored_flow_replays_on_runtime_store() {
    let (_dir, registry) = temp_registry();
    let kind = StorageKind::File("cart.json".into());
    let cart = ActionBuilder::new(Scope::App, kind.clone());

    let authored = collect_actions(|| {
        cart.set("cart.items[0]", Value::object([("sku", Value::from("A-1")), ("qty", Value::Integer(2))]))
            .unwrap();
        cart.transaction(|tx| {
            tx.set("cart.total", 19.5)?;
            tx.merge("cart.meta", Value::object([("currency", Value::from("EUR"))]))?;
            Ok(())
        })
        .unwrap();
    });
    let wire: Vec<String> = authored.iter().map(|a| a.to_json().unwrap()).collect();

    let store = registry.store(&Scope::App, &kind).unwrap();
    for raw in &wire {
        store.apply_action(&Action::from_json(raw).unwrap()).unwrap();
    }

    assert_eq!(store.get("cart.items[0].qty"), Some(Value::Integer(2)));
    assert_eq!(store.get("cart.total"), Some(Value::Number(19.5)));
    assert_eq!(store.get("cart.meta.currency"), Some(Value::from("EUR")));
}

#[test]
fn test_replayed_transaction_is_one_notification() {
    let (_dir, registry) = temp_registry();
    let store = registry.store(&Scope::App, &StorageKind::Memory).unwrap();
    let mut user = store.subscribe("user").unwrap();
    user.try_next();

    let builder = ActionBuilder::new(Scope::App, StorageKind::Memory);
    let action = builder
        .transaction(|tx| {
            tx.set("user.first", "Ada")?;
            tx.set("user.last", "Lovelace")?;
            Ok(())
        })
        .unwrap();
    registry.dispatch(&Scope::App, &action).unwrap();

    assert_eq!(user.drain().len(), 1);
}

#[test]
fn test_scenario_action_needs_scenario_store() {
    let (_dir, registry) = temp_registry();
    let app = registry.store(&Scope::App, &StorageKind::Memory).unwrap();
    let session = ActionBuilder::new(Scope::scenario("s1"), StorageKind::Memory);
    let action = session.set("step", 1).unwrap();

    assert!(matches!(app.apply_action(&action), Err(StoreError::InvalidConfiguration(_))));

    let scenario = registry.store(&Scope::scenario("s1"), &StorageKind::Memory).unwrap();
    scenario.apply_action(&action).unwrap();
    assert_eq!(scenario.get("step"), Some(Value::Integer(1)));
}

#[test]
fn test_corrupt_wire_payload_reports_raw_text() {
    let raw = r#"{"id":"memory_set_a","type":"StoreSet","scope":"app","storage":"memory","keyPath":"a","value":{"type":"decimal","value":1}}"#;
    match Action::from_json(raw) {
        Err(StoreError::DecodeFailed { raw: reported, .. }) => assert!(reported.contains("decimal")),
        other => panic!("unexpected {:?}", other),
    }
}
