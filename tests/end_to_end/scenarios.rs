//! Scope isolation and scenario lifecycle

use crate::temp_registry;
use statekit::{Scope, StorageKind, Value};

#[test]
fn test_scopes_do_not_share_data() {
    let (_dir, registry) = temp_registry();
    let kind = StorageKind::File("state.json".into());
    let app = registry.store(&Scope::App, &kind).unwrap();
    let s1 = registry.store(&Scope::scenario("s1"), &kind).unwrap();
    let s2 = registry.store(&Scope::scenario("s2"), &kind).unwrap();

    app.set("flag", true).unwrap();
    s1.set("flag", false).unwrap();

    assert_eq!(app.get("flag"), Some(Value::Bool(true)));
    assert_eq!(s1.get("flag"), Some(Value::Bool(false)));
    assert_eq!(s2.get("flag"), None);
}

#[test]
fn test_ending_scenario_keeps_durable_data_only() {
    let (_dir, registry) = temp_registry();
    let scope = Scope::scenario("checkout");
    let file = StorageKind::File("progress.json".into());

    registry.store(&scope, &StorageKind::ScenarioSession).unwrap().set("step", 3).unwrap();
    registry.store(&scope, &file).unwrap().set("completed", 1).unwrap();
    let app = registry.store(&Scope::App, &StorageKind::Memory).unwrap();
    app.set("visits", 1).unwrap();

    registry.end_scenario("checkout").unwrap();
    assert_eq!(registry.len(), 1);

    assert!(!registry.store(&scope, &StorageKind::ScenarioSession).unwrap().exists("step"));
    assert_eq!(registry.store(&scope, &file).unwrap().get("completed"), Some(Value::Integer(1)));
    assert_eq!(app.get("visits"), Some(Value::Integer(1)));
}
