//! Persistence through the registry: reopen, prefs suites, versions

use crate::registry_with;
use statekit::{
    KeyPath, RuleKind, Scope, StorageKind, ValidationMode, ValidationOptions, ValidationRule, Value,
};
use tempfile::TempDir;

#[test]
fn test_durable_kinds_survive_a_new_registry() {
    let dir = TempDir::new().unwrap();
    let kinds = [
        StorageKind::UserPrefs(None),
        StorageKind::UserPrefs(Some("ui".into())),
        StorageKind::File("cart.json".into()),
    ];

    {
        let registry = registry_with(&dir, |_| {});
        for (i, kind) in kinds.iter().enumerate() {
            registry.store(&Scope::App, kind).unwrap().set("n", i as i64).unwrap();
        }
        registry.store(&Scope::App, &StorageKind::Memory).unwrap().set("n", 99).unwrap();
    }

    let registry = registry_with(&dir, |_| {});
    for (i, kind) in kinds.iter().enumerate() {
        assert_eq!(registry.store(&Scope::App, kind).unwrap().get("n"), Some(Value::Integer(i as i64)));
    }
    assert_eq!(registry.store(&Scope::App, &StorageKind::Memory).unwrap().get("n"), None);
}

#[test]
fn test_schema_major_bump_resets_on_reopen() {
    let dir = TempDir::new().unwrap();
    let kind = StorageKind::File("profile.json".into());

    registry_with(&dir, |c| c.schema_version = "1.2.0".into())
        .store(&Scope::App, &kind)
        .unwrap()
        .set("name", "Ada")
        .unwrap();

    let minor = registry_with(&dir, |c| c.schema_version = "1.9.0".into());
    assert_eq!(minor.store(&Scope::App, &kind).unwrap().get("name"), Some(Value::from("Ada")));

    let major = registry_with(&dir, |c| c.schema_version = "2.0.0".into());
    let store = major.store(&Scope::App, &kind).unwrap();
    assert!(store.snapshot().is_empty());
    assert_eq!(store.schema_version().to_string(), "2.0.0");
}

#[test]
fn test_lenient_registry_applies_to_every_store() {
    let dir = TempDir::new().unwrap();
    let registry = registry_with(&dir, |c| c.validation_mode = "lenient".into());
    let age = KeyPath::parse("age").unwrap();

    for (scope, kind) in [
        (Scope::App, StorageKind::Memory),
        (Scope::App, StorageKind::File("people.json".into())),
        (Scope::scenario("signup"), StorageKind::ScenarioSession),
    ] {
        let store = registry.store(&scope, &kind).unwrap();
        assert_eq!(store.validation_mode(), ValidationMode::Lenient);

        store
            .configure_validation(
                ValidationOptions::new(store.validation_mode())
                    .rule(age.clone(), ValidationRule::new(RuleKind::Integer).with_range(Some(0.0), None)),
            )
            .unwrap();
        store.set("age", -3).unwrap();
        assert_eq!(store.get("age"), Some(Value::Integer(-3)));

        let violations = store.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].key_path, age);
    }

    let strict = registry_with(&dir, |_| {});
    assert_eq!(
        strict.store(&Scope::App, &StorageKind::Memory).unwrap().validation_mode(),
        ValidationMode::Strict
    );
}

#[test]
fn test_bad_config_is_rejected_eagerly() {
    let dir = TempDir::new().unwrap();
    let mut config = statekit::StoreConfig::with_data_dir(dir.path());
    config.schema_version = "two".into();
    assert!(statekit::StoreRegistry::new(config).is_err());
}
