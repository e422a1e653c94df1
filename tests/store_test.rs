//! Integration tests for the settings store.
//!
//! These tests verify that the store:
//! - Round-trips registered settings types through on-disk JSON
//! - Migrates older on-disk versions to the requested type on read
//! - Falls back to supplied defaults when no usable file exists
//! - Keeps spaces isolated from each other

mod common;

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serial_test::serial;

use common::TestEnv;
use stowage::{Binding, Error, Locations, SettingsModel, SettingsStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CatalogSettings {
    catalog_name: String,
    endpoint_url: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    description: Option<String>,
    tags: Vec<String>,
    refreshed_at: DateTime<Utc>,
    mirrors: BTreeMap<String, String>,
}

impl SettingsModel for CatalogSettings {
    const PARTITION: &'static str = "catalogs";
    const VERSION: u32 = 1;
}

fn sample_catalog() -> CatalogSettings {
    let mut mirrors = BTreeMap::new();
    mirrors.insert("eu-west".to_string(), "https://eu.example.com".to_string());
    mirrors.insert("local_dev".to_string(), "http://localhost:8080".to_string());
    CatalogSettings {
        catalog_name: "community".to_string(),
        endpoint_url: "https://catalog.example.com".to_string(),
        description: None,
        tags: vec!["java".to_string(), "web".to_string()],
        refreshed_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
        mirrors,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PrompterV1 {
    prompt: String,
}

impl SettingsModel for PrompterV1 {
    const PARTITION: &'static str = "prompter";
    const VERSION: u32 = 1;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PrompterV2 {
    prompt_text: String,
}

impl SettingsModel for PrompterV2 {
    const PARTITION: &'static str = "prompter";
    const VERSION: u32 = 2;
}

/// Store with both prompter generations and their migrator registered.
fn prompter_store(env: &TestEnv) -> SettingsStore {
    let mut store = env.store();
    store.register::<PrompterV1>().unwrap();
    store.register::<PrompterV2>().unwrap();
    store.add_migrator(|v1: PrompterV1| PrompterV2 { prompt_text: v1.prompt });
    store
}

// === Round Trip Tests ===

#[test]
fn round_trip_preserves_the_value() {
    let env = TestEnv::new();
    let mut store = env.store();
    store.register::<CatalogSettings>().unwrap();

    let settings = sample_catalog();
    store.write(&settings, None).unwrap();

    let loaded: CatalogSettings = store.read(None).unwrap().unwrap();
    assert_eq!(loaded, settings);
}

#[test]
fn files_render_kebab_case_fields() {
    let env = TestEnv::new();
    let mut store = env.store();
    store.register::<CatalogSettings>().unwrap();
    store.write(&sample_catalog(), None).unwrap();

    let raw = env.raw("default-space-catalogs-v1.json");
    assert!(raw.contains("\"catalog-name\""));
    assert!(raw.contains("\"endpoint-url\""));
    assert!(raw.contains("\"refreshed-at\""));
    assert!(!raw.contains("catalog_name"));
    // Map keys are user data and keep their spelling.
    assert!(raw.contains("\"local_dev\""));
    assert!(raw.contains("\"eu-west\""));
    // Absent optionals are omitted rather than written as null.
    assert!(!raw.contains("description"));
    assert!(raw.contains("\"version\": 1"));
}

// === Migration Tests ===

#[test]
fn reading_an_older_version_migrates() {
    let env = TestEnv::new();
    let store = prompter_store(&env);

    store
        .write(
            &PrompterV1 {
                prompt: "value1".to_string(),
            },
            None,
        )
        .unwrap();

    // No v2 file yet: the v1 file is decoded and migrated.
    let migrated: PrompterV2 = store.read(None).unwrap().unwrap();
    assert_eq!(migrated.prompt_text, "value1");
    assert!(env.file("default-space-prompter-v1.json").exists());
    assert!(!env.file("default-space-prompter-v2.json").exists());

    // Writing the migrated value creates the v2 file and leaves v1 alone.
    store.write(&migrated, None).unwrap();
    assert!(env.file("default-space-prompter-v1.json").exists());
    assert!(env.file("default-space-prompter-v2.json").exists());

    let reread: PrompterV2 = store.read(None).unwrap().unwrap();
    assert_eq!(reread.prompt_text, "value1");
}

#[test]
fn string_version_markers_parse() {
    let env = TestEnv::new();
    let store = prompter_store(&env);

    env.seed(
        "default-space-prompter-v1.json",
        r#"{"version": "1", "prompt": "quoted"}"#,
    );

    let migrated: PrompterV2 = store.read(None).unwrap().unwrap();
    assert_eq!(migrated.prompt_text, "quoted");
}

#[test]
fn newest_available_older_version_wins() {
    let env = TestEnv::new();

    #[derive(Debug, Serialize, Deserialize)]
    struct PrompterV3 {
        prompt_lines: Vec<String>,
    }
    impl SettingsModel for PrompterV3 {
        const PARTITION: &'static str = "prompter";
        const VERSION: u32 = 3;
    }

    let mut store = prompter_store(&env);
    store.register::<PrompterV3>().unwrap();
    store.add_migrator(|v1: PrompterV1| PrompterV3 {
        prompt_lines: vec![v1.prompt],
    });
    store.add_migrator(|v2: PrompterV2| PrompterV3 {
        prompt_lines: vec![v2.prompt_text, "from v2".to_string()],
    });

    env.seed(
        "default-space-prompter-v1.json",
        r#"{"version": 1, "prompt": "old"}"#,
    );
    env.seed(
        "default-space-prompter-v2.json",
        r#"{"version": 2, "prompt-text": "newer"}"#,
    );

    let v3: PrompterV3 = store.read(None).unwrap().unwrap();
    assert_eq!(v3.prompt_lines, vec!["newer".to_string(), "from v2".to_string()]);
}

// === Default Fallback Tests ===

#[test]
fn defaults_apply_when_nothing_is_on_disk() {
    let env = TestEnv::new();
    let store = prompter_store(&env);

    assert_eq!(store.read::<PrompterV2>(None).unwrap(), None);
    let fallback = store
        .read_or_else(None, || PrompterV2 {
            prompt_text: "fresh".to_string(),
        })
        .unwrap();
    assert_eq!(fallback.prompt_text, "fresh");
    // Reading a default writes nothing.
    assert!(!env.file("default-space-prompter-v2.json").exists());
}

#[test]
fn unregistered_types_are_rejected() {
    let env = TestEnv::new();
    let store = env.store();

    assert!(matches!(
        store.read::<PrompterV2>(None),
        Err(Error::BindingNotFound { .. })
    ));
    assert!(matches!(
        store.write(
            &PrompterV1 {
                prompt: "x".to_string()
            },
            None
        ),
        Err(Error::BindingNotFound { .. })
    ));
}

// === Space Tests ===

#[test]
fn spaces_are_isolated() {
    let env = TestEnv::new();
    let mut store = env.store();
    store.register::<PrompterV1>().unwrap();
    store
        .register_with::<PrompterV1>(Binding::new("prompter", 1).with_space("project"))
        .unwrap();

    store
        .write(
            &PrompterV1 {
                prompt: "user-wide".to_string(),
            },
            None,
        )
        .unwrap();
    store
        .write(
            &PrompterV1 {
                prompt: "per-project".to_string(),
            },
            Some("project"),
        )
        .unwrap();

    assert!(env.file("default-space-prompter-v1.json").exists());
    assert!(env.file("project-prompter-v1.json").exists());

    let user: PrompterV1 = store.read(None).unwrap().unwrap();
    let project: PrompterV1 = store.read(Some("project")).unwrap().unwrap();
    assert_eq!(user.prompt, "user-wide");
    assert_eq!(project.prompt, "per-project");
}

// === Binding Tests ===

#[test]
fn custom_version_fields_are_honored() {
    let env = TestEnv::new();
    let mut store = env.store();
    store
        .register_with::<PrompterV1>(
            Binding::new("prompter", 1).with_version_field("schema-version"),
        )
        .unwrap();

    store
        .write(
            &PrompterV1 {
                prompt: "marked".to_string(),
            },
            None,
        )
        .unwrap();

    let raw = env.raw("default-space-prompter-v1.json");
    assert!(raw.contains("\"schema-version\": 1"));
    assert!(!raw.contains("\"version\""));

    let loaded: PrompterV1 = store.read(None).unwrap().unwrap();
    assert_eq!(loaded.prompt, "marked");
}

#[test]
fn conflicting_bindings_are_rejected() {
    let env = TestEnv::new();
    let mut store = env.store();
    store.register::<PrompterV1>().unwrap();

    let err = store
        .register_with::<PrompterV2>(Binding::new("prompter", 1))
        .unwrap_err();
    assert!(matches!(err, Error::BindingConflict { .. }));
}

// === Location Tests ===

#[test]
#[serial]
fn override_variable_redirects_the_store() {
    const VAR: &str = "STOWAGE_STORE_TEST_DIR";
    let env = TestEnv::new();

    // SAFETY: test-only env mutation, serialized by #[serial].
    unsafe {
        std::env::set_var(VAR, env.path());
    }

    let mut store =
        SettingsStore::with_locations(Locations::new("stowage-test", Some(VAR)).unwrap());
    store.register::<PrompterV1>().unwrap();
    store
        .write(
            &PrompterV1 {
                prompt: "redirected".to_string(),
            },
            None,
        )
        .unwrap();

    assert!(env.file("default-space-prompter-v1.json").exists());

    unsafe {
        std::env::remove_var(VAR);
    }
}
