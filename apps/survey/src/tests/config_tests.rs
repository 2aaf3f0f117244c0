use super::{load_settings_from, normalize_database_url, prepare_database_url, Settings};

use std::{collections::HashMap, fs, path::Path};

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn missing_file_and_env_give_defaults() {
    let settings = load_settings_from(Path::new("/nonexistent/survey.toml"), env_of(&[]));
    assert_eq!(settings, Settings::default());
    assert!(!settings.uses_rest_store());
}

#[test]
fn file_values_override_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("survey.toml");
    fs::write(
        &path,
        r#"
store_url = "https://store.example.org/v1"
collection_name = "pilot"
screen_width = "640"
analytics_url = ""
"#,
    )
    .expect("write config");

    let settings = load_settings_from(&path, env_of(&[]));
    assert_eq!(settings.store_url, "https://store.example.org/v1");
    assert_eq!(settings.collection_name, "pilot");
    assert_eq!(settings.screen_width, Some(640));
    assert_eq!(settings.analytics_url, None);
    assert!(settings.uses_rest_store());
}

#[test]
fn prefixed_env_wins_over_plain_env_and_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("survey.toml");
    fs::write(&path, "public_base_url = \"https://file.example.org\"\n").expect("write config");

    let settings = load_settings_from(
        &path,
        env_of(&[
            ("PUBLIC_BASE_URL", "https://plain.example.org"),
            ("APP__PUBLIC_BASE_URL", "https://prefixed.example.org"),
            ("IP_LOOKUP_URL", "https://ip.example.org"),
            ("SCREEN_HEIGHT", "not-a-number"),
        ]),
    );
    assert_eq!(settings.public_base_url, "https://prefixed.example.org");
    assert_eq!(settings.ip_lookup_url.as_deref(), Some("https://ip.example.org"));
    assert_eq!(settings.screen_height, None);
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(normalize_database_url("sqlite:data/x.db"), "sqlite://data/x.db");
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(normalize_database_url("  "), Settings::default().store_url);
}

#[test]
fn creates_parent_dir_for_sqlite_url() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("data").join("survey.db");

    prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(dir.path().join("data").exists());
}

#[tokio::test]
async fn prepared_database_url_creates_openable_sqlite_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("nested").join("survey.db");

    let prepared = prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare");
    let storage = storage::Storage::new(&prepared).await.expect("open sqlite");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should be created: {}",
        db_path.display()
    );
}
