use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;

pub const DEFAULT_CONFIG_FILE: &str = "survey.toml";
const ENV_PREFIX: &str = "APP__";

const KEYS: &[&str] = &[
    "store_url",
    "collection_name",
    "public_base_url",
    "ip_lookup_url",
    "geo_lookup_url",
    "email_endpoint",
    "email_service_id",
    "email_template_id",
    "email_user_id",
    "analytics_url",
    "catalog_path",
    "screen_width",
    "screen_height",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub store_url: String,
    pub collection_name: String,
    pub public_base_url: String,
    pub ip_lookup_url: Option<String>,
    pub geo_lookup_url: Option<String>,
    pub email_endpoint: Option<String>,
    pub email_service_id: Option<String>,
    pub email_template_id: Option<String>,
    pub email_user_id: Option<String>,
    pub analytics_url: Option<String>,
    pub catalog_path: Option<PathBuf>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_url: "sqlite://./data/survey.db".into(),
            collection_name: "surveyResponses".into(),
            public_base_url: "http://localhost:3000".into(),
            ip_lookup_url: None,
            geo_lookup_url: None,
            email_endpoint: None,
            email_service_id: None,
            email_template_id: None,
            email_user_id: None,
            analytics_url: None,
            catalog_path: None,
            screen_width: None,
            screen_height: None,
        }
    }
}

impl Settings {
    fn apply(&mut self, key: &str, value: String) {
        let value = value.trim().to_string();
        match key {
            "store_url" => self.store_url = value,
            "collection_name" => self.collection_name = value,
            "public_base_url" => self.public_base_url = value,
            "ip_lookup_url" => self.ip_lookup_url = non_empty(value),
            "geo_lookup_url" => self.geo_lookup_url = non_empty(value),
            "email_endpoint" => self.email_endpoint = non_empty(value),
            "email_service_id" => self.email_service_id = non_empty(value),
            "email_template_id" => self.email_template_id = non_empty(value),
            "email_user_id" => self.email_user_id = non_empty(value),
            "analytics_url" => self.analytics_url = non_empty(value),
            "catalog_path" => self.catalog_path = non_empty(value).map(PathBuf::from),
            "screen_width" => {
                if let Ok(parsed) = value.parse::<u32>() {
                    self.screen_width = Some(parsed);
                }
            }
            "screen_height" => {
                if let Ok(parsed) = value.parse::<u32>() {
                    self.screen_height = Some(parsed);
                }
            }
            _ => {}
        }
    }

    pub fn uses_rest_store(&self) -> bool {
        self.store_url.starts_with("http://") || self.store_url.starts_with("https://")
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

pub fn load_settings(path: Option<&Path>) -> Settings {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    load_settings_from(path, |key| std::env::var(key).ok())
}

/// Defaults, then the flat `key = "value"` file, then the environment. For
/// each key the plain upper-case variable is read first and the `APP__`
/// form overrides it.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            for key in KEYS {
                if let Some(v) = file_cfg.get(*key) {
                    settings.apply(key, v.clone());
                }
            }
        }
    }

    for key in KEYS {
        let upper = key.to_ascii_uppercase();
        if let Some(v) = env(&upper) {
            settings.apply(key, v);
        }
        if let Some(v) = env(&format!("{ENV_PREFIX}{upper}")) {
            settings.apply(key, v);
        }
    }

    settings
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().store_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
