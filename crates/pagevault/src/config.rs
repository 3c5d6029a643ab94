//! Loading [`CacheSettings`] from a TOML file and the environment
//!
//! Precedence is defaults, then the file, then `PAGEVAULT__*` variables.
//! List settings read from the environment are comma separated, e.g.
//! `PAGEVAULT__DENIED_PATHS=/admin*,/cart*`.

use ::config::{Config, Environment, File};
use std::path::Path;

use pagevault_core::{CacheError, CacheSettings, Result};

const ENV_PREFIX: &str = "PAGEVAULT";

const LIST_KEYS: &[&str] = &[
    "ignored_query_params",
    "uncached_headers",
    "session_cookie_prefixes",
    "allowed_cookie_prefixes",
    "denied_paths",
    "unique_headers",
    "unique_cookies",
];

/// Load and validate settings
pub fn load_settings(path: Option<&Path>) -> Result<CacheSettings> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    let mut env = Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
        .list_separator(",");
    for key in LIST_KEYS {
        env = env.with_list_parse_key(key);
    }
    builder = builder.add_source(env);

    let settings: CacheSettings = builder
        .build()
        .and_then(|config| config.try_deserialize())
        .map_err(|e| CacheError::Config(e.to_string()))?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_toml(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("pagevault-{}-{name}.toml", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let path = write_toml(
            "partial",
            r#"
max_age = 60
denied_paths = ["/checkout*"]
allowed_cookie_prefixes = ["session_pref"]

[extra_headers]
x-served-by = ["edge-1"]
"#,
        );
        let settings = load_settings(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.max_age, 60);
        assert_eq!(settings.denied_paths, vec!["/checkout*"]);
        assert_eq!(settings.allowed_cookie_prefixes, vec!["session_pref"]);
        assert_eq!(settings.extra_headers["x-served-by"], vec!["edge-1"]);
        assert_eq!(settings.sampling_window, 120);
        assert_eq!(settings.group, "pagecache");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let path = std::env::temp_dir().join("pagevault-does-not-exist.toml");
        assert!(matches!(load_settings(Some(&path)), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let path = write_toml("invalid", "lock_ttl = 0\n");
        let result = load_settings(Some(&path));
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let path = write_toml("wrong-type", "max_age = \"soon\"\n");
        let result = load_settings(Some(&path));
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(CacheError::Config(_))));
    }
}
