use config::{Config, ConfigError, File};
use plaza_types::GeneratorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Database {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tuning {
    /// Relax integrity and durability around bulk runs
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: Database,
    pub tuning: Tuning,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

impl Settings {
    /// Load settings, layering defaults, an optional file and the environment.
    ///
    /// An explicit `config_path` must exist; the implicit `plaza.toml` may not.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("database.path", "plaza.db")?
            .set_default("tuning.enabled", true)?;

        // 1. Settings file
        match config_path {
            Some(path) => {
                builder = builder.add_source(File::from(path.to_path_buf()).required(true));
            }
            None => {
                let current_dir_path = PathBuf::from("plaza.toml");
                if current_dir_path.exists() {
                    builder = builder.add_source(File::from(current_dir_path).required(false));
                }
            }
        }

        // 2. Override with environment variables (highest priority)
        if let Ok(db_path) = std::env::var("DATABASE_PATH") {
            builder = builder.set_override("database.path", db_path)?;
        }
        if let Ok(users) = std::env::var("PLAZA_USER_COUNT") {
            builder = builder.set_override("generator.user_count", users)?;
        }
        if let Ok(seed) = std::env::var("PLAZA_SEED") {
            builder = builder.set_override("generator.seed", seed)?;
        }
        if let Ok(strategy) = std::env::var("PLAZA_STRATEGY") {
            builder = builder.set_override("generator.strategy", strategy)?;
        }

        let s = builder.build()?;
        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaza_types::LoadStrategy;

    #[test]
    fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join("plaza_settings_test.toml");
        std::fs::write(
            &path,
            r#"
[database]
path = "bench.db"

[tuning]
enabled = false

[generator]
user_count = 250
like_range = [2, 4]
strategy = "transactional"
"#,
        )
        .expect("Failed to write settings file");

        let settings = Settings::load(Some(&path)).expect("Failed to load settings");
        let _ = std::fs::remove_file(&path);

        assert!(!settings.tuning.enabled);
        assert_eq!(settings.generator.like_range, (2, 4));
        assert_eq!(settings.generator.strategy, LoadStrategy::Transactional);
        // Unset generator keys keep their defaults
        assert_eq!(settings.generator.posts_per_user, 3);
        if std::env::var("DATABASE_PATH").is_err() {
            assert_eq!(settings.database.path, "bench.db");
        }
        if std::env::var("PLAZA_USER_COUNT").is_err() {
            assert_eq!(settings.generator.user_count, 250);
        }
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let path = std::env::temp_dir().join("plaza_settings_does_not_exist.toml");
        assert!(Settings::load(Some(&path)).is_err());
    }
}
