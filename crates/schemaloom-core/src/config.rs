//! Configuration schema (schemaloom.toml)

use serde::{Deserialize, Serialize};

/// Source format accepted by the parsers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatTag {
    /// PostgreSQL DDL
    Postgres,

    /// MySQL DDL
    Mysql,

    /// Drizzle ORM schema file targeting PostgreSQL
    DrizzlePostgres,

    /// Drizzle ORM schema file targeting MySQL
    DrizzleMysql,

    /// tbls `schema.json` catalog
    Tbls,

    /// Rails `db/schema.rb` dump
    #[serde(rename = "schemarb")]
    SchemaRb,

    /// Canonical schema JSON
    Canonical,
}

impl Default for FormatTag {
    fn default() -> Self {
        Self::Postgres
    }
}

impl FormatTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::DrizzlePostgres => "drizzle-postgres",
            Self::DrizzleMysql => "drizzle-mysql",
            Self::Tbls => "tbls",
            Self::SchemaRb => "schemarb",
            Self::Canonical => "canonical",
        }
    }
}

impl std::fmt::Display for FormatTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FormatTag {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::Mysql),
            "drizzle-postgres" | "drizzle" => Ok(Self::DrizzlePostgres),
            "drizzle-mysql" => Ok(Self::DrizzleMysql),
            "tbls" => Ok(Self::Tbls),
            "schemarb" | "schema.rb" => Ok(Self::SchemaRb),
            "canonical" => Ok(Self::Canonical),
            other => Err(ConfigError::ParseError(format!("unknown format '{}'", other))),
        }
    }
}

/// Target dialect for DDL generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectConfig {
    /// PostgreSQL
    Postgres,

    /// MySQL
    Mysql,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self::Postgres
    }
}

/// What to do when two foreign keys derive relationships with the same name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// The later relationship silently replaces the earlier one
    #[default]
    LastWins,

    /// Same as `LastWins`, but report each replacement as a warning
    Warn,
}

/// Relationship derivation settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipConfig {
    #[serde(default)]
    pub on_collision: CollisionPolicy,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default input format
    #[serde(default)]
    pub format: FormatTag,

    /// Default DDL output dialect
    #[serde(default)]
    pub dialect: DialectConfig,

    #[serde(default)]
    pub relationships: RelationshipConfig,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.format, FormatTag::Postgres);
        assert_eq!(config.dialect, DialectConfig::Postgres);
        assert_eq!(config.relationships.on_collision, CollisionPolicy::LastWins);
    }

    #[test]
    fn parse_partial_toml() {
        let config = Config::from_toml(
            r#"
            format = "drizzle-mysql"

            [relationships]
            on_collision = "warn"
            "#,
        )
        .unwrap();

        assert_eq!(config.format, FormatTag::DrizzleMysql);
        assert_eq!(config.dialect, DialectConfig::Postgres);
        assert_eq!(config.relationships.on_collision, CollisionPolicy::Warn);
    }

    #[test]
    fn schemarb_format_name() {
        let config = Config::from_toml(r#"format = "schemarb""#).unwrap();
        assert_eq!(config.format, FormatTag::SchemaRb);
    }

    #[test]
    fn unknown_dialect_is_rejected() {
        let err = Config::from_toml(r#"dialect = "oracle""#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn config_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schemaloom.toml");

        let config = Config {
            format: FormatTag::Tbls,
            dialect: DialectConfig::Mysql,
            relationships: RelationshipConfig {
                on_collision: CollisionPolicy::Warn,
            },
        };
        config.save_to_file(&path).unwrap();

        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Config::from_file(std::path::Path::new("/nonexistent/schemaloom.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn format_tag_from_str() {
        assert_eq!("tbls".parse::<FormatTag>().unwrap(), FormatTag::Tbls);
        assert_eq!("schema.rb".parse::<FormatTag>().unwrap(), FormatTag::SchemaRb);
        assert_eq!(FormatTag::SchemaRb.as_str().parse::<FormatTag>().unwrap(), FormatTag::SchemaRb);
        assert!("yaml".parse::<FormatTag>().is_err());
    }
}
