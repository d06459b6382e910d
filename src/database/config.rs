use std::{env, path::PathBuf, str::FromStr};

use crate::{
    error::{DatabaseError, DatabaseResult},
    storage::{btree, schema::DataType},
};

pub const DATA_DIR_VAR: &str = "HERMITDB_DATA_DIR";
pub const MEMORY_PAGES_VAR: &str = "HERMITDB_MEMORY_PAGES";
pub const INDEX_ORDER_VAR: &str = "HERMITDB_INDEX_ORDER";
pub const LOG_LEVEL_VAR: &str = "HERMITDB_LOG_LEVEL";

pub const DEFAULT_DATA_DIR: &str = "./hermitdb";
pub const DEFAULT_MEMORY_PAGES: usize = 8;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub data_dir: PathBuf,
    /// Pages every transaction may buffer during joins.
    pub num_memory_pages: usize,
    /// Order of new indexes. `None` picks the largest order that fits a page.
    pub index_order: Option<usize>,
    pub log_level: log::Level,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            num_memory_pages: DEFAULT_MEMORY_PAGES,
            index_order: None,
            log_level: log::Level::Info,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> DatabaseResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DatabaseError::InvalidConfig(format!("{name}={value}")))
}

impl DatabaseConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_memory_pages(mut self, num_memory_pages: usize) -> Self {
        self.num_memory_pages = num_memory_pages;
        self
    }

    pub fn with_index_order(mut self, order: usize) -> Self {
        self.index_order = Some(order);
        self
    }

    /// Reads overrides from the environment. Call `dotenvy::dotenv()` first to
    /// pick up a `.env` file.
    pub fn from_env() -> DatabaseResult<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> DatabaseResult<Self> {
        let mut config = Self::default();

        if let Some(dir) = var(DATA_DIR_VAR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(pages) = var(MEMORY_PAGES_VAR) {
            config.num_memory_pages = parse_var(MEMORY_PAGES_VAR, &pages)?;
        }
        if let Some(order) = var(INDEX_ORDER_VAR) {
            config.index_order = Some(parse_var(INDEX_ORDER_VAR, &order)?);
        }
        if let Some(level) = var(LOG_LEVEL_VAR) {
            config.log_level = parse_var(LOG_LEVEL_VAR, &level)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DatabaseResult<()> {
        if self.num_memory_pages == 0 {
            return Err(DatabaseError::InvalidConfig(
                "transactions need at least one memory page".to_string(),
            ));
        }
        if self.index_order == Some(0) {
            return Err(DatabaseError::InvalidConfig(
                "index order must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Order used for a new index over keys of `key_type`.
    pub fn index_order_for(&self, key_type: DataType) -> usize {
        self.index_order.unwrap_or_else(|| btree::max_order(key_type))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() -> anyhow::Result<()> {
        let config = DatabaseConfig::from_vars(vars(&[]))?;
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(config.num_memory_pages, DEFAULT_MEMORY_PAGES);
        assert_eq!(config.index_order, None);
        assert_eq!(config.log_level, log::Level::Info);
        assert_eq!(
            config.index_order_for(DataType::Int),
            btree::max_order(DataType::Int)
        );

        Ok(())
    }

    #[test]
    fn test_overrides() -> anyhow::Result<()> {
        let config = DatabaseConfig::from_vars(vars(&[
            (DATA_DIR_VAR, "/tmp/hermit"),
            (MEMORY_PAGES_VAR, "16"),
            (INDEX_ORDER_VAR, " 4 "),
            (LOG_LEVEL_VAR, "debug"),
        ]))?;
        assert_eq!(config.data_dir, PathBuf::from("/tmp/hermit"));
        assert_eq!(config.num_memory_pages, 16);
        assert_eq!(config.index_order_for(DataType::Int), 4);
        assert_eq!(config.log_level, log::Level::Debug);

        Ok(())
    }

    #[test]
    fn test_invalid_values() -> anyhow::Result<()> {
        for pairs in [
            [(MEMORY_PAGES_VAR, "many")],
            [(MEMORY_PAGES_VAR, "0")],
            [(INDEX_ORDER_VAR, "-3")],
            [(LOG_LEVEL_VAR, "loud")],
        ] {
            let result = DatabaseConfig::from_vars(vars(&pairs));
            assert!(matches!(result, Err(DatabaseError::InvalidConfig(_))));
        }

        Ok(())
    }
}
