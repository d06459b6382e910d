use std::{
    fs, io,
    path::{Path, PathBuf},
};

use super::{TransactionId, btree, heap};

const TEMP_DIR: &str = "tmp";

/// Maps table, index and temporary names to paths under the data directory.
#[derive(Debug, Clone)]
pub struct FileSystemManager {
    base_dir: PathBuf,
}

impl FileSystemManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Creates the data directory if it is missing.
    pub fn create_base_dir(&self) -> io::Result<()> {
        if !self.base_dir.exists() {
            log::info!("data directory {:?} not found, creating it", self.base_dir);
            fs::create_dir_all(&self.base_dir)?;
        }
        Ok(())
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        heap::table_path(&self.base_dir, table)
    }

    pub fn index_path(&self, table: &str, column: &str) -> PathBuf {
        btree::index_path(&self.base_dir, table, column)
    }

    pub fn temp_root(&self) -> PathBuf {
        self.base_dir.join(TEMP_DIR)
    }

    pub fn temp_dir(&self, txn: TransactionId) -> PathBuf {
        self.temp_root().join(txn.to_string())
    }

    /// Names of every table in the data directory, sorted.
    pub fn table_names(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if !path.is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some(heap::TABLE_EXTENSION)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// `(table, column)` pairs of every index file in the data directory.
    pub fn index_names(&self) -> io::Result<Vec<(String, String)>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if !path.is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some(btree::INDEX_EXTENSION)
            {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if let Some((table, column)) = stem.split_once('.') {
                names.push((table.to_string(), column.to_string()));
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use super::*;

    #[test]
    fn test_paths_and_listing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let fsm = FileSystemManager::new(dir.path().join("data"));
        fsm.create_base_dir()?;

        assert_eq!(fsm.table_path("users"), dir.path().join("data/users.table"));
        assert_eq!(
            fsm.index_path("users", "id"),
            dir.path().join("data/users.id.index")
        );
        assert_eq!(fsm.temp_dir(7), dir.path().join("data/tmp/7"));

        File::create(fsm.table_path("users"))?;
        File::create(fsm.table_path("orders"))?;
        File::create(fsm.index_path("users", "id"))?;
        File::create(fsm.base_dir().join("notes.txt"))?;
        fs::create_dir_all(fsm.temp_dir(1))?;

        assert_eq!(fsm.table_names()?, vec!["orders", "users"]);
        assert_eq!(
            fsm.index_names()?,
            vec![("users".to_string(), "id".to_string())]
        );

        Ok(())
    }
}
