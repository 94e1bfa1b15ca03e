//! `compile_commands.json` lookup indexes for the refresh engine.
//!
//! Entries are keyed three ways: by normalized unit path, by containing
//! directory, and by top-level module (the first one or two path segments
//! below the app root).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{OrchestratorError, Result};
use crate::pathkey;

#[derive(Debug, Clone, Deserialize)]
struct RawEntry {
    directory: String,
    file: String,
}

#[derive(Debug, Clone)]
pub struct CompileDb {
    /// Absolute unit paths, in database order.
    units: Vec<PathBuf>,
    by_key: HashMap<String, usize>,
    by_dir: HashMap<String, Vec<usize>>,
    by_module: HashMap<String, Vec<usize>>,
    app_dir: PathBuf,
}

impl CompileDb {
    pub fn load(path: &Path, app_dir: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|_| {
            OrchestratorError::MissingCompileCommands(path.to_path_buf())
        })?;
        let raw: Vec<RawEntry> = serde_json::from_str(&text).map_err(|e| {
            OrchestratorError::Other(format!("malformed {}: {e}", path.display()))
        })?;

        let mut db = Self {
            units: Vec::new(),
            by_key: HashMap::new(),
            by_dir: HashMap::new(),
            by_module: HashMap::new(),
            app_dir: app_dir.to_path_buf(),
        };

        for entry in raw {
            let unit = pathkey::absolutize(Path::new(&entry.file), Path::new(&entry.directory));
            let key = pathkey::path_key(&unit);
            if db.by_key.contains_key(&key) {
                continue;
            }
            let index = db.units.len();
            db.by_key.insert(key, index);
            db.by_dir
                .entry(pathkey::dir_key(&unit))
                .or_default()
                .push(index);
            if let Some(module) = db.module_key(&unit) {
                db.by_module.entry(module).or_default().push(index);
            }
            db.units.push(unit);
        }

        Ok(db)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Module key: first two path segments below the app dir, or one when
    /// the file sits directly in a top-level subdirectory.
    pub fn module_key(&self, unit: &Path) -> Option<String> {
        let unit_key = pathkey::path_key(unit);
        let root_key = pathkey::path_key(&self.app_dir);
        let rel = unit_key.strip_prefix(&format!("{root_key}/"))?;
        let segments: Vec<&str> = rel.split('/').collect();
        match segments.len() {
            0 | 1 => None,
            2 => Some(segments[0].to_string()),
            _ => Some(format!("{}/{}", segments[0], segments[1])),
        }
    }

    /// Resolve a touched file to compile units: direct hit on the unit key,
    /// else every unit sharing the file's directory.
    pub fn resolve(&self, file: &Path) -> Vec<&Path> {
        let key = pathkey::path_key(file);
        if let Some(&index) = self.by_key.get(&key) {
            return vec![self.units[index].as_path()];
        }
        self.by_dir
            .get(&pathkey::dir_key(file))
            .map(|indexes| {
                indexes
                    .iter()
                    .map(|&index| self.units[index].as_path())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every unit in the same directory as `unit`.
    pub fn dir_neighbors(&self, unit: &Path) -> Vec<&Path> {
        self.by_dir
            .get(&pathkey::dir_key(unit))
            .map(|indexes| {
                indexes
                    .iter()
                    .map(|&index| self.units[index].as_path())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every unit sharing `unit`'s module key.
    pub fn module_neighbors(&self, unit: &Path) -> Vec<&Path> {
        let Some(module) = self.module_key(unit) else {
            return Vec::new();
        };
        self.by_module
            .get(&module)
            .map(|indexes| {
                indexes
                    .iter()
                    .map(|&index| self.units[index].as_path())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_db(entries: &[(&str, &str)]) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("compile_commands.json");
        let json: Vec<serde_json::Value> = entries
            .iter()
            .map(|(dir, file)| {
                serde_json::json!({
                    "directory": dir,
                    "file": file,
                    "command": format!("clang++ -c {file}")
                })
            })
            .collect();
        std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();
        (tmp, path)
    }

    #[test]
    fn direct_hit_by_normalized_key() {
        let (_tmp, path) = write_db(&[("/app/build", "/app/src/net/a.cpp")]);
        let db = CompileDb::load(&path, Path::new("/app")).unwrap();
        let hits = db.resolve(Path::new("/APP/SRC/NET/A.CPP"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0], Path::new("/app/src/net/a.cpp"));
    }

    #[test]
    fn header_falls_back_to_directory_units() {
        let (_tmp, path) = write_db(&[
            ("/app/build", "/app/src/net/a.cpp"),
            ("/app/build", "/app/src/net/b.cpp"),
            ("/app/build", "/app/src/io/c.cpp"),
        ]);
        let db = CompileDb::load(&path, Path::new("/app")).unwrap();
        let hits = db.resolve(Path::new("/app/src/net/a.hpp"));
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn relative_files_join_their_directory() {
        let (_tmp, path) = write_db(&[("/app/build", "../src/x.cpp")]);
        let db = CompileDb::load(&path, Path::new("/app")).unwrap();
        assert_eq!(db.resolve(Path::new("/app/src/x.cpp")).len(), 1);
    }

    #[test]
    fn module_keys_take_two_segments() {
        let (_tmp, path) = write_db(&[
            ("/app/build", "/app/src/net/a.cpp"),
            ("/app/build", "/app/src/net/deep/b.cpp"),
            ("/app/build", "/app/main.cpp"),
        ]);
        let db = CompileDb::load(&path, Path::new("/app")).unwrap();
        assert_eq!(
            db.module_key(Path::new("/app/src/net/a.cpp")).as_deref(),
            Some("src/net")
        );
        assert_eq!(
            db.module_key(Path::new("/app/src/net/deep/b.cpp")).as_deref(),
            Some("src/net")
        );
        assert_eq!(db.module_key(Path::new("/app/main.cpp")), None);

        let neighbors = db.module_neighbors(Path::new("/app/src/net/a.cpp"));
        assert_eq!(neighbors.len(), 2);
    }

    #[test]
    fn missing_file_maps_to_missing_compile_commands() {
        let err = CompileDb::load(Path::new("/no/such.json"), Path::new("/app")).unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingCompileCommands(_)));
    }
}
