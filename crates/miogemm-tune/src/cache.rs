//! Solution cache: one file per geometry under a cache directory.

use std::fs;
use std::path::PathBuf;

use miogemm_bench::source_hash;
use miogemm_core::{Geometry, MiogError, Solution};

/// Environment variable naming the cache directory.
pub const CACHE_DIR_ENV: &str = "MIOGEMM_CACHE_DIR";

/// Key-value store of previously discovered solutions, keyed by the
/// canonical geometry string.
#[derive(Debug, Clone)]
pub struct SolutionCache {
    dir: PathBuf,
}

impl SolutionCache {
    /// Opens the cache named by `MIOGEMM_CACHE_DIR`, if the variable is set.
    pub fn from_env() -> Result<Option<Self>, MiogError> {
        match std::env::var(CACHE_DIR_ENV) {
            Ok(dir) if !dir.is_empty() => Ok(Some(Self::open(PathBuf::from(dir))?)),
            _ => Ok(None),
        }
    }

    /// Opens (creating if needed) a cache rooted at the given directory.
    pub fn open(dir: PathBuf) -> Result<Self, MiogError> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn entry_path(&self, gg: &Geometry) -> PathBuf {
        self.dir
            .join(format!("{}.soln", source_hash(&gg.canonical_string())))
    }

    /// Loads the cached solution for a geometry, if present and parseable.
    pub fn load(&self, gg: &Geometry) -> Option<Solution> {
        let text = fs::read_to_string(self.entry_path(gg)).ok()?;
        let solution = Solution::from_text(&text).ok()?;
        (solution.geometry == *gg).then_some(solution)
    }

    /// Stores a solution under its geometry key, overwriting any previous
    /// entry.
    pub fn store(&self, solution: &Solution) -> Result<(), MiogError> {
        fs::write(self.entry_path(&solution.geometry), solution.to_text())?;
        Ok(())
    }
}
