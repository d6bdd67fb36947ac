use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

pub const PROGRAMS_DIR: &str = "training_programs";

/// `"2025_1"` → `"2025: Term 1"`. Returns `None` for file stems that do not
/// follow the `<year>_<term>` convention (both parts numeric).
pub fn display_name(stem: &str) -> Option<String> {
    let (year, term) = stem.split_once('_')?;
    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !numeric(year) || !numeric(term) {
        return None;
    }
    Some(format!("{year}: Term {term}"))
}

/// `"2025: Term 1"` → `"2025_1"`, the inverse of [`display_name`].
pub fn file_stem(display: &str) -> String {
    display.replace(": ", "_").replace("Term ", "")
}

/// File store for training-program CSVs under
/// `<workspace>/training_programs/`.
pub struct ProgramStore {
    dir: PathBuf,
}

impl ProgramStore {
    pub fn new(workspace: &Path) -> Self {
        Self {
            dir: workspace.join(PROGRAMS_DIR),
        }
    }

    fn path_for(&self, display: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", file_stem(display)))
    }

    /// Display names of every stored program, sorted ascending (names sort
    /// chronologically).
    pub fn list(&self) -> anyhow::Result<Vec<String>> {
        let mut out = Vec::new();
        if !self.dir.is_dir() {
            return Ok(out);
        }
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read {}", self.dir.to_string_lossy()))?
        {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(name) = display_name(stem) {
                out.push(name);
            }
        }
        out.sort();
        Ok(out)
    }

    pub fn exists(&self, display: &str) -> bool {
        self.path_for(display).is_file()
    }

    pub fn read(&self, display: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.path_for(display);
        std::fs::read(&path)
            .with_context(|| format!("failed to read program file {}", path.to_string_lossy()))
    }

    pub fn write(&self, display: &str, bytes: &[u8]) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.to_string_lossy()))?;
        let path = self.path_for(display);
        std::fs::write(&path, bytes)
            .with_context(|| format!("failed to write program file {}", path.to_string_lossy()))
    }

    pub fn remove(&self, display: &str) -> anyhow::Result<()> {
        let path = self.path_for(display);
        if !path.is_file() {
            return Err(anyhow!(
                "program file not found: {}",
                path.to_string_lossy()
            ));
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to remove {}", path.to_string_lossy()))
    }
}
