// corpus.rs — Knowledge directory → ordered fragment list.
//
// Fragment identity is its position in the returned list, so ordering must be
// deterministic: files sorted by name, fragments in file order.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config;
use crate::error::KbError;

/// Result of scanning a knowledge directory.
#[derive(Debug, Default)]
pub struct CorpusLoad {
    pub fragments: Vec<String>,
    /// Files that contributed fragments, in load order.
    pub files: Vec<PathBuf>,
    /// Per-file failures (`KbError::FileRead`) that were skipped.
    pub skipped: Vec<KbError>,
    /// Set when the directory did not exist (`KbError::CorpusMissing`).
    pub missing: Option<KbError>,
}

impl CorpusLoad {
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Load every recognized text file in `dir` and split it into fragments.
///
/// Never fails as a whole: a missing directory yields an empty load with `missing`
/// set, and unreadable files are logged and recorded in `skipped`.
pub fn load_fragments(dir: &Path) -> CorpusLoad {
    let mut load = CorpusLoad::default();

    if !dir.is_dir() {
        log::warn!("Knowledge directory not found: {} (continuing with empty base)", dir.display());
        load.missing = Some(KbError::CorpusMissing(dir.to_path_buf()));
        return load;
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Cannot list knowledge directory {}: {}", dir.display(), e);
            load.missing = Some(KbError::CorpusMissing(dir.to_path_buf()));
            return load;
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_text_extension(p))
        .collect();
    paths.sort();

    for path in paths {
        match read_text(&path) {
            Ok(content) => {
                let before = load.fragments.len();
                load.fragments.extend(split_fragments(&content));
                log::debug!(
                    "Loaded {} fragments from {}",
                    load.fragments.len() - before,
                    path.display()
                );
                load.files.push(path);
            }
            Err(e) => {
                log::warn!("Skipping unreadable file: {}", e);
                load.skipped.push(e);
            }
        }
    }

    log::info!(
        "Corpus loaded from {}: {} fragments from {} files ({} skipped)",
        dir.display(),
        load.fragments.len(),
        load.files.len(),
        load.skipped.len()
    );
    load
}

/// Split document text on blank-line boundaries, preserving order.
pub fn split_fragments(content: &str) -> Vec<String> {
    let normalized = content.replace("\r\n", "\n");
    normalized
        .split(config::corpus::FRAGMENT_SEPARATOR)
        .map(str::to_string)
        .collect()
}

fn has_text_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            config::corpus::TEXT_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

fn read_text(path: &Path) -> Result<String, KbError> {
    let bytes = fs::read(path).map_err(|e| KbError::FileRead {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| KbError::FileRead {
        path: path.to_path_buf(),
        reason: format!("invalid UTF-8: {e}"),
    })
}
