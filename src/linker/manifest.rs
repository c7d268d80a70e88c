//! Package manifest (`package.json`) reading and caching (§4.1, §6).
//!
//! Only the subset of `package.json` the linker needs is modeled:
//! `name`, `version`, `main`, `typings`, `repository`. A missing or
//! unreadable manifest is non-fatal — the moniker whose linkage
//! depended on it simply passes through unmodified, and a negative
//! cache entry is kept so the failure isn't retried per-moniker.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::protocol::types::{PackageInformationVertex, Repository as WireRepository};

#[derive(Debug, Clone, Deserialize)]
pub struct PackageManifest {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    main: Option<String>,
    #[serde(default)]
    typings: Option<String>,
    #[serde(default)]
    repository: Option<ManifestRepository>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ManifestRepository {
    Full { r#type: String, url: String },
    Shorthand(String),
}

impl PackageManifest {
    pub fn main(&self) -> &str {
        self.main.as_deref().unwrap_or("index.js")
    }

    pub fn typings(&self) -> &str {
        self.typings.as_deref().unwrap_or("index.d.ts")
    }

    pub fn to_package_information(&self) -> PackageInformationVertex {
        PackageInformationVertex {
            name: self.name.clone(),
            manager: "npm".to_string(),
            version: self.version.clone(),
            repository: self.repository.as_ref().map(|r| match r {
                ManifestRepository::Full { r#type, url } => WireRepository {
                    r#type: r#type.clone(),
                    url: url.clone(),
                    commit_id: None,
                },
                ManifestRepository::Shorthand(url) => WireRepository {
                    r#type: "git".to_string(),
                    url: url.clone(),
                    commit_id: None,
                },
            }),
            uri: None,
        }
    }
}

/// Strips a `.d.ts`, `.ts`, or `.js` suffix so `main`/`typings` compare
/// equal to a moniker-relative path regardless of which extension each
/// side happens to use (§4.1 "Main/typings matching").
pub fn strip_known_extension(path: &str) -> &str {
    for ext in [".d.ts", ".ts", ".js"] {
        if let Some(stripped) = path.strip_suffix(ext) {
            return stripped;
        }
    }
    path
}

/// Normalizes path separators to `/` and drops a trailing separator,
/// independent of host platform (§4.1, §8 boundary behaviors).
pub fn normalize_path_slashes(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    replaced.trim_end_matches('/').to_string()
}

#[derive(Debug, Clone)]
pub struct CachedManifest {
    pub manifest: PackageManifest,
    pub package_information_id: Option<crate::id::Id>,
}

/// Manifest file path → `{manifest, packageInformation}`, held for the
/// duration of the stream. A `None` cache entry records a manifest that
/// was absent or malformed, so repeat monikers under the same directory
/// don't re-attempt the read (§4.1 "Caching").
#[derive(Debug, Default)]
pub struct ManifestCache {
    entries: HashMap<PathBuf, Option<CachedManifest>>,
}

impl ManifestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads (or returns the cached result for) the manifest at
    /// `manifest_path`. Returns `None` if the manifest is missing or
    /// malformed; this is recorded negatively so the read is attempted
    /// only once.
    pub fn load(&mut self, manifest_path: &Path) -> Option<&CachedManifest> {
        if !self.entries.contains_key(manifest_path) {
            let loaded = read_manifest(manifest_path)
                .ok()
                .map(|manifest| CachedManifest {
                    manifest,
                    package_information_id: None,
                });
            self.entries.insert(manifest_path.to_path_buf(), loaded);
        }
        self.entries.get(manifest_path).unwrap().as_ref()
    }

    /// Records the id of the `packageInformation` vertex emitted for the
    /// manifest at `manifest_path`, so later monikers under the same
    /// manifest reuse it rather than emitting duplicates.
    pub fn set_package_information_id(&mut self, manifest_path: &Path, id: crate::id::Id) {
        if let Some(Some(cached)) = self.entries.get_mut(manifest_path) {
            cached.package_information_id = Some(id);
        }
    }
}

fn read_manifest(path: &Path) -> anyhow::Result<PackageManifest> {
    let text = std::fs::read_to_string(path)?;
    let manifest: PackageManifest = serde_json::from_str(&text)?;
    if manifest.name.is_empty() {
        anyhow::bail!("manifest at {} is missing `name`", path.display());
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_known_extensions() {
        assert_eq!(strip_known_extension("lib/a.d.ts"), "lib/a");
        assert_eq!(strip_known_extension("lib/a.ts"), "lib/a");
        assert_eq!(strip_known_extension("lib/a.js"), "lib/a");
        assert_eq!(strip_known_extension("lib/a"), "lib/a");
    }

    #[test]
    fn normalizes_separators_and_trailing_slash() {
        assert_eq!(normalize_path_slashes("a\\b\\c/"), "a/b/c");
    }

    #[test]
    fn missing_manifest_is_cached_negatively() {
        let mut cache = ManifestCache::new();
        let missing = Path::new("/does/not/exist/package.json");
        assert!(cache.load(missing).is_none());
        assert!(cache.entries.contains_key(missing));
    }

    #[test]
    fn manifest_missing_name_is_treated_as_absent() {
        let dir = tempdir();
        let path = dir.join("package.json");
        std::fs::write(&path, r#"{"version":"1.0.0"}"#).unwrap();
        let mut cache = ManifestCache::new();
        assert!(cache.load(&path).is_none());
        std::fs::remove_file(&path).ok();
    }

    fn tempdir() -> PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "lsif-link-test-{}-{}",
            std::process::id(),
            n
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
