//! Moniker linking (§4.1): derives package-scoped siblings for local
//! export/import monikers and connects them to the originals via
//! `attach`/`packageInformation` edges, deferred through an
//! [`attach::AttachQueue`] so ids never collide with the source stream.

pub mod attach;
pub mod manifest;

use std::path::{Path, PathBuf};

use crate::id::{Id, IdAllocator};
use crate::protocol::types::{
    EdgeData, MonikerKind, MonikerVertex, UniquenessLevel, WireElement,
};
use attach::AttachQueue;
use manifest::{normalize_path_slashes, strip_known_extension, ManifestCache};

/// The moniker scheme this indexer emits for indexer-local symbols.
/// Not parameterized by the external CLI surface (§6 only lists
/// `--package`/`--projectRoot`); every reference dump in the pack uses
/// `"tsc"`, so it's fixed here rather than invented as a flag.
pub const NATIVE_SCHEME: &str = "tsc";
const PACKAGE_MANAGER_SCHEME: &str = "npm";

pub struct Linker {
    project_root: PathBuf,
    package_manifest_path: PathBuf,
    group_active: bool,
    manifest_cache: ManifestCache,
    attach_queue: AttachQueue,
    buffered_monikers: std::collections::HashMap<Id, (WireElement, MonikerVertex)>,
    buffered_package_names: std::collections::HashMap<Id, (String, Option<String>)>,
}

impl Linker {
    pub fn new(project_root: PathBuf, package_manifest_path: PathBuf) -> Self {
        Linker {
            project_root,
            package_manifest_path,
            group_active: false,
            manifest_cache: ManifestCache::new(),
            attach_queue: AttachQueue::new(),
            buffered_monikers: Default::default(),
            buffered_package_names: Default::default(),
        }
    }

    pub fn on_group_begin(&mut self) {
        self.group_active = true;
    }

    pub fn on_group_end(&mut self) {
        self.group_active = false;
    }

    /// Remembers a moniker or packageInformation vertex so a later
    /// `packageInformation` edge between two already-buffered elements can
    /// be handled by the in-stream rewrite path (§4.1
    /// `handle_package_information_edge`).
    pub fn buffer_moniker(&mut self, id: Id, element: WireElement, moniker: MonikerVertex) {
        self.buffered_monikers.insert(id, (element, moniker));
    }

    pub fn buffer_package_information(&mut self, id: Id, name: String, version: Option<String>) {
        self.buffered_package_names.insert(id, (name, version));
    }

    /// §4.1 `handle_export_moniker`. Returns `true` if a derived sibling
    /// was queued.
    pub fn handle_export_moniker(&mut self, id: &Id, moniker: &MonikerVertex) -> bool {
        if !self.group_active || moniker.kind != MonikerKind::Export || moniker.scheme != NATIVE_SCHEME {
            return false;
        }
        let (path, name) = match split_identifier(&moniker.identifier) {
            Some(parts) => parts,
            None => return false,
        };
        let manifest_path = self.package_manifest_path.clone();
        let (manifest, package_information_id) = match self.ensure_package_information(&manifest_path) {
            Some(it) => it,
            None => return false,
        };
        let relative = normalize_path_slashes(path);
        let identifier = derive_identifier(
            &manifest.name,
            manifest.version.as_deref(),
            Some(manifest.main()),
            Some(manifest.typings()),
            &relative,
            name,
        );
        self.queue_derived_moniker(id, moniker, identifier, package_information_id);
        true
    }

    /// §4.1 `handle_import_moniker`.
    pub fn handle_import_moniker(&mut self, id: &Id, moniker: &MonikerVertex) -> bool {
        if !self.group_active || moniker.kind != MonikerKind::Import || moniker.scheme != NATIVE_SCHEME {
            return false;
        }
        let (path, name) = match split_identifier(&moniker.identifier) {
            Some(parts) => parts,
            None => return false,
        };
        let (package_dir, relative) = match locate_node_modules_package(path) {
            Some(it) => it,
            None => return false,
        };
        let manifest_path = self.project_root.join(&package_dir).join("package.json");
        let (manifest, package_information_id) = match self.ensure_package_information(&manifest_path) {
            Some(it) => it,
            None => return false,
        };
        let identifier = derive_identifier(
            &manifest.name,
            manifest.version.as_deref(),
            Some(manifest.main()),
            Some(manifest.typings()),
            &relative,
            name,
        );
        self.queue_derived_moniker(id, moniker, identifier, package_information_id);
        true
    }

    /// §4.1 `handle_package_information_edge`: the alternate in-stream
    /// rewrite mode. Given a `packageInformation` edge whose endpoints are
    /// both already buffered, rewrites the moniker's scheme/identifier in
    /// place and returns it (followed by the edge, unchanged) for
    /// immediate pass-through emission rather than queuing through the
    /// attach batch.
    pub fn handle_package_information_edge(
        &mut self,
        edge: &EdgeData,
    ) -> Option<(WireElement, MonikerVertex)> {
        let (_, moniker) = self.buffered_monikers.get(&edge.out_v)?;
        if moniker.scheme != NATIVE_SCHEME {
            return None;
        }
        let (path, name) = split_identifier(&moniker.identifier)?;
        let (pkg_name, version) = self.buffered_package_names.get(&edge.in_v)?.clone();
        let identifier = derive_identifier(&pkg_name, version.as_deref(), None, None, path, name);
        let mut rewritten = moniker.clone();
        rewritten.scheme = PACKAGE_MANAGER_SCHEME.to_string();
        rewritten.identifier = identifier;
        let (original_element, _) = self.buffered_monikers.get(&edge.out_v).unwrap();
        let mut element = original_element.clone();
        element.fields = serde_json::to_value(&rewritten)
            .and_then(|v| match v {
                serde_json::Value::Object(m) => Ok(m),
                _ => unreachable!(),
            })
            .ok()?;
        Some((element, rewritten))
    }

    fn queue_derived_moniker(
        &mut self,
        original_id: &Id,
        original: &MonikerVertex,
        identifier: String,
        package_information_id: Id,
    ) {
        let new_id = self.attach_queue.fresh_temp_id();
        self.attach_queue.push(WireElement::vertex(
            new_id.clone(),
            "moniker",
            MonikerVertex {
                scheme: PACKAGE_MANAGER_SCHEME.to_string(),
                identifier,
                kind: original.kind,
                unique: UniquenessLevel::Scheme,
            },
        ));
        let attach_edge_id = self.attach_queue_fresh_id();
        self.attach_queue.push(WireElement::edge(
            attach_edge_id,
            "attach",
            EdgeData {
                out_v: new_id.clone(),
                in_v: original_id.clone(),
            },
        ));
        let package_information_edge_id = self.attach_queue_fresh_id();
        self.attach_queue.push(WireElement::edge(
            package_information_edge_id,
            "packageInformation",
            EdgeData {
                out_v: new_id,
                in_v: package_information_id,
            },
        ));
    }

    fn attach_queue_fresh_id(&mut self) -> Id {
        self.attach_queue.fresh_temp_id()
    }

    fn ensure_package_information(
        &mut self,
        manifest_path: &Path,
    ) -> Option<(manifest::PackageManifest, Id)> {
        let cached = self.manifest_cache.load(manifest_path)?.clone();
        if let Some(id) = cached.package_information_id {
            return Some((cached.manifest, id));
        }
        let id = self.attach_queue.fresh_temp_id();
        self.attach_queue.push(WireElement::vertex(
            id.clone(),
            "packageInformation",
            cached.manifest.to_package_information(),
        ));
        self.manifest_cache.set_package_information_id(manifest_path, id.clone());
        Some((cached.manifest, id))
    }

    /// Flushes the attach queue at end-of-stream (§4.1, §4.4).
    pub fn flush(self, allocator: &mut IdAllocator) -> anyhow::Result<Vec<WireElement>> {
        self.attach_queue.flush(allocator)
    }

    pub fn has_pending(&self) -> bool {
        !self.attach_queue.is_empty()
    }
}

/// Splits a native moniker identifier `path::name` into its path and
/// symbol-name components. Returns `None` when there is no path
/// component at all (§4.1 "If no path component, ignore").
fn split_identifier(identifier: &str) -> Option<(&str, &str)> {
    identifier.split_once("::")
}

fn derive_identifier(
    package_name: &str,
    version: Option<&str>,
    main: Option<&str>,
    typings: Option<&str>,
    relative_path: &str,
    symbol: &str,
) -> String {
    let matches_entry_point = [main, typings]
        .iter()
        .filter_map(|entry| *entry)
        .any(|entry| strip_known_extension(entry) == strip_known_extension(relative_path));
    let prefix = match version {
        Some(v) if !v.is_empty() => format!("{}@{}", package_name, v),
        _ => package_name.to_string(),
    };
    if matches_entry_point {
        format!("{}::{}", prefix, symbol)
    } else {
        format!("{}/{}::{}", prefix, relative_path, symbol)
    }
}

/// Finds the nearest `node_modules/<pkg>` (or `node_modules/@scope/pkg`)
/// segment in a path, returning `(package_dir, path_relative_to_package)`.
fn locate_node_modules_package(path: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = path.split('/').collect();
    let node_modules_idx = parts.iter().position(|p| *p == "node_modules")?;
    let mut pkg_end = node_modules_idx + 1;
    if pkg_end >= parts.len() {
        return None;
    }
    if parts[pkg_end].starts_with('@') {
        pkg_end += 1;
        if pkg_end >= parts.len() {
            return None;
        }
    }
    pkg_end += 1;
    if pkg_end > parts.len() {
        return None;
    }
    let package_dir = parts[..pkg_end].join("/");
    let relative = parts[pkg_end..].join("/");
    Some((package_dir, relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_identifier_on_first_double_colon() {
        assert_eq!(split_identifier("src/a.ts::foo"), Some(("src/a.ts", "foo")));
        assert_eq!(split_identifier("no-path-here"), None);
    }

    #[test]
    fn locates_scoped_node_modules_package() {
        let (dir, rel) = locate_node_modules_package("node_modules/@scope/x/lib/b.ts").unwrap();
        assert_eq!(dir, "node_modules/@scope/x");
        assert_eq!(rel, "lib/b.ts");
    }

    #[test]
    fn locates_unscoped_node_modules_package() {
        let (dir, rel) = locate_node_modules_package("node_modules/left-pad/index.js").unwrap();
        assert_eq!(dir, "node_modules/left-pad");
        assert_eq!(rel, "index.js");
    }

    #[test]
    fn derive_identifier_main_match_drops_path() {
        let id = derive_identifier("pkg", Some("1.0.0"), Some("src/a.ts"), None, "src/a.ts", "foo");
        assert_eq!(id, "pkg@1.0.0::foo");
    }

    #[test]
    fn derive_identifier_no_match_keeps_relative_path() {
        let id = derive_identifier("pkg", Some("1.0.0"), Some("lib/a.js"), None, "src/a.ts", "foo");
        assert_eq!(id, "pkg@1.0.0/src/a.ts::foo");
    }

    fn write_manifest(dir: &Path, contents: &str) {
        std::fs::write(dir.join("package.json"), contents).unwrap();
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lsif-link-linker-test-{}-{}", std::process::id(), name));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn scenario_single_export() {
        let root = scratch_dir("single-export");
        write_manifest(&root, r#"{"name":"pkg","version":"1.0.0","main":"lib/a.js"}"#);
        let mut linker = Linker::new(root.clone(), root.join("package.json"));
        linker.on_group_begin();
        let moniker = MonikerVertex {
            scheme: "tsc".into(),
            identifier: "src/a.ts::foo".into(),
            kind: MonikerKind::Export,
            unique: UniquenessLevel::Document,
        };
        assert!(linker.handle_export_moniker(&Id::Number(1), &moniker));
        let mut allocator = IdAllocator::new();
        allocator.observe(&Id::Number(1)).unwrap();
        let flushed = linker.flush(&mut allocator).unwrap();
        let derived = flushed.iter().find(|e| e.label == "moniker").unwrap();
        let derived: MonikerVertex = derived.parse_as().unwrap();
        assert_eq!(derived.identifier, "pkg@1.0.0/src/a.ts::foo");
        assert_eq!(derived.scheme, "npm");
        assert!(flushed.iter().any(|e| e.label == "attach"));
        assert!(flushed.iter().any(|e| e.label == "packageInformation"));
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn scenario_main_match_drops_path() {
        let root = scratch_dir("main-match");
        write_manifest(&root, r#"{"name":"pkg","version":"1.0.0","main":"src/a.ts"}"#);
        let mut linker = Linker::new(root.clone(), root.join("package.json"));
        linker.on_group_begin();
        let moniker = MonikerVertex {
            scheme: "tsc".into(),
            identifier: "src/a.ts::foo".into(),
            kind: MonikerKind::Export,
            unique: UniquenessLevel::Document,
        };
        linker.handle_export_moniker(&Id::Number(1), &moniker);
        let mut allocator = IdAllocator::new();
        allocator.observe(&Id::Number(1)).unwrap();
        let flushed = linker.flush(&mut allocator).unwrap();
        let derived: MonikerVertex = flushed.iter().find(|e| e.label == "moniker").unwrap().parse_as().unwrap();
        assert_eq!(derived.identifier, "pkg@1.0.0::foo");
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn scenario_import_from_node_modules() {
        let root = scratch_dir("import-node-modules");
        let pkg_dir = root.join("node_modules").join("@scope").join("x");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        write_manifest(&pkg_dir, r#"{"name":"@scope/x","main":"lib/b.js"}"#);
        let mut linker = Linker::new(root.clone(), root.join("package.json"));
        linker.on_group_begin();
        let moniker = MonikerVertex {
            scheme: "tsc".into(),
            identifier: "node_modules/@scope/x/lib/b.ts::bar".into(),
            kind: MonikerKind::Import,
            unique: UniquenessLevel::Document,
        };
        assert!(linker.handle_import_moniker(&Id::Number(1), &moniker));
        let mut allocator = IdAllocator::new();
        allocator.observe(&Id::Number(1)).unwrap();
        let flushed = linker.flush(&mut allocator).unwrap();
        let derived: MonikerVertex = flushed.iter().find(|e| e.label == "moniker").unwrap().parse_as().unwrap();
        assert_eq!(derived.identifier, "@scope/x::bar");
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn missing_manifest_passes_moniker_through() {
        let root = scratch_dir("missing-manifest");
        let mut linker = Linker::new(root.clone(), root.join("package.json"));
        linker.on_group_begin();
        let moniker = MonikerVertex {
            scheme: "tsc".into(),
            identifier: "src/a.ts::foo".into(),
            kind: MonikerKind::Export,
            unique: UniquenessLevel::Document,
        };
        assert!(!linker.handle_export_moniker(&Id::Number(1), &moniker));
        assert!(!linker.has_pending());
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn outside_group_no_linking_happens() {
        let root = scratch_dir("outside-group");
        write_manifest(&root, r#"{"name":"pkg","version":"1.0.0"}"#);
        let mut linker = Linker::new(root.clone(), root.join("package.json"));
        let moniker = MonikerVertex {
            scheme: "tsc".into(),
            identifier: "src/a.ts::foo".into(),
            kind: MonikerKind::Export,
            unique: UniquenessLevel::Document,
        };
        assert!(!linker.handle_export_moniker(&Id::Number(1), &moniker));
        std::fs::remove_dir_all(&root).ok();
    }
}
