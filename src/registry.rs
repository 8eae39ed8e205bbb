//! Module registry: maps module names to script files under a root.
//!
//! The registry is an immutable [`ModuleIndex`] behind an `Arc` that is
//! swapped wholesale after every scan, so readers never observe a
//! half-updated directory.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use url::Url;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::extract::ModuleSyntax;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    /// Script file extension, without the dot.
    pub extension: String,
    /// Separator placed between path components of a module name.
    pub separator: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            extension: "dos".to_string(),
            separator: "::".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    /// Name derived from the path relative to the registry root.
    pub module_name: String,
    /// Name from the file's own `module` line, which wins for resolution.
    pub declared_name: Option<String>,
    pub path: PathBuf,
}

impl ModuleEntry {
    /// The name `use` statements must match.
    pub fn name(&self) -> &str {
        self.declared_name.as_deref().unwrap_or(&self.module_name)
    }

    pub fn uri(&self) -> Option<Url> {
        Url::from_file_path(&self.path).ok()
    }

    pub fn parent(&self) -> Option<&Path> {
        self.path.parent()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleEvent {
    Added(ModuleEntry),
    Changed(ModuleEntry),
    Removed(ModuleEntry),
}

impl ModuleEvent {
    pub fn entry(&self) -> &ModuleEntry {
        match self {
            ModuleEvent::Added(entry) | ModuleEvent::Changed(entry) | ModuleEvent::Removed(entry) => entry,
        }
    }
}

/// Result of a scan: what changed and which directories need a watch.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub events: Vec<ModuleEvent>,
    pub new_dirs: Vec<PathBuf>,
}

/// Arena of entries plus lookup indexes by name, path and parent directory.
#[derive(Debug, Clone, Default)]
pub struct ModuleIndex {
    root: Option<PathBuf>,
    entries: Vec<ModuleEntry>,
    by_path: HashMap<PathBuf, usize>,
    by_name: HashMap<String, Vec<usize>>,
    by_dir: HashMap<PathBuf, Vec<usize>>,
    dirs: BTreeSet<PathBuf>,
}

impl ModuleIndex {
    fn build(root: PathBuf, entries: Vec<ModuleEntry>, dirs: BTreeSet<PathBuf>) -> Self {
        let mut index = ModuleIndex {
            root: Some(root),
            dirs,
            ..Default::default()
        };
        for entry in entries {
            if index.by_path.contains_key(&entry.path) {
                continue;
            }
            let idx = index.entries.len();
            index.by_path.insert(entry.path.clone(), idx);
            index.by_name.entry(entry.name().to_string()).or_default().push(idx);
            if let Some(parent) = entry.parent() {
                index.by_dir.entry(parent.to_path_buf()).or_default().push(idx);
            }
            index.entries.push(entry);
        }
        index
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn entries(&self) -> &[ModuleEntry] {
        &self.entries
    }

    pub fn find(&self, name: &str) -> Vec<&ModuleEntry> {
        self.by_name
            .get(name)
            .map(|ids| ids.iter().map(|&idx| &self.entries[idx]).collect())
            .unwrap_or_default()
    }

    pub fn by_path(&self, path: &Path) -> Option<&ModuleEntry> {
        self.by_path.get(path).map(|&idx| &self.entries[idx])
    }

    pub fn in_dir(&self, dir: &Path) -> Vec<&ModuleEntry> {
        self.by_dir
            .get(dir)
            .map(|ids| ids.iter().map(|&idx| &self.entries[idx]).collect())
            .unwrap_or_default()
    }

    pub fn dirs(&self) -> impl Iterator<Item = &PathBuf> {
        self.dirs.iter()
    }
}

#[derive(Debug, Default)]
pub struct ModuleRegistry {
    settings: RwLock<RegistrySettings>,
    syntax: RwLock<Arc<ModuleSyntax>>,
    index: RwLock<Arc<ModuleIndex>>,
    /// Serializes snapshot, rebuild and swap so concurrent scans never drop
    /// each other's updates.
    update: Mutex<()>,
    ready: AtomicBool,
}

impl ModuleRegistry {
    pub fn new(settings: RegistrySettings) -> Self {
        let registry = Self::default();
        registry.configure(settings);
        registry
    }

    pub fn configure(&self, settings: RegistrySettings) {
        let syntax = Arc::new(ModuleSyntax::new(&settings.separator));
        *self
            .syntax
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = syntax;
        *self
            .settings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = settings;
    }

    /// Module-path syntax for the configured separator.
    pub fn syntax(&self) -> Arc<ModuleSyntax> {
        self.syntax
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn settings(&self) -> RegistrySettings {
        self.settings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// True once the initial scan has completed.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> Arc<ModuleIndex> {
        self.index
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn find(&self, name: &str) -> Vec<ModuleEntry> {
        self.snapshot().find(name).into_iter().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        !self.snapshot().find(name).is_empty()
    }

    pub fn entries(&self) -> Vec<ModuleEntry> {
        self.snapshot().entries().to_vec()
    }

    pub fn entry_for_path(&self, path: &Path) -> Option<ModuleEntry> {
        self.snapshot().by_path(path).cloned()
    }

    fn swap(&self, index: ModuleIndex) -> Arc<ModuleIndex> {
        let mut guard = self
            .index
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, Arc::new(index))
    }

    /// Walk `root` breadth-first and replace the whole index.
    pub fn scan(&self, root: &Path) -> Result<ScanOutcome> {
        if !root.is_dir() {
            return Err(Error::Config(format!(
                "module root {} is not a directory",
                root.display()
            )));
        }
        let _update = self.update.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let settings = self.settings();
        let syntax = self.syntax();
        let mut entries = Vec::new();
        let mut dirs = BTreeSet::new();
        walk(root, root, &settings, &syntax, &mut entries, &mut dirs);

        let new_dirs: Vec<PathBuf> = dirs.iter().cloned().collect();
        let index = ModuleIndex::build(root.to_path_buf(), entries, dirs);
        let old = self.swap(index);
        self.ready.store(true, Ordering::Release);

        let current = self.snapshot();
        tracing::info!(
            root = %root.display(),
            modules = current.entries().len(),
            "module registry ready"
        );
        Ok(ScanOutcome {
            events: diff(&old, &current, None),
            new_dirs,
        })
    }

    /// Re-register the direct script children of `dir` after a change
    /// notification. New subdirectories are walked, vanished ones dropped.
    pub fn rescan_dir(&self, dir: &Path) -> ScanOutcome {
        let _update = self.update.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let old = self.snapshot();
        let Some(root) = old.root().map(Path::to_path_buf) else {
            return ScanOutcome::default();
        };
        if !dir.starts_with(&root) {
            return ScanOutcome::default();
        }
        let settings = self.settings();
        let syntax = self.syntax();

        let vanished: Vec<PathBuf> = old
            .dirs()
            .filter(|known| known.starts_with(dir) && !known.is_dir())
            .cloned()
            .collect();

        let mut dirs: BTreeSet<PathBuf> = old
            .dirs()
            .filter(|known| !vanished.iter().any(|gone| known.starts_with(gone)))
            .cloned()
            .collect();
        let mut entries: Vec<ModuleEntry> = old
            .entries()
            .iter()
            .filter(|entry| entry.parent() != Some(dir))
            .filter(|entry| !vanished.iter().any(|gone| entry.path.starts_with(gone)))
            .cloned()
            .collect();

        let mut new_dirs = Vec::new();
        if dir.is_dir() {
            if dirs.insert(dir.to_path_buf()) {
                new_dirs.push(dir.to_path_buf());
            }
            let (files, subdirs) = list_dir(dir, &settings);
            entries.extend(files.iter().filter_map(|file| make_entry(&root, file, &syntax)));
            for subdir in subdirs {
                if dirs.contains(&subdir) {
                    continue;
                }
                let mut found = BTreeSet::new();
                walk(&root, &subdir, &settings, &syntax, &mut entries, &mut found);
                new_dirs.extend(found.iter().cloned());
                dirs.extend(found);
            }
        }

        self.swap(ModuleIndex::build(root, entries, dirs));
        let current = self.snapshot();
        let events = diff(&old, &current, Some(dir));
        tracing::debug!(dir = %dir.display(), events = events.len(), "rescanned module directory");
        ScanOutcome { events, new_dirs }
    }
}

/// Breadth-first walk from `start`, collecting script entries and directories.
fn walk(
    root: &Path,
    start: &Path,
    settings: &RegistrySettings,
    syntax: &ModuleSyntax,
    entries: &mut Vec<ModuleEntry>,
    dirs: &mut BTreeSet<PathBuf>,
) {
    let mut queue = VecDeque::from([start.to_path_buf()]);
    while let Some(dir) = queue.pop_front() {
        if !dirs.insert(dir.clone()) {
            continue;
        }
        let (files, subdirs) = list_dir(&dir, settings);
        entries.extend(files.iter().filter_map(|file| make_entry(root, file, syntax)));
        queue.extend(subdirs);
    }
}

/// Direct children of `dir`: script files and non-hidden subdirectories.
fn list_dir(dir: &Path, settings: &RegistrySettings) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut files = Vec::new();
    let mut subdirs = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "failed to list directory entry");
                continue;
            }
        };
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if entry.file_type().is_dir() {
            if !hidden {
                subdirs.push(entry.into_path());
            }
        } else if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == settings.extension.as_str())
        {
            files.push(entry.into_path());
        }
    }

    (files, subdirs)
}

fn make_entry(root: &Path, path: &Path, syntax: &ModuleSyntax) -> Option<ModuleEntry> {
    let module_name = derive_module_name(root, path, syntax.separator())?;
    let declared_name = match fs::read_to_string(path) {
        Ok(text) => syntax.parse_module_declaration(&text),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read module file");
            None
        }
    };
    Some(ModuleEntry {
        module_name,
        declared_name,
        path: path.to_path_buf(),
    })
}

/// Module name for `path`: its path under `root`, extension stripped,
/// components joined with `separator`.
pub fn derive_module_name(root: &Path, path: &Path, separator: &str) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(separator))
    }
}

/// Compare two snapshots. Entries directly under `touched` that survive are
/// reported as changed since their contents may have been rewritten.
fn diff(old: &ModuleIndex, new: &ModuleIndex, touched: Option<&Path>) -> Vec<ModuleEvent> {
    let mut events = Vec::new();
    let mut seen = HashSet::new();

    for entry in new.entries() {
        seen.insert(entry.path.as_path());
        match old.by_path(&entry.path) {
            None => events.push(ModuleEvent::Added(entry.clone())),
            Some(previous) => {
                if previous != entry || (touched.is_some() && entry.parent() == touched) {
                    events.push(ModuleEvent::Changed(entry.clone()));
                }
            }
        }
    }

    for entry in old.entries() {
        if !seen.contains(entry.path.as_path()) {
            events.push(ModuleEvent::Removed(entry.clone()));
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_nested_module_name() {
        let root = Path::new("/ws/modules");
        let name = derive_module_name(root, Path::new("/ws/modules/a/b/c.dos"), "::");
        assert_eq!(name.as_deref(), Some("a::b::c"));
    }

    #[test]
    fn uses_configured_separator() {
        let root = Path::new("/ws");
        let name = derive_module_name(root, Path::new("/ws/x/y.dos"), ".");
        assert_eq!(name.as_deref(), Some("x.y"));
    }

    #[test]
    fn paths_outside_root_have_no_name() {
        assert_eq!(derive_module_name(Path::new("/ws"), Path::new("/other/a.dos"), "::"), None);
    }
}
