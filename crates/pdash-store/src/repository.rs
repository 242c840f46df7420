//! Named value store that materialises typed values and routes
//! added/removed events through a [`PrefixHierarchy`].

use std::cell::Cell;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use pdash_core::frozen::{freeze, freeze_default, Thawed};
use pdash_core::{SaveableValue, SimpleValue, ValueFactory};
use pdash_events::{ListenerRef, PrefixHierarchy};
use tracing::{debug, error, info, warn};

use crate::datafile::{self, split_read_only, stored_text, Datafile, DatafileEntry};
use crate::error::StoreError;
use crate::settings::{PdashSettings, ANONYMOUS_PREFIX, DEFAULT_SAVE_THRESHOLD};

const MAX_RECURSION_DEPTH: usize = 100;

thread_local! {
    static PUT_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Tracks nested `put_value` calls made from listener callbacks on this
/// thread.
struct DepthGuard;

impl DepthGuard {
    fn enter() -> Option<Self> {
        PUT_DEPTH.with(|depth| {
            if depth.get() >= MAX_RECURSION_DEPTH {
                None
            } else {
                depth.set(depth.get() + 1);
                Some(DepthGuard)
            }
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        PUT_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[derive(Clone, Debug)]
pub struct RepositoryConfig {
    pub anonymous_prefix: String,
    pub save_threshold: u32,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            anonymous_prefix: ANONYMOUS_PREFIX.to_string(),
            save_threshold: DEFAULT_SAVE_THRESHOLD,
        }
    }
}

impl From<&PdashSettings> for RepositoryConfig {
    fn from(settings: &PdashSettings) -> Self {
        Self {
            anonymous_prefix: settings.anonymous_prefix.clone(),
            save_threshold: settings.save_threshold,
        }
    }
}

struct DataElement {
    value: SaveableValue,
    datafile: Option<Arc<Datafile>>,
}

pub struct DataRepository {
    data: DashMap<String, DataElement>,
    listeners: PrefixHierarchy,
    factory: ValueFactory,
    /// Relative name -> stored text, applied to every opened datafile.
    defaults: RwLock<HashMap<String, String>>,
    datafiles: Mutex<Vec<Arc<Datafile>>>,
    config: RepositoryConfig,
}

impl DataRepository {
    pub fn new(config: RepositoryConfig) -> Self {
        Self::with_factory(config, ValueFactory::new())
    }

    pub fn with_factory(config: RepositoryConfig, factory: ValueFactory) -> Self {
        Self {
            data: DashMap::new(),
            listeners: PrefixHierarchy::new(),
            factory,
            defaults: RwLock::new(HashMap::new()),
            datafiles: Mutex::new(Vec::new()),
            config,
        }
    }

    pub fn factory(&self) -> &ValueFactory {
        &self.factory
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn is_anonymous(&self, name: &str) -> bool {
        name.starts_with(self.config.anonymous_prefix.as_str())
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn get_value(&self, name: &str) -> Option<SaveableValue> {
        self.data.get(name).map(|e| e.value.clone())
    }

    pub fn get_simple_value(&self, name: &str) -> Option<SimpleValue> {
        self.data.get(name).and_then(|e| e.value.simple_value())
    }

    /// Names starting with `prefix`, sorted.
    pub fn names_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .data
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    // ── Writes ──────────────────────────────────────────────────────────

    /// Store `value` under `name`, replacing any previous value. A new name
    /// is announced to listeners.
    pub fn put_value(&self, name: &str, value: SaveableValue) {
        let datafile = self.guess_datafile(name);
        self.store(name, value, datafile, true);
    }

    /// `track` counts the write against the owning datafile's dirty count.
    fn store(&self, name: &str, value: SaveableValue, datafile: Option<Arc<Datafile>>, track: bool) {
        let Some(_guard) = DepthGuard::enter() else {
            error!(
                name,
                max_depth = MAX_RECURSION_DEPTH,
                "circular dependency in data, dropping write"
            );
            return;
        };

        let (added, modified) = match self.data.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                let element = entry.get_mut();
                let changed = element.value.save_string() != value.save_string()
                    || element.value.is_editable() != value.is_editable();
                element.value = value;
                if datafile.is_some() {
                    element.datafile = datafile;
                }
                (false, element.datafile.clone().filter(|_| changed && track))
            }
            Entry::Vacant(entry) => {
                entry.insert(DataElement {
                    value,
                    datafile: datafile.clone(),
                });
                (true, datafile.filter(|_| track))
            }
        };

        if let Some(df) = modified {
            self.datafile_modified(&df);
        }
        if added && !self.is_anonymous(name) {
            self.listeners.dispatch_added(name);
        }
    }

    /// Parse `text` strictly and store it. `null` removes the name.
    pub fn put_text(&self, name: &str, text: &str) -> Result<(), StoreError> {
        match self.factory.parse(text)? {
            Some(value) => self.put_value(name, value),
            None => {
                self.remove_value(name);
            }
        }
        Ok(())
    }

    /// Store `text` only if `name` has no value yet.
    pub fn maybe_create_value(&self, name: &str, text: &str) -> Result<bool, StoreError> {
        if self.data.contains_key(name) {
            return Ok(false);
        }
        match self.factory.parse(text)? {
            Some(value) => {
                self.put_value(name, value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove `name`, announcing the removal. Returns the old value.
    pub fn remove_value(&self, name: &str) -> Option<SaveableValue> {
        let (_, element) = self.data.remove(name)?;
        if let Some(df) = &element.datafile {
            self.datafile_modified(df);
        }
        if !self.is_anonymous(name) {
            self.listeners.dispatch_removed(name);
        }
        Some(element.value)
    }

    // ── Freeze / thaw ───────────────────────────────────────────────────

    /// Replace the value of `name` with a frozen snapshot of it.
    ///
    /// A value identical to the inherited default freezes with a `DEFAULT`
    /// former side, so thawing reverts to whatever the default is then.
    pub fn freeze_value(&self, name: &str) -> SaveableValue {
        let live = self.get_value(name);
        let frozen = match &live {
            Some(value) if self.is_default(name, value) => freeze_default(value.simple_value()),
            other => freeze(other.as_ref()),
        };
        debug!(name, frozen = %frozen.save_string(), "freezing value");
        self.put_value(name, frozen.clone());
        frozen
    }

    /// Restore the former value of a frozen `name`.
    pub fn thaw_value(&self, name: &str) -> Result<Option<SaveableValue>, StoreError> {
        let value = self
            .get_value(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let frozen = value
            .as_frozen()
            .ok_or_else(|| StoreError::NotFrozen(name.to_string()))?;

        let restored = match frozen.thaw_with(&self.factory) {
            Thawed::Value(v) => Some(v.clone()),
            Thawed::Absent => None,
            Thawed::Default => self.default_value(name),
        };
        debug!(name, restored = restored.is_some(), "thawing value");

        match &restored {
            Some(v) => self.put_value(name, v.clone()),
            None => {
                self.remove_value(name);
            }
        }
        Ok(restored)
    }

    // ── Listeners ───────────────────────────────────────────────────────

    /// Register `listener` for names under `prefix`, then tell it about the
    /// names that already exist there.
    ///
    /// Registration happens before the replay, so no name is ever missed. A
    /// name added by another thread between the two steps may be reported
    /// twice; listeners must treat `data_added` as idempotent.
    pub fn add_repository_listener(&self, listener: ListenerRef, prefix: &str) {
        self.listeners.add_listener(Arc::clone(&listener), prefix);
        self.listeners.debug_dump();
        let existing: Vec<String> = self
            .names_with_prefix(prefix)
            .into_iter()
            .filter(|n| !self.is_anonymous(n))
            .collect();
        if !existing.is_empty() {
            listener.data_added_batch(&existing);
        }
    }

    pub fn remove_repository_listener(&self, listener: &ListenerRef) -> usize {
        self.listeners.remove_listener(listener)
    }

    pub fn listeners(&self) -> &PrefixHierarchy {
        &self.listeners
    }

    // ── Defaults ────────────────────────────────────────────────────────

    /// Load relative `name=value` definitions inherited by every datafile.
    pub fn add_global_definitions(&self, reader: impl BufRead) -> Result<usize, StoreError> {
        let entries = datafile::read_entries(reader, Path::new("<global definitions>"))?;
        let count = entries.len();
        let mut defaults = self.defaults.write();
        for entry in entries {
            defaults.insert(entry.name.clone(), entry.stored_text());
        }
        Ok(count)
    }

    fn default_text(&self, name: &str) -> Option<String> {
        let df = self.guess_datafile(name)?;
        let relative = df.relative(name)?;
        self.defaults.read().get(relative).cloned()
    }

    fn default_value(&self, name: &str) -> Option<SaveableValue> {
        let text = self.default_text(name)?;
        let (value, editable) = split_read_only(&text);
        self.factory
            .parse_lenient(value)
            .map(|v| v.with_editable(editable))
    }

    fn is_default(&self, name: &str, value: &SaveableValue) -> bool {
        self.default_text(name)
            .is_some_and(|d| d == stored_text(&value.save_string(), value.is_editable()))
    }

    // ── Datafiles ───────────────────────────────────────────────────────

    /// Load `path` under `prefix`. Inherited defaults are applied first and
    /// the file's own entries override them. Malformed entries are kept as
    /// [`SimpleValue::Malformed`] so saving writes their text back unchanged.
    pub fn open_datafile(&self, prefix: &str, path: &Path) -> Result<Arc<Datafile>, StoreError> {
        let file = std::fs::File::open(path)?;
        let read_only = file.metadata()?.permissions().readonly();
        let entries = datafile::read_entries(std::io::BufReader::new(file), path)?;

        let df = Arc::new(Datafile::new(prefix, path, read_only));
        self.datafiles.lock().push(Arc::clone(&df));

        let defaults: Vec<DatafileEntry> = self
            .defaults
            .read()
            .iter()
            .map(|(name, text)| DatafileEntry::from_stored(name.clone(), text))
            .collect();

        let mut touched = false;
        for entry in defaults.iter().chain(entries.iter()) {
            let name = df.qualify(&entry.name);
            if entry.value.eq_ignore_ascii_case("@now") {
                touched = true;
            }
            let value = match self.factory.parse(&entry.value) {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(err) => {
                    warn!(name = %name, path = %path.display(), error = %err, "keeping malformed datafile value");
                    SaveableValue::Simple(SimpleValue::Malformed(err.into()))
                }
            };
            let value = if read_only || !entry.editable {
                value.with_editable(false)
            } else {
                value
            };
            self.store(&name, value, Some(Arc::clone(&df)), false);
        }
        if touched {
            df.mark_modified(self.config.save_threshold);
        }

        info!(prefix, path = %path.display(), entries = entries.len(), "datafile opened");
        Ok(df)
    }

    /// Write every value owned by `df`, omitting values equal to their
    /// inherited default.
    pub fn save_datafile(&self, df: &Datafile) -> Result<(), StoreError> {
        let defaults = self.defaults.read().clone();
        let entries: Vec<DatafileEntry> = self
            .data
            .iter()
            .filter(|e| {
                e.value()
                    .datafile
                    .as_deref()
                    .is_some_and(|owner| std::ptr::eq(owner, df))
            })
            .filter_map(|e| {
                let relative = df.relative(e.key())?.to_string();
                let value = &e.value().value;
                let entry = DatafileEntry {
                    name: relative,
                    value: value.save_string(),
                    editable: value.is_editable(),
                };
                (defaults.get(&entry.name) != Some(&entry.stored_text())).then_some(entry)
            })
            .collect();

        datafile::write_entries(df.path(), &entries)?;
        df.mark_clean();
        info!(path = %df.path().display(), entries = entries.len(), "datafile saved");
        Ok(())
    }

    /// Save every datafile with unsaved modifications.
    pub fn save_all(&self) -> Result<(), StoreError> {
        let files: Vec<Arc<Datafile>> = self.datafiles.lock().clone();
        for df in files.iter().filter(|df| df.dirty_count() > 0 && !df.is_read_only()) {
            self.save_datafile(df)?;
        }
        Ok(())
    }

    /// The writable datafile with the longest prefix owning `name`.
    fn guess_datafile(&self, name: &str) -> Option<Arc<Datafile>> {
        if name.contains("//") {
            return None;
        }
        self.datafiles
            .lock()
            .iter()
            .filter(|df| !df.is_read_only() && df.relative(name).is_some())
            .max_by_key(|df| df.prefix().len())
            .cloned()
    }

    fn datafile_modified(&self, df: &Arc<Datafile>) {
        if df.is_read_only() || !df.mark_modified(self.config.save_threshold) {
            return;
        }
        if let Err(err) = self.save_datafile(df) {
            warn!(path = %df.path().display(), error = %err, "automatic datafile save failed");
        }
    }
}

impl Default for DataRepository {
    fn default() -> Self {
        Self::new(RepositoryConfig::default())
    }
}
