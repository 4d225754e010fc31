//! Registry state, lookups and execution.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use arc_swap::ArcSwap;
use minijinja::Value;
use serde::Serialize;
use tokio::runtime::Handle;

use crate::config::watcher::{modified_at, MtimeWatch};
use crate::config::{load_hosts, HostEntry, RegistryConfig};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::registry::reconciler::{Reconciler, ReconcilerState};
use crate::registry::RegistryError;
use crate::resilience::{retry_transient, RetryError};
use crate::sandbox::SandboxedFs;
use crate::templates::{BuildError, Extensions, TemplateRoot};

/// Default bound on render attempts when blobs keep being evicted.
pub const MAX_RENDER_ATTEMPTS: u32 = 10;

/// Tunables for a [`Registry`].
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Time between reconciler ticks.
    pub poll_interval: Duration,
    /// Render attempts before giving up on evicted blobs.
    pub max_render_attempts: u32,
    /// Functions bound into every Template Root.
    pub extensions: Extensions,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_render_attempts: MAX_RENDER_ATTEMPTS,
            extensions: Extensions::default(),
        }
    }
}

impl RegistryOptions {
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            max_render_attempts: config.max_render_attempts,
            ..Self::default()
        }
    }

    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }
}

/// Point-in-time view of the registry. Published whole, never edited.
#[derive(Debug)]
pub struct RegistryState {
    entries: Arc<[HostEntry]>,
    roots: HashMap<PathBuf, Arc<TemplateRoot>>,
}

impl Default for RegistryState {
    fn default() -> Self {
        Self {
            entries: Arc::from(Vec::new()),
            roots: HashMap::new(),
        }
    }
}

impl RegistryState {
    pub fn entries(&self) -> &[HostEntry] {
        &self.entries
    }

    pub fn roots(&self) -> &HashMap<PathBuf, Arc<TemplateRoot>> {
        &self.roots
    }

    /// First entry serving `host`, in file order.
    pub fn entry_for(&self, host: &str) -> Option<&HostEntry> {
        self.entries.iter().find(|entry| entry.matches(host))
    }

    pub fn root(&self, folder: &Path) -> Option<&Arc<TemplateRoot>> {
        self.roots.get(folder)
    }
}

pub(crate) struct Shared {
    pub(crate) options: RegistryOptions,
    state: ArcSwap<RegistryState>,
    swap_lock: Mutex<()>,
    pub(crate) config_watch: Mutex<MtimeWatch>,
    pub(crate) shutdown: Shutdown,
    pub(crate) reconciler_running: AtomicBool,
}

/// Handle to the template registry. Cheap to clone.
#[derive(Clone)]
pub struct Registry {
    pub(crate) shared: Arc<Shared>,
}

/// Compile one folder, stamped with its marker's mtime as read before compiling.
///
/// A marker touched while the build runs is newer than the stamp, so the
/// next tick rebuilds again. An unreadable marker leaves the build time.
pub(crate) fn compile_root(folder: &Path, modifier: &str, extensions: &Extensions) -> Result<TemplateRoot, BuildError> {
    let marker_time = modified_at(&folder.join(modifier)).ok();
    let root = TemplateRoot::build(folder, modifier, extensions)?;
    Ok(match marker_time {
        Some(seen) => root.stamped(seen),
        None => root,
    })
}

/// Build one root per distinct folder. Folders that fail are left out.
pub(crate) fn build_roots(entries: &[HostEntry], extensions: &Extensions) -> HashMap<PathBuf, Arc<TemplateRoot>> {
    let mut roots = HashMap::new();
    for entry in entries {
        if roots.contains_key(&entry.folder) {
            continue;
        }
        match compile_root(&entry.folder, &entry.modifier, extensions) {
            Ok(root) => {
                roots.insert(entry.folder.clone(), Arc::new(root));
            }
            Err(e) => {
                tracing::error!(
                    folder = %entry.folder.display(),
                    error = %e,
                    "Could not load templates"
                );
            }
        }
    }
    roots
}

impl Registry {
    /// Load the hosts file and compile every folder, without a background task.
    pub fn open(hosts_file: impl AsRef<Path>, options: RegistryOptions) -> Result<Self, RegistryError> {
        let path = hosts_file.as_ref();
        let watch = MtimeWatch::new(path);
        let entries = load_hosts(path)?;
        let roots = build_roots(&entries, &options.extensions);

        tracing::info!(
            path = %path.display(),
            hosts = entries.len(),
            roots = roots.len(),
            "Template registry loaded"
        );
        metrics::record_roots(roots.len());

        let state = RegistryState {
            entries: entries.into(),
            roots,
        };
        Ok(Self {
            shared: Arc::new(Shared {
                options,
                state: ArcSwap::from_pointee(state),
                swap_lock: Mutex::new(()),
                config_watch: Mutex::new(watch),
                shutdown: Shutdown::new(),
                reconciler_running: AtomicBool::new(false),
            }),
        })
    }

    /// [`Registry::open`] plus a background reconciler on the current Tokio runtime.
    ///
    /// Fails with [`RegistryError::NoRuntime`] when called outside a runtime.
    pub fn start(hosts_file: impl AsRef<Path>, options: RegistryOptions) -> Result<Self, RegistryError> {
        let runtime = Handle::try_current().map_err(|_| RegistryError::NoRuntime)?;
        let registry = Self::open(hosts_file, options)?;
        registry.spawn_reconciler(&runtime);
        Ok(registry)
    }

    fn spawn_reconciler(&self, runtime: &Handle) {
        let shutdown = self.shared.shutdown.subscribe();
        self.shared.reconciler_running.store(true, Ordering::SeqCst);
        let reconciler = Reconciler::new(self.clone(), self.shared.options.poll_interval);
        runtime.spawn(reconciler.run(shutdown));
    }

    /// Stop the reconciler and drop every installed root. Idempotent.
    ///
    /// Renders already in progress finish against the roots they hold.
    pub fn shutdown(&self) {
        if !self.shared.shutdown.trigger() {
            return;
        }
        let previous = {
            let _guard = self.lock_swaps();
            self.shared.state.swap(Arc::new(RegistryState::default()))
        };
        tracing::info!(roots = previous.roots.len(), "Template registry shut down");
        metrics::record_roots(0);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_triggered()
    }

    pub fn reconciler_state(&self) -> ReconcilerState {
        if self.shared.reconciler_running.load(Ordering::SeqCst) {
            ReconcilerState::Running
        } else {
            ReconcilerState::Stopped
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<RegistryState> {
        self.shared.state.load_full()
    }

    pub fn template_root(&self, folder: &Path) -> Option<Arc<TemplateRoot>> {
        self.shared.state.load().root(folder).cloned()
    }

    /// Folder of the first entry matching `host` exactly or via `"default"`.
    pub fn resolve_folder(&self, host: &str) -> Result<PathBuf, RegistryError> {
        self.shared
            .state
            .load()
            .entry_for(host)
            .map(|entry| entry.folder.clone())
            .ok_or_else(|| RegistryError::NoHostConfigured {
                host: host.to_string(),
            })
    }

    /// Path of `name` inside the folder serving `host`, under sandbox rules.
    pub fn resolve_path(&self, host: &str, name: &str) -> Result<PathBuf, RegistryError> {
        let folder = self.resolve_folder(host)?;
        Ok(SandboxedFs::new(folder).resolve(name)?)
    }

    /// Render `template` for `host` and write it to `out` in one piece.
    ///
    /// Nothing is written unless the render succeeds.
    pub fn execute<W, T>(&self, out: &mut W, host: &str, template: &str, data: &T) -> Result<(), RegistryError>
    where
        W: Write + ?Sized,
        T: Serialize + ?Sized,
    {
        let rendered = self.render_to_string(host, template, data)?;
        out.write_all(rendered.as_bytes()).map_err(RegistryError::Write)
    }

    /// Render `template` for `host`, retrying while blobs are evicted mid-render.
    pub fn render_to_string<T>(&self, host: &str, template: &str, data: &T) -> Result<String, RegistryError>
    where
        T: Serialize + ?Sized,
    {
        if self.is_shut_down() {
            return Err(RegistryError::ShutDown);
        }
        let start = Instant::now();

        // a configuration miss is static; it is never retried
        let folder = self.resolve_folder(host)?;
        let data = Value::from_serialize(data);

        let result = retry_transient(
            self.shared.options.max_render_attempts,
            |attempt| {
                if attempt > 1 {
                    metrics::record_evicted_retry();
                    tracing::debug!(host = %host, template = %template, attempt, "Blob evicted, rendering again");
                }
                let root = self
                    .template_root(&folder)
                    .ok_or_else(|| RegistryError::NoTemplatesForHost {
                        host: host.to_string(),
                    })?;
                root.render(template, &data).map_err(|source| RegistryError::Render {
                    template: template.to_string(),
                    source,
                })
            },
            RegistryError::is_evicted,
        );

        match result {
            Ok(rendered) => {
                metrics::record_render("ok", start);
                Ok(rendered)
            }
            Err(RetryError::Permanent(err)) => {
                metrics::record_render("error", start);
                Err(err)
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                tracing::warn!(
                    host = %host,
                    template = %template,
                    attempts,
                    error = %last,
                    "Giving up after repeated blob evictions"
                );
                metrics::record_render("exhausted", start);
                Err(RegistryError::RetryExhausted {
                    template: template.to_string(),
                    attempts,
                })
            }
        }
    }

    fn lock_swaps(&self) -> MutexGuard<'_, ()> {
        // the guarded value is (), so a poisoned lock carries no broken state
        self.shared.swap_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish new entries and roots together. Returns the replaced snapshot.
    pub(crate) fn install_all(
        &self,
        entries: Vec<HostEntry>,
        roots: HashMap<PathBuf, Arc<TemplateRoot>>,
    ) -> Option<Arc<RegistryState>> {
        let count = roots.len();
        let previous = {
            let _guard = self.lock_swaps();
            if self.is_shut_down() {
                return None;
            }
            self.shared.state.swap(Arc::new(RegistryState {
                entries: entries.into(),
                roots,
            }))
        };
        metrics::record_roots(count);
        Some(previous)
    }

    /// Replace `expected` with `replacement` if it is still the installed root
    /// for its folder. Returns the displaced root.
    pub(crate) fn install_root(
        &self,
        expected: &Arc<TemplateRoot>,
        replacement: Arc<TemplateRoot>,
    ) -> Option<Arc<TemplateRoot>> {
        let _guard = self.lock_swaps();
        if self.is_shut_down() {
            return None;
        }
        let current = self.shared.state.load_full();
        let folder = expected.folder();
        match current.roots.get(folder) {
            Some(installed) if Arc::ptr_eq(installed, expected) => {
                let mut roots = current.roots.clone();
                let previous = roots.insert(folder.to_path_buf(), replacement);
                self.shared.state.store(Arc::new(RegistryState {
                    entries: current.entries.clone(),
                    roots,
                }));
                previous
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.load();
        f.debug_struct("Registry")
            .field("hosts", &state.entries.len())
            .field("roots", &state.roots.len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{BlobError, BlobStore};
    use crate::templates::TEMPLATE_DIR;
    use serde_json::json;
    use std::fs;
    use std::sync::atomic::AtomicU32;
    use std::time::SystemTime;

    struct Site {
        dir: tempfile::TempDir,
    }

    impl Site {
        fn new() -> Self {
            Self { dir: tempfile::tempdir().unwrap() }
        }

        fn folder(&self, name: &str, templates: &[(&str, &str)]) -> PathBuf {
            let folder = self.dir.path().join(name);
            fs::create_dir_all(folder.join(TEMPLATE_DIR)).unwrap();
            for (file, body) in templates {
                fs::write(folder.join(TEMPLATE_DIR).join(file), body).unwrap();
            }
            fs::write(folder.join("modified"), "").unwrap();
            folder
        }

        fn hosts(&self, entries: &[(&str, &Path)]) -> PathBuf {
            let list: Vec<_> = entries
                .iter()
                .map(|(host, folder)| json!({"host": host, "folder": folder, "modifier": "modified"}))
                .collect();
            let path = self.dir.path().join("hosts.json");
            fs::write(&path, serde_json::to_vec(&list).unwrap()).unwrap();
            path
        }
    }

    /// Counts reads and reports every key as evicted.
    #[derive(Default)]
    struct AlwaysEvicted {
        reads: AtomicU32,
    }

    impl BlobStore for AlwaysEvicted {
        fn get(&self, key: &str) -> Result<Arc<[u8]>, BlobError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Err(BlobError::Evicted { key: key.to_string() })
        }
    }

    /// Evicted for the first `flaky` reads, then serves the key itself.
    struct EvictedThenOk {
        flaky: u32,
        reads: AtomicU32,
    }

    impl BlobStore for EvictedThenOk {
        fn get(&self, key: &str) -> Result<Arc<[u8]>, BlobError> {
            if self.reads.fetch_add(1, Ordering::SeqCst) < self.flaky {
                Err(BlobError::Evicted { key: key.to_string() })
            } else {
                Ok(Arc::from(key.as_bytes()))
            }
        }
    }

    #[test]
    fn test_resolve_folder_with_wildcard() {
        let site = Site::new();
        let fa = site.folder("fa", &[("index.html", "a")]);
        let fd = site.folder("fd", &[("index.html", "d")]);
        let hosts = site.hosts(&[("a", &fa), ("default", &fd)]);
        let registry = Registry::open(&hosts, RegistryOptions::default()).unwrap();

        assert_eq!(registry.resolve_folder("a").unwrap(), fa);
        assert_eq!(registry.resolve_folder("anything-else").unwrap(), fd);
    }

    #[test]
    fn test_resolve_folder_without_match() {
        let site = Site::new();
        let fa = site.folder("fa", &[("index.html", "a")]);
        let hosts = site.hosts(&[("a", &fa)]);
        let registry = Registry::open(&hosts, RegistryOptions::default()).unwrap();

        assert!(matches!(
            registry.resolve_folder("b"),
            Err(RegistryError::NoHostConfigured { .. })
        ));
    }

    #[test]
    fn test_first_match_wins() {
        let site = Site::new();
        let fd = site.folder("fd", &[("index.html", "d")]);
        let fa = site.folder("fa", &[("index.html", "a")]);
        let hosts = site.hosts(&[("default", &fd), ("a", &fa)]);
        let registry = Registry::open(&hosts, RegistryOptions::default()).unwrap();

        assert_eq!(registry.resolve_folder("a").unwrap(), fd);
    }

    #[test]
    fn test_execute_writes_rendered_output() {
        let site = Site::new();
        let fa = site.folder("fa", &[("index.html", "Hello {{ name }} from {{ File('modified') }}!")]);
        let hosts = site.hosts(&[("a", &fa)]);
        let registry = Registry::open(&hosts, RegistryOptions::default()).unwrap();

        let mut out = Vec::new();
        registry.execute(&mut out, "a", "index.html", &json!({"name": "Ada"})).unwrap();
        assert_eq!(out, b"Hello Ada from !");
    }

    #[test]
    fn test_failed_render_writes_nothing() {
        let site = Site::new();
        let fa = site.folder("fa", &[("index.html", "partial {{ File('../escape') }}")]);
        let hosts = site.hosts(&[("a", &fa)]);
        let registry = Registry::open(&hosts, RegistryOptions::default()).unwrap();

        let mut out = Vec::new();
        let err = registry.execute(&mut out, "a", "index.html", &json!({})).unwrap_err();
        assert!(matches!(err, RegistryError::Render { .. }));
        assert!(out.is_empty());
    }

    #[test]
    fn test_missing_template() {
        let site = Site::new();
        let fa = site.folder("fa", &[("index.html", "a")]);
        let hosts = site.hosts(&[("a", &fa)]);
        let registry = Registry::open(&hosts, RegistryOptions::default()).unwrap();

        let err = registry.render_to_string("a", "nope.html", &json!({})).unwrap_err();
        assert!(err.is_template_missing());
    }

    #[test]
    fn test_folder_without_templates_is_a_lookup_miss() {
        let site = Site::new();
        let empty = site.folder("empty", &[]);
        let hosts = site.hosts(&[("a", &empty)]);
        let registry = Registry::open(&hosts, RegistryOptions::default()).unwrap();

        assert!(registry.snapshot().roots().is_empty());
        assert!(matches!(
            registry.render_to_string("a", "index.html", &json!({})),
            Err(RegistryError::NoTemplatesForHost { .. })
        ));
    }

    #[test]
    fn test_retry_bound_is_exact() {
        let site = Site::new();
        let fa = site.folder("fa", &[("index.html", "{{ blob('k') }}")]);
        let hosts = site.hosts(&[("a", &fa)]);
        let store = Arc::new(AlwaysEvicted::default());
        let options = RegistryOptions::default()
            .with_extensions(Extensions::new().with_blob_store(store.clone()));
        let registry = Registry::open(&hosts, options).unwrap();

        let mut out = Vec::new();
        let err = registry.execute(&mut out, "a", "index.html", &json!({})).unwrap_err();
        assert!(matches!(err, RegistryError::RetryExhausted { attempts: 10, .. }));
        assert_eq!(store.reads.load(Ordering::SeqCst), 10);
        assert!(out.is_empty());
    }

    #[test]
    fn test_transient_eviction_recovers() {
        let site = Site::new();
        let fa = site.folder("fa", &[("index.html", "[{{ blob('payload') }}]")]);
        let hosts = site.hosts(&[("a", &fa)]);
        let store = Arc::new(EvictedThenOk { flaky: 3, reads: AtomicU32::new(0) });
        let options = RegistryOptions::default()
            .with_extensions(Extensions::new().with_blob_store(store.clone()));
        let registry = Registry::open(&hosts, options).unwrap();

        assert_eq!(registry.render_to_string("a", "index.html", &json!({})).unwrap(), "[payload]");
        assert_eq!(store.reads.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_resolve_path_is_sandboxed() {
        let site = Site::new();
        let fa = site.folder("fa", &[("index.html", "a")]);
        let hosts = site.hosts(&[("default", &fa)]);
        let registry = Registry::open(&hosts, RegistryOptions::default()).unwrap();

        assert_eq!(registry.resolve_path("x", "static/a.css").unwrap(), fa.join("static/a.css"));
        assert!(matches!(
            registry.resolve_path("x", "../hosts.json"),
            Err(RegistryError::Sandbox(_))
        ));
    }

    #[test]
    fn test_shutdown_is_idempotent_and_final() {
        let site = Site::new();
        let fa = site.folder("fa", &[("index.html", "a")]);
        let hosts = site.hosts(&[("a", &fa)]);
        let registry = Registry::open(&hosts, RegistryOptions::default()).unwrap();
        let held = registry.template_root(&fa).unwrap();

        registry.shutdown();
        registry.shutdown();

        assert!(registry.is_shut_down());
        assert!(registry.snapshot().roots().is_empty());
        assert!(matches!(
            registry.render_to_string("a", "index.html", &json!({})),
            Err(RegistryError::ShutDown)
        ));
        // a root held elsewhere stays usable
        assert_eq!(held.render("index.html", &minijinja::context! {}).unwrap(), "a");
    }

    #[test]
    fn test_start_outside_runtime_is_an_error() {
        let site = Site::new();
        let fa = site.folder("fa", &[("index.html", "a")]);
        let hosts = site.hosts(&[("a", &fa)]);

        let err = Registry::start(&hosts, RegistryOptions::default()).unwrap_err();
        assert!(matches!(err, RegistryError::NoRuntime));
    }

    fn set_mtime(path: &Path, when: SystemTime) {
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(when)
            .unwrap();
    }

    #[test]
    fn test_marker_touched_during_build_is_rebuilt() {
        let site = Site::new();
        let fa = site.folder("fa", &[("index.html", "first")]);
        let marker = fa.join("modified");
        let read_at = SystemTime::now() - Duration::from_secs(60);
        set_mtime(&marker, read_at);

        let hosts = site.hosts(&[("a", &fa)]);
        let registry = Registry::open(&hosts, RegistryOptions::default()).unwrap();
        let root = registry.template_root(&fa).unwrap();
        assert_eq!(root.last_seen(), modified_at(&marker).unwrap());

        // an edit dated after the marker was read but before the build ended
        fs::write(fa.join(TEMPLATE_DIR).join("index.html"), "second").unwrap();
        set_mtime(&marker, read_at + Duration::from_secs(30));

        let report = registry.reconcile();
        assert_eq!(report.rebuilt, vec![fa.clone()]);
        assert_eq!(
            registry.render_to_string("a", "index.html", &json!({})).unwrap(),
            "second"
        );
        assert!(!registry.reconcile().changed());
    }
}
