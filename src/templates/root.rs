//! Compiled template set bound to one folder.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use minijinja::{AutoEscape, Environment, Value};

use crate::blob::BlobSubscription;
use crate::templates::{BuildError, Extensions};

/// Directory inside a folder that holds template sources.
pub const TEMPLATE_DIR: &str = "templates";

/// One immutable compiled template set.
///
/// Shared as `Arc<TemplateRoot>`; the blob subscription it holds is
/// released when the last reference (map entry or in-flight render) drops.
#[derive(Debug)]
pub struct TemplateRoot {
    folder: PathBuf,
    modifier: String,
    env: Environment<'static>,
    names: Vec<String>,
    last_seen: SystemTime,
    _subscription: Option<BlobSubscription>,
}

/// Sources matching `templates/*.*`, minus dot-prefixed names, sorted by name.
pub fn template_sources(folder: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let dir = folder.join(TEMPLATE_DIR);
    let io_err = |source| BuildError::Io {
        path: dir.clone(),
        source,
    };

    let mut sources = Vec::new();
    for entry in fs::read_dir(&dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        // editor swap files and other hidden files never become templates
        if name.starts_with('.') || !name.contains('.') {
            continue;
        }
        if entry.file_type().map_err(io_err)?.is_file() {
            sources.push(entry.path());
        }
    }

    sources.sort();
    Ok(sources)
}

impl TemplateRoot {
    /// Compile every source under `folder/templates` into one set.
    ///
    /// Extension functions are bound before any source is added. Nothing
    /// partially compiled is ever returned.
    pub fn build(folder: &Path, modifier: &str, extensions: &Extensions) -> Result<Self, BuildError> {
        let sources = template_sources(folder)?;
        if sources.is_empty() {
            return Err(BuildError::NoTemplatesFound {
                pattern: folder.join(TEMPLATE_DIR).join("*.*"),
            });
        }

        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        let subscription = extensions.install(&mut env, folder);

        let mut names = Vec::with_capacity(sources.len());
        for path in sources {
            let source = fs::read_to_string(&path).map_err(|source| BuildError::Io {
                path: path.clone(),
                source,
            })?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            env.add_template_owned(name.clone(), source)
                .map_err(|source| BuildError::Compile { path, source })?;
            names.push(name);
        }

        tracing::debug!(
            folder = %folder.display(),
            templates = names.len(),
            "Template root compiled"
        );

        Ok(Self {
            folder: folder.to_path_buf(),
            modifier: modifier.to_string(),
            env,
            names,
            last_seen: SystemTime::now(),
            _subscription: subscription,
        })
    }

    /// Replace the build time with the marker time the build corresponds to.
    pub fn stamped(mut self, seen: SystemTime) -> Self {
        self.last_seen = seen;
        self
    }

    /// Render `name` into a fresh string.
    pub fn render(&self, name: &str, data: &Value) -> Result<String, minijinja::Error> {
        self.env.get_template(name)?.render(data)
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn modifier(&self) -> &str {
        &self.modifier
    }

    pub fn marker_path(&self) -> PathBuf {
        self.folder.join(&self.modifier)
    }

    pub fn last_seen(&self) -> SystemTime {
        self.last_seen
    }

    pub fn template_names(&self) -> &[String] {
        &self.names
    }
}
