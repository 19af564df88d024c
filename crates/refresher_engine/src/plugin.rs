use std::fs;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use refresher_core::{Config, MetadataPair};
use refresher_logging::{refresh_debug, refresh_error, refresh_info, refresh_warn};
use serde::Serialize;
use thiserror::Error;

/// Environment variable carrying the catalog path to executable plugins.
pub const LIBRARY_ENV: &str = "FIC_REFRESHER_LIBRARY";

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("unknown plugin {0:?}")]
    Unknown(String),
    #[error("could not scan plugin directory {path}: {source}")]
    Discovery { path: PathBuf, source: io::Error },
    #[error("plugin {name} could not be run: {source}")]
    Io { name: String, source: io::Error },
    #[error("plugin {name} failed: {message}")]
    Hook { name: String, message: String },
    #[error("could not encode hook payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Post-processing extension, built once per run with the active configuration.
pub trait Plugin {
    fn name(&self) -> &str;

    /// Called once after the batch, only when at least one story was updated,
    /// with the (old, new) metadata of every update in processing order.
    fn post_add_hook(&mut self, updates: &[MetadataPair]) -> Result<(), PluginError>;
}

pub type PluginFactory = fn(Arc<Config>) -> Result<Box<dyn Plugin>, PluginError>;

/// Statically linked plugins, looked up by the names listed in configuration.
pub struct PluginRegistry {
    factories: Vec<(&'static str, PluginFactory)>,
}

impl PluginRegistry {
    pub fn empty() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(ChangedFieldsPlugin::NAME, ChangedFieldsPlugin::build);
        registry
    }

    /// Registers `factory` under `name`, replacing an earlier registration.
    pub fn register(&mut self, name: &'static str, factory: PluginFactory) {
        self.factories.retain(|(known, _)| *known != name);
        self.factories.push((name, factory));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|(name, _)| *name).collect()
    }

    pub fn build(&self, name: &str, config: Arc<Config>) -> Result<Box<dyn Plugin>, PluginError> {
        let (_, factory) = self
            .factories
            .iter()
            .find(|(known, _)| *known == name)
            .ok_or_else(|| PluginError::Unknown(name.to_string()))?;
        factory(config)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// The plugins loaded for one run.
#[derive(Default)]
pub struct PluginHost {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the enabled registry plugins, then adds one executable plugin per
    /// program found in the plugin directory. Anything that fails to load is
    /// logged and left out.
    pub fn load(config: Arc<Config>, registry: &PluginRegistry) -> Self {
        let mut host = Self::new();

        for name in &config.plugins.enabled {
            match registry.build(name, config.clone()) {
                Ok(plugin) => host.add(plugin),
                Err(err) => refresh_warn!("Skipping plugin {}: {}", name, err),
            }
        }

        match discover_executables(&config.plugins.directory) {
            Ok(programs) => {
                for program in programs {
                    host.add(Box::new(ExecPlugin::new(program, config.clone())));
                }
            }
            Err(err) => refresh_warn!("{}", err),
        }

        refresh_debug!("Loaded plugins: {:?}", host.names());
        host
    }

    pub fn add(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    /// Invokes every plugin once; returns how many failed.
    ///
    /// Each call is isolated: an error or a panic in one plugin is logged and
    /// the remaining plugins still run.
    pub fn run_post_add_hooks(&mut self, updates: &[MetadataPair]) -> usize {
        let mut failures = 0;
        for plugin in &mut self.plugins {
            let name = plugin.name().to_string();
            refresh_debug!("Running post-add hook of plugin {}", name);
            let result = panic::catch_unwind(AssertUnwindSafe(|| plugin.post_add_hook(updates)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    refresh_error!("Plugin {} hook failed: {}", name, err);
                }
                Err(_) => {
                    failures += 1;
                    refresh_error!("Plugin {} panicked in its hook.", name);
                }
            }
        }
        failures
    }
}

/// Lists runnable programs in `dir`, sorted by file name.
///
/// A missing directory yields nothing. Entries that are not executable files
/// are logged and skipped.
pub fn discover_executables(dir: &Path) -> Result<Vec<PathBuf>, PluginError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PluginError::Discovery {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut programs: Vec<PathBuf> = Vec::new();
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden {
            continue;
        }
        let is_file = entry.file_type().map(|ft| ft.is_file()).unwrap_or(false);
        if is_file && is_executable(&path) {
            programs.push(path);
        } else {
            refresh_warn!("{:?} is not an executable plugin, skipping.", path);
        }
    }
    programs.sort();
    Ok(programs)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref(),
        Some("exe" | "bat" | "cmd")
    )
}

#[derive(Serialize)]
struct HookPayload<'a> {
    updates: &'a [MetadataPair],
}

/// External program fed the batch's metadata pairs as JSON on stdin.
pub struct ExecPlugin {
    name: String,
    program: PathBuf,
    config: Arc<Config>,
}

impl ExecPlugin {
    pub fn new(program: PathBuf, config: Arc<Config>) -> Self {
        let name = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string());
        Self {
            name,
            program,
            config,
        }
    }

    fn io_error(&self, source: io::Error) -> PluginError {
        PluginError::Io {
            name: self.name.clone(),
            source,
        }
    }
}

impl Plugin for ExecPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn post_add_hook(&mut self, updates: &[MetadataPair]) -> Result<(), PluginError> {
        let payload = serde_json::to_vec(&HookPayload { updates })?;

        let mut child = Command::new(&self.program)
            .env(LIBRARY_ENV, &self.config.general.library_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| self.io_error(err))?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&payload) {
                Ok(()) => {}
                // The program may exit without reading its input.
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {}
                Err(err) => return Err(self.io_error(err)),
            }
        }

        let output = child.wait_with_output().map_err(|err| self.io_error(err))?;
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            refresh_info!("[{}] {}", self.name, line);
        }
        if !output.status.success() {
            return Err(PluginError::Hook {
                name: self.name.clone(),
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

/// Logs which metadata fields each update changed.
pub struct ChangedFieldsPlugin {
    config: Arc<Config>,
}

impl ChangedFieldsPlugin {
    pub const NAME: &'static str = "changed-fields";

    fn build(config: Arc<Config>) -> Result<Box<dyn Plugin>, PluginError> {
        Ok(Box::new(Self { config }))
    }
}

impl Plugin for ChangedFieldsPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn post_add_hook(&mut self, updates: &[MetadataPair]) -> Result<(), PluginError> {
        for pair in updates {
            let changed = pair.changed_fields();
            if changed.is_empty() {
                refresh_info!("{}: no metadata changes.", pair.new.label());
                continue;
            }
            refresh_info!("{}: changed {}", pair.new.label(), changed.join(", "));
            if self.config.general.verbose {
                for field in &changed {
                    refresh_debug!(
                        "  {}: {:?} -> {:?}",
                        field,
                        pair.old.get(field),
                        pair.new.get(field)
                    );
                }
            }
        }
        Ok(())
    }
}
