//! # Configuration
//!
//! [`CrashConfig`] collects everything the handler needs before it is
//! initialized. It can be built in code or read from the environment.
//!
//! ## Environment Variables
//!
//! - `CRASHSCOPE_SYMBOL_PATH`: extra directory searched for debug files
//! - `CRASHSCOPE_SYMBOL_CACHE`: per-user symbol cache directory
//!   (default: `$XDG_CACHE_HOME/crashscope/symbols` or `~/.cache/crashscope/symbols`)
//! - `CRASHSCOPE_SYMBOL_SERVER`: remote symbol server URL (empty disables it)
//! - `CRASHSCOPE_PRESENTER`: `tui` (default) or `stderr`
//! - `CRASHSCOPE_AUX_MODULES`: comma separated module names parsed eagerly
//! - `CRASHSCOPE_MAX_FRAMES`: frame limit for the stack walker
//!
//! ## Example
//!
//! ```rust
//! use crashscope_core::config::{CrashConfig, PresenterKind};
//!
//! let config = CrashConfig::new()
//!     .with_search_base("/opt/game/symbols")
//!     .with_presenter(PresenterKind::Stderr)
//!     .with_auxiliary_module("libmono.so");
//! assert_eq!(config.auxiliary_modules, vec!["libmono.so".to_string()]);
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::warn;

use crate::unwind::MAX_FRAMES;

/// Default remote symbol server
pub const DEFAULT_SYMBOL_SERVER: &str = "https://debuginfod.elfutils.org/";

/// Which presenter the handler shows reports with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresenterKind
{
    /// Interactive terminal dialog
    #[default]
    Tui,
    /// Plain text on standard error
    Stderr,
}

impl FromStr for PresenterKind
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "tui" | "dialog" => Ok(PresenterKind::Tui),
            "stderr" | "text" | "plain" => Ok(PresenterKind::Stderr),
            _ => Err(format!("Unknown presenter: {s}. Use 'tui' or 'stderr'")),
        }
    }
}

/// Handler configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashConfig
{
    /// Caller-supplied directory added to the symbol search path
    pub search_base: Option<PathBuf>,
    /// Per-user symbol cache
    pub cache_dir: Option<PathBuf>,
    /// Remote symbol server, recorded in the search path
    pub symbol_server: Option<String>,
    pub presenter: PresenterKind,
    /// Module names whose symbols are loaded whenever the search path changes
    pub auxiliary_modules: Vec<String>,
    /// Frame limit for the stack walker
    pub max_frames: usize,
    /// Stored flag, queryable through the handler
    pub full_diagnostic_capture: bool,
    /// Stored flag, queryable through the handler
    pub automatic_reporting: bool,
}

impl Default for CrashConfig
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl CrashConfig
{
    pub fn new() -> Self
    {
        Self {
            search_base: None,
            cache_dir: default_cache_dir(),
            symbol_server: Some(DEFAULT_SYMBOL_SERVER.to_string()),
            presenter: PresenterKind::Tui,
            auxiliary_modules: Vec::new(),
            max_frames: MAX_FRAMES,
            full_diagnostic_capture: true,
            automatic_reporting: false,
        }
    }

    /// Configuration from `CRASHSCOPE_*` environment variables
    ///
    /// Unparsable values are logged and replaced by their defaults.
    pub fn from_env() -> Self
    {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self
    {
        let mut config = Self::new();

        if let Some(base) = lookup("CRASHSCOPE_SYMBOL_PATH").filter(|v| !v.is_empty()) {
            config.search_base = Some(PathBuf::from(base));
        }
        if let Some(cache) = lookup("CRASHSCOPE_SYMBOL_CACHE").filter(|v| !v.is_empty()) {
            config.cache_dir = Some(PathBuf::from(cache));
        }
        if let Some(server) = lookup("CRASHSCOPE_SYMBOL_SERVER") {
            config.symbol_server = (!server.is_empty()).then_some(server);
        }
        if let Some(presenter) = lookup("CRASHSCOPE_PRESENTER") {
            match presenter.parse() {
                Ok(kind) => config.presenter = kind,
                Err(err) => warn!("{err}"),
            }
        }
        if let Some(modules) = lookup("CRASHSCOPE_AUX_MODULES") {
            config.auxiliary_modules = modules
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(frames) = lookup("CRASHSCOPE_MAX_FRAMES") {
            match frames.trim().parse::<usize>() {
                Ok(n) => config.max_frames = n.clamp(1, MAX_FRAMES),
                Err(err) => warn!(value = %frames, "ignoring CRASHSCOPE_MAX_FRAMES: {err}"),
            }
        }

        config
    }

    #[must_use]
    pub fn with_search_base(mut self, dir: impl AsRef<Path>) -> Self
    {
        self.search_base = Some(dir.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl AsRef<Path>) -> Self
    {
        self.cache_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set or clear the remote symbol server
    #[must_use]
    pub fn with_symbol_server(mut self, url: Option<&str>) -> Self
    {
        self.symbol_server = url.filter(|url| !url.is_empty()).map(str::to_string);
        self
    }

    #[must_use]
    pub fn with_presenter(mut self, presenter: PresenterKind) -> Self
    {
        self.presenter = presenter;
        self
    }

    #[must_use]
    pub fn with_auxiliary_module(mut self, name: impl Into<String>) -> Self
    {
        self.auxiliary_modules.push(name.into());
        self
    }

    #[must_use]
    pub fn with_max_frames(mut self, max_frames: usize) -> Self
    {
        self.max_frames = max_frames.clamp(1, MAX_FRAMES);
        self
    }
}

/// `$XDG_CACHE_HOME/crashscope/symbols`, then `~/.cache/crashscope/symbols`,
/// then the temp directory.
fn default_cache_dir() -> Option<PathBuf>
{
    let base = env::var_os("XDG_CACHE_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").filter(|v| !v.is_empty()).map(|home| PathBuf::from(home).join(".cache")))
        .unwrap_or_else(env::temp_dir);
    Some(base.join("crashscope").join("symbols"))
}

#[cfg(test)]
mod tests
{
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String>
    {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults()
    {
        let config = CrashConfig::from_lookup(lookup(&[]));
        assert_eq!(config.presenter, PresenterKind::Tui);
        assert_eq!(config.symbol_server.as_deref(), Some(DEFAULT_SYMBOL_SERVER));
        assert!(config.cache_dir.unwrap().ends_with("crashscope/symbols"));
        assert!(config.full_diagnostic_capture);
        assert!(!config.automatic_reporting);
        assert_eq!(config.max_frames, MAX_FRAMES);
    }

    #[test]
    fn test_env_overrides()
    {
        let config = CrashConfig::from_lookup(lookup(&[
            ("CRASHSCOPE_SYMBOL_PATH", "/opt/syms"),
            ("CRASHSCOPE_SYMBOL_CACHE", "/var/cache/syms"),
            ("CRASHSCOPE_SYMBOL_SERVER", ""),
            ("CRASHSCOPE_PRESENTER", "STDERR"),
            ("CRASHSCOPE_AUX_MODULES", "libmono.so, libil2cpp.so,,"),
            ("CRASHSCOPE_MAX_FRAMES", "64"),
        ]));
        assert_eq!(config.search_base, Some(PathBuf::from("/opt/syms")));
        assert_eq!(config.cache_dir, Some(PathBuf::from("/var/cache/syms")));
        assert_eq!(config.symbol_server, None);
        assert_eq!(config.presenter, PresenterKind::Stderr);
        assert_eq!(config.auxiliary_modules, vec!["libmono.so", "libil2cpp.so"]);
        assert_eq!(config.max_frames, 64);
    }

    #[test]
    fn test_invalid_values_keep_defaults()
    {
        let config = CrashConfig::from_lookup(lookup(&[
            ("CRASHSCOPE_PRESENTER", "hologram"),
            ("CRASHSCOPE_MAX_FRAMES", "lots"),
        ]));
        assert_eq!(config.presenter, PresenterKind::Tui);
        assert_eq!(config.max_frames, MAX_FRAMES);
    }

    #[test]
    fn test_max_frames_is_clamped()
    {
        assert_eq!(CrashConfig::new().with_max_frames(0).max_frames, 1);
        assert_eq!(CrashConfig::new().with_max_frames(usize::MAX).max_frames, MAX_FRAMES);
    }
}
