//! # Symbol Search Path
//!
//! Ordered list of places the native engine looks for debug information:
//!
//! 1. the directory of the main executable
//! 2. caller-supplied directories, in the order they were added
//! 3. the per-user symbol cache
//! 4. a remote symbol server (recorded, never contacted from the fault path)
//!
//! The rendered form joins the entries with `;`, servers are written as
//! `srv*<url>`.

use std::fmt;
use std::path::{Path, PathBuf};

use smallvec::SmallVec;
use tracing::trace;

/// One entry of the search path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchLocation
{
    /// Local directory searched for separate debug files
    Directory(PathBuf),
    /// Remote symbol server
    Server(String),
}

impl fmt::Display for SearchLocation
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            SearchLocation::Directory(path) => write!(f, "{}", path.display()),
            SearchLocation::Server(url) => write!(f, "srv*{url}"),
        }
    }
}

/// Ordered symbol search locations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolSearchPath
{
    module_dir: Option<PathBuf>,
    user_dirs: SmallVec<[PathBuf; 2]>,
    cache_dir: Option<PathBuf>,
    server: Option<String>,
}

impl SymbolSearchPath
{
    /// Compose a search path from its four sources.
    ///
    /// ```rust
    /// use std::path::Path;
    ///
    /// use crashscope_core::symbols::SymbolSearchPath;
    ///
    /// let path = SymbolSearchPath::compose(
    ///     Some(Path::new("/opt/app")),
    ///     Some(Path::new("/opt/app/symbols")),
    ///     Some(Path::new("/home/me/.cache/crashscope/symbols")),
    ///     Some("https://debuginfod.example.org"),
    /// );
    /// assert_eq!(
    ///     path.to_string(),
    ///     "/opt/app;/opt/app/symbols;/home/me/.cache/crashscope/symbols;srv*https://debuginfod.example.org"
    /// );
    /// ```
    pub fn compose(module_dir: Option<&Path>, search_base: Option<&Path>, cache_dir: Option<&Path>, server: Option<&str>) -> Self
    {
        let mut path = Self {
            module_dir: module_dir.map(Path::to_path_buf),
            user_dirs: SmallVec::new(),
            cache_dir: cache_dir.map(Path::to_path_buf),
            server: server.filter(|url| !url.is_empty()).map(str::to_string),
        };
        if let Some(base) = search_base {
            path.push_directory(base);
        }
        path
    }

    /// Append a caller-supplied directory.
    ///
    /// The directory is searched after every previously supplied one and
    /// before the cache and server. Empty paths and duplicates are ignored.
    pub fn push_directory(&mut self, dir: impl AsRef<Path>)
    {
        let dir = dir.as_ref();
        if dir.as_os_str().is_empty() || self.user_dirs.iter().any(|existing| existing == dir) {
            return;
        }
        self.user_dirs.push(dir.to_path_buf());
    }

    /// All entries in search order
    pub fn entries(&self) -> Vec<SearchLocation>
    {
        let mut entries = Vec::with_capacity(self.user_dirs.len() + 3);
        entries.extend(self.module_dir.iter().cloned().map(SearchLocation::Directory));
        entries.extend(self.user_dirs.iter().cloned().map(SearchLocation::Directory));
        entries.extend(self.cache_dir.iter().cloned().map(SearchLocation::Directory));
        entries.extend(self.server.iter().cloned().map(SearchLocation::Server));
        entries
    }

    /// Local directories in search order
    pub fn directories(&self) -> impl Iterator<Item = &Path>
    {
        self.module_dir
            .iter()
            .chain(self.user_dirs.iter())
            .chain(self.cache_dir.iter())
            .map(PathBuf::as_path)
    }

    /// Configured remote server, if any
    pub fn server(&self) -> Option<&str>
    {
        self.server.as_deref()
    }

    /// Candidate files that may hold separate debug info for `module`.
    ///
    /// `debuglink` is the file name recorded in the module's `.gnu_debuglink`
    /// section. Candidates are produced in priority order: next to the module,
    /// its `.debug/` subdirectory, each search directory, then the system
    /// debug directories. A macOS `.dSYM` bundle next to the module is also
    /// considered.
    pub fn debug_file_candidates(&self, module: &Path, debuglink: Option<&str>) -> Vec<PathBuf>
    {
        let Some(file_name) = module.file_name() else {
            return Vec::new();
        };
        let file_name = file_name.to_string_lossy();
        let debug_name = format!("{file_name}.debug");

        let mut names: SmallVec<[&str; 2]> = SmallVec::new();
        if let Some(link) = debuglink.filter(|link| !link.is_empty()) {
            names.push(link);
        }
        if !names.contains(&debug_name.as_str()) {
            names.push(&debug_name);
        }

        let mut dirs: Vec<PathBuf> = Vec::new();
        if let Some(parent) = module.parent() {
            dirs.push(parent.to_path_buf());
            dirs.push(parent.join(".debug"));
        }
        dirs.extend(self.directories().map(Path::to_path_buf));
        dirs.push(PathBuf::from("/usr/lib/debug"));
        dirs.push(PathBuf::from("/usr/local/lib/debug"));
        if let Some(parent) = module.parent() {
            // /usr/lib/debug mirrors the absolute module directory.
            if let Ok(relative) = parent.strip_prefix("/") {
                dirs.push(Path::new("/usr/lib/debug").join(relative));
            }
        }

        let mut candidates = Vec::new();
        for dir in &dirs {
            for name in &names {
                let candidate = dir.join(name);
                if candidate != module && !candidates.contains(&candidate) {
                    candidates.push(candidate);
                }
            }
        }

        let dsym = PathBuf::from(format!("{}.dSYM", module.display()))
            .join("Contents/Resources/DWARF")
            .join(file_name.as_ref());
        candidates.push(dsym);
        candidates
    }

    /// First existing separate debug file for `module`
    pub fn find_debug_file(&self, module: &Path, debuglink: Option<&str>) -> Option<PathBuf>
    {
        let found = self
            .debug_file_candidates(module, debuglink)
            .into_iter()
            .find(|candidate| candidate.is_file());

        if found.is_none() {
            if let Some(server) = self.server() {
                trace!(module = %module.display(), server, "no local debug file; remote servers are not queried while handling a fault");
            }
        }
        found
    }
}

impl fmt::Display for SymbolSearchPath
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let mut first = true;
        for entry in self.entries() {
            if !first {
                f.write_str(";")?;
            }
            first = false;
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}
