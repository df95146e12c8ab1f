//! # Native Symbol Engine
//!
//! Owns the list of loaded modules and a cache of parsed module images.
//!
//! Images are parsed lazily the first time an address inside them is
//! looked up, except for configured *auxiliary* modules, which are parsed
//! eagerly whenever the search path changes so their symbols are ready
//! before a fault happens.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::image::ModuleImage;
use super::modules::{self, LoadedModule};
use super::search::SymbolSearchPath;
use super::{NativeSymbols, SymbolLookup};
use crate::error::Result;
use crate::types::Address;

/// Native debug-information engine for the current process
pub struct SymbolEngine
{
    search_path: SymbolSearchPath,
    auxiliary: Vec<String>,
    modules: Vec<LoadedModule>,
    /// `None` marks an image that failed to parse; it is not retried until
    /// the search path changes.
    images: HashMap<PathBuf, Option<ModuleImage>>,
}

impl SymbolEngine
{
    /// Enumerate the loaded modules and prepare the engine.
    ///
    /// ## Errors
    ///
    /// Returns `CrashError::SymbolEngine` if the module list cannot be read.
    pub fn initialize(search_path: SymbolSearchPath, auxiliary: Vec<String>) -> Result<Self>
    {
        let modules = modules::enumerate()?;
        info!(modules = modules.len(), search_path = %search_path, "native symbol engine ready");

        let mut engine = Self {
            search_path,
            auxiliary,
            modules,
            images: HashMap::new(),
        };
        engine.load_auxiliary();
        Ok(engine)
    }

    /// Engine over a fixed module list, with nothing enumerated from the OS
    pub fn with_modules(search_path: SymbolSearchPath, modules: Vec<LoadedModule>) -> Self
    {
        Self {
            search_path,
            auxiliary: Vec::new(),
            modules,
            images: HashMap::new(),
        }
    }

    /// Register an already parsed image, replacing any cached one
    pub fn insert_image(&mut self, path: impl Into<PathBuf>, image: ModuleImage)
    {
        self.images.insert(path.into(), Some(image));
    }

    pub fn search_path(&self) -> &SymbolSearchPath
    {
        &self.search_path
    }

    pub fn modules(&self) -> &[LoadedModule]
    {
        &self.modules
    }

    /// Replace the search path.
    ///
    /// Cached images without debug info are dropped so the new locations are
    /// searched on the next lookup, the module list is refreshed and
    /// auxiliary modules are loaded.
    pub fn set_search_path(&mut self, search_path: SymbolSearchPath)
    {
        debug!(search_path = %search_path, "symbol search path updated");
        self.search_path = search_path;
        self.images
            .retain(|_, image| image.as_ref().is_some_and(ModuleImage::has_debug_info));
        if let Err(err) = self.refresh() {
            warn!("keeping previous module list: {err}");
        }
        self.load_auxiliary();
    }

    /// Re-enumerate loaded modules, forgetting images that were unmapped.
    ///
    /// ## Errors
    ///
    /// Returns `CrashError::SymbolEngine` if the module list cannot be read;
    /// the previous list is kept in that case.
    pub fn refresh(&mut self) -> Result<()>
    {
        let modules = modules::enumerate()?;
        self.images
            .retain(|path, _| modules.iter().any(|module| &module.path == path));
        self.modules = modules;
        Ok(())
    }

    /// Parse every mapped auxiliary module that is not parsed yet.
    ///
    /// Returns the number of modules loaded by this call.
    pub fn load_auxiliary(&mut self) -> usize
    {
        let pending: Vec<usize> = self
            .modules
            .iter()
            .enumerate()
            .filter(|(_, module)| self.auxiliary.iter().any(|name| *name == module.name()))
            .filter(|(_, module)| !self.images.contains_key(&module.path))
            .map(|(index, _)| index)
            .collect();

        let mut loaded = 0;
        for index in pending {
            if self.image_at(index).is_some() {
                loaded += 1;
            }
        }
        if loaded > 0 {
            info!(loaded, "auxiliary modules loaded");
        }
        loaded
    }

    /// Module whose executable ranges contain `address`
    pub fn module_for(&self, address: Address) -> Option<&LoadedModule>
    {
        self.modules.iter().find(|module| module.contains(address))
    }

    fn image_at(&mut self, index: usize) -> Option<&ModuleImage>
    {
        let module = self.modules.get(index)?;
        if !self.images.contains_key(&module.path) {
            let image = match ModuleImage::load(module, &self.search_path) {
                Ok(image) => Some(image),
                Err(err) => {
                    debug!("{err}");
                    None
                }
            };
            self.images.insert(module.path.clone(), image);
        }
        self.images.get(&module.path)?.as_ref()
    }
}

impl NativeSymbols for SymbolEngine
{
    fn lookup(&mut self, address: Address) -> Option<SymbolLookup>
    {
        let index = self.modules.iter().position(|module| module.contains(address))?;
        let module_name = self.modules[index].name();

        let Some(image) = self.image_at(index) else {
            return Some(SymbolLookup {
                module: module_name,
                symbol: None,
                line: None,
            });
        };

        let symbol = image.lookup_symbol(address);
        let line = symbol.as_ref().and_then(|_| image.lookup_line(address));
        Some(SymbolLookup {
            module: module_name,
            symbol,
            line,
        })
    }
}
