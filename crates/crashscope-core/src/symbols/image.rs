//! Module image parsing: symbol tables and DWARF line information.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use addr2line::Context;
use gimli::{Dwarf, EndianArcSlice, RunTimeEndian, SectionId};
use object::{Object, ObjectSection, ObjectSegment, ObjectSymbol, SymbolKind};
use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use super::demangle::make_symbol_name;
use super::modules::LoadedModule;
use super::search::SymbolSearchPath;
use super::{SourceLine, SymbolHit};
use crate::error::{CrashError, Result};
use crate::types::Address;

type OwnedReader = EndianArcSlice<RunTimeEndian>;

const PAGE_MASK: u64 = !0xfff;

/// DWARF sections `addr2line` needs for line lookups.
const DWARF_SECTIONS: &[SectionId] = &[
    SectionId::DebugAbbrev,
    SectionId::DebugAddr,
    SectionId::DebugAranges,
    SectionId::DebugInfo,
    SectionId::DebugLine,
    SectionId::DebugLineStr,
    SectionId::DebugRanges,
    SectionId::DebugRngLists,
    SectionId::DebugStr,
    SectionId::DebugStrOffsets,
];

/// One entry of the module's symbol table, in file addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSymbol
{
    pub address: u64,
    pub size: u64,
    pub name: String,
}

struct DebugSections
{
    source: PathBuf,
    endian: RunTimeEndian,
    sections: HashMap<&'static str, Arc<[u8]>>,
}

impl DebugSections
{
    fn reader(&self, id: SectionId) -> OwnedReader
    {
        let data = self
            .sections
            .get(id.name())
            .cloned()
            .unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
        EndianArcSlice::new(data, self.endian)
    }
}

/// A parsed module: its symbol table plus (lazily) its line tables
pub struct ModuleImage
{
    path: PathBuf,
    name: String,
    bias: u64,
    symbols: Vec<ImageSymbol>,
    debug: Option<DebugSections>,
    context_cache: OnceCell<Option<Context<OwnedReader>>>,
}

impl ModuleImage
{
    /// Parse the file backing `module`.
    ///
    /// Debug information comes from the file itself or, when it was stripped,
    /// from a separate debug file found through `search`.
    ///
    /// ## Errors
    ///
    /// Returns `CrashError::Image` if the file cannot be read or parsed.
    pub fn load(module: &LoadedModule, search: &SymbolSearchPath) -> Result<Self>
    {
        let data = fs::read(&module.path).map_err(|err| image_error(&module.path, err))?;
        let file = object::File::parse(&*data).map_err(|err| image_error(&module.path, err))?;

        let bias = match module.slide {
            Some(slide) => slide,
            None => {
                let first_segment = file
                    .segments()
                    .map(|segment| segment.address() & PAGE_MASK)
                    .min()
                    .unwrap_or(0);
                module.base.value().wrapping_sub(first_segment)
            }
        };

        let symbols = collect_symbols(&file);
        let debug_file = if has_debug_info(&file) {
            Some(load_debug_sections(&file, &module.path)?)
        } else {
            load_separate_debug(&file, &module.path, search)
        };

        debug!(
            module = %module.path.display(),
            symbols = symbols.len(),
            debug_info = ?debug_file.as_ref().map(|d| d.source.as_path()),
            "loaded module image"
        );

        Ok(Self {
            name: module.name(),
            path: module.path.clone(),
            bias,
            symbols,
            debug: debug_file,
            context_cache: OnceCell::new(),
        })
    }

    /// Build an image from an already extracted symbol table (no debug info).
    pub fn from_symbols(path: impl Into<PathBuf>, bias: u64, mut symbols: Vec<ImageSymbol>) -> Self
    {
        let path = path.into();
        symbols.sort_by_key(|symbol| symbol.address);
        Self {
            name: super::modules::module_name(&path),
            path,
            bias,
            symbols,
            debug: None,
            context_cache: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str
    {
        &self.name
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }

    pub fn has_debug_info(&self) -> bool
    {
        self.debug.is_some()
    }

    /// Translate a runtime address to the file's own address space
    pub fn file_address(&self, address: Address) -> u64
    {
        address.value().wrapping_sub(self.bias)
    }

    /// Nearest symbol at or below `address` and the displacement into it
    pub fn lookup_symbol(&self, address: Address) -> Option<SymbolHit>
    {
        let file_addr = self.file_address(address);
        let index = self.symbols.partition_point(|symbol| symbol.address <= file_addr);
        let symbol = self.symbols.get(index.checked_sub(1)?)?;

        let displacement = file_addr - symbol.address;
        if symbol.size != 0 && displacement >= symbol.size {
            return None;
        }

        Some(SymbolHit {
            name: symbol.name.clone(),
            displacement,
        })
    }

    /// Source file and line of `address`, if line tables are available
    pub fn lookup_line(&self, address: Address) -> Option<SourceLine>
    {
        let context = self.context()?;
        let location = context.find_location(self.file_address(address)).ok()??;
        match (location.file, location.line) {
            (Some(file), Some(line)) => Some(SourceLine {
                file: file.to_string(),
                line,
            }),
            _ => None,
        }
    }

    fn context(&self) -> Option<&Context<OwnedReader>>
    {
        self.context_cache
            .get_or_init(|| {
                let debug = self.debug.as_ref()?;
                let dwarf = Dwarf::load(|id| Ok::<_, gimli::Error>(debug.reader(id))).ok()?;
                match Context::from_dwarf(dwarf) {
                    Ok(context) => Some(context),
                    Err(err) => {
                        trace!(module = %self.path.display(), "failed to build line context: {err}");
                        None
                    }
                }
            })
            .as_ref()
    }
}

fn image_error(path: &Path, err: impl std::fmt::Display) -> CrashError
{
    CrashError::Image {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

fn collect_symbols(file: &object::File<'_>) -> Vec<ImageSymbol>
{
    let mut symbols: Vec<ImageSymbol> = file
        .symbols()
        .chain(file.dynamic_symbols())
        .filter(|symbol| symbol.kind() == SymbolKind::Text && symbol.address() != 0 && !symbol.is_undefined())
        .filter_map(|symbol| {
            let raw = symbol.name().ok()?;
            if raw.is_empty() {
                return None;
            }
            Some(ImageSymbol {
                address: symbol.address(),
                size: symbol.size(),
                name: make_symbol_name(raw),
            })
        })
        .collect();

    symbols.sort_by_key(|symbol| symbol.address);
    symbols.dedup_by_key(|symbol| symbol.address);
    symbols
}

fn has_debug_info(file: &object::File<'_>) -> bool
{
    section_by_name(file, ".debug_info").is_some_and(|section| section.size() > 0)
}

fn section_by_name<'data, 'file>(
    file: &'file object::File<'data>,
    name: &str,
) -> Option<object::Section<'data, 'file>>
{
    file.section_by_name(name)
        .or_else(|| name.strip_prefix('.').and_then(|bare| file.section_by_name(&format!("__{bare}"))))
}

fn load_debug_sections(file: &object::File<'_>, source: &Path) -> Result<DebugSections>
{
    let endian = if file.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };

    let mut sections = HashMap::new();
    for id in DWARF_SECTIONS {
        let Some(section) = section_by_name(file, id.name()) else {
            continue;
        };
        let data = section.uncompressed_data().map_err(|err| image_error(source, err))?;
        let data = match data {
            Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes),
            Cow::Owned(vec) => vec.into(),
        };
        sections.insert(id.name(), data);
    }

    Ok(DebugSections {
        source: source.to_path_buf(),
        endian,
        sections,
    })
}

fn load_separate_debug(file: &object::File<'_>, module: &Path, search: &SymbolSearchPath) -> Option<DebugSections>
{
    let link = match file.gnu_debuglink() {
        Ok(Some((name, _crc))) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    };

    let candidate = search.find_debug_file(module, link.as_deref())?;
    let data = fs::read(&candidate).ok()?;
    let debug_file = object::File::parse(&*data).ok()?;
    if !has_debug_info(&debug_file) {
        trace!(candidate = %candidate.display(), "debug file candidate has no .debug_info");
        return None;
    }
    load_debug_sections(&debug_file, &candidate).ok()
}
