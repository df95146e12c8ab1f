//! Enumeration of the modules mapped into the running process.
//!
//! - **Linux**: parses `/proc/self/maps`, grouping file-backed mappings by path
//! - **macOS**: walks the dyld image list

use std::path::{Path, PathBuf};

use smallvec::SmallVec;

use crate::error::{CrashError, Result};
use crate::types::Address;

/// Half-open address range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange
{
    pub start: u64,
    pub end: u64,
}

impl AddressRange
{
    #[must_use]
    pub fn contains(&self, address: Address) -> bool
    {
        let addr = address.value();
        addr >= self.start && addr < self.end
    }
}

/// A module (executable or shared library) mapped in this process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule
{
    /// Path of the backing file
    pub path: PathBuf,
    /// Lowest mapped address of the file (its ELF/Mach-O header)
    pub base: Address,
    /// Executable ranges of the module
    pub ranges: SmallVec<[AddressRange; 4]>,
    /// Load slide when the loader reports it directly (dyld)
    pub slide: Option<u64>,
}

impl LoadedModule
{
    /// File name used as the `module` part of a resolved frame
    pub fn name(&self) -> String
    {
        module_name(&self.path)
    }

    /// Whether `address` lies inside one of the module's executable ranges
    pub fn contains(&self, address: Address) -> bool
    {
        self.ranges.iter().any(|range| range.contains(address))
    }
}

/// File name of a module path, or the full path when it has none
pub fn module_name(path: &Path) -> String
{
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

/// Enumerate the modules currently mapped in this process.
///
/// ## Errors
///
/// Returns `CrashError::SymbolEngine` when the loader state cannot be read.
#[cfg(target_os = "linux")]
pub fn enumerate() -> Result<Vec<LoadedModule>>
{
    let maps = std::fs::read_to_string("/proc/self/maps")
        .map_err(|err| CrashError::SymbolEngine(format!("failed to read /proc/self/maps: {err}")))?;
    Ok(parse_proc_maps(&maps))
}

#[cfg(target_os = "macos")]
pub fn enumerate() -> Result<Vec<LoadedModule>>
{
    use std::ffi::CStr;

    // SAFETY: dyld image APIs are safe to call at any time; indices past the
    // current count return null, which is checked below.
    let count = unsafe { libc::_dyld_image_count() };
    if count == 0 {
        return Err(CrashError::SymbolEngine("dyld reported no loaded images".into()));
    }

    let mut modules = Vec::with_capacity(count as usize);
    for index in 0..count {
        // SAFETY: `index` is below the image count.
        let (header, name, slide) = unsafe {
            (
                libc::_dyld_get_image_header(index),
                libc::_dyld_get_image_name(index),
                libc::_dyld_get_image_vmaddr_slide(index),
            )
        };
        if header.is_null() || name.is_null() {
            continue;
        }
        // SAFETY: dyld returns a NUL-terminated path that lives as long as the image.
        let path = PathBuf::from(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned());
        let base = header as u64;

        // Exact segment bounds come from the image file; until it is parsed the
        // module is assumed to cover everything up to the next image header.
        modules.push(LoadedModule {
            path,
            base: Address::new(base),
            ranges: SmallVec::from_elem(AddressRange { start: base, end: u64::MAX }, 1),
            slide: Some(slide as u64),
        });
    }

    clamp_open_ranges(&mut modules);
    Ok(modules)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn enumerate() -> Result<Vec<LoadedModule>>
{
    Err(CrashError::SymbolEngine(format!(
        "module enumeration is not supported on {}",
        std::env::consts::OS
    )))
}

/// Parse the contents of a `/proc/<pid>/maps` file.
///
/// Each line is `start-end perms offset dev inode [path]`. Anonymous and
/// pseudo mappings (`[stack]`, `[vdso]`, ...) are skipped. Mappings sharing a
/// path form one module whose base is the lowest mapping with file offset 0.
pub fn parse_proc_maps(maps: &str) -> Vec<LoadedModule>
{
    let mut modules: Vec<LoadedModule> = Vec::new();

    for line in maps.lines() {
        let mut parts = line.split_whitespace();
        let (Some(range), Some(perms), Some(offset), Some(_dev), Some(_inode)) =
            (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
        else {
            continue;
        };

        // Paths may contain spaces; everything after the inode is the path.
        let path = parts.collect::<Vec<_>>().join(" ");
        if path.is_empty() || path.starts_with('[') || path.ends_with(" (deleted)") {
            continue;
        }

        let Some((start, end)) = range.split_once('-') else {
            continue;
        };
        let (Ok(start), Ok(end), Ok(offset)) = (
            u64::from_str_radix(start, 16),
            u64::from_str_radix(end, 16),
            u64::from_str_radix(offset, 16),
        ) else {
            continue;
        };

        let path = PathBuf::from(path);
        let index = match modules.iter().position(|module| module.path == path) {
            Some(index) => index,
            None => {
                modules.push(LoadedModule {
                    path,
                    base: Address::new(start),
                    ranges: SmallVec::new(),
                    slide: None,
                });
                modules.len() - 1
            }
        };

        let module = &mut modules[index];
        if offset == 0 && start < module.base.value() {
            module.base = Address::new(start);
        }
        if perms.contains('x') {
            module.ranges.push(AddressRange { start, end });
        }
    }

    modules.retain(|module| !module.ranges.is_empty());
    modules
}

#[cfg(target_os = "macos")]
fn clamp_open_ranges(modules: &mut [LoadedModule])
{
    let mut bases: Vec<u64> = modules.iter().map(|module| module.base.value()).collect();
    bases.sort_unstable();

    for module in modules.iter_mut() {
        let base = module.base.value();
        let next = bases.iter().copied().find(|&other| other > base).unwrap_or(u64::MAX);
        for range in &mut module.ranges {
            range.end = range.end.min(next);
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    const MAPS: &str = "\
55d0c0a00000-55d0c0a20000 r--p 00000000 08:01 1234 /usr/bin/demo
55d0c0a20000-55d0c0a80000 r-xp 00020000 08:01 1234 /usr/bin/demo
55d0c0a80000-55d0c0aa0000 r--p 00080000 08:01 1234 /usr/bin/demo
7f1200000000-7f1200021000 rw-p 00000000 00:00 0
7f1300000000-7f1300028000 r--p 00000000 08:01 99 /usr/lib/x86_64-linux-gnu/libc.so.6
7f1300028000-7f13001bd000 r-xp 00028000 08:01 99 /usr/lib/x86_64-linux-gnu/libc.so.6
7f1400000000-7f1400001000 r-xp 00000000 08:01 77 /opt/My Tools/libspace.so
7ffd00000000-7ffd00021000 rw-p 00000000 00:00 0 [stack]
7ffd00100000-7ffd00102000 r-xp 00000000 00:00 0 [vdso]
";

    #[test]
    fn test_parse_proc_maps_groups_by_path()
    {
        let modules = parse_proc_maps(MAPS);
        assert_eq!(modules.len(), 3);

        let demo = &modules[0];
        assert_eq!(demo.name(), "demo");
        assert_eq!(demo.base, Address::new(0x55d0_c0a0_0000));
        assert_eq!(demo.ranges.len(), 1);
        assert!(demo.contains(Address::new(0x55d0_c0a2_0010)));
        assert!(!demo.contains(Address::new(0x55d0_c0a0_0010)));
    }

    #[test]
    fn test_parse_proc_maps_skips_pseudo_and_anonymous()
    {
        let modules = parse_proc_maps(MAPS);
        assert!(modules.iter().all(|module| !module.path.to_string_lossy().starts_with('[')));
        assert!(!modules.iter().any(|module| module.contains(Address::new(0x7ffd_0010_0010))));
    }

    #[test]
    fn test_parse_proc_maps_keeps_spaces_in_paths()
    {
        let modules = parse_proc_maps(MAPS);
        assert_eq!(modules[2].path, PathBuf::from("/opt/My Tools/libspace.so"));
        assert_eq!(modules[2].name(), "libspace.so");
    }

    #[test]
    fn test_address_range_is_half_open()
    {
        let range = AddressRange { start: 0x1000, end: 0x2000 };
        assert!(range.contains(Address::new(0x1000)));
        assert!(range.contains(Address::new(0x1fff)));
        assert!(!range.contains(Address::new(0x2000)));
        assert!(!range.contains(Address::new(0x0fff)));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_enumerate_finds_current_executable()
    {
        let modules = enumerate().unwrap();
        let exe = std::env::current_exe().unwrap();
        let here = Address::from(test_enumerate_finds_current_executable as usize);
        let owner = modules.iter().find(|module| module.contains(here)).unwrap();
        assert_eq!(owner.name(), module_name(&exe));
    }
}
