//! # Symbol Resolution
//!
//! Turns one instruction address into the text printed for a stack frame.
//!
//! Resolution is a fixed two-stage chain:
//!
//! 1. an optional **external resolver** registered by a hosted runtime (JIT
//!    or interpreted code the native tables know nothing about); a non-empty
//!    answer is used verbatim
//! 2. the **native engine** ([`SymbolEngine`]), backed by the symbol tables
//!    and DWARF line tables of the loaded modules
//!
//! Native results are formatted as:
//!
//! | known                | output                                  |
//! |----------------------|-----------------------------------------|
//! | symbol + line        | `module!symbol at file:line`            |
//! | symbol only          | `module!0xADDRESS symbol + 0xDISP`      |
//! | module only          | `module!0xADDRESS`                      |
//! | nothing              | `Unknown!0xADDRESS`                     |
//! | engine unavailable   | `0xADDRESS`                             |
//!
//! Hex is always lowercase without padding.
//!
//! ## Usage
//!
//! ```rust
//! use crashscope_core::symbols::ResolutionChain;
//! use crashscope_core::types::Address;
//!
//! // No external resolver, native engine unavailable: bare hex.
//! let mut chain = ResolutionChain::new(None, None);
//! assert_eq!(chain.describe(Address::new(0xdead)), "0xdead");
//! ```

use std::panic::{self, AssertUnwindSafe};

use crate::types::Address;

mod demangle;
pub mod engine;
pub mod image;
pub mod modules;
pub mod search;

pub use engine::SymbolEngine;
pub use image::{ImageSymbol, ModuleImage};
pub use modules::{AddressRange, LoadedModule};
pub use search::{SearchLocation, SymbolSearchPath};

/// Externally registered address resolver
///
/// Implemented for any `Fn(Address) -> Option<String>` closure. Returning
/// `None` or an empty string defers to the native engine.
pub trait SymbolResolver: Send + Sync
{
    fn resolve(&self, address: Address) -> Option<String>;
}

impl<F> SymbolResolver for F
where
    F: Fn(Address) -> Option<String> + Send + Sync,
{
    fn resolve(&self, address: Address) -> Option<String>
    {
        self(address)
    }
}

/// Symbol covering an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolHit
{
    /// Demangled symbol name
    pub name: String,
    /// Bytes from the start of the symbol
    pub displacement: u64,
}

/// Source position of an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine
{
    pub file: String,
    pub line: u32,
}

/// Everything the native engine knows about an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolLookup
{
    /// Name of the owning module
    pub module: String,
    /// Covering symbol, if any
    pub symbol: Option<SymbolHit>,
    /// Source line, only consulted when `symbol` is known
    pub line: Option<SourceLine>,
}

impl SymbolLookup
{
    /// Render the lookup for `address`
    pub fn describe(&self, address: Address) -> String
    {
        match (&self.symbol, &self.line) {
            (Some(symbol), Some(line)) => format!("{}!{} at {}:{}", self.module, symbol.name, line.file, line.line),
            (Some(symbol), None) => format!(
                "{}!{address:#x} {} + {:#x}",
                self.module, symbol.name, symbol.displacement
            ),
            (None, _) => format!("{}!{address:#x}", self.module),
        }
    }
}

/// Native debug-information lookups
///
/// `None` means no loaded module owns the address.
pub trait NativeSymbols
{
    fn lookup(&mut self, address: Address) -> Option<SymbolLookup>;
}

/// External resolver followed by the native engine
///
/// `native` is `None` when the native engine failed to initialize, in which
/// case addresses the external resolver cannot name come back as bare hex.
pub struct ResolutionChain<'a>
{
    external: Option<&'a dyn SymbolResolver>,
    native: Option<&'a mut dyn NativeSymbols>,
}

impl<'a> ResolutionChain<'a>
{
    pub fn new(external: Option<&'a dyn SymbolResolver>, native: Option<&'a mut dyn NativeSymbols>) -> Self
    {
        Self { external, native }
    }

    /// Describe `address`; never empty, never fails
    pub fn describe(&mut self, address: Address) -> String
    {
        if let Some(text) = self.resolve_external(address) {
            return text;
        }

        match self.native.as_deref_mut() {
            None => format!("{address:#x}"),
            Some(native) => match native.lookup(address) {
                Some(lookup) => lookup.describe(address),
                None => format!("Unknown!{address:#x}"),
            },
        }
    }

    /// Answer of the external resolver alone; `None` defers to native lookup
    pub fn resolve_external(&self, address: Address) -> Option<String>
    {
        let resolver = self.external?;
        // A panicking resolver must not take the report down with it.
        let text = panic::catch_unwind(AssertUnwindSafe(|| resolver.resolve(address))).ok()??;
        (!text.is_empty()).then_some(text)
    }
}

#[cfg(test)]
mod tests
{
    use std::collections::HashMap;

    use super::*;

    #[derive(Default)]
    struct FakeNative
    {
        entries: HashMap<u64, SymbolLookup>,
        calls: usize,
    }

    impl NativeSymbols for FakeNative
    {
        fn lookup(&mut self, address: Address) -> Option<SymbolLookup>
        {
            self.calls += 1;
            self.entries.get(&address.value()).cloned()
        }
    }

    fn native() -> FakeNative
    {
        let mut fake = FakeNative::default();
        fake.entries.insert(
            0x1010,
            SymbolLookup {
                module: "app".into(),
                symbol: Some(SymbolHit {
                    name: "app::main".into(),
                    displacement: 0x10,
                }),
                line: Some(SourceLine {
                    file: "src/main.rs".into(),
                    line: 42,
                }),
            },
        );
        fake.entries.insert(
            0x2abc,
            SymbolLookup {
                module: "libc.so.6".into(),
                symbol: Some(SymbolHit {
                    name: "memcpy".into(),
                    displacement: 0xbc,
                }),
                line: None,
            },
        );
        fake.entries.insert(
            0x3000,
            SymbolLookup {
                module: "libstripped.so".into(),
                symbol: None,
                line: None,
            },
        );
        fake
    }

    #[test]
    fn test_symbol_with_line()
    {
        let mut native = native();
        let mut chain = ResolutionChain::new(None, Some(&mut native));
        assert_eq!(chain.describe(Address::new(0x1010)), "app!app::main at src/main.rs:42");
    }

    #[test]
    fn test_symbol_with_displacement()
    {
        let mut native = native();
        let mut chain = ResolutionChain::new(None, Some(&mut native));
        assert_eq!(chain.describe(Address::new(0x2abc)), "libc.so.6!0x2abc memcpy + 0xbc");
    }

    #[test]
    fn test_module_without_symbol()
    {
        let mut native = native();
        let mut chain = ResolutionChain::new(None, Some(&mut native));
        assert_eq!(chain.describe(Address::new(0x3000)), "libstripped.so!0x3000");
    }

    #[test]
    fn test_unknown_module_fallback()
    {
        let mut native = native();
        let mut chain = ResolutionChain::new(None, Some(&mut native));
        assert_eq!(chain.describe(Address::new(0xABCDEF)), "Unknown!0xabcdef");
    }

    #[test]
    fn test_engine_unavailable_is_bare_hex()
    {
        let mut chain = ResolutionChain::new(None, None);
        assert_eq!(chain.describe(Address::new(0x7f00_dead_beef)), "0x7f00deadbeef");
    }

    #[test]
    fn test_external_resolver_takes_precedence()
    {
        let resolver = |address: Address| (address.value() == 0x1010).then(|| "Managed.Method()".to_string());
        let mut native = native();
        let mut chain = ResolutionChain::new(Some(&resolver), Some(&mut native));
        assert_eq!(chain.describe(Address::new(0x1010)), "Managed.Method()");
        drop(chain);
        assert_eq!(native.calls, 0);

        let mut chain = ResolutionChain::new(Some(&resolver), None);
        assert_eq!(chain.describe(Address::new(0x1010)), "Managed.Method()");
    }

    #[test]
    fn test_empty_external_answer_defers_to_native()
    {
        let resolver = |_: Address| Some(String::new());
        let mut native = native();
        let mut chain = ResolutionChain::new(Some(&resolver), Some(&mut native));
        assert_eq!(chain.describe(Address::new(0x3000)), "libstripped.so!0x3000");
    }

    #[test]
    fn test_panicking_external_resolver_is_ignored()
    {
        let resolver = |_: Address| -> Option<String> { panic!("resolver bug") };
        let mut chain = ResolutionChain::new(Some(&resolver), None);
        assert_eq!(chain.describe(Address::new(0x10)), "0x10");
    }

    #[test]
    fn test_resolution_is_deterministic()
    {
        let mut native = native();
        let mut chain = ResolutionChain::new(None, Some(&mut native));
        let first = chain.describe(Address::new(0x2abc));
        let second = chain.describe(Address::new(0x2abc));
        assert_eq!(first, second);
    }
}
