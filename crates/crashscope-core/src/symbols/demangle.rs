//! Symbol demangling.
//!
//! Rust symbols (legacy `_ZN...E` and v0 `_R...`) are demangled with
//! `rustc-demangle` and printed without the trailing hash. Anything else
//! (C, C++ or hand-written assembly) is returned as written in the symbol
//! table.

use rustc_demangle::try_demangle;

/// Human readable form of a raw symbol table name.
pub(crate) fn make_symbol_name(raw: &str) -> String
{
    match try_demangle(raw) {
        Ok(demangled) => format!("{demangled:#}"),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_demangles_legacy_rust_symbol_without_hash()
    {
        assert_eq!(
            make_symbol_name("_ZN4core9panicking5panic17h0123456789abcdefE"),
            "core::panicking::panic"
        );
    }

    #[test]
    fn test_keeps_c_symbols()
    {
        assert_eq!(make_symbol_name("memcpy"), "memcpy");
        assert_eq!(make_symbol_name("_ZSt9terminatev"), "_ZSt9terminatev");
    }
}
