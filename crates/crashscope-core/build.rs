//! Build script for crashscope-core
//!
//! Checks system requirements before compilation:
//! - Minimum Rust version (`Result::inspect_err` needs 1.76)
//! - Platform support (fault interception is implemented for Unix only)
//! - Frame pointers, which the stack walker depends on

fn main()
{
    println!("cargo:rerun-if-env-changed=RUSTFLAGS");
    println!("cargo:rerun-if-env-changed=CARGO_ENCODED_RUSTFLAGS");

    if let Ok(rustc_version) = rustc_version::version() {
        let min_rust_version = rustc_version::Version::new(1, 76, 0);

        if rustc_version < min_rust_version {
            panic!("crashscope-core requires Rust {min_rust_version} or newer, found {rustc_version}");
        }
    } else {
        // If we can't get version (e.g., in some build environments), just warn
        println!("cargo:warning=could not verify Rust version");
    }

    let family = std::env::var("CARGO_CFG_TARGET_FAMILY").unwrap_or_default();
    if !family.split(',').any(|f| f == "unix") {
        println!("cargo:warning=crashscope-core only intercepts faults on Unix targets; hooks will be inert");
    }

    check_frame_pointers();
}

fn check_frame_pointers()
{
    let flags = std::env::var("CARGO_ENCODED_RUSTFLAGS").unwrap_or_default();
    let forced = flags
        .split('\x1f')
        .any(|flag| flag.contains("force-frame-pointers=yes") || flag.contains("force-frame-pointers=on"));

    if !forced {
        println!("cargo:warning=frame pointers are not forced; crash reports may contain truncated stacks");
    }
}
