use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use crashscope::{Address, CrashConfig, CrashError, CrashHandler, Presenter, PresenterKind};
use crashscope_core::memory::LocalMemory;
use crashscope_core::types::{FaultCategory, FaultContext, Registers};
use crashscope_utils::{info, init_logging, init_logging_to_file, warn};

/// Crash reporting with symbolized stack traces.
#[derive(Parser, Debug)]
#[command(name = "crashscope")]
#[command(version)]
#[command(about = "In-process crash reporting with symbolized stack traces", long_about = None)]
struct Cli
{
    /// Extra directory searched for debug files
    #[arg(long, global = true)]
    symbol_path: Option<PathBuf>,
    /// Write reports to stderr instead of the terminal dialog
    #[arg(long, global = true, default_value_t = false)]
    stderr: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Install the crash handler and fault on purpose
    Crash
    {
        /// Kind of fault to trigger
        #[arg(value_enum)]
        kind: CrashKind,
    },
    /// Describe addresses of this process through the symbol chain
    Resolve
    {
        /// Addresses (hex with 0x prefix, or decimal)
        #[arg(required = true, value_parser = parse_address)]
        addresses: Vec<Address>,
    },
    /// Show the crash dialog with a report of the current stack
    Preview,
    /// Print the composed symbol search path
    SearchPath
    {
        /// Search base (defaults to CRASHSCOPE_SYMBOL_PATH)
        base: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum CrashKind
{
    /// Write to an unmapped address
    Segv,
    /// Call abort()
    Abort,
    /// Raise an arithmetic fault
    Fpe,
    /// Execute an undefined instruction
    Ill,
    /// Recurse until the stack guard page is hit
    Overflow,
}

fn parse_address(s: &str) -> Result<Address, String>
{
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    value
        .map(Address::new)
        .map_err(|err| format!("invalid address {s:?}: {err}"))
}

fn main()
{
    let cli = Cli::parse();

    // The dialog owns the terminal, so those commands only log to a file.
    let uses_dialog = !cli.stderr && matches!(cli.command, Commands::Crash { .. } | Commands::Preview);
    let logging = if uses_dialog {
        init_logging_to_file(None).map(|path| info!("Logging to {}", path.display()))
    } else {
        init_logging()
    };
    if let Err(e) = logging {
        eprintln!("Failed to initialize logging: {e}");
        process::exit(1);
    }

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn config_for(cli: &Cli) -> CrashConfig
{
    let base = match &cli.command {
        Commands::SearchPath { base: Some(base) } => Some(base),
        _ => cli.symbol_path.as_ref(),
    };
    let config = CrashConfig::from_env();
    let config = match base {
        Some(dir) => config.with_search_base(dir),
        None => config,
    };
    if cli.stderr {
        config.with_presenter(PresenterKind::Stderr)
    } else {
        config
    }
}

/// Install the global handler; a missing symbol engine only degrades output
fn install(cli: &Cli) -> crashscope::Result<&'static CrashHandler>
{
    match crashscope::install(config_for(cli)) {
        Ok(handler) => Ok(handler),
        Err(CrashError::SymbolEngine(err)) => {
            warn!("Continuing without native symbols: {err}");
            CrashHandler::global().ok_or(CrashError::SymbolEngine(err))
        }
        Err(err) => Err(err),
    }
}

fn run_command(cli: Cli) -> crashscope::Result<()>
{
    match &cli.command {
        Commands::Crash { kind } => {
            install(&cli)?;
            info!("Triggering {kind:?} fault");
            trigger(*kind);
            Ok(())
        }
        Commands::Resolve { addresses } => {
            let handler = install(&cli)?;
            for address in addresses {
                println!("{address}  {}", handler.describe_address(*address));
            }
            handler.shutdown();
            Ok(())
        }
        Commands::Preview => {
            let handler = install(&cli)?;
            let fault = FaultContext {
                category: FaultCategory::Breakpoint,
                signal: 0,
                fault_address: Address::ZERO,
                registers: Registers::capture(),
                thread_id: 0,
            };
            let report = handler.build_report(&fault, &LocalMemory);
            crashscope::presenter_for(handler.config().presenter).present(&report);
            handler.shutdown();
            Ok(())
        }
        Commands::SearchPath { .. } => {
            let handler = install(&cli)?;
            println!("{}", handler.search_path());
            handler.shutdown();
            Ok(())
        }
    }
}

fn trigger(kind: CrashKind)
{
    match kind {
        CrashKind::Segv => {
            // Non-null so debug builds' pointer checks don't panic first;
            // the zero page is never mapped.
            let target = 0x10usize as *mut u32;
            // SAFETY: none; faulting here is the point.
            unsafe { target.write_volatile(0xdead) };
        }
        CrashKind::Abort => process::abort(),
        CrashKind::Fpe => {
            // SAFETY: raising a signal at ourselves.
            unsafe { libc::raise(libc::SIGFPE) };
        }
        CrashKind::Ill => illegal_instruction(),
        CrashKind::Overflow => {
            let depth = recurse(0);
            println!("unreachable: {depth}");
        }
    }
}

#[allow(unconditional_recursion)]
fn recurse(depth: u64) -> u64
{
    let frame = std::hint::black_box([depth; 64]);
    recurse(depth + 1) + frame[0]
}

fn illegal_instruction()
{
    #[cfg(target_arch = "x86_64")]
    // SAFETY: `ud2` traps; nothing after it runs.
    unsafe {
        std::arch::asm!("ud2");
    }

    #[cfg(target_arch = "aarch64")]
    // SAFETY: permanently undefined encoding; traps.
    unsafe {
        std::arch::asm!("udf #0");
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    // SAFETY: raising a signal at ourselves.
    unsafe {
        libc::raise(libc::SIGILL);
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_address()
    {
        assert_eq!(parse_address("0x401000"), Ok(Address::new(0x40_1000)));
        assert_eq!(parse_address("0XFF"), Ok(Address::new(255)));
        assert_eq!(parse_address("4096"), Ok(Address::new(4096)));
        assert!(parse_address("0xnope").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands()
    {
        let cli = Cli::try_parse_from(["crashscope", "crash", "segv"]).unwrap();
        assert!(matches!(cli.command, Commands::Crash { kind: CrashKind::Segv }));

        let cli = Cli::try_parse_from(["crashscope", "--stderr", "resolve", "0x10", "32"]).unwrap();
        assert!(cli.stderr);
        assert!(matches!(cli.command, Commands::Resolve { ref addresses } if addresses.len() == 2));

        assert!(Cli::try_parse_from(["crashscope", "resolve"]).is_err());
        assert!(Cli::try_parse_from(["crashscope", "crash", "boom"]).is_err());
    }

    #[test]
    fn test_search_path_base_overrides_flag()
    {
        let cli = Cli::try_parse_from(["crashscope", "--symbol-path", "/opt/sym", "search-path", "/srv/pdb"]).unwrap();
        assert_eq!(config_for(&cli).search_base, Some(PathBuf::from("/srv/pdb")));
    }

    #[test]
    fn test_config_for_stderr_flag()
    {
        let cli = Cli::try_parse_from(["crashscope", "--stderr", "--symbol-path", "/opt/sym", "preview"]).unwrap();
        let config = config_for(&cli);
        assert_eq!(config.presenter, PresenterKind::Stderr);
        assert_eq!(config.search_base, Some(PathBuf::from("/opt/sym")));
    }
}
