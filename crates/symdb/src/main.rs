use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use object::Object;
use symdb_core::bootstrap::{scan_for_kernel_debug_info, SCAN_LEN};
use symdb_core::hash::{handle_for, module_name_hash};
use symdb_core::{ConfigSeed, DebugInfoId, Guid, SymbolConfig, TomlSettingsStore};
use symdb_utils::{debug, info, LogFormat, LogLevel, LoggingGuard};

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Debug-info symbol database tools.
#[derive(Parser, Debug)]
#[command(name = "symdb")]
#[command(version)]
#[command(about = "Debug-info symbol database tools for memory forensics", long_about = None)]
struct Cli
{
    /// Base directory for the default symbol cache and settings file
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
    /// Settings file (default: <base dir>/symdb.toml)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Log level, overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Log format: pretty or json
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
    /// Write logs to this file instead of the console
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Show or change the persisted symbol configuration
    Config
    {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print the debug-info identity and handle of a PE image on disk
    Identity
    {
        /// Path to the PE image (driver, DLL or kernel)
        image: PathBuf,
    },
    /// Compute the handle of a debug-info identity
    Hash
    {
        /// Debug-info file name, for example ntkrnlmp.pdb
        file_name: String,
        /// GUID, dashed or as 32 hex digits
        guid: String,
        /// Age (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_u32)]
        age: u32,
    },
    /// Search a raw kernel image or memory dump for the kernel's CodeView record
    Scan
    {
        /// File holding the kernel image bytes
        image: PathBuf,
        /// Start offset of the kernel image inside the file
        #[arg(long, default_value = "0", value_parser = parse_u64)]
        offset: u64,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction
{
    /// Print the effective configuration
    Show,
    /// Change and persist configuration values
    Set
    {
        /// Local symbol cache directory (must exist and be writable)
        #[arg(long)]
        cache: Option<PathBuf>,
        /// Symbol server URL (http:// or https://)
        #[arg(long)]
        server: Option<String>,
        /// Enable the symbol subsystem
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        /// Disable the symbol subsystem
        #[arg(long)]
        disable: bool,
        /// Enable downloads from the symbol server
        #[arg(long, conflicts_with = "server_disable")]
        server_enable: bool,
        /// Disable downloads from the symbol server
        #[arg(long)]
        server_disable: bool,
    },
}

fn main()
{
    let cli = Cli::parse();

    let _guard = match init_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(cli: &Cli) -> Result<LoggingGuard, symdb_utils::LoggingError>
{
    let format = cli.log_format.unwrap_or_default();
    match (&cli.log_file, cli.log_level) {
        (Some(path), level) => symdb_utils::init_logging_to_file(path, level, format),
        (None, Some(level)) => symdb_utils::init_logging_with_level(level, format),
        (None, None) => symdb_utils::init_logging(),
    }
}

fn run_command(cli: Cli) -> CliResult<()>
{
    let seed = ConfigSeed::new(cli.base_dir.clone().unwrap_or_else(default_base_dir));
    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(|| seed.base_dir.join("symdb.toml"));
    debug!("Using settings file {}", settings_path.display());

    match cli.command {
        Commands::Config { action } => {
            let store = TomlSettingsStore::new(settings_path);
            match action {
                ConfigAction::Show => show_config(&store, &seed),
                ConfigAction::Set {
                    cache,
                    server,
                    enable,
                    disable,
                    server_enable,
                    server_disable,
                } => {
                    let mut config = SymbolConfig::load(&store, &seed, None)?;
                    if let Some(cache) = cache {
                        config.local_cache = cache;
                    }
                    if let Some(server) = server {
                        config.server_url = server;
                    }
                    if enable || disable {
                        config.enabled = enable;
                    }
                    if server_enable || server_disable {
                        config.server_enabled = server_enable;
                    }
                    config.persist(&store, &seed)?;
                    info!("Saved symbol configuration to {}", store.path().display());
                    show_config(&store, &seed)
                }
            }
        }
        Commands::Identity { image } => {
            let id = image_identity(&image)?;
            print_identity(&id);
            Ok(())
        }
        Commands::Hash { file_name, guid, age } => {
            let guid: Guid = guid.parse()?;
            print_identity(&DebugInfoId::new(file_name, guid, age));
            Ok(())
        }
        Commands::Scan { image, offset } => {
            let data = fs::read(&image)?;
            let start = usize::try_from(offset)?.min(data.len());
            let end = start.saturating_add(SCAN_LEN).min(data.len());
            match scan_for_kernel_debug_info(&data[start..end]) {
                Some(id) => {
                    print_identity(&id);
                    Ok(())
                }
                None => Err(format!("No kernel CodeView record in {}", image.display()).into()),
            }
        }
    }
}

fn default_base_dir() -> PathBuf
{
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".symdb"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn show_config(store: &TomlSettingsStore, seed: &ConfigSeed) -> CliResult<()>
{
    let config = SymbolConfig::load(store, seed, None)?;
    println!("Settings file:   {}", store.path().display());
    println!("Enabled:         {}", config.enabled);
    println!("Server enabled:  {}", config.server_enabled);
    println!("Local cache:     {}", config.local_cache.display());
    println!("Symbol server:   {}", config.server_url);
    println!("Symbol path:     {}", config.symbol_path());
    Ok(())
}

/// Debug-info identity from the CodeView record of a PE file on disk.
fn image_identity(path: &Path) -> CliResult<DebugInfoId>
{
    let data = fs::read(path)?;
    let file = object::File::parse(data.as_slice())?;
    let codeview = file
        .pdb_info()?
        .ok_or_else(|| format!("{} has no CodeView debug record", path.display()))?;

    // Linkers record the full build path; the symbol server only knows the file name.
    let recorded = String::from_utf8_lossy(codeview.path()).into_owned();
    let file_name = recorded
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or(recorded.as_str())
        .to_string();
    debug!("{} records debug info {recorded}", path.display());
    Ok(DebugInfoId::new(file_name, Guid(codeview.guid()), codeview.age()))
}

fn print_identity(id: &DebugInfoId)
{
    println!("File name:       {}", id.file_name);
    println!("GUID:            {}", id.guid);
    println!("Age:             {}", id.age);
    println!("Module name:     {}", id.module_name());
    println!("Handle:          {}", handle_for(id));
    println!("Name hash:       0x{:08x}", module_name_hash(id.module_name()));
    println!(
        "Server path:     {0}/{1}{2:X}/{0}",
        id.file_name,
        id.guid.to_symbol_server_string(),
        id.age
    );
}

fn parse_u64(text: &str) -> Result<u64, String>
{
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{text}': {e}"))
}

fn parse_u32(text: &str) -> Result<u32, String>
{
    let value = parse_u64(text)?;
    u32::try_from(value).map_err(|_| format!("'{text}' does not fit in 32 bits"))
}
