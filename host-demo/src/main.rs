use anyhow::Context;
use clap::{Parser, ValueEnum};
use runtime::config::{
    DEFAULT_ENTRY, DEFAULT_HOST_PAGES, DEFAULT_MEMORY_EXPORT, DEFAULT_MODULE,
    DEFAULT_PRINT_EXPORT,
};
use runtime::engines::wasmtime_host::WasmtimeEngine;
use runtime::{
    grow_and_inspect, inspect, Error, FileSource, HarnessConfig, MemoryMode, Runtime, Session,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Shown when the memory refuses another page.
const GROW_REFUSED_NOTICE: &str = "You cannot grow the Memory any more!";

#[derive(Parser, Debug)]
#[command(
    name = "memlens-demo",
    about = "Load a WebAssembly module, then grow and inspect its linear memory."
)]
struct Args {
    /// Path to the .wasm (or .wat) module
    #[arg(default_value = DEFAULT_MODULE)]
    module: PathBuf,

    /// Allocate the memory on the host and pass it to the module as `js.mem`
    #[arg(long)]
    host_memory: bool,

    /// Initial size of host memory, in pages
    #[arg(long, default_value_t = DEFAULT_HOST_PAGES)]
    initial_pages: u32,

    /// Maximum size of host memory, in pages
    #[arg(long)]
    max_pages: Option<u32>,

    /// Name of the memory export when the module owns its memory
    #[arg(long, default_value = DEFAULT_MEMORY_EXPORT)]
    memory_export: String,

    /// Entry function that must be exported (defaults to an optional `main`)
    #[arg(short, long)]
    entry: Option<String>,

    /// Do not run any entry function after instantiation
    #[arg(long, conflicts_with = "entry")]
    no_entry: bool,

    /// Export called by the `print` command with (offset, len)
    #[arg(long, default_value = DEFAULT_PRINT_EXPORT)]
    print_export: String,

    /// Offset passed to the print export
    #[arg(long, default_value_t = 0)]
    print_offset: u32,

    /// Length passed to the print export
    #[arg(long, default_value_t = 10)]
    print_len: u32,

    /// Host ceiling on memory size
    #[arg(long, value_name = "BYTES")]
    memory_limit: Option<usize>,

    /// First offset handed out by `env.malloc`
    #[arg(long, default_value_t = 0)]
    heap_base: u32,

    /// Commands to run instead of reading them from stdin
    #[arg(short, long = "command", value_enum, value_delimiter = ',')]
    commands: Vec<Command>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    /// Grow memory by one page and show the new report
    Grow,
    /// Call the print export
    Print,
    /// Show the current report
    Report,
    /// Stop reading commands
    Quit,
}

impl Args {
    fn harness_config(&self) -> HarnessConfig {
        let memory = if self.host_memory {
            MemoryMode::Host {
                initial_pages: self.initial_pages,
                maximum_pages: self.max_pages,
            }
        } else {
            MemoryMode::Exported {
                export: self.memory_export.clone(),
            }
        };

        let mut config = HarnessConfig::default()
            .with_memory(memory)
            .with_heap_base(self.heap_base);
        config.print_export = self.print_export.clone();
        config.memory_limit = self.memory_limit;
        if self.no_entry {
            config = config.without_entry();
        } else if let Some(entry) = &self.entry {
            config = config.with_required_entry(entry.clone());
        } else {
            config.entry = Some(DEFAULT_ENTRY.to_string());
        }
        config
    }
}

fn main() -> anyhow::Result<()> {
    set_up_logging();
    let args = Args::parse();
    let config = args.harness_config();

    let (root, name) = split_module_path(&args.module)?;
    let engine = WasmtimeEngine::new().context("failed to start wasmtime")?;
    let mut runtime = Runtime::new(engine, FileSource::new(root));
    let mut session = runtime
        .load(&name, &config)
        .with_context(|| format!("failed to load {}", args.module.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    flush_console(&mut session, &mut out)?;
    writeln!(out, "{}", inspect(&session)?)?;

    if args.commands.is_empty() {
        run_lines(io::stdin().lock(), &mut session, &args, &mut out)?;
    } else {
        for &command in &args.commands {
            if !run_command(&mut session, command, &args, &mut out)? {
                break;
            }
        }
    }

    Ok(())
}

/// Logs go to stderr, filtered by `$RUST_LOG` (warnings only by default).
fn set_up_logging() {
    let fmt_layer = fmt::layer().with_target(true).with_writer(io::stderr).compact();
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

/// Splits a module path into the source root and the name fetched from it.
fn split_module_path(path: &Path) -> anyhow::Result<(PathBuf, String)> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("module path {} has no file name", path.display()))?
        .to_string();
    let root = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((root, name))
}

/// Runs one command. Returns `false` once the session should stop.
///
/// Grow refusals and print failures are reported and the session carries on;
/// anything else is fatal.
fn run_command<S: Session, W: Write>(
    session: &mut S,
    command: Command,
    args: &Args,
    out: &mut W,
) -> anyhow::Result<bool> {
    match command {
        Command::Grow => match grow_and_inspect(session) {
            Ok(report) => writeln!(out, "{report}")?,
            Err(Error::GrowRefused { .. }) => writeln!(out, "{GROW_REFUSED_NOTICE}")?,
            Err(err) => return Err(err.into()),
        },
        Command::Print => {
            if let Err(err) = session.print(args.print_offset, args.print_len) {
                warn!(error = %err, "print failed");
            }
            flush_console(session, out)?;
        }
        Command::Report => writeln!(out, "{}", inspect(&*session)?)?,
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

/// Reads one command per line until EOF or `quit`. Blank lines are skipped
/// and command names are case-insensitive.
fn run_lines<R: BufRead, S: Session, W: Write>(
    input: R,
    session: &mut S,
    args: &Args,
    out: &mut W,
) -> anyhow::Result<()> {
    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match Command::from_str(line, true) {
            Ok(command) => {
                if !run_command(session, command, args, out)? {
                    break;
                }
            }
            Err(_) => writeln!(out, "unknown command `{line}` (grow, print, report, quit)")?,
        }
    }
    Ok(())
}

fn flush_console<S: Session, W: Write>(session: &mut S, out: &mut W) -> io::Result<()> {
    for line in session.drain_console() {
        writeln!(out, "{line}")?;
    }
    Ok(())
}
