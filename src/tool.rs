// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! CLI tool for inspecting and poking at a dataset, reusing the teacher's
//! own `clap`+`rustyline` shell pattern (`examples/fjall-rs-lsm-tree`'s
//! `src/tool.rs`). Out of scope as a *query language front end* (spec.md
//! §1), but shipped as the ambient "poke at the engine from a shell"
//! surface every dataset-shaped tool in this corpus carries.

use arkimet_core::dataset::{Config, QueryMode};
use arkimet_core::matcher::MatchAll;
use arkimet_core::metadata::{Reftime, Source};
use arkimet_core::scanner::Scanner;
use arkimet_core::{Dataset, Format, Metadata};
use clap::{ArgAction, Parser, Subcommand};
use rustyline::DefaultEditor;
use std::cell::RefCell;
use std::io::{self, BufRead, IsTerminal, Write};
use std::ops::Range;
use std::path::PathBuf;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    prelude::*,
    registry::Registry,
};

macro_rules! die {
    ($fmt:literal, $($arg:tt)*) => {{
        eprintln!($fmt, $($arg)*);
        std::process::exit(1);
    }};
    ($msg:literal) => {{
        eprintln!($msg);
        std::process::exit(1);
    }};
}

#[allow(unused_imports)]
use tracing::{debug, error, info, warn};

fn init_tracing(quiet: bool, verbose: u8) -> LevelFilter {
    let level_filter = if quiet {
        LevelFilter::ERROR
    } else {
        match verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    tracing_log::LogTracer::init().expect("failed to set log tracer");

    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var("ARKI_LOG")
        .from_env_lossy()
        .add_directive("rustyline=warn".parse().expect("failed to parse rustyline directive"));

    let subscriber = Registry::default()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).compact());

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        die!("INTERNAL ERROR: setting default tracing::subscriber failed");
    }

    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing_panic::panic_hook(info);
        prev_hook(info);
    }));

    level_filter
}

/// CLI tool for inspecting datasets
#[derive(Parser, Debug)]
#[command(name = "arki-tool")]
#[command(about = "Inspect and maintain an arkimet-core dataset")]
struct ToolArgs {
    /// Suppress all output except for errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Increase verbosity; supply multiple times for more
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the dataset directory (the directory holding its `config` file)
    dataset_path: PathBuf,

    /// Command to run (if omitted, starts an interactive shell)
    #[command(subcommand)]
    command: Option<ToolCommand>,
}

#[derive(Subcommand, Debug, Clone)]
enum ToolCommand {
    /// Acquire a file into the dataset, one message per line/whole-file
    /// depending on the dataset's configured format
    Acquire {
        /// Path to the file to scan and acquire
        file: PathBuf,
        /// Update sequence number for this batch
        #[arg(long, default_value_t = 0)]
        usn: i64,
    },
    /// List every message in the dataset
    Query {
        /// Dump raw message bytes to stdout instead of listing metadata
        #[arg(long)]
        dump: bool,
        /// With --dump, prepend each message's binary metadata
        #[arg(long, requires = "dump")]
        inline: bool,
    },
    /// Check segment health without repairing anything
    Check {
        /// Unix timestamp to treat as "now" (defaults to the current time)
        now: Option<i64>,
    },
    /// Repack one segment by relative path
    Repack {
        /// Segment path relative to the dataset root
        relpath: PathBuf,
    },
    /// Remove segments past their configured delete age
    Sweep {
        /// Unix timestamp to treat as "now" (defaults to the current time)
        now: Option<i64>,
    },
    /// Move segments past their configured archive age under `.archive/last/`
    Archive {
        /// Unix timestamp to treat as "now" (defaults to the current time)
        now: Option<i64>,
    },
    /// Show dataset configuration
    Info,
}

// Shell-only wrapper so the interactive REPL can parse the same commands
// with no binary name prefix, matching the teacher's `ShellArgs` pattern.
#[derive(Parser, Debug)]
#[command(name = "")]
#[command(no_binary_name = true)]
#[command(disable_version_flag = true)]
struct ShellArgs {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Subcommand, Debug, Clone)]
enum ShellCommand {
    #[command(flatten)]
    ToolCmd(ToolCommand),
    /// Exit the shell
    #[command(visible_alias = "quit")]
    Exit,
}

/// A scanner that treats an entire input buffer as one message, using the
/// file's modification time as its reftime. Stands in for the real
/// format-specific scanners this crate deliberately does not ship
/// (spec.md §1, §6.4); good enough to exercise `acquire`/`query` from the
/// shell against any format.
struct WholeFileScanner {
    format: Format,
    mtime: i64,
}

impl Scanner for WholeFileScanner {
    fn format(&self) -> Format {
        self.format
    }

    fn scan(&self, data: &[u8]) -> arkimet_core::Result<Vec<(Range<usize>, Metadata)>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let mut metadata = Metadata::new(Source::Inline {
            format: self.format,
            size: data.len() as u64,
        });
        metadata.set_reftime(Reftime::Position(self.mtime));
        Ok(vec![(0..data.len(), metadata)])
    }
}

struct Session {
    dataset: RefCell<Dataset>,
    format: Format,
}

impl Session {
    fn open(path: &std::path::Path) -> arkimet_core::Result<Self> {
        let config = Config::from_file(&path.join("config"))?;
        let format = config.format;
        let dataset = Dataset::open(path, config)?;
        Ok(Self {
            dataset: RefCell::new(dataset),
            format,
        })
    }

    fn scanner_for_now(&self) -> WholeFileScanner {
        let mtime = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        WholeFileScanner { format: self.format, mtime }
    }
}

fn handle_acquire(session: &Session, file: &std::path::Path, usn: i64) {
    let data = match std::fs::read(file) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error reading {}: {e}", file.display());
            return;
        }
    };
    let scanner = session.scanner_for_now();
    let mut dataset = session.dataset.borrow_mut();
    match dataset.writer().acquire(&data, &scanner, usn) {
        Ok(outcomes) => println!("acquired {} message(s): {outcomes:?}", outcomes.len()),
        Err(e) => eprintln!("error: {e}"),
    }
}

fn handle_query(session: &Session, dump: bool, inline: bool) {
    let dataset = session.dataset.borrow();
    let scanner = session.scanner_for_now();
    if dump {
        let mode = if inline { QueryMode::Inline } else { QueryMode::Data };
        let mut stdout = io::stdout();
        match dataset.reader().query_bytes(&MatchAll, &scanner, mode, &mut stdout) {
            Ok(n) => eprintln!("wrote {n} byte(s)"),
            Err(e) => eprintln!("error: {e}"),
        }
        return;
    }
    match dataset.reader().query_data(&MatchAll, &scanner) {
        Ok(hits) => {
            for md in &hits {
                println!("{:?} reftime={:?}", md.source(), md.reftime());
            }
            println!("({} message(s))", hits.len());
        }
        Err(e) => eprintln!("error: {e}"),
    }
}

fn resolve_now(now: Option<i64>) -> i64 {
    now.unwrap_or_else(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    })
}

fn handle_check(session: &Session, now: Option<i64>) {
    let now = resolve_now(now);
    let mut dataset = session.dataset.borrow_mut();
    match dataset.checker().check(now) {
        Ok(reports) => {
            let mut bad = 0;
            for r in &reports {
                if !r.state.is_empty() {
                    bad += 1;
                    println!("{} {}", r.relpath.display(), r.state);
                }
            }
            println!("checked {} segment(s), {bad} need attention", reports.len());
        }
        Err(e) => eprintln!("error: {e}"),
    }
}

fn handle_repack(session: &Session, relpath: &std::path::Path) {
    let scanner = session.scanner_for_now();
    let mut dataset = session.dataset.borrow_mut();
    match dataset.checker().repack(relpath, &scanner) {
        Ok(n) => println!("repacked {} record(s)", n),
        Err(e) => eprintln!("error: {e}"),
    }
}

fn handle_sweep(session: &Session, now: Option<i64>) {
    let now = resolve_now(now);
    let mut dataset = session.dataset.borrow_mut();
    match dataset.checker().delete_aged_segments(now) {
        Ok(n) => println!("removed {n} segment(s) past delete age"),
        Err(e) => eprintln!("error: {e}"),
    }
}

fn handle_archive(session: &Session, now: Option<i64>) {
    let now = resolve_now(now);
    let scanner = session.scanner_for_now();
    let mut dataset = session.dataset.borrow_mut();
    match dataset.checker().archive_aged_segments(now, &scanner) {
        Ok(n) => println!("archived {n} segment(s) past archive age"),
        Err(e) => eprintln!("error: {e}"),
    }
}

fn print_info(session: &Session) {
    let dataset = session.dataset.borrow();
    let config = dataset.config();
    println!("Root: {}", dataset.root().display());
    println!("Name: {}", config.name);
    println!("Format: {}", config.format);
    println!("Step: {:?}", config.step);
    println!("Index kind: {:?}", config.index_kind);
    println!("Replace policy: {:?}", config.replace);
    println!("Archive age (days): {:?}", config.archive_age_days);
    println!("Delete age (days): {:?}", config.delete_age_days);
}

enum CommandResult {
    Continue,
    Exit,
}

fn execute_command(session: &Session, cmd: ToolCommand) -> CommandResult {
    match cmd {
        ToolCommand::Acquire { file, usn } => handle_acquire(session, &file, usn),
        ToolCommand::Query { dump, inline } => handle_query(session, dump, inline),
        ToolCommand::Check { now } => handle_check(session, now),
        ToolCommand::Repack { relpath } => handle_repack(session, &relpath),
        ToolCommand::Sweep { now } => handle_sweep(session, now),
        ToolCommand::Archive { now } => handle_archive(session, now),
        ToolCommand::Info => print_info(session),
    }
    CommandResult::Continue
}

fn execute_shell_command(session: &Session, cmd: ShellCommand) -> CommandResult {
    match cmd {
        ShellCommand::ToolCmd(tool_cmd) => execute_command(session, tool_cmd),
        ShellCommand::Exit => CommandResult::Exit,
    }
}

fn run_shell_command(session: &Session, line: &str) -> CommandResult {
    let line = line.trim();
    if line.is_empty() {
        return CommandResult::Continue;
    }
    let tokens = match shlex::split(line) {
        Some(t) if !t.is_empty() => t,
        Some(_) => return CommandResult::Continue,
        None => {
            eprintln!("error: unclosed quote");
            return CommandResult::Continue;
        }
    };
    match ShellArgs::try_parse_from(&tokens) {
        Ok(args) => execute_shell_command(session, args.command),
        Err(e) => {
            eprintln!("{e}");
            CommandResult::Continue
        }
    }
}

fn run_shell(session: &Session) {
    if io::stdin().is_terminal() {
        run_shell_interactive(session);
    } else {
        run_shell_non_interactive(session);
    }
}

fn run_shell_interactive(session: &Session) {
    println!("arki-tool shell. Type 'help' for commands, 'exit' to quit.\n");
    let mut rl = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("error initializing line editor: {e}");
            return;
        }
    };
    loop {
        match rl.readline("arki> ") {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                if let CommandResult::Exit = run_shell_command(session, &line) {
                    break;
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => continue,
            Err(rustyline::error::ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                eprintln!("error reading input: {e}");
                break;
            }
        }
    }
}

fn run_shell_non_interactive(session: &Session) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        if stdout.flush().is_err() {
            die!("can't flush stdout");
        }
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                if let CommandResult::Exit = run_shell_command(session, &line) {
                    break;
                }
            }
            Err(e) => die!("error reading input: {e}"),
        }
    }
}

fn main() {
    let args = ToolArgs::parse();
    let level_filter = init_tracing(args.quiet, args.verbose);
    info!("starting arki-tool, log level: {level_filter}");

    let session = match Session::open(&args.dataset_path) {
        Ok(s) => s,
        Err(e) => die!("error opening dataset: {e}"),
    };

    match args.command {
        Some(cmd) => {
            execute_command(&session, cmd);
        }
        None => run_shell(&session),
    }
}
