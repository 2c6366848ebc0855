//! Purpose: `rodsio` CLI entry point and command dispatch over the local backend.
//! Role: Binary crate root; parses args, runs commands, streams object bytes on stdout.
//! Invariants: `cat`/`lines` write raw object bytes; other commands emit one JSON value.
//! Invariants: Errors are emitted as JSON on stderr (text when stderr is a terminal).
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Logs go to stderr, filtered by `RUST_LOG` (default `warn`).
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value, json};
use time::format_description::well_known::Rfc3339;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use rodsio::api::{
    Avu, DEFAULT_CHUNK_SIZE, DataObject, Error, ErrorKind, LocalConfig, LocalManager,
    ObjectManager, OpenMode, open_object, to_exit_code,
};

#[derive(Parser, Debug)]
#[command(name = "rodsio", version, about = "File-like access to data objects in a zone")]
struct Cli {
    /// Zone root directory (default: $RODSIO_ROOT, else ~/.rodsio/zone)
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Maximum number of concurrently leased backend connections
    #[arg(long, global = true, default_value_t = 4, value_name = "N")]
    pool_size: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write an object's bytes to stdout
    Cat {
        path: String,
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },
    /// Print an object line by line
    Lines {
        path: String,
        /// Strip a trailing carriage return from each line
        #[arg(long)]
        trim_cr: bool,
        /// Stop after this many lines
        #[arg(long, short = 'n')]
        max: Option<usize>,
    },
    /// Store stdin into an object, replacing any existing one
    Put {
        path: String,
        /// Append to the end of the object instead of replacing it
        #[arg(long)]
        append: bool,
    },
    /// Show an object's attributes as JSON
    Stat { path: String },
    /// Remove an object
    Rm { path: String },
    /// Inspect or edit an object's metadata
    Meta {
        #[command(subcommand)]
        command: MetaCommand,
    },
}

#[derive(Subcommand, Debug)]
enum MetaCommand {
    /// List all AVUs
    Ls { path: String },
    /// Attach an AVU
    Add(AvuArgs),
    /// Detach an AVU
    Rm(AvuArgs),
}

#[derive(Args, Debug)]
struct AvuArgs {
    path: String,
    name: String,
    value: String,
    #[arg(long)]
    units: Option<String>,
}

impl AvuArgs {
    fn avu(&self) -> Avu {
        let avu = Avu::new(&self.name, &self.value);
        match &self.units {
            Some(units) => avu.with_units(units),
            None => avu,
        }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(()) => 0,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<(), Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => {
            err.print().map_err(|io_err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to write help")
                    .with_source(io_err)
            })?;
            return Ok(());
        }
        Err(err) => {
            return Err(Error::new(ErrorKind::Usage).with_message(err.to_string().trim().to_string()));
        }
    };

    let config = match cli.root {
        Some(root) => LocalConfig::new(root),
        None => LocalConfig::from_env(),
    }
    .with_pool_size(cli.pool_size);
    debug!(root = %config.root.display(), pool_size = config.pool_size, "zone");
    let manager = Arc::new(LocalManager::new(config)?);

    match cli.command {
        Command::Cat { path, chunk_size } => cat(&manager, &path, chunk_size),
        Command::Lines { path, trim_cr, max } => lines(&manager, &path, trim_cr, max),
        Command::Put { path, append } => put(&manager, &path, append),
        Command::Stat { path } => {
            let (_collection, object) = LocalManager::data_object(&manager, &path)?;
            emit_json(&object_json(&object))
        }
        Command::Rm { path } => {
            let (_collection, object) = LocalManager::data_object(&manager, &path)?;
            object.unlink()?;
            emit_json(&json!({ "removed": object.path() }))
        }
        Command::Meta { command } => meta(&manager, command),
    }
}

fn cat(manager: &Arc<LocalManager>, path: &str, chunk_size: usize) -> Result<(), Error> {
    let (_collection, object) = LocalManager::data_object(manager, path)?;
    let mut file = object.open("r")?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for chunk in file.chunks(chunk_size).close_on_exhaustion(true) {
        out.write_all(&chunk?).map_err(stdout_error)?;
    }
    out.flush().map_err(stdout_error)
}

fn lines(
    manager: &Arc<LocalManager>,
    path: &str,
    trim_cr: bool,
    max: Option<usize>,
) -> Result<(), Error> {
    let (_collection, object) = LocalManager::data_object(manager, path)?;
    let mut file = object.open("r")?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let limit = max.unwrap_or(usize::MAX);
    for line in file.lines().trim_cr(trim_cr).take(limit) {
        let line = line?;
        out.write_all(&line).map_err(stdout_error)?;
        out.write_all(b"\n").map_err(stdout_error)?;
    }
    out.flush().map_err(stdout_error)?;
    file.close()
}

fn put(manager: &LocalManager, path: &str, append: bool) -> Result<(), Error> {
    let mut data = Vec::new();
    io::stdin().read_to_end(&mut data).map_err(|err| {
        Error::from_io(err).with_message("failed to read stdin")
    })?;

    if !append && manager.exists(path)? {
        manager.unlink(path)?;
    }
    let mode = OpenMode::resolve(if append { "a" } else { "w" })?;
    let mut file = open_object(manager, path, mode)?;
    let start = file.tell();
    let mut remaining = data.as_slice();
    while !remaining.is_empty() {
        let written = file.write(remaining)?;
        if written == 0 {
            return Err(Error::new(ErrorKind::Io)
                .with_message("backend accepted no bytes")
                .with_path(path)
                .with_offset(file.tell()));
        }
        remaining = &remaining[written..];
    }
    let end = file.tell();
    file.close()?;
    emit_json(&json!({
        "path": path,
        "written": end - start,
        "position": end,
    }))
}

fn meta(manager: &Arc<LocalManager>, command: MetaCommand) -> Result<(), Error> {
    match command {
        MetaCommand::Ls { path } => {
            let (_collection, object) = LocalManager::data_object(manager, &path)?;
            let items = object.metadata().items()?;
            emit_json(&json!({ "path": object.path(), "avus": avus_json(&items) }))
        }
        MetaCommand::Add(args) => {
            let (_collection, object) = LocalManager::data_object(manager, &args.path)?;
            object.metadata().add(&args.avu())?;
            emit_json(&json!({ "path": object.path(), "added": avus_json(&[args.avu()]) }))
        }
        MetaCommand::Rm(args) => {
            let (_collection, object) = LocalManager::data_object(manager, &args.path)?;
            object.metadata().remove(&args.avu())?;
            emit_json(&json!({ "path": object.path(), "removed": avus_json(&[args.avu()]) }))
        }
    }
}

fn object_json(object: &DataObject<LocalManager>) -> Value {
    let collection = object
        .collection()
        .map(|collection| collection.path().to_string());
    json!({
        "id": object.id(),
        "name": object.name(),
        "path": object.path(),
        "collection": collection,
        "size": object.size(),
        "checksum": object.checksum(),
        "create_time": format_time(object.create_time()),
        "modify_time": format_time(object.modify_time()),
    })
}

fn avus_json(avus: &[Avu]) -> Value {
    serde_json::to_value(avus).unwrap_or(Value::Null)
}

fn format_time(value: Option<time::OffsetDateTime>) -> Value {
    value
        .and_then(|ts| ts.format(&Rfc3339).ok())
        .map_or(Value::Null, Value::String)
}

fn emit_json(value: &Value) -> Result<(), Error> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer(&mut out, value).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write JSON")
            .with_source(err)
    })?;
    out.write_all(b"\n").map_err(stdout_error)
}

fn stdout_error(err: io::Error) -> Error {
    Error::from_io(err).with_message("failed to write stdout")
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("error: {}", error_message(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    err.message()
        .map(str::to_string)
        .or_else(|| err.source().map(|source| source.to_string()))
        .unwrap_or_else(|| format!("{:?}", err.kind()))
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = err.source();
    while let Some(source) = current {
        causes.push(source.to_string());
        current = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}
