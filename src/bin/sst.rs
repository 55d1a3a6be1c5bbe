//! Command line front end for building, merging and inspecting tables.

use std::{
    fmt::Write as _,
    fs::File,
    io::{self, BufReader, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, Level};

use sst::{
    bitmap,
    sst::dump::Entry,
    table::{Table, ValueFormat},
    Dump, Finder, Options,
};

#[derive(Parser)]
#[command(name = "sst")]
#[command(about = "Build, merge and query sorted-string tables")]
struct Cli {
    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a table from a text file of key:value lines
    Create {
        /// Minimum frame size
        #[arg(short = 'f', long)]
        frame_size: Option<usize>,
        /// JSON options file; flags override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// Record the options used for the build as JSON
        #[arg(long)]
        save_config: Option<PathBuf>,
        /// Values are comma-separated integers stored as bitmaps, rather than hex
        #[arg(long)]
        bitmap: bool,
        /// Replace an existing table
        #[arg(long)]
        force: bool,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Look up a key
    Lookup {
        #[arg(short, long)]
        input: PathBuf,
        /// Print the value as hex instead of as a bitmap
        #[arg(long)]
        hex: bool,
        key: String,
    },
    /// Merge tables, taking the union of bitmap values of shared keys
    Merge {
        #[arg(short = 'f', long)]
        frame_size: Option<usize>,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        force: bool,
        #[arg(num_args = 2.., required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Print the frames of one level of a table
    Dump {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long, default_value_t = 0)]
        level: usize,
        /// Print the entries of the frame starting with this key
        #[arg(short, long)]
        key: Option<String>,
        /// Print the entries of every frame
        #[arg(short, long)]
        all: bool,
        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sst: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Create {
            frame_size,
            config,
            save_config,
            bitmap,
            force,
            output,
            input,
        } => {
            let opts = options(config.as_deref(), frame_size)?;
            let format = if bitmap {
                ValueFormat::Bitmap
            } else {
                ValueFormat::Hex
            };
            let mut table = Table::new(format);
            let f = File::open(&input).with_context(|| format!("opening {}", input.display()))?;
            table
                .scan(BufReader::new(f))
                .with_context(|| format!("reading {}", input.display()))?;
            debug!(keys = table.len(), "read input");

            if force {
                sst::remove(&output)?;
            }
            sst::build(&output, &opts, table.into_stream())
                .with_context(|| format!("building {}", output.display()))?;
            if let Some(path) = save_config {
                opts.save(&path)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
        }
        Commands::Lookup { input, hex, key } => {
            if key.is_empty() {
                bail!("must specify a key");
            }
            let mut finder =
                Finder::open(&input).with_context(|| format!("opening {}", input.display()))?;
            let out = match finder.lookup(key.as_bytes())? {
                None => "not found".to_string(),
                Some(p) => match p.value {
                    None => "(no value)".to_string(),
                    Some(v) if hex => to_hex(&v),
                    Some(v) => bitmap::format(&bitmap::decode(&v)?),
                },
            };
            println!("{}", out);
        }
        Commands::Merge {
            frame_size,
            output,
            force,
            inputs,
        } => {
            let opts = options(None, frame_size)?;
            if force {
                sst::remove(&output)?;
            }
            sst::merge(&output, &opts, &inputs, bitmap::or)
                .with_context(|| format!("merging into {}", output.display()))?;
        }
        Commands::Dump {
            input,
            level,
            key,
            all,
            json,
        } => {
            let mut dump = Dump::open(&input, level)
                .with_context(|| format!("opening level {} of {}", level, input.display()))?;
            dump_level(&mut dump, key.as_deref(), all, json)?;
        }
    }
    Ok(())
}

fn options(config: Option<&Path>, frame_size: Option<usize>) -> Result<Options> {
    let mut opts = match config {
        Some(path) => {
            Options::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => Options::default(),
    };
    if let Some(frame_size) = frame_size {
        opts.frame_size = frame_size;
    }
    opts.validate()?;
    Ok(opts)
}

fn dump_level(dump: &mut Dump, key: Option<&str>, all: bool, json: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if let Some(key) = key {
        let off = match dump.find(key.as_bytes())? {
            Some(off) => off,
            None => bail!("no frame at level {} starts with key {:?}", dump.level(), key),
        };
        for e in dump.entries_at(off)? {
            writeln!(out, "{}", format_entry(&e, json))?;
        }
        return Ok(());
    }

    for frame in dump.frames()? {
        let first_key = String::from_utf8_lossy(&frame.first_key);
        if json {
            let v = serde_json::json!({
                "key": first_key,
                "offset": frame.offset,
                "len": frame.len,
            });
            writeln!(out, "{}", v)?;
        } else {
            writeln!(out, "{} {} {}", first_key, frame.offset, frame.len)?;
        }
        if all {
            for e in dump.entries_at(frame.offset)? {
                writeln!(out, "{}", format_entry(&e, json))?;
            }
        }
    }
    Ok(())
}

fn format_entry(e: &Entry, json: bool) -> String {
    let key = String::from_utf8_lossy(e.key());
    match (e, json) {
        (Entry::Pair(p), false) => match &p.value {
            Some(v) => format!("  {}: {}", key, to_hex(v)),
            None => format!("  {}", key),
        },
        (Entry::Pair(p), true) => {
            serde_json::json!({ "key": key, "value": p.value.as_deref().map(to_hex) }).to_string()
        }
        (Entry::Index { offset, .. }, false) => format!("  {} {}", key, offset),
        (Entry::Index { offset, .. }, true) => {
            serde_json::json!({ "key": key, "offset": offset }).to_string()
        }
    }
}

fn to_hex(b: &[u8]) -> String {
    let mut s = String::with_capacity(2 * b.len());
    for byte in b {
        let _ = write!(s, "{:02x}", byte);
    }
    s
}
