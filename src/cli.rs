use crate::config::load_config;
use crate::ir::{DEFAULT_TITLE, Diagram, Orientation};
use crate::layout_dump::{LayoutDump, write_layout_dump};
use crate::parser::parse_document;
use crate::store::Store;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{LevelFilter, debug, info};
use std::fmt::Write as _;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(name = "swimlane", version, about = "Swimlane flowchart documents: create, normalize, lay out")]
pub struct Args {
    /// Config JSON file (theme, layout, history)
    #[arg(short = 'c', long = "configFile", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write the default three-lane document
    New {
        #[arg(short = 't', long, default_value = DEFAULT_TITLE)]
        title: String,

        #[arg(long, value_enum, default_value = "vertical")]
        orientation: OrientationArg,

        /// Output file. Defaults to stdout.
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Import a document, repair it and export it again
    Normalize {
        /// Input file or '-' for stdin
        #[arg(short = 'i', long = "input")]
        input: Option<PathBuf>,

        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,

        /// Keep embedded step positions instead of recomputing them
        #[arg(long)]
        preserve_layout: bool,
    },
    /// Print the computed geometry as JSON
    Layout {
        #[arg(short = 'i', long = "input")]
        input: Option<PathBuf>,

        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Summarize a document
    Inspect {
        #[arg(short = 'i', long = "input")]
        input: Option<PathBuf>,

        /// Print the parsed diagram as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OrientationArg {
    Vertical,
    Horizontal,
}

impl From<OrientationArg> for Orientation {
    fn from(arg: OrientationArg) -> Self {
        match arg {
            OrientationArg::Vertical => Orientation::Vertical,
            OrientationArg::Horizontal => Orientation::Horizontal,
        }
    }
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level);
    let config = load_config(args.config.as_deref())?;
    debug!(command:? = args.command; "starting");

    match args.command {
        Command::New {
            title,
            orientation,
            output,
        } => {
            let mut store = Store::new(config);
            store.reset(&title, orientation.into());
            write_output(&store.export(), output.as_deref())?;
        }
        Command::Normalize {
            input,
            output,
            preserve_layout,
        } => {
            let text = read_input(input.as_deref())?;
            let mut store = Store::new(config);
            store.import(&text, preserve_layout)?;
            let diagram = store.diagram();
            info!(
                lanes = diagram.lanes.len(),
                steps = diagram.steps.len(),
                connections = diagram.connections.len();
                "normalized document"
            );
            write_output(&store.export(), output.as_deref())?;
        }
        Command::Layout { input, output } => {
            let text = read_input(input.as_deref())?;
            let diagram = parse_document(&text, &config)?;
            match output {
                Some(path) => write_layout_dump(&path, &diagram, &config.layout)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => {
                    let dump = LayoutDump::from_diagram(&diagram, &config.layout);
                    let json = serde_json::to_string_pretty(&dump)?;
                    write_output(&json, None)?;
                }
            }
        }
        Command::Inspect { input, json } => {
            let text = read_input(input.as_deref())?;
            let diagram = parse_document(&text, &config)?;
            let report = if json {
                serde_json::to_string_pretty(&diagram)?
            } else {
                summarize(&diagram)
            };
            write_output(&report, None)?;
        }
    }
    Ok(())
}

fn init_logger(level: &str) {
    let level = LevelFilter::from_str(level).unwrap_or_else(|_| {
        eprintln!("Invalid log level: {level}. Using 'warn' instead.");
        LevelFilter::Warn
    });
    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(level)
        .try_init();
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()));
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn write_output(text: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            if !text.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
        }
    }
    Ok(())
}

fn summarize(diagram: &Diagram) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", diagram.title, diagram.orientation.as_str());
    for lane in diagram.lanes_by_order() {
        let steps = diagram.steps_in_lane(&lane.id);
        let _ = writeln!(out, "  lane {} \"{}\": {} steps", lane.order, lane.title, steps.len());
        for step in steps {
            let _ = writeln!(out, "    [{}] {} \"{}\"", step.order, step.kind.as_str(), step.title);
        }
    }
    let _ = writeln!(out, "connections: {}", diagram.connections.len());
    for group in &diagram.phase_groups {
        let _ = writeln!(
            out,
            "phase \"{}\": rows {}..={}",
            group.title, group.start_row, group.end_row
        );
    }
    out
}
