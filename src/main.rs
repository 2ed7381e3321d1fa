// SPDX-License-Identifier: GPL-3.0-only

//! Command-line interface for cg2md.
//!
//! This binary provides the `cg2md` command for converting ChatGPT
//! conversation exports from JSON to Markdown format.

use cg2md::{parser, renderer};
use lexopt::prelude::*;
use snafu::{ensure, prelude::*};
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Where rendered Markdown ends up.
#[derive(Clone)]
enum OutputTarget {
    /// A directory (per-file mode) or a file (with --concat).
    Path(PathBuf),
    /// Standard output.
    Stdout,
}

#[allow(clippy::struct_excessive_bools)]
struct Cli {
    input: Vec<PathBuf>,
    output: OutputTarget,
    concat: bool,
    show_thoughts: bool,
    show_timestamps: bool,
    heading_offset: u8,
    debug: bool,
    quiet: bool,
    dry_run: bool,
    force: bool,
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to parse arguments: {source}"))]
    ParseArgs { source: lexopt::Error },

    #[snafu(display("at least one input file or directory is required"))]
    NoInputFiles,

    #[snafu(display("cannot output multiple files to stdout without --concat"))]
    MultipleFilesToStdout,

    #[snafu(display("failed to create output directory: {source}"))]
    CreateOutputDir { source: std::io::Error },

    #[snafu(display("failed to read standard input: {source}"))]
    ReadStdin { source: std::io::Error },

    #[snafu(display("failed to read {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse {}: {source}", path.display()))]
    ParseFile {
        path: PathBuf,
        source: parser::ParseError,
    },

    #[snafu(display("failed to write {}: {source}", path.display()))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn print_help() {
    println!(
        "\
{name} {version}
Convert ChatGPT conversation exports to Markdown

Usage: {name} [OPTIONS] <INPUT>...

Arguments:
  <INPUT>...  Input JSON files or directories containing exports; - for stdin

Options:
  -o, --output <OUTPUT>     Output directory (or file with --concat, or - for stdout)
                            Default: stdout
      --concat              Combine all inputs into a single output
      --heading-offset <N>  Shift heading levels by N (0-5, default: 0)

Content display (use --show-* or --hide-*):
      --show-thoughts       Include reasoning messages (default: on)
      --hide-thoughts       Hide reasoning messages
      --show-timestamps     Include timestamps (default: off)
      --hide-timestamps     Hide timestamps

Other options:
  -d, --debug               Print format detection and message summary to stderr
  -q, --quiet               Suppress progress messages
  -n, --dry-run             Show what would be processed without writing
  -f, --force               Overwrite existing output files
  -h, --help                Print help
  -V, --version             Print version",
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
    );
}

fn parse_args() -> Result<Cli, lexopt::Error> {
    if std::env::args().len() == 1 {
        print_help();
        std::process::exit(0);
    }

    let mut cli = Cli {
        input: Vec::new(),
        output: OutputTarget::Stdout,
        concat: false,
        show_thoughts: true,
        show_timestamps: false,
        heading_offset: 0,
        debug: false,
        quiet: false,
        dry_run: false,
        force: false,
    };

    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Short('o') | Long("output") => {
                let val: PathBuf = parser.value()?.parse()?;
                cli.output = if val == Path::new("-") {
                    OutputTarget::Stdout
                } else {
                    OutputTarget::Path(val)
                };
            }
            Long("concat") => cli.concat = true,
            // Last show/hide flag wins.
            Long("show-thoughts") => cli.show_thoughts = true,
            Long("hide-thoughts") => cli.show_thoughts = false,
            Long("show-timestamps") => cli.show_timestamps = true,
            Long("hide-timestamps") => cli.show_timestamps = false,
            Long("heading-offset") => {
                let val: u8 = parser
                    .value()?
                    .parse()
                    .map_err(|_| "heading-offset must be a number 0-5")?;
                if val > 5 {
                    return Err("heading-offset must be 0-5".into());
                }
                cli.heading_offset = val;
            }
            Short('d') | Long("debug") => cli.debug = true,
            Short('q') | Long("quiet") => cli.quiet = true,
            Short('n') | Long("dry-run") => cli.dry_run = true,
            Short('f') | Long("force") => cli.force = true,
            Short('h') | Long("help") => {
                print_help();
                std::process::exit(0);
            }
            Short('V') | Long("version") => {
                println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            Value(val) => cli.input.push(val.parse()?),
            _ => return Err(arg.unexpected()),
        }
    }

    Ok(cli)
}

fn main() -> Result<(), Error> {
    let cli = parse_args().context(ParseArgsSnafu)?;

    ensure!(!cli.input.is_empty(), NoInputFilesSnafu);

    let files = collect_input_files(&cli.input);

    if cli.concat {
        return process_concat(&files, &cli);
    }

    match &cli.output {
        OutputTarget::Stdout => {
            // One input only: interleaving several documents on stdout
            // without --concat would be ambiguous.
            ensure!(files.len() == 1, MultipleFilesToStdoutSnafu);
            process_to_stdout(&files[0], &cli)
        }
        OutputTarget::Path(dir) => {
            if !cli.dry_run {
                std::fs::create_dir_all(dir).context(CreateOutputDirSnafu)?;
            }
            files.iter().try_for_each(|file| process_file(file, dir, &cli))
        }
    }
}

/// Expands the positional inputs into a flat file list: directories are
/// walked for `*.json`, a literal `-` is kept and read from stdin later.
fn collect_input_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let found = WalkDir::new(input)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
                .map(|entry| entry.into_path());
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    files
}

#[allow(clippy::missing_const_for_fn)]
fn render_options(cli: &Cli) -> renderer::RenderOptions {
    renderer::RenderOptions {
        show_thoughts: cli.show_thoughts,
        show_timestamps: cli.show_timestamps,
        heading_offset: cli.heading_offset,
    }
}

/// Reads one input, treating `-` as stdin.
fn read_input(path: &Path) -> Result<String, Error> {
    if path == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context(ReadStdinSnafu)?;
        Ok(raw)
    } else {
        std::fs::read_to_string(path).context(ReadFileSnafu { path })
    }
}

/// Reads and parses one input, printing the debug summary when enabled.
fn load_conversation(path: &Path, cli: &Cli) -> Result<parser::Conversation, Error> {
    let json = read_input(path)?;
    let conversation = parser::parse_conversation(&json).context(ParseFileSnafu { path })?;
    if cli.debug {
        debug_summary(path, &conversation);
    }
    Ok(conversation)
}

fn debug_summary(path: &Path, conversation: &parser::Conversation) {
    eprintln!(
        "{}: detected {} with {} messages",
        path.display(),
        conversation.format.describe(),
        conversation.messages.len()
    );
    for (i, message) in conversation.messages.iter().take(5).enumerate() {
        eprintln!(
            "  {}: {} ({})",
            i + 1,
            message.role.heading(),
            message.content.kind_name()
        );
    }
    if conversation.messages.len() > 5 {
        eprintln!("  ... and {} more", conversation.messages.len() - 5);
    }
}

fn process_to_stdout(input: &Path, cli: &Cli) -> Result<(), Error> {
    if cli.dry_run {
        eprintln!("Would output {}", input.display());
        return Ok(());
    }

    let conversation = load_conversation(input, cli)?;
    let markdown = renderer::render_conversation(&conversation, &render_options(cli));

    print!("{markdown}");
    Ok(())
}

/// Renders every input and joins the documents with a thematic break.
fn process_concat(files: &[PathBuf], cli: &Cli) -> Result<(), Error> {
    if cli.dry_run {
        match &cli.output {
            OutputTarget::Stdout => {
                eprintln!("Would output {} files concatenated", files.len());
            }
            OutputTarget::Path(path) => {
                eprintln!(
                    "Would write {} ({} files concatenated)",
                    path.display(),
                    files.len()
                );
            }
        }
        return Ok(());
    }

    let opts = render_options(cli);
    let documents = files
        .iter()
        .map(|path| {
            load_conversation(path, cli)
                .map(|conversation| renderer::render_conversation(&conversation, &opts))
        })
        .collect::<Result<Vec<String>, Error>>()?;
    let combined = documents.join("\n---\n\n");

    match &cli.output {
        OutputTarget::Stdout => print!("{combined}"),
        OutputTarget::Path(path) => {
            if path.exists() && !cli.force {
                eprintln!(
                    "Skipping {} (already exists, use --force to overwrite)",
                    path.display()
                );
                return Ok(());
            }
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).context(CreateOutputDirSnafu)?;
            }
            std::fs::write(path, &combined).context(WriteFileSnafu { path })?;
            if !cli.quiet {
                eprintln!("Wrote {} ({} files)", path.display(), files.len());
            }
        }
    }

    Ok(())
}

/// Converts one input into `<out_dir>/<stem>.md`.
fn process_file(input: &Path, out_dir: &Path, cli: &Cli) -> Result<(), Error> {
    let out_name = input
        .file_stem()
        .map_or_else(|| "conversation".into(), |stem| stem.to_string_lossy());
    let out_path = out_dir.join(format!("{out_name}.md"));

    if cli.dry_run {
        eprintln!("Would write {}", out_path.display());
        return Ok(());
    }
    if out_path.exists() && !cli.force {
        eprintln!(
            "Skipping {} (already exists, use --force to overwrite)",
            out_path.display()
        );
        return Ok(());
    }

    let conversation = load_conversation(input, cli)?;
    let markdown = renderer::render_conversation(&conversation, &render_options(cli));

    std::fs::write(&out_path, &markdown).context(WriteFileSnafu { path: &out_path })?;

    if !cli.quiet {
        eprintln!("Wrote {}", out_path.display());
    }
    Ok(())
}
