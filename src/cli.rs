// Command-line interface for oximerge.
//
// Subcommands:
//   merge  -p 1.vcdiff -p 2.vcdiff [3.vcdiff] merged.vcdiff
//   apply  -s source delta.vcdiff output
//   print  delta.vcdiff
//
// `merge` composes the patches through the whole-state engine; no
// intermediate version of the file is ever reconstructed.

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use log::debug;

use crate::io::{apply_file, merge_files, read_delta_file};
use crate::vcdiff::decoder::DeltaReader;
use crate::whole::{self, EncodeOptions, InstKind, RefFrame, WholeState};

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024u64),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1u64),
    };
    let num: u64 = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// VCDIFF delta merger: compose patch chains without applying them.
#[derive(Parser, Debug)]
#[command(
    name = "oximerge",
    version,
    about = "VCDIFF delta merger",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Merge a chain of VCDIFF patches into one.
    Merge(MergeArgs),
    /// Apply a VCDIFF delta to a source file.
    Apply(ApplyArgs),
    /// Print a delta's windows and instructions.
    Print(PrintArgs),
}

#[derive(Args, Debug)]
struct MergeArgs {
    /// Patch input files, in application order (repeat per patch).
    #[arg(long = "patch", short = 'p', value_name = "PATCH", value_hint = ValueHint::FilePath, action = ArgAction::Append)]
    patches: Vec<PathBuf>,

    /// Last patch input file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    last_patch: Option<PathBuf>,

    /// Output file.
    #[arg(value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Write the merged delta to stdout.
    #[arg(short = 'c', long, conflicts_with = "output")]
    stdout: bool,

    /// Maximum target window size (accepts K/M/G suffixes).
    #[arg(short = 'W', long = "window-size", value_parser = parse_byte_size)]
    window_size: Option<u64>,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Source file the delta was made against.
    #[arg(long, short = 's', value_hint = ValueHint::FilePath)]
    source: Option<PathBuf>,

    /// Delta file to apply.
    #[arg(value_hint = ValueHint::FilePath)]
    delta: PathBuf,

    /// Output file.
    #[arg(value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Write the reconstructed target to stdout.
    #[arg(short = 'c', long, conflicts_with = "output")]
    stdout: bool,
}

#[derive(Args, Debug)]
struct PrintArgs {
    /// Delta file to inspect.
    #[arg(value_hint = ValueHint::FilePath)]
    delta: PathBuf,
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

struct Flags {
    force: bool,
    quiet: bool,
    verbose: u8,
}

fn check_overwrite(path: &Path, force: bool) -> Result<(), String> {
    if path.exists() && !force {
        return Err(format!(
            "output file exists, use -f to overwrite: {}",
            path.display()
        ));
    }
    Ok(())
}

fn write_stdout(data: &[u8]) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    out.write_all(data)?;
    out.flush()
}

// ---------------------------------------------------------------------------
// Merge command
// ---------------------------------------------------------------------------

fn cmd_merge(args: &MergeArgs, flags: &Flags) -> i32 {
    let mut patches = args.patches.clone();
    if let Some(ref last) = args.last_patch {
        patches.push(last.clone());
    }

    if patches.len() < 2 {
        eprintln!("oximerge: merge requires at least 2 patches (-p file1 ... fileN)");
        return 1;
    }

    let mut opts = EncodeOptions::default();
    if let Some(w) = args.window_size {
        opts.window_size = w as usize;
    }

    if args.stdout {
        // Fold the chain in memory and stream the result out.
        let mut current = match read_delta_file(&patches[0]) {
            Ok(w) => w,
            Err(e) => {
                eprintln!("oximerge: merge: {}: {e}", patches[0].display());
                return 1;
            }
        };
        for patch in &patches[1..] {
            let input = match read_delta_file(patch) {
                Ok(w) => w,
                Err(e) => {
                    eprintln!("oximerge: merge: {}: {e}", patch.display());
                    return 1;
                }
            };
            debug!(
                "merging {} ({} instructions) over {} accumulated",
                patch.display(),
                input.instructions().len(),
                current.instructions().len()
            );
            current = match crate::merge::merge(&current, &input) {
                Ok(w) => w,
                Err(e) => {
                    eprintln!("oximerge: merge: {}: {e}", patch.display());
                    return 1;
                }
            };
        }

        let mut encoded = Vec::new();
        if let Err(e) = whole::encode_whole(&current, &mut encoded, &opts) {
            eprintln!("oximerge: merge: encode: {e}");
            return 1;
        }
        if let Err(e) = write_stdout(&encoded) {
            eprintln!("oximerge: merge: write: {e}");
            return 1;
        }
        return 0;
    }

    let Some(ref output) = args.output else {
        eprintln!("oximerge: merge requires an output file (or -c for stdout)");
        return 1;
    };
    if let Err(msg) = check_overwrite(output, flags.force) {
        eprintln!("oximerge: {msg}");
        return 1;
    }

    match merge_files(&patches, output, &opts) {
        Ok(stats) => {
            if flags.verbose > 0 && !flags.quiet {
                eprintln!(
                    "oximerge: merge: {} patches -> {} bytes of delta \
                     ({} instructions, {} windows, target {} bytes)",
                    stats.patches,
                    stats.delta_size,
                    stats.instructions,
                    stats.windows,
                    stats.target_length
                );
            }
            0
        }
        Err(e) => {
            eprintln!("oximerge: merge: {e}");
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Apply command
// ---------------------------------------------------------------------------

fn cmd_apply(args: &ApplyArgs, flags: &Flags) -> i32 {
    if args.stdout || args.source.is_none() {
        // In-memory path: optional source, arbitrary output sink.
        let source = match args.source {
            Some(ref path) => match std::fs::read(path) {
                Ok(data) => data,
                Err(e) => {
                    eprintln!("oximerge: apply: {}: {e}", path.display());
                    return 1;
                }
            },
            None => Vec::new(),
        };
        let whole = match read_delta_file(&args.delta) {
            Ok(w) => w,
            Err(e) => {
                eprintln!("oximerge: apply: {}: {e}", args.delta.display());
                return 1;
            }
        };
        let target = match whole::apply(&whole, &source) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("oximerge: apply: {e}");
                return 1;
            }
        };

        let result = match args.output {
            Some(ref path) => {
                if let Err(msg) = check_overwrite(path, flags.force) {
                    eprintln!("oximerge: {msg}");
                    return 1;
                }
                std::fs::write(path, &target).map_err(io::Error::from)
            }
            None => write_stdout(&target),
        };
        if let Err(e) = result {
            eprintln!("oximerge: apply: write: {e}");
            return 1;
        }
        return 0;
    }

    let Some(ref output) = args.output else {
        eprintln!("oximerge: apply requires an output file (or -c for stdout)");
        return 1;
    };
    if let Err(msg) = check_overwrite(output, flags.force) {
        eprintln!("oximerge: {msg}");
        return 1;
    }

    let source = args.source.as_ref().unwrap();
    match apply_file(source, &args.delta, output) {
        Ok(stats) => {
            if flags.verbose > 0 && !flags.quiet {
                eprintln!(
                    "oximerge: apply: {} delta bytes + {} source bytes -> {} bytes",
                    stats.delta_size, stats.source_size, stats.output_size
                );
            }
            0
        }
        Err(e) => {
            eprintln!("oximerge: apply: {e}");
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Print command
// ---------------------------------------------------------------------------

fn cmd_print(args: &PrintArgs, flags: &Flags) -> i32 {
    let file = match File::open(&args.delta) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("oximerge: print: {}: {e}", args.delta.display());
            return 1;
        }
    };
    let mut reader = DeltaReader::new(BufReader::new(file));

    match reader.file_header() {
        Ok(hdr) => {
            println!("VCDIFF header: indicator {:#04X}", hdr.hdr_ind);
            if let Some(ref app) = hdr.app_header {
                println!("  app header: {} bytes", app.len());
            }
        }
        Err(e) => {
            eprintln!("oximerge: print: {}: {e}", args.delta.display());
            return 1;
        }
    }

    let mut whole = WholeState::new();
    loop {
        let header = match reader.next_window() {
            Ok(Some(h)) => h,
            Ok(None) => break,
            Err(e) => {
                eprintln!("oximerge: print: window {}: {e}", reader.windows_read() + 1);
                return 1;
            }
        };
        println!(
            "window {}: indicator {:#04X} copy [{}, +{}) target {} \
             sections data/inst/addr {}/{}/{}{}",
            reader.windows_read(),
            header.win_ind,
            header.copy_window_offset,
            header.copy_window_len,
            header.target_window_len,
            header.data_len,
            header.inst_len,
            header.addr_len,
            if header.adler32.is_some() {
                " adler32"
            } else {
                ""
            }
        );
        if let Err(e) = whole::append_window(&mut whole, &header, reader.sections()) {
            eprintln!("oximerge: print: window {}: {e}", reader.windows_read());
            return 1;
        }
    }

    println!(
        "whole delta: {} bytes of target, {} instructions, {} literal bytes",
        whole.length(),
        whole.instructions().len(),
        whole.literals().len()
    );

    if flags.verbose > 0 {
        for inst in whole.instructions() {
            match inst.kind {
                InstKind::Run { addr } => println!(
                    "  {:>10}  RUN  {:>8} byte {:#04X}",
                    inst.position,
                    inst.size,
                    whole.literals()[addr]
                ),
                InstKind::Add { .. } => {
                    println!("  {:>10}  ADD  {:>8}", inst.position, inst.size)
                }
                InstKind::Copy { addr, frame } => {
                    let frame = match frame {
                        RefFrame::Source => "SRC",
                        RefFrame::Target => "TGT",
                        RefFrame::Output => "OUT",
                    };
                    println!(
                        "  {:>10}  CPY  {:>8} {frame} @ {addr}",
                        inst.position, inst.size
                    )
                }
            }
        }
    }

    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point.  Parses arguments via clap, dispatches, exits.
pub fn run() -> ! {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let cli = Cli::parse();
    let flags = Flags {
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let exit_code = match cli.command {
        Cmd::Merge(ref args) => cmd_merge(args, &flags),
        Cmd::Apply(ref args) => cmd_apply(args, &flags),
        Cmd::Print(ref args) => cmd_print(args, &flags),
    };

    // Make sure diagnostics land before the process dies.
    let _ = io::stderr().flush();
    process::exit(exit_code);
}
