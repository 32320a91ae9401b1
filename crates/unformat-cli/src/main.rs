//! Command-line interface for unformat.

use std::process::ExitCode;

use clap::{ArgAction, Parser, error::ErrorKind};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use unformat::{
    BytecodeVersion, Decompiler, InjectionEngine, InjectionHarness, RawBytecodeDecompiler,
    SubprocessHarness, defaults,
};

/// Automatic traversal of format() injections: enumerate a vulnerable
/// service's object graph and recover its source.
#[derive(Debug, Parser)]
#[command(name = "unformat", version, about, max_term_width = 100)]
struct Args {
    /// The sigil in COMMAND that generated injection payloads are
    /// substituted for; exactly one token must contain it once.
    #[arg(short = 'i', long, default_value = defaults::DEFAULT_INJECTION_MARKER)]
    injection_marker: String,

    /// The format argument index that is injectable in the targeted
    /// format string.
    #[arg(short = 'd', long, default_value_t = 0)]
    injection_index: u32,

    /// Use this string in place of a random sentinel to surround payloads;
    /// only needed when the target has restrictive input filters.
    #[arg(short = 'm', long)]
    response_marker: Option<String>,

    /// Length of the randomly-generated alphanumeric response marker.
    #[arg(short = 'l', long, default_value_t = defaults::DEFAULT_RESPONSE_MARKER_LEN)]
    random_response_marker_length: usize,

    /// The bytecode version to use for function decompilation.
    #[arg(short = 'b', long = "bytecode_version", default_value = defaults::DEFAULT_BYTECODE_VERSION)]
    bytecode_version: String,

    /// Print each walker as it completes; twice to also print recovered
    /// source as it is found.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// The target command template; run once per injection.
    #[arg(
        required = true,
        value_name = "COMMAND",
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<String>,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprintln!("[!] error when argument-parsing - {err}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(args.verbose);

    let version: BytecodeVersion = match args.bytecode_version.parse() {
        Ok(version) => version,
        Err(err) => {
            eprintln!("[!] {err}");
            return ExitCode::FAILURE;
        }
    };
    let decompiler = RawBytecodeDecompiler;
    if !decompiler.supports(version) {
        eprintln!("[!] bytecode version {version} is not supported by the decompiler");
        return ExitCode::FAILURE;
    }

    let harness = match SubprocessHarness::new(
        args.command,
        args.injection_marker,
        args.response_marker,
        args.random_response_marker_length,
    ) {
        Ok(harness) => harness,
        Err(err) => {
            eprintln!("[!] {err}");
            return ExitCode::FAILURE;
        }
    };
    debug!(
        response_marker = harness.response_marker(),
        %version,
        "harness ready"
    );

    let engine = InjectionEngine::new(harness, decompiler, version);

    println!("[*] beginning enumeration of the target service...");
    for event in engine.run(args.injection_index) {
        if args.verbose >= 1 {
            if event.is_failure() {
                println!("[#] {event}");
            } else {
                println!("[*] {event}");
            }
        }
        if args.verbose >= 2 {
            if let Some(src) = event.src_code() {
                println!("{src}");
            }
        }
    }

    println!("[*] completed execution; see below for the data dump");
    print!("{}", engine.render_dump());

    ExitCode::SUCCESS
}
