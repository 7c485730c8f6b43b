//! The `t3make` command line.

use clap::Parser as ClapParser;
use std::fs;
use std::path::PathBuf;

use crate::compile::{compile_file, CompilerOptions};
use crate::objfile::loader::Linker;

#[derive(ClapParser)]
#[command(name = "t3make")]
#[command(about = "TADS 3 compiler", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Source files to compile (one translation unit each)
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,

    /// Include path entries for the tokenizer
    #[arg(short = 'I', long = "include")]
    pub include: Vec<PathBuf>,

    /// Object-file output path (single-source compiles only; defaults to
    /// the source name with a .t3o extension)
    #[arg(short = 'o', long = "objfile")]
    pub objfile: Option<PathBuf>,

    /// Symbol (export) file output path
    #[arg(long = "symfile")]
    pub symfile: Option<PathBuf>,

    /// Image file: runs the link pass over the compiled objects; the
    /// image itself is written by the code-generation backend
    #[arg(long = "image")]
    pub image: Option<PathBuf>,

    /// Parse and report diagnostics only; write no output files
    #[arg(long = "syntax-only")]
    pub syntax_only: bool,

    /// Emit debug records
    #[arg(long = "debug")]
    pub debug: bool,

    /// Enable pedantic diagnostics
    #[arg(long = "pedantic")]
    pub pedantic: bool,

    /// Predefine a symbol: -D name or -D name=value
    #[arg(short = 'D', value_name = "NAME[=VALUE]")]
    pub defines: Vec<String>,

    /// Print a JSON summary of the global symbol table
    #[arg(long = "dump-symbols")]
    pub dump_symbols: bool,
}

fn parse_define(spec: &str) -> (String, String) {
    match spec.split_once('=') {
        Some((name, value)) => (name.to_string(), value.to_string()),
        None => (spec.to_string(), String::new()),
    }
}

/// Run the compiler over the command line; returns the process exit code
/// (0 clean, 1 errors, 2 fatal).
pub fn run_cli() -> i32 {
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> i32 {
    let defines: Vec<(String, String)> = cli.defines.iter().map(|d| parse_define(d)).collect();
    let mut exit = 0i32;
    let mut objects: Vec<Vec<u8>> = Vec::new();

    for source in &cli.sources {
        let options = CompilerOptions {
            syntax_only: cli.syntax_only,
            debug: cli.debug,
            pedantic: cli.pedantic,
            defines: defines.clone(),
        };
        let out = match compile_file(source, options, cli.dump_symbols) {
            Ok(out) => out,
            Err(e) => {
                eprintln!("t3make: cannot read {}: {}", source.display(), e);
                exit = exit.max(2);
                continue;
            }
        };
        eprint!("{}", out.diagnostics);
        if let Some(dump) = &out.symbol_dump {
            println!("{}", dump);
        }
        exit = exit.max(out.exit_code);

        if let Some(bytes) = out.object_file {
            let path = match (&cli.objfile, cli.sources.len()) {
                (Some(p), 1) => p.clone(),
                _ => source.with_extension("t3o"),
            };
            if let Err(e) = fs::write(&path, &bytes) {
                eprintln!("t3make: cannot write {}: {}", path.display(), e);
                exit = exit.max(2);
            }
            objects.push(bytes);
        }
        if let Some(bytes) = out.symbol_file {
            let path = match (&cli.symfile, cli.sources.len()) {
                (Some(p), 1) => p.clone(),
                _ => source.with_extension("t3s"),
            };
            if let Err(e) = fs::write(&path, &bytes) {
                eprintln!("t3make: cannot write {}: {}", path.display(), e);
                exit = exit.max(2);
            }
        }
    }

    if cli.image.is_some() && exit == 0 {
        let mut linker = Linker::new();
        for bytes in &objects {
            if let Err(e) = linker.load_module(bytes) {
                eprintln!("t3make: link failed: {}", e);
                exit = exit.max(2);
            }
        }
        if exit < 2 {
            linker.finish();
            for d in linker.log.diagnostics() {
                eprintln!("t3make: link: {}", d.message);
            }
            exit = exit.max(linker.log.exit_code());
        }
    }

    exit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_with_and_without_value() {
        assert_eq!(
            parse_define("LIMIT=64"),
            ("LIMIT".to_string(), "64".to_string())
        );
        assert_eq!(parse_define("DEBUG"), ("DEBUG".to_string(), String::new()));
    }

    #[test]
    fn cli_parses_typical_invocation() {
        let cli = Cli::try_parse_from([
            "t3make",
            "-I",
            "lib",
            "-D",
            "RELEASE=1",
            "--syntax-only",
            "game.t",
        ])
        .unwrap();
        assert_eq!(cli.sources.len(), 1);
        assert!(cli.syntax_only);
        assert_eq!(cli.defines, vec!["RELEASE=1".to_string()]);
        assert_eq!(cli.include.len(), 1);
    }
}
