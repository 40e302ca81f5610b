use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use oak_common::ast::Program;
use oak_common::logging::init_tracing;
use oak_common::manifest;
use oak_common::report::print_diagnostic;
use oak_compiler::CodeGenerator;
use tracing::debug;

/// Oak code generator.
///
/// Lowers an Oak syntax tree (JSON) to RISC-V assembly.
#[derive(Parser)]
#[command(
    name = "oakc",
    version,
    about,
    long_about = "Oak code generator.\n\nLowers an Oak syntax tree (JSON) to RV32IMF assembly for the RARS/SPIM\nsimulators.\n\nExamples:\n  oakc program.json                 Generate program.s\n  oakc program.json -o out.s        Generate to a custom output path\n  oakc program.json --check         Check for errors only\n  oakc program.json --emit-asm      Print the assembly to stdout"
)]
struct Cli {
    /// Input syntax tree (JSON).
    input: PathBuf,

    /// Output file path (default: <input>.s).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Source file the tree was parsed from, used to render diagnostics.
    #[arg(long)]
    source: Option<PathBuf>,

    /// Check for errors without writing assembly.
    #[arg(long)]
    check: bool,

    /// Suppress the summary line.
    #[arg(short, long)]
    quiet: bool,

    /// Leave `#` comments out of the generated code.
    #[arg(long = "no-comments")]
    no_comments: bool,

    /// Emit assembly to stdout instead of writing to file.
    #[arg(long = "emit-asm")]
    emit_asm: bool,

    /// Emit the syntax tree to stdout (debug).
    #[arg(long = "emit-ast")]
    emit_ast: bool,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let json = match fs::read_to_string(&cli.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: could not read '{}': {}", cli.input.display(), e);
            process::exit(1);
        }
    };
    let program: Program = match serde_json::from_str(&json) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: invalid syntax tree in '{}': {}", cli.input.display(), e);
            process::exit(1);
        }
    };

    if cli.emit_ast {
        println!("{:#?}", program);
        return;
    }

    // Oak.toml is optional; it is looked up from the input's directory.
    let abs_input = fs::canonicalize(&cli.input).unwrap_or_else(|_| cli.input.clone());
    let mut config = match manifest::find_and_load_manifest(&abs_input) {
        Ok(m) => m.generator,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    if cli.no_comments {
        config.comments = false;
    }
    debug!(?config, input = %cli.input.display(), "generating");

    let assembly = match CodeGenerator::with_config(config).generate(&program) {
        Ok(a) => a,
        Err(err) => {
            let path = cli.source.as_ref().unwrap_or(&cli.input);
            let file_name = path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            let source = cli.source.as_ref().and_then(|p| fs::read_to_string(p).ok());
            print_diagnostic(&err.to_diagnostic(), source.as_deref(), &file_name);
            process::exit(1);
        }
    };

    if cli.check {
        println!("No errors found.");
        return;
    }

    let text = assembly.to_string();
    if cli.emit_asm {
        print!("{}", text);
        return;
    }

    let output_path = cli.output.unwrap_or_else(|| {
        let mut p = cli.input.clone();
        p.set_extension("s");
        p
    });

    match fs::write(&output_path, &text) {
        Ok(()) => {
            if !cli.quiet {
                println!(
                    "Generated {} -> {} ({} instructions, {} runtime routines)",
                    cli.input.display(),
                    output_path.display(),
                    assembly.instructions.len(),
                    assembly.used_builtins.len()
                );
            }
        }
        Err(e) => {
            eprintln!("error: could not write '{}': {}", output_path.display(), e);
            process::exit(1);
        }
    }
}
