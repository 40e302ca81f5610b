use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use oak_common::ast::Program;
use oak_common::logging::init_tracing;
use oak_common::manifest::{self, MANIFEST_FILE};
use oak_common::report::print_diagnostic;
use oak_runtime::Interpreter;
use tracing::debug;

/// Oak evaluator: runs a syntax tree directly.
#[derive(Parser)]
#[command(
    name = "oak",
    version,
    about,
    long_about = "Oak evaluator.\n\nRuns an Oak syntax tree (JSON) with the tree-walking evaluator, printing\nprogram output to stdout and diagnostics to stderr.\n\nExamples:\n  oak run program.json                     Run a program\n  oak run program.json --source main.oak   Show diagnostics against the source\n  oak run program.json --abort-on-error    Stop at the first failing statement\n  oak init my-project                      Create a new Oak project"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Evaluate a syntax tree
    Run {
        /// Path to the JSON syntax tree
        input: PathBuf,

        /// Source file the tree was parsed from, used to render diagnostics
        #[arg(long)]
        source: Option<PathBuf>,

        /// Stop at the first failing top-level statement
        #[arg(long = "abort-on-error")]
        abort_on_error: bool,

        /// Print the global bindings after the run
        #[arg(long)]
        debug: bool,

        /// Suppress program output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Create a new Oak project
    Init {
        /// Project name or '.' for current directory
        name: String,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            input,
            source,
            abort_on_error,
            debug,
            quiet,
        } => run(&input, source.as_deref(), abort_on_error, debug, quiet),
        Command::Init { name } => {
            if let Err(msg) = run_init(&name) {
                eprintln!("{}", msg);
                process::exit(1);
            }
        }
    }
}

// ============================================================================
// oak run
// ============================================================================

fn run(input: &Path, source: Option<&Path>, abort_on_error: bool, debug: bool, quiet: bool) {
    let program = match load_program(input) {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("{}", msg);
            process::exit(1);
        }
    };

    let abs_input = fs::canonicalize(input).unwrap_or_else(|_| input.to_path_buf());
    let mut config = match manifest::find_and_load_manifest(&abs_input) {
        Ok(m) => m.evaluator,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    config.abort_on_error |= abort_on_error;
    debug!(?config, input = %input.display(), "evaluating");

    let mut interpreter = Interpreter::with_config(config);
    if !quiet {
        interpreter.set_print_handler(|line| println!("{}", line));
    }
    let evaluation = interpreter.run(&program);

    let (text, file_name) = read_source(source, input);
    for diag in &evaluation.diagnostics {
        print_diagnostic(diag, text.as_deref(), &file_name);
    }

    if debug {
        eprintln!("globals:");
        for (name, binding) in interpreter.environment().globals() {
            eprintln!("  {}: {} = {}", name, binding.kind, binding.value);
        }
    }

    if evaluation.has_errors() {
        process::exit(1);
    }
}

fn load_program(input: &Path) -> Result<Program, String> {
    let json = fs::read_to_string(input)
        .map_err(|e| format!("error: could not read '{}': {}", input.display(), e))?;
    serde_json::from_str(&json)
        .map_err(|e| format!("error: invalid syntax tree in '{}': {}", input.display(), e))
}

/// The source text for diagnostics, when a readable source file was given.
fn read_source(source: Option<&Path>, input: &Path) -> (Option<String>, String) {
    let path = source.unwrap_or(input);
    let file_name = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    (source.and_then(|p| fs::read_to_string(p).ok()), file_name)
}

// ============================================================================
// oak init
// ============================================================================

fn run_init(name: &str) -> Result<(), String> {
    let (project_dir, project_name) = if name == "." {
        let cwd = std::env::current_dir()
            .map_err(|e| format!("error: cannot determine current directory: {}", e))?;
        let dir_name = cwd
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        (cwd, dir_name)
    } else {
        (PathBuf::from(name), name.to_string())
    };

    if project_dir.join(MANIFEST_FILE).exists() {
        return Err(format!(
            "error: Oak project already exists in this directory\n  = help: remove {} to reinitialize, or use a different directory",
            MANIFEST_FILE
        ));
    }

    if name != "." {
        fs::create_dir_all(&project_dir)
            .map_err(|e| format!("error: failed to create directory '{}': {}", name, e))?;
    }

    write_file(&project_dir.join(MANIFEST_FILE), &generate_toml(&project_name))?;
    write_file(&project_dir.join(".gitignore"), "# Generated assembly\n*.s\n")?;

    println!("Created Oak project \"{}\"", project_name);
    println!("  {}", MANIFEST_FILE);
    println!("  .gitignore");
    println!();
    println!("Get started:");
    if name != "." {
        println!("  cd {}", name);
    }
    println!("  oak run program.json");
    println!("  oakc program.json -o program.s");

    Ok(())
}

fn write_file(path: &Path, content: &str) -> Result<(), String> {
    fs::write(path, content)
        .map_err(|e| format!("error: failed to write '{}': {}", path.display(), e))
}

fn generate_toml(project_name: &str) -> String {
    format!(
        "[project]\nname = \"{}\"\n\n[generator]\ncomments = true\nunroll_limit = 16\n\n[evaluator]\nabort_on_error = false\nmax_call_depth = 256\nmax_array_length = 16777216\n",
        project_name
    )
}
