//! Kaleido compiler CLI

use clap::{ArgAction, Parser, Subcommand};
use kaleido_error::{DiagnosticRenderer, Diagnostics, SourceCache};
use kaleido_ir::interp::{Machine, MachineOptions};
use kaleido_ir::{compile, verify_module, Echo, LowerOptions, Module};
use kaleido_lexer::{Lexer, Token, TokenKind};
use kaleido_parser::{parse, Ast};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, info, Level};

#[derive(Parser)]
#[command(name = "kaleido")]
#[command(version)]
#[command(about = "Kaleido language compiler", long_about = None)]
struct Cli {
    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Do not echo declarations as they are lowered
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Shows file tokens (debug)
    Lex {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Shows file AST (debug)
    Parse {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Lowers a file and prints its IR module
    Ir {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Lowers a file and evaluates one of its functions
    Run {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Function to call
        #[arg(long, default_value = "main")]
        entry: String,

        /// Arguments passed to the entry function
        #[arg(value_name = "ARGS", allow_hyphen_values = true)]
        args: Vec<f64>,

        /// Instruction budget for the evaluator
        #[arg(long)]
        max_steps: Option<u64>,
    },

    /// Checks for errors without printing the IR
    Check {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Declarations are echoed to stderr unless `quiet`
fn lower_options(module_name: String, quiet: bool) -> LowerOptions {
    LowerOptions {
        module_name,
        echo: if quiet { Echo::Silent } else { Echo::Stderr },
    }
}

/// One input file and its rendered diagnostics
struct Session {
    cache: SourceCache,
    file_id: u32,
}

impl Session {
    fn open(path: &Path) -> Self {
        let mut cache = SourceCache::new();
        match cache.load(path) {
            Ok(file_id) => Self { cache, file_id },
            Err(e) => {
                eprintln!("Error reading file: {}", e);
                process::exit(1);
            }
        }
    }

    fn source(&self) -> &str {
        self.cache
            .get(self.file_id)
            .map(|file| file.source.as_str())
            .unwrap_or_default()
    }

    /// Prints `diagnostics`; exits if any of them is an error
    fn report(&self, stage: &str, diagnostics: &Diagnostics) {
        if diagnostics.is_empty() {
            return;
        }
        let renderer = DiagnosticRenderer::new(&self.cache);
        eprint!("{}", diagnostics.render(&renderer));
        if diagnostics.has_errors() {
            eprintln!(
                "\n{}: {} error(s) found",
                stage,
                diagnostics.error_count()
            );
            process::exit(1);
        }
    }

    fn tokens(&self) -> Vec<Token> {
        let mut lexer = Lexer::new(self.source(), self.file_id);
        let tokens = lexer.tokenize();
        self.report("Lexer", &lexer.take_diagnostics());
        debug!(count = tokens.len(), "tokenized");
        tokens
    }

    fn ast(&self) -> Ast {
        let (ast, diagnostics) = parse(self.tokens());
        self.report("Parser", &diagnostics);
        ast
    }

    fn lower(&self, quiet: bool) -> Module {
        let ast = self.ast();
        let module_name = self
            .cache
            .get(self.file_id)
            .map(|file| file.name.clone())
            .unwrap_or_default();
        let options = lower_options(module_name, quiet);
        let (module, diagnostics) = compile(&ast, &options);
        self.report("IR generation", &diagnostics);
        info!(
            functions = module.functions.len(),
            globals = module.globals.len(),
            "lowered module"
        );
        module
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Lex { input } => {
            let session = Session::open(&input);
            let tokens = session.tokens();
            for token in &tokens {
                let display = match &token.kind {
                    TokenKind::Eof => "EOF".to_string(),
                    kind => kind.to_string(),
                };
                println!(
                    "  {:4}:{:<3}  {}",
                    token.span.start.line, token.span.start.column, display
                );
            }
            println!("\nTotal: {} tokens", tokens.len());
        }

        Commands::Parse { input } => {
            let session = Session::open(&input);
            let ast = session.ast();
            let items = match &ast {
                Ast::Sequence(items) => items.as_slice(),
                other => std::slice::from_ref(other),
            };
            for (i, item) in items.iter().enumerate() {
                println!("{}. {}", i + 1, item);
            }
        }

        Commands::Ir { input, output } => {
            let session = Session::open(&input);
            let module = session.lower(cli.quiet);
            let text = module.to_string();
            match output {
                Some(path) => {
                    if let Err(e) = fs::write(&path, &text) {
                        eprintln!("Error writing {}: {}", path.display(), e);
                        process::exit(1);
                    }
                    println!("IR written to {}", path.display());
                }
                None => print!("{}", text),
            }
        }

        Commands::Run {
            input,
            entry,
            args,
            max_steps,
        } => {
            let session = Session::open(&input);
            let module = session.lower(cli.quiet);
            let mut options = MachineOptions::default();
            if let Some(max_steps) = max_steps {
                options.max_steps = max_steps;
            }

            let mut machine = Machine::with_options(&module, options);
            let result = machine.call(&entry, &args);
            print!("{}", machine.take_output());
            match result {
                Ok(value) => println!("{}", value),
                Err(e) => {
                    eprintln!("error: {}", e);
                    process::exit(1);
                }
            }
        }

        Commands::Check { input } => {
            let session = Session::open(&input);
            let module = session.lower(cli.quiet);
            let failures = verify_module(&module);
            for (name, error) in &failures {
                eprintln!("error: `{}`: {}", name, error);
            }
            if !failures.is_empty() {
                process::exit(1);
            }
            println!(
                "No errors found: {} function(s), {} global(s)",
                module.functions.len(),
                module.globals.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_applies_to_ir() {
        let cli = Cli::try_parse_from(["kaleido", "ir", "prog.k", "--quiet"]).unwrap();
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Ir { .. }));
        assert!(matches!(
            lower_options("prog.k".into(), cli.quiet).echo,
            Echo::Silent
        ));

        let cli = Cli::try_parse_from(["kaleido", "ir", "prog.k"]).unwrap();
        assert!(!cli.quiet);
        assert!(matches!(
            lower_options("prog.k".into(), cli.quiet).echo,
            Echo::Stderr
        ));
    }
}
