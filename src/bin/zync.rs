//! ZynLang 编译器命令行
//!
//! `zync build` 输出文本 LLVM IR，`zync check` 只报告诊断信息。

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use zynlang::error::ZynError;
use zynlang::{lexer, parser, CompileOptions, Compiler};

#[derive(Parser)]
#[command(name = "zync")]
#[command(version)]
#[command(about = "The ZynLang compiler", long_about = None)]
struct Cli {
    /// Print debug logs (overridden by ZYN_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file to LLVM IR
    Build {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file, defaults to the input with a .ll extension
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Target triple written into the module
        #[arg(long, value_name = "TRIPLE")]
        target: Option<String>,

        /// Additional module search directory
        #[arg(short = 'I', value_name = "DIR")]
        include: Vec<PathBuf>,

        /// Print tokens before compiling
        #[arg(long)]
        emit_tokens: bool,

        /// Print the parsed program before compiling
        #[arg(long)]
        emit_ast: bool,
    },

    /// Check a source file for errors without writing output
    Check {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Additional module search directory
        #[arg(short = 'I', value_name = "DIR")]
        include: Vec<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("ZYN_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn module_name(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_string())
}

/// 逐条打印诊断信息
fn report(err: &ZynError) {
    for diagnostic in err.clone().flatten() {
        eprintln!("error: {}", diagnostic);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build {
            input,
            output,
            target,
            include,
            emit_tokens,
            emit_ast,
        } => {
            let source = fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;

            if emit_tokens {
                println!("=== Tokens ===");
                for token in lexer::lex(&source) {
                    println!("{:>4}:{:<3} {}", token.loc.line, token.loc.column, token.token);
                }
            }
            if emit_ast {
                println!("=== AST ===");
                let (program, _) = parser::parse(&source);
                println!("{:#?}", program);
            }

            let output = output.unwrap_or_else(|| input.with_extension("ll"));
            let options = CompileOptions {
                module_name: module_name(&input),
                target_triple: target,
                search_paths: include,
            };
            let mut compiler = Compiler::new(options);
            if let Err(err) = compiler.compile_file(&input, &output) {
                report(&err);
                process::exit(1);
            }
            println!("Wrote {}", output.display());
        }
        Commands::Check { input, include } => {
            let source = fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let mut search_paths = vec![zynlang::loader::module_dir(&input)];
            search_paths.extend(include);
            let options = CompileOptions {
                module_name: module_name(&input),
                target_triple: None,
                search_paths,
            };
            match Compiler::new(options).compile_source(&source) {
                Ok(_) => println!("{}: no errors", input.display()),
                Err(err) => {
                    report(&err);
                    process::exit(1);
                }
            }
        }
    }
    Ok(())
}
