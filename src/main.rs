use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use schemin::config::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_OPERANDS};
use schemin::printer::print_val;
use schemin::reader::{self, Balance};
use schemin::{Interpreter, InterpreterConfig};

/// Evaluate Scheme source files, expressions, or an interactive session.
#[derive(Parser, Debug)]
#[command(name = "schemin", version, about)]
struct Args {
    /// Source files, evaluated in order before any -e expression
    files: Vec<PathBuf>,

    /// Evaluate EXPR and print each result (repeatable)
    #[arg(short = 'e', long = "eval", value_name = "EXPR")]
    exprs: Vec<String>,

    /// Maximum number of operands in a single application
    #[arg(long, default_value_t = DEFAULT_MAX_OPERANDS)]
    max_operands: usize,

    /// Maximum number of evaluations pending at once
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Log interpreter internals at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = InterpreterConfig {
        max_operands: args.max_operands,
        max_depth: args.max_depth,
        ..InterpreterConfig::default()
    };
    let mut interp = Interpreter::new(config).context("failed to initialise interpreter")?;

    for path in &args.files {
        load_file(&mut interp, path)?;
    }
    for expr in &args.exprs {
        eval_and_print(&mut interp, expr)
            .with_context(|| format!("while evaluating -e {}", expr))?;
    }
    if !args.files.is_empty() || !args.exprs.is_empty() {
        return Ok(());
    }

    if io::stdin().is_terminal() {
        println!("schemin {}", env!("CARGO_PKG_VERSION"));
        run_interactive(&mut interp)
    } else {
        run_piped(&mut interp)
    }
}

/// Evaluate every form in a file without printing. Stops at the first error.
fn load_file(interp: &mut Interpreter, path: &Path) -> Result<()> {
    let input = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;

    let start = Instant::now();
    let mut pos = 0;
    let mut count = 0;
    loop {
        let read = reader::read_one_at(&input, pos, &mut interp.store)
            .with_context(|| format!("{}: read error at byte {}", path.display(), pos))?;
        let Some((expr, next)) = read else {
            break;
        };
        pos = next;
        count += 1;
        interp
            .eval(expr)
            .with_context(|| format!("{}: error in expression {}", path.display(), count))?;
    }

    let stats = interp.stats();
    info!(
        path = %path.display(),
        expressions = count,
        elapsed_ms = start.elapsed().as_millis() as u64,
        conses = stats.conses,
        symbols = stats.symbols,
        "Loaded file"
    );
    Ok(())
}

/// Evaluate the forms in `input` one by one, printing each value.
/// An evaluation error is reported and evaluation moves on to the next form;
/// a read error ends the input.
fn eval_and_print(interp: &mut Interpreter, input: &str) -> Result<()> {
    let mut pos = 0;
    loop {
        match reader::read_one_at(input, pos, &mut interp.store) {
            Ok(Some((expr, next))) => {
                pos = next;
                match interp.eval(expr) {
                    Ok(value) => println!("{}", print_val(value, &interp.store)),
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Ok(None) => return Ok(()),
            Err(e) => bail!("read error at byte {}: {}", pos, e),
        }
    }
}

/// Interactive REPL: accumulate lines until parens are balanced.
fn run_interactive(interp: &mut Interpreter) -> Result<()> {
    let stdin = io::stdin();
    let mut buf = String::new();

    loop {
        print!("{}", if buf.is_empty() { "> " } else { "  " });
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        buf.push_str(&line);

        match reader::check_balance(&buf) {
            Balance::Incomplete => continue,
            Balance::Unbalanced => eprintln!("Read error: unexpected ')'"),
            Balance::Complete => {
                if let Err(e) = eval_and_print(interp, buf.trim()) {
                    eprintln!("{}", e);
                }
            }
        }
        buf.clear();
    }
}

/// Piped mode: read all input, then parse and evaluate one form at a time.
fn run_piped(interp: &mut Interpreter) -> Result<()> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("failed to read standard input")?;
    debug!(bytes = input.len(), "Evaluating piped input");
    eval_and_print(interp, &input)
}
