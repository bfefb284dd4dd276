use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use fuzzy_gen::eval::{EvalError, Outcome};
use fuzzy_gen::{Emit, Generator, GoalKind, Script, ScriptConfig};
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod run;
use crate::run::run;

const PRIMARY: &str = "_primary.c";

#[derive(Copy, Clone, Debug, ValueEnum)]
enum GoalArg {
    Assign,
    Return,
}

impl From<GoalArg> for GoalKind {
    fn from(goal: GoalArg) -> Self {
        match goal {
            GoalArg::Assign => GoalKind::Assign,
            GoalArg::Return => GoalKind::Return,
        }
    }
}

/// Generate a C program with a fixed outcome plus reordered variants of it
#[derive(Parser, Debug)]
#[command(name = "fuzzy-gen")]
struct Args {
    /// Directory receiving `_primary.c` and the numbered variants
    out: PathBuf,

    /// Seed for the random stream; drawn at random when absent
    #[arg(short, long)]
    seed: Option<u64>,
    /// Path to .toml configuration for the generator
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Number of variants to write next to the primary program
    #[arg(short = 'n', long)]
    max_variants: Option<usize>,
    /// Shape of the preserved statement
    #[arg(short, long, value_enum)]
    goal: Option<GoalArg>,
    /// Run every program through the built-in evaluator
    #[arg(long)]
    check: bool,
    /// Compile and run every program with this C compiler
    #[arg(long, value_name = "PATH")]
    cc: Option<String>,
    /// Seconds allowed to each compile or run
    #[arg(short, long)]
    timeout: Option<u64>,
}

/// What was written for one seed
struct Corpus {
    primary: String,
    variants: Vec<PathBuf>,
    failures: usize,
    /// Programs the evaluator gave up on before they finished
    inconclusive: usize,
}

/// How the evaluator judged one program
#[derive(Debug, PartialEq)]
enum Verdict {
    Pass,
    Fail(String),
    /// Ran out of evaluation steps; says nothing about the program
    Inconclusive,
}

fn verdict(outcome: Result<Outcome, EvalError>) -> Verdict {
    match outcome {
        Ok(o) if o.passed() => Verdict::Pass,
        Ok(o) => Verdict::Fail(format!("{:?}", o)),
        Err(EvalError::StepLimit) => Verdict::Inconclusive,
        Err(e) => Verdict::Fail(e.to_string()),
    }
}

fn print_diff(old: &str, new: &str) {
    let diff = TextDiff::from_lines(old, new);
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Delete => eprint!("{}", format!("-{}", change).red()),
            ChangeTag::Insert => eprint!("{}", format!("+{}", change).green()),
            ChangeTag::Equal => {}
        }
    }
    eprintln!();
}

fn report(path: &Path, ok: bool, detail: &str) {
    if ok {
        debug!(path = %path.display(), "ok");
    } else {
        eprintln!("{} {} {}", "FAIL".red().bold(), path.display(), detail);
    }
}

/// Report a verdict; returns `(failed, inconclusive)`
fn judge(path: &Path, verdict: &Verdict) -> (bool, bool) {
    match verdict {
        Verdict::Pass => {
            report(path, true, "");
            (false, false)
        }
        Verdict::Fail(detail) => {
            report(path, false, detail);
            (true, false)
        }
        Verdict::Inconclusive => {
            eprintln!("{} {} step limit exceeded", "SKIP".yellow().bold(), path.display());
            (false, true)
        }
    }
}

/// Write the primary program and its variants under `out`. With `check`,
/// every program is also run through the evaluator.
fn emit_corpus(out: &Path, config: &ScriptConfig, seed: u64, check: bool) -> Result<Corpus> {
    fs::create_dir_all(out).with_context(|| format!("unable to create {}", out.display()))?;

    let mut gen = Generator::new(config.obfuscation, seed)?;
    let mut script = Script::build(&mut gen, config);
    let primary = script.emit();
    let primary_path = out.join(PRIMARY);
    fs::write(&primary_path, &primary)
        .with_context(|| format!("unable to write {}", primary_path.display()))?;

    let mut failures = 0;
    let mut inconclusive = 0;
    if check {
        let (failed, skipped) = judge(&primary_path, &verdict(script.evaluate()));
        failures += usize::from(failed);
        inconclusive += usize::from(skipped);
    }

    let mut variants = Vec::new();
    let mut error = None;
    let result = script.variants(&mut gen, config.max_variants, |variant| {
        let path = out.join(format!("{}.c", variant.index));
        let text = variant.render();
        if let Err(e) = fs::write(&path, &text) {
            let context = format!("unable to write {}", path.display());
            error = Some(anyhow::Error::new(e).context(context));
            return true;
        }
        if check {
            let (failed, skipped) = judge(&path, &verdict(variant.evaluate()));
            inconclusive += usize::from(skipped);
            if failed {
                failures += 1;
                print_diff(&primary, &text);
            }
        }
        variants.push(path);
        false
    });
    if let Some(e) = error {
        return Err(e);
    }
    info!(?result, "variants written");

    Ok(Corpus {
        primary,
        variants,
        failures,
        inconclusive,
    })
}

/// Compile and run every file of `corpus`, returning the number of failures
fn compile_corpus(cli: &Args, cc: &str, corpus: &Corpus) -> Result<usize> {
    let mut failures = 0;
    let primary_path = cli.out.join(PRIMARY);
    for path in std::iter::once(&primary_path).chain(&corpus.variants) {
        let text = fs::read_to_string(path)
            .with_context(|| format!("unable to read {}", path.display()))?;
        let result = run(cc, &text, cli.timeout)?;
        let detail = if !result.compilation {
            "does not compile"
        } else if !result.termination {
            "timed out"
        } else {
            "assertion failed"
        };
        report(path, result.passed(), detail);
        if !result.passed() {
            failures += 1;
            eprint!("{}", result.output);
            print_diff(&corpus.primary, &text);
        }
    }
    Ok(failures)
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env("FUZZY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Args::parse();

    // parse config or take default
    let mut config = match &cli.config {
        Some(path) => ScriptConfig::from_toml_file(path)?,
        None => ScriptConfig::default(),
    };
    if let Some(goal) = cli.goal {
        config.goal = goal.into();
    }
    if let Some(n) = cli.max_variants {
        config.max_variants = n;
    }

    let seed = cli.seed.unwrap_or_else(rand::random::<u64>);
    eprintln!("{} {}", "seed".cyan().bold(), seed);

    let corpus = emit_corpus(&cli.out, &config, seed, cli.check)?;
    let mut failures = corpus.failures;
    if let Some(cc) = &cli.cc {
        failures += compile_corpus(&cli, cc, &corpus)?;
    }

    let total = corpus.variants.len() + 1;
    if corpus.inconclusive > 0 {
        eprintln!(
            "{} {} programs exceeded the evaluation step limit",
            "note".yellow().bold(),
            corpus.inconclusive
        );
    }
    if failures > 0 {
        anyhow::bail!("{} of {} programs failed", failures, total);
    }
    println!(
        "{} {} programs in {}",
        "wrote".green().bold(),
        total,
        cli.out.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuzzy_gen::ObfuscationConfig;

    fn config(max_variants: usize) -> ScriptConfig {
        ScriptConfig {
            max_variants,
            obfuscation: ObfuscationConfig {
                p_stop: 0.2,
                max_trips: 2,
                ..ObfuscationConfig::default()
            },
            ..ScriptConfig::default()
        }
    }

    #[test]
    fn corpus_files_are_numbered_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("corpus");
        let corpus = emit_corpus(&out, &config(5), 3, true).unwrap();
        assert_eq!(corpus.failures, 0);
        assert!(corpus.variants.len() <= 5);
        assert_eq!(fs::read_to_string(out.join(PRIMARY)).unwrap(), corpus.primary);
        for (i, path) in corpus.variants.iter().enumerate() {
            assert_eq!(path, &out.join(format!("{}.c", i)));
            assert_ne!(fs::read_to_string(path).unwrap(), corpus.primary);
        }
    }

    #[test]
    fn same_seed_same_corpus() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let ca = emit_corpus(a.path(), &config(4), 11, false).unwrap();
        let cb = emit_corpus(b.path(), &config(4), 11, false).unwrap();
        assert_eq!(ca.primary, cb.primary);
        assert_eq!(ca.variants.len(), cb.variants.len());
        for (pa, pb) in ca.variants.iter().zip(&cb.variants) {
            assert_eq!(fs::read_to_string(pa).unwrap(), fs::read_to_string(pb).unwrap());
        }
    }

    #[test]
    fn step_limit_is_inconclusive() {
        assert_eq!(verdict(Err(EvalError::StepLimit)), Verdict::Inconclusive);
        assert!(matches!(
            verdict(Err(EvalError::UnknownVariable("abc".into()))),
            Verdict::Fail(_)
        ));
        let failed = Outcome {
            exit: 0,
            assertions: 1,
            failed_assertions: 1,
        };
        assert!(matches!(verdict(Ok(failed)), Verdict::Fail(_)));
        let passed = Outcome {
            failed_assertions: 0,
            ..failed
        };
        assert_eq!(verdict(Ok(passed)), Verdict::Pass);
    }

    #[test]
    fn default_config_checks_never_fail() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScriptConfig {
            max_variants: 3,
            ..ScriptConfig::default()
        };
        for seed in 0..20 {
            let out = dir.path().join(seed.to_string());
            let corpus = emit_corpus(&out, &config, seed, true).unwrap();
            assert_eq!(corpus.failures, 0, "seed {}", seed);
        }
    }

    #[test]
    fn cli_overrides_parse() {
        let args = Args::parse_from([
            "fuzzy-gen", "out", "--seed", "7", "-n", "3", "--goal", "return", "--check",
        ]);
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.max_variants, Some(3));
        assert!(matches!(args.goal, Some(GoalArg::Return)));
        assert!(args.check);
        assert!(args.cc.is_none());
    }
}
