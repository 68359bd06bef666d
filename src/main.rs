use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use func_patcher::config::{load_from_path, FixServiceConfig, RunConfig};
use func_patcher::edit::atomic_write;
use func_patcher::{
    apply, load_issues, ChatCompletionService, CommandFixService, DryRunSink, FixService, FsSink,
    FunctionLocator, FunctionQuery, GitSink, IssueRecord, IssueResult, PatchSink, Pipeline, RunReport,
    TypeKeywords, WorkspaceGuard,
};
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "func-patcher")]
#[command(about = "Locate reported C++ functions and patch in suggested fixes", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fix every issue in a report
    Run {
        /// Run configuration (defaults to $FUNC_PATCHER_CONFIG)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Issue report, overriding [issues].path
        #[arg(short, long)]
        issues: Option<PathBuf>,

        /// Repository root, overriding [repository].root
        #[arg(short, long)]
        repo: Option<PathBuf>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Write files but do not commit or push
        #[arg(long)]
        no_publish: bool,
    },

    /// Print the span of one function
    Locate {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short = 'F', long)]
        function: String,

        /// Additional return-type keyword (repeatable)
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,
    },

    /// Replace one function's text in a file
    Apply {
        #[arg(short, long)]
        file: PathBuf,

        /// File holding the current function text
        #[arg(short, long)]
        original: PathBuf,

        /// File holding the replacement text
        #[arg(short, long)]
        replacement: PathBuf,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Check that every reported function can be located
    Check {
        /// Run configuration (defaults to $FUNC_PATCHER_CONFIG)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Issue report, overriding [issues].path
        #[arg(short, long)]
        issues: Option<PathBuf>,

        /// Repository root, overriding [repository].root
        #[arg(short, long)]
        repo: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            issues,
            repo,
            dry_run,
            diff,
            no_publish,
        } => cmd_run(config, issues, repo, dry_run, diff, no_publish),

        Commands::Locate {
            file,
            function,
            keywords,
        } => cmd_locate(&file, &function, keywords),

        Commands::Apply {
            file,
            original,
            replacement,
            dry_run,
            diff,
        } => cmd_apply(&file, &original, &replacement, dry_run, diff),

        Commands::Check {
            config,
            issues,
            repo,
        } => cmd_check(config, issues, repo),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Resolve the run configuration path.
///
/// Priority order:
/// 1. Explicit --config flag
/// 2. FUNC_PATCHER_CONFIG environment variable
fn resolve_config(cli_config: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_config {
        return Ok(path);
    }

    if let Ok(env_path) = env::var("FUNC_PATCHER_CONFIG") {
        if !env_path.trim().is_empty() {
            return Ok(PathBuf::from(env_path));
        }
    }

    anyhow::bail!(
        "{}\n{}\n  {}\n  {}",
        "No run configuration given.".red(),
        "Try one of:".bold(),
        "1. Specify explicitly: func-patcher run --config run.toml",
        "2. Set environment variable: export FUNC_PATCHER_CONFIG=/path/to/run.toml"
    )
}

/// Load config and issue report, applying command-line overrides.
fn load_run(
    config: Option<PathBuf>,
    issues: Option<PathBuf>,
    repo: Option<PathBuf>,
) -> Result<(RunConfig, Vec<IssueRecord>, WorkspaceGuard)> {
    let config_path = resolve_config(config)?;
    let mut config = load_from_path(&config_path)?;
    if let Some(repo) = repo {
        config.repository.root = repo;
    }

    let issues_path = issues.or_else(|| config.issues.path.clone()).with_context(|| {
        format!(
            "no issue report: pass --issues or set [issues].path in {}",
            config_path.display()
        )
    })?;
    let issues = load_issues(&issues_path)?;

    let guard = WorkspaceGuard::new(&config.repository.root).with_context(|| {
        format!(
            "repository root {} is not accessible",
            config.repository.root.display()
        )
    })?;

    println!("Repository: {}", guard.workspace_root().display());
    println!(
        "Issues: {} ({} records)",
        issues_path.display(),
        issues.len()
    );
    println!();

    Ok((config, issues, guard))
}

fn build_fix_service(config: &RunConfig) -> Result<Box<dyn FixService>> {
    match &config.fix_service {
        Some(FixServiceConfig::Chat(settings)) => {
            Ok(Box::new(ChatCompletionService::from_env(settings)?))
        }
        Some(FixServiceConfig::Command { program, args }) => {
            Ok(Box::new(CommandFixService::new(program, args.clone())))
        }
        None => anyhow::bail!("no [fix_service] section in the run configuration"),
    }
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn cmd_run(
    config: Option<PathBuf>,
    issues: Option<PathBuf>,
    repo: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
    no_publish: bool,
) -> Result<()> {
    let (config, issues, guard) = load_run(config, issues, repo)?;
    let locator = FunctionLocator::new(config.locator.keywords());
    let fixer = build_fix_service(&config)?;

    // Capture file contents before patching (for diff output)
    let mut file_contents_before: BTreeMap<PathBuf, String> = BTreeMap::new();
    if show_diff {
        for issue in &issues {
            if let Ok(path) = guard.resolve(issue.file_path.trim()) {
                if let Ok(content) = fs::read_to_string(&path) {
                    file_contents_before.entry(path).or_insert(content);
                }
            }
        }
    }

    let (report, file_contents_after) = if dry_run {
        println!("{}", "[DRY RUN - nothing is written or committed]".cyan());
        let mut pipeline = Pipeline::new(guard.clone(), locator, fixer, DryRunSink::new())
            .with_commit_message(config.repository.commit_message.clone());
        let report = pipeline.run(&issues)?;
        let after = pipeline.into_sink().files().clone();
        (report, after)
    } else {
        let sink: Box<dyn PatchSink> = match (&config.repository.branch, no_publish) {
            (Some(branch), false) => Box::new(
                GitSink::new(guard.workspace_root(), branch)
                    .with_remote(config.repository.remote.clone())
                    .with_push(config.repository.push),
            ),
            _ => Box::new(FsSink),
        };
        let mut pipeline = Pipeline::new(guard.clone(), locator, fixer, sink)
            .with_commit_message(config.repository.commit_message.clone());
        let report = pipeline.run(&issues)?;
        let after = file_contents_before
            .keys()
            .filter_map(|path| {
                fs::read_to_string(path)
                    .ok()
                    .map(|text| (path.clone(), text))
            })
            .collect();
        (report, after)
    };

    print_results(&report, dry_run);

    if show_diff {
        for (path, before) in &file_contents_before {
            if let Some(after) = file_contents_after.get(path) {
                if before != after {
                    display_diff(guard.relative(path), before, after);
                }
            }
        }
    }

    print_summary(&report);

    if report.has_failures() {
        std::process::exit(1);
    }

    Ok(())
}

fn print_results(report: &RunReport, dry_run: bool) {
    for (issue, result) in &report.results {
        let label = format!("{} ({})", issue.function_name.trim(), issue.file_path.trim());
        match result {
            IssueResult::Patched { strategy, .. } => {
                let verb = if dry_run { "Would patch" } else { "Patched" };
                println!("{} {}: {} ({} match)", "✓".green(), label, verb, strategy);
            }
            IssueResult::Unchanged { .. } => {
                println!(
                    "{} {}: Unchanged (fix matches current text)",
                    "⊙".yellow(),
                    label
                );
            }
            IssueResult::FunctionNotFound {
                error, suggestions, ..
            } => {
                println!("{} {}: Skipped ({})", "⊘".cyan(), label, error);
                if !suggestions.is_empty() {
                    println!("  Did you mean: {}", suggestions.join(", ").dimmed());
                }
            }
            IssueResult::FailedToApply { reason, detail, .. } => {
                eprintln!("{} {}: Failed - {}", "✗".red(), label, reason);
                if let Some(detail) = detail {
                    eprintln!("  {}", detail);
                }
            }
            IssueResult::Invalid { reason } => {
                eprintln!("{} {}: Invalid - {}", "✗".red(), label, reason);
            }
            IssueResult::Errored { error, .. } => {
                eprintln!("{} {}: Error - {}", "✗".red(), label, error);
            }
        }
    }

    if let Some(error) = &report.finish_error {
        eprintln!("{} {}", "✗".red(), error);
    }
}

fn print_summary(report: &RunReport) {
    let summary = &report.summary;
    println!();
    println!("{}", "Summary:".bold());
    println!("  {} patched", format!("{}", summary.succeeded).green());
    println!("  {} unchanged", format!("{}", summary.unchanged).yellow());
    println!(
        "  {} skipped (function not found)",
        format!("{}", summary.skipped_not_found).cyan()
    );
    println!(
        "  {} failed to apply",
        format!("{}", summary.failed_to_apply).red()
    );
    println!("  {} invalid", format!("{}", summary.invalid).red());
    println!("  {} errored", format!("{}", summary.errored).red());
}

fn cmd_locate(file: &Path, function: &str, keywords: Vec<String>) -> Result<()> {
    let mut type_keywords = TypeKeywords::default();
    type_keywords.extend(keywords);
    let locator = FunctionLocator::new(type_keywords);

    let query = FunctionQuery::new(function, file);

    match locator.locate_query(&query) {
        Ok(span) => {
            let (first, last) = span.display_lines();
            println!(
                "{} {}: {}:{}-{}",
                "✓".green(),
                function,
                file.display(),
                first,
                last
            );
            print!("{}", span.text);
            if !span.text.ends_with('\n') {
                println!();
            }
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            eprintln!("{} {}", "✗".red(), e);
            let suggestions = fs::read_to_string(file)
                .map(|text| locator.suggest(&text, function, 3))
                .unwrap_or_default();
            if !suggestions.is_empty() {
                eprintln!("  Did you mean: {}", suggestions.join(", "));
            }
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_apply(
    file: &Path,
    original: &Path,
    replacement: &Path,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let read = |path: &Path| {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
    };
    let text = read(file)?;
    let original = read(original)?;
    let replacement = read(replacement)?;

    let (patched, outcome) = apply(&text, &original, &replacement);
    if !outcome.applied {
        eprintln!("{} {}: {}", "✗".red(), file.display(), outcome);
        std::process::exit(1);
    }

    if patched == text {
        println!(
            "{} {}: Unchanged (replacement matches current text)",
            "⊙".yellow(),
            file.display()
        );
        return Ok(());
    }

    if dry_run {
        println!("{} {}: Would apply ({})", "✓".green(), file.display(), outcome);
    } else {
        atomic_write(file, patched.as_bytes())
            .with_context(|| format!("failed to write {}", file.display()))?;
        println!("{} {}: {}", "✓".green(), file.display(), outcome);
    }

    if show_diff {
        display_diff(file, &text, &patched);
    }

    Ok(())
}

fn cmd_check(
    config: Option<PathBuf>,
    issues: Option<PathBuf>,
    repo: Option<PathBuf>,
) -> Result<()> {
    let (config, issues, guard) = load_run(config, issues, repo)?;
    let locator = FunctionLocator::new(config.locator.keywords());

    println!("{}", "Checking issues...".bold());

    let mut located = 0;
    let mut missing = 0;
    let mut invalid = 0;

    // Read-only: nothing here writes to the repository
    for issue in &issues {
        let issue = issue.trimmed();
        let label = format!("{} ({})", issue.function_name, issue.file_path);

        if let Err(e) = issue.validate() {
            eprintln!("{} {}: Invalid - {}", "✗".red(), label, e);
            invalid += 1;
            continue;
        }

        let path = match guard.resolve(&issue.file_path) {
            Ok(path) => path,
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red(), label, e);
                missing += 1;
                continue;
            }
        };

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("{} {}: failed to read - {}", "✗".red(), label, e);
                missing += 1;
                continue;
            }
        };

        match locator.locate(&text, &issue.function_name) {
            Ok(span) => {
                let (first, last) = span.display_lines();
                println!(
                    "{} {}: lines {}-{} of {}",
                    "✓".green(),
                    issue.function_name,
                    first,
                    last,
                    guard.relative(&path).display()
                );
                located += 1;
            }
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red(), label, e);
                let suggestions = locator.suggest(&text, &issue.function_name, 3);
                if !suggestions.is_empty() {
                    eprintln!("  Did you mean: {}", suggestions.join(", "));
                }
                missing += 1;
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} located", format!("{}", located).green());
    println!("  {} not found", format!("{}", missing).red());
    println!("  {} invalid", format!("{}", invalid).red());

    if missing > 0 || invalid > 0 {
        std::process::exit(1);
    }

    Ok(())
}
