use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use futures::StreamExt;
use miette::{IntoDiagnostic, Result};
use tracing::Level;

use refdelta_core::{
    CommitMatch, CommitSearchReport, DeltaConfig, DeltaError, DeltaResult, DeltaSummary,
    OutputFormat, ProjectHandle,
};
use refdelta_engine::{
    parse_commit_list, search_commits, stream_deltas, summarize, DateFilter, RunOptions,
};
use refdelta_gitlab::{GitLabClient, ProjectResolver};

const CONFIG_FILE: &str = ".refdelta.toml";

/// Exit status after Ctrl-C, matching shell convention for SIGINT.
const INTERRUPTED_EXIT: i32 = 130;

#[derive(Parser)]
#[command(
    name = "refdelta",
    version,
    about = "Find the commits a target ref has that a base ref does not, across many GitLab projects",
    long_about = "refdelta compares two references (tags, branches or commit ids) in every\n\
                   configured GitLab project and reports the commits reachable from the target\n\
                   that are not reachable from the base. The comparison is a set difference of\n\
                   commit hashes, so it stays exact across merges, cherry-picks and rebases.\n\n\
                   Examples:\n  \
                     refdelta init                                  Write a starter .refdelta.toml\n  \
                     refdelta check                                 Test the GitLab connection\n  \
                     refdelta projects                              List the projects a run covers\n  \
                     refdelta delta --base v1.0.0 --target v2.0.0   Compare two releases\n  \
                     refdelta delta --base main --target develop --after 2025-09-01T00:00:00Z\n  \
                     refdelta find --commits hotfixes.txt           Locate commits across projects"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .refdelta.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summary (default)\n  \
                         json      Machine-readable JSON\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Log per-page and per-lookup detail
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Find commits on the target ref that are not on the base ref
    #[command(long_about = "Find commits on the target ref that are not on the base ref.\n\n\
        Each ref may be a tag, a branch or a commit id; tags win over branches of the\n\
        same name. Projects where either ref is missing are reported and skipped.\n\
        Date bounds are inclusive RFC 3339 timestamps applied to the committed date.\n\n\
        Examples:\n  refdelta delta --base v1.0.0 --target v2.0.0\n  \
        refdelta delta --base main --target release --before 2025-12-31T23:59:59Z --format json\n  \
        refdelta delta --base v1 --target v2 --output delta.json")]
    Delta {
        /// Base reference (tag, branch or commit id)
        #[arg(long)]
        base: String,

        /// Target reference (tag, branch or commit id)
        #[arg(long)]
        target: String,

        /// Keep only commits committed at or after this timestamp
        #[arg(long)]
        after: Option<String>,

        /// Keep only commits committed at or before this timestamp
        #[arg(long)]
        before: Option<String>,

        /// Projects compared at the same time (default: delta.concurrency)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Also write the JSON document to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Find which projects, branches and tags contain given commits
    #[command(long_about = "Find which projects, branches and tags contain given commits.\n\n\
        Every commit is looked up in every configured project. A project that cannot be\n\
        queried is reported as an error and the search carries on.\n\n\
        Examples:\n  refdelta find --sha 4f2a9c1e\n  \
        refdelta find --commits hotfixes.txt --format json\n  \
        refdelta find --commits hotfixes.txt --sha 4f2a9c1e --output found.json")]
    Find {
        /// File with one commit hash per line (blank lines and # comments are skipped)
        #[arg(long, value_name = "FILE", required_unless_present = "sha")]
        commits: Option<PathBuf>,

        /// Commit hash to look for (repeatable)
        #[arg(long, value_name = "SHA")]
        sha: Vec<String>,

        /// Lookups in flight at the same time (default: delta.concurrency)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Also write the JSON report to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List the projects a run would cover
    Projects,
    /// Test the GitLab connection and credentials
    Check,
    /// Create a default .refdelta.toml in the current directory
    Init,
    /// Generate shell completions
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

const DEFAULT_CONFIG: &str = r#"# refdelta configuration
# Values here are overridden by GITLAB_URL / GITLAB_TOKEN and by CLI flags.

[gitlab]
# base_url = "https://gitlab.example.com"
# private_token = "glpat-..."        # prefer the GITLAB_TOKEN env var
# api_version = "v4"
# verify_ssl = true
# timeout_seconds = 15
# max_retries = 3

[scan]
# "auto_discover" lists every project in [groups] (plus any in [projects]);
# "explicit" uses only [projects].
mode = "auto_discover"

[projects]
# by_id = [123, 456]
# by_path = ["platform/api"]

[groups]
# include_subgroups = true
# by_id = [10]
# by_path = ["platform"]

[filters]
# include_project_paths = []
# exclude_project_paths = ["platform/sandbox"]

[delta]
# concurrency = 4
# page_size = 100
"#;

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if verbose {
        Level::DEBUG
    } else if quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<DeltaConfig> {
    let mut config = match path {
        Some(path) => DeltaConfig::from_file(path)?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                DeltaConfig::from_file(default_path)?
            } else {
                DeltaConfig::default()
            }
        }
    };
    config.apply_env();
    Ok(config)
}

async fn resolve_projects(
    config: &DeltaConfig,
    client: &GitLabClient,
) -> Result<Vec<ProjectHandle>> {
    let projects = ProjectResolver::new(config, client)
        .resolve()
        .await
        .map_err(DeltaError::from)?;
    if projects.is_empty() {
        miette::bail!(
            "no projects matched the configuration; check [groups], [projects] and [filters]"
        );
    }
    Ok(projects)
}

fn read_commit_list(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(DeltaError::FileNotFound(path.to_path_buf()).into());
    }
    let content = std::fs::read_to_string(path).into_diagnostic()?;
    Ok(parse_commit_list(&content))
}

fn progress_bar(len: usize, quiet: bool) -> indicatif::ProgressBar {
    if quiet || !std::io::stderr().is_terminal() {
        return indicatif::ProgressBar::hidden();
    }
    let pb = indicatif::ProgressBar::new(len as u64);
    let template = "{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg} ({elapsed})";
    if let Ok(style) = indicatif::ProgressStyle::with_template(template) {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb
}

fn render_json(summary: &DeltaSummary, results: &[DeltaResult]) -> Result<String> {
    let doc = serde_json::json!({
        "summary": summary,
        "results": results,
    });
    serde_json::to_string_pretty(&doc).into_diagnostic()
}

fn print_text(summary: &DeltaSummary, results: &[DeltaResult]) {
    println!("{summary}");
    for result in results.iter().filter(|r| r.has_changes()) {
        println!();
        println!("{} ({} commits)", result.project_path, result.commits.len());
        for commit in &result.commits {
            println!(
                "  {} {} {:<20} {}",
                commit.short_id, commit.committed_date, commit.author_name, commit.title
            );
        }
    }
    let failures: Vec<&DeltaResult> = results.iter().filter(|r| r.error.is_some()).collect();
    if !failures.is_empty() {
        println!();
        println!("Errors:");
        for result in failures {
            println!(
                "  {}: {}",
                result.project_path,
                result.error.as_deref().unwrap_or_default()
            );
        }
    }
}

fn print_markdown(summary: &DeltaSummary, results: &[DeltaResult]) {
    println!("# Delta `{}`..`{}`\n", summary.base_ref, summary.target_ref);
    println!("| Metric | Value |");
    println!("|--------|-------|");
    println!("| Projects searched | {} |", summary.total_projects);
    println!(
        "| Projects with changes | {} |",
        summary.projects_with_changes
    );
    println!(
        "| Projects without changes | {} |",
        summary.projects_without_changes
    );
    println!(
        "| Projects with errors | {} |",
        summary.projects_with_errors
    );
    println!("| Commits in base | {} |", summary.total_base_commits);
    println!("| Commits in target | {} |", summary.total_target_commits);
    println!("| Delta commits | {} |", summary.total_commits);
    println!("| Unique authors | {} |", summary.unique_authors.len());

    for result in results.iter().filter(|r| r.has_changes()) {
        println!(
            "\n## [{}]({})\n",
            result.project_path, result.project_web_url
        );
        println!("| Commit | Committed | Author | Title |");
        println!("|--------|-----------|--------|-------|");
        for commit in &result.commits {
            println!(
                "| [`{}`]({}) | {} | {} | {} |",
                commit.short_id,
                commit.web_url,
                commit.committed_date,
                commit.author_name,
                commit.title.replace('|', "\\|")
            );
        }
    }

    let failures: Vec<&DeltaResult> = results.iter().filter(|r| r.error.is_some()).collect();
    if !failures.is_empty() {
        println!("\n## Errors\n");
        for result in failures {
            println!(
                "- **{}**: {}",
                result.project_path,
                result.error.as_deref().unwrap_or_default()
            );
        }
    }
}

fn print_search_text(report: &CommitSearchReport) {
    println!("{report}");
    for sha in &report.found {
        println!();
        println!("{sha}");
        for m in report.matches_for(sha).filter(|m| m.found) {
            println!("  {}  {}", m.project_path, m.commit_web_url);
            if !m.branches.is_empty() {
                println!("    branches: {}", m.branches.join(", "));
            }
            if !m.tags.is_empty() {
                println!("    tags:     {}", m.tags.join(", "));
            }
        }
    }
    if !report.not_found.is_empty() {
        println!();
        println!("Not found:");
        for sha in &report.not_found {
            println!("  {sha}");
        }
    }
    let failures: Vec<&CommitMatch> = report.failures().collect();
    if !failures.is_empty() {
        println!();
        println!("Errors:");
        for m in failures {
            println!(
                "  {} in {}: {}",
                m.commit_sha,
                m.project_path,
                m.error.as_deref().unwrap_or_default()
            );
        }
    }
}

fn print_search_markdown(report: &CommitSearchReport) {
    println!("# Commit search\n");
    println!("| Metric | Value |");
    println!("|--------|-------|");
    println!("| Commits searched | {} |", report.commits_searched);
    println!("| Projects searched | {} |", report.projects_searched);
    println!("| Commits found | {} |", report.found.len());
    println!("| Commits not found | {} |", report.not_found.len());
    println!("| Lookup errors | {} |", report.errors());

    if !report.found.is_empty() {
        println!("\n## Matches\n");
        println!("| Commit | Project | Branches | Tags |");
        println!("|--------|---------|----------|------|");
        for m in report.matches.iter().filter(|m| m.found) {
            let short: String = m.commit_sha.chars().take(8).collect();
            println!(
                "| [`{short}`]({}) | [{}]({}) | {} | {} |",
                m.commit_web_url,
                m.project_path,
                m.project_web_url,
                m.branches.join(", "),
                m.tags.join(", ")
            );
        }
    }

    if !report.not_found.is_empty() {
        println!("\n## Not found\n");
        for sha in &report.not_found {
            println!("- `{sha}`");
        }
    }

    let failures: Vec<&CommitMatch> = report.failures().collect();
    if !failures.is_empty() {
        println!("\n## Errors\n");
        for m in failures {
            println!(
                "- `{}` in **{}**: {}",
                m.commit_sha,
                m.project_path,
                m.error.as_deref().unwrap_or_default()
            );
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_delta(
    config: &DeltaConfig,
    format: OutputFormat,
    quiet: bool,
    base: &str,
    target: &str,
    after: Option<&str>,
    before: Option<&str>,
    concurrency: Option<usize>,
    output: Option<&Path>,
) -> Result<()> {
    config.validate()?;
    let filter = DateFilter::parse(after, before)?;
    let concurrency = concurrency.unwrap_or(config.delta.concurrency);
    if concurrency == 0 {
        miette::bail!("--concurrency must be at least 1");
    }

    let client = GitLabClient::new(&config.gitlab)?;
    let projects = resolve_projects(config, &client).await?;
    let options = RunOptions {
        concurrency,
        page_size: config.delta.page_size,
    };

    let pb = progress_bar(projects.len(), quiet);
    let mut stream = stream_deltas(&client, &projects, base, target, &filter, options)?;
    let mut results = Vec::with_capacity(projects.len());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let interrupted = loop {
        tokio::select! {
            next = stream.next() => match next {
                Some(result) => {
                    pb.set_message(result.project_path.clone());
                    pb.inc(1);
                    results.push(result);
                }
                None => break false,
            },
            _ = &mut ctrl_c => break true,
        }
    };
    drop(stream);

    if interrupted {
        pb.abandon_with_message("interrupted");
        tracing::warn!(
            "interrupted; reporting {} of {} projects",
            results.len(),
            projects.len()
        );
    } else {
        pb.finish_and_clear();
    }

    let summary = summarize(&results);
    if let Some(path) = output {
        std::fs::write(path, render_json(&summary, &results)?).into_diagnostic()?;
        tracing::info!("wrote results to {}", path.display());
    }

    match format {
        OutputFormat::Json => println!("{}", render_json(&summary, &results)?),
        OutputFormat::Markdown => print_markdown(&summary, &results),
        OutputFormat::Text => print_text(&summary, &results),
    }

    if interrupted {
        std::process::exit(INTERRUPTED_EXIT);
    }
    Ok(())
}

async fn run_find(
    config: &DeltaConfig,
    format: OutputFormat,
    commits_file: Option<&Path>,
    shas: &[String],
    concurrency: Option<usize>,
    output: Option<&Path>,
) -> Result<()> {
    let mut wanted = match commits_file {
        Some(path) => read_commit_list(path)?,
        None => Vec::new(),
    };
    wanted.extend(shas.iter().cloned());
    if wanted.iter().all(|sha| sha.trim().is_empty()) {
        miette::bail!("no commit hashes given; pass --commits FILE or --sha SHA");
    }

    config.validate()?;
    let concurrency = concurrency.unwrap_or(config.delta.concurrency);
    if concurrency == 0 {
        miette::bail!("--concurrency must be at least 1");
    }

    let client = GitLabClient::new(&config.gitlab)?;
    let projects = resolve_projects(config, &client).await?;

    let search = search_commits(&client, &projects, &wanted, concurrency);
    let report = tokio::select! {
        report = search => report?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted; no report written");
            std::process::exit(INTERRUPTED_EXIT);
        }
    };

    let json = serde_json::to_string_pretty(&report).into_diagnostic()?;
    if let Some(path) = output {
        std::fs::write(path, &json).into_diagnostic()?;
        tracing::info!("wrote results to {}", path.display());
    }

    match format {
        OutputFormat::Json => println!("{json}"),
        OutputFormat::Markdown => print_search_markdown(&report),
        OutputFormat::Text => print_search_text(&report),
    }
    Ok(())
}

async fn run_projects(config: &DeltaConfig, format: OutputFormat) -> Result<()> {
    config.validate()?;
    let client = GitLabClient::new(&config.gitlab)?;
    let projects = resolve_projects(config, &client).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&projects).into_diagnostic()?;
            println!("{json}");
        }
        OutputFormat::Markdown => {
            println!("| ID | Project |");
            println!("|----|---------|");
            for p in &projects {
                println!("| {} | [{}]({}) |", p.id, p.path_with_namespace, p.web_url);
            }
        }
        OutputFormat::Text => {
            for p in &projects {
                println!("{:>8}  {}", p.id, p.path_with_namespace);
            }
            println!("\n{} projects ({} mode)", projects.len(), config.scan.mode);
        }
    }
    Ok(())
}

async fn run_check(config: &DeltaConfig, format: OutputFormat) -> Result<()> {
    config.validate_connection()?;
    let client = GitLabClient::new(&config.gitlab)?;
    let version = client.version().await.map_err(DeltaError::from)?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "base_url": config.gitlab.base_url,
                "api": client.api_base().as_str(),
                "version": version,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ => println!("Connected to {} (GitLab {version})", config.gitlab.base_url),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Command::Delta {
            ref base,
            ref target,
            ref after,
            ref before,
            concurrency,
            ref output,
        } => {
            let config = load_config(cli.config.as_deref())?;
            run_delta(
                &config,
                cli.format,
                cli.quiet,
                base,
                target,
                after.as_deref(),
                before.as_deref(),
                concurrency,
                output.as_deref(),
            )
            .await?;
        }
        Command::Find {
            ref commits,
            ref sha,
            concurrency,
            ref output,
        } => {
            let config = load_config(cli.config.as_deref())?;
            run_find(
                &config,
                cli.format,
                commits.as_deref(),
                sha,
                concurrency,
                output.as_deref(),
            )
            .await?;
        }
        Command::Projects => {
            let config = load_config(cli.config.as_deref())?;
            run_projects(&config, cli.format).await?;
        }
        Command::Check => {
            let config = load_config(cli.config.as_deref())?;
            run_check(&config, cli.format).await?;
        }
        Command::Init => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "refdelta", &mut std::io::stdout());
        }
    }

    Ok(())
}
