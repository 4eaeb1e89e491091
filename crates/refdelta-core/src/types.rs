use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Number of projects kept in [`DeltaSummary::top_projects`].
pub const TOP_PROJECTS: usize = 10;

/// Identity of a GitLab project.
///
/// Equality and hashing use `id` only, so the same project reached through
/// two groups deduplicates cleanly.
///
/// # Examples
///
/// ```
/// use refdelta_core::ProjectHandle;
///
/// let a = ProjectHandle::new(7, "api", "platform/api", "https://gitlab.example.com/platform/api");
/// let b = ProjectHandle::new(7, "api-renamed", "other/api", "");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectHandle {
    /// Numeric project id.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Full namespaced path, e.g. `group/subgroup/project`.
    pub path_with_namespace: String,
    /// Browsable URL.
    pub web_url: String,
}

impl ProjectHandle {
    /// Build a handle from its parts.
    pub fn new(
        id: u64,
        name: impl Into<String>,
        path_with_namespace: impl Into<String>,
        web_url: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            path_with_namespace: path_with_namespace.into(),
            web_url: web_url.into(),
        }
    }
}

impl PartialEq for ProjectHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ProjectHandle {}

impl Hash for ProjectHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One commit as reported by the host's commit listing.
///
/// Identity is the content hash in `id`: two records with the same `id` are
/// equal regardless of any other field. Deserializes straight from GitLab's
/// commit JSON; absent or `null` fields become empty.
///
/// # Examples
///
/// ```
/// use refdelta_core::CommitRecord;
///
/// let json = r#"{"id": "abc123", "title": "Fix login", "committed_date": "2025-09-01T10:30:00Z"}"#;
/// let commit: CommitRecord = serde_json::from_str(json).unwrap();
/// assert_eq!(commit.id, "abc123");
/// assert!(commit.parent_ids.is_empty());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitRecord {
    /// Full commit hash.
    pub id: String,
    /// Abbreviated hash.
    #[serde(deserialize_with = "nullable")]
    pub short_id: String,
    /// First line of the message.
    #[serde(deserialize_with = "nullable")]
    pub title: String,
    /// Full commit message.
    #[serde(deserialize_with = "nullable")]
    pub message: String,
    /// Author name.
    #[serde(deserialize_with = "nullable")]
    pub author_name: String,
    /// Author email.
    #[serde(deserialize_with = "nullable")]
    pub author_email: String,
    /// ISO-8601 authoring timestamp.
    #[serde(deserialize_with = "nullable")]
    pub authored_date: String,
    /// ISO-8601 commit timestamp; date filters and sorting use this.
    #[serde(deserialize_with = "nullable")]
    pub committed_date: String,
    /// Committer name.
    #[serde(deserialize_with = "nullable")]
    pub committer_name: String,
    /// Committer email.
    #[serde(deserialize_with = "nullable")]
    pub committer_email: String,
    /// Parent hashes (two or more for merges).
    #[serde(deserialize_with = "nullable")]
    pub parent_ids: Vec<String>,
    /// Browsable URL.
    #[serde(deserialize_with = "nullable")]
    pub web_url: String,
}

impl CommitRecord {
    /// `true` for merge commits.
    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }
}

impl PartialEq for CommitRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CommitRecord {}

impl Hash for CommitRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Per-project delta between a base and a target reference.
///
/// Serialized field names are what downstream exporters read; they are kept
/// in `snake_case` and must not change.
///
/// Invariants upheld by the delta engine:
/// - if `base_exists` or `target_exists` is `false`, `commits` is empty and
///   `error` is set;
/// - `commits.len() <= raw_delta_count`.
///
/// # Examples
///
/// ```
/// use refdelta_core::{DeltaResult, ProjectHandle, DeltaOutcome};
///
/// let project = ProjectHandle::new(1, "api", "platform/api", "");
/// let result = DeltaResult::new(&project, "v1.0.0", "v2.0.0");
/// assert!(!result.has_changes());
/// assert!(!result.is_successful());
/// assert_eq!(result.outcome(), DeltaOutcome::Unchanged);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaResult {
    /// Project id.
    pub project_id: u64,
    /// Project display name.
    pub project_name: String,
    /// Project namespaced path.
    pub project_path: String,
    /// Project URL.
    pub project_web_url: String,
    /// Base reference name as requested.
    pub base_ref: String,
    /// Target reference name as requested.
    pub target_ref: String,
    /// Whether the base reference resolved to a tag, branch, or commit.
    pub base_exists: bool,
    /// Whether the target reference resolved to a tag, branch, or commit.
    pub target_exists: bool,
    /// Delta commits surviving the date filter, newest first.
    pub commits: Vec<CommitRecord>,
    /// Size of the delta before date filtering.
    pub raw_delta_count: usize,
    /// Commits reachable from the base reference.
    pub base_commit_count: usize,
    /// Commits reachable from the target reference.
    pub target_commit_count: usize,
    /// Both references reach exactly the same commits.
    pub compare_same_ref: bool,
    /// Why this project has no meaningful delta, if it failed.
    pub error: Option<String>,
}

/// Mutually exclusive classification of a [`DeltaResult`].
///
/// # Examples
///
/// ```
/// use refdelta_core::DeltaOutcome;
///
/// assert_eq!(DeltaOutcome::Skipped.to_string(), "skipped");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaOutcome {
    /// At least one commit survived filtering.
    Changed,
    /// Comparison succeeded with nothing to report.
    Unchanged,
    /// A reference is missing or could not be verified.
    Skipped,
    /// The comparison hit a transport failure.
    Failed,
}

impl fmt::Display for DeltaOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaOutcome::Changed => write!(f, "changed"),
            DeltaOutcome::Unchanged => write!(f, "unchanged"),
            DeltaOutcome::Skipped => write!(f, "skipped"),
            DeltaOutcome::Failed => write!(f, "failed"),
        }
    }
}

impl DeltaResult {
    /// An empty result for `project`, before any lookups.
    pub fn new(project: &ProjectHandle, base_ref: &str, target_ref: &str) -> Self {
        Self {
            project_id: project.id,
            project_name: project.name.clone(),
            project_path: project.path_with_namespace.clone(),
            project_web_url: project.web_url.clone(),
            base_ref: base_ref.to_string(),
            target_ref: target_ref.to_string(),
            base_exists: false,
            target_exists: false,
            commits: Vec::new(),
            raw_delta_count: 0,
            base_commit_count: 0,
            target_commit_count: 0,
            compare_same_ref: false,
            error: None,
        }
    }

    /// Whether any commit survived filtering.
    pub fn has_changes(&self) -> bool {
        !self.commits.is_empty()
    }

    /// Whether both references resolved and no error was recorded.
    pub fn is_successful(&self) -> bool {
        self.error.is_none() && self.base_exists && self.target_exists
    }

    /// Classify this result.
    ///
    /// A recorded error wins over everything else; among errors, a missing
    /// reference is a skip rather than a failure.
    pub fn outcome(&self) -> DeltaOutcome {
        if self.error.is_some() {
            if self.base_exists && self.target_exists {
                DeltaOutcome::Failed
            } else {
                DeltaOutcome::Skipped
            }
        } else if self.has_changes() {
            DeltaOutcome::Changed
        } else {
            DeltaOutcome::Unchanged
        }
    }

    /// Sorted, deduplicated author names of the surviving commits.
    pub fn unique_authors(&self) -> Vec<String> {
        self.commits
            .iter()
            .map(|c| c.author_name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Surviving commits by one author.
    pub fn commits_by_author(&self, author_name: &str) -> Vec<&CommitRecord> {
        self.commits
            .iter()
            .filter(|c| c.author_name == author_name)
            .collect()
    }
}

/// A project's line in the summary ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCommitCount {
    /// Project namespaced path.
    pub project_path: String,
    /// Commits in the project's filtered delta.
    pub commits: usize,
}

/// Aggregate statistics over a list of [`DeltaResult`]s.
///
/// Always derived from results, never edited on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaSummary {
    /// Base reference of the run.
    pub base_ref: String,
    /// Target reference of the run.
    pub target_ref: String,
    /// Projects searched.
    pub total_projects: usize,
    /// Projects with at least one delta commit.
    pub projects_with_changes: usize,
    /// Projects that compared cleanly with an empty delta.
    pub projects_without_changes: usize,
    /// Projects with an error (includes skipped ones).
    pub projects_with_errors: usize,
    /// Errored projects where a reference was missing.
    pub projects_skipped: usize,
    /// Sum of base reachable-set sizes.
    pub total_base_commits: usize,
    /// Sum of target reachable-set sizes.
    pub total_target_commits: usize,
    /// Delta commits after date filtering.
    pub total_commits: usize,
    /// Delta commits before date filtering.
    pub total_raw_delta: usize,
    /// Sorted author names across all delta commits.
    pub unique_authors: Vec<String>,
    /// Projects ranked by delta size, at most [`TOP_PROJECTS`].
    pub top_projects: Vec<ProjectCommitCount>,
}

impl fmt::Display for DeltaSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "Delta Discovery Summary")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Base Reference:           {}", self.base_ref)?;
        writeln!(f, "Target Reference:         {}", self.target_ref)?;
        writeln!(f, "Projects Searched:        {}", self.total_projects)?;
        writeln!(
            f,
            "Projects with Changes:    {}",
            self.projects_with_changes
        )?;
        writeln!(
            f,
            "Projects without Changes: {}",
            self.projects_without_changes
        )?;
        writeln!(f, "Projects with Errors:     {}", self.projects_with_errors)?;
        if self.projects_skipped > 0 {
            writeln!(f, "  (missing reference:     {})", self.projects_skipped)?;
        }
        writeln!(f)?;
        writeln!(f, "Commits in Base Ref:      {}", self.total_base_commits)?;
        writeln!(f, "Commits in Target Ref:    {}", self.total_target_commits)?;
        writeln!(f, "Delta (Unique to Target): {}", self.total_commits)?;
        if self.total_raw_delta != self.total_commits {
            writeln!(f, "Delta before Date Filter: {}", self.total_raw_delta)?;
        }
        if !self.unique_authors.is_empty() {
            writeln!(f, "Unique Authors:           {}", self.unique_authors.len())?;
        }
        if !self.top_projects.is_empty() {
            writeln!(f)?;
            let shown = self.top_projects.len();
            writeln!(f, "Top {shown} Projects by Commit Count:")?;
            for (i, p) in self.top_projects.iter().enumerate() {
                writeln!(f, "  {}. {}: {} commits", i + 1, p.project_path, p.commits)?;
            }
        }
        write!(f, "{rule}")
    }
}

/// The outcome of looking for one commit in one project.
///
/// `found` with no `error` is a clean hit. `found` with an `error` means the
/// commit exists but its branches and tags could not be listed. No `found`
/// and an `error` means the lookup itself failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMatch {
    /// The hash searched for, as given.
    pub commit_sha: String,
    /// Project id.
    pub project_id: u64,
    /// Project display name.
    pub project_name: String,
    /// Project namespaced path.
    pub project_path: String,
    /// Project browsable URL.
    pub project_web_url: String,
    /// The project's history contains the commit.
    pub found: bool,
    /// Browsable URL of the commit inside this project.
    pub commit_web_url: String,
    /// Commit title.
    pub title: String,
    /// Author name.
    pub author_name: String,
    /// Author email.
    pub author_email: String,
    /// ISO-8601 commit timestamp.
    pub committed_date: String,
    /// Branches containing the commit, sorted.
    pub branches: Vec<String>,
    /// Tags containing the commit, sorted.
    pub tags: Vec<String>,
    /// Lookup failure, if any.
    pub error: Option<String>,
}

impl CommitMatch {
    /// An empty, not-found entry for `sha` in `project`.
    pub fn new(project: &ProjectHandle, sha: &str) -> Self {
        Self {
            commit_sha: sha.to_string(),
            project_id: project.id,
            project_name: project.name.clone(),
            project_path: project.path_with_namespace.clone(),
            project_web_url: project.web_url.clone(),
            ..Self::default()
        }
    }

    /// Worth reporting: either a hit or a failure. A clean miss is not.
    pub fn is_reportable(&self) -> bool {
        self.found || self.error.is_some()
    }
}

/// Result of searching a batch of commits across many projects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSearchReport {
    /// Distinct hashes searched.
    pub commits_searched: usize,
    /// Projects each hash was looked for in.
    pub projects_searched: usize,
    /// Hashes found in at least one project, in input order.
    pub found: Vec<String>,
    /// Hashes found nowhere, in input order.
    pub not_found: Vec<String>,
    /// Hits and failures, grouped by hash then in project order.
    pub matches: Vec<CommitMatch>,
}

impl CommitSearchReport {
    /// Entries that carry an error.
    pub fn failures(&self) -> impl Iterator<Item = &CommitMatch> {
        self.matches.iter().filter(|m| m.error.is_some())
    }

    /// Number of [`failures`](Self::failures).
    pub fn errors(&self) -> usize {
        self.failures().count()
    }

    /// Entries for one hash.
    pub fn matches_for<'a>(&'a self, sha: &'a str) -> impl Iterator<Item = &'a CommitMatch> {
        self.matches.iter().filter(move |m| m.commit_sha == sha)
    }
}

impl fmt::Display for CommitSearchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "Commit Search Summary")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Commits Searched:         {}", self.commits_searched)?;
        writeln!(f, "Projects Searched:        {}", self.projects_searched)?;
        writeln!(f, "Commits Found:            {}", self.found.len())?;
        writeln!(f, "Commits Not Found:        {}", self.not_found.len())?;
        let errors = self.errors();
        if errors > 0 {
            writeln!(f, "Lookup Errors:            {errors}")?;
        }
        write!(f, "{rule}")
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use refdelta_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable tables and summaries.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
