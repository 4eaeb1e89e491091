//! Project discovery: which projects a run compares.
//!
//! Projects come from groups (`auto_discover`) or from explicit ids and
//! paths (`explicit`). The union is deduplicated by project id, then the
//! include/exclude path filters apply.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use refdelta_core::{DeltaConfig, FiltersConfig, ProjectHandle, ScanMode, TransportError};

use crate::client::{GitLabClient, GroupRef};

/// Where project handles come from.
///
/// [`GitLabClient`] is the production source; tests provide a fixed table.
#[async_trait]
pub trait ProjectSource: Send + Sync {
    /// Resolve one project by id.
    async fn project_by_id(&self, id: u64) -> Result<ProjectHandle, TransportError>;

    /// Resolve one project by namespaced path.
    async fn project_by_path(&self, path: &str) -> Result<ProjectHandle, TransportError>;

    /// List every project of a group.
    async fn group_projects(
        &self,
        group: &GroupRef,
        include_subgroups: bool,
    ) -> Result<Vec<ProjectHandle>, TransportError>;
}

#[async_trait]
impl ProjectSource for GitLabClient {
    async fn project_by_id(&self, id: u64) -> Result<ProjectHandle, TransportError> {
        self.get_project_by_id(id).await
    }

    async fn project_by_path(&self, path: &str) -> Result<ProjectHandle, TransportError> {
        self.get_project_by_path(path).await
    }

    async fn group_projects(
        &self,
        group: &GroupRef,
        include_subgroups: bool,
    ) -> Result<Vec<ProjectHandle>, TransportError> {
        self.list_group_projects(group, include_subgroups).await
    }
}

/// Resolves the configured project set.
///
/// Missing groups and projects are logged and skipped; any other API error
/// aborts resolution, since a partial project list would silently shrink
/// the report.
pub struct ProjectResolver<'a, S: ProjectSource> {
    config: &'a DeltaConfig,
    source: &'a S,
}

impl<'a, S: ProjectSource> ProjectResolver<'a, S> {
    /// Create a resolver over `source`.
    pub fn new(config: &'a DeltaConfig, source: &'a S) -> Self {
        Self { config, source }
    }

    /// Resolve, deduplicate, filter, and sort projects by path.
    ///
    /// # Errors
    ///
    /// Returns the first non-404 [`TransportError`].
    pub async fn resolve(&self) -> Result<Vec<ProjectHandle>, TransportError> {
        let mut projects: HashMap<u64, ProjectHandle> = HashMap::new();

        match self.config.scan.mode {
            ScanMode::AutoDiscover => {
                tracing::info!("running in auto_discover mode");
                projects.extend(self.discover_from_groups().await?);
                if !self.config.projects.is_empty() {
                    tracing::info!("also including explicitly configured projects");
                    projects.extend(self.explicit_projects().await?);
                }
            }
            ScanMode::Explicit => {
                tracing::info!("running in explicit mode");
                projects.extend(self.explicit_projects().await?);
            }
        }

        let mut resolved = apply_filters(projects.into_values().collect(), &self.config.filters);
        resolved.sort_by(|a, b| a.path_with_namespace.cmp(&b.path_with_namespace));
        tracing::info!(count = resolved.len(), "resolved projects to search");
        Ok(resolved)
    }

    async fn discover_from_groups(&self) -> Result<HashMap<u64, ProjectHandle>, TransportError> {
        let groups = &self.config.groups;
        let refs = groups
            .by_id
            .iter()
            .map(|id| GroupRef::Id(*id))
            .chain(groups.by_path.iter().map(|p| GroupRef::Path(p.clone())));

        let mut projects = HashMap::new();
        for group in refs {
            tracing::info!(
                group = %group,
                include_subgroups = groups.include_subgroups,
                "fetching group projects"
            );
            match self
                .source
                .group_projects(&group, groups.include_subgroups)
                .await
            {
                Ok(found) => {
                    tracing::info!(group = %group, count = found.len(), "found group projects");
                    projects.extend(found.into_iter().map(|p| (p.id, p)));
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!(group = %group, "group not found or not accessible");
                }
                Err(e) => {
                    tracing::error!(group = %group, "failed to fetch group projects: {e}");
                    return Err(e);
                }
            }
        }
        Ok(projects)
    }

    async fn explicit_projects(&self) -> Result<HashMap<u64, ProjectHandle>, TransportError> {
        let mut projects = HashMap::new();

        for id in &self.config.projects.by_id {
            if let Some(p) = found_or_skipped(self.source.project_by_id(*id).await, || {
                format!("project {id}")
            })? {
                projects.insert(p.id, p);
            }
        }
        for path in &self.config.projects.by_path {
            if let Some(p) = found_or_skipped(self.source.project_by_path(path).await, || {
                format!("project '{path}'")
            })? {
                projects.insert(p.id, p);
            }
        }
        Ok(projects)
    }
}

fn found_or_skipped(
    result: Result<ProjectHandle, TransportError>,
    label: impl Fn() -> String,
) -> Result<Option<ProjectHandle>, TransportError> {
    match result {
        Ok(project) => Ok(Some(project)),
        Err(e) if e.is_not_found() => {
            tracing::warn!("{} not found or not accessible", label());
            Ok(None)
        }
        Err(e) => {
            tracing::error!("failed to fetch {}: {e}", label());
            Err(e)
        }
    }
}

/// Apply include (if non-empty) then exclude path filters.
///
/// # Examples
///
/// ```
/// use refdelta_core::{FiltersConfig, ProjectHandle};
/// use refdelta_gitlab::resolver::apply_filters;
///
/// let projects = vec![
///     ProjectHandle::new(1, "api", "platform/api", ""),
///     ProjectHandle::new(2, "sandbox", "platform/sandbox", ""),
/// ];
/// let filters = FiltersConfig {
///     include_project_paths: vec![],
///     exclude_project_paths: vec!["platform/sandbox".into()],
/// };
/// let kept = apply_filters(projects, &filters);
/// assert_eq!(kept.len(), 1);
/// assert_eq!(kept[0].path_with_namespace, "platform/api");
/// ```
pub fn apply_filters(projects: Vec<ProjectHandle>, filters: &FiltersConfig) -> Vec<ProjectHandle> {
    let mut projects = projects;

    if !filters.include_project_paths.is_empty() {
        let include: HashSet<&str> = filters
            .include_project_paths
            .iter()
            .map(String::as_str)
            .collect();
        projects.retain(|p| include.contains(p.path_with_namespace.as_str()));
        tracing::info!(count = projects.len(), "applied include filter");
    }

    if !filters.exclude_project_paths.is_empty() {
        let exclude: HashSet<&str> = filters
            .exclude_project_paths
            .iter()
            .map(String::as_str)
            .collect();
        let before = projects.len();
        projects.retain(|p| !exclude.contains(p.path_with_namespace.as_str()));
        let excluded = before - projects.len();
        if excluded > 0 {
            tracing::info!(excluded, "excluded projects via exclude filter");
        }
    }

    projects
}
