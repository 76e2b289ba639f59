//! Filter used by `BaselineRepository::find`.

use serde::{Deserialize, Serialize};

use super::baseline::Baseline;

pub const DEFAULT_QUERY_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Every present field is an AND predicate; an empty query matches everything.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BaselineQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl BaselineQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.repository.get_or_insert_with(Default::default).owner = Some(owner.into());
        self
    }

    pub fn with_repo(mut self, name: impl Into<String>) -> Self {
        self.repository.get_or_insert_with(Default::default).name = Some(name.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.repository.get_or_insert_with(Default::default).branch = Some(branch.into());
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn with_viewport(mut self, viewport: impl Into<String>) -> Self {
        self.viewport = Some(viewport.into());
        self
    }

    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    pub fn with_pr_number(mut self, pr_number: u64) -> Self {
        self.pr_number = Some(pr_number);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn branch(&self) -> Option<&str> {
        self.repository.as_ref().and_then(|r| r.branch.as_deref())
    }

    pub fn matches(&self, baseline: &Baseline) -> bool {
        if let Some(repo) = &self.repository {
            if repo.owner.as_ref().is_some_and(|o| *o != baseline.repository.owner)
                || repo.name.as_ref().is_some_and(|n| *n != baseline.repository.name)
                || repo.branch.as_ref().is_some_and(|b| *b != baseline.repository.branch)
            {
                return false;
            }
        }
        if self.route.as_ref().is_some_and(|r| *r != baseline.route) {
            return false;
        }
        if self.viewport.as_ref().is_some_and(|v| *v != baseline.viewport) {
            return false;
        }
        if self.commit.as_ref().is_some_and(|c| *c != baseline.metadata.commit) {
            return false;
        }
        if self.pr_number.is_some() && self.pr_number != baseline.metadata.pr_number {
            return false;
        }
        if let Some(tags) = &self.tags {
            if !baseline.metadata.has_all_tags(tags) {
                return false;
            }
        }
        true
    }
}
