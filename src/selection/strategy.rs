//! Baseline selection policies.
//!
//! Every policy is a pure function of the query and an ordered candidate
//! list: no I/O, and ties on `updated_at` resolve to the earliest candidate
//! in input order.

use crate::db::models::{Baseline, BaselineQuery};

pub const STABLE_TAG: &str = "stable";

const DEFAULT_BRANCHES: [&str; 2] = ["main", "master"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaselineStrategy {
    /// Most recently updated candidate.
    Latest,
    /// Query branch first, then `main`/`master`, then Latest.
    Branch,
    /// Most recent candidate carrying all required tags. No fallback.
    Tagged { required_tags: Vec<String> },
    /// Exact commit match.
    Commit { target: String },
    /// Prefer the PR's base branch, else Latest.
    Pr { base_branch: String },
    /// Tagged(stable), then Pr, then Branch, then Latest.
    Smart {
        pr_number: Option<u64>,
        base_branch: Option<String>,
        current_branch: Option<String>,
    },
}

impl BaselineStrategy {
    pub fn tagged<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BaselineStrategy::Tagged {
            required_tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn stable() -> Self {
        Self::tagged([STABLE_TAG])
    }

    pub fn commit(target: impl Into<String>) -> Self {
        BaselineStrategy::Commit {
            target: target.into(),
        }
    }

    pub fn pr(base_branch: impl Into<String>) -> Self {
        BaselineStrategy::Pr {
            base_branch: base_branch.into(),
        }
    }

    pub fn smart(
        pr_number: Option<u64>,
        base_branch: Option<String>,
        current_branch: Option<String>,
    ) -> Self {
        BaselineStrategy::Smart {
            pr_number,
            base_branch,
            current_branch,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BaselineStrategy::Latest => "latest",
            BaselineStrategy::Branch => "branch",
            BaselineStrategy::Tagged { .. } => "tagged",
            BaselineStrategy::Commit { .. } => "commit",
            BaselineStrategy::Pr { .. } => "pr",
            BaselineStrategy::Smart { .. } => "smart",
        }
    }

    pub fn select_baseline<'a>(
        &self,
        query: &BaselineQuery,
        candidates: &'a [Baseline],
    ) -> Option<&'a Baseline> {
        match self {
            BaselineStrategy::Latest => most_recent(candidates.iter()),
            BaselineStrategy::Branch => select_by_branch(query.branch(), candidates),
            BaselineStrategy::Tagged { required_tags } => most_recent(
                candidates
                    .iter()
                    .filter(|b| b.metadata.has_all_tags(required_tags)),
            ),
            BaselineStrategy::Commit { target } => most_recent(
                candidates
                    .iter()
                    .filter(|b| b.metadata.commit == *target),
            ),
            BaselineStrategy::Pr { base_branch } => {
                on_branch(candidates, base_branch).or_else(|| most_recent(candidates.iter()))
            }
            BaselineStrategy::Smart {
                pr_number: _,
                base_branch,
                current_branch,
            } => smart_chain(base_branch.as_deref(), current_branch.as_deref())
                .iter()
                .find_map(|step| step.select_baseline(query, candidates)),
        }
    }
}

/// First candidate with the greatest `updated_at`.
pub fn most_recent<'a, I>(candidates: I) -> Option<&'a Baseline>
where
    I: IntoIterator<Item = &'a Baseline>,
{
    candidates.into_iter().fold(None, |best, candidate| match best {
        Some(current) if current.updated_at >= candidate.updated_at => Some(current),
        _ => Some(candidate),
    })
}

fn on_branch<'a>(candidates: &'a [Baseline], branch: &str) -> Option<&'a Baseline> {
    most_recent(
        candidates
            .iter()
            .filter(|b| b.repository.branch == branch),
    )
}

fn select_by_branch<'a>(branch: Option<&str>, candidates: &'a [Baseline]) -> Option<&'a Baseline> {
    if let Some(branch) = branch {
        if let Some(found) = on_branch(candidates, branch) {
            return Some(found);
        }
    }

    most_recent(
        candidates
            .iter()
            .filter(|b| DEFAULT_BRANCHES.contains(&b.repository.branch.as_str())),
    )
    .or_else(|| most_recent(candidates.iter()))
}

fn smart_chain(base_branch: Option<&str>, current_branch: Option<&str>) -> Vec<SmartStep> {
    let mut chain = vec![SmartStep::Strategy(BaselineStrategy::stable())];
    if let Some(base) = base_branch {
        chain.push(SmartStep::Strategy(BaselineStrategy::pr(base)));
    }
    if let Some(current) = current_branch {
        chain.push(SmartStep::BranchOf(current.to_string()));
    }
    chain.push(SmartStep::Strategy(BaselineStrategy::Latest));
    chain
}

/// One link in the Smart chain. The Branch step runs against the caller's
/// current branch rather than the query's.
enum SmartStep {
    Strategy(BaselineStrategy),
    BranchOf(String),
}

impl SmartStep {
    fn select_baseline<'a>(
        &self,
        query: &BaselineQuery,
        candidates: &'a [Baseline],
    ) -> Option<&'a Baseline> {
        match self {
            SmartStep::Strategy(strategy) => strategy.select_baseline(query, candidates),
            SmartStep::BranchOf(branch) => select_by_branch(Some(branch), candidates),
        }
    }
}
