//! Drops issues from excluded projects, teams or statuses.

use std::collections::HashSet;
use std::fmt;

use crate::source::SourceIssue;

/// Why an issue was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlacklistReason {
    Project(String),
    Team(String),
    Status(String),
}

impl fmt::Display for BlacklistReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project(p) => write!(f, "project:{p}"),
            Self::Team(t) => write!(f, "team:{t}"),
            Self::Status(s) => write!(f, "status:{s}"),
        }
    }
}

/// Case-insensitive exclusion lists.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    projects: HashSet<String>,
    teams: HashSet<String>,
    statuses: HashSet<String>,
}

fn folded<I, S>(values: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|v| v.as_ref().trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

impl Blacklist {
    pub fn new<S: AsRef<str>>(projects: &[S], teams: &[S], statuses: &[S]) -> Self {
        Self {
            projects: folded(projects),
            teams: folded(teams),
            statuses: folded(statuses),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.teams.is_empty() && self.statuses.is_empty()
    }

    /// First matching reason, checking project, then team, then status.
    pub fn reason(&self, issue: &SourceIssue) -> Option<BlacklistReason> {
        let project = issue.project();
        if self.projects.contains(&project.to_lowercase()) {
            return Some(BlacklistReason::Project(project.to_string()));
        }
        if let Some(team) = &issue.team {
            if self.teams.contains(&team.to_lowercase()) {
                return Some(BlacklistReason::Team(team.clone()));
            }
        }
        if self.statuses.contains(&issue.status.to_lowercase()) {
            return Some(BlacklistReason::Status(issue.status.clone()));
        }
        None
    }
}
