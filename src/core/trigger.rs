//! Trigger model - decides which repository events start a workflow run

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of repository event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Push,
    PullRequest,
    WorkflowDispatch,
    /// Any other named event (e.g. `schedule`, `release`)
    Other(String),
}

impl EventType {
    /// Parse an event name as written in a workflow file
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "push" => EventType::Push,
            "pull_request" => EventType::PullRequest,
            "workflow_dispatch" => EventType::WorkflowDispatch,
            other => EventType::Other(other.to_string()),
        }
    }

    /// The event name as written in a workflow file
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Push => "push",
            EventType::PullRequest => "pull_request",
            EventType::WorkflowDispatch => "workflow_dispatch",
            EventType::Other(name) => name,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An incoming repository event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoEvent {
    pub event_type: EventType,

    /// Pushed branch, or the target (base) branch of a pull request
    pub branch: String,
}

impl RepoEvent {
    pub fn new(event_type: EventType, branch: impl Into<String>) -> Self {
        Self {
            event_type,
            branch: branch.into(),
        }
    }

    pub fn push(branch: impl Into<String>) -> Self {
        Self::new(EventType::Push, branch)
    }

    pub fn pull_request(target_branch: impl Into<String>) -> Self {
        Self::new(EventType::PullRequest, target_branch)
    }

    /// Fully qualified git ref of the branch
    pub fn git_ref(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }
}

/// A single branch glob (`*`, `**`, `?`, optional leading `!`)
#[derive(Debug, Clone)]
pub struct BranchPattern {
    raw: String,
    negated: bool,
    regex: Regex,
}

impl BranchPattern {
    pub fn new(raw: &str) -> Result<Self, regex::Error> {
        let (negated, glob) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let mut pattern = String::from("^");
        let mut chars = glob.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' if chars.peek() == Some(&'*') => {
                    chars.next();
                    pattern.push_str(".*");
                }
                '*' => pattern.push_str("[^/]*"),
                '?' => pattern.push_str("[^/]"),
                other => pattern.push_str(&regex::escape(&other.to_string())),
            }
        }
        pattern.push('$');

        Ok(Self {
            raw: raw.to_string(),
            negated,
            regex: Regex::new(&pattern)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Check the glob part of the pattern (ignores negation)
    pub fn matches(&self, branch: &str) -> bool {
        self.regex.is_match(branch)
    }
}

/// Branch filter attached to one trigger
#[derive(Debug, Clone)]
pub enum BranchFilter {
    /// No filter declared - every branch matches
    Any,
    /// `branches:` - only matching branches run
    Include(Vec<BranchPattern>),
    /// `branches-ignore:` - matching branches never run
    Ignore(Vec<BranchPattern>),
}

impl BranchFilter {
    /// Decide whether the branch passes the filter.
    ///
    /// Patterns are applied in order and the last matching pattern wins,
    /// so `!` entries can carve exceptions out of earlier ones.
    pub fn allows(&self, branch: &str) -> bool {
        match self {
            BranchFilter::Any => true,
            BranchFilter::Include(patterns) => last_match(patterns, branch).unwrap_or(false),
            BranchFilter::Ignore(patterns) => !last_match(patterns, branch).unwrap_or(false),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            BranchFilter::Any => "any",
            BranchFilter::Include(_) => "branches",
            BranchFilter::Ignore(_) => "branches-ignore",
        }
    }
}

fn last_match(patterns: &[BranchPattern], branch: &str) -> Option<bool> {
    patterns
        .iter()
        .filter(|p| p.matches(branch))
        .last()
        .map(|p| !p.is_negated())
}

/// One `(event type, branch filter)` pair
#[derive(Debug, Clone)]
pub struct Trigger {
    pub event_type: EventType,
    pub filter: BranchFilter,
}

impl Trigger {
    pub fn new(event_type: EventType, filter: BranchFilter) -> Self {
        Self { event_type, filter }
    }

    pub fn matches(&self, event: &RepoEvent) -> bool {
        self.event_type == event.event_type && self.filter.allows(&event.branch)
    }
}

/// Outcome of evaluating an event against the trigger spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerDecision {
    Run { event_type: EventType },
    Skip { reason: String },
}

impl TriggerDecision {
    pub fn should_run(&self) -> bool {
        matches!(self, TriggerDecision::Run { .. })
    }
}

/// All triggers declared by a workflow
#[derive(Debug, Clone, Default)]
pub struct TriggerSpec {
    pub triggers: Vec<Trigger>,
}

impl TriggerSpec {
    pub fn new(triggers: Vec<Trigger>) -> Self {
        Self { triggers }
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Event types this workflow listens for
    pub fn event_types(&self) -> Vec<&EventType> {
        self.triggers.iter().map(|t| &t.event_type).collect()
    }

    /// Decide whether the event starts a run. Never fails: a mismatch is a skip.
    pub fn evaluate(&self, event: &RepoEvent) -> TriggerDecision {
        let candidates: Vec<&Trigger> = self
            .triggers
            .iter()
            .filter(|t| t.event_type == event.event_type)
            .collect();

        if candidates.is_empty() {
            return TriggerDecision::Skip {
                reason: format!("workflow does not listen for '{}' events", event.event_type),
            };
        }

        if candidates.iter().any(|t| t.matches(event)) {
            return TriggerDecision::Run {
                event_type: event.event_type.clone(),
            };
        }

        let filters: Vec<&str> = candidates.iter().map(|t| t.filter.describe()).collect();
        TriggerDecision::Skip {
            reason: format!(
                "branch '{}' is filtered out by '{}' ({})",
                event.branch,
                event.event_type,
                filters.join(", ")
            ),
        }
    }
}
