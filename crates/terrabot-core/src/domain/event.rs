//! Normalized VCS events and the per-invocation event context.
//!
//! Webhook parsing is not this crate's job: transports hand the engine an
//! already-normalized [`CommandEvent`]. The engine turns it into an
//! [`EventContext`] once the pull request and its persisted status are known.

use chrono::{DateTime, Utc};
use pull_state::{PullKey, PullStatus};
use serde::{Deserialize, Serialize};

use super::command::CommentCommand;

/// Hosted VCS providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VcsHost {
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "gitlab")]
    GitLab,
    AzureDevops,
    BitbucketCloud,
    BitbucketServer,
}

impl VcsHost {
    pub fn as_str(self) -> &'static str {
        match self {
            VcsHost::GitHub => "github",
            VcsHost::GitLab => "gitlab",
            VcsHost::AzureDevops => "azure_devops",
            VcsHost::BitbucketCloud => "bitbucket_cloud",
            VcsHost::BitbucketServer => "bitbucket_server",
        }
    }

    /// Bitbucket webhooks carry the full pull request and head repo, so the
    /// engine never needs a follow-up API call for them.
    pub fn embeds_pull_in_webhook(self) -> bool {
        matches!(self, VcsHost::BitbucketCloud | VcsHost::BitbucketServer)
    }
}

impl std::fmt::Display for VcsHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A repository on a VCS host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    /// `owner/name`.
    pub full_name: String,
    pub owner: String,
    pub name: String,
    pub host: VcsHost,
    #[serde(default)]
    pub clone_url: String,
}

impl Repo {
    pub fn new(host: VcsHost, owner: impl Into<String>, name: impl Into<String>) -> Self {
        let owner = owner.into();
        let name = name.into();
        Self {
            full_name: format!("{owner}/{name}"),
            owner,
            name,
            host,
            clone_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullState {
    Open,
    Closed,
}

/// Snapshot of a pull request at event time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub num: u64,
    pub head_commit: String,
    pub head_branch: String,
    pub base_branch: String,
    pub author: String,
    pub state: PullState,
    pub base_repo: Repo,
}

impl PullRequest {
    /// Key under which this pull's status is persisted.
    pub fn key(&self) -> PullKey {
        PullKey::new(
            self.base_repo.host.as_str(),
            self.base_repo.full_name.clone(),
            self.num,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

/// What caused a command to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Pull request opened or updated.
    Auto,
    /// Comment on the pull request.
    Comment,
}

/// A normalized event as handed over by the transport layer.
///
/// `command` is `None` for autoplan events. `head_repo` and `pull` may be
/// missing for hosts whose webhooks don't embed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEvent {
    pub base_repo: Repo,
    #[serde(default)]
    pub head_repo: Option<Repo>,
    #[serde(default)]
    pub pull: Option<PullRequest>,
    pub user: User,
    pub pull_num: u64,
    #[serde(default)]
    pub command: Option<CommentCommand>,
    /// When the VCS recorded the originating event.
    pub timestamp: DateTime<Utc>,
}

impl CommandEvent {
    pub fn trigger(&self) -> Trigger {
        if self.command.is_some() {
            Trigger::Comment
        } else {
            Trigger::Auto
        }
    }
}

/// Everything the transport can hand the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IncomingEvent {
    Command(CommandEvent),
    PullClosed { repo: Repo, pull: PullRequest },
}

/// Per-invocation context, owned by exactly one command run.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub base_repo: Repo,
    pub head_repo: Repo,
    pub pull: PullRequest,
    pub user: User,
    pub trigger: Trigger,
    pub trigger_timestamp: DateTime<Utc>,
    /// Most recently persisted status for this pull, if it could be read.
    pub pull_status: Option<PullStatus>,
    /// Filled in by the apply runner before it builds units.
    pub pull_mergeable: bool,
}
