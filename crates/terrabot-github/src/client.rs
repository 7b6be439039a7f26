//! GitHub REST API client implementing the engine's VCS and commit status
//! contracts.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use terrabot_core::{
    CollaboratorResult, CommandName, CommitState, CommitStatusUpdater, MergeOptions, ProjectUnit,
    PullRequest, PullState, Repo, VcsClient, VcsHost,
};
use tracing::{debug, info, warn};

use crate::config::{GitHubConfig, MAX_COMMENT_CHARS};
use crate::error::{GitHubError, Result};

const API_VERSION: &str = "2022-11-28";
const CONTINUED_HEADER: &str = "*Continued from previous comment.*\n";
const CONTINUED_FOOTER: &str = "\n\n*Continued in next comment.*";

pub struct GitHubClient {
    http: reqwest::Client,
    config: GitHubConfig,
    status_name: String,
}

impl GitHubClient {
    /// `status_name` prefixes every commit status context.
    pub fn new(config: GitHubConfig, status_name: impl Into<String>) -> Result<Self> {
        if config.api_base_url.trim().is_empty() {
            return Err(GitHubError::Config("api_base_url is empty".to_string()));
        }
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GitHubError::Config(e.to_string()))?;
        Ok(Self {
            http,
            config,
            status_name: status_name.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, self.url(path))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(GitHubError::Http {
                status: Some(status.as_u16()),
                message,
            });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let body = self.send(builder).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_pull(&self, repo: &Repo, num: u64) -> Result<ApiPull> {
        self.send_json(self.request(
            Method::GET,
            &format!("/repos/{}/pulls/{num}", repo.full_name),
        ))
        .await
    }

    async fn post_status(&self, repo: &Repo, sha: &str, status: StatusBody) -> Result<()> {
        debug!(repo = %repo.full_name, sha, context = %status.context, state = status.state, "updating commit status");
        self.send(
            self.request(Method::POST, &format!("/repos/{}/statuses/{sha}", repo.full_name))
                .json(&status),
        )
        .await?;
        Ok(())
    }

    pub fn combined_context(&self, command: CommandName) -> String {
        format!("{}/{}", self.status_name, command)
    }

    pub fn project_context(&self, unit: &ProjectUnit) -> String {
        format!(
            "{}/{}: {}",
            self.status_name,
            unit.command,
            unit.display_name()
        )
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ApiRepo {
    name: String,
    owner: ApiUser,
    #[serde(default)]
    clone_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiRef {
    sha: String,
    #[serde(rename = "ref")]
    branch: String,
    /// Null when the head repository was deleted.
    repo: Option<ApiRepo>,
}

#[derive(Debug, Deserialize)]
struct ApiPull {
    number: u64,
    state: String,
    user: ApiUser,
    head: ApiRef,
    base: ApiRef,
    #[serde(default)]
    mergeable: Option<bool>,
    #[serde(default)]
    mergeable_state: Option<String>,
}

#[derive(Debug, Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct MergeBody<'a> {
    merge_method: &'a str,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    state: &'static str,
    context: String,
    description: String,
}

fn repo_from_api(api: &ApiRepo) -> Repo {
    let mut repo = Repo::new(VcsHost::GitHub, &api.owner.login, &api.name);
    repo.clone_url = api.clone_url.clone();
    repo
}

/// Convert a pull payload to the engine's pull request and head repository.
fn pull_from_api(api: ApiPull, base_repo: &Repo) -> Result<(PullRequest, Repo)> {
    let head_repo = api
        .head
        .repo
        .as_ref()
        .map(repo_from_api)
        .ok_or_else(|| GitHubError::Parse(format!("pull {} has no head repository", api.number)))?;
    let state = match api.state.as_str() {
        "open" => PullState::Open,
        _ => PullState::Closed,
    };
    let pull = PullRequest {
        num: api.number,
        head_commit: api.head.sha,
        head_branch: api.head.branch,
        base_branch: api.base.branch,
        author: api.user.login,
        state,
        base_repo: base_repo.clone(),
    };
    Ok((pull, head_repo))
}

/// GitHub computes mergeability lazily; `null` means not yet known and is
/// treated as not mergeable.
pub fn is_mergeable(mergeable: Option<bool>, mergeable_state: Option<&str>) -> bool {
    mergeable == Some(true)
        && matches!(mergeable_state, Some("clean" | "unstable" | "has_hooks"))
}

pub fn state_str(state: CommitState) -> &'static str {
    match state {
        CommitState::Pending => "pending",
        CommitState::Success => "success",
        CommitState::Failed => "failure",
    }
}

/// Split `body` into chunks that fit GitHub's comment limit, marking where
/// each one continues. Splits on char boundaries.
pub fn split_comment(body: &str, max_chars: usize) -> Vec<String> {
    if body.chars().count() <= max_chars {
        return vec![body.to_string()];
    }
    let room = max_chars
        .saturating_sub(CONTINUED_HEADER.len() + CONTINUED_FOOTER.len())
        .max(1);
    let chars: Vec<char> = body.chars().collect();
    let pieces: Vec<String> = chars.chunks(room).map(|c| c.iter().collect()).collect();
    let last = pieces.len() - 1;
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            let header = if i > 0 { CONTINUED_HEADER } else { "" };
            let footer = if i < last { CONTINUED_FOOTER } else { "" };
            format!("{header}{piece}{footer}")
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Engine contracts
// ---------------------------------------------------------------------------

#[async_trait]
impl VcsClient for GitHubClient {
    async fn create_comment(
        &self,
        repo: &Repo,
        pull_num: u64,
        body: &str,
        command: Option<CommandName>,
    ) -> CollaboratorResult<()> {
        let path = format!("/repos/{}/issues/{pull_num}/comments", repo.full_name);
        for chunk in split_comment(body, MAX_COMMENT_CHARS) {
            self.send(
                self.request(Method::POST, &path)
                    .json(&CommentBody { body: &chunk }),
            )
            .await?;
        }
        debug!(repo = %repo.full_name, pull = pull_num, command = ?command, "posted comment");
        Ok(())
    }

    async fn merge_pull(&self, pull: &PullRequest, options: MergeOptions) -> CollaboratorResult<()> {
        let repo = &pull.base_repo;
        self.send(
            self.request(
                Method::PUT,
                &format!("/repos/{}/pulls/{}/merge", repo.full_name, pull.num),
            )
            .json(&MergeBody {
                merge_method: &self.config.merge_method,
            }),
        )
        .await?;
        info!(repo = %repo.full_name, pull = pull.num, "merged pull request");

        // The pull is merged by now; a branch that won't delete is not a
        // failed merge.
        if options.delete_source_branch {
            match self
                .send(self.request(
                    Method::DELETE,
                    &format!("/repos/{}/git/refs/heads/{}", repo.full_name, pull.head_branch),
                ))
                .await
            {
                Ok(_) => debug!(branch = %pull.head_branch, "deleted source branch"),
                Err(e) => warn!(
                    repo = %repo.full_name,
                    branch = %pull.head_branch,
                    error = %e,
                    "unable to delete source branch"
                ),
            }
        }
        Ok(())
    }

    async fn pull_is_mergeable(&self, repo: &Repo, pull: &PullRequest) -> CollaboratorResult<bool> {
        let api = self.get_pull(repo, pull.num).await?;
        Ok(is_mergeable(api.mergeable, api.mergeable_state.as_deref()))
    }

    async fn fetch_pull(&self, repo: &Repo, pull_num: u64) -> CollaboratorResult<(PullRequest, Repo)> {
        let api = self.get_pull(repo, pull_num).await?;
        Ok(pull_from_api(api, repo)?)
    }
}

#[async_trait]
impl CommitStatusUpdater for GitHubClient {
    async fn update_combined(
        &self,
        repo: &Repo,
        pull: &PullRequest,
        state: CommitState,
        command: CommandName,
    ) -> CollaboratorResult<()> {
        let body = StatusBody {
            state: state_str(state),
            context: self.combined_context(command),
            description: terrabot_core::commit_status::combined_description(command, state),
        };
        Ok(self.post_status(repo, &pull.head_commit, body).await?)
    }

    async fn update_combined_count(
        &self,
        repo: &Repo,
        pull: &PullRequest,
        state: CommitState,
        command: CommandName,
        num_success: usize,
        num_total: usize,
    ) -> CollaboratorResult<()> {
        let body = StatusBody {
            state: state_str(state),
            context: self.combined_context(command),
            description: terrabot_core::commit_status::count_description(
                command,
                num_success,
                num_total,
            ),
        };
        Ok(self.post_status(repo, &pull.head_commit, body).await?)
    }

    async fn update_project(
        &self,
        unit: &ProjectUnit,
        state: CommitState,
        description: &str,
    ) -> CollaboratorResult<()> {
        let body = StatusBody {
            state: state_str(state),
            context: self.project_context(unit),
            description: description.to_string(),
        };
        Ok(self
            .post_status(&unit.pull.base_repo, &unit.pull.head_commit, body)
            .await?)
    }
}
