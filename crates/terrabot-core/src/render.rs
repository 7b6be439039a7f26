//! Markdown for pull request comments.

use crate::domain::{CommandName, CommandResult, ProjectOutcome, ProjectResult, ProjectSuccess};

pub const SHUTDOWN_MSG: &str =
    "Server is shutting down, please try again later.";

pub const FORK_PR_MSG: &str = "Terrabot commands can't be run on fork pull requests. \
To enable, set `allow_fork_prs` or, to disable this message, set `silence_fork_pr_errors`.";

pub const CLOSED_PULL_MSG: &str = "Terrabot commands can't be run on closed pull requests.";

pub const APPLY_ALL_DISABLED_MSG: &str = "**Error:** Running `apply` without flags is disabled. \
You must specify which project to apply via the `-d <dir>`, `-w <workspace>` or `-p <project name>` flags.";

pub const AUTOMERGE_MSG: &str =
    "Automatically merging because all plans have been successfully applied.";

pub const PLANS_DELETED_MSG: &str = "Plans have been deleted because automerge requires all \
plans to succeed. Fix the errors and run `plan` again.";

pub fn branch_mismatch_msg(base_branch: &str) -> String {
    format!("Terrabot commands are not enabled for pull requests targeting `{base_branch}`.")
}

pub fn panic_msg(command: &str, detail: &str) -> String {
    format!(
        "**Error:** Terrabot hit an internal error while running `{command}`. \
This is a bug, please report it.\n```\n{detail}\n```"
    )
}

pub fn automerge_failed_msg(err: &str) -> String {
    format!("Automerging failed:\n```\n{err}\n```")
}

pub fn approvers_required_msg(approvers: &[String]) -> String {
    if approvers.is_empty() {
        "no policy approvers are configured".to_string()
    } else {
        format!(
            "user is not allowed to approve policies, required approvers: {}",
            approvers.join(", ")
        )
    }
}

/// Outcome comment for one command invocation.
pub fn render_command_result(command: CommandName, result: &CommandResult) -> String {
    let title = command.title();
    if let Some(err) = &result.error {
        return format!("**{title} Error**\n```\n{err}\n```");
    }
    if let Some(failure) = &result.failure {
        return format!("**{title} Failed**: {failure}");
    }
    if result.project_results.is_empty() {
        return format!(
            "Ran {title} for 0 projects.\n\nNo projects matched the request, so nothing ran."
        );
    }

    let mut out = format!(
        "Ran {title} for {} project{}:\n\n",
        result.project_results.len(),
        if result.project_results.len() == 1 { "" } else { "s" }
    );
    for r in &result.project_results {
        out.push_str(&format!(
            "1. dir: `{}` workspace: `{}`{}\n",
            r.repo_rel_dir,
            r.workspace,
            if r.project_name.is_empty() {
                String::new()
            } else {
                format!(" project: `{}`", r.project_name)
            }
        ));
    }
    for r in &result.project_results {
        out.push_str("\n---\n");
        out.push_str(&render_project(r));
    }

    let errored = result
        .project_results
        .iter()
        .filter(|r| r.is_errored())
        .count();
    out.push_str(&format!(
        "\n---\n{} succeeded, {} failed.\n",
        result.project_results.len() - errored,
        errored
    ));
    if result.plans_deleted {
        out.push_str(&format!("\n{PLANS_DELETED_MSG}\n"));
    }
    out
}

fn render_project(r: &ProjectResult) -> String {
    let header = format!("### {}\n", r.display_name());
    let body = match &r.outcome {
        ProjectOutcome::Success(ProjectSuccess::Plan {
            summary,
            has_changes,
        }) => {
            let note = if *has_changes {
                "Run `apply` to apply these changes."
            } else {
                "No changes."
            };
            format!("```\n{summary}\n```\n{note}\n")
        }
        ProjectOutcome::Success(ProjectSuccess::Apply { output })
        | ProjectOutcome::Success(ProjectSuccess::PolicyCheck { output })
        | ProjectOutcome::Success(ProjectSuccess::Version { output }) => {
            format!("```\n{output}\n```\n")
        }
        ProjectOutcome::Success(ProjectSuccess::ApprovePolicies) => "Policies approved.\n".to_string(),
        ProjectOutcome::Failure(msg) => format!("**Failed**: {msg}\n"),
        ProjectOutcome::Error(msg) => format!("**Error**\n```\n{msg}\n```\n"),
    };
    header + &body
}
