//! Clone a repository and record a commit in it.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::process::run_program;
use super::{DataRoot, DecodedArgs, Param, TaskContext, TaskError, Tool};

const COMMIT_AUTHOR_NAME: &str = "Automation Agent";
const COMMIT_AUTHOR_EMAIL: &str = "agent@localhost";

pub struct GitCommit;

#[derive(Deserialize)]
struct GitCommitArgs {
    repo_url: String,
    clone_path: PathBuf,
    commit_message: String,
}

#[async_trait]
impl Tool for GitCommit {
    fn name(&self) -> &str {
        "git_commit"
    }

    fn description(&self) -> &str {
        "Clones a git repository into a directory and creates a commit containing all files in the working tree."
    }

    fn parameters(&self) -> Vec<Param> {
        vec![
            Param::string("repo_url", "URL of the repository to clone.")
                .pattern(r"^(https?|ssh|git|file)://|^git@"),
            Param::path("clone_path", "Directory the repository is cloned into."),
            Param::string("commit_message", "Message of the new commit.").default("Auto-commit"),
        ]
    }

    async fn execute(&self, args: DecodedArgs, ctx: &TaskContext) -> Result<String, TaskError> {
        let args: GitCommitArgs = args.into_typed()?;
        confine_local_source(&args.repo_url, &ctx.data_root)?;

        if args.clone_path.exists() {
            return Err(TaskError::InvalidData(format!(
                "{} already exists",
                args.clone_path.display()
            )));
        }

        run_git(
            [
                OsStr::new("clone"),
                OsStr::new("--quiet"),
                OsStr::new("--"),
                OsStr::new(&args.repo_url),
                args.clone_path.as_os_str(),
            ],
            ctx.data_root.path(),
            ctx.command_timeout,
        )
        .await?;

        run_git(["add", "--all"], &args.clone_path, ctx.command_timeout).await?;

        let user_name = format!("user.name={}", COMMIT_AUTHOR_NAME);
        let user_email = format!("user.email={}", COMMIT_AUTHOR_EMAIL);
        run_git(
            [
                "-c",
                user_name.as_str(),
                "-c",
                user_email.as_str(),
                "commit",
                "--quiet",
                "--allow-empty",
                "-m",
                args.commit_message.as_str(),
            ],
            &args.clone_path,
            ctx.command_timeout,
        )
        .await?;

        let head = run_git(
            ["rev-parse", "--short", "HEAD"],
            &args.clone_path,
            ctx.command_timeout,
        )
        .await?;

        Ok(format!(
            "Committed {} in {}",
            head.trim(),
            args.clone_path.display()
        ))
    }
}

/// A `file://` source is a local path and is held to the data root like any other.
fn confine_local_source(repo_url: &str, root: &DataRoot) -> Result<(), TaskError> {
    let Ok(url) = url::Url::parse(repo_url) else {
        return Ok(());
    };
    if url.scheme() != "file" {
        return Ok(());
    }

    let path = url
        .to_file_path()
        .map_err(|_| TaskError::InvalidArguments(format!("`{}` is not a local path", repo_url)))?;
    root.resolve(&path.to_string_lossy())?;
    Ok(())
}

async fn run_git<I, S>(args: I, cwd: &Path, timeout: Duration) -> Result<String, TaskError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    run_program("git", args, cwd, timeout).await
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::tools::testing::{context, run};
    use serde_json::json;
    use std::process::Command;

    fn git(cwd: &Path, args: &[&str]) -> String {
        let out = Command::new("git")
            .args(["-c", "user.name=t", "-c", "user.email=t@t"])
            .args(args)
            .current_dir(cwd)
            .output()
            .unwrap();
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
        String::from_utf8_lossy(&out.stdout).into_owned()
    }

    fn init_upstream(path: &Path) {
        std::fs::create_dir_all(path).unwrap();
        git(path, &["init", "--quiet"]);
        std::fs::write(path.join("README.md"), "# repo\n").unwrap();
        git(path, &["add", "README.md"]);
        git(path, &["commit", "--quiet", "-m", "initial"]);
    }

    #[tokio::test]
    async fn clones_and_commits() {
        let (dir, ctx) = context();
        let upstream = ctx.data_root.path().join("upstream");
        init_upstream(&upstream);
        let repo_url = format!("file://{}", upstream.display());

        run(
            &GitCommit,
            json!({"repo_url": repo_url, "clone_path": "repo", "commit_message": "Update data"}),
            &ctx,
        )
        .await
        .unwrap();

        let clone = dir.path().join("repo");
        let log = git(&clone, &["log", "--format=%s"]);
        assert_eq!(log.lines().collect::<Vec<_>>(), vec!["Update data", "initial"]);
    }

    #[tokio::test]
    async fn local_source_outside_root_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        init_upstream(outside.path());
        let (dir, ctx) = context();

        let err = run(
            &GitCommit,
            json!({
                "repo_url": format!("file://{}", outside.path().display()),
                "clone_path": "repo"
            }),
            &ctx,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TaskError::PathNotAllowed(_)));
        assert!(!dir.path().join("repo").exists());
    }

    #[tokio::test]
    async fn refuses_existing_clone_path() {
        let (dir, ctx) = context();
        std::fs::create_dir(dir.path().join("repo")).unwrap();

        let err = run(
            &GitCommit,
            json!({"repo_url": "https://example.com/x.git", "clone_path": "repo"}),
            &ctx,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TaskError::InvalidData(_)));
    }
}
