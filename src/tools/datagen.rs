//! Tasks backed by external developer tooling (`uv`, `npx`).

use std::ffi::OsStr;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use super::process::run_program;
use super::{DecodedArgs, Param, TaskContext, TaskError, Tool};

/// Run the data generation script for an email address.
pub struct GenerateData;

#[derive(Deserialize)]
struct GenerateDataArgs {
    email: String,
}

#[async_trait]
impl Tool for GenerateData {
    fn name(&self) -> &str {
        "generate_data"
    }

    fn description(&self) -> &str {
        "Runs the `datagen.py` script with `uv run` to generate the data files needed by the other tasks. Pass the email address exactly as given in the request."
    }

    fn parameters(&self) -> Vec<Param> {
        vec![Param::string(
            "email",
            "The email address to pass as the only argument to `datagen.py`. Do not change it.",
        )
        .pattern(r"^[\w.+-]+@[\w-]+(\.[\w-]+)*\.\w+$")]
    }

    async fn execute(&self, args: DecodedArgs, ctx: &TaskContext) -> Result<String, TaskError> {
        let args: GenerateDataArgs = args.into_typed()?;

        let stdout = run_program(
            "uv",
            ["run", ctx.datagen_script_url.as_str(), args.email.as_str()],
            ctx.data_root.path(),
            ctx.command_timeout,
        )
        .await?;

        Ok(if stdout.is_empty() {
            format!("Generated data for {}", args.email)
        } else {
            stdout
        })
    }
}

/// Format a Markdown file in place with prettier.
pub struct FormatMarkdown;

#[derive(Deserialize)]
struct FormatMarkdownArgs {
    prettier_version: String,
    filename: PathBuf,
}

#[async_trait]
impl Tool for FormatMarkdown {
    fn name(&self) -> &str {
        "format_markdown"
    }

    fn description(&self) -> &str {
        "Formats a Markdown file in place using `prettier` run through `npx`. Provide the prettier package with its exact version and the Markdown file to format."
    }

    fn parameters(&self) -> Vec<Param> {
        vec![
            Param::string(
                "prettier_version",
                "The prettier package and version to run, e.g. `prettier@3.4.2`.",
            )
            .pattern(r"^prettier@\d+\.\d+\.\d+$")
            .default("prettier@3.4.2"),
            Param::path("filename", "Path of the Markdown file to format in place.")
                .pattern(r"\.md$"),
        ]
    }

    async fn execute(&self, args: DecodedArgs, ctx: &TaskContext) -> Result<String, TaskError> {
        let args: FormatMarkdownArgs = args.into_typed()?;

        if !args.filename.is_file() {
            return Err(TaskError::InvalidData(format!(
                "{} does not exist",
                args.filename.display()
            )));
        }

        run_program(
            "npx",
            [
                OsStr::new("--yes"),
                OsStr::new(&args.prettier_version),
                OsStr::new("--write"),
                args.filename.as_os_str(),
            ],
            ctx.data_root.path(),
            ctx.command_timeout,
        )
        .await?;

        Ok(format!(
            "Formatted {} with {}",
            args.filename.display(),
            args.prettier_version
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{context, run};
    use crate::tools::ArgSchema;
    use serde_json::json;

    #[test]
    fn email_pattern_accepts_addresses_and_rejects_garbage() {
        let schema = ArgSchema::compile(GenerateData.parameters()).unwrap();
        let ok = json!({"email": "23f1000422@ds.study.iitm.ac.in"});
        assert!(schema.decode(ok.as_object().unwrap()).is_ok());

        let bad = json!({"email": "not-an-email"});
        let err = schema.decode(bad.as_object().unwrap()).unwrap_err();
        assert_eq!(err.field, "email");
    }

    #[test]
    fn prettier_version_defaults_and_is_validated() {
        let schema = ArgSchema::compile(FormatMarkdown.parameters()).unwrap();
        let args = schema
            .decode(json!({"filename": "/data/format.md"}).as_object().unwrap())
            .unwrap();
        assert_eq!(args.values()["prettier_version"], "prettier@3.4.2");

        let err = schema
            .decode(
                json!({"filename": "/data/format.md", "prettier_version": "prettier@latest"})
                    .as_object()
                    .unwrap(),
            )
            .unwrap_err();
        assert_eq!(err.field, "prettier_version");
    }

    #[tokio::test]
    async fn format_markdown_requires_existing_file() {
        let (_dir, ctx) = context();
        let err = run(&FormatMarkdown, json!({"filename": "missing.md"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::InvalidData(_)));
    }
}
