//! Local file tasks: dates, contacts, logs, docs index, email headers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Weekday};
use serde::Deserialize;
use serde_json::Value;
use walkdir::WalkDir;

use super::{read_text, write_output, DecodedArgs, Param, TaskContext, TaskError, Tool};

/// Date-only layouts tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d-%b-%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%a, %d %b %Y",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d.%m.%Y",
];

/// Date-time layouts tried after the date-only ones.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d-%b-%Y %H:%M:%S",
];

// ─────────────────────────────────────────────────────────────────────────────
// Weekday counting
// ─────────────────────────────────────────────────────────────────────────────

/// Count the dates in a file that fall on a given weekday.
pub struct CountWeekdays;

#[derive(Deserialize)]
struct CountWeekdaysArgs {
    filename: PathBuf,
    targetfile: PathBuf,
    weekday: String,
}

#[async_trait]
impl Tool for CountWeekdays {
    fn name(&self) -> &str {
        "count_weekdays"
    }

    fn description(&self) -> &str {
        "Counts how many dates in a text file (one date per line, in mixed formats) fall on a specific weekday and writes the count to a target file."
    }

    fn parameters(&self) -> Vec<Param> {
        vec![
            Param::path("filename", "Path of the dates file, one date per line.")
                .pattern(r"\.txt$"),
            Param::path("targetfile", "Path of the file the count is written to.")
                .pattern(r"\.txt$"),
            Param::string("weekday", "The weekday to count, e.g. `Wednesday`.")
                .pattern(r"(?i)^\s*(mon|tue|wed|thu|fri|sat|sun)[a-z]*\s*$"),
        ]
    }

    async fn execute(&self, args: DecodedArgs, _ctx: &TaskContext) -> Result<String, TaskError> {
        let args: CountWeekdaysArgs = args.into_typed()?;
        let weekday = Weekday::from_str(args.weekday.trim())
            .map_err(|_| TaskError::InvalidArguments(format!("unknown weekday `{}`", args.weekday)))?;

        let text = read_text(&args.filename).await?;
        let count = count_weekday(&text, weekday)?;

        write_output(&args.targetfile, count.to_string()).await?;
        Ok(format!("Counted {} {:?} dates", count, weekday))
    }
}

fn count_weekday(text: &str, weekday: Weekday) -> Result<usize, TaskError> {
    let mut count = 0;
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let date = parse_date(line).ok_or_else(|| {
            TaskError::InvalidData(format!("line {}: unrecognized date `{}`", index + 1, line))
        })?;
        if date.weekday() == weekday {
            count += 1;
        }
    }
    Ok(count)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
        .or_else(|| DateTime::parse_from_rfc2822(s).ok().map(|dt| dt.date_naive()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Contacts
// ─────────────────────────────────────────────────────────────────────────────

/// Sort a JSON array of contacts by last then first name.
pub struct SortContacts;

#[derive(Deserialize)]
struct SortContactsArgs {
    filename: PathBuf,
    targetfile: PathBuf,
}

#[async_trait]
impl Tool for SortContacts {
    fn name(&self) -> &str {
        "sort_contacts"
    }

    fn description(&self) -> &str {
        "Sorts a JSON file containing an array of contact objects by `last_name`, then `first_name`, and writes the sorted array to a target JSON file."
    }

    fn parameters(&self) -> Vec<Param> {
        vec![
            Param::path("filename", "Path of the JSON contacts file.")
                .pattern(r"\.json$")
                .default("contacts.json"),
            Param::path("targetfile", "Path the sorted JSON is written to.")
                .pattern(r"\.json$")
                .default("contacts-sorted.json"),
        ]
    }

    async fn execute(&self, args: DecodedArgs, _ctx: &TaskContext) -> Result<String, TaskError> {
        let args: SortContactsArgs = args.into_typed()?;

        let text = read_text(&args.filename).await?;
        let mut contacts: Vec<Value> = serde_json::from_str(&text).map_err(|e| {
            TaskError::InvalidData(format!("{} is not a JSON array: {}", args.filename.display(), e))
        })?;

        contacts.sort_by(|a, b| {
            let key = |c: &Value, field: &str| c[field].as_str().unwrap_or_default().to_string();
            (key(a, "last_name"), key(a, "first_name")).cmp(&(key(b, "last_name"), key(b, "first_name")))
        });

        let sorted = serde_json::to_string_pretty(&contacts)
            .map_err(|e| TaskError::Internal(e.to_string()))?;
        write_output(&args.targetfile, sorted).await?;
        Ok(format!("Sorted {} contacts", contacts.len()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logs
// ─────────────────────────────────────────────────────────────────────────────

/// Collect the first line of the most recently modified `.log` files.
pub struct RecentLogLines;

#[derive(Deserialize)]
struct RecentLogLinesArgs {
    log_dir_path: PathBuf,
    output_file_path: PathBuf,
    num_files: usize,
}

#[async_trait]
impl Tool for RecentLogLines {
    fn name(&self) -> &str {
        "recent_log_lines"
    }

    fn description(&self) -> &str {
        "Writes the first line of each of the N most recently modified `.log` files in a directory to a text file, most recent first."
    }

    fn parameters(&self) -> Vec<Param> {
        vec![
            Param::path("log_dir_path", "Directory containing the `.log` files.").default("logs"),
            Param::path("output_file_path", "Text file the first lines are written to.")
                .pattern(r"\.txt$")
                .default("logs-recent.txt"),
            Param::integer("num_files", "How many of the most recent log files to read.")
                .minimum(1)
                .default(10),
        ]
    }

    async fn execute(&self, args: DecodedArgs, _ctx: &TaskContext) -> Result<String, TaskError> {
        let args: RecentLogLinesArgs = args.into_typed()?;

        let logs = most_recent_logs(&args.log_dir_path, args.num_files).await?;
        let mut out = String::new();
        for path in &logs {
            let text = read_text(path).await?;
            out.push_str(text.lines().next().unwrap_or_default().trim());
            out.push('\n');
        }

        write_output(&args.output_file_path, out).await?;
        Ok(format!("Collected first lines of {} log files", logs.len()))
    }
}

async fn most_recent_logs(dir: &Path, limit: usize) -> Result<Vec<PathBuf>, TaskError> {
    let io_err = |e| TaskError::io(format!("Failed to list {}", dir.display()), e);
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;

    let mut logs: Vec<(SystemTime, PathBuf)> = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }
        let metadata = entry.metadata().await.map_err(io_err)?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().map_err(io_err)?;
        logs.push((modified, path));
    }

    logs.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    Ok(logs.into_iter().take(limit).map(|(_, path)| path).collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Markdown docs index
// ─────────────────────────────────────────────────────────────────────────────

/// Map every Markdown file under a directory to its first H1.
pub struct IndexMarkdownDocs;

#[derive(Deserialize)]
struct IndexMarkdownDocsArgs {
    doc_dir_path: PathBuf,
    output_file_path: PathBuf,
}

#[async_trait]
impl Tool for IndexMarkdownDocs {
    fn name(&self) -> &str {
        "index_markdown_docs"
    }

    fn description(&self) -> &str {
        "Finds every Markdown (.md) file under a docs directory, extracts the first H1 heading of each, and writes a JSON index mapping each file path (relative to the docs directory) to its title."
    }

    fn parameters(&self) -> Vec<Param> {
        vec![
            Param::path("doc_dir_path", "Directory containing the Markdown files.").default("docs"),
            Param::path("output_file_path", "JSON file the index is written to.")
                .pattern(r"\.json$")
                .default("docs/index.json"),
        ]
    }

    async fn execute(&self, args: DecodedArgs, _ctx: &TaskContext) -> Result<String, TaskError> {
        let args: IndexMarkdownDocsArgs = args.into_typed()?;

        let dir = args.doc_dir_path.clone();
        let index = tokio::task::spawn_blocking(move || build_docs_index(&dir)).await??;

        let json = serde_json::to_string_pretty(&index)
            .map_err(|e| TaskError::Internal(e.to_string()))?;
        write_output(&args.output_file_path, json).await?;
        Ok(format!("Indexed {} Markdown files", index.len()))
    }
}

fn build_docs_index(dir: &Path) -> Result<BTreeMap<String, String>, TaskError> {
    if !dir.is_dir() {
        return Err(TaskError::InvalidData(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut index = BTreeMap::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| TaskError::InvalidData(e.to_string()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| TaskError::io(format!("Failed to read {}", path.display()), e))?;
        let title = text
            .lines()
            .find_map(|line| line.strip_prefix("# "))
            .map(|title| title.trim().to_string());

        if let (Some(title), Ok(relative)) = (title, path.strip_prefix(dir)) {
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            index.insert(key, title);
        }
    }
    Ok(index)
}

// ─────────────────────────────────────────────────────────────────────────────
// Email sender
// ─────────────────────────────────────────────────────────────────────────────

/// Extract the sender address from an email message.
pub struct ExtractEmailSender;

#[derive(Deserialize)]
struct ExtractEmailSenderArgs {
    filename: PathBuf,
    output_file: PathBuf,
}

#[async_trait]
impl Tool for ExtractEmailSender {
    fn name(&self) -> &str {
        "extract_email_sender"
    }

    fn description(&self) -> &str {
        "Extracts the sender's email address from the `From:` header of an email message stored in a text file and writes just the address to an output text file."
    }

    fn parameters(&self) -> Vec<Param> {
        vec![
            Param::path("filename", "Text file containing the email message.")
                .pattern(r"\.txt$")
                .default("email.txt"),
            Param::path("output_file", "Text file the sender address is written to.")
                .pattern(r"\.txt$")
                .default("email-sender.txt"),
        ]
    }

    async fn execute(&self, args: DecodedArgs, _ctx: &TaskContext) -> Result<String, TaskError> {
        let args: ExtractEmailSenderArgs = args.into_typed()?;

        let text = read_text(&args.filename).await?;
        let sender = sender_address(&text).ok_or_else(|| {
            TaskError::InvalidData(format!("no From header in {}", args.filename.display()))
        })?;

        write_output(&args.output_file, &sender).await?;
        Ok(format!("Sender is {}", sender))
    }
}

fn sender_address(message: &str) -> Option<String> {
    let line = message.lines().find(|line| line.starts_with("From"))?;
    let token = line.split_whitespace().last()?;
    let address = token.trim_start_matches('<').trim_end_matches('>');
    address.contains('@').then(|| address.to_string())
}
