//! Web access tasks: download a URL and scrape text with CSS selectors.

use std::path::PathBuf;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Deserialize;

use super::{write_output, DecodedArgs, Param, TaskContext, TaskError, Tool};

const URL_PATTERN: &str = r"^https?://";

/// Download a URL and save the body.
pub struct FetchUrl;

#[derive(Deserialize)]
struct FetchUrlArgs {
    url: String,
    save_path: PathBuf,
}

#[async_trait]
impl Tool for FetchUrl {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Fetches data from an http(s) URL (for example an API endpoint) and saves the response body unchanged to a file."
    }

    fn parameters(&self) -> Vec<Param> {
        vec![
            Param::string("url", "The http or https URL to fetch.").pattern(URL_PATTERN),
            Param::path("save_path", "File the response body is saved to."),
        ]
    }

    async fn execute(&self, args: DecodedArgs, ctx: &TaskContext) -> Result<String, TaskError> {
        let args: FetchUrlArgs = args.into_typed()?;

        let body = fetch(ctx, &args.url).await?;
        let len = body.len();
        write_output(&args.save_path, body).await?;

        Ok(format!(
            "Saved {} bytes from {} to {}",
            len,
            args.url,
            args.save_path.display()
        ))
    }
}

/// Extract the text of matching elements from a web page.
pub struct ScrapeWebsite;

#[derive(Deserialize)]
struct ScrapeWebsiteArgs {
    url: String,
    selector: String,
    output_file: PathBuf,
}

#[async_trait]
impl Tool for ScrapeWebsite {
    fn name(&self) -> &str {
        "scrape_website"
    }

    fn description(&self) -> &str {
        "Downloads a web page and extracts the text of every element matching a CSS selector, saving the texts as a JSON array to an output file."
    }

    fn parameters(&self) -> Vec<Param> {
        vec![
            Param::string("url", "The http or https URL of the page.").pattern(URL_PATTERN),
            Param::string("selector", "CSS selector of the elements to extract, e.g. `h2.title`."),
            Param::path("output_file", "File the JSON array of texts is written to."),
        ]
    }

    async fn execute(&self, args: DecodedArgs, ctx: &TaskContext) -> Result<String, TaskError> {
        let args: ScrapeWebsiteArgs = args.into_typed()?;

        // Fail on a bad selector before going to the network.
        let selector = parse_selector(&args.selector)?;

        let body = fetch(ctx, &args.url).await?;
        let html = String::from_utf8_lossy(&body);
        let texts = select_text(&html, &selector);

        let json = serde_json::to_string_pretty(&texts)
            .map_err(|e| TaskError::Internal(e.to_string()))?;
        write_output(&args.output_file, json).await?;

        Ok(format!(
            "Extracted {} elements matching `{}`",
            texts.len(),
            args.selector
        ))
    }
}

async fn fetch(ctx: &TaskContext, url: &str) -> Result<bytes::Bytes, TaskError> {
    tracing::info!(url, "Fetching URL");

    let response = ctx
        .http
        .get(url)
        .send()
        .await
        .map_err(|e| TaskError::Upstream(format!("GET {} failed: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(TaskError::Upstream(format!("GET {} returned {}", url, status)));
    }

    response
        .bytes()
        .await
        .map_err(|e| TaskError::Upstream(format!("reading body of {} failed: {}", url, e)))
}

fn parse_selector(selector: &str) -> Result<Selector, TaskError> {
    Selector::parse(selector)
        .map_err(|e| TaskError::InvalidArguments(format!("invalid CSS selector `{}`: {}", selector, e)))
}

/// Whitespace-collapsed text of every element matching `selector`.
fn select_text(html: &str, selector: &Selector) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(selector)
        .map(|element| {
            element
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}
