//! Tasks that call back into the model service: image text extraction and embeddings.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;

use super::{read_text, write_output, DecodedArgs, Param, TaskContext, TaskError, Tool};
use crate::llm::{ChatMessage, ChatRequest, ContentPart, ImageUrl};

const CARD_PROMPT: &str = "Extract the 16-digit credit card number from this image. Reply with the digits only, no spaces or other text.";

/// Read a credit card number from an image via the vision model.
pub struct ExtractCreditCard;

#[derive(Deserialize)]
struct ExtractCreditCardArgs {
    image_path: PathBuf,
    filename: PathBuf,
}

#[async_trait]
impl Tool for ExtractCreditCard {
    fn name(&self) -> &str {
        "extract_credit_card"
    }

    fn description(&self) -> &str {
        "Extracts the credit card number shown in an image using a vision model, validates that it has 16 digits, and writes it without spaces to a text file."
    }

    fn parameters(&self) -> Vec<Param> {
        vec![
            Param::path("image_path", "Image containing the credit card.")
                .pattern(r"(?i)\.(png|jpe?g)$")
                .default("credit_card.png"),
            Param::path("filename", "Text file the card number is written to.")
                .pattern(r"\.txt$")
                .default("credit-card.txt"),
        ]
    }

    async fn execute(&self, args: DecodedArgs, ctx: &TaskContext) -> Result<String, TaskError> {
        let args: ExtractCreditCardArgs = args.into_typed()?;

        let bytes = tokio::fs::read(&args.image_path)
            .await
            .map_err(|e| TaskError::io(format!("Failed to read {}", args.image_path.display()), e))?;
        let data_url = format!(
            "data:{};base64,{}",
            image_mime(&args.image_path),
            base64::engine::general_purpose::STANDARD.encode(bytes)
        );

        let request = ChatRequest::new(
            ctx.chat_model.clone(),
            vec![ChatMessage::user_parts(vec![
                ContentPart::Text {
                    text: CARD_PROMPT.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
            ])],
        );
        let response = ctx.llm.chat_completion(&request).await?;
        let reply = response.content.unwrap_or_default();

        let number = normalize_card_number(&reply).ok_or_else(|| {
            TaskError::InvalidData(format!("model reply is not a 16-digit card number: `{}`", reply.trim()))
        })?;

        write_output(&args.filename, &number).await?;
        Ok(format!("Extracted card number ending in {}", &number[12..]))
    }
}

fn image_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "image/png",
    }
}

/// Strip separators and accept exactly 16 digits.
fn normalize_card_number(reply: &str) -> Option<String> {
    let digits: String = reply
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .collect();
    (digits.len() == 16 && digits.chars().all(|c| c.is_ascii_digit())).then_some(digits)
}

/// Find the two most similar lines of a comments file.
pub struct SimilarComments;

#[derive(Deserialize)]
struct SimilarCommentsArgs {
    filename: PathBuf,
    output_filename: PathBuf,
}

#[async_trait]
impl Tool for SimilarComments {
    fn name(&self) -> &str {
        "similar_comments"
    }

    fn description(&self) -> &str {
        "Finds the most similar pair of comments in a text file (one comment per line) using text embeddings and writes the two comments, one per line, to an output file."
    }

    fn parameters(&self) -> Vec<Param> {
        vec![
            Param::path("filename", "Text file with one comment per line.")
                .pattern(r"\.txt$")
                .default("comments.txt"),
            Param::path("output_filename", "Text file the most similar pair is written to.")
                .pattern(r"\.txt$")
                .default("comments-similar.txt"),
        ]
    }

    async fn execute(&self, args: DecodedArgs, ctx: &TaskContext) -> Result<String, TaskError> {
        let args: SimilarCommentsArgs = args.into_typed()?;

        let text = read_text(&args.filename).await?;
        let comments: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if comments.len() < 2 {
            return Err(TaskError::InvalidData(format!(
                "{} needs at least two comments, found {}",
                args.filename.display(),
                comments.len()
            )));
        }

        let vectors = ctx.llm.embeddings(&ctx.embedding_model, &comments).await?;
        let (i, j) = most_similar_pair(&vectors)
            .ok_or_else(|| TaskError::InvalidData("embeddings were empty".to_string()))?;

        write_output(
            &args.output_filename,
            format!("{}\n{}\n", comments[i], comments[j]),
        )
        .await?;
        Ok(format!("Most similar comments are lines {} and {}", i + 1, j + 1))
    }
}

/// Indices `(i, j)` with `i < j` maximizing cosine similarity.
fn most_similar_pair(vectors: &[Vec<f32>]) -> Option<(usize, usize)> {
    let norms: Vec<f32> = vectors
        .iter()
        .map(|v| v.iter().map(|x| x * x).sum::<f32>().sqrt())
        .collect();

    let mut best: Option<(f32, usize, usize)> = None;
    for i in 0..vectors.len() {
        for j in (i + 1)..vectors.len() {
            let dot: f32 = vectors[i].iter().zip(&vectors[j]).map(|(a, b)| a * b).sum();
            let denom = norms[i] * norms[j];
            let similarity = if denom > 0.0 { dot / denom } else { 0.0 };
            if best.map_or(true, |(s, _, _)| similarity > s) {
                best = Some((similarity, i, j));
            }
        }
    }
    best.map(|(_, i, j)| (i, j))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedLlm;
    use crate::llm::MessageContent;
    use crate::tools::testing::{context_with, run};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn card_numbers_are_normalized_and_validated() {
        assert_eq!(
            normalize_card_number(" 4111 1111-1111 1111\n").as_deref(),
            Some("4111111111111111")
        );
        assert_eq!(normalize_card_number("4111 1111 1111"), None);
        assert_eq!(normalize_card_number("The number is 4111111111111111"), None);
    }

    #[tokio::test]
    async fn extract_credit_card_sends_image_and_writes_number() {
        let llm = Arc::new(ScriptedLlm::new().with_text("4026 3998 1234 5678"));
        let (dir, ctx) = context_with(llm.clone());
        std::fs::write(dir.path().join("credit_card.png"), [0x89, b'P', b'N', b'G']).unwrap();

        run(&ExtractCreditCard, json!({}), &ctx).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("credit-card.txt")).unwrap();
        assert_eq!(written, "4026399812345678");

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        match &requests[0].messages[0].content {
            Some(MessageContent::Parts(parts)) => match &parts[1] {
                ContentPart::ImageUrl { image_url } => {
                    assert!(image_url.url.starts_with("data:image/png;base64,"))
                }
                other => panic!("unexpected part {:?}", other),
            },
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[tokio::test]
    async fn extract_credit_card_rejects_bad_reply() {
        let llm = Arc::new(ScriptedLlm::new().with_text("I cannot read this image"));
        let (dir, ctx) = context_with(llm);
        std::fs::write(dir.path().join("credit_card.png"), [0u8; 4]).unwrap();

        let err = run(&ExtractCreditCard, json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, TaskError::InvalidData(_)));
        assert!(!dir.path().join("credit-card.txt").exists());
    }

    #[test]
    fn most_similar_pair_uses_cosine_similarity() {
        let vectors = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 10.0, 1.0],
            vec![-1.0, 0.0, 0.0],
        ];
        assert_eq!(most_similar_pair(&vectors), Some((1, 2)));
        assert_eq!(most_similar_pair(&[vec![1.0]]), None);
    }

    #[tokio::test]
    async fn similar_comments_writes_closest_pair() {
        let llm = Arc::new(ScriptedLlm::new().with_embeddings(vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![0.9, 0.1],
        ]));
        let (dir, ctx) = context_with(llm);
        std::fs::write(
            dir.path().join("comments.txt"),
            "Great product\nTerrible support\n\nReally great product\n",
        )
        .unwrap();

        run(&SimilarComments, json!({}), &ctx).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("comments-similar.txt")).unwrap();
        assert_eq!(written, "Great product\nReally great product\n");
    }
}
