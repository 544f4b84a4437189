//! Image resizing and Markdown rendering.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat};
use pulldown_cmark::{html, Options, Parser};
use serde::Deserialize;

use super::{read_text, write_output, DecodedArgs, Param, TaskContext, TaskError, Tool};

const IMAGE_PATTERN: &str = r"(?i)\.(jpe?g|png|gif|bmp)$";

/// Largest accepted target width or height.
const MAX_DIMENSION: i64 = 10_000;

/// Resize and/or convert an image.
pub struct ProcessImage;

#[derive(Deserialize)]
struct ProcessImageArgs {
    image_path: PathBuf,
    output_path: PathBuf,
    width: Option<u32>,
    height: Option<u32>,
}

#[async_trait]
impl Tool for ProcessImage {
    fn name(&self) -> &str {
        "process_image"
    }

    fn description(&self) -> &str {
        "Loads an image (jpg, png, gif or bmp), resizes it to exactly width x height pixels when both are given, and saves it to the output path. The output format follows the output file extension."
    }

    fn parameters(&self) -> Vec<Param> {
        vec![
            Param::path("image_path", "Image to process.").pattern(IMAGE_PATTERN),
            Param::path("output_path", "Where the processed image is saved.").pattern(IMAGE_PATTERN),
            Param::integer("width", "Target width in pixels.")
                .minimum(1)
                .maximum(MAX_DIMENSION)
                .optional(),
            Param::integer("height", "Target height in pixels.")
                .minimum(1)
                .maximum(MAX_DIMENSION)
                .optional(),
        ]
    }

    async fn execute(&self, args: DecodedArgs, _ctx: &TaskContext) -> Result<String, TaskError> {
        let args: ProcessImageArgs = args.into_typed()?;

        if let Some(parent) = args.output_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TaskError::io(format!("Failed to create {}", parent.display()), e))?;
        }

        let size = args.width.zip(args.height);
        let input = args.image_path.clone();
        let output = args.output_path.clone();
        let (width, height) =
            tokio::task::spawn_blocking(move || process_image(&input, &output, size)).await??;

        tracing::debug!(path = %args.output_path.display(), width, height, "Saved image");
        Ok(format!(
            "Saved {}x{} image to {}",
            width,
            height,
            args.output_path.display()
        ))
    }
}

fn process_image(
    input: &Path,
    output: &Path,
    size: Option<(u32, u32)>,
) -> Result<(u32, u32), TaskError> {
    let img = image::open(input).map_err(|e| image_error(input, e))?;

    let img = match size {
        Some((width, height)) => img.resize_exact(width, height, FilterType::Lanczos3),
        None => img,
    };

    // JPEG has no alpha channel.
    let img = match ImageFormat::from_path(output) {
        Ok(ImageFormat::Jpeg) => DynamicImage::ImageRgb8(img.to_rgb8()),
        _ => img,
    };

    img.save(output).map_err(|e| image_error(output, e))?;
    Ok((img.width(), img.height()))
}

fn image_error(path: &Path, e: ImageError) -> TaskError {
    match e {
        ImageError::IoError(source) => {
            TaskError::io(format!("Failed to access {}", path.display()), source)
        }
        ImageError::Unsupported(e) => {
            TaskError::Unsupported(format!("{}: {}", path.display(), e))
        }
        other => TaskError::InvalidData(format!("{}: {}", path.display(), other)),
    }
}

/// Render a Markdown file to an HTML fragment.
pub struct MarkdownToHtml;

#[derive(Deserialize)]
struct MarkdownToHtmlArgs {
    md_path: PathBuf,
    output_path: PathBuf,
}

#[async_trait]
impl Tool for MarkdownToHtml {
    fn name(&self) -> &str {
        "markdown_to_html"
    }

    fn description(&self) -> &str {
        "Converts a Markdown file to HTML (including tables and strikethrough) and saves the HTML to the output path."
    }

    fn parameters(&self) -> Vec<Param> {
        vec![
            Param::path("md_path", "Markdown file to convert.").pattern(r"\.md$"),
            Param::path("output_path", "File the HTML is written to."),
        ]
    }

    async fn execute(&self, args: DecodedArgs, _ctx: &TaskContext) -> Result<String, TaskError> {
        let args: MarkdownToHtmlArgs = args.into_typed()?;

        let markdown = read_text(&args.md_path).await?;
        let rendered = render_markdown(&markdown);
        write_output(&args.output_path, &rendered).await?;

        Ok(format!(
            "Converted {} to {}",
            args.md_path.display(),
            args.output_path.display()
        ))
    }
}

fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{context, run};
    use image::{Rgb, RgbImage};
    use serde_json::json;

    fn write_png(path: &Path, width: u32, height: u32) {
        RgbImage::from_pixel(width, height, Rgb([200, 10, 10]))
            .save(path)
            .unwrap();
    }

    #[tokio::test]
    async fn resizes_when_both_dimensions_given() {
        let (dir, ctx) = context();
        write_png(&dir.path().join("in.png"), 8, 4);

        run(
            &ProcessImage,
            json!({"image_path": "in.png", "output_path": "out/small.png", "width": 3, "height": 5}),
            &ctx,
        )
        .await
        .unwrap();

        let dims = image::image_dimensions(dir.path().join("out/small.png")).unwrap();
        assert_eq!(dims, (3, 5));
    }

    #[tokio::test]
    async fn converts_format_without_resizing() {
        let (dir, ctx) = context();
        write_png(&dir.path().join("in.png"), 8, 4);

        run(
            &ProcessImage,
            json!({"image_path": "in.png", "output_path": "in.jpg", "width": 3}),
            &ctx,
        )
        .await
        .unwrap();

        let path = dir.path().join("in.jpg");
        assert_eq!(image::image_dimensions(&path).unwrap(), (8, 4));
        assert_eq!(
            image::ImageFormat::from_path(&path).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[test]
    fn oversized_dimensions_are_rejected_before_resizing() {
        let schema = crate::tools::ArgSchema::compile(ProcessImage.parameters()).unwrap();
        let payload = json!({
            "image_path": "in.png",
            "output_path": "out.png",
            "width": 100_000,
            "height": 100_000
        });

        let err = schema.decode(payload.as_object().unwrap()).unwrap_err();
        assert_eq!(err.field, "width");
    }

    #[tokio::test]
    async fn corrupt_image_is_invalid_data() {
        let (dir, ctx) = context();
        std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();

        let err = run(
            &ProcessImage,
            json!({"image_path": "broken.png", "output_path": "out.png"}),
            &ctx,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TaskError::InvalidData(_)), "{:?}", err);
    }

    #[test]
    fn renders_tables_and_strikethrough() {
        let html = render_markdown("# Title\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\n~~old~~ new\n");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>1</td>"));
        assert!(html.contains("<del>old</del>"));
    }

    #[tokio::test]
    async fn markdown_to_html_writes_output() {
        let (dir, ctx) = context();
        std::fs::write(dir.path().join("notes.md"), "Some *emphasis*\n").unwrap();

        run(
            &MarkdownToHtml,
            json!({"md_path": "notes.md", "output_path": "html/notes.html"}),
            &ctx,
        )
        .await
        .unwrap();

        let html = std::fs::read_to_string(dir.path().join("html/notes.html")).unwrap();
        assert_eq!(html, "<p>Some <em>emphasis</em></p>\n");
    }
}
