//! Prompt construction and response parsing for batched alt text requests.

use base64::Engine;
use serde::Serialize;

use super::client::{VisionImage, VisionResult};

/// Accessibility guidance sent with every request.
pub const BASE_SYSTEM_PROMPT: &str = r#"You are an expert at writing accessible, SEO-friendly alt text for images.

Your task is to generate concise, descriptive alt text that:
1. Accurately describes the visual content of the image
2. Considers the context of the page (title, headings, adjacent text)
3. Is concise (typically 1-2 sentences, max 125 characters when possible)
4. Follows web accessibility best practices
5. Avoids redundant phrases like "image of" or "picture of"
6. Focuses on what's important and relevant to the page context"#;

pub const PARSE_FAILURE: &str = "Failed to parse alt text from response";

/// One block of a Messages API user turn.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub media_type: String,
    pub data: String,
}

impl ContentBlock {
    fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    fn image(media_type: &str, bytes: &[u8]) -> Self {
        ContentBlock::Image {
            source: ImageSource {
                kind: "base64",
                media_type: media_type.to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            },
        }
    }
}

/// System prompt, with site-specific instructions appended when present.
pub fn system_prompt(instructions: &str) -> String {
    let instructions = instructions.trim();
    if instructions.is_empty() {
        BASE_SYSTEM_PROMPT.to_string()
    } else {
        format!(
            "{}\n\nAdditional instructions for this website:\n{}",
            BASE_SYSTEM_PROMPT, instructions
        )
    }
}

/// Context text for the `index`-th image (1-based).
pub fn context_block(index: usize, image: &VisionImage) -> String {
    let mut parts = Vec::new();
    if !image.title.is_empty() {
        parts.push(format!("Page title: {}", image.title));
    }
    if !image.heading.is_empty() {
        parts.push(format!("Page heading: {}", image.heading));
    }
    if !image.adjacent_text.is_empty() {
        parts.push(format!("Adjacent text: {}", image.adjacent_text));
    }

    let mut block = format!("\n--- Image {} Context ---\n", index);
    if parts.is_empty() {
        block.push_str("No additional context available.\n");
    } else {
        block.push_str(&parts.join("\n"));
        block.push('\n');
    }
    block
}

/// Build the user turn: intro, then context + image per entry, then the answer format.
pub fn user_content(images: &[VisionImage]) -> Vec<ContentBlock> {
    let mut content = Vec::with_capacity(images.len() * 2 + 2);
    content.push(ContentBlock::text(format!(
        "Please generate alt text for the following {} image(s). \
         For each image, provide ONLY the alt text on a single line, \
         in the format 'Image 1:', 'Image 2:', etc.\n\n",
        images.len()
    )));

    for (i, image) in images.iter().enumerate() {
        content.push(ContentBlock::text(context_block(i + 1, image)));
        content.push(ContentBlock::image(&image.media_type, &image.bytes));
    }

    content.push(ContentBlock::text(
        "\n\nPlease provide the alt text for each image, one per line, in the format: 'Image 1: [alt text]'",
    ));
    content
}

/// Map `Image N: ...` lines back to the submitted images by position.
pub fn parse_response(response: &str, images: &[VisionImage]) -> Vec<VisionResult> {
    let mut found: Vec<Option<String>> = vec![None; images.len()];

    for line in response.lines() {
        let line = line.trim().trim_start_matches(['*', '-', '#', ' ']);
        if line.is_empty() {
            continue;
        }
        for (i, slot) in found.iter_mut().enumerate() {
            let prefix = format!("Image {}:", i + 1);
            if let Some(rest) = line.strip_prefix(&prefix) {
                let text = rest.trim_start_matches('*').trim();
                if !text.is_empty() {
                    *slot = Some(text.to_string());
                }
                break;
            }
        }
    }

    images
        .iter()
        .zip(found)
        .map(|(image, alt_text)| match alt_text {
            Some(text) => VisionResult::success(&image.image_url, text),
            None => VisionResult::failure(&image.image_url, PARSE_FAILURE),
        })
        .collect()
}
