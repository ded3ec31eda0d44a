//! Image-guided fixes: the model compares a screenshot (or mockup) and a
//! prompt against the code and proposes edits.

use crate::fix::{apply_proposal, FixOutcome};
use crate::llm::prompts;
use crate::llm::{extract_json, CompletionModel, CompletionRequest, Part};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    /// Base64-encoded PNG bytes.
    Base64(String),
    Url(String),
}

#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub code: String,
    pub prompt: String,
    pub image: Option<ImageInput>,
    pub model: String,
    pub timeout: Duration,
}

/// Instruction and user prompt, then the image (if any), then the code.
pub fn vision_parts(request: &VisionRequest) -> Vec<Part> {
    let mut parts = vec![Part::text(prompts::vision_instruction(&request.prompt))];
    match &request.image {
        Some(ImageInput::Base64(data)) => parts.push(Part::png(data.clone())),
        Some(ImageInput::Url(url)) => parts.push(Part::ImageUrl(url.clone())),
        None => {}
    }
    parts.push(Part::text(prompts::vision_code_part(&request.code)));
    parts
}

pub async fn vision_fix(
    llm: &dyn CompletionModel,
    request: &VisionRequest,
) -> anyhow::Result<FixOutcome> {
    let response = llm
        .complete(CompletionRequest::multimodal(
            request.model.clone(),
            vision_parts(request),
            request.timeout,
        ))
        .await?;
    apply_proposal(&request.code, extract_json(&response.content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    fn request(image: Option<ImageInput>) -> VisionRequest {
        VisionRequest {
            code: "color = 'red'\n".into(),
            prompt: "The button should be blue".into(),
            image,
            model: "gemini-2.5-pro".into(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn parts_are_ordered_text_image_code() {
        let parts = vision_parts(&request(Some(ImageInput::Base64("iVBORw0KGgo=".into()))));
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0], Part::Text(t) if t.ends_with("User prompt:\nThe button should be blue")));
        assert_eq!(parts[1], Part::png("iVBORw0KGgo="));
        assert!(matches!(&parts[2], Part::Text(t) if t.contains("```python\ncolor = 'red'\n")));
    }

    #[test]
    fn url_image_and_no_image() {
        let parts = vision_parts(&request(Some(ImageInput::Url("https://example.com/a.png".into()))));
        assert_eq!(parts[1], Part::ImageUrl("https://example.com/a.png".into()));
        assert_eq!(vision_parts(&request(None)).len(), 2);
    }

    #[tokio::test]
    async fn vision_fix_is_non_streaming_and_applies_edits() {
        let llm = ScriptedModel::replying([r#"{"edits": [{"line": 1, "new": "color = 'blue'"}]}"#]);
        let outcome = vision_fix(&llm, &request(None)).await.unwrap();
        assert_eq!(outcome.code, "color = 'blue'\n");
        assert!(!llm.requests()[0].stream);
    }
}
