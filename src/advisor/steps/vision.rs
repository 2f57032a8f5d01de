//! Vision — diagnose a pending crop photo. Non-terminal: the diagnosis is
//! merged into state and routing continues toward the advisory.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use tracing::warn;

use crate::advisor::coerce::coerce_image_diagnosis;
use crate::advisor::lang::language_name;
use crate::advisor::orchestrator::Advisor;
use crate::advisor::route::StepName;
use crate::advisor::steps::StepUpdate;
use crate::llm::{CompletionRequest, extract_json_object};
use crate::session::SessionState;

const VISION_TEMPERATURE: f32 = 0.2;
/// Fallback issue text is clipped to this when the model answers in prose.
const MAX_PROSE_ISSUE_CHARS: usize = 140;

impl Advisor {
    pub(crate) async fn step_vision(&self, state: &SessionState) -> StepUpdate {
        let mut update = StepUpdate::for_step(StepName::Vision);

        let Some(image) = &state.last_image else {
            update.image_diagnosis = Some(None);
            return update;
        };

        let data_url = match data_url_from_file(&image.file_path).await {
            Ok(url) => url,
            Err(e) => {
                warn!(path = %image.file_path, error = %e, "reading image failed");
                update.image_diagnosis = Some(None);
                return update;
            }
        };

        let caption = image.caption.as_deref().unwrap_or("");
        let crop = state.context.crop.as_deref().unwrap_or("crop");
        let stage = state.context.stage;
        let lang_name = language_name(&state.context.language);

        let prompt = format!(
            "Analyze this crop image.\nCrop: {crop}\nStage: {stage}\nCaption: {caption}\n\n\
             Return ONLY JSON keys exactly:\n\
             issue, likely_causes(list), actions_now(list), watch_out_for(list), \
             confidence(low|medium|high), needs_human_review(boolean).\n\
             Keep short: max 3 causes, 3 actions, 2 watch.\n\
             No pesticide dosage/mixing ratios.\n\
             Respond in {lang_name}."
        );

        let request = CompletionRequest::new(prompt)
            .with_image_data_url(data_url)
            .with_temperature(VISION_TEMPERATURE);

        match self.llm.complete(request).await {
            Ok(resp) => {
                let raw = extract_json_object(&resp.content).unwrap_or("{}");
                let value: Value = serde_json::from_str(raw).unwrap_or(Value::Null);
                let value = if value.is_object() {
                    value
                } else {
                    // Prose answer: keep a clipped slice as the issue.
                    let issue: String = resp.content.chars().take(MAX_PROSE_ISSUE_CHARS).collect();
                    serde_json::json!({"issue": issue})
                };
                update.image_diagnosis = Some(Some(coerce_image_diagnosis(&value)));
            }
            Err(e) => {
                warn!(error = %e, "vision diagnosis failed");
                update.image_diagnosis = Some(None);
            }
        }

        update
    }
}

/// Read an image file into a base64 data URL, guessing the MIME type from
/// the extension.
async fn data_url_from_file(path: &str) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    let mime = match std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    };
    Ok(format!("data:{mime};base64,{}", BASE64.encode(bytes)))
}

// ── Tests ───────────────────────────────────────────────────────────
