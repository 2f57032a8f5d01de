//! Step executors.
//!
//! One module per concern. Every executor receives the working state by
//! reference and returns a sparse [`StepUpdate`] naming only the fields it
//! changed; the orchestrator merges the update back. Executors never error:
//! provider failures keep the previous cached value, generation failures
//! emit a fixed fallback message.

pub mod ask;
pub mod buy;
pub mod generate;
pub mod intake;
pub mod refresh;
pub mod vision;

use crate::advisor::StepName;
use crate::session::{
    Advisory, ChatMessage, FarmerContext, ImageDiagnosis, Observation, WeatherSnapshot, WebContext,
};

/// A sparse state update. `None` means "unchanged"; the double-`Option`
/// fields distinguish "unchanged" from "explicitly cleared".
#[derive(Debug, Default)]
pub struct StepUpdate {
    pub step: Option<StepName>,
    pub context: Option<FarmerContext>,
    pub observation: Option<Observation>,
    pub weather: Option<WeatherSnapshot>,
    pub web: Option<WebContext>,
    pub schemes: Option<WebContext>,
    pub market: Option<WebContext>,
    pub image_diagnosis: Option<Option<ImageDiagnosis>>,
    pub advisory: Option<Option<Advisory>>,
    pub messages: Option<Vec<ChatMessage>>,
}

impl StepUpdate {
    pub fn for_step(step: StepName) -> Self {
        Self {
            step: Some(step),
            ..Self::default()
        }
    }
}
