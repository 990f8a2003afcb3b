use strum_macros::Display;

/// The stage of the reduction a status message refers to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum Stage {
    #[default]
    Loading,
    Normalizing,
    Exporting,
}

/// Progress message sent from a reduction to whoever is watching it (typically the UI)
#[derive(Debug, Clone, Default)]
pub struct ReductionStatus {
    pub progress: f32,
    pub stage: Stage,
    pub message: String,
}

impl ReductionStatus {
    pub fn new(progress: f32, stage: Stage, message: &str) -> Self {
        Self {
            progress,
            stage,
            message: message.to_string(),
        }
    }
}
