use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::settings::Settings;

/// What the server can do after bootstrap: either run the pipeline or show
/// why it cannot.
pub enum Backend {
    Ready(Pipeline),
    Halted(PipelineError),
}

pub struct ServerState {
    pub settings: Settings,
    pub backend: Backend,
}

impl ServerState {
    pub fn new(settings: Settings, backend: Backend) -> Self {
        Self { settings, backend }
    }
}
