//! Null-Object generator for kinds with no registered implementation.

use super::{AgentKind, ArtifactOutput, ArtifactPayload, GenerationContext, GeneratorAgent};
use crate::error::ApiError;
use crate::section::Section;
use async_trait::async_trait;
use tracing::debug;

/// Succeeds immediately with an empty payload and a warning.
pub struct NullAgent {
    kind: AgentKind,
}

impl NullAgent {
    pub fn new(kind: AgentKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl GeneratorAgent for NullAgent {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    async fn generate(
        &self,
        _ctx: &GenerationContext,
        section: &Section,
    ) -> Result<ArtifactOutput, ApiError> {
        debug!(kind = %self.kind, section_id = %section.id, "No generator registered");
        let mut output =
            ArtifactOutput::succeeded(self.kind, section.id.clone(), ArtifactPayload::Null);
        output.warnings.push(format!(
            "No {} generator is available; nothing was produced",
            self.kind
        ));
        Ok(output)
    }
}
