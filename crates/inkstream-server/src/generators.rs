//! Generator selection for drive requests.

use inkstream_config::{GeneratorKind, GeneratorSection};
use inkstream_core::{BoxedGenerator, ScriptedGenerator};
use inkstream_llm::{OpenAiConfig, OpenAiGenerator};
use inkstream_store::StreamRecord;

use crate::error::{Result, ServerError};

/// Builds the generator for a stream about to be driven.
///
/// Called before the stream is claimed, so an error here leaves it `pending`.
pub trait GeneratorFactory: Send + Sync {
    fn build(&self, stream: &StreamRecord) -> Result<BoxedGenerator>;
}

/// Factory backed by the `[generator]` config section.
#[derive(Debug, Clone)]
pub struct ConfiguredGenerators {
    section: GeneratorSection,
}

impl ConfiguredGenerators {
    pub fn new(section: GeneratorSection) -> Self {
        Self { section }
    }

    pub fn kind(&self) -> GeneratorKind {
        self.section.kind
    }
}

impl GeneratorFactory for ConfiguredGenerators {
    fn build(&self, stream: &StreamRecord) -> Result<BoxedGenerator> {
        let input = stream.input.as_deref().unwrap_or_default();

        match self.section.kind {
            GeneratorKind::Echo => {
                let mut generator = ScriptedGenerator::echo(input);
                if let Some(delay) = self.section.word_delay() {
                    generator = generator.with_delay(delay);
                }
                Ok(Box::new(generator))
            }
            GeneratorKind::Openai => {
                if input.trim().is_empty() {
                    return Err(ServerError::BadRequest(format!(
                        "Stream {} has no input to generate from",
                        stream.id
                    )));
                }

                let mut config = OpenAiConfig::from_env(&self.section.api_key_env)
                    .map_err(|e| ServerError::Internal(e.to_string()))?
                    .with_base_url(self.section.base_url.clone())
                    .with_model(self.section.model.clone());
                if let Some(prompt) = &self.section.system_prompt {
                    config = config.with_system_prompt(prompt.clone());
                }

                let generator = OpenAiGenerator::new(config, input)
                    .map_err(|e| ServerError::Internal(e.to_string()))?;
                Ok(Box::new(generator))
            }
        }
    }
}
