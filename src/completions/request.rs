use serde::Serialize;
use serde_json::{Map, Value};

use super::model::ModelHelper;
use super::prompt::PromptContext;

/// Response template that echoes the prompt verbatim. Infill markers are
/// already part of the prompt rendered by the model helper.
pub const PROMPT_TEMPLATE: &str = "{{ .Prompt }}";

/// A fully built generation request. Built once per call and shared,
/// read-only, by every slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub template: String,
    pub model: String,
    pub options: Map<String, Value>,
}

/// Combines a prompt context, its model helper and option overrides into a
/// [`GenerationRequest`].
///
/// Overrides are merged shallowly onto the helper defaults and win on key
/// collision. Nothing is validated; the server rejects malformed options.
pub fn build_generation_request(
    ctx: &PromptContext,
    helper: &dyn ModelHelper,
    model: &str,
    multiline: bool,
    overrides: Option<&Map<String, Value>>,
) -> GenerationRequest {
    let mut options = helper.request_options(multiline).into_map();
    if let Some(overrides) = overrides {
        for (key, value) in overrides {
            options.insert(key.clone(), value.clone());
        }
    }

    GenerationRequest {
        prompt: helper.prompt(ctx),
        template: PROMPT_TEMPLATE.to_string(),
        model: model.to_string(),
        options,
    }
}
