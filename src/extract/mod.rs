//! Structured recipe extraction through a generative model.

mod prompt;

pub use prompt::{build_extraction_input, RECIPE_EXTRACTION_PROMPT};

use log::{debug, info};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::HarvestError;
use crate::model::{Quantity, RecipeDraft, Step};
use crate::providers::LlmProvider;

/// Wire shape the prompt asks the model for
#[derive(Debug, Deserialize)]
struct RawRecipe {
    recipe_information: RawInformation,
    #[serde(default)]
    ingredients: Vec<Quantity>,
    #[serde(default)]
    processes: Vec<Step>,
    #[serde(default)]
    nutrition: Vec<Quantity>,
}

#[derive(Debug, Deserialize)]
struct RawInformation {
    #[serde(default)]
    title: String,
    servings: Option<f64>,
    preparation_time: Option<f64>,
    #[serde(default)]
    description: String,
}

/// Normalizes free text into a [`RecipeDraft`] with one model call per attempt
pub struct StructuredExtractor {
    provider: Arc<dyn LlmProvider>,
}

impl StructuredExtractor {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    pub async fn extract(&self, content: &str, title_hint: &str) -> Result<RecipeDraft, HarvestError> {
        let input = build_extraction_input(content, title_hint);
        debug!(
            "Requesting extraction from {} ({} chars)",
            self.provider.provider_name(),
            input.len()
        );

        let output = self
            .provider
            .complete(RECIPE_EXTRACTION_PROMPT, &input)
            .await
            .map_err(|e| HarvestError::Extraction(format!("model call failed: {}", e)))?;

        let draft = parse_draft(&output, title_hint)?;
        info!(
            "Extracted '{}' with {} ingredients and {} steps",
            draft.title,
            draft.ingredients.len(),
            draft.steps.len()
        );
        Ok(draft)
    }
}

/// Parse and validate model output.
///
/// Code fences and prose around the JSON object are ignored.
pub fn parse_draft(output: &str, title_hint: &str) -> Result<RecipeDraft, HarvestError> {
    let json = match (output.find('{'), output.rfind('}')) {
        (Some(start), Some(end)) if start < end => &output[start..=end],
        _ => {
            return Err(HarvestError::Extraction(
                "model output contains no JSON object".to_string(),
            ))
        }
    };

    let raw: RawRecipe = serde_json::from_str(json)
        .map_err(|e| HarvestError::Extraction(format!("model output does not match schema: {}", e)))?;

    validate(&raw)?;

    let title = match raw.recipe_information.title.trim() {
        "" => title_hint.trim().to_string(),
        title => title.to_string(),
    };

    Ok(RecipeDraft {
        title,
        servings: raw.recipe_information.servings,
        preparation_time: raw.recipe_information.preparation_time,
        description: raw.recipe_information.description.trim().to_string(),
        image_ref: None,
        ingredients: raw.ingredients,
        steps: raw.processes,
        nutrition: raw.nutrition,
    })
}

fn validate(raw: &RawRecipe) -> Result<(), HarvestError> {
    let violation = |message: String| Err(HarvestError::Extraction(message));

    if raw.ingredients.is_empty() && raw.processes.is_empty() {
        return violation("no recipe found in content".to_string());
    }
    if let Some(position) = raw
        .ingredients
        .iter()
        .chain(&raw.nutrition)
        .position(|item| item.name.trim().is_empty())
    {
        return violation(format!("entry {} has an empty name", position + 1));
    }
    for (index, step) in raw.processes.iter().enumerate() {
        let expected = index as u32 + 1;
        if step.step_number != expected {
            return violation(format!(
                "step numbers are not sequential (expected {}, got {})",
                expected, step.step_number
            ));
        }
        if step.instructions.trim().is_empty() {
            return violation(format!("step {} has no instructions", expected));
        }
    }
    let negative = [raw.recipe_information.servings, raw.recipe_information.preparation_time]
        .into_iter()
        .flatten()
        .chain(raw.ingredients.iter().filter_map(|i| i.quantity))
        .any(|value| value < 0.0 || !value.is_finite());
    if negative {
        return violation("negative or non-finite quantity".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use async_trait::async_trait;

    const VALID: &str = r#"{
        "recipe_information": {"title": "Lemon Pasta", "servings": 2, "preparation_time": 20, "description": "Quick."},
        "ingredients": [
            {"name": "spaghetti", "quantity": 200, "unit": "g"},
            {"name": "lemon", "quantity": 1, "unit": null},
            {"name": "salt", "quantity": null, "unit": null}
        ],
        "processes": [
            {"step_number": 1, "instructions": "Boil the pasta."},
            {"step_number": 2, "instructions": "Toss with lemon."}
        ],
        "nutrition": [{"name": "calories", "quantity": 540, "unit": "kcal"}]
    }"#;

    #[test]
    fn test_parse_valid_output() {
        let draft = parse_draft(VALID, "ignored").unwrap();
        assert_eq!(draft.title, "Lemon Pasta");
        assert_eq!(draft.servings, Some(2.0));
        assert_eq!(draft.ingredients.len(), 3);
        assert_eq!(draft.ingredients[0].unit.as_deref(), Some("g"));
        assert_eq!(draft.ingredients[2].quantity, None);
        assert_eq!(draft.steps[1].step_number, 2);
        assert_eq!(draft.nutrition[0].name, "calories");
    }

    #[test]
    fn test_parse_tolerates_fences_and_prose() {
        let output = format!("Here is the recipe:\n```json\n{}\n```\nEnjoy!", VALID);
        assert!(parse_draft(&output, "").is_ok());
    }

    #[test]
    fn test_empty_title_uses_hint() {
        let output = VALID.replace("\"Lemon Pasta\"", "\"\"");
        let draft = parse_draft(&output, "Lemon Pasta | Example Kitchen").unwrap();
        assert_eq!(draft.title, "Lemon Pasta | Example Kitchen");
    }

    #[test]
    fn test_schema_violations() {
        let cases = [
            "not json at all".to_string(),
            VALID.replace("\"servings\": 2", "\"servings\": \"two\""),
            VALID.replace("\"step_number\": 2", "\"step_number\": 3"),
            VALID.replace("\"name\": \"lemon\"", "\"name\": \" \""),
            VALID.replace("\"Toss with lemon.\"", "\"\""),
            r#"{"recipe_information": {"title": "Nothing"}, "ingredients": [], "processes": [], "nutrition": []}"#.to_string(),
        ];

        for case in cases {
            let err = parse_draft(&case, "hint").unwrap_err();
            assert!(matches!(err, HarvestError::Extraction(_)), "accepted: {}", case);
            assert!(err.is_transient());
        }
    }

    struct CannedProvider(Result<&'static str, u16>);

    #[async_trait]
    impl LlmProvider for CannedProvider {
        fn provider_name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, instructions: &str, content: &str) -> Result<String, ProviderError> {
            assert_eq!(instructions, RECIPE_EXTRACTION_PROMPT);
            assert!(content.starts_with("Title: "));
            self.0
                .map(str::to_string)
                .map_err(|status| ProviderError::Api { status })
        }
    }

    #[tokio::test]
    async fn test_extract_calls_model_once() {
        let extractor = StructuredExtractor::new(Arc::new(CannedProvider(Ok(VALID))));
        let draft = extractor.extract("page text", "Lemon Pasta").await.unwrap();
        assert_eq!(draft.steps.len(), 2);
        assert!(draft.image_ref.is_none());
    }

    #[tokio::test]
    async fn test_model_failure_is_transient_extraction_error() {
        let extractor = StructuredExtractor::new(Arc::new(CannedProvider(Err(503))));
        let err = extractor.extract("page text", "Lemon Pasta").await.unwrap_err();
        assert!(matches!(err, HarvestError::Extraction(_)));
        assert!(err.is_transient());
    }
}
