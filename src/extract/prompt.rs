/// The system prompt that fixes the model's output contract.
///
/// The prompt is loaded from `prompt.txt` at compile time using the
/// `include_str!` macro, making it easy to edit without dealing with
/// Rust string syntax.
pub const RECIPE_EXTRACTION_PROMPT: &str = include_str!("prompt.txt");

/// Build the user message for one extraction call
pub fn build_extraction_input(content: &str, title_hint: &str) -> String {
    let title_hint = title_hint.trim();
    if title_hint.is_empty() {
        content.to_string()
    } else {
        format!("Title: {}\n\n{}", title_hint, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_is_embedded() {
        assert!(RECIPE_EXTRACTION_PROMPT.contains("recipe_information"));
        assert!(RECIPE_EXTRACTION_PROMPT.contains("processes"));
        assert!(RECIPE_EXTRACTION_PROMPT.contains("nutrition"));
        assert!(RECIPE_EXTRACTION_PROMPT.contains("Output JSON only"));
    }

    #[test]
    fn test_build_extraction_input() {
        assert_eq!(
            build_extraction_input("2 eggs", "Omelette"),
            "Title: Omelette\n\n2 eggs"
        );
        assert_eq!(build_extraction_input("2 eggs", "  "), "2 eggs");
    }
}
