/*!
 * Prompt templates for machine translation and post-editing.
 *
 * A batch of segments travels in a single request, each segment preceded by
 * an `<<ENTRY_n>>` marker and the whole batch closed by `<<END>>`. The model
 * is asked to keep the markers, which lets the response be split back into
 * exactly one translation per segment.
 */

use crate::errors::ProviderError;
use crate::language_utils::get_language_name;
use crate::providers::PostEditRequest;

const END_MARKER: &str = "<<END>>";

fn entry_marker(idx: usize) -> String {
    format!("<<ENTRY_{}>>", idx)
}

/// System prompt template with `{source_language}` / `{target_language}`
/// placeholders
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// System prompt for the raw MT pass
    pub const MACHINE_TRANSLATOR: &'static str = r#"You are a machine translation engine translating {source_language} into {target_language}.

## Input format
- The text is split into entries, each introduced by a marker such as <<ENTRY_0>>
- The last entry is followed by <<END>>

## Output requirements
- Translate every entry independently and faithfully
- Keep every marker exactly as written, in the same order, including <<END>>
- Keep placeholder tokens such as ⟦T1⟧ unchanged and in place
- Do not add notes, explanations or formatting outside the entries"#;

    /// System prompt for the post-editing pass
    pub const POST_EDITOR: &'static str = r#"You are an expert {target_language} editor post-editing a machine translation from {source_language}.

## Your role
- Make the draft read as natural, fluent {target_language} written by a native author
- Keep the meaning, tone and paragraph structure of the original
- Fix mistranslations by checking the draft against the original

## Strict rules
- Glossary renderings are mandatory: use them exactly as given, never translate, inflect or respell them
- Use the surrounding paragraphs for context only; edit only the draft you are given
- Return ONLY the edited text, with no explanations, comments or markdown"#;

    /// Create a template from a string
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    /// The MT template
    pub fn machine_translator() -> Self {
        Self::new(Self::MACHINE_TRANSLATOR)
    }

    /// The post-editing template
    pub fn post_editor() -> Self {
        Self::new(Self::POST_EDITOR)
    }

    /// Render the template for a language pair. Language codes are replaced
    /// by their English names when known.
    pub fn render(&self, source_language: &str, target_language: &str) -> String {
        self.template
            .replace("{source_language}", &display_language(source_language))
            .replace("{target_language}", &display_language(target_language))
    }
}

fn display_language(code: &str) -> String {
    get_language_name(code).unwrap_or_else(|_| code.to_string())
}

/// Join `texts` into one marked request body
pub fn build_batch_prompt(texts: &[String]) -> String {
    let mut combined = String::new();
    for (idx, text) in texts.iter().enumerate() {
        combined.push_str(&entry_marker(idx));
        combined.push('\n');
        combined.push_str(text);
        combined.push('\n');
    }
    combined.push_str(END_MARKER);
    combined
}

/// Split a marked response back into `expected` texts.
///
/// A missing, duplicated or reordered marker makes the batch unusable and is
/// reported as [`ProviderError::MisalignedBatch`].
pub fn parse_batch_response(response: &str, expected: usize) -> Result<Vec<String>, ProviderError> {
    let found = response.matches("<<ENTRY_").count();
    let misaligned = || ProviderError::MisalignedBatch {
        expected,
        actual: found,
    };

    let mut texts = Vec::with_capacity(expected);
    let mut cursor = 0;

    for idx in 0..expected {
        let start_marker = entry_marker(idx);
        let end_marker = if idx + 1 == expected {
            END_MARKER.to_string()
        } else {
            entry_marker(idx + 1)
        };

        let start = response[cursor..]
            .find(&start_marker)
            .map(|pos| cursor + pos + start_marker.len())
            .ok_or_else(misaligned)?;
        let end = response[start..]
            .find(&end_marker)
            .map(|pos| start + pos)
            .ok_or_else(misaligned)?;

        texts.push(response[start..end].trim().to_string());
        cursor = end;
    }

    if found != expected {
        return Err(misaligned());
    }
    Ok(texts)
}

/// Builds the user prompt of a post-editing request
#[derive(Debug, Clone)]
pub struct PostEditPromptBuilder<'a> {
    request: &'a PostEditRequest,
}

impl<'a> PostEditPromptBuilder<'a> {
    /// Builder for one request
    pub fn new(request: &'a PostEditRequest) -> Self {
        Self { request }
    }

    /// System prompt for the request's language pair
    pub fn build_system_prompt(&self) -> String {
        PromptTemplate::post_editor().render(&self.request.source_language, &self.request.target_language)
    }

    /// User prompt: context, original, draft and mandatory renderings
    pub fn build_user_prompt(&self) -> String {
        let request = self.request;
        let mut prompt = String::new();

        if !request.context.previous.is_empty() {
            prompt.push_str("**PRECEDING PARAGRAPHS (context only):**\n");
            prompt.push_str(&request.context.previous.join("\n\n"));
            prompt.push_str("\n\n");
        }

        prompt.push_str("**ORIGINAL TEXT:**\n");
        prompt.push_str(&request.source_text);
        prompt.push_str("\n\n**MACHINE TRANSLATION TO IMPROVE:**\n");
        prompt.push_str(&request.mt_text);
        prompt.push_str("\n\n");

        if !request.context.following.is_empty() {
            prompt.push_str("**FOLLOWING PARAGRAPHS (context only):**\n");
            prompt.push_str(&request.context.following.join("\n\n"));
            prompt.push_str("\n\n");
        }

        let mut seen = std::collections::HashSet::new();
        let glossary: Vec<String> = request
            .constraints
            .iter()
            .filter(|c| seen.insert((c.source.as_str(), c.target.as_str())))
            .map(|c| format!("- {} → {}", c.source, c.target))
            .collect();
        if !glossary.is_empty() {
            prompt.push_str("**GLOSSARY (MUST USE EXACTLY):**\n");
            prompt.push_str(&glossary.join("\n"));
            prompt.push_str("\n\n");
        }

        prompt.push_str("**OUTPUT:** Return ONLY the improved text.");
        prompt
    }

    /// Both prompts
    pub fn build(&self) -> (String, String) {
        (self.build_system_prompt(), self.build_user_prompt())
    }
}
