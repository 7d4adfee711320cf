//! Scene analysis records produced by the language model.
//!
//! The model is asked for a JSON object matching [`SCENE_SCHEMA`]. Its reply
//! is deserialized into [`SceneAnalysis`]; replies that are not valid JSON,
//! that miss a required field, or whose scene description is blank are
//! rejected with [`SceneParseError`].

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Write as _;
use thiserror::Error;

/// JSON schema sent to the model in the system prompt.
pub const SCENE_SCHEMA: &str = r#"{"type":"object","properties":{"scene_description":{"type":"string"},"characters":{"type":"array","items":{"type":"object","properties":{"name":{"type":"string"},"role":{"type":"string","enum":["main","supporting"]},"description":{"type":"string"},"first_appearance":{"type":"boolean"},"physical_attributes":{"type":"object","properties":{"hair_color":{"type":["string","null"]},"age":{"type":["string","null"]},"race":{"type":["string","null"]},"build":{"type":["string","null"]}},"required":["hair_color","age","race","build"]}},"required":["name","role","description","first_appearance","physical_attributes"]}},"time_of_day":{"type":["string","null"]},"weather":{"type":["string","null"]},"mood":{"type":["string","null"]},"key_elements":{"type":"array","items":{"type":"string"}}},"required":["scene_description","characters","mood","key_elements"]}"#;

/// Errors raised while reading a scene analysis reply.
#[derive(Debug, Error)]
pub enum SceneParseError {
    /// The reply is not valid JSON or does not match the schema.
    #[error("Scene analysis does not match the schema: {0}")]
    Schema(#[from] serde_json::Error),

    /// The scene description is empty.
    #[error("Scene analysis has an empty scene_description")]
    EmptyDescription,
}

/// Narrative weight of a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterRole {
    /// A protagonist or other central character.
    Main,
    /// Anyone else.
    Supporting,
}

/// Physical description of a character. Every field may be null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalAttributes {
    /// Hair color.
    #[serde(default)]
    pub hair_color: Option<String>,
    /// Age or age range.
    #[serde(default)]
    pub age: Option<String>,
    /// Ethnicity or nationality.
    #[serde(default)]
    pub race: Option<String>,
    /// Body build.
    #[serde(default)]
    pub build: Option<String>,
}

impl PhysicalAttributes {
    fn summary(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.hair_color, &self.age, &self.race, &self.build]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .filter(|v| !v.trim().is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

/// A character present in the scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    /// Character name.
    pub name: String,
    /// Main or supporting.
    pub role: CharacterRole,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Whether the character appears for the first time in this chunk.
    #[serde(default)]
    pub first_appearance: bool,
    /// Physical description.
    #[serde(default)]
    pub physical_attributes: PhysicalAttributes,
}

/// Structured description of the scene in one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneAnalysis {
    /// Setting and time period.
    pub scene_description: String,
    /// Characters present.
    pub characters: Vec<Character>,
    /// Time of day.
    #[serde(default)]
    pub time_of_day: Option<String>,
    /// Weather conditions.
    #[serde(default)]
    pub weather: Option<String>,
    /// Primary mood. Must be present, may be null.
    #[serde(deserialize_with = "present_but_nullable")]
    pub mood: Option<String>,
    /// Visual elements to depict.
    pub key_elements: Vec<String>,
}

// Using `deserialize_with` disables serde's implicit `None` for a missing
// `Option` field, so a missing key is reported as an error.
fn present_but_nullable<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
}

impl SceneAnalysis {
    /// Parses and validates a model reply.
    ///
    /// A reply wrapped in a Markdown code fence is accepted.
    pub fn from_json(raw: &str) -> Result<Self, SceneParseError> {
        let analysis: Self = serde_json::from_str(strip_code_fence(raw))?;
        if analysis.scene_description.trim().is_empty() {
            return Err(SceneParseError::EmptyDescription);
        }
        Ok(analysis)
    }

    /// Renders the text-to-image prompt for this scene.
    #[must_use]
    pub fn image_prompt(&self, title: &str) -> String {
        let mut prompt = format!(
            "Create a detailed artistic scene for the book '{title}'.\n\nScene: {}\n",
            self.scene_description.trim()
        );

        if let Some(mood) = self.mood.as_deref() {
            let _ = writeln!(prompt, "Mood: {mood}");
        }
        if let Some(time) = self.time_of_day.as_deref() {
            let _ = writeln!(prompt, "Time of day: {time}");
        }
        if let Some(weather) = self.weather.as_deref() {
            let _ = writeln!(prompt, "Weather: {weather}");
        }
        if !self.key_elements.is_empty() {
            let _ = writeln!(prompt, "Key elements: {}", self.key_elements.join(", "));
        }
        if !self.characters.is_empty() {
            prompt.push_str("Characters present:\n");
            for character in &self.characters {
                let _ = write!(prompt, "- {}", character.name);
                if let Some(looks) = character.physical_attributes.summary() {
                    let _ = write!(prompt, " ({looks})");
                }
                if !character.description.is_empty() {
                    let _ = write!(prompt, ": {}", character.description);
                }
                prompt.push('\n');
            }
        }

        prompt.push_str(
            "\nStyle: classical oil painting with atmospheric, cinematic lighting. \
             Period-accurate setting, emphasis on architecture, nature and light. \
             Show people from a distance and avoid close-up faces. \
             Only include characters listed above. No text, captions or labels.",
        );
        prompt
    }
}

/// Builds the system prompt for scene analysis.
#[must_use]
pub fn system_prompt() -> String {
    format!(
        "You are a literary analyst and art director. \
         Respond only with valid JSON adhering to this schema: {SCENE_SCHEMA}"
    )
}

/// Builds the user prompt for scene analysis.
#[must_use]
pub fn analysis_prompt(title: &str, text: &str) -> String {
    format!(
        "Book Title: {title}\n\
         Text Chunk: {text}\n\n\
         Analyze this text chunk and provide:\n\
         1. A scene description including setting and time period\n\
         2. The characters present: role (main/supporting), physical description \
         (hair color, age, race, build) and whether this is their first appearance. \
         For well-known characters use their canonical descriptions even when this \
         chunk does not mention them.\n\
         3. Time of day and weather\n\
         4. The primary mood or atmosphere\n\
         5. Key visual elements to depict\n\n\
         Answer in JSON matching the provided schema."
    )
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const REPLY: &str = r#"{
        "scene_description": "A crowded assembly room in Meryton, 1811",
        "characters": [
            {
                "name": "Elizabeth Bennet",
                "role": "main",
                "description": "Witty second daughter",
                "first_appearance": true,
                "physical_attributes": {
                    "hair_color": "dark",
                    "age": "20",
                    "race": "English",
                    "build": "slender"
                }
            },
            {
                "name": "Mr. Bingley",
                "role": "supporting",
                "description": "Amiable newcomer",
                "first_appearance": false,
                "physical_attributes": {
                    "hair_color": null, "age": null, "race": null, "build": null
                }
            }
        ],
        "time_of_day": "evening",
        "weather": null,
        "mood": "lively",
        "key_elements": ["chandeliers", "dancing couples"]
    }"#;

    #[test]
    fn test_parses_full_reply() {
        let analysis = SceneAnalysis::from_json(REPLY).unwrap();
        assert_eq!(analysis.characters.len(), 2);
        assert_eq!(analysis.characters[0].role, CharacterRole::Main);
        assert_eq!(analysis.time_of_day.as_deref(), Some("evening"));
        assert_eq!(analysis.weather, None);
        assert_eq!(analysis.mood.as_deref(), Some("lively"));
        assert_eq!(analysis.characters[1].role, CharacterRole::Supporting);
    }

    #[test]
    fn test_optional_fields_may_be_missing() {
        let raw = r#"{"scene_description": "A quiet lane", "characters": [],
                      "mood": null, "key_elements": []}"#;
        let analysis = SceneAnalysis::from_json(raw).unwrap();
        assert_eq!(analysis.time_of_day, None);
        assert_eq!(analysis.mood, None);
    }

    #[test]
    fn test_missing_mood_is_rejected() {
        let raw = r#"{"scene_description": "A quiet lane", "characters": [],
                      "key_elements": []}"#;
        let err = SceneAnalysis::from_json(raw).unwrap_err();
        assert!(err.to_string().contains("mood"));
    }

    #[test]
    fn test_missing_required_fields_are_rejected() {
        for field in ["scene_description", "characters", "key_elements"] {
            let mut value: serde_json::Value = serde_json::from_str(REPLY).unwrap();
            value.as_object_mut().unwrap().remove(field);
            let result = SceneAnalysis::from_json(&value.to_string());
            assert!(matches!(result, Err(SceneParseError::Schema(_))), "{field}");
        }
    }

    #[test]
    fn test_invalid_role_is_rejected() {
        let raw = r#"{"scene_description": "x", "mood": null, "key_elements": [],
                      "characters": [{"name": "A", "role": "villain"}]}"#;
        assert!(SceneAnalysis::from_json(raw).is_err());
    }

    #[test]
    fn test_blank_description_is_rejected() {
        let raw = r#"{"scene_description": "  ", "characters": [], "mood": null,
                      "key_elements": []}"#;
        assert!(matches!(
            SceneAnalysis::from_json(raw),
            Err(SceneParseError::EmptyDescription)
        ));
    }

    #[test]
    fn test_not_json_is_rejected() {
        assert!(SceneAnalysis::from_json("I'm sorry, I can't do that").is_err());
    }

    #[test]
    fn test_code_fence_is_stripped() {
        let fenced = format!("```json\n{REPLY}\n```");
        assert!(SceneAnalysis::from_json(&fenced).is_ok());
    }

    #[test]
    fn test_image_prompt_mentions_scene_details() {
        let analysis = SceneAnalysis::from_json(REPLY).unwrap();
        let prompt = analysis.image_prompt("Pride and Prejudice");

        assert!(prompt.contains("'Pride and Prejudice'"));
        assert!(prompt.contains("Meryton"));
        assert!(prompt.contains("Mood: lively"));
        assert!(prompt.contains("chandeliers, dancing couples"));
        assert!(prompt.contains("Elizabeth Bennet (dark, 20, English, slender)"));
        assert!(prompt.contains("- Mr. Bingley: Amiable newcomer"));
        assert!(!prompt.contains("Weather"));
    }

    #[test]
    fn test_schema_is_valid_json() {
        let schema: serde_json::Value = serde_json::from_str(SCENE_SCHEMA).unwrap();
        assert_eq!(
            schema["required"],
            serde_json::json!(["scene_description", "characters", "mood", "key_elements"])
        );
        assert!(system_prompt().contains(SCENE_SCHEMA));
    }

    #[test]
    fn test_analysis_prompt_includes_inputs() {
        let prompt = analysis_prompt("Emma", "Emma Woodhouse, handsome, clever");
        assert!(prompt.starts_with("Book Title: Emma"));
        assert!(prompt.contains("Emma Woodhouse, handsome, clever"));
    }
}
