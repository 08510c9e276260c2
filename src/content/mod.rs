use async_trait::async_trait;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub mod openai;

pub use openai::OpenAiGenerator;

use crate::Result;

/// Text bundle feeding one production run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentPackage {
    /// Video title, passed through to publishers
    #[serde(default)]
    pub title: String,

    /// Video description, passed through to publishers
    #[serde(default)]
    pub description: String,

    /// Tags, passed through to publishers
    #[serde(default)]
    pub tags: Vec<String>,

    /// Narration script
    #[serde(default)]
    pub script: Script,

    /// One prompt per desired visual, in display order
    #[serde(default)]
    pub image_prompts: Vec<String>,
}

impl ContentPackage {
    /// Parse a package from the JSON shape returned by the content generator
    pub fn from_json(raw: &str) -> Result<Self> {
        let package: ContentPackage = serde_json::from_str(raw.trim())?;
        Ok(package)
    }
}

/// A named section of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSection {
    pub name: String,
    pub text: String,
}

/// Narration script, either one block of text or ordered named sections.
///
/// Section order is the order they were written in; flattening joins them in that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    Plain(String),
    Sections(Vec<ScriptSection>),
}

impl Default for Script {
    fn default() -> Self {
        Script::Plain(String::new())
    }
}

impl Script {
    pub fn sections<I, N, T>(sections: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        Script::Sections(
            sections
                .into_iter()
                .map(|(name, text)| ScriptSection {
                    name: name.into(),
                    text: text.into(),
                })
                .collect(),
        )
    }

    /// Concatenate the script into one string, one section per line
    pub fn flatten(&self) -> String {
        match self {
            Script::Plain(text) => text.clone(),
            Script::Sections(sections) => sections
                .iter()
                .map(|section| section.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.flatten().trim().is_empty()
    }
}

impl Serialize for Script {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Script::Plain(text) => serializer.serialize_str(text),
            Script::Sections(sections) => {
                let mut map = serializer.serialize_map(Some(sections.len()))?;
                for section in sections {
                    map.serialize_entry(&section.name, &section.text)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Script {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(ScriptVisitor)
    }
}

struct ScriptVisitor;

/// Render a JSON value the way a human would read it in a script
fn value_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text,
        serde_json::Value::Null => String::new(),
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(value_text)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

impl<'de> Visitor<'de> for ScriptVisitor {
    type Value = Script;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a script string, a list of lines, or a map of section name to text")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<Script, E> {
        Ok(Script::Plain(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> std::result::Result<Script, E> {
        Ok(Script::Plain(value))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Script, E> {
        Ok(Script::default())
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Script, E> {
        Ok(Script::default())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Script, A::Error> {
        let mut lines = Vec::new();
        while let Some(value) = seq.next_element::<serde_json::Value>()? {
            lines.push(value_text(value));
        }
        Ok(Script::Plain(lines.join("\n")))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Script, A::Error> {
        let mut sections = Vec::new();
        while let Some((name, value)) = map.next_entry::<String, serde_json::Value>()? {
            sections.push(ScriptSection {
                name,
                text: value_text(value),
            });
        }
        Ok(Script::Sections(sections))
    }
}

/// Drafts content packages from a topic
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate a complete video content package for `topic` within `niche`
    async fn generate_video_content(
        &self,
        topic: &str,
        niche: &str,
        use_web_context: bool,
    ) -> Result<ContentPackage>;
}
