//! Lessons: ordered text units to narrate.
//!
//! Lesson content arrives as JSON:
//! ```json
//! {
//!   "title": "The Fox and the Grapes",
//!   "category": "Fable",
//!   "sentences": [
//!     { "original": "A fox saw some grapes.", "translation": "..." }
//!   ]
//! }
//! ```
//! Missing fields default. An empty sentence list is a valid zero-unit lesson.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One narratable unit of a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    pub id: String,
    pub original: String,
    #[serde(default)]
    pub translation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    /// Playback order.
    #[serde(default)]
    pub units: Vec<TextUnit>,
}

fn default_category() -> String {
    "General".to_string()
}

impl Default for Lesson {
    /// A zero-unit lesson with no content.
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            author: None,
            category: default_category(),
            units: Vec::new(),
        }
    }
}

impl Lesson {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn unit(&self, index: usize) -> Option<&TextUnit> {
        self.units.get(index)
    }

    pub fn position(&self, unit_id: &str) -> Option<usize> {
        self.units.iter().position(|u| u.id == unit_id)
    }
}

/// Wire shape produced by the lesson content collaborator.
#[derive(Debug, Default, Deserialize)]
struct LessonContent {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    sentences: Vec<SentenceContent>,
}

#[derive(Debug, Deserialize)]
struct SentenceContent {
    #[serde(default)]
    original: String,
    #[serde(default)]
    translation: String,
}

/// Build a lesson from content JSON. The title falls back to `requested_name`.
pub fn parse_lesson_content(requested_name: &str, json: &str) -> anyhow::Result<Lesson> {
    let content: LessonContent =
        serde_json::from_str(json).context("Invalid lesson content JSON")?;

    let id = uuid::Uuid::new_v4().to_string();
    let units = content
        .sentences
        .into_iter()
        .enumerate()
        .map(|(i, s)| TextUnit {
            id: format!("{}-{}", id, i),
            original: s.original,
            translation: s.translation,
        })
        .collect::<Vec<_>>();

    debug!(name = requested_name, units = units.len(), "Parsed lesson content");

    Ok(Lesson {
        id,
        title: content
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| requested_name.to_string()),
        author: content.author,
        category: content.category.unwrap_or_else(default_category),
        units,
    })
}

/// Load a lesson file: either a serialized [`Lesson`] or lesson content JSON.
pub fn load_lesson_file(path: &Path) -> anyhow::Result<Lesson> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read lesson {}", path.display()))?;

    let value: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid lesson JSON in {}", path.display()))?;
    // Content JSON is recognized by its sentence list, even when it carries an id.
    if value.get("sentences").is_none() {
        if let Ok(lesson) = serde_json::from_value::<Lesson>(value) {
            return Ok(lesson);
        }
    }

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string());
    parse_lesson_content(&name, &contents)
}
