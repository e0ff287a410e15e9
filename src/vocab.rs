//! Vocabulary building: turns the raw WaniKani vocabulary list into a flat
//! lookup map from English surface forms to their Japanese rendering,
//! including naive plurals and verb conjugations.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{Result, KanifyError};

/// Suffixes appended to the stem of a single-word verb gloss
const VERB_SUFFIXES: [&str; 5] = ["ed", "es", "en", "s", "ing"];

/// Top level of the `/vocabulary/` response
#[derive(Debug, Clone, Deserialize)]
pub struct VocabularyResponse {
    pub requested_information: Option<RequestedInformation>,
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestedInformation {
    /// Items are decoded one by one so a single bad record can be skipped
    #[serde(default)]
    pub general: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEntry {
    meaning: Option<String>,
    character: Option<String>,
    #[serde(default)]
    user_specific: Value,
}

/// One dictionary item as far as vocabulary building is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabEntry {
    /// Comma separated English meanings, e.g. `"to eat, to consume"`
    pub meaning: String,
    /// Japanese rendering
    pub character: String,
    /// Whether the user already studied this item
    pub is_learned: bool,
}

impl VocabEntry {
    pub fn new(meaning: &str, character: &str, is_learned: bool) -> Self {
        Self {
            meaning: meaning.to_string(),
            character: character.to_string(),
            is_learned,
        }
    }

    /// Decode one `general` item of the API response
    pub fn from_value(value: &Value) -> Result<Self> {
        let raw: RawEntry = serde_json::from_value(value.clone())
            .map_err(|e| KanifyError::MalformedEntry(e.to_string()))?;

        let meaning = raw.meaning
            .ok_or_else(|| KanifyError::MalformedEntry("missing 'meaning'".to_string()))?;
        let character = raw.character
            .ok_or_else(|| KanifyError::MalformedEntry(format!("missing 'character' for '{}'", meaning)))?;

        Ok(Self {
            meaning,
            character,
            is_learned: is_truthy(&raw.user_specific),
        })
    }
}

/// The API marks unlearned items with a null/false `user_specific`
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Parsed vocabulary payload: the usable entries plus the records that were skipped
#[derive(Debug)]
pub struct ParsedVocabulary {
    pub entries: Vec<VocabEntry>,
    pub skipped: Vec<KanifyError>,
}

/// Parse a raw response body.
///
/// An embedded `error` object yields `RemoteApi`, a body that is not JSON or
/// lacks `requested_information` yields `MalformedResponseBody`. Individual
/// broken items do not fail the whole batch.
pub fn parse_response(body: &str) -> Result<ParsedVocabulary> {
    let response: VocabularyResponse = serde_json::from_str(body)
        .map_err(|e| KanifyError::MalformedResponseBody(e.to_string()))?;

    if let Some(error) = response.error {
        let message = error.message
            .or(error.code)
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(KanifyError::RemoteApi(message));
    }

    let info = response.requested_information.ok_or_else(|| {
        KanifyError::MalformedResponseBody("missing 'requested_information'".to_string())
    })?;

    let mut entries = Vec::with_capacity(info.general.len());
    let mut skipped = Vec::new();
    for (index, item) in info.general.iter().enumerate() {
        match VocabEntry::from_value(item) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!("Skipping vocabulary item #{}: {}", index, e);
                skipped.push(e);
            }
        }
    }

    Ok(ParsedVocabulary { entries, skipped })
}

/// Derive the surface forms for one meaning.
///
/// The first element is the base meaning (with a leading "to " removed),
/// followed by the mechanically derived forms.
pub fn derive_forms(phrase: &str) -> Vec<String> {
    let phrase = phrase.trim().to_lowercase();
    if phrase.is_empty() {
        return Vec::new();
    }

    if let Some(rest) = phrase.strip_prefix("to ") {
        let rest = rest.trim();
        if rest.is_empty() {
            return vec![phrase];
        }

        let mut forms = vec![rest.to_string()];
        if !rest.contains(char::is_whitespace) {
            let stem = rest.strip_suffix('e').unwrap_or(rest);
            for suffix in VERB_SUFFIXES {
                forms.push(format!("{}{}", stem, suffix));
            }
        }
        return forms;
    }

    if phrase.chars().count() >= 3 && !phrase.ends_with('s') {
        let plural = format!("{}s", phrase);
        return vec![phrase, plural];
    }

    vec![phrase]
}

/// Lookup map from lowercase surface form to translation.
///
/// Kept sorted so the serialized form (and therefore its hash) only depends
/// on the content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VocabMap {
    entries: BTreeMap<String, String>,
}

impl VocabMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, surface: &str, translation: &str) {
        self.entries.insert(surface.to_lowercase(), translation.to_string());
    }

    /// Case-insensitive lookup; runs of whitespace are treated as one space
    pub fn lookup(&self, surface: &str) -> Option<&str> {
        let key = surface
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        self.entries.get(&key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.entries)?)
    }

    /// Parse the persisted form. Unparsable or empty data is corrupt.
    pub fn from_stored(raw: &str) -> Result<Self> {
        let entries: BTreeMap<String, String> = serde_json::from_str(raw)
            .map_err(|e| KanifyError::CorruptVocabulary(e.to_string()))?;
        if entries.is_empty() {
            return Err(KanifyError::CorruptVocabulary("vocabulary is empty".to_string()));
        }
        Ok(Self { entries })
    }

    /// Content hash of the serialized map, used to tell the user whether a
    /// refresh changed anything.
    pub fn content_hash(&self) -> Result<u64> {
        let serialized = self.to_json()?;
        let digest = Sha256::digest(serialized.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Ok(u64::from_be_bytes(bytes))
    }
}

/// Build the lookup map. Unlearned entries are ignored; on key collisions the
/// later entry wins.
pub fn build_vocab_map(entries: &[VocabEntry]) -> VocabMap {
    let mut map = VocabMap::new();

    for entry in entries.iter().filter(|e| e.is_learned) {
        let mut bases = Vec::new();
        let mut derived = Vec::new();
        for meaning in entry.meaning.split(", ") {
            let mut forms = derive_forms(meaning).into_iter();
            if let Some(base) = forms.next() {
                bases.push(base);
            }
            derived.extend(forms);
        }

        for surface in bases.iter().chain(derived.iter()) {
            map.insert(surface, &entry.character);
        }
    }

    debug!("Built vocabulary map with {} surface forms", map.len());
    map
}
