//! Speaker name to integer id mapping used by embedding-table models.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Exposes the speaker name of a corpus record.
///
/// Positional records follow the corpus formatter layout
/// `[text, wav_file, speaker_name]`: the speaker name is the third field.
pub trait SpeakerItem {
    fn speaker_name(&self) -> &str;
}

/// A single corpus record produced by a dataset formatter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusItem {
    pub text: String,
    pub audio_file: String,
    pub speaker_name: String,
}

impl CorpusItem {
    pub fn new(
        text: impl Into<String>,
        audio_file: impl Into<String>,
        speaker_name: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            audio_file: audio_file.into(),
            speaker_name: speaker_name.into(),
        }
    }
}

impl SpeakerItem for CorpusItem {
    fn speaker_name(&self) -> &str {
        &self.speaker_name
    }
}

impl SpeakerItem for (String, String, String) {
    fn speaker_name(&self) -> &str {
        &self.2
    }
}

impl SpeakerItem for [String; 3] {
    fn speaker_name(&self) -> &str {
        &self[2]
    }
}

impl SpeakerItem for [&str; 3] {
    fn speaker_name(&self) -> &str {
        self[2]
    }
}

/// Mapping from speaker name to a dense integer id.
///
/// Serializes as a flat JSON object, e.g. `{"spk_01": 0, "spk_02": 1}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeakerIdMap {
    ids: BTreeMap<String, usize>,
}

impl SpeakerIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns ids `0..N-1` to the distinct speaker names of `items`,
    /// in lexicographic order of the names.
    pub fn from_items<I: SpeakerItem>(items: &[I]) -> Self {
        Self::from_names(items.iter().map(|item| item.speaker_name()))
    }

    /// Assigns ids `0..N-1` to the distinct names, in lexicographic order.
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let sorted: BTreeSet<&str> = names.into_iter().collect();
        let ids = sorted
            .into_iter()
            .enumerate()
            .map(|(id, name)| (name.to_string(), id))
            .collect();
        Self { ids }
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.ids.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ids.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Speaker names in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ids.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.ids.iter().map(|(name, &id)| (name.as_str(), id))
    }

    /// Reports whether the ids are exactly `0..N-1`.
    ///
    /// Always true for maps built from items; documents loaded from disk
    /// may carry arbitrary ids.
    pub fn is_dense(&self) -> bool {
        let used: BTreeSet<usize> = self.ids.values().copied().collect();
        used.len() == self.ids.len() && used.iter().enumerate().all(|(i, &id)| i == id)
    }
}

impl FromIterator<(String, usize)> for SpeakerIdMap {
    fn from_iter<T: IntoIterator<Item = (String, usize)>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
