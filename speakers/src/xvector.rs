//! X-vector table keyed by clip id, and the aggregation over it.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Result, SpeakerError};

/// One clip's x-vector.
///
/// Keys other than `name` and `embedding` are clip-level metadata; they are
/// kept in `extra` and written back on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XVectorEntry {
    /// Speaker name.
    pub name: String,

    /// Fixed-dimensional voice vector, kept at document precision.
    pub embedding: Vec<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl XVectorEntry {
    pub fn new(name: impl Into<String>, embedding: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            embedding,
            extra: Map::new(),
        }
    }
}

/// How many stored x-vectors a mean is taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sampling {
    /// Every x-vector of the speaker.
    #[default]
    All,
    /// The first `k` x-vectors in stored order.
    First(usize),
    /// `k` x-vectors drawn uniformly WITH replacement, so a clip may
    /// contribute more than once even when `k` does not exceed the count.
    Random(usize),
}

impl Sampling {
    /// Maps the `(num_samples, randomize)` pair onto a sampling mode.
    pub fn from_options(num_samples: Option<usize>, randomize: bool) -> Self {
        match (num_samples, randomize) {
            (None, _) => Self::All,
            (Some(k), false) => Self::First(k),
            (Some(k), true) => Self::Random(k),
        }
    }
}

/// Clip-id keyed x-vector table.
///
/// Entries keep document order, which is the order
/// [`XVectorTable::embeddings_by_speaker`] returns them in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XVectorTable {
    entries: Vec<(String, XVectorEntry)>,
    index: HashMap<String, usize>,
}

impl XVectorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an entry. A replaced entry keeps its position.
    pub fn insert(&mut self, clip_id: impl Into<String>, entry: XVectorEntry) {
        let clip_id = clip_id.into();
        match self.index.get(&clip_id) {
            Some(&i) => self.entries[i].1 = entry,
            None => {
                self.index.insert(clip_id.clone(), self.entries.len());
                self.entries.push((clip_id, entry));
            }
        }
    }

    pub fn get(&self, clip_id: &str) -> Option<&XVectorEntry> {
        self.index.get(clip_id).map(|&i| &self.entries[i].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &XVectorEntry)> {
        self.entries.iter().map(|(id, e)| (id.as_str(), e))
    }

    /// Embeddings whose entry belongs to `speaker`, in stored order.
    pub fn embeddings_by_speaker(&self, speaker: &str) -> Vec<&[f64]> {
        self.entries
            .iter()
            .filter(|(_, e)| e.name == speaker)
            .map(|(_, e)| e.embedding.as_slice())
            .collect()
    }

    /// Distinct speaker names, sorted.
    pub fn speaker_names(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self.entries.iter().map(|(_, e)| e.name.as_str()).collect();
        names.into_iter().map(String::from).collect()
    }

    /// Clip ids, sorted.
    pub fn clip_ids(&self) -> Vec<String> {
        let ids: BTreeSet<&str> = self.entries.iter().map(|(id, _)| id.as_str()).collect();
        ids.into_iter().map(String::from).collect()
    }

    /// Embedding dimension of the first entry.
    pub fn dim(&self) -> Option<usize> {
        self.entries.first().map(|(_, e)| e.embedding.len())
    }

    /// Fails on the first entry holding a NaN or infinite value. JSON has
    /// no encoding for those.
    pub fn check_finite(&self) -> Result<()> {
        match self
            .entries
            .iter()
            .find(|(_, e)| e.embedding.iter().any(|x| !x.is_finite()))
        {
            Some((clip_id, _)) => Err(SpeakerError::NonFinite {
                clip_id: clip_id.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Mean x-vector of `speaker` under the given sampling mode.
    pub fn mean_by_speaker<R: Rng + ?Sized>(
        &self,
        speaker: &str,
        sampling: Sampling,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        let vectors = self.embeddings_by_speaker(speaker);
        let selected: Vec<&[f64]> = match sampling {
            Sampling::All => vectors,
            Sampling::First(k) => {
                check_available(speaker, k, vectors.len())?;
                vectors.into_iter().take(k).collect()
            }
            Sampling::Random(k) => {
                check_available(speaker, k, vectors.len())?;
                (0..k)
                    .filter_map(|_| vectors.choose(rng).copied())
                    .collect()
            }
        };
        mean_embedding(&selected).map_err(|e| match e {
            SpeakerError::EmptySelection { .. } => SpeakerError::EmptySelection {
                speaker: speaker.to_string(),
            },
            other => other,
        })
    }
}

fn check_available(speaker: &str, requested: usize, available: usize) -> Result<()> {
    if available < requested {
        return Err(SpeakerError::NotEnoughSamples {
            speaker: speaker.to_string(),
            requested,
            available,
        });
    }
    Ok(())
}

/// Element-wise arithmetic mean of equal-length vectors.
pub fn mean_embedding(vectors: &[&[f64]]) -> Result<Vec<f64>> {
    let Some(first) = vectors.first() else {
        return Err(SpeakerError::EmptySelection {
            speaker: String::new(),
        });
    };
    let dim = first.len();
    let mut sum = vec![0.0f64; dim];
    for v in vectors {
        if v.len() != dim {
            return Err(SpeakerError::DimensionMismatch {
                expected: dim,
                got: v.len(),
            });
        }
        for (acc, &x) in sum.iter_mut().zip(v.iter()) {
            *acc += x;
        }
    }
    let n = vectors.len() as f64;
    Ok(sum.into_iter().map(|s| s / n).collect())
}

impl Serialize for XVectorTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (clip_id, entry) in &self.entries {
            map.serialize_entry(clip_id, entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for XVectorTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = XVectorTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of clip id to {name, embedding}")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut table = XVectorTable::new();
                while let Some((clip_id, entry)) = access.next_entry::<String, XVectorEntry>()? {
                    table.insert(clip_id, entry);
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

impl FromIterator<(String, XVectorEntry)> for XVectorTable {
    fn from_iter<T: IntoIterator<Item = (String, XVectorEntry)>>(iter: T) -> Self {
        let mut table = Self::new();
        for (clip_id, entry) in iter {
            table.insert(clip_id, entry);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn table() -> XVectorTable {
        [
            ("c1.wav", "A", vec![1.0, 0.0]),
            ("c2.wav", "A", vec![3.0, 0.0]),
            ("c3.wav", "B", vec![0.0, 4.0]),
            ("c4.wav", "A", vec![5.0, 6.0]),
        ]
        .into_iter()
        .map(|(id, name, emb)| (id.to_string(), XVectorEntry::new(name, emb)))
        .collect()
    }

    #[test]
    fn mean_of_two() {
        let t: XVectorTable = [
            ("c1.wav".to_string(), XVectorEntry::new("A", vec![1.0, 0.0])),
            ("c2.wav".to_string(), XVectorEntry::new("A", vec![3.0, 0.0])),
        ]
        .into_iter()
        .collect();
        let mut rng = StdRng::seed_from_u64(0);
        let mean = t.mean_by_speaker("A", Sampling::All, &mut rng).unwrap();
        assert_eq!(mean, vec![2.0, 0.0]);
    }

    #[test]
    fn single_entry_mean_is_exact() {
        let mut rng = StdRng::seed_from_u64(0);
        let mean = table().mean_by_speaker("B", Sampling::All, &mut rng).unwrap();
        assert_eq!(mean, vec![0.0, 4.0]);
    }

    #[test]
    fn first_k_uses_stored_order() {
        let t = table();
        let mut rng = StdRng::seed_from_u64(0);
        let a = t.mean_by_speaker("A", Sampling::First(2), &mut rng).unwrap();
        let b = t.mean_by_speaker("A", Sampling::First(2), &mut rng).unwrap();
        assert_eq!(a, vec![2.0, 0.0]);
        assert_eq!(a, b);
    }

    #[test]
    fn too_many_samples_fails() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = table()
            .mean_by_speaker("A", Sampling::First(4), &mut rng)
            .unwrap_err();
        match err {
            SpeakerError::NotEnoughSamples {
                speaker,
                requested,
                available,
            } => {
                assert_eq!(speaker, "A");
                assert_eq!(requested, 4);
                assert_eq!(available, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(
            table()
                .mean_by_speaker("A", Sampling::Random(4), &mut rng)
                .is_err()
        );
    }

    #[test]
    fn random_draws_from_speaker_vectors() {
        let t = table();
        let mut rng = StdRng::seed_from_u64(7);
        // Every A vector has x in {1, 3, 5}; the mean of one draw is one of them.
        for _ in 0..20 {
            let mean = t.mean_by_speaker("A", Sampling::Random(1), &mut rng).unwrap();
            assert!([1.0, 3.0, 5.0].contains(&mean[0]), "got {mean:?}");
        }
    }

    #[test]
    fn random_is_reproducible_with_seed() {
        let t = table();
        let a = t
            .mean_by_speaker("A", Sampling::Random(3), &mut StdRng::seed_from_u64(42))
            .unwrap();
        let b = t
            .mean_by_speaker("A", Sampling::Random(3), &mut StdRng::seed_from_u64(42))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn random_draws_with_replacement() {
        let t = table();
        let mut rng = StdRng::seed_from_u64(3);
        let full = t.mean_by_speaker("A", Sampling::All, &mut rng).unwrap();
        // Three draws over three clips only reproduce the full mean when
        // every clip is picked once; repeats must show up across trials.
        let repeated = (0..200)
            .map(|_| t.mean_by_speaker("A", Sampling::Random(3), &mut rng).unwrap())
            .filter(|mean| *mean != full)
            .count();
        assert!(repeated > 0);
    }

    #[test]
    fn embeddings_keep_double_precision() {
        let json = r#"{"c1.wav": {"name": "A", "embedding": [1e39, 0.123456789012345]}}"#;
        let t: XVectorTable = serde_json::from_str(json).unwrap();
        assert_eq!(t.get("c1.wav").unwrap().embedding, vec![1e39, 0.123456789012345]);
        let back: XVectorTable = serde_json::from_str(&serde_json::to_string(&t).unwrap()).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn unknown_speaker() {
        let t = table();
        assert!(t.embeddings_by_speaker("unknown_speaker").is_empty());
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            t.mean_by_speaker("unknown_speaker", Sampling::All, &mut rng),
            Err(SpeakerError::EmptySelection { .. })
        ));
    }

    #[test]
    fn zero_samples_is_empty_selection() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            table().mean_by_speaker("A", Sampling::First(0), &mut rng),
            Err(SpeakerError::EmptySelection { .. })
        ));
    }

    #[test]
    fn ragged_vectors_fail() {
        let err = mean_embedding(&[&[1.0, 2.0], &[1.0]]).unwrap_err();
        assert!(matches!(
            err,
            SpeakerError::DimensionMismatch { expected: 2, got: 1 }
        ));
    }

    #[test]
    fn indices_are_sorted_and_unique() {
        let mut t = table();
        t.insert("a0.wav", XVectorEntry::new("0", vec![0.0, 0.0]));
        assert_eq!(t.speaker_names(), vec!["0", "A", "B"]);
        assert_eq!(
            t.clip_ids(),
            vec!["a0.wav", "c1.wav", "c2.wav", "c3.wav", "c4.wav"]
        );
        assert_eq!(t.dim(), Some(2));
    }

    #[test]
    fn replacing_keeps_position() {
        let mut t = table();
        t.insert("c1.wav", XVectorEntry::new("A", vec![9.0, 9.0]));
        assert_eq!(t.len(), 4);
        assert_eq!(t.embeddings_by_speaker("A")[0], &[9.0, 9.0][..]);
    }

    #[test]
    fn document_order_and_extra_keys() {
        let json = r#"{
            "z.wav": {"name": "A", "embedding": [1.0], "duration": 2.5},
            "a.wav": {"name": "A", "embedding": [3.0]}
        }"#;
        let t: XVectorTable = serde_json::from_str(json).unwrap();
        assert_eq!(t.embeddings_by_speaker("A"), vec![&[1.0][..], &[3.0][..]]);
        assert_eq!(
            t.get("z.wav").unwrap().extra.get("duration"),
            Some(&serde_json::json!(2.5))
        );

        let back = serde_json::to_string(&t).unwrap();
        assert!(back.starts_with(r#"{"z.wav":"#), "got {back}");
        assert!(back.contains(r#""duration":2.5"#));
    }

    #[test]
    fn missing_embedding_is_rejected() {
        let json = r#"{"c1.wav": {"name": "A"}}"#;
        assert!(serde_json::from_str::<XVectorTable>(json).is_err());
    }

    #[test]
    fn sampling_from_options() {
        assert_eq!(Sampling::from_options(None, true), Sampling::All);
        assert_eq!(Sampling::from_options(Some(3), false), Sampling::First(3));
        assert_eq!(Sampling::from_options(Some(3), true), Sampling::Random(3));
    }
}
