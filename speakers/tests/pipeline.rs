//! End-to-end: compute x-vectors with an encoder, persist them, reload them
//! into a fresh registry and build conditioning inputs.

use std::fs;
use std::path::{Path, PathBuf};

use tts_speakers::{
    AudioConfig, AudioProcessor, ConditioningInput, CorpusItem, EmbeddingBatch, EncoderAdapter,
    EncoderBackend, EncoderConfig, FeatureBatch, FeatureMatrix, Result, Sampling, SpeakerEncoder,
    SpeakerError, SpeakerRegistry, XVectorEntry, XVectorTable,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Embedding = per-bin maximum over frames.
struct MaxEncoder;

impl SpeakerEncoder for MaxEncoder {
    fn load_checkpoint(
        &mut self,
        _config_path: &Path,
        model_path: &Path,
        eval: bool,
    ) -> Result<()> {
        assert!(eval, "checkpoints are loaded in eval mode");
        fs::metadata(model_path).map_err(|e| SpeakerError::Encoder(e.to_string()))?;
        Ok(())
    }

    fn compute_embedding(&self, batch: &FeatureBatch) -> Result<EmbeddingBatch> {
        let (n, frames, dim) = batch.shape();
        let rows = (0..n)
            .filter_map(|i| batch.item(i))
            .map(|item| {
                (0..dim)
                    .map(|d| {
                        (0..frames)
                            .map(|t| item[t * dim + d])
                            .fold(f32::MIN, f32::max)
                    })
                    .collect()
            })
            .collect();
        Ok(EmbeddingBatch::new(rows))
    }
}

/// Reads clips as whitespace-separated floats; the spectrogram folds the
/// samples into `num_mels` rows.
struct TextProcessor {
    sample_rate: u32,
    num_mels: usize,
    normalize_level: bool,
    trim_silence: bool,
}

impl AudioProcessor for TextProcessor {
    fn load_waveform(&self, path: &Path, _sample_rate: u32) -> Result<Vec<f32>> {
        let text = fs::read_to_string(path).map_err(|e| SpeakerError::Audio {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        text.split_whitespace()
            .map(|s| {
                s.parse::<f32>().map_err(|e| SpeakerError::Audio {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            })
            .collect()
    }

    fn melspectrogram(&self, waveform: &[f32]) -> Result<FeatureMatrix> {
        let frames = waveform.len() / self.num_mels;
        let folded = waveform[..frames * self.num_mels].to_vec();
        Ok(FeatureMatrix::new(frames, self.num_mels, folded)?.transpose())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn normalize_level(&self) -> bool {
        self.normalize_level
    }

    fn set_normalize_level(&mut self, enabled: bool) {
        self.normalize_level = enabled;
    }

    fn trim_silence(&self) -> bool {
        self.trim_silence
    }

    fn set_trim_silence(&mut self, enabled: bool) {
        self.trim_silence = enabled;
    }
}

struct TextBackend;

impl EncoderBackend for TextBackend {
    fn setup_model(&self, _config: &EncoderConfig) -> Result<Box<dyn SpeakerEncoder>> {
        Ok(Box::new(MaxEncoder))
    }

    fn audio_processor(&self, audio: &AudioConfig) -> Result<Box<dyn AudioProcessor>> {
        Ok(Box::new(TextProcessor {
            sample_rate: audio.sample_rate,
            num_mels: audio.num_mels,
            normalize_level: audio.do_sound_norm,
            trim_silence: audio.do_trim_silence,
        }))
    }
}

struct Corpus {
    _dir: tempfile::TempDir,
    root: PathBuf,
    items: Vec<CorpusItem>,
    model: PathBuf,
    config: PathBuf,
}

fn corpus() -> Corpus {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let clips = [
        ("spk_b", "b1.txt", "1 0 3 0"),
        ("spk_a", "a1.txt", "1 1 2 2"),
        ("spk_a", "a2.txt", "4 0 0 6"),
        ("spk_b", "b2.txt", "5 5 1 1"),
    ];
    let mut items = Vec::new();
    for (speaker, file, samples) in clips {
        fs::write(root.join(file), samples).unwrap();
        items.push(CorpusItem::new("hello", file, speaker));
    }
    let model = root.join("model.pth");
    let config = root.join("config.json");
    fs::write(&model, b"weights").unwrap();
    fs::write(&config, r#"{"audio": {"sample_rate": 16000, "num_mels": 2}}"#).unwrap();
    Corpus {
        _dir: dir,
        root,
        items,
        model,
        config,
    }
}

#[test]
fn compute_save_reload() {
    init_tracing();
    let c = corpus();
    let encoder = EncoderAdapter::init(&TextBackend, &c.model, &c.config).unwrap();
    assert!(encoder.processor().normalize_level());
    assert!(encoder.processor().trim_silence());

    let registry = SpeakerRegistry::builder()
        .items(&c.items)
        .encoder(encoder)
        .build()
        .unwrap();
    assert_eq!(registry.num_speakers(), 2);
    assert_eq!(registry.get_speakers().get("spk_a"), Some(0));

    let mut table = XVectorTable::new();
    for item in &c.items {
        let x_vector = registry
            .compute_x_vector_from_clip(c.root.join(&item.audio_file))
            .unwrap();
        let entry = XVectorEntry::new(item.speaker_name.clone(), x_vector);
        table.insert(item.audio_file.clone(), entry);
    }
    let xv_path = c.root.join("x_vectors.json");
    tts_speakers::io::save_x_vectors(&xv_path, &table).unwrap();

    let reloaded = SpeakerRegistry::builder().x_vectors_file(&xv_path).build().unwrap();
    assert_eq!(reloaded.get_clips(), ["a1.txt", "a2.txt", "b1.txt", "b2.txt"]);
    assert_eq!(reloaded.speaker_names(), ["spk_a", "spk_b"]);
    assert_eq!(reloaded.x_vector_dim().unwrap(), 2);

    // a1 frames [1,1],[2,2] -> [2,2]; a2 frames [4,0],[0,6] -> [4,6]
    assert_eq!(reloaded.get_x_vector_by_clip("a1.txt").unwrap(), &[2.0, 2.0]);
    assert_eq!(reloaded.get_mean_x_vector("spk_a", Sampling::All).unwrap(), vec![3.0, 4.0]);

    let xv = reloaded.x_vector_input(&["spk_a"], Sampling::First(1)).unwrap();
    assert_eq!(xv, ConditioningInput::XVectors(vec![vec![2.0, 2.0]]));
    xv.validate(&reloaded.conditioning_mode_for_x_vectors().unwrap()).unwrap();
}

#[test]
fn clip_list_mean_matches_pairwise_mean() {
    let c = corpus();
    let encoder = EncoderAdapter::init(&TextBackend, &c.model, &c.config).unwrap();
    let a = encoder.compute_x_vector_from_clip(&c.root.join("a1.txt")).unwrap();
    let b = encoder.compute_x_vector_from_clip(&c.root.join("b2.txt")).unwrap();
    let mean = encoder
        .compute_x_vector_from_clips(&[c.root.join("a1.txt"), c.root.join("b2.txt")])
        .unwrap();
    for i in 0..mean.len() {
        assert!((mean[i] - (a[i] + b[i]) / 2.0).abs() < 1e-6);
    }
}

#[test]
fn ids_file_roundtrip_through_registry() {
    let c = corpus();
    let mut registry = SpeakerRegistry::new();
    let (ids, n) = registry.parse_speakers_from_items(&c.items);
    let ids = ids.clone();
    assert_eq!(n, 2);

    let path = c.root.join("speakers.json");
    registry.save_ids_file(&path).unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "{\n    \"spk_a\": 0,\n    \"spk_b\": 1\n}\n"
    );

    let mut other = SpeakerRegistry::new();
    other.load_ids_file(&path).unwrap();
    assert_eq!(other.get_speakers(), &ids);
}

#[test]
fn missing_clip_is_reported() {
    let c = corpus();
    let encoder = EncoderAdapter::init(&TextBackend, &c.model, &c.config).unwrap();
    let missing = c.root.join("nope.txt");
    let err = encoder.compute_x_vector_from_clip(&missing).unwrap_err();
    assert!(matches!(err, SpeakerError::Audio { ref path, .. } if path == &missing));
}

#[test]
fn features_from_a_shared_pipeline() {
    let c = corpus();
    let encoder = EncoderAdapter::init(&TextBackend, &c.model, &c.config).unwrap();
    let feats = FeatureMatrix::from_rows(vec![vec![0.5, -1.0, 2.0], vec![1.5, -3.0, 0.0]]).unwrap();
    let out = encoder.compute_x_vector(feats).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out.row(0), Some(&[1.5f32, -1.0, 2.0][..]));
}
