//! Binary weight bundles
//!
//! A `.tisk` file carries a trained network: inventories, run parameters,
//! the category index and every weight matrix.
//!
//! ## Binary Format
//!
//! ```text
//! HEADER (32 bytes)
//! ├── Magic:       "TISK" (4 bytes)
//! ├── Version:     u16
//! ├── Flags:       u16
//! ├── MetadataLen: u32 (bytes of JSON metadata)
//! ├── MatrixCount: u32
//! ├── Checksum:    u64 (over everything after the header)
//! └── Reserved:    8 bytes
//!
//! METADATA (metadata_len bytes, JSON)
//!
//! MATRICES (matrix_count entries)
//! └── Each: rows u32, cols u32, rows·cols f64 (row-major)
//! ```
//!
//! All integers and floats are little-endian. Matrices are stored in the
//! order phoneme → single phone, phoneme → diphone, single phone → word,
//! diphone → word, word bias (1 × W), word → word, word → single phone,
//! word → diphone.

use crate::error::{Result, TiskError};
use crate::lexicon::{Diphone, DiphoneScheme, Lexicon};
use crate::measure::Categories;
use crate::params::{Decay, ModelConfig, Weights};
use crate::weights::WeightMatrices;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Magic bytes of a weight bundle
pub const BUNDLE_MAGIC: [u8; 4] = *b"TISK";

/// Current bundle format version
pub const BUNDLE_VERSION: u16 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 32;

const MATRIX_COUNT: u32 = 8;

/// Bundle flags
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BundleFlags {
    /// Weights came out of the association training
    pub trained: bool,
    /// Word → sublexical feedback matrices are non-zero
    pub feedback: bool,
}

impl BundleFlags {
    fn to_u16(self) -> u16 {
        let mut flags = 0u16;
        if self.trained {
            flags |= 0x01;
        }
        if self.feedback {
            flags |= 0x02;
        }
        flags
    }

    fn from_u16(value: u16) -> Self {
        Self {
            trained: value & 0x01 != 0,
            feedback: value & 0x02 != 0,
        }
    }
}

/// Fixed-size bundle header
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub flags: BundleFlags,
    pub metadata_len: u32,
    pub matrix_count: u32,
    pub checksum: u64,
}

impl Header {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&BUNDLE_MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..8].copy_from_slice(&self.flags.to_u16().to_le_bytes());
        buf[8..12].copy_from_slice(&self.metadata_len.to_le_bytes());
        buf[12..16].copy_from_slice(&self.matrix_count.to_le_bytes());
        buf[16..24].copy_from_slice(&self.checksum.to_le_bytes());
        // 24..32 reserved
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(TiskError::BinaryFormat(format!(
                "header too short: {} bytes",
                data.len()
            )));
        }
        if data[0..4] != BUNDLE_MAGIC {
            return Err(TiskError::BinaryFormat(format!(
                "invalid magic: expected TISK, got {:?}",
                String::from_utf8_lossy(&data[0..4])
            )));
        }

        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != BUNDLE_VERSION {
            return Err(TiskError::BinaryFormat(format!(
                "unsupported version {} (expected {})",
                version, BUNDLE_VERSION
            )));
        }

        Ok(Self {
            version,
            flags: BundleFlags::from_u16(u16::from_le_bytes([data[6], data[7]])),
            metadata_len: read_u32(data, 8)?,
            matrix_count: read_u32(data, 12)?,
            checksum: u64::from_le_bytes(slice_array(data, 16)?),
        })
    }
}

/// Everything needed to rebuild a runnable model
#[derive(Clone, Debug)]
pub struct WeightBundle {
    pub lexicon: Lexicon,
    pub config: ModelConfig,
    /// Category lists of every lexicon word as a target, in word order
    pub categories: Vec<Categories>,
    pub trained_epochs: usize,
    pub weights: WeightMatrices,
}

#[derive(Serialize, Deserialize)]
struct BundleMetadata {
    phonemes: Vec<String>,
    diphones: Vec<Diphone>,
    words: Vec<String>,
    scheme: DiphoneScheme,
    categories: Vec<Categories>,
    steps_per_slot: usize,
    time_slots: usize,
    threshold: f64,
    decay: Decay,
    input_to_phoneme: f64,
    trained_epochs: usize,
}

impl BundleMetadata {
    fn from_bundle(bundle: &WeightBundle) -> Self {
        let lexicon = &bundle.lexicon;
        Self {
            phonemes: lexicon.phonemes().symbols().to_vec(),
            diphones: lexicon.diphones().pairs().to_vec(),
            words: lexicon.words().iter().map(|w| w.label.clone()).collect(),
            scheme: lexicon.scheme(),
            categories: bundle.categories.clone(),
            steps_per_slot: bundle.config.steps_per_slot,
            time_slots: bundle.config.time_slots,
            threshold: bundle.config.threshold(),
            decay: bundle.config.decay,
            input_to_phoneme: bundle.config.weights.input_to_phoneme,
            trained_epochs: bundle.trained_epochs,
        }
    }

    fn config(&self) -> ModelConfig {
        ModelConfig::new(self.time_slots)
            .with_steps_per_slot(self.steps_per_slot)
            .with_threshold(self.threshold)
            .with_decay(self.decay)
            .with_weights(Weights {
                input_to_phoneme: self.input_to_phoneme,
                ..Weights::default()
            })
    }
}

fn length_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| TiskError::BinaryFormat(format!("{} {} exceeds u32 range", what, value)))
}

fn write_matrix(buf: &mut Vec<u8>, matrix: &Array2<f64>) -> Result<()> {
    buf.extend_from_slice(&length_u32(matrix.nrows(), "matrix rows")?.to_le_bytes());
    buf.extend_from_slice(&length_u32(matrix.ncols(), "matrix cols")?.to_le_bytes());
    for &value in matrix.iter() {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    Ok(())
}

fn read_matrix(data: &[u8], offset: &mut usize) -> Result<Array2<f64>> {
    let rows = read_u32(data, *offset)? as usize;
    let cols = read_u32(data, *offset + 4)? as usize;
    *offset += 8;

    let len = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(8))
        .ok_or_else(|| TiskError::BinaryFormat(format!("matrix {}x{} too large", rows, cols)))?;
    if *offset + len > data.len() {
        return Err(TiskError::BinaryFormat(format!(
            "unexpected end of data reading {}x{} matrix",
            rows, cols
        )));
    }

    let values = data[*offset..*offset + len]
        .chunks_exact(8)
        .map(|chunk| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            f64::from_le_bytes(bytes)
        })
        .collect();
    *offset += len;

    Array2::from_shape_vec((rows, cols), values)
        .map_err(|e| TiskError::BinaryFormat(format!("bad matrix layout: {}", e)))
}

fn slice_array<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N]> {
    data.get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| TiskError::BinaryFormat(format!("unexpected end of data at offset {}", offset)))
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    Ok(u32::from_le_bytes(slice_array(data, offset)?))
}

/// Serialize a bundle to bytes
pub fn serialize(bundle: &WeightBundle) -> Result<Vec<u8>> {
    let metadata = serde_json::to_vec(&BundleMetadata::from_bundle(bundle))?;

    let weights = &bundle.weights;
    let bias = weights.word_bias.view().insert_axis(ndarray::Axis(0)).to_owned();
    let mut content = metadata.clone();
    for matrix in [
        &weights.phoneme_to_single,
        &weights.phoneme_to_diphone,
        &weights.single_to_word,
        &weights.diphone_to_word,
        &bias,
        &weights.word_to_word,
        &weights.word_to_single,
        &weights.word_to_diphone,
    ] {
        write_matrix(&mut content, matrix)?;
    }

    let header = Header {
        version: BUNDLE_VERSION,
        flags: BundleFlags {
            trained: bundle.trained_epochs > 0,
            feedback: weights.word_to_diphone.iter().chain(weights.word_to_single.iter()).any(|&w| w != 0.0),
        },
        metadata_len: length_u32(metadata.len(), "metadata length")?,
        matrix_count: MATRIX_COUNT,
        checksum: content_hash(&content),
    };

    let mut output = header.to_bytes();
    output.extend(content);
    Ok(output)
}

/// Deserialize a bundle, verifying checksum and matrix shapes
pub fn deserialize(data: &[u8]) -> Result<WeightBundle> {
    let header = Header::from_bytes(data)?;
    let content = &data[HEADER_SIZE..];

    let checksum = content_hash(content);
    if checksum != header.checksum {
        return Err(TiskError::BinaryFormat(format!(
            "checksum mismatch: expected {:016x}, got {:016x}",
            header.checksum, checksum
        )));
    }
    if header.matrix_count != MATRIX_COUNT {
        return Err(TiskError::BinaryFormat(format!(
            "expected {} matrices, header declares {}",
            MATRIX_COUNT, header.matrix_count
        )));
    }

    let metadata_end = header.metadata_len as usize;
    let metadata_bytes = content.get(..metadata_end).ok_or_else(|| {
        TiskError::BinaryFormat(format!(
            "metadata length {} exceeds content ({} bytes)",
            metadata_end,
            content.len()
        ))
    })?;
    let metadata: BundleMetadata = serde_json::from_slice(metadata_bytes)?;

    let mut offset = metadata_end;
    let phoneme_to_single = read_matrix(content, &mut offset)?;
    let phoneme_to_diphone = read_matrix(content, &mut offset)?;
    let single_to_word = read_matrix(content, &mut offset)?;
    let diphone_to_word = read_matrix(content, &mut offset)?;
    let bias = read_matrix(content, &mut offset)?;
    let word_to_word = read_matrix(content, &mut offset)?;
    let word_to_single = read_matrix(content, &mut offset)?;
    let word_to_diphone = read_matrix(content, &mut offset)?;
    if offset != content.len() {
        return Err(TiskError::BinaryFormat(format!(
            "{} trailing bytes after matrices",
            content.len() - offset
        )));
    }
    if bias.nrows() != 1 {
        return Err(TiskError::ShapeMismatch {
            expected: vec![1, metadata.words.len()],
            actual: bias.shape().to_vec(),
        });
    }

    let lexicon = Lexicon::from_parts(
        &metadata.phonemes,
        &metadata.diphones,
        &metadata.words,
        metadata.scheme,
    )?;
    let config = metadata.config();
    let weights = WeightMatrices {
        phoneme_to_diphone,
        phoneme_to_single,
        diphone_to_word,
        single_to_word,
        word_to_word,
        word_to_diphone,
        word_to_single,
        word_bias: Array1::from_iter(bias.iter().copied()),
    };
    weights.validate_shapes(&lexicon, config.time_slots)?;
    if metadata.categories.len() != lexicon.word_count() {
        return Err(TiskError::ShapeMismatch {
            expected: vec![lexicon.word_count()],
            actual: vec![metadata.categories.len()],
        });
    }

    log::debug!(
        "Loaded bundle: {} words, {} diphones, {} trained epochs",
        lexicon.word_count(),
        lexicon.diphone_count(),
        metadata.trained_epochs
    );

    Ok(WeightBundle {
        lexicon,
        config,
        categories: metadata.categories,
        trained_epochs: metadata.trained_epochs,
        weights,
    })
}

/// xxhash-style rolling checksum over 8-byte lanes
fn content_hash(data: &[u8]) -> u64 {
    let mut hash = 0x9E37_79B9_7F4A_7C15u64;
    for chunk in data.chunks(8) {
        let lane = chunk
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, &byte)| acc | (byte as u64) << (i * 8));
        hash = hash.wrapping_mul(0x85EB_CA6B).wrapping_add(lane).rotate_left(31);
    }
    hash
}

/// Save a bundle to a file.
///
/// The bytes go to a temporary file in the target's directory, which is then
/// renamed over the target. A failed save leaves any existing file intact.
pub fn save_to_file(bundle: &WeightBundle, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let binary = serialize(bundle)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(&binary)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    log::debug!("Wrote {} byte bundle to {}", binary.len(), path.display());
    Ok(())
}

/// Load a bundle from a file
pub fn load_from_file(path: impl AsRef<Path>) -> Result<WeightBundle> {
    let data = std::fs::read(path)?;
    deserialize(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{TrainingConfig, WeightGenerator};

    fn trained_bundle() -> WeightBundle {
        let lexicon = Lexicon::new(&["pat", "tap", "at"], DiphoneScheme::Gapped { gap: 3 }).unwrap();
        let mut gen = WeightGenerator::new(lexicon, ModelConfig::new(5)).unwrap();
        gen.train(&TrainingConfig {
            epochs: 20,
            ..TrainingConfig::default()
        });
        gen.generate_wired_weights();
        gen.to_bundle().unwrap()
    }

    #[test]
    fn test_header_roundtrip() {
        let header = Header {
            version: BUNDLE_VERSION,
            flags: BundleFlags {
                trained: true,
                feedback: false,
            },
            metadata_len: 123,
            matrix_count: 8,
            checksum: 0xDEAD_BEEF_0102_0304,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"TISK");
        assert_eq!(Header::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_bundle_roundtrip() {
        let bundle = trained_bundle();
        let bytes = serialize(&bundle).unwrap();
        let loaded = deserialize(&bytes).unwrap();

        assert_eq!(loaded.weights, bundle.weights);
        assert_eq!(loaded.categories, bundle.categories);
        assert_eq!(loaded.trained_epochs, 20);
        assert_eq!(loaded.lexicon.words(), bundle.lexicon.words());
        assert_eq!(loaded.lexicon.diphones().pairs(), bundle.lexicon.diphones().pairs());
        assert_eq!(loaded.lexicon.scheme(), DiphoneScheme::Gapped { gap: 3 });
        assert_eq!(loaded.config.threshold(), bundle.config.threshold());
        assert_eq!(loaded.config.total_cycles(), bundle.config.total_cycles());
        assert_eq!(loaded.config.decay, bundle.config.decay);
    }

    #[test]
    fn test_file_roundtrip() {
        let bundle = trained_bundle();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.tisk");
        save_to_file(&bundle, &path).unwrap();
        let loaded = load_from_file(&path).unwrap();
        assert_eq!(loaded.weights, bundle.weights);
    }

    #[test]
    fn test_save_replaces_existing_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.tisk");
        std::fs::write(&path, b"stale").unwrap();

        let bundle = trained_bundle();
        save_to_file(&bundle, &path).unwrap();
        assert_eq!(load_from_file(&path).unwrap().weights, bundle.weights);
        // no temporary files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_save_keeps_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("occupied");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep.txt"), b"keep").unwrap();

        assert!(save_to_file(&trained_bundle(), &target).is_err());
        assert_eq!(std::fs::read(target.join("keep.txt")).unwrap(), b"keep");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_oversized_lengths_rejected() {
        // zero columns, so no allocation
        let tall = Array2::<f64>::zeros((u32::MAX as usize + 1, 0));
        let mut buf = Vec::new();
        assert!(matches!(write_matrix(&mut buf, &tall), Err(TiskError::BinaryFormat(_))));
        assert!(matches!(
            length_u32(usize::MAX, "metadata length"),
            Err(TiskError::BinaryFormat(ref msg)) if msg.contains("metadata length")
        ));
        assert_eq!(length_u32(42, "matrix rows").unwrap(), 42);
    }

    #[test]
    fn test_corrupted_byte_fails_checksum() {
        let mut bytes = serialize(&trained_bundle()).unwrap();
        let last = bytes.len() - 3;
        bytes[last] ^= 0x40;
        let err = deserialize(&bytes).unwrap_err();
        assert!(matches!(err, TiskError::BinaryFormat(ref msg) if msg.contains("checksum")));
    }

    #[test]
    fn test_rejects_bad_header() {
        let bytes = serialize(&trained_bundle()).unwrap();

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(deserialize(&bad_magic), Err(TiskError::BinaryFormat(_))));

        let mut bad_version = bytes.clone();
        bad_version[4] = 9;
        assert!(matches!(deserialize(&bad_version), Err(TiskError::BinaryFormat(_))));

        assert!(matches!(deserialize(&bytes[..20]), Err(TiskError::BinaryFormat(_))));
        assert!(matches!(
            deserialize(&bytes[..bytes.len() - 8]),
            Err(TiskError::BinaryFormat(_))
        ));
    }

    #[test]
    fn test_rejects_inconsistent_shapes() {
        let mut bundle = trained_bundle();
        bundle.weights.word_to_word = Array2::zeros((2, 2));
        let bytes = serialize(&bundle).unwrap();
        assert!(matches!(deserialize(&bytes), Err(TiskError::ShapeMismatch { .. })));
    }
}
