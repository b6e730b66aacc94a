//! Store + generation round trip over a real temporary directory, using a
//! real WAV written by hound.

use audio_visualizer::{
    generate::{self, GenerateError, SpectroParams},
    store::{MediaStore, RESULT_DIR},
};
use hound::{SampleFormat, WavSpec, WavWriter};

const PARAMS: SpectroParams = SpectroParams { window_len: 256 };

fn wav_bytes(seconds: f32, sample_rate: u32, frequency: f32) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).expect("wav writer");
        let total = (seconds * sample_rate as f32) as u32;
        for sample_num in 0..total {
            let t = sample_num as f32 / sample_rate as f32;
            let amplitude = (2.0 * std::f32::consts::PI * frequency * t).sin();
            writer
                .write_sample((amplitude * f32::from(i16::MAX) * 0.8) as i16)
                .expect("write sample");
        }
        writer.finalize().expect("finalize");
    }
    cursor.into_inner()
}

#[test]
fn upload_then_generate_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MediaStore::new(dir.path().to_path_buf());

    let batch = store.begin_batch("sess").expect("begin");
    batch
        .store_file("clip.wav", &wav_bytes(0.5, 8000, 440.0))
        .expect("store clip");
    batch
        .store_file("tone.wav", &wav_bytes(0.25, 8000, 880.0))
        .expect("store tone");
    let batch_dir = batch.commit().expect("commit");

    let entries = generate::generate_batch(&batch_dir, PARAMS).expect("generate");
    assert_eq!(entries.len(), 2);

    let result_dir = batch_dir.join(RESULT_DIR);
    for entry in &entries {
        assert_eq!(entry.image, format!("{}.png", entry.source));
        let image = result_dir.join(&entry.image);
        assert!(image.is_file(), "missing {}", image.display());
        // PNG magic.
        let bytes = std::fs::read(&image).expect("read image");
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    let manifest = generate::read_manifest(&result_dir)
        .expect("read manifest")
        .expect("manifest present");
    assert_eq!(manifest, entries);
    assert!(manifest
        .iter()
        .any(|entry| entry.source == "clip.wav" && entry.image == "clip.wav.png"));
}

#[test]
fn regeneration_skips_the_result_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MediaStore::new(dir.path().to_path_buf());

    let batch = store.begin_batch("sess").expect("begin");
    batch
        .store_file("clip.wav", &wav_bytes(0.5, 8000, 440.0))
        .expect("store");
    let batch_dir = batch.commit().expect("commit");

    generate::generate_batch(&batch_dir, PARAMS).expect("generate");
    // The result subdirectory now exists; a second pass must not treat it
    // (or the images inside it) as audio input.
    let again = generate::generate_batch(&batch_dir, PARAMS).expect("regenerate");
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].source, "clip.wav");
}

#[test]
fn manifest_absent_before_generation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MediaStore::new(dir.path().to_path_buf());
    let batch_dir = store.begin_batch("sess").expect("begin").commit().expect("commit");

    assert!(generate::read_manifest(&batch_dir.join(RESULT_DIR))
        .expect("read manifest")
        .is_none());
}

#[test]
fn undecodable_audio_fails_the_whole_batch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MediaStore::new(dir.path().to_path_buf());

    let batch = store.begin_batch("sess").expect("begin");
    batch
        .store_file("good.wav", &wav_bytes(0.5, 8000, 440.0))
        .expect("store good");
    batch
        .store_file("junk.wav", b"this is not audio")
        .expect("store junk");
    let batch_dir = batch.commit().expect("commit");

    match generate::generate_batch(&batch_dir, PARAMS) {
        Err(GenerateError::Decode { path, .. }) => {
            assert!(path.ends_with("junk.wav"));
        }
        other => panic!("expected decode failure, got {other:?}"),
    }
}

#[test]
fn too_short_audio_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MediaStore::new(dir.path().to_path_buf());

    let batch = store.begin_batch("sess").expect("begin");
    // 100 samples is less than one 256-sample analysis window.
    batch
        .store_file("blip.wav", &wav_bytes(0.0125, 8000, 440.0))
        .expect("store");
    let batch_dir = batch.commit().expect("commit");

    assert!(matches!(
        generate::generate_batch(&batch_dir, PARAMS),
        Err(GenerateError::TooShort { .. })
    ));
}

#[test]
fn new_upload_discards_previous_results() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MediaStore::new(dir.path().to_path_buf());

    let first = store.begin_batch("sess").expect("begin");
    first
        .store_file("clip.wav", &wav_bytes(0.5, 8000, 440.0))
        .expect("store");
    let first_dir = first.commit().expect("commit");
    generate::generate_batch(&first_dir, PARAMS).expect("generate");

    let second = store.begin_batch("sess").expect("begin");
    second
        .store_file("other.wav", &wav_bytes(0.5, 8000, 220.0))
        .expect("store");
    second.commit().expect("commit");

    let current = store.current_batch("sess").expect("read").expect("active");
    assert!(
        generate::read_manifest(&current.join(RESULT_DIR))
            .expect("read manifest")
            .is_none(),
        "previous batch's results must not leak into the new batch"
    );
    assert!(!first_dir.exists());
}
