use crate::{file_io::read_wav, plotting, store::RESULT_DIR};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use stft::{fft::window_fn, SpecCompute, WindowLength};
use thiserror::Error;

/// Name of the side record mapping generated images to their source files.
pub const MANIFEST_NAME: &str = "manifest.json";

/// Fixed title drawn on every generated image.
const SPECTROGRAM_TITLE: &str = "Spectrogram";

/// Analysis parameters shared by every generated image.
#[derive(Debug, Clone, Copy)]
pub struct SpectroParams {
    /// Analysis window length in samples. Step is a quarter window.
    pub window_len: usize,
}

impl Default for SpectroParams {
    fn default() -> Self {
        SpectroParams { window_len: 2048 }
    }
}

/// One generated image and the file it came from.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub image: String,
    pub source: String,
}

/// Errors that can happen while generating a batch's spectrograms.
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Io Error: {0}")]
    Io(#[from] io::Error),
    #[error("Could not decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("{} is shorter than one analysis window", path.display())]
    TooShort { path: PathBuf },
    #[error("Could not render {}: {source}", path.display())]
    Render {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// Generate one spectrogram image per regular file in the batch directory,
/// then write the result manifest. Entries that are not regular files (the
/// `result` subdirectory itself included) are skipped. Any per-file failure
/// fails the whole batch.
pub fn generate_batch(
    batch_dir: &Path,
    params: SpectroParams,
) -> Result<Vec<ManifestEntry>, GenerateError> {
    let result_dir = batch_dir.join(RESULT_DIR);
    if !result_dir.exists() {
        fs::create_dir(&result_dir)?;
    }

    let mut entries = Vec::new();
    for dir_entry in fs::read_dir(batch_dir)? {
        let dir_entry = dir_entry?;
        if !dir_entry.file_type()?.is_file() {
            continue;
        }

        let path = dir_entry.path();
        let source = dir_entry.file_name().to_string_lossy().into_owned();
        let image = format!("{source}.png");
        render_file(&path, &result_dir.join(&image), params)?;
        info!("generated {image}");
        entries.push(ManifestEntry { image, source });
    }

    let manifest = fs::File::create(result_dir.join(MANIFEST_NAME))?;
    serde_json::to_writer_pretty(io::BufWriter::new(manifest), &entries)
        .map_err(io::Error::from)?;
    info!(
        "generated {} spectrogram(s) in {}",
        entries.len(),
        result_dir.display()
    );
    Ok(entries)
}

/// Read a result directory's manifest. `None` when no generation ever ran.
pub fn read_manifest(result_dir: &Path) -> Result<Option<Vec<ManifestEntry>>, GenerateError> {
    match fs::read(result_dir.join(MANIFEST_NAME)) {
        Ok(bytes) => Ok(Some(
            serde_json::from_slice(&bytes).map_err(io::Error::from)?,
        )),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn render_file(audio: &Path, image: &Path, params: SpectroParams) -> Result<(), GenerateError> {
    let (spec, data) = read_wav(audio).map_err(|source| GenerateError::Decode {
        path: audio.to_path_buf(),
        source,
    })?;

    let window_len = WindowLength::from_samples(params.window_len);
    if data.len() < window_len.samples() {
        return Err(GenerateError::TooShort {
            path: audio.to_path_buf(),
        });
    }

    let window_step = window_len / 4;
    let spectrogram = SpecCompute::new(data, window_len, window_step, window_fn::hann)
        .stft()
        .into_db_ref_max();

    plotting::plot_spectrogram(
        &spectrogram,
        spec.sample_rate as f32,
        window_step.samples(),
        image,
        SPECTROGRAM_TITLE,
    )
    .map_err(|source| GenerateError::Render {
        path: audio.to_path_buf(),
        source,
    })
}
