use hound::{SampleFormat, WavReader, WavSpec};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Write byte slice to specified file.
pub fn write_file_bytes(file: &Path, data: &[u8]) -> std::io::Result<()> {
    let file_handle = File::create(file)?;
    let mut writer = BufWriter::new(file_handle);
    writer.write_all(data)?;
    writer.flush()?;
    Ok(())
}

/// Read data from a wav file.
/// Only the first channel is kept for analysis.
pub fn read_wav(file: &Path) -> Result<(WavSpec, Vec<f64>), hound::Error> {
    let mut reader = WavReader::open(file)?;
    let spec = reader.spec();
    log::trace!("Spec: {:?}", spec);
    // Select correct format representation.
    let data = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .step_by(spec.channels.into()) // Ignore all but first channel.
            .map(|x| x.map(f64::from))
            .collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => reader
            .samples::<i32>()
            .step_by(spec.channels.into()) // Ignore all but first channel.
            .map(|x| x.map(f64::from))
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok((spec, data))
}

#[cfg(test)]
mod tests {
    use super::{read_wav, write_file_bytes};
    use hound::{SampleFormat, WavSpec, WavWriter};

    #[test]
    fn write_then_read_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("raw.bin");
        write_file_bytes(&path, b"abc123").expect("write");
        assert_eq!(std::fs::read(&path).expect("read"), b"abc123");
    }

    #[test]
    fn read_wav_keeps_first_channel_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).expect("create wav");
        for frame in 0..10i16 {
            writer.write_sample(frame).expect("left");
            writer.write_sample(-frame).expect("right");
        }
        writer.finalize().expect("finalize");

        let (read_spec, data) = read_wav(&path).expect("read wav");
        assert_eq!(read_spec.sample_rate, 8000);
        assert_eq!(data.len(), 10);
        // Left channel is the non-negative ramp.
        assert!(data.iter().all(|&s| s >= 0.0));
    }

    #[test]
    fn read_wav_rejects_garbage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("not.wav");
        write_file_bytes(&path, b"definitely not a wav file").expect("write");
        assert!(read_wav(&path).is_err());
    }
}
