//! WAV adapter for decoded PCM16 little-endian audio (spec §6: "an
//! optional WAV emitter is provided likewise").

use std::path::Path;

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};

pub fn write_wav(samples: &[i16], channels: u16, sample_rate: u32, out_path: &Path) -> Result<()> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(out_path, spec)
        .with_context(|| format!("failed to create WAV: {}", out_path.display()))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize().context("failed to finalize WAV writer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_readable_wav() {
        let samples = vec![0i16, 1000, -1000, 32767, -32768];
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.wav");
        write_wav(&samples, 1, 22050, &path).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let read_back: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read_back, samples);
    }
}
