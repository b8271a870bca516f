//! Raw spectrogram dumps for offline inspection.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::stft::Spectrogram;
use crate::error::{MelexError, Result};

/// Sidecar describing the layout of a `.bin` dump.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct DumpHeader {
    pub dtype: String,
    pub shape: [usize; 2],
    pub frequencies: Vec<f32>,
}

fn with_extension(prefix: &Path, ext: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Little-endian bytes of `data`, borrowed when the target already is.
fn le_bytes(data: &[f32]) -> Cow<'_, [u8]> {
    if cfg!(target_endian = "little") {
        Cow::Borrowed(bytemuck::cast_slice(data))
    } else {
        Cow::Owned(data.iter().flat_map(|v| v.to_le_bytes()).collect())
    }
}

/// Write `<prefix>.bin` (row-major little-endian f32) and `<prefix>.json`.
pub fn dump_spectrogram(spectrogram: &Spectrogram, prefix: &Path) -> Result<()> {
    let bin_path = with_extension(prefix, "bin");
    let json_path = with_extension(prefix, "json");

    std::fs::write(&bin_path, le_bytes(spectrogram.data()))
        .map_err(|e| MelexError::io("writing spectrogram data", e))?;

    let header = DumpHeader {
        dtype: "<f4".to_string(),
        shape: [spectrogram.num_windows(), spectrogram.num_bins()],
        frequencies: spectrogram.frequencies().to_vec(),
    };
    let json = serde_json::to_string_pretty(&header)
        .map_err(|e| MelexError::io("writing spectrogram header", e.into()))?;
    std::fs::write(&json_path, json).map_err(|e| MelexError::io("writing spectrogram header", e))?;

    log::info!(
        "Dumped {}x{} spectrogram to {}",
        header.shape[0],
        header.shape[1],
        bin_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_round_trips_shape_and_data() {
        let spec =
            Spectrogram::new(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0], 3, vec![0.0, 10.0, 20.0]).unwrap();
        let prefix = std::env::temp_dir().join(format!("melex-dump-{}", std::process::id()));
        dump_spectrogram(&spec, &prefix).unwrap();

        let json = std::fs::read_to_string(with_extension(&prefix, "json")).unwrap();
        let header: DumpHeader = serde_json::from_str(&json).unwrap();
        assert_eq!(header.dtype, "<f4");
        assert_eq!(header.shape, [2, 3]);
        assert_eq!(header.frequencies, vec![0.0, 10.0, 20.0]);

        let bytes = std::fs::read(with_extension(&prefix, "bin")).unwrap();
        assert_eq!(bytes.len(), 6 * 4);
        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(values, spec.data());

        // 1.0f32 is 0x3F800000, low byte first
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x80, 0x3F]);

        let _ = std::fs::remove_file(with_extension(&prefix, "bin"));
        let _ = std::fs::remove_file(with_extension(&prefix, "json"));
    }
}
