pub mod buffer;
pub mod decode;
pub mod resample;
pub mod stft;

pub use buffer::AudioBuffer;
