//! Monophonic melody extraction: correntropy-based note boundaries plus
//! per-window pitch estimation.

pub mod audio;
pub mod diagnostics;
pub mod error;
pub mod melody;
pub mod midi;
pub mod pitch;
pub mod transient;

pub use audio::AudioBuffer;
pub use error::{MelexError, Result};
pub use melody::{compile_notes, midi_number, note_name, Note, NoteConfig, TuningAdjustment};
pub use midi::{write_midi, MidiConfig};
pub use pitch::{extract_pitch, PitchStrategy, PitchTrack};
pub use transient::{pairwise_transient_detection, TransientConfig};
