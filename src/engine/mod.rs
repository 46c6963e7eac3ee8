//! Audio Engine Module
//!
//! Core audio plumbing:
//! - Planar audio buffer and level helpers
//! - Decoding and encoding of audio files

pub mod buffer;
pub mod io;

pub use buffer::{AudioBuffer, ChannelLayout, OUTPUT_CEILING};
pub use io::{
    decode_audio, encode_audio, generate_stereo_test_tone, generate_test_tone, ContainerFormat,
    DecodedAudio, ExportFormat, SourceFormat,
};
