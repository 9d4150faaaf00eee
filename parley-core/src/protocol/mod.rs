//! Wire types shared by the HTTP services and their clients.

pub mod results;

pub use results::{
    SynthesisFailure, SynthesisResult, SynthesisSuccess, TranscriptionFailure,
    TranscriptionResult, TranscriptionSuccess, CACHED_DEVICE,
};
