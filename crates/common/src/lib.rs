//! `splice-common`: shared types, traits, and errors for the Splice
//! composition engine.
//!
//! This crate is the foundation that all other engine crates depend on.
//! It defines the core abstractions:
//!
//! - **Types**: `TimeUs`, `Rational`, `Resolution`, `SourceId` (newtypes for safety)
//! - **Frames**: `VideoFrame`, `AudioChunk`, `EncodedSample`, `SampleTiming`
//! - **Effects**: `EffectInstance`, `FrameEffect`/`AudioEffect` capability traits
//! - **Sources**: `MediaSource`, `VideoDecoder`, `VideoEncoder`, `SourceProvider`
//!   (opaque collaborator capabilities)
//! - **Errors**: `ConfigError`, `CodecError`, `EngineError` (thiserror-based)
//! - **Config**: `TrimTolerance`, `PipelineConfig`, `ExportOptions`

pub mod codec;
pub mod config;
pub mod effect;
pub mod error;
pub mod frame;
pub mod source;
pub mod testing;
pub mod types;

// Re-export commonly used items at crate root
pub use codec::{AudioCodec, ContainerFormat, SampleFormat, VideoCodec};
pub use config::{ExportOptions, PipelineConfig, TrimTolerance};
pub use effect::{
    build_audio_effect, build_frame_effect, AudioEffect, BrightnessEffect, EffectId,
    EffectInstance, FrameEffect, GainEffect, NoOpEffect, ParamValue,
};
pub use error::{CodecError, CodecRole, ConfigError, EngineError, EngineResult};
pub use frame::{
    AudioChunk, AudioStreamInfo, EncodedSample, SampleFlags, SampleTiming, VideoFrame,
    VideoStreamInfo,
};
pub use source::{
    AudioDecoder, AudioEncoder, CodecFactory, ImageLoader, MediaContext, MediaSource,
    SourceProvider, VideoDecoder, VideoEncoder,
};
pub use types::{Rational, Resolution, SourceId, TimeUs, TrackKind};
