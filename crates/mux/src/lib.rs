//! `splice-mux`: container muxing for the Splice composition engine.
//!
//! The export pipeline talks to containers through the [`Muxer`] trait;
//! this crate provides the trait, a pure-Rust MP4 writer, and a recording
//! test double.
//!
//! # Architecture
//!
//! - **No FFmpeg dependency**: MP4 boxes are written directly
//! - **Progressive write**: mdat data is streamed as samples arrive
//! - **Moov-at-end**: the metadata box is written during `close()`
//! - **Edit lists and rotation**: transmux trim points and display
//!   orientation are expressed as container metadata, not re-encoding

pub mod atoms;
pub mod error;
pub mod mp4;
pub mod muxer;
pub mod recording;

pub use error::{MuxError, MuxResult};
pub use mp4::Mp4Muxer;
pub use muxer::{MetadataEntry, Muxer, TrackFormat, TrackToken};
pub use recording::{RecordedSample, RecordingHandle, RecordingMuxer};
