//! Deterministic in-memory fakes for the collaborator traits.
//!
//! Playback and export test suites both run against these: a synthetic
//! media source with a configurable GOP structure, pass-through fake
//! codecs, and a solid-color image loader. Everything is fully
//! deterministic so frame-accurate assertions hold across runs.

use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::{AudioCodec, SampleFormat, VideoCodec};
use crate::error::{CodecError, CodecRole, ConfigError};
use crate::frame::{AudioChunk, EncodedSample, VideoFrame};
use crate::source::{
    AudioDecoder, AudioEncoder, CodecFactory, ImageLoader, MediaContext, MediaSource,
    SourceProvider, VideoDecoder, VideoEncoder,
};
use crate::types::{Rational, Resolution, SourceId, TimeUs, TrackKind};

/// Samples per fake audio packet, AAC-style.
pub const AUDIO_SAMPLES_PER_PACKET: u32 = 1024;

/// Blueprint for a [`FakeSource`]. Cloneable so a provider can mint a
/// fresh source per `open()`.
#[derive(Clone, Debug)]
pub struct FakeSourceSpec {
    pub frame_count: u64,
    pub frame_rate: Rational,
    /// Keyframe every `gop` frames; frame 0 is always a keyframe.
    pub gop: u64,
    pub resolution: Resolution,
    pub video_codec: VideoCodec,
    /// When set, the source also carries an AAC-style audio track at
    /// this sample rate, covering the video duration.
    pub audio_sample_rate: Option<u32>,
}

impl FakeSourceSpec {
    pub fn video(frame_count: u64, frame_rate: Rational, gop: u64) -> Self {
        Self {
            frame_count,
            frame_rate,
            gop,
            // Small default so frame data stays cheap to clone in tests.
            resolution: Resolution::new(64, 36),
            video_codec: VideoCodec::H264,
            audio_sample_rate: None,
        }
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_audio(mut self, sample_rate: u32) -> Self {
        self.audio_sample_rate = Some(sample_rate);
        self
    }

    pub fn duration(&self) -> TimeUs {
        self.frame_rate.frame_timestamp(self.frame_count)
    }

    fn video_format(&self) -> SampleFormat {
        SampleFormat::Video {
            codec: self.video_codec,
            resolution: self.resolution,
            frame_rate: self.frame_rate,
        }
    }

    fn audio_format(&self) -> Option<SampleFormat> {
        self.audio_sample_rate.map(|rate| SampleFormat::Audio {
            codec: AudioCodec::Aac,
            sample_rate: rate,
            channels: 2,
        })
    }

    fn audio_packet_count(&self) -> u64 {
        match self.audio_sample_rate {
            Some(rate) => {
                let dur = self.duration().as_micros() as u128;
                let packet_us = AUDIO_SAMPLES_PER_PACKET as u128 * 1_000_000 / rate as u128;
                if packet_us == 0 {
                    0
                } else {
                    dur.div_ceil(packet_us) as u64
                }
            }
            None => 0,
        }
    }

    fn audio_packet_pts(&self, index: u64) -> TimeUs {
        let rate = self.audio_sample_rate.unwrap_or(48_000) as i64;
        TimeUs(index as i64 * AUDIO_SAMPLES_PER_PACKET as i64 * 1_000_000 / rate)
    }
}

/// Synthetic demuxed source. Video payloads carry their frame index so a
/// test can verify which encoded samples actually flowed through.
pub struct FakeSource {
    spec: FakeSourceSpec,
    video_cursor: u64,
    audio_cursor: u64,
}

impl FakeSource {
    pub fn new(spec: FakeSourceSpec) -> Self {
        Self {
            spec,
            video_cursor: 0,
            audio_cursor: 0,
        }
    }

    fn video_sample(&self, index: u64) -> EncodedSample {
        let pts = self.spec.frame_rate.frame_timestamp(index);
        EncodedSample {
            data: index.to_le_bytes().to_vec(),
            pts,
            dts: pts,
            is_keyframe: index % self.spec.gop.max(1) == 0,
        }
    }
}

impl MediaSource for FakeSource {
    fn track_formats(&self) -> Vec<SampleFormat> {
        let mut formats = vec![self.spec.video_format()];
        if let Some(audio) = self.spec.audio_format() {
            formats.push(audio);
        }
        formats
    }

    fn duration(&self) -> TimeUs {
        self.spec.duration()
    }

    fn keyframe_timestamps(&self) -> Vec<TimeUs> {
        (0..self.spec.frame_count)
            .step_by(self.spec.gop.max(1) as usize)
            .map(|i| self.spec.frame_rate.frame_timestamp(i))
            .collect()
    }

    fn read_sample(&mut self, kind: TrackKind) -> Option<EncodedSample> {
        match kind {
            TrackKind::Video => {
                if self.video_cursor >= self.spec.frame_count {
                    return None;
                }
                let sample = self.video_sample(self.video_cursor);
                self.video_cursor += 1;
                Some(sample)
            }
            TrackKind::Audio => {
                if self.audio_cursor >= self.spec.audio_packet_count() {
                    return None;
                }
                let pts = self.spec.audio_packet_pts(self.audio_cursor);
                self.audio_cursor += 1;
                Some(EncodedSample {
                    data: vec![0xAA; 64],
                    pts,
                    dts: pts,
                    is_keyframe: true,
                })
            }
        }
    }

    fn seek_to_keyframe(&mut self, kind: TrackKind, target: TimeUs) -> Result<TimeUs, ConfigError> {
        match kind {
            TrackKind::Video => {
                let frame = self.spec.frame_rate.frames_before(target + TimeUs::from_micros(1));
                let frame = frame.saturating_sub(1).min(self.spec.frame_count.saturating_sub(1));
                let keyframe = frame - frame % self.spec.gop.max(1);
                self.video_cursor = keyframe;
                Ok(self.spec.frame_rate.frame_timestamp(keyframe))
            }
            TrackKind::Audio => {
                // Every audio packet is a sync point.
                let count = self.spec.audio_packet_count();
                let mut idx = 0;
                while idx + 1 < count && self.spec.audio_packet_pts(idx + 1) <= target {
                    idx += 1;
                }
                self.audio_cursor = idx;
                Ok(self.spec.audio_packet_pts(idx))
            }
        }
    }

    fn reset(&mut self) {
        self.video_cursor = 0;
        self.audio_cursor = 0;
    }
}

/// Decodes fake video samples into solid frames whose red channel carries
/// the low byte of the frame index.
pub struct FakeVideoDecoder {
    resolution: Resolution,
}

impl FakeVideoDecoder {
    pub fn new(resolution: Resolution) -> Self {
        Self { resolution }
    }
}

impl VideoDecoder for FakeVideoDecoder {
    fn name(&self) -> &str {
        "fake-video-decoder"
    }

    fn decode(&mut self, sample: &EncodedSample) -> Result<Vec<VideoFrame>, CodecError> {
        let index = sample.data.first().copied().unwrap_or(0);
        Ok(vec![VideoFrame::solid(
            self.resolution,
            [index, 0, 0, 255],
            sample.pts,
        )])
    }

    fn flush(&mut self) -> Result<Vec<VideoFrame>, CodecError> {
        Ok(Vec::new())
    }
}

pub struct FakeAudioDecoder {
    sample_rate: u32,
    channels: u16,
}

impl AudioDecoder for FakeAudioDecoder {
    fn name(&self) -> &str {
        "fake-audio-decoder"
    }

    fn decode(&mut self, sample: &EncodedSample) -> Result<Vec<AudioChunk>, CodecError> {
        Ok(vec![AudioChunk {
            samples: vec![0.5; AUDIO_SAMPLES_PER_PACKET as usize * self.channels as usize],
            sample_rate: self.sample_rate,
            channels: self.channels,
            pts: sample.pts,
        }])
    }

    fn flush(&mut self) -> Result<Vec<AudioChunk>, CodecError> {
        Ok(Vec::new())
    }
}

/// Re-encodes frames one to one, keyframe every `gop` outputs.
pub struct FakeVideoEncoder {
    format: SampleFormat,
    gop: u64,
    emitted: u64,
}

impl VideoEncoder for FakeVideoEncoder {
    fn name(&self) -> &str {
        "fake-video-encoder"
    }

    fn output_format(&self) -> SampleFormat {
        self.format.clone()
    }

    fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<EncodedSample>, CodecError> {
        let is_keyframe = self.emitted % self.gop == 0;
        self.emitted += 1;
        Ok(vec![EncodedSample {
            data: vec![frame.data.first().copied().unwrap_or(0); 16],
            pts: frame.pts,
            dts: frame.pts,
            is_keyframe,
        }])
    }

    fn flush(&mut self) -> Result<Vec<EncodedSample>, CodecError> {
        Ok(Vec::new())
    }
}

pub struct FakeAudioEncoder {
    format: SampleFormat,
}

impl AudioEncoder for FakeAudioEncoder {
    fn name(&self) -> &str {
        "fake-audio-encoder"
    }

    fn output_format(&self) -> SampleFormat {
        self.format.clone()
    }

    fn encode(&mut self, chunk: &AudioChunk) -> Result<Vec<EncodedSample>, CodecError> {
        Ok(vec![EncodedSample {
            data: vec![0xBB; 32],
            pts: chunk.pts,
            dts: chunk.pts,
            is_keyframe: true,
        }])
    }

    fn flush(&mut self) -> Result<Vec<EncodedSample>, CodecError> {
        Ok(Vec::new())
    }
}

/// Factory handing out the fake codecs above. `encodable` gates
/// `can_encode`, which lets tests force the trim optimizer's
/// format-mismatch fallback.
pub struct FakeCodecFactory {
    pub encodable: bool,
    /// Keyframe interval of the fake encoder's output.
    pub encoder_gop: u64,
}

impl Default for FakeCodecFactory {
    fn default() -> Self {
        Self {
            encodable: true,
            encoder_gop: 10,
        }
    }
}

impl CodecFactory for FakeCodecFactory {
    fn open_video_decoder(
        &self,
        format: &SampleFormat,
    ) -> Result<Box<dyn VideoDecoder>, CodecError> {
        match format {
            SampleFormat::Video { resolution, .. } => {
                Ok(Box::new(FakeVideoDecoder::new(*resolution)))
            }
            SampleFormat::Audio { .. } => Err(CodecError::new(
                TrackKind::Video,
                CodecRole::Decoder,
                "audio format handed to video decoder",
            )),
        }
    }

    fn open_audio_decoder(
        &self,
        format: &SampleFormat,
    ) -> Result<Box<dyn AudioDecoder>, CodecError> {
        match format {
            SampleFormat::Audio {
                sample_rate,
                channels,
                ..
            } => Ok(Box::new(FakeAudioDecoder {
                sample_rate: *sample_rate,
                channels: *channels,
            })),
            SampleFormat::Video { .. } => Err(CodecError::new(
                TrackKind::Audio,
                CodecRole::Decoder,
                "video format handed to audio decoder",
            )),
        }
    }

    fn open_video_encoder(
        &self,
        format: &SampleFormat,
    ) -> Result<Box<dyn VideoEncoder>, CodecError> {
        if !self.encodable {
            return Err(CodecError::new(
                TrackKind::Video,
                CodecRole::Encoder,
                "no encoder for format",
            ));
        }
        Ok(Box::new(FakeVideoEncoder {
            format: format.clone(),
            gop: self.encoder_gop.max(1),
            emitted: 0,
        }))
    }

    fn open_audio_encoder(
        &self,
        format: &SampleFormat,
    ) -> Result<Box<dyn AudioEncoder>, CodecError> {
        Ok(Box::new(FakeAudioEncoder {
            format: format.clone(),
        }))
    }

    fn can_encode(&self, _format: &SampleFormat) -> bool {
        self.encodable
    }
}

/// Loads every image reference as a solid-color bitmap.
pub struct SolidImageLoader {
    pub resolution: Resolution,
    pub rgba: [u8; 4],
}

impl Default for SolidImageLoader {
    fn default() -> Self {
        Self {
            resolution: Resolution::new(64, 36),
            rgba: [0, 200, 0, 255],
        }
    }
}

impl ImageLoader for SolidImageLoader {
    fn load(&self, _id: &SourceId) -> Result<VideoFrame, ConfigError> {
        Ok(VideoFrame::solid(self.resolution, self.rgba, TimeUs::ZERO))
    }
}

/// Provider backed by a spec table; `open` mints a fresh source each time.
#[derive(Default)]
pub struct FakeProvider {
    specs: HashMap<String, FakeSourceSpec>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, id: impl Into<String>, spec: FakeSourceSpec) -> Self {
        self.specs.insert(id.into(), spec);
        self
    }

    pub fn spec(&self, id: &str) -> Option<&FakeSourceSpec> {
        self.specs.get(id)
    }
}

impl SourceProvider for FakeProvider {
    fn open(&self, id: &SourceId) -> Result<Box<dyn MediaSource>, ConfigError> {
        let spec = self
            .specs
            .get(&id.0)
            .ok_or_else(|| ConfigError::UnknownSource(id.0.clone()))?;
        Ok(Box::new(FakeSource::new(spec.clone())))
    }
}

/// Assemble a [`MediaContext`] over the fakes.
pub fn fake_context(provider: FakeProvider) -> MediaContext {
    MediaContext {
        sources: Arc::new(provider),
        codecs: Arc::new(FakeCodecFactory::default()),
        images: Arc::new(SolidImageLoader::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_source_keyframe_list() {
        let src = FakeSource::new(FakeSourceSpec::video(25, Rational::FPS_30, 10));
        let keys = src.keyframe_timestamps();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[0], TimeUs::ZERO);
        assert_eq!(keys[1], Rational::FPS_30.frame_timestamp(10));
    }

    #[test]
    fn fake_source_sequential_reads() {
        let mut src = FakeSource::new(FakeSourceSpec::video(3, Rational::FPS_30, 10));
        let first = src.read_sample(TrackKind::Video).unwrap();
        assert!(first.is_keyframe);
        assert_eq!(first.pts, TimeUs::ZERO);
        let second = src.read_sample(TrackKind::Video).unwrap();
        assert!(!second.is_keyframe);
        assert_eq!(second.pts, Rational::FPS_30.frame_timestamp(1));
        src.read_sample(TrackKind::Video).unwrap();
        assert!(src.read_sample(TrackKind::Video).is_none());
    }

    #[test]
    fn seek_lands_on_preceding_keyframe() {
        let mut src = FakeSource::new(FakeSourceSpec::video(30, Rational::FPS_30, 10));
        // 500ms is frame 15; preceding keyframe is frame 10.
        let landed = src
            .seek_to_keyframe(TrackKind::Video, TimeUs::from_millis(500))
            .unwrap();
        assert_eq!(landed, Rational::FPS_30.frame_timestamp(10));
        let next = src.read_sample(TrackKind::Video).unwrap();
        assert_eq!(next.pts, landed);
        assert!(next.is_keyframe);
    }

    #[test]
    fn audio_track_present_when_requested() {
        let spec = FakeSourceSpec::video(30, Rational::FPS_30, 10).with_audio(48_000);
        let mut src = FakeSource::new(spec);
        assert_eq!(src.track_formats().len(), 2);
        let packet = src.read_sample(TrackKind::Audio).unwrap();
        assert_eq!(packet.pts, TimeUs::ZERO);
    }

    #[test]
    fn provider_rejects_unknown_source() {
        let provider = FakeProvider::new();
        assert!(provider.open(&SourceId::new("missing")).is_err());
    }

    #[test]
    fn decoder_tags_frames_with_index() {
        let mut src = FakeSource::new(FakeSourceSpec::video(5, Rational::FPS_30, 10));
        let mut dec = FakeVideoDecoder::new(Resolution::new(2, 2));
        src.read_sample(TrackKind::Video).unwrap();
        let sample = src.read_sample(TrackKind::Video).unwrap();
        let frames = dec.decode(&sample).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data[0], 1);
        assert_eq!(frames[0].pts, sample.pts);
    }
}
