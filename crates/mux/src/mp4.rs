//! MP4 container writer (ISO Base Media File Format, ISO 14496-12).
//!
//! Layout: ftyp, then a progressively filled mdat with a large-box size
//! placeholder, then moov at close. Sample metadata (stts/stss/stsz/stco)
//! is collected in memory while payload bytes stream straight to the
//! writer.

use byteorder::{BigEndian, WriteBytesExt};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use splice_common::{AudioCodec, SampleFormat, SampleTiming, TimeUs, TrackKind, VideoCodec};

use crate::atoms::{
    begin_box, begin_large_box, encode_language, end_box, end_large_box, mp4_creation_time,
    rotation_matrix, ticks_to_time, time_to_ticks, write_fixed_16_16, write_fixed_8_8,
    write_full_header, write_matrix, write_zeros, MOVIE_TIMESCALE, VIDEO_TIMESCALE,
};
use crate::error::{MuxError, MuxResult};
use crate::muxer::{MetadataEntry, Muxer, TrackFormat, TrackToken};

/// One sample's bookkeeping, collected while its bytes go to mdat.
#[derive(Clone, Debug)]
struct SampleRecord {
    /// Absolute byte offset of the sample in the file.
    offset: u64,
    size: u32,
    /// Presentation timestamp in track timescale ticks.
    pts_ticks: u64,
    is_sync: bool,
}

struct TrackState {
    token: TrackToken,
    timescale: u32,
    format: TrackFormat,
    samples: Vec<SampleRecord>,
}

impl TrackState {
    /// Per-sample durations from pts deltas. The last sample reuses the
    /// previous delta; a lone sample gets a nominal duration.
    fn durations(&self) -> Vec<u32> {
        let mut durations = Vec::with_capacity(self.samples.len());
        for pair in self.samples.windows(2) {
            durations.push(pair[1].pts_ticks.saturating_sub(pair[0].pts_ticks) as u32);
        }
        if !self.samples.is_empty() {
            let last = durations.last().copied().unwrap_or(self.nominal_duration());
            durations.push(last);
        }
        durations
    }

    fn nominal_duration(&self) -> u32 {
        match &self.format.sample {
            SampleFormat::Video { frame_rate, .. } => {
                time_to_ticks(frame_rate.frame_duration(), self.timescale) as u32
            }
            // One AAC frame.
            SampleFormat::Audio { .. } => 1024,
        }
    }

    /// Total presented duration in track ticks.
    fn total_duration(&self) -> u64 {
        self.durations().iter().map(|d| *d as u64).sum()
    }
}

/// File-backed MP4 muxer.
pub struct Mp4Muxer<W: Write + Seek> {
    writer: W,
    tracks: Vec<TrackState>,
    mdat_size_pos: u64,
    next_track_id: u32,
    rotation: u16,
    trim_start: TimeUs,
    closed: bool,
}

impl Mp4Muxer<BufWriter<File>> {
    /// Create a muxer writing to a new file at `path`.
    pub fn create(path: impl AsRef<Path>) -> MuxResult<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| {
            MuxError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to create output file {}: {e}", path.display()),
            ))
        })?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write + Seek> Mp4Muxer<W> {
    /// Create a muxer over an arbitrary seekable writer. Writes the ftyp
    /// box and opens the mdat placeholder immediately.
    pub fn new(mut writer: W) -> MuxResult<Self> {
        write_ftyp(&mut writer)?;
        // Large-box mdat: the final size is unknown and may exceed 4GB.
        let mdat_size_pos = begin_large_box(&mut writer, b"mdat")?;
        Ok(Self {
            writer,
            tracks: Vec::new(),
            mdat_size_pos,
            next_track_id: 1,
            rotation: 0,
            trim_start: TimeUs::ZERO,
            closed: false,
        })
    }

    /// Consume the muxer and hand back the writer (for in-memory
    /// inspection in tests).
    pub fn into_writer(self) -> W {
        self.writer
    }

    pub fn track_sample_count(&self, token: &TrackToken) -> MuxResult<usize> {
        Ok(self.find_track(token)?.samples.len())
    }

    fn find_track(&self, token: &TrackToken) -> MuxResult<&TrackState> {
        self.tracks
            .iter()
            .find(|t| t.token == *token)
            .ok_or_else(|| MuxError::Track(format!("unknown track token {}", token.id())))
    }

    fn finalize(&mut self) -> MuxResult<()> {
        end_large_box(&mut self.writer, self.mdat_size_pos)?;
        write_moov(
            &mut self.writer,
            &self.tracks,
            self.rotation,
            self.trim_start,
        )?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Seek + Send> Muxer for Mp4Muxer<W> {
    fn add_track(&mut self, format: &TrackFormat) -> MuxResult<TrackToken> {
        if self.closed {
            return Err(MuxError::InvalidConfig("cannot add track after close".into()));
        }

        let timescale = match &format.sample {
            SampleFormat::Video { codec, .. } => {
                match codec {
                    VideoCodec::H264 | VideoCodec::H265 => {}
                    other => {
                        return Err(MuxError::InvalidConfig(format!(
                            "unsupported video codec for MP4: {other:?}"
                        )));
                    }
                }
                VIDEO_TIMESCALE
            }
            SampleFormat::Audio {
                codec, sample_rate, ..
            } => {
                match codec {
                    AudioCodec::Aac | AudioCodec::Opus => {}
                    other => {
                        return Err(MuxError::InvalidConfig(format!(
                            "unsupported audio codec for MP4: {other:?}"
                        )));
                    }
                }
                *sample_rate
            }
        };

        let token = TrackToken::new(self.next_track_id, format.kind());
        self.next_track_id += 1;

        self.tracks.push(TrackState {
            token,
            timescale,
            format: format.clone(),
            samples: Vec::new(),
        });

        tracing::info!(track = token.id(), kind = %token.kind(), "Added track");
        Ok(token)
    }

    fn write_sample(
        &mut self,
        token: &TrackToken,
        data: &[u8],
        timing: SampleTiming,
    ) -> MuxResult<()> {
        if self.closed {
            return Err(MuxError::InvalidConfig("cannot write sample after close".into()));
        }
        // Validate the token before touching the writer.
        let timescale = self.find_track(token)?.timescale;

        let offset = self.writer.stream_position()?;
        self.writer.write_all(data)?;

        let track = self
            .tracks
            .iter_mut()
            .find(|t| t.token == *token)
            .ok_or_else(|| MuxError::Track(format!("unknown track token {}", token.id())))?;
        track.samples.push(SampleRecord {
            offset,
            size: data.len() as u32,
            pts_ticks: time_to_ticks(timing.pts, timescale),
            // Audio samples are always sync samples.
            is_sync: timing.flags.keyframe || token.kind() == TrackKind::Audio,
        });
        Ok(())
    }

    fn add_metadata(&mut self, entry: MetadataEntry) -> MuxResult<()> {
        if self.closed {
            return Err(MuxError::InvalidConfig("cannot add metadata after close".into()));
        }
        match entry {
            MetadataEntry::Rotation(degrees) => {
                if degrees % 90 != 0 {
                    return Err(MuxError::InvalidConfig(format!(
                        "rotation must be a multiple of 90, got {degrees}"
                    )));
                }
                self.rotation = degrees % 360;
            }
            MetadataEntry::TrimStart(t) => {
                if t.is_negative() {
                    return Err(MuxError::InvalidConfig(format!(
                        "trim start must be non-negative, got {t}"
                    )));
                }
                self.trim_start = t;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> MuxResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // A failure while patching or writing moov leaves a file with no
        // usable index.
        self.finalize()
            .map_err(|e| MuxError::Broken(format!("finalize failed: {e}")))?;
        tracing::info!(tracks = self.tracks.len(), "MP4 finalized");
        Ok(())
    }
}

/// Write the ftyp box (isom major brand).
fn write_ftyp<W: Write>(writer: &mut W) -> MuxResult<()> {
    // header + major + minor + 3 compatible brands = 28 bytes
    writer.write_u32::<BigEndian>(28)?;
    writer.write_all(b"ftyp")?;
    writer.write_all(b"isom")?;
    writer.write_u32::<BigEndian>(0x200)?;
    writer.write_all(b"isom")?;
    writer.write_all(b"iso6")?;
    writer.write_all(b"mp41")?;
    Ok(())
}

fn write_moov<W: Write + Seek>(
    writer: &mut W,
    tracks: &[TrackState],
    rotation: u16,
    trim_start: TimeUs,
) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"moov")?;

    let movie_duration = tracks
        .iter()
        .map(|t| ticks_to_time(t.total_duration(), t.timescale).saturating_sub(trim_offset(t, trim_start)))
        .fold(TimeUs::ZERO, TimeUs::max);
    write_mvhd(writer, movie_duration)?;

    for track in tracks {
        write_trak(writer, track, rotation, trim_start)?;
    }

    end_box(writer, size_pos)?;
    Ok(())
}

/// The presentation time removed from a track by the edit list.
fn trim_offset(track: &TrackState, trim_start: TimeUs) -> TimeUs {
    if track.token.kind() == TrackKind::Video {
        trim_start
    } else {
        TimeUs::ZERO
    }
}

fn write_mvhd<W: Write + Seek>(writer: &mut W, duration: TimeUs) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"mvhd")?;
    let creation = mp4_creation_time() as u32;

    writer.write_u32::<BigEndian>(0)?; // version + flags
    writer.write_u32::<BigEndian>(creation)?;
    writer.write_u32::<BigEndian>(creation)?;
    writer.write_u32::<BigEndian>(MOVIE_TIMESCALE)?;
    writer.write_u32::<BigEndian>(time_to_ticks(duration, MOVIE_TIMESCALE) as u32)?;
    write_fixed_16_16(writer, 1.0)?; // rate
    write_fixed_8_8(writer, 1.0)?; // volume
    write_zeros(writer, 10)?; // reserved
    write_matrix(writer, &rotation_matrix(0))?;
    write_zeros(writer, 24)?; // pre-defined
    writer.write_u32::<BigEndian>(0xFFFF_FFFF)?; // next_track_ID

    end_box(writer, size_pos)?;
    Ok(())
}

fn write_trak<W: Write + Seek>(
    writer: &mut W,
    track: &TrackState,
    rotation: u16,
    trim_start: TimeUs,
) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"trak")?;

    let media_duration = ticks_to_time(track.total_duration(), track.timescale);
    let trim = trim_offset(track, trim_start).min(media_duration);
    let presented = media_duration.saturating_sub(trim);

    write_tkhd(writer, track, presented, rotation)?;
    if trim > TimeUs::ZERO {
        write_edts(writer, track.timescale, trim, presented)?;
    }
    write_mdia(writer, track)?;

    end_box(writer, size_pos)?;
    Ok(())
}

fn write_tkhd<W: Write + Seek>(
    writer: &mut W,
    track: &TrackState,
    duration: TimeUs,
    rotation: u16,
) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"tkhd")?;
    let creation = mp4_creation_time() as u32;
    let is_video = track.token.kind() == TrackKind::Video;

    // version=0, flags = track_enabled | track_in_movie
    writer.write_u32::<BigEndian>(0x00_000003)?;
    writer.write_u32::<BigEndian>(creation)?;
    writer.write_u32::<BigEndian>(creation)?;
    writer.write_u32::<BigEndian>(track.token.id())?;
    write_zeros(writer, 4)?; // reserved
    writer.write_u32::<BigEndian>(time_to_ticks(duration, MOVIE_TIMESCALE) as u32)?;
    write_zeros(writer, 8)?; // reserved
    writer.write_i16::<BigEndian>(0)?; // layer
    writer.write_i16::<BigEndian>(0)?; // alternate_group
    write_fixed_8_8(writer, if is_video { 0.0 } else { 1.0 })?; // volume
    write_zeros(writer, 2)?; // reserved

    // Container-level orientation lives in the track matrix.
    write_matrix(writer, &rotation_matrix(if is_video { rotation } else { 0 }))?;

    let (width, height) = match &track.format.sample {
        SampleFormat::Video { resolution, .. } => (resolution.width, resolution.height),
        SampleFormat::Audio { .. } => (0, 0),
    };
    write_fixed_16_16(writer, width as f64)?;
    write_fixed_16_16(writer, height as f64)?;

    end_box(writer, size_pos)?;
    Ok(())
}

/// Edit list cutting the first `trim` of media: presentation starts at
/// `media_time = trim` and runs for `presented`.
fn write_edts<W: Write + Seek>(
    writer: &mut W,
    timescale: u32,
    trim: TimeUs,
    presented: TimeUs,
) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"edts")?;

    let elst_pos = begin_box(writer, b"elst")?;
    writer.write_u32::<BigEndian>(0)?; // version + flags
    writer.write_u32::<BigEndian>(1)?; // entry_count
    writer.write_u32::<BigEndian>(time_to_ticks(presented, MOVIE_TIMESCALE) as u32)?;
    writer.write_i32::<BigEndian>(time_to_ticks(trim, timescale) as i32)?;
    writer.write_u16::<BigEndian>(1)?; // media_rate_integer
    writer.write_u16::<BigEndian>(0)?; // media_rate_fraction
    end_box(writer, elst_pos)?;

    end_box(writer, size_pos)?;
    Ok(())
}

fn write_mdia<W: Write + Seek>(writer: &mut W, track: &TrackState) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"mdia")?;

    write_mdhd(writer, track.timescale, track.total_duration())?;
    let handler: &[u8; 4] = match track.token.kind() {
        TrackKind::Video => b"vide",
        TrackKind::Audio => b"soun",
    };
    write_hdlr(writer, handler)?;
    write_minf(writer, track)?;

    end_box(writer, size_pos)?;
    Ok(())
}

fn write_mdhd<W: Write + Seek>(writer: &mut W, timescale: u32, duration: u64) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"mdhd")?;
    let creation = mp4_creation_time() as u32;

    writer.write_u32::<BigEndian>(0)?; // version + flags
    writer.write_u32::<BigEndian>(creation)?;
    writer.write_u32::<BigEndian>(creation)?;
    writer.write_u32::<BigEndian>(timescale)?;
    writer.write_u32::<BigEndian>(duration as u32)?;
    writer.write_u16::<BigEndian>(encode_language("und"))?;
    writer.write_u16::<BigEndian>(0)?; // pre-defined

    end_box(writer, size_pos)?;
    Ok(())
}

fn write_hdlr<W: Write + Seek>(writer: &mut W, handler_type: &[u8; 4]) -> MuxResult<()> {
    let name: &[u8] = match handler_type {
        b"vide" => b"VideoHandler\0",
        b"soun" => b"SoundHandler\0",
        _ => b"DataHandler\0",
    };

    let size_pos = begin_box(writer, b"hdlr")?;
    writer.write_u32::<BigEndian>(0)?; // version + flags
    write_zeros(writer, 4)?; // pre_defined
    writer.write_all(handler_type)?;
    write_zeros(writer, 12)?; // reserved
    writer.write_all(name)?;
    end_box(writer, size_pos)?;
    Ok(())
}

fn write_minf<W: Write + Seek>(writer: &mut W, track: &TrackState) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"minf")?;

    match track.token.kind() {
        TrackKind::Video => {
            write_full_header(writer, b"vmhd", 20, 0, 0x000001)?;
            writer.write_u16::<BigEndian>(0)?; // graphicsmode
            write_zeros(writer, 6)?; // opcolor
        }
        TrackKind::Audio => {
            write_full_header(writer, b"smhd", 16, 0, 0)?;
            writer.write_i16::<BigEndian>(0)?; // balance
            write_zeros(writer, 2)?; // reserved
        }
    }

    write_dinf(writer)?;
    write_stbl(writer, track)?;

    end_box(writer, size_pos)?;
    Ok(())
}

fn write_dinf<W: Write + Seek>(writer: &mut W) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"dinf")?;

    let dref_pos = begin_box(writer, b"dref")?;
    writer.write_u32::<BigEndian>(0)?; // version + flags
    writer.write_u32::<BigEndian>(1)?; // entry_count
    // url entry, flag 1 = media data in same file
    write_full_header(writer, b"url ", 12, 0, 0x000001)?;
    end_box(writer, dref_pos)?;

    end_box(writer, size_pos)?;
    Ok(())
}

fn write_stbl<W: Write + Seek>(writer: &mut W, track: &TrackState) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"stbl")?;

    write_stsd(writer, &track.format)?;

    let durations = track.durations();
    write_stts(writer, &durations)?;
    write_stsc(writer, track.samples.len())?;
    write_stsz(writer, &track.samples)?;

    let needs_co64 = track.samples.iter().any(|s| s.offset > u32::MAX as u64);
    if needs_co64 {
        write_co64(writer, &track.samples)?;
    } else {
        write_stco(writer, &track.samples)?;
    }

    if track.token.kind() == TrackKind::Video {
        write_stss(writer, &track.samples)?;
    }

    end_box(writer, size_pos)?;
    Ok(())
}

fn write_stsd<W: Write + Seek>(writer: &mut W, format: &TrackFormat) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"stsd")?;
    writer.write_u32::<BigEndian>(0)?; // version + flags
    writer.write_u32::<BigEndian>(1)?; // entry_count

    match &format.sample {
        SampleFormat::Video {
            codec, resolution, ..
        } => {
            let entry_pos = begin_box(
                writer,
                match codec {
                    VideoCodec::H264 => b"avc1",
                    VideoCodec::H265 => b"hvc1",
                    other => {
                        return Err(MuxError::InvalidConfig(format!(
                            "unsupported video codec for MP4 stsd: {other:?}"
                        )));
                    }
                },
            )?;

            // VisualSampleEntry
            write_zeros(writer, 6)?; // reserved
            writer.write_u16::<BigEndian>(1)?; // data_reference_index
            write_zeros(writer, 16)?; // pre_defined + reserved
            writer.write_u16::<BigEndian>(resolution.width as u16)?;
            writer.write_u16::<BigEndian>(resolution.height as u16)?;
            writer.write_u32::<BigEndian>(0x0048_0000)?; // horizresolution 72dpi
            writer.write_u32::<BigEndian>(0x0048_0000)?; // vertresolution 72dpi
            write_zeros(writer, 4)?; // reserved
            writer.write_u16::<BigEndian>(1)?; // frame_count
            write_zeros(writer, 32)?; // compressorname
            writer.write_u16::<BigEndian>(0x0018)?; // depth
            writer.write_i16::<BigEndian>(-1)?; // pre_defined

            match codec {
                VideoCodec::H264 => write_avcc(writer, &format.codec_private)?,
                VideoCodec::H265 => write_hvcc(writer, &format.codec_private)?,
                _ => unreachable!(),
            }

            end_box(writer, entry_pos)?;
        }
        SampleFormat::Audio {
            codec,
            sample_rate,
            channels,
        } => {
            let entry_pos = begin_box(
                writer,
                match codec {
                    AudioCodec::Aac => b"mp4a",
                    AudioCodec::Opus => b"Opus",
                    other => {
                        return Err(MuxError::InvalidConfig(format!(
                            "unsupported audio codec for MP4 stsd: {other:?}"
                        )));
                    }
                },
            )?;

            // AudioSampleEntry
            write_zeros(writer, 6)?; // reserved
            writer.write_u16::<BigEndian>(1)?; // data_reference_index
            write_zeros(writer, 8)?; // reserved
            writer.write_u16::<BigEndian>(*channels)?;
            writer.write_u16::<BigEndian>(16)?; // samplesize
            write_zeros(writer, 4)?; // pre_defined + reserved
            writer.write_u32::<BigEndian>(sample_rate << 16)?; // 16.16

            match codec {
                AudioCodec::Aac => write_esds(writer, &format.codec_private)?,
                AudioCodec::Opus => write_dops(writer, *sample_rate, *channels)?,
                _ => unreachable!(),
            }

            end_box(writer, entry_pos)?;
        }
    }

    end_box(writer, size_pos)?;
    Ok(())
}

/// AVC Decoder Configuration Record. When codec private data is present
/// it is taken as the complete record body; otherwise a minimal default
/// record (High profile, level 3.1, no parameter sets) is written.
fn write_avcc<W: Write + Seek>(writer: &mut W, codec_private: &[u8]) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"avcC")?;
    if codec_private.is_empty() {
        writer.write_u8(1)?; // configurationVersion
        writer.write_u8(0x64)?; // AVCProfileIndication
        writer.write_u8(0x00)?; // profile_compatibility
        writer.write_u8(0x1F)?; // AVCLevelIndication
        writer.write_u8(0xFF)?; // lengthSizeMinusOne = 3
        writer.write_u8(0xE0)?; // numOfSequenceParameterSets = 0
        writer.write_u8(0)?; // numOfPictureParameterSets
    } else {
        writer.write_all(codec_private)?;
    }
    end_box(writer, size_pos)?;
    Ok(())
}

/// HEVC Decoder Configuration Record, same convention as [`write_avcc`].
fn write_hvcc<W: Write + Seek>(writer: &mut W, codec_private: &[u8]) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"hvcC")?;
    if codec_private.is_empty() {
        writer.write_u8(1)?; // configurationVersion
        writer.write_u8(0x01)?; // Main profile
        writer.write_u32::<BigEndian>(0x6000_0000)?; // profile_compatibility
        write_zeros(writer, 6)?; // constraint_indicator_flags
        writer.write_u8(93)?; // general_level_idc (3.1)
        writer.write_u16::<BigEndian>(0xF000)?; // min_spatial_segmentation_idc
        writer.write_u8(0xFC)?; // parallelismType
        writer.write_u8(0xFD)?; // chromaFormat 4:2:0
        writer.write_u8(0xF8)?; // bitDepthLumaMinus8
        writer.write_u8(0xF8)?; // bitDepthChromaMinus8
        writer.write_u16::<BigEndian>(0)?; // avgFrameRate
        writer.write_u8(0x0F)?; // lengthSizeMinusOne = 3
        writer.write_u8(0)?; // numOfArrays
    } else {
        writer.write_all(codec_private)?;
    }
    end_box(writer, size_pos)?;
    Ok(())
}

/// Elementary Stream Descriptor for AAC; `config` is the
/// AudioSpecificConfig.
fn write_esds<W: Write + Seek>(writer: &mut W, config: &[u8]) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"esds")?;
    writer.write_u32::<BigEndian>(0)?; // version + flags

    let dec_config_len = 13 + 2 + config.len();
    let es_desc_len = 3 + 2 + dec_config_len + 3;

    writer.write_u8(0x03)?; // ES_DescrTag
    write_descr_length(writer, es_desc_len)?;
    writer.write_u16::<BigEndian>(1)?; // ES_ID
    writer.write_u8(0)?; // stream priority

    writer.write_u8(0x04)?; // DecoderConfigDescrTag
    write_descr_length(writer, dec_config_len)?;
    writer.write_u8(0x40)?; // objectTypeIndication = AAC
    writer.write_u8(0x15)?; // streamType = audio
    write_zeros(writer, 3)?; // bufferSizeDB
    writer.write_u32::<BigEndian>(128_000)?; // maxBitrate
    writer.write_u32::<BigEndian>(128_000)?; // avgBitrate

    writer.write_u8(0x05)?; // DecoderSpecificInfoTag
    write_descr_length(writer, config.len())?;
    writer.write_all(config)?;

    writer.write_u8(0x06)?; // SLConfigDescrTag
    write_descr_length(writer, 1)?;
    writer.write_u8(0x02)?; // predefined = MP4

    end_box(writer, size_pos)?;
    Ok(())
}

/// MPEG-4 expandable descriptor length (1-4 bytes).
fn write_descr_length<W: Write>(writer: &mut W, len: usize) -> MuxResult<()> {
    if len < 128 {
        writer.write_u8(len as u8)?;
        return Ok(());
    }
    let mut groups = Vec::new();
    let mut val = len;
    while val > 0 {
        groups.push((val & 0x7F) as u8);
        val >>= 7;
    }
    groups.reverse();
    let last = groups.len() - 1;
    for (i, g) in groups.iter().enumerate() {
        writer.write_u8(if i < last { g | 0x80 } else { *g })?;
    }
    Ok(())
}

/// Opus specific box.
fn write_dops<W: Write + Seek>(writer: &mut W, sample_rate: u32, channels: u16) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"dOps")?;
    writer.write_u8(0)?; // version
    writer.write_u8(channels as u8)?;
    writer.write_u16::<BigEndian>(312)?; // PreSkip
    writer.write_u32::<BigEndian>(sample_rate)?;
    writer.write_i16::<BigEndian>(0)?; // OutputGain
    writer.write_u8(0)?; // ChannelMappingFamily
    end_box(writer, size_pos)?;
    Ok(())
}

fn write_stts<W: Write + Seek>(writer: &mut W, durations: &[u32]) -> MuxResult<()> {
    let entries = run_length_encode(durations);

    let size_pos = begin_box(writer, b"stts")?;
    writer.write_u32::<BigEndian>(0)?; // version + flags
    writer.write_u32::<BigEndian>(entries.len() as u32)?;
    for (count, duration) in &entries {
        writer.write_u32::<BigEndian>(*count)?;
        writer.write_u32::<BigEndian>(*duration)?;
    }
    end_box(writer, size_pos)?;
    Ok(())
}

fn run_length_encode(values: &[u32]) -> Vec<(u32, u32)> {
    let mut entries: Vec<(u32, u32)> = Vec::new();
    for value in values {
        match entries.last_mut() {
            Some((count, v)) if v == value => *count += 1,
            _ => entries.push((1, *value)),
        }
    }
    entries
}

/// One sample per chunk.
fn write_stsc<W: Write + Seek>(writer: &mut W, sample_count: usize) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"stsc")?;
    writer.write_u32::<BigEndian>(0)?; // version + flags
    if sample_count == 0 {
        writer.write_u32::<BigEndian>(0)?;
    } else {
        writer.write_u32::<BigEndian>(1)?; // entry_count
        writer.write_u32::<BigEndian>(1)?; // first_chunk
        writer.write_u32::<BigEndian>(1)?; // samples_per_chunk
        writer.write_u32::<BigEndian>(1)?; // sample_description_index
    }
    end_box(writer, size_pos)?;
    Ok(())
}

fn write_stsz<W: Write + Seek>(writer: &mut W, samples: &[SampleRecord]) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"stsz")?;
    writer.write_u32::<BigEndian>(0)?; // version + flags

    let uniform = !samples.is_empty() && samples.iter().all(|s| s.size == samples[0].size);
    if uniform {
        writer.write_u32::<BigEndian>(samples[0].size)?;
        writer.write_u32::<BigEndian>(samples.len() as u32)?;
    } else {
        writer.write_u32::<BigEndian>(0)?; // variable sizes follow
        writer.write_u32::<BigEndian>(samples.len() as u32)?;
        for sample in samples {
            writer.write_u32::<BigEndian>(sample.size)?;
        }
    }

    end_box(writer, size_pos)?;
    Ok(())
}

fn write_stco<W: Write + Seek>(writer: &mut W, samples: &[SampleRecord]) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"stco")?;
    writer.write_u32::<BigEndian>(0)?; // version + flags
    writer.write_u32::<BigEndian>(samples.len() as u32)?;
    for sample in samples {
        writer.write_u32::<BigEndian>(sample.offset as u32)?;
    }
    end_box(writer, size_pos)?;
    Ok(())
}

fn write_co64<W: Write + Seek>(writer: &mut W, samples: &[SampleRecord]) -> MuxResult<()> {
    let size_pos = begin_box(writer, b"co64")?;
    writer.write_u32::<BigEndian>(0)?; // version + flags
    writer.write_u32::<BigEndian>(samples.len() as u32)?;
    for sample in samples {
        writer.write_u64::<BigEndian>(sample.offset)?;
    }
    end_box(writer, size_pos)?;
    Ok(())
}

/// Sync sample table: 1-based sample numbers of keyframes.
fn write_stss<W: Write + Seek>(writer: &mut W, samples: &[SampleRecord]) -> MuxResult<()> {
    let sync: Vec<u32> = samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_sync)
        .map(|(i, _)| (i + 1) as u32)
        .collect();

    let size_pos = begin_box(writer, b"stss")?;
    writer.write_u32::<BigEndian>(0)?; // version + flags
    writer.write_u32::<BigEndian>(sync.len() as u32)?;
    for number in &sync {
        writer.write_u32::<BigEndian>(*number)?;
    }
    end_box(writer, size_pos)?;
    Ok(())
}
