//! The export controller: batch pipeline from composition to container.
//!
//! Layout: the primary sequence's items are planned per track
//! (transmux/transcode/hybrid), then a video worker and an audio worker
//! process their tracks independently and hand finished samples to the
//! calling thread over a channel. Only the calling thread touches the
//! muxer, so per-track write ordering is the channel's receive ordering
//! and the muxer needs no internal locking. Completion is synchronized
//! across both workers before the muxer is closed.
//!
//! Cancellation is a shared flag, checked by the workers before encoding
//! and by the writer before every write: once observed, no further muxer
//! writes happen, but already-issued writes stand. The partial output
//! plus a [`ResumeManifest`] is what a later [`ExportController::resume`]
//! picks up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};

use splice_common::{
    build_audio_effect, build_frame_effect, AudioCodec, AudioEffect, ConfigError, EffectInstance,
    ExportOptions, FrameEffect, MediaContext, SampleFormat, SampleTiming, SourceId, TimeUs,
    TrackKind, VideoCodec, VideoFrame,
};
use splice_mux::{MetadataEntry, Muxer, TrackFormat, TrackToken};
use splice_timeline::{Composition, MediaItem};

use crate::error::ExportError;
use crate::plan::{plan_track, TrackConversion, TrackPlan, TrackQuery};
use crate::progress::{ExportProgress, ProgressTracker};
use crate::resume::ResumeManifest;
use crate::trim::{TrimOptimization, TrimOptimizer};

/// One source that contributed samples to the output, with the codec
/// identities that touched it. Pure transmux carries neither.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessedInput {
    pub track: TrackKind,
    pub decoder: Option<String>,
    pub encoder: Option<String>,
    pub trim_start: TimeUs,
}

/// Manifest of a completed export, used by callers to assert trim and
/// resume behavior.
#[derive(Clone, Debug)]
pub struct ExportResult {
    pub processed_inputs: Vec<ProcessedInput>,
    pub conversion_per_track: HashMap<TrackKind, TrackConversion>,
    pub duration: TimeUs,
    pub size_bytes: u64,
    pub optimization_result: Option<TrimOptimization>,
}

/// How an export session ended.
#[derive(Debug)]
pub enum ExportOutcome {
    Completed(ExportResult),
    /// Cancelled mid-flight. Carries a manifest when at least one sample
    /// was durably written; `None` means the next run starts fresh.
    Cancelled(Option<ResumeManifest>),
}

/// Drives a composition through the export pipeline.
pub struct ExportController {
    ctx: MediaContext,
    options: ExportOptions,
}

impl ExportController {
    pub fn new(ctx: MediaContext, options: ExportOptions) -> Self {
        Self { ctx, options }
    }

    /// Export a composition from scratch.
    pub fn export<M: Muxer>(
        &self,
        composition: &Composition,
        muxer: M,
        cancel: Arc<AtomicBool>,
        progress: Option<Sender<ExportProgress>>,
    ) -> Result<ExportOutcome, ExportError> {
        self.run(composition, muxer, cancel, progress, None, 0)
    }

    /// Resume a previously cancelled export.
    ///
    /// `prior_output` is the partial output of the cancelled run, opened
    /// through the session's source provider like any other input. Its
    /// video samples are transmuxed verbatim as the first processed
    /// input; the remaining video is transcoded from the first frame
    /// boundary past the manifest's last durable sample; audio is
    /// reprocessed in full.
    pub fn resume<M: Muxer>(
        &self,
        composition: &Composition,
        manifest: &ResumeManifest,
        prior_output: &SourceId,
        muxer: M,
        cancel: Arc<AtomicBool>,
        progress: Option<Sender<ExportProgress>>,
    ) -> Result<ExportOutcome, ExportError> {
        manifest.validate(composition)?;
        if manifest.video_samples_written == 0 {
            tracing::info!("Prior output holds no durable samples; exporting from scratch");
            return self.export(composition, muxer, cancel, progress);
        }
        let resume = ResumeStart {
            prior: prior_output.clone(),
            boundary: manifest.next_video_start(),
        };
        tracing::info!(
            carried_samples = manifest.video_samples_written,
            boundary = %resume.boundary,
            "Resuming export"
        );
        self.run(
            composition,
            muxer,
            cancel,
            progress,
            Some(resume),
            manifest.video_samples_written,
        )
    }

    fn run<M: Muxer>(
        &self,
        composition: &Composition,
        mut muxer: M,
        cancel: Arc<AtomicBool>,
        progress: Option<Sender<ExportProgress>>,
        resume: Option<ResumeStart>,
        carried_over: u64,
    ) -> Result<ExportOutcome, ExportError> {
        let plans = self.plan_items(composition)?;

        let video_format = output_video_format(&plans).ok_or_else(|| {
            ExportError::InvalidConfig("composition has no video content".to_string())
        })?;
        let audio_format = output_audio_format(&plans);

        let expected = expected_video_samples(&plans);
        let mut tracker = if carried_over > 0 {
            ProgressTracker::resumed(progress, expected, carried_over)
        } else {
            ProgressTracker::new(progress, expected)
        };

        let video_token = muxer.add_track(&TrackFormat::new(video_format.clone()))?;
        let audio_token = match &audio_format {
            Some(format) => Some(muxer.add_track(&TrackFormat::new(format.clone()))?),
            None => None,
        };
        let rotation = self.options.rotation_degrees % 360;
        if rotation != 0 {
            muxer.add_metadata(MetadataEntry::Rotation(rotation as u16))?;
        }
        tracker.announce_start();

        let (tx, rx) = channel::unbounded();
        let video_handle = spawn_worker("export-video", {
            let worker = VideoWorker {
                ctx: self.ctx.clone(),
                token: video_token,
                tx: tx.clone(),
                cancel: Arc::clone(&cancel),
                composition_effects: composition.effects().to_vec(),
                encode_format: video_format.clone(),
                report: TrackReport::default(),
                stopped: false,
            };
            let plans = plans.clone();
            let resume = resume.clone();
            move || worker.run(plans, resume)
        })?;
        let audio_handle = match audio_token {
            Some(token) => Some(spawn_worker("export-audio", {
                let worker = AudioWorker {
                    ctx: self.ctx.clone(),
                    token,
                    tx: tx.clone(),
                    cancel: Arc::clone(&cancel),
                    composition_effects: composition.effects().to_vec(),
                    report: TrackReport::default(),
                    stopped: false,
                };
                let plans = plans.clone();
                move || worker.run(plans)
            })?),
            None => None,
        };
        drop(tx);

        let workers = 1 + usize::from(audio_handle.is_some());
        let write_result = write_loop(&mut muxer, &rx, &cancel, &mut tracker, workers);

        // Both tracks must be finished before the container is closed.
        let video_report = join_worker(video_handle, "video");
        let audio_report = audio_handle.map(|h| join_worker(h, "audio"));
        let close_result = muxer.close();

        let writer = match write_result {
            Ok(writer) => writer,
            Err(err) => {
                tracker.announce_failed(err.to_string());
                return Err(err);
            }
        };
        let video_report = video_report?;
        let audio_report = audio_report.transpose()?;
        close_result?;

        if writer.cancelled {
            tracker.announce_cancelled();
            let manifest = (tracker.samples_written() > 0).then(|| {
                ResumeManifest::capture(
                    composition,
                    video_format,
                    tracker.samples_written(),
                    writer.last_video_pts,
                )
            });
            return Ok(ExportOutcome::Cancelled(manifest));
        }

        let mut processed_inputs = video_report.inputs;
        let mut conversion_per_track = HashMap::new();
        if let Some(conversion) = aggregate_conversion(&video_report.conversions) {
            conversion_per_track.insert(TrackKind::Video, conversion);
        }
        if let Some(audio) = audio_report {
            if let Some(conversion) = aggregate_conversion(&audio.conversions) {
                conversion_per_track.insert(TrackKind::Audio, conversion);
            }
            processed_inputs.extend(audio.inputs);
        }

        let duration = composition.duration();
        tracker.announce_completed(writer.total_bytes, duration.as_micros());
        Ok(ExportOutcome::Completed(ExportResult {
            processed_inputs,
            conversion_per_track,
            duration,
            size_bytes: writer.total_bytes,
            optimization_result: video_report.optimization,
        }))
    }

    /// Probe every primary-sequence item and decide its per-track plan.
    fn plan_items(&self, composition: &Composition) -> Result<Vec<ItemPlan>, ExportError> {
        let optimizer = TrimOptimizer::new(self.options.trim_tolerance);
        let has_composition_effects = !composition.effects().is_empty();
        let mut plans = Vec::new();
        let mut offset = TimeUs::ZERO;

        for item in composition.sequences()[0].items() {
            let mut plan = ItemPlan {
                item: item.clone(),
                offset,
                video: None,
                audio: None,
                video_format: None,
                audio_format: None,
            };
            match item {
                MediaItem::Clip {
                    source,
                    trim_start,
                    effects,
                    ..
                } => {
                    let probed = self.ctx.sources.open(source)?;
                    let keyframes = probed.keyframe_timestamps();
                    let has_effects = has_composition_effects || !effects.is_empty();
                    for format in probed.track_formats() {
                        let query = TrackQuery {
                            format: &format,
                            trim_start: (*trim_start > TimeUs::ZERO).then_some(*trim_start),
                            keyframes: &keyframes,
                            has_effects,
                            rotation_degrees: self.options.rotation_degrees,
                            can_encode: self.ctx.codecs.can_encode(&format),
                        };
                        match format.kind() {
                            TrackKind::Video => {
                                plan.video = Some(plan_track(&query, &optimizer));
                                plan.video_format = Some(format);
                            }
                            TrackKind::Audio => {
                                plan.audio = Some(plan_track(&query, &optimizer));
                                plan.audio_format = Some(format);
                            }
                        }
                    }
                }
                MediaItem::Image {
                    source, frame_rate, ..
                } => {
                    let bitmap = self.ctx.images.load(source)?;
                    plan.video = Some(TrackPlan {
                        kind: TrackKind::Video,
                        conversion: TrackConversion::Transcode,
                        optimization: None,
                        transcode_until: None,
                    });
                    plan.video_format = Some(SampleFormat::Video {
                        codec: VideoCodec::H264,
                        resolution: bitmap.resolution,
                        frame_rate: *frame_rate,
                    });
                }
                MediaItem::Gap { .. } => {}
            }
            offset += item.duration();
            plans.push(plan);
        }
        Ok(plans)
    }
}

// ---------------------------------------------------------------------------
// Planning helpers
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct ItemPlan {
    item: MediaItem,
    /// Timeline offset of the item's start.
    offset: TimeUs,
    video: Option<TrackPlan>,
    audio: Option<TrackPlan>,
    video_format: Option<SampleFormat>,
    audio_format: Option<SampleFormat>,
}

#[derive(Clone)]
struct ResumeStart {
    prior: SourceId,
    /// Output-timeline position where new video processing begins.
    boundary: TimeUs,
}

/// Output video track format: the first item's source format, re-encoded
/// to H.264 when the source codec is not container-acceptable.
fn output_video_format(plans: &[ItemPlan]) -> Option<SampleFormat> {
    let first = plans.iter().find_map(|p| p.video_format.clone())?;
    Some(match first {
        SampleFormat::Video {
            codec,
            resolution,
            frame_rate,
        } => SampleFormat::Video {
            codec: if matches!(codec, VideoCodec::H264 | VideoCodec::H265) {
                codec
            } else {
                VideoCodec::H264
            },
            resolution,
            frame_rate,
        },
        other => other,
    })
}

fn output_audio_format(plans: &[ItemPlan]) -> Option<SampleFormat> {
    let first = plans.iter().find_map(|p| p.audio_format.clone())?;
    Some(match first {
        SampleFormat::Audio {
            codec,
            sample_rate,
            channels,
        } => SampleFormat::Audio {
            codec: if matches!(codec, AudioCodec::Aac | AudioCodec::Opus) {
                codec
            } else {
                AudioCodec::Aac
            },
            sample_rate,
            channels,
        },
        other => other,
    })
}

/// Nominal video sample count, used for progress fractions. Hybrid and
/// edit-list transmuxes may write a few lead samples beyond this; the
/// fraction clamps at 1.0.
fn expected_video_samples(plans: &[ItemPlan]) -> u64 {
    plans
        .iter()
        .filter(|p| p.video.is_some())
        .filter_map(|p| {
            p.item
                .frame_rate()
                .map(|rate| rate.frames_before(p.item.duration()))
        })
        .sum()
}

// ---------------------------------------------------------------------------
// Writer loop
// ---------------------------------------------------------------------------

enum MuxMessage {
    Sample {
        token: TrackToken,
        data: Vec<u8>,
        timing: SampleTiming,
        /// Carried over verbatim from a prior output; not counted toward
        /// progress (the resumed tracker already starts past them).
        carried: bool,
    },
    Metadata(MetadataEntry),
    TrackDone,
}

struct WriterState {
    cancelled: bool,
    total_bytes: u64,
    last_video_pts: TimeUs,
}

fn write_loop<M: Muxer>(
    muxer: &mut M,
    rx: &Receiver<MuxMessage>,
    cancel: &AtomicBool,
    tracker: &mut ProgressTracker,
    workers: usize,
) -> Result<WriterState, ExportError> {
    let mut state = WriterState {
        cancelled: false,
        total_bytes: 0,
        last_video_pts: TimeUs::ZERO,
    };
    let mut done = 0;
    while done < workers {
        let Ok(msg) = rx.recv() else { break };
        match msg {
            MuxMessage::Sample {
                token,
                data,
                timing,
                carried,
            } => {
                if state.cancelled {
                    continue;
                }
                if cancel.load(Ordering::SeqCst) {
                    tracing::info!("Cancellation observed; dropping remaining writes");
                    state.cancelled = true;
                    continue;
                }
                muxer.write_sample(&token, &data, timing)?;
                state.total_bytes += data.len() as u64;
                if token.kind() == TrackKind::Video {
                    state.last_video_pts = timing.pts;
                    if !carried {
                        tracker.record_sample(data.len());
                    }
                }
            }
            MuxMessage::Metadata(entry) => {
                if !state.cancelled {
                    muxer.add_metadata(entry)?;
                }
            }
            MuxMessage::TrackDone => done += 1,
        }
    }
    Ok(state)
}

fn spawn_worker<F>(
    name: &str,
    body: F,
) -> Result<JoinHandle<Result<TrackReport, ExportError>>, ExportError>
where
    F: FnOnce() -> Result<TrackReport, ExportError> + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(ExportError::Io)
}

fn join_worker(
    handle: JoinHandle<Result<TrackReport, ExportError>>,
    name: &str,
) -> Result<TrackReport, ExportError> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(ExportError::Worker(format!("{name} worker panicked"))),
    }
}

fn aggregate_conversion(conversions: &[TrackConversion]) -> Option<TrackConversion> {
    let first = *conversions.first()?;
    if conversions.iter().all(|c| *c == first) {
        Some(first)
    } else {
        Some(TrackConversion::TransmuxedAndTranscoded)
    }
}

// ---------------------------------------------------------------------------
// Track workers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TrackReport {
    inputs: Vec<ProcessedInput>,
    conversions: Vec<TrackConversion>,
    optimization: Option<TrimOptimization>,
}

struct ClipJob {
    source: SourceId,
    trim_start: TimeUs,
    trim_end: TimeUs,
    format: SampleFormat,
    offset: TimeUs,
    /// The item sits at the very start of the timeline, so a transmux
    /// trim may be expressed via container edit metadata.
    first: bool,
    /// Resume boundary falling inside this item, in output-timeline time.
    resume_from: Option<TimeUs>,
}

struct VideoWorker {
    ctx: MediaContext,
    token: TrackToken,
    tx: Sender<MuxMessage>,
    cancel: Arc<AtomicBool>,
    composition_effects: Vec<EffectInstance>,
    encode_format: SampleFormat,
    report: TrackReport,
    stopped: bool,
}

impl VideoWorker {
    fn run(
        mut self,
        plans: Vec<ItemPlan>,
        resume: Option<ResumeStart>,
    ) -> Result<TrackReport, ExportError> {
        let result = self.run_inner(&plans, resume.as_ref());
        let _ = self.tx.send(MuxMessage::TrackDone);
        result.map(|_| self.report)
    }

    fn run_inner(
        &mut self,
        plans: &[ItemPlan],
        resume: Option<&ResumeStart>,
    ) -> Result<(), ExportError> {
        if let Some(resume) = resume {
            self.carry_over_prior(&resume.prior)?;
        }
        let boundary = resume.map(|r| r.boundary);
        for plan in plans {
            if self.stopped {
                break;
            }
            if let Some(b) = boundary {
                // Wholly covered by the carried-over prior output.
                if plan.offset + plan.item.duration() <= b {
                    continue;
                }
            }
            self.process_item(plan, boundary)?;
        }
        Ok(())
    }

    /// Transmux the prior partial output verbatim; its timestamps are
    /// already in the output timeline.
    fn carry_over_prior(&mut self, prior: &SourceId) -> Result<(), ExportError> {
        let mut source = self.ctx.sources.open(prior)?;
        while let Some(sample) = source.read_sample(TrackKind::Video) {
            if !self.emit_inner(sample.data, sample.pts, sample.is_keyframe, true) {
                return Ok(());
            }
        }
        self.report.inputs.push(ProcessedInput {
            track: TrackKind::Video,
            decoder: None,
            encoder: None,
            trim_start: TimeUs::ZERO,
        });
        self.report.conversions.push(TrackConversion::Transmux);
        Ok(())
    }

    fn process_item(
        &mut self,
        plan: &ItemPlan,
        boundary: Option<TimeUs>,
    ) -> Result<(), ExportError> {
        let (Some(video), Some(format)) = (&plan.video, &plan.video_format) else {
            return Ok(());
        };
        if self.report.optimization.is_none() {
            self.report.optimization = video.optimization.clone();
        }
        let resume_from = boundary.filter(|b| *b > plan.offset);

        match &plan.item {
            MediaItem::Clip {
                source,
                trim_start,
                effects,
                ..
            } => {
                let job = ClipJob {
                    source: source.clone(),
                    trim_start: *trim_start,
                    trim_end: plan
                        .item
                        .effective_trim_end()
                        .unwrap_or(TimeUs::ZERO),
                    format: format.clone(),
                    offset: plan.offset,
                    first: plan.offset == TimeUs::ZERO,
                    resume_from,
                };
                let effects = self.combined_effects(effects);
                // A resume boundary inside the item forces the remainder
                // down the transcode path regardless of the fresh plan.
                let conversion = if resume_from.is_some() {
                    TrackConversion::Transcode
                } else {
                    video.conversion
                };
                match conversion {
                    TrackConversion::Transmux => {
                        self.transmux_clip(&job, video.optimization.as_ref())?;
                        self.record(TrackConversion::Transmux, None, None, job.trim_start);
                    }
                    TrackConversion::TransmuxedAndTranscoded => {
                        let cut = video.transcode_until.unwrap_or(job.trim_start);
                        self.hybrid_clip(&job, cut)?;
                    }
                    TrackConversion::Transcode => {
                        self.transcode_clip(&job, &effects)?;
                    }
                }
            }
            MediaItem::Image {
                source,
                duration,
                frame_rate,
                effects,
            } => {
                let effects = self.combined_effects(effects);
                self.transcode_image(source, *duration, *frame_rate, plan.offset, &effects, resume_from)?;
            }
            MediaItem::Gap { .. } => {}
        }
        Ok(())
    }

    fn combined_effects(&self, item_effects: &[EffectInstance]) -> Vec<EffectInstance> {
        item_effects
            .iter()
            .chain(self.composition_effects.iter())
            .cloned()
            .collect()
    }

    fn transmux_clip(
        &mut self,
        job: &ClipJob,
        optimization: Option<&TrimOptimization>,
    ) -> Result<(), ExportError> {
        let mut source = self.ctx.sources.open(&job.source)?;
        let base = if job.trim_start > TimeUs::ZERO {
            if job.first {
                // Copy from the preceding keyframe and cut the lead via
                // the container's edit list.
                let landed = source.seek_to_keyframe(TrackKind::Video, job.trim_start)?;
                if landed < job.trim_start {
                    let _ = self.tx.send(MuxMessage::Metadata(MetadataEntry::TrimStart(
                        job.trim_start - landed,
                    )));
                }
                landed
            } else {
                // Mid-timeline items cannot use an edit list; cut at the
                // keyframe the optimizer deemed close enough.
                let cut = match optimization {
                    Some(TrimOptimization::AbandonedKeyframePlacementOptimalForTrim {
                        cut_keyframe,
                    }) => *cut_keyframe,
                    _ => job.trim_start,
                };
                source.seek_to_keyframe(TrackKind::Video, cut)?;
                job.trim_start
            }
        } else {
            TimeUs::ZERO
        };

        while let Some(sample) = source.read_sample(TrackKind::Video) {
            if sample.pts >= job.trim_end {
                break;
            }
            if sample.pts < base {
                continue;
            }
            let pts = job.offset + (sample.pts - base);
            if !self.emit(sample.data, pts, sample.is_keyframe) {
                break;
            }
        }
        Ok(())
    }

    /// Transcode `[trim_start, cut)`, transmux `[cut, trim_end)`.
    fn hybrid_clip(&mut self, job: &ClipJob, cut: TimeUs) -> Result<(), ExportError> {
        let mut source = self.ctx.sources.open(&job.source)?;
        source.seek_to_keyframe(TrackKind::Video, job.trim_start)?;
        let mut decoder = self.ctx.codecs.open_video_decoder(&job.format)?;
        let mut encoder = self.ctx.codecs.open_video_encoder(&self.encode_format)?;
        self.report.inputs.push(ProcessedInput {
            track: TrackKind::Video,
            decoder: Some(decoder.name().to_string()),
            encoder: Some(encoder.name().to_string()),
            trim_start: job.trim_start,
        });
        self.report
            .conversions
            .push(TrackConversion::TransmuxedAndTranscoded);

        let mut handoff = None;
        while let Some(sample) = source.read_sample(TrackKind::Video) {
            if sample.pts >= cut {
                handoff = Some(sample);
                break;
            }
            for frame in decoder.decode(&sample)? {
                self.encode_lead(encoder.as_mut(), &frame, job, cut)?;
            }
            if self.stopped {
                return Ok(());
            }
        }
        for frame in decoder.flush()? {
            self.encode_lead(encoder.as_mut(), &frame, job, cut)?;
        }
        for sample in encoder.flush()? {
            if !self.emit(
                sample.data,
                job.offset + (sample.pts - job.trim_start),
                sample.is_keyframe,
            ) {
                return Ok(());
            }
        }

        // The cut keyframe and everything after it copies verbatim.
        let mut pending = handoff;
        loop {
            let sample = match pending.take() {
                Some(s) => s,
                None => match source.read_sample(TrackKind::Video) {
                    Some(s) => s,
                    None => break,
                },
            };
            if sample.pts >= job.trim_end {
                break;
            }
            if !self.emit(
                sample.data,
                job.offset + (sample.pts - job.trim_start),
                sample.is_keyframe,
            ) {
                break;
            }
        }
        Ok(())
    }

    fn encode_lead(
        &mut self,
        encoder: &mut dyn splice_common::VideoEncoder,
        frame: &VideoFrame,
        job: &ClipJob,
        cut: TimeUs,
    ) -> Result<(), ExportError> {
        if frame.pts < job.trim_start || frame.pts >= cut {
            return Ok(());
        }
        for sample in encoder.encode(frame)? {
            if !self.emit(
                sample.data,
                job.offset + (sample.pts - job.trim_start),
                sample.is_keyframe,
            ) {
                return Ok(());
            }
        }
        Ok(())
    }

    fn transcode_clip(
        &mut self,
        job: &ClipJob,
        effects: &[EffectInstance],
    ) -> Result<(), ExportError> {
        let mut source = self.ctx.sources.open(&job.source)?;
        // Source-local position to present from; a resume boundary inside
        // the item moves it past the already-carried samples.
        let start = match job.resume_from {
            Some(b) if b > job.offset => job.trim_start + (b - job.offset),
            _ => job.trim_start,
        };
        source.seek_to_keyframe(TrackKind::Video, start)?;
        let mut decoder = self.ctx.codecs.open_video_decoder(&job.format)?;
        let mut encoder = self.ctx.codecs.open_video_encoder(&self.encode_format)?;
        let mut chain = frame_effects_for(effects)?;
        self.report.inputs.push(ProcessedInput {
            track: TrackKind::Video,
            decoder: Some(decoder.name().to_string()),
            encoder: Some(encoder.name().to_string()),
            trim_start: job.trim_start,
        });
        self.report.conversions.push(TrackConversion::Transcode);

        while let Some(sample) = source.read_sample(TrackKind::Video) {
            if sample.pts >= job.trim_end {
                break;
            }
            for frame in decoder.decode(&sample)? {
                self.transcode_frame(frame, start, job, &mut chain, encoder.as_mut())?;
            }
            if self.stopped {
                break;
            }
        }
        if !self.stopped {
            for frame in decoder.flush()? {
                self.transcode_frame(frame, start, job, &mut chain, encoder.as_mut())?;
            }
            for sample in encoder.flush()? {
                if !self.emit(
                    sample.data,
                    job.offset + (sample.pts - job.trim_start),
                    sample.is_keyframe,
                ) {
                    break;
                }
            }
        }
        for fx in &mut chain {
            fx.release();
        }
        Ok(())
    }

    fn transcode_frame(
        &mut self,
        mut frame: VideoFrame,
        start: TimeUs,
        job: &ClipJob,
        chain: &mut [Box<dyn FrameEffect>],
        encoder: &mut dyn splice_common::VideoEncoder,
    ) -> Result<(), ExportError> {
        if frame.pts < start || frame.pts >= job.trim_end {
            return Ok(());
        }
        for fx in chain.iter_mut() {
            fx.process_frame(&mut frame);
        }
        for sample in encoder.encode(&frame)? {
            if !self.emit(
                sample.data,
                job.offset + (sample.pts - job.trim_start),
                sample.is_keyframe,
            ) {
                return Ok(());
            }
        }
        Ok(())
    }

    fn transcode_image(
        &mut self,
        source: &SourceId,
        duration: TimeUs,
        rate: splice_common::Rational,
        offset: TimeUs,
        effects: &[EffectInstance],
        resume_from: Option<TimeUs>,
    ) -> Result<(), ExportError> {
        let bitmap = self.ctx.images.load(source)?;
        let mut encoder = self.ctx.codecs.open_video_encoder(&self.encode_format)?;
        let mut chain = frame_effects_for(effects)?;
        self.report.inputs.push(ProcessedInput {
            track: TrackKind::Video,
            decoder: None,
            encoder: Some(encoder.name().to_string()),
            trim_start: TimeUs::ZERO,
        });
        self.report.conversions.push(TrackConversion::Transcode);

        let mut index = match resume_from {
            Some(b) if b > offset => rate.frames_before(b - offset),
            _ => 0,
        };
        while rate.frame_timestamp(index) < duration {
            let mut frame = bitmap.clone();
            frame.pts = rate.frame_timestamp(index);
            for fx in chain.iter_mut() {
                fx.process_frame(&mut frame);
            }
            for sample in encoder.encode(&frame)? {
                if !self.emit(sample.data, offset + sample.pts, sample.is_keyframe) {
                    return Ok(());
                }
            }
            index += 1;
        }
        for sample in encoder.flush()? {
            if !self.emit(sample.data, offset + sample.pts, sample.is_keyframe) {
                break;
            }
        }
        for fx in &mut chain {
            fx.release();
        }
        Ok(())
    }

    fn record(
        &mut self,
        conversion: TrackConversion,
        decoder: Option<String>,
        encoder: Option<String>,
        trim_start: TimeUs,
    ) {
        self.report.inputs.push(ProcessedInput {
            track: TrackKind::Video,
            decoder,
            encoder,
            trim_start,
        });
        self.report.conversions.push(conversion);
    }

    fn emit(&mut self, data: Vec<u8>, pts: TimeUs, keyframe: bool) -> bool {
        self.emit_inner(data, pts, keyframe, false)
    }

    fn emit_inner(&mut self, data: Vec<u8>, pts: TimeUs, keyframe: bool, carried: bool) -> bool {
        if self.cancel.load(Ordering::SeqCst) {
            self.stopped = true;
            return false;
        }
        let timing = SampleTiming::new(pts, keyframe, data.len());
        if self
            .tx
            .send(MuxMessage::Sample {
                token: self.token,
                data,
                timing,
                carried,
            })
            .is_err()
        {
            self.stopped = true;
            return false;
        }
        true
    }
}

struct AudioWorker {
    ctx: MediaContext,
    token: TrackToken,
    tx: Sender<MuxMessage>,
    cancel: Arc<AtomicBool>,
    composition_effects: Vec<EffectInstance>,
    report: TrackReport,
    stopped: bool,
}

impl AudioWorker {
    fn run(mut self, plans: Vec<ItemPlan>) -> Result<TrackReport, ExportError> {
        let result = self.run_inner(&plans);
        let _ = self.tx.send(MuxMessage::TrackDone);
        result.map(|_| self.report)
    }

    fn run_inner(&mut self, plans: &[ItemPlan]) -> Result<(), ExportError> {
        for plan in plans {
            if self.stopped {
                break;
            }
            let (Some(audio), Some(format)) = (&plan.audio, &plan.audio_format) else {
                continue;
            };
            let MediaItem::Clip {
                source,
                trim_start,
                effects,
                ..
            } = &plan.item
            else {
                continue;
            };
            let trim_end = plan.item.effective_trim_end().unwrap_or(TimeUs::ZERO);
            match audio.conversion {
                TrackConversion::Transmux => {
                    self.transmux_audio(source, *trim_start, trim_end, plan.offset)?;
                    self.report.inputs.push(ProcessedInput {
                        track: TrackKind::Audio,
                        decoder: None,
                        encoder: None,
                        trim_start: *trim_start,
                    });
                    self.report.conversions.push(TrackConversion::Transmux);
                }
                _ => {
                    self.transcode_audio(source, format, *trim_start, trim_end, plan.offset, effects)?;
                }
            }
        }
        Ok(())
    }

    fn transmux_audio(
        &mut self,
        id: &SourceId,
        trim_start: TimeUs,
        trim_end: TimeUs,
        offset: TimeUs,
    ) -> Result<(), ExportError> {
        let mut source = self.ctx.sources.open(id)?;
        if trim_start > TimeUs::ZERO {
            source.seek_to_keyframe(TrackKind::Audio, trim_start)?;
        }
        while let Some(sample) = source.read_sample(TrackKind::Audio) {
            if sample.pts >= trim_end {
                break;
            }
            if sample.pts < trim_start {
                continue;
            }
            let pts = offset + (sample.pts - trim_start);
            if !self.emit(sample.data, pts, sample.is_keyframe) {
                break;
            }
        }
        Ok(())
    }

    fn transcode_audio(
        &mut self,
        id: &SourceId,
        format: &SampleFormat,
        trim_start: TimeUs,
        trim_end: TimeUs,
        offset: TimeUs,
        item_effects: &[EffectInstance],
    ) -> Result<(), ExportError> {
        let mut source = self.ctx.sources.open(id)?;
        if trim_start > TimeUs::ZERO {
            source.seek_to_keyframe(TrackKind::Audio, trim_start)?;
        }
        let mut decoder = self.ctx.codecs.open_audio_decoder(format)?;
        let mut encoder = self.ctx.codecs.open_audio_encoder(format)?;
        let combined: Vec<EffectInstance> = item_effects
            .iter()
            .chain(self.composition_effects.iter())
            .cloned()
            .collect();
        let mut chain = audio_effects_for(&combined)?;
        for fx in &mut chain {
            fx.set_position_offset(offset);
        }
        self.report.inputs.push(ProcessedInput {
            track: TrackKind::Audio,
            decoder: Some(decoder.name().to_string()),
            encoder: Some(encoder.name().to_string()),
            trim_start,
        });
        self.report.conversions.push(TrackConversion::Transcode);

        while let Some(sample) = source.read_sample(TrackKind::Audio) {
            if sample.pts >= trim_end {
                break;
            }
            for mut chunk in decoder.decode(&sample)? {
                if chunk.pts < trim_start || chunk.pts >= trim_end {
                    continue;
                }
                for fx in &mut chain {
                    fx.process_chunk(&mut chunk);
                }
                for out in encoder.encode(&chunk)? {
                    if !self.emit(
                        out.data,
                        offset + (out.pts - trim_start),
                        out.is_keyframe,
                    ) {
                        return Ok(());
                    }
                }
            }
            if self.stopped {
                break;
            }
        }
        if !self.stopped {
            for sample in encoder.flush()? {
                if !self.emit(
                    sample.data,
                    offset + (sample.pts - trim_start),
                    sample.is_keyframe,
                ) {
                    break;
                }
            }
        }
        for fx in &mut chain {
            fx.release();
        }
        Ok(())
    }

    fn emit(&mut self, data: Vec<u8>, pts: TimeUs, keyframe: bool) -> bool {
        if self.cancel.load(Ordering::SeqCst) {
            self.stopped = true;
            return false;
        }
        let timing = SampleTiming::new(pts, keyframe, data.len());
        if self
            .tx
            .send(MuxMessage::Sample {
                token: self.token,
                data,
                timing,
                carried: false,
            })
            .is_err()
        {
            self.stopped = true;
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Effect chain assembly
// ---------------------------------------------------------------------------

/// Build the frame-effect chain for a combined instance list, skipping
/// audio-only instances. Instances known to neither registry are a
/// configuration error.
fn frame_effects_for(
    instances: &[EffectInstance],
) -> Result<Vec<Box<dyn FrameEffect>>, ConfigError> {
    let mut chain = Vec::new();
    for instance in instances {
        match build_frame_effect(instance) {
            Ok(fx) => chain.push(fx),
            Err(err) => {
                if build_audio_effect(instance).is_err() {
                    return Err(err);
                }
            }
        }
    }
    Ok(chain)
}

fn audio_effects_for(
    instances: &[EffectInstance],
) -> Result<Vec<Box<dyn AudioEffect>>, ConfigError> {
    let mut chain = Vec::new();
    for instance in instances {
        match build_audio_effect(instance) {
            Ok(fx) => chain.push(fx),
            Err(err) => {
                if build_frame_effect(instance).is_err() {
                    return Err(err);
                }
            }
        }
    }
    Ok(chain)
}
