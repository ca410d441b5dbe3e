//! Position resolver: pure mapping from (composition, global position) to
//! the active item, local offset, and leading-frame skip count of every
//! sequence.

use splice_common::TimeUs;

use crate::composition::Composition;
use crate::index::CumulativeIndex;

/// Resolved position of one sequence at a global timeline position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequencePosition {
    /// Index of the active item within the sequence's stored item list.
    pub item_index: usize,
    /// Position within the item, relative to the item's start (for clips,
    /// relative to the trim-in point).
    pub local_offset: TimeUs,
    /// Number of leading frames to discard when repositioning the item's
    /// source: the count of frames whose timestamp falls strictly before
    /// `local_offset`, by frame index rather than wall-clock distance.
    pub skip_frames: u64,
    /// Cumulative start of this item occurrence in the (virtually
    /// extended) sequence timeline. Frame timestamps of the item are
    /// offset by this to land on the global timeline, and it is the fresh
    /// position offset handed to per-sequence audio effect state on seek.
    pub sequence_offset: TimeUs,
    /// True when the global position is at or past the sequence's end and
    /// the last frame is being held rather than advanced.
    pub held: bool,
}

/// Resolve a global position against every sequence of a composition.
///
/// The global position is clamped to `[0, sequence_duration)` per
/// sequence; positions at or past a sequence's end resolve to its last
/// item at the final presentable position (the last frame is held, not
/// skipped). For looping sequences the position is first reduced modulo
/// the single-pass duration of the stored item list.
pub fn resolve(composition: &Composition, position: TimeUs) -> Vec<SequencePosition> {
    composition
        .sequences()
        .iter()
        .enumerate()
        .map(|(seq_idx, _)| resolve_sequence(composition, seq_idx, position))
        .collect()
}

/// Resolve a global position against a single sequence.
pub fn resolve_sequence(
    composition: &Composition,
    sequence_index: usize,
    position: TimeUs,
) -> SequencePosition {
    let sequence = &composition.sequences()[sequence_index];
    let index = CumulativeIndex::build(sequence.items());
    let effective_duration = composition.sequence_duration(sequence_index);
    let single_pass = sequence.single_pass_duration();

    let position = position.max(TimeUs::ZERO);
    let held = position >= effective_duration;

    // When holding, resolve the instant just before the sequence end so the
    // truncation point of a looping sequence is honored.
    let probe = if held {
        effective_duration.saturating_sub(TimeUs::from_micros(1))
    } else {
        position
    };

    let pass_local = if sequence.is_looping() {
        TimeUs::from_micros(probe.as_micros().rem_euclid(single_pass.as_micros()))
    } else {
        probe
    };

    let located = index
        .locate(pass_local)
        .expect("probe position is within a validated non-empty sequence");

    let item = &sequence.items()[located.index];
    let (local_offset, skip_frames) = if held {
        // Hold the last frame presentable before the sequence end.
        match item.frame_rate() {
            Some(rate) => {
                let bound = located.local + TimeUs::from_micros(1);
                let frames = rate.frames_before(bound);
                let last = frames.saturating_sub(1);
                (rate.frame_timestamp(last), last)
            }
            None => (located.local, 0),
        }
    } else {
        let skip = item
            .frame_rate()
            .map(|rate| rate.frames_before(located.local))
            .unwrap_or(0);
        (located.local, skip)
    };

    let sequence_offset = probe - located.local;

    tracing::trace!(
        sequence = sequence_index,
        item = located.index,
        local = %local_offset,
        skip = skip_frames,
        held,
        "Resolved position"
    );

    SequencePosition {
        item_index: located.index,
        local_offset,
        skip_frames,
        sequence_offset,
        held,
    }
}
