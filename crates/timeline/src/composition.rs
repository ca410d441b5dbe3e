//! Compositions: parallel sequences plus composition-level effects.
//!
//! All structural invariants are enforced here, at the single
//! construction boundary; nothing downstream has to re-validate.

use serde::{Deserialize, Serialize};

use splice_common::{ConfigError, EffectInstance, TimeUs};

use crate::item::MediaItem;
use crate::sequence::Sequence;

/// One or more sequences played in parallel (e.g. a video sequence and an
/// independent audio sequence), plus composition-level effects.
///
/// Invariants, checked by [`Composition::new`]:
/// - at least one sequence, none of them empty;
/// - at most one looping sequence;
/// - at least one non-looping sequence (a looping sequence cannot bound
///   its own duration);
/// - every item has positive duration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    sequences: Vec<Sequence>,
    effects: Vec<EffectInstance>,
    /// Nominal duration: max over all non-looping sequences. Cached at
    /// construction; sequences are immutable afterwards.
    duration: TimeUs,
}

impl Composition {
    pub fn new(
        sequences: Vec<Sequence>,
        effects: Vec<EffectInstance>,
    ) -> Result<Self, ConfigError> {
        if sequences.is_empty() {
            return Err(ConfigError::EmptyComposition);
        }

        let looping_count = sequences.iter().filter(|s| s.is_looping()).count();
        if looping_count > 1 {
            return Err(ConfigError::MultipleLoopingSequences(looping_count));
        }
        if looping_count == sequences.len() {
            return Err(ConfigError::NoNonLoopingSequence);
        }

        for (idx, seq) in sequences.iter().enumerate() {
            if seq.is_empty() {
                return Err(ConfigError::EmptySequence(idx));
            }
            for item in seq.items() {
                if item.duration() <= TimeUs::ZERO {
                    return Err(ConfigError::NonPositiveDuration(describe_item(item)));
                }
            }
        }

        let duration = sequences
            .iter()
            .filter(|s| !s.is_looping())
            .map(Sequence::single_pass_duration)
            .fold(TimeUs::ZERO, TimeUs::max);

        tracing::debug!(
            sequences = sequences.len(),
            looping = looping_count,
            duration = %duration,
            "Composition constructed"
        );

        Ok(Self {
            sequences,
            effects,
            duration,
        })
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn effects(&self) -> &[EffectInstance] {
        &self.effects
    }

    /// Nominal composition duration (max over non-looping sequences).
    /// Looping sequences are virtually extended or truncated to this.
    pub fn duration(&self) -> TimeUs {
        self.duration
    }

    /// Effective playable duration of one sequence within this composition.
    pub fn sequence_duration(&self, index: usize) -> TimeUs {
        let seq = &self.sequences[index];
        if seq.is_looping() {
            self.duration
        } else {
            seq.single_pass_duration()
        }
    }
}

fn describe_item(item: &MediaItem) -> String {
    match item.source() {
        Some(src) => format!("{src}"),
        None => "gap".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splice_common::{Rational, SourceId};

    fn video_item(ms: i64) -> MediaItem {
        MediaItem::clip(
            SourceId::new("vid"),
            TimeUs::from_millis(ms),
            Rational::FPS_30,
        )
    }

    #[test]
    fn duration_is_max_of_non_looping() {
        let comp = Composition::new(
            vec![
                Sequence::new(vec![video_item(3_000)]),
                Sequence::new(vec![video_item(5_000)]),
            ],
            vec![],
        )
        .unwrap();
        assert_eq!(comp.duration(), TimeUs::from_millis(5_000));
    }

    #[test]
    fn looping_sequence_extends_to_composition_duration() {
        let comp = Composition::new(
            vec![
                Sequence::new(vec![video_item(4_000)]),
                Sequence::looping(vec![video_item(1_500)]),
            ],
            vec![],
        )
        .unwrap();
        assert_eq!(comp.duration(), TimeUs::from_millis(4_000));
        assert_eq!(comp.sequence_duration(0), TimeUs::from_millis(4_000));
        // Looping sequence is virtually extended to the full duration.
        assert_eq!(comp.sequence_duration(1), TimeUs::from_millis(4_000));
        // Stored item list is untouched.
        assert_eq!(
            comp.sequences()[1].single_pass_duration(),
            TimeUs::from_millis(1_500)
        );
    }

    #[test]
    fn empty_composition_rejected() {
        assert!(matches!(
            Composition::new(vec![], vec![]),
            Err(ConfigError::EmptyComposition)
        ));
    }

    #[test]
    fn two_looping_sequences_rejected() {
        let result = Composition::new(
            vec![
                Sequence::new(vec![video_item(1_000)]),
                Sequence::looping(vec![video_item(500)]),
                Sequence::looping(vec![video_item(500)]),
            ],
            vec![],
        );
        assert!(matches!(
            result,
            Err(ConfigError::MultipleLoopingSequences(2))
        ));
    }

    #[test]
    fn sole_looping_sequence_rejected() {
        let result = Composition::new(vec![Sequence::looping(vec![video_item(500)])], vec![]);
        assert!(matches!(result, Err(ConfigError::NoNonLoopingSequence)));
    }

    #[test]
    fn empty_sequence_rejected() {
        let result = Composition::new(
            vec![Sequence::new(vec![video_item(1_000)]), Sequence::new(vec![])],
            vec![],
        );
        assert!(matches!(result, Err(ConfigError::EmptySequence(1))));
    }

    #[test]
    fn zero_duration_item_rejected() {
        let result = Composition::new(
            vec![Sequence::new(vec![MediaItem::gap(TimeUs::ZERO)])],
            vec![],
        );
        assert!(matches!(result, Err(ConfigError::NonPositiveDuration(_))));
    }

    #[test]
    fn serde_roundtrip() {
        let comp = Composition::new(
            vec![Sequence::new(vec![
                video_item(2_000),
                MediaItem::gap(TimeUs::from_millis(300)),
            ])],
            vec![],
        )
        .unwrap();
        let json = serde_json::to_string(&comp).unwrap();
        let back: Composition = serde_json::from_str(&json).unwrap();
        assert_eq!(comp, back);
    }
}
