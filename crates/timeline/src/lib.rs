//! `splice-timeline`: declarative timeline model and position resolver.
//!
//! The model is a small immutable tree: a [`Composition`] holds parallel
//! [`Sequence`]s, each an ordered list of [`MediaItem`]s (clips, images,
//! gaps). All structural invariants are enforced at construction.
//!
//! The [`resolver`] maps a global timeline position to the active item of
//! every sequence, with frame-index-accurate skip counts for source
//! repositioning. Playback and export both sit on top of it.

pub mod composition;
pub mod index;
pub mod item;
pub mod resolver;
pub mod sequence;

pub use composition::Composition;
pub use index::{CumulativeIndex, Located};
pub use item::MediaItem;
pub use resolver::{resolve, resolve_sequence, SequencePosition};
pub use sequence::Sequence;
