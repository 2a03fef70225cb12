//! Frame size resolution for partially specified requests.

use thiserror::Error;

use crate::traits::{FrameSize, ResolutionRequest};

/// Resolution used when a request names neither dimension.
pub const DEFAULT_FRAME_SIZE: FrameSize = FrameSize::new(640, 480);

/// A request named a dimension but there was nothing to match it against.
///
/// The snapshot service reports it as [`crate::Error::NoCandidates`] with the
/// device path attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no discrete frame sizes to choose from")]
pub struct NoCandidates;

/// Which dimension wins when a request names both.
///
/// Only [`ResolutionPolicy::WidthFirst`] exists today: a request with both
/// width and height is matched on width alone. It is a named policy so the
/// behaviour stays visible if a joint-distance match is ever wanted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// Nearest width; height is ignored when width is present.
    #[default]
    WidthFirst,
}

/// What a request needs from the device before it can be resolved.
#[must_use]
pub const fn needs_candidates(request: &ResolutionRequest) -> bool {
    !request.is_unspecified()
}

/// Pick a concrete size for `request` from `candidates`.
///
/// - neither dimension: `default` without looking at `candidates`;
/// - height only: nearest height;
/// - width (with or without height): nearest width.
///
/// Ties go to the earliest candidate.
pub fn resolve(
    candidates: &[FrameSize],
    request: &ResolutionRequest,
    default: FrameSize,
    policy: ResolutionPolicy,
) -> Result<FrameSize, NoCandidates> {
    match policy {
        ResolutionPolicy::WidthFirst => match (request.width, request.height) {
            (None, None) => Ok(default),
            (None, Some(height)) => nearest(candidates, |size| size.height.abs_diff(height)),
            (Some(width), _) => nearest(candidates, |size| size.width.abs_diff(width)),
        },
    }
}

fn nearest<F>(candidates: &[FrameSize], distance: F) -> Result<FrameSize, NoCandidates>
where
    F: Fn(&FrameSize) -> u32,
{
    // min_by_key returns the first of equal minima.
    candidates
        .iter()
        .min_by_key(|size| distance(size))
        .copied()
        .ok_or(NoCandidates)
}
