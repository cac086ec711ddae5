//! Target-size policy for downscaled photo variants.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ResizeError {
    #[error("resize bound must be greater than zero")]
    NonPositiveBound,
}

/// Upper bound for the longer side of a resized image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaxDimension(NonZeroU32);

impl MaxDimension {
    pub fn new(bound: u32) -> Result<Self, ResizeError> {
        NonZeroU32::new(bound)
            .map(MaxDimension)
            .ok_or(ResizeError::NonPositiveBound)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Compute the size of a variant that fits inside `max` x `max`.
///
/// Images already within the bound are returned unchanged, so nothing is ever
/// upscaled. Otherwise the longer side becomes exactly `max` and the shorter
/// side is scaled by the same factor, truncating, but never below one pixel.
pub fn compute_target_size(width: u32, height: u32, max: MaxDimension) -> Dimensions {
    let bound = max.get();

    if width <= bound && height <= bound {
        return Dimensions { width, height };
    }

    if width == height {
        return Dimensions {
            width: bound,
            height: bound,
        };
    }

    let (longer, shorter) = if width > height {
        (width, height)
    } else {
        (height, width)
    };

    // `shorter < longer`, so the result is always below `bound`.
    let scaled = (u64::from(shorter) * u64::from(bound) / u64::from(longer)).max(1) as u32;

    if width > height {
        Dimensions {
            width: bound,
            height: scaled,
        }
    } else {
        Dimensions {
            width: scaled,
            height: bound,
        }
    }
}
