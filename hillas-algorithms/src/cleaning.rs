//! Two-level tail-cut image cleaning.
//!
//! A pixel enters the image if it is above the high threshold and has a
//! first-relation neighbor above the low threshold, or if it is above the
//! low threshold and has a neighbor above the high threshold. Optionally the
//! image is truncated below a fraction of the n-th brightest pixel.
#![allow(clippy::missing_errors_doc)]

use hillas_core::{CleanedImage, CleaningConfig, PixelAmplitudes, Result};
use log::debug;

use crate::disabled::DisabledPixels;
use crate::neighbors::NeighborGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Below,
    Low,
    High,
}

/// Tail-cut cleaner for one telescope.
#[derive(Debug, Clone)]
pub struct ImageCleaner<'a> {
    neighbors: &'a NeighborGraph,
    disabled: &'a DisabledPixels,
    config: CleaningConfig,
}

impl<'a> ImageCleaner<'a> {
    /// Creates a cleaner; the configuration is checked here.
    pub fn new(
        neighbors: &'a NeighborGraph,
        disabled: &'a DisabledPixels,
        config: CleaningConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            neighbors,
            disabled,
            config,
        })
    }

    fn level(&self, amplitudes: &PixelAmplitudes, pixel: usize) -> Level {
        if self.disabled.is_disabled(pixel) {
            return Level::Below;
        }
        let a = amplitudes.get(pixel);
        if a >= self.config.high {
            Level::High
        } else if a >= self.config.low {
            Level::Low
        } else {
            Level::Below
        }
    }

    /// Selects the image pixels.
    ///
    /// Without truncation the pixels are in index order; a truncated image
    /// is sorted by decreasing amplitude.
    #[must_use]
    pub fn clean(&self, amplitudes: &PixelAmplitudes) -> CleanedImage {
        let npix = amplitudes.len().min(self.neighbors.num_pixels());
        let levels: Vec<Level> = (0..npix).map(|p| self.level(amplitudes, p)).collect();

        let mut pixels: Vec<usize> = (0..npix)
            .filter(|&p| {
                let partner = match levels[p] {
                    Level::Below => return false,
                    Level::High => Level::Low,
                    Level::Low => Level::High,
                };
                self.neighbors.neighbors(p).iter().any(|&nb| {
                    nb < npix
                        && match partner {
                            Level::Low => levels[nb] != Level::Below,
                            _ => levels[nb] == Level::High,
                        }
                })
            })
            .collect();

        let rank = self.config.reference_rank;
        if rank > 0 && rank < pixels.len() && self.config.min_fraction > 0.0 {
            pixels.sort_by(|&a, &b| amplitudes.get(b).total_cmp(&amplitudes.get(a)));
            let reference = amplitudes.get(pixels[rank - 1]);
            let threshold = self.config.min_fraction * reference;
            if let Some(cut) = pixels[rank..]
                .iter()
                .position(|&p| amplitudes.get(p) < threshold)
            {
                debug!(
                    "image truncated after {} of {} pixels (reference {reference:.1} p.e.)",
                    rank + cut,
                    pixels.len()
                );
                pixels.truncate(rank + cut);
            }
        }
        CleanedImage::new(pixels)
    }
}
