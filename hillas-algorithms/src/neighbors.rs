//! Pixel neighbor relations and pixel-shape inference.
//!
//! Two pixels are related if the distance of their centres is below
//! `radius * (size_i + size_j) / 2`. Four relations with increasing radii
//! are built in one pass over candidate pairs from a spatial grid. The
//! directions of close pairs are histogrammed to infer the tessellation.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc
)]

use hillas_core::{CameraGeometry, NeighborConfig, PixelShape, Result};
use log::{debug, warn};

use crate::spatial::SpatialGrid;

/// Radius used to collect pair directions for shape inference.
pub const SHAPE_PROBE_RADIUS: f64 = std::f64::consts::SQRT_2;

/// Relative tolerance when comparing area/size² with the shape ratio.
const AREA_RATIO_TOLERANCE: f64 = 0.01;

/// One of the neighbor relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// Direct neighbors (used for cleaning and neighbor-peak integration).
    First,
    /// Next-to-nearest neighbors.
    Second,
    /// Third ring.
    Third,
    /// Extension region around an image.
    Extension,
}

impl Relation {
    /// All relations in increasing radius order.
    pub const ALL: [Relation; 4] = [
        Relation::First,
        Relation::Second,
        Relation::Third,
        Relation::Extension,
    ];

    fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
            Self::Third => 2,
            Self::Extension => 3,
        }
    }
}

/// Default radii (three relations plus extension) for a pixel shape.
#[must_use]
pub fn default_radii(shape: PixelShape) -> [f64; 4] {
    match shape {
        PixelShape::Square => [1.2, 1.5, 2.1, 2.5],
        _ => [1.2, 1.8, 2.1, 2.6],
    }
}

/// Compressed adjacency lists of one relation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighborList {
    offsets: Vec<usize>,
    indices: Vec<usize>,
}

impl NeighborList {
    fn from_lists(lists: Vec<Vec<usize>>) -> Self {
        let mut offsets = Vec::with_capacity(lists.len() + 1);
        let mut indices = Vec::with_capacity(lists.iter().map(Vec::len).sum());
        offsets.push(0);
        for mut list in lists {
            list.sort_unstable();
            indices.extend_from_slice(&list);
            offsets.push(indices.len());
        }
        Self { offsets, indices }
    }

    /// Neighbors of a pixel, in ascending order.
    #[must_use]
    pub fn get(&self, pixel: usize) -> &[usize] {
        match (self.offsets.get(pixel), self.offsets.get(pixel + 1)) {
            (Some(&start), Some(&end)) => &self.indices[start..end],
            _ => &[],
        }
    }

    /// Number of pixels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Returns true if there are no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `j` is a neighbor of `i`.
    #[must_use]
    pub fn contains(&self, i: usize, j: usize) -> bool {
        self.get(i).binary_search(&j).is_ok()
    }

    /// Total number of directed links.
    #[must_use]
    pub fn num_links(&self) -> usize {
        self.indices.len()
    }
}

/// Counts of close-pair directions in 5° bins, folded into `[-1°, 179°)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionHistogram {
    /// Pairs at 0°.
    pub deg0: usize,
    /// Pairs at 30°.
    pub deg30: usize,
    /// Pairs at 60°.
    pub deg60: usize,
    /// Pairs at 90°.
    pub deg90: usize,
    /// Pairs at 120°.
    pub deg120: usize,
    /// Pairs at 150°.
    pub deg150: usize,
}

impl DirectionHistogram {
    fn fill(&mut self, dx: f64, dy: f64) {
        let mut a = dy.atan2(dx).to_degrees();
        if a < -1.0 {
            a += 180.0;
        } else if a >= 179.0 {
            a -= 180.0;
        }
        let bin = ((a + 0.5) / 5.0) as i32 * 5;
        match bin {
            0 => self.deg0 += 1,
            30 => self.deg30 += 1,
            60 => self.deg60 += 1,
            90 => self.deg90 += 1,
            120 => self.deg120 += 1,
            150 => self.deg150 += 1,
            _ => {}
        }
    }

    /// Tessellation suggested by the directions alone.
    #[must_use]
    pub fn classify(&self) -> PixelShape {
        if self.deg0 > 0 && self.deg90 > 0 && self.deg60 == 0 && self.deg120 == 0 {
            PixelShape::Square
        } else if 4 * self.deg90 < self.deg60 + self.deg120 {
            PixelShape::HexPointed
        } else if self.deg90 > 0 && self.deg0 == 0 {
            PixelShape::HexFlat
        } else {
            PixelShape::Circular
        }
    }
}

fn ratio_matches(value: f64, expected: f64) -> bool {
    value >= (1.0 - AREA_RATIO_TOLERANCE) * expected
        && value <= (1.0 + AREA_RATIO_TOLERANCE) * expected
}

/// Combines the direction statistics with the mean area/size² ratio.
///
/// Inconsistent statistics are logged and never fatal.
#[must_use]
pub fn resolve_shape(histogram: &DirectionHistogram, area_ratio: f64) -> PixelShape {
    let round = std::f64::consts::FRAC_PI_4;
    let hex = 3.0_f64.sqrt() / 2.0;
    match histogram.classify() {
        PixelShape::Square => {
            if !ratio_matches(area_ratio, 1.0) {
                warn!("pixel positions indicate square pixels but area/size^2 is {area_ratio:.4}");
            }
            PixelShape::Square
        }
        PixelShape::Circular => {
            if !ratio_matches(area_ratio, round) {
                warn!("pixel positions indicate round pixels but area/size^2 is {area_ratio:.4}");
            }
            PixelShape::Circular
        }
        shape => {
            if ratio_matches(area_ratio, hex) {
                shape
            } else if ratio_matches(area_ratio, round) {
                PixelShape::Circular
            } else {
                warn!(
                    "pixel positions indicate hexagonal pixels but area/size^2 is {area_ratio:.4} \
                     (expected {hex:.4}, or {round:.4} for round pixels)"
                );
                shape
            }
        }
    }
}

/// Neighbor relations of one camera, built once per run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborGraph {
    shape: PixelShape,
    radii: [f64; 4],
    histogram: DirectionHistogram,
    lists: [NeighborList; 4],
}

impl NeighborGraph {
    /// Builds all relations and infers the pixel shape.
    ///
    /// Radii configured as 0 take the default of the inferred shape.
    pub fn build(camera: &CameraGeometry, config: &NeighborConfig) -> Result<Self> {
        camera.validate()?;
        config.validate()?;
        let npix = camera.num_pixels();

        let mut histogram = DirectionHistogram::default();
        let (shape, radii) = {
            // Probe pass: only the directions of close pairs are needed.
            let max_size = camera.size.iter().copied().fold(0.0_f64, f64::max);
            let grid = Self::index(camera, SHAPE_PROBE_RADIUS * max_size);
            for i in 0..npix {
                for j in grid.query_neighborhood(camera.x[i], camera.y[i]) {
                    if j <= i {
                        continue;
                    }
                    let dx = camera.x[j] - camera.x[i];
                    let dy = camera.y[j] - camera.y[i];
                    let mean_size = 0.5 * (camera.size[i] + camera.size[j]);
                    if dx.hypot(dy) < SHAPE_PROBE_RADIUS * mean_size {
                        histogram.fill(dx, dy);
                    }
                }
            }
            let denom = npix as f64 + 1e-10;
            let mean_area = camera.area.iter().sum::<f64>() / denom;
            let mean_size = camera.size.iter().sum::<f64>() / denom;
            let shape = if npix > 0 {
                resolve_shape(&histogram, mean_area / (mean_size * mean_size))
            } else {
                PixelShape::Unknown
            };
            if camera.shape != PixelShape::Unknown && camera.shape != shape {
                warn!(
                    "declared pixel shape {:?} differs from inferred shape {:?}",
                    camera.shape, shape
                );
            }

            let defaults = default_radii(shape);
            let configured = [
                config.radii[0],
                config.radii[1],
                config.radii[2],
                config.extension_radius,
            ];
            let mut radii = [0.0; 4];
            for (k, radius) in radii.iter_mut().enumerate() {
                *radius = if configured[k] > 0.0 {
                    configured[k]
                } else {
                    defaults[k]
                };
            }
            (shape, radii)
        };

        let max_size = camera.size.iter().copied().fold(0.0_f64, f64::max);
        let max_radius = radii.iter().copied().fold(0.0_f64, f64::max);
        let grid = Self::index(camera, max_radius * max_size);

        let mut lists: [Vec<Vec<usize>>; 4] = std::array::from_fn(|_| vec![Vec::new(); npix]);
        for i in 0..npix {
            for j in grid.query_neighborhood(camera.x[i], camera.y[i]) {
                if j <= i {
                    continue;
                }
                let d = (camera.x[j] - camera.x[i]).hypot(camera.y[j] - camera.y[i]);
                let mean_size = 0.5 * (camera.size[i] + camera.size[j]);
                for (k, &radius) in radii.iter().enumerate() {
                    if d < radius * mean_size {
                        lists[k][i].push(j);
                        lists[k][j].push(i);
                    }
                }
            }
        }

        let lists = lists.map(NeighborList::from_lists);
        debug!(
            "neighbor graph: {} pixels, shape {:?}, {} direct links",
            npix,
            shape,
            lists[0].num_links()
        );
        Ok(Self {
            shape,
            radii,
            histogram,
            lists,
        })
    }

    fn index(camera: &CameraGeometry, cell_size: f64) -> SpatialGrid<usize> {
        let mut grid = SpatialGrid::new(cell_size);
        for i in 0..camera.num_pixels() {
            grid.insert(camera.x[i], camera.y[i], i);
        }
        grid
    }

    /// Inferred pixel shape.
    #[must_use]
    pub fn shape(&self) -> PixelShape {
        self.shape
    }

    /// Direction statistics the shape was inferred from.
    #[must_use]
    pub fn histogram(&self) -> &DirectionHistogram {
        &self.histogram
    }

    /// Radius in effect for a relation.
    #[must_use]
    pub fn radius(&self, relation: Relation) -> f64 {
        self.radii[relation.index()]
    }

    /// Direct neighbors of a pixel.
    #[must_use]
    pub fn neighbors(&self, pixel: usize) -> &[usize] {
        self.lists[0].get(pixel)
    }

    /// Neighbors of a pixel under the given relation.
    #[must_use]
    pub fn related(&self, relation: Relation, pixel: usize) -> &[usize] {
        self.lists[relation.index()].get(pixel)
    }

    /// Adjacency lists of a relation.
    #[must_use]
    pub fn relation(&self, relation: Relation) -> &NeighborList {
        &self.lists[relation.index()]
    }

    /// Number of pixels covered.
    #[must_use]
    pub fn num_pixels(&self) -> usize {
        self.lists[0].len()
    }
}
