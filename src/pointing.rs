//! Pointing resolver: which tracked object sits under the aim point.
//!
//! Region policy: every object whose box overlaps the aim circle gets
//! `score = (overlap / circle_area) / box_area`, and the best score wins. The
//! overlap fraction is estimated by testing a fixed set of sample points inside
//! the circle against the box, which is accurate enough to rank candidates.
//!
//! Point policy: the smallest box containing the aim point wins. Used when no
//! radius is configured.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::track::TrackedObject;

pub const DEFAULT_AIM_RADIUS: f32 = 0.08;
pub const DEFAULT_GRID_SAMPLES: u32 = 24;
pub const MAX_GRID_SAMPLES: u32 = 256;
pub const MAX_RANDOM_SAMPLES: u32 = 65_536;

/// How sample points inside the aim circle are chosen.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OverlapSampler {
    /// Cell centers of an `n` x `n` grid over the circle's bounding square,
    /// plus the center itself when `n` is even.
    Grid { n: u32 },
    /// The center plus `count - 1` uniform points in the disc, from a seeded generator.
    Random { count: u32, seed: u64 },
}

impl Default for OverlapSampler {
    fn default() -> Self {
        OverlapSampler::Grid {
            n: DEFAULT_GRID_SAMPLES,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AimSettings {
    pub point: Point,
    /// `None` selects the single-point containment policy.
    pub radius: Option<f32>,
    pub sampler: OverlapSampler,
}

impl Default for AimSettings {
    fn default() -> Self {
        Self {
            point: Point::new(0.5, 0.5),
            radius: Some(DEFAULT_AIM_RADIUS),
            sampler: OverlapSampler::default(),
        }
    }
}

impl AimSettings {
    pub fn validate(&self) -> Result<()> {
        let p = self.point;
        if !((0.0..=1.0).contains(&p.x) && (0.0..=1.0).contains(&p.y)) {
            return Err(anyhow!("aim point ({}, {}) lies outside the frame", p.x, p.y));
        }
        if let Some(radius) = self.radius {
            if !(radius > 0.0 && radius.is_finite()) {
                return Err(anyhow!("aim radius must be positive, got {}", radius));
            }
        }
        match self.sampler {
            OverlapSampler::Grid { n } if !(1..=MAX_GRID_SAMPLES).contains(&n) => Err(anyhow!(
                "grid sampler needs n within 1..={}, got {}",
                MAX_GRID_SAMPLES,
                n
            )),
            OverlapSampler::Random { count, .. } if !(1..=MAX_RANDOM_SAMPLES).contains(&count) => {
                Err(anyhow!(
                    "random sampler needs count within 1..={}, got {}",
                    MAX_RANDOM_SAMPLES,
                    count
                ))
            }
            _ => Ok(()),
        }
    }
}

pub struct PointingResolver {
    aim: Point,
    radius: Option<f32>,
    /// Unit-disc sample offsets, scaled by the radius at resolve time.
    offsets: Vec<Point>,
}

impl PointingResolver {
    pub fn new(settings: &AimSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            aim: settings.point,
            radius: settings.radius,
            offsets: disc_offsets(settings.sampler),
        })
    }

    pub fn aim(&self) -> Point {
        self.aim
    }

    pub fn radius(&self) -> Option<f32> {
        self.radius
    }

    /// Resolve with the configured policy.
    pub fn resolve<'a>(&self, objects: &'a [TrackedObject]) -> Option<&'a TrackedObject> {
        match self.radius {
            Some(radius) => self.resolve_region(objects, self.aim, radius),
            None => resolve_point(objects, self.aim),
        }
    }

    /// Best-scoring object overlapping the circle at `aim` with `radius`.
    pub fn resolve_region<'a>(
        &self,
        objects: &'a [TrackedObject],
        aim: Point,
        radius: f32,
    ) -> Option<&'a TrackedObject> {
        let mut best: Option<(&TrackedObject, f32)> = None;
        for object in objects {
            let area = object.bbox.area();
            if area <= 0.0 {
                continue;
            }
            let fraction = self.overlap_fraction(object, aim, radius);
            if fraction <= 0.0 {
                continue;
            }
            let score = fraction / area;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((object, score));
            }
        }
        best.map(|(object, _)| object)
    }

    /// Estimated share of the aim circle covered by the object's box.
    fn overlap_fraction(&self, object: &TrackedObject, aim: Point, radius: f32) -> f32 {
        if self.offsets.is_empty() {
            return 0.0;
        }
        let inside = self
            .offsets
            .iter()
            .filter(|o| {
                object
                    .bbox
                    .contains(Point::new(aim.x + o.x * radius, aim.y + o.y * radius))
            })
            .count();
        inside as f32 / self.offsets.len() as f32
    }
}

/// Smallest box containing `aim`, first on ties.
pub fn resolve_point(objects: &[TrackedObject], aim: Point) -> Option<&TrackedObject> {
    let mut best: Option<&TrackedObject> = None;
    for object in objects.iter().filter(|o| o.bbox.contains(aim)) {
        if best.map_or(true, |b| object.bbox.area() < b.bbox.area()) {
            best = Some(object);
        }
    }
    best
}

/// Unit-disc offsets. The center is always among them, so a box containing the
/// aim point is never missed however thin it is.
fn disc_offsets(sampler: OverlapSampler) -> Vec<Point> {
    let center = Point::new(0.0, 0.0);
    match sampler {
        OverlapSampler::Grid { n } => {
            let step = 2.0 / n as f32;
            let mut offsets = Vec::with_capacity(n as usize * n as usize + 1);
            for row in 0..n {
                for col in 0..n {
                    let p = Point::new(
                        -1.0 + (col as f32 + 0.5) * step,
                        -1.0 + (row as f32 + 0.5) * step,
                    );
                    if p.x * p.x + p.y * p.y <= 1.0 {
                        offsets.push(p);
                    }
                }
            }
            // Odd grids already have a cell centered on the origin.
            if n % 2 == 0 {
                offsets.push(center);
            }
            offsets
        }
        OverlapSampler::Random { count, seed } => {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut offsets = Vec::with_capacity(count as usize);
            offsets.push(center);
            while offsets.len() < count as usize {
                let p = Point::new(rng.gen_range(-1.0..=1.0), rng.gen_range(-1.0..=1.0));
                if p.x * p.x + p.y * p.y <= 1.0 {
                    offsets.push(p);
                }
            }
            offsets
        }
    }
}
