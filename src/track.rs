use crate::error::ConfigError;
use crate::types::Vec3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Checkpoint {
    pub index: usize,
    pub position: Vec3,
}

/// Axis-aligned XZ rectangle used to reject updates far from the loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_z: f64,
    pub max_z: f64,
}

/// The loop of checkpoints. Immutable once built.
#[derive(Clone, Debug)]
pub struct Track {
    checkpoints: Vec<Checkpoint>,
    radius: f64,
    floor_height: f64,
    max_time_ms: u64,
    bounds: Bounds,
}

impl Track {
    pub fn new(
        positions: Vec<Vec3>,
        radius: f64,
        floor_height: f64,
        max_time_ms: u64,
    ) -> Result<Self, ConfigError> {
        if positions.is_empty() {
            return Err(ConfigError::EmptyTrack);
        }
        if !radius.is_finite() || radius <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "radius",
                reason: format!("must be a positive number, got {radius}"),
            });
        }
        if !floor_height.is_finite() {
            return Err(ConfigError::InvalidValue {
                key: "floorHeight",
                reason: format!("must be finite, got {floor_height}"),
            });
        }
        if let Some(index) = positions.iter().position(|pos| !pos.is_finite()) {
            let pos = positions[index];
            return Err(ConfigError::InvalidCheckpoint {
                index,
                raw: format!("{};{};{}", pos.x, pos.y, pos.z),
            });
        }

        let bounds = positions.iter().skip(1).fold(
            Bounds {
                min_x: positions[0].x - radius,
                max_x: positions[0].x + radius,
                min_z: positions[0].z - radius,
                max_z: positions[0].z + radius,
            },
            |acc, pos| Bounds {
                min_x: acc.min_x.min(pos.x - radius),
                max_x: acc.max_x.max(pos.x + radius),
                min_z: acc.min_z.min(pos.z - radius),
                max_z: acc.max_z.max(pos.z + radius),
            },
        );

        let checkpoints = positions
            .into_iter()
            .enumerate()
            .map(|(index, position)| Checkpoint { index, position })
            .collect();

        Ok(Self {
            checkpoints,
            radius,
            floor_height,
            max_time_ms,
            bounds,
        })
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn floor_height(&self) -> f64 {
        self.floor_height
    }

    pub fn max_time_ms(&self) -> u64 {
        self.max_time_ms
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Strict containment in the XZ bounding rectangle; height is ignored.
    pub fn contains(&self, position: &Vec3) -> bool {
        position.x > self.bounds.min_x
            && position.x < self.bounds.max_x
            && position.z > self.bounds.min_z
            && position.z < self.bounds.max_z
    }

    /// First checkpoint in sequence order strictly within `radius`.
    ///
    /// This is a linear scan, not a nearest-of-all search: when two checkpoints are in range the
    /// lower index wins even if the other one is closer.
    pub fn checkpoint_within(&self, position: &Vec3, radius: f64) -> Option<&Checkpoint> {
        let limit = radius * radius;
        self.checkpoints
            .iter()
            .find(|checkpoint| position.distance_squared(&checkpoint.position) < limit)
    }

    pub fn hit_checkpoint(&self, position: &Vec3) -> Option<&Checkpoint> {
        self.checkpoint_within(position, self.radius)
    }

    pub fn is_below_floor(&self, position: &Vec3) -> bool {
        position.y < self.floor_height
    }

    pub fn successor(&self, index: usize) -> usize {
        (index + 1) % self.len()
    }

    pub fn predecessor(&self, index: usize) -> usize {
        (index + self.len() - 1) % self.len()
    }
}

#[cfg(test)]
pub(crate) fn square_track() -> Track {
    Track::new(
        vec![
            Vec3::new(0.0, 64.0, 0.0),
            Vec3::new(10.0, 64.0, 0.0),
            Vec3::new(10.0, 64.0, 10.0),
            Vec3::new(0.0, 64.0, 10.0),
        ],
        2.0,
        60.0,
        5_000,
    )
    .expect("square track is valid")
}
