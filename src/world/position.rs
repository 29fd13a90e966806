use serde::{Deserialize, Serialize};

/// Integer block coordinate inside a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDelta {
    pub dx: i32,
    pub dy: i32,
    pub dz: i32,
}

/// A point in a named world with an orientation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

impl BlockPos {
    pub fn offset(self, delta: BlockDelta) -> Option<Self> {
        Some(Self {
            x: self.x.checked_add(delta.dx)?,
            y: self.y.checked_add(delta.dy)?,
            z: self.z.checked_add(delta.dz)?,
        })
    }

    pub fn above(self) -> Option<Self> {
        self.offset(BlockDelta { dx: 0, dy: 1, dz: 0 })
    }

    pub fn below(self) -> Option<Self> {
        self.offset(BlockDelta { dx: 0, dy: -1, dz: 0 })
    }

    pub fn chunk(self) -> (i32, i32) {
        (self.x >> 4, self.z >> 4)
    }
}

impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    pub fn with_rotation(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self
    }

    pub fn block(&self) -> BlockPos {
        BlockPos {
            x: self.x.floor() as i32,
            y: self.y.floor() as i32,
            z: self.z.floor() as i32,
        }
    }

    /// Same location shifted vertically, keeping world and rotation.
    pub fn shifted_y(&self, dy: f64) -> Self {
        Self {
            y: self.y + dy,
            ..self.clone()
        }
    }

    /// True when moving from `self` to `other` crosses a block boundary.
    pub fn changed_block(&self, other: &Location) -> bool {
        self.world != other.world || self.block() != other.block()
    }

    /// True when the coordinates differ at all, ignoring rotation.
    pub fn displaced(&self, other: &Location) -> bool {
        self.world != other.world || self.x != other.x || self.y != other.y || self.z != other.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_floors_negative_coordinates() {
        let location = Location::new("world", -0.5, 63.9, -16.01);
        assert_eq!(location.block(), BlockPos { x: -1, y: 63, z: -17 });
    }

    #[test]
    fn chunk_uses_arithmetic_shift() {
        assert_eq!(BlockPos { x: -1, y: 0, z: 31 }.chunk(), (-1, 1));
        assert_eq!(BlockPos { x: 16, y: 0, z: -16 }.chunk(), (1, -1));
    }

    #[test]
    fn offset_rejects_overflow() {
        let top = BlockPos { x: 0, y: i32::MAX, z: 0 };
        assert_eq!(top.above(), None);
        assert_eq!(top.below(), Some(BlockPos { x: 0, y: i32::MAX - 1, z: 0 }));
    }

    #[test]
    fn head_rotation_is_not_displacement() {
        let from = Location::new("world", 1.2, 64.0, 3.4);
        let turned = from.clone().with_rotation(90.0, 10.0);
        assert!(!from.displaced(&turned));
        assert!(!from.changed_block(&turned));

        let nudged = from.shifted_y(0.2);
        assert!(from.displaced(&nudged));
        assert!(!from.changed_block(&nudged));
    }
}
