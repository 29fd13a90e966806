use crate::world::host::{BlockKind, BlockView};
use crate::world::position::Location;

/// How far the resolver probes above and then below the requested spot.
pub const SEARCH_RADIUS: i32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    AlreadySafe(Location),
    /// A safe spot `offset` blocks above (positive) or below (negative).
    Found { location: Location, offset: i32 },
    /// Nothing safe in range; carries the original location unchanged.
    NotFound(Location),
}

impl Resolution {
    pub fn location(&self) -> &Location {
        match self {
            Resolution::AlreadySafe(location)
            | Resolution::Found { location, .. }
            | Resolution::NotFound(location) => location,
        }
    }

    pub fn is_found(&self) -> bool {
        !matches!(self, Resolution::NotFound(_))
    }
}

/// Feet and head free, standing on solid ground that is neither lava nor fire.
pub fn is_safe<V: BlockView + ?Sized>(view: &V, location: &Location) -> bool {
    let feet = location.block();
    let (Some(head), Some(ground)) = (feet.above(), feet.below()) else {
        return false;
    };
    let kind = |pos| view.block_at(&location.world, pos);
    let passable = |found: Option<BlockKind>| found.map_or(false, BlockKind::is_passable);

    passable(kind(feet))
        && passable(kind(head))
        && kind(ground).map_or(false, BlockKind::is_safe_ground)
}

/// Finds a location near `location` where an entity can materialise safely.
///
/// Queries only; the world is never touched. Upward candidates are tried
/// before downward ones, one block at a time up to [`SEARCH_RADIUS`].
pub fn resolve<V: BlockView + ?Sized>(view: &V, location: &Location) -> Resolution {
    if is_safe(view, location) {
        return Resolution::AlreadySafe(location.clone());
    }
    let upward = 1..=SEARCH_RADIUS;
    let downward = (1..=SEARCH_RADIUS).map(|step| -step);
    for offset in upward.chain(downward) {
        let candidate = location.shifted_y(f64::from(offset));
        if is_safe(view, &candidate) {
            return Resolution::Found {
                location: candidate,
                offset,
            };
        }
    }
    Resolution::NotFound(location.clone())
}
