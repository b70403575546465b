//! Path finder over an integer grid of cells.
//!
//! The search is a cost-first expansion from the start cell, each step costs the
//! euclidean distance between the two cells plus the extra cost given by the
//! [`Traversal`] oracle for the destination cell.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use glam::IVec3;
use thiserror::Error;


/// Default maximum number of cells expanded by a single search.
pub const DEFAULT_MAX_EXPANSIONS: usize = 20_000;


/// The oracle telling which cells can be traversed, and at which cost.
pub trait Traversal {

    /// Return true if the cell cannot be traversed.
    fn is_solid(&self, pos: IVec3) -> bool;

    /// Extra cost of traversing the cell, added to the distance.
    fn extra_cost(&self, pos: IVec3) -> f32 {
        let _ = pos;
        0.0
    }

}

impl<T: Traversal + ?Sized> Traversal for &T {

    fn is_solid(&self, pos: IVec3) -> bool {
        (**self).is_solid(pos)
    }

    fn extra_cost(&self, pos: IVec3) -> f32 {
        (**self).extra_cost(pos)
    }

}

/// A traversal wrapper that adds a penalty to every cell that has no solid cell below
/// it, in order to prefer walking over flying.
#[derive(Debug, Clone)]
pub struct FlyingAversion<T> {
    pub inner: T,
    pub penalty: f32,
}

impl<T: Traversal> FlyingAversion<T> {

    pub fn new(inner: T, penalty: f32) -> Self {
        Self { inner, penalty }
    }

}

impl<T: Traversal> Traversal for FlyingAversion<T> {

    fn is_solid(&self, pos: IVec3) -> bool {
        self.inner.is_solid(pos)
    }

    fn extra_cost(&self, pos: IVec3) -> f32 {
        let cost = self.inner.extra_cost(pos);
        if self.inner.is_solid(pos - IVec3::Y) {
            cost
        } else {
            cost + self.penalty
        }
    }

}


/// An integer box, both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IBox {
    pub min: IVec3,
    pub max: IVec3,
}

impl IBox {

    pub fn new(min: IVec3, max: IVec3) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(self, pos: IVec3) -> bool {
        pos.cmpge(self.min).all() && pos.cmple(self.max).all()
    }

}


/// Neighborhood of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// Only the faces.
    #[default]
    Six,
    /// Faces, edges and corners.
    TwentySix,
}

impl Connectivity {

    /// Offsets of the neighbors, always in the same order.
    fn offsets(self) -> Vec<IVec3> {
        match self {
            Connectivity::Six => vec![
                IVec3::X,
                IVec3::NEG_X,
                IVec3::Y,
                IVec3::NEG_Y,
                IVec3::Z,
                IVec3::NEG_Z,
            ],
            Connectivity::TwentySix => {
                let mut offsets = Vec::with_capacity(26);
                for x in -1..=1 {
                    for y in -1..=1 {
                        for z in -1..=1 {
                            if (x, y, z) != (0, 0, 0) {
                                offsets.push(IVec3::new(x, y, z));
                            }
                        }
                    }
                }
                offsets
            }
        }
    }

}


/// Reasons for not returning a path.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathError {
    /// The goal cell is solid, no search has been done.
    #[error("goal is solid")]
    GoalUnreachableSolid,
    /// Every reachable cell has been expanded, or the expansion budget is exhausted.
    #[error("no path found")]
    PathNotFound,
}


/// A path finder with its options, borrowing the traversal oracle.
#[derive(Debug, Clone)]
pub struct PathFinder<'a, T: ?Sized> {
    oracle: &'a T,
    bounds: Option<IBox>,
    tolerance: f32,
    connectivity: Connectivity,
    max_expansions: usize,
}

#[derive(Debug)]
struct PathPoint {
    pos: IVec3,
    /// Cost of the best known path from the start.
    cost: f32,
    /// Previous point index on the best known path.
    previous_index: Option<usize>,
    /// True if this point is in the pending list.
    pending: bool,
    /// True if the point has been expanded, its cost is final.
    closed: bool,
}

impl<'a, T: Traversal + ?Sized> PathFinder<'a, T> {

    pub fn new(oracle: &'a T) -> Self {
        Self {
            oracle,
            bounds: None,
            tolerance: 0.0,
            connectivity: Connectivity::default(),
            max_expansions: DEFAULT_MAX_EXPANSIONS,
        }
    }

    /// Restrict the search to cells in the given box.
    pub fn bounds(mut self, bounds: IBox) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Accept any cell at this distance or less from the goal as the end of the path.
    pub fn tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn max_expansions(mut self, max_expansions: usize) -> Self {
        self.max_expansions = max_expansions;
        self
    }

    /// Find a path from the start cell to the goal cell. The returned path doesn't
    /// contain the start cell and ends on the first cell reached within tolerance of
    /// the goal, it is empty if the start is already within tolerance.
    pub fn find_path(&self, start: IVec3, goal: IVec3) -> Result<Vec<IVec3>, PathError> {

        if self.oracle.is_solid(goal) {
            return Err(PathError::GoalUnreachableSolid);
        }

        let offsets = self.connectivity.offsets();
        let mut search = Search::default();

        let (start_index, start_point) = search.ensure_point(start);
        start_point.cost = 0.0;
        search.ensure_pending_point(start_index);

        let mut expansions = 0;

        while let Some(current_index) = search.pending.pop() {

            let current_point = &mut search.points[current_index];
            current_point.pending = false;
            current_point.closed = true;

            let current_pos = current_point.pos;
            let current_cost = current_point.cost;

            if distance(current_pos, goal) <= self.tolerance {
                return Ok(search.build_path(current_index));
            }

            expansions += 1;
            if expansions > self.max_expansions {
                break;
            }

            for &offset in &offsets {

                let pos = current_pos + offset;
                if self.bounds.is_some_and(|bounds| !bounds.contains(pos)) {
                    continue;
                }

                if self.oracle.is_solid(pos) {
                    continue;
                }

                let (option_index, option_point) = search.ensure_point(pos);
                if option_point.closed {
                    continue;
                }

                let new_cost = current_cost + offset.as_vec3().length() + self.oracle.extra_cost(pos);
                if new_cost < option_point.cost {
                    option_point.cost = new_cost;
                    option_point.previous_index = Some(current_index);
                    search.ensure_pending_point(option_index);
                }

            }

        }

        Err(PathError::PathNotFound)

    }

}


/// State of a single search.
#[derive(Debug, Default)]
struct Search {
    /// All points discovered, indexed in discovery order.
    points: Vec<PathPoint>,
    /// Mapping of points from their position.
    points_map: HashMap<IVec3, usize>,
    /// Pending points sorted by decreasing cost and then decreasing discovery order,
    /// so the next point to expand is popped from the end.
    pending: Vec<usize>,
}

impl Search {

    fn ensure_point(&mut self, pos: IVec3) -> (usize, &mut PathPoint) {
        match self.points_map.entry(pos) {
            Entry::Occupied(o) => {
                let index = *o.into_mut();
                (index, &mut self.points[index])
            }
            Entry::Vacant(v) => {
                let index = self.points.len();
                v.insert(index);
                self.points.push(PathPoint {
                    pos,
                    cost: f32::INFINITY,
                    previous_index: None,
                    pending: false,
                    closed: false,
                });
                (index, &mut self.points[index])
            }
        }
    }

    /// Ensure that a point is in the pending list, at the place given by its cost.
    fn ensure_pending_point(&mut self, point_index: usize) {

        let point = &mut self.points[point_index];
        let point_cost = point.cost;

        if point.pending {
            if let Some(index) = self.pending.iter().position(|&index| index == point_index) {
                self.pending.remove(index);
            }
        }

        point.pending = true;

        let insert_index = self.pending.binary_search_by(|&index| {
            let cost = self.points[index].cost;
            point_cost.total_cmp(&cost).then(point_index.cmp(&index))
        }).unwrap_or_else(|index| index);

        self.pending.insert(insert_index, point_index);

    }

    /// Build the path ending on the given point, excluding the start point.
    fn build_path(&self, mut index: usize) -> Vec<IVec3> {
        let mut ret = Vec::new();
        while let Some(previous_index) = self.points[index].previous_index {
            ret.push(self.points[index].pos);
            index = previous_index;
        }
        ret.reverse();
        ret
    }

}


fn distance(from: IVec3, to: IVec3) -> f32 {
    (to - from).as_vec3().length()
}
