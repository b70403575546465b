//! Tick-driven movement of the player's body along a path.

use std::collections::VecDeque;

use glam::{DVec3, IVec3};


/// Default distance to a waypoint under which it is considered reached.
pub const DEFAULT_TOLERANCE: f64 = 0.2;
/// Default speed of the walker, in blocks per second.
pub const DEFAULT_SPEED: f64 = 10.0;

/// Axes to project the movement on when bumping into something, in rotation order.
const BUMP_AXES: [DVec3; 3] = [DVec3::X, DVec3::Y, DVec3::Z];
/// Factor applied to the projected movement when bumped.
const BUMP_FACTOR: f64 = 3.0;


/// The body being moved by a walker.
pub trait Controller {

    fn position(&self) -> DVec3;

    fn set_position(&mut self, pos: DVec3);

    /// Return true if the last movement of the body has been blocked.
    fn bumped(&self) -> bool;

    fn look_at(&mut self, target: DVec3) {
        let _ = target;
    }

}

/// Result of a walker tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStatus {
    /// The body moved toward the current waypoint.
    Moving,
    /// Every waypoint has been reached.
    Arrived,
    /// No body is controlled, nothing moved.
    NoController,
}

/// A walker moving a body through a list of waypoints, one step per tick.
#[derive(Debug, Clone)]
pub struct Walker {
    waypoints: VecDeque<DVec3>,
    tolerance: f64,
    speed: f64,
    /// Index of the next axis in [`BUMP_AXES`].
    axis_index: usize,
}

impl Walker {

    pub fn new(waypoints: impl IntoIterator<Item = DVec3>) -> Self {
        Self {
            waypoints: waypoints.into_iter().collect(),
            tolerance: DEFAULT_TOLERANCE,
            speed: DEFAULT_SPEED,
            axis_index: 0,
        }
    }

    /// Create a walker following a path of cells, walking through the center of each
    /// cell's bottom face.
    pub fn from_path(path: &[IVec3]) -> Self {
        Self::new(path.iter().map(|pos| pos.as_dvec3() + DVec3::new(0.5, 0.0, 0.5)))
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// The waypoint currently walked to.
    pub fn target(&self) -> Option<DVec3> {
        self.waypoints.front().copied()
    }

    pub fn remaining(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_finished(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Return the next axis to project a bumped movement on, cycling through X, Y and Z.
    pub fn next_axis(&mut self) -> DVec3 {
        let axis = BUMP_AXES[self.axis_index];
        self.axis_index = (self.axis_index + 1) % BUMP_AXES.len();
        axis
    }

    /// Move the body toward the current waypoint for the given elapsed time in seconds.
    /// Reached waypoints are skipped, and a bumped body slides along the next axis.
    pub fn tick(&mut self, controller: Option<&mut dyn Controller>, dt: f64) -> WalkStatus {

        let Some(controller) = controller else {
            return WalkStatus::NoController;
        };

        let pos = controller.position();

        let (target, mut delta) = loop {
            let Some(target) = self.waypoints.front().copied() else {
                return WalkStatus::Arrived;
            };
            let delta = target - pos;
            if delta.length() < self.tolerance {
                self.waypoints.pop_front();
                // Restart axis rotation for each waypoint.
                self.axis_index = 0;
            } else {
                break (target, delta);
            }
        };

        controller.look_at(target);

        let max_distance = self.speed * dt;
        if delta.length() > max_distance {
            delta = delta.normalize() * max_distance;
        }

        if controller.bumped() {
            let axis = self.next_axis();
            delta = axis * delta.dot(axis) * BUMP_FACTOR;
        }

        controller.set_position(pos + delta);
        WalkStatus::Moving

    }

}


#[cfg(test)]
mod tests {

    use super::*;

    #[derive(Debug, Default)]
    struct Body {
        pos: DVec3,
        bumped: bool,
        look: Option<DVec3>,
        moves: usize,
    }

    impl Controller for Body {

        fn position(&self) -> DVec3 {
            self.pos
        }

        fn set_position(&mut self, pos: DVec3) {
            self.pos = pos;
            self.moves += 1;
        }

        fn bumped(&self) -> bool {
            self.bumped
        }

        fn look_at(&mut self, target: DVec3) {
            self.look = Some(target);
        }

    }

    #[test]
    fn no_controller() {
        let mut walker = Walker::new([DVec3::X]);
        assert_eq!(walker.tick(None, 0.05), WalkStatus::NoController);
        assert_eq!(walker.remaining(), 1);
    }

    #[test]
    fn axis_rotation() {
        let mut walker = Walker::from_path(&[]);
        assert_eq!(walker.next_axis(), DVec3::X);
        assert_eq!(walker.next_axis(), DVec3::Y);
        assert_eq!(walker.next_axis(), DVec3::Z);
        assert_eq!(walker.next_axis(), DVec3::X);
    }

    #[test]
    fn from_path_centers() {
        let walker = Walker::from_path(&[IVec3::new(1, 64, -2)]);
        assert_eq!(walker.target(), Some(DVec3::new(1.5, 64.0, -1.5)));
    }

    #[test]
    fn walk_clamped() {

        let mut body = Body::default();
        let mut walker = Walker::new([DVec3::new(2.0, 0.0, 0.0)]);

        // Speed 10 for 0.1 second is one block.
        assert_eq!(walker.tick(Some(&mut body), 0.1), WalkStatus::Moving);
        assert!((body.pos - DVec3::X).length() < 1e-9);
        assert_eq!(body.look, Some(DVec3::new(2.0, 0.0, 0.0)));

        assert_eq!(walker.tick(Some(&mut body), 0.1), WalkStatus::Moving);
        assert!((body.pos - DVec3::new(2.0, 0.0, 0.0)).length() < 1e-9);

        assert_eq!(walker.tick(Some(&mut body), 0.1), WalkStatus::Arrived);
        assert!(walker.is_finished());
        assert_eq!(body.moves, 2);

    }

    #[test]
    fn walk_waypoints() {

        let mut body = Body::default();
        let mut walker = Walker::new([DVec3::new(0.1, 0.0, 0.0), DVec3::new(0.0, 0.0, 1.0)]);

        // First waypoint is within tolerance, walk directly to the second one.
        assert_eq!(walker.tick(Some(&mut body), 1.0), WalkStatus::Moving);
        assert_eq!(walker.remaining(), 1);
        assert!((body.pos - DVec3::Z).length() < 1e-9);

        assert_eq!(walker.tick(Some(&mut body), 1.0), WalkStatus::Arrived);

    }

    #[test]
    fn bumped_slides_along_axes() {

        let mut body = Body { bumped: true, ..Default::default() };
        let mut walker = Walker::new([DVec3::new(1.0, 1.0, 1.0)]).with_speed(100.0);

        walker.tick(Some(&mut body), 1.0);
        assert!((body.pos - DVec3::new(3.0, 0.0, 0.0)).length() < 1e-9);

        // Now Y axis, the remaining delta is (-2, 1, 1).
        walker.tick(Some(&mut body), 1.0);
        assert!((body.pos - DVec3::new(3.0, 3.0, 0.0)).length() < 1e-9);

        walker.tick(Some(&mut body), 1.0);
        assert!((body.pos - DVec3::new(3.0, 3.0, 3.0)).length() < 1e-9);

    }

    #[test]
    fn tolerance() {
        let mut body = Body::default();
        let mut walker = Walker::new([DVec3::new(0.5, 0.0, 0.0)]).with_tolerance(1.0);
        assert_eq!(walker.tick(Some(&mut body), 0.05), WalkStatus::Arrived);
        assert_eq!(body.moves, 0);
    }

}
