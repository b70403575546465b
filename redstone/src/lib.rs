//! Protocol core of a beta-era voxel game client: packet codec, window tracking and
//! path finding.

pub mod registry;
pub mod io;

pub mod item;
pub mod proto;

pub mod spot;
pub mod window;
pub mod tracker;

pub mod path;
