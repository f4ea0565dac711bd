//! Durable point buffer
//!
//! Holds samples between recording and upload, with a disk mirror so a
//! killed process replays its pending points on the next boot.

mod point_buffer;

pub use point_buffer::PointBuffer;
