//! Geometry codec for point clouds, implementing the G-PCC
//! (ISO/IEC 23090-9) geometry coding tools: octree occupancy coding with
//! dynamic OBUF contexts, predictive trees with an angular mode, and the
//! TriSoup surface layer, over a shared adaptive binary range coder.
//!
//! The surrounding application owns file formats, attribute coding and
//! the byte-exact header layout; this crate consumes parameter structs
//! and slice payloads and produces point arrays.

pub mod constants;
pub mod decoder;
pub mod encoder;
pub mod entropy;
pub mod error;
pub mod math;
pub mod obuf;
pub mod params;
pub mod point;
pub mod quant;
pub mod slice;

mod motion;
mod octree;
mod predtree;
mod trisoup;

pub use decoder::{DecodedSlice, GeometryDecoder};
pub use encoder::{EncodedSlice, GeometryEncoder};
pub use entropy::*;
pub use error::{Error, Result};
pub use params::{AngularParams, GeomCoder, GeometryParams, MotionParams, TrisoupParams};
pub use point::{RefFrame, Vec3};
pub use slice::SliceHeader;
