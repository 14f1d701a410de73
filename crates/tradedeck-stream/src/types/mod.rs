/*
[INPUT]:  Stream payload schema definitions and serde requirements
[OUTPUT]: Typed Rust structs/enums with serialization support
[POS]:    Data layer - type definitions for decoded stream frames
[UPDATE]: When payload schema changes or new types added
*/

pub mod enums;
pub mod events;

pub use enums::*;
pub use events::*;
