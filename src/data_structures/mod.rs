//! Engine data structures: scene graph, drawables, textures and GPU constant blocks.
//!
//! - `scene_graph` holds the node tree and its traversals
//! - `transform` is the local/world transform of a node
//! - `geometry` and `mesh` describe what a node draws
//! - `vertex` and `uniforms` are the byte layouts shared with the shaders
//! - `texture` wraps GPU textures and render targets

pub mod geometry;
pub mod mesh;
pub mod scene_graph;
pub mod texture;
pub mod transform;
pub mod uniforms;
pub mod vertex;
