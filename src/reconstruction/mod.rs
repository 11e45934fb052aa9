/// Level set polygonization
pub mod isosurface;
/// Sparse octree and node fields
pub mod octree;
/// Poisson surface reconstruction
pub mod poisson;
pub use poisson::{poisson_mesh, poisson_mesh_with_params, PoissonReport};
