/// Skeletonization algorithms
pub mod algorithm;
/// Error type
pub mod error;
/// Geometric operations
pub mod geometry;
/// Sparse linear algebra
pub mod linalg;
/// Mesh object and operations
pub mod mesh3d;
/// Tunable parameters
pub mod params;
/// Surface reconstruction from oriented points
pub mod reconstruction;
/// Skeleton object and operations
pub mod skeleton3d;

pub use algorithm::skeleton_alg::{
    skeletonize_mesh, skeletonize_mesh_with_corres, skeletonize_mesh_with_corres_with_params,
    skeletonize_mesh_with_params, skeletonize_pcd, skeletonize_pcd_with_params,
};
pub use error::{Result, SkelError};
pub use params::{ContractionParams, PoissonParams, SkeletonParams};
pub use reconstruction::{poisson_mesh, poisson_mesh_with_params};
