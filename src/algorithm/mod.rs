/// Curvature flow contraction
pub mod contraction_alg;
/// Skeleton extraction and skeletonization operations
pub mod skeleton_alg;
