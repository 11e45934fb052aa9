//! Tunable parameters of contraction, skeleton extraction and reconstruction.
//!
//! Defaults follow the usual mean curvature flow skeletonization settings
//! (edge threshold relative to the bounding box diagonal, doubling Laplacian
//! weight) and screened Poisson reconstruction settings.

/// Parameters of the curvature flow contraction
#[derive(Debug, Clone)]
pub struct ContractionParams {
    /// Hard cap on contraction iterations. Default: 500
    pub max_iterations: usize,

    /// Initial Laplacian (contraction) weight. Default: 1.0
    pub laplacian_weight: f64,

    /// Factor applied to the Laplacian weight after each iteration. Default: 2.0
    pub laplacian_weight_factor: f64,

    /// Upper bound of the Laplacian weight. Default: 2048.0
    pub max_laplacian_weight: f64,

    /// Initial attraction weight, scaled per vertex by `sqrt(A0 / A)`. Default: 1.0
    pub attraction_weight: f64,

    /// Upper bound of the per vertex attraction weight. Default: 1e4
    pub max_attraction_weight: f64,

    /// Edges shorter than this ratio of the bounding diagonal are collapsed. Default: 0.002
    pub min_edge_length_ratio: f64,

    /// Stop once current area / original area falls below this. Default: 1e-6
    pub area_ratio_threshold: f64,

    /// Relative area decrease under which an iteration without merges counts as stalled.
    /// Default: 1e-4
    pub area_variation_factor: f64,

    /// Consecutive stalled iterations before stopping. Default: 10
    pub stall_iterations: usize,

    /// Consecutive iterations with a failed linear solve before giving up. Default: 5
    pub max_consecutive_fallbacks: usize,

    /// Conjugate gradient iteration cap per coordinate solve. Default: 500
    pub solver_max_iterations: usize,

    /// Conjugate gradient relative residual tolerance. Default: 1e-8
    pub solver_tolerance: f64,
}

impl Default for ContractionParams {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            laplacian_weight: 1.0,
            laplacian_weight_factor: 2.0,
            max_laplacian_weight: 2048.0,
            attraction_weight: 1.0,
            max_attraction_weight: 1e4,
            min_edge_length_ratio: 0.002,
            area_ratio_threshold: 1e-6,
            area_variation_factor: 1e-4,
            stall_iterations: 10,
            max_consecutive_fallbacks: 5,
            solver_max_iterations: 500,
            solver_tolerance: 1e-8,
        }
    }
}

impl ContractionParams {
    /// Same defaults with a different iteration cap
    #[must_use]
    pub fn with_max_iterations(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..Default::default()
        }
    }
}

/// Parameters of the whole mesh skeletonization
#[derive(Debug, Clone)]
pub struct SkeletonParams {
    /// Contraction settings
    pub contraction: ContractionParams,

    /// Skeleton vertices closer than this ratio of the bounding diagonal are merged.
    /// Default: 1e-6
    pub merge_tolerance_ratio: f64,
}

impl Default for SkeletonParams {
    fn default() -> Self {
        Self {
            contraction: ContractionParams::default(),
            merge_tolerance_ratio: 1e-6,
        }
    }
}

/// Parameters of the Poisson surface reconstruction
#[derive(Debug, Clone)]
pub struct PoissonParams {
    /// Smallest finest-level depth of the octree. Default: 5
    pub min_depth: usize,

    /// Largest finest-level depth of the octree. Default: 8
    pub max_depth: usize,

    /// Target mean number of samples per occupied finest cell. Default: 2.0
    pub samples_per_node: f64,

    /// Number of levels between the coarsest solved level and the finest one. Default: 3
    pub coarse_depth_offset: usize,

    /// Margin added around the samples, as a ratio of their largest extent. Default: 0.1
    pub padding: f64,

    /// Minimum number of samples. Default: 4
    pub min_samples: usize,

    /// Accepted deviation of normal lengths from one. Default: 1e-2
    pub normal_tolerance: f64,

    /// Conjugate gradient iteration cap per level. Default: 2000
    pub solver_max_iterations: usize,

    /// Conjugate gradient relative residual tolerance. Default: 1e-7
    pub solver_tolerance: f64,
}

impl Default for PoissonParams {
    fn default() -> Self {
        Self {
            min_depth: 5,
            max_depth: 8,
            samples_per_node: 2.0,
            coarse_depth_offset: 3,
            padding: 0.1,
            min_samples: 4,
            normal_tolerance: 1e-2,
            solver_max_iterations: 2000,
            solver_tolerance: 1e-7,
        }
    }
}

impl PoissonParams {
    /// Same defaults with the octree depth pinned to `depth`
    #[must_use]
    pub fn with_depth(depth: usize) -> Self {
        Self {
            min_depth: depth,
            max_depth: depth,
            ..Default::default()
        }
    }
}
