/// Original vertex to skeleton node correspondence
pub mod correspondence;
/// Skeleton structure
pub mod skeleton3d;
pub use correspondence::CorrespondenceTracker;
pub use skeleton3d::Skeleton3D;
