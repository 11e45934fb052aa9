/// Arena triangle mesh with logical removal
pub mod halfedge_mesh3d;
/// Mesh operations
pub mod mesh_operations;
pub use halfedge_mesh3d::HalfedgeMesh3D;
