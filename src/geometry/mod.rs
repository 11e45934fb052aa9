/// Elementary geometric computations
pub mod geometry_operations;
