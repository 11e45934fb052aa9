/// Sparse matrices and iterative solvers
pub mod sparse;
pub use sparse::{CsrMatrix, SolveReport, SymmetricOperator};
