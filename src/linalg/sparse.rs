//! Sparse matrix and preconditioned conjugate gradient.
//!
//! Geometry code only hands a sparse system to this module and gets a
//! coefficient vector back; the solver itself knows nothing about meshes or
//! octrees.

use nalgebra::DVector;

use crate::error::{Result, SkelError};

/// Compressed sparse row matrix
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    // row_ptr[i]..row_ptr[i + 1] spans the entries of row i
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Builds a matrix from (row, col, value) triplets, summing duplicates
    pub fn from_triplets(rows: usize, cols: usize, mut triplets: Vec<(usize, usize, f64)>) -> Self {
        triplets.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_idx: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());
        let mut prev = None;

        for (row, col, val) in triplets {
            if prev == Some((row, col)) {
                if let Some(last) = values.last_mut() {
                    *last += val;
                }
            } else {
                col_idx.push(col);
                values.push(val);
                row_ptr[row + 1] += 1;
                prev = Some((row, col));
            }
        }
        for row in 0..rows {
            row_ptr[row + 1] += row_ptr[row];
        }

        Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Number of rows
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Entries of a row as (column, value)
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let span = self.row_ptr[row]..self.row_ptr[row + 1];
        self.col_idx[span.clone()]
            .iter()
            .copied()
            .zip(self.values[span].iter().copied())
    }

    /// y = A * x
    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut y = DVector::zeros(self.rows);
        for row in 0..self.rows {
            y[row] = self.row(row).map(|(col, val)| val * x[col]).sum();
        }
        y
    }

    /// y = A^T * x
    pub fn transpose_mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut y = DVector::zeros(self.cols);
        for row in 0..self.rows {
            for (col, val) in self.row(row) {
                y[col] += val * x[row];
            }
        }
        y
    }

    /// Diagonal of A^T * A (squared column norms)
    pub fn gram_diagonal(&self) -> DVector<f64> {
        let mut diag = DVector::zeros(self.cols);
        for (&col, &val) in self.col_idx.iter().zip(self.values.iter()) {
            diag[col] += val * val;
        }
        diag
    }
}

/// Symmetric positive definite operator, the input of the conjugate gradient
pub trait SymmetricOperator {
    /// Size of the (square) operator
    fn dim(&self) -> usize;

    /// Computes A * x
    fn apply(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Diagonal of A, used as Jacobi preconditioner
    fn diagonal(&self) -> DVector<f64>;
}

impl SymmetricOperator for CsrMatrix {
    fn dim(&self) -> usize {
        self.rows
    }

    fn apply(&self, x: &DVector<f64>) -> DVector<f64> {
        self.mul_vec(x)
    }

    fn diagonal(&self) -> DVector<f64> {
        let mut diag = DVector::zeros(self.rows);
        for row in 0..self.rows {
            diag[row] = self
                .row(row)
                .filter(|&(col, _)| col == row)
                .map(|(_, val)| val)
                .sum();
        }
        diag
    }
}

/// Normal equations of `min |w S x|^2 + sum_i h_i^2 (x_i - t_i)^2`
///
/// The operator is `w^2 S^T S + diag(h^2)`, positive definite as soon as every
/// anchor weight `h_i` is positive.
pub struct AnchoredLeastSquares<'a> {
    system: &'a CsrMatrix,
    system_weight: f64,
    anchor_weights: &'a DVector<f64>,
}

impl<'a> AnchoredLeastSquares<'a> {
    /// Wraps system matrix `S`, its weight `w` and anchor weights `h`
    pub fn new(
        system: &'a CsrMatrix,
        system_weight: f64,
        anchor_weights: &'a DVector<f64>,
    ) -> AnchoredLeastSquares<'a> {
        AnchoredLeastSquares {
            system,
            system_weight,
            anchor_weights,
        }
    }

    /// Right hand side `diag(h^2) t` for anchor targets `t`
    pub fn rhs(&self, targets: &DVector<f64>) -> DVector<f64> {
        self.anchor_weights
            .zip_map(targets, |weight, target| weight * weight * target)
    }
}

impl<'a> SymmetricOperator for AnchoredLeastSquares<'a> {
    fn dim(&self) -> usize {
        self.system.ncols()
    }

    fn apply(&self, x: &DVector<f64>) -> DVector<f64> {
        let sx = self.system.mul_vec(x);
        let stsx = self.system.transpose_mul_vec(&sx);
        let w2 = self.system_weight * self.system_weight;
        stsx * w2 + self.anchor_weights.zip_map(x, |weight, val| weight * weight * val)
    }

    fn diagonal(&self) -> DVector<f64> {
        let w2 = self.system_weight * self.system_weight;
        self.system.gram_diagonal() * w2 + self.anchor_weights.map(|weight| weight * weight)
    }
}

/// Outcome of an iterative solve
#[derive(Debug, Clone, Copy)]
pub struct SolveReport {
    /// Iterations performed
    pub iterations: usize,
    /// Final |b - A x| / |b|
    pub relative_residual: f64,
    /// Whether the tolerance was reached
    pub converged: bool,
}

/// Solves A x = b with Jacobi preconditioned conjugate gradient
///
/// Reaching `max_iter` is not an error: the last iterate is returned with
/// `converged == false`, since CG iterates only improve on `x0` in energy
/// norm. Breakdown (non positive curvature, non finite values) is an error.
pub fn conjugate_gradient<A: SymmetricOperator>(
    a: &A,
    b: &DVector<f64>,
    x0: Option<&DVector<f64>>,
    max_iter: usize,
    tolerance: f64,
) -> Result<(DVector<f64>, SolveReport)> {
    let n = a.dim();
    if b.len() != n {
        return Err(SkelError::NumericInstability(format!(
            "conjugate_gradient(): rhs of size {} for operator of size {}",
            b.len(),
            n
        )));
    }

    let b_norm = b.norm();
    if !b_norm.is_finite() {
        return Err(SkelError::NumericInstability(
            "conjugate_gradient(): non finite right hand side".to_string(),
        ));
    }
    if b_norm == 0.0 {
        return Ok((
            DVector::zeros(n),
            SolveReport {
                iterations: 0,
                relative_residual: 0.0,
                converged: true,
            },
        ));
    }

    let inv_diag = a
        .diagonal()
        .map(|val| if val > 0.0 && val.is_finite() { 1.0 / val } else { 1.0 });

    let mut x = match x0 {
        Some(x0) => x0.clone(),
        None => DVector::zeros(n),
    };
    let mut r = b - a.apply(&x);
    let mut relative_residual = r.norm() / b_norm;
    if !relative_residual.is_finite() {
        return Err(SkelError::NumericInstability(
            "conjugate_gradient(): non finite initial residual".to_string(),
        ));
    }
    if relative_residual < tolerance {
        return Ok((
            x,
            SolveReport {
                iterations: 0,
                relative_residual,
                converged: true,
            },
        ));
    }

    let mut z = r.component_mul(&inv_diag);
    let mut p = z.clone();
    let mut rz = r.dot(&z);

    for iter in 1..=max_iter {
        let ap = a.apply(&p);
        let p_ap = p.dot(&ap);
        if !(p_ap > 0.0) || !p_ap.is_finite() {
            return Err(SkelError::NumericInstability(format!(
                "conjugate_gradient(): breakdown at iteration {} (p.Ap = {})",
                iter, p_ap
            )));
        }

        let alpha = rz / p_ap;
        x.axpy(alpha, &p, 1.0);
        r.axpy(-alpha, &ap, 1.0);

        relative_residual = r.norm() / b_norm;
        if !relative_residual.is_finite() {
            return Err(SkelError::NumericInstability(format!(
                "conjugate_gradient(): non finite residual at iteration {}",
                iter
            )));
        }
        if relative_residual < tolerance {
            return Ok((
                x,
                SolveReport {
                    iterations: iter,
                    relative_residual,
                    converged: true,
                },
            ));
        }

        z = r.component_mul(&inv_diag);
        let rz_new = r.dot(&z);
        let beta = rz_new / rz;
        rz = rz_new;
        p = &z + &p * beta;
    }

    Ok((
        x,
        SolveReport {
            iterations: max_iter,
            relative_residual,
            converged: false,
        },
    ))
}
