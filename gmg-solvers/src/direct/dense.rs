//! Dense solves of small distributed operators
//!
//! The operator is sampled column by column with unit vectors and the resulting matrix
//! is LU-factored once. All patches must live on one rank; the other ranks of the group
//! hold no cells and have nothing to solve.

use super::lu::{lu_factorize, LuFactorization};
use domain::{Error, LinearOperator, Result, Vector};
use ndarray::{Array1, Array2};

/// Assemble the matrix of `operator` over the local interior cells of `template`.
///
/// Column `j` is `A e_j`, with cells ordered like [`Vector::interior_values`]. The
/// operator is applied on this rank alone, so it must not need data from other ranks.
pub fn assemble_dense<const D: usize, A>(operator: &A, template: &Vector<D>) -> Result<Array2<f64>>
where
    A: LinearOperator<D> + ?Sized,
{
    let n = template.num_local_cells();
    let mut matrix = Array2::zeros((n, n));
    let mut unit = template.zeros_like();
    let mut column = template.zeros_like();
    let mut values = vec![0.0; n];
    for j in 0..n {
        values[j] = 1.0;
        unit.set_with_ghost(0.0);
        unit.set_interior_values(&values)?;
        operator.apply(&unit, &mut column)?;
        for (i, value) in column.interior_values().into_iter().enumerate() {
            matrix[[i, j]] = value;
        }
        values[j] = 0.0;
    }
    Ok(matrix)
}

/// LU-factored operator of a level held by a single rank
#[derive(Debug, Clone)]
pub struct DenseSolver {
    factors: Option<LuFactorization>,
}

impl DenseSolver {
    /// Sample and factor `operator` (collective).
    ///
    /// Fails with a configuration error when the cells are spread over several ranks
    /// and with a solver breakdown when the matrix is singular.
    pub fn new<const D: usize, A>(operator: &A, template: &Vector<D>) -> Result<Self>
    where
        A: LinearOperator<D> + ?Sized,
    {
        let local = template.num_local_cells();
        let global = template.comm().all_reduce_sum(local as f64)? as usize;
        if local != 0 && local != global {
            return Err(Error::config(format!(
                "dense solves need every cell on one rank, rank {} holds {local} of {global}",
                template.comm().rank()
            )));
        }
        if local == 0 {
            return Ok(Self { factors: None });
        }

        let matrix = assemble_dense(operator, template)?;
        let factors =
            lu_factorize(&matrix).map_err(|e| Error::breakdown("LU", e.to_string()))?;
        log::info!("factored a dense {local} x {local} operator");
        Ok(Self {
            factors: Some(factors),
        })
    }

    /// Number of unknowns held by this rank
    pub fn size(&self) -> usize {
        self.factors.as_ref().map_or(0, |f| f.n)
    }

    /// Solve `A x = b`, overwriting the interior of `x`
    pub fn solve<const D: usize>(&self, b: &Vector<D>, x: &mut Vector<D>) -> Result<()> {
        b.check_compatible(x)?;
        let Some(factors) = &self.factors else {
            return Ok(());
        };
        let rhs = Array1::from_vec(b.interior_values());
        let solution = factors
            .solve(&rhs)
            .map_err(|e| Error::breakdown("LU", e.to_string()))?;
        x.set_interior_values(&solution.to_vec())
    }
}
