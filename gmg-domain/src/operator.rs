//! Linear operators over distributed fields
//!
//! Solvers, smoothers and multigrid cycles all consume operators through
//! [`LinearOperator`], so a cycle can stand in for a matrix as a preconditioner.

use crate::error::Result;
use crate::vector::Vector;

/// Operator that can be applied to a distributed field.
///
/// `apply` is collective: every rank of the domain must call it together.
pub trait LinearOperator<const D: usize>: Send + Sync {
    /// Apply the operator: y = A * x
    ///
    /// Only interior values of `x` are read; implementations that need ghost values
    /// refresh them on a copy.
    fn apply(&self, x: &Vector<D>, y: &mut Vector<D>) -> Result<()>;
}

/// Identity operator (no preconditioning)
#[derive(Clone, Debug, Default)]
pub struct IdentityOperator;

impl<const D: usize> LinearOperator<D> for IdentityOperator {
    fn apply(&self, x: &Vector<D>, y: &mut Vector<D>) -> Result<()> {
        y.copy_from(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::ThreadComm;
    use crate::vector::PatchLayout;
    use std::sync::Arc;

    #[test]
    fn test_identity_operator() {
        let mut x = Vector::<2>::with_layout(
            Arc::new(ThreadComm::single()),
            PatchLayout::new([2, 2], 1),
            1,
        );
        x.set(4.0);
        let mut y = x.zeros_like();
        IdentityOperator.apply(&x, &mut y).unwrap();
        assert_eq!(y.patch_view(0).get([1, 1]), 4.0);
    }
}
