//! Per-patch loops with feature-gated implementations
//!
//! With the `parallel` feature the local patches of a rank are processed by rayon;
//! without it the same loops run sequentially. Communication never happens inside
//! these loops.

/// Check if parallel processing is available
#[cfg(feature = "parallel")]
pub fn is_parallel_available() -> bool {
    true
}

/// Check if parallel processing is available
#[cfg(not(feature = "parallel"))]
pub fn is_parallel_available() -> bool {
    false
}

/// Call `f(i, block)` for every `block_len`-sized block of `data`
#[cfg(feature = "parallel")]
pub fn for_each_block_mut<F>(data: &mut [f64], block_len: usize, f: F)
where
    F: Fn(usize, &mut [f64]) + Sync + Send,
{
    use rayon::prelude::*;
    if block_len == 0 {
        return;
    }
    data.par_chunks_mut(block_len)
        .enumerate()
        .for_each(|(i, block)| f(i, block));
}

/// Call `f(i, block)` for every `block_len`-sized block of `data` (sequential fallback)
#[cfg(not(feature = "parallel"))]
pub fn for_each_block_mut<F>(data: &mut [f64], block_len: usize, f: F)
where
    F: Fn(usize, &mut [f64]),
{
    if block_len == 0 {
        return;
    }
    data.chunks_mut(block_len)
        .enumerate()
        .for_each(|(i, block)| f(i, block));
}

/// Sum `f(i)` over `0..count`
#[cfg(feature = "parallel")]
pub fn sum_indexed<F>(count: usize, f: F) -> f64
where
    F: Fn(usize) -> f64 + Sync + Send,
{
    use rayon::prelude::*;
    // collected first so the summation order does not depend on the thread count
    let parts: Vec<f64> = (0..count).into_par_iter().map(f).collect();
    parts.iter().sum()
}

/// Sum `f(i)` over `0..count` (sequential fallback)
#[cfg(not(feature = "parallel"))]
pub fn sum_indexed<F>(count: usize, f: F) -> f64
where
    F: Fn(usize) -> f64,
{
    (0..count).map(f).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_each_block_mut() {
        let mut data = vec![0.0; 6];
        for_each_block_mut(&mut data, 2, |i, block| {
            for v in block.iter_mut() {
                *v = i as f64;
            }
        });
        assert_eq!(data, vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_parallel_availability_follows_the_feature() {
        assert_eq!(is_parallel_available(), cfg!(feature = "parallel"));
    }

    #[test]
    fn test_sum_indexed() {
        assert_eq!(sum_indexed(4, |i| i as f64), 6.0);
    }
}
