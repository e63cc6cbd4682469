use crate::error::{Error, Result};
use crate::features::descriptor::Descriptor;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Correspondence between a source and a reference descriptor
#[derive(Debug, Clone)]
pub struct DescriptorMatch {
    pub src_idx: usize,
    pub ref_idx: usize,
    pub distance: f32,
}

impl DescriptorMatch {
    #[must_use]
    pub fn new(src_idx: usize, ref_idx: usize, distance: f32) -> Self {
        Self {
            src_idx,
            ref_idx,
            distance,
        }
    }
}

/// Ratio-test nearest-neighbor matcher with optional forward/backward
/// cross-check
pub struct Matcher {
    pub nn_thresh: f32,
    pub cross_check: bool,
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            nn_thresh: 0.8,
            cross_check: true,
        }
    }
}

impl Matcher {
    #[must_use]
    pub fn new(nn_thresh: f32, cross_check: bool) -> Self {
        Self {
            nn_thresh,
            cross_check,
        }
    }

    /// For each source descriptor, the matched reference index or None.
    ///
    /// Zero matches is not an error; the result is simply all-None.
    pub fn match_indices(
        &self,
        src: &[Descriptor],
        reference: &[Descriptor],
    ) -> Result<Vec<Option<usize>>> {
        if src.is_empty() || reference.is_empty() {
            return Ok(vec![None; src.len()]);
        }
        check_uniform_length(src, reference)?;

        let mut forward = ratio_pass(src, reference, self.nn_thresh);

        if self.cross_check {
            let backward = ratio_pass(reference, src, self.nn_thresh);
            for (i, entry) in forward.iter_mut().enumerate() {
                if let Some((j, _)) = *entry {
                    if backward[j].map(|(back, _)| back) != Some(i) {
                        *entry = None;
                    }
                }
            }
        }

        Ok(forward.into_iter().map(|m| m.map(|(j, _)| j)).collect())
    }

    /// Accepted correspondences with their descriptor distances
    pub fn matches(
        &self,
        src: &[Descriptor],
        reference: &[Descriptor],
    ) -> Result<Vec<DescriptorMatch>> {
        if src.is_empty() || reference.is_empty() {
            return Ok(Vec::new());
        }
        check_uniform_length(src, reference)?;

        let mut forward = ratio_pass(src, reference, self.nn_thresh);

        if self.cross_check {
            let backward = ratio_pass(reference, src, self.nn_thresh);
            for (i, entry) in forward.iter_mut().enumerate() {
                if let Some((j, _)) = *entry {
                    if backward[j].map(|(back, _)| back) != Some(i) {
                        *entry = None;
                    }
                }
            }
        }

        Ok(forward
            .into_iter()
            .enumerate()
            .filter_map(|(i, m)| m.map(|(j, dist)| DescriptorMatch::new(i, j, dist)))
            .collect())
    }
}

/// Lowe ratio test: accept the nearest neighbor iff `d1 < thresh · d2`
fn ratio_pass(
    queries: &[Descriptor],
    train: &[Descriptor],
    thresh: f32,
) -> Vec<Option<(usize, f32)>> {
    let match_one = |q: &Descriptor| -> Option<(usize, f32)> {
        let mut best = f32::MAX;
        let mut second = f32::MAX;
        let mut best_idx = 0;

        for (idx, t) in train.iter().enumerate() {
            let dist = euclidean(&q.hist, &t.hist);
            if dist < best {
                second = best;
                best = dist;
                best_idx = idx;
            } else if dist < second {
                second = dist;
            }
        }

        // With a single candidate there is no second distance to test against
        if second == f32::MAX || best < thresh * second {
            Some((best_idx, best))
        } else {
            None
        }
    };

    #[cfg(feature = "rayon")]
    {
        queries.par_iter().map(match_one).collect()
    }
    #[cfg(not(feature = "rayon"))]
    {
        queries.iter().map(match_one).collect()
    }
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = f64::from(*x) - f64::from(*y);
            diff * diff
        })
        .sum();
    sum.sqrt() as f32
}

fn check_uniform_length(src: &[Descriptor], reference: &[Descriptor]) -> Result<()> {
    let len = src[0].hist.len();
    if src
        .iter()
        .chain(reference.iter())
        .any(|d| d.hist.len() != len)
    {
        return Err(Error::InvalidParameter(
            "Descriptors must share one histogram length".to_string(),
        ));
    }
    Ok(())
}
