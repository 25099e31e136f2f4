// Manders' overlap coefficients over masked voxel pairs.

use ndarray::ArrayView3;
use num_traits::{AsPrimitive, Zero};

use super::pairs::MaskedPairs;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MandersCoefficients {
    pub m1: Option<f64>,
    pub m2: Option<f64>,
}

impl MandersCoefficients {
    pub fn no_data() -> Self {
        MandersCoefficients { m1: None, m2: None }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MandersResult {
    pub raw: MandersCoefficients,
    pub thresholded: MandersCoefficients,
}

fn ratio(num: f64, denom: f64) -> Option<f64> {
    if denom > 0.0 {
        Some(num / denom)
    } else {
        None
    }
}

/// M1 is the fraction of A's intensity above `floor_a` that coincides with B
/// above `floor_b`; M2 the other way round. A coefficient whose denominator
/// is zero is `None`.
pub fn manders<T>(pairs: &mut MaskedPairs<T>, floor_a: T, floor_b: T) -> MandersCoefficients
where
    T: Copy + PartialOrd + AsPrimitive<f64>,
{
    pairs.restart();

    let mut sum_a = 0.0;
    let mut sum_b = 0.0;
    let mut sum_a_coloc = 0.0;
    let mut sum_b_coloc = 0.0;
    for (a, b) in pairs.by_ref() {
        let above_a = a > floor_a;
        let above_b = b > floor_b;
        if above_a {
            sum_a += a.as_();
        }
        if above_b {
            sum_b += b.as_();
        }
        if above_a && above_b {
            sum_a_coloc += a.as_();
            sum_b_coloc += b.as_();
        }
    }

    MandersCoefficients {
        m1: ratio(sum_a_coloc, sum_a),
        m2: ratio(sum_b_coloc, sum_b),
    }
}

/// Raw and thresholded coefficients for one channel pair. The raw pass uses
/// zero floors; the thresholded pass is "no data" unless both channels have
/// a cutoff.
pub fn colocalize<'a, T>(
    a: ArrayView3<'a, T>,
    b: ArrayView3<'a, T>,
    mask: ArrayView3<'a, bool>,
    cutoffs: (Option<T>, Option<T>),
) -> MandersResult
where
    T: Copy + PartialOrd + Zero + AsPrimitive<f64>,
{
    let mut pairs = MaskedPairs::new(a, b, mask);
    let raw = manders(&mut pairs, T::zero(), T::zero());
    let thresholded = match cutoffs {
        (Some(ta), Some(tb)) => manders(&mut pairs, ta, tb),
        _ => MandersCoefficients::no_data(),
    };

    MandersResult { raw, thresholded }
}
