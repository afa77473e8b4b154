use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars by the equation VM.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A numeric slope function `dy/dx = f(x, y)` evaluated over whole arrays.
pub trait SlopeFunction {
    /// Evaluates the slope elementwise.
    /// x, y: sample coordinates (same length)
    /// out: buffer to write dy/dx into (same length as x)
    fn slopes(&self, x: &[f64], y: &[f64], out: &mut [f64]);
}

/// Wraps a hand-written closed-form slope so it can feed the field evaluator
/// without going through the equation engine.
pub struct ClosureSlope<F>(pub F);

impl<F> SlopeFunction for ClosureSlope<F>
where
    F: Fn(f64, f64) -> f64,
{
    fn slopes(&self, x: &[f64], y: &[f64], out: &mut [f64]) {
        for ((slot, &xi), &yi) in out.iter_mut().zip(x).zip(y) {
            *slot = (self.0)(xi, yi);
        }
    }
}

impl<S: SlopeFunction + ?Sized> SlopeFunction for &S {
    fn slopes(&self, x: &[f64], y: &[f64], out: &mut [f64]) {
        (**self).slopes(x, y, out)
    }
}
