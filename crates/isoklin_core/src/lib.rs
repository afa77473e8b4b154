pub mod equation_engine;
pub mod error;
pub mod field;
pub mod implicit;
pub mod isocline;
pub mod plot;
pub mod sink;
pub mod slope;
pub mod symbolic;
/// The `isoklin_core` crate computes slope fields of first-order ODEs.
///
/// Key components:
/// - **Equation Engine**: parser, bytecode compiler and a stack VM that also runs column-wise over arrays.
/// - **Implicit**: solves `F(x, y, dy) = 0` for `dy` symbolically, with an explicit root policy.
/// - **Field**: grid sampling, unit direction vectors, hue coloring and isocline levels.
/// - **Isocline**: marching-squares contours of the slope ratio at each level.
/// - **Sink**: the `FieldSink` trait renderers implement, plus a serializable snapshot.
pub mod traits;

pub use error::{IsoklinError, IsoklinResult};
