use nalgebra::RealField;

pub use nalgebra;

/// Scalar type used throughout `isofem`.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// Converts an `f64` constant into the scalar type `T`.
pub fn real<T: Real>(value: f64) -> T {
    nalgebra::convert(value)
}

/// Converts a count into the scalar type `T`.
pub fn real_from_usize<T: Real>(value: usize) -> T {
    nalgebra::convert(value as f64)
}
