//! Floating point operations.
//!
//! See [FloatOps]'s documentation.

/// Adds basic floating point operations.
///
/// All methods are prefixed with `fw_` to avoid conflicting with the Rust standard library.
///
/// These are guaranteed to be accurate to the way the game calculates its floats, at least on SSE.
pub trait FloatOps: Copy {
    /// Calculate the square root of a float.
    #[must_use]
    fn fw_sqrt(self) -> Self;

    /// Calculate the absolute value of the float.
    #[must_use]
    fn fw_fabs(self) -> Self;

    /// Return true if the given value is close to another value.
    #[must_use]
    fn fw_is_close_to(self, to: Self) -> bool;

    /// Return true if the given value is non-NaN and non-infinite.
    #[must_use]
    fn fw_is_finite(self) -> bool;

    /// Return true if the given value is close to 0.0.
    ///
    /// This is a convenience function for `self.fw_is_close_to(0.0)`
    #[must_use]
    fn fw_is_close_to_zero(self) -> bool;
}

impl FloatOps for f32 {
    #[inline]
    fn fw_sqrt(self) -> Self {
        libm::sqrtf(self)
    }
    #[inline]
    fn fw_fabs(self) -> Self {
        libm::fabsf(self)
    }
    #[inline]
    fn fw_is_close_to(self, to: Self) -> bool {
        (self - to).fw_fabs() < 0.0001
    }
    #[inline]
    fn fw_is_finite(self) -> bool {
        self.is_finite()
    }
    #[inline]
    fn fw_is_close_to_zero(self) -> bool {
        self.fw_fabs() < 0.0001
    }
}

impl FloatOps for f64 {
    #[inline]
    fn fw_sqrt(self) -> Self {
        libm::sqrt(self)
    }
    #[inline]
    fn fw_fabs(self) -> Self {
        libm::fabs(self)
    }
    #[inline]
    fn fw_is_close_to(self, to: Self) -> bool {
        (self - to).fw_fabs() < 0.0001
    }
    #[inline]
    fn fw_is_finite(self) -> bool {
        self.is_finite()
    }
    #[inline]
    fn fw_is_close_to_zero(self) -> bool {
        self.fw_fabs() < 0.0001
    }
}
