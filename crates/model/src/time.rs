use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Positive rational playback rate.
///
/// The timeline authority stores its rate as an exact rational so elapsed
/// time can be rescaled without floating-point drift accumulating across
/// ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    /// Unit rate `1/1`.
    pub const ONE: Self = Self { num: 1, den: 1 };

    /// Creates a validated rational.
    ///
    /// # Example
    /// ```
    /// use model::Rational;
    ///
    /// let rate = Rational::new(3, 2).expect("valid");
    /// assert_eq!(rate.num, 3);
    /// ```
    pub fn new(num: i32, den: i32) -> Result<Self> {
        if num <= 0 || den <= 0 {
            return Err(ModelError::InvalidRational { num, den });
        }
        Ok(Self { num, den })
    }

    /// Scales a millisecond span by this rate with nearest rounding.
    ///
    /// `scale_ms(wall_elapsed)` converts wall-clock time into media time.
    pub fn scale_ms(&self, ms: i64) -> i64 {
        mul_div_round(ms, i64::from(self.num), i64::from(self.den))
    }

    /// Inverse of [`Rational::scale_ms`]: converts media time back into a
    /// wall-clock span.
    pub fn unscale_ms(&self, ms: i64) -> i64 {
        mul_div_round(ms, i64::from(self.den), i64::from(self.num))
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::ONE
    }
}

fn mul_div_round(value: i64, num: i64, den: i64) -> i64 {
    let numerator = i128::from(value) * i128::from(num);
    let denominator = i128::from(den);
    let rounded = div_round_nearest(numerator, denominator);
    rounded.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

fn div_round_nearest(num: i128, den: i128) -> i128 {
    debug_assert!(den > 0);

    let abs_num = num.abs();
    let mut out = abs_num / den;
    let remainder = abs_num % den;
    if remainder.saturating_mul(2) >= den {
        out += 1;
    }

    if num < 0 { -out } else { out }
}
