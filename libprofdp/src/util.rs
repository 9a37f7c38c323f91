#[cfg(test)]
#[ctor::ctor]
fn init_backtrace() {
    color_backtrace::install();
}

/// The score of a transition or emission that can never happen.
pub const IMPOSSIBLE: f32 = f32::NEG_INFINITY;

pub trait LogAbuse {
    fn ln_or_inf(self) -> f32;
}

impl LogAbuse for f32 {
    fn ln_or_inf(self) -> f32 {
        if self == 0.0 {
            IMPOSSIBLE
        } else {
            self.ln()
        }
    }
}

/// The exact sum of two values in log space.
///
/// This is the slow path that the reference algorithms are built on: it
/// calls `ln_1p` and `exp` every time instead of reading from a lookup table.
#[inline(always)]
pub fn log_add(a: f32, b: f32) -> f32 {
    debug_assert!(!a.is_nan());
    debug_assert!(!b.is_nan());

    let (max, min) = if a > b { (a, b) } else { (b, a) };

    if min == IMPOSSIBLE {
        max
    } else {
        max + (min - max).exp().ln_1p()
    }
}

#[macro_export]
macro_rules! log_sum {
    // Base case:
    ($x:expr) => ($x);
    // `$x` followed by at least one `$y,`
    ($x:expr, $($y:expr),+) => (
        // Call `log_sum!` on the tail `$y`
        $crate::util::log_add($x, $crate::log_sum!($($y),+))
    )
}

#[macro_export]
macro_rules! max_f32 {
    // Base case:
    ($x:expr) => ($x);
    // `$x` followed by at least one `$y,`
    ($x:expr, $($y:expr),+) => (
        // Call `max_f32!` on the tail `$y`
        f32::max($x, $crate::max_f32!($($y),+))
    )
}

/// Returns the first index of the largest value.
pub fn f32_slice_argmax(values: &[f32]) -> usize {
    let mut argmax: usize = 0;

    for (idx, &value) in values.iter().enumerate().skip(1) {
        if value > values[argmax] {
            argmax = idx;
        }
    }
    argmax
}
