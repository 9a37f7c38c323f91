use serde::{Deserialize, Serialize};

/// A log score in natural log units.
#[derive(Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Nats(pub f32);

/// A log score in log2 units.
#[derive(Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Bits(pub f32);

impl Nats {
    pub fn value(&self) -> f32 {
        self.0
    }

    pub fn to_bits(self) -> Bits {
        Bits(self.0 / std::f32::consts::LN_2)
    }
}

impl Bits {
    pub fn value(&self) -> f32 {
        self.0
    }

    pub fn to_nats(self) -> Nats {
        Nats(self.0 * std::f32::consts::LN_2)
    }
}

/// Arithmetic on a log score unit: with its own unit directly,
/// and with the other unit after converting it.
macro_rules! impl_log_units {
    ($unit:ident, $other:ident, $convert:ident) => {
        impl std::fmt::Debug for $unit {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($unit), self.0)
            }
        }

        impl std::ops::Add for $unit {
            type Output = $unit;

            fn add(self, rhs: Self) -> Self::Output {
                $unit(self.0 + rhs.0)
            }
        }

        impl std::ops::Sub for $unit {
            type Output = $unit;

            fn sub(self, rhs: Self) -> Self::Output {
                $unit(self.0 - rhs.0)
            }
        }

        impl std::ops::Add<$other> for $unit {
            type Output = $unit;

            fn add(self, rhs: $other) -> Self::Output {
                self + rhs.$convert()
            }
        }

        impl std::ops::Sub<$other> for $unit {
            type Output = $unit;

            fn sub(self, rhs: $other) -> Self::Output {
                self - rhs.$convert()
            }
        }
    };
}

impl_log_units!(Nats, Bits, to_nats);
impl_log_units!(Bits, Nats, to_bits);

/// The score of a target of this length under the single-state null model.
pub fn null_one_score(target_length: usize) -> Nats {
    let p1 = (target_length as f32) / (target_length as f32 + 1.0);
    Nats(target_length as f32 * p1.ln() + (1.0 - p1).ln())
}

/// The log-odds score of a raw path score against the null model, in bits.
pub fn bit_score(raw_score: Nats, target_length: usize) -> Bits {
    (raw_score - null_one_score(target_length)).to_bits()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mixed_unit_ops() {
        assert_eq!((Nats(20.0) - Nats(10.0)).value(), 10.0);
        assert_eq!((Bits(1.5) + Bits(0.5)).value(), 2.0);
        assert!(((Bits(1.0) + Nats(std::f32::consts::LN_2)).value() - 2.0).abs() < 1e-6);
        assert_eq!(format!("{:?}", Nats(0.5)), "Nats(0.5)");
    }

    #[test]
    fn test_nats_bits_conversion() -> anyhow::Result<()> {
        let tolerance = 1e-6;
        let nats = Nats(10.0f32.ln());
        let bits = Bits(10.0f32.log2());

        assert!((nats.value() - bits.to_nats().value()).abs() < tolerance);
        assert!((bits.value() - nats.to_bits().value()).abs() < tolerance);
        Ok(())
    }

    #[test]
    fn test_bit_score() -> anyhow::Result<()> {
        let null = null_one_score(100);
        assert!(null.value() < 0.0);
        assert!(bit_score(null, 100).value().abs() < 1e-6);

        let score = bit_score(null + Bits(3.0), 100);
        assert!((score.value() - 3.0).abs() < 1e-4);
        Ok(())
    }
}
