//! Fixed-point electrical quantities.
//!
//! Every value is held as an integer count of thousandths, which is the precision the supply
//! uses on the wire. [`Voltage`], [`Current`], [`Resistance`] and [`Power`] only implement the
//! operators that make physical sense, so `Voltage * Current` yields [`Power`] while
//! `Voltage * Power` does not compile. [`Quantity`] is the dynamic form of the same algebra:
//! it carries a [`Dimension`] tag and checks every operation against a dispatch table at
//! runtime, failing with a [`DimensionError`] instead.

use core::{
    cmp::Ordering,
    fmt,
    ops::{Add, Div, Mul, Sub},
    str::FromStr,
};

use strum_macros::{Display, EnumIter};

use crate::error::{DimensionError, ParseError, UnitError};

/// Thousandths per unit.
const SCALE: i64 = 1000;

/// The physical dimension of a [`Quantity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display)]
pub enum Dimension {
    Voltage,
    Current,
    Resistance,
    Power,
}

impl Dimension {
    /// Unit symbol used when rendering and accepted as a suffix when parsing.
    pub const fn symbol(self) -> &'static str {
        match self {
            Dimension::Voltage => "V",
            Dimension::Current => "A",
            Dimension::Resistance => "Ω",
            Dimension::Power => "W",
        }
    }

    /// Dimension of `self × rhs`, if the product is defined.
    pub const fn product(self, rhs: Dimension) -> Option<Dimension> {
        use Dimension as D;
        match (self, rhs) {
            (D::Voltage, D::Current) | (D::Current, D::Voltage) => Some(D::Power),
            (D::Resistance, D::Current) | (D::Current, D::Resistance) => Some(D::Voltage),
            _ => None,
        }
    }

    /// Dimension of `self / rhs`, if the quotient is defined.
    pub const fn quotient(self, rhs: Dimension) -> Option<Dimension> {
        use Dimension as D;
        match (self, rhs) {
            (D::Power, D::Voltage) => Some(D::Current),
            (D::Power, D::Current) => Some(D::Voltage),
            (D::Voltage, D::Current) => Some(D::Resistance),
            (D::Voltage, D::Resistance) => Some(D::Current),
            _ => None,
        }
    }
}

/// Arithmetic or comparison attempted between two quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Operation {
    #[strum(serialize = "add")]
    Add,
    #[strum(serialize = "subtract")]
    Subtract,
    #[strum(serialize = "multiply")]
    Multiply,
    #[strum(serialize = "divide")]
    Divide,
    #[strum(serialize = "compare")]
    Compare,
}

/// Divide and round half away from zero, saturating at the `i64` range.
fn div_round(numerator: i128, denominator: i128) -> i64 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    let rounded = if remainder != 0 && 2 * remainder.abs() >= denominator.abs() {
        if (numerator < 0) != (denominator < 0) {
            quotient - 1
        } else {
            quotient + 1
        }
    } else {
        quotient
    };
    rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

fn mul_milli(lhs: i64, rhs: i64) -> i64 {
    div_round(lhs as i128 * rhs as i128, SCALE as i128)
}

fn div_milli(lhs: i64, rhs: i64) -> i64 {
    div_round(lhs as i128 * SCALE as i128, rhs as i128)
}

fn milli_from_f64(value: f64) -> i64 {
    // `as` saturates, and maps NaN to zero.
    (value * SCALE as f64).round() as i64
}

fn write_milli(f: &mut fmt::Formatter<'_>, milli: i64) -> fmt::Result {
    let sign = if milli < 0 { "-" } else { "" };
    let magnitude = milli.unsigned_abs();
    write!(
        f,
        "{sign}{}.{:03}",
        magnitude / SCALE as u64,
        magnitude % SCALE as u64
    )
}

fn parse_milli(dimension: Dimension, text: &str) -> Result<i64, ParseError> {
    let trimmed = text.trim();
    let number = trimmed
        .strip_suffix(dimension.symbol())
        .unwrap_or(trimmed)
        .trim();
    match number.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(milli_from_f64(value)),
        _ => Err(ParseError::Number {
            dimension,
            text: text.into(),
        }),
    }
}

/// A value tagged with its dimension at runtime.
///
/// Comparison between dimensions is fallible, see [`Quantity::try_cmp`].
#[derive(Debug, Clone, Copy)]
pub struct Quantity {
    dimension: Dimension,
    milli: i64,
}

impl Quantity {
    /// Create a quantity, rounding `value` to 3 decimal places.
    pub fn new(dimension: Dimension, value: f64) -> Self {
        Self::from_milli(dimension, milli_from_f64(value))
    }

    pub const fn from_milli(dimension: Dimension, milli: i64) -> Self {
        Self { dimension, milli }
    }

    /// Parse a device response such as `12.000V`.
    pub fn parse(dimension: Dimension, text: &str) -> Result<Self, ParseError> {
        Ok(Self::from_milli(dimension, parse_milli(dimension, text)?))
    }

    pub const fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub const fn as_milli(&self) -> i64 {
        self.milli
    }

    pub fn value(&self) -> f64 {
        self.milli as f64 / SCALE as f64
    }

    fn same_dimension(&self, rhs: &Quantity, operation: Operation) -> Result<(), DimensionError> {
        if self.dimension == rhs.dimension {
            Ok(())
        } else {
            Err(DimensionError {
                operation,
                lhs: self.dimension,
                rhs: rhs.dimension,
            })
        }
    }

    pub fn checked_add(self, rhs: Quantity) -> Result<Quantity, DimensionError> {
        self.same_dimension(&rhs, Operation::Add)?;
        Ok(Self::from_milli(
            self.dimension,
            self.milli.saturating_add(rhs.milli),
        ))
    }

    pub fn checked_sub(self, rhs: Quantity) -> Result<Quantity, DimensionError> {
        self.same_dimension(&rhs, Operation::Subtract)?;
        Ok(Self::from_milli(
            self.dimension,
            self.milli.saturating_sub(rhs.milli),
        ))
    }

    /// Multiply by another quantity, per the dimension table.
    pub fn checked_mul(self, rhs: Quantity) -> Result<Quantity, DimensionError> {
        let dimension = self
            .dimension
            .product(rhs.dimension)
            .ok_or(DimensionError {
                operation: Operation::Multiply,
                lhs: self.dimension,
                rhs: rhs.dimension,
            })?;
        Ok(Self::from_milli(dimension, mul_milli(self.milli, rhs.milli)))
    }

    /// Divide by another quantity, per the dimension table.
    pub fn checked_div(self, rhs: Quantity) -> Result<Quantity, UnitError> {
        let dimension = self
            .dimension
            .quotient(rhs.dimension)
            .ok_or(DimensionError {
                operation: Operation::Divide,
                lhs: self.dimension,
                rhs: rhs.dimension,
            })?;
        if rhs.milli == 0 {
            return Err(UnitError::DivideByZero(self.dimension));
        }
        Ok(Self::from_milli(dimension, div_milli(self.milli, rhs.milli)))
    }

    pub fn scale(self, factor: f64) -> Quantity {
        Self::from_milli(
            self.dimension,
            (self.milli as f64 * factor).round() as i64,
        )
    }

    pub fn try_cmp(&self, rhs: &Quantity) -> Result<Ordering, DimensionError> {
        self.same_dimension(rhs, Operation::Compare)?;
        Ok(self.milli.cmp(&rhs.milli))
    }

    pub fn try_eq(&self, rhs: &Quantity) -> Result<bool, DimensionError> {
        Ok(self.try_cmp(rhs)? == Ordering::Equal)
    }

    /// Compare against a bare number after rounding it to 3 decimal places.
    pub fn cmp_value(&self, value: f64) -> Ordering {
        self.milli.cmp(&milli_from_f64(value))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_milli(f, self.milli)
    }
}

macro_rules! typed_quantity {
    ($(#[$meta:meta])* $name:ident, $dimension:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(i64);

        impl $name {
            pub const ZERO: Self = Self(0);

            /// Create a value, rounding to 3 decimal places.
            pub fn new(value: f64) -> Self {
                Self(milli_from_f64(value))
            }

            pub const fn from_milli(milli: i64) -> Self {
                Self(milli)
            }

            pub const fn as_milli(self) -> i64 {
                self.0
            }

            pub fn value(self) -> f64 {
                self.0 as f64 / SCALE as f64
            }

            pub const fn is_negative(self) -> bool {
                self.0 < 0
            }

            /// Cross-dimension division, `None` for a zero divisor.
            pub fn checked_div<R>(self, rhs: R) -> Option<<Self as Div<R>>::Output>
            where
                Self: Div<R>,
                R: Into<Quantity> + Copy,
            {
                (rhs.into().as_milli() != 0).then(|| self / rhs)
            }
        }

        impl Add for $name {
            type Output = Self;
            fn add(self, rhs: Self) -> Self {
                Self(self.0.saturating_add(rhs.0))
            }
        }

        impl Sub for $name {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self {
                Self(self.0.saturating_sub(rhs.0))
            }
        }

        impl Mul<f64> for $name {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self {
                Self((self.0 as f64 * rhs).round() as i64)
            }
        }

        impl Div<f64> for $name {
            type Output = Self;
            fn div(self, rhs: f64) -> Self {
                Self((self.0 as f64 / rhs).round() as i64)
            }
        }

        impl PartialEq<f64> for $name {
            fn eq(&self, other: &f64) -> bool {
                self.0 == milli_from_f64(*other)
            }
        }

        impl PartialOrd<f64> for $name {
            fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
                Some(self.0.cmp(&milli_from_f64(*other)))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write_milli(f, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_milli(Dimension::$dimension, s).map(Self)
            }
        }

        impl From<$name> for Quantity {
            fn from(value: $name) -> Self {
                Quantity::from_milli(Dimension::$dimension, value.0)
            }
        }

        impl TryFrom<Quantity> for $name {
            type Error = DimensionError;
            fn try_from(value: Quantity) -> Result<Self, Self::Error> {
                if value.dimension == Dimension::$dimension {
                    Ok(Self(value.milli))
                } else {
                    Err(DimensionError {
                        operation: Operation::Compare,
                        lhs: Dimension::$dimension,
                        rhs: value.dimension,
                    })
                }
            }
        }
    };
}

typed_quantity!(
    /// Electric potential in volts.
    Voltage,
    Voltage
);
typed_quantity!(
    /// Electric current in amps.
    Current,
    Current
);
typed_quantity!(
    /// Resistance in ohms.
    Resistance,
    Resistance
);
typed_quantity!(
    /// Power in watts.
    Power,
    Power
);

/// Typed cross-dimension operators. Division by a zero quantity panics, like integer division;
/// use `checked_div` where the divisor can be zero.
macro_rules! cross_op {
    ($lhs:ident * $rhs:ident = $out:ident) => {
        impl Mul<$rhs> for $lhs {
            type Output = $out;
            fn mul(self, rhs: $rhs) -> $out {
                $out(mul_milli(self.0, rhs.0))
            }
        }
    };
    ($lhs:ident / $rhs:ident = $out:ident) => {
        impl Div<$rhs> for $lhs {
            type Output = $out;
            fn div(self, rhs: $rhs) -> $out {
                $out(div_milli(self.0, rhs.0))
            }
        }
    };
}

cross_op!(Voltage * Current = Power);
cross_op!(Current * Voltage = Power);
cross_op!(Resistance * Current = Voltage);
cross_op!(Current * Resistance = Voltage);
cross_op!(Power / Voltage = Current);
cross_op!(Power / Current = Voltage);
cross_op!(Voltage / Current = Resistance);
cross_op!(Voltage / Resistance = Current);
