//! Exact decimal numbers as scaled integers: `units / 10^scale`.

use std::cmp::Ordering;
use std::fmt;

const MAX_SCALE: u32 = 28;

#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    units: i128,
    scale: u32,
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

impl Decimal {
    pub fn new(units: i128, scale: u32) -> Self {
        Self { units, scale }
    }

    pub fn from_i64(value: i64) -> Self {
        Self::new(value as i128, 0)
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Parses `"-12.3400"`, `"1e3"` and `"+.5"`. Trailing zeros are kept,
    /// so the scale of the text is the scale of the value.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (mantissa, exponent) = match text.find(['e', 'E']) {
            Some(pos) => (&text[..pos], text[pos + 1..].parse::<i32>().ok()?),
            None => (text, 0),
        };
        let (negative, digits) = match mantissa.as_bytes().first() {
            Some(b'-') => (true, &mantissa[1..]),
            Some(b'+') => (false, &mantissa[1..]),
            _ => (false, mantissa),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        let mut units: i128 = 0;
        for ch in int_part.chars().chain(frac_part.chars()) {
            let digit = ch.to_digit(10)? as i128;
            units = units.checked_mul(10)?.checked_add(digit)?;
        }
        let mut scale = frac_part.len() as i32 - exponent;
        if scale < 0 {
            units = units.checked_mul(pow10((-scale) as u32)?)?;
            scale = 0;
        }
        if negative {
            units = -units;
        }
        Some(Self::new(units, scale as u32).limited())
    }

    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Self::parse(&format!("{value}"))
    }

    pub fn to_f64(&self) -> f64 {
        self.units as f64 / 10f64.powi(self.scale as i32)
    }

    pub fn is_zero(&self) -> bool {
        self.units == 0
    }

    pub fn is_negative(&self) -> bool {
        self.units < 0
    }

    /// Integer part, truncated toward zero.
    pub fn trunc(&self) -> i128 {
        match pow10(self.scale) {
            Some(p) => self.units / p,
            None => 0,
        }
    }

    fn limited(self) -> Self {
        if self.scale <= MAX_SCALE {
            return self;
        }
        self.round_dp(MAX_SCALE)
    }

    fn rescaled(&self, scale: u32) -> Option<i128> {
        if scale < self.scale {
            return None;
        }
        self.units.checked_mul(pow10(scale - self.scale)?)
    }

    fn aligned(a: &Decimal, b: &Decimal) -> Option<(i128, i128, u32)> {
        let scale = a.scale.max(b.scale);
        Some((a.rescaled(scale)?, b.rescaled(scale)?, scale))
    }

    pub fn checked_add(&self, other: &Decimal) -> Option<Decimal> {
        let (a, b, scale) = Self::aligned(self, other)?;
        Some(Decimal::new(a.checked_add(b)?, scale))
    }

    pub fn checked_sub(&self, other: &Decimal) -> Option<Decimal> {
        let (a, b, scale) = Self::aligned(self, other)?;
        Some(Decimal::new(a.checked_sub(b)?, scale))
    }

    pub fn checked_mul(&self, other: &Decimal) -> Option<Decimal> {
        let units = self.units.checked_mul(other.units)?;
        Some(Decimal::new(units, self.scale + other.scale).limited())
    }

    pub fn neg(&self) -> Decimal {
        Decimal::new(-self.units, self.scale)
    }

    pub fn abs(&self) -> Decimal {
        Decimal::new(self.units.abs(), self.scale)
    }

    /// Rounds to `places` fractional digits, ties to even.
    pub fn round_dp(&self, places: u32) -> Decimal {
        if places >= self.scale {
            return match self.rescaled(places) {
                Some(units) => Decimal::new(units, places),
                None => *self,
            };
        }
        let Some(divisor) = pow10(self.scale - places) else {
            return Decimal::new(0, places);
        };
        let quotient = self.units / divisor;
        let remainder = (self.units % divisor).abs();
        let twice = remainder * 2;
        let away = match twice.cmp(&divisor) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => quotient % 2 != 0,
        };
        let step = if self.units < 0 { -1 } else { 1 };
        let units = if away { quotient + step } else { quotient };
        Decimal::new(units, places)
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        match Self::aligned(self, other) {
            Some((a, b, _)) => a.cmp(&b),
            None => self.to_f64().total_cmp(&other.to_f64()),
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.units < 0 { "-" } else { "" };
        let digits = self.units.unsigned_abs().to_string();
        if self.scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let scale = self.scale as usize;
        let padded = if digits.len() <= scale {
            format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
        } else {
            digits
        };
        let split = padded.len() - scale;
        write!(f, "{sign}{}.{}", &padded[..split], &padded[split..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(text: &str) -> Decimal {
        Decimal::parse(text).expect("decimal")
    }

    #[test]
    fn parse_keeps_written_scale() {
        assert_eq!(dec("1.50").to_string(), "1.50");
        assert_eq!(dec("-0.05").to_string(), "-0.05");
        assert_eq!(dec(".5").to_string(), "0.5");
        assert_eq!(dec("12").to_string(), "12");
        assert_eq!(dec("1.5e2").to_string(), "150");
        assert_eq!(dec("15e-3").to_string(), "0.015");
        assert!(Decimal::parse("abc").is_none());
        assert!(Decimal::parse("").is_none());
    }

    #[test]
    fn arithmetic_is_exact() {
        let sum = dec("0.1").checked_add(&dec("0.2")).expect("add");
        assert_eq!(sum, dec("0.3"));
        assert_eq!(sum.to_string(), "0.3");
        let product = dec("1.25").checked_mul(&dec("4")).expect("mul");
        assert_eq!(product.to_string(), "5.00");
        let diff = dec("10").checked_sub(&dec("0.01")).expect("sub");
        assert_eq!(diff.to_string(), "9.99");
    }

    #[test]
    fn comparison_ignores_scale() {
        assert_eq!(dec("1.0"), dec("1.000"));
        assert!(dec("1.01") > dec("1.009"));
        assert!(dec("-2") < dec("-1.5"));
    }

    #[test]
    fn rounding_is_half_even() {
        assert_eq!(dec("2.345").round_dp(2).to_string(), "2.34");
        assert_eq!(dec("2.355").round_dp(2).to_string(), "2.36");
        assert_eq!(dec("-1.5").round_dp(0).to_string(), "-2");
        assert_eq!(dec("1.2").round_dp(3).to_string(), "1.200");
        assert_eq!(dec("-7.9").trunc(), -7);
    }
}
