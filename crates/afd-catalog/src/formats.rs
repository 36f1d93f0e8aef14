//! # Format Specifications
//!
//! A [`FormatSpec`] is the declarative description of one value format from
//! the format catalog: base type, length bounds, an optional pattern, and
//! digit budgets for decimal formats. Decimal formats come in three kinds
//! (amount, percentage, quantity) with standard digit budgets that apply
//! when a format does not declare its own.
//!
//! Values may use either `.` or `,` as the decimal separator; both are
//! canonicalized before validation and must validate identically.

use rust_decimal::Decimal;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Decimal kinds
// ---------------------------------------------------------------------------

/// The three decimal format families of the standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalKind {
    /// `Bn` family: monetary amounts.
    Amount,
    /// `Pn` family: percentages.
    Percentage,
    /// `An` family: quantities.
    Quantity,
}

impl DecimalKind {
    /// Digit budget that applies when the format declares none.
    pub fn default_total_digits(self) -> u32 {
        match self {
            Self::Amount | Self::Quantity => 15,
            Self::Percentage => 8,
        }
    }

    fn matches(self, name: &str, base_type: &str) -> bool {
        let (family, derived_prefix) = match self {
            Self::Amount => ("Bn", "codeB"),
            Self::Percentage => ("Pn", "codeP"),
            Self::Quantity => ("An", "codeA"),
        };
        base_type == family || name == family || name.starts_with(derived_prefix)
    }
}

// ---------------------------------------------------------------------------
// Violations
// ---------------------------------------------------------------------------

/// Why a value failed decimal validation against a format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecimalViolation {
    #[error("value {value:?} is not a valid decimal number")]
    NotANumber { value: String },

    #[error("{found} significant digits, maximum is {max}")]
    TooManyDigits { found: u32, max: u32 },

    #[error("{found} fraction digits, maximum is {max}")]
    TooManyFractionDigits { found: u32, max: u32 },
}

// ---------------------------------------------------------------------------
// FormatSpec
// ---------------------------------------------------------------------------

/// One named format from the format catalog.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormatSpec {
    pub name: String,
    /// Local name of the restriction base, e.g. `string`, `decimal`, `Bn`.
    pub base_type: String,
    pub min_length: Option<u32>,
    pub max_length: Option<u32>,
    pub pattern: Option<String>,
    pub total_digits: Option<u32>,
    pub fraction_digits: Option<u32>,
    /// Base format this one derives from, when the base is itself a
    /// catalog format rather than a primitive.
    pub parent_format: Option<String>,
}

impl FormatSpec {
    /// The decimal family this format belongs to, if any.
    pub fn decimal_kind(&self) -> Option<DecimalKind> {
        [DecimalKind::Amount, DecimalKind::Percentage, DecimalKind::Quantity]
            .into_iter()
            .find(|kind| kind.matches(&self.name, &self.base_type))
    }

    /// Whether values of this format are subject to decimal validation.
    pub fn is_decimal(&self) -> bool {
        self.base_type == "decimal" || self.decimal_kind().is_some()
    }

    pub fn is_amount(&self) -> bool {
        self.decimal_kind() == Some(DecimalKind::Amount)
    }

    /// Declared digit budget, or the family default.
    pub fn effective_total_digits(&self) -> Option<u32> {
        self.total_digits
            .or_else(|| self.decimal_kind().map(DecimalKind::default_total_digits))
    }

    pub fn effective_fraction_digits(&self) -> Option<u32> {
        self.fraction_digits
    }

    /// Validate a raw value against this format's digit budgets.
    ///
    /// Empty values and non-decimal formats pass vacuously; presence is a
    /// separate check.
    pub fn validate_decimal(&self, value: &str) -> Result<(), DecimalViolation> {
        if value.is_empty() || !self.is_decimal() {
            return Ok(());
        }

        let canonical = value.trim().replace(',', ".");
        let decimal: Decimal = canonical
            .parse()
            .map_err(|_| DecimalViolation::NotANumber { value: value.to_string() })?;

        if let Some(max) = self.effective_total_digits() {
            let found = significant_digits(decimal);
            if found > max {
                return Err(DecimalViolation::TooManyDigits { found, max });
            }
        }

        if let Some(max) = self.effective_fraction_digits() {
            // Counted on the written form, not the parsed one, so that
            // trailing zeros count as written.
            if let Some((_, fraction)) = canonical.split_once('.') {
                let found = fraction.len() as u32;
                if found > max {
                    return Err(DecimalViolation::TooManyFractionDigits { found, max });
                }
            }
        }

        Ok(())
    }
}

/// Digits of the coefficient, leading zeros excluded, trailing written
/// zeros included ("12.50" has four).
fn significant_digits(decimal: Decimal) -> u32 {
    let mut mantissa = decimal.mantissa().unsigned_abs();
    let mut count = 1;
    while mantissa >= 10 {
        mantissa /= 10;
        count += 1;
    }
    count
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(total: Option<u32>, fraction: Option<u32>) -> FormatSpec {
        FormatSpec {
            name: "codeB2".into(),
            base_type: "Bn".into(),
            total_digits: total,
            fraction_digits: fraction,
            parent_format: Some("Bn".into()),
            ..FormatSpec::default()
        }
    }

    #[test]
    fn kind_from_base_type_and_name_prefix() {
        assert_eq!(amount(None, None).decimal_kind(), Some(DecimalKind::Amount));
        let by_name = FormatSpec { name: "codeP1".into(), ..FormatSpec::default() };
        assert_eq!(by_name.decimal_kind(), Some(DecimalKind::Percentage));
        let plain = FormatSpec {
            name: "AFDC100".into(),
            base_type: "string".into(),
            ..FormatSpec::default()
        };
        assert_eq!(plain.decimal_kind(), None);
        assert!(!plain.is_decimal());
    }

    #[test]
    fn family_defaults_apply_when_undeclared() {
        assert_eq!(amount(None, None).effective_total_digits(), Some(15));
        let pct = FormatSpec { name: "Pn".into(), ..FormatSpec::default() };
        assert_eq!(pct.effective_total_digits(), Some(8));
        assert_eq!(amount(Some(9), None).effective_total_digits(), Some(9));
    }

    #[test]
    fn comma_and_dot_validate_identically() {
        let spec = amount(Some(15), Some(2));
        assert_eq!(spec.validate_decimal("1250.50"), spec.validate_decimal("1250,50"));
        assert!(spec.validate_decimal("1250,50").is_ok());
        assert_eq!(spec.validate_decimal("1,505"), spec.validate_decimal("1.505"));
        assert!(spec.validate_decimal("1,505").is_err());
    }

    #[test]
    fn garbage_is_not_a_number() {
        let spec = amount(None, None);
        assert!(matches!(
            spec.validate_decimal("12,50,00"),
            Err(DecimalViolation::NotANumber { .. })
        ));
        assert!(matches!(
            spec.validate_decimal("abc"),
            Err(DecimalViolation::NotANumber { .. })
        ));
    }

    #[test]
    fn significant_digits_ignore_leading_zeros() {
        let spec = amount(Some(3), None);
        assert!(spec.validate_decimal("0.05").is_ok());
        assert!(spec.validate_decimal("999").is_ok());
        assert!(matches!(
            spec.validate_decimal("1000"),
            Err(DecimalViolation::TooManyDigits { found: 4, max: 3 })
        ));
    }

    #[test]
    fn fraction_digits_count_the_written_form() {
        let spec = amount(None, Some(2));
        assert!(spec.validate_decimal("10.50").is_ok());
        assert!(matches!(
            spec.validate_decimal("10.500"),
            Err(DecimalViolation::TooManyFractionDigits { found: 3, max: 2 })
        ));
        // No separator means no fraction digits at all.
        assert!(spec.validate_decimal("10").is_ok());
    }

    #[test]
    fn empty_and_non_decimal_pass_vacuously() {
        assert!(amount(Some(1), Some(0)).validate_decimal("").is_ok());
        let text = FormatSpec {
            name: "AFDC070".into(),
            base_type: "string".into(),
            ..FormatSpec::default()
        };
        assert!(text.validate_decimal("not a number").is_ok());
    }
}
