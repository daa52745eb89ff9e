//! # Tax Calculation
//!
//! Pure tax and discount math applied every time invoice totals are
//! recomputed.
//!
//! ## Formula
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  subtotal  = Σ line_item.total_price                                    │
//! │  discount  = percentage: round(subtotal × bps / 10000)                  │
//! │              fixed:      cents, capped at subtotal                      │
//! │  taxable   = max(subtotal − discount, 0)                                │
//! │  tax       = round(taxable × (hospitality + service))    (0 for GOV)    │
//! │  total     = taxable + tax                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The two tax components are reported separately for display. The service
//! component is derived as `tax − hospitality` so the parts always add up to
//! the rounded combined tax.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points (825 = 8.25%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Sum of two rates.
    #[inline]
    pub const fn combined(&self, other: TaxRate) -> TaxRate {
        TaxRate(self.0 + other.0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Discount
// =============================================================================

/// Invoice-level discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Discount {
    /// Percentage of the subtotal, in basis points.
    Percentage { bps: u32 },
    /// Fixed amount in cents.
    Fixed { cents: i64 },
}

impl Discount {
    /// Column representation: (`discount_type`, `discount_value`).
    pub fn to_columns(&self) -> (&'static str, i64) {
        match self {
            Discount::Percentage { bps } => ("percentage", i64::from(*bps)),
            Discount::Fixed { cents } => ("fixed", *cents),
        }
    }

    /// Parses the column representation back into a discount.
    pub fn from_columns(
        kind: Option<&str>,
        value: Option<i64>,
    ) -> Result<Option<Discount>, ValidationError> {
        match (kind, value) {
            (None, _) | (_, None) => Ok(None),
            (Some("percentage"), Some(v)) => {
                let bps = u32::try_from(v).map_err(|_| ValidationError::OutOfRange {
                    field: "discount_value".to_string(),
                    min: 0,
                    max: 10_000,
                })?;
                Ok(Some(Discount::Percentage { bps }))
            }
            (Some("fixed"), Some(v)) => Ok(Some(Discount::Fixed { cents: v })),
            (Some(other), _) => Err(ValidationError::InvalidFormat {
                field: "discount_type".to_string(),
                reason: format!("unknown discount type '{}'", other),
            }),
        }
    }

    /// Amount this discount removes from `subtotal`, never more than the
    /// subtotal and never negative.
    pub fn amount_for(&self, subtotal: Money) -> Money {
        let raw = match self {
            Discount::Percentage { bps } => subtotal.apply_rate(TaxRate::from_bps(*bps)),
            Discount::Fixed { cents } => Money::from_cents(*cents),
        };
        raw.floor_at_zero().min(subtotal.floor_at_zero())
    }
}

// =============================================================================
// Tax Configuration
// =============================================================================

/// Two-component tax configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxConfig {
    /// Hospitality / prepared-food tax.
    pub hospitality: TaxRate,
    /// General sales tax on services.
    pub service: TaxRate,
}

impl TaxConfig {
    pub const fn combined(&self) -> TaxRate {
        self.hospitality.combined(self.service)
    }
}

impl Default for TaxConfig {
    /// 2% hospitality + 7% service = 9% combined.
    fn default() -> Self {
        TaxConfig {
            hospitality: TaxRate::from_bps(200),
            service: TaxRate::from_bps(700),
        }
    }
}

// =============================================================================
// Breakdown
// =============================================================================

/// Result of a tax calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxBreakdown {
    pub subtotal: Money,
    pub discount: Money,
    pub taxable: Money,
    pub hospitality_tax: Money,
    pub service_tax: Money,
    pub tax: Money,
    pub total: Money,
}

// =============================================================================
// Service
// =============================================================================

/// Stateless tax calculator.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaxCalculationService {
    config: TaxConfig,
}

impl TaxCalculationService {
    pub fn new(config: TaxConfig) -> Self {
        TaxCalculationService { config }
    }

    pub fn config(&self) -> &TaxConfig {
        &self.config
    }

    /// Computes discount, tax and total for a subtotal.
    ///
    /// Government contracts are exempt: tax is zero regardless of the
    /// configured rates.
    ///
    /// ```rust
    /// use catering_core::money::Money;
    /// use catering_core::tax::{Discount, TaxCalculationService};
    ///
    /// let service = TaxCalculationService::default(); // 9% combined
    /// let result = service.calculate(
    ///     Money::from_cents(100_000),
    ///     Some(&Discount::Percentage { bps: 1000 }),
    ///     false,
    /// );
    /// assert_eq!(result.taxable.cents(), 90_000);
    /// assert_eq!(result.tax.cents(), 8_100);
    /// assert_eq!(result.total.cents(), 98_100);
    /// ```
    pub fn calculate(
        &self,
        subtotal: Money,
        discount: Option<&Discount>,
        is_government: bool,
    ) -> TaxBreakdown {
        let discount = discount
            .map(|d| d.amount_for(subtotal))
            .unwrap_or_else(Money::zero);
        let taxable = (subtotal - discount).floor_at_zero();

        let (hospitality_tax, tax) = if is_government {
            (Money::zero(), Money::zero())
        } else {
            (
                taxable.apply_rate(self.config.hospitality),
                taxable.apply_rate(self.config.combined()),
            )
        };

        TaxBreakdown {
            subtotal,
            discount,
            taxable,
            hospitality_tax,
            service_tax: tax - hospitality_tax,
            tax,
            total: taxable + tax,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
