use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::activity::{Activity, ActivityForm, Category, Effect};
use crate::factors::{EmissionFactorTable, average_speed_kmh, factor_key_for};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmissionError {
    #[error("Unsupported activity payload: expected exactly one category, found {populated}")]
    UnsupportedActivity { populated: usize },
    #[error("Quantity must be a positive number")]
    InvalidQuantity,
    #[error("Quantity {quantity} {unit} exceeds the maximum of {max} {unit}")]
    QuantityOutOfRange {
        quantity: f64,
        max: f64,
        unit: &'static str,
    },
    #[error("No emission factor key resolved for {category} activity '{kind}'")]
    UnresolvedFactorKey { category: Category, kind: String },
}

/// Upper bounds on a single logged activity. `None` means unbounded.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantityLimits {
    pub max_food_kg: Option<f64>,
    pub max_electricity_kwh: Option<f64>,
}

impl Default for QuantityLimits {
    fn default() -> Self {
        Self {
            max_food_kg: Some(1000.0),
            max_electricity_kwh: Some(10000.0),
        }
    }
}

impl QuantityLimits {
    pub const UNBOUNDED: QuantityLimits = QuantityLimits {
        max_food_kg: None,
        max_electricity_kwh: None,
    };

    fn max_for(&self, category: Category) -> Option<f64> {
        match category {
            Category::Food => self.max_food_kg,
            Category::Electricity => self.max_electricity_kwh,
            _ => None,
        }
    }
}

/// Result of running an activity through the calculator. Forwarded as is
/// to the activity store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Emission {
    pub category: Category,
    #[serde(rename = "type")]
    pub kind: String,
    pub quantity: f64,
    pub unit: String,
    pub factor_key: String,
    pub emission_kg: f64,
    pub effect: Effect,
    pub meta: Value,
}

/// Round half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Computes the emission of `form` with the built-in factor table and
/// default limits.
pub fn compute_emission(form: ActivityForm) -> Result<Emission, EmissionError> {
    EmissionFactorTable::defaults().compute_with_limits(form, &QuantityLimits::default())
}

impl EmissionFactorTable {
    /// Computes the emission of `form` against this table without any
    /// quantity ceiling.
    pub fn compute(&self, form: ActivityForm) -> Result<Emission, EmissionError> {
        self.compute_with_limits(form, &QuantityLimits::UNBOUNDED)
    }

    pub fn compute_with_limits(
        &self,
        form: ActivityForm,
        limits: &QuantityLimits,
    ) -> Result<Emission, EmissionError> {
        let activity = Activity::try_from(form)?;
        let category = activity.category();

        let quantity = quantity_of(&activity);
        if !quantity.is_finite() || quantity <= 0.0 {
            debug!(target: "emission", %category, quantity, "rejected quantity");
            return Err(EmissionError::InvalidQuantity);
        }
        if let Some(max) = limits.max_for(category) {
            if quantity > max {
                return Err(EmissionError::QuantityOutOfRange {
                    quantity,
                    max,
                    unit: category.unit(),
                });
            }
        }

        let unresolved = || EmissionError::UnresolvedFactorKey {
            category,
            kind: activity.kind(),
        };
        let factor_key = factor_key_for(&activity).ok_or_else(unresolved)?;
        let coefficient = self.coefficient(&factor_key).ok_or_else(unresolved)?;

        Ok(Emission {
            category,
            kind: activity.kind(),
            quantity,
            unit: category.unit().to_string(),
            emission_kg: round2(quantity * coefficient),
            factor_key,
            effect: category.effect(),
            meta: activity.meta(),
        })
    }
}

/// Missing amounts read as zero so they fail the positivity check.
fn quantity_of(activity: &Activity) -> f64 {
    match activity {
        Activity::Food(food) => food.amount_kg.unwrap_or(0.0),
        Activity::Transport(transport) => {
            round2(transport.total_minutes() / 60.0 * average_speed_kmh(&transport.mode))
        }
        Activity::Electricity(power) => power.kwh.unwrap_or(0.0),
        Activity::Waste(waste) => waste.amount_kg.unwrap_or(0.0),
        Activity::Diet(diet) => diet.meals.unwrap_or(0.0),
        Activity::Recycling(recycling) => recycling.items.unwrap_or(0.0),
    }
}
