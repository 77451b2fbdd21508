use std::collections::BTreeMap;

use tracing::warn;

use crate::activity::Activity;

/// Default coefficients in kg CO2e per unit of quantity.
pub static DEFAULT_FACTORS: &[(&str, f64)] = &[
    ("food.red_meat.kg", 23.59467),
    ("food.white_meat.kg", 6.92667),
    ("food.dairy.kg", 6.769),
    ("food.dairy_alternative.kg", 0.568),
    ("food.baked_goods.kg", 2.472),
    ("food.grain_alternative.kg", 3.3),
    ("food.fruit_veg.kg", 2.54667),
    ("transport.car.km.petrol", 0.192),
    ("transport.car.km.electric", 0.053),
    ("transport.walk_ride.km", 0.01),
    ("transport.bike.km", 0.005),
    ("transport.bus.km", 0.105),
    ("transport.train.km", 0.041),
    ("transport.tram.km", 0.029),
    ("transport.plane.km", 0.255),
    ("energy.electricity.kwh", 0.68),
    ("energy.electricity.kwh.au-act", 2.56053),
    ("energy.electricity.kwh.au-nsw", 2.56053),
    ("energy.electricity.kwh.au-nt", 2.9931),
    ("energy.electricity.kwh.au-qld", 2.57974),
    ("energy.electricity.kwh.au-sa", 2.37285),
    ("energy.electricity.kwh.au-tas", 1.58247),
    ("energy.electricity.kwh.au-vic", 2.07292),
    ("energy.electricity.kwh.au-wa", 2.89386),
    ("waste.mixed.kg", 0.587),
    ("diet.meal.meatless", 1.2),
    ("recycling.plastic.item", 0.05),
];

/// Average travel speed in km/h used to turn a trip duration into a
/// distance.
pub static AVERAGE_SPEED_KMH: &[(&str, f64)] = &[
    ("Car (Petrol)", 50.0),
    ("Car (Electric)", 50.0),
    ("Walk/Ride", 5.0),
    ("Bike", 15.0),
    ("Bus", 30.0),
    ("Train", 60.0),
    ("Tram", 25.0),
    ("Plane", 800.0),
];

/// Unknown modes travel at 0 km/h.
pub fn average_speed_kmh(mode: &str) -> f64 {
    AVERAGE_SPEED_KMH
        .iter()
        .find(|(name, _)| *name == mode)
        .map_or(0.0, |(_, speed)| *speed)
}

/// Maps a validated activity to its emission factor key.
pub fn factor_key_for(activity: &Activity) -> Option<String> {
    let key = match activity {
        Activity::Food(food) => match food.subcategory.trim() {
            "Red Meat" | "red_meat" => "food.red_meat.kg",
            "White Meat" | "white_meat" => "food.white_meat.kg",
            "Dairy" | "dairy" => "food.dairy.kg",
            "Dairy Alternative" | "dairy_alternative" => "food.dairy_alternative.kg",
            "Baked Goods" | "grain" => "food.baked_goods.kg",
            "Grain Alternative" | "grain_alternative" => "food.grain_alternative.kg",
            "Fruit/Veg." | "fruit_vegetable" => "food.fruit_veg.kg",
            _ => return None,
        },
        Activity::Transport(transport) => match transport.mode.as_str() {
            "Car (Petrol)" => "transport.car.km.petrol",
            "Car (Electric)" => "transport.car.km.electric",
            "Walk/Ride" => "transport.walk_ride.km",
            "Bike" => "transport.bike.km",
            "Bus" => "transport.bus.km",
            "Train" => "transport.train.km",
            "Tram" => "transport.tram.km",
            "Plane" => "transport.plane.km",
            _ => return None,
        },
        Activity::Electricity(power) => {
            return match power.state.as_deref().map(str::trim) {
                None | Some("") => Some("energy.electricity.kwh".to_string()),
                Some(state) => {
                    let state = state.to_ascii_lowercase();
                    is_grid_region(&state).then(|| format!("energy.electricity.kwh.{state}"))
                }
            };
        }
        Activity::Waste(_) => "waste.mixed.kg",
        Activity::Diet(_) => "diet.meal.meatless",
        Activity::Recycling(_) => "recycling.plastic.item",
    };
    Some(key.to_string())
}

fn is_grid_region(state: &str) -> bool {
    matches!(
        state,
        "au-act" | "au-nsw" | "au-nt" | "au-qld" | "au-sa" | "au-tas" | "au-vic" | "au-wa"
    )
}

/// Immutable coefficient lookup.
///
/// Built once from [`DEFAULT_FACTORS`], optionally overlaid with the
/// authoritative values held by the store. Never mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct EmissionFactorTable {
    coefficients: BTreeMap<String, f64>,
}

impl Default for EmissionFactorTable {
    fn default() -> Self {
        Self::defaults()
    }
}

impl EmissionFactorTable {
    pub fn defaults() -> EmissionFactorTable {
        let coefficients = DEFAULT_FACTORS
            .iter()
            .map(|(key, value)| (key.to_string(), *value))
            .collect();
        EmissionFactorTable { coefficients }
    }

    /// Overlays `overrides` on top of this table. Values that are not
    /// positive finite numbers are skipped.
    pub fn with_overrides<I, K>(mut self, overrides: I) -> EmissionFactorTable
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        for (key, value) in overrides {
            let key = key.into();
            if !is_valid_coefficient(value) {
                warn!(target: "emission", %key, value, "ignoring invalid emission factor");
                continue;
            }
            self.coefficients.insert(key, value);
        }
        self
    }

    pub fn coefficient(&self, key: &str) -> Option<f64> {
        self.coefficients.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.coefficients.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }
}

pub fn is_valid_coefficient(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
mod tests {
    use crate::activity::{Activity, ElectricityPayload, FoodPayload, TransportPayload};

    use super::{DEFAULT_FACTORS, EmissionFactorTable, average_speed_kmh, factor_key_for};

    #[test]
    fn defaults_are_positive() {
        for (key, value) in DEFAULT_FACTORS {
            assert!(*value > 0.0, "{key} should be positive");
        }
        assert_eq!(EmissionFactorTable::defaults().len(), DEFAULT_FACTORS.len());
    }

    #[test]
    fn every_resolvable_key_has_a_default() {
        let table = EmissionFactorTable::defaults();
        let foods = [
            "Red Meat",
            "White Meat",
            "Dairy",
            "Dairy Alternative",
            "Baked Goods",
            "Grain Alternative",
            "Fruit/Veg.",
        ];
        for subcategory in foods {
            let key = factor_key_for(&Activity::Food(FoodPayload {
                subcategory: subcategory.to_string(),
                amount_kg: Some(1.0),
            }))
            .unwrap();
            assert!(table.coefficient(&key).is_some(), "{key}");
        }
        for (mode, _) in super::AVERAGE_SPEED_KMH {
            let key = factor_key_for(&Activity::Transport(TransportPayload {
                mode: mode.to_string(),
                duration_minutes: Some(1.0),
                ..Default::default()
            }))
            .unwrap();
            assert!(table.coefficient(&key).is_some(), "{key}");
        }
    }

    #[test]
    fn food_codes_and_labels_agree() {
        let by_label = factor_key_for(&Activity::Food(FoodPayload {
            subcategory: "Fruit/Veg.".into(),
            amount_kg: None,
        }));
        let by_code = factor_key_for(&Activity::Food(FoodPayload {
            subcategory: "fruit_vegetable".into(),
            amount_kg: None,
        }));
        assert_eq!(by_label, by_code);
        assert_eq!(by_label.as_deref(), Some("food.fruit_veg.kg"));
    }

    #[test]
    fn electricity_region() {
        let key = |state: Option<&str>| {
            factor_key_for(&Activity::Electricity(ElectricityPayload {
                kwh: Some(1.0),
                state: state.map(str::to_string),
            }))
        };
        assert_eq!(key(None).as_deref(), Some("energy.electricity.kwh"));
        assert_eq!(key(Some("AU-VIC")).as_deref(), Some("energy.electricity.kwh.au-vic"));
        assert_eq!(key(Some("nz-akl")), None);
    }

    #[test]
    fn unknown_mode_has_no_speed() {
        assert_eq!(average_speed_kmh("Bus"), 30.0);
        assert_eq!(average_speed_kmh("Car"), 0.0);
    }

    #[test]
    fn overrides_replace_valid_values_only() {
        let table = EmissionFactorTable::defaults().with_overrides([
            ("waste.mixed.kg", 0.7),
            ("diet.meal.meatless", -1.0),
            ("transport.bus.km", f64::NAN),
            ("custom.key", 1.5),
        ]);
        assert_eq!(table.coefficient("waste.mixed.kg"), Some(0.7));
        assert_eq!(table.coefficient("diet.meal.meatless"), Some(1.2));
        assert_eq!(table.coefficient("transport.bus.km"), Some(0.105));
        assert_eq!(table.coefficient("custom.key"), Some(1.5));
    }
}
