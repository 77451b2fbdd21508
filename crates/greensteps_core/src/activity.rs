use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

use crate::EmissionError;

/// Activity category, decided by which payload of an [`ActivityForm`] is
/// populated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Food,
    Transport,
    #[serde(rename = "energy", alias = "electricity")]
    Electricity,
    Waste,
    Diet,
    Recycling,
}

impl Category {
    /// Label used in emission results and stored activity rows.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Transport => "transport",
            Category::Electricity => "energy",
            Category::Waste => "waste",
            Category::Diet => "diet",
            Category::Recycling => "recycling",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Category::Food | Category::Waste => "kg",
            Category::Transport => "km",
            Category::Electricity => "kWh",
            Category::Diet => "meal",
            Category::Recycling => "item",
        }
    }

    /// Meatless meals and recycled items avoid emissions rather than
    /// produce them.
    pub fn effect(self) -> Effect {
        match self {
            Category::Diet | Category::Recycling => Effect::Saved,
            _ => Effect::Emitted,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "food" => Ok(Category::Food),
            "transport" => Ok(Category::Transport),
            "energy" | "electricity" => Ok(Category::Electricity),
            "waste" => Ok(Category::Waste),
            "diet" => Ok(Category::Diet),
            "recycling" => Ok(Category::Recycling),
            other => Err(format!("unknown activity category '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Emitted,
    Saved,
}

/// Raw activity as submitted by a client. At most one payload is expected
/// to be present; [`Activity::try_from`] enforces it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivityForm {
    /// Informational only. The populated payload decides the category.
    pub category: Option<String>,
    pub food: Option<FoodPayload>,
    pub transport: Option<TransportPayload>,
    pub electricity: Option<ElectricityPayload>,
    pub waste: Option<WastePayload>,
    pub diet: Option<DietPayload>,
    pub recycling: Option<RecyclingPayload>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FoodPayload {
    pub subcategory: String,
    #[serde(deserialize_with = "lenient_number")]
    pub amount_kg: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransportPayload {
    pub mode: String,
    #[serde(deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub duration_minutes: Option<f64>,
    /// Client-computed `durationHours * 60 + durationMinutes`.
    #[serde(deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub total_minutes: Option<f64>,
}

impl TransportPayload {
    /// Trip length in minutes. `totalMinutes` wins when present; otherwise
    /// the hour and minute parts are added up. Missing parts count as zero.
    pub fn total_minutes(&self) -> f64 {
        match self.total_minutes {
            Some(total) => total,
            None => {
                self.duration_hours.unwrap_or(0.0) * 60.0 + self.duration_minutes.unwrap_or(0.0)
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectricityPayload {
    #[serde(rename = "kWh", deserialize_with = "lenient_number")]
    pub kwh: Option<f64>,
    /// Grid region such as `au-vic`. Selects a regional factor when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WastePayload {
    #[serde(deserialize_with = "lenient_number")]
    pub amount_kg: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DietPayload {
    #[serde(deserialize_with = "lenient_number")]
    pub meals: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecyclingPayload {
    #[serde(deserialize_with = "lenient_number")]
    pub items: Option<f64>,
}

/// A validated activity carrying exactly one category payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Activity {
    Food(FoodPayload),
    Transport(TransportPayload),
    Electricity(ElectricityPayload),
    Waste(WastePayload),
    Diet(DietPayload),
    Recycling(RecyclingPayload),
}

impl Activity {
    pub fn category(&self) -> Category {
        match self {
            Activity::Food(_) => Category::Food,
            Activity::Transport(_) => Category::Transport,
            Activity::Electricity(_) => Category::Electricity,
            Activity::Waste(_) => Category::Waste,
            Activity::Diet(_) => Category::Diet,
            Activity::Recycling(_) => Category::Recycling,
        }
    }

    /// Subtype label stored alongside the emission.
    pub fn kind(&self) -> String {
        match self {
            Activity::Food(food) if !food.subcategory.is_empty() => food.subcategory.clone(),
            Activity::Food(_) => "food".to_string(),
            Activity::Transport(transport) => transport.mode.clone(),
            Activity::Electricity(_) => "electricity".to_string(),
            Activity::Waste(_) => "waste".to_string(),
            Activity::Diet(_) => "meatless_meal".to_string(),
            Activity::Recycling(_) => "plastic_item".to_string(),
        }
    }

    /// The payload as submitted, kept as free-form metadata.
    pub fn meta(&self) -> serde_json::Value {
        let value = match self {
            Activity::Food(p) => serde_json::to_value(p),
            Activity::Transport(p) => serde_json::to_value(p),
            Activity::Electricity(p) => serde_json::to_value(p),
            Activity::Waste(p) => serde_json::to_value(p),
            Activity::Diet(p) => serde_json::to_value(p),
            Activity::Recycling(p) => serde_json::to_value(p),
        };
        value.unwrap_or(serde_json::Value::Null)
    }
}

impl TryFrom<ActivityForm> for Activity {
    type Error = EmissionError;

    fn try_from(form: ActivityForm) -> Result<Self, Self::Error> {
        let ActivityForm {
            category: _,
            food,
            transport,
            electricity,
            waste,
            diet,
            recycling,
        } = form;
        let mut found = Vec::with_capacity(1);
        found.extend(food.map(Activity::Food));
        found.extend(transport.map(Activity::Transport));
        found.extend(electricity.map(Activity::Electricity));
        found.extend(waste.map(Activity::Waste));
        found.extend(diet.map(Activity::Diet));
        found.extend(recycling.map(Activity::Recycling));
        if found.len() != 1 {
            return Err(EmissionError::UnsupportedActivity {
                populated: found.len(),
            });
        }
        Ok(found.remove(0))
    }
}

/// Accepts numbers, numeric strings and null. Anything else becomes NaN so
/// the calculator reports it as an invalid quantity instead of a parse
/// failure.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct LenientNumber;

    impl<'de> Visitor<'de> for LenientNumber {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a number, a numeric string or null")
        }
        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            d.deserialize_any(self)
        }
        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }
        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }
        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }
        fn visit_bool<E: de::Error>(self, _v: bool) -> Result<Self::Value, E> {
            Ok(Some(f64::NAN))
        }
        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            let v = v.trim();
            if v.is_empty() {
                return Ok(None);
            }
            Ok(Some(v.parse().unwrap_or(f64::NAN)))
        }
        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            while seq.next_element::<de::IgnoredAny>()?.is_some() {}
            Ok(Some(f64::NAN))
        }
        fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            while map
                .next_entry::<de::IgnoredAny, de::IgnoredAny>()?
                .is_some()
            {}
            Ok(Some(f64::NAN))
        }
    }

    deserializer.deserialize_any(LenientNumber)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Activity, ActivityForm, Category, EmissionError};

    fn parse(value: serde_json::Value) -> Result<Activity, EmissionError> {
        let form: ActivityForm = serde_json::from_value(value).unwrap();
        Activity::try_from(form)
    }

    #[test]
    fn single_payload_selects_category() {
        let activity = parse(json!({
            "category": "Food",
            "food": {"subcategory": "Red Meat", "amountKg": 0.25},
            "transport": null,
            "electricity": null,
            "waste": null
        }))
        .unwrap();
        assert_eq!(activity.category(), Category::Food);
        assert_eq!(activity.kind(), "Red Meat");
    }

    #[test]
    fn no_payload_is_unsupported() {
        let err = parse(json!({"category": "Food"})).unwrap_err();
        assert!(matches!(
            err,
            EmissionError::UnsupportedActivity { populated: 0 }
        ));
    }

    #[test]
    fn two_payloads_are_unsupported() {
        let err = parse(json!({
            "food": {"subcategory": "Dairy", "amountKg": 1},
            "waste": {"amountKg": 2}
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            EmissionError::UnsupportedActivity { populated: 2 }
        ));
    }

    #[test]
    fn lenient_quantities() {
        let Activity::Waste(waste) = parse(json!({"waste": {"amountKg": "1.5"}})).unwrap() else {
            panic!("expected waste");
        };
        assert_eq!(waste.amount_kg, Some(1.5));

        let Activity::Diet(diet) = parse(json!({"diet": {"meals": "lots"}})).unwrap() else {
            panic!("expected diet");
        };
        assert!(diet.meals.unwrap().is_nan());

        let Activity::Recycling(recycling) = parse(json!({"recycling": {"items": null}})).unwrap()
        else {
            panic!("expected recycling");
        };
        assert_eq!(recycling.items, None);
    }

    #[test]
    fn electricity_uses_kwh_field_name() {
        let Activity::Electricity(power) =
            parse(json!({"electricity": {"kWh": 12, "state": "au-vic"}})).unwrap()
        else {
            panic!("expected electricity");
        };
        assert_eq!(power.kwh, Some(12.0));
        assert_eq!(power.state.as_deref(), Some("au-vic"));
        assert_eq!(Category::Electricity.as_str(), "energy");
    }

    #[test]
    fn transport_duration_shapes() {
        let minutes = |value| {
            let Activity::Transport(trip) = parse(value).unwrap() else {
                panic!("expected transport");
            };
            trip.total_minutes()
        };
        assert_eq!(minutes(json!({"transport": {"mode": "Bus", "durationMinutes": 60}})), 60.0);
        assert_eq!(
            minutes(json!({"transport": {"mode": "Bus", "durationHours": 2, "durationMinutes": 0}})),
            120.0
        );
        assert_eq!(
            minutes(json!({"transport": {
                "mode": "Bus", "durationHours": 1, "durationMinutes": 30, "totalMinutes": 90
            }})),
            90.0
        );
        assert_eq!(
            minutes(json!({"transport": {"mode": "Bus", "durationHours": "1", "durationMinutes": "15"}})),
            75.0
        );
    }
}
