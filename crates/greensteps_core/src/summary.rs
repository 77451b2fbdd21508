use std::collections::BTreeSet;

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::activity::{Category, Effect};
use crate::emission::round2;

/// What the summary needs to know about one logged activity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoggedActivity {
    pub category: Category,
    pub quantity: f64,
    pub emission_kg: f64,
    /// Civil date the activity was logged on, in the user's time zone.
    pub day: Date,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_emitted_kg: f64,
    pub total_saved_kg: f64,
    pub net_kg: f64,
    pub month_emitted_kg: f64,
    pub month_saved_kg: f64,
    pub transport_km_month: f64,
    pub energy_kwh_month: f64,
    pub waste_kg_month: f64,
    pub food_kg_month: f64,
    pub streak: u32,
}

pub fn summarize(activities: &[LoggedActivity], today: Date) -> DashboardSummary {
    let mut summary = DashboardSummary::default();
    for activity in activities {
        let this_month =
            activity.day.year() == today.year() && activity.day.month() == today.month();
        match activity.category.effect() {
            Effect::Emitted => {
                summary.total_emitted_kg += activity.emission_kg;
                if this_month {
                    summary.month_emitted_kg += activity.emission_kg;
                }
            }
            Effect::Saved => {
                summary.total_saved_kg += activity.emission_kg;
                if this_month {
                    summary.month_saved_kg += activity.emission_kg;
                }
            }
        }
        if !this_month {
            continue;
        }
        match activity.category {
            Category::Transport => summary.transport_km_month += activity.quantity,
            Category::Electricity => summary.energy_kwh_month += activity.quantity,
            Category::Waste => summary.waste_kg_month += activity.quantity,
            Category::Food => summary.food_kg_month += activity.quantity,
            Category::Diet | Category::Recycling => {}
        }
    }
    summary.total_emitted_kg = round2(summary.total_emitted_kg);
    summary.total_saved_kg = round2(summary.total_saved_kg);
    summary.net_kg = round2(summary.total_emitted_kg - summary.total_saved_kg);
    summary.month_emitted_kg = round2(summary.month_emitted_kg);
    summary.month_saved_kg = round2(summary.month_saved_kg);
    summary.transport_km_month = round2(summary.transport_km_month);
    summary.energy_kwh_month = round2(summary.energy_kwh_month);
    summary.waste_kg_month = round2(summary.waste_kg_month);
    summary.food_kg_month = round2(summary.food_kg_month);
    summary.streak = current_streak(activities.iter().map(|a| a.day), today);
    summary
}

/// Consecutive days with at least one activity, counted back from today.
/// A streak that ended yesterday is still alive until today is over.
pub fn current_streak<I>(days: I, today: Date) -> u32
where
    I: IntoIterator<Item = Date>,
{
    let days: BTreeSet<Date> = days.into_iter().filter(|day| *day <= today).collect();
    let mut cursor = if days.contains(&today) {
        today
    } else {
        match today.yesterday() {
            Ok(yesterday) if days.contains(&yesterday) => yesterday,
            _ => return 0,
        }
    };
    let mut streak = 0;
    loop {
        streak += 1;
        match cursor.yesterday() {
            Ok(previous) if days.contains(&previous) => cursor = previous,
            _ => return streak,
        }
    }
}
