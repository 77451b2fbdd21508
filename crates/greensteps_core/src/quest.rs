use serde::{Deserialize, Serialize};

/// A quest as offered to every user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestDefinition {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub points_multiplier: f64,
}

/// Where a user stands on an enrolled quest after an update.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestProgress {
    pub progress: f64,
    pub completed: bool,
    pub percent: u8,
}

/// Completion percentage, capped at 100. Quests without a positive target
/// report 0.
pub fn percent(progress: Option<f64>, max_value: Option<f64>) -> u8 {
    match (progress, max_value) {
        (Some(progress), Some(max)) if max > 0.0 && progress.is_finite() => {
            (progress / max * 100.0).round().clamp(0.0, 100.0) as u8
        }
        _ => 0,
    }
}

pub fn advance(progress: Option<f64>, delta: f64, max_value: Option<f64>) -> QuestProgress {
    let progress = progress.unwrap_or(0.0) + delta;
    let completed = max_value.is_some_and(|max| progress >= max);
    QuestProgress {
        progress,
        completed,
        percent: percent(Some(progress), max_value),
    }
}

/// Points awarded once when the quest completes.
pub fn completion_points(quest: &QuestDefinition) -> i64 {
    let target = quest.max_value.unwrap_or(0.0).max(0.0);
    let points = (target * quest.points_multiplier).round();
    if points.is_finite() && points > 0.0 {
        points as i64
    } else {
        0
    }
}
