use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const ANONYMOUS: &str = "Anon";

/// Read-only projection of a user profile used for ranking.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSummary {
    pub id: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub total_points: Option<i64>,
    pub state: Option<String>,
    pub is_private: bool,
}

impl ProfileSummary {
    pub fn points(&self) -> i64 {
        self.total_points.unwrap_or(0)
    }

    pub fn display_name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => ANONYMOUS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub total_points: i64,
    pub rank: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub you: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friend: Option<bool>,
}

/// Leaderboard visibility partition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Global,
    Friends,
    Regional,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Friends => "friends",
            Scope::Regional => "regional",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Scope::Global),
            "friends" => Ok(Scope::Friends),
            "regional" => Ok(Scope::Regional),
            other => Err(format!("unknown leaderboard scope '{other}'")),
        }
    }
}

/// Ranks `profiles` for `requester_id`.
///
/// Private profiles are dropped unless they belong to the requester. The
/// rest are ordered by points, highest first, with ties keeping their input
/// order, and numbered from 1 without gaps. Scope membership must already
/// have been applied by the caller.
pub fn rank_profiles<I>(profiles: I, requester_id: &str) -> Vec<RankedEntry>
where
    I: IntoIterator<Item = ProfileSummary>,
{
    let mut visible: Vec<ProfileSummary> = profiles
        .into_iter()
        .filter(|p| !p.is_private || p.id == requester_id)
        .collect();
    // `sort_by` is stable
    visible.sort_by(|a, b| b.points().cmp(&a.points()));
    visible
        .into_iter()
        .enumerate()
        .map(|(index, profile)| RankedEntry {
            display_name: profile.display_name().to_string(),
            total_points: profile.points(),
            rank: index + 1,
            you: profile.id == requester_id,
            friend: None,
            id: profile.id,
            avatar_url: profile.avatar_url.filter(|url| !url.is_empty()),
            state: profile.state,
        })
        .collect()
}
