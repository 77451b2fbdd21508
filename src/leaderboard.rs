use greensteps_core::{ProfileSummary, RankedEntry, Scope, rank_profiles};
use serde::Serialize;

use crate::store::{Profile, Store, StoreResult};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct Leaderboard {
    pub(crate) scope: Scope,
    pub(crate) entries: Vec<RankedEntry>,
}

/// Builds the `scope` leaderboard as seen by `requester`.
///
/// Global and regional boards keep the `limit` highest scoring profiles
/// before ranking; the friends board is never truncated.
pub(crate) fn leaderboard(
    store: &Store,
    requester: &str,
    scope: Scope,
    limit: usize,
) -> StoreResult<Leaderboard> {
    let friend_ids = store.friends.friend_ids(requester)?;
    let candidates = match scope {
        Scope::Global => top(store.profiles.all()?, limit),
        Scope::Friends => {
            let ids = friend_ids
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(requester));
            store.profiles.find_many(ids)?
        }
        Scope::Regional => {
            let me = store.profiles.find_one(requester)?;
            match me.as_ref().and_then(|p| p.state.clone()) {
                Some(state) => {
                    let same_state = store
                        .profiles
                        .all()?
                        .into_iter()
                        .filter(|p| p.id == requester || p.state.as_deref() == Some(state.as_str()))
                        .collect();
                    top(same_state, limit)
                }
                None => me.into_iter().collect(),
            }
        }
    };
    let mut entries = rank_profiles(candidates.into_iter().map(ProfileSummary::from), requester);
    for entry in &mut entries {
        entry.friend = Some(!entry.you && friend_ids.contains(&entry.id));
    }
    Ok(Leaderboard { scope, entries })
}

/// The `limit` highest scoring profiles, ties in id order.
fn top(mut profiles: Vec<Profile>, limit: usize) -> Vec<Profile> {
    profiles.sort_by(|a, b| b.total_points.cmp(&a.total_points));
    profiles.truncate(limit);
    profiles
}
