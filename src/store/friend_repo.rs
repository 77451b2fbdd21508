use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use jiff::Timestamp;
use minicbor::{Decode, Encode};
use serde::Serialize;
use tracing::info;

use super::keys::{OwnedKey, check_user_id, owner_prefix};
use super::locks::WriteLocks;
use super::{StoreError, StoreResult, from_bytes, to_bytes};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode, Serialize)]
#[cbor(index_only)]
#[serde(rename_all = "lowercase")]
pub(crate) enum FriendStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
}

#[derive(Clone, Debug, Encode, Decode)]
struct StoredRequest {
    #[n(0)]
    status: FriendStatus,
    /// Unix milliseconds.
    #[n(1)]
    created_at: i64,
}

/// A directed friend request. Accepted requests are friendships.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct FriendRequest {
    pub(crate) requester: String,
    pub(crate) recipient: String,
    pub(crate) status: FriendStatus,
    pub(crate) created_at: Timestamp,
}

impl FriendRequest {
    /// The party that is not `me`.
    pub(crate) fn other(&self, me: &str) -> &str {
        if self.requester == me {
            &self.recipient
        } else {
            &self.requester
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum RequestOutcome {
    /// A new pending request was created.
    Requested,
    /// The other user had already asked; the pair are now friends.
    Accepted,
}

/// Friend requests keyed `requester NUL recipient`, plus an index keyed
/// `recipient NUL requester` for incoming lookups.
#[derive(Clone)]
pub(crate) struct FriendRepo {
    keyspace: Keyspace,
    requests: PartitionHandle,
    by_recipient: PartitionHandle,
    locks: WriteLocks,
}

impl FriendRepo {
    pub(crate) fn new(keyspace: Keyspace, locks: WriteLocks) -> StoreResult<FriendRepo> {
        let requests =
            keyspace.open_partition("friend_requests", PartitionCreateOptions::default())?;
        let by_recipient = keyspace.open_partition(
            "friend_requests_by_recipient",
            PartitionCreateOptions::default(),
        )?;
        Ok(FriendRepo {
            keyspace,
            requests,
            by_recipient,
            locks,
        })
    }

    pub(crate) fn find(&self, requester: &str, recipient: &str) -> StoreResult<Option<FriendRequest>> {
        let key = OwnedKey::new(requester, recipient);
        let Some(bytes) = self.requests.get(key)? else {
            return Ok(None);
        };
        let stored: StoredRequest = from_bytes(&bytes)?;
        Ok(Some(to_request(requester, recipient, stored)?))
    }

    pub(crate) fn request(&self, from: &str, to: &str, now: Timestamp) -> StoreResult<RequestOutcome> {
        check_user_id(from)?;
        check_user_id(to)?;
        if from == to {
            return Err(StoreError::InvalidRequest(
                "cannot send a friend request to yourself".to_string(),
            ));
        }
        let _guard = self.locks.pair(from, to);
        if self.find(from, to)?.is_some() {
            return Err(StoreError::Conflict("friend request already exists".to_string()));
        }
        if let Some(reverse) = self.find(to, from)? {
            if reverse.status == FriendStatus::Accepted {
                return Err(StoreError::Conflict("already friends".to_string()));
            }
            self.accept_locked(from, to)?;
            return Ok(RequestOutcome::Accepted);
        }
        let stored = StoredRequest {
            status: FriendStatus::Pending,
            created_at: now.as_millisecond(),
        };
        let mut b = self.keyspace.batch();
        b.insert(&self.requests, OwnedKey::new(from, to), to_bytes(&stored)?);
        b.insert(&self.by_recipient, OwnedKey::new(to, from), []);
        b.commit()?;
        info!(target: "store", from, to, "friend request sent");
        Ok(RequestOutcome::Requested)
    }

    /// Accepts the pending request sent by `from` to `me`.
    pub(crate) fn accept(&self, me: &str, from: &str) -> StoreResult<FriendRequest> {
        let _guard = self.locks.pair(me, from);
        self.accept_locked(me, from)
    }

    fn accept_locked(&self, me: &str, from: &str) -> StoreResult<FriendRequest> {
        let key = OwnedKey::new(from, me);
        let Some(bytes) = self.requests.get(key.clone())? else {
            return Err(StoreError::NotFound(format!("friend request from {from}")));
        };
        let mut stored: StoredRequest = from_bytes(&bytes)?;
        if stored.status == FriendStatus::Accepted {
            return Err(StoreError::Conflict("already friends".to_string()));
        }
        stored.status = FriendStatus::Accepted;
        self.requests.insert(key, to_bytes(&stored)?)?;
        info!(target: "store", from, to = me, "friend request accepted");
        to_request(from, me, stored)
    }

    /// Drops the pending request sent by `from` to `me`.
    pub(crate) fn decline(&self, me: &str, from: &str) -> StoreResult<()> {
        let _guard = self.locks.pair(me, from);
        match self.find(from, me)? {
            Some(request) if request.status == FriendStatus::Pending => self.delete(from, me),
            _ => Err(StoreError::NotFound(format!("friend request from {from}"))),
        }
    }

    /// Ends an accepted friendship regardless of who asked first.
    pub(crate) fn remove(&self, me: &str, other: &str) -> StoreResult<()> {
        let _guard = self.locks.pair(me, other);
        for (requester, recipient) in [(me, other), (other, me)] {
            if let Some(request) = self.find(requester, recipient)? {
                if request.status == FriendStatus::Accepted {
                    return self.delete(requester, recipient);
                }
            }
        }
        Err(StoreError::NotFound(format!("friendship with {other}")))
    }

    /// Every request `user` sent or received, outgoing first.
    pub(crate) fn relations(&self, user: &str) -> StoreResult<Vec<FriendRequest>> {
        let mut result = vec![];
        for pair in self.requests.prefix(owner_prefix(user)) {
            let (key, bytes) = pair?;
            let key = OwnedKey::from(key.as_ref());
            result.push(to_request(user, key.suffix_str()?, from_bytes(&bytes)?)?);
        }
        for pair in self.by_recipient.prefix(owner_prefix(user)) {
            let (key, _) = pair?;
            let key = OwnedKey::from(key.as_ref());
            if let Some(request) = self.find(key.suffix_str()?, user)? {
                result.push(request);
            }
        }
        Ok(result)
    }

    /// Ids of accepted friends of `user`.
    pub(crate) fn friend_ids(&self, user: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .relations(user)?
            .into_iter()
            .filter(|r| r.status == FriendStatus::Accepted)
            .map(|r| r.other(user).to_string())
            .collect())
    }

    fn delete(&self, requester: &str, recipient: &str) -> StoreResult<()> {
        let mut b = self.keyspace.batch();
        b.remove(&self.requests, OwnedKey::new(requester, recipient));
        b.remove(&self.by_recipient, OwnedKey::new(recipient, requester));
        b.commit()?;
        Ok(())
    }
}

fn to_request(requester: &str, recipient: &str, stored: StoredRequest) -> StoreResult<FriendRequest> {
    let created_at = Timestamp::from_millisecond(stored.created_at)
        .map_err(|e| StoreError::Decode(e.to_string()))?;
    Ok(FriendRequest {
        requester: requester.to_string(),
        recipient: recipient.to_string(),
        status: stored.status,
        created_at,
    })
}
