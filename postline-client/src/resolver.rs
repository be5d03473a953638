use postline_common::model::Id;
use postline_common::model::user::{Profile, UserMarker};
use postline_common::service::{ServiceError, UserService};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum ResolveError {
    #[error("User with id {0} was not found.")]
    NotFound(Id<UserMarker>),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Looks up the profiles that get attached to bare comment rows.
///
/// Found profiles are remembered for as long as this resolver lives, which the
/// store limits to a single load. Concurrent lookups of the same id are not
/// coalesced; whichever finishes last fills the cache.
pub struct UserProfileResolver<U> {
    users: Arc<U>,
    cache: Mutex<HashMap<Id<UserMarker>, Profile>>,
}

impl<U: UserService> UserProfileResolver<U> {
    #[must_use]
    pub fn new(users: Arc<U>) -> Self {
        Self {
            users,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a resolver with some profiles already known, e.g. those of a
    /// freshly fetched snapshot.
    #[must_use]
    pub fn with_known(users: Arc<U>, known: impl IntoIterator<Item = Profile>) -> Self {
        let cache = known.into_iter().map(|profile| (profile.id, profile)).collect();
        Self {
            users,
            cache: Mutex::new(cache),
        }
    }

    pub async fn resolve(&self, user_id: Id<UserMarker>) -> Result<Profile, ResolveError> {
        if let Some(profile) = self.cached(user_id) {
            return Ok(profile);
        }

        let profile = self
            .users
            .get_user_data(user_id)
            .await?
            .ok_or(ResolveError::NotFound(user_id))?;

        debug!(%user_id, "Resolved profile");
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id, profile.clone());
        Ok(profile)
    }

    fn cached(&self, user_id: Id<UserMarker>) -> Option<Profile> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned()
    }
}
