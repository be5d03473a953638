use postline_common::model::Id;
use postline_common::model::user::{Profile, UserMarker};

/// The signed-in user viewing the screens.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Session {
    pub user: Profile,
}

impl Session {
    #[must_use]
    pub fn new(user: Profile) -> Self {
        Self { user }
    }

    #[must_use]
    pub fn user_id(&self) -> Id<UserMarker> {
        self.user.id
    }
}
