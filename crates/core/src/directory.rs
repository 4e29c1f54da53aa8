//! In-memory account directories.
//!
//! `UserDirectory` and `ScrobbleLinkDirectory` hold all mutable bot state.
//! Both are owned by a single `Directories` value shared behind one
//! `tokio::sync::Mutex`; handlers take the lock for the duration of a
//! mutation and release it before any outbound network call, which keeps the
//! multi-step relink sequence atomic for every concurrent observer.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::{ScrobbleId, ScrobbleLink, UserId, UserRecord};

/// Lookup misses and duplicate creations indicate a router bug, not bad user
/// input: the routers always check existence before acting.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("user `{0}` not found")]
    UserNotFound(String),
    #[error("user `{0}` already exists")]
    UserAlreadyExists(String),
    #[error("scrobble link `{0}` not found")]
    LinkNotFound(String),
    #[error("scrobble link `{0}` already exists")]
    LinkAlreadyExists(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserField {
    AuthToken,
    ScrobbleId,
}

/// Patch for `UserDirectory::update`; `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub auth_token: Option<String>,
    pub scrobble_id: Option<ScrobbleId>,
}

#[derive(Debug, Default)]
pub struct UserDirectory {
    users: HashMap<String, UserRecord>,
}

impl UserDirectory {
    pub fn exists(&self, user_id: &UserId) -> bool {
        self.users.contains_key(&user_id.0)
    }

    pub fn add(&mut self, user_id: UserId) -> Result<(), DirectoryError> {
        if self.exists(&user_id) {
            return Err(DirectoryError::UserAlreadyExists(user_id.0));
        }
        self.users.insert(user_id.0.clone(), UserRecord::new(user_id));
        Ok(())
    }

    pub fn get(&self, user_id: &UserId) -> Result<&UserRecord, DirectoryError> {
        self.users.get(&user_id.0).ok_or_else(|| DirectoryError::UserNotFound(user_id.0.clone()))
    }

    pub fn update(&mut self, user_id: &UserId, patch: UserPatch) -> Result<(), DirectoryError> {
        let record = self
            .users
            .get_mut(&user_id.0)
            .ok_or_else(|| DirectoryError::UserNotFound(user_id.0.clone()))?;

        if let Some(auth_token) = patch.auth_token {
            record.auth_token = Some(auth_token);
        }
        if let Some(scrobble_id) = patch.scrobble_id {
            record.scrobble_id = Some(scrobble_id);
        }

        Ok(())
    }

    pub fn clear(&mut self, user_id: &UserId, field: UserField) -> Result<(), DirectoryError> {
        let record = self
            .users
            .get_mut(&user_id.0)
            .ok_or_else(|| DirectoryError::UserNotFound(user_id.0.clone()))?;

        match field {
            UserField::AuthToken => record.auth_token = None,
            UserField::ScrobbleId => record.scrobble_id = None,
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ScrobbleLinkDirectory {
    links: HashMap<String, ScrobbleLink>,
}

impl ScrobbleLinkDirectory {
    pub fn exists(&self, scrobble_id: &ScrobbleId) -> bool {
        self.links.contains_key(&scrobble_id.0)
    }

    pub fn get(&self, scrobble_id: &ScrobbleId) -> Result<&ScrobbleLink, DirectoryError> {
        self.links
            .get(&scrobble_id.0)
            .ok_or_else(|| DirectoryError::LinkNotFound(scrobble_id.0.clone()))
    }

    pub fn add_new(
        &mut self,
        scrobble_id: ScrobbleId,
        first_user_id: UserId,
    ) -> Result<(), DirectoryError> {
        if self.exists(&scrobble_id) {
            return Err(DirectoryError::LinkAlreadyExists(scrobble_id.0));
        }
        self.links.insert(
            scrobble_id.0.clone(),
            ScrobbleLink { scrobble_id, subscribers: vec![first_user_id] },
        );
        Ok(())
    }

    pub fn add_subscriber(
        &mut self,
        scrobble_id: &ScrobbleId,
        user_id: UserId,
    ) -> Result<(), DirectoryError> {
        let link = self
            .links
            .get_mut(&scrobble_id.0)
            .ok_or_else(|| DirectoryError::LinkNotFound(scrobble_id.0.clone()))?;
        link.subscribers.push(user_id);
        Ok(())
    }

    /// Removes `user_id` from the link. A link with exactly one subscriber is
    /// deleted outright; a larger link only shrinks. This asymmetry is what
    /// maintains the no-empty-links invariant without a cleanup pass.
    pub fn remove_subscriber(
        &mut self,
        scrobble_id: &ScrobbleId,
        user_id: &UserId,
    ) -> Result<(), DirectoryError> {
        let link = self
            .links
            .get_mut(&scrobble_id.0)
            .ok_or_else(|| DirectoryError::LinkNotFound(scrobble_id.0.clone()))?;

        if link.subscribers.len() == 1 {
            self.links.remove(&scrobble_id.0);
        } else {
            link.subscribers.retain(|subscriber| subscriber != user_id);
        }

        Ok(())
    }

    pub fn scrobble_ids(&self) -> Vec<ScrobbleId> {
        self.links.values().map(|link| link.scrobble_id.clone()).collect()
    }
}

/// Both directories under one owner, so compound sequences run inside a
/// single `&mut self` call and cannot interleave with another handler.
#[derive(Debug, Default)]
pub struct Directories {
    pub users: UserDirectory,
    pub links: ScrobbleLinkDirectory,
}

pub type SharedDirectories = Arc<Mutex<Directories>>;

pub fn shared_directories() -> SharedDirectories {
    Arc::new(Mutex::new(Directories::default()))
}

impl Directories {
    /// Creates the user's record on first contact. Returns a copy of the
    /// record either way.
    pub fn ensure_user(&mut self, user_id: &UserId) -> Result<UserRecord, DirectoryError> {
        if !self.users.exists(user_id) {
            self.users.add(user_id.clone())?;
        }
        self.users.get(user_id).cloned()
    }

    /// Points the user at a new scrobble account: detaches the previous link
    /// (if any) with the delete-vs-shrink rule, attaches the new one, and
    /// records it on the user.
    pub fn link_scrobble(
        &mut self,
        user_id: &UserId,
        scrobble_id: ScrobbleId,
    ) -> Result<(), DirectoryError> {
        let previous = self.users.get(user_id)?.scrobble_id.clone();
        if let Some(previous) = previous {
            self.links.remove_subscriber(&previous, user_id)?;
        }

        if self.links.exists(&scrobble_id) {
            self.links.add_subscriber(&scrobble_id, user_id.clone())?;
        } else {
            self.links.add_new(scrobble_id.clone(), user_id.clone())?;
        }

        self.users.update(user_id, UserPatch { scrobble_id: Some(scrobble_id), ..UserPatch::default() })
    }

    /// Detaches the user's current scrobble account, returning its id, or
    /// `None` if there was nothing to unlink.
    pub fn unlink_scrobble(
        &mut self,
        user_id: &UserId,
    ) -> Result<Option<ScrobbleId>, DirectoryError> {
        let Some(scrobble_id) = self.users.get(user_id)?.scrobble_id.clone() else {
            return Ok(None);
        };

        self.links.remove_subscriber(&scrobble_id, user_id)?;
        self.users.clear(user_id, UserField::ScrobbleId)?;
        Ok(Some(scrobble_id))
    }
}

#[cfg(test)]
mod tests {
    use super::{Directories, DirectoryError, UserField, UserPatch};
    use crate::domain::{ScrobbleId, UserId};

    fn uid(raw: &str) -> UserId {
        UserId(raw.to_owned())
    }

    fn sid(raw: &str) -> ScrobbleId {
        ScrobbleId(raw.to_owned())
    }

    #[test]
    fn ensure_user_creates_record_with_empty_fields() {
        let mut directories = Directories::default();
        let record = directories.ensure_user(&uid("1")).expect("ensure");

        assert_eq!(record.user_id, uid("1"));
        assert_eq!(record.auth_token, None);
        assert_eq!(record.scrobble_id, None);
    }

    #[test]
    fn ensure_user_is_idempotent_and_preserves_state() {
        let mut directories = Directories::default();
        directories.ensure_user(&uid("1")).expect("ensure");
        directories
            .users
            .update(&uid("1"), UserPatch { auth_token: Some("tok".to_owned()), ..UserPatch::default() })
            .expect("update");

        let record = directories.ensure_user(&uid("1")).expect("ensure again");
        assert_eq!(record.auth_token.as_deref(), Some("tok"));
    }

    #[test]
    fn duplicate_add_is_a_contract_violation() {
        let mut directories = Directories::default();
        directories.users.add(uid("1")).expect("first add");

        assert_eq!(
            directories.users.add(uid("1")),
            Err(DirectoryError::UserAlreadyExists("1".to_owned()))
        );
    }

    #[test]
    fn get_missing_user_is_a_contract_violation() {
        let directories = Directories::default();
        assert_eq!(
            directories.users.get(&uid("404")).err(),
            Some(DirectoryError::UserNotFound("404".to_owned()))
        );
    }

    #[test]
    fn update_patches_only_supplied_fields() {
        let mut directories = Directories::default();
        directories.ensure_user(&uid("1")).expect("ensure");
        directories
            .users
            .update(&uid("1"), UserPatch { auth_token: Some("tok".to_owned()), ..UserPatch::default() })
            .expect("token update");
        directories
            .users
            .update(&uid("1"), UserPatch { scrobble_id: Some(sid("fm")), ..UserPatch::default() })
            .expect("scrobble update");

        let record = directories.users.get(&uid("1")).expect("get");
        assert_eq!(record.auth_token.as_deref(), Some("tok"));
        assert_eq!(record.scrobble_id, Some(sid("fm")));
    }

    #[test]
    fn clear_unsets_a_single_field() {
        let mut directories = Directories::default();
        directories.ensure_user(&uid("1")).expect("ensure");
        directories
            .users
            .update(
                &uid("1"),
                UserPatch { auth_token: Some("tok".to_owned()), scrobble_id: Some(sid("fm")) },
            )
            .expect("update");

        directories.users.clear(&uid("1"), UserField::ScrobbleId).expect("clear");

        let record = directories.users.get(&uid("1")).expect("get");
        assert_eq!(record.auth_token.as_deref(), Some("tok"));
        assert_eq!(record.scrobble_id, None);
    }

    #[test]
    fn link_then_unlink_deletes_sole_subscriber_link() {
        let mut directories = Directories::default();
        directories.ensure_user(&uid("1")).expect("ensure");

        directories.link_scrobble(&uid("1"), sid("fm")).expect("link");
        assert!(directories.links.exists(&sid("fm")));

        let removed = directories.unlink_scrobble(&uid("1")).expect("unlink");
        assert_eq!(removed, Some(sid("fm")));
        assert!(!directories.links.exists(&sid("fm")));
        assert_eq!(directories.users.get(&uid("1")).expect("get").scrobble_id, None);
    }

    #[test]
    fn unlink_without_link_is_a_noop() {
        let mut directories = Directories::default();
        directories.ensure_user(&uid("1")).expect("ensure");

        assert_eq!(directories.unlink_scrobble(&uid("1")).expect("unlink"), None);
    }

    #[test]
    fn removing_one_of_many_subscribers_keeps_the_link() {
        let mut directories = Directories::default();
        directories.ensure_user(&uid("1")).expect("ensure 1");
        directories.ensure_user(&uid("2")).expect("ensure 2");
        directories.link_scrobble(&uid("1"), sid("fm")).expect("link 1");
        directories.link_scrobble(&uid("2"), sid("fm")).expect("link 2");

        directories.unlink_scrobble(&uid("1")).expect("unlink 1");

        let link = directories.links.get(&sid("fm")).expect("link survives");
        assert_eq!(link.subscribers, vec![uid("2")]);
    }

    #[test]
    fn relink_moves_user_between_links() {
        let mut directories = Directories::default();
        directories.ensure_user(&uid("1")).expect("ensure 1");
        directories.ensure_user(&uid("2")).expect("ensure 2");
        directories.link_scrobble(&uid("2"), sid("y")).expect("pre-existing y");

        directories.link_scrobble(&uid("1"), sid("x")).expect("link x");
        directories.link_scrobble(&uid("1"), sid("y")).expect("relink y");

        assert!(!directories.links.exists(&sid("x")), "sole-subscriber link x is deleted");
        let link = directories.links.get(&sid("y")).expect("y");
        assert!(link.subscribers.contains(&uid("1")));
        assert!(link.subscribers.contains(&uid("2")));
        assert_eq!(
            directories.users.get(&uid("1")).expect("get").scrobble_id,
            Some(sid("y"))
        );
    }

    #[test]
    fn relink_to_fresh_link_works_when_none_preexists() {
        let mut directories = Directories::default();
        directories.ensure_user(&uid("1")).expect("ensure");

        directories.link_scrobble(&uid("1"), sid("x")).expect("link x");
        directories.link_scrobble(&uid("1"), sid("y")).expect("relink y");

        assert!(!directories.links.exists(&sid("x")));
        assert_eq!(directories.links.get(&sid("y")).expect("y").subscribers, vec![uid("1")]);
    }
}
