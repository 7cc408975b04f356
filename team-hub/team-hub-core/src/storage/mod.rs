//! JSON-file-backed document store and the operations that mutate it.
//!
//! The entire database is one document with three collections. Every
//! operation loads the document, rewrites its in-memory copy and saves the
//! whole thing back; the file on disk is always either the pre-operation or
//! the post-operation state.

use crate::error::{Error, Result};
use crate::ids;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    User,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Diet {
    #[default]
    Veg,
    #[serde(rename = "Non-Veg")]
    NonVeg,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Gender {
    #[default]
    Male,
    Female,
    Other,
}

/// Login account. Team-member accounts are derived from the resource with
/// the same mobile number and live only as long as that resource does;
/// manager accounts are seeded out of band.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u32,
    pub name: String,
    pub mobile: String,
    pub password: String,
    pub role: Role,
}

/// A team member record owned by a manager. `mobile` is the natural key
/// linking it to its login account.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub joining_date: String,
    #[serde(default)]
    pub birthday: String,
    #[serde(default)]
    pub diet: Diet,
    #[serde(default)]
    pub skills: String,
    #[serde(default)]
    pub gender: Gender,
    pub mobile: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PollOption {
    pub label: String,
    pub votes: u32,
}

/// An opinion poll owned by a manager. `voted_users` and `user_votes` are
/// two views of the same facts and must never diverge: every id in
/// `voted_users` has an entry in `user_votes`, and each option's count
/// equals the number of `user_votes` entries naming its label.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<u32>,
    pub options: Vec<PollOption>,
    #[serde(default)]
    pub voted_users: Vec<u32>,
    #[serde(default)]
    pub user_votes: BTreeMap<u32, String>,
}

impl Poll {
    /// Remove every trace of a user's vote: the membership in
    /// `voted_users`, the recorded choice, and the option's count.
    fn retract_vote(&mut self, user_id: u32) {
        let Some(pos) = self.voted_users.iter().position(|&u| u == user_id) else {
            return;
        };
        self.voted_users.remove(pos);
        if let Some(label) = self.user_votes.remove(&user_id) {
            if let Some(option) = self.options.iter_mut().find(|o| o.label == label) {
                option.votes = option.votes.saturating_sub(1);
            }
        }
    }
}

/// Fields accepted when creating a resource, directly or via bulk import.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDraft {
    pub name: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub joining_date: String,
    #[serde(default)]
    pub birthday: String,
    #[serde(default)]
    pub diet: Diet,
    #[serde(default)]
    pub skills: String,
    #[serde(default)]
    pub gender: Gender,
    pub mobile: String,
}

/// Partial update; only provided fields are replaced.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePatch {
    pub name: Option<String>,
    pub project: Option<String>,
    pub joining_date: Option<String>,
    pub birthday: Option<String>,
    pub diet: Option<Diet>,
    pub skills: Option<String>,
    pub gender: Option<Gender>,
    pub mobile: Option<String>,
}

/// The whole persisted state. All collections default to empty so partial
/// or legacy files still load.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Document {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub polls: Vec<Poll>,
}

/// Visibility computed from whoever is making the request.
enum Scope {
    /// No caller id supplied: the full collection, for tooling and tests.
    All,
    /// Entities owned by this manager.
    Team(u32),
    /// A team member whose resource has no manager: just their own row.
    SelfOnly(String),
    /// Unknown caller, or a member with no resource at all.
    Nothing,
}

impl Document {
    /// Union of ids across all three collections; the allocator input.
    pub fn all_ids(&self) -> HashSet<u32> {
        self.users
            .iter()
            .map(|u| u.id)
            .chain(self.resources.iter().map(|r| r.id))
            .chain(self.polls.iter().map(|p| p.id))
            .collect()
    }

    pub fn find_user(&self, id: u32) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    /// The login account derived from a resource, matched by mobile number.
    /// This is a value lookup, not a stored reference; keep every User ↔
    /// Resource traversal behind this function.
    fn linked_account_mut(&mut self, mobile: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.mobile == mobile)
    }

    pub fn authenticate(&self, mobile: &str, password: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|u| u.mobile == mobile && u.password == password)
    }

    /// Create a resource owned by `manager_id`, auto-provisioning a login
    /// account when the mobile number has never been seen.
    pub fn create_resource(&mut self, manager_id: u32, draft: ResourceDraft) -> Result<Resource> {
        if self.resources.iter().any(|r| r.mobile == draft.mobile) {
            return Err(Error::DuplicateMobile);
        }
        let mut used = self.all_ids();
        let id = ids::allocate(&used)?;
        used.insert(id);
        let resource = Resource {
            id,
            name: draft.name.clone(),
            project: draft.project,
            joining_date: draft.joining_date,
            birthday: draft.birthday,
            diet: draft.diet,
            skills: draft.skills,
            gender: draft.gender,
            mobile: draft.mobile.clone(),
            manager_id: Some(manager_id),
        };
        self.resources.push(resource.clone());
        if !self.users.iter().any(|u| u.mobile == draft.mobile) {
            let user_id = ids::allocate(&used)?;
            self.users.push(User {
                id: user_id,
                name: draft.name,
                mobile: draft.mobile.clone(),
                // the account's initial password is the mobile number
                password: draft.mobile,
                role: Role::User,
            });
        }
        Ok(resource)
    }

    /// Replace the provided fields of a resource. A mobile change is synced
    /// to the linked account (mobile, password and name); the sync is
    /// best-effort and a missing account is not an error.
    pub fn update_resource(
        &mut self,
        id: u32,
        caller: Option<u32>,
        patch: ResourcePatch,
    ) -> Result<Resource> {
        let idx = self
            .resources
            .iter()
            .position(|r| r.id == id)
            .ok_or(Error::NotFound("Resource"))?;
        if let Some(caller) = caller {
            if self.resources[idx].manager_id.is_some_and(|m| m != caller) {
                return Err(Error::Forbidden);
            }
        }
        if let Some(mobile) = &patch.mobile {
            if self
                .resources
                .iter()
                .any(|r| r.id != id && &r.mobile == mobile)
            {
                return Err(Error::DuplicateMobile);
            }
        }
        let old_mobile = self.resources[idx].mobile.clone();
        {
            let r = &mut self.resources[idx];
            if let Some(v) = patch.name {
                r.name = v;
            }
            if let Some(v) = patch.project {
                r.project = v;
            }
            if let Some(v) = patch.joining_date {
                r.joining_date = v;
            }
            if let Some(v) = patch.birthday {
                r.birthday = v;
            }
            if let Some(v) = patch.diet {
                r.diet = v;
            }
            if let Some(v) = patch.skills {
                r.skills = v;
            }
            if let Some(v) = patch.gender {
                r.gender = v;
            }
            if let Some(v) = patch.mobile {
                r.mobile = v;
            }
        }
        let updated = self.resources[idx].clone();
        if updated.mobile != old_mobile {
            if let Some(user) = self.linked_account_mut(&old_mobile) {
                user.mobile = updated.mobile.clone();
                user.password = updated.mobile.clone();
                user.name = updated.name.clone();
            }
        }
        Ok(updated)
    }

    /// Remove a resource, its linked account, and the account's vote
    /// footprint from every poll in the document regardless of owner.
    pub fn delete_resource(&mut self, id: u32, caller: Option<u32>) -> Result<()> {
        let idx = self
            .resources
            .iter()
            .position(|r| r.id == id)
            .ok_or(Error::NotFound("Resource"))?;
        if let Some(caller) = caller {
            if self.resources[idx].manager_id.is_some_and(|m| m != caller) {
                return Err(Error::Forbidden);
            }
        }
        let mobile = self.resources.remove(idx).mobile;
        if let Some(pos) = self.users.iter().position(|u| u.mobile == mobile) {
            let user_id = self.users.remove(pos).id;
            for poll in &mut self.polls {
                poll.retract_vote(user_id);
            }
        }
        Ok(())
    }

    /// Create a poll from raw option labels. Labels are trimmed; empty ones
    /// are dropped; fewer than two distinct labels is an error.
    pub fn create_poll(
        &mut self,
        manager_id: u32,
        title: String,
        options: Vec<String>,
    ) -> Result<Poll> {
        let labels: Vec<String> = options
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        let distinct: HashSet<&str> = labels.iter().map(String::as_str).collect();
        if labels.len() < 2 || distinct.len() != labels.len() {
            return Err(Error::InvalidOptions);
        }
        let id = ids::allocate(&self.all_ids())?;
        let poll = Poll {
            id,
            title,
            manager_id: Some(manager_id),
            options: labels
                .into_iter()
                .map(|label| PollOption { label, votes: 0 })
                .collect(),
            voted_users: Vec::new(),
            user_votes: BTreeMap::new(),
        };
        self.polls.push(poll.clone());
        Ok(poll)
    }

    /// Record a vote: at most one per user per poll. The count increment,
    /// the membership and the recorded choice change together or not at all.
    pub fn vote(&mut self, poll_id: u32, user_id: u32, option_label: &str) -> Result<Poll> {
        let poll = self
            .polls
            .iter_mut()
            .find(|p| p.id == poll_id)
            .ok_or(Error::NotFound("Poll"))?;
        if poll.voted_users.contains(&user_id) {
            return Err(Error::AlreadyVoted);
        }
        let option = poll
            .options
            .iter_mut()
            .find(|o| o.label == option_label)
            .ok_or(Error::InvalidOption)?;
        option.votes += 1;
        poll.voted_users.push(user_id);
        poll.user_votes.insert(user_id, option_label.to_string());
        Ok(poll.clone())
    }

    pub fn delete_poll(&mut self, poll_id: u32, caller: Option<u32>) -> Result<()> {
        let idx = self
            .polls
            .iter()
            .position(|p| p.id == poll_id)
            .ok_or(Error::NotFound("Poll"))?;
        if let Some(caller) = caller {
            if self.polls[idx].manager_id.is_some_and(|m| m != caller) {
                return Err(Error::Forbidden);
            }
        }
        self.polls.remove(idx);
        Ok(())
    }

    fn scope(&self, caller: Option<u32>) -> Scope {
        let Some(id) = caller else { return Scope::All };
        let Some(user) = self.find_user(id) else {
            return Scope::Nothing;
        };
        match user.role {
            Role::Manager => Scope::Team(id),
            Role::User => match self.resources.iter().find(|r| r.mobile == user.mobile) {
                Some(own) => match own.manager_id {
                    Some(manager) => Scope::Team(manager),
                    None => Scope::SelfOnly(user.mobile.clone()),
                },
                None => Scope::SelfOnly(user.mobile.clone()),
            },
        }
    }

    /// Resources the caller may see: everything without a caller, the owned
    /// rows for a manager, the whole team for a member.
    pub fn visible_resources(&self, caller: Option<u32>) -> Vec<Resource> {
        match self.scope(caller) {
            Scope::All => self.resources.clone(),
            Scope::Team(manager) => self
                .resources
                .iter()
                .filter(|r| r.manager_id == Some(manager))
                .cloned()
                .collect(),
            Scope::SelfOnly(mobile) => self
                .resources
                .iter()
                .filter(|r| r.mobile == mobile)
                .cloned()
                .collect(),
            Scope::Nothing => Vec::new(),
        }
    }

    /// Polls the caller may see; a member with no team sees none.
    pub fn visible_polls(&self, caller: Option<u32>) -> Vec<Poll> {
        match self.scope(caller) {
            Scope::All => self.polls.clone(),
            Scope::Team(manager) => self
                .polls
                .iter()
                .filter(|p| p.manager_id == Some(manager))
                .cloned()
                .collect(),
            Scope::SelfOnly(_) | Scope::Nothing => Vec::new(),
        }
    }
}

/// Handle on the backing JSON file. Holds no document state itself; the
/// file is the sole source of truth and every request re-reads it.
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document. A missing or unparseable file yields the
    /// empty document so the system works from a cold start.
    pub fn load(&self) -> Document {
        match std::fs::read_to_string(&self.path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                tracing::warn!("unreadable database file, starting empty: {e}");
                Document::default()
            }),
            Err(_) => Document::default(),
        }
    }

    /// Write the whole document. Goes through a temp file in the same
    /// directory and a rename, so readers only ever observe the old or the
    /// new document, never a torn write.
    pub fn save(&self, doc: &Document) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(doc)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
