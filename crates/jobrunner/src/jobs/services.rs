//! Collaborators the concrete job bodies delegate their domain work to.
//!
//! The runner never calls these; only job bodies do. Every collaborator
//! reports failures as [`ServiceError`] so bodies can tell "will never work"
//! from "try again later".

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::ServiceError;
use crate::jobs::bodies::fake_sleep::FakeJobJournal;
use crate::jobs::bodies::pro_revocation::RevocationRunState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarPointer {
    pub url: String,
    /// Hex encoded key the avatar was encrypted with.
    pub profile_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    Private,
    GroupV2,
    Other,
}

/// What the avatar jobs need to know about a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationAvatar {
    pub kind: ConversationKind,
    pub is_me: bool,
    pub pointer: Option<AvatarPointer>,
    /// Locally stored (decrypted) avatar, if any.
    pub local_path: Option<String>,
    /// Static fallback generated from the main avatar, if any.
    pub fallback_path: Option<String>,
}

#[async_trait]
pub trait AvatarService: Send + Sync {
    async fn conversation_avatar(&self, conversation_id: &str) -> Option<ConversationAvatar>;

    async fn conversation_ids(&self) -> Vec<String>;

    /// `NotFound` when the remote file is gone for good.
    async fn download(&self, url: &str) -> Result<Vec<u8>, ServiceError>;

    /// `Invalid` when the data cannot be decrypted with `profile_key`.
    async fn decrypt(&self, data: &[u8], profile_key: &str) -> Result<Vec<u8>, ServiceError>;

    async fn read_local(&self, path: &str) -> Result<Vec<u8>, ServiceError>;

    /// Process (resize, generate fallback) and store a decrypted avatar for a conversation.
    async fn store_avatar(
        &self,
        conversation_id: &str,
        pointer: &AvatarPointer,
        decrypted: Vec<u8>,
    ) -> Result<(), ServiceError>;

    /// Forget the local avatar files of a conversation.
    async fn reset_avatar(&self, conversation_id: &str) -> Result<(), ServiceError>;

    /// Encrypt and upload our own avatar again, returning where it now lives.
    async fn upload_avatar(&self, decrypted: Vec<u8>) -> Result<AvatarPointer, ServiceError>;
}

#[async_trait]
pub trait ConfigSyncService: Send + Sync {
    /// Push pending changes of our own config to our swarm. Returns how many messages were stored.
    async fn push_user_config(&self) -> Result<usize, ServiceError>;

    /// Push pending changes of a group's config to the group swarm.
    async fn push_group_config(&self, group_pk: &str) -> Result<usize, ServiceError>;
}

#[async_trait]
pub trait SwarmExpiryService: Send + Sync {
    /// Ask the swarm for the current expiry of messages and apply it locally.
    async fn fetch_expiries(
        &self,
        conversation_id: &str,
        message_hashes: &[String],
    ) -> Result<usize, ServiceError>;

    /// Tell the swarm about the expiry we computed locally for messages.
    async fn update_expiries(
        &self,
        conversation_id: &str,
        message_hashes: &[String],
    ) -> Result<usize, ServiceError>;
}

#[async_trait]
pub trait GroupMembershipService: Send + Sync {
    async fn send_invite(&self, group_pk: &str, member: &str) -> Result<(), ServiceError>;

    /// Remove members flagged as pending removal and revoke their access.
    async fn process_pending_removals(&self, group_pk: &str) -> Result<usize, ServiceError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationList {
    pub ticket: u64,
    pub items: Vec<String>,
}

#[async_trait]
pub trait ProRevocationService: Send + Sync {
    async fn enabled(&self) -> bool;

    async fn current_ticket(&self) -> u64;

    async fn fetch_revocations(&self, ticket: u64) -> Result<RevocationList, ServiceError>;

    async fn store_revocations(&self, list: RevocationList) -> Result<(), ServiceError>;
}

/// Everything job bodies can reach. Built once and shared by all runners.
#[derive(Clone)]
pub struct JobServices {
    pub avatars: Arc<dyn AvatarService>,
    pub config_sync: Arc<dyn ConfigSyncService>,
    pub swarm_expiry: Arc<dyn SwarmExpiryService>,
    pub groups: Arc<dyn GroupMembershipService>,
    pub pro_revocation: Arc<dyn ProRevocationService>,
    pub revocation_runs: Arc<RevocationRunState>,
    pub fake_journal: Arc<FakeJobJournal>,
    /// Shared by bodies and runners so scheduling and bookkeeping agree on "now".
    pub clock: Arc<dyn Clock>,
}

impl JobServices {
    /// Services where every collaborator reports itself as unavailable.
    /// Callers replace the fields they actually wire up.
    pub fn unconfigured() -> Self {
        let stub = Arc::new(Unconfigured);
        Self {
            avatars: stub.clone(),
            config_sync: stub.clone(),
            swarm_expiry: stub.clone(),
            groups: stub.clone(),
            pro_revocation: stub,
            revocation_runs: Arc::new(RevocationRunState::default()),
            fake_journal: Arc::new(FakeJobJournal::default()),
            clock: Arc::new(SystemClock),
        }
    }
}

struct Unconfigured;

fn unconfigured(what: &str) -> ServiceError {
    ServiceError::Transient(format!("{what} is not configured"))
}

#[async_trait]
impl AvatarService for Unconfigured {
    async fn conversation_avatar(&self, _conversation_id: &str) -> Option<ConversationAvatar> {
        None
    }

    async fn conversation_ids(&self) -> Vec<String> {
        Vec::new()
    }

    async fn download(&self, _url: &str) -> Result<Vec<u8>, ServiceError> {
        Err(unconfigured("avatar download"))
    }

    async fn decrypt(&self, _data: &[u8], _profile_key: &str) -> Result<Vec<u8>, ServiceError> {
        Err(unconfigured("avatar decryption"))
    }

    async fn read_local(&self, _path: &str) -> Result<Vec<u8>, ServiceError> {
        Err(unconfigured("avatar storage"))
    }

    async fn store_avatar(
        &self,
        _conversation_id: &str,
        _pointer: &AvatarPointer,
        _decrypted: Vec<u8>,
    ) -> Result<(), ServiceError> {
        Err(unconfigured("avatar storage"))
    }

    async fn reset_avatar(&self, _conversation_id: &str) -> Result<(), ServiceError> {
        Err(unconfigured("avatar storage"))
    }

    async fn upload_avatar(&self, _decrypted: Vec<u8>) -> Result<AvatarPointer, ServiceError> {
        Err(unconfigured("avatar upload"))
    }
}

#[async_trait]
impl ConfigSyncService for Unconfigured {
    async fn push_user_config(&self) -> Result<usize, ServiceError> {
        Err(unconfigured("config sync"))
    }

    async fn push_group_config(&self, _group_pk: &str) -> Result<usize, ServiceError> {
        Err(unconfigured("config sync"))
    }
}

#[async_trait]
impl SwarmExpiryService for Unconfigured {
    async fn fetch_expiries(
        &self,
        _conversation_id: &str,
        _message_hashes: &[String],
    ) -> Result<usize, ServiceError> {
        Err(unconfigured("swarm expiry"))
    }

    async fn update_expiries(
        &self,
        _conversation_id: &str,
        _message_hashes: &[String],
    ) -> Result<usize, ServiceError> {
        Err(unconfigured("swarm expiry"))
    }
}

#[async_trait]
impl GroupMembershipService for Unconfigured {
    async fn send_invite(&self, _group_pk: &str, _member: &str) -> Result<(), ServiceError> {
        Err(unconfigured("group membership"))
    }

    async fn process_pending_removals(&self, _group_pk: &str) -> Result<usize, ServiceError> {
        Err(unconfigured("group membership"))
    }
}

#[async_trait]
impl ProRevocationService for Unconfigured {
    async fn enabled(&self) -> bool {
        false
    }

    async fn current_ticket(&self) -> u64 {
        0
    }

    async fn fetch_revocations(&self, _ticket: u64) -> Result<RevocationList, ServiceError> {
        Err(unconfigured("pro backend"))
    }

    async fn store_revocations(&self, _list: RevocationList) -> Result<(), ServiceError> {
        Err(unconfigured("pro revocation cache"))
    }
}
