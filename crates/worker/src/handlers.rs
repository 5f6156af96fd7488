//! Stand-in collaborators for running the worker without a real backend.
//! They log what they were asked to do and pretend it took a moment.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jobrunner::jobs::services::{
    AvatarPointer, AvatarService, ConfigSyncService, ConversationAvatar, GroupMembershipService,
    JobServices, ProRevocationService, RevocationList, SwarmExpiryService,
};
use jobrunner::ServiceError;
use tracing::info;

const WORK: Duration = Duration::from_millis(50);

pub struct DemoBackend;

pub fn demo_services() -> JobServices {
    let backend = Arc::new(DemoBackend);
    JobServices {
        avatars: backend.clone(),
        config_sync: backend.clone(),
        swarm_expiry: backend.clone(),
        groups: backend.clone(),
        pro_revocation: backend,
        ..JobServices::unconfigured()
    }
}

#[async_trait]
impl AvatarService for DemoBackend {
    async fn conversation_avatar(&self, _conversation_id: &str) -> Option<ConversationAvatar> {
        None
    }

    async fn conversation_ids(&self) -> Vec<String> {
        Vec::new()
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        Err(ServiceError::NotFound(url.to_string()))
    }

    async fn decrypt(&self, data: &[u8], _profile_key: &str) -> Result<Vec<u8>, ServiceError> {
        Ok(data.to_vec())
    }

    async fn read_local(&self, path: &str) -> Result<Vec<u8>, ServiceError> {
        Err(ServiceError::NotFound(path.to_string()))
    }

    async fn store_avatar(
        &self,
        conversation_id: &str,
        _pointer: &AvatarPointer,
        decrypted: Vec<u8>,
    ) -> Result<(), ServiceError> {
        tokio::time::sleep(WORK).await;
        info!(conversation_id, bytes = decrypted.len(), "[demo] avatar stored");
        Ok(())
    }

    async fn reset_avatar(&self, conversation_id: &str) -> Result<(), ServiceError> {
        info!(conversation_id, "[demo] avatar reset");
        Ok(())
    }

    async fn upload_avatar(&self, decrypted: Vec<u8>) -> Result<AvatarPointer, ServiceError> {
        tokio::time::sleep(WORK).await;
        info!(bytes = decrypted.len(), "[demo] avatar uploaded");
        Ok(AvatarPointer {
            url: "https://files.invalid/demo".to_string(),
            profile_key: "00".repeat(32),
        })
    }
}

#[async_trait]
impl ConfigSyncService for DemoBackend {
    async fn push_user_config(&self) -> Result<usize, ServiceError> {
        tokio::time::sleep(WORK).await;
        info!("[demo] user config pushed");
        Ok(1)
    }

    async fn push_group_config(&self, group_pk: &str) -> Result<usize, ServiceError> {
        tokio::time::sleep(WORK).await;
        info!(group_pk, "[demo] group config pushed");
        Ok(1)
    }
}

#[async_trait]
impl SwarmExpiryService for DemoBackend {
    async fn fetch_expiries(
        &self,
        conversation_id: &str,
        message_hashes: &[String],
    ) -> Result<usize, ServiceError> {
        tokio::time::sleep(WORK).await;
        info!(conversation_id, count = message_hashes.len(), "[demo] expiries fetched");
        Ok(message_hashes.len())
    }

    async fn update_expiries(
        &self,
        conversation_id: &str,
        message_hashes: &[String],
    ) -> Result<usize, ServiceError> {
        tokio::time::sleep(WORK).await;
        info!(conversation_id, count = message_hashes.len(), "[demo] expiries updated");
        Ok(message_hashes.len())
    }
}

#[async_trait]
impl GroupMembershipService for DemoBackend {
    async fn send_invite(&self, group_pk: &str, member: &str) -> Result<(), ServiceError> {
        tokio::time::sleep(WORK).await;
        info!(group_pk, member, "[demo] invite sent");
        Ok(())
    }

    async fn process_pending_removals(&self, group_pk: &str) -> Result<usize, ServiceError> {
        info!(group_pk, "[demo] no pending removals");
        Ok(0)
    }
}

#[async_trait]
impl ProRevocationService for DemoBackend {
    async fn enabled(&self) -> bool {
        false
    }

    async fn current_ticket(&self) -> u64 {
        0
    }

    async fn fetch_revocations(&self, ticket: u64) -> Result<RevocationList, ServiceError> {
        Ok(RevocationList {
            ticket,
            items: Vec::new(),
        })
    }

    async fn store_revocations(&self, _list: RevocationList) -> Result<(), ServiceError> {
        Ok(())
    }
}
