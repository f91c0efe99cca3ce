//! Service identity bring-up.
//!
//! At startup the gateway issues a client credential for itself and stores it
//! like any user's AuthInfo, so calls to the REST-action service can be made
//! on its behalf.

use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use crate::errors::Result;
use crate::identity::UserInfo;
use crate::kubeconfig::KubeconfigGenerator;

/// Group the service identity belongs to
pub const SERVICE_GROUP: &str = "authn";

/// Validity of the service certificate
pub const SERVICE_CERT_DURATION: Duration = Duration::from_secs(8760 * 60 * 60);

const STABLE_ID_BYTES: usize = 8;

/// Stable id for a principal: leading bytes of SHA-256(`user@group1,group2`), in hex
pub fn stable_user_id(username: &str, groups: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}@{}", username, groups.join(",")).as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..STABLE_ID_BYTES])
}

/// The service's own principal
pub fn service_identity(username: &str) -> UserInfo {
    let groups = vec![SERVICE_GROUP.to_string()];
    let mut user = UserInfo::new(username, groups);
    user.id = stable_user_id(&user.username, &user.groups);
    user
}

/// Issue and store the service credential
#[instrument(skip(generator))]
pub async fn sign_up(generator: &KubeconfigGenerator, username: &str) -> Result<()> {
    let user = service_identity(username);
    generator.generate_with_validity(&user, SERVICE_CERT_DURATION).await?;
    info!(username = %user.username, "Service identity signed up");
    Ok(())
}
