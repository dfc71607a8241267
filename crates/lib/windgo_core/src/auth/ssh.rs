//! SSH-signature login against the keys a GitHub account publishes.
//!
//! The client asks for a nonce, signs it with `ssh-keygen -Y sign -n
//! windgo-chat` (an SSHSIG signature), and presents the signature together
//! with the fingerprint of the key it used. A nonce is burned by its first
//! redemption attempt, whether or not the signature verifies.

use chrono::{DateTime, Duration, Utc};
use ssh_key::{HashAlg, PublicKey, SshSig};
use tracing::{debug, info, warn};

use super::github::GitHubClient;
use super::random::random_token;
use super::reconcile::reconcile_identity;
use super::sessions::register_device;
use super::{AuthError, LoginResult};
use crate::models::auth::{DeviceType, Nonce};
use crate::store::CredentialStore;

/// Nonce lifetime.
pub const NONCE_TTL_SECS: i64 = 60;

/// Bytes of entropy in the nonce and in its ID.
pub const NONCE_BYTES: usize = 32;

/// SSHSIG namespace clients must sign under.
pub const SIGNATURE_NAMESPACE: &str = "windgo-chat";

const PEM_BEGIN: &str = "-----BEGIN SSH SIGNATURE-----";
const PEM_END: &str = "-----END SSH SIGNATURE-----";
const PEM_LINE_WIDTH: usize = 70;

/// What the client must sign, and the handle to redeem it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceChallenge {
    pub nonce_id: String,
    pub nonce: String,
}

/// Issue a fresh nonce valid for [`NONCE_TTL_SECS`].
pub async fn generate_nonce(
    store: &dyn CredentialStore,
    now: DateTime<Utc>,
) -> Result<NonceChallenge, AuthError> {
    let record = Nonce {
        nonce_id: random_token(NONCE_BYTES),
        nonce: random_token(NONCE_BYTES),
        used: false,
        expires_at: now + Duration::seconds(NONCE_TTL_SECS),
        created_at: now,
    };
    store.insert_nonce(&record).await?;
    Ok(NonceChallenge {
        nonce_id: record.nonce_id,
        nonce: record.nonce,
    })
}

/// Signature login input.
#[derive(Debug, Clone)]
pub struct SshLogin {
    pub github_user: String,
    /// Armored SSHSIG, or its base64 body.
    pub signature: String,
    /// `SHA256:...` fingerprint of the signing key.
    pub fingerprint: String,
    pub nonce_id: String,
    pub device_name: String,
    pub device_type: DeviceType,
}

/// Redeem a nonce with a signature and register a device for the account.
///
/// Checks run in this order: nonce unknown or already used
/// ([`AuthError::InvalidOrExpiredNonce`]), then nonce expired
/// ([`AuthError::NonceExpired`]), then the signature.
pub async fn login(
    store: &dyn CredentialStore,
    github: &GitHubClient,
    req: &SshLogin,
    now: DateTime<Utc>,
) -> Result<LoginResult, AuthError> {
    let nonce = store
        .take_nonce(&req.nonce_id)
        .await?
        .ok_or(AuthError::InvalidOrExpiredNonce)?;
    if now > nonce.expires_at {
        return Err(AuthError::NonceExpired);
    }

    let keys = github.public_keys(&req.github_user).await?;
    if let Err(e) = verify_signature(&keys, &req.fingerprint, &req.signature, nonce.nonce.as_bytes()) {
        warn!(
            github_user = %req.github_user,
            fingerprint = %req.fingerprint,
            published_keys = keys.len(),
            "SSH signature rejected"
        );
        return Err(e);
    }

    let identity = github.public_identity(&req.github_user).await?;
    let user = reconcile_identity(store, &identity).await?;
    let grant = register_device(store, user.id, &req.device_name, req.device_type, now).await?;
    info!(user_id = user.id, device_id = %grant.device.device_id, "SSH signature login");
    Ok(LoginResult::with_device(user, grant))
}

/// Verify `signature` over `message` with the first published key whose
/// SHA-256 fingerprint equals `fingerprint`.
pub fn verify_signature(
    published_keys: &[String],
    fingerprint: &str,
    signature: &str,
    message: &[u8],
) -> Result<(), AuthError> {
    let sig = parse_signature(signature).ok_or(AuthError::SignatureVerificationFailed)?;

    for line in published_keys {
        let key = match PublicKey::from_openssh(line.trim()) {
            Ok(key) => key,
            Err(e) => {
                debug!(error = %e, "skipping unparseable published key");
                continue;
            }
        };
        if key.fingerprint(HashAlg::Sha256).to_string() != fingerprint {
            continue;
        }
        match key.verify(SIGNATURE_NAMESPACE, message, &sig) {
            Ok(()) => return Ok(()),
            Err(e) => debug!(error = %e, "signature does not verify under matching key"),
        }
    }
    Err(AuthError::SignatureVerificationFailed)
}

/// Accept an armored SSHSIG or its bare base64 body.
fn parse_signature(signature: &str) -> Option<SshSig> {
    let trimmed = signature.trim();
    if trimmed.starts_with(PEM_BEGIN) {
        return SshSig::from_pem(trimmed).ok();
    }
    let body: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if body.is_empty() {
        return None;
    }
    let lines: Vec<&str> = body
        .as_bytes()
        .chunks(PEM_LINE_WIDTH)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();
    let pem = format!("{PEM_BEGIN}\n{}\n{PEM_END}\n", lines.join("\n"));
    SshSig::from_pem(pem).ok()
}
