//! Signing login nonces with a local SSH key.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use ssh_key::{HashAlg, LineEnding, PrivateKey, PublicKey};
use windgo_core::auth::ssh::SIGNATURE_NAMESPACE;

use crate::{Error, Result};

/// Private key file names tried in `~/.ssh`, in order.
const DEFAULT_KEYS: [&str; 3] = ["id_ed25519", "id_ecdsa", "id_rsa"];

/// A detached SSHSIG and the fingerprint of the key that made it.
#[derive(Debug, Clone)]
pub struct SignedNonce {
    pub signature: String,
    pub fingerprint: String,
}

/// The explicit key, or the first default key present in `~/.ssh`.
pub fn find_key(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return if path.exists() {
            Ok(path.to_path_buf())
        } else {
            Err(Error::Ssh(format!("key file {} not found", path.display())))
        };
    }
    let ssh_dir = dirs::home_dir()
        .map(|h| h.join(".ssh"))
        .ok_or_else(|| Error::Ssh("cannot determine the home directory".into()))?;
    DEFAULT_KEYS
        .iter()
        .map(|name| ssh_dir.join(name))
        .find(|p| p.exists())
        .ok_or_else(|| Error::Ssh(format!("no SSH key found in {}", ssh_dir.display())))
}

/// Sign `nonce` with the key at `key_path`.
///
/// Unencrypted keys are signed in-process. Passphrase-protected keys are
/// handed to `ssh-keygen -Y sign`, which can prompt or use the agent.
pub fn sign_nonce(key_path: &Path, nonce: &str) -> Result<SignedNonce> {
    let key = PrivateKey::read_openssh_file(key_path)
        .map_err(|e| Error::Ssh(format!("cannot read {}: {e}", key_path.display())))?;

    if key.is_encrypted() {
        log::info!("key is passphrase-protected; delegating to ssh-keygen");
        let public = read_public_key(key_path)?;
        return Ok(SignedNonce {
            signature: sign_with_ssh_keygen(key_path, nonce)?,
            fingerprint: public.fingerprint(HashAlg::Sha256).to_string(),
        });
    }

    sign_with_key(&key, nonce)
}

pub fn sign_with_key(key: &PrivateKey, nonce: &str) -> Result<SignedNonce> {
    let signature = key
        .sign(SIGNATURE_NAMESPACE, HashAlg::Sha512, nonce.as_bytes())
        .and_then(|sig| sig.to_pem(LineEnding::LF))
        .map_err(|e| Error::Ssh(format!("signing failed: {e}")))?;
    Ok(SignedNonce {
        signature,
        fingerprint: key.public_key().fingerprint(HashAlg::Sha256).to_string(),
    })
}

fn read_public_key(key_path: &Path) -> Result<PublicKey> {
    let mut pub_path = key_path.as_os_str().to_owned();
    pub_path.push(".pub");
    PublicKey::read_openssh_file(Path::new(&pub_path))
        .map_err(|e| Error::Ssh(format!("cannot read public key for {}: {e}", key_path.display())))
}

fn sign_with_ssh_keygen(key_path: &Path, nonce: &str) -> Result<String> {
    let mut child = Command::new("ssh-keygen")
        .args(["-Y", "sign", "-n", SIGNATURE_NAMESPACE, "-f"])
        .arg(key_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| Error::Ssh(format!("cannot run ssh-keygen: {e}")))?;

    child
        .stdin
        .take()
        .ok_or_else(|| Error::Ssh("ssh-keygen stdin unavailable".into()))?
        .write_all(nonce.as_bytes())?;

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(Error::Ssh(format!("ssh-keygen exited with {}", output.status)));
    }
    String::from_utf8(output.stdout).map_err(|e| Error::Ssh(format!("ssh-keygen output: {e}")))
}
