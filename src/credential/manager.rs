//! Ownership and renewal of the device's current SAS credential

use super::signer::{build_token, resource_uri};
use super::CredentialError;
use crate::config::CredentialSection;
use std::fmt;
use tracing::{debug, info, warn};

/// Default credential lifetime (24 hours)
pub const DEFAULT_LIFETIME_SECS: u64 = 86_400;

/// A signed credential, replaced wholesale on renewal
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Signed resource: `<hostname>/devices/<device_id>`
    pub resource_uri: String,
    /// Epoch second at which the broker stops accepting `token`
    pub expiry_epoch: u64,
    /// Full `SharedAccessSignature ...` string used as the MQTT password
    pub token: String,
}

impl Credential {
    pub fn is_expired_at(&self, now_epoch: u64) -> bool {
        now_epoch >= self.expiry_epoch
    }
}

// The token is a bearer secret until it expires, keep it out of logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("resource_uri", &self.resource_uri)
            .field("expiry_epoch", &self.expiry_epoch)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Holds the current credential and regenerates it when renewal is due
#[derive(Debug)]
pub struct CredentialManager {
    lifetime_secs: u64,
    renewal_margin_secs: u64,
    current: Option<Credential>,
    generation: u64,
}

impl CredentialManager {
    /// Create a manager with an explicit lifetime and renewal margin.
    ///
    /// A margin of 0 renews strictly at or after expiry.
    pub fn new(lifetime_secs: u64, renewal_margin_secs: u64) -> Self {
        Self {
            lifetime_secs,
            renewal_margin_secs,
            current: None,
            generation: 0,
        }
    }

    pub fn from_config(config: &CredentialSection) -> Self {
        Self::new(config.lifetime_secs, config.renewal_margin_secs)
    }

    pub fn lifetime_secs(&self) -> u64 {
        self.lifetime_secs
    }

    pub fn renewal_margin_secs(&self) -> u64 {
        self.renewal_margin_secs
    }

    /// Current credential, if one has been generated
    pub fn current(&self) -> Option<&Credential> {
        self.current.as_ref()
    }

    /// Number of credentials generated so far; each connect is attributed to one generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a connect at `now_epoch` would need a fresh credential
    pub fn needs_renewal(&self, now_epoch: u64) -> bool {
        match &self.current {
            None => true,
            Some(credential) => {
                now_epoch >= credential.expiry_epoch.saturating_sub(self.renewal_margin_secs)
            }
        }
    }

    /// Drop the current credential so the next validation regenerates it
    pub fn invalidate(&mut self) {
        if self.current.take().is_some() {
            debug!("Credential invalidated");
        }
    }

    /// Return a credential that is valid at `now_epoch`, regenerating if due.
    ///
    /// Calling this repeatedly with the same `now_epoch` returns the same
    /// credential. A decode failure leaves the previous credential untouched.
    pub fn ensure_valid(
        &mut self,
        now_epoch: u64,
        hostname: &str,
        device_id: &str,
        base64_key: &str,
    ) -> Result<&Credential, CredentialError> {
        if now_epoch == 0 {
            warn!("Cannot validate credential: epoch clock not synchronized");
            return Err(CredentialError::NoTimeSource);
        }

        let expected_uri = resource_uri(hostname, device_id);
        let identity_changed = self
            .current
            .as_ref()
            .is_some_and(|c| c.resource_uri != expected_uri);

        if identity_changed || self.needs_renewal(now_epoch) {
            let _span = crate::credential_span!(identity_changed, now_epoch).entered();
            let expiry_epoch = now_epoch.saturating_add(self.lifetime_secs);
            let token = build_token(hostname, device_id, base64_key, expiry_epoch)?;
            self.generation += 1;
            info!(
                resource_uri = %expected_uri,
                expiry_epoch,
                generation = self.generation,
                "Generated new SAS credential"
            );
            self.current = Some(Credential {
                resource_uri: expected_uri,
                expiry_epoch,
                token,
            });
        }

        self.current.as_ref().ok_or(CredentialError::NoTimeSource)
    }
}

impl Default for CredentialManager {
    fn default() -> Self {
        Self::new(DEFAULT_LIFETIME_SECS, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

    #[test]
    fn test_first_call_generates_credential() {
        let mut manager = CredentialManager::default();
        let credential = manager.ensure_valid(1_000, "h", "d", KEY).unwrap().clone();

        assert_eq!(credential.resource_uri, "h/devices/d");
        assert_eq!(credential.expiry_epoch, 1_000 + DEFAULT_LIFETIME_SECS);
        assert!(credential.token.starts_with("SharedAccessSignature sr=h/devices/d&sig="));
        assert_eq!(manager.generation(), 1);
    }

    #[test]
    fn test_same_epoch_returns_identical_credential() {
        let mut manager = CredentialManager::default();
        let first = manager.ensure_valid(5_000, "h", "d", KEY).unwrap().clone();
        let second = manager.ensure_valid(5_000, "h", "d", KEY).unwrap().clone();

        assert_eq!(first, second);
        assert_eq!(manager.generation(), 1);
    }

    #[test]
    fn test_renews_at_expiry() {
        let mut manager = CredentialManager::new(100, 0);
        let first = manager.ensure_valid(1_000, "h", "d", KEY).unwrap().clone();
        assert_eq!(first.expiry_epoch, 1_100);

        // One second before expiry the credential is still served
        let still = manager.ensure_valid(1_099, "h", "d", KEY).unwrap().clone();
        assert_eq!(still, first);

        let renewed = manager.ensure_valid(1_100, "h", "d", KEY).unwrap().clone();
        assert_eq!(renewed.expiry_epoch, 1_200);
        assert_ne!(renewed.token, first.token);
        assert_eq!(manager.generation(), 2);
    }

    #[test]
    fn test_renewal_margin_renews_early() {
        let mut manager = CredentialManager::new(100, 30);
        manager.ensure_valid(1_000, "h", "d", KEY).unwrap();

        assert!(!manager.needs_renewal(1_069));
        assert!(manager.needs_renewal(1_070));

        let renewed = manager.ensure_valid(1_070, "h", "d", KEY).unwrap();
        assert_eq!(renewed.expiry_epoch, 1_170);
    }

    #[test]
    fn test_zero_epoch_is_no_time_source() {
        let mut manager = CredentialManager::default();
        let result = manager.ensure_valid(0, "h", "d", KEY);
        assert!(matches!(result, Err(CredentialError::NoTimeSource)));
        assert!(manager.current().is_none());
    }

    #[test]
    fn test_bad_key_keeps_previous_credential() {
        let mut manager = CredentialManager::new(100, 0);
        let first = manager.ensure_valid(1_000, "h", "d", KEY).unwrap().clone();

        let result = manager.ensure_valid(2_000, "h", "d", "not base64!");
        assert!(matches!(result, Err(CredentialError::Encoding(_))));
        assert_eq!(manager.current(), Some(&first));
        assert_eq!(manager.generation(), 1);
    }

    #[test]
    fn test_identity_change_forces_renewal() {
        let mut manager = CredentialManager::default();
        manager.ensure_valid(1_000, "h", "d", KEY).unwrap();
        let other = manager.ensure_valid(1_000, "h", "other", KEY).unwrap();
        assert_eq!(other.resource_uri, "h/devices/other");
        assert_eq!(manager.generation(), 2);
    }

    #[test]
    fn test_invalidate_forces_regeneration() {
        let mut manager = CredentialManager::default();
        manager.ensure_valid(1_000, "h", "d", KEY).unwrap();
        manager.invalidate();
        assert!(manager.current().is_none());
        assert!(manager.needs_renewal(1_000));
        manager.ensure_valid(1_000, "h", "d", KEY).unwrap();
        assert_eq!(manager.generation(), 2);
    }

    #[test]
    fn test_debug_redacts_token() {
        let mut manager = CredentialManager::default();
        let credential = manager.ensure_valid(1_000, "h", "d", KEY).unwrap();
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("sig="));
    }
}
