use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key provider returned empty key material")]
    Empty,
    #[error("private and public key must be overridden together")]
    PartialOverride,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Keypair {
    pub private_key: String,
    pub public_key: String,
}

impl Keypair {
    pub fn new(private_key: String, public_key: String) -> Result<Self, KeyError> {
        if private_key.is_empty() || public_key.is_empty() {
            return Err(KeyError::Empty);
        }
        Ok(Self {
            private_key,
            public_key,
        })
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Source of fresh WireGuard keypairs.
pub trait KeyProvider: Send + Sync {
    fn keypair(&self) -> Result<Keypair, KeyError>;
}

/// Curve25519 keys encoded the way `wg genkey | wg pubkey` prints them.
#[derive(Debug, Default, Clone, Copy)]
pub struct X25519KeyProvider;

impl KeyProvider for X25519KeyProvider {
    fn keypair(&self) -> Result<Keypair, KeyError> {
        let private = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&private);
        Keypair::new(
            STANDARD.encode(private.to_bytes()),
            STANDARD.encode(public.to_bytes()),
        )
    }
}

/// Externally supplied key material that replaces generated keys.
#[derive(Debug, Default, Clone)]
pub struct KeyOverride {
    pub private_key: Option<String>,
    pub public_key: Option<String>,
}

impl KeyOverride {
    pub fn new(private_key: String, public_key: String) -> Self {
        Self {
            private_key: Some(private_key),
            public_key: Some(public_key),
        }
    }

    pub fn resolve(self, provider: &dyn KeyProvider) -> Result<Keypair, KeyError> {
        match (self.private_key, self.public_key) {
            (Some(private_key), Some(public_key)) => Keypair::new(private_key, public_key),
            (None, None) => provider.keypair(),
            _ => Err(KeyError::PartialOverride),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl KeyProvider for Broken {
        fn keypair(&self) -> Result<Keypair, KeyError> {
            Keypair::new(String::new(), "pub".to_owned())
        }
    }

    #[test]
    fn x25519_public_key_matches_private() {
        let pair = X25519KeyProvider.keypair().unwrap();
        assert_eq!(pair.private_key.len(), 44);
        assert_eq!(pair.public_key.len(), 44);

        let secret: [u8; 32] = STANDARD
            .decode(pair.private_key.as_bytes())
            .unwrap()
            .try_into()
            .unwrap();
        let public = PublicKey::from(&StaticSecret::from(secret));
        assert_eq!(STANDARD.encode(public.to_bytes()), pair.public_key);
    }

    #[test]
    fn override_takes_precedence() {
        let pair = KeyOverride::new("pri".to_owned(), "pub".to_owned())
            .resolve(&Broken)
            .unwrap();
        assert_eq!(pair.private_key, "pri");
        assert_eq!(pair.public_key, "pub");
    }

    #[test]
    fn partial_override_rejected() {
        let keys = KeyOverride {
            private_key: Some("pri".to_owned()),
            public_key: None,
        };
        assert!(matches!(
            keys.resolve(&X25519KeyProvider),
            Err(KeyError::PartialOverride)
        ));
    }

    #[test]
    fn empty_keys_rejected() {
        assert!(matches!(
            KeyOverride::default().resolve(&Broken),
            Err(KeyError::Empty)
        ));
    }
}
