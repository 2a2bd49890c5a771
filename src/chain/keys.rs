//! Key loading, address derivation and digest signing.
//!
//! # Security
//! - Fee wallet keys are loaded ONLY from environment variables
//! - Keys are never logged or serialized
//! - Request-supplied keys (issuer, sender) live only for the request

use bitcoin::address::NetworkUnchecked;
use bitcoin::secp256k1::{All, Message, Secp256k1, SecretKey};
use bitcoin::{Address, NetworkKind, PrivateKey, PublicKey, ScriptBuf};
use std::sync::OnceLock;
use thiserror::Error;

use crate::chain::types::Network;

/// Errors raised while handling keys and addresses.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid private key: {0}")]
    InvalidWif(String),

    #[error("Key network mismatch: expected {expected}")]
    NetworkMismatch { expected: Network },

    #[error("Environment variable {0} not set")]
    MissingEnv(String),

    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
}

pub type KeyResult<T> = Result<T, KeyError>;

fn secp() -> &'static Secp256k1<All> {
    static CONTEXT: OnceLock<Secp256k1<All>> = OnceLock::new();
    CONTEXT.get_or_init(Secp256k1::new)
}

/// A private key bound to a network together with its P2PKH address.
#[derive(Clone)]
pub struct SigningKey {
    private: PrivateKey,
    public: PublicKey,
    address: Address,
    network: Network,
}

impl SigningKey {
    /// Parse a WIF-encoded key and check it belongs to `network`.
    pub fn from_wif(wif: &str, network: Network) -> KeyResult<Self> {
        let private =
            PrivateKey::from_wif(wif.trim()).map_err(|e| KeyError::InvalidWif(e.to_string()))?;

        if private.network != NetworkKind::from(network.bitcoin_network()) {
            return Err(KeyError::NetworkMismatch { expected: network });
        }

        Ok(Self::from_private(private, network))
    }

    /// Build a key from raw secret material.
    pub fn from_secret(secret: SecretKey, network: Network) -> Self {
        Self::from_private(PrivateKey::new(secret, network.bitcoin_network()), network)
    }

    /// Load a WIF key from the named environment variable.
    pub fn from_env(var: &str, network: Network) -> KeyResult<Self> {
        let wif = std::env::var(var).map_err(|_| KeyError::MissingEnv(var.to_string()))?;
        Self::from_wif(&wif, network)
    }

    fn from_private(private: PrivateKey, network: Network) -> Self {
        let public = private.public_key(secp());
        let address = Address::p2pkh(public.pubkey_hash(), network.bitcoin_network());
        Self {
            private,
            public,
            address,
            network,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn address_string(&self) -> String {
        self.address.to_string()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Compressed public key as hex, the form the protocol builder expects.
    pub fn public_key_hex(&self) -> String {
        self.public.to_string()
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Locking script paying to this key.
    pub fn p2pkh_script(&self) -> ScriptBuf {
        self.address.script_pubkey()
    }

    pub fn to_wif(&self) -> String {
        self.private.to_wif()
    }

    /// Sign a 32-byte digest, returning a DER-encoded ECDSA signature.
    pub fn sign_digest(&self, digest: [u8; 32]) -> Vec<u8> {
        let message = Message::from_digest(digest);
        secp()
            .sign_ecdsa(&message, &self.private.inner)
            .serialize_der()
            .to_vec()
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("address", &self.address.to_string())
            .field("network", &self.network)
            .finish()
    }
}

/// Parse and network-check a receiver address.
pub fn parse_address(address: &str, network: Network) -> KeyResult<Address> {
    let unchecked: Address<NetworkUnchecked> =
        address.parse().map_err(|e: bitcoin::address::ParseError| KeyError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

    unchecked
        .require_network(network.bitcoin_network())
        .map_err(|e| KeyError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}
