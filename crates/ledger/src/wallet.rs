//! Ed25519 signing identities.
//!
//! A [`Wallet`] holds one keypair and its derived ledger address
//! (`SHA3-512(public_key)[..20]`). The service authority is a wallet
//! restored from configuration; burst identities are wallets generated
//! fresh per run and discarded afterwards.
//!
//! Secret material never leaves this module: `Debug` shows only the
//! address and public key.

use anyhow::Context;
use ed25519_dalek::{Keypair, PublicKey, SecretKey, Signature, Signer, Verifier};
use rand::rngs::OsRng;
use sha3::{Digest, Sha3_512};

use paraprobe_common::Address;

// ════════════════════════════════════════════════════════════════════════════
// ADDRESS DERIVATION
// ════════════════════════════════════════════════════════════════════════════

/// Derive a ledger address from an ed25519 public key:
/// the first 20 bytes of SHA3-512 over the raw key.
#[must_use]
pub fn address_from_public_key(public_key: &[u8; 32]) -> Address {
    let mut hasher = Sha3_512::new();
    hasher.update(public_key);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[0..20]);
    Address::from_bytes(bytes)
}

// ════════════════════════════════════════════════════════════════════════════
// WALLET
// ════════════════════════════════════════════════════════════════════════════

/// Ed25519 keypair with its derived ledger address.
///
/// Layout invariant: `keypair_bytes[0..32]` is the secret key,
/// `keypair_bytes[32..64]` the public key.
#[derive(Clone)]
pub struct Wallet {
    keypair_bytes: [u8; 64],
    public_key: [u8; 32],
    address: Address,
}

impl Wallet {
    /// Generate a wallet with a fresh random keypair.
    #[must_use]
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let keypair = Keypair::generate(&mut csprng);
        let public_key = keypair.public.to_bytes();
        Wallet {
            keypair_bytes: keypair.to_bytes(),
            public_key,
            address: address_from_public_key(&public_key),
        }
    }

    /// Restore a wallet from a 32-byte secret key.
    pub fn from_secret_key(secret: &[u8; 32]) -> anyhow::Result<Self> {
        let secret_key = SecretKey::from_bytes(secret)
            .map_err(|e| anyhow::anyhow!("invalid secret key: {}", e))?;
        let public_key: PublicKey = (&secret_key).into();
        let public_key = public_key.to_bytes();

        let mut keypair_bytes = [0u8; 64];
        keypair_bytes[0..32].copy_from_slice(secret);
        keypair_bytes[32..64].copy_from_slice(&public_key);

        Ok(Wallet {
            keypair_bytes,
            public_key,
            address: address_from_public_key(&public_key),
        })
    }

    /// Restore a wallet from a hex-encoded 32-byte secret key.
    /// Accepts an optional `0x` prefix.
    pub fn from_secret_hex(hex_key: &str) -> anyhow::Result<Self> {
        let cleaned = hex_key.strip_prefix("0x").unwrap_or(hex_key);
        let bytes = hex::decode(cleaned).context("secret key is not valid hex")?;
        if bytes.len() != 32 {
            anyhow::bail!("secret key must be 32 bytes, got {}", bytes.len());
        }
        let mut secret = [0u8; 32];
        secret.copy_from_slice(&bytes);
        Self::from_secret_key(&secret)
    }

    /// The ledger address derived from this wallet's public key.
    #[inline]
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// The 32-byte public key. Safe to share.
    #[inline]
    #[must_use]
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    /// Sign arbitrary message bytes, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> anyhow::Result<[u8; 64]> {
        let keypair = Keypair::from_bytes(&self.keypair_bytes)
            .map_err(|e| anyhow::anyhow!("invalid keypair bytes: {}", e))?;
        Ok(keypair.sign(message).to_bytes())
    }

    /// Verify a signature against this wallet's own public key.
    /// Returns `false` for malformed signatures rather than erroring.
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        if signature.len() != 64 {
            return false;
        }
        let sig = match Signature::from_bytes(signature) {
            Ok(s) => s,
            Err(_) => return false,
        };
        let public_key = match PublicKey::from_bytes(&self.public_key) {
            Ok(pk) => pk,
            Err(_) => return false,
        };
        public_key.verify(message, &sig).is_ok()
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never the secret half of the keypair
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .field("public_key", &hex::encode(self.public_key))
            .finish()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// IDENTITY
// ════════════════════════════════════════════════════════════════════════════

/// Ephemeral signing identity for one test run: a fresh wallet plus its
/// cached address. Created by the identity pool, never persisted.
#[derive(Debug, Clone)]
pub struct Identity {
    wallet: Wallet,
    address: Address,
}

impl Identity {
    /// Create an identity with a freshly generated keypair.
    #[must_use]
    pub fn fresh() -> Self {
        let wallet = Wallet::generate();
        let address = wallet.address();
        Identity { wallet, address }
    }

    #[inline]
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    #[inline]
    #[must_use]
    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }
}

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════
