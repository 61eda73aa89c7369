//! Key derivation service
//!
//! The account manager and the shielding executor only see the
//! [`KeyDerivationService`] trait. [`SeedKeyDerivation`] is the seed-backed
//! implementation: a ZIP-32 shaped tree of BLAKE2b PRF expansions rooted at a
//! BIP-39 seed, with one hardened path `m/32'/coin_type'/account'` per pool.

use crate::account::AccountId;
use crate::address::Receiver;
use crate::diversifier::{DiversifierIndex, DIVERSIFIER_INDEX_BYTES};
use crate::pool::Pool;
use crate::transaction::TransactionDraft;
use crate::{Error, Result};
use bip39::{Language, Mnemonic};
use blake2b_simd::Params as Blake2bParams;
use std::fmt;
use zeroize::Zeroizing;
use zwallet_params::Network;

/// Master key personalization (per-pool domain byte follows the seed)
const MASTER_PERSONALIZATION: &[u8; 16] = b"ZWalletIP32_Seed";
/// PRF^Expand personalization
const PRF_EXPAND_PERSONALIZATION: &[u8; 16] = b"ZWallet_Expand__";
/// Sapling diversifier validity check personalization
const DIVERSIFIER_CHECK_PERSONALIZATION: &[u8; 16] = b"ZWallet_DivCheck";
/// Transparent pubkey hash personalization
const PUBKEY_HASH_PERSONALIZATION: &[u8; 16] = b"ZWallet_PKHash__";
/// Signature personalization
const SIGNATURE_PERSONALIZATION: &[u8; 16] = b"ZWallet_SigHash_";

/// ZIP-32 purpose
const PURPOSE: u32 = 32;
const HARDENED: u32 = 1 << 31;

const DOMAIN_CHILD: u8 = 0x81;
const DOMAIN_DIVERSIFIER: u8 = 0x20;
const DOMAIN_TRANSMISSION_KEY: u8 = 0x21;
const DOMAIN_VIEWING_KEY: u8 = 0x40;

/// Length of the exported viewing key per pool
fn viewing_key_len(pool: Pool) -> usize {
    match pool {
        Pool::Transparent => 65,
        Pool::Sapling => 128,
        Pool::Orchard => 96,
    }
}

/// Opaque key derivation and signing collaborator
pub trait KeyDerivationService: Send + Sync {
    /// Derive the receiver for `pool` at `index`.
    ///
    /// Fails with [`Error::InvalidDiversifier`] when the index has no
    /// receiver in that pool.
    fn derive_receiver(
        &self,
        account: AccountId,
        pool: Pool,
        index: DiversifierIndex,
    ) -> Result<Receiver>;

    /// Read-only viewing key bytes for an account's pool
    fn viewing_key(&self, account: AccountId, pool: Pool) -> Result<Vec<u8>>;

    /// Sign a transaction draft with the account's spending authority in `pool`
    fn sign(&self, account: AccountId, pool: Pool, draft: &TransactionDraft) -> Result<Vec<u8>>;
}

/// Extended key node: 32-byte key plus 32-byte chain code
struct ExtendedKey {
    key: Zeroizing<[u8; 32]>,
    chain_code: Zeroizing<[u8; 32]>,
}

impl ExtendedKey {
    /// I := BLAKE2b-512(personalization, seed || pool typecode)
    fn master(seed: &[u8], pool: Pool) -> Self {
        let i = Blake2bParams::new()
            .hash_length(64)
            .personal(MASTER_PERSONALIZATION)
            .to_state()
            .update(seed)
            .update(&[pool.typecode() as u8])
            .finalize();
        Self::from_wide(i.as_bytes())
    }

    fn from_wide(i: &[u8]) -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        let mut chain_code = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&i[..32]);
        chain_code.copy_from_slice(&i[32..64]);
        Self { key, chain_code }
    }

    /// Hardened child: I := PRF^Expand(c_par, [0x81] || k_par || I2LEOSP(i))
    fn derive_child(&self, index: u32) -> Self {
        let hardened = index | HARDENED;
        let i = prf_expand(
            &self.chain_code[..],
            &[&[DOMAIN_CHILD], &self.key[..], &hardened.to_le_bytes()],
        );
        Self::from_wide(&i)
    }
}

/// PRF^Expand(sk, t) := BLAKE2b-512(personalization, sk || t)
fn prf_expand(sk: &[u8], parts: &[&[u8]]) -> [u8; 64] {
    let mut state = Blake2bParams::new()
        .hash_length(64)
        .personal(PRF_EXPAND_PERSONALIZATION)
        .to_state();
    state.update(sk);
    for part in parts {
        state.update(part);
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(state.finalize().as_bytes());
    out
}

/// Expand to an arbitrary length with a block counter
fn expand_to(sk: &[u8], domain: u8, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut counter: u8 = 0;
    while out.len() < len {
        let block = prf_expand(sk, &[&[domain, counter]]);
        let take = (len - out.len()).min(block.len());
        out.extend_from_slice(&block[..take]);
        counter = counter.wrapping_add(1);
    }
    out
}

/// Seed-backed key derivation service
pub struct SeedKeyDerivation {
    seed: Zeroizing<Vec<u8>>,
    coin_type: u32,
}

impl fmt::Debug for SeedKeyDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedKeyDerivation")
            .field("coin_type", &self.coin_type)
            .finish_non_exhaustive()
    }
}

impl SeedKeyDerivation {
    /// Create from raw seed bytes (32 to 252 bytes)
    pub fn from_seed(seed: &[u8], network: &Network) -> Result<Self> {
        if seed.len() < 32 || seed.len() > 252 {
            return Err(Error::InvalidSeed("Seed must be 32-252 bytes".to_string()));
        }
        Ok(Self {
            seed: Zeroizing::new(seed.to_vec()),
            coin_type: network.coin_type,
        })
    }

    /// Create from a BIP-39 English mnemonic
    pub fn from_mnemonic(mnemonic: &str, passphrase: &str, network: &Network) -> Result<Self> {
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, mnemonic)
            .map_err(|e| Error::InvalidSeed(e.to_string()))?;
        let seed = Zeroizing::new(mnemonic.to_seed(passphrase));
        Self::from_seed(&seed[..], network)
    }

    /// Generate new random mnemonic
    ///
    /// `word_count` is 12, 18 or 24; anything else yields 24 words.
    pub fn generate_mnemonic(word_count: Option<u32>) -> Result<String> {
        let entropy_size = match word_count.unwrap_or(24) {
            12 => 16,
            18 => 24,
            _ => 32,
        };

        let mut entropy = Zeroizing::new(vec![0u8; entropy_size]);
        use rand::RngCore;
        rand::thread_rng().fill_bytes(&mut entropy);

        let mnemonic = Mnemonic::from_entropy(&entropy)
            .map_err(|e| Error::InvalidSeed(e.to_string()))?;
        Ok(mnemonic.to_string())
    }

    /// Path m/32'/coin_type'/account' in the pool's tree
    fn account_key(&self, account: AccountId, pool: Pool) -> ExtendedKey {
        ExtendedKey::master(&self.seed, pool)
            .derive_child(PURPOSE)
            .derive_child(self.coin_type)
            .derive_child(account.index())
    }

    fn diversifier(key: &ExtendedKey, pool: Pool, index: DiversifierIndex) -> [u8; 11] {
        let i = prf_expand(
            &key.key[..],
            &[
                &[DOMAIN_DIVERSIFIER, pool.typecode() as u8],
                &index.to_bytes(),
            ],
        );
        let mut d = [0u8; DIVERSIFIER_INDEX_BYTES];
        d.copy_from_slice(&i[..DIVERSIFIER_INDEX_BYTES]);
        d
    }

    /// Roughly half of all Sapling diversifiers have no valid receiver.
    fn is_valid_sapling_diversifier(d: &[u8; 11]) -> bool {
        let check = Blake2bParams::new()
            .hash_length(32)
            .personal(DIVERSIFIER_CHECK_PERSONALIZATION)
            .hash(d);
        check.as_bytes()[0] & 1 == 0
    }

    fn shielded_receiver(key: &ExtendedKey, pool: Pool, d: [u8; 11]) -> Result<Receiver> {
        let pk_d = prf_expand(&key.key[..], &[&[DOMAIN_TRANSMISSION_KEY], &d]);
        let mut data = Vec::with_capacity(pool.receiver_len());
        data.extend_from_slice(&d);
        data.extend_from_slice(&pk_d[..32]);
        Receiver::new(pool, data)
    }
}

impl KeyDerivationService for SeedKeyDerivation {
    fn derive_receiver(
        &self,
        account: AccountId,
        pool: Pool,
        index: DiversifierIndex,
    ) -> Result<Receiver> {
        let key = self.account_key(account, pool);
        match pool {
            Pool::Transparent => {
                if !index.is_transparent_child() {
                    return Err(Error::InvalidDiversifier {
                        index,
                        reason: "transparent receivers require an index below 2^31".to_string(),
                    });
                }
                let child = index.as_u128() as u32;
                let pubkey = prf_expand(&key.key[..], &[&[0x00], &child.to_le_bytes()]);
                let hash = Blake2bParams::new()
                    .hash_length(20)
                    .personal(PUBKEY_HASH_PERSONALIZATION)
                    .hash(&pubkey[..33]);
                Receiver::new(pool, hash.as_bytes().to_vec())
            }
            Pool::Sapling => {
                let d = Self::diversifier(&key, pool, index);
                if !Self::is_valid_sapling_diversifier(&d) {
                    return Err(Error::InvalidDiversifier {
                        index,
                        reason: "index does not produce a valid Sapling diversifier".to_string(),
                    });
                }
                Self::shielded_receiver(&key, pool, d)
            }
            Pool::Orchard => {
                let d = Self::diversifier(&key, pool, index);
                Self::shielded_receiver(&key, pool, d)
            }
        }
    }

    fn viewing_key(&self, account: AccountId, pool: Pool) -> Result<Vec<u8>> {
        let key = self.account_key(account, pool);
        Ok(expand_to(&key.key[..], DOMAIN_VIEWING_KEY, viewing_key_len(pool)))
    }

    fn sign(&self, account: AccountId, pool: Pool, draft: &TransactionDraft) -> Result<Vec<u8>> {
        let key = self.account_key(account, pool);
        let signature = Blake2bParams::new()
            .hash_length(64)
            .key(&key.key[..])
            .personal(SIGNATURE_PERSONALIZATION)
            .hash(&draft.sighash());
        Ok(signature.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kds() -> SeedKeyDerivation {
        SeedKeyDerivation::from_seed(&[42u8; 32], &Network::regtest()).unwrap()
    }

    #[test]
    fn test_seed_length_bounds() {
        let net = Network::regtest();
        assert!(matches!(
            SeedKeyDerivation::from_seed(&[0u8; 16], &net),
            Err(Error::InvalidSeed(_))
        ));
        assert!(SeedKeyDerivation::from_seed(&[0u8; 64], &net).is_ok());
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = kds();
        let b = kds();
        let account = AccountId::from(0u32);
        let idx = DiversifierIndex::from(3u32);
        assert_eq!(
            a.derive_receiver(account, Pool::Orchard, idx).unwrap(),
            b.derive_receiver(account, Pool::Orchard, idx).unwrap()
        );
        assert_ne!(
            a.derive_receiver(account, Pool::Orchard, idx).unwrap(),
            a.derive_receiver(AccountId::from(1u32), Pool::Orchard, idx).unwrap()
        );
    }

    #[test]
    fn test_transparent_child_limit() {
        let kds = kds();
        let account = AccountId::from(0u32);
        let ok = kds
            .derive_receiver(account, Pool::Transparent, DiversifierIndex::from(7u32))
            .unwrap();
        assert_eq!(ok.data().len(), 20);

        let err = kds
            .derive_receiver(account, Pool::Transparent, DiversifierIndex::from(1u64 << 31))
            .unwrap_err();
        assert!(err.to_string().contains("no address at diversifier index 2147483648"));
    }

    #[test]
    fn test_sapling_has_invalid_indices() {
        let kds = kds();
        let account = AccountId::from(0u32);
        let results: Vec<bool> = (0u32..64)
            .map(|i| {
                kds.derive_receiver(account, Pool::Sapling, DiversifierIndex::from(i))
                    .is_ok()
            })
            .collect();
        assert!(results.iter().any(|ok| *ok));
        assert!(results.iter().any(|ok| !*ok));
    }

    #[test]
    fn test_viewing_key_lengths() {
        let kds = kds();
        let account = AccountId::from(0u32);
        assert_eq!(kds.viewing_key(account, Pool::Transparent).unwrap().len(), 65);
        assert_eq!(kds.viewing_key(account, Pool::Sapling).unwrap().len(), 128);
        assert_eq!(kds.viewing_key(account, Pool::Orchard).unwrap().len(), 96);
    }

    #[test]
    fn test_generate_mnemonic() {
        let phrase = SeedKeyDerivation::generate_mnemonic(Some(12)).unwrap();
        assert_eq!(phrase.split_whitespace().count(), 12);
        assert!(SeedKeyDerivation::from_mnemonic(&phrase, "", &Network::regtest()).is_ok());
        assert!(SeedKeyDerivation::from_mnemonic("not a mnemonic", "", &Network::regtest()).is_err());
    }
}
