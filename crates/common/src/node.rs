//! A named participant in a Swift network
//!
//! Nodes hold an ordered list of key epochs ([`Secret`]s) kept newest first.
//! Encryption always uses the newest epoch while decryption tries every
//! epoch in order, so operations started before a key rotation still open
//! after it. Rotation takes the write side of the lock; encrypt/decrypt work
//! on a read snapshot.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::codec::{self, CodecError};
use crate::crypto::{Secret, SecretError, NONCE_SIZE};
use crate::pair::{Conflict, Pair, PairError};

/// What a node does in its network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Accepts server initiated requests and creates operations
    Access,
    /// Takes part in storage bounces
    Storage,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("No secrets for node '{0}'")]
    NoSecrets(String),
    #[error("No secret for node '{domain}' could decrypt the data: {source}")]
    NoSecretDecrypted {
        domain: String,
        #[source]
        source: SecretError,
    },
    #[error("Node domain must not be empty")]
    EmptyDomain,
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("scrambled value is not valid UTF-8")]
    Utf8,
    #[error("Value for cookie '{0}' zero length")]
    EmptyCookie(String),
    #[error("Time for cookie '{0}' invalid")]
    InvalidCookieTime(String),
    #[error("Value for cookie '{name}' error '{source}'")]
    InvalidCookieValue {
        name: String,
        #[source]
        source: PairError,
    },
    #[error("pair error: {0}")]
    Pair(#[from] PairError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

pub struct Node {
    network: String,
    domain: String,
    hash: u32,
    created: DateTime<Utc>,
    expires: DateTime<Utc>,
    role: Role,
    secrets: RwLock<Vec<Secret>>,
    scrambler: Secret,
    nonce: [u8; NONCE_SIZE],
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("network", &self.network)
            .field("domain", &self.domain)
            .field("hash", &self.hash)
            .field("role", &self.role)
            .field("expires", &self.expires)
            .field("secrets", &self.secrets.read().len())
            .finish_non_exhaustive()
    }
}

/// 32-bit digest used to place domains and client addresses on the ring
pub fn hash32(value: &str) -> u32 {
    let digest = blake3::hash(value.as_bytes());
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&digest.as_bytes()[..4]);
    u32::from_be_bytes(bytes)
}

/// Fill a nonce by cycling through the domain's bytes
fn make_nonce(domain: &str) -> Result<[u8; NONCE_SIZE], NodeError> {
    let bytes = domain.as_bytes();
    if bytes.is_empty() {
        return Err(NodeError::EmptyDomain);
    }
    let mut nonce = [0u8; NONCE_SIZE];
    for (i, b) in nonce.iter_mut().enumerate() {
        *b = bytes[i % bytes.len()];
    }
    Ok(nonce)
}

impl Node {
    pub fn new(
        network: impl Into<String>,
        domain: impl Into<String>,
        created: DateTime<Utc>,
        expires: DateTime<Utc>,
        role: Role,
        scrambler: Secret,
    ) -> Result<Self, NodeError> {
        let domain = domain.into();
        let nonce = make_nonce(&domain)?;
        Ok(Self {
            network: network.into(),
            hash: hash32(&domain),
            domain,
            created,
            expires,
            role,
            secrets: RwLock::new(Vec::new()),
            scrambler,
            nonce,
        })
    }

    /* Getters */

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    /// True while the node has not retired and holds at least one secret
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires > now && !self.secrets.read().is_empty()
    }

    /* Key epochs */

    /// Add a key epoch and re-establish newest-first order. Epochs with the
    /// same timestamp keep the most recently added one first.
    pub fn add_secret(&self, secret: Secret) {
        let mut secrets = self.secrets.write();
        secrets.insert(0, secret);
        secrets.sort_by(|a, b| b.time_stamp().cmp(&a.time_stamp()));
        tracing::debug!(domain = %self.domain, epochs = secrets.len(), "added node secret");
    }

    /// The newest key epoch, used for all new encryption
    pub fn secret(&self) -> Result<Secret, NodeError> {
        self.secrets
            .read()
            .first()
            .cloned()
            .ok_or_else(|| NodeError::NoSecrets(self.domain.clone()))
    }

    /// Snapshot of every held epoch, newest first
    pub fn secrets(&self) -> Vec<Secret> {
        self.secrets.read().clone()
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, NodeError> {
        Ok(self.secret()?.compress_and_encrypt(data)?)
    }

    /// Try every held epoch in order and return the first successful open
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, NodeError> {
        let secrets = self.secrets();
        let mut last_error = None;
        for secret in &secrets {
            match secret.decrypt_and_decompress(data) {
                Ok(plain) => return Ok(plain),
                Err(e) => last_error = Some(e),
            }
        }
        match last_error {
            Some(source) => Err(NodeError::NoSecretDecrypted {
                domain: self.domain.clone(),
                source,
            }),
            None => Err(NodeError::NoSecrets(self.domain.clone())),
        }
    }

    /* Scrambling */

    /// Repeatable opaque token for a short identifier
    pub fn scramble(&self, value: &str) -> Result<String, NodeError> {
        self.scramble_bytes(value.as_bytes())
    }

    pub fn unscramble(&self, token: &str) -> Result<String, NodeError> {
        String::from_utf8(self.unscramble_bytes(token)?).map_err(|_| NodeError::Utf8)
    }

    fn scramble_bytes(&self, data: &[u8]) -> Result<String, NodeError> {
        let sealed = self.scrambler.encrypt_with_nonce(data, &self.nonce)?;
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    fn unscramble_bytes(&self, token: &str) -> Result<Vec<u8>, NodeError> {
        let sealed = URL_SAFE_NO_PAD.decode(token)?;
        Ok(self.scrambler.decrypt(&sealed)?)
    }

    /* Cookies */

    /// Cookie name for a stored pair: the scrambled framing of
    /// `table || key`, plus a value digest for Add pairs so that a list of
    /// values can be held for a single key.
    pub fn cookie_name(&self, table: &str, pair: &Pair) -> Result<String, NodeError> {
        let mut buf = Vec::new();
        codec::write_string(&mut buf, table)?;
        codec::write_string(&mut buf, &pair.key)?;
        if pair.conflict == Conflict::Add {
            let digest = blake3::hash(pair.value.as_bytes()).to_hex();
            codec::write_string(&mut buf, &digest[..8])?;
        }
        self.scramble_bytes(&buf)
    }

    /// The table a cookie written by [`Node::cookie_name`] belongs to
    pub fn cookie_table(&self, name: &str) -> Result<String, NodeError> {
        let data = self.unscramble_bytes(name)?;
        Ok(codec::read_string(&mut data.as_slice())?)
    }

    /// Cookie value holding `write time || pair`, encrypted under this node
    pub fn value_to_cookie(
        &self,
        pair: &Pair,
        write_time: DateTime<Utc>,
    ) -> Result<String, NodeError> {
        let mut buf = Vec::new();
        codec::write_time(&mut buf, &write_time);
        pair.write_to(&mut buf)?;
        Ok(URL_SAFE_NO_PAD.encode(self.encrypt(&buf)?))
    }

    pub fn value_from_cookie(&self, name: &str, value: &str) -> Result<Pair, NodeError> {
        let sealed = URL_SAFE_NO_PAD.decode(value)?;
        let data = self.decrypt(&sealed)?;
        if data.is_empty() {
            return Err(NodeError::EmptyCookie(name.to_string()));
        }
        let mut reader = data.as_slice();
        let write_time = codec::read_time(&mut reader)
            .map_err(|_| NodeError::InvalidCookieTime(name.to_string()))?;
        let mut pair =
            Pair::read_from(&mut reader).map_err(|source| NodeError::InvalidCookieValue {
                name: name.to_string(),
                source,
            })?;
        pair.cookie_write_time = Some(write_time);
        Ok(pair)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Duration;

    fn make_node(domain: &str) -> Node {
        let now = Utc::now();
        Node::new(
            "net",
            domain,
            now,
            now + Duration::days(30),
            Role::Storage,
            Secret::generate().unwrap(),
        )
        .unwrap()
    }

    fn secret_at(offset_days: i64) -> Secret {
        let key = Secret::generate().unwrap();
        Secret::from_key(&key.key_string(), Utc::now() + Duration::days(offset_days)).unwrap()
    }

    #[test]
    fn test_nonce_cycles_domain_bytes() {
        let nonce = make_nonce("abc").unwrap();
        assert_eq!(&nonce, b"abcabcabcabc");
        let nonce = make_nonce("a-very-long-domain.com").unwrap();
        assert_eq!(&nonce, b"a-very-long-");
        assert!(matches!(make_nonce(""), Err(NodeError::EmptyDomain)));
    }

    #[test]
    fn test_inactive_without_secrets() {
        let node = make_node("a.com");
        assert!(!node.is_active());
        node.add_secret(Secret::generate().unwrap());
        assert!(node.is_active());
        assert!(!node.is_active_at(node.expires()));
    }

    #[test]
    fn test_newest_secret_encrypts() {
        let node = make_node("a.com");
        let old = secret_at(-2);
        let new = secret_at(0);
        // Insert newest first to show ordering does not depend on insertion
        node.add_secret(new.clone());
        node.add_secret(old.clone());

        assert_eq!(node.secret().unwrap(), new);
        let sealed = node.encrypt(b"payload").unwrap();
        assert!(new.decrypt_and_decompress(&sealed).is_ok());
        assert!(old.decrypt_and_decompress(&sealed).is_err());
    }

    #[test]
    fn test_last_added_secret_encrypts_on_equal_timestamps() {
        let node = make_node("a.com");
        let created = Utc::now();
        let first = Secret::from_key(&Secret::generate().unwrap().key_string(), created).unwrap();
        let second = Secret::from_key(&Secret::generate().unwrap().key_string(), created).unwrap();
        node.add_secret(first.clone());
        node.add_secret(second.clone());

        assert_eq!(node.secret().unwrap(), second);
        let sealed = node.encrypt(b"payload").unwrap();
        assert!(second.decrypt_and_decompress(&sealed).is_ok());
        assert!(first.decrypt_and_decompress(&sealed).is_err());
    }

    #[test]
    fn test_old_epoch_still_decrypts_after_rotation() {
        let node = make_node("a.com");
        node.add_secret(secret_at(-2));
        let sealed = node.encrypt(b"before rotation").unwrap();

        node.add_secret(secret_at(0));
        assert_eq!(node.decrypt(&sealed).unwrap(), b"before rotation");
    }

    #[test]
    fn test_decrypt_surfaces_last_error() {
        let node = make_node("a.com");
        assert!(matches!(node.decrypt(b"anything"), Err(NodeError::NoSecrets(_))));

        node.add_secret(secret_at(0));
        let foreign = Secret::generate().unwrap().compress_and_encrypt(b"x").unwrap();
        assert!(matches!(
            node.decrypt(&foreign),
            Err(NodeError::NoSecretDecrypted {
                source: SecretError::AuthenticationFailed,
                ..
            })
        ));
    }

    #[test]
    fn test_scramble_is_deterministic_and_reversible() {
        let node = make_node("storage.example.com");
        let a = node.scramble("access.example.com").unwrap();
        let b = node.scramble("access.example.com").unwrap();
        assert_eq!(a, b);
        assert_eq!(node.unscramble(&a).unwrap(), "access.example.com");
    }

    #[test]
    fn test_cookie_round_trip() {
        let node = make_node("a.com");
        node.add_secret(secret_at(0));
        let now = Utc::now();
        let pair = Pair::new(
            "id",
            "42",
            Conflict::NewestWins,
            now,
            now + Duration::days(10),
        );

        let value = node.value_to_cookie(&pair, now).unwrap();
        let read = node.value_from_cookie("id", &value).unwrap();
        assert_eq!(read.key, "id");
        assert_eq!(read.value, "42");
        assert_eq!(
            read.cookie_write_time.map(|t| t.timestamp_millis()),
            Some(now.timestamp_millis())
        );
    }

    #[test]
    fn test_empty_cookie_rejected() {
        let node = make_node("a.com");
        node.add_secret(secret_at(0));
        let empty = URL_SAFE_NO_PAD.encode(node.encrypt(b"").unwrap());
        assert!(matches!(
            node.value_from_cookie("c", &empty),
            Err(NodeError::EmptyCookie(_))
        ));
    }

    #[test]
    fn test_cookie_names_per_policy() {
        let node = make_node("a.com");
        let now = Utc::now();
        let later = now + Duration::days(1);
        let a1 = Pair::new("tags", "one", Conflict::Add, now, later);
        let a2 = Pair::new("tags", "two", Conflict::Add, now, later);
        let n1 = Pair::new("id", "one", Conflict::NewestWins, now, later);
        let n2 = Pair::new("id", "two", Conflict::NewestWins, now, later);

        assert_ne!(
            node.cookie_name("t", &a1).unwrap(),
            node.cookie_name("t", &a2).unwrap()
        );
        assert_eq!(
            node.cookie_name("t", &n1).unwrap(),
            node.cookie_name("t", &n2).unwrap()
        );
    }

    #[test]
    fn test_cookie_names_keep_tables_apart() {
        let node = make_node("a.com");
        let now = Utc::now();
        let later = now + Duration::days(1);
        let dotted_key = Pair::new("b.secret", "x", Conflict::NewestWins, now, later);
        let plain_key = Pair::new("secret", "x", Conflict::NewestWins, now, later);

        let in_a = node.cookie_name("a", &dotted_key).unwrap();
        let in_ab = node.cookie_name("a.b", &plain_key).unwrap();
        assert_ne!(in_a, in_ab);
        assert_eq!(node.cookie_table(&in_a).unwrap(), "a");
        assert_eq!(node.cookie_table(&in_ab).unwrap(), "a.b");

        let tag = Pair::new("tags", "one", Conflict::Add, now, later);
        assert_eq!(
            node.cookie_table(&node.cookie_name("a", &tag).unwrap()).unwrap(),
            "a"
        );
        assert!(node.cookie_table("not-a-cookie").is_err());
    }
}
