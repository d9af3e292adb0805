//! Key/value pairs carried through a storage operation
//!
//! A pair arrives as a form field whose name encodes how concurrent writes
//! are resolved and when the value expires: `name<op><YYYY-MM-DD>` where
//! `<op>` is one of
//!
//! - `+` ([`Conflict::Add`]): values accumulate into a list for the key
//! - `<` ([`Conflict::OldestWins`]): the value written first is kept
//! - `>` ([`Conflict::NewestWins`]): the value written last is kept

use std::sync::LazyLock;

use bytes::{Buf, BufMut};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

use crate::codec::{self, CodecError};

/// Matches the conflict policy character in an inbound form key
static OPERATION_CHARACTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[<>+]").expect("static pattern is valid"));

const EXPIRY_FORMAT: &str = "%Y-%m-%d";

/// How two values for the same key are reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conflict {
    Add,
    OldestWins,
    NewestWins,
}

impl Conflict {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Conflict::Add),
            '<' => Some(Conflict::OldestWins),
            '>' => Some(Conflict::NewestWins),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Conflict::Add => '+',
            Conflict::OldestWins => '<',
            Conflict::NewestWins => '>',
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Conflict::Add => 1,
            Conflict::OldestWins => 2,
            Conflict::NewestWins => 3,
        }
    }

    fn from_byte(b: u8) -> Result<Self, PairError> {
        match b {
            1 => Ok(Conflict::Add),
            2 => Ok(Conflict::OldestWins),
            3 => Ok(Conflict::NewestWins),
            other => Err(PairError::InvalidConflictByte(other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PairError {
    #[error(
        "Key '{0}' must include a '+' to add the value to a list of values, or '<' (oldest wins) \
         or '>' (newest wins) character to determine how to resolve two values for the same key, \
         followed by a date in YYYY-MM-DD format to indicate when the value expires and is \
         automatically deleted"
    )]
    MissingConflictCharacter(String),
    #[error("Key '{0}' must contain only one '+', '<' or '>' character")]
    MultipleConflictCharacters(String),
    #[error("Key expiry date '{0}' is not a valid YYYY-MM-DD date")]
    InvalidExpiry(String),
    #[error("Key expiry date '{0}' must be in the future")]
    ExpiryInPast(String),
    #[error("Conflict flag {0} is not valid")]
    InvalidConflictByte(u8),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// One stored key/value entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    /// Key with the conflict character and expiry suffix removed
    pub key: String,
    pub value: String,
    pub conflict: Conflict,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    /// Set when the pair was read back from a storage cookie
    pub cookie_write_time: Option<DateTime<Utc>>,
}

impl Pair {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        conflict: Conflict,
        created: DateTime<Utc>,
        expires: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            conflict,
            created,
            expires,
            cookie_write_time: None,
        }
    }

    /// Parse an inbound form field of the shape `name<op><YYYY-MM-DD>`
    pub fn create(form_key: &str, value: &str) -> Result<Self, PairError> {
        Self::create_at(form_key, value, Utc::now())
    }

    pub(crate) fn create_at(
        form_key: &str,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, PairError> {
        let mut matches = OPERATION_CHARACTER.find_iter(form_key);
        let found = matches
            .next()
            .ok_or_else(|| PairError::MissingConflictCharacter(form_key.to_string()))?;
        if matches.next().is_some() || found.len() != 1 {
            return Err(PairError::MultipleConflictCharacters(form_key.to_string()));
        }

        let conflict = form_key[found.start()..]
            .chars()
            .next()
            .and_then(Conflict::from_char)
            .ok_or_else(|| PairError::MissingConflictCharacter(form_key.to_string()))?;

        // Work out the expiry time from the date that follows the conflict
        // character. The value expires at the start of that day.
        let date = &form_key[found.end()..];
        let expires = NaiveDate::parse_from_str(date, EXPIRY_FORMAT)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc())
            .ok_or_else(|| PairError::InvalidExpiry(date.to_string()))?;
        if expires <= now {
            return Err(PairError::ExpiryInPast(date.to_string()));
        }

        Ok(Self::new(
            &form_key[..found.start()],
            value,
            conflict,
            now,
            expires,
        ))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }

    pub fn write_to<B: BufMut>(&self, buf: &mut B) -> Result<(), PairError> {
        codec::write_string(buf, &self.key)?;
        codec::write_string(buf, &self.value)?;
        codec::write_byte(buf, self.conflict.to_byte());
        codec::write_time(buf, &self.created);
        codec::write_time(buf, &self.expires);
        Ok(())
    }

    pub fn read_from<B: Buf>(buf: &mut B) -> Result<Self, PairError> {
        let key = codec::read_string(buf)?;
        let value = codec::read_string(buf)?;
        let conflict = Conflict::from_byte(codec::read_byte(buf)?)?;
        let created = codec::read_time(buf)?;
        let expires = codec::read_time(buf)?;
        Ok(Self::new(key, value, conflict, created, expires))
    }
}

/// Combine the pairs carried by an operation with the pairs a storage node
/// already holds.
///
/// `current` keeps its order; stored pairs are merged into it according to
/// the conflict policy of the pair already present for the key, or appended
/// when the key is new. Expired stored pairs are dropped.
pub fn merge_pairs(current: &[Pair], stored: &[Pair], now: DateTime<Utc>) -> Vec<Pair> {
    let mut merged = current.to_vec();

    for incoming in stored.iter().filter(|p| !p.is_expired_at(now)) {
        let existing = merged.iter().position(|p| p.key == incoming.key);
        let Some(index) = existing else {
            merged.push(incoming.clone());
            continue;
        };

        match merged[index].conflict {
            Conflict::Add => {
                let duplicate = merged
                    .iter()
                    .any(|p| p.key == incoming.key && p.value == incoming.value);
                if !duplicate {
                    merged.push(incoming.clone());
                }
            }
            Conflict::OldestWins => {
                if incoming.created < merged[index].created {
                    merged[index] = incoming.clone();
                }
            }
            Conflict::NewestWins => {
                if incoming.created > merged[index].created {
                    merged[index] = incoming.clone();
                }
            }
        }
    }

    merged
}
