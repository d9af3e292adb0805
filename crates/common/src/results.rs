//! The payload returned to the caller once a storage operation completes
//!
//! Layout: `write time || pair || pair || ...` with pairs read until the
//! buffer is exhausted.

use bytes::Buf;
use chrono::{DateTime, Duration, Utc};

use crate::codec::{self, CodecError};
use crate::pair::{Pair, PairError};

#[derive(Debug, thiserror::Error)]
pub enum ResultsError {
    #[error("Malformed results: {0}")]
    Malformed(String),
}

impl From<CodecError> for ResultsError {
    fn from(e: CodecError) -> Self {
        ResultsError::Malformed(e.to_string())
    }
}

impl From<PairError> for ResultsError {
    fn from(e: PairError) -> Self {
        ResultsError::Malformed(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Results {
    pub write_time: DateTime<Utc>,
    pub values: Vec<Pair>,
}

impl Results {
    pub fn new(write_time: DateTime<Utc>, values: Vec<Pair>) -> Self {
        Self { write_time, values }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ResultsError> {
        let mut buf = Vec::new();
        codec::write_time(&mut buf, &self.write_time);
        for pair in &self.values {
            pair.write_to(&mut buf)?;
        }
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ResultsError> {
        let mut reader = data;
        let write_time = codec::read_time(&mut reader)?;
        let mut values = Vec::new();
        while reader.has_remaining() {
            values.push(Pair::read_from(&mut reader)?);
        }
        Ok(Self { write_time, values })
    }

    pub fn is_timestamp_valid(&self, max_age: Duration) -> bool {
        self.is_timestamp_valid_at(Utc::now(), max_age)
    }

    /// Fresh while the age of the write time is at most `max_age`
    pub fn is_timestamp_valid_at(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.write_time <= max_age
    }
}
