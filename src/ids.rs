//! Identifier generation backed by an injected randomness source.
//!
//! [`IdGenerator`] never reaches for a process-wide RNG: callers hand it the
//! byte source, so a seeded source yields the same identifiers on every run.

use std::sync::Mutex;

use rand::RngCore;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IdError {
    #[error("generate UUID: {0}")]
    Source(#[from] rand::Error),

    #[error("generate UUID: randomness source is poisoned")]
    Poisoned,
}

/// Mints version 4 UUIDs from the wrapped byte stream.
pub struct IdGenerator<R> {
    rng: Mutex<R>,
}

impl<R: RngCore> IdGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// Draws 16 bytes from the source and shapes them into a v4 UUID.
    pub fn next_uuid(&self) -> Result<Uuid, IdError> {
        let mut bytes = [0u8; 16];
        let mut rng = self.rng.lock().map_err(|_| IdError::Poisoned)?;
        rng.try_fill_bytes(&mut bytes)?;
        Ok(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }
}

/// Object-safe view of [`IdGenerator`] so activities don't need to be generic
/// over the source type.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> Result<Uuid, IdError>;
}

impl<R: RngCore + Send> IdSource for IdGenerator<R> {
    fn next_id(&self) -> Result<Uuid, IdError> {
        self.next_uuid()
    }
}
