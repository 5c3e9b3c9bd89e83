//! Error taxonomy for cast execution.

use thiserror::Error;

/// Errors surfaced by the cast path.
///
/// Generic over the key type so every variant can name the key it refers
/// to; rendering a variant that carries a key needs `K: Debug`.
#[derive(Debug, Error)]
pub enum CastError<K> {
    /// A transform re-entered a key whose cast is still in flight.
    #[error("cast already in progress for key {key:?}")]
    ReentrantCast { key: K },

    /// `fetch` was asked for a key that is absent, or present with a
    /// nil-like value, and no default was supplied.
    #[error("key not found: {key:?}")]
    KeyNotFound { key: K },

    /// Failure reported by a user transform, forwarded unchanged.
    #[error(transparent)]
    Transform(#[from] Box<dyn std::error::Error + 'static>),
}

impl<K> CastError<K> {
    /// Box a concrete transform failure into [`CastError::Transform`].
    pub fn transform(err: impl std::error::Error + 'static) -> Self {
        Self::Transform(Box::new(err))
    }
}
