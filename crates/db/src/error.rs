use loadbay_core::error::CoreError;

/// Errors surfaced by the database layer.
///
/// `Core` covers boundary rejections while mapping rows -- most notably a
/// status string outside the closed set, which fails the fetch before any
/// write can happen.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}
