/// Failures a `RoleStore` implementation can raise.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("duplicate key")]
    DuplicateKey,

    #[error("{0}")]
    Internal(#[from] sqlx::Error),
}
