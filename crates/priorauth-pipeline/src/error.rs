use priorauth_ai::ServiceError;
use priorauth_core::ResponseError;
use priorauth_store::StoreError;
use thiserror::Error;

/// Failure extracting one record, or of the extraction batch itself.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("completion failed: {0}")]
    Service(#[from] ServiceError),

    #[error("unusable extraction: {0}")]
    Response(#[from] ResponseError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

impl ExtractionError {
    /// Short label for per-record logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Service(e) if e.is_transient() => "transient",
            Self::Service(_) => "service",
            Self::Response(_) => "malformed",
            Self::Store(_) => "store",
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no case produced an embeddable text; nothing to index")]
    NothingToIndex,

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embed query: {0}")]
    Service(#[from] ServiceError),

    #[error("query embedding has zero norm")]
    ZeroQuery,

    #[error("index: {0}")]
    Store(#[from] StoreError),
}

/// A decision request that produced no decision.
#[derive(Debug, Error)]
pub enum DecisionSynthesisError {
    #[error("retrieve similar cases: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("load policies: {0}")]
    Policy(#[from] StoreError),

    #[error("encode similar cases: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("completion failed: {0}")]
    Service(#[from] ServiceError),

    #[error("invalid decision: {source}; raw response: {excerpt}")]
    Malformed {
        #[source]
        source: ResponseError,
        excerpt: String,
    },
}
