use thiserror::Error;

/// Why a frame could not be scored.
///
/// Every variant is treated as an inconclusive result by the relay, never as
/// a negative one.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("classifier did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    #[error("classifier returned an invalid score: {0}")]
    InvalidScore(String),

    #[error("frame could not be prepared for the classifier: {0}")]
    Decode(String),
}
