use crate::feeder::buffer::LineId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeederError {
    #[error("line {id} is not in the buffer")]
    UnknownLine { id: LineId },

    #[error("span {first}..{last} runs backwards")]
    InvertedSpan { first: LineId, last: LineId },

    #[error("buffer consistency check failed: {message}")]
    Inconsistent { message: String },
}
