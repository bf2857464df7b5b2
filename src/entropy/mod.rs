pub mod golomb;
pub mod range;
pub mod tables;

pub use range::{AdaptiveBitModel, BitEstimator, EntropyDecoder, EntropyEncoder};
