// chain-core/src/types.rs

/// Block number/height
pub type BlockNumber = u64;

/// Timestamp in Unix epoch seconds
pub type Timestamp = u64;
