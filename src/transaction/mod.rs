/// Private transaction builder and submission errors
pub mod builder;
/// Wire codec for `transact()` calldata
pub mod codec;
/// Direct and relayed submission
pub mod submit;

/// Number of decimal places of pool amounts.
pub const POOL_DECIMALS: u32 = 9;
