//! Wire-level helpers shared by the proxy worker and pipeline.

pub mod headers;
pub mod responses;
pub mod tunnel;
