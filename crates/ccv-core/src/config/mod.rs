//! Configuration: the `CcvConfig` loading trait and protocol parameters.

pub mod params;
pub mod traits;

pub use params::{
    ChainParams, ProtocolParams, DEFAULT_TRUSTING_PERIOD, DEFAULT_UNBONDING_PERIOD,
    DEFAULT_VSC_TIMEOUT,
};
pub use traits::CcvConfig;
