pub mod codec;
pub mod config;
pub mod dataset;
pub mod error;
pub mod fields;
pub mod indicators;
pub mod mock;
pub mod params;
pub mod protocol;
pub mod session;
pub mod splits;
pub mod transport;

pub use error::{ClientError, Result};
pub use fields::MpcField;
pub use params::FieldConfig;
pub use protocol::{AuthenticatedResult, SpdzClient, Triple};
