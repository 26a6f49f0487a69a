//! Built-in functions callable from hook expressions.
//!
//! Every function is registered in a [`FunctionRegistry`] together with its
//! [`Signature`]. The registry is built once, shared read-only by every
//! request, and checks each call against the signature (arity, variadic
//! minimum, argument conversion) before the implementation runs.
//!
//! Categories:
//! - lookups: `header`, `payload`, `param`, `url`
//! - HMAC digests: `sha1`, `sha256`, `sha512`
//! - network: `cidr`
//! - text and regex: `match`, `find`, `contains`, `upper`, `lower`, `len`,
//!   `format`, `concat`, `join`, `float`
//! - logic and comparison: `and`, `or`, `not`, `all`, `any`, `eq`, `ne`,
//!   `ge`, `gt`, `le`, `lt`
//! - time: `duration`, `since`
//! - encoding and host: `base64encode`, `base64decode`, `getenv`,
//!   `readfile`, `debug`

mod crypto;
mod encoding;
mod lookup;
mod logic;
mod network;
pub mod registry;
mod text;
mod time;
pub mod types;

pub use crypto::constant_time_eq;
pub use registry::{FunctionRegistry, FunctionRegistryBuilder, RegistryError};
pub use text::CaptureShape;
pub use time::parse_duration;
pub use types::{
    Function, FunctionError, FunctionImpl, FunctionResult, NativeFunction, Param, ParamType,
    ReturnType, Signature, Variadic,
};
