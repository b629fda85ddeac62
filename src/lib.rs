//! hostbind - typed bindings between Rust and a garbage-collected host runtime
//!
//! The bridge speaks a C-level embedding ABI ([`abi::Host`]) and provides:
//! - value conversion in both directions ([`ToHost`], [`FromHost`])
//! - Rust closures exposed as host functions, with argument checking
//!   ([`NativeFunction`], [`Env::function`])
//! - host functions called from Rust ([`HostFunction`])
//! - Rust types exposed as host classes ([`NativeClass`], [`ClassBuilder`])
//! - a per-runtime wrapper cache so one native pointer maps to one host
//!   object while that object lives ([`Env::wrap`], [`WrapperState`])
//!
//! [`sim::SimHost`] is an in-process host used by the tests and benchmarks.

pub mod abi;
pub mod class;
pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod invoke;
pub mod lifetime;
pub mod logging;
pub mod persistent;
pub mod scope;
pub mod sim;

// Re-export commonly used items
pub use abi::{Host, HostRef, Value, ValueType};
pub use class::{ClassBuilder, Constructor, NativeClass, Ptr, TypeDescriptor};
pub use config::{BridgeConfig, Config, ConfigError, LoggingConfig};
pub use context::{BridgeStats, Env, RuntimeContext};
pub use convert::{Either, FromHost, Null, ToHost, Undefined, Utf16String};
pub use error::{BindError, BindResult, ConversionError};
pub use invoke::{Arguments, CallFlags, HostFunction, NativeFunction, Owned};
pub use lifetime::WrapperState;
pub use persistent::Reference;
pub use scope::{CallbackScope, HandleScope};

/// Bind to `host` using the configuration found by [`Config::discover`].
///
/// Installs the logging subscriber described by the `[logging]` table the
/// first time it is called in a process. An already bound host keeps its
/// existing configuration.
pub fn init(host: HostRef) -> Env {
    let config = Config::discover();
    config.init_logging();
    Env::with_config(host, config)
}
