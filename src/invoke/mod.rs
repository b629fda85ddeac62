//! Invocation pipeline
//!
//! Host -> native: [`create_function`] registers a [`CallbackHolder`] behind
//! the `dispatch_callback` trampoline. Each call builds an [`Arguments`]
//! cursor, extracts the parameters the [`CallableDescriptor`] lists, runs the
//! native callable inside a panic boundary and converts its return value.
//!
//! Native -> host: [`HostFunction`] converts arguments with `ToHost`, calls
//! inside a callback scope and converts the result with `FromHost`.

mod arguments;
mod callable;
mod descriptor;
mod function;


pub use arguments::Arguments;
pub use callable::{
    Callable, CallbackHolder, FromArguments, IntoHostArgs, IntoHostReturn, MethodCallable, Owned,
};
pub use descriptor::{CallFlags, CallableDescriptor, ParamSpec};
pub use function::{create_function, HostFunction, NativeFunction};

pub(crate) use callable::{guard_panics, throw_conversion_failure};
