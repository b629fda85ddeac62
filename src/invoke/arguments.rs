//! Cursor over the arguments of one host -> native call

use crate::abi::{CallFrame, ErrorKind, RawPtr, Value};
use crate::context::Env;
use crate::convert::{type_name_of, FromHost};
use crate::error::ConversionError;

use super::descriptor::CallableDescriptor;

/// Arguments of the current call, consumed left to right.
pub struct Arguments<'a> {
    env: &'a Env,
    frame: &'a CallFrame,
    next: usize,
}

impl<'a> Arguments<'a> {
    pub fn new(env: &'a Env, frame: &'a CallFrame) -> Self {
        Self {
            env,
            frame,
            next: 0,
        }
    }

    #[inline]
    pub fn env(&self) -> &'a Env {
        self.env
    }

    #[inline]
    pub fn this(&self) -> Value {
        self.frame.this
    }

    #[inline]
    pub fn data(&self) -> RawPtr {
        self.frame.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frame.argc()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frame.args.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.frame.args.get(index).copied()
    }

    pub fn is_construct_call(&self) -> bool {
        self.frame.is_construct_call()
    }

    pub fn new_target(&self) -> Option<Value> {
        self.frame.new_target
    }

    /// Whether every supplied argument has been consumed.
    #[inline]
    pub fn no_more_args(&self) -> bool {
        self.next >= self.len()
    }

    /// Convert the next argument; `None` if missing or mismatched.
    pub fn get_next<T: FromHost>(&mut self) -> Option<T> {
        let value = self.get(self.next)?;
        self.next += 1;
        T::from_host(self.env, value)
    }

    /// Convert the receiver.
    pub fn this_as<T: FromHost>(&self) -> Option<T> {
        T::from_host(self.env, self.frame.this)
    }

    /// Convert the parameter at `position` of `descriptor`.
    ///
    /// Position 0 reads the receiver when the descriptor takes a holder.
    /// A missing argument only succeeds for types with an absent value;
    /// a supplied argument that fails to convert always fails.
    pub fn extract<T: FromHost>(
        &mut self,
        descriptor: &CallableDescriptor,
        position: usize,
    ) -> Result<T, ConversionError> {
        if position == 0 && descriptor.takes_holder() {
            let this = self.frame.this;
            return T::from_host(self.env, this).ok_or_else(|| ConversionError::ReceiverMismatch {
                expected: T::NAME.to_string(),
                actual: type_name_of(self.env, this),
            });
        }

        let Some(value) = self.get(self.next) else {
            return T::absent().ok_or(ConversionError::InsufficientArguments);
        };
        self.next += 1;

        T::from_argument(self.env, value, descriptor.flags).ok_or_else(|| {
            ConversionError::ArgumentMismatch {
                index: self.next - 1,
                expected: T::NAME.to_string(),
                actual: type_name_of(self.env, value),
            }
        })
    }

    pub fn throw_error(&self, message: &str) {
        let _ = self.env.host().throw_error(ErrorKind::Error, message);
    }

    pub fn throw_type_error(&self, message: &str) {
        let _ = self.env.host().throw_error(ErrorKind::TypeError, message);
    }
}
