//! Callable descriptors: arity, parameter types, conversion flags

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use smallvec::SmallVec;

use crate::convert::FromHost;

/// Per-callable conversion flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CallFlags(u8);

impl CallFlags {
    pub const NONE: Self = Self(0);
    /// The call's receiver fills the first parameter.
    pub const HOLDER_IS_FIRST_ARGUMENT: Self = Self(1 << 0);
    /// Function arguments are held weakly.
    pub const FUNCTION_ARGUMENT_IS_WEAK: Self = Self(1 << 1);

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CallFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CallFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for CallFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::HOLDER_IS_FIRST_ARGUMENT) {
            names.push("HOLDER_IS_FIRST_ARGUMENT");
        }
        if self.contains(Self::FUNCTION_ARGUMENT_IS_WEAK) {
            names.push("FUNCTION_ARGUMENT_IS_WEAK");
        }
        if names.is_empty() {
            write!(f, "CallFlags(NONE)")
        } else {
            write!(f, "CallFlags({})", names.join(" | "))
        }
    }
}

/// One parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub type_name: &'static str,
    pub optional: bool,
}

impl ParamSpec {
    pub fn of<T: FromHost>() -> Self {
        Self {
            type_name: T::NAME,
            optional: T::OPTIONAL,
        }
    }
}

/// Compile-time shape of a native callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallableDescriptor {
    pub params: SmallVec<[ParamSpec; 6]>,
    pub flags: CallFlags,
}

impl CallableDescriptor {
    pub fn new(params: SmallVec<[ParamSpec; 6]>, flags: CallFlags) -> Self {
        Self { params, flags }
    }

    /// Number of parameter slots, the holder included.
    #[inline]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    #[inline]
    pub fn takes_holder(&self) -> bool {
        self.flags.contains(CallFlags::HOLDER_IS_FIRST_ARGUMENT) && !self.params.is_empty()
    }

    /// Host arguments a call must supply.
    pub fn required_arguments(&self) -> usize {
        let skip = usize::from(self.takes_holder());
        let params = &self.params[skip..];
        let trailing_optional = params.iter().rev().take_while(|p| p.optional).count();
        params.len() - trailing_optional
    }
}
