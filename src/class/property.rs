//! Class members and their property attributes

use std::rc::Rc;

use crate::abi::{AbiResult, PropertyAttributes, PropertyDescriptor, Value};
use crate::context::Env;
use crate::invoke::{create_function, CallbackHolder};

/// Methods: writable and configurable, hidden from enumeration.
pub const METHOD_ATTRIBUTES: PropertyAttributes = PropertyAttributes {
    writable: true,
    enumerable: false,
    configurable: true,
};

/// Accessors: enumerable, cannot be redefined.
pub const ACCESSOR_ATTRIBUTES: PropertyAttributes = PropertyAttributes {
    writable: false,
    enumerable: true,
    configurable: false,
};

pub const VALUE_ATTRIBUTES: PropertyAttributes = PropertyAttributes::DEFAULT_JS;

pub(crate) type MakeValue = Rc<dyn Fn(&Env) -> AbiResult<Value>>;

pub(crate) enum Member {
    Method {
        name: &'static str,
        holder: Rc<CallbackHolder>,
        is_static: bool,
    },
    Accessor {
        name: &'static str,
        getter: Rc<CallbackHolder>,
        setter: Option<Rc<CallbackHolder>>,
    },
    /// Constant on the constructor.
    Value { name: &'static str, make: MakeValue },
}

impl Member {
    pub(crate) fn name(&self) -> &str {
        match self {
            Member::Method { name, .. } | Member::Accessor { name, .. } | Member::Value { name, .. } => {
                name
            }
        }
    }
}

/// Install `members` on a freshly defined class.
pub(crate) fn define_members(env: &Env, constructor: Value, members: &[Member]) -> AbiResult<()> {
    let host = env.host();
    let prototype = host.get_named_property(constructor, "prototype")?;

    for member in members {
        let _scope = env.handle_scope();
        match member {
            Member::Method {
                name,
                holder,
                is_static,
            } => {
                let function = create_function(env, name, holder.clone())?;
                let target = if *is_static { constructor } else { prototype };
                host.define_property(
                    target,
                    &PropertyDescriptor {
                        name,
                        value: Some(function),
                        getter: None,
                        setter: None,
                        attributes: METHOD_ATTRIBUTES,
                    },
                )?;
            }
            Member::Accessor {
                name,
                getter,
                setter,
            } => {
                let getter = create_function(env, name, getter.clone())?;
                let setter = setter
                    .as_ref()
                    .map(|setter| create_function(env, name, setter.clone()))
                    .transpose()?;
                host.define_property(
                    prototype,
                    &PropertyDescriptor {
                        name,
                        value: None,
                        getter: Some(getter),
                        setter,
                        attributes: ACCESSOR_ATTRIBUTES,
                    },
                )?;
            }
            Member::Value { name, make } => {
                let value = make(env)?;
                host.define_property(
                    constructor,
                    &PropertyDescriptor {
                        name,
                        value: Some(value),
                        getter: None,
                        setter: None,
                        attributes: VALUE_ATTRIBUTES,
                    },
                )?;
            }
        }
    }
    Ok(())
}
