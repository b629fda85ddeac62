//! Global builtins of the reference host

use crate::abi::{CallFrame, ErrorKind, Host, Status, Value};
use crate::logging::trace;

use super::SimHost;

/// Install `Object` and `Object.setPrototypeOf` on the global object.
pub(super) fn install(host: &SimHost) -> Result<(), Status> {
    let scope = host.open_handle_scope()?;

    let object_ctor = host.script_function("Object", object_constructor)?;
    let set_prototype_of = host.script_function("setPrototypeOf", set_prototype_of)?;
    host.set_named_property(object_ctor, "setPrototypeOf", set_prototype_of)?;

    let global = host.global()?;
    host.set_named_property(global, "Object", object_ctor)?;

    host.close_handle_scope(scope)
}

fn object_constructor(host: &SimHost, _frame: &CallFrame) -> Option<Value> {
    host.create_object().ok()
}

fn set_prototype_of(host: &SimHost, frame: &CallFrame) -> Option<Value> {
    trace!(argc = frame.argc(), "Object.setPrototypeOf");

    let (Some(&object), Some(&proto)) = (frame.args.first(), frame.args.get(1)) else {
        let _ = host.throw_error(ErrorKind::TypeError, "Object.setPrototypeOf called on null or undefined");
        return None;
    };

    match host.set_prototype(object, proto) {
        Ok(()) => Some(object),
        Err(_) => {
            let _ = host.throw_error(ErrorKind::TypeError, "Object prototype may only be an Object or null");
            None
        }
    }
}
