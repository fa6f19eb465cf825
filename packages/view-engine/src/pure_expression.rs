//! Pure Expressions
//!
//! Memoized array, object and pipe expressions. The node caches its
//! result and only recomputes when at least one argument binding changed,
//! so downstream identity comparisons stay stable across cycles.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::errors::EngineError;
use crate::types::*;
use crate::view::{check_and_update_binding, check_binding_no_changes, CheckMode, ViewEngine};

pub(crate) fn check_and_update_pure_expression(
    eng: &mut ViewEngine,
    view: ViewId,
    node: &NodeDef,
    values: &[Value],
    mode: CheckMode,
) -> Result<(), EngineError> {
    if mode == CheckMode::CheckNoChanges {
        for (i, value) in values.iter().enumerate() {
            check_binding_no_changes(eng, view, node, i, value)?;
        }
        return Ok(());
    }

    let mut changed = false;
    for (i, value) in values.iter().enumerate() {
        if check_and_update_binding(eng, view, node, i, value)? {
            changed = true;
        }
    }
    if !changed {
        return Ok(());
    }

    let result = if node.flags.contains(NodeFlags::TYPE_PURE_ARRAY) {
        Value::list(values.to_vec())
    } else if node.flags.contains(NodeFlags::TYPE_PURE_OBJECT) {
        let mut map = IndexMap::new();
        for (i, value) in values.iter().enumerate() {
            let key = node.bindings[i]
                .name
                .clone()
                .unwrap_or_else(|| i.to_string());
            map.insert(key, value.clone());
        }
        Value::Map(Rc::new(map))
    } else {
        // Pure pipe: binding 0 carries the pipe instance, the rest are
        // the transformation arguments.
        let (pipe, args) = values.split_first().ok_or_else(|| {
            EngineError::Misconfigured(format!(
                "pure pipe node {} checked without a pipe instance",
                node.node_index
            ))
        })?;
        match pipe.as_instance() {
            Some(instance) => instance.borrow().transform(args),
            None => {
                return Err(EngineError::Misconfigured(format!(
                    "pure pipe node {} received a non-instance value for its pipe",
                    node.node_index
                )))
            }
        }
    };
    eng.view_mut(view)?.nodes[node.node_index].as_pure_expression_mut().value = result;
    Ok(())
}
