//! Text Bindings
//!
//! Interpolated text nodes. The rendered string is the static prefix
//! followed by each binding's value and its trailing constant; a null
//! value renders as the empty string.

use crate::errors::EngineError;
use crate::types::*;
use crate::view::{check_and_update_binding, check_binding_no_changes, CheckMode, ViewEngine};

pub(crate) fn check_and_update_text(
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
    if changed {
        let text = interpolate(node, values);
        let root = eng.view(view)?.root.clone();
        let render_node = eng.view(view)?.node(node.node_index).as_text().render_node;
        root.renderer.borrow_mut().set_text(render_node, &text);
    }
    Ok(())
}

fn interpolate(node: &NodeDef, values: &[Value]) -> String {
    let mut text = node.text().prefix.clone();
    for (i, value) in values.iter().enumerate() {
        if let Some(rendered) = value.to_render_string() {
            text.push_str(&rendered);
        }
        if let Some(suffix) = node.bindings[i].suffix.as_deref() {
            text.push_str(suffix);
        }
    }
    text
}
