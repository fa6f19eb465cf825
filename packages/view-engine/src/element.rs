//! Element Bindings
//!
//! Render-facing element bindings checked during the update-renderer
//! phase: attributes, classes, styles and properties. Values crossing a
//! non-default security context pass through the sanitizer first.

use crate::errors::EngineError;
use crate::types::*;
use crate::view::{check_and_update_binding, check_binding_no_changes, CheckMode, ViewEngine};

pub(crate) fn check_and_update_element(
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

    let root = eng.view(view)?.root.clone();
    let render_node = eng.view(view)?.node(node.node_index).as_element().render_node;
    for (i, value) in values.iter().enumerate() {
        if !check_and_update_binding(eng, view, node, i, value)? {
            continue;
        }
        let binding = &node.bindings[i];
        let value = if binding.security_context != SecurityContext::None {
            root.sanitizer.sanitize(binding.security_context, value)
        } else {
            value.clone()
        };
        let name = binding.name.as_deref().unwrap_or("");
        let mut renderer = root.renderer.borrow_mut();
        if binding.flags.contains(BindingFlags::TYPE_ELEMENT_ATTRIBUTE) {
            let rendered = value.to_render_string();
            renderer.set_attribute(render_node, binding.ns.as_deref(), name, rendered.as_deref());
        } else if binding.flags.contains(BindingFlags::TYPE_ELEMENT_CLASS) {
            if value.truthy() {
                renderer.add_class(render_node, name);
            } else {
                renderer.remove_class(render_node, name);
            }
        } else if binding.flags.contains(BindingFlags::TYPE_ELEMENT_STYLE) {
            match value.to_render_string() {
                Some(mut s) => {
                    if let Some(suffix) = &binding.suffix {
                        s.push_str(suffix);
                    }
                    renderer.set_style(render_node, name, Some(&s));
                }
                None => renderer.set_style(render_node, name, None),
            }
        } else {
            // Plain and synthetic properties share the renderer channel.
            renderer.set_property(render_node, name, &value);
        }
    }
    Ok(())
}
