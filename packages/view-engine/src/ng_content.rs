//! Content Projection
//!
//! Projection slots place caller-supplied render nodes into the view at
//! instantiation time. The slot set is fixed for the view's lifetime;
//! projected nodes belong to the caller and are never destroyed by the
//! projecting view.

use crate::errors::EngineError;
use crate::types::*;
use crate::view::ViewEngine;

/// Append the projectable nodes for the slot at `node_index` into the
/// slot's render position. A missing slot projects nothing.
pub(crate) fn append_projected_nodes(
    eng: &mut ViewEngine,
    view: ViewId,
    node_index: usize,
) -> Result<(), EngineError> {
    let def = eng.view(view)?.def.clone();
    let root = eng.view(view)?.root.clone();
    let slot = def.nodes[node_index].ng_content().index;
    let projected: Vec<RenderNode> =
        root.projectable_nodes.get(slot).cloned().unwrap_or_default();
    if projected.is_empty() {
        return Ok(());
    }
    let parent_rn = match def.nodes[node_index].render_parent {
        Some(rp) => Some(eng.view(view)?.node(rp).as_element().render_node),
        None => host_render_node(eng, view)?,
    };
    if let Some(parent_rn) = parent_rn {
        let mut renderer = root.renderer.borrow_mut();
        for render_node in projected {
            renderer.append_child(parent_rn, render_node);
        }
    }
    Ok(())
}

/// The render node hosting this view's root-level nodes, when the view is
/// a component view. Root and detached embedded views have none.
pub(crate) fn host_render_node(
    eng: &ViewEngine,
    view: ViewId,
) -> Result<Option<RenderNode>, EngineError> {
    if let Some(parent) = eng.view(view)?.parent {
        let host_flags = eng.view(parent.view)?.def.nodes[parent.node_index].flags;
        if host_flags.contains(NodeFlags::COMPONENT_VIEW) {
            return Ok(Some(
                eng.view(parent.view)?.node(parent.node_index).as_element().render_node,
            ));
        }
    }
    Ok(None)
}
