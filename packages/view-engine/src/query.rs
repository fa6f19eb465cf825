//! Queries
//!
//! Query execution over the bloom-filter masks aggregated at definition
//! time. A query only rescans when its dirty flag is set: every query
//! starts dirty, and container mutations re-dirty the dynamic queries
//! that can observe the affected subtree. Pruning by mask may descend
//! into subtrees without matches (false positives) but never skips one
//! that has them.

use crate::errors::EngineError;
use crate::types::*;
use crate::view::{mark_parent_views_for_check, ViewEngine};

/// Run all content or view queries of one view, in node order.
pub(crate) fn exec_queries(
    eng: &mut ViewEngine,
    view: ViewId,
    kind: NodeFlags,
) -> Result<(), EngineError> {
    let def = eng.view(view)?.def.clone();
    if !def.node_flags.contains(kind) {
        return Ok(());
    }
    for i in 0..def.nodes.len() {
        if def.nodes[i].flags.contains(kind) {
            check_and_update_query(eng, view, i)?;
        }
    }
    Ok(())
}

fn check_and_update_query(
    eng: &mut ViewEngine,
    view: ViewId,
    query_index: usize,
) -> Result<(), EngineError> {
    if !eng.view(view)?.node(query_index).as_query().dirty {
        return Ok(());
    }
    let def = eng.view(view)?.def.clone();
    let node = &def.nodes[query_index];
    let query = node.query();

    let (owner, mut scan_index, scan_end) = if node.flags.contains(NodeFlags::TYPE_CONTENT_QUERY)
    {
        let directive_index = node.parent.ok_or_else(|| {
            EngineError::Misconfigured(format!(
                "content query node {} has no owning directive",
                query_index
            ))
        })?;
        let el_index = def.nodes[directive_index].parent.ok_or_else(|| {
            EngineError::Misconfigured(format!(
                "directive node {} has no parent element",
                directive_index
            ))
        })?;
        let owner = eng.view(view)?.node(directive_index).as_provider().instance.clone();
        let el = &def.nodes[el_index];
        (owner, el_index + 1, el_index + el.child_count + 1)
    } else {
        (eng.view(view)?.component.clone(), 0, def.nodes.len())
    };

    let mut new_values = Vec::new();
    while scan_index < scan_end {
        scan_index =
            calc_query_values(eng, view, scan_index, query, &mut new_values)?;
    }

    let changed = {
        let data = eng.view(view)?.node(query_index).as_query();
        data.values != new_values
    };
    if changed {
        if let Some(owner) = owner.as_instance() {
            for binding in &query.bindings {
                let bound = match binding.kind {
                    QueryBindingType::First => {
                        new_values.first().cloned().unwrap_or(Value::Null)
                    }
                    QueryBindingType::All => Value::list(new_values.clone()),
                };
                owner.borrow_mut().set_query(&binding.property, bound);
            }
        }
    }
    let data = eng.view_mut(view)?.nodes[query_index].as_query_mut();
    data.values = new_values;
    data.dirty = false;
    Ok(())
}

/// Visit the node at `index`, collecting its match (if any) and the
/// matches of attached embedded views below it, then return the index of
/// the next node to visit. Subtrees whose aggregated mask cannot contain
/// the query are skipped whole.
fn calc_query_values(
    eng: &mut ViewEngine,
    view: ViewId,
    index: usize,
    query: &QueryDef,
    out: &mut Vec<Value>,
) -> Result<usize, EngineError> {
    let def = eng.view(view)?.def.clone();
    let node = &def.nodes[index];

    if let Some(value_type) = node.matched_queries.get(&query.id) {
        if let Some(value) = materialize_match(eng, view, node, *value_type)? {
            out.push(value);
        }
    }

    if node.flags.contains(NodeFlags::EMBEDDED_VIEWS) {
        let template_mask = node
            .element()
            .template
            .as_ref()
            .map(|t| t.node_matched_queries)
            .unwrap_or(QueryMask::NONE);
        if template_mask.intersects(query.filter_id) {
            let embedded = eng
                .view(view)?
                .node(index)
                .as_element()
                .view_container
                .clone()
                .unwrap_or_default();
            for embedded_view in embedded {
                let embedded_def = eng.view(embedded_view)?.def.clone();
                if !embedded_def.node_matched_queries.intersects(query.filter_id) {
                    continue;
                }
                let mut i = 0;
                while i < embedded_def.nodes.len() {
                    i = calc_query_values(eng, embedded_view, i, query, out)?;
                }
            }
        }
    }

    if node.child_matched_queries.intersects(query.filter_id) {
        Ok(index + 1)
    } else {
        Ok(index + node.child_count + 1)
    }
}

fn materialize_match(
    eng: &ViewEngine,
    view: ViewId,
    node: &NodeDef,
    value_type: QueryValueType,
) -> Result<Option<Value>, EngineError> {
    let value = match value_type {
        QueryValueType::ElementRef | QueryValueType::RenderElement => {
            Value::RenderNode(eng.view(view)?.node(node.node_index).as_element().render_node)
        }
        QueryValueType::TemplateRef => {
            Value::TemplateRef(TemplateRef { view, node_index: node.node_index })
        }
        QueryValueType::ViewContainerRef => {
            Value::ViewContainerRef(ViewContainerRef { view, node_index: node.node_index })
        }
        QueryValueType::Provider => {
            let data = eng.view(view)?.node(node.node_index);
            // An uninstantiated lazy provider cannot contribute a match.
            if data.is_empty() {
                return Ok(None);
            }
            data.as_provider().instance.clone()
        }
    };
    Ok(Some(value))
}

/// After a container mutation, re-dirty every dynamic query that can
/// observe the moved view: content queries along the declaration chain
/// whose mask covers the view's contents, and the view queries of the
/// final non-embedded ancestor. Also re-enables checks up the tree so an
/// on-push ancestor cannot strand the dirty queries.
pub(crate) fn dirty_parent_queries(
    eng: &mut ViewEngine,
    view: ViewId,
) -> Result<(), EngineError> {
    let mut query_ids = eng.view(view)?.def.node_matched_queries;
    let mut cur = view;
    loop {
        let parent = match eng.view(cur)?.parent {
            Some(p) => p,
            None => break,
        };
        let is_embedded = eng.view(parent.view)?.def.nodes[parent.node_index]
            .flags
            .contains(NodeFlags::EMBEDDED_VIEWS);
        if !is_embedded {
            break;
        }
        query_ids |= eng.view(cur)?.def.node_matched_queries;
        let parent_def = eng.view(parent.view)?.def.clone();
        let end = (parent.node_index + parent_def.nodes[parent.node_index].child_count)
            .min(parent_def.nodes.len() - 1);
        for i in 0..=end {
            let node = &parent_def.nodes[i];
            if node.flags.contains(NodeFlags::TYPE_CONTENT_QUERY)
                && node.flags.contains(NodeFlags::DYNAMIC_QUERY)
                && query_ids.contains(node.query().filter_id)
            {
                eng.view_mut(parent.view)?.nodes[i].as_query_mut().dirty = true;
            }
        }
        mark_parent_views_for_check(eng, parent.view);
        cur = parent.view;
    }

    let def = eng.view(cur)?.def.clone();
    if def.node_flags.contains(NodeFlags::TYPE_VIEW_QUERY) {
        let mut i = 0;
        while i < def.nodes.len() {
            let node = &def.nodes[i];
            if node.flags.contains(NodeFlags::TYPE_VIEW_QUERY)
                && node.flags.contains(NodeFlags::DYNAMIC_QUERY)
            {
                eng.view_mut(cur)?.nodes[i].as_query_mut().dirty = true;
            }
            i += node.child_count + 1;
        }
        mark_parent_views_for_check(eng, cur);
    }
    Ok(())
}
