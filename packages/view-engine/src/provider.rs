//! Providers and Dependency Injection
//!
//! Provider instantiation and the scoped resolution walk. Every element
//! definition already carries fully aggregated token maps (see
//! `definition.rs`), so resolution consults at most one map per view and
//! then hops to the parent view's hosting element.

use smallvec::SmallVec;

use crate::errors::EngineError;
use crate::types::*;
use crate::view::{check_and_update_binding, check_binding_no_changes, CheckMode, ViewEngine};

/// Instantiate the provider at `node_index`, resolving its dependencies
/// first. Re-entered on demand when an earlier provider depends on a
/// later one.
pub(crate) fn create_provider_instance(
    eng: &mut ViewEngine,
    view: ViewId,
    node_index: usize,
) -> Result<Value, EngineError> {
    let def = eng.view(view)?.def.clone();
    let node = &def.nodes[node_index];
    let provider = node.provider();
    let el_index = node.parent.ok_or_else(|| {
        EngineError::Misconfigured(format!("provider node {} has no parent element", node_index))
    })?;

    let value = match &provider.value {
        ProviderValue::Value(v) => v.clone(),
        ProviderValue::Class(factory) => {
            let deps = resolve_deps(eng, view, el_index, &provider.deps)?;
            Value::Instance(factory(&deps))
        }
        ProviderValue::Factory(factory) => {
            let deps = resolve_deps(eng, view, el_index, &provider.deps)?;
            factory(&deps)
        }
        ProviderValue::UseExisting(token) => {
            let dep = DepDef::new(token.clone());
            resolve_dep(eng, view, Some(el_index), true, &dep, Value::Null)?
        }
    };
    eng.view_mut(view)?.nodes[node_index] =
        NodeData::Provider(ProviderData { instance: value.clone() });
    Ok(value)
}

fn resolve_deps(
    eng: &mut ViewEngine,
    view: ViewId,
    el_index: usize,
    deps: &[DepDef],
) -> Result<SmallVec<[Value; 4]>, EngineError> {
    deps.iter()
        .map(|dep| resolve_dep(eng, view, Some(el_index), true, dep, Value::Null))
        .collect()
}

/// The resolution walk. `el_index` names the requesting element scope
/// (`None` for view-root scope); `allow_private` grants access to the
/// scope's private providers and is dropped permanently on the first hop.
pub(crate) fn resolve_dep(
    eng: &mut ViewEngine,
    view: ViewId,
    el_index: Option<usize>,
    allow_private: bool,
    dep: &DepDef,
    not_found: Value,
) -> Result<Value, EngineError> {
    if dep.flags.contains(DepFlags::VALUE) {
        return Ok(dep.value.clone().unwrap_or(Value::Null));
    }

    // Built-in tokens answer for the requesting scope itself.
    if !dep.flags.contains(DepFlags::SKIP_SELF) {
        if let Some(el) = el_index {
            if dep.token == *ELEMENT_REF_TOKEN {
                return Ok(Value::RenderNode(eng.view(view)?.node(el).as_element().render_node));
            }
            if dep.token == *TEMPLATE_REF_TOKEN {
                let has_template =
                    eng.view(view)?.def.nodes[el].element().template.is_some();
                if has_template {
                    return Ok(Value::TemplateRef(TemplateRef { view, node_index: el }));
                }
            }
            if dep.token == *VIEW_CONTAINER_REF_TOKEN {
                return Ok(Value::ViewContainerRef(ViewContainerRef { view, node_index: el }));
            }
        }
        if dep.token == *INJECTOR_TOKEN {
            return Ok(Value::InjectorRef(InjectorRef { view, node_index: el_index }));
        }
        if dep.token == *CHANGE_DETECTOR_REF_TOKEN {
            return Ok(Value::ChangeDetectorRef(ChangeDetectorRef { view }));
        }
    }

    let mut cur_view = view;
    let mut cur_el = el_index;
    let mut allow = allow_private;
    if dep.flags.contains(DepFlags::SKIP_SELF) {
        match parent_scope(eng, cur_view, cur_el)? {
            Some((pv, pe, private)) => {
                cur_view = pv;
                cur_el = pe;
                allow = private;
            }
            None => cur_el = None,
        }
    }

    loop {
        if let Some(el) = cur_el {
            let found = {
                let def = eng.view(cur_view)?.def.clone();
                let el_def = def.nodes[el].element();
                let map = if allow { &el_def.all_providers } else { &el_def.public_providers };
                map.get(dep.token.key()).copied()
            };
            if let Some(provider_index) = found {
                let value = if eng.view(cur_view)?.node(provider_index).is_empty() {
                    create_provider_instance(eng, cur_view, provider_index)?
                } else {
                    eng.view(cur_view)?.node(provider_index).as_provider().instance.clone()
                };
                return Ok(value);
            }
        }
        match hop_to_parent_view(eng, cur_view)? {
            Some((pv, pe, private)) => {
                cur_view = pv;
                cur_el = Some(pe);
                allow = private;
            }
            None => break,
        }
    }

    // Terminal fallback: the root injector.
    let root = eng.view(view)?.root.clone();
    if let Some(value) = root.injector.resolve(&dep.token) {
        return Ok(value);
    }
    if dep.flags.contains(DepFlags::OPTIONAL) {
        Ok(not_found)
    } else {
        Err(EngineError::NoProvider {
            view,
            node_index: el_index.unwrap_or(0),
            token: dep.token.key().to_string(),
        })
    }
}

/// The scope one step above `(view, el_index)`: the nearest ancestor
/// element in the same view, or the hosting element of the parent view.
/// The returned flag says whether that scope's private providers are
/// visible (true only when arriving from the element's own component
/// view).
fn parent_scope(
    eng: &ViewEngine,
    view: ViewId,
    el_index: Option<usize>,
) -> Result<Option<(ViewId, Option<usize>, bool)>, EngineError> {
    if let Some(el) = el_index {
        let def = eng.view(view)?.def.clone();
        let mut parent = def.nodes[el].parent;
        while let Some(p) = parent {
            if def.nodes[p].flags.contains(NodeFlags::TYPE_ELEMENT) {
                return Ok(Some((view, Some(p), false)));
            }
            parent = def.nodes[p].parent;
        }
    }
    Ok(hop_to_parent_view(eng, view)?.map(|(v, e, private)| (v, Some(e), private)))
}

fn hop_to_parent_view(
    eng: &ViewEngine,
    view: ViewId,
) -> Result<Option<(ViewId, usize, bool)>, EngineError> {
    match eng.view(view)?.parent {
        Some(vp) => {
            let host_flags = eng.view(vp.view)?.def.nodes[vp.node_index].flags;
            // A component sees its own view-scoped providers; embedded
            // views only see the anchor's public surface.
            let private = host_flags.contains(NodeFlags::COMPONENT_VIEW);
            Ok(Some((vp.view, vp.node_index, private)))
        }
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Directive checking
// ---------------------------------------------------------------------------

/// Compare a directive's input bindings against the cache; deliver
/// changed inputs, accumulate the change record and fire per-cycle hooks.
pub(crate) fn check_and_update_directive(
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

    let instance = {
        let data = eng.view(view)?.node(node.node_index);
        if data.is_empty() {
            None
        } else {
            data.as_provider().instance.as_instance().cloned()
        }
    };
    let first = eng.view(view)?.state.contains(ViewState::FIRST_CHECK);

    let mut changes = SimpleChanges::new();
    let mut changed = false;
    for (i, value) in values.iter().enumerate() {
        let previous = eng.view(view)?.old_values[node.binding_index + i].clone();
        if check_and_update_binding(eng, view, node, i, value)? {
            changed = true;
            if let Some(instance) = &instance {
                instance.borrow_mut().set_input(i, value);
            }
            if node.flags.contains(NodeFlags::ON_CHANGES) {
                let name = node.bindings[i]
                    .name
                    .clone()
                    .unwrap_or_else(|| i.to_string());
                changes.insert(
                    name,
                    SimpleChange { previous, current: value.clone(), first_change: first },
                );
            }
        }
    }

    // A changed input wakes the component's own view even when it is
    // on-push and currently settled.
    if changed && node.flags.contains(NodeFlags::COMPONENT) {
        if let Some(el_index) = node.parent {
            let comp_view = eng.view(view)?.node(el_index).as_element().component_view;
            if let Some(comp_view) = comp_view {
                if let Ok(v) = eng.view_mut(comp_view) {
                    v.state |= ViewState::CHECKS_ENABLED;
                }
            }
        }
    }

    if let Some(instance) = &instance {
        if !changes.is_empty() {
            instance.borrow_mut().on_changes(&changes);
        }
        if first && node.flags.contains(NodeFlags::ON_INIT) {
            instance.borrow_mut().on_init();
        }
        if node.flags.contains(NodeFlags::DO_CHECK) {
            instance.borrow_mut().do_check();
        }
    }
    Ok(())
}
