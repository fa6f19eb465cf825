//! View Instantiation and Change Detection
//!
//! Owns the view arena and implements the instantiation walk, the
//! two-phase check cycle (update-directives, then update-renderer) and the
//! destruction cascade. Traversal always iterates the immutable definition
//! sequence and dispatches on the static node kind; the runtime node-data
//! store is only ever accessed through kind-checked slots.

use std::collections::HashMap;
use std::rc::Rc;

use crate::element;
use crate::errors::EngineError;
use crate::ng_content;
use crate::provider;
use crate::pure_expression;
use crate::query;
use crate::text;
use crate::types::*;

/// Which traversal is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// Normal cycle: update caches, push render changes, fire hooks.
    CheckAndUpdate,
    /// Verification cycle: recompute and compare only; any difference is a
    /// changed-after-checked error. Never mutates state or fires hooks.
    CheckNoChanges,
}

/// Which of the two per-cycle phases is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPhase {
    Directives,
    Renderer,
}

/// Handed to a view definition's update functions; the function computes
/// the current value set for each bound node and feeds it back through
/// [`CheckContext::check_node`].
pub struct CheckContext<'a> {
    pub(crate) eng: &'a mut ViewEngine,
    pub(crate) view: ViewId,
    pub(crate) mode: CheckMode,
    pub(crate) phase: CheckPhase,
}

impl CheckContext<'_> {
    pub fn view_id(&self) -> ViewId {
        self.view
    }

    pub fn mode(&self) -> CheckMode {
        self.mode
    }

    /// The component instance the view renders for.
    pub fn component(&self) -> Value {
        self.eng
            .view(self.view)
            .map(|v| v.component.clone())
            .unwrap_or(Value::Null)
    }

    /// The template context (equals the component for component views).
    pub fn context(&self) -> Value {
        self.eng
            .view(self.view)
            .map(|v| v.context.clone())
            .unwrap_or(Value::Null)
    }

    /// The instantiated value of a provider node, e.g. a pipe instance
    /// feeding a pure-pipe binding.
    pub fn provider_instance(&self, node_index: usize) -> Result<Value, EngineError> {
        Ok(self.eng.view(self.view)?.node(node_index).as_provider().instance.clone())
    }

    /// The cached value of a pure-expression node.
    pub fn pure_value(&self, node_index: usize) -> Result<Value, EngineError> {
        Ok(self
            .eng
            .view(self.view)?
            .node(node_index)
            .as_pure_expression()
            .value
            .clone())
    }

    /// Evaluate one node's bindings against the given current values.
    pub fn check_node(&mut self, node_index: usize, values: &[Value]) -> Result<(), EngineError> {
        let def = self.eng.view(self.view)?.def.clone();
        let node = &def.nodes[node_index];
        if values.len() != node.bindings.len() {
            return Err(EngineError::Misconfigured(format!(
                "node {} has {} bindings but was checked with {} values",
                node_index,
                node.bindings.len(),
                values.len()
            ))
            .into_check_failed(self.view, node_index));
        }
        let result = match self.phase {
            CheckPhase::Directives => {
                if node.flags.contains(NodeFlags::TYPE_DIRECTIVE) {
                    provider::check_and_update_directive(self.eng, self.view, node, values, self.mode)
                } else if node.flags.intersects(NodeFlags::CAT_PURE_EXPRESSION) {
                    pure_expression::check_and_update_pure_expression(
                        self.eng, self.view, node, values, self.mode,
                    )
                } else {
                    Err(EngineError::Misconfigured(format!(
                        "node {} cannot be checked in the update-directives phase",
                        node_index
                    )))
                }
            }
            CheckPhase::Renderer => {
                if node.flags.contains(NodeFlags::TYPE_TEXT) {
                    text::check_and_update_text(self.eng, self.view, node, values, self.mode)
                } else if node.flags.contains(NodeFlags::TYPE_ELEMENT) {
                    element::check_and_update_element(self.eng, self.view, node, values, self.mode)
                } else {
                    Err(EngineError::Misconfigured(format!(
                        "node {} cannot be checked in the update-renderer phase",
                        node_index
                    )))
                }
            }
        };
        result.map_err(|e| e.into_check_failed(self.view, node_index))
    }

    /// Request a nested check cycle. Always rejected while the current
    /// cycle is running; exposed so that callers holding a context cannot
    /// silently re-enter the traversal.
    pub fn check_and_update(&mut self, view: ViewId) -> Result<(), EngineError> {
        self.eng.check_and_update(view)
    }
}

/// Read-only handed to event dispatch functions.
pub struct EventContext {
    pub view: ViewId,
    pub component: Value,
    pub context: Value,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The runtime: an arena of view instances plus the definition cache and
/// the re-entrancy guard. All capabilities the engine needs are carried
/// explicitly by each view's [`RootData`]; there is no global service
/// table.
pub struct ViewEngine {
    pub(crate) views: Vec<Option<ViewData>>,
    pub(crate) definition_cache: HashMap<usize, Rc<ViewDefinition>>,
    pub(crate) in_check: bool,
}

impl Default for ViewEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewEngine {
    pub fn new() -> Self {
        ViewEngine { views: Vec::new(), definition_cache: HashMap::new(), in_check: false }
    }

    pub(crate) fn view(&self, id: ViewId) -> Result<&ViewData, EngineError> {
        self.views
            .get(id.0)
            .and_then(|slot| slot.as_ref())
            .ok_or(EngineError::DestroyedView(id))
    }

    pub(crate) fn view_mut(&mut self, id: ViewId) -> Result<&mut ViewData, EngineError> {
        self.views
            .get_mut(id.0)
            .and_then(|slot| slot.as_mut())
            .ok_or(EngineError::DestroyedView(id))
    }

    fn alloc_view(&mut self, data: ViewData) -> ViewId {
        // Slots are never recycled so stale ids stay unambiguous.
        let id = ViewId(self.views.len());
        self.views.push(Some(data));
        id
    }

    /// Resolve a view definition through the cache, keyed by factory
    /// identity. A failing factory is invoked a second time so the error
    /// is attributed to the factory itself.
    pub(crate) fn resolve_definition(
        &mut self,
        factory: &ViewDefinitionFactory,
    ) -> Result<Rc<ViewDefinition>, EngineError> {
        let key = Rc::as_ptr(factory) as *const u8 as usize;
        if let Some(def) = self.definition_cache.get(&key) {
            return Ok(def.clone());
        }
        let def = match factory() {
            Ok(def) => def,
            Err(_) => match factory() {
                Ok(def) => def,
                Err(source) => return Err(EngineError::Definition { source }),
            },
        };
        let def = Rc::new(def);
        self.definition_cache.insert(key, def.clone());
        Ok(def)
    }
}

// ---------------------------------------------------------------------------
// Instantiation
// ---------------------------------------------------------------------------

pub(crate) fn create_view(
    eng: &mut ViewEngine,
    root: Rc<RootData>,
    parent: Option<ViewParent>,
    def: Rc<ViewDefinition>,
) -> ViewId {
    let node_count = def.nodes.len();
    let binding_count = def.binding_count;
    let data = ViewData {
        def,
        root,
        parent,
        view_container_parent: None,
        context: Value::Null,
        component: Value::Null,
        nodes: (0..node_count).map(|_| NodeData::Empty).collect(),
        state: ViewState::FIRST_CHECK | ViewState::CHECKS_ENABLED,
        old_values: vec![Value::Null; binding_count],
        disposables: Vec::new(),
    };
    eng.alloc_view(data)
}

/// One depth-first pass allocating the kind-appropriate node data per
/// node, followed by component-view creation once every provider of the
/// view exists.
pub(crate) fn create_view_nodes(eng: &mut ViewEngine, view: ViewId) -> Result<(), EngineError> {
    let def = eng.view(view)?.def.clone();
    let root = eng.view(view)?.root.clone();

    for i in 0..def.nodes.len() {
        let node = &def.nodes[i];
        if node.flags.contains(NodeFlags::TYPE_ELEMENT) {
            let el = node.element();
            let render_node = {
                let mut renderer = root.renderer.borrow_mut();
                match &el.name {
                    Some(name) => renderer.create_element(name, el.ns.as_deref()),
                    None => renderer.create_anchor(),
                }
            };
            for attr in &el.attrs {
                root.renderer.borrow_mut().set_attribute(
                    render_node,
                    attr.ns.as_deref(),
                    &attr.name,
                    Some(&attr.value),
                );
            }
            let view_container = if node.flags.contains(NodeFlags::EMBEDDED_VIEWS) {
                Some(Vec::new())
            } else {
                None
            };
            eng.view_mut(view)?.nodes[i] = NodeData::Element(ElementData {
                render_node,
                component_view: None,
                view_container,
                projected_views: Vec::new(),
            });
            attach_render_node(eng, view, i, render_node)?;
            // Render listeners for the element's outputs.
            for output in &node.outputs {
                let target = match output.target {
                    OutputTarget::Element => ListenTarget::Node(render_node),
                    OutputTarget::Window => ListenTarget::Window,
                    OutputTarget::Document => ListenTarget::Document,
                    OutputTarget::Body => ListenTarget::Body,
                    OutputTarget::Component => continue,
                };
                let handle = root.renderer.borrow_mut().listen(target, &output.event_name);
                eng.view_mut(view)?.disposables.push(Disposable::Listener(handle));
            }
        } else if node.flags.contains(NodeFlags::TYPE_TEXT) {
            let render_node = root.renderer.borrow_mut().create_text(&node.text().prefix);
            eng.view_mut(view)?.nodes[i] = NodeData::Text(TextData { render_node });
            attach_render_node(eng, view, i, render_node)?;
        } else if node.flags.intersects(NodeFlags::CAT_PROVIDER) {
            // A dependency of an earlier provider may have forced this
            // slot into existence already.
            if eng.view(view)?.node(i).is_empty() && !node.flags.contains(NodeFlags::LAZY_PROVIDER)
            {
                provider::create_provider_instance(eng, view, i)?;
            }
        } else if node.flags.intersects(NodeFlags::CAT_PURE_EXPRESSION) {
            eng.view_mut(view)?.nodes[i] =
                NodeData::PureExpression(PureExpressionData { value: Value::Null });
        } else if node.flags.intersects(NodeFlags::CAT_QUERY) {
            eng.view_mut(view)?.nodes[i] =
                NodeData::Query(QueryData { values: Vec::new(), dirty: true });
        } else if node.flags.contains(NodeFlags::TYPE_NG_CONTENT) {
            ng_content::append_projected_nodes(eng, view, i)?;
        }
    }

    // Component views are created only after every provider of this view
    // exists, so their contents can inject host-element providers.
    for i in 0..def.nodes.len() {
        if def.nodes[i].flags.contains(NodeFlags::COMPONENT_VIEW) {
            create_component_view(eng, view, i)?;
        }
    }
    Ok(())
}

fn create_component_view(
    eng: &mut ViewEngine,
    view: ViewId,
    el_index: usize,
) -> Result<(), EngineError> {
    let def = eng.view(view)?.def.clone();
    let root = eng.view(view)?.root.clone();
    let el = def.nodes[el_index].element();
    let factory = match &el.component_view {
        Some(f) => f.clone(),
        None => return Ok(()),
    };
    let provider_index = el.component_provider.ok_or_else(|| {
        EngineError::Misconfigured(format!(
            "element {} has a component view but no component provider",
            el_index
        ))
    })?;
    let component = eng.view(view)?.node(provider_index).as_provider().instance.clone();
    let comp_def = eng.resolve_definition(&factory)?;
    let comp_view = create_view(
        eng,
        root,
        Some(ViewParent { view, node_index: el_index }),
        comp_def,
    );
    {
        let v = eng.view_mut(comp_view)?;
        v.component = component.clone();
        v.context = component;
    }
    eng.view_mut(view)?.nodes[el_index].as_element_mut().component_view = Some(comp_view);
    create_view_nodes(eng, comp_view)
}

/// Attach a freshly created render node below its render parent. Root
/// nodes of a component view land in the hosting element; root nodes of
/// root and embedded views stay detached until the caller (or a view
/// container) places them.
fn attach_render_node(
    eng: &mut ViewEngine,
    view: ViewId,
    node_index: usize,
    render_node: RenderNode,
) -> Result<(), EngineError> {
    let def = eng.view(view)?.def.clone();
    let root = eng.view(view)?.root.clone();
    match def.nodes[node_index].render_parent {
        Some(rp) => {
            let parent_rn = eng.view(view)?.node(rp).as_element().render_node;
            root.renderer.borrow_mut().append_child(parent_rn, render_node);
        }
        None => {
            if let Some(host_rn) = ng_content::host_render_node(eng, view)? {
                root.renderer.borrow_mut().append_child(host_rn, render_node);
            }
        }
    }
    Ok(())
}

/// The render nodes a view contributes at its root level, in render
/// order. Attached embedded views of a root anchor precede the anchor.
pub(crate) fn collect_root_render_nodes(
    eng: &ViewEngine,
    view: ViewId,
) -> Result<Vec<RenderNode>, EngineError> {
    let mut out = Vec::new();
    let def = eng.view(view)?.def.clone();
    for node in &def.nodes {
        if node.parent.is_some() {
            continue;
        }
        if node.flags.contains(NodeFlags::TYPE_ELEMENT) {
            let data = eng.view(view)?.node(node.node_index).as_element();
            let embedded = data.view_container.clone().unwrap_or_default();
            let render_node = data.render_node;
            for embedded_view in embedded {
                // Mid-destruction the list may still name dead views.
                if eng.view(embedded_view).is_ok() {
                    out.extend(collect_root_render_nodes(eng, embedded_view)?);
                }
            }
            out.push(render_node);
        } else if node.flags.contains(NodeFlags::TYPE_TEXT) {
            out.push(eng.view(view)?.node(node.node_index).as_text().render_node);
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Check cycle
// ---------------------------------------------------------------------------

/// Run a full cycle over one view, marking it errored when the failure
/// originated here (deeper views mark themselves during recursion).
pub(crate) fn check_view_guarded(
    eng: &mut ViewEngine,
    view: ViewId,
    mode: CheckMode,
) -> Result<(), EngineError> {
    match check_view(eng, view, mode) {
        Ok(()) => Ok(()),
        Err(e) => {
            let originated_here = match &e {
                EngineError::CheckFailed { view: v, .. } => *v == view,
                EngineError::ExpressionChanged { .. } => false,
                EngineError::DestroyedView(_)
                | EngineError::ErroredView(_)
                | EngineError::RecursiveCheck => false,
                _ => true,
            };
            if originated_here && mode == CheckMode::CheckAndUpdate {
                if let Ok(v) = eng.view_mut(view) {
                    v.state |= ViewState::ERRORED;
                }
            }
            Err(e)
        }
    }
}

fn check_view(eng: &mut ViewEngine, view: ViewId, mode: CheckMode) -> Result<(), EngineError> {
    let state = eng.view(view)?.state;
    if state.contains(ViewState::DESTROYED) {
        return Err(EngineError::DestroyedView(view));
    }
    if state.contains(ViewState::ERRORED) {
        return Err(EngineError::ErroredView(view));
    }
    let def = eng.view(view)?.def.clone();
    let first = state.contains(ViewState::FIRST_CHECK);

    // Phase 1: directive and pure-expression bindings, in node order.
    if let Some(update) = def.update_directives.clone() {
        let mut ctx = CheckContext { eng: &mut *eng, view, mode, phase: CheckPhase::Directives };
        update(&mut ctx)?;
    }
    exec_embedded_views_action(eng, view, mode)?;
    if mode == CheckMode::CheckAndUpdate {
        query::exec_queries(eng, view, NodeFlags::TYPE_CONTENT_QUERY)?;
        call_lifecycle_hooks(
            eng,
            view,
            NodeFlags::AFTER_CONTENT_CHECKED,
            if first { NodeFlags::AFTER_CONTENT_INIT } else { NodeFlags::NONE },
        )?;
    }

    // Phase 2: render-facing bindings, then nested component views.
    if let Some(update) = def.update_renderer.clone() {
        let mut ctx = CheckContext { eng: &mut *eng, view, mode, phase: CheckPhase::Renderer };
        update(&mut ctx)?;
    }
    exec_component_views_action(eng, view, mode)?;
    if mode == CheckMode::CheckAndUpdate {
        query::exec_queries(eng, view, NodeFlags::TYPE_VIEW_QUERY)?;
        call_lifecycle_hooks(
            eng,
            view,
            NodeFlags::AFTER_VIEW_CHECKED,
            if first { NodeFlags::AFTER_VIEW_INIT } else { NodeFlags::NONE },
        )?;
        let v = eng.view_mut(view)?;
        if def.flags.contains(ViewFlags::ON_PUSH) {
            v.state.remove(ViewState::CHECKS_ENABLED);
        }
        v.state.remove(ViewState::FIRST_CHECK);
    }
    Ok(())
}

fn checkable(eng: &ViewEngine, view: ViewId) -> bool {
    match eng.view(view) {
        Ok(v) => {
            v.state.contains(ViewState::CHECKS_ENABLED)
                && !v.state.intersects(ViewState::DESTROYED | ViewState::ERRORED)
        }
        Err(_) => false,
    }
}

fn exec_embedded_views_action(
    eng: &mut ViewEngine,
    view: ViewId,
    mode: CheckMode,
) -> Result<(), EngineError> {
    let def = eng.view(view)?.def.clone();
    if !def.node_flags.contains(NodeFlags::EMBEDDED_VIEWS) {
        return Ok(());
    }
    for node in &def.nodes {
        if !node.flags.contains(NodeFlags::EMBEDDED_VIEWS) {
            continue;
        }
        let embedded = eng
            .view(view)?
            .node(node.node_index)
            .as_element()
            .view_container
            .clone()
            .unwrap_or_default();
        for embedded_view in embedded {
            if checkable(eng, embedded_view) {
                check_view_guarded(eng, embedded_view, mode)?;
            }
        }
    }
    Ok(())
}

fn exec_component_views_action(
    eng: &mut ViewEngine,
    view: ViewId,
    mode: CheckMode,
) -> Result<(), EngineError> {
    let def = eng.view(view)?.def.clone();
    if !def.node_flags.contains(NodeFlags::COMPONENT_VIEW) {
        return Ok(());
    }
    for node in &def.nodes {
        if !node.flags.contains(NodeFlags::COMPONENT_VIEW) {
            continue;
        }
        let comp_view = eng.view(view)?.node(node.node_index).as_element().component_view;
        if let Some(comp_view) = comp_view {
            if checkable(eng, comp_view) {
                check_view_guarded(eng, comp_view, mode)?;
            }
        }
    }
    Ok(())
}

/// Fire content/view hooks on this view's directives, deepest nodes
/// first.
fn call_lifecycle_hooks(
    eng: &mut ViewEngine,
    view: ViewId,
    checked_flag: NodeFlags,
    init_flag: NodeFlags,
) -> Result<(), EngineError> {
    let def = eng.view(view)?.def.clone();
    let mask = checked_flag | init_flag;
    if !def.node_flags.intersects(mask) {
        return Ok(());
    }
    for i in (0..def.nodes.len()).rev() {
        let node = &def.nodes[i];
        if !node.flags.intersects(mask) || !node.flags.contains(NodeFlags::TYPE_DIRECTIVE) {
            continue;
        }
        let data = eng.view(view)?.node(i);
        // Uninstantiated lazy providers have no instance to notify.
        if data.is_empty() {
            continue;
        }
        let instance = data.as_provider().instance.clone();
        if let Some(instance) = instance.as_instance() {
            if node.flags.intersects(init_flag) && !init_flag.is_empty() {
                if init_flag.contains(NodeFlags::AFTER_CONTENT_INIT) {
                    instance.borrow_mut().after_content_init();
                } else {
                    instance.borrow_mut().after_view_init();
                }
            }
            if node.flags.intersects(checked_flag) {
                if checked_flag.contains(NodeFlags::AFTER_CONTENT_CHECKED) {
                    instance.borrow_mut().after_content_checked();
                } else {
                    instance.borrow_mut().after_view_checked();
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Binding caches
// ---------------------------------------------------------------------------

/// Update the cached value for one binding; returns whether it changed.
/// The first check counts every binding as changed.
pub(crate) fn check_and_update_binding(
    eng: &mut ViewEngine,
    view: ViewId,
    node: &NodeDef,
    binding_index: usize,
    value: &Value,
) -> Result<bool, EngineError> {
    let v = eng.view_mut(view)?;
    let global = node.binding_index + binding_index;
    if v.state.contains(ViewState::FIRST_CHECK) || v.old_values[global] != *value {
        v.old_values[global] = value.clone();
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Verification-mode comparison: any difference from the cache is a
/// changed-after-checked error carrying full binding identity.
pub(crate) fn check_binding_no_changes(
    eng: &ViewEngine,
    view: ViewId,
    node: &NodeDef,
    binding_index: usize,
    value: &Value,
) -> Result<(), EngineError> {
    let v = eng.view(view)?;
    let global = node.binding_index + binding_index;
    if v.old_values[global] != *value {
        return Err(EngineError::ExpressionChanged {
            view,
            node_index: node.node_index,
            binding_index,
            previous: v.old_values[global].clone(),
            current: value.clone(),
        });
    }
    Ok(())
}

/// Re-enable checks along the container/declaration chain so a dirty
/// marker reaches views that an on-push ancestor would otherwise skip.
pub(crate) fn mark_parent_views_for_check(eng: &mut ViewEngine, view: ViewId) {
    let mut cur = Some(view);
    while let Some(id) = cur {
        match eng.view_mut(id) {
            Ok(v) => {
                v.state |= ViewState::CHECKS_ENABLED;
                cur = v
                    .view_container_parent
                    .map(|p| p.view)
                    .or_else(|| v.parent.map(|p| p.view));
            }
            Err(_) => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Destruction
// ---------------------------------------------------------------------------

/// Destroy a view: children first, then hooks, disposables (reverse
/// registration order, exactly once), render detach, and finally the
/// arena slot.
pub(crate) fn destroy_view_impl(eng: &mut ViewEngine, view: ViewId) -> Result<(), EngineError> {
    // Detach from the container it is inserted in, if any.
    if let Some(vcp) = eng.view(view)?.view_container_parent {
        query::dirty_parent_queries(eng, view)?;
        if let Some(container) =
            eng.view_mut(vcp.view)?.nodes[vcp.node_index].as_element_mut().view_container.as_mut()
        {
            container.retain(|v| *v != view);
        }
        eng.view_mut(view)?.view_container_parent = None;
    }
    destroy_view_recursive(eng, view)
}

fn destroy_view_recursive(eng: &mut ViewEngine, view: ViewId) -> Result<(), EngineError> {
    let def = eng.view(view)?.def.clone();
    let root = eng.view(view)?.root.clone();

    // Child views go first.
    for i in 0..def.nodes.len() {
        if !def.nodes[i].flags.contains(NodeFlags::TYPE_ELEMENT) {
            continue;
        }
        let (component_view, embedded) = {
            let data = eng.view(view)?.node(i).as_element();
            (data.component_view, data.view_container.clone().unwrap_or_default())
        };
        for embedded_view in embedded {
            if eng.view(embedded_view).is_ok() {
                // The container entry dies with this view; skip re-detach.
                eng.view_mut(embedded_view)?.view_container_parent = None;
                destroy_view_recursive(eng, embedded_view)?;
            }
        }
        if let Some(component_view) = component_view {
            if eng.view(component_view).is_ok() {
                destroy_view_recursive(eng, component_view)?;
            }
        }
    }

    // OnDestroy hooks.
    if def.node_flags.contains(NodeFlags::ON_DESTROY) {
        for node in &def.nodes {
            if node.flags.contains(NodeFlags::ON_DESTROY)
                && node.flags.intersects(NodeFlags::CAT_PROVIDER)
            {
                let data = eng.view(view)?.node(node.node_index);
                // A lazy provider that was never requested has no instance.
                if data.is_empty() {
                    continue;
                }
                let instance = data.as_provider().instance.clone();
                if let Some(instance) = instance.as_instance() {
                    instance.borrow_mut().on_destroy();
                }
            }
        }
    }

    // Disposables run exactly once, in reverse registration order.
    let disposables = std::mem::take(&mut eng.view_mut(view)?.disposables);
    for disposable in disposables.into_iter().rev() {
        match disposable {
            Disposable::Listener(handle) => root.renderer.borrow_mut().unlisten(handle),
            Disposable::Callback(callback) => callback(),
        }
    }

    // Detach this view's root render nodes, then drop every render node.
    for render_node in collect_root_render_nodes(eng, view)? {
        root.renderer.borrow_mut().remove_child(render_node);
    }
    for node in &def.nodes {
        if node.flags.contains(NodeFlags::TYPE_ELEMENT) {
            let rn = eng.view(view)?.node(node.node_index).as_element().render_node;
            root.renderer.borrow_mut().destroy_node(rn);
        } else if node.flags.contains(NodeFlags::TYPE_TEXT) {
            let rn = eng.view(view)?.node(node.node_index).as_text().render_node;
            root.renderer.borrow_mut().destroy_node(rn);
        }
    }

    // Drop the declaration-side bookkeeping for embedded views.
    if let Some(parent) = eng.view(view)?.parent {
        if let Ok(pv) = eng.view_mut(parent.view) {
            if let NodeData::Element(el) = &mut pv.nodes[parent.node_index] {
                el.projected_views.retain(|v| *v != view);
            }
        }
    }

    eng.view_mut(view)?.state |= ViewState::DESTROYED;
    eng.views[view.0] = None;
    Ok(())
}
