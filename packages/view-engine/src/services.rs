//! Engine Facade
//!
//! The public entry points: root-view creation, the check cycles with
//! their re-entrancy guard, event dispatch, dirty marking, explicit
//! injection and read-only debug snapshots.

use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;

use crate::errors::EngineError;
use crate::provider;
use crate::query;
use crate::types::*;
use crate::view::{self, CheckMode, ViewEngine};

impl ViewEngine {
    /// Create and instantiate a root view. The context doubles as the
    /// component for hook and query delivery.
    pub fn create_root_view(
        &mut self,
        root: Rc<RootData>,
        factory: &ViewDefinitionFactory,
        context: Value,
    ) -> Result<ViewId, EngineError> {
        let def = self.resolve_definition(factory)?;
        let view_id = view::create_view(self, root, None, def);
        {
            let v = self.view_mut(view_id)?;
            v.component = context.clone();
            v.context = context;
        }
        view::create_view_nodes(self, view_id)?;
        Ok(view_id)
    }

    /// Run one check-and-update cycle over a view and its children.
    /// Rejected while any cycle is already running.
    pub fn check_and_update(&mut self, view_id: ViewId) -> Result<(), EngineError> {
        if self.in_check {
            return Err(EngineError::RecursiveCheck);
        }
        self.in_check = true;
        let result = view::check_view_guarded(self, view_id, CheckMode::CheckAndUpdate);
        self.in_check = false;
        result
    }

    /// Run a verification cycle: recompute every binding and fail on any
    /// difference, without updating state or firing hooks.
    pub fn check_no_changes(&mut self, view_id: ViewId) -> Result<(), EngineError> {
        if self.in_check {
            return Err(EngineError::RecursiveCheck);
        }
        self.in_check = true;
        let result = view::check_view_guarded(self, view_id, CheckMode::CheckNoChanges);
        self.in_check = false;
        result
    }

    /// Tear a view down; see the destruction order documented on the
    /// module. The arena slot is never reused.
    pub fn destroy_view(&mut self, view_id: ViewId) -> Result<(), EngineError> {
        if self.in_check {
            return Err(EngineError::RecursiveCheck);
        }
        view::destroy_view_impl(self, view_id)
    }

    /// Dispatch an event arriving at `node_index` through the view's
    /// event function. Marks the receiving view and its ancestors for
    /// checking before dispatch, so the follow-up cycle sees any state
    /// the handler changed.
    pub fn handle_event(
        &mut self,
        view_id: ViewId,
        node_index: usize,
        event_name: &str,
        payload: &Value,
    ) -> Result<bool, EngineError> {
        if self.in_check {
            return Err(EngineError::RecursiveCheck);
        }
        let handler = {
            let v = self.view(view_id)?;
            if v.state.contains(ViewState::DESTROYED) {
                return Err(EngineError::DestroyedView(view_id));
            }
            v.def.handle_event.clone().ok_or_else(|| {
                EngineError::Misconfigured(format!(
                    "view {} has no event function",
                    view_id.index()
                ))
            })?
        };
        view::mark_parent_views_for_check(self, view_id);
        let mut ctx = crate::view::EventContext {
            view: view_id,
            component: self.view(view_id)?.component.clone(),
            context: self.view(view_id)?.context.clone(),
        };
        handler(&mut ctx, node_index, event_name, payload)
    }

    /// Re-enable checks for a view and every ancestor up to the root, so
    /// the next cycle reaches it through any on-push boundary.
    pub fn mark_dirty(&mut self, view_id: ViewId) -> Result<(), EngineError> {
        self.view(view_id)?;
        view::mark_parent_views_for_check(self, view_id);
        Ok(())
    }

    /// Take a view out of the check traversal without destroying it.
    pub fn detach_change_detector(&mut self, view_id: ViewId) -> Result<(), EngineError> {
        self.view_mut(view_id)?.state.remove(ViewState::CHECKS_ENABLED);
        Ok(())
    }

    /// Put a detached view back into the check traversal.
    pub fn reattach_change_detector(&mut self, view_id: ViewId) -> Result<(), EngineError> {
        self.view_mut(view_id)?.state |= ViewState::CHECKS_ENABLED;
        Ok(())
    }

    /// Resolve a token against an injection scope, walking the element
    /// and view chain and falling back to the root injector.
    pub fn inject(&mut self, scope: InjectorRef, token: &Token) -> Result<Value, EngineError> {
        self.inject_with_flags(scope, token, DepFlags::NONE)
    }

    pub fn inject_with_flags(
        &mut self,
        scope: InjectorRef,
        token: &Token,
        flags: DepFlags,
    ) -> Result<Value, EngineError> {
        let dep = DepDef::with_flags(token.clone(), flags);
        provider::resolve_dep(self, scope.view, scope.node_index, false, &dep, Value::Null)
    }

    /// Register a callback to run when the view is destroyed.
    pub fn register_disposable(
        &mut self,
        view_id: ViewId,
        callback: Box<dyn FnOnce()>,
    ) -> Result<(), EngineError> {
        self.view_mut(view_id)?.disposables.push(Disposable::Callback(callback));
        Ok(())
    }

    // --- read-only accessors -----------------------------------------

    pub fn view_state(&self, view_id: ViewId) -> Result<ViewState, EngineError> {
        Ok(self.view(view_id)?.state)
    }

    /// Whether the view still occupies its arena slot.
    pub fn is_alive(&self, view_id: ViewId) -> bool {
        self.view(view_id).is_ok()
    }

    pub fn component(&self, view_id: ViewId) -> Result<Value, EngineError> {
        Ok(self.view(view_id)?.component.clone())
    }

    pub fn context(&self, view_id: ViewId) -> Result<Value, EngineError> {
        Ok(self.view(view_id)?.context.clone())
    }

    /// The render node behind an element or text node.
    pub fn render_node(&self, view_id: ViewId, node_index: usize) -> Result<RenderNode, EngineError> {
        let v = self.view(view_id)?;
        let flags = v.def.nodes[node_index].flags;
        if flags.contains(NodeFlags::TYPE_TEXT) {
            Ok(v.node(node_index).as_text().render_node)
        } else {
            Ok(v.node(node_index).as_element().render_node)
        }
    }

    /// This view's root-level render nodes, in order. For root views
    /// these are the nodes the embedder places into the host document.
    pub fn root_render_nodes(&self, view_id: ViewId) -> Result<Vec<RenderNode>, EngineError> {
        view::collect_root_render_nodes(self, view_id)
    }

    /// The instantiated value of a provider node.
    pub fn provider_instance(
        &self,
        view_id: ViewId,
        node_index: usize,
    ) -> Result<Value, EngineError> {
        Ok(self.view(view_id)?.node(node_index).as_provider().instance.clone())
    }

    /// The component view hosted by an element, if any.
    pub fn component_view(
        &self,
        view_id: ViewId,
        node_index: usize,
    ) -> Result<Option<ViewId>, EngineError> {
        Ok(self.view(view_id)?.node(node_index).as_element().component_view)
    }

    /// The current result list of a query node.
    pub fn query_results(
        &self,
        view_id: ViewId,
        node_index: usize,
    ) -> Result<Vec<Value>, EngineError> {
        Ok(self.view(view_id)?.node(node_index).as_query().values.clone())
    }

    /// Force the dynamic queries observing a view dirty; normally driven
    /// by container mutations.
    pub fn dirty_queries(&mut self, view_id: ViewId) -> Result<(), EngineError> {
        query::dirty_parent_queries(self, view_id)
    }

    /// A serializable structural snapshot for logging and debugging.
    pub fn debug_snapshot(&self, view_id: ViewId) -> Result<DebugViewSnapshot, EngineError> {
        let v = self.view(view_id)?;
        let nodes = v
            .def
            .nodes
            .iter()
            .map(|node| {
                let (element, render_node, has_component_view, embedded_views) =
                    if node.flags.contains(NodeFlags::TYPE_ELEMENT) {
                        let data = v.node(node.node_index).as_element();
                        (
                            node.element().name.clone(),
                            Some(data.render_node.0),
                            data.component_view.is_some(),
                            data.view_container.as_ref().map(|c| c.len()).unwrap_or(0),
                        )
                    } else if node.flags.contains(NodeFlags::TYPE_TEXT) {
                        (None, Some(v.node(node.node_index).as_text().render_node.0), false, 0)
                    } else {
                        (None, None, false, 0)
                    };
                let token = if node.flags.intersects(NodeFlags::CAT_PROVIDER) {
                    Some(node.provider().token.key().to_string())
                } else {
                    None
                };
                DebugNodeSnapshot {
                    index: node.node_index,
                    flags: node.flags.bits(),
                    child_count: node.child_count,
                    element,
                    token,
                    references: node.references.clone(),
                    render_node,
                    has_component_view,
                    embedded_views,
                }
            })
            .collect();
        Ok(DebugViewSnapshot {
            view: view_id.index(),
            state: v.state.bits(),
            node_count: v.def.nodes.len(),
            binding_count: v.def.binding_count,
            nodes,
        })
    }
}

/// Structural snapshot of one view instance.
#[derive(Debug, Clone, Serialize)]
pub struct DebugViewSnapshot {
    pub view: usize,
    pub state: u32,
    pub node_count: usize,
    pub binding_count: usize,
    pub nodes: Vec<DebugNodeSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugNodeSnapshot {
    pub index: usize,
    pub flags: u32,
    pub child_count: usize,
    pub element: Option<String>,
    pub token: Option<String>,
    /// User-declared local references on the node, by name.
    pub references: IndexMap<String, QueryValueType>,
    pub render_node: Option<u64>,
    pub has_component_view: bool,
    pub embedded_views: usize,
}
