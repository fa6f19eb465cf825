//! Template and Container References
//!
//! Embedded-view creation from template anchors and the ordered container
//! operations (attach, detach, move). Creation and attachment are
//! separate steps: a freshly created embedded view owns live state but
//! renders nothing until a container inserts it.

use crate::errors::EngineError;
use crate::ng_content;
use crate::query;
use crate::types::*;
use crate::view::{self, ViewEngine};

impl ViewEngine {
    /// Instantiate the template behind `template_ref` with the given
    /// context. The new view's declaration parent is the anchor; it is
    /// not attached to any container yet.
    pub fn create_embedded_view(
        &mut self,
        template_ref: TemplateRef,
        context: Value,
    ) -> Result<ViewId, EngineError> {
        let (def, root, component) = {
            let declaring = self.view(template_ref.view)?;
            let template = declaring.def.nodes[template_ref.node_index]
                .element()
                .template
                .clone()
                .ok_or_else(|| {
                    EngineError::Misconfigured(format!(
                        "node {} of view {} carries no template",
                        template_ref.node_index,
                        template_ref.view.index()
                    ))
                })?;
            (template, declaring.root.clone(), declaring.component.clone())
        };
        let parent = ViewParent { view: template_ref.view, node_index: template_ref.node_index };
        let new_view = view::create_view(self, root, Some(parent), def);
        {
            let v = self.view_mut(new_view)?;
            v.component = component;
            v.context = context;
        }
        view::create_view_nodes(self, new_view)?;
        self.view_mut(template_ref.view)?.nodes[template_ref.node_index]
            .as_element_mut()
            .projected_views
            .push(new_view);
        Ok(new_view)
    }

    /// Insert a detached embedded view into a container at `index`
    /// (append when `None`). Dirties the dynamic queries observing the
    /// container and re-enables checks up the tree.
    pub fn attach_embedded_view(
        &mut self,
        container: ViewContainerRef,
        view_id: ViewId,
        index: Option<usize>,
    ) -> Result<(), EngineError> {
        if self.view(view_id)?.view_container_parent.is_some() {
            return Err(EngineError::Misconfigured(format!(
                "view {} is already attached to a container",
                view_id.index()
            )));
        }
        let index = {
            let anchor = self.view_mut(container.view)?;
            let slot = anchor.nodes[container.node_index]
                .as_element_mut()
                .view_container
                .as_mut()
                .ok_or_else(|| {
                    EngineError::Misconfigured(format!(
                        "node {} of view {} is not a view container",
                        container.node_index,
                        container.view.index()
                    ))
                })?;
            let index = index.unwrap_or(slot.len()).min(slot.len());
            slot.insert(index, view_id);
            index
        };
        self.view_mut(view_id)?.view_container_parent =
            Some(ViewParent { view: container.view, node_index: container.node_index });
        self.render_attach_to_container(container, view_id, index)?;
        query::dirty_parent_queries(self, view_id)?;
        Ok(())
    }

    /// Remove the view at `index` from a container without destroying it.
    /// Returns the detached view, which keeps its state and can be
    /// re-attached elsewhere.
    pub fn detach_embedded_view(
        &mut self,
        container: ViewContainerRef,
        index: usize,
    ) -> Result<ViewId, EngineError> {
        let view_id = {
            let anchor = self.view_mut(container.view)?;
            let slot = anchor.nodes[container.node_index]
                .as_element_mut()
                .view_container
                .as_mut()
                .ok_or_else(|| {
                    EngineError::Misconfigured(format!(
                        "node {} of view {} is not a view container",
                        container.node_index,
                        container.view.index()
                    ))
                })?;
            if index >= slot.len() {
                return Err(EngineError::Misconfigured(format!(
                    "container index {} out of bounds ({} views attached)",
                    index,
                    slot.len()
                )));
            }
            slot.remove(index)
        };
        query::dirty_parent_queries(self, view_id)?;
        self.view_mut(view_id)?.view_container_parent = None;
        let root = self.view(view_id)?.root.clone();
        for render_node in view::collect_root_render_nodes(self, view_id)? {
            root.renderer.borrow_mut().remove_child(render_node);
        }
        Ok(view_id)
    }

    /// Reorder an attached view within its container.
    pub fn move_embedded_view(
        &mut self,
        container: ViewContainerRef,
        from: usize,
        to: usize,
    ) -> Result<(), EngineError> {
        let view_id = {
            let anchor = self.view_mut(container.view)?;
            let slot = anchor.nodes[container.node_index]
                .as_element_mut()
                .view_container
                .as_mut()
                .ok_or_else(|| {
                    EngineError::Misconfigured(format!(
                        "node {} of view {} is not a view container",
                        container.node_index,
                        container.view.index()
                    ))
                })?;
            if from >= slot.len() || to >= slot.len() {
                return Err(EngineError::Misconfigured(format!(
                    "container move {} -> {} out of bounds ({} views attached)",
                    from,
                    to,
                    slot.len()
                )));
            }
            let view_id = slot.remove(from);
            slot.insert(to, view_id);
            view_id
        };
        let root = self.view(view_id)?.root.clone();
        for render_node in view::collect_root_render_nodes(self, view_id)? {
            root.renderer.borrow_mut().remove_child(render_node);
        }
        self.render_attach_to_container(container, view_id, to)?;
        query::dirty_parent_queries(self, view_id)?;
        Ok(())
    }

    /// The views currently attached to a container, in order.
    pub fn container_views(
        &self,
        container: ViewContainerRef,
    ) -> Result<Vec<ViewId>, EngineError> {
        Ok(self
            .view(container.view)?
            .node(container.node_index)
            .as_element()
            .view_container
            .clone()
            .unwrap_or_default())
    }

    /// Place an attached view's root render nodes before its successor in
    /// the container (or before the anchor itself when it is last).
    fn render_attach_to_container(
        &mut self,
        container: ViewContainerRef,
        view_id: ViewId,
        index: usize,
    ) -> Result<(), EngineError> {
        let anchor_def = self.view(container.view)?.def.clone();
        let parent_rn = match anchor_def.nodes[container.node_index].render_parent {
            Some(rp) => Some(self.view(container.view)?.node(rp).as_element().render_node),
            None => ng_content::host_render_node(self, container.view)?,
        };
        let parent_rn = match parent_rn {
            Some(rn) => rn,
            // The anchor itself is detached; nothing to place in yet.
            None => return Ok(()),
        };
        let siblings = self
            .view(container.view)?
            .node(container.node_index)
            .as_element()
            .view_container
            .clone()
            .unwrap_or_default();
        let before = match siblings.get(index + 1) {
            Some(next) => view::collect_root_render_nodes(self, *next)?
                .first()
                .copied()
                .unwrap_or_else(|| {
                    self.view(container.view)
                        .map(|v| v.node(container.node_index).as_element().render_node)
                        .unwrap_or_default()
                }),
            None => self.view(container.view)?.node(container.node_index).as_element().render_node,
        };
        let root = self.view(view_id)?.root.clone();
        for render_node in view::collect_root_render_nodes(self, view_id)? {
            root.renderer.borrow_mut().insert_before(parent_rn, render_node, before);
        }
        Ok(())
    }
}
