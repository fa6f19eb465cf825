//! Definition Builders
//!
//! Builder functions for node definitions plus `view_def`, which turns a
//! depth-first node sequence into a validated, aggregated
//! [`ViewDefinition`]. The builders leave position-dependent fields
//! (indices, parent links, aggregate masks) at their defaults; `view_def`
//! computes them in a single forward pass plus one reverse aggregation
//! pass.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::errors::EngineError;
use crate::types::*;

fn blank_node(flags: NodeFlags, payload: NodePayload) -> NodeDef {
    NodeDef {
        flags,
        node_index: 0,
        parent: None,
        render_parent: None,
        ng_content_index: None,
        child_count: 0,
        child_flags: NodeFlags::NONE,
        direct_child_flags: NodeFlags::NONE,
        binding_index: 0,
        bindings: Vec::new(),
        binding_flags: BindingFlags::NONE,
        output_index: 0,
        outputs: Vec::new(),
        references: IndexMap::new(),
        matched_queries: IndexMap::new(),
        matched_query_ids: QueryMask::NONE,
        child_matched_queries: QueryMask::NONE,
        payload,
    }
}

fn apply_matched_queries(node: &mut NodeDef, matched: Vec<(QueryId, QueryValueType)>) {
    for (id, value_type) in matched {
        node.matched_query_ids |= filter_query_id(id);
        node.matched_queries.insert(id, value_type);
    }
}

fn aggregate_binding_flags(bindings: &[BindingDef]) -> BindingFlags {
    bindings
        .iter()
        .fold(BindingFlags::NONE, |acc, b| acc | b.flags)
}

/// Optional parts of an element definition.
#[derive(Default)]
pub struct ElementOpts {
    pub flags: NodeFlags,
    pub ns: Option<String>,
    pub attrs: Vec<AttrDef>,
    pub bindings: Vec<BindingDef>,
    pub outputs: Vec<OutputDef>,
    pub references: Vec<(String, QueryValueType)>,
    pub matched_queries: Vec<(QueryId, QueryValueType)>,
    pub ng_content_index: Option<usize>,
    pub template: Option<Rc<ViewDefinition>>,
    pub component_view: Option<ViewDefinitionFactory>,
}

/// An element node. `child_count` covers the element's providers, queries
/// and nested render nodes that follow it in the sequence.
pub fn element_def(child_count: usize, name: Option<&str>, opts: ElementOpts) -> NodeDef {
    let mut flags = NodeFlags::TYPE_ELEMENT | opts.flags;
    if opts.template.is_some() {
        flags |= NodeFlags::EMBEDDED_VIEWS;
    }
    if opts.component_view.is_some() {
        flags |= NodeFlags::COMPONENT_VIEW;
    }
    let mut node = blank_node(
        flags,
        NodePayload::Element(ElementDef {
            name: name.map(str::to_owned),
            ns: opts.ns,
            attrs: opts.attrs,
            template: opts.template,
            component_provider: None,
            component_view: opts.component_view,
            public_providers: Rc::new(IndexMap::new()),
            all_providers: Rc::new(IndexMap::new()),
        }),
    );
    node.child_count = child_count;
    node.ng_content_index = opts.ng_content_index;
    node.binding_flags = aggregate_binding_flags(&opts.bindings);
    node.bindings = opts.bindings;
    node.outputs = opts.outputs;
    node.references = opts.references.into_iter().collect();
    apply_matched_queries(&mut node, opts.matched_queries);
    node
}

/// An anchor: a render position without an element of its own, usually
/// holding an embedded-view template.
pub fn anchor_def(child_count: usize, opts: ElementOpts) -> NodeDef {
    element_def(child_count, None, opts)
}

/// A text node. `static_text[0]` is the prefix; each further entry is the
/// constant following one bound expression, so the number of bindings is
/// `static_text.len() - 1`.
pub fn text_def(ng_content_index: Option<usize>, static_text: Vec<String>) -> NodeDef {
    let mut parts = static_text.into_iter();
    let prefix = parts.next().unwrap_or_default();
    let bindings: Vec<BindingDef> = parts
        .map(|suffix| BindingDef {
            flags: BindingFlags::TYPE_PROPERTY,
            suffix: Some(suffix),
            ..BindingDef::default()
        })
        .collect();
    let mut node = blank_node(NodeFlags::TYPE_TEXT, NodePayload::Text(TextDef { prefix }));
    node.ng_content_index = ng_content_index;
    node.binding_flags = aggregate_binding_flags(&bindings);
    node.bindings = bindings;
    node
}

/// Optional parts of a directive definition.
#[derive(Default)]
pub struct DirectiveOpts {
    /// Lifecycle-hook bits plus `COMPONENT` for the component directive.
    pub flags: NodeFlags,
    pub deps: Vec<DepDef>,
    /// Input property names, in binding order.
    pub inputs: Vec<String>,
    pub outputs: Vec<OutputDef>,
    pub matched_queries: Vec<(QueryId, QueryValueType)>,
}

/// A directive (or component) provider node. `child_count` covers the
/// directive's content-query nodes.
pub fn directive_def(
    child_count: usize,
    token: Token,
    factory: InstanceFactory,
    opts: DirectiveOpts,
) -> NodeDef {
    let bindings: Vec<BindingDef> = opts
        .inputs
        .into_iter()
        .map(|name| BindingDef {
            flags: BindingFlags::TYPE_PROPERTY,
            name: Some(name),
            ..BindingDef::default()
        })
        .collect();
    let mut node = blank_node(
        NodeFlags::TYPE_DIRECTIVE | opts.flags,
        NodePayload::Provider(ProviderDef {
            token,
            value: ProviderValue::Class(factory),
            deps: opts.deps,
        }),
    );
    node.child_count = child_count;
    node.binding_flags = aggregate_binding_flags(&bindings);
    node.bindings = bindings;
    node.outputs = opts.outputs;
    apply_matched_queries(&mut node, opts.matched_queries);
    node
}

/// A non-directive provider node. `flags` must carry exactly one of the
/// provider type bits and may add `PRIVATE_PROVIDER` / `LAZY_PROVIDER`.
pub fn provider_def(
    flags: NodeFlags,
    token: Token,
    value: ProviderValue,
    deps: Vec<DepDef>,
    matched_queries: Vec<(QueryId, QueryValueType)>,
) -> NodeDef {
    let mut node = blank_node(flags, NodePayload::Provider(ProviderDef { token, value, deps }));
    apply_matched_queries(&mut node, matched_queries);
    node
}

/// A pipe provider node.
pub fn pipe_def(token: Token, factory: InstanceFactory, deps: Vec<DepDef>) -> NodeDef {
    blank_node(
        NodeFlags::TYPE_PIPE,
        NodePayload::Provider(ProviderDef {
            token,
            value: ProviderValue::Class(factory),
            deps,
        }),
    )
}

fn pure_expression_def(flags: NodeFlags, bindings: Vec<BindingDef>) -> NodeDef {
    let mut node = blank_node(flags, NodePayload::None);
    node.binding_flags = aggregate_binding_flags(&bindings);
    node.bindings = bindings;
    node
}

/// A pure array expression with `arg_count` inputs; recomputes only when
/// one of the inputs changes identity.
pub fn pure_array_def(arg_count: usize) -> NodeDef {
    let bindings = (0..arg_count)
        .map(|_| BindingDef { flags: BindingFlags::TYPE_PROPERTY, ..BindingDef::default() })
        .collect();
    pure_expression_def(NodeFlags::TYPE_PURE_ARRAY, bindings)
}

/// A pure object-literal expression with the given property names.
pub fn pure_object_def(keys: Vec<String>) -> NodeDef {
    let bindings = keys
        .into_iter()
        .map(|key| BindingDef {
            flags: BindingFlags::TYPE_PROPERTY,
            name: Some(key),
            ..BindingDef::default()
        })
        .collect();
    pure_expression_def(NodeFlags::TYPE_PURE_OBJECT, bindings)
}

/// A pure pipe application: binding 0 is the pipe instance, the rest are
/// the pipe's arguments.
pub fn pure_pipe_def(arg_count: usize) -> NodeDef {
    let bindings = (0..=arg_count)
        .map(|_| BindingDef { flags: BindingFlags::TYPE_PROPERTY, ..BindingDef::default() })
        .collect();
    pure_expression_def(NodeFlags::TYPE_PURE_PIPE, bindings)
}

/// A query node. `flags` must carry `TYPE_CONTENT_QUERY` or
/// `TYPE_VIEW_QUERY` plus `STATIC_QUERY` or `DYNAMIC_QUERY`.
pub fn query_def(
    flags: NodeFlags,
    id: QueryId,
    bindings: Vec<(String, QueryBindingType)>,
) -> NodeDef {
    blank_node(
        flags,
        NodePayload::Query(QueryDef {
            id,
            filter_id: filter_query_id(id),
            bindings: bindings
                .into_iter()
                .map(|(property, kind)| QueryBindingDef { property, kind })
                .collect(),
        }),
    )
}

/// A content-projection slot: projectable nodes for `index` land here.
pub fn ng_content_def(ng_content_index: Option<usize>, index: usize) -> NodeDef {
    let mut node = blank_node(NodeFlags::TYPE_NG_CONTENT, NodePayload::NgContent(NgContentDef { index }));
    node.ng_content_index = ng_content_index;
    node
}

/// Assemble and validate a view definition from a depth-first node
/// sequence. Providers must precede any child elements of the element they
/// serve, so that instantiation order resolves them before the
/// element/component they belong to.
pub fn view_def(
    flags: ViewFlags,
    mut nodes: Vec<NodeDef>,
    update_directives: Option<UpdateFn>,
    update_renderer: Option<UpdateFn>,
    handle_event: Option<HandleEventFn>,
) -> Result<ViewDefinition, EngineError> {
    let len = nodes.len();
    // (node index, index of last transitive child, element child seen)
    let mut stack: Vec<(usize, usize, bool)> = Vec::new();
    let mut binding_count = 0usize;
    let mut output_count = 0usize;
    let mut node_matched_queries = QueryMask::NONE;
    let mut root_node_flags = NodeFlags::NONE;
    let mut last_render_root_node = None;
    let mut node_flags = NodeFlags::NONE;

    for i in 0..len {
        while let Some(&(_, end, _)) = stack.last() {
            if i > end {
                stack.pop();
            } else {
                break;
            }
        }
        let parent = stack.last().map(|&(p, _, _)| p);

        let (before, rest) = nodes.split_at_mut(i);
        let node = &mut rest[0];

        if node.flags.intersection(NodeFlags::TYPES).bits().count_ones() != 1 {
            return Err(EngineError::Misconfigured(format!(
                "node {} must have exactly one primary type bit, got {:?}",
                i, node.flags
            )));
        }
        if node.child_count > 0 && i + node.child_count >= len {
            return Err(EngineError::Misconfigured(format!(
                "node {} declares {} children but the view has only {} nodes",
                i, node.child_count, len
            )));
        }

        node.node_index = i;
        node.parent = parent;
        node.binding_index = binding_count;
        binding_count += node.bindings.len();
        node.output_index = output_count;
        output_count += node.outputs.len();
        node_matched_queries |= node.matched_query_ids;
        node_flags |= node.flags;

        // Render parent: the nearest ancestor element with a real tag name.
        node.render_parent = stack.iter().rev().find_map(|&(p, _, _)| {
            let candidate = &before[p];
            if candidate.flags.contains(NodeFlags::TYPE_ELEMENT)
                && candidate.element().name.is_some()
            {
                Some(p)
            } else {
                None
            }
        });

        if node.flags.intersects(NodeFlags::CAT_PROVIDER) {
            let parent_el = match parent {
                Some(p) if before[p].flags.contains(NodeFlags::TYPE_ELEMENT) => p,
                _ => {
                    return Err(EngineError::Misconfigured(format!(
                        "provider node {} must be a direct child of an element",
                        i
                    )))
                }
            };
            if stack.last().map(|&(_, _, seen)| seen).unwrap_or(false) {
                return Err(EngineError::Misconfigured(format!(
                    "provider node {} must precede its element's child elements",
                    i
                )));
            }
            let is_private = node.flags.contains(NodeFlags::PRIVATE_PROVIDER);
            let token_key = node.provider().token.key().to_owned();
            let el = match &mut before[parent_el].payload {
                NodePayload::Element(e) => e,
                _ => unreachable!(),
            };
            Rc::make_mut(&mut el.all_providers).insert(token_key.clone(), i);
            if !is_private {
                Rc::make_mut(&mut el.public_providers).insert(token_key, i);
            }
            if node.flags.contains(NodeFlags::COMPONENT) {
                if el.component_provider.is_some() {
                    return Err(EngineError::Misconfigured(format!(
                        "element {} has more than one component provider",
                        parent_el
                    )));
                }
                el.component_provider = Some(i);
            }
        } else if node.flags.contains(NodeFlags::TYPE_CONTENT_QUERY) {
            match parent {
                Some(p) if before[p].flags.contains(NodeFlags::TYPE_DIRECTIVE) => {}
                _ => {
                    return Err(EngineError::Misconfigured(format!(
                        "content query node {} must be a direct child of a directive",
                        i
                    )))
                }
            }
        } else if node.flags.contains(NodeFlags::TYPE_VIEW_QUERY) {
            if parent.is_some() {
                return Err(EngineError::Misconfigured(format!(
                    "view query node {} must be declared at the view root",
                    i
                )));
            }
        }

        if node.flags.contains(NodeFlags::TYPE_ELEMENT) {
            // Inherit the nearest ancestor element's provider maps so a
            // single map lookup per element covers the whole view scope.
            let ancestor_el = stack.iter().rev().find_map(|&(p, _, _)| {
                if before[p].flags.contains(NodeFlags::TYPE_ELEMENT) {
                    Some(p)
                } else {
                    None
                }
            });
            if let Some(p) = ancestor_el {
                let public = match &before[p].payload {
                    NodePayload::Element(e) => e.public_providers.clone(),
                    _ => unreachable!(),
                };
                let el = match &mut node.payload {
                    NodePayload::Element(e) => e,
                    _ => unreachable!(),
                };
                // Private providers stay local to their own element; only
                // the public surface is inherited.
                el.public_providers = public.clone();
                el.all_providers = public;
            }
            // Queries matched inside the embedded template count toward
            // this subtree's bloom filter.
            if let NodePayload::Element(e) = &node.payload {
                if let Some(template) = &e.template {
                    node.child_matched_queries |= template.node_matched_queries;
                    node_matched_queries |= template.node_matched_queries;
                }
            }
            if let Some((_, _, seen)) = stack.last_mut() {
                *seen = true;
            }
        }

        if parent.is_none() {
            root_node_flags |= node.flags;
            if node
                .flags
                .intersects(NodeFlags::CAT_RENDER_NODE | NodeFlags::TYPE_NG_CONTENT)
            {
                last_render_root_node = Some(i);
            }
        }

        if node.child_count > 0 {
            stack.push((i, i + node.child_count, false));
        }
    }

    // Reverse pass: children are final before their parents aggregate them.
    for i in (0..len).rev() {
        if let Some(p) = nodes[i].parent {
            let (before, rest) = nodes.split_at_mut(i);
            let node = &rest[0];
            let parent = &mut before[p];
            parent.direct_child_flags |= node.flags;
            parent.child_flags |= node.flags | node.child_flags;
            parent.child_matched_queries |=
                node.matched_query_ids | node.child_matched_queries;
        }
    }

    for node in &nodes {
        if node.flags.contains(NodeFlags::COMPONENT_VIEW)
            && node.element().component_provider.is_none()
        {
            return Err(EngineError::Misconfigured(format!(
                "element {} has a component view but no component provider",
                node.node_index
            )));
        }
    }

    Ok(ViewDefinition {
        flags,
        nodes,
        node_flags,
        root_node_flags,
        last_render_root_node,
        binding_count,
        output_count,
        node_matched_queries,
        update_directives,
        update_renderer,
        handle_event,
    })
}
