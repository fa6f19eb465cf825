//! Core Types
//!
//! The static view-definition model (node definitions, bindings, outputs,
//! queries, dependency records), the mutable per-instance runtime model
//! (view data, node data, root data), and the narrow collaborator traits
//! (renderer, injector, sanitizer, directive) consumed by the engine.
//!
//! Node and view "types" are bitmask categories rather than a class
//! hierarchy: one primary-kind bit per node plus orthogonal category bits,
//! so category tests are O(1) and subtree aggregates are plain bitwise ORs.

use std::any::Any;
use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::errors::EngineError;
use crate::view::{CheckContext, EventContext};

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

bitflags! {
    /// Bitmask describing what a node definition is and which orthogonal
    /// categories apply to it. Exactly one `TYPE_*` bit is set per node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u32 {
        const NONE = 0;
        const TYPE_ELEMENT = 1 << 0;
        const TYPE_TEXT = 1 << 1;
        const TYPE_NG_CONTENT = 1 << 2;
        const TYPE_PIPE = 1 << 3;
        const TYPE_PURE_ARRAY = 1 << 4;
        const TYPE_PURE_OBJECT = 1 << 5;
        const TYPE_PURE_PIPE = 1 << 6;
        const TYPE_VALUE_PROVIDER = 1 << 7;
        const TYPE_CLASS_PROVIDER = 1 << 8;
        const TYPE_FACTORY_PROVIDER = 1 << 9;
        const TYPE_USE_EXISTING_PROVIDER = 1 << 10;
        const TYPE_DIRECTIVE = 1 << 11;
        const TYPE_CONTENT_QUERY = 1 << 12;
        const TYPE_VIEW_QUERY = 1 << 13;

        const LAZY_PROVIDER = 1 << 14;
        const PRIVATE_PROVIDER = 1 << 15;
        const COMPONENT = 1 << 16;
        const EMBEDDED_VIEWS = 1 << 17;
        const COMPONENT_VIEW = 1 << 18;
        const STATIC_QUERY = 1 << 19;
        const DYNAMIC_QUERY = 1 << 20;

        const ON_INIT = 1 << 21;
        const ON_DESTROY = 1 << 22;
        const DO_CHECK = 1 << 23;
        const ON_CHANGES = 1 << 24;
        const AFTER_CONTENT_INIT = 1 << 25;
        const AFTER_CONTENT_CHECKED = 1 << 26;
        const AFTER_VIEW_INIT = 1 << 27;
        const AFTER_VIEW_CHECKED = 1 << 28;

        const CAT_PURE_EXPRESSION = Self::TYPE_PURE_ARRAY.bits()
            | Self::TYPE_PURE_OBJECT.bits()
            | Self::TYPE_PURE_PIPE.bits();
        const CAT_PROVIDER_NO_DIRECTIVE = Self::TYPE_VALUE_PROVIDER.bits()
            | Self::TYPE_CLASS_PROVIDER.bits()
            | Self::TYPE_FACTORY_PROVIDER.bits()
            | Self::TYPE_USE_EXISTING_PROVIDER.bits();
        const CAT_PROVIDER = Self::CAT_PROVIDER_NO_DIRECTIVE.bits()
            | Self::TYPE_DIRECTIVE.bits()
            | Self::TYPE_PIPE.bits();
        const CAT_QUERY = Self::TYPE_CONTENT_QUERY.bits() | Self::TYPE_VIEW_QUERY.bits();
        const CAT_RENDER_NODE = Self::TYPE_ELEMENT.bits() | Self::TYPE_TEXT.bits();
        const CAT_LIFECYCLE_INIT = Self::ON_INIT.bits()
            | Self::AFTER_CONTENT_INIT.bits()
            | Self::AFTER_VIEW_INIT.bits();
        const TYPES = Self::CAT_PROVIDER.bits()
            | Self::CAT_PURE_EXPRESSION.bits()
            | Self::CAT_QUERY.bits()
            | Self::TYPE_ELEMENT.bits()
            | Self::TYPE_TEXT.bits()
            | Self::TYPE_NG_CONTENT.bits();
    }
}

bitflags! {
    /// Static flags describing a whole view definition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ViewFlags: u32 {
        const NONE = 0;
        /// The view is only checked when explicitly marked dirty.
        const ON_PUSH = 1 << 1;
    }
}

bitflags! {
    /// Mutable per-instance state of a view.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ViewState: u32 {
        const NONE = 0;
        const FIRST_CHECK = 1 << 0;
        const CHECKS_ENABLED = 1 << 1;
        const ERRORED = 1 << 2;
        const DESTROYED = 1 << 3;
    }
}

bitflags! {
    /// Sub-kind of a single binding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BindingFlags: u32 {
        const NONE = 0;
        const TYPE_ELEMENT_ATTRIBUTE = 1 << 0;
        const TYPE_ELEMENT_CLASS = 1 << 1;
        const TYPE_ELEMENT_STYLE = 1 << 2;
        const TYPE_PROPERTY = 1 << 3;
        /// A property that must be dispatched through an animation or other
        /// synthetic channel rather than set directly.
        const SYNTHETIC_PROPERTY = 1 << 4;
        const SYNTHETIC_HOST_PROPERTY = 1 << 5;

        const CAT_SYNTHETIC_PROPERTY =
            Self::SYNTHETIC_PROPERTY.bits() | Self::SYNTHETIC_HOST_PROPERTY.bits();
        const TYPES = Self::TYPE_ELEMENT_ATTRIBUTE.bits()
            | Self::TYPE_ELEMENT_CLASS.bits()
            | Self::TYPE_ELEMENT_STYLE.bits()
            | Self::TYPE_PROPERTY.bits()
            | Self::CAT_SYNTHETIC_PROPERTY.bits();
    }
}

bitflags! {
    /// Flags attached to a single dependency record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DepFlags: u32 {
        const NONE = 0;
        /// Skip the requesting element's own providers.
        const SKIP_SELF = 1 << 0;
        /// Missing providers resolve to the caller's fallback value.
        const OPTIONAL = 1 << 1;
        /// The dependency record carries its value inline.
        const VALUE = 1 << 2;
    }
}

bitflags! {
    /// Bloom-filter mask of query ids. A set bit means "a query whose id
    /// hashes to this bit may match here"; false positives are allowed,
    /// false negatives are not.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueryMask: u32 {
        const NONE = 0;
    }
}

pub type QueryId = u32;

/// Derive the bloom-filter bit for a query id.
pub fn filter_query_id(query_id: QueryId) -> QueryMask {
    QueryMask::from_bits_retain(1 << (query_id % 32))
}

/// Security context of a binding value, consulted before the value is
/// handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum SecurityContext {
    None = 0,
    Html = 1,
    Style = 2,
    Script = 3,
    Url = 4,
    ResourceUrl = 5,
}

// ---------------------------------------------------------------------------
// Identifiers and handles
// ---------------------------------------------------------------------------

/// Index of a view instance in the engine's arena. Slots are never
/// recycled, so a stale id can only name a destroyed view, never alias a
/// new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ViewId(pub(crate) usize);

impl ViewId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Opaque handle to a platform render node, issued by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RenderNode(pub u64);

/// Opaque handle to a registered event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub u64);

/// Handle to an embedded-view template declared on an anchor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TemplateRef {
    pub view: ViewId,
    pub node_index: usize,
}

/// Handle to the embedded-view container living on an anchor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ViewContainerRef {
    pub view: ViewId,
    pub node_index: usize,
}

/// Handle naming the injection scope of one element (or of the view root
/// when `node_index` is `None`). Resolution happens through the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct InjectorRef {
    pub view: ViewId,
    pub node_index: Option<usize>,
}

/// Handle to the change detector of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ChangeDetectorRef {
    pub view: ViewId,
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// A dependency-injection token, compared by key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Token {
    key: Cow<'static, str>,
}

impl Token {
    pub fn new(key: impl Into<Cow<'static, str>>) -> Self {
        Token { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Well-known tokens resolved positionally by the engine instead of through
/// provider maps.
pub static INJECTOR_TOKEN: Lazy<Token> = Lazy::new(|| Token::new("$engine.injector"));
pub static ELEMENT_REF_TOKEN: Lazy<Token> = Lazy::new(|| Token::new("$engine.element_ref"));
pub static TEMPLATE_REF_TOKEN: Lazy<Token> = Lazy::new(|| Token::new("$engine.template_ref"));
pub static VIEW_CONTAINER_REF_TOKEN: Lazy<Token> =
    Lazy::new(|| Token::new("$engine.view_container_ref"));
pub static CHANGE_DETECTOR_REF_TOKEN: Lazy<Token> =
    Lazy::new(|| Token::new("$engine.change_detector_ref"));

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A runtime value flowing through bindings, providers and queries.
///
/// Reference-shaped variants (lists, maps, provider instances) compare by
/// identity, mirroring the change-detection contract that a binding is
/// "changed" when it no longer refers to the same object.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Number(f64),
    Str(Rc<str>),
    List(Rc<Vec<Value>>),
    Map(Rc<IndexMap<String, Value>>),
    Instance(ProviderInstance),
    RenderNode(RenderNode),
    TemplateRef(TemplateRef),
    ViewContainerRef(ViewContainerRef),
    InjectorRef(InjectorRef),
    ChangeDetectorRef(ChangeDetectorRef),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn list(values: Vec<Value>) -> Value {
        Value::List(Rc::new(values))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&ProviderInstance> {
        match self {
            Value::Instance(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Truthiness used by class bindings: null, false, zero and the empty
    /// string are falsy, everything else is truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Render-facing string form, `None` for null (attribute removal).
    pub fn to_render_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Str(s) => Some(s.to_string()),
            other => Some(format!("{:?}", other)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Int(a), Value::Number(b)) | (Value::Number(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::RenderNode(a), Value::RenderNode(b)) => a == b,
            (Value::TemplateRef(a), Value::TemplateRef(b)) => a == b,
            (Value::ViewContainerRef(a), Value::ViewContainerRef(b)) => a == b,
            (Value::InjectorRef(a), Value::InjectorRef(b)) => a == b,
            (Value::ChangeDetectorRef(a), Value::ChangeDetectorRef(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Number(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::List(l) => write!(f, "List(len={})", l.len()),
            Value::Map(m) => write!(f, "Map(len={})", m.len()),
            Value::Instance(i) => write!(f, "Instance({:p})", Rc::as_ptr(i)),
            Value::RenderNode(n) => write!(f, "RenderNode({})", n.0),
            Value::TemplateRef(t) => write!(f, "TemplateRef({}/{})", t.view.0, t.node_index),
            Value::ViewContainerRef(c) => {
                write!(f, "ViewContainerRef({}/{})", c.view.0, c.node_index)
            }
            Value::InjectorRef(i) => write!(f, "InjectorRef({})", i.view.0),
            Value::ChangeDetectorRef(c) => write!(f, "ChangeDetectorRef({})", c.view.0),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::str(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::str(v)
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Event-listener attachment scope for an output binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenTarget {
    Node(RenderNode),
    Window,
    Document,
    Body,
}

/// The rendering abstraction. The engine calls it during instantiation,
/// the update-renderer phase, projection and destruction; never during the
/// update-directives phase.
pub trait Renderer {
    fn create_element(&mut self, name: &str, ns: Option<&str>) -> RenderNode;
    fn create_text(&mut self, value: &str) -> RenderNode;
    fn create_anchor(&mut self) -> RenderNode;
    fn append_child(&mut self, parent: RenderNode, child: RenderNode);
    fn insert_before(&mut self, parent: RenderNode, child: RenderNode, before: RenderNode);
    fn remove_child(&mut self, child: RenderNode);
    fn set_attribute(&mut self, node: RenderNode, ns: Option<&str>, name: &str, value: Option<&str>);
    fn set_property(&mut self, node: RenderNode, name: &str, value: &Value);
    fn add_class(&mut self, node: RenderNode, name: &str);
    fn remove_class(&mut self, node: RenderNode, name: &str);
    fn set_style(&mut self, node: RenderNode, name: &str, value: Option<&str>);
    fn set_text(&mut self, node: RenderNode, value: &str);
    fn listen(&mut self, target: ListenTarget, event: &str) -> ListenerHandle;
    fn unlisten(&mut self, handle: ListenerHandle);
    fn destroy_node(&mut self, node: RenderNode);
}

/// Terminal fallback for dependency resolution.
pub trait Injector {
    fn resolve(&self, token: &Token) -> Option<Value>;
}

/// An injector that never resolves anything; useful as a root injector for
/// self-contained views.
#[derive(Debug, Default)]
pub struct NullInjector;

impl Injector for NullInjector {
    fn resolve(&self, _token: &Token) -> Option<Value> {
        None
    }
}

/// Policy hook applied to binding values carrying a non-default security
/// context before they reach the renderer.
pub trait Sanitizer {
    fn sanitize(&self, ctx: SecurityContext, value: &Value) -> Value;
}

/// Sanitizer that passes every value through unchanged.
#[derive(Debug, Default)]
pub struct NoopSanitizer;

impl Sanitizer for NoopSanitizer {
    fn sanitize(&self, _ctx: SecurityContext, value: &Value) -> Value {
        value.clone()
    }
}

/// A single reported input change.
#[derive(Debug, Clone)]
pub struct SimpleChange {
    pub previous: Value,
    pub current: Value,
    pub first_change: bool,
}

/// Input changes keyed by input property name, in binding order.
pub type SimpleChanges = IndexMap<String, SimpleChange>;

/// Behavior contract for directive, component and pipe instances.
///
/// All hooks default to no-ops; the node definition's hook bits decide
/// which ones the engine actually invokes.
pub trait Directive: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Receive the value of the input at `binding_index` (node-local).
    fn set_input(&mut self, _binding_index: usize, _value: &Value) {}

    /// Receive an updated query result for the named query property.
    fn set_query(&mut self, _property: &str, _value: Value) {}

    /// Pipe transformation; only meaningful for pipe providers.
    fn transform(&self, _args: &[Value]) -> Value {
        Value::Null
    }

    fn on_changes(&mut self, _changes: &SimpleChanges) {}
    fn on_init(&mut self) {}
    fn do_check(&mut self) {}
    fn after_content_init(&mut self) {}
    fn after_content_checked(&mut self) {}
    fn after_view_init(&mut self) {}
    fn after_view_checked(&mut self) {}
    fn on_destroy(&mut self) {}
}

/// Shared, interiorly-mutable handle to a provider instance.
pub type ProviderInstance = Rc<RefCell<dyn Directive>>;

// ---------------------------------------------------------------------------
// Closure types supplied by the (external) template compiler
// ---------------------------------------------------------------------------

/// Update function for one phase of a check cycle. The closure walks the
/// view's bound nodes in definition order, computing the current value set
/// for each and feeding it to [`CheckContext::check_node`].
pub type UpdateFn = Rc<dyn Fn(&mut CheckContext<'_>) -> Result<(), EngineError>>;

/// Event dispatch function: `(ctx, node_index, event_name, payload)`.
/// Returns `false` to cancel the event's default behavior.
pub type HandleEventFn =
    Rc<dyn Fn(&mut EventContext, usize, &str, &Value) -> Result<bool, EngineError>>;

/// Produces the view definition for a component or embedded template.
/// Invoked lazily and must be idempotent: the engine re-invokes it to
/// pin down the failing definition when construction errors.
pub type ViewDefinitionFactory = Rc<dyn Fn() -> anyhow::Result<ViewDefinition>>;

/// Factory for class providers, directives and pipes.
pub type InstanceFactory = Rc<dyn Fn(&[Value]) -> ProviderInstance>;

/// Factory for factory providers.
pub type ValueFactory = Rc<dyn Fn(&[Value]) -> Value>;

// ---------------------------------------------------------------------------
// Node definitions
// ---------------------------------------------------------------------------

/// One statically declared binding on a node.
#[derive(Clone, Debug, Default)]
pub struct BindingDef {
    pub flags: BindingFlags,
    pub ns: Option<String>,
    pub name: Option<String>,
    /// Trailing constant for text interpolation, or a style unit suffix.
    pub suffix: Option<String>,
    pub security_context: SecurityContext,
}

impl Default for SecurityContext {
    fn default() -> Self {
        SecurityContext::None
    }
}

/// One statically declared output (event binding) on a node.
#[derive(Clone, Debug)]
pub struct OutputDef {
    pub target: OutputTarget,
    pub event_name: String,
    pub property_name: Option<String>,
}

/// Where an output's listener is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTarget {
    /// The node's own render element.
    Element,
    Window,
    Document,
    Body,
    /// The directive/component instance itself; no render listener.
    Component,
}

/// Value kind a query match or a user-declared reference resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum QueryValueType {
    ElementRef,
    RenderElement,
    TemplateRef,
    ViewContainerRef,
    Provider,
}

/// One dependency of a provider.
#[derive(Clone, Debug)]
pub struct DepDef {
    pub flags: DepFlags,
    pub token: Token,
    /// Inline value for `DepFlags::VALUE` records.
    pub value: Option<Value>,
}

impl DepDef {
    pub fn new(token: Token) -> Self {
        DepDef { flags: DepFlags::NONE, token, value: None }
    }

    pub fn with_flags(token: Token, flags: DepFlags) -> Self {
        DepDef { flags, token, value: None }
    }
}

/// A static attribute on an element.
#[derive(Clone, Debug)]
pub struct AttrDef {
    pub ns: Option<String>,
    pub name: String,
    pub value: String,
}

/// Element payload of a node definition. Also used for anchors (elements
/// without a name) that hold embedded-view containers.
#[derive(Clone)]
pub struct ElementDef {
    pub name: Option<String>,
    pub ns: Option<String>,
    pub attrs: Vec<AttrDef>,
    /// Template for embedded views instantiated out of this anchor.
    pub template: Option<Rc<ViewDefinition>>,
    /// Node index of the component provider among this element's children.
    pub component_provider: Option<usize>,
    /// Factory for the component's own view.
    pub component_view: Option<ViewDefinitionFactory>,
    /// Token key -> provider node index, visible to everyone. Includes
    /// entries inherited from ancestor elements of the same view.
    pub public_providers: Rc<IndexMap<String, usize>>,
    /// Like `public_providers` but including private providers; only
    /// consulted on behalf of the element's own component/directives.
    pub all_providers: Rc<IndexMap<String, usize>>,
}

/// Provider payload of a node definition.
#[derive(Clone)]
pub struct ProviderDef {
    pub token: Token,
    pub value: ProviderValue,
    pub deps: Vec<DepDef>,
}

/// How a provider produces its value.
#[derive(Clone)]
pub enum ProviderValue {
    Value(Value),
    Class(InstanceFactory),
    Factory(ValueFactory),
    UseExisting(Token),
}

/// Text payload: the static prefix; each binding's `suffix` carries the
/// constant that follows the bound expression.
#[derive(Clone, Debug)]
pub struct TextDef {
    pub prefix: String,
}

/// How a query delivers its results to the owning directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryBindingType {
    /// Bind the first match.
    First,
    /// Bind the full, live list of matches.
    All,
}

#[derive(Clone, Debug)]
pub struct QueryBindingDef {
    pub property: String,
    pub kind: QueryBindingType,
}

/// Query payload of a node definition.
#[derive(Clone, Debug)]
pub struct QueryDef {
    pub id: QueryId,
    pub filter_id: QueryMask,
    pub bindings: Vec<QueryBindingDef>,
}

/// Content-projection payload: which projectable-node slot lands here.
#[derive(Clone, Debug)]
pub struct NgContentDef {
    pub index: usize,
}

/// Variant payload of a node definition. Pure-expression nodes carry no
/// payload beyond their bindings.
#[derive(Clone)]
pub enum NodePayload {
    Element(ElementDef),
    Text(TextDef),
    Provider(ProviderDef),
    Query(QueryDef),
    NgContent(NgContentDef),
    None,
}

/// Immutable description of one position in a view's node tree, shared by
/// every instance of the view definition.
#[derive(Clone)]
pub struct NodeDef {
    pub flags: NodeFlags,
    pub node_index: usize,
    /// Back-reference only; ownership flows root-to-leaf.
    pub parent: Option<usize>,
    pub render_parent: Option<usize>,
    pub ng_content_index: Option<usize>,
    /// Number of transitive children following this node in the sequence.
    pub child_count: usize,
    pub child_flags: NodeFlags,
    pub direct_child_flags: NodeFlags,
    /// First index of this node's bindings in the view's binding table.
    pub binding_index: usize,
    pub bindings: Vec<BindingDef>,
    pub binding_flags: BindingFlags,
    pub output_index: usize,
    pub outputs: Vec<OutputDef>,
    /// User-declared local references on this node.
    pub references: IndexMap<String, QueryValueType>,
    /// Queries this node itself matches.
    pub matched_queries: IndexMap<QueryId, QueryValueType>,
    pub matched_query_ids: QueryMask,
    /// Bloom filter over every query id matched anywhere in the subtree.
    pub child_matched_queries: QueryMask,
    pub payload: NodePayload,
}

impl NodeDef {
    /// The element payload; panics when called on a non-element node.
    pub fn element(&self) -> &ElementDef {
        match &self.payload {
            NodePayload::Element(e) => e,
            _ => panic!("node {} is not an element", self.node_index),
        }
    }

    pub fn provider(&self) -> &ProviderDef {
        match &self.payload {
            NodePayload::Provider(p) => p,
            _ => panic!("node {} is not a provider", self.node_index),
        }
    }

    pub fn text(&self) -> &TextDef {
        match &self.payload {
            NodePayload::Text(t) => t,
            _ => panic!("node {} is not a text node", self.node_index),
        }
    }

    pub fn query(&self) -> &QueryDef {
        match &self.payload {
            NodePayload::Query(q) => q,
            _ => panic!("node {} is not a query", self.node_index),
        }
    }

    pub fn ng_content(&self) -> &NgContentDef {
        match &self.payload {
            NodePayload::NgContent(c) => c,
            _ => panic!("node {} is not a content slot", self.node_index),
        }
    }
}

// ---------------------------------------------------------------------------
// View definition
// ---------------------------------------------------------------------------

/// Immutable, compiled description of one component or template: the
/// depth-first node sequence plus aggregated flags and the update/event
/// entry points produced by the template compiler.
#[derive(Clone)]
pub struct ViewDefinition {
    pub flags: ViewFlags,
    pub nodes: Vec<NodeDef>,
    /// OR of every node's flags.
    pub node_flags: NodeFlags,
    /// OR of the root nodes' flags.
    pub root_node_flags: NodeFlags,
    /// Index of the last root node that owns a render node.
    pub last_render_root_node: Option<usize>,
    pub binding_count: usize,
    pub output_count: usize,
    /// Bloom filter over every query id matched anywhere in this view.
    pub node_matched_queries: QueryMask,
    pub update_directives: Option<UpdateFn>,
    pub update_renderer: Option<UpdateFn>,
    pub handle_event: Option<HandleEventFn>,
}

impl fmt::Debug for ViewDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewDefinition")
            .field("flags", &self.flags)
            .field("nodes", &self.nodes.len())
            .field("binding_count", &self.binding_count)
            .field("output_count", &self.output_count)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Runtime data
// ---------------------------------------------------------------------------

/// Data shared by every view rooted at one instantiation entry point.
pub struct RootData {
    pub injector: Rc<dyn Injector>,
    pub renderer: Rc<RefCell<dyn Renderer>>,
    pub sanitizer: Rc<dyn Sanitizer>,
    /// Render nodes to project into content slots, by slot index.
    pub projectable_nodes: Vec<Vec<RenderNode>>,
}

/// A resource released exactly once when the owning view is destroyed.
pub enum Disposable {
    Listener(ListenerHandle),
    Callback(Box<dyn FnOnce()>),
}

/// Runtime payload of an element node.
#[derive(Clone, Debug, Default)]
pub struct ElementData {
    pub render_node: RenderNode,
    /// The nested component view, when this element hosts a component.
    pub component_view: Option<ViewId>,
    /// Ordered embedded views, when this element is a view container.
    pub view_container: Option<Vec<ViewId>>,
    /// Views instantiated from this element's template but attached to
    /// containers declared on other elements.
    pub projected_views: Vec<ViewId>,
}

impl Default for RenderNode {
    fn default() -> Self {
        RenderNode(0)
    }
}

/// Runtime payload of a text node.
#[derive(Clone, Debug)]
pub struct TextData {
    pub render_node: RenderNode,
}

/// Runtime payload of a provider node.
#[derive(Clone)]
pub struct ProviderData {
    pub instance: Value,
}

/// Runtime payload of a pure-expression node.
#[derive(Clone)]
pub struct PureExpressionData {
    pub value: Value,
}

/// Runtime payload of a query node.
#[derive(Clone, Default)]
pub struct QueryData {
    pub values: Vec<Value>,
    pub dirty: bool,
}

/// Mutable per-node runtime state. The variant at a given index is fixed
/// for the lifetime of the view by the corresponding node definition's
/// kind; traversal always walks the definition sequence and dispatches on
/// the static kind, never on this enum's own discriminant.
pub enum NodeData {
    /// Placeholder before creation, and permanent state of nodes that
    /// carry no runtime payload (content slots).
    Empty,
    Element(ElementData),
    Text(TextData),
    Provider(ProviderData),
    PureExpression(PureExpressionData),
    Query(QueryData),
}

impl NodeData {
    pub fn as_element(&self) -> &ElementData {
        match self {
            NodeData::Element(e) => e,
            _ => panic!("node data is not element data"),
        }
    }

    pub fn as_element_mut(&mut self) -> &mut ElementData {
        match self {
            NodeData::Element(e) => e,
            _ => panic!("node data is not element data"),
        }
    }

    pub fn as_text(&self) -> &TextData {
        match self {
            NodeData::Text(t) => t,
            _ => panic!("node data is not text data"),
        }
    }

    pub fn as_provider(&self) -> &ProviderData {
        match self {
            NodeData::Provider(p) => p,
            _ => panic!("node data is not provider data"),
        }
    }

    pub fn as_provider_mut(&mut self) -> &mut ProviderData {
        match self {
            NodeData::Provider(p) => p,
            _ => panic!("node data is not provider data"),
        }
    }

    pub fn as_pure_expression(&self) -> &PureExpressionData {
        match self {
            NodeData::PureExpression(p) => p,
            _ => panic!("node data is not pure-expression data"),
        }
    }

    pub fn as_pure_expression_mut(&mut self) -> &mut PureExpressionData {
        match self {
            NodeData::PureExpression(p) => p,
            _ => panic!("node data is not pure-expression data"),
        }
    }

    pub fn as_query(&self) -> &QueryData {
        match self {
            NodeData::Query(q) => q,
            _ => panic!("node data is not query data"),
        }
    }

    pub fn as_query_mut(&mut self) -> &mut QueryData {
        match self {
            NodeData::Query(q) => q,
            _ => panic!("node data is not query data"),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, NodeData::Empty)
    }
}

/// Links a view to the node in its parent view that hosts it.
#[derive(Debug, Clone, Copy)]
pub struct ViewParent {
    pub view: ViewId,
    pub node_index: usize,
}

/// The mutable runtime tree node for one instantiation of a view
/// definition.
pub struct ViewData {
    pub def: Rc<ViewDefinition>,
    pub root: Rc<RootData>,
    /// Hosting element (component views) or declaring anchor (embedded
    /// views); `None` for root views.
    pub parent: Option<ViewParent>,
    /// Set when the view is currently attached to a view container.
    pub view_container_parent: Option<ViewParent>,
    pub context: Value,
    pub component: Value,
    /// One slot per node definition, index-aligned.
    pub nodes: Vec<NodeData>,
    pub state: ViewState,
    /// Previous binding values, indexed by the view-wide binding index.
    pub old_values: Vec<Value>,
    pub disposables: Vec<Disposable>,
}

impl ViewData {
    pub fn node(&self, index: usize) -> &NodeData {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut NodeData {
        &mut self.nodes[index]
    }
}
