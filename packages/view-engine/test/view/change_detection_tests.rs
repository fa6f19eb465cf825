mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::*;
use view_engine::*;

#[test]
fn text_bindings_render_only_on_change() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let count = Rc::new(Cell::new(5i64));
    let state = count.clone();
    let update_renderer: UpdateFn =
        Rc::new(move |ctx| ctx.check_node(1, &[Value::Int(state.get())]));
    let def = view_def(
        ViewFlags::NONE,
        vec![
            element_def(1, Some("div"), ElementOpts::default()),
            text_def(None, vec!["count: ".into(), "!".into()]),
        ],
        None,
        Some(update_renderer),
        None,
    )
    .unwrap();
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();
    let text = eng.render_node(view, 1).unwrap();

    eng.check_and_update(view).unwrap();
    assert_eq!(root.renderer.borrow().text_of(text), "count: 5!");

    let ops_before = root.renderer.borrow().ops.len();
    eng.check_and_update(view).unwrap();
    // Unchanged value, no render traffic.
    assert_eq!(root.renderer.borrow().ops.len(), ops_before);

    count.set(6);
    eng.check_and_update(view).unwrap();
    assert_eq!(root.renderer.borrow().text_of(text), "count: 6!");
}

fn hooked_directive_view(
    state: Rc<Cell<i64>>,
    log: Rc<RefCellLog>,
) -> ViewDefinition {
    let update_directives: UpdateFn =
        Rc::new(move |ctx| ctx.check_node(1, &[Value::Int(state.get())]));
    view_def(
        ViewFlags::NONE,
        vec![
            element_def(1, Some("div"), ElementOpts::default()),
            directive_def(
                0,
                Token::new("dir"),
                probe_factory("dir", log),
                DirectiveOpts {
                    flags: NodeFlags::ON_CHANGES
                        | NodeFlags::ON_INIT
                        | NodeFlags::DO_CHECK
                        | NodeFlags::AFTER_CONTENT_INIT
                        | NodeFlags::AFTER_CONTENT_CHECKED
                        | NodeFlags::AFTER_VIEW_INIT
                        | NodeFlags::AFTER_VIEW_CHECKED
                        | NodeFlags::ON_DESTROY,
                    inputs: vec!["value".into()],
                    ..DirectiveOpts::default()
                },
            ),
        ],
        Some(update_directives),
        None,
        None,
    )
    .unwrap()
}

type RefCellLog = std::cell::RefCell<Vec<String>>;

#[test]
fn lifecycle_hooks_fire_in_declaration_order() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let log = hook_log();
    let state = Rc::new(Cell::new(1i64));
    let def = hooked_directive_view(state.clone(), log.clone());
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();

    eng.check_and_update(view).unwrap();
    assert_eq!(
        take_log(&log),
        vec![
            "dir.set_input 0",
            "dir.on_changes [value] first=true",
            "dir.on_init",
            "dir.do_check",
            "dir.after_content_init",
            "dir.after_content_checked",
            "dir.after_view_init",
            "dir.after_view_checked",
        ]
    );

    // Settled cycle: per-cycle hooks only.
    eng.check_and_update(view).unwrap();
    assert_eq!(
        take_log(&log),
        vec!["dir.do_check", "dir.after_content_checked", "dir.after_view_checked"]
    );

    state.set(2);
    eng.check_and_update(view).unwrap();
    assert_eq!(
        take_log(&log),
        vec![
            "dir.set_input 0",
            "dir.on_changes [value] first=false",
            "dir.do_check",
            "dir.after_content_checked",
            "dir.after_view_checked",
        ]
    );
}

#[test]
fn check_no_changes_reports_late_mutations() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let log = hook_log();
    let state = Rc::new(Cell::new(1i64));
    let def = hooked_directive_view(state.clone(), log.clone());
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();

    eng.check_and_update(view).unwrap();
    take_log(&log);
    eng.check_no_changes(view).unwrap();
    // Verification never talks to instances.
    assert!(take_log(&log).is_empty());

    state.set(99);
    let err = eng.check_no_changes(view).unwrap_err();
    match err {
        EngineError::ExpressionChanged { view: v, node_index, binding_index, previous, current } => {
            assert_eq!(v, view);
            assert_eq!(node_index, 1);
            assert_eq!(binding_index, 0);
            assert_eq!(previous, Value::Int(1));
            assert_eq!(current, Value::Int(99));
        }
        other => panic!("expected ExpressionChanged, got {other:?}"),
    }
    // Verification failures do not poison the view.
    assert!(!eng.view_state(view).unwrap().contains(ViewState::ERRORED));
    eng.check_and_update(view).unwrap();
}

#[test]
fn a_failing_update_marks_the_view_errored() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let fail = Rc::new(Cell::new(false));
    let trigger = fail.clone();
    let update_directives: UpdateFn = Rc::new(move |_ctx| {
        if trigger.get() {
            Err(EngineError::Misconfigured("binding evaluator blew up".into()))
        } else {
            Ok(())
        }
    });
    let def = view_def(
        ViewFlags::NONE,
        vec![element_def(0, Some("div"), ElementOpts::default())],
        Some(update_directives),
        None,
        None,
    )
    .unwrap();
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();
    eng.check_and_update(view).unwrap();

    fail.set(true);
    assert!(eng.check_and_update(view).is_err());
    assert!(eng.view_state(view).unwrap().contains(ViewState::ERRORED));

    // Errored is sticky: only re-instantiation recovers.
    fail.set(false);
    assert!(matches!(eng.check_and_update(view), Err(EngineError::ErroredView(v)) if v == view));
}

#[test]
fn reentrant_checks_are_rejected_without_poisoning() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let reenter = Rc::new(Cell::new(true));
    let flag = reenter.clone();
    let update_directives: UpdateFn = Rc::new(move |ctx| {
        if flag.get() {
            flag.set(false);
            ctx.check_and_update(ctx.view_id())
        } else {
            Ok(())
        }
    });
    let def = view_def(
        ViewFlags::NONE,
        vec![element_def(0, Some("div"), ElementOpts::default())],
        Some(update_directives),
        None,
        None,
    )
    .unwrap();
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();

    assert!(matches!(eng.check_and_update(view), Err(EngineError::RecursiveCheck)));
    assert!(!eng.view_state(view).unwrap().contains(ViewState::ERRORED));
    eng.check_and_update(view).unwrap();
}

/// Host view with a component whose own view is on-push; the component
/// view's update function counts its runs.
fn on_push_host(
    state: Rc<Cell<i64>>,
    runs: Rc<Cell<u32>>,
    log: Rc<RefCellLog>,
) -> ViewDefinition {
    let inner_update: UpdateFn = Rc::new(move |_ctx| {
        runs.set(runs.get() + 1);
        Ok(())
    });
    let inner = view_def(
        ViewFlags::ON_PUSH,
        vec![element_def(0, Some("span"), ElementOpts::default())],
        None,
        Some(inner_update),
        None,
    )
    .unwrap();
    let update_directives: UpdateFn =
        Rc::new(move |ctx| ctx.check_node(1, &[Value::Int(state.get())]));
    view_def(
        ViewFlags::NONE,
        vec![
            element_def(
                1,
                Some("my-comp"),
                ElementOpts { component_view: Some(factory_of(inner)), ..ElementOpts::default() },
            ),
            directive_def(
                0,
                Token::new("comp"),
                probe_factory("comp", log),
                DirectiveOpts {
                    flags: NodeFlags::COMPONENT,
                    inputs: vec!["value".into()],
                    ..DirectiveOpts::default()
                },
            ),
        ],
        Some(update_directives),
        None,
        None,
    )
    .unwrap()
}

#[test]
fn on_push_views_settle_until_an_input_changes() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let state = Rc::new(Cell::new(1i64));
    let runs = Rc::new(Cell::new(0u32));
    let def = on_push_host(state.clone(), runs.clone(), hook_log());
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();
    let comp_view = eng.component_view(view, 0).unwrap().unwrap();

    eng.check_and_update(view).unwrap();
    assert_eq!(runs.get(), 1);
    assert!(!eng.view_state(comp_view).unwrap().contains(ViewState::CHECKS_ENABLED));

    // Settled: the component view is skipped entirely.
    eng.check_and_update(view).unwrap();
    assert_eq!(runs.get(), 1);

    // A changed input re-enables it for one cycle.
    state.set(2);
    eng.check_and_update(view).unwrap();
    assert_eq!(runs.get(), 2);
    eng.check_and_update(view).unwrap();
    assert_eq!(runs.get(), 2);
}

#[test]
fn mark_dirty_reaches_through_on_push_boundaries() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let state = Rc::new(Cell::new(1i64));
    let runs = Rc::new(Cell::new(0u32));
    let def = on_push_host(state, runs.clone(), hook_log());
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();
    let comp_view = eng.component_view(view, 0).unwrap().unwrap();

    eng.check_and_update(view).unwrap();
    eng.check_and_update(view).unwrap();
    assert_eq!(runs.get(), 1);

    eng.mark_dirty(comp_view).unwrap();
    eng.check_and_update(view).unwrap();
    assert_eq!(runs.get(), 2);
}

#[test]
fn detached_views_are_skipped_until_reattached() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let runs = Rc::new(Cell::new(0u32));
    let counter = runs.clone();
    let inner_update: UpdateFn = Rc::new(move |_ctx| {
        counter.set(counter.get() + 1);
        Ok(())
    });
    let inner = view_def(
        ViewFlags::NONE,
        vec![element_def(0, Some("span"), ElementOpts::default())],
        None,
        Some(inner_update),
        None,
    )
    .unwrap();
    let def = view_def(
        ViewFlags::NONE,
        vec![
            element_def(
                1,
                Some("my-comp"),
                ElementOpts { component_view: Some(factory_of(inner)), ..ElementOpts::default() },
            ),
            directive_def(
                0,
                Token::new("comp"),
                probe_factory("comp", hook_log()),
                DirectiveOpts { flags: NodeFlags::COMPONENT, ..DirectiveOpts::default() },
            ),
        ],
        None,
        None,
        None,
    )
    .unwrap();
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();
    let comp_view = eng.component_view(view, 0).unwrap().unwrap();

    eng.check_and_update(view).unwrap();
    assert_eq!(runs.get(), 1);

    eng.detach_change_detector(comp_view).unwrap();
    eng.check_and_update(view).unwrap();
    assert_eq!(runs.get(), 1);

    eng.reattach_change_detector(comp_view).unwrap();
    eng.check_and_update(view).unwrap();
    assert_eq!(runs.get(), 2);
}

#[test]
fn event_dispatch_marks_the_path_for_checking() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let events = hook_log();
    let sink = events.clone();
    let handle_event: HandleEventFn = Rc::new(move |ctx, node_index, event_name, payload| {
        sink.borrow_mut().push(format!(
            "view {} node {} {} {:?}",
            ctx.view.index(),
            node_index,
            event_name,
            payload
        ));
        Ok(false)
    });
    let def = view_def(
        ViewFlags::ON_PUSH,
        vec![element_def(0, Some("button"), ElementOpts::default())],
        None,
        None,
        Some(handle_event),
    )
    .unwrap();
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();

    // Settle the on-push view.
    eng.check_and_update(view).unwrap();
    assert!(!eng.view_state(view).unwrap().contains(ViewState::CHECKS_ENABLED));

    let cancelled = eng.handle_event(view, 0, "click", &Value::str("payload")).unwrap();
    assert!(!cancelled);
    assert_eq!(take_log(&events).len(), 1);
    // The dispatch re-enabled checking before the handler ran.
    assert!(eng.view_state(view).unwrap().contains(ViewState::CHECKS_ENABLED));
}

#[test]
fn element_bindings_drive_attribute_class_style_and_property() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let active = Rc::new(Cell::new(true));
    let state = active.clone();
    let update_renderer: UpdateFn = Rc::new(move |ctx| {
        let on = state.get();
        ctx.check_node(
            0,
            &[
                if on { Value::str("tip") } else { Value::Null },
                Value::Bool(on),
                if on { Value::Int(10) } else { Value::Null },
                Value::Int(if on { 1 } else { 2 }),
            ],
        )
    });
    let def = view_def(
        ViewFlags::NONE,
        vec![element_def(
            0,
            Some("div"),
            ElementOpts {
                bindings: vec![
                    BindingDef {
                        flags: BindingFlags::TYPE_ELEMENT_ATTRIBUTE,
                        name: Some("title".into()),
                        ..BindingDef::default()
                    },
                    BindingDef {
                        flags: BindingFlags::TYPE_ELEMENT_CLASS,
                        name: Some("active".into()),
                        ..BindingDef::default()
                    },
                    BindingDef {
                        flags: BindingFlags::TYPE_ELEMENT_STYLE,
                        name: Some("width".into()),
                        suffix: Some("px".into()),
                        ..BindingDef::default()
                    },
                    BindingDef {
                        flags: BindingFlags::TYPE_PROPERTY,
                        name: Some("value".into()),
                        ..BindingDef::default()
                    },
                ],
                ..ElementOpts::default()
            },
        )],
        None,
        Some(update_renderer),
        None,
    )
    .unwrap();
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();
    let div = eng.render_node(view, 0).unwrap();

    eng.check_and_update(view).unwrap();
    {
        let renderer = root.renderer.borrow();
        assert_eq!(renderer.attr_of(div, "title"), Some("tip".to_string()));
        assert_eq!(renderer.classes.get(&div.0), Some(&vec!["active".to_string()]));
        assert_eq!(
            renderer.styles.get(&(div.0, "width".to_string())),
            Some(&Some("10px".to_string()))
        );
        assert_eq!(renderer.properties.get(&(div.0, "value".to_string())), Some(&Value::Int(1)));
    }

    active.set(false);
    eng.check_and_update(view).unwrap();
    let renderer = root.renderer.borrow();
    // A null attribute value removes the attribute.
    assert_eq!(renderer.attr_of(div, "title"), None);
    assert!(renderer.classes.get(&div.0).map(Vec::is_empty).unwrap_or(true));
    assert_eq!(renderer.styles.get(&(div.0, "width".to_string())), Some(&None));
    assert_eq!(renderer.properties.get(&(div.0, "value".to_string())), Some(&Value::Int(2)));
}

struct PrefixSanitizer {
    calls: Rc<Cell<u32>>,
}

impl Sanitizer for PrefixSanitizer {
    fn sanitize(&self, _ctx: SecurityContext, value: &Value) -> Value {
        self.calls.set(self.calls.get() + 1);
        match value.as_str() {
            Some(s) => Value::str(format!("safe:{s}")),
            None => value.clone(),
        }
    }
}

#[test]
fn flagged_bindings_pass_through_the_sanitizer() {
    let renderer = Rc::new(std::cell::RefCell::new(RecordingRenderer::new()));
    let calls = Rc::new(Cell::new(0u32));
    let data = Rc::new(RootData {
        injector: Rc::new(NullInjector),
        renderer: renderer.clone(),
        sanitizer: Rc::new(PrefixSanitizer { calls: calls.clone() }),
        projectable_nodes: Vec::new(),
    });
    let mut eng = ViewEngine::new();
    let update_renderer: UpdateFn =
        Rc::new(|ctx| ctx.check_node(0, &[Value::str("http://a"), Value::str("plain")]));
    let def = view_def(
        ViewFlags::NONE,
        vec![element_def(
            0,
            Some("a"),
            ElementOpts {
                bindings: vec![
                    BindingDef {
                        flags: BindingFlags::TYPE_ELEMENT_ATTRIBUTE,
                        name: Some("href".into()),
                        security_context: SecurityContext::Url,
                        ..BindingDef::default()
                    },
                    BindingDef {
                        flags: BindingFlags::TYPE_ELEMENT_ATTRIBUTE,
                        name: Some("rel".into()),
                        ..BindingDef::default()
                    },
                ],
                ..ElementOpts::default()
            },
        )],
        None,
        Some(update_renderer),
        None,
    )
    .unwrap();
    let view = eng.create_root_view(data, &factory_of(def), Value::Null).unwrap();
    eng.check_and_update(view).unwrap();

    let anchor = eng.render_node(view, 0).unwrap();
    let renderer = renderer.borrow();
    assert_eq!(renderer.attr_of(anchor, "href"), Some("safe:http://a".to_string()));
    // Default-context bindings bypass the sanitizer.
    assert_eq!(renderer.attr_of(anchor, "rel"), Some("plain".to_string()));
    assert_eq!(calls.get(), 1);
}

struct UpperPipe {
    calls: Rc<Cell<u32>>,
}

impl Directive for UpperPipe {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn transform(&self, args: &[Value]) -> Value {
        self.calls.set(self.calls.get() + 1);
        match args.first().and_then(Value::as_str) {
            Some(s) => Value::str(s.to_uppercase()),
            None => Value::Null,
        }
    }
}

#[test]
fn pure_pipes_recompute_only_when_an_argument_changes() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let calls = Rc::new(Cell::new(0u32));
    let counter = calls.clone();
    let pipe_factory: InstanceFactory = Rc::new(move |_deps: &[Value]| {
        Rc::new(std::cell::RefCell::new(UpperPipe { calls: counter.clone() })) as ProviderInstance
    });
    let word = Rc::new(Cell::new("hi"));
    let arg = word.clone();
    let update_directives: UpdateFn = Rc::new(move |ctx| {
        let pipe = ctx.provider_instance(1)?;
        ctx.check_node(2, &[pipe, Value::str(arg.get())])
    });
    let update_renderer: UpdateFn = Rc::new(|ctx| {
        let value = ctx.pure_value(2)?;
        ctx.check_node(3, &[value])
    });
    let def = view_def(
        ViewFlags::NONE,
        vec![
            element_def(1, Some("div"), ElementOpts::default()),
            pipe_def(Token::new("upper"), pipe_factory, vec![]),
            pure_pipe_def(1),
            text_def(None, vec!["".into(), "".into()]),
        ],
        Some(update_directives),
        Some(update_renderer),
        None,
    )
    .unwrap();
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();
    let text = eng.render_node(view, 3).unwrap();

    eng.check_and_update(view).unwrap();
    assert_eq!(root.renderer.borrow().text_of(text), "HI");
    assert_eq!(calls.get(), 1);

    // Same argument, no recomputation.
    eng.check_and_update(view).unwrap();
    assert_eq!(calls.get(), 1);

    word.set("bye");
    eng.check_and_update(view).unwrap();
    assert_eq!(root.renderer.borrow().text_of(text), "BYE");
    assert_eq!(calls.get(), 2);
}

#[test]
fn nested_component_hooks_run_between_content_and_view_phases() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let log = hook_log();
    let inner_update: UpdateFn = Rc::new(|ctx| ctx.check_node(1, &[]));
    let inner = view_def(
        ViewFlags::NONE,
        vec![
            element_def(1, Some("div"), ElementOpts::default()),
            directive_def(
                0,
                Token::new("in"),
                probe_factory("in", log.clone()),
                DirectiveOpts {
                    flags: NodeFlags::ON_INIT | NodeFlags::AFTER_VIEW_INIT,
                    ..DirectiveOpts::default()
                },
            ),
        ],
        Some(inner_update),
        None,
        None,
    )
    .unwrap();
    let def = view_def(
        ViewFlags::NONE,
        vec![
            element_def(
                2,
                Some("my-comp"),
                ElementOpts { component_view: Some(factory_of(inner)), ..ElementOpts::default() },
            ),
            directive_def(
                0,
                Token::new("comp"),
                probe_factory("out", log.clone()),
                DirectiveOpts {
                    flags: NodeFlags::COMPONENT
                        | NodeFlags::AFTER_CONTENT_CHECKED
                        | NodeFlags::AFTER_VIEW_CHECKED,
                    ..DirectiveOpts::default()
                },
            ),
            text_def(None, vec!["t".into()]),
        ],
        None,
        None,
        None,
    )
    .unwrap();
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();
    eng.check_and_update(view).unwrap();

    let entries = take_log(&log);
    let pos = |needle: &str| {
        entries
            .iter()
            .position(|e| e == needle)
            .unwrap_or_else(|| panic!("missing {needle} in {entries:?}"))
    };
    // Host content hooks run before the component view is checked; host
    // view hooks run after it.
    assert!(pos("out.after_content_checked") < pos("in.on_init"));
    assert!(pos("in.after_view_init") < pos("out.after_view_checked"));
}
