mod common;

use std::rc::Rc;

use common::*;
use view_engine::*;

fn value_provider(token: &str, value: Value) -> NodeDef {
    provider_def(
        NodeFlags::TYPE_VALUE_PROVIDER,
        Token::new(token.to_string()),
        ProviderValue::Value(value),
        vec![],
        vec![],
    )
}

#[test]
fn value_factory_and_alias_providers_resolve() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let doubler: ValueFactory = Rc::new(|deps: &[Value]| match deps.first() {
        Some(Value::Int(n)) => Value::Int(n * 2),
        _ => Value::Null,
    });
    let def = view_def(
        ViewFlags::NONE,
        vec![
            element_def(3, Some("div"), ElementOpts::default()),
            value_provider("num", Value::Int(7)),
            provider_def(
                NodeFlags::TYPE_FACTORY_PROVIDER,
                Token::new("twice"),
                ProviderValue::Factory(doubler),
                vec![DepDef::new(Token::new("num"))],
                vec![],
            ),
            provider_def(
                NodeFlags::TYPE_USE_EXISTING_PROVIDER,
                Token::new("alias"),
                ProviderValue::UseExisting(Token::new("num")),
                vec![],
                vec![],
            ),
        ],
        None,
        None,
        None,
    )
    .unwrap();
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();
    let scope = InjectorRef { view, node_index: Some(0) };

    assert_eq!(eng.inject(scope, &Token::new("num")).unwrap(), Value::Int(7));
    assert_eq!(eng.inject(scope, &Token::new("twice")).unwrap(), Value::Int(14));
    assert_eq!(eng.inject(scope, &Token::new("alias")).unwrap(), Value::Int(7));
}

#[test]
fn descendant_elements_see_ancestor_providers() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let log = hook_log();
    let def = view_def(
        ViewFlags::NONE,
        vec![
            element_def(3, Some("outer"), ElementOpts::default()),
            value_provider("svc", Value::Int(1)),
            element_def(1, Some("inner"), ElementOpts::default()),
            directive_def(
                0,
                Token::new("dir"),
                probe_factory("dir", log),
                DirectiveOpts {
                    deps: vec![DepDef::new(Token::new("svc"))],
                    ..DirectiveOpts::default()
                },
            ),
        ],
        None,
        None,
        None,
    )
    .unwrap();
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();
    let dir = eng.provider_instance(view, 3).unwrap();
    with_probe(&dir, |probe| assert_eq!(probe.deps, vec![Value::Int(1)]));
}

#[test]
fn component_views_see_host_private_providers() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let log = hook_log();
    let inner = view_def(
        ViewFlags::NONE,
        vec![
            element_def(1, Some("div"), ElementOpts::default()),
            directive_def(
                0,
                Token::new("inner-dir"),
                probe_factory("inner", log.clone()),
                DirectiveOpts {
                    deps: vec![DepDef::new(Token::new("secret"))],
                    ..DirectiveOpts::default()
                },
            ),
        ],
        None,
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
                probe_factory("comp", log.clone()),
                DirectiveOpts { flags: NodeFlags::COMPONENT, ..DirectiveOpts::default() },
            ),
            provider_def(
                NodeFlags::TYPE_VALUE_PROVIDER | NodeFlags::PRIVATE_PROVIDER,
                Token::new("secret"),
                ProviderValue::Value(Value::Int(42)),
                vec![],
                vec![],
            ),
        ],
        None,
        None,
        None,
    )
    .unwrap();
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();
    let comp_view = eng.component_view(view, 0).unwrap().unwrap();
    let inner_dir = eng.provider_instance(comp_view, 1).unwrap();
    with_probe(&inner_dir, |probe| assert_eq!(probe.deps, vec![Value::Int(42)]));
}

#[test]
fn private_providers_are_invisible_to_descendant_elements() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let def = view_def(
        ViewFlags::NONE,
        vec![
            element_def(2, Some("outer"), ElementOpts::default()),
            provider_def(
                NodeFlags::TYPE_VALUE_PROVIDER | NodeFlags::PRIVATE_PROVIDER,
                Token::new("secret"),
                ProviderValue::Value(Value::Int(42)),
                vec![],
                vec![],
            ),
            element_def(0, Some("inner"), ElementOpts::default()),
        ],
        None,
        None,
        None,
    )
    .unwrap();
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();

    let inner_scope = InjectorRef { view, node_index: Some(2) };
    assert!(matches!(
        eng.inject(inner_scope, &Token::new("secret")),
        Err(EngineError::NoProvider { token, .. }) if token == "secret"
    ));
    // External injection only sees the public surface, even on the
    // declaring element's own scope.
    let outer_scope = InjectorRef { view, node_index: Some(0) };
    assert!(matches!(
        eng.inject_with_flags(outer_scope, &Token::new("secret"), DepFlags::OPTIONAL),
        Ok(Value::Null)
    ));
}

#[test]
fn skip_self_starts_resolution_above_the_requesting_element() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let log = hook_log();
    let def = view_def(
        ViewFlags::NONE,
        vec![
            element_def(4, Some("outer"), ElementOpts::default()),
            value_provider("cfg", Value::Int(1)),
            element_def(2, Some("inner"), ElementOpts::default()),
            value_provider("cfg", Value::Int(2)),
            directive_def(
                0,
                Token::new("dir"),
                probe_factory("dir", log),
                DirectiveOpts {
                    deps: vec![
                        DepDef::new(Token::new("cfg")),
                        DepDef::with_flags(Token::new("cfg"), DepFlags::SKIP_SELF),
                    ],
                    ..DirectiveOpts::default()
                },
            ),
        ],
        None,
        None,
        None,
    )
    .unwrap();
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();
    let dir = eng.provider_instance(view, 4).unwrap();
    with_probe(&dir, |probe| {
        assert_eq!(probe.deps, vec![Value::Int(2), Value::Int(1)]);
    });
}

#[test]
fn optional_dependencies_fall_back_to_null() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let log = hook_log();
    let def = view_def(
        ViewFlags::NONE,
        vec![
            element_def(1, Some("div"), ElementOpts::default()),
            directive_def(
                0,
                Token::new("dir"),
                probe_factory("dir", log),
                DirectiveOpts {
                    deps: vec![DepDef::with_flags(Token::new("missing"), DepFlags::OPTIONAL)],
                    ..DirectiveOpts::default()
                },
            ),
        ],
        None,
        None,
        None,
    )
    .unwrap();
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();
    let dir = eng.provider_instance(view, 1).unwrap();
    with_probe(&dir, |probe| assert_eq!(probe.deps, vec![Value::Null]));

    let scope = InjectorRef { view, node_index: Some(0) };
    assert!(matches!(
        eng.inject(scope, &Token::new("missing")),
        Err(EngineError::NoProvider { token, .. }) if token == "missing"
    ));
}

#[test]
fn built_in_tokens_answer_for_the_requesting_scope() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let log = hook_log();
    let def = view_def(
        ViewFlags::NONE,
        vec![
            element_def(1, Some("div"), ElementOpts::default()),
            directive_def(
                0,
                Token::new("dir"),
                probe_factory("dir", log),
                DirectiveOpts {
                    deps: vec![
                        DepDef::new(ELEMENT_REF_TOKEN.clone()),
                        DepDef::new(INJECTOR_TOKEN.clone()),
                        DepDef::new(CHANGE_DETECTOR_REF_TOKEN.clone()),
                        DepDef::new(VIEW_CONTAINER_REF_TOKEN.clone()),
                    ],
                    ..DirectiveOpts::default()
                },
            ),
        ],
        None,
        None,
        None,
    )
    .unwrap();
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();
    let element_rn = eng.render_node(view, 0).unwrap();
    let dir = eng.provider_instance(view, 1).unwrap();
    with_probe(&dir, |probe| {
        assert_eq!(probe.deps[0], Value::RenderNode(element_rn));
        assert_eq!(
            probe.deps[1],
            Value::InjectorRef(InjectorRef { view, node_index: Some(0) })
        );
        assert_eq!(probe.deps[2], Value::ChangeDetectorRef(ChangeDetectorRef { view }));
        assert_eq!(
            probe.deps[3],
            Value::ViewContainerRef(ViewContainerRef { view, node_index: 0 })
        );
    });
}

#[test]
fn the_root_injector_is_the_terminal_fallback() {
    let injector = MapInjector::with(vec![("app.config", Value::str("prod"))]);
    let root = test_root_with(injector, Vec::new());
    let mut eng = ViewEngine::new();
    let log = hook_log();
    let def = view_def(
        ViewFlags::NONE,
        vec![
            element_def(1, Some("div"), ElementOpts::default()),
            directive_def(
                0,
                Token::new("dir"),
                probe_factory("dir", log),
                DirectiveOpts {
                    deps: vec![DepDef::new(Token::new("app.config"))],
                    ..DirectiveOpts::default()
                },
            ),
        ],
        None,
        None,
        None,
    )
    .unwrap();
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();
    let dir = eng.provider_instance(view, 1).unwrap();
    with_probe(&dir, |probe| assert_eq!(probe.deps, vec![Value::str("prod")]));
}

#[test]
fn destroying_a_view_skips_uninstantiated_lazy_providers() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let log = hook_log();
    let def = view_def(
        ViewFlags::NONE,
        vec![
            element_def(1, Some("div"), ElementOpts::default()),
            provider_def(
                NodeFlags::TYPE_CLASS_PROVIDER
                    | NodeFlags::LAZY_PROVIDER
                    | NodeFlags::ON_DESTROY,
                Token::new("svc.lazy"),
                ProviderValue::Class(probe_factory("lazy", log.clone())),
                vec![],
                vec![],
            ),
        ],
        None,
        None,
        None,
    )
    .unwrap();
    let factory = factory_of(def);

    // Never requested: destruction has no instance to notify.
    let view = eng.create_root_view(root.data.clone(), &factory, Value::Null).unwrap();
    eng.destroy_view(view).unwrap();
    assert!(take_log(&log).is_empty());
    assert!(!eng.is_alive(view));

    // Once requested, the instance gets its destroy hook.
    let view = eng.create_root_view(root.data.clone(), &factory, Value::Null).unwrap();
    let scope = InjectorRef { view, node_index: Some(0) };
    eng.inject(scope, &Token::new("svc.lazy")).unwrap();
    eng.destroy_view(view).unwrap();
    assert_eq!(take_log(&log), vec!["lazy.on_destroy"]);
}

#[test]
fn destruction_runs_hooks_then_disposables_in_reverse() {
    let root = test_root();
    let mut eng = ViewEngine::new();
    let log = hook_log();
    let def = view_def(
        ViewFlags::NONE,
        vec![
            element_def(1, Some("div"), ElementOpts::default()),
            directive_def(
                0,
                Token::new("dir"),
                probe_factory("dir", log.clone()),
                DirectiveOpts { flags: NodeFlags::ON_DESTROY, ..DirectiveOpts::default() },
            ),
        ],
        None,
        None,
        None,
    )
    .unwrap();
    let view = eng.create_root_view(root.data.clone(), &factory_of(def), Value::Null).unwrap();

    let first = log.clone();
    eng.register_disposable(view, Box::new(move || first.borrow_mut().push("cb1".into())))
        .unwrap();
    let second = log.clone();
    eng.register_disposable(view, Box::new(move || second.borrow_mut().push("cb2".into())))
        .unwrap();

    eng.destroy_view(view).unwrap();
    assert_eq!(take_log(&log), vec!["dir.on_destroy", "cb2", "cb1"]);
    // Render nodes are gone too.
    assert_eq!(root.renderer.borrow().destroyed.len(), 1);
}
