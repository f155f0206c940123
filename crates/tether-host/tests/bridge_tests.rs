//! Bootstrap, host functions, nested calls, memory growth and diagnostics.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{closure, load, load_with};
use tether_guest::{Adapter, GuestBuilder};
use tether_host::{
    fingerprint, Bridge, BridgeConfig, BridgeError, Diagnostic, Slot, Value,
};
use tether_types::{ExportNames, ImportNames};

// ══════════════════════════════════════════════════════════════════════════════
// Bootstrap
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn entry_point_runs_exactly_once() {
    let bridge = load(&GuestBuilder::new());
    assert_eq!(bridge.global_i32("main_calls"), Some(1));
    assert!(bridge.state().is_attached());
}

#[test]
fn entry_point_sees_built_views_and_host_functions() {
    let mut guest = GuestBuilder::new();
    guest.host_function("start", 1);
    let (ptr, len) = guest.static_str("hello from main");
    let arg = guest.static_slot(Slot::String { ptr, len });
    guest.main_call("start", &[arg]);

    let seen: Rc<RefCell<Vec<(Value, u64)>>> = Rc::default();
    let record = Rc::clone(&seen);
    let bridge = Bridge::builder().host_function("start", 1, move |caller, args| {
        let generation = caller.data().views().generation();
        record.borrow_mut().push((args[0].clone(), generation));
        Ok(Value::Undefined)
    });
    let _bridge = load_with(bridge, &guest);

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, Value::from("hello from main"));
    assert!(seen[0].1 >= 1);
}

#[test]
fn fingerprint_is_sha256_of_the_module() {
    let wasm = GuestBuilder::new().build().unwrap();
    let bridge = Bridge::load(&wasm).unwrap();
    assert_eq!(bridge.fingerprint(), fingerprint(&wasm));
    assert_eq!(bridge.fingerprint().len(), 64);
    assert!(bridge.fingerprint().chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn missing_export_is_reported_by_name() {
    let exports = ExportNames {
        malloc: "alloc".to_string(),
        ..ExportNames::default()
    };
    let wasm = GuestBuilder::new()
        .with_names("env", ImportNames::default(), exports)
        .build()
        .unwrap();
    match Bridge::load(&wasm) {
        Err(BridgeError::MissingExport(name)) => assert_eq!(name, "__web_malloc"),
        other => panic!("expected MissingExport, got {other:?}"),
    }
}

#[test]
fn unregistered_host_function_fails_to_link() {
    let mut guest = GuestBuilder::new();
    guest.host_function("absent", 0);
    let wasm = guest.build().unwrap();
    assert!(matches!(Bridge::load(&wasm), Err(BridgeError::Wasm(_))));
}

#[test]
fn invalid_module_bytes_are_rejected() {
    assert!(matches!(Bridge::load(b"not wasm"), Err(BridgeError::Wasm(_))));
}

#[test]
fn custom_names_from_json_config() {
    let imports = ImportNames {
        install_value: "install".to_string(),
        on_grow: "grown".to_string(),
        ..ImportNames::default()
    };
    let exports = ExportNames {
        main: "start".to_string(),
        table: "functions".to_string(),
        ..ExportNames::default()
    };
    let mut guest = GuestBuilder::new().with_names("bridge", imports, exports);
    let echo = closure(&mut guest, Adapter::Echo, 0);

    let config = BridgeConfig::from_json(
        r#"{
            "import_module": "bridge",
            "imports": { "install_value": "install", "on_grow": "grown" },
            "exports": { "main": "start", "table": "functions" }
        }"#,
    )
    .unwrap();
    let mut bridge = load_with(tether_host::BridgeBuilder::new(config), &guest);
    assert_eq!(bridge.global_i32("main_calls"), Some(1));
    let echo = bridge.decode(echo.addr).unwrap();
    assert_eq!(bridge.call(&echo, &[Value::from("named")]).unwrap(), Value::from("named"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Host functions and nested calls
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn host_function_result_reaches_the_caller() {
    let mut guest = GuestBuilder::new();
    guest.host_function("double", 1);
    let forward = closure(
        &mut guest,
        Adapter::Forward {
            function: "double".to_string(),
        },
        0,
    );
    let bridge = Bridge::builder().host_function("double", 1, |_, args| {
        let n = args[0].as_number().unwrap_or(0.0);
        Ok(Value::from(n * 2.0))
    });
    let mut bridge = load_with(bridge, &guest);
    let forward = bridge.decode(forward.addr).unwrap();
    assert_eq!(bridge.call(&forward, &[Value::from(21)]).unwrap(), Value::from(42));
    assert_eq!(bridge.call(&forward, &[Value::Number(0.25)]).unwrap(), Value::Number(0.5));
}

#[test]
fn host_function_can_call_back_into_the_guest() {
    let mut guest = GuestBuilder::new();
    guest.host_function("invoke", 1);
    let outer = closure(
        &mut guest,
        Adapter::Forward {
            function: "invoke".to_string(),
        },
        0,
    );
    let inner = closure(&mut guest, Adapter::Echo, 0);

    let bridge = Bridge::builder().host_function("invoke", 1, |caller, args| {
        let callee = args[0]
            .as_closure()
            .cloned()
            .ok_or(BridgeError::NotCallable(args[0].type_name()))?;
        let reply = callee.call(caller, &[Value::from("ping")])?;
        Ok(Value::from(format!("{}!", reply.as_string().unwrap_or_default())))
    });
    let mut bridge = load_with(bridge, &guest);
    let outer = bridge.decode(outer.addr).unwrap();
    let inner = bridge.decode(inner.addr).unwrap();

    assert_eq!(bridge.call(&outer, &[inner]).unwrap(), Value::from("ping!"));
    assert!(!bridge.state().scratch().is_pending());
}

#[test]
fn host_function_error_traps_the_guest_call() {
    let mut guest = GuestBuilder::new();
    guest.host_function("fail", 1);
    let forward = closure(
        &mut guest,
        Adapter::Forward {
            function: "fail".to_string(),
        },
        0,
    );
    let bridge = Bridge::builder().host_function("fail", 1, |_, _| Err(BridgeError::Detached));
    let mut bridge = load_with(bridge, &guest);
    let forward = bridge.decode(forward.addr).unwrap();
    let err = bridge.call(&forward, &[]).unwrap_err();
    assert!(matches!(err, BridgeError::Wasm(_)));
    assert!(err.to_string().contains("no guest module is attached"), "{err}");
}

#[test]
fn host_objects_pass_through_host_functions() {
    let mut guest = GuestBuilder::new();
    guest.host_function("class_of", 1);
    let forward = closure(
        &mut guest,
        Adapter::Forward {
            function: "class_of".to_string(),
        },
        0,
    );
    let bridge = Bridge::builder().host_function("class_of", 1, |_, args| {
        Ok(args[0]
            .as_reference()
            .map_or(Value::Null, |obj| Value::from(obj.class())))
    });
    let mut bridge = load_with(bridge, &guest);
    let forward = bridge.decode(forward.addr).unwrap();
    let canvas = Value::from(tether_host::HostObject::opaque("Canvas"));
    assert_eq!(bridge.call(&forward, &[canvas]).unwrap(), Value::from("Canvas"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Memory growth
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn guest_growth_rebuilds_views() {
    let mut guest = GuestBuilder::new();
    let grow = closure(&mut guest, Adapter::Grow { pages: 2 }, 0);
    let mut bridge = load(&guest);
    let grow = bridge.decode(grow.addr).unwrap();
    let before = bridge.state().views().generation();
    let len_before = bridge.state().views().byte_len();

    let value = Value::from(vec![Value::from("after"), Value::Number(1.5)]);
    assert_eq!(bridge.call(&grow, &[value.clone()]).unwrap(), value);
    assert!(bridge.state().views().generation() > before);
    assert_eq!(bridge.state().views().byte_len(), len_before + 2 * 65536);
}

#[test]
fn large_encode_grows_memory_mid_write() {
    let mut bridge = load(&GuestBuilder::new());
    let before = bridge.state().views().generation();
    let big = "🧵".repeat(50_000);
    let value = Value::from(vec![Value::from("head"), Value::from(big.as_str()), Value::from("tail")]);
    let addr = bridge.encode(&value).unwrap();
    assert!(bridge.state().views().generation() > before);
    assert_eq!(bridge.decode(addr).unwrap(), value);
}

#[test]
fn unannounced_growth_is_detected() {
    let mut bridge = load(&GuestBuilder::new());
    let addr = bridge.encode(&Value::from("still here")).unwrap();
    let before = bridge.state().views().generation();

    let memory = bridge.state().guest().unwrap().memory;
    memory.grow(bridge.store_mut(), 1).unwrap();

    assert_eq!(bridge.decode(addr).unwrap(), Value::from("still here"));
    assert_eq!(bridge.state().views().generation(), before + 1);
    assert_eq!(bridge.state().views().byte_len(), 2 * 65536);
}

// ══════════════════════════════════════════════════════════════════════════════
// Diagnostics
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn guest_panic_is_recorded_not_fatal() {
    let mut guest = GuestBuilder::new();
    let panic = closure(
        &mut guest,
        Adapter::Panic {
            message: "called `Option::unwrap()` on a `None` value".to_string(),
            file: "src/widget.rs".to_string(),
            line: 88,
        },
        0,
    );
    let mut bridge = load(&guest);
    let panic = bridge.decode(panic.addr).unwrap();
    assert_eq!(bridge.call(&panic, &[]).unwrap(), Value::Undefined);

    let entries: Vec<Diagnostic> = bridge.state().diagnostics().iter().cloned().collect();
    assert_eq!(
        entries,
        vec![
            Diagnostic::Panic,
            Diagnostic::Message("called `Option::unwrap()` on a `None` value".to_string()),
            Diagnostic::Location {
                file: "src/widget.rs".to_string(),
                line: 88,
            },
        ]
    );
    assert_eq!(
        bridge.state().diagnostics().last_message(),
        Some("called `Option::unwrap()` on a `None` value")
    );
}

#[test]
fn diagnostics_are_bounded_by_config() {
    let mut guest = GuestBuilder::new();
    let panic = closure(
        &mut guest,
        Adapter::Panic {
            message: "boom".to_string(),
            file: "src/lib.rs".to_string(),
            line: 1,
        },
        0,
    );
    let config = BridgeConfig {
        max_diagnostics: 2,
        ..BridgeConfig::default()
    };
    let mut bridge = load_with(tether_host::BridgeBuilder::new(config), &guest);
    let panic = bridge.decode(panic.addr).unwrap();
    bridge.call(&panic, &[]).unwrap();
    bridge.call(&panic, &[]).unwrap();
    assert_eq!(bridge.state().diagnostics().len(), 2);
    let drained = bridge.state_mut().diagnostics_mut().drain();
    assert_eq!(drained[0], Diagnostic::Message("boom".to_string()));
    assert!(bridge.state().diagnostics().is_empty());
}
