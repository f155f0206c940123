//! Value marshalling through real guest memory.

mod common;

use common::{echo_bridge, load};
use tether_guest::GuestBuilder;
use tether_host::{
    BridgeError, HostObject, HostString, Mapping, RefFlavor, Slot, Symbol, Value,
};
use tether_types::DecodeError;

fn round_trip(value: &Value) -> Value {
    let mut bridge = load(&GuestBuilder::new());
    let addr = bridge.encode(value).unwrap();
    bridge.decode(addr).unwrap()
}

fn slot_of(value: &Value) -> Slot {
    let mut bridge = load(&GuestBuilder::new());
    let addr = bridge.encode(value).unwrap();
    bridge.view().unwrap().slot(addr).unwrap()
}

// ══════════════════════════════════════════════════════════════════════════════
// Primitives
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn primitives_round_trip() {
    for value in [
        Value::Undefined,
        Value::Null,
        Value::Bool(true),
        Value::Bool(false),
        Value::from(0),
        Value::from(-17),
        Value::Number(3.25),
        Value::Number(1e300),
        Value::Number(f64::INFINITY),
        Value::from(""),
        Value::from("plain ascii"),
    ] {
        assert_eq!(round_trip(&value), value, "round trip of {value}");
    }
}

#[test]
fn nan_round_trips_as_nan() {
    let back = round_trip(&Value::Number(f64::NAN));
    assert!(back.as_number().is_some_and(f64::is_nan));
}

#[test]
fn integral_numbers_are_int32_on_the_wire() {
    assert_eq!(slot_of(&Value::Number(3.0)), Slot::Int32(3));
    assert_eq!(slot_of(&Value::from(3)), Slot::Int32(3));
    assert_eq!(slot_of(&Value::Number(3.5)), Slot::Float64(3.5));
    assert_eq!(slot_of(&Value::Number(4_294_967_296.0)), Slot::Float64(4_294_967_296.0));
    assert_eq!(slot_of(&Value::Number(-0.0)), Slot::Int32(0));
}

#[test]
fn booleans_use_distinct_kinds() {
    assert_eq!(slot_of(&Value::Bool(true)), Slot::True);
    assert_eq!(slot_of(&Value::Bool(false)), Slot::False);
}

// ══════════════════════════════════════════════════════════════════════════════
// Strings
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn emoji_string_keeps_its_bytes() {
    let text = "launch 🚀 now";
    let value = Value::from(text);
    match slot_of(&value) {
        Slot::String { len, .. } => assert_eq!(len as usize, text.len()),
        other => panic!("expected a string slot, got {other:?}"),
    }
    assert_eq!(round_trip(&value), value);
}

#[test]
fn empty_string_is_a_null_pointer() {
    assert_eq!(slot_of(&Value::from("")), Slot::String { ptr: 0, len: 0 });
}

#[test]
fn lone_surrogate_arrives_as_replacement() {
    let value = Value::String(HostString::from_units(vec![0x61, 0xd800, 0x62]));
    assert_eq!(round_trip(&value), Value::from("a\u{fffd}b"));
}

#[test]
fn guest_string_bytes_are_utf8() {
    let mut bridge = load(&GuestBuilder::new());
    let addr = bridge.encode(&Value::from("héllo")).unwrap();
    let view = bridge.view().unwrap();
    let Slot::String { ptr, len } = view.slot(addr).unwrap() else {
        panic!("expected a string slot");
    };
    assert_eq!(view.bytes(ptr, len).unwrap(), "héllo".as_bytes());
}

// ══════════════════════════════════════════════════════════════════════════════
// Arrays and objects
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn nested_data_round_trips() {
    let mut inner = Mapping::new();
    inner.insert("z", Value::from(1));
    inner.insert("a", Value::from(vec![Value::Null, Value::from("x")]));
    let mut outer = Mapping::new();
    outer.insert("name", Value::from("tether"));
    outer.insert("inner", Value::from(inner));
    outer.insert("ratio", Value::Number(0.5));
    let value = Value::from(vec![Value::from(outer), Value::Array(vec![]), Value::Bool(true)]);
    assert_eq!(round_trip(&value), value);
}

#[test]
fn object_key_order_is_preserved() {
    let map: Mapping = [("zeta", Value::from(1)), ("alpha", Value::from(2)), ("mid", Value::from(3))]
        .into_iter()
        .collect();
    let back = round_trip(&Value::from(map));
    let keys: Vec<String> = back
        .as_object()
        .unwrap()
        .keys()
        .map(HostString::to_string_lossy)
        .collect();
    assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
}

#[test]
fn empty_containers_round_trip() {
    assert_eq!(round_trip(&Value::Array(vec![])), Value::Array(vec![]));
    assert_eq!(round_trip(&Value::from(Mapping::new())), Value::from(Mapping::new()));
}

#[test]
fn array_elements_are_consecutive_slots() {
    let mut bridge = load(&GuestBuilder::new());
    let addr = bridge
        .encode(&Value::from(vec![Value::from(1), Value::from(2)]))
        .unwrap();
    let view = bridge.view().unwrap();
    let Slot::Array { ptr, len } = view.slot(addr).unwrap() else {
        panic!("expected an array slot");
    };
    assert_eq!(len, 2);
    assert_eq!(view.slot(ptr).unwrap(), Slot::Int32(1));
    assert_eq!(view.slot(ptr + 16).unwrap(), Slot::Int32(2));
}

// ══════════════════════════════════════════════════════════════════════════════
// References
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn host_objects_cross_as_references() {
    let mut bridge = load(&GuestBuilder::new());
    let node = Value::from(HostObject::opaque("Node"));
    let addr = bridge.encode(&node).unwrap();
    let slot = bridge.view().unwrap().slot(addr).unwrap();
    assert!(matches!(slot, Slot::Ref { flavor: RefFlavor::Plain, .. }));
    assert_eq!(bridge.decode(addr).unwrap(), node);
}

#[test]
fn reference_flavor_follows_shape() {
    let object = Value::from(HostObject::mapping(Mapping::new()));
    let array = Value::from(HostObject::array(vec![Value::from(1)]));
    let function = Value::from(HostObject::function(|_| Value::Null));
    assert!(matches!(slot_of(&object), Slot::Ref { flavor: RefFlavor::Object, .. }));
    assert!(matches!(slot_of(&array), Slot::Ref { flavor: RefFlavor::Array, .. }));
    assert!(matches!(slot_of(&function), Slot::Ref { flavor: RefFlavor::Plain, .. }));
}

#[test]
fn each_encode_is_one_acquire() {
    let mut bridge = load(&GuestBuilder::new());
    let node = Value::from(HostObject::opaque("Node"));
    bridge.encode(&node).unwrap();
    bridge.encode(&node).unwrap();
    let id = bridge.state().refs().id_of(&node).unwrap();
    assert_eq!(bridge.state().refs().refcount(id), Some(2));
}

#[test]
fn symbols_keep_identity() {
    let sym = Value::from(Symbol::new("key"));
    assert_eq!(round_trip(&sym), sym);
    assert_ne!(round_trip(&sym), Value::from(Symbol::new("key")));
}

#[test]
fn closures_sent_back_keep_identity() {
    let (mut bridge, echo) = echo_bridge();
    let addr = bridge.encode(&echo).unwrap();
    let slot = bridge.view().unwrap().slot(addr).unwrap();
    assert!(matches!(slot, Slot::Ref { flavor: RefFlavor::Plain, .. }));
    assert_eq!(bridge.decode(addr).unwrap(), echo);
}

#[test]
fn mutations_are_visible_through_the_reference() {
    let mut bridge = load(&GuestBuilder::new());
    let list = HostObject::array(vec![]);
    let addr = bridge.encode(&Value::from(list.clone())).unwrap();
    list.borrow_array_mut().unwrap().push(Value::from("later"));
    let back = bridge.decode(addr).unwrap();
    let back = back.as_reference().unwrap();
    assert_eq!(back.borrow_array().unwrap().as_slice(), &[Value::from("later")]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Failed encodes
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn failed_encode_registers_nothing() {
    let mut bridge = load(&GuestBuilder::new());
    let node = Value::from(HostObject::opaque("Node"));
    assert!(bridge.encode_at(0xFFFF_FFF0, &node).is_err());
    assert!(bridge.encode_at(2, &Value::from(Symbol::new("s"))).is_err());
    assert_eq!(bridge.state().refs().len(), 0);
    assert_eq!(bridge.state().refs().id_of(&node), None);
}

#[test]
fn allocation_failure_mid_array_rolls_back_earlier_elements() {
    let mut bridge = load(&GuestBuilder::new().pages(1, 1));
    let node = Value::from(HostObject::opaque("Node"));
    let held = bridge.acquire_reference(&node).unwrap();

    let too_big = "x".repeat(2 * 65536);
    let value = Value::from(vec![
        node.clone(),
        Value::from(Symbol::new("s")),
        Value::from(too_big.as_str()),
    ]);
    assert!(bridge.encode(&value).is_err());

    assert_eq!(bridge.state().refs().len(), 1);
    assert_eq!(bridge.state().refs().refcount(held), Some(1));
}

#[test]
fn allocation_failure_mid_object_rolls_back_earlier_values() {
    let mut bridge = load(&GuestBuilder::new().pages(1, 1));
    let too_big = "y".repeat(2 * 65536);
    let map: Mapping = [
        ("node", Value::from(HostObject::mapping(Mapping::new()))),
        ("list", Value::from(HostObject::array(vec![]))),
        ("text", Value::from(too_big.as_str())),
    ]
    .into_iter()
    .collect();
    assert!(bridge.encode(&Value::from(map)).is_err());
    assert!(bridge.state().refs().is_empty());
}

// ══════════════════════════════════════════════════════════════════════════════
// Malformed guest data
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn unknown_kind_is_a_decode_error() {
    let mut bridge = load(&GuestBuilder::new());
    let addr = bridge.alloc(16).unwrap();
    let memory = bridge.state().guest().unwrap().memory;
    memory.data_mut(bridge.store_mut())[addr as usize + 12] = 42;
    assert!(matches!(
        bridge.decode(addr),
        Err(BridgeError::Decode(DecodeError::UnknownKind(42)))
    ));
}

#[test]
fn stale_reference_id_is_rejected() {
    let mut bridge = load(&GuestBuilder::new());
    let addr = bridge.alloc(16).unwrap();
    bridge
        .write_slot(addr, &Slot::Ref { flavor: RefFlavor::Plain, id: 77 })
        .unwrap();
    assert!(matches!(bridge.decode(addr), Err(BridgeError::UnknownReference(77))));
}

#[test]
fn string_past_end_of_memory_is_rejected() {
    let mut bridge = load(&GuestBuilder::new());
    let addr = bridge.alloc(16).unwrap();
    bridge
        .write_slot(addr, &Slot::String { ptr: 65_530, len: 100 })
        .unwrap();
    assert!(matches!(
        bridge.decode(addr),
        Err(BridgeError::Decode(DecodeError::OutOfBounds { .. }))
    ));
}

#[test]
fn null_reference_decodes_as_undefined() {
    let mut bridge = load(&GuestBuilder::new());
    let addr = bridge.alloc(16).unwrap();
    bridge
        .write_slot(addr, &Slot::Ref { flavor: RefFlavor::Object, id: 0 })
        .unwrap();
    assert_eq!(bridge.decode(addr).unwrap(), Value::Undefined);
}
