//! Reference lifetimes driven by the guest's refcount imports.

mod common;

use common::{closure, load};
use tether_guest::{Adapter, GuestBuilder};
use tether_host::{trampoline, BridgeError, HostObject, RefFlavor, Slot, Value};

fn refcount_bridge() -> (tether_host::Bridge, Value, Value) {
    let mut builder = GuestBuilder::new();
    let retain = closure(&mut builder, Adapter::Retain, 0);
    let release = closure(&mut builder, Adapter::Release, 0);
    let mut bridge = load(&builder);
    let retain = bridge.decode(retain.addr).unwrap();
    let release = bridge.decode(release.addr).unwrap();
    (bridge, retain, release)
}

#[test]
fn acquire_twice_release_twice_then_new_id() {
    let (mut bridge, _, _) = refcount_bridge();
    let node = Value::from(HostObject::opaque("Node"));
    let first = bridge.acquire_reference(&node).unwrap();
    let second = bridge.acquire_reference(&node).unwrap();
    assert_eq!(first, second);

    bridge.release_reference(first).unwrap();
    assert_eq!(bridge.lookup_reference(first).unwrap(), node);
    bridge.release_reference(first).unwrap();
    assert!(matches!(
        bridge.lookup_reference(first),
        Err(BridgeError::UnknownReference(_))
    ));

    let third = bridge.acquire_reference(&node).unwrap();
    assert_ne!(third, first);
}

#[test]
fn guest_retain_adds_a_holder() {
    let (mut bridge, retain, _) = refcount_bridge();
    let node = Value::from(HostObject::opaque("Node"));
    bridge.call(&retain, &[node.clone()]).unwrap();
    let id = bridge.state().refs().id_of(&node).unwrap();
    // one from encoding the argument, one from the guest
    assert_eq!(bridge.state().refs().refcount(id), Some(2));
}

#[test]
fn guest_dropping_its_only_handle_retires_the_entry() {
    let (mut bridge, _, release) = refcount_bridge();
    let node = Value::from(HostObject::mapping(Default::default()));
    bridge.call(&release, &[node.clone()]).unwrap();
    assert_eq!(bridge.state().refs().id_of(&node), None);
    assert!(bridge.state().refs().is_empty());
}

#[test]
fn guest_decrement_of_unknown_id_traps() {
    let (mut bridge, _, release) = refcount_bridge();
    let release = release.as_closure().unwrap().slot();

    // hand-built argument array holding a reference nobody registered
    let element = bridge.alloc(16).unwrap();
    bridge
        .write_slot(element, &Slot::Ref { flavor: RefFlavor::Plain, id: 99 })
        .unwrap();
    let args = bridge.alloc(16).unwrap();
    bridge
        .write_slot(args, &Slot::Array { ptr: element, len: 1 })
        .unwrap();

    let err = trampoline::invoke(bridge.store_mut(), release.adapter, release.data_ptr, args)
        .unwrap_err();
    assert!(matches!(err, BridgeError::Wasm(_)));
    assert!(err.to_string().contains("underflow"), "{err}");
    assert!(bridge.state().refs().is_empty());
}

#[test]
fn closures_can_be_held_by_the_guest() {
    let (mut bridge, retain, release) = refcount_bridge();
    bridge.call(&retain, &[retain.clone()]).unwrap();
    let id = bridge.state().refs().id_of(&retain).unwrap();
    assert_eq!(bridge.state().refs().refcount(id), Some(2));
    bridge.call(&release, &[retain.clone()]).unwrap();
    assert_eq!(bridge.state().refs().refcount(id), Some(2));
}
