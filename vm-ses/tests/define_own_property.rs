use vm_ses::{
  Atom, ClassKind, GcObject, Heap, HeapLimits, PropertyDescriptor, PropertyDescriptorPatch,
  PropertyKind, Value, VmError,
};

fn heap() -> Heap {
  Heap::new(HeapLimits::new(1024 * 1024, 1024 * 1024))
}

fn fixture(heap: &mut Heap, desc: PropertyDescriptor) -> Result<(GcObject, Atom), VmError> {
  let mut scope = heap.scope();
  let obj = scope.alloc_object(ClassKind::Ordinary, None)?;
  scope.push_root(Value::Object(obj));
  let key = scope.heap_mut().intern("x")?;
  scope.define_property(obj, key, desc)?;
  let root = scope.heap_mut().add_root(Value::Object(obj));
  let _ = root;
  Ok((obj, key))
}

#[test]
fn non_configurable_property_cannot_flip_enumerable_or_configurable() -> Result<(), VmError> {
  let mut heap = heap();
  let (obj, key) = fixture(
    &mut heap,
    PropertyDescriptor {
      enumerable: true,
      configurable: false,
      kind: PropertyKind::Data {
        value: Value::Undefined,
        writable: true,
      },
    },
  )?;

  let mut scope = heap.scope();
  assert!(!scope.ordinary_define_own_property(
    obj,
    key,
    PropertyDescriptorPatch {
      configurable: Some(true),
      ..Default::default()
    },
  )?);
  assert!(!scope.ordinary_define_own_property(
    obj,
    key,
    PropertyDescriptorPatch {
      enumerable: Some(false),
      ..Default::default()
    },
  )?);

  let desc = scope
    .ordinary_get_own_property(obj, key)?
    .expect("property should still exist");
  assert!(!desc.configurable);
  assert!(desc.enumerable);
  Ok(())
}

#[test]
fn non_writable_data_property_rejects_value_changes_and_writable_true() -> Result<(), VmError> {
  let mut heap = heap();
  let (obj, key) = fixture(
    &mut heap,
    PropertyDescriptor {
      enumerable: true,
      configurable: false,
      kind: PropertyKind::Data {
        value: Value::Int(1),
        writable: false,
      },
    },
  )?;

  let mut scope = heap.scope();
  assert!(!scope.ordinary_define_own_property(
    obj,
    key,
    PropertyDescriptorPatch {
      value: Some(Value::Int(2)),
      ..Default::default()
    },
  )?);
  assert!(!scope.ordinary_define_own_property(
    obj,
    key,
    PropertyDescriptorPatch {
      writable: Some(true),
      ..Default::default()
    },
  )?);

  // Re-stating the same value is permitted.
  assert!(scope.ordinary_define_own_property(
    obj,
    key,
    PropertyDescriptorPatch {
      value: Some(Value::Int(1)),
      ..Default::default()
    },
  )?);
  Ok(())
}

#[test]
fn writable_flip_to_false_is_the_one_permitted_direction() -> Result<(), VmError> {
  let mut heap = heap();
  let (obj, key) = fixture(
    &mut heap,
    PropertyDescriptor {
      enumerable: true,
      configurable: false,
      kind: PropertyKind::Data {
        value: Value::Int(1),
        writable: true,
      },
    },
  )?;

  let mut scope = heap.scope();
  // While still writable, the value may change.
  assert!(scope.ordinary_define_own_property(
    obj,
    key,
    PropertyDescriptorPatch {
      value: Some(Value::Int(5)),
      ..Default::default()
    },
  )?);
  // writable: true -> false is allowed even though configurable is false...
  assert!(scope.ordinary_define_own_property(
    obj,
    key,
    PropertyDescriptorPatch {
      writable: Some(false),
      ..Default::default()
    },
  )?);
  // ...and is one-way.
  assert!(!scope.ordinary_define_own_property(
    obj,
    key,
    PropertyDescriptorPatch {
      writable: Some(true),
      ..Default::default()
    },
  )?);
  Ok(())
}

#[test]
fn kind_conversion_requires_configurable() -> Result<(), VmError> {
  let mut heap = heap();
  let (obj, key) = fixture(
    &mut heap,
    PropertyDescriptor {
      enumerable: true,
      configurable: false,
      kind: PropertyKind::Data {
        value: Value::Int(1),
        writable: true,
      },
    },
  )?;

  let key2 = heap.intern("y")?;
  let mut scope = heap.scope();

  // Data -> accessor on a non-configurable property: rejected.
  assert!(!scope.ordinary_define_own_property(
    obj,
    key,
    PropertyDescriptorPatch {
      get: Some(Value::Undefined),
      ..Default::default()
    },
  )?);

  // On a configurable property the conversion goes through, both ways.
  assert!(scope.ordinary_define_own_property(
    obj,
    key2,
    PropertyDescriptorPatch {
      value: Some(Value::Int(1)),
      writable: Some(true),
      enumerable: Some(true),
      configurable: Some(true),
      ..Default::default()
    },
  )?);
  assert!(scope.ordinary_define_own_property(
    obj,
    key2,
    PropertyDescriptorPatch {
      get: Some(Value::Undefined),
      set: Some(Value::Undefined),
      ..Default::default()
    },
  )?);
  let desc = scope.ordinary_get_own_property(obj, key2)?.unwrap();
  assert!(desc.is_accessor_descriptor());
  assert!(scope.ordinary_define_own_property(
    obj,
    key2,
    PropertyDescriptorPatch {
      value: Some(Value::Int(3)),
      ..Default::default()
    },
  )?);
  let desc = scope.ordinary_get_own_property(obj, key2)?.unwrap();
  assert!(desc.is_data_descriptor());
  Ok(())
}

#[test]
fn non_extensible_objects_reject_new_properties_but_accept_redefinitions() -> Result<(), VmError> {
  let mut heap = heap();
  let (obj, key) = fixture(
    &mut heap,
    PropertyDescriptor {
      enumerable: true,
      configurable: true,
      kind: PropertyKind::Data {
        value: Value::Int(1),
        writable: true,
      },
    },
  )?;

  let fresh_key = heap.intern("fresh")?;
  let mut scope = heap.scope();
  scope.prevent_extensions(obj)?;

  assert!(!scope.ordinary_define_own_property(
    obj,
    fresh_key,
    PropertyDescriptorPatch {
      value: Some(Value::Int(9)),
      ..Default::default()
    },
  )?);
  assert!(scope.ordinary_define_own_property(
    obj,
    key,
    PropertyDescriptorPatch {
      value: Some(Value::Int(9)),
      ..Default::default()
    },
  )?);
  Ok(())
}

#[test]
fn fresh_properties_default_absent_attributes_to_false() -> Result<(), VmError> {
  let mut heap = heap();
  let obj = {
    let mut scope = heap.scope();
    let obj = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.heap_mut().add_root(Value::Object(obj));
    obj
  };
  let key = heap.intern("x")?;

  let mut scope = heap.scope();
  assert!(scope.ordinary_define_own_property(
    obj,
    key,
    PropertyDescriptorPatch {
      value: Some(Value::Int(1)),
      ..Default::default()
    },
  )?);
  let desc = scope.ordinary_get_own_property(obj, key)?.unwrap();
  assert!(!desc.enumerable);
  assert!(!desc.configurable);
  match desc.kind {
    PropertyKind::Data { writable, .. } => assert!(!writable),
    PropertyKind::Accessor { .. } => panic!("expected a data property"),
  }
  Ok(())
}

#[test]
fn own_keys_preserve_insertion_order() -> Result<(), VmError> {
  let mut heap = heap();
  let obj = {
    let mut scope = heap.scope();
    let obj = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.heap_mut().add_root(Value::Object(obj));
    obj
  };

  let names = ["zeta", "alpha", "10", "mid", "2"];
  for name in names {
    let key = heap.intern(name)?;
    let mut scope = heap.scope();
    scope.define_property(obj, key, PropertyDescriptor::data(Value::Int(0)))?;
  }

  let keys = heap.object_own_keys(obj)?;
  let resolved: Vec<&str> = keys.iter().map(|k| heap.atom_str(*k)).collect();
  assert_eq!(resolved, names);
  Ok(())
}
