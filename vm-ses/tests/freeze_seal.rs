use vm_ses::{
  ClassKind, GcObject, Heap, HeapLimits, ObjectFlags, PropertyDescriptor, PropertyDescriptorPatch,
  PropertyKind, Value, VmError,
};

fn heap() -> Heap {
  Heap::new(HeapLimits::new(1024 * 1024, 1024 * 1024))
}

fn object_with_props(heap: &mut Heap, names: &[&str]) -> Result<GcObject, VmError> {
  let mut scope = heap.scope();
  let obj = scope.alloc_object(ClassKind::Ordinary, None)?;
  scope.push_root(Value::Object(obj));
  for name in names {
    let key = scope.heap_mut().intern(name)?;
    scope.define_property(obj, key, PropertyDescriptor::data(Value::Int(1)))?;
  }
  scope.heap_mut().add_root(Value::Object(obj));
  Ok(obj)
}

#[test]
fn fresh_objects_are_extensible_and_neither_sealed_nor_frozen() -> Result<(), VmError> {
  let mut heap = heap();
  let obj = object_with_props(&mut heap, &["a"])?;

  let scope = heap.scope();
  assert!(scope.heap().object_is_extensible(obj)?);
  assert!(!scope.is_sealed(obj)?);
  assert!(!scope.is_frozen(obj)?);
  Ok(())
}

#[test]
fn prevent_extensions_blocks_additions_only() -> Result<(), VmError> {
  let mut heap = heap();
  let obj = object_with_props(&mut heap, &["a"])?;
  let key_a = heap.intern("a")?;
  let key_b = heap.intern("b")?;

  let mut scope = heap.scope();
  scope.prevent_extensions(obj)?;
  assert!(!scope.heap().object_is_extensible(obj)?);

  // New property: rejected. Existing property: still writable, deletable, configurable.
  assert!(!scope.create_data_property(obj, key_b, Value::Int(2))?);
  assert!(scope.ordinary_define_own_property(
    obj,
    key_a,
    PropertyDescriptorPatch {
      value: Some(Value::Int(7)),
      ..Default::default()
    },
  )?);
  assert!(scope.ordinary_delete(obj, key_a)?);
  Ok(())
}

#[test]
fn prevent_extensions_on_an_empty_object_records_sealed() -> Result<(), VmError> {
  let mut heap = heap();
  let obj = object_with_props(&mut heap, &[])?;

  let mut scope = heap.scope();
  scope.prevent_extensions(obj)?;
  assert!(scope.is_sealed(obj)?);
  assert!(scope.is_frozen(obj)?);
  assert!(scope.heap().object_flags(obj)?.has(ObjectFlags::SEALED));
  Ok(())
}

#[test]
fn seal_makes_properties_non_configurable_but_leaves_them_writable() -> Result<(), VmError> {
  let mut heap = heap();
  let obj = object_with_props(&mut heap, &["a", "b"])?;
  let key_a = heap.intern("a")?;

  let mut scope = heap.scope();
  scope.seal(obj)?;

  assert!(scope.is_sealed(obj)?);
  assert!(!scope.is_frozen(obj)?);
  assert!(!scope.heap().object_is_extensible(obj)?);

  // Deletion fails; value updates still succeed.
  assert!(!scope.ordinary_delete(obj, key_a)?);
  assert!(scope.ordinary_define_own_property(
    obj,
    key_a,
    PropertyDescriptorPatch {
      value: Some(Value::Int(9)),
      ..Default::default()
    },
  )?);

  // The descriptor rewrite is visible through reflection, not just the flag.
  let desc = scope.ordinary_get_own_property(obj, key_a)?.unwrap();
  assert!(!desc.configurable);
  Ok(())
}

#[test]
fn freeze_also_clears_writability_of_data_properties() -> Result<(), VmError> {
  let mut heap = heap();
  let obj = object_with_props(&mut heap, &["a"])?;
  let key_a = heap.intern("a")?;

  let mut scope = heap.scope();
  scope.freeze(obj)?;

  assert!(scope.is_frozen(obj)?);
  assert!(scope.is_sealed(obj)?);
  assert!(!scope.ordinary_define_own_property(
    obj,
    key_a,
    PropertyDescriptorPatch {
      value: Some(Value::Int(9)),
      ..Default::default()
    },
  )?);
  let desc = scope.ordinary_get_own_property(obj, key_a)?.unwrap();
  assert!(!desc.configurable);
  match desc.kind {
    PropertyKind::Data { writable, value } => {
      assert!(!writable);
      assert_eq!(value, Value::Int(1));
    }
    PropertyKind::Accessor { .. } => panic!("expected a data property"),
  }
  Ok(())
}

#[test]
fn freeze_leaves_accessor_properties_in_accessor_form() -> Result<(), VmError> {
  let mut heap = heap();
  let (obj, getter) = {
    let mut scope = heap.scope();
    let obj = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.push_root(Value::Object(obj));
    let getter = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.push_root(Value::Object(getter));
    let key = scope.heap_mut().intern("acc")?;
    scope.define_property(
      obj,
      key,
      PropertyDescriptor {
        enumerable: true,
        configurable: true,
        kind: PropertyKind::Accessor {
          get: Value::Object(getter),
          set: Value::Undefined,
        },
      },
    )?;
    scope.heap_mut().add_root(Value::Object(obj));
    (obj, getter)
  };

  let key = heap.intern("acc")?;
  let mut scope = heap.scope();
  scope.freeze(obj)?;
  assert!(scope.is_frozen(obj)?);

  let desc = scope.ordinary_get_own_property(obj, key)?.unwrap();
  match desc.kind {
    PropertyKind::Accessor { get, .. } => assert_eq!(get, Value::Object(getter)),
    PropertyKind::Data { .. } => panic!("freeze must not convert accessors to data"),
  }
  assert!(!desc.configurable);
  Ok(())
}

#[test]
fn the_lattice_is_monotonic_under_repeated_promotion() -> Result<(), VmError> {
  let mut heap = heap();
  let obj = object_with_props(&mut heap, &["a", "b", "c"])?;

  let mut scope = heap.scope();
  scope.prevent_extensions(obj)?;
  assert!(!scope.heap().object_is_extensible(obj)?);

  scope.seal(obj)?;
  assert!(scope.is_sealed(obj)?);
  assert!(!scope.heap().object_is_extensible(obj)?);

  scope.freeze(obj)?;
  assert!(scope.is_frozen(obj)?);
  assert!(scope.is_sealed(obj)?);
  assert!(!scope.heap().object_is_extensible(obj)?);

  // Repeating any promotion never regresses a predicate.
  scope.prevent_extensions(obj)?;
  scope.seal(obj)?;
  scope.freeze(obj)?;
  assert!(scope.is_frozen(obj)? && scope.is_sealed(obj)?);
  assert!(!scope.heap().object_is_extensible(obj)?);
  Ok(())
}

#[test]
fn predicates_also_hold_for_property_by_property_promotion() -> Result<(), VmError> {
  let mut heap = heap();
  let obj = object_with_props(&mut heap, &["a", "b"])?;
  let key_a = heap.intern("a")?;
  let key_b = heap.intern("b")?;

  // Reach the sealed state without ever calling `seal`: the predicate must still report it.
  let mut scope = heap.scope();
  for key in [key_a, key_b] {
    assert!(scope.ordinary_define_own_property(
      obj,
      key,
      PropertyDescriptorPatch {
        configurable: Some(false),
        ..Default::default()
      },
    )?);
  }
  scope.prevent_extensions(obj)?;
  assert!(scope.is_sealed(obj)?);
  assert!(!scope.is_frozen(obj)?);

  for key in [key_a, key_b] {
    assert!(scope.ordinary_define_own_property(
      obj,
      key,
      PropertyDescriptorPatch {
        writable: Some(false),
        ..Default::default()
      },
    )?);
  }
  assert!(scope.is_frozen(obj)?);
  Ok(())
}
