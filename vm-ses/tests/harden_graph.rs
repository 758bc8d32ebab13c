use vm_ses::{
  harden, ClassKind, GcObject, Heap, HeapLimits, ObjectFlags, PropertyDescriptor,
  PropertyKind, TerminationReason, Value, VmError,
};

fn heap() -> Heap {
  Heap::new(HeapLimits::new(1024 * 1024, 1024 * 1024))
}

fn link(heap: &mut Heap, from: GcObject, name: &str, to: Value) -> Result<(), VmError> {
  let mut scope = heap.scope();
  scope.push_root(Value::Object(from));
  scope.push_root(to);
  let key = scope.heap_mut().intern(name)?;
  scope.define_property(from, key, PropertyDescriptor::data(to))?;
  Ok(())
}

fn is_hardened(heap: &Heap, obj: GcObject) -> Result<bool, VmError> {
  Ok(heap.object_flags(obj)?.has(ObjectFlags::HARDENED))
}

#[test]
fn harden_passes_primitives_through_unchanged() -> Result<(), VmError> {
  let mut heap = heap();
  let mut scope = heap.scope();

  for value in [
    Value::Undefined,
    Value::Null,
    Value::Bool(true),
    Value::Int(42),
    Value::CodePoint('x'),
    Value::Float(1.5),
  ] {
    assert_eq!(harden(&mut scope, value)?, value);
  }
  Ok(())
}

#[test]
fn harden_freezes_the_whole_reachable_graph() -> Result<(), VmError> {
  let mut heap = heap();
  let (root, nested, proto) = {
    let mut scope = heap.scope();
    let proto = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.push_root(Value::Object(proto));
    let root = scope.alloc_object(ClassKind::Ordinary, Some(proto))?;
    scope.push_root(Value::Object(root));
    let nested = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.push_root(Value::Object(nested));
    scope.heap_mut().add_root(Value::Object(root));
    (root, nested, proto)
  };
  link(&mut heap, root, "a", Value::Int(1))?;
  link(&mut heap, root, "nested", Value::Object(nested))?;
  link(&mut heap, nested, "b", Value::Int(2))?;

  let mut scope = heap.scope();
  let result = harden(&mut scope, Value::Object(root))?;
  assert_eq!(result, Value::Object(root));

  for obj in [root, nested, proto] {
    assert!(scope.is_frozen(obj)?, "every reachable object is frozen");
    assert!(is_hardened(scope.heap(), obj)?);
  }

  // Primitive property values are untouched.
  let key_a = scope.heap_mut().intern("a")?;
  let desc = scope.ordinary_get_own_property(root, key_a)?.unwrap();
  match desc.kind {
    PropertyKind::Data { value, .. } => assert_eq!(value, Value::Int(1)),
    PropertyKind::Accessor { .. } => panic!("expected data"),
  }
  Ok(())
}

#[test]
fn harden_reaches_accessor_getters_and_setters() -> Result<(), VmError> {
  let mut heap = heap();
  let (root, getter, setter) = {
    let mut scope = heap.scope();
    let root = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.push_root(Value::Object(root));
    let getter = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.push_root(Value::Object(getter));
    let setter = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.push_root(Value::Object(setter));
    let key = scope.heap_mut().intern("acc")?;
    scope.define_property(
      root,
      key,
      PropertyDescriptor {
        enumerable: true,
        configurable: true,
        kind: PropertyKind::Accessor {
          get: Value::Object(getter),
          set: Value::Object(setter),
        },
      },
    )?;
    scope.heap_mut().add_root(Value::Object(root));
    (root, getter, setter)
  };

  let mut scope = heap.scope();
  harden(&mut scope, Value::Object(root))?;
  for obj in [root, getter, setter] {
    assert!(scope.is_frozen(obj)?);
    assert!(is_hardened(scope.heap(), obj)?);
  }
  Ok(())
}

#[test]
fn circular_graphs_harden_in_finite_time() -> Result<(), VmError> {
  let mut heap = heap();
  let (a, b) = {
    let mut scope = heap.scope();
    let a = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.push_root(Value::Object(a));
    let b = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.push_root(Value::Object(b));
    scope.heap_mut().add_root(Value::Object(a));
    (a, b)
  };
  link(&mut heap, b, "a", Value::Object(a))?;
  link(&mut heap, a, "b", Value::Object(b))?;

  let mut scope = heap.scope();
  harden(&mut scope, Value::Object(a))?;
  assert!(scope.is_frozen(a)? && scope.is_frozen(b)?);
  assert!(is_hardened(scope.heap(), a)? && is_hardened(scope.heap(), b)?);
  Ok(())
}

#[test]
fn harden_is_idempotent() -> Result<(), VmError> {
  let mut heap = heap();
  let root = {
    let mut scope = heap.scope();
    let root = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.heap_mut().add_root(Value::Object(root));
    root
  };
  link(&mut heap, root, "a", Value::Int(1))?;

  let mut scope = heap.scope();
  let once = harden(&mut scope, Value::Object(root))?;
  let twice = harden(&mut scope, once)?;
  assert_eq!(once, twice);
  assert!(scope.is_frozen(root)?);
  Ok(())
}

#[test]
fn hardened_objects_are_unreachable_for_mutation() -> Result<(), VmError> {
  let mut heap = heap();
  let root = {
    let mut scope = heap.scope();
    let root = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.heap_mut().add_root(Value::Object(root));
    root
  };
  link(&mut heap, root, "a", Value::Int(1))?;

  let key_a = heap.intern("a")?;
  let key_new = heap.intern("fresh")?;
  let mut scope = heap.scope();
  harden(&mut scope, Value::Object(root))?;

  assert!(!scope.create_data_property(root, key_new, Value::Int(2))?);
  assert!(!scope.ordinary_define_own_property(
    root,
    key_a,
    vm_ses::PropertyDescriptorPatch {
      value: Some(Value::Int(9)),
      ..Default::default()
    },
  )?);
  assert!(!scope.ordinary_delete(root, key_a)?);
  Ok(())
}

#[test]
fn a_failed_harden_rolls_back_every_tentative_stamp() -> Result<(), VmError> {
  // A heap sized so the traversal workspace cannot be charged for the whole graph: harden
  // must fail with out-of-memory partway and clear every HARDENED stamp it set.
  let mut heap = Heap::new(HeapLimits::new(24 * 1024, 24 * 1024));

  let mut objects = Vec::new();
  let root = {
    let mut scope = heap.scope();
    let root = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.heap_mut().add_root(Value::Object(root));
    root
  };
  objects.push(root);

  // A long chain: every link is reachable from the root.
  let mut tail = root;
  for i in 0..64 {
    let next = {
      let mut scope = heap.scope();
      let next = scope.alloc_object(ClassKind::Ordinary, None)?;
      scope.heap_mut().add_root(Value::Object(next));
      next
    };
    link(&mut heap, tail, &format!("n{i}"), Value::Object(next))?;
    objects.push(next);
    tail = next;
  }

  // Exhaust the remaining budget with rooted padding.
  loop {
    let mut scope = heap.scope();
    match scope.alloc_string(&"p".repeat(64)) {
      Ok(s) => {
        let root_id = scope.heap_mut().add_root(Value::String(s));
        let _ = root_id;
      }
      Err(VmError::Termination(TerminationReason::OutOfMemory)) => break,
      Err(other) => return Err(other),
    }
  }

  let mut scope = heap.scope();
  let err = harden(&mut scope, Value::Object(root));
  assert!(matches!(
    err,
    Err(VmError::Termination(TerminationReason::OutOfMemory))
  ));

  // Rollback: no object anywhere in the graph keeps a HARDENED stamp.
  for obj in &objects {
    assert!(
      !is_hardened(scope.heap(), *obj)?,
      "rollback must clear tentative HARDENED stamps"
    );
  }
  Ok(())
}
