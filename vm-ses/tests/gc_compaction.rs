use vm_ses::{
  ClassKind, Heap, HeapLimits, PropertyDescriptor, TerminationReason, Value, VmError,
};

fn small_heap() -> Heap {
  Heap::new(HeapLimits::new(64 * 1024, 64 * 1024))
}

#[test]
fn unrooted_objects_are_collected_and_handles_invalidated() -> Result<(), VmError> {
  let mut heap = small_heap();

  let obj = {
    let mut scope = heap.scope();
    scope.alloc_object(ClassKind::Ordinary, None)?
    // Scope drops here: no roots remain.
  };
  assert!(heap.is_valid_object(obj));

  heap.collect_garbage();
  assert!(!heap.is_valid_object(obj));
  assert!(matches!(heap.object_class(obj), Err(VmError::InvalidHandle)));
  Ok(())
}

#[test]
fn persistent_roots_keep_objects_alive_across_collections() -> Result<(), VmError> {
  let mut heap = small_heap();

  let obj = {
    let mut scope = heap.scope();
    scope.alloc_object(ClassKind::Ordinary, None)?
  };
  let root = heap.add_root(Value::Object(obj));

  heap.collect_garbage();
  heap.collect_garbage();
  assert!(heap.is_valid_object(obj));

  heap.remove_root(root);
  heap.collect_garbage();
  assert!(!heap.is_valid_object(obj));
  Ok(())
}

#[test]
fn objects_reachable_through_properties_and_prototypes_survive() -> Result<(), VmError> {
  let mut heap = small_heap();

  let (holder, proto, child) = {
    let mut scope = heap.scope();
    let proto = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.push_root(Value::Object(proto));
    let holder = scope.alloc_object(ClassKind::Ordinary, Some(proto))?;
    scope.push_root(Value::Object(holder));
    let child = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.push_root(Value::Object(child));

    let key = scope.heap_mut().intern("child")?;
    scope.define_property(holder, key, PropertyDescriptor::data(Value::Object(child)))?;
    (holder, proto, child)
  };

  let _root = heap.add_root(Value::Object(holder));
  heap.collect_garbage();

  assert!(heap.is_valid_object(holder));
  assert!(heap.is_valid_object(proto));
  assert!(heap.is_valid_object(child));
  Ok(())
}

#[test]
fn compaction_packs_survivors_to_the_low_end_in_trace_preorder() -> Result<(), VmError> {
  let mut heap = small_heap();

  // holder (with prototype and two object-valued properties) plus two unreachable objects
  // interleaved between them in allocation order.
  let (holder, proto, a, b) = {
    let mut scope = heap.scope();
    let _garbage1 = scope.alloc_object(ClassKind::Ordinary, None)?;
    let proto = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.push_root(Value::Object(proto));
    let a = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.push_root(Value::Object(a));
    let _garbage2 = scope.alloc_object(ClassKind::Ordinary, None)?;
    let b = scope.alloc_object(ClassKind::Ordinary, None)?;
    scope.push_root(Value::Object(b));
    let holder = scope.alloc_object(ClassKind::Ordinary, Some(proto))?;
    scope.push_root(Value::Object(holder));

    let key_a = scope.heap_mut().intern("a")?;
    let key_b = scope.heap_mut().intern("b")?;
    scope.define_property(holder, key_a, PropertyDescriptor::data(Value::Object(a)))?;
    scope.define_property(holder, key_b, PropertyDescriptor::data(Value::Object(b)))?;
    (holder, proto, a, b)
  };

  let _root = heap.add_root(Value::Object(holder));
  heap.collect_garbage();

  // Only the four reachable objects remain, packed at the low end, in pre-order: the root
  // object first, then its prototype, then the property values in insertion order.
  assert_eq!(heap.arena_len(), 4);
  assert_eq!(heap.arena_offset(holder.id())?, 0);
  assert_eq!(heap.arena_offset(proto.id())?, 1);
  assert_eq!(heap.arena_offset(a.id())?, 2);
  assert_eq!(heap.arena_offset(b.id())?, 3);

  // Collecting again without new garbage is idempotent.
  heap.collect_garbage();
  assert_eq!(heap.arena_len(), 4);
  assert_eq!(heap.arena_offset(holder.id())?, 0);
  Ok(())
}

#[test]
fn collection_is_deterministic_given_the_same_roots() -> Result<(), VmError> {
  let build = || -> Result<(Heap, Vec<usize>), VmError> {
    let mut heap = small_heap();
    let objs = {
      let mut scope = heap.scope();
      let mut objs = Vec::new();
      for _ in 0..8 {
        let obj = scope.alloc_object(ClassKind::Ordinary, None)?;
        scope.push_root(Value::Object(obj));
        objs.push(obj);
      }
      // Wire a diamond: 0 -> {1, 2}, 1 -> 3, 2 -> 3.
      let key = scope.heap_mut().intern("edge")?;
      let key2 = scope.heap_mut().intern("edge2")?;
      scope.define_property(objs[0], key, PropertyDescriptor::data(Value::Object(objs[1])))?;
      scope.define_property(objs[0], key2, PropertyDescriptor::data(Value::Object(objs[2])))?;
      scope.define_property(objs[1], key, PropertyDescriptor::data(Value::Object(objs[3])))?;
      scope.define_property(objs[2], key, PropertyDescriptor::data(Value::Object(objs[3])))?;
      objs
    };
    let _root = heap.add_root(Value::Object(objs[0]));
    heap.collect_garbage();

    let offsets = objs[..4]
      .iter()
      .map(|o| heap.arena_offset(o.id()))
      .collect::<Result<Vec<_>, _>>()?;
    Ok((heap, offsets))
  };

  let (_h1, offsets1) = build()?;
  let (_h2, offsets2) = build()?;
  assert_eq!(offsets1, offsets2);
  // Pre-order over the diamond: 0, then 1, then 1's target 3... breadth order is fixed by the
  // tracer; what matters is that it is identical run to run and packs from offset 0.
  assert_eq!(offsets1[0], 0);
  Ok(())
}

#[test]
fn allocation_after_exhaustion_fails_with_out_of_memory() {
  let mut heap = Heap::new(HeapLimits::new(2 * 1024, 2 * 1024));

  let mut scope = heap.scope();
  let mut last_err = None;
  for _ in 0..1024 {
    match scope.alloc_string("0123456789abcdef0123456789abcdef") {
      Ok(s) => {
        scope.push_root(Value::String(s));
      }
      Err(err) => {
        last_err = Some(err);
        break;
      }
    }
  }
  assert!(matches!(
    last_err,
    Some(VmError::Termination(TerminationReason::OutOfMemory))
  ));
}

#[test]
fn collection_recovers_space_before_declaring_out_of_memory() -> Result<(), VmError> {
  let mut heap = Heap::new(HeapLimits::new(4 * 1024, 2 * 1024));

  // Fill most of the way to the GC threshold with garbage (nothing rooted), then allocate
  // something big: the triggered collection must reclaim the garbage instead of failing.
  {
    let mut scope = heap.scope();
    for _ in 0..8 {
      let _ = scope.alloc_string("x".repeat(128).as_str())?;
    }
  }
  let before = heap.gc_runs();

  let mut scope = heap.scope();
  let s = scope.alloc_string(&"y".repeat(512))?;
  assert_eq!(scope.heap().string_str(s)?, "y".repeat(512));
  assert!(scope.heap().gc_runs() > before);
  Ok(())
}

#[test]
fn stress_mode_invalidates_unrooted_handles_at_every_allocation() -> Result<(), VmError> {
  let mut heap = small_heap();
  heap.set_gc_stress(true);

  let mut scope = heap.scope();
  let unrooted = scope.alloc_object(ClassKind::Ordinary, None)?;
  // Deliberately not rooted: the next allocation collects it.
  let rooted = scope.alloc_object(ClassKind::Ordinary, None)?;
  scope.push_root(Value::Object(rooted));

  assert!(!scope.heap().is_valid_object(unrooted));
  assert!(scope.heap().is_valid_object(rooted));

  let _third = scope.alloc_object(ClassKind::Ordinary, None)?;
  assert!(scope.heap().is_valid_object(rooted));
  Ok(())
}
