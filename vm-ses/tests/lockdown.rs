use vm_ses::{Heap, HeapLimits, PropertyKind, TerminationReason, Value, VmError};

fn context() -> Result<(Heap, vm_ses::Vm), VmError> {
  let mut heap = Heap::new(HeapLimits::new(1024 * 1024, 1024 * 1024));
  let vm = vm_ses::Vm::new(&mut heap)?;
  Ok((heap, vm))
}

fn string_of(heap: &Heap, value: Value) -> String {
  match value {
    Value::CodePoint(c) => c.to_string(),
    Value::String(s) => heap.string_str(s).expect("live string").to_owned(),
    other => panic!("expected a string result, got {other:?}"),
  }
}

fn error_name(heap: &mut Heap, err: &VmError) -> String {
  let VmError::Throw(Value::Object(mut obj)) = *err else {
    panic!("expected a thrown error object, got {err:?}");
  };
  let key = heap.intern("name").expect("intern");
  loop {
    if let Some(desc) = heap.object_get_own_property(obj, key).expect("live object") {
      if let PropertyKind::Data { value, .. } = desc.kind {
        return string_of(heap, value);
      }
    }
    match heap.object_prototype(obj).expect("live object") {
      Some(parent) => obj = parent,
      None => return String::from("<anonymous>"),
    }
  }
}

#[test]
fn first_lockdown_succeeds_and_freezes_the_intrinsics() -> Result<(), VmError> {
  let (mut heap, mut vm) = context()?;

  let result = vm.evaluate(&mut heap, "lockdown()")?;
  assert_eq!(result, Value::Undefined);
  assert!(vm.realm().is_locked_down());

  for probe in [
    "Object.isFrozen(Object.prototype)",
    "Object.isFrozen(Object)",
    "Object.isFrozen(Array.prototype)",
    "Object.isFrozen(Array.prototype.push)",
    "Object.isFrozen(TypeError.prototype)",
    "Object.isFrozen(Math)",
    "Object.isFrozen(Compartment)",
    "Object.isFrozen(harden)",
  ] {
    let result = vm.evaluate(&mut heap, probe)?;
    assert_eq!(result, Value::Bool(true), "{probe}");
  }

  vm.teardown(&mut heap);
  Ok(())
}

#[test]
fn second_lockdown_raises_type_error_from_any_compartment() -> Result<(), VmError> {
  let (mut heap, mut vm) = context()?;

  vm.evaluate(&mut heap, "lockdown()")?;

  let err = vm.evaluate(&mut heap, "lockdown()").expect_err("one-shot");
  assert_eq!(error_name(&mut heap, &err), "TypeError");

  // The latch is realm-wide: a fresh compartment sees it too.
  let result = vm.evaluate(
    &mut heap,
    r#"
      var name = null;
      try { new Compartment().evaluate('lockdown()'); } catch (e) { name = e.name; }
      name;
    "#,
  )?;
  assert_eq!(string_of(&heap, result), "TypeError");

  vm.teardown(&mut heap);
  Ok(())
}

#[test]
fn intrinsic_mutation_fails_after_lockdown_but_user_objects_stay_fresh() -> Result<(), VmError> {
  let (mut heap, mut vm) = context()?;

  vm.evaluate(&mut heap, "lockdown()")?;

  // Scenario: prototype pollution now fails with TypeError.
  let err = vm
    .evaluate(&mut heap, "Object.prototype.malicious = function () {};")
    .expect_err("frozen prototype rejects new properties");
  assert_eq!(error_name(&mut heap, &err), "TypeError");

  let err = vm
    .evaluate(&mut heap, "Array.prototype.push = null")
    .expect_err("frozen prototype rejects overwrites");
  assert_eq!(error_name(&mut heap, &err), "TypeError");

  let err = vm
    .evaluate(&mut heap, "delete Object.prototype.toString")
    .expect_err("frozen prototype rejects deletes");
  assert_eq!(error_name(&mut heap, &err), "TypeError");

  // User objects created after lockdown start fresh.
  let result = vm.evaluate(&mut heap, "var o = { foo: 1 }; o.foo = 2; o.foo")?;
  assert_eq!(result, Value::Int(2));
  let result = vm.evaluate(&mut heap, "globalThis.stillWorks = 7; stillWorks")?;
  assert_eq!(result, Value::Int(7));

  vm.teardown(&mut heap);
  Ok(())
}

#[test]
fn compartments_created_after_lockdown_see_frozen_intrinsics() -> Result<(), VmError> {
  let (mut heap, mut vm) = context()?;

  vm.evaluate(&mut heap, "lockdown()")?;

  let result = vm.evaluate(
    &mut heap,
    "new Compartment().evaluate('Object.isFrozen(Object.prototype)')",
  )?;
  assert_eq!(result, Value::Bool(true));

  let result = vm.evaluate(
    &mut heap,
    r#"
      var name = null;
      try { new Compartment().evaluate('Object.prototype.x = 1'); } catch (e) { name = e.name; }
      name;
    "#,
  )?;
  assert_eq!(string_of(&heap, result), "TypeError");

  vm.teardown(&mut heap);
  Ok(())
}

#[test]
fn harden_binding_is_shared_and_usable_before_and_after_lockdown() -> Result<(), VmError> {
  let (mut heap, mut vm) = context()?;

  let result = vm.evaluate(
    &mut heap,
    "var o = harden({ a: 1 }); Object.isFrozen(o)",
  )?;
  assert_eq!(result, Value::Bool(true));

  vm.evaluate(&mut heap, "lockdown()")?;
  let result = vm.evaluate(
    &mut heap,
    "new Compartment().evaluate('Object.isFrozen(harden({ b: 2 }))')",
  )?;
  assert_eq!(result, Value::Bool(true));

  vm.teardown(&mut heap);
  Ok(())
}

#[test]
fn a_failed_lockdown_latches_the_flag_anyway() -> Result<(), VmError> {
  // A small heap that can hold the realm but not the hardening workspace for the whole
  // intrinsic graph once padding has exhausted the budget.
  let mut heap = Heap::new(HeapLimits::new(96 * 1024, 96 * 1024));
  let mut vm = vm_ses::Vm::new(&mut heap)?;

  // Exhaust the remaining budget with rooted padding.
  let mut padding = Vec::new();
  loop {
    let mut scope = heap.scope();
    match scope.alloc_string(&"p".repeat(64)) {
      Ok(s) => {
        padding.push(scope.heap_mut().add_root(Value::String(s)));
      }
      Err(VmError::Termination(TerminationReason::OutOfMemory)) => break,
      Err(other) => return Err(other),
    }
  }

  // Give back a little headroom: enough for `evaluate` to reach the lockdown native and latch
  // the flag, nowhere near enough to charge the hardening workspace for the intrinsic graph.
  let keep = padding.len() - 4;
  for root in padding.drain(keep..) {
    heap.remove_root(root);
  }
  heap.collect_garbage();

  let err = vm
    .evaluate(&mut heap, "lockdown()")
    .expect_err("hardening the intrinsics cannot fit");
  assert!(matches!(
    err,
    VmError::Termination(TerminationReason::OutOfMemory)
  ));

  // The flag latched before hardening began: even with memory back, lockdown stays one-shot.
  assert!(vm.realm().is_locked_down());
  for root in padding {
    heap.remove_root(root);
  }
  heap.collect_garbage();

  let err = vm.evaluate(&mut heap, "lockdown()").expect_err("latched");
  assert_eq!(error_name(&mut heap, &err), "TypeError");

  vm.teardown(&mut heap);
  Ok(())
}
