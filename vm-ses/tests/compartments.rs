use vm_ses::{Heap, HeapLimits, PropertyKind, Value, VmError};

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
fn globals_option_shows_up_on_global_this_and_in_scope() -> Result<(), VmError> {
  let (mut heap, mut vm) = context()?;

  // Declarations do not persist across `evaluate` calls, so the compartment is pinned on the
  // root global.
  let result = vm.evaluate(
    &mut heap,
    "globalThis.c = new Compartment({ globals: { x: 42 } }); c.evaluate('x + 1');",
  )?;
  assert_eq!(result, Value::Int(43));

  let result = vm.evaluate(&mut heap, "c.evaluate('globalThis.x')")?;
  assert_eq!(result, Value::Int(42));
  let result = vm.evaluate(&mut heap, "c.globalThis.x")?;
  assert_eq!(result, Value::Int(42));

  vm.teardown(&mut heap);
  Ok(())
}

#[test]
fn global_lexicals_are_in_scope_but_not_on_global_this() -> Result<(), VmError> {
  let (mut heap, mut vm) = context()?;

  let result = vm.evaluate(
    &mut heap,
    "globalThis.c = new Compartment({ globalLexicals: { y: 7 } }); c.evaluate('typeof globalThis.y');",
  )?;
  assert_eq!(string_of(&heap, result), "undefined");

  let result = vm.evaluate(&mut heap, "c.evaluate('y')")?;
  assert_eq!(result, Value::Int(7));

  vm.teardown(&mut heap);
  Ok(())
}

#[test]
fn non_writable_lexical_descriptors_become_immutable_bindings() -> Result<(), VmError> {
  let (mut heap, mut vm) = context()?;

  let result = vm.evaluate(
    &mut heap,
    r#"
      var lex = Object.defineProperty({}, 'y', {
        value: 7, writable: false, enumerable: true, configurable: true
      });
      globalThis.c = new Compartment({ globalLexicals: lex });
      c.evaluate("var hit = null; try { y = 8; } catch (e) { hit = e.name; } hit");
    "#,
  )?;
  assert_eq!(string_of(&heap, result), "TypeError");

  // The binding still reads fine afterwards.
  let result = vm.evaluate(&mut heap, "c.evaluate('y')")?;
  assert_eq!(result, Value::Int(7));

  vm.teardown(&mut heap);
  Ok(())
}

#[test]
fn unrecognized_option_keys_are_ignored() -> Result<(), VmError> {
  let (mut heap, mut vm) = context()?;

  let result = vm.evaluate(
    &mut heap,
    "new Compartment({ wat: 1, transforms: [], globals: { a: 5 } }).evaluate('a')",
  )?;
  assert_eq!(result, Value::Int(5));

  vm.teardown(&mut heap);
  Ok(())
}

#[test]
fn declarations_in_one_compartment_are_invisible_in_another() -> Result<(), VmError> {
  let (mut heap, mut vm) = context()?;

  vm.evaluate(
    &mut heap,
    r#"
      globalThis.a = new Compartment();
      globalThis.b = new Compartment();
      a.evaluate('globalThis.secret = 123');
    "#,
  )?;
  let result = vm.evaluate(&mut heap, "b.evaluate('typeof secret')")?;
  assert_eq!(string_of(&heap, result), "undefined");
  let result = vm.evaluate(&mut heap, "a.evaluate('secret')")?;
  assert_eq!(result, Value::Int(123));

  // And neither leaks into the root compartment.
  let result = vm.evaluate(&mut heap, "typeof secret")?;
  assert_eq!(string_of(&heap, result), "undefined");

  vm.teardown(&mut heap);
  Ok(())
}

#[test]
fn global_this_objects_are_distinct_and_stable() -> Result<(), VmError> {
  let (mut heap, mut vm) = context()?;

  let result = vm.evaluate(
    &mut heap,
    "globalThis.a = new Compartment(); globalThis.b = new Compartment(); a.globalThis === b.globalThis",
  )?;
  assert_eq!(result, Value::Bool(false));

  let result = vm.evaluate(&mut heap, "a.globalThis === a.globalThis")?;
  assert_eq!(result, Value::Bool(true));

  // A compartment's global is also not the root compartment's global.
  let result = vm.evaluate(&mut heap, "a.globalThis === globalThis")?;
  assert_eq!(result, Value::Bool(false));

  vm.teardown(&mut heap);
  Ok(())
}

#[test]
fn intrinsics_are_shared_by_reference_across_compartments() -> Result<(), VmError> {
  let (mut heap, mut vm) = context()?;

  let in_compartment = vm.evaluate(
    &mut heap,
    "globalThis.c = new Compartment(); c.evaluate('Array.prototype')",
  )?;
  let in_root = vm.evaluate(&mut heap, "Array.prototype")?;
  assert_eq!(in_compartment, in_root);

  // Pre-lockdown, prototype pollution in one compartment is visible in every other.
  vm.evaluate(&mut heap, "c.evaluate('Object.prototype.polluted = 99')")?;
  let result = vm.evaluate(&mut heap, "({}).polluted")?;
  assert_eq!(result, Value::Int(99));
  let result = vm.evaluate(&mut heap, "new Compartment().evaluate('({}).polluted')")?;
  assert_eq!(result, Value::Int(99));

  vm.teardown(&mut heap);
  Ok(())
}

#[test]
fn top_level_this_is_null_without_lexicals_and_global_with_them() -> Result<(), VmError> {
  let (mut heap, mut vm) = context()?;

  let result = vm.evaluate(&mut heap, "new Compartment().evaluate('this === null')")?;
  assert_eq!(result, Value::Bool(true));

  let result = vm.evaluate(
    &mut heap,
    "new Compartment({ globalLexicals: { z: 1 } }).evaluate('this === globalThis')",
  )?;
  assert_eq!(result, Value::Bool(true));

  vm.teardown(&mut heap);
  Ok(())
}

#[test]
fn compartments_can_nest_and_children_start_empty() -> Result<(), VmError> {
  let (mut heap, mut vm) = context()?;

  let result = vm.evaluate(
    &mut heap,
    r#"
      globalThis.outer = new Compartment({ globals: { marker: 1 } });
      outer.evaluate("globalThis.inner = new Compartment(); inner.evaluate('typeof marker')");
    "#,
  )?;
  assert_eq!(string_of(&heap, result), "undefined");

  let result = vm.evaluate(&mut heap, "outer.evaluate(\"inner.evaluate('1 + 1')\")")?;
  assert_eq!(result, Value::Int(2));

  vm.teardown(&mut heap);
  Ok(())
}

#[test]
fn parse_errors_surface_as_catchable_syntax_errors() -> Result<(), VmError> {
  let (mut heap, mut vm) = context()?;

  let err = vm
    .evaluate(&mut heap, "new Compartment().evaluate('var = 1')")
    .expect_err("malformed source must throw");
  assert_eq!(error_name(&mut heap, &err), "SyntaxError");

  // Catchable from script, like every other error.
  let result = vm.evaluate(
    &mut heap,
    r#"
      var name = null;
      try { new Compartment().evaluate("with (o) {}"); } catch (e) { name = e.name; }
      name;
    "#,
  )?;
  assert_eq!(string_of(&heap, result), "SyntaxError");

  vm.teardown(&mut heap);
  Ok(())
}

#[test]
fn script_declarations_do_not_persist_across_evaluate_calls() -> Result<(), VmError> {
  let (mut heap, mut vm) = context()?;

  vm.evaluate(
    &mut heap,
    "globalThis.c = new Compartment(); c.evaluate('var v = 5;')",
  )?;
  let result = vm.evaluate(&mut heap, "c.evaluate('typeof v')")?;
  assert_eq!(string_of(&heap, result), "undefined");

  // Explicit globalThis writes are the way to persist state.
  vm.evaluate(&mut heap, "c.evaluate('globalThis.w = 6;')")?;
  let result = vm.evaluate(&mut heap, "c.evaluate('w')")?;
  assert_eq!(result, Value::Int(6));

  vm.teardown(&mut heap);
  Ok(())
}

#[test]
fn evaluate_requires_string_source() -> Result<(), VmError> {
  let (mut heap, mut vm) = context()?;

  let err = vm
    .evaluate(&mut heap, "new Compartment().evaluate(42)")
    .expect_err("non-string source must throw");
  assert_eq!(error_name(&mut heap, &err), "TypeError");

  vm.teardown(&mut heap);
  Ok(())
}
