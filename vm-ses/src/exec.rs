//! Tree-walking evaluator over `parse_ses` ASTs.
//!
//! Everything here follows the rooting discipline: any value that has to survive a
//! potentially-allocating operation is pushed onto the scope's root stack first. Allocation
//! points are easy to enumerate (string/object allocation, atom interning, property-table
//! growth); with GC stress mode enabled, a missed root here fails deterministically in tests.
//!
//! Thrown JavaScript values travel as `Err(VmError::Throw(_))`; the [`Completion`] enum carries
//! only the non-throw control flow (normal/return/break/continue), with the `UpdateEmpty`
//! behavior of completion values folded into statement-list execution.

use crate::atom::{ATOM_GLOBAL_THIS, ATOM_LENGTH, ATOM_NAME, ATOM_PROTOTYPE};
use crate::handle::{Atom, GcObject};
use crate::heap::{ClassKind, Scope};
use crate::object_ops::array_length;
use crate::property::{PropertyDescriptor, PropertyKind};
use crate::value::{value_str, Value};
use crate::vm::{ecma_function_slots, ErrorKind, Vm};
use crate::VmError;
use parse_ses::{
  AssignOp, BinaryOp, DeclMode, Expr, Func, LogicalOp, MemberKey, PropKey, Stmt, UnaryOp,
  UpdateOp,
};
use std::rc::Rc;

/// An ECMAScript completion record, minus `Throw` (thrown values travel as errors).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Completion {
  Normal(Option<Value>),
  Return(Value),
  Break,
  Continue,
}

/// A frame of evaluation: the current environment chain head and the `this` binding.
///
/// The compartment global is not stored here; it is resolved through the chain root's
/// `globalThis` binding, so closures always see the global of the compartment they were created
/// in.
#[derive(Clone, Copy)]
struct Frame {
  env: GcObject,
  this_value: Value,
}

/// Parses and runs `source` in `compartment`, returning the script's completion value.
pub(crate) fn evaluate_in_compartment(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  compartment: GcObject,
  source: &str,
) -> Result<Value, VmError> {
  let stmts = match parse_ses::parse(source) {
    Ok(stmts) => stmts,
    Err(err) => {
      return Err(vm.throw_error(scope, ErrorKind::SyntaxError, &err.message));
    }
  };

  let (global, lexicals, has_lexicals) = {
    let slots = scope.heap().compartment_slots(compartment)?;
    (slots.global, slots.lexicals, slots.has_lexicals)
  };

  let mut scope = scope.reborrow();
  scope.push_root(Value::Object(compartment));

  // Top-level declarations live in a per-evaluate script environment chained onto the
  // compartment's lexical record; they do not persist across `evaluate` calls.
  let script_env = scope.alloc_object(ClassKind::Environment, Some(lexicals))?;
  scope.push_root(Value::Object(script_env));

  let frame = Frame {
    env: script_env,
    // Top-level `this` is the compartment global when lexical bindings were supplied at
    // construction and null otherwise.
    this_value: if has_lexicals {
      Value::Object(global)
    } else {
      Value::Null
    },
  };

  match exec_stmts(vm, &mut scope, frame, &stmts)? {
    Completion::Normal(value) => Ok(value.unwrap_or(Value::Undefined)),
    Completion::Return(_) => Err(vm.throw_error(
      &mut scope,
      ErrorKind::SyntaxError,
      "return is only valid inside a function",
    )),
    Completion::Break | Completion::Continue => Err(vm.throw_error(
      &mut scope,
      ErrorKind::SyntaxError,
      "break and continue are only valid inside a loop",
    )),
  }
}

/// Invokes a user function: fresh environment over the closure environment, parameters and
/// `arguments` bound, body executed.
pub(crate) fn call_ecma_function(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  code: &Rc<Func>,
  closure_env: Option<GcObject>,
  this: Value,
  args: &[Value],
) -> Result<Value, VmError> {
  let mut scope = scope.reborrow();
  scope.push_root(this);
  for &arg in args {
    scope.push_root(arg);
  }

  let env = scope.alloc_object(ClassKind::Environment, closure_env)?;
  scope.push_root(Value::Object(env));

  for (i, param) in code.params.iter().enumerate() {
    let value = args.get(i).copied().unwrap_or(Value::Undefined);
    let key = scope.heap_mut().intern(param)?;
    scope.define_property(
      env,
      key,
      PropertyDescriptor {
        enumerable: true,
        configurable: false,
        kind: PropertyKind::Data {
          value,
          writable: true,
        },
      },
    )?;
  }

  if !code.is_arrow {
    let arguments = alloc_arguments_object(vm, &mut scope, args)?;
    let mut scope = scope.reborrow();
    scope.push_root(Value::Object(arguments));
    let key = scope.heap_mut().intern("arguments")?;
    scope.define_property(
      env,
      key,
      PropertyDescriptor {
        enumerable: false,
        configurable: false,
        kind: PropertyKind::Data {
          value: Value::Object(arguments),
          writable: false,
        },
      },
    )?;
  }

  let frame = Frame {
    env,
    this_value: this,
  };
  match exec_stmts(vm, &mut scope, frame, &code.body)? {
    Completion::Return(value) => Ok(value),
    Completion::Normal(_) => Ok(Value::Undefined),
    Completion::Break | Completion::Continue => Err(vm.throw_error(
      &mut scope,
      ErrorKind::SyntaxError,
      "break and continue are only valid inside a loop",
    )),
  }
}

fn alloc_arguments_object(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  args: &[Value],
) -> Result<GcObject, VmError> {
  let proto = vm.realm().intrinsics().object_prototype();
  let mut scope = scope.reborrow();
  let obj = scope.alloc_object(ClassKind::Arguments, Some(proto))?;
  scope.push_root(Value::Object(obj));

  scope.define_property(
    obj,
    ATOM_LENGTH,
    PropertyDescriptor {
      enumerable: false,
      configurable: true,
      kind: PropertyKind::Data {
        value: Value::number(args.len() as f64),
        writable: true,
      },
    },
  )?;
  for (i, &arg) in args.iter().enumerate() {
    let key = {
      let s = i.to_string();
      scope.heap_mut().intern(&s)?
    };
    scope.define_property(obj, key, PropertyDescriptor::data(arg))?;
  }
  Ok(obj)
}

// -----------------------------------------------------------------------------------------------
// Statements
// -----------------------------------------------------------------------------------------------

fn exec_stmts(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  frame: Frame,
  stmts: &[Stmt],
) -> Result<Completion, VmError> {
  let mut scope = scope.reborrow();

  // Function declarations hoist to the top of their statement list.
  for stmt in stmts {
    if let Stmt::Function(func) = stmt {
      let closure = make_closure(vm, &mut scope, frame, func)?;
      let mut scope = scope.reborrow();
      scope.push_root(Value::Object(closure));
      let name = func.name.as_deref().unwrap_or_default();
      let key = scope.heap_mut().intern(name)?;
      scope.define_property(
        frame.env,
        key,
        PropertyDescriptor {
          enumerable: true,
          configurable: false,
          kind: PropertyKind::Data {
            value: Value::Object(closure),
            writable: true,
          },
        },
      )?;
    }
  }

  // The running completion value lives in a root slot so it survives allocations in later
  // statements.
  let mut result: Option<Value> = None;
  let slot = scope.push_root_slot(Value::Undefined);

  for stmt in stmts {
    if matches!(stmt, Stmt::Function(_)) {
      continue;
    }
    match exec_stmt(vm, &mut scope, frame, stmt)? {
      Completion::Normal(Some(value)) => {
        scope.write_root_slot(slot, value);
        result = Some(value);
      }
      Completion::Normal(None) => {}
      // UpdateEmpty: an abrupt completion with no value of its own carries the list's value.
      abrupt => return Ok(abrupt),
    }
  }
  Ok(Completion::Normal(result))
}

fn exec_stmt(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  frame: Frame,
  stmt: &Stmt,
) -> Result<Completion, VmError> {
  match stmt {
    Stmt::Empty | Stmt::Function(_) => Ok(Completion::Normal(None)),

    Stmt::Expr(expr) => {
      let value = eval_expr(vm, scope, frame, expr)?;
      Ok(Completion::Normal(Some(value)))
    }

    Stmt::Decl { mode, decls } => {
      for (name, init) in decls {
        let value = match init {
          Some(expr) => eval_expr(vm, scope, frame, expr)?,
          None => Value::Undefined,
        };
        let mut scope = scope.reborrow();
        scope.push_root(value);
        let key = scope.heap_mut().intern(name)?;
        scope.define_property(
          frame.env,
          key,
          PropertyDescriptor {
            enumerable: true,
            configurable: false,
            kind: PropertyKind::Data {
              value,
              writable: *mode != DeclMode::Const,
            },
          },
        )?;
      }
      Ok(Completion::Normal(None))
    }

    Stmt::Block(stmts) => {
      let mut scope = scope.reborrow();
      let env = scope.alloc_object(ClassKind::Environment, Some(frame.env))?;
      scope.push_root(Value::Object(env));
      exec_stmts(vm, &mut scope, Frame { env, ..frame }, stmts)
    }

    Stmt::If(test, cons, alt) => {
      let test = eval_expr(vm, scope, frame, test)?;
      if to_boolean(scope.heap(), test)? {
        exec_stmt(vm, scope, frame, cons)
      } else if let Some(alt) = alt {
        exec_stmt(vm, scope, frame, alt)
      } else {
        Ok(Completion::Normal(None))
      }
    }

    Stmt::While(test, body) => {
      let mut scope = scope.reborrow();
      let mut result = None;
      let slot = scope.push_root_slot(Value::Undefined);
      loop {
        let test = eval_expr(vm, &mut scope, frame, test)?;
        if !to_boolean(scope.heap(), test)? {
          break;
        }
        match exec_stmt(vm, &mut scope, frame, body)? {
          Completion::Break => break,
          Completion::Continue | Completion::Normal(None) => {}
          Completion::Normal(Some(value)) => {
            scope.write_root_slot(slot, value);
            result = Some(value);
          }
          ret @ Completion::Return(_) => return Ok(ret),
        }
      }
      Ok(Completion::Normal(result))
    }

    Stmt::DoWhile(body, test) => {
      let mut scope = scope.reborrow();
      let mut result = None;
      let slot = scope.push_root_slot(Value::Undefined);
      loop {
        match exec_stmt(vm, &mut scope, frame, body)? {
          Completion::Break => break,
          Completion::Continue | Completion::Normal(None) => {}
          Completion::Normal(Some(value)) => {
            scope.write_root_slot(slot, value);
            result = Some(value);
          }
          ret @ Completion::Return(_) => return Ok(ret),
        }
        let test = eval_expr(vm, &mut scope, frame, test)?;
        if !to_boolean(scope.heap(), test)? {
          break;
        }
      }
      Ok(Completion::Normal(result))
    }

    Stmt::For {
      init,
      test,
      update,
      body,
    } => {
      let mut scope = scope.reborrow();
      let env = scope.alloc_object(ClassKind::Environment, Some(frame.env))?;
      scope.push_root(Value::Object(env));
      let frame = Frame { env, ..frame };

      if let Some(init) = init {
        match exec_stmt(vm, &mut scope, frame, init)? {
          Completion::Normal(_) => {}
          abrupt => return Ok(abrupt),
        }
      }

      let mut result = None;
      let slot = scope.push_root_slot(Value::Undefined);
      loop {
        if let Some(test) = test {
          let test = eval_expr(vm, &mut scope, frame, test)?;
          if !to_boolean(scope.heap(), test)? {
            break;
          }
        }
        match exec_stmt(vm, &mut scope, frame, body)? {
          Completion::Break => break,
          Completion::Continue | Completion::Normal(None) => {}
          Completion::Normal(Some(value)) => {
            scope.write_root_slot(slot, value);
            result = Some(value);
          }
          ret @ Completion::Return(_) => return Ok(ret),
        }
        if let Some(update) = update {
          eval_expr(vm, &mut scope, frame, update)?;
        }
      }
      Ok(Completion::Normal(result))
    }

    Stmt::ForIn {
      decl: _,
      name,
      object,
      body,
    } => {
      let object = eval_expr(vm, scope, frame, object)?;
      let Value::Object(obj) = object else {
        // Iterating a primitive (or null/undefined) visits nothing.
        return Ok(Completion::Normal(None));
      };

      let mut scope = scope.reborrow();
      scope.push_root(object);
      let env = scope.alloc_object(ClassKind::Environment, Some(frame.env))?;
      scope.push_root(Value::Object(env));
      let frame = Frame { env, ..frame };
      let name_key = scope.heap_mut().intern(name)?;

      // Snapshot of own enumerable keys; `for…in` does not walk the prototype chain.
      let keys: Vec<Atom> = {
        let heap = scope.heap();
        let mut keys = Vec::new();
        for key in heap.object_own_keys(obj)? {
          if let Some(desc) = heap.object_get_own_property(obj, key)? {
            if desc.enumerable {
              keys.push(key);
            }
          }
        }
        keys
      };

      let mut result = None;
      let slot = scope.push_root_slot(Value::Undefined);
      for key in keys {
        let key_value = scope.atom_value(key)?;
        let mut scope = scope.reborrow();
        scope.push_root(key_value);
        scope.define_property(
          env,
          name_key,
          PropertyDescriptor {
            enumerable: true,
            configurable: false,
            kind: PropertyKind::Data {
              value: key_value,
              writable: true,
            },
          },
        )?;
        match exec_stmt(vm, &mut scope, frame, body)? {
          Completion::Break => break,
          Completion::Continue | Completion::Normal(None) => {}
          Completion::Normal(Some(value)) => {
            scope.write_root_slot(slot, value);
            result = Some(value);
          }
          ret @ Completion::Return(_) => return Ok(ret),
        }
      }
      Ok(Completion::Normal(result))
    }

    Stmt::ForOf {
      decl: _,
      name,
      iterable,
      body,
    } => {
      let iterable = eval_expr(vm, scope, frame, iterable)?;
      let arr = match iterable {
        Value::Object(obj) if scope.heap().object_class(obj)? == ClassKind::Array => obj,
        _ => {
          return Err(vm.throw_error(scope, ErrorKind::TypeError, "for…of requires an array"));
        }
      };

      let mut scope = scope.reborrow();
      scope.push_root(iterable);
      let env = scope.alloc_object(ClassKind::Environment, Some(frame.env))?;
      scope.push_root(Value::Object(env));
      let frame = Frame { env, ..frame };
      let name_key = scope.heap_mut().intern(name)?;

      let mut result = None;
      let slot = scope.push_root_slot(Value::Undefined);
      let mut index = 0u32;
      while index < array_length(scope.heap(), arr)? {
        let key = {
          let s = index.to_string();
          scope.heap_mut().intern(&s)?
        };
        let element = scope.ordinary_get(vm, arr, key, iterable)?;
        let mut scope = scope.reborrow();
        scope.push_root(element);
        scope.define_property(
          env,
          name_key,
          PropertyDescriptor {
            enumerable: true,
            configurable: false,
            kind: PropertyKind::Data {
              value: element,
              writable: true,
            },
          },
        )?;
        match exec_stmt(vm, &mut scope, frame, body)? {
          Completion::Break => break,
          Completion::Continue | Completion::Normal(None) => {}
          Completion::Normal(Some(value)) => {
            scope.write_root_slot(slot, value);
            result = Some(value);
          }
          ret @ Completion::Return(_) => return Ok(ret),
        }
        index += 1;
      }
      Ok(Completion::Normal(result))
    }

    Stmt::Switch {
      discriminant,
      cases,
    } => {
      let discriminant = eval_expr(vm, scope, frame, discriminant)?;
      let mut scope = scope.reborrow();
      scope.push_root(discriminant);
      let env = scope.alloc_object(ClassKind::Environment, Some(frame.env))?;
      scope.push_root(Value::Object(env));
      let frame = Frame { env, ..frame };

      // Find the first matching `case` (or fall back to `default`), then execute from there
      // with fallthrough.
      let mut start = None;
      for (i, case) in cases.iter().enumerate() {
        if let Some(test) = &case.test {
          let test = eval_expr(vm, &mut scope, frame, test)?;
          if discriminant.strict_equals(test, scope.heap()) {
            start = Some(i);
            break;
          }
        }
      }
      if start.is_none() {
        start = cases.iter().position(|case| case.test.is_none());
      }

      let mut result = None;
      let slot = scope.push_root_slot(Value::Undefined);
      if let Some(start) = start {
        for case in &cases[start..] {
          match exec_stmts(vm, &mut scope, frame, &case.body)? {
            Completion::Break => break,
            Completion::Normal(None) => {}
            Completion::Normal(Some(value)) => {
              scope.write_root_slot(slot, value);
              result = Some(value);
            }
            Completion::Continue => return Ok(Completion::Continue),
            ret @ Completion::Return(_) => return Ok(ret),
          }
        }
      }
      Ok(Completion::Normal(result))
    }

    Stmt::Return(arg) => {
      let value = match arg {
        Some(expr) => eval_expr(vm, scope, frame, expr)?,
        None => Value::Undefined,
      };
      Ok(Completion::Return(value))
    }

    Stmt::Throw(expr) => {
      let value = eval_expr(vm, scope, frame, expr)?;
      Err(VmError::Throw(value))
    }

    Stmt::Try {
      block,
      catch,
      finally,
    } => {
      // The outcome's payload (completion value or thrown value) has to survive the catch and
      // finally blocks, both of which can allocate.
      let mut scope = scope.reborrow();
      let slot = scope.push_root_slot(Value::Undefined);

      let mut outcome = {
        let mut scope = scope.reborrow();
        let env = scope.alloc_object(ClassKind::Environment, Some(frame.env))?;
        scope.push_root(Value::Object(env));
        exec_stmts(vm, &mut scope, Frame { env, ..frame }, block)
      };
      root_outcome(&mut scope, slot, &outcome);

      // Only `Throw` is catchable; terminations unwind.
      if let (Err(VmError::Throw(thrown)), Some(catch)) = (&outcome, catch) {
        let thrown = *thrown;
        let mut scope = scope.reborrow();
        scope.push_root(thrown);
        let env = scope.alloc_object(ClassKind::Environment, Some(frame.env))?;
        scope.push_root(Value::Object(env));
        if let Some(param) = &catch.param {
          let key = scope.heap_mut().intern(param)?;
          scope.define_property(
            env,
            key,
            PropertyDescriptor {
              enumerable: true,
              configurable: false,
              kind: PropertyKind::Data {
                value: thrown,
                writable: true,
              },
            },
          )?;
        }
        outcome = exec_stmts(vm, &mut scope, Frame { env, ..frame }, &catch.body);
      }
      root_outcome(&mut scope, slot, &outcome);

      if let Some(finally) = finally {
        let fin = {
          let mut scope = scope.reborrow();
          let env = scope.alloc_object(ClassKind::Environment, Some(frame.env))?;
          scope.push_root(Value::Object(env));
          exec_stmts(vm, &mut scope, Frame { env, ..frame }, finally)?
        };
        // An abrupt `finally` completion overrides the try/catch outcome; a normal one (with or
        // without a value) is discarded.
        if !matches!(fin, Completion::Normal(_)) {
          return Ok(fin);
        }
      }
      outcome
    }

    Stmt::Break => Ok(Completion::Break),
    Stmt::Continue => Ok(Completion::Continue),
  }
}

// -----------------------------------------------------------------------------------------------
// Expressions
// -----------------------------------------------------------------------------------------------

/// Keeps a try/catch outcome's payload alive across subsequent blocks.
fn root_outcome(scope: &mut Scope<'_>, slot: usize, outcome: &Result<Completion, VmError>) {
  let value = match outcome {
    Ok(Completion::Normal(Some(value))) | Ok(Completion::Return(value)) => *value,
    Err(VmError::Throw(value)) => *value,
    _ => return,
  };
  scope.write_root_slot(slot, value);
}

fn eval_expr(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  frame: Frame,
  expr: &Expr,
) -> Result<Value, VmError> {
  match expr {
    Expr::Null => Ok(Value::Null),
    Expr::Undefined => Ok(Value::Undefined),
    Expr::Bool(b) => Ok(Value::Bool(*b)),
    Expr::Number(n) => Ok(Value::number(*n)),
    Expr::Str(s) => scope.alloc_string_value(s),
    Expr::This => Ok(frame.this_value),

    Expr::Ident(name) => {
      let key = scope.heap_mut().intern(name)?;
      match lookup(vm, scope, frame, key)? {
        Some(value) => Ok(value),
        None => {
          let message = format!("{name} is not defined");
          Err(vm.throw_error(scope, ErrorKind::ReferenceError, &message))
        }
      }
    }

    Expr::Array(elems) => {
      let mut scope = scope.reborrow();
      let mut values = Vec::with_capacity(elems.len());
      for elem in elems {
        let value = eval_expr(vm, &mut scope, frame, elem)?;
        scope.push_root(value);
        values.push(value);
      }
      let proto = vm.realm().intrinsics().array_prototype();
      Ok(Value::Object(scope.alloc_array(Some(proto), &values)?))
    }

    Expr::Object(props) => {
      let proto = vm.realm().intrinsics().object_prototype();
      let mut scope = scope.reborrow();
      let obj = scope.alloc_object(ClassKind::Ordinary, Some(proto))?;
      scope.push_root(Value::Object(obj));

      for (key, value_expr) in props {
        let value = eval_expr(vm, &mut scope, frame, value_expr)?;
        let mut scope = scope.reborrow();
        scope.push_root(value);
        let key = match key {
          PropKey::Ident(name) | PropKey::Str(name) => scope.heap_mut().intern(name)?,
          PropKey::Number(n) => {
            let s = number_to_string(*n);
            scope.heap_mut().intern(&s)?
          }
        };
        scope.define_property(obj, key, PropertyDescriptor::data(value))?;
      }
      Ok(Value::Object(obj))
    }

    Expr::Function(func) | Expr::Arrow(func) => {
      Ok(Value::Object(make_closure(vm, scope, frame, func)?))
    }

    Expr::Unary(op, operand) => eval_unary(vm, scope, frame, *op, operand),

    Expr::Update(op, prefix, target) => {
      let old = eval_expr(vm, scope, frame, target)?;
      let old_n = to_number(scope.heap(), old)?;
      let delta = match op {
        UpdateOp::Inc => 1.0,
        UpdateOp::Dec => -1.0,
      };
      let new = Value::number(old_n + delta);
      assign_to_target(vm, scope, frame, target, new)?;
      Ok(if *prefix { new } else { Value::number(old_n) })
    }

    Expr::Binary(op, lhs, rhs) => {
      let lhs = eval_expr(vm, scope, frame, lhs)?;
      let mut scope = scope.reborrow();
      scope.push_root(lhs);
      let rhs = eval_expr(vm, &mut scope, frame, rhs)?;
      scope.push_root(rhs);
      eval_binary(vm, &mut scope, *op, lhs, rhs)
    }

    Expr::Logical(op, lhs, rhs) => {
      let lhs = eval_expr(vm, scope, frame, lhs)?;
      let lhs_truthy = to_boolean(scope.heap(), lhs)?;
      match op {
        LogicalOp::And if !lhs_truthy => Ok(lhs),
        LogicalOp::Or if lhs_truthy => Ok(lhs),
        _ => eval_expr(vm, scope, frame, rhs),
      }
    }

    Expr::Cond(test, cons, alt) => {
      let test = eval_expr(vm, scope, frame, test)?;
      if to_boolean(scope.heap(), test)? {
        eval_expr(vm, scope, frame, cons)
      } else {
        eval_expr(vm, scope, frame, alt)
      }
    }

    Expr::Assign(op, target, value_expr) => {
      let value = if *op == AssignOp::Assign {
        eval_expr(vm, scope, frame, value_expr)?
      } else {
        let current = eval_expr(vm, scope, frame, target)?;
        let mut scope = scope.reborrow();
        scope.push_root(current);
        let rhs = eval_expr(vm, &mut scope, frame, value_expr)?;
        scope.push_root(rhs);
        let binary = match op {
          AssignOp::Add => BinaryOp::Add,
          AssignOp::Sub => BinaryOp::Sub,
          AssignOp::Mul => BinaryOp::Mul,
          AssignOp::Div => BinaryOp::Div,
          AssignOp::Rem => BinaryOp::Rem,
          AssignOp::Assign => unreachable!(),
        };
        eval_binary(vm, &mut scope, binary, current, rhs)?
      };
      let mut scope = scope.reborrow();
      scope.push_root(value);
      assign_to_target(vm, &mut scope, frame, target, value)?;
      Ok(value)
    }

    Expr::Member(base, key) => {
      let base = eval_expr(vm, scope, frame, base)?;
      let mut scope = scope.reborrow();
      scope.push_root(base);
      member_get(vm, &mut scope, frame, base, key)
    }

    Expr::Call(callee, args) => {
      let mut scope = scope.reborrow();
      let (func, this) = match &**callee {
        Expr::Member(base, key) => {
          let base = eval_expr(vm, &mut scope, frame, base)?;
          scope.push_root(base);
          let func = member_get(vm, &mut scope, frame, base, key)?;
          scope.push_root(func);
          (func, base)
        }
        _ => {
          let func = eval_expr(vm, &mut scope, frame, callee)?;
          scope.push_root(func);
          (func, Value::Undefined)
        }
      };

      let mut values = Vec::with_capacity(args.len());
      for arg in args {
        let value = eval_expr(vm, &mut scope, frame, arg)?;
        scope.push_root(value);
        values.push(value);
      }
      vm.call(&mut scope, func, this, &values)
    }

    Expr::New(callee, args) => {
      let mut scope = scope.reborrow();
      let func = eval_expr(vm, &mut scope, frame, callee)?;
      scope.push_root(func);

      let mut values = Vec::with_capacity(args.len());
      for arg in args {
        let value = eval_expr(vm, &mut scope, frame, arg)?;
        scope.push_root(value);
        values.push(value);
      }
      vm.construct(&mut scope, func, &values)
    }

    Expr::Seq(lhs, rhs) => {
      eval_expr(vm, scope, frame, lhs)?;
      eval_expr(vm, scope, frame, rhs)
    }
  }
}

fn eval_unary(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  frame: Frame,
  op: UnaryOp,
  operand: &Expr,
) -> Result<Value, VmError> {
  // `typeof unresolved` answers "undefined" instead of throwing.
  if op == UnaryOp::Typeof {
    if let Expr::Ident(name) = operand {
      let key = scope.heap_mut().intern(name)?;
      return match lookup(vm, scope, frame, key)? {
        Some(value) => {
          let mut scope = scope.reborrow();
          scope.push_root(value);
          let name = value.type_of(scope.heap());
          scope.alloc_string_value(name)
        }
        None => scope.alloc_string_value("undefined"),
      };
    }
  }

  if op == UnaryOp::Delete {
    let Expr::Member(base, key) = operand else {
      return Err(VmError::InvariantViolation(
        "parser admitted delete of a non-member expression",
      ));
    };
    let base = eval_expr(vm, scope, frame, base)?;
    let mut scope = scope.reborrow();
    scope.push_root(base);
    let Value::Object(obj) = base else {
      return Err(vm.throw_error(
        &mut scope,
        ErrorKind::TypeError,
        "cannot delete properties of a primitive",
      ));
    };
    let key = member_key_atom(vm, &mut scope, frame, key)?;
    return if scope.ordinary_delete(obj, key)? {
      Ok(Value::Bool(true))
    } else {
      Err(vm.throw_error(
        &mut scope,
        ErrorKind::TypeError,
        "cannot delete a non-configurable property",
      ))
    };
  }

  let value = eval_expr(vm, scope, frame, operand)?;
  match op {
    UnaryOp::Neg => Ok(Value::number(-to_number(scope.heap(), value)?)),
    UnaryOp::Plus => Ok(Value::number(to_number(scope.heap(), value)?)),
    UnaryOp::Not => Ok(Value::Bool(!to_boolean(scope.heap(), value)?)),
    UnaryOp::BitNot => Ok(Value::number(!to_int32(scope.heap(), value)? as f64)),
    UnaryOp::Void => Ok(Value::Undefined),
    UnaryOp::Typeof => {
      let mut scope = scope.reborrow();
      scope.push_root(value);
      let name = value.type_of(scope.heap());
      scope.alloc_string_value(name)
    }
    UnaryOp::Delete => unreachable!("handled above"),
  }
}

fn eval_binary(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  op: BinaryOp,
  lhs: Value,
  rhs: Value,
) -> Result<Value, VmError> {
  let heap = scope.heap();
  match op {
    BinaryOp::Add => {
      if lhs.is_string() || rhs.is_string() {
        let mut l = to_string_value(scope, lhs)?;
        l.push_str(&to_string_value(scope, rhs)?);
        scope.alloc_string_value(&l)
      } else {
        Ok(Value::number(
          to_number(heap, lhs)? + to_number(heap, rhs)?,
        ))
      }
    }
    BinaryOp::Sub => Ok(Value::number(to_number(heap, lhs)? - to_number(heap, rhs)?)),
    BinaryOp::Mul => Ok(Value::number(to_number(heap, lhs)? * to_number(heap, rhs)?)),
    BinaryOp::Div => Ok(Value::number(to_number(heap, lhs)? / to_number(heap, rhs)?)),
    BinaryOp::Rem => Ok(Value::number(to_number(heap, lhs)? % to_number(heap, rhs)?)),

    BinaryOp::Eq => Ok(Value::Bool(abstract_equals(heap, lhs, rhs)?)),
    BinaryOp::NotEq => Ok(Value::Bool(!abstract_equals(heap, lhs, rhs)?)),
    BinaryOp::StrictEq => Ok(Value::Bool(lhs.strict_equals(rhs, heap))),
    BinaryOp::StrictNotEq => Ok(Value::Bool(!lhs.strict_equals(rhs, heap))),

    BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
      let result = if lhs.is_string() && rhs.is_string() {
        let mut buf_l = [0u8; 4];
        let mut buf_r = [0u8; 4];
        let l = value_str(lhs, heap, &mut buf_l)?.expect("checked string");
        let r = value_str(rhs, heap, &mut buf_r)?.expect("checked string");
        match op {
          BinaryOp::Lt => l < r,
          BinaryOp::Gt => l > r,
          BinaryOp::LtEq => l <= r,
          _ => l >= r,
        }
      } else {
        let l = to_number(heap, lhs)?;
        let r = to_number(heap, rhs)?;
        match op {
          BinaryOp::Lt => l < r,
          BinaryOp::Gt => l > r,
          BinaryOp::LtEq => l <= r,
          _ => l >= r,
        }
      };
      Ok(Value::Bool(result))
    }

    BinaryOp::BitAnd => Ok(Value::number(
      (to_int32(heap, lhs)? & to_int32(heap, rhs)?) as f64,
    )),
    BinaryOp::BitOr => Ok(Value::number(
      (to_int32(heap, lhs)? | to_int32(heap, rhs)?) as f64,
    )),
    BinaryOp::BitXor => Ok(Value::number(
      (to_int32(heap, lhs)? ^ to_int32(heap, rhs)?) as f64,
    )),
    BinaryOp::Shl => Ok(Value::number(
      (to_int32(heap, lhs)?.wrapping_shl(to_uint32(heap, rhs)? & 31)) as f64,
    )),
    BinaryOp::Shr => Ok(Value::number(
      (to_int32(heap, lhs)?.wrapping_shr(to_uint32(heap, rhs)? & 31)) as f64,
    )),
    BinaryOp::UShr => Ok(Value::number(
      (to_uint32(heap, lhs)?.wrapping_shr(to_uint32(heap, rhs)? & 31)) as f64,
    )),

    BinaryOp::In => {
      let Value::Object(obj) = rhs else {
        return Err(vm.throw_error(
          scope,
          ErrorKind::TypeError,
          "right-hand side of `in` is not an object",
        ));
      };
      let key = to_property_key(scope, lhs)?;
      Ok(Value::Bool(scope.ordinary_has_property(obj, key)?))
    }

    BinaryOp::Instanceof => {
      if !heap.is_callable(rhs)? {
        return Err(vm.throw_error(
          scope,
          ErrorKind::TypeError,
          "right-hand side of `instanceof` is not callable",
        ));
      }
      let Value::Object(ctor) = rhs else {
        unreachable!("callables are objects");
      };
      let proto = scope.ordinary_get(vm, ctor, ATOM_PROTOTYPE, rhs)?;
      let Value::Object(proto) = proto else {
        return Err(vm.throw_error(
          scope,
          ErrorKind::TypeError,
          "constructor has no prototype object",
        ));
      };
      let Value::Object(mut walk) = lhs else {
        return Ok(Value::Bool(false));
      };
      loop {
        match scope.heap().object_prototype(walk)? {
          Some(p) if p == proto => return Ok(Value::Bool(true)),
          Some(p) => walk = p,
          None => return Ok(Value::Bool(false)),
        }
      }
    }
  }
}

// -----------------------------------------------------------------------------------------------
// Identifier and member resolution
// -----------------------------------------------------------------------------------------------

/// Resolves `key` through the environment chain, then the compartment global.
///
/// Returns `None` for a genuinely unbound identifier.
fn lookup(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  frame: Frame,
  key: Atom,
) -> Result<Option<Value>, VmError> {
  let mut env = Some(frame.env);
  while let Some(e) = env {
    if let Some(desc) = scope.heap().object_get_own_property(e, key)? {
      match desc.kind {
        PropertyKind::Data { value, .. } => return Ok(Some(value)),
        PropertyKind::Accessor { .. } => {
          return Err(VmError::InvariantViolation(
            "environment bindings are always data properties",
          ))
        }
      }
    }
    env = scope.heap().object_prototype(e)?;
  }

  let global = frame_global(scope, frame)?;
  if scope.ordinary_has_property(global, key)? {
    return Ok(Some(scope.ordinary_get(
      vm,
      global,
      key,
      Value::Object(global),
    )?));
  }
  Ok(None)
}

/// The compartment global of this frame, read from the chain root's `globalThis` binding.
fn frame_global(scope: &Scope<'_>, frame: Frame) -> Result<GcObject, VmError> {
  let mut env = frame.env;
  loop {
    match scope.heap().object_prototype(env)? {
      Some(parent) => env = parent,
      None => break,
    }
  }
  match scope.heap().object_get_own_property(env, ATOM_GLOBAL_THIS)? {
    Some(PropertyDescriptor {
      kind: PropertyKind::Data {
        value: Value::Object(global),
        ..
      },
      ..
    }) => Ok(global),
    _ => Err(VmError::InvariantViolation(
      "environment chain root lost its globalThis binding",
    )),
  }
}

/// Writes through an assignment target (identifier or member expression).
fn assign_to_target(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  frame: Frame,
  target: &Expr,
  value: Value,
) -> Result<(), VmError> {
  match target {
    Expr::Ident(name) => {
      let mut scope = scope.reborrow();
      scope.push_root(value);
      let key = scope.heap_mut().intern(name)?;

      // Environment chain first.
      let mut env = Some(frame.env);
      while let Some(e) = env {
        if let Some(desc) = scope.heap().object_get_own_property(e, key)? {
          let PropertyKind::Data { writable, .. } = desc.kind else {
            return Err(VmError::InvariantViolation(
              "environment bindings are always data properties",
            ));
          };
          if !writable {
            let message = format!("assignment to constant `{name}`");
            return Err(vm.throw_error(&mut scope, ErrorKind::TypeError, &message));
          }
          return scope.heap_mut().write_data_property_value(e, key, value);
        }
        env = scope.heap().object_prototype(e)?;
      }

      // Then the global object; assigning an undeclared name is a ReferenceError in strict
      // mode.
      let global = frame_global(&scope, frame)?;
      if !scope.ordinary_has_property(global, key)? {
        let message = format!("{name} is not defined");
        return Err(vm.throw_error(&mut scope, ErrorKind::ReferenceError, &message));
      }
      if !scope.ordinary_set(vm, global, key, value, Value::Object(global))? {
        let message = format!("cannot assign to read-only global `{name}`");
        return Err(vm.throw_error(&mut scope, ErrorKind::TypeError, &message));
      }
      Ok(())
    }

    Expr::Member(base, key) => {
      let base = eval_expr(vm, scope, frame, base)?;
      let mut scope = scope.reborrow();
      scope.push_root(base);
      scope.push_root(value);
      let Value::Object(obj) = base else {
        return Err(vm.throw_error(
          &mut scope,
          ErrorKind::TypeError,
          "cannot set properties of a primitive",
        ));
      };
      let key = member_key_atom(vm, &mut scope, frame, key)?;
      if !scope.ordinary_set(vm, obj, key, value, base)? {
        let name = scope.heap().atom_str(key).to_owned();
        let message = format!("cannot set property `{name}`");
        return Err(vm.throw_error(&mut scope, ErrorKind::TypeError, &message));
      }
      Ok(())
    }

    _ => Err(VmError::InvariantViolation(
      "parser admitted an invalid assignment target",
    )),
  }
}

fn member_key_atom(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  frame: Frame,
  key: &MemberKey,
) -> Result<Atom, VmError> {
  match key {
    MemberKey::Static(name) => scope.heap_mut().intern(name),
    MemberKey::Computed(expr) => {
      let value = eval_expr(vm, scope, frame, expr)?;
      let mut scope = scope.reborrow();
      scope.push_root(value);
      to_property_key(&mut scope, value)
    }
  }
}

/// `base[key]`, including the string `length` fast path for primitive strings.
fn member_get(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  frame: Frame,
  base: Value,
  key: &MemberKey,
) -> Result<Value, VmError> {
  let key = member_key_atom(vm, scope, frame, key)?;

  match base {
    Value::Object(obj) => scope.ordinary_get(vm, obj, key, base),
    Value::String(_) | Value::CodePoint(_) => {
      if key == ATOM_LENGTH {
        let len = match base {
          Value::CodePoint(_) => 1,
          Value::String(s) => scope.heap().string_len_code_points(s)?,
          _ => unreachable!(),
        };
        Ok(Value::number(len as f64))
      } else {
        Ok(Value::Undefined)
      }
    }
    Value::Null | Value::Undefined => {
      let name = scope.heap().atom_str(key).to_owned();
      let message = format!("cannot read property `{name}` of {}", if matches!(base, Value::Null) { "null" } else { "undefined" });
      Err(vm.throw_error(scope, ErrorKind::TypeError, &message))
    }
    _ => Ok(Value::Undefined),
  }
}

fn make_closure(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  frame: Frame,
  func: &Rc<Func>,
) -> Result<GcObject, VmError> {
  let intrinsics = *vm.realm().intrinsics();
  let captured_this = func.is_arrow.then_some(frame.this_value);

  let mut scope = scope.reborrow();
  let closure = scope.alloc_object_with_slots(
    ClassKind::Function,
    Some(intrinsics.function_prototype()),
    ecma_function_slots(func.clone(), Some(frame.env), captured_this),
  )?;
  scope.push_root(Value::Object(closure));

  let name_value = scope.alloc_string_value(func.name.as_deref().unwrap_or_default())?;
  scope.push_root(name_value);
  scope.define_property(
    closure,
    ATOM_NAME,
    PropertyDescriptor {
      enumerable: false,
      configurable: true,
      kind: PropertyKind::Data {
        value: name_value,
        writable: false,
      },
    },
  )?;
  scope.define_property(
    closure,
    ATOM_LENGTH,
    PropertyDescriptor {
      enumerable: false,
      configurable: true,
      kind: PropertyKind::Data {
        value: Value::number(func.params.len() as f64),
        writable: false,
      },
    },
  )?;

  if !func.is_arrow {
    let proto = scope.alloc_object(ClassKind::Ordinary, Some(intrinsics.object_prototype()))?;
    let mut scope = scope.reborrow();
    scope.push_root(Value::Object(proto));
    scope.define_property(
      proto,
      crate::atom::ATOM_CONSTRUCTOR,
      PropertyDescriptor {
        enumerable: false,
        configurable: true,
        kind: PropertyKind::Data {
          value: Value::Object(closure),
          writable: true,
        },
      },
    )?;
    scope.define_property(
      closure,
      ATOM_PROTOTYPE,
      PropertyDescriptor {
        enumerable: false,
        configurable: false,
        kind: PropertyKind::Data {
          value: Value::Object(proto),
          writable: true,
        },
      },
    )?;
  }
  Ok(closure)
}

// -----------------------------------------------------------------------------------------------
// Abstract operations
// -----------------------------------------------------------------------------------------------

pub(crate) fn to_boolean(heap: &crate::Heap, value: Value) -> Result<bool, VmError> {
  Ok(match value {
    Value::Undefined | Value::Null => false,
    Value::Bool(b) => b,
    Value::Int(i) => i != 0,
    Value::Float(f) => f != 0.0 && !f.is_nan(),
    Value::CodePoint(_) => true,
    Value::String(s) => !heap.string_str(s)?.is_empty(),
    Value::Object(_) => true,
  })
}

/// ECMAScript `ToNumber`, without `ToPrimitive`: objects convert to NaN.
pub(crate) fn to_number(heap: &crate::Heap, value: Value) -> Result<f64, VmError> {
  Ok(match value {
    Value::Undefined => f64::NAN,
    Value::Null => 0.0,
    Value::Bool(b) => {
      if b {
        1.0
      } else {
        0.0
      }
    }
    Value::Int(i) => i as f64,
    Value::Float(f) => f,
    Value::CodePoint(_) | Value::String(_) => {
      let mut buf = [0u8; 4];
      let s = value_str(value, heap, &mut buf)?.expect("checked string");
      string_to_number(s)
    }
    Value::Object(_) => f64::NAN,
  })
}

fn string_to_number(s: &str) -> f64 {
  let t = s.trim();
  if t.is_empty() {
    return 0.0;
  }
  if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
    return u64::from_str_radix(hex, 16).map(|v| v as f64).unwrap_or(f64::NAN);
  }
  if t == "Infinity" || t == "+Infinity" {
    return f64::INFINITY;
  }
  if t == "-Infinity" {
    return f64::NEG_INFINITY;
  }
  t.parse().unwrap_or(f64::NAN)
}

pub(crate) fn to_int32(heap: &crate::Heap, value: Value) -> Result<i32, VmError> {
  Ok(to_uint32(heap, value)? as i32)
}

pub(crate) fn to_uint32(heap: &crate::Heap, value: Value) -> Result<u32, VmError> {
  let n = to_number(heap, value)?;
  if !n.is_finite() || n == 0.0 {
    return Ok(0);
  }
  let n = n.trunc();
  Ok(n.rem_euclid(4294967296.0) as u32)
}

/// Renders a number the way `ToString` does: integers without a fraction, everything else via
/// the shortest round-trippable form.
pub(crate) fn number_to_string(n: f64) -> String {
  if n.is_nan() {
    return "NaN".to_owned();
  }
  if n.is_infinite() {
    return if n < 0.0 { "-Infinity" } else { "Infinity" }.to_owned();
  }
  if n == 0.0 {
    return "0".to_owned();
  }
  if n.fract() == 0.0 && n.abs() < 1e21 {
    return format!("{n:.0}");
  }
  let mut buf = ryu::Buffer::new();
  let formatted = buf.format(n);
  formatted.strip_suffix(".0").unwrap_or(formatted).to_owned()
}

/// ECMAScript `ToString` without `ToPrimitive`: objects render as `[object Object]`.
pub(crate) fn to_string_value(scope: &Scope<'_>, value: Value) -> Result<String, VmError> {
  Ok(match value {
    Value::Undefined => "undefined".to_owned(),
    Value::Null => "null".to_owned(),
    Value::Bool(true) => "true".to_owned(),
    Value::Bool(false) => "false".to_owned(),
    Value::Int(i) => i.to_string(),
    Value::Float(f) => number_to_string(f),
    Value::CodePoint(c) => c.to_string(),
    Value::String(s) => scope.heap().string_str(s)?.to_owned(),
    Value::Object(_) => "[object Object]".to_owned(),
  })
}

/// `ToPropertyKey`: interns the string form of `value`.
pub(crate) fn to_property_key(scope: &mut Scope<'_>, value: Value) -> Result<Atom, VmError> {
  let mut scope = scope.reborrow();
  scope.push_root(value);
  let s = to_string_value(&scope, value)?;
  scope.heap_mut().intern(&s)
}

/// Abstract equality (`==`) without `ToPrimitive`: an object equals only itself.
fn abstract_equals(heap: &crate::Heap, lhs: Value, rhs: Value) -> Result<bool, VmError> {
  if lhs.strict_equals(rhs, heap) {
    return Ok(true);
  }
  let lhs_nullish = matches!(lhs, Value::Null | Value::Undefined);
  let rhs_nullish = matches!(rhs, Value::Null | Value::Undefined);
  if lhs_nullish || rhs_nullish {
    return Ok(lhs_nullish && rhs_nullish);
  }

  // Number-vs-string and boolean comparisons converge on ToNumber.
  let lhs_numeric = lhs.as_number().is_some() || matches!(lhs, Value::Bool(_));
  let rhs_numeric = rhs.as_number().is_some() || matches!(rhs, Value::Bool(_));
  if (lhs_numeric && (rhs.is_string() || rhs_numeric))
    || (rhs_numeric && (lhs.is_string() || lhs_numeric))
  {
    return Ok(to_number(heap, lhs)? == to_number(heap, rhs)?);
  }
  Ok(false)
}
