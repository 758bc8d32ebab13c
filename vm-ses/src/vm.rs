use crate::atom::ATOM_MESSAGE;
use crate::handle::GcObject;
use crate::heap::{CallKind, ClassKind, ClassSlots, Heap, Scope};
use crate::property::{PropertyDescriptor, PropertyKind};
use crate::realm::Realm;
use crate::value::Value;
use crate::{TerminationReason, VmError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum interpreter call depth before a `StackOverflow` termination.
const MAX_CALL_DEPTH: usize = 256;

/// The script-visible error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Error,
  TypeError,
  RangeError,
  ReferenceError,
  SyntaxError,
}

/// The execution context: realm plus evaluator state.
///
/// The heap is deliberately *not* owned by the `Vm`: hosts create both and pass the heap (or a
/// [`Scope`] over it) into each operation. That keeps borrow lifetimes local and keeps the
/// layering honest, since the heap knows nothing about execution.
pub struct Vm {
  realm: Realm,
  pub(crate) call_depth: usize,
  max_call_depth: usize,
  rng_state: u64,
}

impl Vm {
  /// Creates the context: realm intrinsics and the root compartment, baked onto `heap`.
  pub fn new(heap: &mut Heap) -> Result<Self, VmError> {
    let realm = Realm::new(heap)?;
    let mut vm = Self {
      realm,
      call_depth: 0,
      max_call_depth: MAX_CALL_DEPTH,
      rng_state: rng_seed(),
    };

    // The root compartment needs a `Vm` for option processing, so it is created after the realm.
    let root = {
      let mut scope = heap.scope();
      crate::compartment::alloc_compartment(&mut vm, &mut scope, None)?
    };
    vm.realm.install_root_compartment(heap, root);
    Ok(vm)
  }

  pub fn realm(&self) -> &Realm {
    &self.realm
  }

  pub(crate) fn realm_mut(&mut self) -> &mut Realm {
    &mut self.realm
  }

  /// The root compartment every host-level `evaluate` runs in.
  pub fn root_compartment(&self) -> GcObject {
    self.realm.root_compartment()
  }

  /// Parses and runs `source` in the root compartment, returning the completion value.
  pub fn evaluate(&mut self, heap: &mut Heap, source: &str) -> Result<Value, VmError> {
    let compartment = self.root_compartment();
    let mut scope = heap.scope();
    crate::exec::evaluate_in_compartment(self, &mut scope, compartment, source)
  }

  /// Calls `callee` with the provided `this` value and arguments.
  pub fn call(
    &mut self,
    scope: &mut Scope<'_>,
    callee: Value,
    this: Value,
    args: &[Value],
  ) -> Result<Value, VmError> {
    let Value::Object(func) = callee else {
      return Err(self.throw_error(scope, ErrorKind::TypeError, "callee is not a function"));
    };
    if !scope.heap().object_is_callable(func)? {
      return Err(self.throw_error(scope, ErrorKind::TypeError, "callee is not a function"));
    }

    self.enter_call(scope)?;
    let result = self.call_function_object(scope, func, this, args, false);
    self.call_depth -= 1;
    result
  }

  /// The `new` operator.
  pub fn construct(
    &mut self,
    scope: &mut Scope<'_>,
    callee: Value,
    args: &[Value],
  ) -> Result<Value, VmError> {
    let Value::Object(func) = callee else {
      return Err(self.throw_error(scope, ErrorKind::TypeError, "callee is not a constructor"));
    };
    if !scope.heap().is_constructor(callee)? {
      return Err(self.throw_error(scope, ErrorKind::TypeError, "callee is not a constructor"));
    }

    self.enter_call(scope)?;
    let result = self.construct_function_object(scope, func, args);
    self.call_depth -= 1;
    result
  }

  fn enter_call(&mut self, _scope: &mut Scope<'_>) -> Result<(), VmError> {
    if self.call_depth >= self.max_call_depth {
      return Err(VmError::Termination(TerminationReason::StackOverflow));
    }
    self.call_depth += 1;
    Ok(())
  }

  fn call_function_object(
    &mut self,
    scope: &mut Scope<'_>,
    func: GcObject,
    this: Value,
    args: &[Value],
    is_construct: bool,
  ) -> Result<Value, VmError> {
    enum Target {
      Native(crate::native::NativeFn),
      Ecma(
        std::rc::Rc<parse_ses::Func>,
        Option<GcObject>,
        Option<Value>,
      ),
    }

    let target = match &scope.heap().function_slots(func)?.call {
      CallKind::Native(id) => Target::Native(*id),
      CallKind::Ecma {
        code,
        env,
        captured_this,
      } => Target::Ecma(code.clone(), *env, *captured_this),
    };

    match target {
      Target::Native(id) => {
        crate::builtins::dispatch_native(self, scope, id, this, args, is_construct)
      }
      Target::Ecma(code, env, captured_this) => {
        let this = captured_this.unwrap_or(this);
        crate::exec::call_ecma_function(self, scope, &code, env, this, args)
      }
    }
  }

  fn construct_function_object(
    &mut self,
    scope: &mut Scope<'_>,
    func: GcObject,
    args: &[Value],
  ) -> Result<Value, VmError> {
    let native = match &scope.heap().function_slots(func)?.call {
      CallKind::Native(id) => Some(*id),
      CallKind::Ecma { .. } => None,
    };
    if let Some(id) = native {
      return crate::builtins::dispatch_native(self, scope, id, Value::Undefined, args, true);
    }

    // User constructor: `this` is a fresh ordinary object whose prototype is the function's
    // `prototype` property (falling back to %Object.prototype%).
    let mut scope = scope.reborrow();
    scope.push_root(Value::Object(func));
    for &arg in args {
      scope.push_root(arg);
    }

    let proto_atom = crate::atom::ATOM_PROTOTYPE;
    let proto = match scope.ordinary_get(self, func, proto_atom, Value::Object(func))? {
      Value::Object(p) => p,
      _ => self.realm.intrinsics().object_prototype(),
    };
    let this_obj = scope.alloc_object(ClassKind::Ordinary, Some(proto))?;
    scope.push_root(Value::Object(this_obj));

    let result =
      self.call_function_object(&mut scope, func, Value::Object(this_obj), args, true)?;
    match result {
      Value::Object(_) => Ok(result),
      _ => Ok(Value::Object(this_obj)),
    }
  }

  // -------------------------------------------------------------------------------------------
  // Errors
  // -------------------------------------------------------------------------------------------

  /// Allocates a script-visible error object of the given kind.
  pub fn alloc_error(
    &mut self,
    scope: &mut Scope<'_>,
    kind: ErrorKind,
    message: &str,
  ) -> Result<GcObject, VmError> {
    let proto = self.realm.intrinsics().error_prototype_of(kind);
    let mut scope = scope.reborrow();
    let err = scope.alloc_object(ClassKind::Error, Some(proto))?;
    scope.push_root(Value::Object(err));

    let message = scope.alloc_string_value(message)?;
    scope.push_root(message);
    scope.define_property(
      err,
      ATOM_MESSAGE,
      PropertyDescriptor {
        enumerable: false,
        configurable: true,
        kind: PropertyKind::Data {
          value: message,
          writable: true,
        },
      },
    )?;
    Ok(err)
  }

  /// Builds a thrown error: the returned `VmError` is `Throw(error_object)`.
  ///
  /// If the heap is too exhausted to build the error object, the allocation failure (an
  /// out-of-memory termination) is returned instead.
  pub(crate) fn throw_error(
    &mut self,
    scope: &mut Scope<'_>,
    kind: ErrorKind,
    message: &str,
  ) -> VmError {
    match self.alloc_error(scope, kind, message) {
      Ok(err) => VmError::Throw(Value::Object(err)),
      Err(e) => e,
    }
  }

  /// A pseudo-random f64 in `[0, 1)` for `Math.random`. A small xorshift; quality is not a goal.
  pub(crate) fn next_random(&mut self) -> f64 {
    let mut x = self.rng_state;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    self.rng_state = x;
    (x >> 11) as f64 / (1u64 << 53) as f64
  }

  /// Unregisters the realm's persistent roots. The `Vm` must not be used for execution
  /// afterwards.
  pub fn teardown(&mut self, heap: &mut Heap) {
    self.realm.teardown(heap);
  }
}

fn rng_seed() -> u64 {
  let nanos = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.subsec_nanos() as u64 ^ d.as_secs())
    .unwrap_or(0x9E3779B97F4A7C15);
  nanos | 1
}

/// `ClassSlots` constructors the rest of the crate uses when allocating function objects.
pub(crate) fn native_function_slots(id: crate::native::NativeFn, constructable: bool) -> ClassSlots {
  ClassSlots::Function(crate::heap::FunctionSlots {
    call: CallKind::Native(id),
    constructable,
  })
}

pub(crate) fn ecma_function_slots(
  code: std::rc::Rc<parse_ses::Func>,
  env: Option<GcObject>,
  captured_this: Option<Value>,
) -> ClassSlots {
  let constructable = !code.is_arrow;
  ClassSlots::Function(crate::heap::FunctionSlots {
    call: CallKind::Ecma {
      code,
      env,
      captured_this,
    },
    constructable,
  })
}
