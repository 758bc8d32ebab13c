//! Compartments: per-instance globals and lexical records over the shared realm.

use crate::atom::{ATOM_GLOBALS, ATOM_GLOBAL_LEXICALS, ATOM_GLOBAL_THIS};
use crate::handle::GcObject;
use crate::heap::{ClassKind, ClassSlots, CompartmentSlots, Scope};
use crate::property::{PropertyDescriptor, PropertyKind};
use crate::value::Value;
use crate::vm::Vm;
use crate::VmError;

/// Creates a compartment: its own `globalThis` (prototype `%Object.prototype%` from the shared
/// realm), its own lexical record, and the standard global bindings.
///
/// `options` handling per the construction contract: the own enumerable string-keyed properties
/// of `globals` become writable/enumerable/configurable data properties of the new global; the
/// same enumeration of `globalLexicals` becomes lexical bindings whose mutability follows the
/// source descriptor's `writable`. Every other option key is ignored.
pub(crate) fn alloc_compartment(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  options: Option<Value>,
) -> Result<GcObject, VmError> {
  let intrinsics = *vm.realm().intrinsics();

  let mut scope = scope.reborrow();
  if let Some(options) = options {
    scope.push_root(options);
  }

  let global = scope.alloc_object(ClassKind::Ordinary, Some(intrinsics.object_prototype()))?;
  scope.push_root(Value::Object(global));
  let lexicals = scope.alloc_object(ClassKind::Environment, None)?;
  scope.push_root(Value::Object(lexicals));

  install_standard_globals(&mut scope, &intrinsics, global)?;

  let mut has_lexicals = false;
  if let Some(Value::Object(opts)) = options {
    if let Value::Object(source) = scope.ordinary_get(vm, opts, ATOM_GLOBALS, Value::Object(opts))? {
      copy_globals(vm, &mut scope, source, global)?;
    }
    if let Value::Object(source) =
      scope.ordinary_get(vm, opts, ATOM_GLOBAL_LEXICALS, Value::Object(opts))?
    {
      has_lexicals = copy_lexicals(vm, &mut scope, source, lexicals)?;
    }
  }

  // The chain-root binding function frames resolve their global through. Installed after option
  // processing so a hostile `globalLexicals` key cannot redirect global resolution.
  scope.define_property(
    lexicals,
    ATOM_GLOBAL_THIS,
    PropertyDescriptor {
      enumerable: false,
      configurable: false,
      kind: PropertyKind::Data {
        value: Value::Object(global),
        writable: false,
      },
    },
  )?;

  scope.alloc_object_with_slots(
    ClassKind::Compartment,
    Some(intrinsics.compartment_prototype()),
    ClassSlots::Compartment(CompartmentSlots {
      global,
      lexicals,
      has_lexicals,
    }),
  )
}

/// Installs the standard bindings every compartment's global receives: the shared intrinsic
/// constructors and namespaces, `globalThis`, and the value constants.
fn install_standard_globals(
  scope: &mut Scope<'_>,
  intrinsics: &crate::Intrinsics,
  global: GcObject,
) -> Result<(), VmError> {
  for (name, obj) in intrinsics.global_bindings() {
    let key = scope.heap_mut().intern(name)?;
    scope.define_property(
      global,
      key,
      PropertyDescriptor {
        enumerable: false,
        configurable: true,
        kind: PropertyKind::Data {
          value: Value::Object(obj),
          writable: true,
        },
      },
    )?;
  }

  scope.define_property(
    global,
    ATOM_GLOBAL_THIS,
    PropertyDescriptor {
      enumerable: false,
      configurable: true,
      kind: PropertyKind::Data {
        value: Value::Object(global),
        writable: true,
      },
    },
  )?;

  for (atom, value) in [
    (crate::atom::ATOM_UNDEFINED, Value::Undefined),
    (crate::atom::ATOM_NAN, Value::Float(f64::NAN)),
    (crate::atom::ATOM_INFINITY, Value::Float(f64::INFINITY)),
  ] {
    scope.define_property(
      global,
      atom,
      PropertyDescriptor {
        enumerable: false,
        configurable: false,
        kind: PropertyKind::Data {
          value,
          writable: false,
        },
      },
    )?;
  }
  Ok(())
}

/// Copies the own enumerable properties of `source` onto `target` as fresh
/// writable/enumerable/configurable data properties. Getters on `source` are invoked.
fn copy_globals(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  source: GcObject,
  target: GcObject,
) -> Result<(), VmError> {
  for key in scope.heap().object_own_keys(source)? {
    let Some(desc) = scope.heap().object_get_own_property(source, key)? else {
      continue;
    };
    if !desc.enumerable {
      continue;
    }
    let value = scope.ordinary_get(vm, source, key, Value::Object(source))?;
    let mut scope = scope.reborrow();
    scope.push_root(value);
    scope.define_property(target, key, PropertyDescriptor::data(value))?;
  }
  Ok(())
}

/// Same enumeration as [`copy_globals`], but entries become lexical bindings: writable source
/// descriptors produce mutable bindings, non-writable ones immutable bindings.
///
/// Returns whether at least one binding was created (which decides top-level `this`).
fn copy_lexicals(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  source: GcObject,
  lexicals: GcObject,
) -> Result<bool, VmError> {
  let mut any = false;
  for key in scope.heap().object_own_keys(source)? {
    let Some(desc) = scope.heap().object_get_own_property(source, key)? else {
      continue;
    };
    if !desc.enumerable {
      continue;
    }
    let writable = match desc.kind {
      PropertyKind::Data { writable, .. } => writable,
      PropertyKind::Accessor { .. } => true,
    };
    let value = scope.ordinary_get(vm, source, key, Value::Object(source))?;
    let mut scope = scope.reborrow();
    scope.push_root(value);
    scope.define_property(
      lexicals,
      key,
      PropertyDescriptor {
        enumerable: true,
        configurable: false,
        kind: PropertyKind::Data { value, writable },
      },
    )?;
    any = true;
  }
  Ok(any)
}
