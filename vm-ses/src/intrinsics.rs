use crate::atom::{ATOM_CONSTRUCTOR, ATOM_LENGTH, ATOM_NAME, ATOM_PROTOTYPE};
use crate::handle::{GcObject, RootId};
use crate::heap::{ClassKind, Scope};
use crate::native::NativeFn;
use crate::property::{PropertyDescriptor, PropertyKind};
use crate::value::Value;
use crate::vm::{native_function_slots, ErrorKind};
use crate::VmError;

/// The set of intrinsic constructors and prototypes shared by every compartment of the realm.
///
/// All handles in here are persistent GC roots owned by the [`Realm`](crate::Realm); they are the
/// root set `lockdown` hardens.
#[derive(Debug, Clone, Copy)]
pub struct Intrinsics {
  object_prototype: GcObject,
  object_constructor: GcObject,
  function_prototype: GcObject,
  function_constructor: GcObject,
  array_prototype: GcObject,
  array_constructor: GcObject,
  string_prototype: GcObject,
  string_constructor: GcObject,
  number_prototype: GcObject,
  number_constructor: GcObject,
  boolean_prototype: GcObject,
  boolean_constructor: GcObject,
  error_prototype: GcObject,
  error_constructor: GcObject,
  type_error_prototype: GcObject,
  type_error_constructor: GcObject,
  range_error_prototype: GcObject,
  range_error_constructor: GcObject,
  reference_error_prototype: GcObject,
  reference_error_constructor: GcObject,
  syntax_error_prototype: GcObject,
  syntax_error_constructor: GcObject,
  iterator_prototype: GcObject,
  math: GcObject,
  date_constructor: GcObject,
  parse_int: GcObject,
  parse_float: GcObject,
  is_nan: GcObject,
  is_finite: GcObject,
  compartment_prototype: GcObject,
  compartment_constructor: GcObject,
  harden: GcObject,
  lockdown: GcObject,
}

impl Intrinsics {
  pub(crate) fn init(scope: &mut Scope<'_>, roots: &mut Vec<RootId>) -> Result<Self, VmError> {
    // %Object.prototype% is the root of almost every chain, and %Function.prototype% is the
    // prototype of every function object, so both come first.
    let object_prototype = {
      let obj = scope.alloc_object(ClassKind::Ordinary, None)?;
      roots.push(scope.heap_mut().add_root(Value::Object(obj)));
      obj
    };
    let function_prototype = {
      let func =
        alloc_native_function(scope, NativeFn::FunctionProtoNoop, "", 0, false, object_prototype)?;
      roots.push(scope.heap_mut().add_root(Value::Object(func)));
      func
    };

    let mut b = Builder {
      scope,
      roots,
      function_prototype,
    };

    b.method(object_prototype, "hasOwnProperty", NativeFn::ObjectProtoHasOwnProperty, 1)?;
    b.method(object_prototype, "toString", NativeFn::ObjectProtoToString, 0)?;

    let object_constructor = b.constructor(NativeFn::ObjectConstructor, "Object", 1, object_prototype)?;
    for (name, id, length) in [
      ("keys", NativeFn::ObjectKeys, 1),
      ("create", NativeFn::ObjectCreate, 2),
      ("freeze", NativeFn::ObjectFreeze, 1),
      ("isFrozen", NativeFn::ObjectIsFrozen, 1),
      ("seal", NativeFn::ObjectSeal, 1),
      ("isSealed", NativeFn::ObjectIsSealed, 1),
      ("preventExtensions", NativeFn::ObjectPreventExtensions, 1),
      ("isExtensible", NativeFn::ObjectIsExtensible, 1),
      ("defineProperty", NativeFn::ObjectDefineProperty, 3),
      (
        "getOwnPropertyDescriptor",
        NativeFn::ObjectGetOwnPropertyDescriptor,
        2,
      ),
      ("getOwnPropertyNames", NativeFn::ObjectGetOwnPropertyNames, 1),
      ("getPrototypeOf", NativeFn::ObjectGetPrototypeOf, 1),
      ("setPrototypeOf", NativeFn::ObjectSetPrototypeOf, 2),
    ] {
      b.method(object_constructor, name, id, length)?;
    }

    let function_constructor =
      b.constructor(NativeFn::FunctionConstructor, "Function", 1, function_prototype)?;

    let array_prototype = b.rooted_object(ClassKind::Ordinary, Some(object_prototype))?;
    b.method(array_prototype, "push", NativeFn::ArrayProtoPush, 1)?;
    b.method(array_prototype, "pop", NativeFn::ArrayProtoPop, 0)?;
    b.method(array_prototype, "indexOf", NativeFn::ArrayProtoIndexOf, 1)?;
    b.method(array_prototype, "join", NativeFn::ArrayProtoJoin, 1)?;
    let array_constructor = b.constructor(NativeFn::ArrayConstructor, "Array", 1, array_prototype)?;
    b.method(array_constructor, "isArray", NativeFn::ArrayIsArray, 1)?;

    let string_prototype = b.rooted_object(ClassKind::Ordinary, Some(object_prototype))?;
    let string_constructor =
      b.conversion_constructor(NativeFn::StringConstructor, "String", string_prototype)?;
    let number_prototype = b.rooted_object(ClassKind::Ordinary, Some(object_prototype))?;
    let number_constructor =
      b.conversion_constructor(NativeFn::NumberConstructor, "Number", number_prototype)?;
    let boolean_prototype = b.rooted_object(ClassKind::Ordinary, Some(object_prototype))?;
    let boolean_constructor =
      b.conversion_constructor(NativeFn::BooleanConstructor, "Boolean", boolean_prototype)?;

    let error_prototype = b.error_prototype(object_prototype, "Error")?;
    b.method(error_prototype, "toString", NativeFn::ErrorProtoToString, 0)?;
    let error_constructor =
      b.constructor(NativeFn::ErrorConstructor, "Error", 1, error_prototype)?;

    let type_error_prototype = b.error_prototype(error_prototype, "TypeError")?;
    let type_error_constructor =
      b.constructor(NativeFn::TypeErrorConstructor, "TypeError", 1, type_error_prototype)?;
    let range_error_prototype = b.error_prototype(error_prototype, "RangeError")?;
    let range_error_constructor =
      b.constructor(NativeFn::RangeErrorConstructor, "RangeError", 1, range_error_prototype)?;
    let reference_error_prototype = b.error_prototype(error_prototype, "ReferenceError")?;
    let reference_error_constructor = b.constructor(
      NativeFn::ReferenceErrorConstructor,
      "ReferenceError",
      1,
      reference_error_prototype,
    )?;
    let syntax_error_prototype = b.error_prototype(error_prototype, "SyntaxError")?;
    let syntax_error_constructor = b.constructor(
      NativeFn::SyntaxErrorConstructor,
      "SyntaxError",
      1,
      syntax_error_prototype,
    )?;

    let iterator_prototype = b.rooted_object(ClassKind::Ordinary, Some(object_prototype))?;

    let math = b.rooted_object(ClassKind::Ordinary, Some(object_prototype))?;
    for (name, id, length) in [
      ("abs", NativeFn::MathAbs, 1),
      ("ceil", NativeFn::MathCeil, 1),
      ("floor", NativeFn::MathFloor, 1),
      ("max", NativeFn::MathMax, 2),
      ("min", NativeFn::MathMin, 2),
      ("pow", NativeFn::MathPow, 2),
      ("random", NativeFn::MathRandom, 0),
      ("sqrt", NativeFn::MathSqrt, 1),
      ("trunc", NativeFn::MathTrunc, 1),
    ] {
      b.method(math, name, id, length)?;
    }
    b.constant(math, "PI", Value::Float(std::f64::consts::PI))?;
    b.constant(math, "E", Value::Float(std::f64::consts::E))?;

    // `Date` carries only `Date.now`; constructing dates is not part of the core.
    let date_constructor = b.rooted_native(NativeFn::DateConstructor, "Date", 0, false, function_prototype)?;
    b.method(date_constructor, "now", NativeFn::DateNow, 0)?;

    let parse_int = b.rooted_native(NativeFn::ParseInt, "parseInt", 2, false, function_prototype)?;
    let parse_float =
      b.rooted_native(NativeFn::ParseFloat, "parseFloat", 1, false, function_prototype)?;
    let is_nan = b.rooted_native(NativeFn::IsNaN, "isNaN", 1, false, function_prototype)?;
    let is_finite = b.rooted_native(NativeFn::IsFinite, "isFinite", 1, false, function_prototype)?;

    let compartment_prototype = b.rooted_object(ClassKind::Ordinary, Some(object_prototype))?;
    b.method(
      compartment_prototype,
      "evaluate",
      NativeFn::CompartmentProtoEvaluate,
      1,
    )?;
    b.accessor(
      compartment_prototype,
      "globalThis",
      NativeFn::CompartmentProtoGlobalThis,
    )?;
    let compartment_constructor = b.constructor(
      NativeFn::CompartmentConstructor,
      "Compartment",
      1,
      compartment_prototype,
    )?;

    let harden = b.rooted_native(NativeFn::Harden, "harden", 1, false, function_prototype)?;
    let lockdown = b.rooted_native(NativeFn::Lockdown, "lockdown", 0, false, function_prototype)?;

    Ok(Self {
      object_prototype,
      object_constructor,
      function_prototype,
      function_constructor,
      array_prototype,
      array_constructor,
      string_prototype,
      string_constructor,
      number_prototype,
      number_constructor,
      boolean_prototype,
      boolean_constructor,
      error_prototype,
      error_constructor,
      type_error_prototype,
      type_error_constructor,
      range_error_prototype,
      range_error_constructor,
      reference_error_prototype,
      reference_error_constructor,
      syntax_error_prototype,
      syntax_error_constructor,
      iterator_prototype,
      math,
      date_constructor,
      parse_int,
      parse_float,
      is_nan,
      is_finite,
      compartment_prototype,
      compartment_constructor,
      harden,
      lockdown,
    })
  }

  pub fn object_prototype(&self) -> GcObject {
    self.object_prototype
  }

  pub fn function_prototype(&self) -> GcObject {
    self.function_prototype
  }

  pub fn array_prototype(&self) -> GcObject {
    self.array_prototype
  }

  pub fn compartment_prototype(&self) -> GcObject {
    self.compartment_prototype
  }

  pub fn harden_function(&self) -> GcObject {
    self.harden
  }

  /// The prototype installed on objects of the given class.
  pub fn class_prototype(&self, class: ClassKind) -> Option<GcObject> {
    match class {
      ClassKind::Ordinary | ClassKind::Arguments => Some(self.object_prototype),
      ClassKind::Array => Some(self.array_prototype),
      ClassKind::Function => Some(self.function_prototype),
      ClassKind::Error => Some(self.error_prototype),
      ClassKind::Compartment => Some(self.compartment_prototype),
      ClassKind::Environment => None,
    }
  }

  pub(crate) fn error_prototype_of(&self, kind: ErrorKind) -> GcObject {
    match kind {
      ErrorKind::Error => self.error_prototype,
      ErrorKind::TypeError => self.type_error_prototype,
      ErrorKind::RangeError => self.range_error_prototype,
      ErrorKind::ReferenceError => self.reference_error_prototype,
      ErrorKind::SyntaxError => self.syntax_error_prototype,
    }
  }

  /// The global bindings every compartment's `globalThis` receives, in installation order.
  pub(crate) fn global_bindings(&self) -> [(&'static str, GcObject); 20] {
    [
      ("Object", self.object_constructor),
      ("Function", self.function_constructor),
      ("Array", self.array_constructor),
      ("String", self.string_constructor),
      ("Number", self.number_constructor),
      ("Boolean", self.boolean_constructor),
      ("Error", self.error_constructor),
      ("TypeError", self.type_error_constructor),
      ("RangeError", self.range_error_constructor),
      ("ReferenceError", self.reference_error_constructor),
      ("SyntaxError", self.syntax_error_constructor),
      ("Math", self.math),
      ("Date", self.date_constructor),
      ("parseInt", self.parse_int),
      ("parseFloat", self.parse_float),
      ("isNaN", self.is_nan),
      ("isFinite", self.is_finite),
      ("Compartment", self.compartment_constructor),
      ("harden", self.harden),
      ("lockdown", self.lockdown),
    ]
  }

  /// The intrinsic root set `lockdown` hardens: every prototype, every constructor, the hidden
  /// intrinsics, and the `harden`/`lockdown` functions themselves.
  pub(crate) fn all_roots(&self) -> [GcObject; 33] {
    [
      self.object_prototype,
      self.object_constructor,
      self.function_prototype,
      self.function_constructor,
      self.array_prototype,
      self.array_constructor,
      self.string_prototype,
      self.string_constructor,
      self.number_prototype,
      self.number_constructor,
      self.boolean_prototype,
      self.boolean_constructor,
      self.error_prototype,
      self.error_constructor,
      self.type_error_prototype,
      self.type_error_constructor,
      self.range_error_prototype,
      self.range_error_constructor,
      self.reference_error_prototype,
      self.reference_error_constructor,
      self.syntax_error_prototype,
      self.syntax_error_constructor,
      self.iterator_prototype,
      self.math,
      self.date_constructor,
      self.parse_int,
      self.parse_float,
      self.is_nan,
      self.is_finite,
      self.compartment_prototype,
      self.compartment_constructor,
      self.harden,
      self.lockdown,
    ]
  }
}

struct Builder<'a, 'h> {
  scope: &'a mut Scope<'h>,
  roots: &'a mut Vec<RootId>,
  function_prototype: GcObject,
}

impl<'a, 'h> Builder<'a, 'h> {
  fn rooted_object(
    &mut self,
    class: ClassKind,
    prototype: Option<GcObject>,
  ) -> Result<GcObject, VmError> {
    let obj = self.scope.alloc_object(class, prototype)?;
    self
      .roots
      .push(self.scope.heap_mut().add_root(Value::Object(obj)));
    Ok(obj)
  }

  fn rooted_native(
    &mut self,
    id: NativeFn,
    name: &str,
    length: u32,
    constructable: bool,
    function_prototype: GcObject,
  ) -> Result<GcObject, VmError> {
    let func = alloc_native_function(
      self.scope,
      id,
      name,
      length,
      constructable,
      function_prototype,
    )?;
    self
      .roots
      .push(self.scope.heap_mut().add_root(Value::Object(func)));
    Ok(func)
  }

  /// Installs a method property: `{ value, writable: true, enumerable: false,
  /// configurable: true }`, the standard built-in attributes.
  fn method(
    &mut self,
    target: GcObject,
    name: &str,
    id: NativeFn,
    length: u32,
  ) -> Result<(), VmError> {
    let function_prototype = self.function_prototype;
    let func = alloc_native_function(self.scope, id, name, length, false, function_prototype)?;
    let mut scope = self.scope.reborrow();
    scope.push_root(Value::Object(func));
    let key = scope.heap_mut().intern(name)?;
    scope.define_property(
      target,
      key,
      PropertyDescriptor {
        enumerable: false,
        configurable: true,
        kind: PropertyKind::Data {
          value: Value::Object(func),
          writable: true,
        },
      },
    )
  }

  /// Installs an accessor property whose getter is a native function and whose setter is
  /// undefined.
  fn accessor(&mut self, target: GcObject, name: &str, getter: NativeFn) -> Result<(), VmError> {
    let function_prototype = self.function_prototype;
    let get = alloc_native_function(self.scope, getter, name, 0, false, function_prototype)?;
    let mut scope = self.scope.reborrow();
    scope.push_root(Value::Object(get));
    let key = scope.heap_mut().intern(name)?;
    scope.define_property(
      target,
      key,
      PropertyDescriptor {
        enumerable: false,
        configurable: true,
        kind: PropertyKind::Accessor {
          get: Value::Object(get),
          set: Value::Undefined,
        },
      },
    )
  }

  fn constant(&mut self, target: GcObject, name: &str, value: Value) -> Result<(), VmError> {
    let key = self.scope.heap_mut().intern(name)?;
    self.scope.define_property(
      target,
      key,
      PropertyDescriptor {
        enumerable: false,
        configurable: false,
        kind: PropertyKind::Data {
          value,
          writable: false,
        },
      },
    )
  }

  /// A rooted constructor function wired to its prototype object both ways.
  fn constructor(
    &mut self,
    id: NativeFn,
    name: &str,
    length: u32,
    prototype: GcObject,
  ) -> Result<GcObject, VmError> {
    let func = self.rooted_native(id, name, length, true, self.function_prototype)?;

    self.scope.define_property(
      func,
      ATOM_PROTOTYPE,
      PropertyDescriptor {
        enumerable: false,
        configurable: false,
        kind: PropertyKind::Data {
          value: Value::Object(prototype),
          writable: false,
        },
      },
    )?;
    self.scope.define_property(
      prototype,
      ATOM_CONSTRUCTOR,
      PropertyDescriptor {
        enumerable: false,
        configurable: true,
        kind: PropertyKind::Data {
          value: Value::Object(func),
          writable: true,
        },
      },
    )?;
    Ok(func)
  }

  /// `String` / `Number` / `Boolean`: callable conversions that are not constructable (the
  /// subset has no value boxing).
  fn conversion_constructor(
    &mut self,
    id: NativeFn,
    name: &str,
    prototype: GcObject,
  ) -> Result<GcObject, VmError> {
    let func = self.rooted_native(id, name, 1, false, self.function_prototype)?;
    self.scope.define_property(
      func,
      ATOM_PROTOTYPE,
      PropertyDescriptor {
        enumerable: false,
        configurable: false,
        kind: PropertyKind::Data {
          value: Value::Object(prototype),
          writable: false,
        },
      },
    )?;
    self.scope.define_property(
      prototype,
      ATOM_CONSTRUCTOR,
      PropertyDescriptor {
        enumerable: false,
        configurable: true,
        kind: PropertyKind::Data {
          value: Value::Object(func),
          writable: true,
        },
      },
    )?;
    Ok(func)
  }

  /// An error-family prototype with its `name` and empty `message` defaults.
  fn error_prototype(&mut self, parent: GcObject, name: &str) -> Result<GcObject, VmError> {
    let proto = self.rooted_object(ClassKind::Ordinary, Some(parent))?;
    let mut scope = self.scope.reborrow();
    let name_value = scope.alloc_string_value(name)?;
    scope.push_root(name_value);
    scope.define_property(
      proto,
      ATOM_NAME,
      PropertyDescriptor {
        enumerable: false,
        configurable: true,
        kind: PropertyKind::Data {
          value: name_value,
          writable: true,
        },
      },
    )?;
    let empty = scope.alloc_string_value("")?;
    scope.push_root(empty);
    scope.define_property(
      proto,
      crate::atom::ATOM_MESSAGE,
      PropertyDescriptor {
        enumerable: false,
        configurable: true,
        kind: PropertyKind::Data {
          value: empty,
          writable: true,
        },
      },
    )?;
    Ok(proto)
  }
}

/// Allocates a native function object with standard `name` and `length` properties.
pub(crate) fn alloc_native_function(
  scope: &mut Scope<'_>,
  id: NativeFn,
  name: &str,
  length: u32,
  constructable: bool,
  function_prototype: GcObject,
) -> Result<GcObject, VmError> {
  let func = scope.alloc_object_with_slots(
    ClassKind::Function,
    Some(function_prototype),
    native_function_slots(id, constructable),
  )?;

  let mut scope = scope.reborrow();
  scope.push_root(Value::Object(func));

  let name_value = scope.alloc_string_value(name)?;
  scope.push_root(name_value);
  scope.define_property(
    func,
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
    func,
    ATOM_LENGTH,
    PropertyDescriptor {
      enumerable: false,
      configurable: true,
      kind: PropertyKind::Data {
        value: Value::Int(length as i32),
        writable: false,
      },
    },
  )?;
  Ok(func)
}
