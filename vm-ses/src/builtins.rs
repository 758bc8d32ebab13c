//! Native function implementations and the dispatch table.

use crate::atom::{
  ATOM_CONFIGURABLE, ATOM_ENUMERABLE, ATOM_GET, ATOM_LENGTH, ATOM_MESSAGE, ATOM_NAME, ATOM_SET,
  ATOM_VALUE, ATOM_WRITABLE,
};
use crate::exec::{
  evaluate_in_compartment, to_boolean, to_number, to_property_key, to_string_value,
};
use crate::handle::GcObject;
use crate::heap::{ClassKind, Scope};
use crate::native::NativeFn;
use crate::object_ops::array_length;
use crate::property::{PropertyDescriptor, PropertyDescriptorPatch, PropertyKind};
use crate::value::{value_str, Value};
use crate::vm::{ErrorKind, Vm};
use crate::VmError;
use std::time::{SystemTime, UNIX_EPOCH};

fn arg(args: &[Value], i: usize) -> Value {
  args.get(i).copied().unwrap_or(Value::Undefined)
}

fn require_object(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  value: Value,
  what: &str,
) -> Result<GcObject, VmError> {
  match value {
    Value::Object(obj) => Ok(obj),
    _ => {
      let message = format!("{what} is not an object");
      Err(vm.throw_error(scope, ErrorKind::TypeError, &message))
    }
  }
}

pub(crate) fn dispatch_native(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  id: NativeFn,
  this: Value,
  args: &[Value],
  is_construct: bool,
) -> Result<Value, VmError> {
  match id {
    NativeFn::FunctionProtoNoop => Ok(Value::Undefined),
    NativeFn::FunctionConstructor => Err(vm.throw_error(
      scope,
      ErrorKind::TypeError,
      "the Function constructor is not available",
    )),

    NativeFn::ObjectConstructor => match arg(args, 0) {
      Value::Object(obj) => Ok(Value::Object(obj)),
      _ => {
        let proto = vm.realm().intrinsics().object_prototype();
        Ok(Value::Object(
          scope.alloc_object(ClassKind::Ordinary, Some(proto))?,
        ))
      }
    },

    NativeFn::ObjectKeys => {
      let obj = require_object(vm, scope, arg(args, 0), "Object.keys target")?;
      let mut scope = scope.reborrow();
      scope.push_root(Value::Object(obj));

      let keys = scope.heap().object_own_keys(obj)?;
      let mut names = Vec::new();
      for key in keys {
        let Some(desc) = scope.heap().object_get_own_property(obj, key)? else {
          continue;
        };
        if desc.enumerable {
          let value = scope.atom_value(key)?;
          scope.push_root(value);
          names.push(value);
        }
      }
      let proto = vm.realm().intrinsics().array_prototype();
      Ok(Value::Object(scope.alloc_array(Some(proto), &names)?))
    }

    NativeFn::ObjectGetOwnPropertyNames => {
      let obj = require_object(vm, scope, arg(args, 0), "Object.getOwnPropertyNames target")?;
      let mut scope = scope.reborrow();
      scope.push_root(Value::Object(obj));

      let keys = scope.heap().object_own_keys(obj)?;
      let mut names = Vec::new();
      for key in keys {
        let value = scope.atom_value(key)?;
        scope.push_root(value);
        names.push(value);
      }
      let proto = vm.realm().intrinsics().array_prototype();
      Ok(Value::Object(scope.alloc_array(Some(proto), &names)?))
    }

    NativeFn::ObjectCreate => {
      let proto = match arg(args, 0) {
        Value::Object(proto) => Some(proto),
        Value::Null => None,
        _ => {
          return Err(vm.throw_error(
            scope,
            ErrorKind::TypeError,
            "Object.create prototype must be an object or null",
          ))
        }
      };
      let mut scope = scope.reborrow();
      let obj = scope.alloc_object(ClassKind::Ordinary, proto)?;
      scope.push_root(Value::Object(obj));

      if let Value::Object(props) = arg(args, 1) {
        for key in scope.heap().object_own_keys(props)? {
          let Some(desc) = scope.heap().object_get_own_property(props, key)? else {
            continue;
          };
          if !desc.enumerable {
            continue;
          }
          let desc_value = scope.ordinary_get(vm, props, key, Value::Object(props))?;
          let mut scope = scope.reborrow();
          scope.push_root(desc_value);
          let patch = to_descriptor_patch(vm, &mut scope, desc_value)?;
          if !scope.define_own_property(obj, key, patch)? {
            return Err(vm.throw_error(&mut scope, ErrorKind::TypeError, "property definition rejected"));
          }
        }
      }
      Ok(Value::Object(obj))
    }

    NativeFn::ObjectFreeze => match arg(args, 0) {
      Value::Object(obj) => {
        scope.freeze(obj)?;
        Ok(Value::Object(obj))
      }
      other => Ok(other),
    },
    NativeFn::ObjectIsFrozen => match arg(args, 0) {
      Value::Object(obj) => Ok(Value::Bool(scope.is_frozen(obj)?)),
      _ => Ok(Value::Bool(true)),
    },
    NativeFn::ObjectSeal => match arg(args, 0) {
      Value::Object(obj) => {
        scope.seal(obj)?;
        Ok(Value::Object(obj))
      }
      other => Ok(other),
    },
    NativeFn::ObjectIsSealed => match arg(args, 0) {
      Value::Object(obj) => Ok(Value::Bool(scope.is_sealed(obj)?)),
      _ => Ok(Value::Bool(true)),
    },
    NativeFn::ObjectPreventExtensions => match arg(args, 0) {
      Value::Object(obj) => {
        scope.prevent_extensions(obj)?;
        Ok(Value::Object(obj))
      }
      other => Ok(other),
    },
    NativeFn::ObjectIsExtensible => match arg(args, 0) {
      Value::Object(obj) => Ok(Value::Bool(scope.heap().object_is_extensible(obj)?)),
      _ => Ok(Value::Bool(false)),
    },

    NativeFn::ObjectDefineProperty => {
      let obj = require_object(vm, scope, arg(args, 0), "Object.defineProperty target")?;
      let mut scope = scope.reborrow();
      scope.push_root(Value::Object(obj));
      scope.push_root(arg(args, 2));

      let key = to_property_key(&mut scope, arg(args, 1))?;
      let patch = to_descriptor_patch(vm, &mut scope, arg(args, 2))?;
      if !scope.define_own_property(obj, key, patch)? {
        let name = scope.heap().atom_str(key).to_owned();
        let message = format!("cannot define property `{name}`");
        return Err(vm.throw_error(&mut scope, ErrorKind::TypeError, &message));
      }
      Ok(Value::Object(obj))
    }

    NativeFn::ObjectGetOwnPropertyDescriptor => {
      let obj = require_object(vm, scope, arg(args, 0), "Object.getOwnPropertyDescriptor target")?;
      let mut scope = scope.reborrow();
      scope.push_root(Value::Object(obj));

      let key = to_property_key(&mut scope, arg(args, 1))?;
      match scope.heap().object_get_own_property(obj, key)? {
        None => Ok(Value::Undefined),
        Some(desc) => Ok(Value::Object(descriptor_to_object(vm, &mut scope, desc)?)),
      }
    }

    NativeFn::ObjectGetPrototypeOf => {
      let obj = require_object(vm, scope, arg(args, 0), "Object.getPrototypeOf target")?;
      Ok(match scope.heap().object_prototype(obj)? {
        Some(proto) => Value::Object(proto),
        None => Value::Null,
      })
    }

    NativeFn::ObjectSetPrototypeOf => {
      let obj = require_object(vm, scope, arg(args, 0), "Object.setPrototypeOf target")?;
      let proto = match arg(args, 1) {
        Value::Object(proto) => Some(proto),
        Value::Null => None,
        _ => {
          return Err(vm.throw_error(
            scope,
            ErrorKind::TypeError,
            "prototype must be an object or null",
          ))
        }
      };
      if !scope.set_prototype(obj, proto)? {
        return Err(vm.throw_error(
          scope,
          ErrorKind::TypeError,
          "cannot change the prototype of this object",
        ));
      }
      Ok(Value::Object(obj))
    }

    NativeFn::ObjectProtoHasOwnProperty => {
      let obj = require_object(vm, scope, this, "hasOwnProperty receiver")?;
      let mut scope = scope.reborrow();
      scope.push_root(this);
      let key = to_property_key(&mut scope, arg(args, 0))?;
      Ok(Value::Bool(
        scope.heap().object_get_own_property(obj, key)?.is_some(),
      ))
    }

    NativeFn::ObjectProtoToString => scope.alloc_string_value("[object Object]"),

    NativeFn::ArrayConstructor => {
      let proto = vm.realm().intrinsics().array_prototype();
      if args.len() == 1 {
        if arg(args, 0).as_number().is_some() {
          // `Array(n)` would create n holes, which the subset forbids.
          return Err(vm.throw_error(
            scope,
            ErrorKind::TypeError,
            "preallocated arrays are not supported (no holes)",
          ));
        }
      }
      let mut scope = scope.reborrow();
      for &v in args {
        scope.push_root(v);
      }
      Ok(Value::Object(scope.alloc_array(Some(proto), args)?))
    }

    NativeFn::ArrayIsArray => Ok(Value::Bool(match arg(args, 0) {
      Value::Object(obj) => scope.heap().object_class(obj)? == ClassKind::Array,
      _ => false,
    })),

    NativeFn::ArrayProtoPush => {
      let obj = require_array(vm, scope, this, "push")?;
      let mut scope = scope.reborrow();
      scope.push_root(this);
      for &v in args {
        if !scope.array_append(obj, v)? {
          return Err(vm.throw_error(
            &mut scope,
            ErrorKind::TypeError,
            "cannot add a property to this array",
          ));
        }
      }
      Ok(Value::number(array_length(scope.heap(), obj)? as f64))
    }

    NativeFn::ArrayProtoPop => {
      let obj = require_array(vm, scope, this, "pop")?;
      let mut scope = scope.reborrow();
      scope.push_root(this);

      let len = array_length(scope.heap(), obj)?;
      if len == 0 {
        return Ok(Value::Undefined);
      }
      let key = {
        let s = (len - 1).to_string();
        scope.heap_mut().intern(&s)?
      };
      let element = scope.ordinary_get(vm, obj, key, this)?;
      scope.push_root(element);

      if !scope.ordinary_delete(obj, key)? {
        return Err(vm.throw_error(
          &mut scope,
          ErrorKind::TypeError,
          "cannot remove the last element of this array",
        ));
      }
      let ok = scope.ordinary_define_own_property(
        obj,
        ATOM_LENGTH,
        PropertyDescriptorPatch {
          value: Some(Value::number((len - 1) as f64)),
          ..Default::default()
        },
      )?;
      if !ok {
        return Err(vm.throw_error(&mut scope, ErrorKind::TypeError, "cannot shrink this array"));
      }
      Ok(element)
    }

    NativeFn::ArrayProtoIndexOf => {
      let obj = require_array(vm, scope, this, "indexOf")?;
      let needle = arg(args, 0);
      let len = array_length(scope.heap(), obj)?;
      let mut scope = scope.reborrow();
      scope.push_root(this);
      scope.push_root(needle);
      for i in 0..len {
        let key = {
          let s = i.to_string();
          scope.heap_mut().intern(&s)?
        };
        let element = scope.ordinary_get(vm, obj, key, this)?;
        if element.strict_equals(needle, scope.heap()) {
          return Ok(Value::number(i as f64));
        }
      }
      Ok(Value::Int(-1))
    }

    NativeFn::ArrayProtoJoin => {
      let obj = require_array(vm, scope, this, "join")?;
      let mut scope = scope.reborrow();
      scope.push_root(this);
      scope.push_root(arg(args, 0));

      let separator = match arg(args, 0) {
        Value::Undefined => ",".to_owned(),
        sep => to_string_value(&scope, sep)?,
      };
      let len = array_length(scope.heap(), obj)?;
      let mut out = String::new();
      for i in 0..len {
        if i > 0 {
          out.push_str(&separator);
        }
        let key = {
          let s = i.to_string();
          scope.heap_mut().intern(&s)?
        };
        let element = scope.ordinary_get(vm, obj, key, this)?;
        if !matches!(element, Value::Undefined | Value::Null) {
          out.push_str(&to_string_value(&scope, element)?);
        }
      }
      scope.alloc_string_value(&out)
    }

    NativeFn::StringConstructor => {
      let s = match args.first() {
        None => String::new(),
        Some(&v) => to_string_value(scope, v)?,
      };
      scope.alloc_string_value(&s)
    }
    NativeFn::NumberConstructor => Ok(Value::number(to_number(scope.heap(), arg(args, 0))?)),
    NativeFn::BooleanConstructor => Ok(Value::Bool(to_boolean(scope.heap(), arg(args, 0))?)),

    NativeFn::ErrorConstructor => alloc_error_from_args(vm, scope, ErrorKind::Error, args),
    NativeFn::TypeErrorConstructor => alloc_error_from_args(vm, scope, ErrorKind::TypeError, args),
    NativeFn::RangeErrorConstructor => {
      alloc_error_from_args(vm, scope, ErrorKind::RangeError, args)
    }
    NativeFn::ReferenceErrorConstructor => {
      alloc_error_from_args(vm, scope, ErrorKind::ReferenceError, args)
    }
    NativeFn::SyntaxErrorConstructor => {
      alloc_error_from_args(vm, scope, ErrorKind::SyntaxError, args)
    }

    NativeFn::ErrorProtoToString => {
      let obj = require_object(vm, scope, this, "Error.prototype.toString receiver")?;
      let mut scope = scope.reborrow();
      scope.push_root(this);

      let name = scope.ordinary_get(vm, obj, ATOM_NAME, this)?;
      let name = match name {
        Value::Undefined => "Error".to_owned(),
        other => to_string_value(&scope, other)?,
      };
      let message = scope.ordinary_get(vm, obj, ATOM_MESSAGE, this)?;
      let message = match message {
        Value::Undefined => String::new(),
        other => to_string_value(&scope, other)?,
      };
      let out = if message.is_empty() {
        name
      } else if name.is_empty() {
        message
      } else {
        format!("{name}: {message}")
      };
      scope.alloc_string_value(&out)
    }

    NativeFn::ParseInt => {
      let input = to_string_value(scope, arg(args, 0))?;
      let radix = match arg(args, 1) {
        Value::Undefined => None,
        v => Some(to_number(scope.heap(), v)? as i64),
      };
      Ok(Value::number(parse_int(&input, radix)))
    }
    NativeFn::ParseFloat => {
      let input = to_string_value(scope, arg(args, 0))?;
      Ok(Value::number(parse_float(&input)))
    }
    NativeFn::IsNaN => Ok(Value::Bool(to_number(scope.heap(), arg(args, 0))?.is_nan())),
    NativeFn::IsFinite => Ok(Value::Bool(
      to_number(scope.heap(), arg(args, 0))?.is_finite(),
    )),

    NativeFn::MathAbs => math1(scope, args, f64::abs),
    NativeFn::MathCeil => math1(scope, args, f64::ceil),
    NativeFn::MathFloor => math1(scope, args, f64::floor),
    NativeFn::MathSqrt => math1(scope, args, f64::sqrt),
    NativeFn::MathTrunc => math1(scope, args, f64::trunc),
    NativeFn::MathPow => {
      let base = to_number(scope.heap(), arg(args, 0))?;
      let exp = to_number(scope.heap(), arg(args, 1))?;
      Ok(Value::number(base.powf(exp)))
    }
    NativeFn::MathMax => math_fold(scope, args, f64::NEG_INFINITY, f64::max),
    NativeFn::MathMin => math_fold(scope, args, f64::INFINITY, f64::min),
    NativeFn::MathRandom => Ok(Value::Float(vm.next_random())),

    NativeFn::DateConstructor => Err(vm.throw_error(
      scope,
      ErrorKind::TypeError,
      "constructing Date values is not supported",
    )),
    NativeFn::DateNow => {
      let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(f64::NAN);
      Ok(Value::number(millis))
    }

    NativeFn::CompartmentConstructor => {
      if !is_construct {
        return Err(vm.throw_error(
          scope,
          ErrorKind::TypeError,
          "Compartment must be called with new",
        ));
      }
      let options = args.first().copied();
      Ok(Value::Object(crate::compartment::alloc_compartment(
        vm, scope, options,
      )?))
    }

    NativeFn::CompartmentProtoEvaluate => {
      let compartment = match this {
        Value::Object(obj)
          if scope.heap().object_class(obj)? == ClassKind::Compartment =>
        {
          obj
        }
        _ => {
          return Err(vm.throw_error(
            scope,
            ErrorKind::TypeError,
            "evaluate called on a non-Compartment receiver",
          ))
        }
      };
      let mut buf = [0u8; 4];
      let source = match value_str(arg(args, 0), scope.heap(), &mut buf)? {
        Some(s) => s.to_owned(),
        None => {
          return Err(vm.throw_error(
            scope,
            ErrorKind::TypeError,
            "evaluate requires a string of source text",
          ))
        }
      };
      evaluate_in_compartment(vm, scope, compartment, &source)
    }

    NativeFn::CompartmentProtoGlobalThis => match this {
      Value::Object(obj) if scope.heap().object_class(obj)? == ClassKind::Compartment => {
        Ok(Value::Object(scope.heap().compartment_slots(obj)?.global))
      }
      _ => Err(vm.throw_error(
        scope,
        ErrorKind::TypeError,
        "globalThis read on a non-Compartment receiver",
      )),
    },

    NativeFn::Harden => crate::harden::harden(scope, arg(args, 0)),
    NativeFn::Lockdown => crate::harden::lockdown(vm, scope),
  }
}

fn require_array(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  value: Value,
  method: &str,
) -> Result<GcObject, VmError> {
  match value {
    Value::Object(obj) if scope.heap().object_class(obj)? == ClassKind::Array => Ok(obj),
    _ => {
      let message = format!("Array.prototype.{method} requires an array receiver");
      Err(vm.throw_error(scope, ErrorKind::TypeError, &message))
    }
  }
}

fn alloc_error_from_args(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  kind: ErrorKind,
  args: &[Value],
) -> Result<Value, VmError> {
  let message = match arg(args, 0) {
    Value::Undefined => None,
    v => Some(to_string_value(scope, v)?),
  };
  let err = vm.alloc_error(scope, kind, message.as_deref().unwrap_or_default())?;
  Ok(Value::Object(err))
}

fn math1(
  scope: &mut Scope<'_>,
  args: &[Value],
  f: impl Fn(f64) -> f64,
) -> Result<Value, VmError> {
  let n = to_number(scope.heap(), arg(args, 0))?;
  Ok(Value::number(f(n)))
}

fn math_fold(
  scope: &mut Scope<'_>,
  args: &[Value],
  init: f64,
  f: impl Fn(f64, f64) -> f64,
) -> Result<Value, VmError> {
  let mut acc = init;
  for &v in args {
    let n = to_number(scope.heap(), v)?;
    if n.is_nan() {
      return Ok(Value::Float(f64::NAN));
    }
    acc = f(acc, n);
  }
  Ok(Value::number(acc))
}

/// ECMAScript `parseInt`, without the Unicode whitespace table.
fn parse_int(input: &str, radix: Option<i64>) -> f64 {
  let mut s = input.trim();
  let mut sign = 1.0;
  if let Some(rest) = s.strip_prefix('-') {
    sign = -1.0;
    s = rest;
  } else if let Some(rest) = s.strip_prefix('+') {
    s = rest;
  }

  let mut radix = match radix {
    None | Some(0) => 10,
    Some(r) if (2..=36).contains(&r) => r as u32,
    Some(_) => return f64::NAN,
  };
  if (radix == 16 || radix == 10)
    && (s.starts_with("0x") || s.starts_with("0X"))
  {
    radix = 16;
    s = &s[2..];
  }

  let mut value = 0.0f64;
  let mut any = false;
  for c in s.chars() {
    match c.to_digit(radix) {
      Some(d) => {
        value = value * radix as f64 + d as f64;
        any = true;
      }
      None => break,
    }
  }
  if !any {
    return f64::NAN;
  }
  sign * value
}

/// ECMAScript `parseFloat`: the longest numeric prefix, or NaN.
fn parse_float(input: &str) -> f64 {
  let s = input.trim();
  let bytes = s.as_bytes();
  let mut end = 0;
  let mut seen_digit = false;
  let mut seen_dot = false;
  let mut seen_exp = false;

  while end < bytes.len() {
    let b = bytes[end];
    match b {
      b'0'..=b'9' => seen_digit = true,
      b'+' | b'-' if end == 0 || matches!(bytes[end - 1], b'e' | b'E') => {}
      b'.' if !seen_dot && !seen_exp => seen_dot = true,
      b'e' | b'E' if seen_digit && !seen_exp => {
        seen_exp = true;
        seen_digit = false;
      }
      _ => break,
    }
    end += 1;
  }
  // Trim a trailing exponent marker (and its sign) that gathered no digits.
  while end > 0 && matches!(bytes[end - 1], b'e' | b'E' | b'+' | b'-') {
    if matches!(bytes[end - 1], b'e' | b'E') {
      seen_exp = false;
    }
    end -= 1;
  }

  if s.starts_with("Infinity") || s.starts_with("+Infinity") {
    return f64::INFINITY;
  }
  if s.starts_with("-Infinity") {
    return f64::NEG_INFINITY;
  }
  s[..end].parse().unwrap_or(f64::NAN)
}

/// Reads a property descriptor object into a patch, validating getter/setter callability.
fn to_descriptor_patch(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  desc: Value,
) -> Result<PropertyDescriptorPatch, VmError> {
  let obj = require_object(vm, scope, desc, "property descriptor")?;
  let mut scope = scope.reborrow();
  scope.push_root(desc);

  let mut patch = PropertyDescriptorPatch::default();
  if scope.ordinary_has_property(obj, ATOM_ENUMERABLE)? {
    let v = scope.ordinary_get(vm, obj, ATOM_ENUMERABLE, desc)?;
    patch.enumerable = Some(to_boolean(scope.heap(), v)?);
  }
  if scope.ordinary_has_property(obj, ATOM_CONFIGURABLE)? {
    let v = scope.ordinary_get(vm, obj, ATOM_CONFIGURABLE, desc)?;
    patch.configurable = Some(to_boolean(scope.heap(), v)?);
  }
  // Each extracted field is rooted immediately: a getter on the descriptor object can return a
  // fresh allocation that nothing else keeps alive while the remaining fields are read.
  if scope.ordinary_has_property(obj, ATOM_VALUE)? {
    let v = scope.ordinary_get(vm, obj, ATOM_VALUE, desc)?;
    scope.push_root(v);
    patch.value = Some(v);
  }
  if scope.ordinary_has_property(obj, ATOM_WRITABLE)? {
    let v = scope.ordinary_get(vm, obj, ATOM_WRITABLE, desc)?;
    patch.writable = Some(to_boolean(scope.heap(), v)?);
  }
  if scope.ordinary_has_property(obj, ATOM_GET)? {
    let v = scope.ordinary_get(vm, obj, ATOM_GET, desc)?;
    scope.push_root(v);
    if !matches!(v, Value::Undefined) && !scope.heap().is_callable(v)? {
      return Err(vm.throw_error(&mut scope, ErrorKind::TypeError, "getter must be callable"));
    }
    patch.get = Some(v);
  }
  if scope.ordinary_has_property(obj, ATOM_SET)? {
    let v = scope.ordinary_get(vm, obj, ATOM_SET, desc)?;
    scope.push_root(v);
    if !matches!(v, Value::Undefined) && !scope.heap().is_callable(v)? {
      return Err(vm.throw_error(&mut scope, ErrorKind::TypeError, "setter must be callable"));
    }
    patch.set = Some(v);
  }

  if patch.validate().is_err() {
    return Err(vm.throw_error(
      &mut scope,
      ErrorKind::TypeError,
      "property descriptor cannot be both a data and an accessor descriptor",
    ));
  }
  Ok(patch)
}

/// Builds the reflection object `Object.getOwnPropertyDescriptor` returns.
fn descriptor_to_object(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  desc: PropertyDescriptor,
) -> Result<GcObject, VmError> {
  let proto = vm.realm().intrinsics().object_prototype();
  let mut scope = scope.reborrow();
  let obj = scope.alloc_object(ClassKind::Ordinary, Some(proto))?;
  scope.push_root(Value::Object(obj));

  match desc.kind {
    PropertyKind::Data { value, writable } => {
      scope.define_property(obj, ATOM_VALUE, PropertyDescriptor::data(value))?;
      scope.define_property(
        obj,
        ATOM_WRITABLE,
        PropertyDescriptor::data(Value::Bool(writable)),
      )?;
    }
    PropertyKind::Accessor { get, set } => {
      scope.define_property(obj, ATOM_GET, PropertyDescriptor::data(get))?;
      scope.define_property(obj, ATOM_SET, PropertyDescriptor::data(set))?;
    }
  }
  scope.define_property(
    obj,
    ATOM_ENUMERABLE,
    PropertyDescriptor::data(Value::Bool(desc.enumerable)),
  )?;
  scope.define_property(
    obj,
    ATOM_CONFIGURABLE,
    PropertyDescriptor::data(Value::Bool(desc.configurable)),
  )?;
  Ok(obj)
}
