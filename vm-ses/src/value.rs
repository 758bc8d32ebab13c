use crate::handle::{GcObject, GcString};
use crate::heap::Heap;
use crate::VmError;

/// A JavaScript value: a word-sized tagged datum.
///
/// Non-pointer variants carry their payload immediately:
/// - `Int` holds small integers; arithmetic results that are integral and fit stay in this form.
/// - `CodePoint` is a one-code-point string stored immediately, so single-character strings never
///   touch the heap. It is indistinguishable from a heap string to script (`typeof`, equality,
///   concatenation, property keys all treat it as a string).
/// - `Float` holds every other number.
///
/// Pointer variants (`Object`, `String`) name handle-table entries that the collector rewrites
/// when the target moves; see [`crate::HeapId`] for the validity rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
  Undefined,
  Null,
  Bool(bool),
  Int(i32),
  CodePoint(char),
  Float(f64),
  String(GcString),
  Object(GcObject),
}

impl Value {
  /// Canonicalizes a number: integral values in `i32` range (excluding `-0.0`) become `Int`.
  pub fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n >= i32::MIN as f64 && n <= i32::MAX as f64 && !is_negative_zero(n) {
      Value::Int(n as i32)
    } else {
      Value::Float(n)
    }
  }

  /// The numeric payload, if this is a number.
  pub fn as_number(self) -> Option<f64> {
    match self {
      Value::Int(i) => Some(i as f64),
      Value::Float(f) => Some(f),
      _ => None,
    }
  }

  pub fn is_object(self) -> bool {
    matches!(self, Value::Object(_))
  }

  pub fn is_string(self) -> bool {
    matches!(self, Value::String(_) | Value::CodePoint(_))
  }

  /// The `typeof` name for this value.
  ///
  /// Objects report `"function"` when their class is Function, which requires consulting the
  /// heap; stale handles report `"object"`.
  pub fn type_of(self, heap: &Heap) -> &'static str {
    match self {
      Value::Undefined => "undefined",
      Value::Null => "object",
      Value::Bool(_) => "boolean",
      Value::Int(_) | Value::Float(_) => "number",
      Value::CodePoint(_) | Value::String(_) => "string",
      Value::Object(obj) => {
        if heap.object_is_callable(obj).unwrap_or(false) {
          "function"
        } else {
          "object"
        }
      }
    }
  }

  /// ECMAScript `SameValue`.
  ///
  /// `NaN` equals `NaN`; `+0` and `-0` are distinct; numbers compare numerically across the
  /// `Int`/`Float` split; strings compare by content across the `CodePoint`/heap split.
  pub fn same_value(self, other: Value, heap: &Heap) -> bool {
    match (self, other) {
      (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Object(a), Value::Object(b)) => a == b,
      (a, b) => match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => {
          if x.is_nan() && y.is_nan() {
            true
          } else {
            x == y && is_negative_zero(x) == is_negative_zero(y)
          }
        }
        _ => string_eq(a, b, heap).unwrap_or(false),
      },
    }
  }

  /// ECMAScript `IsStrictlyEqual` (the `===` operator).
  ///
  /// Differs from [`Value::same_value`] on numbers only: `NaN !== NaN`, and `+0 === -0`.
  pub fn strict_equals(self, other: Value, heap: &Heap) -> bool {
    if let (Some(x), Some(y)) = (self.as_number(), other.as_number()) {
      return x == y;
    }
    self.same_value(other, heap)
  }
}

fn is_negative_zero(n: f64) -> bool {
  n == 0.0 && n.is_sign_negative()
}

/// String content equality across the immediate/heap representation split.
///
/// Returns `Ok(false)` when either side is not a string.
fn string_eq(a: Value, b: Value, heap: &Heap) -> Result<bool, VmError> {
  let mut buf_a = [0u8; 4];
  let mut buf_b = [0u8; 4];
  let sa = match value_str(a, heap, &mut buf_a)? {
    Some(s) => s,
    None => return Ok(false),
  };
  let sb = match value_str(b, heap, &mut buf_b)? {
    Some(s) => s,
    None => return Ok(false),
  };
  Ok(sa == sb)
}

/// Borrows the UTF-8 content of a string value, using `buf` for the immediate form.
///
/// Returns `Ok(None)` for non-strings.
pub(crate) fn value_str<'a>(
  value: Value,
  heap: &'a Heap,
  buf: &'a mut [u8; 4],
) -> Result<Option<&'a str>, VmError> {
  match value {
    Value::CodePoint(c) => Ok(Some(c.encode_utf8(buf))),
    Value::String(s) => Ok(Some(heap.string_str(s)?)),
    _ => Ok(None),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn number_canonicalization() {
    assert_eq!(Value::number(1.0), Value::Int(1));
    assert_eq!(Value::number(-1.0), Value::Int(-1));
    assert_eq!(Value::number(1.5), Value::Float(1.5));
    assert_eq!(Value::number(-0.0), Value::Float(-0.0));
    assert_eq!(Value::number(1e10), Value::Float(1e10));
  }

  #[test]
  fn same_value_number_edge_cases() {
    let heap = Heap::new(crate::HeapLimits::new(4096, 4096));
    assert!(Value::Float(f64::NAN).same_value(Value::Float(f64::NAN), &heap));
    assert!(!Value::Int(0).same_value(Value::Float(-0.0), &heap));
    assert!(Value::Int(1).same_value(Value::Float(1.0), &heap));
  }

  #[test]
  fn strict_equals_number_edge_cases() {
    let heap = Heap::new(crate::HeapLimits::new(4096, 4096));
    assert!(!Value::Float(f64::NAN).strict_equals(Value::Float(f64::NAN), &heap));
    assert!(Value::Int(0).strict_equals(Value::Float(-0.0), &heap));
  }
}
