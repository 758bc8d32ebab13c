use crate::atom::ATOM_LENGTH;
use crate::handle::{Atom, GcObject};
use crate::heap::{ClassKind, Heap, ObjectFlags, Scope};
use crate::property::{PropertyDescriptor, PropertyDescriptorPatch, PropertyKind};
use crate::value::Value;
use crate::vm::Vm;
use crate::VmError;

/// Hard upper bound for `[[Prototype]]` chain traversals.
///
/// `set_prototype` prevents cycles, but embeddings can still construct pathological chains.
pub const MAX_PROTOTYPE_CHAIN: usize = 10_000;

impl<'a> Scope<'a> {
  pub fn get_prototype(&self, obj: GcObject) -> Result<Option<GcObject>, VmError> {
    self.heap().object_prototype(obj)
  }

  /// `[[SetPrototypeOf]]`: rejects (returns `false`) when `obj` is non-extensible or the new
  /// chain would contain a cycle.
  pub fn set_prototype(
    &mut self,
    obj: GcObject,
    prototype: Option<GcObject>,
  ) -> Result<bool, VmError> {
    let current = self.heap().object_prototype(obj)?;
    if current == prototype {
      return Ok(true);
    }
    if !self.heap().object_is_extensible(obj)? {
      return Ok(false);
    }

    let mut walk = prototype;
    let mut steps = 0usize;
    while let Some(p) = walk {
      if p == obj {
        return Ok(false);
      }
      if steps >= MAX_PROTOTYPE_CHAIN {
        return Err(VmError::InvariantViolation("prototype chain too deep"));
      }
      steps += 1;
      walk = self.heap().object_prototype(p)?;
    }

    self.heap_mut().object_write_prototype(obj, prototype)?;
    Ok(true)
  }

  /// ECMAScript `[[GetOwnProperty]]` for ordinary objects.
  pub fn ordinary_get_own_property(
    &self,
    obj: GcObject,
    key: Atom,
  ) -> Result<Option<PropertyDescriptor>, VmError> {
    self.heap().object_get_own_property(obj, key)
  }

  /// ECMAScript `[[HasProperty]]`: walks the prototype chain.
  pub fn ordinary_has_property(&self, obj: GcObject, key: Atom) -> Result<bool, VmError> {
    let mut current = Some(obj);
    let mut steps = 0usize;
    while let Some(o) = current {
      if steps >= MAX_PROTOTYPE_CHAIN {
        return Err(VmError::InvariantViolation("prototype chain too deep"));
      }
      steps += 1;
      if self.ordinary_get_own_property(o, key)?.is_some() {
        return Ok(true);
      }
      current = self.heap().object_prototype(o)?;
    }
    Ok(false)
  }

  /// ECMAScript `[[Get]]`: walks the prototype chain and invokes getters with `receiver`.
  pub fn ordinary_get(
    &mut self,
    vm: &mut Vm,
    mut obj: GcObject,
    key: Atom,
    receiver: Value,
  ) -> Result<Value, VmError> {
    let mut steps = 0usize;
    loop {
      if steps >= MAX_PROTOTYPE_CHAIN {
        return Err(VmError::InvariantViolation("prototype chain too deep"));
      }
      steps += 1;

      let Some(desc) = self.ordinary_get_own_property(obj, key)? else {
        match self.heap().object_prototype(obj)? {
          Some(parent) => {
            obj = parent;
            continue;
          }
          None => return Ok(Value::Undefined),
        }
      };

      return match desc.kind {
        PropertyKind::Data { value, .. } => Ok(value),
        PropertyKind::Accessor { get, .. } => {
          if matches!(get, Value::Undefined) {
            Ok(Value::Undefined)
          } else {
            vm.call(self, get, receiver, &[])
          }
        }
      };
    }
  }

  /// ECMAScript `[[Set]]` with the subset's array exotics layered on top.
  ///
  /// Returns `Ok(false)` on rejection (frozen target, non-writable property, non-extensible
  /// target, store past an array's length); the evaluator and natives convert that into a
  /// thrown TypeError.
  pub fn ordinary_set(
    &mut self,
    vm: &mut Vm,
    obj: GcObject,
    key: Atom,
    value: Value,
    receiver: Value,
  ) -> Result<bool, VmError> {
    let mut scope = self.reborrow();
    scope.push_root(Value::Object(obj));
    scope.push_root(value);
    scope.push_root(receiver);

    // No-holes rule: a store at index == length appends; past length it rejects.
    if scope.heap().object_class(obj)? == ClassKind::Array {
      if let Some(index) = atom_to_array_index(scope.heap(), key) {
        let len = array_length(scope.heap(), obj)?;
        if index > len {
          return Ok(false);
        }
        if index == len {
          return scope.array_append(obj, value);
        }
      }
    }

    let own_desc = scope.ordinary_get_own_property(obj, key)?;
    ordinary_set_with_own_descriptor(vm, &mut scope, obj, key, value, receiver, own_desc)
  }

  /// ECMAScript `[[Delete]]`: `Ok(false)` when the property exists but is non-configurable.
  pub fn ordinary_delete(&mut self, obj: GcObject, key: Atom) -> Result<bool, VmError> {
    let Some(current) = self.ordinary_get_own_property(obj, key)? else {
      return Ok(true);
    };
    if !current.configurable {
      return Ok(false);
    }
    let _removed = self.heap_mut().remove_property(obj, key)?;
    Ok(true)
  }

  /// Own property keys, in insertion order.
  pub fn own_property_keys(&self, obj: GcObject) -> Result<Vec<Atom>, VmError> {
    self.heap().object_own_keys(obj)
  }

  /// ECMAScript `[[DefineOwnProperty]]`, dispatching to the array exotic algorithm.
  pub fn define_own_property(
    &mut self,
    obj: GcObject,
    key: Atom,
    desc: PropertyDescriptorPatch,
  ) -> Result<bool, VmError> {
    if self.heap().object_class(obj)? == ClassKind::Array {
      self.array_define_own_property(obj, key, desc)
    } else {
      self.ordinary_define_own_property(obj, key, desc)
    }
  }

  /// ECMAScript `[[DefineOwnProperty]]` for ordinary objects
  /// (`ValidateAndApplyPropertyDescriptor`).
  pub fn ordinary_define_own_property(
    &mut self,
    obj: GcObject,
    key: Atom,
    desc: PropertyDescriptorPatch,
  ) -> Result<bool, VmError> {
    desc.validate()?;

    // Root all inputs that might be written into the heap before any allocation point.
    let mut scope = self.reborrow();
    scope.push_root(Value::Object(obj));
    desc_push_roots(&mut scope, &desc);

    let current = scope.heap().object_get_own_property(obj, key)?;
    let extensible = scope.heap().object_is_extensible(obj)?;
    validate_and_apply_property_descriptor(&mut scope, obj, key, extensible, desc, current)
  }

  pub fn create_data_property(
    &mut self,
    obj: GcObject,
    key: Atom,
    value: Value,
  ) -> Result<bool, VmError> {
    self.define_own_property(obj, key, PropertyDescriptorPatch::full_data(value, true, true, true))
  }

  // -------------------------------------------------------------------------------------------
  // Arrays
  // -------------------------------------------------------------------------------------------

  fn array_define_own_property(
    &mut self,
    obj: GcObject,
    key: Atom,
    desc: PropertyDescriptorPatch,
  ) -> Result<bool, VmError> {
    desc.validate()?;

    if key == ATOM_LENGTH {
      // `length` keeps its value; only attribute changes (typically `writable: false` during a
      // freeze) pass through. Resizing an array by assigning `length` is outside the subset.
      if let Some(value) = desc.value {
        let current = array_length(self.heap(), obj)? as f64;
        if value.as_number() != Some(current) {
          return Ok(false);
        }
      }
      return self.ordinary_define_own_property(obj, key, desc);
    }

    if let Some(index) = atom_to_array_index(self.heap(), key) {
      let len = array_length(self.heap(), obj)?;
      if index > len {
        // Defining past the end would create a hole.
        return Ok(false);
      }
      if index == len {
        let ok = self.ordinary_define_own_property(obj, key, desc)?;
        if !ok {
          return Ok(false);
        }
        return self.array_write_length(obj, len + 1);
      }
    }

    self.ordinary_define_own_property(obj, key, desc)
  }

  /// Appends `value` at the current length and bumps `length`, honoring extensibility and the
  /// writability of `length`.
  pub(crate) fn array_append(&mut self, obj: GcObject, value: Value) -> Result<bool, VmError> {
    let mut scope = self.reborrow();
    scope.push_root(Value::Object(obj));
    scope.push_root(value);

    let len = array_length(scope.heap(), obj)?;
    if !array_length_writable(scope.heap(), obj)? {
      return Ok(false);
    }

    let key = {
      let s = len.to_string();
      scope.heap_mut().intern(&s)?
    };
    let ok = scope.ordinary_define_own_property(
      obj,
      key,
      PropertyDescriptorPatch::full_data(value, true, true, true),
    )?;
    if !ok {
      return Ok(false);
    }
    scope.array_write_length(obj, len + 1)
  }

  fn array_write_length(&mut self, obj: GcObject, new_len: u32) -> Result<bool, VmError> {
    self.ordinary_define_own_property(
      obj,
      ATOM_LENGTH,
      PropertyDescriptorPatch {
        value: Some(Value::number(new_len as f64)),
        ..Default::default()
      },
    )
  }

  /// Allocates an Array object with the given elements and a writable, non-enumerable,
  /// non-configurable `length`.
  pub fn alloc_array(
    &mut self,
    prototype: Option<GcObject>,
    elements: &[Value],
  ) -> Result<GcObject, VmError> {
    let mut scope = self.reborrow();
    for &v in elements {
      scope.push_root(v);
    }

    let arr = scope.alloc_object(ClassKind::Array, prototype)?;
    let mut scope = scope.reborrow();
    scope.push_root(Value::Object(arr));

    scope.define_property(
      arr,
      ATOM_LENGTH,
      PropertyDescriptor {
        enumerable: false,
        configurable: false,
        kind: PropertyKind::Data {
          value: Value::number(elements.len() as f64),
          writable: true,
        },
      },
    )?;
    for (i, &v) in elements.iter().enumerate() {
      let key = {
        let s = i.to_string();
        scope.heap_mut().intern(&s)?
      };
      scope.define_property(arr, key, PropertyDescriptor::data(v))?;
    }
    Ok(arr)
  }

  // -------------------------------------------------------------------------------------------
  // Immutability
  // -------------------------------------------------------------------------------------------

  /// `Object.preventExtensions` semantics: clears the EXTENSIBLE flag, recording SEALED when the
  /// own-property set is already empty.
  pub fn prevent_extensions(&mut self, obj: GcObject) -> Result<(), VmError> {
    {
      let o = self.heap_mut().object_mut(obj)?;
      o.flags.clear(ObjectFlags::EXTENSIBLE);
    }
    if self.heap().object_property_count(obj)? == 0 {
      self.heap_mut().object_set_flag(obj, ObjectFlags::SEALED)?;
      self.heap_mut().object_set_flag(obj, ObjectFlags::FROZEN)?;
    }
    Ok(())
  }

  /// The sealed predicate: non-extensible with every own property non-configurable.
  pub fn is_sealed(&self, obj: GcObject) -> Result<bool, VmError> {
    let flags = self.heap().object_flags(obj)?;
    if flags.has(ObjectFlags::SEALED) {
      return Ok(true);
    }
    if flags.has(ObjectFlags::EXTENSIBLE) {
      return Ok(false);
    }
    for key in self.heap().object_own_keys(obj)? {
      let desc = self
        .heap()
        .object_get_own_property(obj, key)?
        .ok_or(VmError::InvariantViolation("own key without descriptor"))?;
      if desc.configurable {
        return Ok(false);
      }
    }
    Ok(true)
  }

  /// The frozen predicate: sealed with every own data property non-writable.
  pub fn is_frozen(&self, obj: GcObject) -> Result<bool, VmError> {
    let flags = self.heap().object_flags(obj)?;
    if flags.has(ObjectFlags::FROZEN) {
      return Ok(true);
    }
    if !self.is_sealed(obj)? {
      return Ok(false);
    }
    for key in self.heap().object_own_keys(obj)? {
      let desc = self
        .heap()
        .object_get_own_property(obj, key)?
        .ok_or(VmError::InvariantViolation("own key without descriptor"))?;
      if let PropertyKind::Data { writable: true, .. } = desc.kind {
        return Ok(false);
      }
    }
    Ok(true)
  }

  /// `Object.seal` semantics: every own property becomes non-configurable, then the object stops
  /// being extensible and the SEALED flag is recorded.
  ///
  /// Each per-property transition is permitted by the descriptor compatibility rules, so this
  /// cannot fail on a well-formed property table.
  pub fn seal(&mut self, obj: GcObject) -> Result<(), VmError> {
    let mut scope = self.reborrow();
    scope.push_root(Value::Object(obj));

    for key in scope.heap().object_own_keys(obj)? {
      let ok = scope.ordinary_define_own_property(
        obj,
        key,
        PropertyDescriptorPatch {
          configurable: Some(false),
          ..Default::default()
        },
      )?;
      if !ok {
        return Err(VmError::InvariantViolation("seal transition rejected"));
      }
    }
    {
      let o = scope.heap_mut().object_mut(obj)?;
      o.flags.clear(ObjectFlags::EXTENSIBLE);
      o.flags.set(ObjectFlags::SEALED);
    }
    Ok(())
  }

  /// `Object.freeze` semantics: seal, then every own data property becomes non-writable and the
  /// FROZEN flag is recorded.
  pub fn freeze(&mut self, obj: GcObject) -> Result<(), VmError> {
    let mut scope = self.reborrow();
    scope.push_root(Value::Object(obj));

    scope.seal(obj)?;
    for key in scope.heap().object_own_keys(obj)? {
      let desc = scope
        .heap()
        .object_get_own_property(obj, key)?
        .ok_or(VmError::InvariantViolation("own key without descriptor"))?;
      if desc.is_data_descriptor() {
        let ok = scope.ordinary_define_own_property(
          obj,
          key,
          PropertyDescriptorPatch {
            writable: Some(false),
            ..Default::default()
          },
        )?;
        if !ok {
          return Err(VmError::InvariantViolation("freeze transition rejected"));
        }
      }
    }
    scope.heap_mut().object_set_flag(obj, ObjectFlags::FROZEN)?;
    Ok(())
  }
}

/// The current `length` of an array object, read from its own `length` property.
pub(crate) fn array_length(heap: &Heap, obj: GcObject) -> Result<u32, VmError> {
  let desc = heap
    .object_get_own_property(obj, ATOM_LENGTH)?
    .ok_or(VmError::InvariantViolation("array without length"))?;
  match desc.kind {
    PropertyKind::Data { value, .. } => match value.as_number() {
      Some(n) if n >= 0.0 && n <= u32::MAX as f64 && n.fract() == 0.0 => Ok(n as u32),
      _ => Err(VmError::InvariantViolation("array length is not a u32")),
    },
    PropertyKind::Accessor { .. } => {
      Err(VmError::InvariantViolation("array length is an accessor"))
    }
  }
}

fn array_length_writable(heap: &Heap, obj: GcObject) -> Result<bool, VmError> {
  let desc = heap
    .object_get_own_property(obj, ATOM_LENGTH)?
    .ok_or(VmError::InvariantViolation("array without length"))?;
  match desc.kind {
    PropertyKind::Data { writable, .. } => Ok(writable),
    PropertyKind::Accessor { .. } => Ok(false),
  }
}

/// Parses an atom as an ECMAScript array index (`ToString(ToUint32(P)) === P`, below `2^32-1`).
pub(crate) fn atom_to_array_index(heap: &Heap, atom: Atom) -> Option<u32> {
  let s = heap.atom_str(atom);
  if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
    return None;
  }
  let mut value: u64 = 0;
  for b in s.bytes() {
    if !b.is_ascii_digit() {
      return None;
    }
    value = value.checked_mul(10)?.checked_add((b - b'0') as u64)?;
    if value > u32::MAX as u64 {
      return None;
    }
  }
  if value == u32::MAX as u64 {
    return None;
  }
  Some(value as u32)
}

fn desc_push_roots(scope: &mut Scope<'_>, desc: &PropertyDescriptorPatch) {
  if let Some(v) = desc.value {
    scope.push_root(v);
  }
  if let Some(v) = desc.get {
    scope.push_root(v);
  }
  if let Some(v) = desc.set {
    scope.push_root(v);
  }
}

fn validate_and_apply_property_descriptor(
  scope: &mut Scope<'_>,
  obj: GcObject,
  key: Atom,
  extensible: bool,
  desc: PropertyDescriptorPatch,
  current: Option<PropertyDescriptor>,
) -> Result<bool, VmError> {
  let Some(current_desc) = current else {
    if !extensible {
      return Ok(false);
    }

    // Create a new property with default attributes for missing fields.
    let enumerable = desc.enumerable.unwrap_or(false);
    let configurable = desc.configurable.unwrap_or(false);
    let new_desc = if desc.is_accessor_descriptor() {
      PropertyDescriptor {
        enumerable,
        configurable,
        kind: PropertyKind::Accessor {
          get: desc.get.unwrap_or(Value::Undefined),
          set: desc.set.unwrap_or(Value::Undefined),
        },
      }
    } else {
      // Generic descriptors create data properties.
      PropertyDescriptor {
        enumerable,
        configurable,
        kind: PropertyKind::Data {
          value: desc.value.unwrap_or(Value::Undefined),
          writable: desc.writable.unwrap_or(false),
        },
      }
    };

    scope.define_property(obj, key, new_desc)?;
    return Ok(true);
  };

  // If the patch has no fields, no change is requested.
  if desc.is_empty() {
    return Ok(true);
  }

  // Non-configurable invariants.
  if !current_desc.configurable {
    if matches!(desc.configurable, Some(true)) {
      return Ok(false);
    }
    if let Some(enumerable) = desc.enumerable {
      if enumerable != current_desc.enumerable {
        return Ok(false);
      }
    }
  }

  let desc_is_generic = desc.is_generic_descriptor();
  let desc_is_data = desc.is_data_descriptor();
  let desc_is_accessor = desc.is_accessor_descriptor();

  // Conversion between data and accessor forms requires `configurable: true`.
  if !current_desc.configurable && !desc_is_generic {
    if (current_desc.is_data_descriptor() && desc_is_accessor)
      || (current_desc.is_accessor_descriptor() && desc_is_data)
    {
      return Ok(false);
    }
  }

  if !desc_is_generic {
    match (&current_desc.kind, current_desc.configurable) {
      (PropertyKind::Data { value, writable }, false) if desc_is_data => {
        if !writable {
          // The only permitted changes are flipping `writable` to false and re-stating the
          // same value.
          if desc.writable == Some(true) {
            return Ok(false);
          }
          if let Some(new_value) = desc.value {
            if !new_value.same_value(*value, scope.heap()) {
              return Ok(false);
            }
          }
        }
      }
      (PropertyKind::Accessor { get, set }, false) if desc_is_accessor => {
        if let Some(new_get) = desc.get {
          if !new_get.same_value(*get, scope.heap()) {
            return Ok(false);
          }
        }
        if let Some(new_set) = desc.set {
          if !new_set.same_value(*set, scope.heap()) {
            return Ok(false);
          }
        }
      }
      _ => {}
    }
  }

  let new_desc = apply_descriptor_patch(current_desc, desc);
  scope.define_property(obj, key, new_desc)?;
  Ok(true)
}

fn apply_descriptor_patch(
  current: PropertyDescriptor,
  desc: PropertyDescriptorPatch,
) -> PropertyDescriptor {
  let enumerable = desc.enumerable.unwrap_or(current.enumerable);
  let configurable = desc.configurable.unwrap_or(current.configurable);

  if desc.is_generic_descriptor() {
    return PropertyDescriptor {
      enumerable,
      configurable,
      kind: current.kind,
    };
  }

  match (current.kind, desc.is_accessor_descriptor()) {
    (PropertyKind::Data { value, writable }, false) => PropertyDescriptor {
      enumerable,
      configurable,
      kind: PropertyKind::Data {
        value: desc.value.unwrap_or(value),
        writable: desc.writable.unwrap_or(writable),
      },
    },
    (PropertyKind::Accessor { get, set }, true) => PropertyDescriptor {
      enumerable,
      configurable,
      kind: PropertyKind::Accessor {
        get: desc.get.unwrap_or(get),
        set: desc.set.unwrap_or(set),
      },
    },
    // Kind conversions. Default attribute values per `ValidateAndApplyPropertyDescriptor`.
    (PropertyKind::Data { .. }, true) => PropertyDescriptor {
      enumerable,
      configurable,
      kind: PropertyKind::Accessor {
        get: desc.get.unwrap_or(Value::Undefined),
        set: desc.set.unwrap_or(Value::Undefined),
      },
    },
    (PropertyKind::Accessor { .. }, false) => PropertyDescriptor {
      enumerable,
      configurable,
      kind: PropertyKind::Data {
        value: desc.value.unwrap_or(Value::Undefined),
        writable: desc.writable.unwrap_or(false),
      },
    },
  }
}

fn ordinary_set_with_own_descriptor(
  vm: &mut Vm,
  scope: &mut Scope<'_>,
  obj: GcObject,
  key: Atom,
  value: Value,
  receiver: Value,
  own_desc: Option<PropertyDescriptor>,
) -> Result<bool, VmError> {
  let own_desc = match own_desc {
    Some(desc) => desc,
    None => match scope.heap().object_prototype(obj)? {
      Some(parent) => return scope.ordinary_set(vm, parent, key, value, receiver),
      None => PropertyDescriptor::data(Value::Undefined),
    },
  };

  match own_desc.kind {
    PropertyKind::Data { writable, .. } => {
      if !writable {
        return Ok(false);
      }
      let Value::Object(receiver_obj) = receiver else {
        return Ok(false);
      };

      if let Some(existing) = scope.ordinary_get_own_property(receiver_obj, key)? {
        match existing.kind {
          PropertyKind::Accessor { .. } => Ok(false),
          PropertyKind::Data { writable: false, .. } => Ok(false),
          PropertyKind::Data { .. } => scope.define_own_property(
            receiver_obj,
            key,
            PropertyDescriptorPatch {
              value: Some(value),
              ..Default::default()
            },
          ),
        }
      } else {
        scope.create_data_property(receiver_obj, key, value)
      }
    }
    PropertyKind::Accessor { set, .. } => {
      if matches!(set, Value::Undefined) {
        return Ok(false);
      }
      let _ = vm.call(scope, set, receiver, &[value])?;
      Ok(true)
    }
  }
}
