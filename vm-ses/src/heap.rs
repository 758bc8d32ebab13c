use crate::atom::AtomTable;
use crate::handle::{Atom, GcObject, GcString, HeapId, RootId};
use crate::native::NativeFn;
use crate::property::{PropertyDescriptor, PropertyEntry, PropertyKind};
use crate::string::JsString;
use crate::value::Value;
use crate::VmError;
use std::mem;

/// Heap configuration and memory limits.
///
/// The host hands the core a fixed byte budget at context creation; every managed allocation
/// (arena cells, property tables, string payloads, interned atom bytes) is charged against it and
/// the heap never grows past `max_bytes`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapLimits {
  /// Hard memory limit for live heap allocations, in bytes.
  pub max_bytes: usize,
  /// When an allocation would cause `used_bytes` to exceed this threshold, the heap runs a
  /// collection before attempting the allocation.
  pub gc_threshold: usize,
}

impl HeapLimits {
  pub fn new(max_bytes: usize, gc_threshold: usize) -> Self {
    Self {
      max_bytes,
      gc_threshold,
    }
  }
}

/// A compacting mark/compact GC heap.
///
/// Objects live in a dense arena (`Vec` used as a bump region). Handles do not address the arena
/// directly: they name entries of a handle table, and each entry holds the object's current arena
/// address. A collection marks from the root set in deterministic pre-order, then moves the live
/// objects to the low end of the arena **in exactly that order**, rewriting the table entries of
/// everything that moved. Entries of unreachable objects get their generation bumped, so a handle
/// that was not reachable from a root across a collection dangles *detectably*
/// ([`VmError::InvalidHandle`]) rather than aliasing whatever moved into the old address.
///
/// The GC traces from two root sets:
/// - **Stack roots**: stored in `root_stack` and managed by [`Scope`]. When a `Scope` is dropped,
///   all stack roots created within it are popped.
/// - **Persistent roots**: managed by [`Heap::add_root`] / [`Heap::remove_root`], used for realm
///   intrinsics and compartment globals.
pub struct Heap {
  limits: HeapLimits,

  /// Bytes used by live allocations (arena cells plus interned atom payloads).
  used_bytes: usize,
  gc_runs: u64,
  /// When set, every allocation first runs a full collection. Any handle held across an
  /// allocation point without a root is invalidated immediately, which makes missing-root bugs
  /// deterministic instead of timing-dependent.
  gc_stress: bool,

  arena: Vec<HeapCell>,
  table: Vec<TableEntry>,
  table_free: Vec<u32>,

  atoms: AtomTable,

  // Root sets.
  pub(crate) root_stack: Vec<Value>,
  persistent_roots: Vec<Option<Value>>,
  persistent_roots_free: Vec<u32>,
}

#[derive(Debug, Clone, Copy)]
struct TableEntry {
  addr: u32,
  generation: u32,
  live: bool,
}

struct HeapCell {
  bytes: usize,
  body: HeapBody,
}

enum HeapBody {
  String(JsString),
  Object(JsObject),
}

impl Heap {
  /// Creates a new heap with the provided memory limits.
  pub fn new(limits: HeapLimits) -> Self {
    debug_assert!(
      limits.gc_threshold <= limits.max_bytes,
      "gc_threshold should be <= max_bytes"
    );

    Self {
      limits,
      used_bytes: 0,
      gc_runs: 0,
      gc_stress: false,
      arena: Vec::new(),
      table: Vec::new(),
      table_free: Vec::new(),
      atoms: AtomTable::new(),
      root_stack: Vec::new(),
      persistent_roots: Vec::new(),
      persistent_roots_free: Vec::new(),
    }
  }

  /// Enters a stack-rooting scope.
  ///
  /// Stack roots pushed via [`Scope::push_root`] are removed when the returned `Scope` is
  /// dropped.
  pub fn scope(&mut self) -> Scope<'_> {
    let root_stack_len_at_entry = self.root_stack.len();
    Scope {
      heap: self,
      root_stack_len_at_entry,
    }
  }

  /// Bytes currently used by live heap allocations.
  pub fn used_bytes(&self) -> usize {
    self.used_bytes
  }

  /// The limits this heap was created with.
  pub fn limits(&self) -> HeapLimits {
    self.limits
  }

  /// Total number of GC cycles that have run.
  pub fn gc_runs(&self) -> u64 {
    self.gc_runs
  }

  /// Enables or disables stress collection (collect before every allocation).
  pub fn set_gc_stress(&mut self, stress: bool) {
    self.gc_stress = stress;
  }

  /// The current arena address of a live allocation.
  ///
  /// Exposed for embedders and tests that assert on compaction behavior (live objects are packed
  /// at the low end of the arena, in trace pre-order).
  pub fn arena_offset(&self, id: HeapId) -> Result<usize, VmError> {
    let idx = self.validate(id).ok_or(VmError::InvalidHandle)?;
    Ok(self.table[idx].addr as usize)
  }

  /// Number of live allocations in the arena.
  pub fn arena_len(&self) -> usize {
    self.arena.len()
  }

  // -------------------------------------------------------------------------------------------
  // Collection
  // -------------------------------------------------------------------------------------------

  /// Explicitly runs a GC cycle: mark from the root set in pre-order, then compact the live
  /// objects to the low end of the arena in discovery order.
  pub fn collect_garbage(&mut self) {
    let span = tracing::debug_span!(
      "gc",
      live = tracing::field::Empty,
      freed = tracing::field::Empty,
    )
    .entered();

    self.gc_runs += 1;

    // Mark. Seed the work stack with every root, reversed so the first root is traced first;
    // after tracing each object its newly discovered children are reversed as well, which makes
    // the discovery order a left-to-right pre-order of the root set.
    let mut tracer = Tracer::new(self.table.len());
    for value in self
      .persistent_roots
      .iter()
      .flatten()
      .rev()
      .chain(self.root_stack.iter().rev())
    {
      tracer.trace_value(*value);
    }

    while let Some(id) = tracer.pending.pop() {
      let Some(idx) = self.validate(id) else {
        debug_assert!(false, "stale handle reachable during GC: {id:?}");
        continue;
      };
      if tracer.marked[idx] {
        continue;
      }
      tracer.marked[idx] = true;
      tracer.order.push(idx as u32);

      let cell = &self.arena[self.table[idx].addr as usize];
      let before = tracer.pending.len();
      cell.body.trace(&mut tracer);
      tracer.pending[before..].reverse();
    }

    // Compact: move live cells to the low end in discovery order and rewrite their table
    // entries.
    let old_arena: Vec<Option<HeapCell>> =
      mem::take(&mut self.arena).into_iter().map(Some).collect();
    let mut old_arena = old_arena;
    self.arena = Vec::with_capacity(tracer.order.len());
    for &tidx in &tracer.order {
      let entry = &mut self.table[tidx as usize];
      let cell = old_arena[entry.addr as usize]
        .take()
        .expect("marked cell already moved");
      entry.addr = self.arena.len() as u32;
      self.arena.push(cell);
    }

    // Free the rest: subtract their bytes and invalidate their table entries.
    let mut freed = 0usize;
    for cell in old_arena.into_iter().flatten() {
      self.used_bytes = self.used_bytes.saturating_sub(cell.bytes);
      freed += 1;
    }
    for (idx, entry) in self.table.iter_mut().enumerate() {
      if entry.live && !tracer.marked[idx] {
        entry.live = false;
        entry.generation = entry.generation.wrapping_add(1);
        self.table_free.push(idx as u32);
      }
    }

    span.record("live", self.arena.len());
    span.record("freed", freed);
  }

  pub(crate) fn ensure_can_allocate(&mut self, new_bytes: usize) -> Result<(), VmError> {
    if self.gc_stress {
      self.collect_garbage();
    }

    let after = self.used_bytes.saturating_add(new_bytes);
    if after > self.limits.gc_threshold {
      self.collect_garbage();
    }

    let after = self.used_bytes.saturating_add(new_bytes);
    if after > self.limits.max_bytes {
      return Err(VmError::oom());
    }
    Ok(())
  }

  /// Reserves a table entry and bumps the frontier. Allocation is the last step that exposes a
  /// new object: the cell is fully constructed before any handle to it exists.
  fn alloc_cell(&mut self, body: HeapBody, bytes: usize) -> HeapId {
    let idx = match self.table_free.pop() {
      Some(idx) => idx as usize,
      None => {
        self.table.push(TableEntry {
          addr: 0,
          generation: 0,
          live: false,
        });
        self.table.len() - 1
      }
    };

    let entry = &mut self.table[idx];
    debug_assert!(!entry.live, "free list returned a live entry");
    entry.addr = self.arena.len() as u32;
    entry.live = true;

    self.arena.push(HeapCell { bytes, body });
    self.used_bytes = self.used_bytes.saturating_add(bytes);

    HeapId::from_parts(idx as u32, self.table[idx].generation)
  }

  fn validate(&self, id: HeapId) -> Option<usize> {
    let idx = id.index() as usize;
    let entry = self.table.get(idx)?;
    if !entry.live || entry.generation != id.generation() {
      return None;
    }
    Some(idx)
  }

  fn cell(&self, id: HeapId) -> Result<&HeapCell, VmError> {
    let idx = self.validate(id).ok_or(VmError::InvalidHandle)?;
    Ok(&self.arena[self.table[idx].addr as usize])
  }

  fn cell_mut(&mut self, id: HeapId) -> Result<&mut HeapCell, VmError> {
    let idx = self.validate(id).ok_or(VmError::InvalidHandle)?;
    let addr = self.table[idx].addr as usize;
    Ok(&mut self.arena[addr])
  }

  fn update_cell_bytes(&mut self, id: HeapId, new_bytes: usize) -> Result<(), VmError> {
    let cell = self.cell_mut(id)?;
    let old_bytes = cell.bytes;
    cell.bytes = new_bytes;
    if new_bytes >= old_bytes {
      self.used_bytes = self.used_bytes.saturating_add(new_bytes - old_bytes);
    } else {
      self.used_bytes = self.used_bytes.saturating_sub(old_bytes - new_bytes);
    }
    Ok(())
  }

  /// Charges transient workspace bytes (e.g. the hardening engine's traversal lists) to the
  /// budget. May collect; the caller must root everything it holds. Paired with
  /// [`Heap::refund_transient`].
  pub(crate) fn charge_transient(&mut self, bytes: usize) -> Result<(), VmError> {
    self.ensure_can_allocate(bytes)?;
    self.used_bytes = self.used_bytes.saturating_add(bytes);
    Ok(())
  }

  pub(crate) fn refund_transient(&mut self, bytes: usize) {
    self.used_bytes = self.used_bytes.saturating_sub(bytes);
  }

  pub(crate) fn debug_value_is_valid_or_primitive(&self, value: Value) -> bool {
    match value {
      Value::Undefined
      | Value::Null
      | Value::Bool(_)
      | Value::Int(_)
      | Value::CodePoint(_)
      | Value::Float(_) => true,
      Value::String(s) => self.validate(s.0).is_some(),
      Value::Object(o) => self.validate(o.0).is_some(),
    }
  }

  // -------------------------------------------------------------------------------------------
  // Persistent roots
  // -------------------------------------------------------------------------------------------

  /// Adds a persistent root, keeping `value` live until the returned [`RootId`] is removed.
  pub fn add_root(&mut self, value: Value) -> RootId {
    debug_assert!(self.debug_value_is_valid_or_primitive(value));

    let idx = match self.persistent_roots_free.pop() {
      Some(idx) => idx as usize,
      None => {
        self.persistent_roots.push(None);
        self.persistent_roots.len() - 1
      }
    };
    debug_assert!(self.persistent_roots[idx].is_none());
    self.persistent_roots[idx] = Some(value);
    RootId(idx as u32)
  }

  /// Returns the current value of a persistent root.
  pub fn get_root(&self, id: RootId) -> Option<Value> {
    self
      .persistent_roots
      .get(id.0 as usize)
      .and_then(|slot| *slot)
  }

  /// Removes a persistent root previously created by [`Heap::add_root`].
  pub fn remove_root(&mut self, id: RootId) {
    let idx = id.0 as usize;
    debug_assert!(idx < self.persistent_roots.len(), "invalid RootId");
    if idx >= self.persistent_roots.len() {
      return;
    }
    if self.persistent_roots[idx].take().is_some() {
      self.persistent_roots_free.push(id.0);
    }
  }

  // -------------------------------------------------------------------------------------------
  // Atoms
  // -------------------------------------------------------------------------------------------

  /// Interns `s` as an atom.
  ///
  /// Interning an atom that does not yet exist is an **allocating operation**: the payload is
  /// charged to the heap budget and a collection may run to make room. Handles held by the
  /// caller must be rooted across this call like any other allocation.
  pub fn intern(&mut self, s: &str) -> Result<Atom, VmError> {
    if let Some(atom) = self.atoms.lookup(s) {
      return Ok(atom);
    }
    self.ensure_can_allocate(s.len())?;
    let (atom, fresh_bytes) = self.atoms.intern(s);
    self.used_bytes = self.used_bytes.saturating_add(fresh_bytes);
    Ok(atom)
  }

  /// The backing string of an atom.
  pub fn atom_str(&self, atom: Atom) -> &str {
    self.atoms.str_of(atom)
  }

  /// Number of atoms in the table (baked plus interned).
  pub fn atom_count(&self) -> usize {
    self.atoms.len()
  }

  // -------------------------------------------------------------------------------------------
  // Strings
  // -------------------------------------------------------------------------------------------

  /// The UTF-8 content of a heap string.
  pub fn string_str(&self, s: GcString) -> Result<&str, VmError> {
    match &self.cell(s.0)?.body {
      HeapBody::String(js) => Ok(js.as_str()),
      _ => Err(VmError::InvalidHandle),
    }
  }

  /// The cached code-point length of a heap string.
  pub fn string_len_code_points(&self, s: GcString) -> Result<u32, VmError> {
    match &self.cell(s.0)?.body {
      HeapBody::String(js) => Ok(js.len_code_points()),
      _ => Err(VmError::InvalidHandle),
    }
  }

  // -------------------------------------------------------------------------------------------
  // Objects
  // -------------------------------------------------------------------------------------------

  pub(crate) fn object(&self, obj: GcObject) -> Result<&JsObject, VmError> {
    match &self.cell(obj.0)?.body {
      HeapBody::Object(o) => Ok(o),
      _ => Err(VmError::InvalidHandle),
    }
  }

  pub(crate) fn object_mut(&mut self, obj: GcObject) -> Result<&mut JsObject, VmError> {
    match &mut self.cell_mut(obj.0)?.body {
      HeapBody::Object(o) => Ok(o),
      _ => Err(VmError::InvalidHandle),
    }
  }

  /// Returns `true` if `obj` currently points to a live object allocation.
  pub fn is_valid_object(&self, obj: GcObject) -> bool {
    self.object(obj).is_ok()
  }

  /// The object's class tag.
  pub fn object_class(&self, obj: GcObject) -> Result<ClassKind, VmError> {
    Ok(self.object(obj)?.class)
  }

  /// Gets an object's `[[Prototype]]`.
  pub fn object_prototype(&self, obj: GcObject) -> Result<Option<GcObject>, VmError> {
    Ok(self.object(obj)?.prototype)
  }

  /// Writes an object's prototype field without extensibility or cycle checks; the checked
  /// operation lives on [`Scope::set_prototype`](crate::Scope).
  pub(crate) fn object_write_prototype(
    &mut self,
    obj: GcObject,
    prototype: Option<GcObject>,
  ) -> Result<(), VmError> {
    self.object_mut(obj)?.prototype = prototype;
    Ok(())
  }

  pub fn object_flags(&self, obj: GcObject) -> Result<ObjectFlags, VmError> {
    Ok(self.object(obj)?.flags)
  }

  pub(crate) fn object_set_flag(&mut self, obj: GcObject, flag: u8) -> Result<(), VmError> {
    self.object_mut(obj)?.flags.set(flag);
    Ok(())
  }

  /// Clears the HARDENED flag. Only the hardening engine's rollback path may do this; every
  /// other flag transition is monotonic.
  pub(crate) fn object_clear_hardened(&mut self, obj: GcObject) -> Result<(), VmError> {
    self.object_mut(obj)?.flags.clear(ObjectFlags::HARDENED);
    Ok(())
  }

  pub fn object_is_extensible(&self, obj: GcObject) -> Result<bool, VmError> {
    Ok(self.object(obj)?.flags.has(ObjectFlags::EXTENSIBLE))
  }

  /// Returns `true` if `value` is callable.
  pub fn is_callable(&self, value: Value) -> Result<bool, VmError> {
    match value {
      Value::Object(obj) => self.object_is_callable(obj),
      _ => Ok(false),
    }
  }

  pub fn object_is_callable(&self, obj: GcObject) -> Result<bool, VmError> {
    Ok(matches!(self.object(obj)?.internal, ClassSlots::Function(_)))
  }

  /// Returns `true` if `value` is a constructor.
  pub fn is_constructor(&self, value: Value) -> Result<bool, VmError> {
    let Value::Object(obj) = value else {
      return Ok(false);
    };
    match &self.object(obj)?.internal {
      ClassSlots::Function(f) => Ok(f.constructable),
      _ => Ok(false),
    }
  }

  pub(crate) fn function_slots(&self, obj: GcObject) -> Result<&FunctionSlots, VmError> {
    match &self.object(obj)?.internal {
      ClassSlots::Function(f) => Ok(f),
      _ => Err(VmError::InvalidHandle),
    }
  }

  pub(crate) fn compartment_slots(&self, obj: GcObject) -> Result<&CompartmentSlots, VmError> {
    match &self.object(obj)?.internal {
      ClassSlots::Compartment(c) => Ok(c),
      _ => Err(VmError::InvalidHandle),
    }
  }

  /// Gets an own property descriptor from an object.
  pub fn object_get_own_property(
    &self,
    obj: GcObject,
    key: Atom,
  ) -> Result<Option<PropertyDescriptor>, VmError> {
    let obj = self.object(obj)?;
    Ok(
      obj
        .properties
        .iter()
        .find(|prop| prop.key == key)
        .map(|prop| prop.desc),
    )
  }

  /// Own property keys, in insertion order.
  pub fn object_own_keys(&self, obj: GcObject) -> Result<Vec<Atom>, VmError> {
    Ok(self.object(obj)?.properties.iter().map(|p| p.key).collect())
  }

  /// Number of own properties.
  pub fn object_property_count(&self, obj: GcObject) -> Result<usize, VmError> {
    Ok(self.object(obj)?.properties.len())
  }

  /// Adds or replaces an own property. Callers must root `obj` and the descriptor payload: when
  /// the property table grows, the byte-budget check may run a collection.
  pub(crate) fn define_property(
    &mut self,
    obj: GcObject,
    key: Atom,
    desc: PropertyDescriptor,
  ) -> Result<(), VmError> {
    let existing_idx = {
      let o = self.object(obj)?;
      o.properties.iter().position(|prop| prop.key == key)
    };

    match existing_idx {
      Some(idx) => {
        // Replace in place (no change to heap size).
        self.object_mut(obj)?.properties[idx].desc = desc;
        Ok(())
      }
      None => {
        let (property_count, old_bytes) = {
          let o = self.object(obj)?;
          (o.properties.len(), self.cell(obj.0)?.bytes)
        };

        let new_property_count = property_count.checked_add(1).ok_or(VmError::oom())?;
        let new_bytes = JsObject::heap_size_bytes_for_property_count(new_property_count);
        let grow_by = new_bytes.saturating_sub(old_bytes);
        self.ensure_can_allocate(grow_by)?;

        // Allocate the new property table fallibly so hostile inputs cannot abort the host
        // process on allocator OOM.
        let mut buf: Vec<PropertyEntry> = Vec::new();
        buf
          .try_reserve_exact(new_property_count)
          .map_err(|_| VmError::oom())?;
        buf.extend_from_slice(&self.object(obj)?.properties);
        buf.push(PropertyEntry { key, desc });

        self.object_mut(obj)?.properties = buf.into_boxed_slice();
        self.update_cell_bytes(obj.0, new_bytes)?;
        Ok(())
      }
    }
  }

  /// Removes an own property entry. Net-shrinking: never collects.
  pub(crate) fn remove_property(&mut self, obj: GcObject, key: Atom) -> Result<bool, VmError> {
    let idx = {
      let o = self.object(obj)?;
      o.properties.iter().position(|prop| prop.key == key)
    };
    let Some(idx) = idx else {
      return Ok(false);
    };

    let new_property_count = self.object(obj)?.properties.len() - 1;
    let new_bytes = JsObject::heap_size_bytes_for_property_count(new_property_count);

    let mut buf: Vec<PropertyEntry> = Vec::new();
    buf
      .try_reserve_exact(new_property_count)
      .map_err(|_| VmError::oom())?;
    {
      let props = &self.object(obj)?.properties;
      buf.extend_from_slice(&props[..idx]);
      buf.extend_from_slice(&props[idx + 1..]);
    }

    self.object_mut(obj)?.properties = buf.into_boxed_slice();
    self.update_cell_bytes(obj.0, new_bytes)?;
    Ok(true)
  }

  /// Updates the `value` of an existing own data property in place.
  pub(crate) fn write_data_property_value(
    &mut self,
    obj: GcObject,
    key: Atom,
    value: Value,
  ) -> Result<(), VmError> {
    debug_assert!(self.debug_value_is_valid_or_primitive(value));
    let o = self.object_mut(obj)?;
    let prop = o
      .properties
      .iter_mut()
      .find(|prop| prop.key == key)
      .ok_or(VmError::InvariantViolation("data property vanished"))?;
    match &mut prop.desc.kind {
      PropertyKind::Data { value: slot, .. } => {
        *slot = value;
        Ok(())
      }
      PropertyKind::Accessor { .. } => Err(VmError::InvariantViolation(
        "expected a data property, found an accessor",
      )),
    }
  }
}

// -----------------------------------------------------------------------------------------------
// Scope
// -----------------------------------------------------------------------------------------------

/// A stack-rooting scope.
///
/// All stack roots pushed via [`Scope::push_root`] are removed when the scope is dropped. Every
/// handle held across a potentially-allocating operation MUST be on the root stack (or be a
/// persistent root); the compactor reclaims anything else.
pub struct Scope<'a> {
  heap: &'a mut Heap,
  root_stack_len_at_entry: usize,
}

impl Drop for Scope<'_> {
  fn drop(&mut self) {
    self.heap.root_stack.truncate(self.root_stack_len_at_entry);
  }
}

impl<'a> Scope<'a> {
  /// Pushes a stack root.
  ///
  /// The returned `Value` is the same as the input, allowing call sites to write
  /// `let v = scope.push_root(v);` if desired.
  pub fn push_root(&mut self, value: Value) -> Value {
    debug_assert!(self.heap.debug_value_is_valid_or_primitive(value));
    self.heap.root_stack.push(value);
    value
  }

  /// Pushes a stack root whose value can be updated in place while this scope is live.
  ///
  /// The evaluator uses this for values that change across allocation points (the running
  /// completion value, loop accumulators): the slot keeps whatever is written into it alive.
  pub(crate) fn push_root_slot(&mut self, value: Value) -> usize {
    debug_assert!(self.heap.debug_value_is_valid_or_primitive(value));
    self.heap.root_stack.push(value);
    self.heap.root_stack.len() - 1
  }

  pub(crate) fn write_root_slot(&mut self, slot: usize, value: Value) {
    debug_assert!(self.heap.debug_value_is_valid_or_primitive(value));
    debug_assert!(slot < self.heap.root_stack.len());
    self.heap.root_stack[slot] = value;
  }

  /// Creates a nested child scope that borrows the same heap.
  pub fn reborrow(&mut self) -> Scope<'_> {
    let root_stack_len_at_entry = self.heap.root_stack.len();
    Scope {
      heap: &mut *self.heap,
      root_stack_len_at_entry,
    }
  }

  /// Borrows the underlying heap immutably.
  pub fn heap(&self) -> &Heap {
    &*self.heap
  }

  /// Borrows the underlying heap mutably.
  pub fn heap_mut(&mut self) -> &mut Heap {
    &mut *self.heap
  }

  /// Allocates a JavaScript string on the heap.
  pub fn alloc_string(&mut self, s: &str) -> Result<GcString, VmError> {
    let new_bytes =
      mem::size_of::<HeapCell>().saturating_add(JsString::heap_size_bytes_for_len(s.len()));
    self.heap.ensure_can_allocate(new_bytes)?;

    let body = HeapBody::String(JsString::new(s));
    Ok(GcString(self.heap.alloc_cell(body, new_bytes)))
  }

  /// Allocates a string *value*: one-code-point strings stay immediate.
  pub fn alloc_string_value(&mut self, s: &str) -> Result<Value, VmError> {
    let mut chars = s.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
      return Ok(Value::CodePoint(c));
    }
    Ok(Value::String(self.alloc_string(s)?))
  }

  /// The string value backing an atom, re-using the immediate form where possible.
  pub fn atom_value(&mut self, atom: Atom) -> Result<Value, VmError> {
    // Atoms are immortal, so the string content can be read before allocating.
    let s = self.heap.atom_str(atom).to_owned();
    self.alloc_string_value(&s)
  }

  /// Interns a string value as an atom (ToPropertyKey for strings).
  pub fn intern_value(&mut self, value: Value) -> Result<Option<Atom>, VmError> {
    let mut buf = [0u8; 4];
    let Some(s) = crate::value::value_str(value, self.heap, &mut buf)? else {
      return Ok(None);
    };
    let s = s.to_owned();
    let mut scope = self.reborrow();
    scope.push_root(value);
    Ok(Some(scope.heap_mut().intern(&s)?))
  }

  /// Allocates an empty JavaScript object with the given class and `[[Prototype]]`.
  pub fn alloc_object(
    &mut self,
    class: ClassKind,
    prototype: Option<GcObject>,
  ) -> Result<GcObject, VmError> {
    self.alloc_object_with_slots(class, prototype, ClassSlots::None)
  }

  pub(crate) fn alloc_object_with_slots(
    &mut self,
    class: ClassKind,
    prototype: Option<GcObject>,
    internal: ClassSlots,
  ) -> Result<GcObject, VmError> {
    // Root the prototype and any slot payloads across the budget check: it may collect.
    let mut scope = self.reborrow();
    if let Some(proto) = prototype {
      scope.push_root(Value::Object(proto));
    }
    internal.push_roots(&mut scope);

    let new_bytes = JsObject::heap_size_bytes_for_property_count(0);
    scope.heap.ensure_can_allocate(new_bytes)?;

    let body = HeapBody::Object(JsObject {
      class,
      flags: ObjectFlags::fresh(),
      prototype,
      properties: Box::default(),
      internal,
    });
    Ok(GcObject(scope.heap.alloc_cell(body, new_bytes)))
  }

  /// Defines (adds or replaces) an own property on `obj`, rooting all inputs first.
  pub fn define_property(
    &mut self,
    obj: GcObject,
    key: Atom,
    desc: PropertyDescriptor,
  ) -> Result<(), VmError> {
    let mut scope = self.reborrow();
    scope.push_root(Value::Object(obj));
    match desc.kind {
      PropertyKind::Data { value, .. } => {
        scope.push_root(value);
      }
      PropertyKind::Accessor { get, set } => {
        scope.push_root(get);
        scope.push_root(set);
      }
    }
    scope.heap.define_property(obj, key, desc)
  }
}

// -----------------------------------------------------------------------------------------------
// Object representation
// -----------------------------------------------------------------------------------------------

/// The class tag of a heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
  Ordinary,
  Array,
  Function,
  Error,
  Arguments,
  /// Lexical binding records; never script-visible. The prototype field chains to the parent
  /// environment.
  Environment,
  Compartment,
}

/// The object flags bitset.
///
/// The immutability flags form a monotonic lattice (`fresh` → non-extensible → sealed → frozen →
/// hardened): bits are set and never cleared, except that the hardening engine's rollback clears
/// tentatively-set HARDENED bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectFlags(u8);

impl ObjectFlags {
  pub const EXTENSIBLE: u8 = 1 << 0;
  pub const SEALED: u8 = 1 << 1;
  pub const FROZEN: u8 = 1 << 2;
  pub const HARDENED: u8 = 1 << 3;

  /// Flags of a freshly created object: extensible, nothing else.
  pub fn fresh() -> Self {
    Self(Self::EXTENSIBLE)
  }

  pub fn has(self, flag: u8) -> bool {
    self.0 & flag != 0
  }

  pub(crate) fn set(&mut self, flag: u8) {
    debug_assert!(flag != Self::EXTENSIBLE, "EXTENSIBLE is cleared, never set");
    self.0 |= flag;
  }

  pub(crate) fn clear(&mut self, flag: u8) {
    self.0 &= !flag;
  }
}

pub(crate) struct JsObject {
  pub(crate) class: ClassKind,
  pub(crate) flags: ObjectFlags,
  pub(crate) prototype: Option<GcObject>,
  pub(crate) properties: Box<[PropertyEntry]>,
  pub(crate) internal: ClassSlots,
}

impl JsObject {
  fn heap_size_bytes_for_property_count(count: usize) -> usize {
    let props_bytes = count
      .checked_mul(mem::size_of::<PropertyEntry>())
      .unwrap_or(usize::MAX);
    mem::size_of::<HeapCell>()
      .checked_add(props_bytes)
      .unwrap_or(usize::MAX)
  }
}

/// Class-specific internal slots.
pub(crate) enum ClassSlots {
  None,
  Function(FunctionSlots),
  Compartment(CompartmentSlots),
}

impl ClassSlots {
  fn push_roots(&self, scope: &mut Scope<'_>) {
    match self {
      ClassSlots::None => {}
      ClassSlots::Function(f) => {
        if let CallKind::Ecma {
          env, captured_this, ..
        } = &f.call
        {
          if let Some(env) = env {
            scope.push_root(Value::Object(*env));
          }
          if let Some(this) = captured_this {
            scope.push_root(*this);
          }
        }
      }
      ClassSlots::Compartment(c) => {
        scope.push_root(Value::Object(c.global));
        scope.push_root(Value::Object(c.lexicals));
      }
    }
  }
}

pub(crate) struct FunctionSlots {
  pub(crate) call: CallKind,
  pub(crate) constructable: bool,
}

pub(crate) enum CallKind {
  Native(NativeFn),
  Ecma {
    /// The function's parsed code, shared with every closure over the same literal.
    code: std::rc::Rc<parse_ses::Func>,
    /// Closure environment (an Environment-class object), if any.
    env: Option<GcObject>,
    /// Arrows capture `this` at creation.
    captured_this: Option<Value>,
  },
}

pub(crate) struct CompartmentSlots {
  pub(crate) global: GcObject,
  pub(crate) lexicals: GcObject,
  /// Whether any `globalLexicals` entries were supplied at construction; decides top-level
  /// `this`.
  pub(crate) has_lexicals: bool,
}

// -----------------------------------------------------------------------------------------------
// Tracing
// -----------------------------------------------------------------------------------------------

pub(crate) trait Trace {
  fn trace(&self, tracer: &mut Tracer);
}

pub(crate) struct Tracer {
  marked: Vec<bool>,
  /// Table indices in discovery (pre-)order; doubles as the compaction order.
  order: Vec<u32>,
  pending: Vec<HeapId>,
}

impl Tracer {
  fn new(table_len: usize) -> Self {
    Self {
      marked: vec![false; table_len],
      order: Vec::new(),
      pending: Vec::new(),
    }
  }

  pub(crate) fn trace_value(&mut self, value: Value) {
    match value {
      Value::Undefined
      | Value::Null
      | Value::Bool(_)
      | Value::Int(_)
      | Value::CodePoint(_)
      | Value::Float(_) => {}
      Value::String(s) => self.trace_heap_id(s.0),
      Value::Object(o) => self.trace_heap_id(o.0),
    }
  }

  fn trace_heap_id(&mut self, id: HeapId) {
    let idx = id.index() as usize;
    if idx < self.marked.len() && self.marked[idx] {
      return;
    }
    self.pending.push(id);
  }
}

impl Trace for HeapBody {
  fn trace(&self, tracer: &mut Tracer) {
    match self {
      // Strings have no outgoing GC references.
      HeapBody::String(_) => {}
      HeapBody::Object(o) => o.trace(tracer),
    }
  }
}

impl Trace for JsObject {
  fn trace(&self, tracer: &mut Tracer) {
    if let Some(proto) = self.prototype {
      tracer.trace_value(Value::Object(proto));
    }
    for prop in self.properties.iter() {
      prop.trace(tracer);
    }
    match &self.internal {
      ClassSlots::None => {}
      ClassSlots::Function(f) => {
        if let CallKind::Ecma {
          env, captured_this, ..
        } = &f.call
        {
          if let Some(env) = env {
            tracer.trace_value(Value::Object(*env));
          }
          if let Some(this) = captured_this {
            tracer.trace_value(*this);
          }
        }
      }
      ClassSlots::Compartment(c) => {
        tracer.trace_value(Value::Object(c.global));
        tracer.trace_value(Value::Object(c.lexicals));
      }
    }
  }
}
