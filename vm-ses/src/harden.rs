//! The hardening engine: transitive, rollback-safe promotion to the `hardened` state, and the
//! one-shot realm `lockdown`.

use crate::handle::GcObject;
use crate::heap::{ObjectFlags, Scope};
use crate::property::PropertyKind;
use crate::value::Value;
use crate::vm::{ErrorKind, Vm};
use crate::VmError;
use std::collections::VecDeque;
use std::mem;

/// Transitively promotes every object reachable from `root` to the `hardened` state.
///
/// Primitives pass through unchanged; already-hardened inputs return immediately. Traversal is
/// breadth-first over a work queue, enqueuing each object's prototype first and then its own
/// properties in insertion order (data values before getters, getters before setters); the
/// already-hardened short-circuit makes circular graphs terminate in O(reachable).
///
/// The traversal workspace (queue and processed list) is charged to the heap budget, so hardening
/// a large graph on a nearly-full heap can fail with out-of-memory mid-walk. On **any** failure
/// the HARDENED flag is cleared from every object this call tentatively stamped, and the original
/// error is re-raised unchanged; the freeze promotions themselves are monotonic and are not
/// undone.
pub fn harden(scope: &mut Scope<'_>, value: Value) -> Result<Value, VmError> {
  let Value::Object(root) = value else {
    return Ok(value);
  };
  if is_hardened(scope, root)? {
    return Ok(value);
  }

  let span = tracing::debug_span!("harden", visited = tracing::field::Empty).entered();

  let mut scope = scope.reborrow();
  scope.push_root(value);

  let mut walk = Walk {
    queue: VecDeque::new(),
    processed: Vec::new(),
    charged_bytes: 0,
  };
  let result = walk.run(&mut scope, root);
  scope.heap_mut().refund_transient(walk.charged_bytes);
  span.record("visited", walk.processed.len());

  match result {
    Ok(()) => Ok(value),
    Err(err) => {
      // Roll back: clear the tentative HARDENED stamps, then re-raise the original error.
      for obj in walk.processed {
        let _ = scope.heap_mut().object_clear_hardened(obj);
      }
      Err(err)
    }
  }
}

struct Walk {
  queue: VecDeque<GcObject>,
  processed: Vec<GcObject>,
  charged_bytes: usize,
}

impl Walk {
  fn run(&mut self, scope: &mut Scope<'_>, root: GcObject) -> Result<(), VmError> {
    self.enqueue(scope, root)?;

    while let Some(obj) = self.queue.pop_front() {
      if is_hardened(scope, obj)? {
        continue;
      }

      // Promote to frozen through the seal+freeze path; each per-property transition is
      // permitted by the descriptor compatibility rules.
      scope.freeze(obj)?;

      // Prototype first, then own properties in insertion order.
      if let Some(proto) = scope.heap().object_prototype(obj)? {
        self.enqueue_unless_hardened(scope, proto)?;
      }
      for key in scope.heap().object_own_keys(obj)? {
        let desc = scope
          .heap()
          .object_get_own_property(obj, key)?
          .ok_or(VmError::InvariantViolation("own key without descriptor"))?;
        match desc.kind {
          PropertyKind::Data { value, .. } => self.enqueue_value(scope, value)?,
          PropertyKind::Accessor { get, set } => {
            self.enqueue_value(scope, get)?;
            self.enqueue_value(scope, set)?;
          }
        }
      }

      scope
        .heap_mut()
        .object_set_flag(obj, ObjectFlags::HARDENED)?;
      self.record(scope, obj)?;
    }
    Ok(())
  }

  fn enqueue_value(&mut self, scope: &mut Scope<'_>, value: Value) -> Result<(), VmError> {
    if let Value::Object(obj) = value {
      self.enqueue_unless_hardened(scope, obj)?;
    }
    Ok(())
  }

  fn enqueue_unless_hardened(
    &mut self,
    scope: &mut Scope<'_>,
    obj: GcObject,
  ) -> Result<(), VmError> {
    if !is_hardened(scope, obj)? {
      self.enqueue(scope, obj)?;
    }
    Ok(())
  }

  fn enqueue(&mut self, scope: &mut Scope<'_>, obj: GcObject) -> Result<(), VmError> {
    self.charge(scope)?;
    self.queue.push_back(obj);
    Ok(())
  }

  fn record(&mut self, scope: &mut Scope<'_>, obj: GcObject) -> Result<(), VmError> {
    self.charge(scope)?;
    self.processed.push(obj);
    Ok(())
  }

  /// Charges one list entry to the heap budget. Everything in the queue and processed list is
  /// reachable from the rooted `root`, so a collection triggered here cannot reclaim any of it.
  fn charge(&mut self, scope: &mut Scope<'_>) -> Result<(), VmError> {
    let bytes = mem::size_of::<GcObject>();
    scope.heap_mut().charge_transient(bytes)?;
    self.charged_bytes += bytes;
    Ok(())
  }
}

fn is_hardened(scope: &Scope<'_>, obj: GcObject) -> Result<bool, VmError> {
  Ok(scope.heap().object_flags(obj)?.has(ObjectFlags::HARDENED))
}

/// The one-shot realm-wide lockdown.
///
/// The `locked_down` flag is latched **before** hardening begins, so a hardening failure cannot
/// be retried: the in-progress `harden` rolls back and re-raises, and every subsequent
/// `lockdown()` call still fails because the flag stays set.
pub fn lockdown(vm: &mut Vm, scope: &mut Scope<'_>) -> Result<Value, VmError> {
  if !vm.realm_mut().latch_lockdown() {
    return Err(vm.throw_error(scope, ErrorKind::TypeError, "lockdown has already run"));
  }

  let span = tracing::debug_span!("lockdown").entered();
  let roots = vm.realm().intrinsics().all_roots();
  for root in roots {
    harden(scope, Value::Object(root))?;
  }
  drop(span);

  Ok(Value::Undefined)
}
