use crate::handle::{GcObject, RootId};
use crate::heap::Heap;
use crate::intrinsics::Intrinsics;
use crate::value::Value;
use crate::VmError;

/// The process-wide realm: one shared set of intrinsics, one latched lockdown flag.
///
/// Every compartment references the same realm; modifying a shared prototype from one
/// compartment is visible from every other, and `lockdown` is the only way to prevent that.
///
/// This type owns a set of **persistent GC roots** registered with the [`Heap`]. Call
/// [`Realm::teardown`] to unregister them when the embedding is finished with the realm.
#[derive(Debug)]
pub struct Realm {
  intrinsics: Intrinsics,
  locked_down: bool,
  root_compartment: Option<GcObject>,
  roots: Vec<RootId>,
  torn_down: bool,
}

impl Realm {
  /// Creates a new realm on `heap`, baking the full intrinsic set.
  pub fn new(heap: &mut Heap) -> Result<Self, VmError> {
    let mut roots = Vec::new();

    let mut scope = heap.scope();
    let intrinsics = match Intrinsics::init(&mut scope, &mut roots) {
      Ok(intrinsics) => intrinsics,
      Err(err) => {
        // Avoid leaking persistent roots when realm initialization fails.
        for root in roots.drain(..) {
          scope.heap_mut().remove_root(root);
        }
        return Err(err);
      }
    };

    Ok(Self {
      intrinsics,
      locked_down: false,
      root_compartment: None,
      roots,
      torn_down: false,
    })
  }

  /// The realm's intrinsic objects.
  pub fn intrinsics(&self) -> &Intrinsics {
    &self.intrinsics
  }

  /// Whether `lockdown()` has run (or at least latched; see [`Realm::latch_lockdown`]).
  pub fn is_locked_down(&self) -> bool {
    self.locked_down
  }

  /// Latches the lockdown flag. Returns `false` if it was already latched.
  ///
  /// The flag is latched *before* the intrinsics are hardened: a hardening failure rolls its
  /// own work back but leaves the realm locked, so a half-hardened realm can never be retried
  /// into an observable "second lockdown".
  pub(crate) fn latch_lockdown(&mut self) -> bool {
    if self.locked_down {
      return false;
    }
    self.locked_down = true;
    true
  }

  /// The compartment host-level `evaluate` calls run in.
  pub fn root_compartment(&self) -> GcObject {
    self
      .root_compartment
      .expect("realm root compartment is installed at Vm creation")
  }

  pub(crate) fn install_root_compartment(&mut self, heap: &mut Heap, compartment: GcObject) {
    debug_assert!(self.root_compartment.is_none());
    self.roots.push(heap.add_root(Value::Object(compartment)));
    self.root_compartment = Some(compartment);
  }

  /// Unregisters all realm roots from the heap.
  ///
  /// After teardown, the realm must not be used for execution: any GC handles it retains
  /// (including every intrinsic) may become invalid at the next collection.
  ///
  /// This method is **idempotent**.
  pub fn teardown(&mut self, heap: &mut Heap) {
    if self.torn_down {
      return;
    }
    self.torn_down = true;

    for root in self.roots.drain(..) {
      heap.remove_root(root);
    }
  }
}

impl Drop for Realm {
  fn drop(&mut self) {
    debug_assert!(
      self.torn_down,
      "Realm dropped without calling teardown(); this leaks persistent GC roots if the Heap is reused"
    );
  }
}
