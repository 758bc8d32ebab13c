use proptest::prelude::*;
use vm_ses::{
  harden, ClassKind, GcObject, Heap, HeapLimits, ObjectFlags, PropertyDescriptor, Value,
};

/// A random object graph: `nodes` objects, each with primitive payloads, plus directed edges
/// stored as properties. Cycles and diamonds are expected.
#[derive(Debug, Clone)]
struct GraphSpec {
  nodes: usize,
  edges: Vec<(usize, usize)>,
}

fn arb_graph() -> impl Strategy<Value = GraphSpec> {
  (2usize..12).prop_flat_map(|nodes| {
    prop::collection::vec((0..nodes, 0..nodes), 0..24)
      .prop_map(move |edges| GraphSpec { nodes, edges })
  })
}

fn build_graph(heap: &mut Heap, spec: &GraphSpec) -> Vec<GcObject> {
  let mut objects = Vec::with_capacity(spec.nodes);
  for i in 0..spec.nodes {
    let mut scope = heap.scope();
    let obj = scope
      .alloc_object(ClassKind::Ordinary, None)
      .expect("allocation");
    scope.push_root(Value::Object(obj));
    let key = scope.heap_mut().intern("payload").expect("intern");
    scope
      .define_property(obj, key, PropertyDescriptor::data(Value::Int(i as i32)))
      .expect("define");
    scope.heap_mut().add_root(Value::Object(obj));
    objects.push(obj);
  }

  for (n, (from, to)) in spec.edges.iter().enumerate() {
    let mut scope = heap.scope();
    let key = scope.heap_mut().intern(&format!("edge{n}")).expect("intern");
    scope
      .define_property(
        objects[*from],
        key,
        PropertyDescriptor::data(Value::Object(objects[*to])),
      )
      .expect("define");
  }
  objects
}

/// Reachability over the spec, mirroring what `harden` should cover from node 0.
fn reachable(spec: &GraphSpec) -> Vec<bool> {
  let mut seen = vec![false; spec.nodes];
  let mut stack = vec![0usize];
  while let Some(n) = stack.pop() {
    if seen[n] {
      continue;
    }
    seen[n] = true;
    for (from, to) in &spec.edges {
      if *from == n && !seen[*to] {
        stack.push(*to);
      }
    }
  }
  seen
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(64))]

  #[test]
  fn harden_covers_exactly_the_reachable_subgraph(spec in arb_graph()) {
    let mut heap = Heap::new(HeapLimits::new(1024 * 1024, 1024 * 1024));
    let objects = build_graph(&mut heap, &spec);

    {
      let mut scope = heap.scope();
      harden(&mut scope, Value::Object(objects[0])).expect("harden");
    }

    let seen = reachable(&spec);
    for (i, obj) in objects.iter().enumerate() {
      let flags = heap.object_flags(*obj).expect("live");
      let scope = heap.scope();
      if seen[i] {
        prop_assert!(scope.is_frozen(*obj).expect("predicate"), "node {i} reachable but not frozen");
        prop_assert!(flags.has(ObjectFlags::HARDENED), "node {i} reachable but not hardened");
      } else {
        prop_assert!(!flags.has(ObjectFlags::HARDENED), "node {i} unreachable but hardened");
      }
    }
  }

  #[test]
  fn harden_is_idempotent_and_preserves_primitive_payloads(spec in arb_graph()) {
    let mut heap = Heap::new(HeapLimits::new(1024 * 1024, 1024 * 1024));
    let objects = build_graph(&mut heap, &spec);
    let payload_key = heap.intern("payload").expect("intern");

    {
      let mut scope = heap.scope();
      let once = harden(&mut scope, Value::Object(objects[0])).expect("harden");
      let twice = harden(&mut scope, once).expect("harden twice");
      prop_assert_eq!(once, twice);
    }

    let seen = reachable(&spec);
    for (i, obj) in objects.iter().enumerate() {
      if !seen[i] {
        continue;
      }
      let desc = heap
        .object_get_own_property(*obj, payload_key)
        .expect("live")
        .expect("payload survives");
      match desc.kind {
        vm_ses::PropertyKind::Data { value, .. } => {
          prop_assert_eq!(value, Value::Int(i as i32));
        }
        vm_ses::PropertyKind::Accessor { .. } => prop_assert!(false, "payload became an accessor"),
      }
    }
  }

  #[test]
  fn promotion_sequences_are_monotonic(ops in prop::collection::vec(0u8..3, 1..12)) {
    let mut heap = Heap::new(HeapLimits::new(1024 * 1024, 1024 * 1024));
    let obj = {
      let mut scope = heap.scope();
      let obj = scope.alloc_object(ClassKind::Ordinary, None).expect("allocation");
      scope.push_root(Value::Object(obj));
      let key = scope.heap_mut().intern("p").expect("intern");
      scope
        .define_property(obj, key, PropertyDescriptor::data(Value::Int(1)))
        .expect("define");
      scope.heap_mut().add_root(Value::Object(obj));
      obj
    };

    let mut was_non_extensible = false;
    let mut was_sealed = false;
    let mut was_frozen = false;

    for op in ops {
      let mut scope = heap.scope();
      match op {
        0 => scope.prevent_extensions(obj).expect("prevent_extensions"),
        1 => scope.seal(obj).expect("seal"),
        _ => scope.freeze(obj).expect("freeze"),
      }

      let non_extensible = !scope.heap().object_is_extensible(obj).expect("live");
      let sealed = scope.is_sealed(obj).expect("predicate");
      let frozen = scope.is_frozen(obj).expect("predicate");

      // Implications up the lattice hold at every step.
      prop_assert!(non_extensible, "every promotion implies non-extensibility");
      if frozen {
        prop_assert!(sealed);
      }
      if sealed {
        prop_assert!(non_extensible);
      }

      // And no predicate ever regresses.
      prop_assert!(!(was_non_extensible && !non_extensible));
      prop_assert!(!(was_sealed && !sealed));
      prop_assert!(!(was_frozen && !frozen));

      was_non_extensible = non_extensible;
      was_sealed = sealed;
      was_frozen = frozen;
    }
  }
}
