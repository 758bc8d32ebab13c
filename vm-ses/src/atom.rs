use crate::handle::Atom;
use ahash::AHashMap;
use std::borrow::Cow;

/// Well-known atoms baked into every atom table, in declaration order.
///
/// These play the role of image-resident strings: they are `&'static str` data that the
/// collector never touches. The constants below are indices into this array.
const BAKED: &[&str] = &[
  "length",
  "prototype",
  "constructor",
  "name",
  "message",
  "value",
  "writable",
  "enumerable",
  "configurable",
  "get",
  "set",
  "globalThis",
  "undefined",
  "NaN",
  "Infinity",
  "globals",
  "globalLexicals",
  "evaluate",
];

pub(crate) const ATOM_LENGTH: Atom = Atom(0);
pub(crate) const ATOM_PROTOTYPE: Atom = Atom(1);
pub(crate) const ATOM_CONSTRUCTOR: Atom = Atom(2);
pub(crate) const ATOM_NAME: Atom = Atom(3);
pub(crate) const ATOM_MESSAGE: Atom = Atom(4);
pub(crate) const ATOM_VALUE: Atom = Atom(5);
pub(crate) const ATOM_WRITABLE: Atom = Atom(6);
pub(crate) const ATOM_ENUMERABLE: Atom = Atom(7);
pub(crate) const ATOM_CONFIGURABLE: Atom = Atom(8);
pub(crate) const ATOM_GET: Atom = Atom(9);
pub(crate) const ATOM_SET: Atom = Atom(10);
pub(crate) const ATOM_GLOBAL_THIS: Atom = Atom(11);
pub(crate) const ATOM_UNDEFINED: Atom = Atom(12);
pub(crate) const ATOM_NAN: Atom = Atom(13);
pub(crate) const ATOM_INFINITY: Atom = Atom(14);
pub(crate) const ATOM_GLOBALS: Atom = Atom(15);
pub(crate) const ATOM_GLOBAL_LEXICALS: Atom = Atom(16);

/// The process-wide intern table for property keys.
///
/// Entries are either baked (`&'static str`, never charged to the heap budget) or runtime-interned
/// owned strings (charged on first interning). Atoms are immortal: a property table can therefore
/// never contain a dangling key, and the collector has no atom pointers to visit.
pub(crate) struct AtomTable {
  entries: Vec<Cow<'static, str>>,
  index: AHashMap<Box<str>, Atom>,
}

impl AtomTable {
  pub(crate) fn new() -> Self {
    let mut table = Self {
      entries: Vec::with_capacity(BAKED.len()),
      index: AHashMap::with_capacity(BAKED.len()),
    };
    for &name in BAKED {
      let atom = Atom(table.entries.len() as u32);
      table.entries.push(Cow::Borrowed(name));
      table.index.insert(name.into(), atom);
    }
    table
  }

  /// Looks up an existing atom without interning.
  pub(crate) fn lookup(&self, s: &str) -> Option<Atom> {
    self.index.get(s).copied()
  }

  /// Interns `s`, returning the new atom and the number of fresh bytes the caller must charge to
  /// the heap budget (zero when the atom already existed).
  pub(crate) fn intern(&mut self, s: &str) -> (Atom, usize) {
    if let Some(atom) = self.index.get(s) {
      return (*atom, 0);
    }
    let atom = Atom(self.entries.len() as u32);
    self.entries.push(Cow::Owned(s.to_owned()));
    self.index.insert(s.into(), atom);
    // Two owned copies (entry + index key) plus the index slot itself; the entry bytes are the
    // dominant, stable cost, so that is what the budget tracks.
    (atom, s.len())
  }

  pub(crate) fn str_of(&self, atom: Atom) -> &str {
    &self.entries[atom.0 as usize]
  }

  pub(crate) fn len(&self) -> usize {
    self.entries.len()
  }
}
