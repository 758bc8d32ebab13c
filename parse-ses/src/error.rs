use crate::loc::Loc;

/// A parse failure: message plus the byte range it points at.
///
/// The VM converts this into a script-visible `SyntaxError` object.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("SyntaxError: {message} at byte {}", .loc.start)]
pub struct SyntaxError {
  pub message: String,
  pub loc: Loc,
}

impl SyntaxError {
  pub fn new(message: impl Into<String>, loc: Loc) -> Self {
    Self {
      message: message.into(),
      loc,
    }
  }
}
