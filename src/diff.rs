//! Diff codec.
//!
//! Patches are computed with a line diff and serialized as a compact edit
//! script. Each op is one of:
//!
//! - `=N\n` keep the next `N` bytes of the base
//! - `-N\n` drop the next `N` bytes of the base
//! - `+N:<N bytes of text>\n` insert text
//!
//! Applying a patch must consume the base exactly, so a patch applied to the
//! wrong base is rejected instead of silently producing garbage.

use similar::{Algorithm, ChangeTag, TextDiff};

use crate::error::{Error, Result};

/// One edit-script operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOp {
    Keep(usize),
    Delete(usize),
    Insert(String),
}

/// A parsed patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    ops: Vec<PatchOp>,
}

impl Patch {
    /// Compute the patch that turns `old` into `new`.
    pub fn compute(old: &str, new: &str) -> Self {
        let diff = TextDiff::configure()
            .algorithm(Algorithm::Myers)
            .diff_lines(old, new);

        let mut patch = Patch::default();
        for change in diff.iter_all_changes() {
            let value = change.value();
            match change.tag() {
                ChangeTag::Equal => patch.push(PatchOp::Keep(value.len())),
                ChangeTag::Delete => patch.push(PatchOp::Delete(value.len())),
                ChangeTag::Insert => patch.push(PatchOp::Insert(value.to_string())),
            }
        }
        patch
    }

    /// Append an op, coalescing with the previous one of the same kind.
    fn push(&mut self, op: PatchOp) {
        match (self.ops.last_mut(), op) {
            (Some(PatchOp::Keep(n)), PatchOp::Keep(m)) => *n += m,
            (Some(PatchOp::Delete(n)), PatchOp::Delete(m)) => *n += m,
            (Some(PatchOp::Insert(s)), PatchOp::Insert(t)) => s.push_str(&t),
            (_, op) => self.ops.push(op),
        }
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    /// Number of base bytes this patch expects to consume.
    pub fn base_len(&self) -> usize {
        self.ops.iter().fold(0usize, |total, op| match op {
            PatchOp::Keep(n) | PatchOp::Delete(n) => total.saturating_add(*n),
            PatchOp::Insert(_) => total,
        })
    }

    /// Serialize to the stored text form.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for op in &self.ops {
            match op {
                PatchOp::Keep(n) => out.push_str(&format!("={}\n", n)),
                PatchOp::Delete(n) => out.push_str(&format!("-{}\n", n)),
                PatchOp::Insert(text) => {
                    out.push_str(&format!("+{}:", text.len()));
                    out.push_str(text);
                    out.push('\n');
                }
            }
        }
        out
    }

    /// Parse the stored text form.
    ///
    /// # Errors
    /// Returns [`Error::Integrity`] if the text is not a well-formed patch.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut ops = Vec::new();
        let mut pos = 0;

        while pos < text.len() {
            let rest = &text[pos..];
            let tag = rest.as_bytes()[0];
            match tag {
                b'=' | b'-' => {
                    let end = rest
                        .find('\n')
                        .ok_or_else(|| malformed(pos, "unterminated op"))?;
                    let n = parse_len(&rest[1..end], pos)?;
                    ops.push(if tag == b'=' {
                        PatchOp::Keep(n)
                    } else {
                        PatchOp::Delete(n)
                    });
                    pos += end + 1;
                }
                b'+' => {
                    let colon = rest
                        .find(':')
                        .ok_or_else(|| malformed(pos, "insert without length"))?;
                    let n = parse_len(&rest[1..colon], pos)?;
                    let start = colon + 1;
                    let end = start
                        .checked_add(n)
                        .ok_or_else(|| malformed(pos, "bad length"))?;
                    let body = rest
                        .get(start..end)
                        .ok_or_else(|| malformed(pos, "insert body out of range"))?;
                    if rest.as_bytes().get(end) != Some(&b'\n') {
                        return Err(malformed(pos, "insert body not terminated"));
                    }
                    ops.push(PatchOp::Insert(body.to_string()));
                    pos += end + 1;
                }
                _ => return Err(malformed(pos, "unknown op")),
            }
        }

        Ok(Patch { ops })
    }

    /// Apply the patch to `base`.
    ///
    /// # Errors
    /// Returns [`Error::Integrity`] if the patch does not fit `base`.
    pub fn apply(&self, base: &str) -> Result<String> {
        if self.base_len() != base.len() {
            return Err(Error::integrity(format!(
                "patch expects a {}-byte base, found {} bytes",
                self.base_len(),
                base.len()
            )));
        }

        let mut out = String::with_capacity(base.len());
        let mut pos = 0;
        for op in &self.ops {
            match op {
                PatchOp::Keep(n) => {
                    let kept = base
                        .get(pos..pos + n)
                        .ok_or_else(|| Error::integrity("patch splits a character"))?;
                    out.push_str(kept);
                    pos += n;
                }
                PatchOp::Delete(n) => {
                    if base.get(pos..pos + n).is_none() {
                        return Err(Error::integrity("patch splits a character"));
                    }
                    pos += n;
                }
                PatchOp::Insert(text) => out.push_str(text),
            }
        }
        Ok(out)
    }
}

fn parse_len(digits: &str, pos: usize) -> Result<usize> {
    digits
        .parse::<usize>()
        .map_err(|_| malformed(pos, "bad length"))
}

fn malformed(pos: usize, what: &str) -> Error {
    Error::integrity(format!("malformed patch at byte {}: {}", pos, what))
}

/// Compute the serialized patch from `old` to `new`.
pub fn compute_diff(old: &str, new: &str) -> String {
    Patch::compute(old, new).to_text()
}

/// Apply a serialized patch to `base`.
///
/// `apply_patch(old, &compute_diff(old, new))` always yields `new`.
pub fn apply_patch(base: &str, patch: &str) -> Result<String> {
    Patch::from_text(patch)?.apply(base)
}
