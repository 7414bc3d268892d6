//! Label resolution, final layout, and fixup patching.
//!
//! The linker collects fragments (encoded code/data with their fixups and
//! alignment padding), assigns addresses from the base address, resolves
//! each fixup's expression against labels, external symbols and constants,
//! maps the fixup to its relocation type, and patches the output image.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::string::ToString;
use alloc::vec::Vec;

use crate::encoder::{EncodedData, EncodedInstr, Fixup, InstrBytes};
use crate::error::{AsmError, Span};
use crate::reloc::{map_fixup_kind, relocate_record, RelocationRecord, TRAP_INSTR};

// ─── FragmentBytes ─────────────────────────────────────────

/// Compact byte storage for fragment payloads.
///
/// Instructions are stored inline as [`InstrBytes`]; data directives use a
/// heap-allocated `Vec<u8>`.
#[derive(Debug, Clone)]
pub enum FragmentBytes {
    /// Inline storage for an encoded instruction.
    Inline(InstrBytes),
    /// Heap-allocated storage for data.
    Heap(Vec<u8>),
}

impl core::ops::Deref for FragmentBytes {
    type Target = [u8];
    #[inline]
    fn deref(&self) -> &[u8] {
        match self {
            FragmentBytes::Inline(ib) => ib,
            FragmentBytes::Heap(v) => v,
        }
    }
}

/// A unit of layout.
#[derive(Debug, Clone)]
pub enum Fragment {
    /// Fixed-size code or data, with fixups relative to its first byte.
    Fixed {
        /// Encoded bytes (zero at fixup sites).
        bytes: FragmentBytes,
        /// Sites still waiting for a symbol value.
        fixups: Vec<Fixup>,
        /// Source span.
        span: Span,
    },
    /// Padding up to a `2^power`-byte boundary of the absolute address,
    /// filled with the trap pattern.
    Align {
        /// Log2 of the alignment.
        power: u32,
        /// Source span of the `.align` directive.
        span: Span,
    },
}

/// Output of [`Linker::resolve`]: bytes, label table, applied relocation
/// records, and the absolute start address of every fragment (plus the end
/// address as the last entry).
pub type ResolveOutput = (Vec<u8>, Vec<(String, u64)>, Vec<RelocationRecord>, Vec<u64>);

// ─── Linker internals ──────────────────────────────────────

/// A label definition tracking which fragment it precedes.
#[derive(Debug, Clone)]
struct LabelDef {
    fragment_index: usize,
    span: Span,
}

// ─── Public API ────────────────────────────────────────────

/// The linker: collects fragments and labels, resolves everything.
#[derive(Debug)]
pub struct Linker {
    fragments: Vec<Fragment>,
    labels: BTreeMap<String, LabelDef>,
    externals: BTreeMap<String, u64>,
    constants: BTreeMap<String, i128>,
    base_address: u64,
}

impl Default for Linker {
    fn default() -> Self {
        Self::new()
    }
}

impl Linker {
    /// Create a new, empty linker with base address 0.
    pub fn new() -> Self {
        Self {
            fragments: Vec::new(),
            labels: BTreeMap::new(),
            externals: BTreeMap::new(),
            constants: BTreeMap::new(),
            base_address: 0,
        }
    }

    /// Set the base (load) address of the output image.
    pub fn set_base_address(&mut self, addr: u64) {
        self.base_address = addr;
    }

    /// Get the base address.
    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    /// The number of fragments currently added.
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Define an external symbol at a known absolute address.
    pub fn define_external(&mut self, name: &str, addr: u64) {
        self.externals.insert(String::from(name), addr);
    }

    /// Define a constant value (`.equ` / `.set`).
    pub fn define_constant(&mut self, name: &str, value: i128) {
        self.constants.insert(String::from(name), value);
    }

    /// All constants defined so far.
    pub fn constants(&self) -> &BTreeMap<String, i128> {
        &self.constants
    }

    /// Drop all fragments and labels, keeping the base address, externals
    /// and constants.
    pub fn clear(&mut self) {
        self.fragments.clear();
        self.labels.clear();
    }

    /// Add a label definition at the current position (before the next fragment).
    pub fn add_label(&mut self, name: &str, span: Span) -> Result<(), AsmError> {
        if let Some(existing) = self.labels.get(name) {
            return Err(AsmError::DuplicateLabel {
                label: String::from(name),
                span,
                first_span: existing.span,
            });
        }
        self.labels.insert(
            String::from(name),
            LabelDef {
                fragment_index: self.fragments.len(),
                span,
            },
        );
        Ok(())
    }

    /// Add a pre-built fragment.
    pub fn add_fragment(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    /// Convenience: add fixed bytes with no fixups.
    pub fn add_bytes(&mut self, bytes: Vec<u8>, span: Span) {
        self.fragments.push(Fragment::Fixed {
            bytes: FragmentBytes::Heap(bytes),
            fixups: Vec::new(),
            span,
        });
    }

    /// Add an encoded instruction.
    pub fn add_encoded(&mut self, encoded: EncodedInstr, span: Span) {
        self.fragments.push(Fragment::Fixed {
            bytes: FragmentBytes::Inline(encoded.bytes),
            fixups: encoded.fixups,
            span,
        });
    }

    /// Add an encoded data directive.
    pub fn add_data(&mut self, data: EncodedData, span: Span) {
        self.fragments.push(Fragment::Fixed {
            bytes: FragmentBytes::Heap(data.bytes),
            fixups: data.fixups,
            span,
        });
    }

    /// Add alignment padding to a `2^power`-byte boundary.
    pub fn add_alignment(&mut self, power: u32, span: Span) {
        self.fragments.push(Fragment::Align { power, span });
    }

    // ── resolve ────────────────────────────────────────────

    /// Lay out all fragments, resolve every fixup, and return the final
    /// bytes with the label table and the relocation records applied.
    ///
    /// # Note
    ///
    /// This method **consumes** the linker's fragment list. Calling it again
    /// produces an empty image.
    ///
    /// # Errors
    ///
    /// - [`AsmError::UndefinedLabel`] if a fixup names an unknown symbol.
    /// - [`AsmError::RelocationOverflow`] if a resolved value does not fit.
    /// - [`AsmError::ResourceLimitExceeded`] if a fixup site lies beyond the
    ///   32-bit offset range of a relocation record.
    /// - [`AsmError::Syntax`] if the image does not fit between the base
    ///   address and the end of the address space.
    pub fn resolve(&mut self) -> Result<ResolveOutput, AsmError> {
        let fragments = core::mem::take(&mut self.fragments);
        let offsets = self.compute_offsets(&fragments)?;
        let total = offsets.last().copied().unwrap_or(self.base_address) - self.base_address;
        log::debug!(
            "layout: {} fragments, {} bytes at 0x{:04x}",
            fragments.len(),
            total,
            self.base_address
        );

        let mut output = Vec::with_capacity(total as usize);
        for (i, frag) in fragments.iter().enumerate() {
            match frag {
                Fragment::Fixed { bytes, .. } => output.extend_from_slice(bytes),
                Fragment::Align { .. } => {
                    let padding = (offsets[i + 1] - offsets[i]) as usize;
                    output.extend(TRAP_INSTR.iter().copied().cycle().take(padding));
                }
            }
        }

        let mut records = Vec::new();
        for (i, frag) in fragments.iter().enumerate() {
            let Fragment::Fixed { fixups, .. } = frag else {
                continue;
            };
            let frag_offset = (offsets[i] - self.base_address) as usize;
            for fixup in fixups {
                let record = self.apply_fixup(&mut output, frag_offset, fixup, &offsets)?;
                records.push(record);
            }
        }

        let label_table = self
            .labels
            .iter()
            .map(|(name, def)| (name.clone(), offsets[def.fragment_index]))
            .collect();

        Ok((output, label_table, records, offsets))
    }

    /// Absolute start address of each fragment, followed by the end address.
    ///
    /// Fails when the image would run past the end of the address space.
    fn compute_offsets(&self, fragments: &[Fragment]) -> Result<Vec<u64>, AsmError> {
        let mut offsets = Vec::with_capacity(fragments.len() + 1);
        let mut pc = self.base_address;
        for frag in fragments {
            offsets.push(pc);
            let (size, span) = match frag {
                Fragment::Fixed { bytes, span, .. } => (bytes.len() as u64, *span),
                Fragment::Align { power, span } => {
                    let mask = 1u64.checked_shl(*power).map_or(u64::MAX, |a| a - 1);
                    (pc.wrapping_neg() & mask, *span)
                }
            };
            pc = pc.checked_add(size).ok_or_else(|| AsmError::Syntax {
                msg: alloc::format!(
                    "image at 0x{:x} runs past the end of the address space",
                    self.base_address
                ),
                span,
            })?;
        }
        offsets.push(pc);
        Ok(offsets)
    }

    // ── fixup patching ─────────────────────────────────────

    fn apply_fixup(
        &self,
        output: &mut [u8],
        frag_offset: usize,
        fixup: &Fixup,
        offsets: &[u64],
    ) -> Result<RelocationRecord, AsmError> {
        let site = frag_offset + fixup.offset;
        let site_offset = u32::try_from(site).map_err(|_| AsmError::ResourceLimitExceeded {
            resource: String::from("relocation offset"),
            limit: u32::MAX as usize,
        })?;
        let lookup = |name: &str| self.symbol_value(name, offsets);
        let undefined = |label: &str| AsmError::UndefinedLabel {
            label: String::from(label),
            span: fixup.span,
        };

        // `sym + c` keeps the symbol in the record; anything else is folded
        // into a single value and recorded by its expression text.
        let (symbol, addend, symbol_value) = match fixup.expr.label_addend() {
            Some((sym, addend)) => {
                let value = self.symbol_value(sym, offsets).ok_or_else(|| undefined(sym))?;
                (String::from(sym), addend, to_word64(value, fixup.span)?)
            }
            None => {
                let value = fixup
                    .expr
                    .eval_with(&lookup)
                    .map_err(undefined)?
                    .ok_or_else(|| AsmError::Syntax {
                        msg: alloc::format!("expression '{}' overflows", fixup.expr),
                        span: fixup.span,
                    })?;
                (fixup.expr.to_string(), 0, to_word64(value, fixup.span)?)
            }
        };

        let record = RelocationRecord {
            offset: site_offset,
            r_type: map_fixup_kind(fixup.kind),
            symbol,
            addend,
        };
        relocate_record(output, &record, symbol_value, self.base_address)?;
        Ok(record)
    }

    /// Value of a symbol: constants first, then externals, then labels.
    fn symbol_value(&self, name: &str, offsets: &[u64]) -> Option<i128> {
        if let Some(&value) = self.constants.get(name) {
            return Some(value);
        }
        if let Some(&addr) = self.externals.get(name) {
            return Some(i128::from(addr));
        }
        self.labels
            .get(name)
            .map(|def| i128::from(offsets[def.fragment_index]))
    }
}

/// Narrow a resolved value to the 64-bit word relocation arithmetic runs on.
/// Both signed and unsigned 64-bit values are accepted.
fn to_word64(value: i128, span: Span) -> Result<u64, AsmError> {
    let min = i128::from(i64::MIN);
    let max = i128::from(u64::MAX);
    if (min..=max).contains(&value) {
        Ok(value as u64)
    } else {
        Err(AsmError::ImmediateOverflow {
            value,
            min,
            max,
            span,
        })
    }
}

// ─── Tests ─────────────────────────────────────────────────
