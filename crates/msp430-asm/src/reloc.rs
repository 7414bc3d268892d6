//! Fixup kinds, MSP430 ELF relocation types, and the relocation patcher.
//!
//! The encoder records a [`FixupKind`] wherever an operand value is not yet
//! known. [`map_fixup_kind`] turns it into the [`RelocType`] an object file
//! would carry, and [`relocate`] writes the resolved value into the output
//! image once the symbol's address is known.

use alloc::string::String;
use core::fmt;

use crate::error::AsmError;

/// Pattern used to fill alignment gaps in code (`mov.b #0, r3`, twice).
pub const TRAP_INSTR: [u8; 4] = [0x43, 0x43, 0x43, 0x43];

/// First raw value used by target-specific fixup kinds.
const FIRST_TARGET_FIXUP: u32 = 128;

// ─── Fixup kinds ───────────────────────────────────────────

/// What kind of value a fixup site expects.
///
/// `Data1`/`Data2`/`Data4` come from data directives; the remaining kinds
/// come from instruction operands and map one-to-one onto relocation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FixupKind {
    /// 1-byte data (`.byte`).
    Data1,
    /// 2-byte data (`.word`, `.short`).
    Data2,
    /// 4-byte data (`.long`).
    Data4,
    /// 32-bit absolute.
    Abs32,
    /// 10-bit PC-relative jump displacement.
    Pcrel10,
    /// 16-bit absolute (immediate extension word).
    Abs16,
    /// 16-bit PC-relative.
    Pcrel16,
    /// 16-bit absolute, byte-addressed (indexed/absolute modes).
    Abs16Byte,
    /// 16-bit PC-relative, byte-addressed (symbolic mode).
    Pcrel16Byte,
    /// Forwarded linker-relaxation marker.
    Pcrel2x,
    /// Forwarded linker-relaxation marker.
    PcrelRl,
    /// 8-bit absolute.
    Abs8,
    /// Symbol-difference marker.
    SymDiff,
}

impl FixupKind {
    /// Every fixup kind, in raw-value order.
    pub const ALL: [FixupKind; 13] = [
        FixupKind::Data1,
        FixupKind::Data2,
        FixupKind::Data4,
        FixupKind::Abs32,
        FixupKind::Pcrel10,
        FixupKind::Abs16,
        FixupKind::Pcrel16,
        FixupKind::Abs16Byte,
        FixupKind::Pcrel16Byte,
        FixupKind::Pcrel2x,
        FixupKind::PcrelRl,
        FixupKind::Abs8,
        FixupKind::SymDiff,
    ];

    /// Raw numeric value. Generic data kinds are `0..=2`; target kinds start
    /// at 128.
    #[must_use]
    pub fn raw(self) -> u32 {
        match self {
            FixupKind::Data1 => 0,
            FixupKind::Data2 => 1,
            FixupKind::Data4 => 2,
            FixupKind::Abs32 => FIRST_TARGET_FIXUP,
            FixupKind::Pcrel10 => FIRST_TARGET_FIXUP + 1,
            FixupKind::Abs16 => FIRST_TARGET_FIXUP + 2,
            FixupKind::Pcrel16 => FIRST_TARGET_FIXUP + 3,
            FixupKind::Abs16Byte => FIRST_TARGET_FIXUP + 4,
            FixupKind::Pcrel16Byte => FIRST_TARGET_FIXUP + 5,
            FixupKind::Pcrel2x => FIRST_TARGET_FIXUP + 6,
            FixupKind::PcrelRl => FIRST_TARGET_FIXUP + 7,
            FixupKind::Abs8 => FIRST_TARGET_FIXUP + 8,
            FixupKind::SymDiff => FIRST_TARGET_FIXUP + 9,
        }
    }

    /// Decode a raw fixup kind.
    ///
    /// # Errors
    ///
    /// Returns [`AsmError::InvalidFixupKind`] for values outside the set.
    pub fn from_raw(raw: u32) -> Result<FixupKind, AsmError> {
        FixupKind::ALL
            .iter()
            .copied()
            .find(|k| k.raw() == raw)
            .ok_or(AsmError::InvalidFixupKind { kind: raw })
    }

    /// Number of bytes the fixup site covers.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            FixupKind::Data1 | FixupKind::Abs8 => 1,
            FixupKind::Data4 | FixupKind::Abs32 => 4,
            _ => 2,
        }
    }
}

/// Map an encoder fixup to the relocation type written for it.
///
/// Total over [`FixupKind`]: generic data fixups map by width, every typed
/// fixup maps to the relocation type of the same name.
#[must_use]
pub fn map_fixup_kind(kind: FixupKind) -> RelocType {
    match kind {
        FixupKind::Data1 => RelocType::Abs8,
        FixupKind::Data2 => RelocType::Abs16Byte,
        FixupKind::Data4 => RelocType::Abs32,
        FixupKind::Abs32 => RelocType::Abs32,
        FixupKind::Pcrel10 => RelocType::Pcrel10,
        FixupKind::Abs16 => RelocType::Abs16,
        FixupKind::Pcrel16 => RelocType::Pcrel16,
        FixupKind::Abs16Byte => RelocType::Abs16Byte,
        FixupKind::Pcrel16Byte => RelocType::Pcrel16Byte,
        FixupKind::Pcrel2x => RelocType::Pcrel2x,
        FixupKind::PcrelRl => RelocType::PcrelRl,
        FixupKind::Abs8 => RelocType::Abs8,
        FixupKind::SymDiff => RelocType::SymDiff,
    }
}

// ─── Relocation types ──────────────────────────────────────

/// MSP430 ELF relocation types (`R_MSP430_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RelocType {
    /// `R_MSP430_NONE`
    None,
    /// `R_MSP430_32`
    Abs32,
    /// `R_MSP430_10_PCREL`
    Pcrel10,
    /// `R_MSP430_16`
    Abs16,
    /// `R_MSP430_16_PCREL`
    Pcrel16,
    /// `R_MSP430_16_BYTE`
    Abs16Byte,
    /// `R_MSP430_16_PCREL_BYTE`
    Pcrel16Byte,
    /// `R_MSP430_2X_PCREL`
    Pcrel2x,
    /// `R_MSP430_RL_PCREL`
    PcrelRl,
    /// `R_MSP430_8`
    Abs8,
    /// `R_MSP430_SYM_DIFF`
    SymDiff,
}

impl RelocType {
    /// Every relocation type, ordered by ELF code.
    pub const ALL: [RelocType; 11] = [
        RelocType::None,
        RelocType::Abs32,
        RelocType::Pcrel10,
        RelocType::Abs16,
        RelocType::Pcrel16,
        RelocType::Abs16Byte,
        RelocType::Pcrel16Byte,
        RelocType::Pcrel2x,
        RelocType::PcrelRl,
        RelocType::Abs8,
        RelocType::SymDiff,
    ];

    /// ELF relocation type code.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            RelocType::None => 0,
            RelocType::Abs32 => 1,
            RelocType::Pcrel10 => 2,
            RelocType::Abs16 => 3,
            RelocType::Pcrel16 => 4,
            RelocType::Abs16Byte => 5,
            RelocType::Pcrel16Byte => 6,
            RelocType::Pcrel2x => 7,
            RelocType::PcrelRl => 8,
            RelocType::Abs8 => 9,
            RelocType::SymDiff => 10,
        }
    }

    /// Decode an ELF relocation type code.
    #[must_use]
    pub fn from_code(code: u32) -> Option<RelocType> {
        RelocType::ALL.get(code as usize).copied()
    }

    /// Whether the linker subtracts the site address before patching.
    #[must_use]
    pub fn is_pc_relative(self) -> bool {
        matches!(
            self,
            RelocType::Pcrel10
                | RelocType::Pcrel16
                | RelocType::Pcrel16Byte
                | RelocType::Pcrel2x
                | RelocType::PcrelRl
                | RelocType::SymDiff
        )
    }

    /// Width of the patched field in bits, or `None` for types the patcher
    /// never writes.
    #[must_use]
    pub fn width_bits(self) -> Option<u32> {
        match self {
            RelocType::Abs8 => Some(8),
            RelocType::Pcrel10 => Some(10),
            RelocType::Abs16
            | RelocType::Pcrel16
            | RelocType::Abs16Byte
            | RelocType::Pcrel16Byte => Some(16),
            RelocType::Abs32 => Some(32),
            RelocType::None | RelocType::Pcrel2x | RelocType::PcrelRl | RelocType::SymDiff => {
                None
            }
        }
    }

    /// Number of bytes read or written at the site.
    #[must_use]
    pub fn site_size(self) -> Option<usize> {
        match self.width_bits()? {
            8 => Some(1),
            32 => Some(4),
            _ => Some(2),
        }
    }

    /// Smallest value the field accepts.
    ///
    /// Data and address fields accept anything that fits as either a signed
    /// or an unsigned integer of the field width; the jump field is signed.
    #[must_use]
    pub fn min_value(self) -> i64 {
        match self.width_bits() {
            Some(bits) => -(1i64 << (bits - 1)),
            None => i64::MIN,
        }
    }

    /// Largest value the field accepts.
    #[must_use]
    pub fn max_value(self) -> i64 {
        match (self, self.width_bits()) {
            (RelocType::Pcrel10, Some(bits)) => (1i64 << (bits - 1)) - 1,
            (_, Some(bits)) => (1i64 << bits) - 1,
            (_, None) => i64::MAX,
        }
    }

    /// Whether `value` fits the field.
    #[must_use]
    pub fn fits(self, value: i64) -> bool {
        (self.min_value()..=self.max_value()).contains(&value)
    }
}

impl fmt::Display for RelocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelocType::None => "R_MSP430_NONE",
            RelocType::Abs32 => "R_MSP430_32",
            RelocType::Pcrel10 => "R_MSP430_10_PCREL",
            RelocType::Abs16 => "R_MSP430_16",
            RelocType::Pcrel16 => "R_MSP430_16_PCREL",
            RelocType::Abs16Byte => "R_MSP430_16_BYTE",
            RelocType::Pcrel16Byte => "R_MSP430_16_PCREL_BYTE",
            RelocType::Pcrel2x => "R_MSP430_2X_PCREL",
            RelocType::PcrelRl => "R_MSP430_RL_PCREL",
            RelocType::Abs8 => "R_MSP430_8",
            RelocType::SymDiff => "R_MSP430_SYM_DIFF",
        };
        f.write_str(name)
    }
}

// ─── Relocation records ────────────────────────────────────

/// A relocation as it would be persisted in an object file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelocationRecord {
    /// Byte offset of the site within the output image.
    pub offset: u32,
    /// Relocation type.
    pub r_type: RelocType,
    /// Referenced symbol.
    pub symbol: String,
    /// Constant added to the symbol value.
    pub addend: i64,
}

impl RelocationRecord {
    /// The value handed to [`relocate`]: `S + A`, minus the site address `P`
    /// for PC-relative types.
    #[must_use]
    pub fn value(&self, symbol_value: u64, site_address: u64) -> u64 {
        let v = symbol_value.wrapping_add(self.addend as u64);
        if self.r_type.is_pc_relative() {
            v.wrapping_sub(site_address)
        } else {
            v
        }
    }
}

// ─── Patcher ───────────────────────────────────────────────

fn site<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N], AsmError> {
    offset
        .checked_add(N)
        .and_then(|end| buf.get(offset..end))
        .and_then(|s| s.try_into().ok())
        .ok_or(AsmError::RelocationOutOfBounds {
            offset,
            size: N,
            len: buf.len(),
        })
}

fn check(r_type: RelocType, value: i64, offset: usize) -> Result<(), AsmError> {
    if r_type.fits(value) {
        Ok(())
    } else {
        Err(AsmError::RelocationOverflow {
            r_type,
            value,
            offset,
        })
    }
}

/// Patch the relocation site at `offset` in `buf` with `value`.
///
/// `r_type` is a raw ELF relocation code. For the 16-bit PC-relative types
/// `value` must already have the site address subtracted; for
/// `R_MSP430_10_PCREL` it is the byte distance from the jump instruction to
/// its target, and the word displacement `(value >> 1) - 1` is computed here.
///
/// The buffer is only written once every check has passed.
///
/// # Errors
///
/// - [`AsmError::UnrecognizedRelocation`] for `R_MSP430_NONE`, the forwarded
///   marker types, and unknown codes.
/// - [`AsmError::RelocationOutOfBounds`] if the site does not lie inside `buf`.
/// - [`AsmError::RelocationOverflow`] if the value does not fit the field.
pub fn relocate(buf: &mut [u8], offset: usize, r_type: u32, value: u64) -> Result<(), AsmError> {
    let ty = match RelocType::from_code(r_type) {
        Some(ty) if ty.width_bits().is_some() => ty,
        _ => return Err(AsmError::UnrecognizedRelocation { r_type, offset }),
    };
    log::trace!("relocate {} at 0x{:04x} with 0x{:x}", ty, offset, value);

    match ty {
        RelocType::Abs8 => {
            site::<1>(buf, offset)?;
            check(ty, value as i64, offset)?;
            buf[offset] = value as u8;
        }
        RelocType::Abs16 | RelocType::Pcrel16 | RelocType::Abs16Byte | RelocType::Pcrel16Byte => {
            site::<2>(buf, offset)?;
            check(ty, value as i64, offset)?;
            buf[offset..offset + 2].copy_from_slice(&(value as u16).to_le_bytes());
        }
        RelocType::Abs32 => {
            site::<4>(buf, offset)?;
            check(ty, value as i64, offset)?;
            buf[offset..offset + 4].copy_from_slice(&(value as u32).to_le_bytes());
        }
        RelocType::Pcrel10 => {
            let word = u16::from_le_bytes(site::<2>(buf, offset)?);
            let disp = i64::from((value as u16 as i16) >> 1) - 1;
            check(ty, disp, offset)?;
            let patched = (word & 0xFC00) | (disp as u16 & 0x03FF);
            buf[offset..offset + 2].copy_from_slice(&patched.to_le_bytes());
        }
        _ => return Err(AsmError::UnrecognizedRelocation { r_type, offset }),
    }
    Ok(())
}

/// Apply `record` to `buf`, with `record.offset` relative to the start of
/// the buffer and the image loaded at `base_address`.
///
/// # Errors
///
/// Same as [`relocate`].
pub fn relocate_record(
    buf: &mut [u8],
    record: &RelocationRecord,
    symbol_value: u64,
    base_address: u64,
) -> Result<(), AsmError> {
    let site_address = base_address.wrapping_add(u64::from(record.offset));
    let value = record.value(symbol_value, site_address);
    relocate(buf, record.offset as usize, record.r_type.code(), value)
}
