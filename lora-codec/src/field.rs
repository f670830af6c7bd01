//! Field declarations
//!
//! A [`FieldSpec`] declares how to read one field out of a payload: where it
//! starts, how wide it is, in which order its bytes (or bits) are stored,
//! whether it is signed, and which linear transform turns the raw integer into
//! a physical value. A field may also name a unit-code field and a
//! [`ScalingTable`] that picks its scale from that code. Device plugins declare their layouts as `const` tables of
//! field specs, so layouts are immutable and shared freely across threads.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;

use crate::payload::{sign_extend, PayloadBuffer};
use crate::scaling::{LinearTransform, Scaled, ScalingTable};
use crate::types::{CodecError, Result};

/// Storage order of a field's bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Most significant byte first; bit offset may be arbitrary
    BigEndian,
    /// Least significant byte first; field must be byte aligned
    LittleEndian,
    /// Bit-level reversal: the first addressed bit is the least significant
    ReversedBits,
}

/// Value type for field interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Signed,
    Unsigned,
}

/// Code-driven scaling: the code is read from another field of the payload
#[derive(Clone, Copy)]
pub struct UnitCode {
    pub code: &'static FieldSpec,
    pub table: &'static (dyn ScalingTable + Sync),
}

impl fmt::Debug for UnitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitCode")
            .field("code", &self.code.name)
            .finish_non_exhaustive()
    }
}

/// Declaration of one payload field
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Output name of the field
    pub name: &'static str,
    /// Start position in bits from the start of the payload
    pub offset: usize,
    /// Width in bits
    pub width: usize,
    pub byte_order: ByteOrder,
    pub value_type: ValueType,
    /// Raw to physical conversion
    pub transform: LinearTransform,
    /// Optional scale lookup applied after the transform
    pub unit_code: Option<UnitCode>,
}

impl FieldSpec {
    /// Unsigned big-endian field without scaling
    pub const fn new(name: &'static str, offset: usize, width: usize) -> Self {
        Self {
            name,
            offset,
            width,
            byte_order: ByteOrder::BigEndian,
            value_type: ValueType::Unsigned,
            transform: LinearTransform::IDENTITY,
            unit_code: None,
        }
    }

    /// Field addressed in whole bytes
    pub const fn bytes(name: &'static str, start_byte: usize, len: usize) -> Self {
        Self::new(name, start_byte * 8, len * 8)
    }

    /// Single-bit flag
    pub const fn flag(name: &'static str, bit: usize) -> Self {
        Self::new(name, bit, 1)
    }

    pub const fn little_endian(mut self) -> Self {
        self.byte_order = ByteOrder::LittleEndian;
        self
    }

    pub const fn reversed_bits(mut self) -> Self {
        self.byte_order = ByteOrder::ReversedBits;
        self
    }

    pub const fn signed(mut self) -> Self {
        self.value_type = ValueType::Signed;
        self
    }

    pub const fn scaled(mut self, factor: f64, offset: f64) -> Self {
        self.transform = LinearTransform::new(factor, offset);
        self
    }

    /// Scale the field by a table lookup on the code held in `code`
    pub const fn with_unit_code(
        mut self,
        code: &'static FieldSpec,
        table: &'static (dyn ScalingTable + Sync),
    ) -> Self {
        self.unit_code = Some(UnitCode { code, table });
        self
    }

    /// Bit position just past the field
    pub const fn end(&self) -> usize {
        self.offset + self.width
    }

    /// Bytes a payload needs to hold this field
    pub const fn required_bytes(&self) -> usize {
        (self.end() + 7) / 8
    }

    /// Read the raw integer, sign extended when the field is signed
    ///
    /// Range errors carry the field name.
    pub fn read_raw(&self, payload: &PayloadBuffer) -> Result<i64> {
        let unsigned = match self.byte_order {
            ByteOrder::BigEndian => payload.bits(self.offset, self.width),
            ByteOrder::ReversedBits => payload.bits_lsb_first(self.offset, self.width),
            ByteOrder::LittleEndian => self.read_little_endian(payload),
        }
        .map_err(|e| e.with_field(self.name))?;

        let value = match self.value_type {
            ValueType::Unsigned => i64::try_from(unsigned).map_err(|_| {
                CodecError::Overflow(format!("field '{}' value {} exceeds i64", self.name, unsigned))
            })?,
            ValueType::Signed => sign_extend(unsigned, self.width),
        };

        log::trace!("field '{}' raw = {}", self.name, value);
        Ok(value)
    }

    /// Read the field and apply its transform
    pub fn read(&self, payload: &PayloadBuffer) -> Result<f64> {
        let raw = self.read_raw(payload)?;
        Ok(self.transform.apply(raw as f64))
    }

    /// Read the unit code that scales this field, if it has one
    pub fn read_unit_code(&self, payload: &PayloadBuffer) -> Result<Option<u32>> {
        let Some(unit) = self.unit_code else {
            return Ok(None);
        };
        let raw = unit.code.read_raw(payload)?;
        u32::try_from(raw).map(Some).map_err(|_| {
            CodecError::Overflow(format!("unit code '{}' value {} exceeds u32", unit.code.name, raw))
        })
    }

    /// Read the field, then scale it by its unit code
    ///
    /// Fields without a unit code are always [`Scaled::Applied`]. An unknown
    /// code leaves the transformed value as [`Scaled::Unscaled`].
    pub fn read_scaled(&self, payload: &PayloadBuffer) -> Result<Scaled> {
        let value = self.read(payload)?;
        match (self.unit_code, self.read_unit_code(payload)?) {
            (Some(unit), Some(code)) => Ok(unit.table.scale(code, value)),
            _ => Ok(Scaled::Applied(value)),
        }
    }

    /// Like [`FieldSpec::read_scaled`], but an unknown unit code is an error
    pub fn read_strict(&self, payload: &PayloadBuffer) -> Result<f64> {
        match self.read_scaled(payload)? {
            Scaled::Applied(value) => Ok(value),
            Scaled::Unscaled(_) => Err(CodecError::UnknownUnitCode {
                field: self.name.to_string(),
                code: self.read_unit_code(payload)?.unwrap_or_default(),
            }),
        }
    }

    /// Read a one-bit field as a flag
    pub fn read_flag(&self, payload: &PayloadBuffer) -> Result<bool> {
        Ok(self.read_raw(payload)? != 0)
    }

    fn read_little_endian(&self, payload: &PayloadBuffer) -> Result<u64> {
        if self.offset % 8 != 0 || self.width % 8 != 0 {
            return Err(CodecError::InvalidFieldSpec(format!(
                "little-endian field '{}' must be byte aligned (offset {}, width {})",
                self.name, self.offset, self.width
            )));
        }
        if self.width > 64 {
            return Err(CodecError::InvalidFieldSpec(format!(
                "field '{}' is wider than 64 bits",
                self.name
            )));
        }

        let bytes = payload.slice(self.offset / 8, self.width / 8)?;
        let mut cursor = Cursor::new(bytes);
        cursor
            .read_uint::<LittleEndian>(bytes.len())
            .map_err(|e| CodecError::MalformedPayload(format!("field '{}': {}", self.name, e)))
    }
}

/// Smallest payload length in bytes that holds every field of a layout
pub fn required_bytes(layout: &[FieldSpec]) -> usize {
    layout.iter().map(FieldSpec::required_bytes).max().unwrap_or(0)
}
