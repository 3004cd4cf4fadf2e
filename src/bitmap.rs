use packed_struct::prelude::*;
use num_enum::TryFromPrimitive;
use std::convert::TryFrom;
use phf::phf_map;

use crate::cursor::{Cursor, CursorError};

#[derive(Debug)]
pub enum BitmapError {
    OutOfRange(CursorError),
    /// 3-bit depth code with no supported pixel format behind it
    UnsupportedDepth(u8),
    UnsupportedPrimary(u8),
    UnsupportedSecondary(u8),
    BadRowStride { row_stride: u16, width: u16 },
    UnknownOpcode(u8),
    /// back-reference into output that was never written
    InvalidBackreference { position: usize, displacement: isize },
    /// command stream tries to write past the end of the index buffer
    OutputOverrun { position: usize },
    /// decoded index has no palette entry
    InvalidColorIndex(u8),
}

impl From<CursorError> for BitmapError {
    fn from(error: CursorError) -> Self {
        BitmapError::OutOfRange(error)
    }
}

const BPP_TABLE: [u8; 5] = [ 1, 4, 8, 16, 24 ];

#[derive(TryFromPrimitive, Debug, PartialEq, Clone, Copy)]
#[repr(u8)]
pub enum PrimaryCompression {
    None = 0,
    Lz = 1,
    LzOther = 2,
    Riven = 4,
}

#[derive(TryFromPrimitive, Debug, PartialEq, Clone, Copy)]
#[repr(u8)]
pub enum SecondaryCompression {
    None = 0,
    Rle8 = 1,
    RleOther = 3,
}

#[derive(PackedStruct)]
#[packed_struct(endian="msb")]
pub struct BitmapHeader {
    pub width: u16,
    pub height: u16,
    pub row_stride: u16,
    pub compression: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

pub struct Bitmap {
    pub width: u16,
    pub height: u16,
    pub row_stride: u16,
    pub pixels: Pixels,
}

pub enum Pixels {
    /// palette indices, `row_stride` per row (columns past `width` are
    /// decoded padding)
    Indexed { palette: Vec<Color>, indices: Vec<u8> },
    /// `width` RGB pixels per row
    Direct(Vec<Color>),
}

impl Bitmap {
    /// Row-major `width x height` RGB raster; padding columns are dropped.
    pub fn resolve(&self) -> Result<Vec<Color>, BitmapError> {
        match &self.pixels {
            Pixels::Direct(pixels) => Ok(pixels.clone()),
            Pixels::Indexed { palette, indices } => {
                let width = self.width as usize;
                let stride = self.row_stride as usize;
                let mut out = Vec::with_capacity(width * self.height as usize);
                for y in 0..self.height as usize {
                    for x in 0..width {
                        let index = indices[y * stride + x];
                        match palette.get(index as usize) {
                            Some(&color) => out.push(color),
                            None => return Err(BitmapError::InvalidColorIndex(index)),
                        }
                    }
                }
                Ok(out)
            }
        }
    }
}

/// Decodes one bitmap resource span (starting at its 8-byte geometry
/// header) into pixel data.
pub fn decode_bitmap(data: &[u8]) -> Result<Bitmap, BitmapError> {
    let mut cursor = Cursor::new(data);
    let header = BitmapHeader::unpack_from_slice(cursor.read_bytes(8)?).unwrap();
    let width = header.width & 0x3ff;
    let height = header.height & 0x3ff;
    let row_stride = header.row_stride & 0x3fe;

    let depth_code = (header.compression & 0b111) as u8;
    let bpp = match BPP_TABLE.get(depth_code as usize) {
        Some(&bpp) => bpp,
        None => return Err(BitmapError::UnsupportedDepth(depth_code)),
    };
    let secondary = ((header.compression >> 4) & 0xf) as u8;
    match SecondaryCompression::try_from(secondary) {
        Ok(SecondaryCompression::None) => {}
        _ => return Err(BitmapError::UnsupportedSecondary(secondary)),
    }
    let primary = ((header.compression >> 8) & 0xf) as u8;
    let compressed = match PrimaryCompression::try_from(primary) {
        Ok(PrimaryCompression::None) => false,
        Ok(PrimaryCompression::Riven) => true,
        _ => return Err(BitmapError::UnsupportedPrimary(primary)),
    };

    if bpp == 24 {
        return decode_direct(&mut cursor, width, height, row_stride);
    }
    if bpp != 8 {
        // 1/4/16 bpp exist in the format but never in shipped archives
        return Err(BitmapError::UnsupportedDepth(depth_code));
    }
    if width > row_stride {
        return Err(BitmapError::BadRowStride{ row_stride, width });
    }

    cursor.skip(3)?;                       // format metadata, unused
    let color_count = cursor.read_u8()? as usize + 1;
    let mut palette = Vec::with_capacity(color_count);
    for _ in 0..color_count {
        let b = cursor.read_u8()?;
        let g = cursor.read_u8()?;
        let r = cursor.read_u8()?;
        palette.push(Color{ r, g, b });
    }

    let capacity = row_stride as usize * height as usize;
    let indices = if compressed {
        cursor.skip(4)?;                   // unknown field before the command stream
        let len = cursor.remaining();
        expand_duplets(cursor.read_bytes(len)?, capacity)?
    } else {
        cursor.read_bytes(capacity)?.to_vec()
    };

    Ok(Bitmap{ width, height, row_stride, pixels: Pixels::Indexed{ palette, indices } })
}

fn decode_direct(cursor: &mut Cursor, width: u16, height: u16, row_stride: u16)
    -> Result<Bitmap, BitmapError>
{
    let pixel_bytes = width as usize * 3;
    let padding = match (row_stride as usize).checked_sub(pixel_bytes) {
        Some(padding) => padding,
        None => return Err(BitmapError::BadRowStride{ row_stride, width }),
    };
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for _ in 0..height {
        for _ in 0..width {
            let b = cursor.read_u8()?;
            let g = cursor.read_u8()?;
            let r = cursor.read_u8()?;
            pixels.push(Color{ r, g, b });
        }
        // rows are padded out to the stored stride
        cursor.skip(padding)?;
    }
    Ok(Bitmap{ width, height, row_stride, pixels: Pixels::Direct(pixels) })
}

/// `(duplet count, r flag)` for the packed copy-run sub-commands. The low
/// two bits of the opcode extend the displacement operand, so each row
/// covers four opcode values. `r == 0` means a trailing literal overwrites
/// the final pixel of the run.
static COPY_RUN_LENGTHS: phf::Map<u8, (u8, u8)> = phf_map!{
    0xa4u8 => (2, 0), 0xa5u8 => (2, 0), 0xa6u8 => (2, 0), 0xa7u8 => (2, 0),
    0xa8u8 => (2, 1), 0xa9u8 => (2, 1), 0xaau8 => (2, 1), 0xabu8 => (2, 1),
    0xacu8 => (3, 0), 0xadu8 => (3, 0), 0xaeu8 => (3, 0), 0xafu8 => (3, 0),
    0xb4u8 => (3, 1), 0xb5u8 => (3, 1), 0xb6u8 => (3, 1), 0xb7u8 => (3, 1),
    0xb8u8 => (4, 0), 0xb9u8 => (4, 0), 0xbau8 => (4, 0), 0xbbu8 => (4, 0),
    0xbcu8 => (4, 1), 0xbdu8 => (4, 1), 0xbeu8 => (4, 1), 0xbfu8 => (4, 1),
    0xe4u8 => (5, 0), 0xe5u8 => (5, 0), 0xe6u8 => (5, 0), 0xe7u8 => (5, 0),
    0xe8u8 => (5, 1), 0xe9u8 => (5, 1), 0xeau8 => (5, 1), 0xebu8 => (5, 1),
    0xecu8 => (6, 0), 0xedu8 => (6, 0), 0xeeu8 => (6, 0), 0xefu8 => (6, 0),
    0xf4u8 => (6, 1), 0xf5u8 => (6, 1), 0xf6u8 => (6, 1), 0xf7u8 => (6, 1),
    0xf8u8 => (7, 0), 0xf9u8 => (7, 0), 0xfau8 => (7, 0), 0xfbu8 => (7, 0),
};

/// One decoded sub-command. Pixel arithmetic wraps modulo 256; `back`
/// displacements count duplets or pixels as noted.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum SubOp {
    /// copy the duplet `back` duplets behind the cursor
    CopyDuplet { back: u8 },
    /// previous first pixel, then a literal
    PrevFirstLiteral,
    /// previous first pixel, then the pixel `back` pixels behind
    PrevFirstPixelBack { back: u8 },
    /// previous duplet with `x` added to its second pixel
    PrevAddSecond { x: u8 },
    PrevSubSecond { x: u8 },
    /// a literal, then the previous second pixel
    LiteralPrevSecond,
    /// the pixel `back` pixels behind, then the previous second pixel
    PixelBackPrevSecond { back: u8 },
    TwoLiterals,
    PixelBackLiteral { back: u8 },
    LiteralPixelBack { back: u8 },
    LiteralPrevSecondAdd { x: u8 },
    LiteralPrevSecondSub { x: u8 },
    PrevAddFirst { x: u8 },
    PrevFirstAddLiteral { x: u8 },
    /// nibble deltas in the operand byte, applied to both pixels
    PrevAddBoth,
    PrevAddFirstSubSecond,
    PrevSubFirst { x: u8 },
    PrevFirstSubLiteral { x: u8 },
    PrevSubFirstAddSecond,
    /// 8-bit subtrahend for the first pixel, split across opcode and operand
    PrevSubBothWide { x_high: u8 },
    /// copy `duplets` duplets from a pixel displacement extended by
    /// `offset_high`; `trailer` appends a literal over the final pixel
    CopyRun { duplets: u8, trailer: bool, offset_high: u8 },
    /// copy run with all fields packed into the operand bytes
    CopyRunExt,
}

pub fn sub_op(opcode: u8) -> Result<SubOp, BitmapError> {
    let low = opcode & 0x0f;
    let op = match opcode {
        0x01..=0x0f => SubOp::CopyDuplet { back: low },
        0x10 => SubOp::PrevFirstLiteral,
        0x11..=0x1f => SubOp::PrevFirstPixelBack { back: low },
        0x20..=0x2f => SubOp::PrevAddSecond { x: low },
        0x30..=0x3f => SubOp::PrevSubSecond { x: low },
        0x40 => SubOp::LiteralPrevSecond,
        0x41..=0x4f => SubOp::PixelBackPrevSecond { back: low },
        0x50 => SubOp::TwoLiterals,
        0x51..=0x57 => SubOp::PixelBackLiteral { back: opcode & 0x07 },
        0x59..=0x5f => SubOp::LiteralPixelBack { back: opcode & 0x07 },
        0x60..=0x6f => SubOp::LiteralPrevSecondAdd { x: low },
        0x70..=0x7f => SubOp::LiteralPrevSecondSub { x: low },
        0x80..=0x8f => SubOp::PrevAddFirst { x: low },
        0x90..=0x9f => SubOp::PrevFirstAddLiteral { x: low },
        0xa0 => SubOp::PrevAddBoth,
        0xb0 => SubOp::PrevAddFirstSubSecond,
        0xc0..=0xcf => SubOp::PrevSubFirst { x: low },
        0xd0..=0xdf => SubOp::PrevFirstSubLiteral { x: low },
        0xe0 => SubOp::PrevSubFirstAddSecond,
        0xf0 | 0xff => SubOp::PrevSubBothWide { x_high: low },
        0xfc => SubOp::CopyRunExt,
        _ => match COPY_RUN_LENGTHS.get(&opcode) {
            Some(&(duplets, r)) => SubOp::CopyRun{
                duplets,
                trailer: r == 0,
                offset_high: opcode & 0x03,
            },
            None => return Err(BitmapError::UnknownOpcode(opcode)),
        },
    };
    Ok(op)
}

/// Index buffer under construction. `peek` only addresses already-written
/// output, so the zero initialization can never leak through a
/// back-reference.
struct IndexBuffer {
    data: Vec<u8>,
    q: usize,
}

impl IndexBuffer {
    fn new(capacity: usize) -> IndexBuffer {
        IndexBuffer{ data: vec![ 0u8; capacity ], q: 0 }
    }

    fn push(&mut self, value: u8) -> Result<(), BitmapError> {
        if self.q >= self.data.len() {
            return Err(BitmapError::OutputOverrun{ position: self.q });
        }
        self.data[self.q] = value;
        self.q += 1;
        Ok(())
    }

    fn peek(&self, displacement: isize) -> Result<u8, BitmapError> {
        let position = self.q as isize + displacement;
        if position < 0 || position >= self.q as isize {
            return Err(BitmapError::InvalidBackreference{ position: self.q, displacement });
        }
        Ok(self.data[position as usize])
    }

    fn replace_last(&mut self, value: u8) -> Result<(), BitmapError> {
        if self.q == 0 {
            return Err(BitmapError::InvalidBackreference{ position: 0, displacement: -1 });
        }
        self.data[self.q - 1] = value;
        Ok(())
    }
}

fn apply_sub_op(op: SubOp, input: &mut Cursor, out: &mut IndexBuffer)
    -> Result<(), BitmapError>
{
    match op {
        SubOp::CopyDuplet { back } => {
            let displacement = -2 * back as isize;
            let first = out.peek(displacement)?;
            out.push(first)?;
            let second = out.peek(displacement)?;
            out.push(second)?;
        }
        SubOp::PrevFirstLiteral => {
            let first = out.peek(-2)?;
            out.push(first)?;
            let second = input.read_u8()?;
            out.push(second)?;
        }
        SubOp::PrevFirstPixelBack { back } => {
            let first = out.peek(-2)?;
            out.push(first)?;
            let second = out.peek(-(back as isize))?;
            out.push(second)?;
        }
        SubOp::PrevAddSecond { x } => {
            let first = out.peek(-2)?;
            out.push(first)?;
            let second = out.peek(-2)?.wrapping_add(x);
            out.push(second)?;
        }
        SubOp::PrevSubSecond { x } => {
            let first = out.peek(-2)?;
            out.push(first)?;
            let second = out.peek(-2)?.wrapping_sub(x);
            out.push(second)?;
        }
        SubOp::LiteralPrevSecond => {
            let first = input.read_u8()?;
            out.push(first)?;
            let second = out.peek(-2)?;
            out.push(second)?;
        }
        SubOp::PixelBackPrevSecond { back } => {
            let first = out.peek(-(back as isize))?;
            out.push(first)?;
            let second = out.peek(-2)?;
            out.push(second)?;
        }
        SubOp::TwoLiterals => {
            let first = input.read_u8()?;
            out.push(first)?;
            let second = input.read_u8()?;
            out.push(second)?;
        }
        SubOp::PixelBackLiteral { back } => {
            let first = out.peek(-(back as isize))?;
            out.push(first)?;
            let second = input.read_u8()?;
            out.push(second)?;
        }
        SubOp::LiteralPixelBack { back } => {
            let first = input.read_u8()?;
            out.push(first)?;
            let second = out.peek(-(back as isize))?;
            out.push(second)?;
        }
        SubOp::LiteralPrevSecondAdd { x } => {
            let first = input.read_u8()?;
            out.push(first)?;
            let second = out.peek(-2)?.wrapping_add(x);
            out.push(second)?;
        }
        SubOp::LiteralPrevSecondSub { x } => {
            let first = input.read_u8()?;
            out.push(first)?;
            let second = out.peek(-2)?.wrapping_sub(x);
            out.push(second)?;
        }
        SubOp::PrevAddFirst { x } => {
            let first = out.peek(-2)?.wrapping_add(x);
            out.push(first)?;
            let second = out.peek(-2)?;
            out.push(second)?;
        }
        SubOp::PrevFirstAddLiteral { x } => {
            let first = out.peek(-2)?.wrapping_add(x);
            out.push(first)?;
            let second = input.read_u8()?;
            out.push(second)?;
        }
        SubOp::PrevAddBoth => {
            let deltas = input.read_u8()?;
            let first = out.peek(-2)?.wrapping_add(deltas >> 4);
            out.push(first)?;
            let second = out.peek(-2)?.wrapping_add(deltas & 0x0f);
            out.push(second)?;
        }
        SubOp::PrevAddFirstSubSecond => {
            let deltas = input.read_u8()?;
            let first = out.peek(-2)?.wrapping_add(deltas >> 4);
            out.push(first)?;
            let second = out.peek(-2)?.wrapping_sub(deltas & 0x0f);
            out.push(second)?;
        }
        SubOp::PrevSubFirst { x } => {
            let first = out.peek(-2)?.wrapping_sub(x);
            out.push(first)?;
            let second = out.peek(-2)?;
            out.push(second)?;
        }
        SubOp::PrevFirstSubLiteral { x } => {
            let first = out.peek(-2)?.wrapping_sub(x);
            out.push(first)?;
            let second = input.read_u8()?;
            out.push(second)?;
        }
        SubOp::PrevSubFirstAddSecond => {
            let deltas = input.read_u8()?;
            let first = out.peek(-2)?.wrapping_sub(deltas >> 4);
            out.push(first)?;
            let second = out.peek(-2)?.wrapping_add(deltas & 0x0f);
            out.push(second)?;
        }
        SubOp::PrevSubBothWide { x_high } => {
            let operand = input.read_u8()?;
            let x = (x_high << 4) | (operand >> 4);
            let first = out.peek(-2)?.wrapping_sub(x);
            out.push(first)?;
            let second = out.peek(-2)?.wrapping_sub(operand & 0x0f);
            out.push(second)?;
        }
        SubOp::CopyRun { duplets, trailer, offset_high } => {
            let operand = input.read_u8()?;
            let displacement = -((operand as u16 | ((offset_high as u16) << 8)) as isize);
            copy_run(out, displacement, duplets as usize)?;
            if trailer {
                let value = input.read_u8()?;
                out.replace_last(value)?;
            }
        }
        SubOp::CopyRunExt => {
            let packed = input.read_u8()?;
            let duplets = (packed >> 3) as usize + 2;
            let trailer = (packed >> 2) & 1 == 0;
            let operand = input.read_u8()?;
            let displacement = -((operand as u16 | (((packed & 0x03) as u16) << 8)) as isize);
            copy_run(out, displacement, duplets)?;
            if trailer {
                let value = input.read_u8()?;
                out.replace_last(value)?;
            }
        }
    }
    Ok(())
}

// Element-by-element so that runs overlapping the write cursor re-read
// freshly written output, like any LZ copy.
fn copy_run(out: &mut IndexBuffer, displacement: isize, duplets: usize)
    -> Result<(), BitmapError>
{
    for _ in 0..duplets * 2 {
        let value = out.peek(displacement)?;
        out.push(value)?;
    }
    Ok(())
}

/// Expands a Riven command stream into `capacity` palette indices.
///
/// Running off the end of the input between commands is treated as an
/// implicit end of stream; shipped archives always terminate with 0x00
/// first, so this tolerance is an assumption, not a format guarantee.
pub fn expand_duplets(input: &[u8], capacity: usize) -> Result<Vec<u8>, BitmapError> {
    let mut cursor = Cursor::new(input);
    let mut out = IndexBuffer::new(capacity);
    while !cursor.at_end() {
        let cmd = cursor.read_u8()?;
        match cmd {
            0x00 => break,
            0x01..=0x3f => {
                // n literal duplets follow as raw index bytes
                for _ in 0..cmd as usize * 2 {
                    let value = cursor.read_u8()?;
                    out.push(value)?;
                }
            }
            0x40..=0x7f => {
                // repeat the last duplet n times
                for _ in 0..cmd & 0x3f {
                    let first = out.peek(-2)?;
                    out.push(first)?;
                    let second = out.peek(-2)?;
                    out.push(second)?;
                }
            }
            0x80..=0xbf => {
                // repeat the last two duplets n times
                for _ in 0..cmd & 0x3f {
                    for _ in 0..4 {
                        let value = out.peek(-4)?;
                        out.push(value)?;
                    }
                }
            }
            _ => {
                // block of n sub-commands
                for _ in 0..cmd & 0x3f {
                    let opcode = cursor.read_u8()?;
                    apply_sub_op(sub_op(opcode)?, &mut cursor, &mut out)?;
                }
            }
        }
    }
    Ok(out.data)
}
