//! A minimal raw-DEFLATE (RFC 1951) inflater, hand-rolled for `no_std`
//! use on the target device rather than pulling in a registry crate
//! (spec.md §4.L: the consumer side runs before any heap-heavy tooling
//! is available and has no use for gzip/zlib framing, only the raw
//! deflate stream the producer emits). Structurally this follows the
//! classic small reference decoder shape: a bit reader, a canonical
//! Huffman table built from code lengths, and a block-type dispatch
//! loop over stored / fixed / dynamic blocks.

use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflateError {
    UnexpectedEof,
    BadStoredBlockLength,
    BadBlockType,
    BadHuffmanTable,
    InvalidBackReference,
    OutputTooLarge,
}

struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, byte_pos: 0, bit_pos: 0 }
    }

    fn align_to_byte(&mut self) {
        if self.bit_pos != 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    fn read_bit(&mut self) -> Result<u32, InflateError> {
        let byte = *self.data.get(self.byte_pos).ok_or(InflateError::UnexpectedEof)?;
        let bit = (byte >> self.bit_pos) & 1;
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
        Ok(u32::from(bit))
    }

    fn read_bits(&mut self, count: u32) -> Result<u32, InflateError> {
        let mut value = 0u32;
        for i in 0..count {
            value |= self.read_bit()? << i;
        }
        Ok(value)
    }

    fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], InflateError> {
        self.data.get(self.byte_pos..self.byte_pos + count).ok_or(InflateError::UnexpectedEof).inspect(|_| {
            self.byte_pos += count;
        })
    }
}

/// A canonical Huffman decoder built from a list of per-symbol code
/// lengths (0 meaning "symbol unused"), decoded bit by bit.
struct HuffmanTable {
    /// `counts[len]` = how many codes of that bit length exist.
    counts: [u16; 16],
    /// Symbols sorted by (code length, symbol value).
    symbols: Vec<u16>,
}

impl HuffmanTable {
    fn build(lengths: &[u8]) -> Result<Self, InflateError> {
        let mut counts = [0u16; 16];
        for &len in lengths {
            counts[len as usize] += 1;
        }
        counts[0] = 0;

        let mut offsets = [0u16; 16];
        for len in 1..16 {
            offsets[len] = offsets[len - 1] + counts[len - 1];
        }

        let mut symbols = alloc::vec![0u16; lengths.len()];
        for (symbol, &len) in lengths.iter().enumerate() {
            if len != 0 {
                symbols[offsets[len as usize] as usize] = symbol as u16;
                offsets[len as usize] += 1;
            }
        }

        Ok(Self { counts, symbols })
    }

    fn decode(&self, reader: &mut BitReader) -> Result<u16, InflateError> {
        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for len in 1..16usize {
            code |= reader.read_bit()? as i32;
            let count = self.counts[len] as i32;
            if code - first < count {
                return Ok(self.symbols[(index + (code - first)) as usize]);
            }
            index += count;
            first += count;
            first <<= 1;
            code <<= 1;
        }
        Err(InflateError::BadHuffmanTable)
    }
}

const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];
const CODE_LENGTH_ORDER: [usize; 19] =
    [16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15];

/// Maximum decompressed size accepted, as a defense against a corrupt
/// or hostile manifest claiming an absurd `original_size`.
const MAX_OUTPUT_BYTES: usize = 256 * 1024 * 1024;

/// Inflates a raw deflate stream (no zlib/gzip header) into `expected_size`
/// bytes, matching the producer's `flate2::write::DeflateEncoder` output.
pub fn inflate(data: &[u8], expected_size: usize) -> Result<Vec<u8>, InflateError> {
    if expected_size > MAX_OUTPUT_BYTES {
        return Err(InflateError::OutputTooLarge);
    }
    let mut reader = BitReader::new(data);
    let mut out = Vec::with_capacity(expected_size);

    loop {
        let is_final = reader.read_bit()? == 1;
        let block_type = reader.read_bits(2)?;
        match block_type {
            0 => inflate_stored(&mut reader, &mut out)?,
            1 => inflate_fixed(&mut reader, &mut out)?,
            2 => inflate_dynamic(&mut reader, &mut out)?,
            _ => return Err(InflateError::BadBlockType),
        }
        if is_final {
            break;
        }
    }
    Ok(out)
}

fn inflate_stored(reader: &mut BitReader, out: &mut Vec<u8>) -> Result<(), InflateError> {
    reader.align_to_byte();
    let header = reader.read_bytes(4)?;
    let len = u16::from_le_bytes([header[0], header[1]]);
    let nlen = u16::from_le_bytes([header[2], header[3]]);
    if len != !nlen {
        return Err(InflateError::BadStoredBlockLength);
    }
    out.extend_from_slice(reader.read_bytes(len as usize)?);
    Ok(())
}

fn fixed_tables() -> (HuffmanTable, HuffmanTable) {
    let mut lit_lengths = [0u8; 288];
    for (i, len) in lit_lengths.iter_mut().enumerate() {
        *len = match i {
            0..=143 => 8,
            144..=255 => 9,
            256..=279 => 7,
            _ => 8,
        };
    }
    let dist_lengths = [5u8; 30];
    (
        HuffmanTable::build(&lit_lengths).expect("fixed literal table is well-formed"),
        HuffmanTable::build(&dist_lengths).expect("fixed distance table is well-formed"),
    )
}

fn inflate_fixed(reader: &mut BitReader, out: &mut Vec<u8>) -> Result<(), InflateError> {
    let (lit, dist) = fixed_tables();
    inflate_block(reader, &lit, &dist, out)
}

fn inflate_dynamic(reader: &mut BitReader, out: &mut Vec<u8>) -> Result<(), InflateError> {
    let hlit = reader.read_bits(5)? as usize + 257;
    let hdist = reader.read_bits(5)? as usize + 1;
    let hclen = reader.read_bits(4)? as usize + 4;

    let mut code_length_lengths = [0u8; 19];
    for i in 0..hclen {
        code_length_lengths[CODE_LENGTH_ORDER[i]] = reader.read_bits(3)? as u8;
    }
    let code_length_table = HuffmanTable::build(&code_length_lengths)?;

    let mut lengths = Vec::with_capacity(hlit + hdist);
    while lengths.len() < hlit + hdist {
        let symbol = code_length_table.decode(reader)?;
        match symbol {
            0..=15 => lengths.push(symbol as u8),
            16 => {
                let prev = *lengths.last().ok_or(InflateError::BadHuffmanTable)?;
                let repeat = reader.read_bits(2)? + 3;
                for _ in 0..repeat {
                    lengths.push(prev);
                }
            }
            17 => {
                let repeat = reader.read_bits(3)? + 3;
                for _ in 0..repeat {
                    lengths.push(0);
                }
            }
            18 => {
                let repeat = reader.read_bits(7)? + 11;
                for _ in 0..repeat {
                    lengths.push(0);
                }
            }
            _ => return Err(InflateError::BadHuffmanTable),
        }
    }
    if lengths.len() != hlit + hdist {
        return Err(InflateError::BadHuffmanTable);
    }

    let lit_table = HuffmanTable::build(&lengths[..hlit])?;
    let dist_table = HuffmanTable::build(&lengths[hlit..])?;
    inflate_block(reader, &lit_table, &dist_table, out)
}

fn inflate_block(
    reader: &mut BitReader,
    lit: &HuffmanTable,
    dist: &HuffmanTable,
    out: &mut Vec<u8>,
) -> Result<(), InflateError> {
    loop {
        let symbol = lit.decode(reader)?;
        match symbol {
            0..=255 => out.push(symbol as u8),
            256 => return Ok(()),
            257..=285 => {
                let index = (symbol - 257) as usize;
                let extra = reader.read_bits(u32::from(LENGTH_EXTRA[index]))?;
                let length = LENGTH_BASE[index] as usize + extra as usize;

                let dist_symbol = dist.decode(reader)? as usize;
                if dist_symbol >= DIST_BASE.len() {
                    return Err(InflateError::InvalidBackReference);
                }
                let dist_extra = reader.read_bits(u32::from(DIST_EXTRA[dist_symbol]))?;
                let distance = DIST_BASE[dist_symbol] as usize + dist_extra as usize;

                if distance == 0 || distance > out.len() {
                    return Err(InflateError::InvalidBackReference);
                }
                let start = out.len() - distance;
                for i in 0..length {
                    let byte = out[start + i];
                    out.push(byte);
                }
            }
            _ => return Err(InflateError::BadHuffmanTable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a single raw-deflate stored block (`BFINAL=1`, `BTYPE=00`)
    /// wrapping `payload` verbatim, matching what a producer falling back
    /// to "store" for incompressible/small input would emit.
    fn stored_block(payload: &[u8]) -> Vec<u8> {
        let mut bits = Vec::new();
        bits.push(0b0000_0001u8); // BFINAL=1, BTYPE=00, rest of byte padding
        let len = payload.len() as u16;
        bits.extend_from_slice(&len.to_le_bytes());
        bits.extend_from_slice(&(!len).to_le_bytes());
        bits.extend_from_slice(payload);
        bits
    }

    #[test]
    fn inflates_a_stored_block() {
        let payload = b"hello, deflate";
        let stream = stored_block(payload);
        let out = inflate(&stream, payload.len()).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn rejects_stored_block_with_mismatched_length_complement() {
        let mut stream = stored_block(b"abc");
        stream[3] ^= 0xFF; // corrupt NLEN
        assert_eq!(inflate(&stream, 3), Err(InflateError::BadStoredBlockLength));
    }

    #[test]
    fn rejects_absurd_expected_size() {
        assert_eq!(inflate(&[], MAX_OUTPUT_BYTES + 1), Err(InflateError::OutputTooLarge));
    }
}
