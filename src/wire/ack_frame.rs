//! ACK frame codec for both wire dialects.
//!
//! The legacy (gQUIC) and IETF-draft layouts differ in the type-byte bit
//! assignments, the position of the block-count and timestamp-count fields,
//! and the byte order of multi-byte integers. Both describe the same
//! payload: the largest acknowledged packet number, an encoded ACK delay,
//! and a list of acknowledged ranges separated by gaps.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use crate::error::WireError;
use crate::protocol::{packet_number_length, ByteCount, PacketNumber, PacketNumberLen, Version};

/// A closed interval `[first, last]` of acknowledged packet numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRange {
    pub first: PacketNumber,
    pub last: PacketNumber,
}

/// An ACK frame.
///
/// `ack_ranges` is ordered from the highest range to the lowest, with a gap
/// of at least one packet between consecutive ranges. An empty list means a
/// single contiguous region from `lowest_acked` to `largest_acked`; a
/// non-empty list always holds at least two ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckFrame {
    pub largest_acked: PacketNumber,
    pub lowest_acked: PacketNumber,
    pub ack_ranges: Vec<AckRange>,

    /// Delay between receiving `largest_acked` and emitting this frame.
    pub delay_time: Duration,
    /// When the packet carrying `largest_acked` arrived. Set by the sender
    /// so `write` can derive the delay; never populated by `parse`.
    pub packet_received_time: Option<Instant>,
}

impl AckFrame {
    /// Parse an ACK frame positioned at its type byte.
    pub fn parse<R: Read>(r: &mut R, version: Version) -> Result<AckFrame, WireError> {
        let e = version.endianness();
        let ietf = version.uses_ietf_ack_frame();

        let type_byte = e.read_u8(r)?;

        let has_missing_ranges = if ietf {
            type_byte & 0x10 == 0x10
        } else {
            type_byte & 0x20 == 0x20
        };

        let largest_acked_len = decode_length_code((type_byte & 0x0c) >> 2, ietf);
        let missing_delta_len = decode_length_code(type_byte & 0x03, ietf);

        let mut num_ack_blocks = 0u8;
        if ietf && has_missing_ranges {
            num_ack_blocks = e.read_u8(r)?;
        }
        let mut num_timestamps = 0u8;
        if ietf {
            num_timestamps = e.read_u8(r)?;
        }

        let largest_acked = e.read_uint_n(r, largest_acked_len)?;
        let delay_time = Duration::from_micros(e.read_ufloat16(r)?);

        if !ietf && has_missing_ranges {
            num_ack_blocks = e.read_u8(r)?;
        }
        if has_missing_ranges && num_ack_blocks == 0 {
            return Err(WireError::InvalidAckRanges);
        }

        let ack_block_length = e.read_uint_n(r, missing_delta_len)?;
        if largest_acked > 0 {
            if ack_block_length < 1 {
                return Err(WireError::InvalidFirstAckRange);
            }
            if ack_block_length > largest_acked {
                return Err(WireError::InvalidAckRanges);
            }
        }

        let mut ack_ranges: Vec<AckRange> = Vec::new();
        let lowest_acked;

        if has_missing_ranges {
            let first = largest_acked
                .checked_add(1)
                .and_then(|v| v.checked_sub(ack_block_length))
                .ok_or(WireError::InvalidAckRanges)?;
            ack_ranges.push(AckRange {
                first,
                last: largest_acked,
            });

            let mut in_long_block = false;
            let mut last_range_complete = false;
            for _ in 0..num_ack_blocks {
                let gap = u64::from(e.read_u8(r)?);
                let length = e.read_uint_n(r, missing_delta_len)?;

                if in_long_block {
                    // A zero-length entry left the current range open; this
                    // entry extends it further down.
                    let range = ack_ranges.last_mut().ok_or(WireError::InvalidAckRanges)?;
                    range.first = range
                        .first
                        .checked_sub(gap)
                        .and_then(|v| v.checked_sub(length))
                        .ok_or(WireError::InvalidAckRanges)?;
                    range.last = range
                        .last
                        .checked_sub(gap)
                        .ok_or(WireError::InvalidAckRanges)?;
                } else {
                    last_range_complete = false;
                    let prev_first = match ack_ranges.last() {
                        Some(range) => range.first,
                        None => return Err(WireError::InvalidAckRanges),
                    };
                    let last = prev_first
                        .checked_sub(gap)
                        .and_then(|v| v.checked_sub(1))
                        .ok_or(WireError::InvalidAckRanges)?;
                    let first = (last + 1)
                        .checked_sub(length)
                        .ok_or(WireError::InvalidAckRanges)?;
                    ack_ranges.push(AckRange { first, last });
                }

                if length > 0 {
                    last_range_complete = true;
                }
                in_long_block = length == 0;
            }

            // A trailing range that never saw a nonzero length has
            // meaningless endpoints; drop it.
            if !last_range_complete {
                ack_ranges.pop();
            }

            lowest_acked = match ack_ranges.last() {
                Some(range) => range.first,
                None => return Err(WireError::InvalidAckRanges),
            };
        } else if largest_acked == 0 {
            lowest_acked = 0;
        } else {
            lowest_acked = largest_acked - ack_block_length + 1;
        }

        let frame = AckFrame {
            largest_acked,
            lowest_acked,
            ack_ranges,
            delay_time,
            packet_received_time: None,
        };
        if !frame.validate_ack_ranges() {
            return Err(WireError::InvalidAckRanges);
        }

        if !ietf {
            num_timestamps = e.read_u8(r)?;
        }
        if num_timestamps > 0 {
            // Delta from largest acked, then the first timestamp.
            e.read_u8(r)?;
            e.read_u32(r)?;
            for _ in 0..num_timestamps - 1 {
                // Delta from largest acked, then time since previous timestamp.
                e.read_u8(r)?;
                e.read_u16(r)?;
            }
        }

        Ok(frame)
    }

    /// Write the frame in the given dialect.
    pub fn write<W: Write>(&self, w: &mut W, version: Version) -> Result<(), WireError> {
        let e = version.endianness();
        let ietf = version.uses_ietf_ack_frame();

        let largest_acked_len = packet_number_length(self.largest_acked, version);
        let missing_delta_len = self.missing_number_delta_len(version);

        let mut type_byte: u8 = if ietf { 0xa0 } else { 0x40 };
        type_byte |= encode_length_code(largest_acked_len, ietf) << 2;
        type_byte |= encode_length_code(missing_delta_len, ietf);
        if self.has_missing_ranges() {
            type_byte |= if ietf { 0x10 } else { 0x20 };
        }
        e.write_u8(w, type_byte)?;

        let num_ranges = self.num_writable_nack_ranges();
        debug_assert!(num_ranges <= 0xff, "ACK range count must fit one byte");

        if ietf {
            if self.has_missing_ranges() {
                e.write_u8(w, (num_ranges - 1) as u8)?;
            }
            e.write_u8(w, 0)?; // no timestamps
        }

        e.write_uint_n(w, self.largest_acked, largest_acked_len.bytes())?;

        let delay = match self.packet_received_time {
            Some(received) => received.elapsed(),
            None => self.delay_time,
        };
        let delay_micros = u64::try_from(delay.as_micros()).unwrap_or(u64::MAX);
        e.write_ufloat16(w, delay_micros)?;

        if !ietf && self.has_missing_ranges() {
            e.write_u8(w, (num_ranges - 1) as u8)?;
        }

        let mut num_ranges_written: u64 = 0;
        let first_ack_block_length = if !self.has_missing_ranges() {
            self.largest_acked - self.lowest_acked + 1
        } else {
            if self.largest_acked != self.ack_ranges[0].last {
                return Err(WireError::InconsistentAckLargestAcked);
            }
            if self.lowest_acked != self.ack_ranges[self.ack_ranges.len() - 1].first {
                return Err(WireError::InconsistentAckLowestAcked);
            }
            num_ranges_written += 1;
            self.largest_acked - self.ack_ranges[0].first + 1
        };
        e.write_uint_n(w, first_ack_block_length, missing_delta_len.bytes())?;

        for i in 1..self.ack_ranges.len() {
            let range = self.ack_ranges[i];
            let length = range.last - range.first + 1;
            let gap = self.ack_ranges[i - 1].first - range.last - 1;

            let mut num = gap / 0xff + 1;
            if gap % 0xff == 0 {
                num -= 1;
            }

            if num == 1 {
                e.write_u8(w, gap as u8)?;
                e.write_uint_n(w, length, missing_delta_len.bytes())?;
                num_ranges_written += 1;
            } else {
                // A gap wider than one byte becomes a chain of (0xff, 0)
                // placeholders closed by one real entry.
                for j in 0..num {
                    let (gap_written, length_written) = if j == num - 1 {
                        ((1 + ((gap - 1) % 255)) as u8, length)
                    } else {
                        (0xff, 0)
                    };
                    e.write_u8(w, gap_written)?;
                    e.write_uint_n(w, length_written, missing_delta_len.bytes())?;
                    num_ranges_written += 1;
                }
            }

            // Ranges beyond what the one-byte count can describe are dropped.
            if num_ranges_written >= num_ranges {
                break;
            }
        }
        debug_assert_eq!(num_ranges, num_ranges_written);

        if !ietf {
            e.write_u8(w, 0)?; // no timestamps
        }
        Ok(())
    }

    /// Number of bytes `write` will emit for this frame.
    pub fn min_length(&self, version: Version) -> ByteCount {
        // Type byte, ACK delay, timestamp count.
        let mut length: ByteCount = 1 + 2 + 1;
        length += packet_number_length(self.largest_acked, version).bytes() as ByteCount;

        let missing_delta_len = self.missing_number_delta_len(version).bytes() as ByteCount;
        if self.has_missing_ranges() {
            length += (1 + missing_delta_len) * self.num_writable_nack_ranges();
        } else {
            length += missing_delta_len;
        }
        length
    }

    /// Does this frame report any missing packets?
    pub fn has_missing_ranges(&self) -> bool {
        !self.ack_ranges.is_empty()
    }

    /// Does this frame acknowledge packet `p`?
    pub fn acks_packet(&self, p: PacketNumber) -> bool {
        if p < self.lowest_acked || p > self.largest_acked {
            return false;
        }
        if self.has_missing_ranges() {
            return self
                .ack_ranges
                .iter()
                .any(|range| p >= range.first && p <= range.last);
        }
        true
    }

    /// Check the ordered-range invariant: either no explicit ranges, or at
    /// least two, each strictly below its predecessor with a gap >= 1.
    fn validate_ack_ranges(&self) -> bool {
        if self.ack_ranges.is_empty() {
            return true;
        }
        // A frame with missing packets always has at least two ranges.
        if self.ack_ranges.len() == 1 {
            return false;
        }
        if self.ack_ranges[0].last != self.largest_acked {
            return false;
        }
        for range in &self.ack_ranges {
            if range.first > range.last {
                return false;
            }
        }
        for pair in self.ack_ranges.windows(2) {
            let (prev, cur) = (pair[0], pair[1]);
            if prev.first <= cur.first {
                return false;
            }
            if prev.first <= cur.last.saturating_add(1) {
                return false;
            }
        }
        true
    }

    /// Number of gap/length entries `write` will emit, plus one for the
    /// first (implicit) range. Differs from the range count when a gap
    /// wider than 255 packets expands into placeholder entries; capped so
    /// the total fits the one-byte count field.
    fn num_writable_nack_ranges(&self) -> u64 {
        if self.ack_ranges.is_empty() {
            return 0;
        }
        let mut num_ranges: u64 = 0;
        for pair in self.ack_ranges.windows(2) {
            let gap = pair[0].first - pair[1].last - 1;
            let mut range_length = 1 + gap / 0xff;
            if gap % 0xff == 0 {
                range_length -= 1;
            }
            if num_ranges + range_length < 0xff {
                num_ranges += range_length;
            } else {
                break;
            }
        }
        num_ranges + 1
    }

    /// Field width for block lengths: the smallest that encodes the longest
    /// range, chosen from {1, 2, 4, 6} (legacy) or {1, 2, 4, 8} (IETF).
    fn missing_number_delta_len(&self, version: Version) -> PacketNumberLen {
        let max_range_length = if self.has_missing_ranges() {
            self.ack_ranges
                .iter()
                .map(|range| range.last - range.first + 1)
                .max()
                .unwrap_or(0)
        } else {
            self.largest_acked - self.lowest_acked + 1
        };

        if max_range_length <= 0xff {
            PacketNumberLen::Len1
        } else if max_range_length <= 0xffff {
            PacketNumberLen::Len2
        } else if max_range_length <= 0xffff_ffff {
            PacketNumberLen::Len4
        } else if version.uses_ietf_ack_frame() {
            PacketNumberLen::Len8
        } else {
            PacketNumberLen::Len6
        }
    }
}

/// Decode a type-byte length code into a field width in bytes.
///
/// Legacy maps {0, 1, 2, 3} to {1, 2, 4, 6}; IETF to {1, 2, 4, 8}.
fn decode_length_code(code: u8, ietf: bool) -> usize {
    if ietf {
        1 << code
    } else {
        let len = 2 * code as usize;
        if len == 0 {
            1
        } else {
            len
        }
    }
}

/// Encode a field width as a type-byte length code.
fn encode_length_code(len: PacketNumberLen, ietf: bool) -> u8 {
    if ietf {
        match len {
            PacketNumberLen::Len1 => 0,
            PacketNumberLen::Len2 => 1,
            PacketNumberLen::Len4 => 2,
            // Len6 never occurs in the IETF dialect.
            PacketNumberLen::Len6 | PacketNumberLen::Len8 => 3,
        }
    } else {
        // 1 -> 0, 2 -> 1, 4 -> 2, 6 -> 3; Len8 never occurs in legacy.
        (len.bytes() / 2) as u8
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
