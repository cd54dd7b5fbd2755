//! Sample decoding for bulk transfers.
//!
//! Unpacked transfers carry one little-endian 16-bit word per sample. Packed
//! transfers squeeze eight 12-bit samples into three little-endian 32-bit
//! words, most significant nibbles first.

/// Bytes in one packed group of eight samples.
pub(crate) const PACKED_GROUP_BYTES: usize = 12;

/// Append the 16-bit words in `buf` to `out`. A trailing odd byte is dropped.
pub(crate) fn words_into(buf: &[u8], out: &mut Vec<u16>) {
    out.reserve(buf.len() / 2);
    out.extend(
        buf.chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]])),
    );
}

/// Append the 12-bit samples packed in `buf` to `out`. A trailing partial
/// group is dropped.
pub(crate) fn unpack_into(buf: &[u8], out: &mut Vec<u16>) {
    out.reserve(buf.len() / PACKED_GROUP_BYTES * 8);
    for group in buf.chunks_exact(PACKED_GROUP_BYTES) {
        let w0 = u32::from_le_bytes([group[0], group[1], group[2], group[3]]);
        let w1 = u32::from_le_bytes([group[4], group[5], group[6], group[7]]);
        let w2 = u32::from_le_bytes([group[8], group[9], group[10], group[11]]);
        out.extend_from_slice(&[
            (w0 >> 20) as u16,
            ((w0 >> 8) & 0xfff) as u16,
            (((w0 & 0xff) << 4) | (w1 >> 28)) as u16,
            ((w1 >> 16) & 0xfff) as u16,
            ((w1 >> 4) & 0xfff) as u16,
            (((w1 & 0xf) << 8) | (w2 >> 24)) as u16,
            ((w2 >> 12) & 0xfff) as u16,
            (w2 & 0xfff) as u16,
        ]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_group() {
        let mut buf = Vec::new();
        for w in [0x1234_5678u32, 0x9abc_def0, 0x1234_5678] {
            buf.extend_from_slice(&w.to_le_bytes());
        }
        let mut out = Vec::new();
        unpack_into(&buf, &mut out);
        assert_eq!(
            out,
            [0x123, 0x456, 0x789, 0xabc, 0xdef, 0x012, 0x345, 0x678]
        );
    }

    #[test]
    fn partial_group_dropped() {
        let mut out = Vec::new();
        unpack_into(&[0xff; 20], &mut out);
        assert_eq!(out, [0xfff; 8]);
    }

    #[test]
    fn plain_words() {
        let mut out = vec![7];
        words_into(&[0x34, 0x12, 0xcd, 0xab, 0x01], &mut out);
        assert_eq!(out, [7, 0x1234, 0xabcd]);
    }
}
