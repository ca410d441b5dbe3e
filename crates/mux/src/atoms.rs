//! Low-level ISO BMFF box writing primitives.
//!
//! Every box is a 4-byte big-endian size followed by a 4-byte ASCII type;
//! "full boxes" add a 1-byte version and 3-byte flags. Sizes of variable
//! boxes are written as placeholders and patched once content length is
//! known.

use byteorder::{BigEndian, WriteBytesExt};
use std::io::{Seek, SeekFrom, Write};

use splice_common::TimeUs;

use crate::error::{MuxError, MuxResult};

/// Track timescale for video (90kHz, same as MPEG-TS).
pub const VIDEO_TIMESCALE: u32 = 90_000;

/// Movie-level timescale (millisecond precision).
pub const MOVIE_TIMESCALE: u32 = 1_000;

/// Seconds between the MP4 epoch (1904-01-01) and the Unix epoch.
pub const MP4_EPOCH_OFFSET: u64 = 2_082_844_800;

/// Write a plain box header with a known size (includes the 8 header
/// bytes).
pub fn write_header<W: Write>(writer: &mut W, box_type: &[u8; 4], size: u32) -> MuxResult<()> {
    writer.write_u32::<BigEndian>(size)?;
    writer.write_all(box_type)?;
    Ok(())
}

/// Write a full-box header: size + type + version + 24-bit flags.
pub fn write_full_header<W: Write>(
    writer: &mut W,
    box_type: &[u8; 4],
    size: u32,
    version: u8,
    flags: u32,
) -> MuxResult<()> {
    writer.write_u32::<BigEndian>(size)?;
    writer.write_all(box_type)?;
    writer.write_u32::<BigEndian>(((version as u32) << 24) | (flags & 0x00FF_FFFF))?;
    Ok(())
}

/// Begin a box of unknown size: write a zero size placeholder and the
/// type, return the placeholder position for [`end_box`].
pub fn begin_box<W: Write + Seek>(writer: &mut W, box_type: &[u8; 4]) -> MuxResult<u64> {
    let pos = writer.stream_position()?;
    writer.write_u32::<BigEndian>(0)?;
    writer.write_all(box_type)?;
    Ok(pos)
}

/// Patch the size of a box opened with [`begin_box`] to cover everything
/// written since, then restore the stream position.
pub fn end_box<W: Write + Seek>(writer: &mut W, size_pos: u64) -> MuxResult<()> {
    let current = writer.stream_position()?;
    let size = current - size_pos;
    if size > u32::MAX as u64 {
        return Err(MuxError::Oversized(format!(
            "box size {size} exceeds the 32-bit limit"
        )));
    }
    writer.seek(SeekFrom::Start(size_pos))?;
    writer.write_u32::<BigEndian>(size as u32)?;
    writer.seek(SeekFrom::Start(current))?;
    Ok(())
}

/// Begin a large box (size field 1, 64-bit extended size follows).
/// Returns the position of the extended size field for [`end_large_box`].
pub fn begin_large_box<W: Write + Seek>(writer: &mut W, box_type: &[u8; 4]) -> MuxResult<u64> {
    writer.write_u32::<BigEndian>(1)?;
    writer.write_all(box_type)?;
    let size_pos = writer.stream_position()?;
    writer.write_u64::<BigEndian>(0)?;
    Ok(size_pos)
}

/// Patch the extended size of a box opened with [`begin_large_box`].
/// The total size counts from the 8-byte standard header before
/// `size_pos`.
pub fn end_large_box<W: Write + Seek>(writer: &mut W, size_pos: u64) -> MuxResult<()> {
    let current = writer.stream_position()?;
    let total = current - (size_pos - 8);
    writer.seek(SeekFrom::Start(size_pos))?;
    writer.write_u64::<BigEndian>(total)?;
    writer.seek(SeekFrom::Start(current))?;
    Ok(())
}

/// Convert an engine timestamp to container ticks, rounding to nearest.
pub fn time_to_ticks(t: TimeUs, timescale: u32) -> u64 {
    let us = t.as_micros().max(0) as i128;
    let scaled = us * timescale as i128 + 500_000;
    (scaled / 1_000_000) as u64
}

/// Convert container ticks back to an engine timestamp.
pub fn ticks_to_time(ticks: u64, timescale: u32) -> TimeUs {
    TimeUs::from_micros((ticks as i128 * 1_000_000 / timescale as i128) as i64)
}

/// Write a 16.16 fixed-point value.
pub fn write_fixed_16_16<W: Write>(writer: &mut W, value: f64) -> MuxResult<()> {
    writer.write_i32::<BigEndian>((value * 65_536.0).round() as i32)?;
    Ok(())
}

/// Write an 8.8 fixed-point value.
pub fn write_fixed_8_8<W: Write>(writer: &mut W, value: f64) -> MuxResult<()> {
    writer.write_i16::<BigEndian>((value * 256.0).round() as i16)?;
    Ok(())
}

/// Write `count` zero bytes.
pub fn write_zeros<W: Write>(writer: &mut W, count: usize) -> MuxResult<()> {
    const ZEROS: [u8; 32] = [0; 32];
    let mut remaining = count;
    while remaining > 0 {
        let n = remaining.min(ZEROS.len());
        writer.write_all(&ZEROS[..n])?;
        remaining -= n;
    }
    Ok(())
}

/// ISO 639-2/T language code packed into 3x5 bits; falls back to "und".
pub fn encode_language(lang: &str) -> u16 {
    let bytes = lang.as_bytes();
    if bytes.len() < 3 || bytes.iter().take(3).any(|b| !b.is_ascii_lowercase()) {
        return encode_language("und");
    }
    let a = (bytes[0] - 0x60) as u16;
    let b = (bytes[1] - 0x60) as u16;
    let c = (bytes[2] - 0x60) as u16;
    (a << 10) | (b << 5) | c
}

/// Current wall-clock time as MP4 creation time (seconds since 1904).
pub fn mp4_creation_time() -> u64 {
    let unix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    MP4_EPOCH_OFFSET + unix
}

/// The 3x3 transformation matrix of a tkhd/mvhd box for a clockwise
/// display rotation. Values are 16.16 fixed point except the final
/// column, which is 2.30.
pub fn rotation_matrix(degrees: u16) -> [u32; 9] {
    const ONE: u32 = 0x0001_0000;
    const NEG_ONE: u32 = 0xFFFF_0000;
    const ONE_2_30: u32 = 0x4000_0000;
    match degrees % 360 {
        90 => [0, ONE, 0, NEG_ONE, 0, 0, 0, 0, ONE_2_30],
        180 => [NEG_ONE, 0, 0, 0, NEG_ONE, 0, 0, 0, ONE_2_30],
        270 => [0, NEG_ONE, 0, ONE, 0, 0, 0, 0, ONE_2_30],
        _ => [ONE, 0, 0, 0, ONE, 0, 0, 0, ONE_2_30],
    }
}

/// Write a rotation matrix produced by [`rotation_matrix`].
pub fn write_matrix<W: Write>(writer: &mut W, matrix: &[u32; 9]) -> MuxResult<()> {
    for value in matrix {
        writer.write_u32::<BigEndian>(*value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_layout() {
        let mut buf = Vec::new();
        write_header(&mut buf, b"ftyp", 20).unwrap();
        assert_eq!(buf.len(), 8);
        assert_eq!(&buf[0..4], &[0x00, 0x00, 0x00, 0x14]);
        assert_eq!(&buf[4..8], b"ftyp");
    }

    #[test]
    fn full_header_packs_version_and_flags() {
        let mut buf = Vec::new();
        write_full_header(&mut buf, b"tkhd", 100, 1, 0x000003).unwrap();
        assert_eq!(buf.len(), 12);
        assert_eq!(&buf[8..12], &[0x01, 0x00, 0x00, 0x03]);
    }

    #[test]
    fn begin_end_box_patches_size() {
        let mut cursor = Cursor::new(Vec::new());
        let pos = begin_box(&mut cursor, b"moov").unwrap();
        cursor.write_all(&[0xAA; 20]).unwrap();
        end_box(&mut cursor, pos).unwrap();

        let buf = cursor.into_inner();
        assert_eq!(buf.len(), 28);
        assert_eq!(&buf[0..4], &[0x00, 0x00, 0x00, 28]);
        assert_eq!(&buf[4..8], b"moov");
    }

    #[test]
    fn begin_end_large_box() {
        let mut cursor = Cursor::new(Vec::new());
        let pos = begin_large_box(&mut cursor, b"mdat").unwrap();
        cursor.write_all(&[0xBB; 32]).unwrap();
        end_large_box(&mut cursor, pos).unwrap();

        let buf = cursor.into_inner();
        // 4 (size=1) + 4 (type) + 8 (extended size) + 32 = 48
        assert_eq!(buf.len(), 48);
        assert_eq!(&buf[0..4], &[0x00, 0x00, 0x00, 0x01]);
        let extended = u64::from_be_bytes(buf[8..16].try_into().unwrap());
        assert_eq!(extended, 48);
    }

    #[test]
    fn tick_conversion() {
        assert_eq!(time_to_ticks(TimeUs::from_millis(1_000), 90_000), 90_000);
        assert_eq!(time_to_ticks(TimeUs::from_millis(500), 90_000), 45_000);
        assert_eq!(time_to_ticks(TimeUs::ZERO, 90_000), 0);
        // Negative timestamps clamp to zero ticks.
        assert_eq!(time_to_ticks(TimeUs::from_millis(-5), 90_000), 0);

        assert_eq!(ticks_to_time(90_000, 90_000), TimeUs::from_millis(1_000));
        assert_eq!(ticks_to_time(44_100, 44_100), TimeUs::from_millis(1_000));
    }

    #[test]
    fn tick_roundtrip_is_microsecond_accurate() {
        let t = TimeUs::from_micros(7_539_210);
        let back = ticks_to_time(time_to_ticks(t, VIDEO_TIMESCALE), VIDEO_TIMESCALE);
        assert!((back.as_micros() - t.as_micros()).abs() <= 12);
    }

    #[test]
    fn fixed_point_encodings() {
        let mut buf = Vec::new();
        write_fixed_16_16(&mut buf, 1.0).unwrap();
        assert_eq!(&buf, &[0x00, 0x01, 0x00, 0x00]);

        let mut buf = Vec::new();
        write_fixed_8_8(&mut buf, 1.0).unwrap();
        assert_eq!(&buf, &[0x01, 0x00]);
    }

    #[test]
    fn language_codes() {
        // u=0x15, n=0x0E, d=0x04
        assert_eq!(encode_language("und"), 0x55C4);
        assert_eq!(encode_language("eng"), 5575);
        // Garbage falls back to "und".
        assert_eq!(encode_language("x"), 0x55C4);
        assert_eq!(encode_language("EN1"), 0x55C4);
    }

    #[test]
    fn rotation_matrices() {
        assert_eq!(rotation_matrix(0)[0], 0x0001_0000);
        assert_eq!(rotation_matrix(360)[0], 0x0001_0000);
        // 90 degrees: first row is (0, 1).
        let m = rotation_matrix(90);
        assert_eq!(m[0], 0);
        assert_eq!(m[1], 0x0001_0000);
        assert_eq!(m[3], 0xFFFF_0000);
        // 180 degrees negates the diagonal.
        let m = rotation_matrix(180);
        assert_eq!(m[0], 0xFFFF_0000);
        assert_eq!(m[4], 0xFFFF_0000);
    }

    #[test]
    fn creation_time_is_past_mp4_epoch() {
        assert!(mp4_creation_time() > MP4_EPOCH_OFFSET);
    }
}
