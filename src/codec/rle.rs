//! RLE Lossless codec (DICOM PS3.5 Annex G).
//!
//! Each frame is one fragment: a 64-byte header with the segment count and
//! up to 15 segment offsets, followed by one PackBits segment per byte plane.
//! For 16-bit, 3 sample data the segments are ordered
//! `R MSB | R LSB | G MSB | G LSB | B MSB | B LSB`.

use byteorder::{ByteOrder, LittleEndian};

use crate::config::CodecParameters;
use crate::dicom::{EncapsulatedPixelData, PixelDescription};
use crate::error::{Result, TranscodeError};
use crate::{RasterBuffer, SampleLayout};

use super::traits::{CodecCapabilities, CodecInfo, CompressionSupport, PixelCodec, PixelData};

const HEADER_LEN: usize = 64;
const MAX_SEGMENTS: usize = 15;
/// Most output bytes one input byte can produce: a 2-byte replicate run yields 128.
const MAX_EXPANSION: usize = 64;

/// RLE Lossless codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct RleLosslessCodec;

impl PixelCodec for RleLosslessCodec {
    fn decode(&self, data: &PixelData, description: &PixelDescription) -> Result<RasterBuffer> {
        let fragment = data.frame("RLE Lossless")?;
        let spp = description.samples_per_pixel as usize;
        let bytes_per_sample = description.bytes_per_sample();
        let pixels = description.rows as usize * description.columns as usize;

        let offsets = read_header(&fragment, spp * bytes_per_sample)?;
        // reject header geometry the segments cannot possibly fill before sizing the raster
        if let Some((segment_index, window)) = offsets
            .windows(2)
            .enumerate()
            .find(|(_, w)| (w[1] - w[0]).saturating_mul(MAX_EXPANSION) < pixels)
        {
            return Err(TranscodeError::CorruptPixelData(format!(
                "segment {}: {} bytes cannot expand to {} pixels",
                segment_index,
                window[1] - window[0],
                pixels
            )));
        }
        let mut samples = vec![0u16; pixels * spp];

        for (segment_index, window) in offsets.windows(2).enumerate() {
            let segment = &fragment[window[0]..window[1]];
            let decoded = unpack_bits(segment, pixels).map_err(|e| match e {
                TranscodeError::CorruptPixelData(msg) => {
                    TranscodeError::CorruptPixelData(format!("segment {}: {}", segment_index, msg))
                }
                other => other,
            })?;

            let sample = segment_index / bytes_per_sample;
            // segments run from most to least significant byte
            let shift = 8 * (bytes_per_sample - 1 - segment_index % bytes_per_sample);
            for (p, &byte) in decoded.iter().enumerate() {
                samples[p * spp + sample] |= u16::from(byte) << shift;
            }
        }

        Ok(description.raster(samples, SampleLayout::Interleaved))
    }

    fn encode(
        &self,
        raster: &RasterBuffer,
        _description: &PixelDescription,
        _params: &CodecParameters,
    ) -> Result<PixelData> {
        raster.validate()?;
        let spp = raster.samples_per_pixel as usize;
        let bytes_per_sample = usize::from(raster.bits_allocated).div_ceil(8);
        let segment_count = spp * bytes_per_sample;
        if segment_count > MAX_SEGMENTS {
            return Err(TranscodeError::UnsupportedPixelFormat(format!(
                "RLE Lossless supports at most {} segments, image needs {}",
                MAX_SEGMENTS, segment_count
            )));
        }

        let width = raster.width as usize;
        let samples = raster.interleaved_samples();
        let mut header = vec![0u8; HEADER_LEN];
        let mut body = Vec::new();
        LittleEndian::write_u32(&mut header[0..4], segment_count as u32);

        let mut plane = Vec::with_capacity(raster.pixel_count());
        for segment_index in 0..segment_count {
            let offset = HEADER_LEN + body.len();
            LittleEndian::write_u32(
                &mut header[4 + 4 * segment_index..8 + 4 * segment_index],
                offset as u32,
            );

            let sample = segment_index / bytes_per_sample;
            let shift = 8 * (bytes_per_sample - 1 - segment_index % bytes_per_sample);
            plane.clear();
            plane.extend(
                samples
                    .iter()
                    .skip(sample)
                    .step_by(spp)
                    .map(|&s| (s >> shift) as u8),
            );

            for row in plane.chunks(width) {
                pack_bits(row, &mut body);
            }
            if body.len() % 2 == 1 {
                body.push(0);
            }
        }

        header.extend_from_slice(&body);

        log::debug!(
            "RLE encoded {}x{} image to {} bytes in {} segments",
            raster.width,
            raster.height,
            header.len(),
            segment_count
        );

        Ok(PixelData::Encapsulated(EncapsulatedPixelData::single(header)))
    }

    fn info(&self) -> CodecInfo {
        CodecInfo {
            name: "RLE Lossless",
            mode: CompressionSupport::LosslessOnly,
            supports_quality: false,
        }
    }

    fn capabilities(&self) -> CodecCapabilities {
        CodecCapabilities {
            max_bits_per_sample: 16,
            supports_signed: true,
            supports_color: true,
        }
    }
}

/// Read the RLE header and return the segment boundaries, including the end of the last one.
fn read_header(fragment: &[u8], expected_segments: usize) -> Result<Vec<usize>> {
    if fragment.len() < HEADER_LEN {
        return Err(TranscodeError::CorruptPixelData(format!(
            "RLE fragment of {} bytes has no header",
            fragment.len()
        )));
    }

    let count = LittleEndian::read_u32(&fragment[0..4]) as usize;
    if count != expected_segments || count > MAX_SEGMENTS {
        return Err(TranscodeError::CorruptPixelData(format!(
            "RLE header declares {} segments, expected {}",
            count, expected_segments
        )));
    }

    let mut offsets = vec![0u32; count];
    LittleEndian::read_u32_into(&fragment[4..4 + 4 * count], &mut offsets);
    let mut bounds: Vec<usize> = offsets.into_iter().map(|o| o as usize).collect();
    bounds.push(fragment.len());

    let ordered = bounds.windows(2).all(|w| w[0] <= w[1]);
    if bounds[0] < HEADER_LEN || !ordered {
        return Err(TranscodeError::CorruptPixelData(
            "RLE segment offsets are out of order or outside the fragment".into(),
        ));
    }
    Ok(bounds)
}

/// PackBits-encode one row.
fn pack_bits(row: &[u8], out: &mut Vec<u8>) {
    let n = row.len();
    let mut i = 0;
    while i < n {
        let mut run = 1;
        while i + run < n && run < 128 && row[i + run] == row[i] {
            run += 1;
        }
        if run >= 2 {
            out.push((257 - run) as u8);
            out.push(row[i]);
            i += run;
            continue;
        }

        let start = i;
        i += 1;
        while i < n && i - start < 128 {
            if i + 1 < n && row[i] == row[i + 1] {
                break;
            }
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&row[start..i]);
    }
}

/// Decode a PackBits segment into exactly `expected` bytes.
fn unpack_bits(segment: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected.min(segment.len().saturating_mul(MAX_EXPANSION)));
    let mut i = 0;

    while i < segment.len() && out.len() < expected {
        let header = segment[i] as i8;
        i += 1;

        if header >= 0 {
            let count = header as usize + 1;
            let literal = segment.get(i..i + count).ok_or_else(|| {
                TranscodeError::CorruptPixelData("literal run past end of segment".into())
            })?;
            out.extend_from_slice(literal);
            i += count;
        } else if header != -128 {
            let count = (1 - isize::from(header)) as usize;
            let value = *segment.get(i).ok_or_else(|| {
                TranscodeError::CorruptPixelData("replicate run past end of segment".into())
            })?;
            out.resize(out.len() + count, value);
            i += 1;
        }
        // -128 is a no-op
    }

    if out.len() < expected {
        return Err(TranscodeError::CorruptPixelData(format!(
            "decoded {} of {} bytes",
            out.len(),
            expected
        )));
    }
    out.truncate(expected);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{gradient, image_dataset};

    fn description(rows: u16, columns: u16, bits: u16, spp: u16) -> PixelDescription {
        PixelDescription::from_dataset(&image_dataset(rows, columns, bits, spp, Vec::new())).unwrap()
    }

    #[test]
    fn test_packbits() {
        let encoded = vec![
            0xFE, 0xAA, 0x02, 0x80, 0x00, 0x2A, 0xFD, 0xAA, 0x03, 0x80, 0x00, 0x2A, 0x22, 0xF7,
            0xAA,
        ];
        let expected = vec![
            0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0xAA, 0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0x22,
            0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
        ];
        assert_eq!(unpack_bits(&encoded, expected.len()).unwrap(), expected);
    }

    #[test]
    fn test_pack_bits_long_runs_and_literals() {
        let mut row = vec![7u8; 300];
        row.extend((0..200).map(|i| i as u8));
        let mut packed = Vec::new();
        pack_bits(&row, &mut packed);
        assert!(packed.len() < row.len());
        assert_eq!(unpack_bits(&packed, row.len()).unwrap(), row);
    }

    #[test]
    fn test_round_trip_16bit_rgb() {
        let desc = description(7, 9, 16, 3);
        let raster = RasterBuffer::new(9, 7, 16, 3, gradient(9, 7, 16, 3));
        let codec = RleLosslessCodec;

        let encoded = codec
            .encode(&raster, &desc, &CodecParameters::lossless())
            .unwrap();
        match &encoded {
            PixelData::Encapsulated(data) => {
                let fragment = &data.fragments[0];
                assert_eq!(LittleEndian::read_u32(&fragment[0..4]), 6);
                assert_eq!(LittleEndian::read_u32(&fragment[4..8]), 64);
                assert_eq!(fragment.len() % 2, 0);
            }
            other => panic!("expected encapsulated data, got {:?}", other),
        }
        assert_eq!(codec.decode(&encoded, &desc).unwrap().samples, raster.samples);
    }

    #[test]
    fn test_short_segment_is_corrupt() {
        let desc = description(4, 4, 8, 1);
        let mut fragment = vec![0u8; HEADER_LEN];
        LittleEndian::write_u32(&mut fragment[0..4], 1);
        LittleEndian::write_u32(&mut fragment[4..8], 64);
        // replicate 0x11 ten times; sixteen needed
        fragment.extend_from_slice(&[0xF7, 0x11]);

        let data = PixelData::Encapsulated(EncapsulatedPixelData::single(fragment));
        let err = RleLosslessCodec.decode(&data, &desc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptPixelData);
    }

    #[test]
    fn test_segment_count_mismatch_is_corrupt() {
        let desc = description(2, 2, 16, 1);
        let raster = RasterBuffer::new(2, 2, 8, 1, vec![1, 2, 3, 4]);
        let encoded = RleLosslessCodec
            .encode(&raster, &description(2, 2, 8, 1), &CodecParameters::lossless())
            .unwrap();
        let err = RleLosslessCodec.decode(&encoded, &desc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptPixelData);
    }

    #[test]
    fn test_oversized_geometry_is_rejected_before_decoding() {
        // three 2-byte segments against a dataset declaring 65535x65535 RGB
        let desc = description(65535, 65535, 8, 3);
        let mut fragment = vec![0u8; HEADER_LEN];
        LittleEndian::write_u32(&mut fragment[0..4], 3);
        LittleEndian::write_u32(&mut fragment[4..8], 64);
        LittleEndian::write_u32(&mut fragment[8..12], 66);
        LittleEndian::write_u32(&mut fragment[12..16], 68);
        fragment.extend_from_slice(&[0x81, 0x00, 0x81, 0x00, 0x81, 0x00]);

        let data = PixelData::Encapsulated(EncapsulatedPixelData::single(fragment));
        let err = RleLosslessCodec.decode(&data, &desc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptPixelData);
    }
}
