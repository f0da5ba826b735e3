//! JPEG Lossless (Process 14) codec.
//!
//! Encoding follows ITU-T T.81 Annex H with Huffman entropy coding: a single
//! interleaved scan, a fixed DC table and point transform 0, so every encode
//! decodes back bit-exact. Decoding goes through `jpeg-decoder`, which also
//! covers point transforms, custom tables and restart intervals.

use jpeg_decoder::{CodingProcess, Decoder, PixelFormat};

use crate::config::CodecParameters;
use crate::dicom::{EncapsulatedPixelData, PixelDescription};
use crate::error::{Result, TranscodeError};
use crate::{RasterBuffer, SampleLayout};

use super::traits::{CodecCapabilities, CodecInfo, CompressionSupport, PixelCodec, PixelData};

// Markers
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOF3: u8 = 0xC3;
const DHT: u8 = 0xC4;
const SOS: u8 = 0xDA;

/// Code counts per length (1..=16) of the table used for encoding.
const DC_BITS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0];
/// Difference categories 0..=16 in code order.
const DC_VALUES: [u8; 17] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];

/// JPEG Lossless codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegLosslessCodec {
    predictor: u8,
}

impl JpegLosslessCodec {
    /// Create a codec using selection value 1 (`Ra`), as required by SV1.
    pub fn new() -> Self {
        Self { predictor: 1 }
    }

    /// Create a codec with the given predictor selection value (1-7).
    pub fn with_predictor(predictor: u8) -> Result<Self> {
        if !(1..=7).contains(&predictor) {
            return Err(TranscodeError::InvalidParameter(format!(
                "JPEG Lossless predictor must be 1-7, got {}",
                predictor
            )));
        }
        Ok(Self { predictor })
    }

    /// Predictor selection value used when encoding.
    pub fn predictor(&self) -> u8 {
        self.predictor
    }

    /// Encode a raster to a JPEG Lossless codestream.
    fn encode_jpeg(&self, raster: &RasterBuffer) -> Result<Vec<u8>> {
        if raster.width > 0xFFFF || raster.height > 0xFFFF {
            return Err(TranscodeError::UnsupportedPixelFormat(format!(
                "{}x{} exceeds JPEG frame limits",
                raster.width, raster.height
            )));
        }

        let precision = raster.bits_allocated as u8;
        let max = (1u32 << precision) - 1;
        let samples = raster.interleaved_samples();
        if let Some(&bad) = samples.iter().find(|&&s| u32::from(s) > max) {
            return Err(TranscodeError::CorruptPixelData(format!(
                "sample value {} exceeds {}-bit range",
                bad, precision
            )));
        }

        let mut codestream = Vec::new();

        // SOI (Start of Image) marker
        codestream.extend_from_slice(&[0xFF, SOI]);

        codestream.extend_from_slice(&self.create_sof3_segment(raster, precision));
        codestream.extend_from_slice(&self.create_dht_segment());
        codestream.extend_from_slice(&self.create_sos_segment(raster));

        let compressed = self.compress_scan(raster, &samples, precision);
        codestream.extend_from_slice(&compressed);

        // EOI (End of Image) marker
        codestream.extend_from_slice(&[0xFF, EOI]);

        log::debug!(
            "JPEG Lossless encoded {}x{} image to {} bytes (predictor={}, precision={})",
            raster.width,
            raster.height,
            codestream.len(),
            self.predictor,
            precision
        );

        Ok(codestream)
    }

    /// Create SOF3 (Start of Frame, lossless, Huffman) segment.
    fn create_sof3_segment(&self, raster: &RasterBuffer, precision: u8) -> Vec<u8> {
        let components = raster.samples_per_pixel as usize;
        let mut segment = vec![0xFF, SOF3];

        let length = 8 + 3 * components;
        segment.extend_from_slice(&(length as u16).to_be_bytes());
        segment.push(precision);
        segment.extend_from_slice(&(raster.height as u16).to_be_bytes());
        segment.extend_from_slice(&(raster.width as u16).to_be_bytes());
        segment.push(components as u8);

        for i in 0..components {
            segment.push(i as u8 + 1); // Component ID
            segment.push(0x11); // Sampling factors (1:1)
            segment.push(0x00); // Quantization table (unused in lossless)
        }

        segment
    }

    /// Create DHT segment holding DC table 0.
    fn create_dht_segment(&self) -> Vec<u8> {
        let mut segment = vec![0xFF, DHT];
        let length = 2 + 1 + DC_BITS.len() + DC_VALUES.len();
        segment.extend_from_slice(&(length as u16).to_be_bytes());
        segment.push(0x00); // Class 0, destination 0
        segment.extend_from_slice(&DC_BITS);
        segment.extend_from_slice(&DC_VALUES);
        segment
    }

    /// Create SOS (Start of Scan) segment for one interleaved scan.
    fn create_sos_segment(&self, raster: &RasterBuffer) -> Vec<u8> {
        let components = raster.samples_per_pixel as usize;
        let mut segment = vec![0xFF, SOS];

        let length = 6 + 2 * components;
        segment.extend_from_slice(&(length as u16).to_be_bytes());
        segment.push(components as u8);
        for i in 0..components {
            segment.push(i as u8 + 1); // Component ID
            segment.push(0x00); // DC table 0
        }
        segment.push(self.predictor); // Ss: predictor selection
        segment.push(0x00); // Se
        segment.push(0x00); // Ah/Al: point transform 0

        segment
    }

    fn compress_scan(&self, raster: &RasterBuffer, samples: &[u16], precision: u8) -> Vec<u8> {
        let width = raster.width as usize;
        let height = raster.height as usize;
        let spp = raster.samples_per_pixel as usize;
        let table = EncodingTable::new(&DC_BITS, &DC_VALUES);
        let initial = 1i32 << (precision - 1);

        let planes: Vec<Vec<u16>> = (0..spp)
            .map(|c| samples.iter().skip(c).step_by(spp).copied().collect())
            .collect();

        let mut writer = BitWriter::with_capacity(samples.len());
        for y in 0..height {
            for x in 0..width {
                for plane in &planes {
                    let prediction = predict(plane, width, x, y, self.predictor, initial);
                    let diff = i32::from(plane[y * width + x]) - prediction;
                    table.encode_difference(&mut writer, diff);
                }
            }
        }
        writer.finish()
    }
}

impl Default for JpegLosslessCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelCodec for JpegLosslessCodec {
    fn decode(&self, data: &PixelData, description: &PixelDescription) -> Result<RasterBuffer> {
        let frame = data.frame("JPEG Lossless")?;
        let mut decoder = Decoder::new(&*frame);
        decoder.read_info().map_err(decoder_error)?;
        let info = decoder.info().ok_or_else(|| {
            TranscodeError::CorruptPixelData("JPEG Lossless: no frame header".into())
        })?;

        if !matches!(info.coding_process, CodingProcess::Lossless) {
            return Err(TranscodeError::UnsupportedPixelFormat(
                "JPEG Lossless: frame is DCT-based".into(),
            ));
        }
        let components = match info.pixel_format {
            PixelFormat::L8 | PixelFormat::L16 => 1,
            PixelFormat::RGB24 => 3,
            _ => 4,
        };
        // checked before decoding so a forged header cannot size the output
        if u32::from(info.width) != description.columns
            || u32::from(info.height) != description.rows
            || components != description.samples_per_pixel
        {
            return Err(TranscodeError::CorruptPixelData(format!(
                "JPEG frame is {}x{}x{}, dataset declares {}x{}x{}",
                info.width,
                info.height,
                components,
                description.columns,
                description.rows,
                description.samples_per_pixel
            )));
        }

        let bytes = decoder.decode().map_err(decoder_error)?;
        let count = description.samples_per_frame();
        let samples: Vec<u16> = if bytes.len() == count {
            bytes.iter().map(|&b| u16::from(b)).collect()
        } else if bytes.len() == count * 2 && description.bits_allocated > 8 {
            // 16-bit output is native endian
            bytes
                .chunks_exact(2)
                .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
                .collect()
        } else {
            return Err(TranscodeError::CorruptPixelData(format!(
                "JPEG Lossless decoded {} bytes for {} samples with BitsAllocated {}",
                bytes.len(),
                count,
                description.bits_allocated
            )));
        };

        Ok(description.raster(samples, SampleLayout::Interleaved))
    }

    fn encode(
        &self,
        raster: &RasterBuffer,
        _description: &PixelDescription,
        _params: &CodecParameters,
    ) -> Result<PixelData> {
        raster.validate()?;
        if raster.bits_allocated < 2 {
            return Err(TranscodeError::UnsupportedPixelFormat(format!(
                "JPEG Lossless precision {} is below 2",
                raster.bits_allocated
            )));
        }
        let codestream = self.encode_jpeg(raster)?;
        Ok(PixelData::Encapsulated(EncapsulatedPixelData::single(
            codestream,
        )))
    }

    fn info(&self) -> CodecInfo {
        CodecInfo {
            name: "JPEG Lossless",
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

/// Prediction for the sample at (x, y) of one component plane.
fn predict(plane: &[u16], width: usize, x: usize, y: usize, predictor: u8, initial: i32) -> i32 {
    let idx = y * width + x;
    if y == 0 {
        return if x == 0 { initial } else { i32::from(plane[idx - 1]) };
    }
    if x == 0 {
        return i32::from(plane[idx - width]);
    }

    let ra = i32::from(plane[idx - 1]);
    let rb = i32::from(plane[idx - width]);
    let rc = i32::from(plane[idx - width - 1]);
    match predictor {
        1 => ra,
        2 => rb,
        3 => rc,
        4 => ra + rb - rc,
        5 => ra + ((rb - rc) >> 1),
        6 => rb + ((ra - rc) >> 1),
        7 => (ra + rb) >> 1,
        _ => ra,
    }
}

/// Difference category (SSSS) of a modulo-2^16 difference.
fn category(diff: i32) -> u8 {
    (32 - diff.unsigned_abs().leading_zeros()) as u8
}

struct EncodingTable {
    /// (code, length) per category.
    codes: [(u16, u8); 17],
}

impl EncodingTable {
    fn new(bits: &[u8; 16], values: &[u8]) -> Self {
        let mut codes = [(0u16, 0u8); 17];
        let mut code = 0u16;
        let mut k = 0;
        for (i, &count) in bits.iter().enumerate() {
            for _ in 0..count {
                let symbol = values[k] as usize;
                if symbol < codes.len() {
                    codes[symbol] = (code, i as u8 + 1);
                }
                code += 1;
                k += 1;
            }
            code <<= 1;
        }
        Self { codes }
    }

    fn encode_difference(&self, writer: &mut BitWriter, diff: i32) {
        // differences are taken modulo 2^16
        let diff = i32::from(diff as u16 as i16);
        if diff == -32768 {
            let (code, len) = self.codes[16];
            writer.write(u32::from(code), u32::from(len));
            return;
        }

        let ssss = category(diff);
        let (code, len) = self.codes[ssss as usize];
        writer.write(u32::from(code), u32::from(len));
        if ssss > 0 {
            let extra = if diff < 0 { diff - 1 } else { diff };
            writer.write(extra as u32 & ((1u32 << ssss) - 1), u32::from(ssss));
        }
    }
}

/// Entropy-coded segment writer with 0xFF byte stuffing.
struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    nbits: u32,
}

impl BitWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            out: Vec::with_capacity(capacity),
            acc: 0,
            nbits: 0,
        }
    }

    fn write(&mut self, bits: u32, len: u32) {
        if len == 0 {
            return;
        }
        self.acc = (self.acc << len) | (bits & ((1u32 << len) - 1));
        self.nbits += len;
        while self.nbits >= 8 {
            let byte = (self.acc >> (self.nbits - 8)) as u8;
            self.out.push(byte);
            if byte == 0xFF {
                self.out.push(0x00);
            }
            self.nbits -= 8;
        }
        self.acc &= (1u32 << self.nbits) - 1;
    }

    fn finish(mut self) -> Vec<u8> {
        if self.nbits > 0 {
            let pad = 8 - self.nbits;
            self.write((1u32 << pad) - 1, pad);
        }
        self.out
    }
}

fn decoder_error(err: jpeg_decoder::Error) -> TranscodeError {
    match err {
        jpeg_decoder::Error::Unsupported(feature) => TranscodeError::UnsupportedPixelFormat(
            format!("JPEG Lossless: unsupported feature {:?}", feature),
        ),
        other => TranscodeError::CorruptPixelData(format!("JPEG Lossless: {}", other)),
    }
}
