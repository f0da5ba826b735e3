//! Builders for synthetic DICOM files used across unit tests.

use dicom_core::VR;
use dicom_dictionary_std::tags;

use crate::config::TransferSyntax;
use crate::dicom::{Dataset, DicomFile, Element};

const LONG_VRS: &[&str] = &[
    "OB", "OD", "OF", "OL", "OV", "OW", "SQ", "SV", "UC", "UN", "UR", "UT", "UV",
];

/// Byte-level builder producing Part 10 files element by element.
pub(crate) struct FileBuilder {
    uid: String,
    explicit: bool,
    body: Vec<u8>,
}

impl FileBuilder {
    pub(crate) fn explicit() -> Self {
        Self::with_syntax(TransferSyntax::ExplicitVrLittleEndian)
    }

    pub(crate) fn implicit() -> Self {
        Self::with_syntax(TransferSyntax::ImplicitVrLittleEndian)
    }

    pub(crate) fn with_syntax(ts: TransferSyntax) -> Self {
        Self {
            uid: ts.uid().to_string(),
            explicit: ts.is_explicit_vr(),
            body: Vec::new(),
        }
    }

    /// Arbitrary UID, dataset encoded explicit.
    pub(crate) fn with_uid(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            explicit: true,
            body: Vec::new(),
        }
    }

    fn header(&mut self, group: u16, element: u16, vr: &str, length: u32) {
        self.body.extend_from_slice(&group.to_le_bytes());
        self.body.extend_from_slice(&element.to_le_bytes());
        if self.explicit {
            self.body.extend_from_slice(vr.as_bytes());
            if LONG_VRS.contains(&vr) {
                self.body.extend_from_slice(&[0, 0]);
                self.body.extend_from_slice(&length.to_le_bytes());
            } else {
                self.body.extend_from_slice(&(length as u16).to_le_bytes());
            }
        } else {
            self.body.extend_from_slice(&length.to_le_bytes());
        }
    }

    pub(crate) fn element(mut self, group: u16, element: u16, vr: &str, value: &[u8]) -> Self {
        self.header(group, element, vr, value.len() as u32);
        self.body.extend_from_slice(value);
        self
    }

    /// Undefined-length SQ whose items (and delimiter) are given raw.
    pub(crate) fn raw_sequence(mut self, group: u16, element: u16, content: &[u8]) -> Self {
        self.header(group, element, "SQ", 0xFFFF_FFFF);
        self.body.extend_from_slice(content);
        self
    }

    /// Undefined-length explicit UN whose implicit items are given raw.
    pub(crate) fn raw_un_sequence(mut self, group: u16, element: u16, content: &[u8]) -> Self {
        self.header(group, element, "UN", 0xFFFF_FFFF);
        self.body.extend_from_slice(content);
        self
    }

    /// Encapsulated Pixel Data with the given offset table and fragments.
    pub(crate) fn encapsulated(mut self, offset_table: &[u8], fragments: &[&[u8]]) -> Self {
        self.header(0x7FE0, 0x0010, "OB", 0xFFFF_FFFF);
        for item in std::iter::once(offset_table).chain(fragments.iter().copied()) {
            self.body.extend_from_slice(&[0xFE, 0xFF, 0x00, 0xE0]);
            self.body.extend_from_slice(&(item.len() as u32).to_le_bytes());
            self.body.extend_from_slice(item);
        }
        self.body.extend_from_slice(&[0xFE, 0xFF, 0xDD, 0xE0, 0, 0, 0, 0]);
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let mut uid = self.uid.into_bytes();
        if uid.len() % 2 == 1 {
            uid.push(0);
        }

        let mut meta = Vec::new();
        meta.extend_from_slice(&[0x02, 0x00, 0x01, 0x00, b'O', b'B', 0, 0, 2, 0, 0, 0, 0, 1]);
        meta.extend_from_slice(&[0x02, 0x00, 0x10, 0x00, b'U', b'I']);
        meta.extend_from_slice(&(uid.len() as u16).to_le_bytes());
        meta.extend_from_slice(&uid);

        let mut out = vec![0u8; 128];
        out.extend_from_slice(b"DICM");
        out.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, b'U', b'L', 4, 0]);
        out.extend_from_slice(&(meta.len() as u32).to_le_bytes());
        out.extend_from_slice(&meta);
        out.extend_from_slice(&self.body);
        out
    }
}

/// Smooth 8/16-bit test pattern.
pub(crate) fn gradient(width: u32, height: u32, bits: u16, samples_per_pixel: u16) -> Vec<u16> {
    let max = (1u32 << bits) - 1;
    let mut samples = Vec::with_capacity((width * height) as usize * samples_per_pixel as usize);
    for y in 0..height {
        for x in 0..width {
            for c in 0..u32::from(samples_per_pixel) {
                let v = (x * 3 + y * 5 + c * 7) * max / (width * 3 + height * 5 + 21);
                samples.push(v as u16);
            }
        }
    }
    samples
}

/// Dataset with patient/study attributes and an image pixel module.
pub(crate) fn image_dataset(
    rows: u16,
    columns: u16,
    bits: u16,
    samples_per_pixel: u16,
    pixel_bytes: Vec<u8>,
) -> Dataset {
    let mut dataset = Dataset::new();
    dataset.put(Element::from_text(
        tags::SOP_CLASS_UID,
        VR::UI,
        "1.2.840.10008.5.1.4.1.1.7",
    ));
    dataset.put(Element::from_text(tags::SOP_INSTANCE_UID, VR::UI, "1.2.826.0.1.3680043.2.1"));
    dataset.put(Element::from_text(tags::MODALITY, VR::CS, "OT"));
    dataset.put(Element::from_text(tags::PATIENT_NAME, VR::PN, "Test^Patient"));
    dataset.put(Element::from_text(tags::PATIENT_ID, VR::LO, "PID-0001"));
    dataset.put(Element::from_u16(tags::SAMPLES_PER_PIXEL, samples_per_pixel));
    let photometric = if samples_per_pixel == 3 { "RGB" } else { "MONOCHROME2" };
    dataset.put(Element::from_text(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, photometric));
    if samples_per_pixel == 3 {
        dataset.put(Element::from_u16(tags::PLANAR_CONFIGURATION, 0));
    }
    dataset.put(Element::from_u16(tags::ROWS, rows));
    dataset.put(Element::from_u16(tags::COLUMNS, columns));
    dataset.put(Element::from_u16(tags::BITS_ALLOCATED, bits));
    dataset.put(Element::from_u16(tags::BITS_STORED, bits));
    dataset.put(Element::from_u16(tags::HIGH_BIT, bits - 1));
    dataset.put(Element::from_u16(tags::PIXEL_REPRESENTATION, 0));
    let vr = if bits > 8 { VR::OW } else { VR::OB };
    dataset.put(Element::new(tags::PIXEL_DATA, vr, pixel_bytes));
    dataset
}

/// Native samples as little-endian bytes.
pub(crate) fn native_bytes(samples: &[u16], bits: u16) -> Vec<u8> {
    if bits > 8 {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    } else {
        samples.iter().map(|&s| s as u8).collect()
    }
}

/// Native single-frame image file with a gradient pattern.
pub(crate) fn image_file(
    ts: TransferSyntax,
    rows: u16,
    columns: u16,
    bits: u16,
    samples_per_pixel: u16,
) -> DicomFile {
    let samples = gradient(u32::from(columns), u32::from(rows), bits, samples_per_pixel);
    let dataset = image_dataset(rows, columns, bits, samples_per_pixel, native_bytes(&samples, bits));
    DicomFile::new(
        ts,
        "1.2.840.10008.5.1.4.1.1.7",
        "1.2.826.0.1.3680043.2.1",
        dataset,
    )
}

/// JPEG Lossless codestream whose SOF3 claims a 65535x65535 RGB frame.
///
/// Only the headers are meaningful; the scan is 17 zero bytes so the fragment has even length.
pub(crate) fn oversized_lossless_frame() -> Vec<u8> {
    let mut stream = vec![0xFF, 0xD8];
    stream.extend_from_slice(&[0xFF, 0xC3, 0, 17, 16, 0xFF, 0xFF, 0xFF, 0xFF, 3]);
    stream.extend_from_slice(&[1, 0x11, 0, 2, 0x11, 0, 3, 0x11, 0]);
    stream.extend_from_slice(&[0xFF, 0xC4, 0, 36, 0x00]);
    stream.extend_from_slice(&[0, 1, 5, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0]);
    stream.extend((0..=16u8).collect::<Vec<u8>>());
    stream.extend_from_slice(&[0xFF, 0xDA, 0, 12, 3, 1, 0, 2, 0, 3, 0, 1, 0, 0]);
    stream.extend_from_slice(&[0x00; 17]);
    stream.extend_from_slice(&[0xFF, 0xD9]);
    stream
}
