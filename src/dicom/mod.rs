//! DICOM Part 10 container model, parsing and writing.
//!
//! Elements keep their raw little-endian value bytes so that every element a
//! conversion does not touch is written back exactly as it was read.

mod dictionary;
mod parser;
mod writer;

pub use dictionary::implicit_vr;
pub use parser::{parse_bytes, read_file, PixelSegment};
pub use writer::{to_bytes, write_file};

use std::borrow::Cow;
use std::path::Path;

use dicom_core::{Tag, VR};
use dicom_dictionary_std::tags;

use crate::config::{TransferSyntax, WriteMode};
use crate::error::{Result, TranscodeError};
use crate::{RasterBuffer, SampleLayout};

/// Item tag (FFFE,E000).
pub(crate) const ITEM: Tag = Tag(0xFFFE, 0xE000);
/// Item Delimitation Item tag (FFFE,E00D).
pub(crate) const ITEM_DELIMITER: Tag = Tag(0xFFFE, 0xE00D);
/// Sequence Delimitation Item tag (FFFE,E0DD).
pub(crate) const SEQUENCE_DELIMITER: Tag = Tag(0xFFFE, 0xE0DD);
/// Length value meaning "undefined length".
pub(crate) const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// Implementation Class UID written into new file meta groups.
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.188187428522165922043985226971472281131";
/// Implementation Version Name written into new file meta groups.
pub const IMPLEMENTATION_VERSION_NAME: &str = "MEDIMG_TC_010";

/// Encapsulated pixel data: Basic Offset Table followed by fragments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncapsulatedPixelData {
    /// Raw Basic Offset Table item value (may be empty).
    pub offset_table: Vec<u8>,
    /// Fragment item values, in order.
    pub fragments: Vec<Vec<u8>>,
}

impl EncapsulatedPixelData {
    /// Single-frame pixel data held in one fragment.
    pub fn single(fragment: Vec<u8>) -> Self {
        Self {
            offset_table: Vec::new(),
            fragments: vec![fragment],
        }
    }

    /// The bytes of a single frame spread over all fragments.
    pub fn frame_bytes(&self) -> Cow<'_, [u8]> {
        match self.fragments.as_slice() {
            [only] => Cow::Borrowed(only.as_slice()),
            many => Cow::Owned(many.concat()),
        }
    }
}

/// Value of a data element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Primitive value as raw little-endian bytes.
    Bytes(Vec<u8>),
    /// Sequence of items.
    Sequence {
        /// Items of the sequence.
        items: Vec<Item>,
        /// Whether the sequence was encoded with undefined length.
        undefined_length: bool,
    },
    /// Encapsulated pixel data.
    Fragments(EncapsulatedPixelData),
}

/// One item of a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Nested dataset.
    pub dataset: Dataset,
    /// Whether the item was encoded with undefined length.
    pub undefined_length: bool,
}

/// A tagged field of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Attribute tag.
    pub tag: Tag,
    /// Value representation.
    pub vr: VR,
    /// Element value.
    pub value: Value,
}

impl Element {
    /// Element with a raw byte value.
    pub fn new(tag: Tag, vr: VR, bytes: Vec<u8>) -> Self {
        Self {
            tag,
            vr,
            value: Value::Bytes(bytes),
        }
    }

    /// Element with a string value, padded to even length.
    ///
    /// UI values are padded with NUL, all other text with a space.
    pub fn from_text(tag: Tag, vr: VR, text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        if bytes.len() % 2 == 1 {
            bytes.push(if vr == VR::UI { 0 } else { b' ' });
        }
        Self::new(tag, vr, bytes)
    }

    /// Element with a single US value.
    pub fn from_u16(tag: Tag, value: u16) -> Self {
        Self::new(tag, VR::US, value.to_le_bytes().to_vec())
    }

    /// Raw bytes of a primitive value.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.value {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Primitive value as text with padding removed.
    pub fn to_str(&self) -> Option<String> {
        let bytes = self.bytes()?;
        let text = String::from_utf8_lossy(bytes);
        Some(text.trim_end_matches(['\0', ' ']).trim_start().to_string())
    }

    /// First US value.
    pub fn to_u16(&self) -> Option<u16> {
        match self.bytes()? {
            [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }
}

/// Ordered collection of elements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dataset {
    elements: Vec<Element>,
}

impl Dataset {
    /// Empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element without reordering; used while decoding.
    pub(crate) fn push(&mut self, element: Element) {
        self.elements.push(element);
    }

    /// Replace the element with the same tag, or insert before the first larger tag.
    ///
    /// Parsed datasets keep file order, which need not be sorted.
    pub fn put(&mut self, element: Element) -> Option<Element> {
        if let Some(idx) = self.elements.iter().position(|e| e.tag == element.tag) {
            return Some(std::mem::replace(&mut self.elements[idx], element));
        }
        let idx = self
            .elements
            .iter()
            .position(|e| e.tag > element.tag)
            .unwrap_or(self.elements.len());
        self.elements.insert(idx, element);
        None
    }

    /// Element with the given tag.
    pub fn get(&self, tag: Tag) -> Option<&Element> {
        self.elements.iter().find(|e| e.tag == tag)
    }

    /// Remove the element with the given tag.
    pub fn remove(&mut self, tag: Tag) -> Option<Element> {
        let idx = self.elements.iter().position(|e| e.tag == tag)?;
        Some(self.elements.remove(idx))
    }

    /// Iterate over elements in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Element> {
        self.elements.iter()
    }

    /// Number of top-level elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the dataset has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// First US value of an element.
    pub fn u16_value(&self, tag: Tag) -> Option<u16> {
        self.get(tag).and_then(Element::to_u16)
    }

    /// Text value of an element.
    pub fn string_value(&self, tag: Tag) -> Option<String> {
        self.get(tag).and_then(Element::to_str)
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Element;
    type IntoIter = std::slice::Iter<'a, Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

/// Image Pixel Module attributes that drive decoding and encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelDescription {
    /// Rows.
    pub rows: u32,
    /// Columns.
    pub columns: u32,
    /// Samples per pixel.
    pub samples_per_pixel: u16,
    /// Bits allocated.
    pub bits_allocated: u16,
    /// Bits stored.
    pub bits_stored: u16,
    /// High bit.
    pub high_bit: u16,
    /// 0 = unsigned, 1 = two's complement.
    pub pixel_representation: u16,
    /// 0 = interleaved, 1 = planar.
    pub planar_configuration: u16,
    /// Photometric interpretation.
    pub photometric_interpretation: String,
    /// Number of frames.
    pub number_of_frames: u32,
}

impl PixelDescription {
    /// Extract the pixel description from a dataset.
    pub fn from_dataset(dataset: &Dataset) -> Result<Self> {
        let required = |tag: Tag, name: &str| {
            dataset.u16_value(tag).ok_or_else(|| {
                TranscodeError::MalformedContainer(format!("missing {} attribute", name))
            })
        };

        let rows = required(tags::ROWS, "Rows")?;
        let columns = required(tags::COLUMNS, "Columns")?;
        let bits_allocated = required(tags::BITS_ALLOCATED, "BitsAllocated")?;
        let bits_stored = dataset.u16_value(tags::BITS_STORED).unwrap_or(bits_allocated);
        let high_bit = dataset
            .u16_value(tags::HIGH_BIT)
            .unwrap_or(bits_stored.saturating_sub(1));

        let number_of_frames = dataset
            .string_value(tags::NUMBER_OF_FRAMES)
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(1);

        Ok(Self {
            rows: u32::from(rows),
            columns: u32::from(columns),
            samples_per_pixel: dataset.u16_value(tags::SAMPLES_PER_PIXEL).unwrap_or(1),
            bits_allocated,
            bits_stored,
            high_bit,
            pixel_representation: dataset.u16_value(tags::PIXEL_REPRESENTATION).unwrap_or(0),
            planar_configuration: dataset.u16_value(tags::PLANAR_CONFIGURATION).unwrap_or(0),
            photometric_interpretation: dataset
                .string_value(tags::PHOTOMETRIC_INTERPRETATION)
                .unwrap_or_else(|| "MONOCHROME2".into()),
            number_of_frames,
        })
    }

    /// Reject layouts outside single-frame 8/16-bit imaging.
    pub fn ensure_supported(&self) -> Result<()> {
        if self.number_of_frames != 1 {
            return Err(TranscodeError::UnsupportedPixelFormat(format!(
                "{} frames; only single-frame images are converted",
                self.number_of_frames
            )));
        }
        if self.bits_allocated != 8 && self.bits_allocated != 16 {
            return Err(TranscodeError::UnsupportedPixelFormat(format!(
                "BitsAllocated {} is not supported",
                self.bits_allocated
            )));
        }
        if self.bits_stored == 0 || self.bits_stored > self.bits_allocated {
            return Err(TranscodeError::UnsupportedPixelFormat(format!(
                "BitsStored {} exceeds BitsAllocated {}",
                self.bits_stored, self.bits_allocated
            )));
        }
        if self.samples_per_pixel != 1 && self.samples_per_pixel != 3 {
            return Err(TranscodeError::UnsupportedPixelFormat(format!(
                "SamplesPerPixel {} is not supported",
                self.samples_per_pixel
            )));
        }
        if self.rows == 0 || self.columns == 0 {
            return Err(TranscodeError::UnsupportedPixelFormat("empty image".into()));
        }
        Ok(())
    }

    /// Whether samples are two's complement.
    pub fn is_signed(&self) -> bool {
        self.pixel_representation == 1
    }

    /// Layout of native pixel data.
    pub fn native_layout(&self) -> SampleLayout {
        if self.samples_per_pixel > 1 && self.planar_configuration == 1 {
            SampleLayout::Planar
        } else {
            SampleLayout::Interleaved
        }
    }

    /// Bytes used by one sample in native encoding.
    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_allocated).div_ceil(8)
    }

    /// Number of samples in one frame.
    pub fn samples_per_frame(&self) -> usize {
        self.rows as usize * self.columns as usize * self.samples_per_pixel as usize
    }

    /// Build a raster with this description's geometry.
    pub fn raster(&self, samples: Vec<u16>, layout: SampleLayout) -> RasterBuffer {
        RasterBuffer {
            width: self.columns,
            height: self.rows,
            bits_allocated: self.bits_allocated,
            bits_stored: self.bits_stored,
            samples_per_pixel: self.samples_per_pixel,
            signed: self.is_signed(),
            layout,
            samples,
        }
    }
}

/// A DICOM Part 10 file held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct DicomFile {
    preamble: Vec<u8>,
    /// File Meta Information (group 0002).
    pub meta: Dataset,
    /// Main dataset.
    pub dataset: Dataset,
    transfer_syntax: TransferSyntax,
    pixel_segment: Option<PixelSegment>,
}

impl DicomFile {
    /// Create a file with a freshly built file meta group.
    pub fn new(
        transfer_syntax: TransferSyntax,
        sop_class_uid: &str,
        sop_instance_uid: &str,
        dataset: Dataset,
    ) -> Self {
        let mut meta = Dataset::new();
        meta.put(Element::new(
            tags::FILE_META_INFORMATION_VERSION,
            VR::OB,
            vec![0x00, 0x01],
        ));
        meta.put(Element::from_text(
            tags::MEDIA_STORAGE_SOP_CLASS_UID,
            VR::UI,
            sop_class_uid,
        ));
        meta.put(Element::from_text(
            tags::MEDIA_STORAGE_SOP_INSTANCE_UID,
            VR::UI,
            sop_instance_uid,
        ));
        meta.put(Element::from_text(
            tags::TRANSFER_SYNTAX_UID,
            VR::UI,
            transfer_syntax.uid(),
        ));
        meta.put(Element::from_text(
            tags::IMPLEMENTATION_CLASS_UID,
            VR::UI,
            IMPLEMENTATION_CLASS_UID,
        ));
        meta.put(Element::from_text(
            tags::IMPLEMENTATION_VERSION_NAME,
            VR::SH,
            IMPLEMENTATION_VERSION_NAME,
        ));

        Self {
            preamble: vec![0; parser::PREAMBLE_LEN],
            meta,
            dataset,
            transfer_syntax,
            pixel_segment: None,
        }
    }

    pub(crate) fn from_parts(
        preamble: Vec<u8>,
        meta: Dataset,
        dataset: Dataset,
        transfer_syntax: TransferSyntax,
        pixel_segment: Option<PixelSegment>,
    ) -> Self {
        Self {
            preamble,
            meta,
            dataset,
            transfer_syntax,
            pixel_segment,
        }
    }

    /// Read and parse a file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_file(path)
    }

    /// Parse a file from memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        parse_bytes(bytes)
    }

    /// The 128-byte preamble.
    pub fn preamble(&self) -> &[u8] {
        &self.preamble
    }

    /// Declared transfer syntax.
    pub fn transfer_syntax(&self) -> TransferSyntax {
        self.transfer_syntax
    }

    /// Change the declared transfer syntax, updating (0002,0010).
    pub fn set_transfer_syntax(&mut self, transfer_syntax: TransferSyntax) {
        self.transfer_syntax = transfer_syntax;
        self.meta.put(Element::from_text(
            tags::TRANSFER_SYNTAX_UID,
            VR::UI,
            transfer_syntax.uid(),
        ));
    }

    /// Location of the pixel data value in the file it was parsed from.
    pub fn pixel_segment(&self) -> Option<PixelSegment> {
        self.pixel_segment
    }

    /// The top-level Pixel Data element.
    pub fn pixel_data(&self) -> Result<&Element> {
        self.dataset
            .get(tags::PIXEL_DATA)
            .ok_or_else(|| TranscodeError::MalformedContainer("no Pixel Data element".into()))
    }

    /// Replace the top-level Pixel Data element.
    pub fn set_pixel_data(&mut self, vr: VR, value: Value) {
        self.dataset.put(Element {
            tag: tags::PIXEL_DATA,
            vr,
            value,
        });
        self.pixel_segment = None;
    }

    /// Serialize the file.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        to_bytes(self)
    }

    /// Serialize the file to disk.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P, mode: WriteMode) -> Result<()> {
        write_file(self, path, mode)
    }
}
