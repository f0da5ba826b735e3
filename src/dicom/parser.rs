//! DICOM Part 10 reader.

use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use dicom_core::{Tag, VR};
use dicom_dictionary_std::tags;

use super::dictionary::implicit_vr;
use super::{
    Dataset, DicomFile, Element, EncapsulatedPixelData, Item, Value, ITEM, ITEM_DELIMITER,
    SEQUENCE_DELIMITER, UNDEFINED_LENGTH,
};
use crate::config::TransferSyntax;
use crate::error::{Result, TranscodeError};

pub(crate) const PREAMBLE_LEN: usize = 128;
pub(crate) const MAGIC: &[u8; 4] = b"DICM";

/// Nesting depth beyond which a file is rejected.
const MAX_DEPTH: usize = 32;

/// Byte range of the top-level Pixel Data value within the parsed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelSegment {
    /// Offset of the first value byte (just after the element header).
    pub offset: u64,
    /// Number of value bytes, including item headers and delimiters when encapsulated.
    pub length: u64,
    /// Whether the value is encapsulated.
    pub encapsulated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Explicit,
    Implicit,
}

/// Where reading a dataset stops.
#[derive(Debug, Clone, Copy)]
enum Stop {
    EndOfData,
    Offset(usize),
    ItemDelimiter,
}

/// Explicit VRs encoded with a 2-byte reserved field and a 4-byte length.
pub(crate) fn has_long_length(vr: VR) -> bool {
    matches!(
        vr.to_string(),
        "OB" | "OD" | "OF" | "OL" | "OV" | "OW" | "SQ" | "SV" | "UC" | "UN" | "UR" | "UT" | "UV"
    )
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                TranscodeError::MalformedContainer(format!(
                    "truncated {} at offset {} ({} bytes needed, {} available)",
                    what,
                    self.pos,
                    n,
                    self.data.len() - self.pos
                ))
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2, what)?))
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4, what)?))
    }

    fn tag(&mut self) -> Result<Tag> {
        let group = self.u16("element tag")?;
        let element = self.u16("element tag")?;
        Ok(Tag(group, element))
    }

    fn peek_group(&self) -> Option<u16> {
        self.data
            .get(self.pos..self.pos + 2)
            .map(LittleEndian::read_u16)
    }
}

/// Read and parse a DICOM file from disk.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<DicomFile> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    log::debug!("Read {} bytes from {}", bytes.len(), path.display());
    parse_bytes(&bytes)
}

/// Parse a DICOM file held in memory.
pub fn parse_bytes(bytes: &[u8]) -> Result<DicomFile> {
    let mut reader = Reader::new(bytes);

    let preamble = reader
        .take(PREAMBLE_LEN, "preamble")
        .map_err(|_| TranscodeError::MalformedContainer("missing 128-byte preamble".into()))?
        .to_vec();
    let magic = reader
        .take(MAGIC.len(), "DICM prefix")
        .map_err(|_| TranscodeError::MalformedContainer("missing DICM prefix".into()))?;
    if magic != MAGIC {
        return Err(TranscodeError::MalformedContainer(
            "DICM prefix not found after preamble".into(),
        ));
    }

    let meta = read_meta_group(&mut reader)?;
    let uid = meta.string_value(tags::TRANSFER_SYNTAX_UID).ok_or_else(|| {
        TranscodeError::MalformedContainer("file meta group has no Transfer Syntax UID".into())
    })?;
    let transfer_syntax =
        TransferSyntax::from_uid(&uid).ok_or(TranscodeError::UnsupportedSyntax(uid))?;

    let encoding = if transfer_syntax.is_explicit_vr() {
        Encoding::Explicit
    } else {
        Encoding::Implicit
    };

    let mut pixel_segment = None;
    let dataset = read_dataset(
        &mut reader,
        encoding,
        Stop::EndOfData,
        0,
        &mut pixel_segment,
    )?;

    if pixel_segment.is_none() {
        return Err(TranscodeError::MalformedContainer(
            "dataset has no Pixel Data element".into(),
        ));
    }

    log::debug!(
        "Parsed {} top-level elements, transfer syntax {}",
        dataset.len(),
        transfer_syntax
    );

    Ok(DicomFile::from_parts(
        preamble,
        meta,
        dataset,
        transfer_syntax,
        pixel_segment,
    ))
}

fn read_meta_group(reader: &mut Reader<'_>) -> Result<Dataset> {
    let mut meta = Dataset::new();
    let mut unused = None;
    while reader.peek_group() == Some(0x0002) {
        let element = read_element(reader, Encoding::Explicit, 0, &mut unused)?;
        meta.push(element);
    }
    if meta.is_empty() {
        return Err(TranscodeError::MalformedContainer(
            "missing file meta information group".into(),
        ));
    }
    Ok(meta)
}

fn read_dataset(
    reader: &mut Reader<'_>,
    encoding: Encoding,
    stop: Stop,
    depth: usize,
    pixel_segment: &mut Option<PixelSegment>,
) -> Result<Dataset> {
    if depth > MAX_DEPTH {
        return Err(TranscodeError::MalformedContainer(
            "sequences nested too deeply".into(),
        ));
    }

    let mut dataset = Dataset::new();
    loop {
        match stop {
            Stop::EndOfData if reader.is_empty() => break,
            Stop::Offset(end) if reader.pos >= end => {
                if reader.pos > end {
                    return Err(TranscodeError::MalformedContainer(format!(
                        "element overruns item ending at offset {}",
                        end
                    )));
                }
                break;
            }
            Stop::ItemDelimiter if reader.is_empty() => {
                return Err(TranscodeError::MalformedContainer(
                    "item without delimiter".into(),
                ));
            }
            _ => {}
        }

        if reader.data[reader.pos..].len() >= 4 {
            let group = LittleEndian::read_u16(&reader.data[reader.pos..]);
            let element = LittleEndian::read_u16(&reader.data[reader.pos + 2..]);
            if Tag(group, element) == ITEM_DELIMITER {
                reader.pos += 4;
                reader.u32("item delimiter length")?;
                if matches!(stop, Stop::ItemDelimiter) {
                    break;
                }
                return Err(TranscodeError::MalformedContainer(format!(
                    "unexpected item delimiter at offset {}",
                    reader.pos - 8
                )));
            }
        }

        let element = read_element(reader, encoding, depth, pixel_segment)?;
        dataset.push(element);
    }
    Ok(dataset)
}

fn read_element(
    reader: &mut Reader<'_>,
    encoding: Encoding,
    depth: usize,
    pixel_segment: &mut Option<PixelSegment>,
) -> Result<Element> {
    let header_offset = reader.pos;
    let tag = reader.tag()?;
    if tag.group() == 0xFFFE {
        return Err(TranscodeError::MalformedContainer(format!(
            "unexpected item tag {} at offset {}",
            tag, header_offset
        )));
    }

    let (vr, length) = match encoding {
        Encoding::Explicit => {
            let code = reader.take(2, "value representation")?;
            let vr = VR::from_binary([code[0], code[1]]).ok_or_else(|| {
                TranscodeError::MalformedContainer(format!(
                    "invalid value representation {:?} for {} at offset {}",
                    String::from_utf8_lossy(code),
                    tag,
                    header_offset
                ))
            })?;
            let length = if has_long_length(vr) {
                reader.take(2, "reserved bytes")?;
                reader.u32("value length")?
            } else {
                u32::from(reader.u16("value length")?)
            };
            (vr, length)
        }
        Encoding::Implicit => {
            let length = reader.u32("value length")?;
            let vr = match implicit_vr(tag) {
                VR::UN if length == UNDEFINED_LENGTH => VR::SQ,
                vr => vr,
            };
            (vr, length)
        }
    };

    let value_offset = reader.pos;
    let is_pixel_data = tag == tags::PIXEL_DATA && depth == 0;

    let value = if length == UNDEFINED_LENGTH {
        if tag == tags::PIXEL_DATA {
            Value::Fragments(read_fragments(reader)?)
        } else if vr == VR::SQ {
            Value::Sequence {
                items: read_items(reader, encoding, None, depth, pixel_segment)?,
                undefined_length: true,
            }
        } else if vr == VR::UN {
            // UN with undefined length holds an implicit VR sequence
            Value::Sequence {
                items: read_items(reader, Encoding::Implicit, None, depth, pixel_segment)?,
                undefined_length: true,
            }
        } else {
            return Err(TranscodeError::MalformedContainer(format!(
                "undefined length on non-sequence element {} ({})",
                tag,
                vr.to_string()
            )));
        }
    } else if vr == VR::SQ {
        let end = value_offset
            .checked_add(length as usize)
            .filter(|&end| end <= reader.data.len())
            .ok_or_else(|| {
                TranscodeError::MalformedContainer(format!(
                    "sequence {} overruns end of data",
                    tag
                ))
            })?;
        Value::Sequence {
            items: read_items(reader, encoding, Some(end), depth, pixel_segment)?,
            undefined_length: false,
        }
    } else {
        Value::Bytes(reader.take(length as usize, "element value")?.to_vec())
    };

    if is_pixel_data {
        *pixel_segment = Some(PixelSegment {
            offset: value_offset as u64,
            length: (reader.pos - value_offset) as u64,
            encapsulated: matches!(value, Value::Fragments(_)),
        });
    }

    Ok(Element { tag, vr, value })
}

fn read_items(
    reader: &mut Reader<'_>,
    encoding: Encoding,
    end: Option<usize>,
    depth: usize,
    pixel_segment: &mut Option<PixelSegment>,
) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    loop {
        if let Some(end) = end {
            if reader.pos >= end {
                break;
            }
        }

        let item_offset = reader.pos;
        let tag = reader.tag()?;
        let length = reader.u32("item length")?;

        if tag == SEQUENCE_DELIMITER {
            if end.is_none() {
                break;
            }
            return Err(TranscodeError::MalformedContainer(format!(
                "sequence delimiter inside defined-length sequence at offset {}",
                item_offset
            )));
        }
        if tag != ITEM {
            return Err(TranscodeError::MalformedContainer(format!(
                "expected item, found {} at offset {}",
                tag, item_offset
            )));
        }

        let item = if length == UNDEFINED_LENGTH {
            Item {
                dataset: read_dataset(
                    reader,
                    encoding,
                    Stop::ItemDelimiter,
                    depth + 1,
                    pixel_segment,
                )?,
                undefined_length: true,
            }
        } else {
            let item_end = reader
                .pos
                .checked_add(length as usize)
                .filter(|&e| e <= reader.data.len())
                .ok_or_else(|| {
                    TranscodeError::MalformedContainer(format!(
                        "item at offset {} overruns end of data",
                        item_offset
                    ))
                })?;
            Item {
                dataset: read_dataset(
                    reader,
                    encoding,
                    Stop::Offset(item_end),
                    depth + 1,
                    pixel_segment,
                )?,
                undefined_length: false,
            }
        };
        items.push(item);
    }
    Ok(items)
}

fn read_fragments(reader: &mut Reader<'_>) -> Result<EncapsulatedPixelData> {
    let mut offset_table = None;
    let mut fragments = Vec::new();

    loop {
        let item_offset = reader.pos;
        let tag = reader.tag()?;
        let length = reader.u32("fragment length")?;

        if tag == SEQUENCE_DELIMITER {
            break;
        }
        if tag != ITEM || length == UNDEFINED_LENGTH {
            return Err(TranscodeError::MalformedContainer(format!(
                "invalid pixel data fragment at offset {}",
                item_offset
            )));
        }

        let bytes = reader.take(length as usize, "pixel data fragment")?.to_vec();
        if offset_table.is_none() {
            offset_table = Some(bytes);
        } else {
            fragments.push(bytes);
        }
    }

    Ok(EncapsulatedPixelData {
        offset_table: offset_table.unwrap_or_default(),
        fragments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::FileBuilder;

    #[test]
    fn test_parse_explicit_file() {
        let bytes = FileBuilder::explicit()
            .element(0x0010, 0x0020, "LO", b"PAT1")
            .element(0x0028, 0x0010, "US", &2u16.to_le_bytes())
            .element(0x0028, 0x0011, "US", &2u16.to_le_bytes())
            .element(0x0028, 0x0100, "US", &8u16.to_le_bytes())
            .element(0x7FE0, 0x0010, "OB", &[1, 2, 3, 4])
            .build();

        let file = parse_bytes(&bytes).unwrap();
        assert_eq!(file.transfer_syntax(), TransferSyntax::ExplicitVrLittleEndian);
        assert_eq!(file.dataset.len(), 5);
        assert_eq!(file.dataset.string_value(tags::PATIENT_ID).unwrap(), "PAT1");

        let segment = file.pixel_segment().unwrap();
        assert_eq!(segment.length, 4);
        assert!(!segment.encapsulated);
        let offset = segment.offset as usize;
        assert_eq!(&bytes[offset..offset + 4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_parse_implicit_file_infers_vr() {
        let bytes = FileBuilder::implicit()
            .element(0x0028, 0x0010, "US", &2u16.to_le_bytes())
            .element(0x0029, 0x1001, "UN", b"ab")
            .element(0x7FE0, 0x0010, "OW", &[0; 8])
            .build();

        let file = parse_bytes(&bytes).unwrap();
        assert_eq!(file.transfer_syntax(), TransferSyntax::ImplicitVrLittleEndian);
        let vrs: Vec<VR> = file.dataset.iter().map(|e| e.vr).collect();
        assert_eq!(vrs, vec![VR::US, VR::UN, VR::OW]);
    }

    #[test]
    fn test_parse_encapsulated_pixel_data() {
        let bytes = FileBuilder::with_syntax(TransferSyntax::JpegBaseline)
            .element(0x0028, 0x0010, "US", &2u16.to_le_bytes())
            .encapsulated(&[], &[&[0xFF, 0xD8, 0xFF, 0xD9], &[0xAA, 0xBB]])
            .build();

        let file = parse_bytes(&bytes).unwrap();
        let pixel = file.pixel_data().unwrap();
        match &pixel.value {
            Value::Fragments(data) => {
                assert!(data.offset_table.is_empty());
                assert_eq!(data.fragments.len(), 2);
                assert_eq!(data.frame_bytes().as_ref(), &[0xFF, 0xD8, 0xFF, 0xD9, 0xAA, 0xBB]);
            }
            other => panic!("expected fragments, got {:?}", other),
        }
        let segment = file.pixel_segment().unwrap();
        assert!(segment.encapsulated);
        // BOT item + 2 fragment items + delimiter
        assert_eq!(segment.length, 8 + (8 + 4) + (8 + 2) + 8);
    }

    #[test]
    fn test_parse_undefined_length_sequence() {
        let mut item = Vec::new();
        item.extend_from_slice(&[0x08, 0x00, 0x50, 0x11, b'U', b'I', 0x04, 0x00]);
        item.extend_from_slice(b"1.2\0");

        let mut seq = Vec::new();
        seq.extend_from_slice(&[0xFE, 0xFF, 0x00, 0xE0, 0xFF, 0xFF, 0xFF, 0xFF]);
        seq.extend_from_slice(&item);
        seq.extend_from_slice(&[0xFE, 0xFF, 0x0D, 0xE0, 0, 0, 0, 0]);
        seq.extend_from_slice(&[0xFE, 0xFF, 0xDD, 0xE0, 0, 0, 0, 0]);

        let bytes = FileBuilder::explicit()
            .raw_sequence(0x0008, 0x1140, &seq)
            .element(0x7FE0, 0x0010, "OB", &[0, 0])
            .build();

        let file = parse_bytes(&bytes).unwrap();
        let seq = file.dataset.get(Tag(0x0008, 0x1140)).unwrap();
        match &seq.value {
            Value::Sequence {
                items,
                undefined_length,
            } => {
                assert!(*undefined_length);
                assert_eq!(items.len(), 1);
                assert!(items[0].undefined_length);
                assert_eq!(
                    items[0].dataset.string_value(Tag(0x0008, 0x1150)).unwrap(),
                    "1.2"
                );
            }
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_preamble_is_malformed() {
        let err = parse_bytes(&[0u8; 64]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedContainer);

        let mut bytes = vec![0u8; 128];
        bytes.extend_from_slice(b"DICX");
        let err = parse_bytes(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedContainer);
    }

    #[test]
    fn test_truncated_file_is_malformed() {
        let bytes = FileBuilder::explicit()
            .element(0x0028, 0x0010, "US", &2u16.to_le_bytes())
            .element(0x7FE0, 0x0010, "OB", &[0; 16])
            .build();
        let err = parse_bytes(&bytes[..bytes.len() - 5]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedContainer);
    }

    #[test]
    fn test_unknown_syntax_is_unsupported() {
        let bytes = FileBuilder::with_uid("1.2.840.10008.1.2.2")
            .element(0x7FE0, 0x0010, "OB", &[0, 0])
            .build();
        let err = parse_bytes(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedSyntax);
    }

    #[test]
    fn test_missing_pixel_data_is_malformed() {
        let bytes = FileBuilder::explicit()
            .element(0x0010, 0x0020, "LO", b"PAT1")
            .build();
        let err = parse_bytes(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedContainer);
    }
}
