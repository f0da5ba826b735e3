//! DICOM Part 10 writer.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use dicom_core::{Tag, VR};
use dicom_dictionary_std::tags;
use tempfile::NamedTempFile;

use super::parser::{has_long_length, MAGIC, PREAMBLE_LEN};
use super::{
    Dataset, DicomFile, Element, EncapsulatedPixelData, Item, Value, ITEM, ITEM_DELIMITER,
    SEQUENCE_DELIMITER, UNDEFINED_LENGTH,
};
use crate::config::WriteMode;
use crate::error::{Result, TranscodeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Explicit,
    Implicit,
}

/// Serialize a file: preamble, `DICM`, file meta group and dataset.
pub fn to_bytes(file: &DicomFile) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(4096);

    let mut preamble = file.preamble().to_vec();
    preamble.resize(PREAMBLE_LEN, 0);
    out.extend_from_slice(&preamble);
    out.extend_from_slice(MAGIC);

    let mut meta = Vec::new();
    for element in file.meta.iter().filter(|e| e.tag != tags::FILE_META_INFORMATION_GROUP_LENGTH) {
        write_element(&mut meta, element, Encoding::Explicit, true)?;
    }
    let group_length = Element::new(
        tags::FILE_META_INFORMATION_GROUP_LENGTH,
        VR::UL,
        length_field(meta.len())?.to_le_bytes().to_vec(),
    );
    write_element(&mut out, &group_length, Encoding::Explicit, true)?;
    out.extend_from_slice(&meta);

    let encoding = if file.transfer_syntax().is_explicit_vr() {
        Encoding::Explicit
    } else {
        Encoding::Implicit
    };
    write_dataset(&mut out, &file.dataset, encoding, true)?;

    Ok(out)
}

/// Serialize a file and place it at `path`.
pub fn write_file<P: AsRef<Path>>(file: &DicomFile, path: P, mode: WriteMode) -> Result<()> {
    let path = path.as_ref();
    let bytes = to_bytes(file)?;

    match mode {
        WriteMode::Direct => {
            let mut out = File::create(path).map_err(|e| TranscodeError::write(path, e))?;
            out.write_all(&bytes)
                .and_then(|_| out.flush())
                .map_err(|e| TranscodeError::write(path, e))?;
        }
        WriteMode::Atomic => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let mut tmp = NamedTempFile::new_in(dir).map_err(|e| TranscodeError::write(path, e))?;
            tmp.write_all(&bytes)
                .and_then(|_| tmp.as_file().sync_all())
                .map_err(|e| TranscodeError::write(path, e))?;
            tmp.persist(path)
                .map_err(|e| TranscodeError::write(path, e.error))?;
        }
    }

    log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

fn length_field(len: usize) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .filter(|&l| l != UNDEFINED_LENGTH)
        .ok_or_else(|| {
            TranscodeError::MalformedContainer(format!("value of {} bytes is too long", len))
        })
}

fn write_dataset(out: &mut Vec<u8>, dataset: &Dataset, encoding: Encoding, top_level: bool) -> Result<()> {
    for element in dataset {
        write_element(out, element, encoding, top_level)?;
    }
    Ok(())
}

fn write_tag(out: &mut Vec<u8>, tag: Tag) -> Result<()> {
    out.write_u16::<LittleEndian>(tag.group())?;
    out.write_u16::<LittleEndian>(tag.element())?;
    Ok(())
}

fn write_header(out: &mut Vec<u8>, tag: Tag, vr: VR, length: u32, encoding: Encoding) -> Result<()> {
    write_tag(out, tag)?;
    match encoding {
        Encoding::Implicit => out.write_u32::<LittleEndian>(length)?,
        Encoding::Explicit => {
            out.extend_from_slice(vr.to_string().as_bytes());
            if has_long_length(vr) {
                out.write_u16::<LittleEndian>(0)?;
                out.write_u32::<LittleEndian>(length)?;
            } else {
                // callers never pass a short VR with a length above u16::MAX
                out.write_u16::<LittleEndian>(length as u16)?;
            }
        }
    }
    Ok(())
}

fn write_element(out: &mut Vec<u8>, element: &Element, encoding: Encoding, top_level: bool) -> Result<()> {
    let is_pixel_data = top_level && element.tag == tags::PIXEL_DATA;

    match &element.value {
        Value::Bytes(bytes) => {
            let pad = is_pixel_data && bytes.len() % 2 == 1;
            let length = length_field(bytes.len() + usize::from(pad))?;

            let mut vr = element.vr;
            if encoding == Encoding::Explicit && !has_long_length(vr) && length > 0xFFFF {
                log::warn!(
                    "{} value of {} bytes does not fit {}, writing as UN",
                    element.tag,
                    length,
                    vr.to_string()
                );
                vr = VR::UN;
            }

            write_header(out, element.tag, vr, length, encoding)?;
            out.extend_from_slice(bytes);
            if pad {
                out.push(0);
            }
        }
        Value::Sequence {
            items,
            undefined_length,
        } => {
            // UN sequences carry implicit VR content
            let item_encoding = if element.vr == VR::UN {
                Encoding::Implicit
            } else {
                encoding
            };
            let mut body = Vec::new();
            for item in items {
                write_item(&mut body, item, item_encoding)?;
            }

            let vr = if encoding == Encoding::Explicit { element.vr } else { VR::SQ };
            if *undefined_length {
                write_header(out, element.tag, vr, UNDEFINED_LENGTH, encoding)?;
                out.extend_from_slice(&body);
                write_tag(out, SEQUENCE_DELIMITER)?;
                out.write_u32::<LittleEndian>(0)?;
            } else {
                write_header(out, element.tag, vr, length_field(body.len())?, encoding)?;
                out.extend_from_slice(&body);
            }
        }
        Value::Fragments(pixels) => {
            write_header(out, element.tag, VR::OB, UNDEFINED_LENGTH, encoding)?;
            write_fragments(out, pixels)?;
        }
    }
    Ok(())
}

fn write_item(out: &mut Vec<u8>, item: &Item, encoding: Encoding) -> Result<()> {
    let mut body = Vec::new();
    write_dataset(&mut body, &item.dataset, encoding, false)?;

    write_tag(out, ITEM)?;
    if item.undefined_length {
        out.write_u32::<LittleEndian>(UNDEFINED_LENGTH)?;
        out.extend_from_slice(&body);
        write_tag(out, ITEM_DELIMITER)?;
        out.write_u32::<LittleEndian>(0)?;
    } else {
        out.write_u32::<LittleEndian>(length_field(body.len())?)?;
        out.extend_from_slice(&body);
    }
    Ok(())
}

fn write_fragments(out: &mut Vec<u8>, pixels: &EncapsulatedPixelData) -> Result<()> {
    write_tag(out, ITEM)?;
    out.write_u32::<LittleEndian>(length_field(pixels.offset_table.len())?)?;
    out.extend_from_slice(&pixels.offset_table);

    for fragment in &pixels.fragments {
        let pad = fragment.len() % 2 == 1;
        write_tag(out, ITEM)?;
        out.write_u32::<LittleEndian>(length_field(fragment.len() + usize::from(pad))?)?;
        out.extend_from_slice(fragment);
        if pad {
            out.push(0);
        }
    }

    write_tag(out, SEQUENCE_DELIMITER)?;
    out.write_u32::<LittleEndian>(0)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferSyntax;
    use crate::dicom::parse_bytes;
    use crate::error::ErrorKind;
    use crate::test_support::{image_file, FileBuilder};

    #[test]
    fn test_round_trip_preserves_elements() {
        let file = image_file(TransferSyntax::ExplicitVrLittleEndian, 4, 4, 8, 1);
        let bytes = to_bytes(&file).unwrap();
        let parsed = parse_bytes(&bytes).unwrap();

        assert_eq!(parsed.dataset, file.dataset);
        assert_eq!(to_bytes(&parsed).unwrap(), bytes);
    }

    #[test]
    fn test_group_length_is_recomputed() {
        let mut file = image_file(TransferSyntax::ExplicitVrLittleEndian, 2, 2, 8, 1);
        file.meta.put(Element::new(
            tags::FILE_META_INFORMATION_GROUP_LENGTH,
            VR::UL,
            999u32.to_le_bytes().to_vec(),
        ));
        let bytes = to_bytes(&file).unwrap();

        // group length element directly follows DICM: tag(4) VR(2) len(2) value(4)
        let value = u32::from_le_bytes([bytes[140], bytes[141], bytes[142], bytes[143]]);
        let meta_end = 144 + value as usize;
        assert_eq!(&bytes[meta_end..meta_end + 2], &[0x08, 0x00]);
    }

    #[test]
    fn test_fragments_are_padded_to_even_length() {
        let mut file = image_file(TransferSyntax::JpegBaseline, 2, 2, 8, 1);
        file.set_pixel_data(
            VR::OB,
            Value::Fragments(EncapsulatedPixelData::single(vec![1, 2, 3])),
        );
        let parsed = parse_bytes(&to_bytes(&file).unwrap()).unwrap();
        match &parsed.pixel_data().unwrap().value {
            Value::Fragments(pixels) => assert_eq!(pixels.fragments, vec![vec![1, 2, 3, 0]]),
            other => panic!("expected fragments, got {:?}", other),
        }
    }

    #[test]
    fn test_implicit_output_drops_vr() {
        let file = image_file(TransferSyntax::ImplicitVrLittleEndian, 2, 2, 8, 1);
        let bytes = to_bytes(&file).unwrap();
        let parsed = parse_bytes(&bytes).unwrap();
        assert_eq!(parsed.transfer_syntax(), TransferSyntax::ImplicitVrLittleEndian);
        assert_eq!(parsed.dataset.u16_value(tags::ROWS), Some(2));
    }

    #[test]
    fn test_un_sequence_keeps_implicit_items() {
        let mut item = Vec::new();
        // (0008,1150) implicit, length 4
        item.extend_from_slice(&[0x08, 0x00, 0x50, 0x11, 4, 0, 0, 0]);
        item.extend_from_slice(b"1.2\0");
        let mut seq = Vec::new();
        seq.extend_from_slice(&[0xFE, 0xFF, 0x00, 0xE0]);
        seq.extend_from_slice(&(item.len() as u32).to_le_bytes());
        seq.extend_from_slice(&item);
        seq.extend_from_slice(&[0xFE, 0xFF, 0xDD, 0xE0, 0, 0, 0, 0]);

        let bytes = FileBuilder::explicit()
            .raw_un_sequence(0x0009, 0x1010, &seq)
            .element(0x7FE0, 0x0010, "OB", &[0, 0])
            .build();
        let parsed = parse_bytes(&bytes).unwrap();
        assert_eq!(to_bytes(&parsed).unwrap(), bytes);
    }

    #[test]
    fn test_atomic_and_direct_write() {
        let dir = tempfile::tempdir().unwrap();
        let file = image_file(TransferSyntax::ExplicitVrLittleEndian, 2, 2, 8, 1);

        let atomic = dir.path().join("atomic.dcm");
        write_file(&file, &atomic, WriteMode::Atomic).unwrap();
        let direct = dir.path().join("direct.dcm");
        write_file(&file, &direct, WriteMode::Direct).unwrap();

        assert_eq!(std::fs::read(&atomic).unwrap(), std::fs::read(&direct).unwrap());
        // no temporary files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_unwritable_destination_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = image_file(TransferSyntax::ExplicitVrLittleEndian, 2, 2, 8, 1);
        let target = dir.path().join("missing").join("out.dcm");

        for mode in [WriteMode::Atomic, WriteMode::Direct] {
            let err = write_file(&file, &target, mode).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::WriteError);
        }
    }
}
