//! Value representations for implicit VR decoding.

use dicom_core::dictionary::{DataDictionary, DataDictionaryEntry};
use dicom_core::{Tag, VR};
use dicom_dictionary_std::StandardDataDictionary;

/// Value representation to assume for `tag` in an implicit VR dataset.
///
/// Tags unknown to the standard dictionary decode as `UN`.
pub fn implicit_vr(tag: Tag) -> VR {
    let (group, element) = (tag.group(), tag.element());

    if element == 0x0000 {
        return VR::UL;
    }
    // private creator
    if group % 2 == 1 && (0x0010..=0x00FF).contains(&element) {
        return VR::LO;
    }
    // pixel and overlay data are OB or OW depending on context; implicit VR means OW
    if tag == Tag(0x7FE0, 0x0010) || (group >> 8 == 0x60 && element == 0x3000) {
        return VR::OW;
    }

    StandardDataDictionary
        .by_tag(tag)
        .map(|entry| entry.vr().relaxed())
        .unwrap_or(VR::UN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(implicit_vr(Tag(0x0028, 0x0010)), VR::US);
        assert_eq!(implicit_vr(Tag(0x0008, 0x1140)), VR::SQ);
        assert_eq!(implicit_vr(Tag(0x0008, 0x0104)), VR::LO);
        assert_eq!(implicit_vr(Tag(0x0018, 0x0088)), VR::DS);
        assert_eq!(implicit_vr(Tag(0x7FE0, 0x0010)), VR::OW);
    }

    #[test]
    fn test_context_rules() {
        assert_eq!(implicit_vr(Tag(0x0009, 0x0010)), VR::LO);
        assert_eq!(implicit_vr(Tag(0x0018, 0x0000)), VR::UL);
        assert_eq!(implicit_vr(Tag(0x6002, 0x3000)), VR::OW);
        assert_eq!(implicit_vr(Tag(0x0019, 0x1001)), VR::UN);
    }

    #[test]
    fn test_multi_vr_attributes_are_relaxed() {
        // Smallest Image Pixel Value is US or SS
        assert_eq!(implicit_vr(Tag(0x0028, 0x0106)), VR::US);
    }
}
