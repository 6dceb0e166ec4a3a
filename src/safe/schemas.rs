//! Per-extension SDF/XSD metadata schemas bundled into SAFE archives.
//!
//! Each recognised measurement extension gets a small XSD describing how the
//! file content is encoded (binary pixel blocks, plain-text attributes, …).

use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

const SDF_NS: &str = "http://www.gael.fr/2004/12/drb/sdf";
const XS_NS: &str = "http://www.w3.org/2001/XMLSchema";
const MOS_NS: &str = "http://www.esa.int/safe/1.2/mos";

struct SchemaSpec {
    element: &'static str,
    type_name: &'static str,
    /// Documentation on the top-level element.
    summary: &'static str,
    /// Documentation on the content element.
    detail: &'static str,
    encoding: &'static str,
    bit_length: Option<u32>,
    unbounded: bool,
}

fn spec_for_extension(ext: &str) -> Option<SchemaSpec> {
    match ext {
        "dat" => Some(SchemaSpec {
            element: "pixel",
            type_name: "pixelType",
            summary: "A SAFE product generated with CHRIS PROBA-1 data includes one .dat \
                      file, containing 12-bit pixel values. The data is structured in \
                      fixed-length packets, as defined by PACKETSIZE in the headers. Each \
                      packet includes a header containing synchronization markers, metadata, \
                      and checksums, and a block of image data, where pixels from odd and \
                      even channels are interleaved. The raw block length for image data \
                      varies depending on the band configuration, whether full or half \
                      width, and whether binned or unbinned. These values represent the \
                      number of bytes per channel per line at 12 bits per pixel. The actual \
                      block length is determined by the configuration specified in the .set \
                      file for the data corresponding to one imaging sequence.",
            detail: "The file contains binary data in 12-bit pixel values. The raw block \
                     length for image data varies depending on the band configuration, \
                     whether full or half width, and whether binned or unbinned.",
            encoding: "BINARY",
            bit_length: Some(12),
            unbounded: true,
        }),
        "hdr" => Some(SchemaSpec {
            element: "hdr",
            type_name: "hdrType",
            summary: "A SAFE product generated with CHRIS PROBA-1 data includes one .hdr \
                      file, containing image header data. Attributes and the corresponding \
                      values are defined per line, separated by an equals sign e.g. \
                      attribute = value.",
            detail: "The file contains header data in plain text format.",
            encoding: "ASCII",
            bit_length: None,
            unbounded: false,
        }),
        "set" => Some(SchemaSpec {
            element: "set",
            type_name: "setType",
            summary: "A SAFE product generated with CHRIS PROBA-1 data includes one .set \
                      file, containing image configuration data. This defines values \
                      including integers, flags and dimensions.",
            detail: "The file contains configuration data in binary format.",
            encoding: "BINARY",
            bit_length: Some(12),
            unbounded: false,
        }),
        "txt" => Some(SchemaSpec {
            element: "txt",
            type_name: "txtType",
            summary: "A SAFE product generated with CHRIS PROBA-1 data includes one .txt \
                      file, containing image attribute data. File is to be read vertically \
                      with attributes denoted by lines starting with '//' and the \
                      corresponding value on the line below.",
            detail: "The file contains metadata in plain text format.",
            encoding: "ASCII",
            bit_length: None,
            unbounded: false,
        }),
        "jpg" => Some(SchemaSpec {
            element: "jpg",
            type_name: "jpgType",
            summary: "A thumbnail of an image produced by CHRIS PROBA-1.",
            detail: "The file contains an image thumbnail.",
            encoding: "BINARY",
            bit_length: None,
            unbounded: false,
        }),
        "zip" => Some(SchemaSpec {
            element: "zip",
            type_name: "zipType",
            summary: "A compressed archive of the measurement data produced by CHRIS \
                      PROBA-1.",
            detail: "The file contains the bundled measurement files in ZIP format.",
            encoding: "BINARY",
            bit_length: None,
            unbounded: false,
        }),
        _ => None,
    }
}

/// Render the metadata schema for a file extension, or `None` when the
/// extension has no schema.
pub fn schema_for_extension(ext: &str) -> Option<Result<String>> {
    spec_for_extension(&ext.to_lowercase()).map(render)
}

fn render(spec: SchemaSpec) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

    let mut schema = BytesStart::new("xs:schema");
    schema.push_attribute(("xmlns:sdf", SDF_NS));
    schema.push_attribute(("xmlns:xs", XS_NS));
    schema.push_attribute(("xmlns", MOS_NS));
    schema.push_attribute(("targetNamespace", MOS_NS));
    writer.write_event(Event::Start(schema))?;

    // top-level element
    let mut element = BytesStart::new("xs:element");
    element.push_attribute(("name", spec.element));
    element.push_attribute(("type", spec.type_name));
    writer.write_event(Event::Start(element))?;
    write_annotation(&mut writer, spec.summary, None, None)?;
    writer.write_event(Event::End(BytesEnd::new("xs:element")))?;

    // content type
    let mut complex = BytesStart::new("xs:complexType");
    complex.push_attribute(("name", spec.type_name));
    writer.write_event(Event::Start(complex))?;
    writer.write_event(Event::Start(BytesStart::new("xs:sequence")))?;

    let mut inner = BytesStart::new("xs:element");
    inner.push_attribute(("name", spec.element));
    inner.push_attribute(("type", spec.type_name));
    if spec.unbounded {
        inner.push_attribute(("minOccurs", "0"));
        inner.push_attribute(("maxOccurs", "unbounded"));
    }
    writer.write_event(Event::Start(inner))?;
    write_annotation(&mut writer, spec.detail, Some(spec.encoding), spec.bit_length)?;
    writer.write_event(Event::End(BytesEnd::new("xs:element")))?;

    writer.write_event(Event::End(BytesEnd::new("xs:sequence")))?;
    writer.write_event(Event::End(BytesEnd::new("xs:complexType")))?;
    writer.write_event(Event::End(BytesEnd::new("xs:schema")))?;

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

fn write_annotation(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    documentation: &str,
    encoding: Option<&str>,
    bit_length: Option<u32>,
) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("xs:annotation")))?;

    let mut doc = BytesStart::new("xs:documentation");
    doc.push_attribute(("xml:lang", "en"));
    writer.write_event(Event::Start(doc))?;
    writer.write_event(Event::Text(BytesText::new(documentation)))?;
    writer.write_event(Event::End(BytesEnd::new("xs:documentation")))?;

    if let Some(encoding) = encoding {
        writer.write_event(Event::Start(BytesStart::new("xs:appinfo")))?;
        writer.write_event(Event::Start(BytesStart::new("sdf:block")))?;

        writer.write_event(Event::Start(BytesStart::new("sdf:encoding")))?;
        writer.write_event(Event::Text(BytesText::new(encoding)))?;
        writer.write_event(Event::End(BytesEnd::new("sdf:encoding")))?;

        if let Some(length) = bit_length {
            writer.write_event(Event::Start(BytesStart::new("sdf:length")))?;
            writer.write_event(Event::Text(BytesText::new(&length.to_string())))?;
            writer.write_event(Event::End(BytesEnd::new("sdf:length")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("sdf:block")))?;
        writer.write_event(Event::End(BytesEnd::new("xs:appinfo")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("xs:annotation")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dat_schema_shape() {
        let xml = schema_for_extension("dat").unwrap().unwrap();
        assert!(xml.contains("<xs:element name=\"pixel\" type=\"pixelType\">"));
        assert!(xml.contains("maxOccurs=\"unbounded\""));
        assert!(xml.contains("<sdf:encoding>BINARY</sdf:encoding>"));
        assert!(xml.contains("<sdf:length>12</sdf:length>"));
    }

    #[test]
    fn test_txt_schema_shape() {
        let xml = schema_for_extension("txt").unwrap().unwrap();
        assert!(xml.contains("<xs:element name=\"txt\" type=\"txtType\">"));
        assert!(xml.contains("<sdf:encoding>ASCII</sdf:encoding>"));
        assert!(!xml.contains("sdf:length"));
    }

    #[test]
    fn test_hdr_and_set_schemas_exist() {
        for ext in ["hdr", "set", "jpg", "zip"] {
            assert!(schema_for_extension(ext).is_some(), "{ext} schema missing");
        }
    }

    #[test]
    fn test_unknown_extension_has_no_schema() {
        assert!(schema_for_extension("nottxt").is_none());
    }

    #[test]
    fn test_extension_lookup_is_case_insensitive() {
        assert!(schema_for_extension("TXT").is_some());
    }
}
