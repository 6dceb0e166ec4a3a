//! XFDU manifest generation for SAFE archives.

use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::Path;

use crate::common::checksum::md5_file;

const XFDU_NS: &str = "urn:ccsds:schema:xfdu:1";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const BASE_SCHEMA_ID: &str = "CHRISBaseSchema";

/// One measurement file referenced from the manifest.
#[derive(Debug, Clone)]
pub struct DataObject {
    pub id: String,
    pub rep_id: String,
    pub text_info: String,
    /// Archive-relative location, e.g. `measurement/image.dat`.
    pub href: String,
    pub md5: String,
}

fn title_case(ext: &str) -> String {
    let mut chars = ext.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Describe a file for the manifest's data object section. The archive
/// location is `{data_type}/{file_name}` (`measurement/…` for data files).
pub fn describe_data_object(path: &Path, data_type: &str) -> Result<DataObject> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = file_name.rsplit('.').next().unwrap_or("").to_string();

    let (id, rep_id, text_info) = match extension.as_str() {
        "xsd" => (
            format!("{extension}Schema"),
            "xmlBaseSchema".to_string(),
            "SAFE Restriction to XFDU Schema".to_string(),
        ),
        _ => (
            format!("measurementData{}", title_case(&extension)),
            "measurementSchema".to_string(),
            "Measurement Data".to_string(),
        ),
    };

    Ok(DataObject {
        id,
        rep_id,
        text_info,
        href: format!("{data_type}/{file_name}"),
        md5: md5_file(path)?,
    })
}

/// Render the XFDU manifest document.
pub fn render_manifest(data_objects: &[DataObject]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

    let mut root = BytesStart::new("xfdu:XFDU");
    root.push_attribute(("xmlns:xfdu", XFDU_NS));
    root.push_attribute(("xmlns:xsi", XSI_NS));
    root.push_attribute(("version", "esa/safe/2.0"));
    root.push_attribute(("xsi:schemaLocation", "urn:ccsds:schema:xfdu:1 xfdu.xsd"));
    writer.write_event(Event::Start(root))?;

    // package map
    writer.write_event(Event::Start(BytesStart::new("informationPackageMap")))?;
    let mut outer = BytesStart::new("xfdu:contentUnit");
    outer.push_attribute(("unitType", "SAFE Archive Information Package"));
    outer.push_attribute(("textInfo", "SAFE Archive Information Package"));
    outer.push_attribute(("ID", "packageUnit"));
    outer.push_attribute(("dmdID", "CHRIS sensor class"));
    outer.push_attribute(("pdiID", "processing packageId"));
    writer.write_event(Event::Start(outer))?;

    let mut inner = BytesStart::new("xfdu:contentUnit");
    inner.push_attribute(("unitType", "CHRIS data unit"));
    inner.push_attribute(("ID", "measurementUnit"));
    inner.push_attribute(("repID", BASE_SCHEMA_ID));
    writer.write_event(Event::Start(inner))?;

    let mut pointer = BytesStart::new("dataObjectPointer");
    pointer.push_attribute(("dataObjectID", "CHRIS"));
    writer.write_event(Event::Empty(pointer))?;

    writer.write_event(Event::End(BytesEnd::new("xfdu:contentUnit")))?;
    writer.write_event(Event::End(BytesEnd::new("xfdu:contentUnit")))?;
    writer.write_event(Event::End(BytesEnd::new("informationPackageMap")))?;

    // metadata section
    writer.write_event(Event::Start(BytesStart::new("metadataSection")))?;
    let mut metadata_object = BytesStart::new("metadataObject");
    metadata_object.push_attribute(("ID", BASE_SCHEMA_ID));
    metadata_object.push_attribute(("classification", "SYNTAX"));
    metadata_object.push_attribute(("category", "REP"));
    writer.write_event(Event::Start(metadata_object))?;

    let mut reference = BytesStart::new("metadataReference");
    reference.push_attribute(("locatorType", "OTHER"));
    reference.push_attribute(("href", "urn:x-safe:BASE:root"));
    reference.push_attribute(("vocabularyName", "SAFE"));
    reference.push_attribute(("mimeType", "text/xml"));
    writer.write_event(Event::Empty(reference))?;

    writer.write_event(Event::End(BytesEnd::new("metadataObject")))?;
    writer.write_event(Event::End(BytesEnd::new("metadataSection")))?;

    // data object section
    writer.write_event(Event::Start(BytesStart::new("dataObjectSection")))?;
    for object in data_objects {
        let mut data_object = BytesStart::new("dataObject");
        data_object.push_attribute(("ID", object.id.as_str()));
        data_object.push_attribute(("repID", object.rep_id.as_str()));
        writer.write_event(Event::Start(data_object))?;

        let mut byte_stream = BytesStart::new("byteStream");
        byte_stream.push_attribute(("mimeType", "application/octet-stream"));
        writer.write_event(Event::Start(byte_stream))?;

        let mut location = BytesStart::new("fileLocation");
        location.push_attribute(("locatorType", "URL"));
        location.push_attribute(("textInfo", object.text_info.as_str()));
        location.push_attribute(("href", object.href.as_str()));
        writer.write_event(Event::Empty(location))?;

        let mut checksum = BytesStart::new("checksum");
        checksum.push_attribute(("checksumName", "MD5"));
        writer.write_event(Event::Start(checksum))?;
        writer.write_event(Event::Text(BytesText::new(&object.md5)))?;
        writer.write_event(Event::End(BytesEnd::new("checksum")))?;

        writer.write_event(Event::End(BytesEnd::new("byteStream")))?;
        writer.write_event(Event::End(BytesEnd::new("dataObject")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("dataObjectSection")))?;

    writer.write_event(Event::End(BytesEnd::new("xfdu:XFDU")))?;

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_describe_measurement_data_object() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("image.dat");
        fs::write(&path, b"payload").unwrap();

        let object = describe_data_object(&path, "measurement").unwrap();
        assert_eq!(object.id, "measurementDataDat");
        assert_eq!(object.rep_id, "measurementSchema");
        assert_eq!(object.text_info, "Measurement Data");
        assert_eq!(object.href, "measurement/image.dat");
        assert_eq!(object.md5.len(), 32);
    }

    #[test]
    fn test_describe_schema_data_object() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("txt.xsd");
        fs::write(&path, b"<schema/>").unwrap();

        let object = describe_data_object(&path, "metadata").unwrap();
        assert_eq!(object.id, "xsdSchema");
        assert_eq!(object.rep_id, "xmlBaseSchema");
        assert_eq!(object.href, "metadata/txt.xsd");
    }

    #[test]
    fn test_render_manifest_structure() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("image.txt");
        fs::write(&path, b"//Key\tValue").unwrap();

        let object = describe_data_object(&path, "measurement").unwrap();
        let xml = render_manifest(&[object]).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>"));
        assert!(xml.contains("xmlns:xfdu=\"urn:ccsds:schema:xfdu:1\""));
        assert!(xml.contains("<informationPackageMap>"));
        assert!(xml.contains("<dataObject ID=\"measurementDataTxt\" repID=\"measurementSchema\">"));
        assert!(xml.contains("href=\"measurement/image.txt\""));
        assert!(xml.contains("<checksum checksumName=\"MD5\">"));
    }

    #[test]
    fn test_manifest_varies_with_contents() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.txt");
        fs::write(&a, b"one").unwrap();
        fs::write(&b, b"two").unwrap();

        let xml_a = render_manifest(&[describe_data_object(&a, "measurement").unwrap()]).unwrap();
        let xml_b = render_manifest(&[describe_data_object(&b, "measurement").unwrap()]).unwrap();
        assert_ne!(xml_a, xml_b);
    }
}
