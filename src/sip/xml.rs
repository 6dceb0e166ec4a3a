//! EO-SIP XML documents: the EarthObservation metadata file (`*.MD.XML`) and
//! the SIP information file (`*.SI.XML`).

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

const NAMESPACES: [(&str, &str); 7] = [
    ("xmlns:eop", "http://www.opengis.net/eop/2.1"),
    ("xmlns:gml", "http://www.opengis.net/gml/3.2"),
    ("xmlns:om", "http://www.opengis.net/om/2.0"),
    ("xmlns:opt", "http://www.opengis.net/opt/2.1"),
    ("xmlns:ows", "http://www.opengis.net/ows/2.0"),
    ("xmlns:xlink", "http://www.w3.org/1999/xlink"),
    ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
];

const SIP_NS: &str = "http://www.eo.esa.int/SIP/sipInfo/2.0";

/// Everything the metadata XML reports about one package.
#[derive(Debug, Clone)]
pub struct PackageInfo {
    /// Package identifier (the EO-SIP file name root with version).
    pub id: String,
    pub begin: NaiveDateTime,
    pub end: NaiveDateTime,
    pub result_time: NaiveDateTime,
    /// `MODE-{n}` operational mode string.
    pub operational_mode: String,
    pub product_type: String,
    pub illumination_azimuth: f64,
    pub illumination_elevation: f64,
    /// Scene centre as `lat lon`.
    pub center_position: String,
    /// Total payload size in bytes.
    pub file_size: u64,
    /// vendorSpecific key/value pairs (original name, site name, target code).
    pub vendor_specific: Vec<(String, String)>,
}

type XmlWriter = Writer<Cursor<Vec<u8>>>;

fn start(writer: &mut XmlWriter, tag: &str, attrs: &[(&str, &str)]) -> Result<()> {
    let mut element = BytesStart::new(tag);
    for (key, value) in attrs {
        element.push_attribute((*key, *value));
    }
    writer.write_event(Event::Start(element))?;
    Ok(())
}

fn end(writer: &mut XmlWriter, tag: &str) -> Result<()> {
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn text_el(writer: &mut XmlWriter, tag: &str, attrs: &[(&str, &str)], text: &str) -> Result<()> {
    start(writer, tag, attrs)?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    end(writer, tag)
}

fn gml_time(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Render the `*.MD.XML` EarthObservation document.
pub fn render_earth_observation(info: &PackageInfo) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let w = &mut writer;
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

    let mut root = BytesStart::new("opt:EarthObservation");
    for (key, value) in NAMESPACES {
        root.push_attribute((key, value));
    }
    root.push_attribute(("gml:id", info.id.as_str()));
    w.write_event(Event::Start(root))?;

    let sub_ids: Vec<String> = (2..8).map(|n| format!("{}_{n}", info.id)).collect();

    // acquisition period
    start(w, "om:phenomenonTime", &[])?;
    start(w, "gml:TimePeriod", &[("gml:id", sub_ids[0].as_str())])?;
    text_el(w, "gml:beginPosition", &[], &gml_time(info.begin))?;
    text_el(w, "gml:endPosition", &[], &gml_time(info.end))?;
    end(w, "gml:TimePeriod")?;
    end(w, "om:phenomenonTime")?;

    start(w, "om:resultTime", &[])?;
    start(w, "gml:TimeInstant", &[("gml:id", sub_ids[1].as_str())])?;
    text_el(w, "gml:timePosition", &[], &gml_time(info.result_time))?;
    end(w, "gml:TimeInstant")?;
    end(w, "om:resultTime")?;

    // platform, instrument, sensor, acquisition
    start(w, "om:procedure", &[])?;
    start(
        w,
        "eop:EarthObservationEquipment",
        &[("gml:id", sub_ids[2].as_str())],
    )?;

    start(w, "eop:platform", &[])?;
    start(w, "eop:Platform", &[])?;
    text_el(w, "eop:shortName", &[], "PROBA")?;
    text_el(w, "eop:serialIdentifier", &[], "1")?;
    end(w, "eop:Platform")?;
    end(w, "eop:platform")?;

    start(w, "eop:instrument", &[])?;
    start(w, "eop:Instrument", &[])?;
    text_el(w, "eop:shortName", &[], "CHRIS")?;
    end(w, "eop:Instrument")?;
    end(w, "eop:instrument")?;

    start(w, "eop:sensor", &[])?;
    start(w, "eop:Sensor", &[])?;
    text_el(w, "eop:sensorType", &[], "OPTICAL")?;
    text_el(
        w,
        "eop:operationalMode",
        &[("codeSpace", "urn:esa:eop:PROBA:CHRIS:operationalMode")],
        &info.operational_mode,
    )?;
    end(w, "eop:Sensor")?;
    end(w, "eop:sensor")?;

    start(w, "eop:acquisitionParameters", &[])?;
    start(w, "eop:Acquisition", &[])?;
    text_el(w, "eop:orbitNumber", &[], "000000")?;
    text_el(
        w,
        "eop:wrsLongitudeGrid",
        &[("codeSpace", "urn:esa:eop:PROBA:TileColumn")],
        "0",
    )?;
    text_el(
        w,
        "eop:wrsLatitudeGrid",
        &[("codeSpace", "urn:esa:eop:PROBA:TileRow")],
        "0",
    )?;
    text_el(
        w,
        "eop:illuminationAzimuthAngle",
        &[("uom", "deg")],
        &format!("{:.2}", info.illumination_azimuth),
    )?;
    text_el(
        w,
        "eop:illuminationElevationAngle",
        &[("uom", "deg")],
        &format!("{:.2}", info.illumination_elevation),
    )?;
    end(w, "eop:Acquisition")?;
    end(w, "eop:acquisitionParameters")?;

    end(w, "eop:EarthObservationEquipment")?;
    end(w, "om:procedure")?;

    start(
        w,
        "om:observedProperty",
        &[("nilReason", "inapplicable"), ("xsi:nil", "true")],
    )?;
    end(w, "om:observedProperty")?;

    // footprint centre
    start(w, "om:featureOfInterest", &[])?;
    start(w, "eop:Footprint", &[("gml:id", sub_ids[3].as_str())])?;
    start(w, "eop:centerOf", &[])?;
    start(w, "gml:Point", &[("gml:id", sub_ids[4].as_str())])?;
    text_el(w, "gml:pos", &[], &info.center_position)?;
    end(w, "gml:Point")?;
    end(w, "eop:centerOf")?;
    end(w, "eop:Footprint")?;
    end(w, "om:featureOfInterest")?;

    // result: package file name and size
    start(w, "om:result", &[])?;
    start(
        w,
        "opt:EarthObservationResult",
        &[("gml:id", sub_ids[5].as_str())],
    )?;
    start(w, "eop:product", &[])?;
    start(w, "eop:ProductInformation", &[])?;
    start(w, "eop:fileName", &[])?;
    let package_file = format!("{}.SIP.ZIP", info.id);
    start(w, "ows:ServiceReference", &[("xlink:href", package_file.as_str())])?;
    start(w, "ows:RequestMessage", &[])?;
    end(w, "ows:RequestMessage")?;
    end(w, "ows:ServiceReference")?;
    end(w, "eop:fileName")?;
    text_el(w, "eop:size", &[("uom", "bytes")], &info.file_size.to_string())?;
    end(w, "eop:ProductInformation")?;
    end(w, "eop:product")?;
    end(w, "opt:EarthObservationResult")?;
    end(w, "om:result")?;

    // identification block
    start(w, "eop:metaDataProperty", &[])?;
    start(w, "eop:EarthObservationMetaData", &[])?;
    text_el(w, "eop:identifier", &[], &info.id)?;
    text_el(w, "eop:acquisitionType", &[], "NOMINAL")?;
    text_el(w, "eop:productType", &[], &info.product_type)?;
    text_el(w, "eop:status", &[], "ARCHIVED")?;
    for (attribute, value) in &info.vendor_specific {
        start(w, "eop:vendorSpecific", &[])?;
        start(w, "eop:SpecificInformation", &[])?;
        text_el(w, "eop:localAttribute", &[], attribute)?;
        text_el(w, "eop:localValue", &[], value)?;
        end(w, "eop:SpecificInformation")?;
        end(w, "eop:vendorSpecific")?;
    }
    end(w, "eop:EarthObservationMetaData")?;
    end(w, "eop:metaDataProperty")?;

    end(w, "opt:EarthObservation")?;

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

/// Render the `*.SI.XML` SIP information document.
pub fn render_sip_info(creator: &str, creation_time: DateTime<Utc>) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

    let mut root = BytesStart::new("sip:SIPInfo");
    root.push_attribute(("xmlns:sip", SIP_NS));
    root.push_attribute(("version", "2.0"));
    writer.write_event(Event::Start(root))?;

    let w = &mut writer;
    text_el(w, "sip:SIPCreator", &[], creator)?;
    text_el(
        w,
        "sip:SIPCreationTime",
        &[],
        &creation_time.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
    )?;
    end(w, "sip:SIPInfo")?;

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_info() -> PackageInfo {
        let timestamp = NaiveDate::from_ymd_opt(2004, 4, 11)
            .unwrap()
            .and_hms_opt(18, 18, 16)
            .unwrap();
        PackageInfo {
            id: "PR1_OPER_CHR_MO3_1P_20040411T181816_N31-600_W110-540_0001".to_string(),
            begin: timestamp,
            end: timestamp,
            result_time: timestamp,
            operational_mode: "MODE-3".to_string(),
            product_type: "CHR_MO3_1P".to_string(),
            illumination_azimuth: 136.64,
            illumination_elevation: 61.47,
            center_position: "31.60 -110.54".to_string(),
            file_size: 10_067_698,
            vendor_specific: vec![
                ("originalName".to_string(), "CHRIS_AU_040411_3FB1_41".to_string()),
                ("siteName".to_string(), "Audobon".to_string()),
                ("targetCode".to_string(), "AU".to_string()),
            ],
        }
    }

    #[test]
    fn test_earth_observation_document() {
        let xml = render_earth_observation(&sample_info()).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>"));
        assert!(xml.contains("xmlns:opt=\"http://www.opengis.net/opt/2.1\""));
        assert!(xml.contains(
            "<eop:identifier>PR1_OPER_CHR_MO3_1P_20040411T181816_N31-600_W110-540_0001</eop:identifier>"
        ));
        assert!(xml.contains("<eop:productType>CHR_MO3_1P</eop:productType>"));
        assert!(xml.contains("<gml:beginPosition>2004-04-11T18:18:16Z</gml:beginPosition>"));
        assert!(xml.contains("<eop:size uom=\"bytes\">10067698</eop:size>"));
        assert!(xml.contains("<eop:localAttribute>siteName</eop:localAttribute>"));
        assert!(xml.contains("<eop:localValue>Audobon</eop:localValue>"));
        assert!(xml.contains("illuminationAzimuthAngle uom=\"deg\">136.64<"));
        assert!(xml
            .contains("xlink:href=\"PR1_OPER_CHR_MO3_1P_20040411T181816_N31-600_W110-540_0001.SIP.ZIP\""));
    }

    #[test]
    fn test_sip_info_document() {
        let creation = DateTime::parse_from_rfc3339("2026-08-06T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let xml = render_sip_info("ESA", creation).unwrap();

        assert!(xml.contains("xmlns:sip=\"http://www.eo.esa.int/SIP/sipInfo/2.0\""));
        assert!(xml.contains("version=\"2.0\""));
        assert!(xml.contains("<sip:SIPCreator>ESA</sip:SIPCreator>"));
        assert!(xml.contains("<sip:SIPCreationTime>2026-08-06T10:00:00"));
    }
}
