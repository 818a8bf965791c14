//! Capabilities section selection (`SECTIONS`).

use crate::xml::{XmlElement, XmlNode};

/// Parse a comma separated `SECTIONS` value; `None` means the whole document.
pub fn requested_sections(value: Option<&str>) -> Option<Vec<String>> {
    let sections: Vec<String> = value?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();
    if sections.is_empty() || sections.iter().any(|s| s.eq_ignore_ascii_case("All")) {
        None
    } else {
        Some(sections)
    }
}

/// Keep the root and only the named top-level sections, in document order.
pub fn select_sections(document: XmlElement, sections: Option<&[String]>) -> XmlElement {
    let Some(sections) = sections else {
        return document;
    };
    let XmlElement {
        name,
        prefix,
        namespaces,
        attributes,
        children,
    } = document;
    let children = children
        .into_iter()
        .filter(|node| match node {
            XmlNode::Element(e) => sections.iter().any(|s| s.eq_ignore_ascii_case(e.local_name())),
            XmlNode::Text(_) => false,
        })
        .collect();
    XmlElement {
        name,
        prefix,
        namespaces,
        attributes,
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPABILITIES: &[u8] = br#"<wfs:WFS_Capabilities xmlns:wfs="http://www.opengis.net/wfs" xmlns:ows="http://www.opengis.net/ows" version="1.1.0">
  <ows:ServiceIdentification/>
  <ows:ServiceProvider/>
  <ows:OperationsMetadata/>
  <wfs:FeatureTypeList/>
</wfs:WFS_Capabilities>"#;

    #[test]
    fn test_requested_sections() {
        assert_eq!(requested_sections(None), None);
        assert_eq!(requested_sections(Some("All")), None);
        assert_eq!(requested_sections(Some(" , ")), None);
        assert_eq!(
            requested_sections(Some("ServiceIdentification, FeatureTypeList")),
            Some(vec!["ServiceIdentification".to_string(), "FeatureTypeList".to_string()])
        );
    }

    #[test]
    fn test_select_sections() {
        let doc = XmlElement::parse(CAPABILITIES).unwrap();
        let sections = requested_sections(Some("featuretypelist,ServiceIdentification"));
        let selected = select_sections(doc, sections.as_deref());
        let names: Vec<_> = selected.child_elements().map(|e| e.local_name().to_string()).collect();
        assert_eq!(names, vec!["ServiceIdentification", "FeatureTypeList"]);
        assert_eq!(selected.attribute("version"), Some("1.1.0"));
    }

    #[test]
    fn test_all_keeps_document() {
        let doc = XmlElement::parse(CAPABILITIES).unwrap();
        let selected = select_sections(doc.clone(), requested_sections(Some("All")).as_deref());
        assert_eq!(selected, doc);
    }
}
