//! Namespace URIs the gateway recognizes or emits.

pub const SOAP_ENVELOPE: &str = "http://schemas.xmlsoap.org/soap/envelope/";

pub const OGC: &str = "http://www.opengis.net/ogc";
pub const OWS: &str = "http://www.opengis.net/ows";
pub const OWS_1_1: &str = "http://www.opengis.net/ows/1.1";

pub const WMS: &str = "http://www.opengis.net/wms";
pub const WFS: &str = "http://www.opengis.net/wfs";
pub const WCS: &str = "http://www.opengis.net/wcs";
pub const CSW: &str = "http://www.opengis.net/cat/csw";
pub const CSW_2_0_2: &str = "http://www.opengis.net/cat/csw/2.0.2";
pub const WMPS: &str = "http://www.opengis.net/wmps";
pub const WCTS: &str = "http://www.opengis.net/wcts/0.0";
pub const DEEGREE_WCTS: &str = "http://www.deegree.org/wcts";

pub const EBRIM: &str = "urn:oasis:names:tc:ebxml-regrep:xsd:rim:3.0";
pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
