pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";
pub const XS: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const FNS: &str = "http://www.w3.org/2005/xpath-functions";
pub const MAP_NS: &str = "http://www.w3.org/2005/xpath-functions/map";
pub const ARRAY_NS: &str = "http://www.w3.org/2005/xpath-functions/array";
pub const MATH_NS: &str = "http://www.w3.org/2005/xpath-functions/math";
pub const ERR_NS: &str = "http://www.w3.org/2005/xqt-errors";

pub const CODEPOINT_URI: &str = "http://www.w3.org/2005/xpath-functions/collation/codepoint";
pub const SIMPLE_CASE_URI: &str = "urn:thicket:collation:simple-case-insensitive";
pub const SIMPLE_ACCENT_URI: &str = "urn:thicket:collation:simple-accent-insensitive";
pub const SIMPLE_CASE_ACCENT_URI: &str = "urn:thicket:collation:simple-case-accent-insensitive";
