//! Flat-document transport for XML-speaking gateways.
//!
//! The document gateways wrap a single-level parameter set in
//! `<xml><key>value</key>...</xml>`. These transforms bridge that encoding
//! to the canonical [`ParamMap`] the signature schemes operate on.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use super::ParamMap;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("Malformed document: {0}")]
    Malformed(String),
}

/// Parse a flat `<xml>` document into a parameter map.
///
/// Text and CDATA content are both accepted; nested elements beyond one
/// level are rejected since no gateway sends them.
pub fn document_to_map(document: &str) -> Result<ParamMap, XmlError> {
    let mut reader = Reader::from_str(document);

    let mut map = ParamMap::new();
    let mut depth = 0usize;
    let mut current: Option<String> = None;
    let mut value = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                depth += 1;
                match depth {
                    1 => {}
                    2 => {
                        current =
                            Some(String::from_utf8_lossy(start.name().as_ref()).into_owned());
                        value.clear();
                    }
                    _ => {
                        return Err(XmlError::Malformed(
                            "nested elements are not allowed".to_string(),
                        ))
                    }
                }
            }
            Ok(Event::Empty(empty)) => {
                if depth == 1 {
                    let key = String::from_utf8_lossy(empty.name().as_ref()).into_owned();
                    map.insert(key, String::new());
                }
            }
            Ok(Event::Text(text)) => {
                if depth == 2 {
                    let unescaped = text
                        .unescape()
                        .map_err(|e| XmlError::Malformed(e.to_string()))?;
                    value.push_str(&unescaped);
                }
            }
            Ok(Event::CData(cdata)) => {
                if depth == 2 {
                    value.push_str(&String::from_utf8_lossy(&cdata.into_inner()));
                }
            }
            Ok(Event::End(_)) => {
                if depth == 2 {
                    if let Some(key) = current.take() {
                        // Surrounding whitespace is formatting, not payload.
                        map.insert(key, std::mem::take(&mut value).trim().to_string());
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(XmlError::Malformed(e.to_string())),
        }
    }

    if depth != 0 || current.is_some() {
        return Err(XmlError::Malformed("unexpected end of document".to_string()));
    }

    Ok(map)
}

/// Render a parameter map as a flat `<xml>` document.
///
/// Values are entity-escaped; keys are trusted (they are our own fixed
/// parameter names).
pub fn map_to_document(params: &ParamMap) -> String {
    let mut document = String::from("<xml>");
    for (key, value) in params {
        document.push('<');
        document.push_str(key);
        document.push('>');
        document.push_str(&escape(value));
        document.push_str("</");
        document.push_str(key);
        document.push('>');
    }
    document.push_str("</xml>");
    document
}
