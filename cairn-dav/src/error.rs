use quick_xml::events::attributes::AttrError;

/// Errors raised while decoding an XML document.
///
/// `Recoverable` is not a failure: it tells the caller that the current
/// element is not the one it tried to decode and that it can try another
/// decoder or skip the element.
#[derive(Debug, thiserror::Error)]
pub enum ParsingError {
    #[error("element does not match, try another decoder")]
    Recoverable,
    #[error("a mandatory child element is missing")]
    MissingChild,
    #[error("a mandatory attribute is missing")]
    MissingAttribute,
    #[error("unexpected token")]
    WrongToken,
    #[error("tag not found")]
    TagNotFound,
    #[error("invalid value")]
    InvalidValue,
    #[error("found EOF while expecting data")]
    Eof,
    #[error("utf-8 error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),
    #[error("quick-xml error: {0}")]
    QuickXml(#[from] quick_xml::Error),
    #[error("date parsing error: {0}")]
    Chrono(#[from] chrono::format::ParseError),
    #[error("number parsing error: {0}")]
    Int(#[from] std::num::ParseIntError),
}

impl From<AttrError> for ParsingError {
    fn from(value: AttrError) -> Self {
        Self::QuickXml(value.into())
    }
}
