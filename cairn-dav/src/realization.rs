use super::deadtypes as dead;
use super::error;
use super::types as dav;
use super::xml;

/// An extension point nobody uses: no value of this type can exist
#[derive(Debug, PartialEq, Clone)]
pub enum Disabled {}
impl xml::QRead<Disabled> for Disabled {
    async fn qread(_xml: &mut xml::Reader<impl xml::IRead>) -> Result<Self, error::ParsingError> {
        Err(error::ParsingError::Recoverable)
    }
}
impl xml::QWrite for Disabled {
    async fn qwrite(
        &self,
        _xml: &mut xml::Writer<impl xml::IWrite>,
    ) -> Result<(), quick_xml::Error> {
        match *self {}
    }
}

/// The base WebDAV
///
/// Any element outside of RFC 4918 is skipped.
#[derive(Debug, PartialEq, Clone)]
pub struct Core {}
impl dav::Extension for Core {
    type Error = Disabled;
    type Property = Disabled;
    type PropertyRequest = Disabled;
    type ResourceType = Disabled;
}

/// WebDAV over a property repository
///
/// Unknown elements become dead properties, stored and returned
/// as they were sent.
#[derive(Debug, PartialEq, Clone)]
pub struct Repo {}
impl dav::Extension for Repo {
    type Error = dead::Violation;
    type Property = dead::DeadProperty;
    type PropertyRequest = dead::PropertyName;
    type ResourceType = Disabled;
}
