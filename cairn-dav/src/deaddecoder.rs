use quick_xml::events::Event;

use super::deadtypes::*;
use super::error::ParsingError;
use super::xml::{Fragment, IRead, QRead, Reader, CAIRN_URN};

impl QRead<PropertyName> for PropertyName {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        let (namespace, name) = xml.current_name()?;
        xml.open_any().await?;
        xml.close().await?;
        Ok(PropertyName { namespace, name })
    }
}

impl QRead<DeadProperty> for DeadProperty {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        let (namespace, name) = xml.current_name()?;
        let name = PropertyName { namespace, name };

        if matches!(xml.peek(), Event::Empty(_)) {
            xml.open_any().await?;
            xml.close().await?;
            return Ok(DeadProperty {
                name,
                value: DeadValue::Text(String::new()),
            });
        }

        xml.open_any().await?;
        xml.skip_blank().await?;
        let value = if xml.maybe_open(CAIRN_URN, "values").await?.is_some() {
            let mut items = Vec::new();
            loop {
                if xml.maybe_open(CAIRN_URN, "value").await?.is_some() {
                    items.push(xml.tag_string_or_empty().await?);
                    xml.close().await?;
                    continue;
                }
                match xml.peek() {
                    Event::End(_) => break,
                    Event::Start(_) | Event::Empty(_) => {
                        tracing::warn!("a value list only holds value elements, skipping");
                        xml.skip().await?
                    }
                    _ => xml.skip().await?,
                };
            }
            xml.close().await?;
            DeadValue::List(items)
        } else {
            match xml.tag_fragment().await? {
                Fragment::Text(txt) => DeadValue::Text(txt),
                Fragment::Markup(markup) => DeadValue::Xml(markup),
            }
        };
        xml.close().await?;

        Ok(DeadProperty { name, value })
    }
}

impl QRead<Violation> for Violation {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        if xml
            .maybe_open(CAIRN_URN, "constraint-violation")
            .await?
            .is_some()
        {
            let msg = xml.tag_string_or_empty().await?;
            xml.close().await?;
            return Ok(Violation::ConstraintViolation(msg.trim().to_string()));
        }

        Err(ParsingError::Recoverable)
    }
}
