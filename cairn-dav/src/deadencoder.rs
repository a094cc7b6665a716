use quick_xml::events::{BytesText, Event};
use quick_xml::Error as QError;

use super::deadtypes::*;
use super::xml::{IWrite, QWrite, Writer};

impl QWrite for PropertyName {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let empty = xml.create_foreign_element(self.namespace.as_deref(), &self.name);
        xml.q.write_event_async(Event::Empty(empty)).await
    }
}

impl QWrite for DeadProperty {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_foreign_element(self.name.namespace.as_deref(), &self.name.name);

        // An empty element would be read back as a name, not a value
        let end = start.to_end().into_owned();
        xml.q.write_event_async(Event::Start(start.clone())).await?;
        match &self.value {
            DeadValue::Text(txt) => {
                xml.q
                    .write_event_async(Event::Text(BytesText::new(txt)))
                    .await?
            }
            DeadValue::Xml(markup) => {
                xml.q
                    .write_event_async(Event::Text(BytesText::from_escaped(markup.as_str())))
                    .await?
            }
            DeadValue::List(items) => {
                let values = xml.create_cairn_element("values");
                let values_end = values.to_end();
                xml.q.write_event_async(Event::Start(values.clone())).await?;
                for item in items {
                    let value = xml.create_cairn_element("value");
                    let value_end = value.to_end();
                    xml.q.write_event_async(Event::Start(value.clone())).await?;
                    xml.q
                        .write_event_async(Event::Text(BytesText::new(item)))
                        .await?;
                    xml.q.write_event_async(Event::End(value_end)).await?;
                }
                xml.q.write_event_async(Event::End(values_end)).await?;
            }
        };
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for Violation {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        match self {
            Self::ConstraintViolation(msg) => {
                let start = xml.create_cairn_element("constraint-violation");
                let end = start.to_end();
                xml.q.write_event_async(Event::Start(start.clone())).await?;
                xml.q
                    .write_event_async(Event::Text(BytesText::new(msg)))
                    .await?;
                xml.q.write_event_async(Event::End(end)).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realization::Repo;
    use crate::types as dav;
    use crate::xml::{default_namespaces, Node, Reader};
    use tokio::io::AsyncWriteExt;

    async fn serialize(elem: &impl QWrite) -> String {
        let mut buffer = Vec::new();
        let mut tokio_buffer = tokio::io::BufWriter::new(&mut buffer);
        let q = quick_xml::writer::Writer::new_with_indent(&mut tokio_buffer, b' ', 4);
        let mut writer = Writer {
            q,
            ns_to_apply: default_namespaces(),
        };

        elem.qwrite(&mut writer).await.expect("xml serialization");
        tokio_buffer.flush().await.expect("tokio buffer flush");
        std::str::from_utf8(buffer.as_slice()).unwrap().into()
    }

    async fn deserialize<T: Node<T>>(src: &str) -> T {
        let mut rdr = Reader::new(quick_xml::NsReader::from_reader(src.as_bytes()))
            .await
            .unwrap();
        rdr.find().await.unwrap()
    }

    fn dead(ns: Option<&str>, name: &str, value: DeadValue) -> dav::AnyProperty<Repo> {
        dav::AnyProperty::Value(dav::Property::Extension(DeadProperty {
            name: PropertyName::new(ns, name),
            value,
        }))
    }

    #[tokio::test]
    async fn foreign_namespace_is_declared_inline() {
        let got = serialize(&DeadProperty {
            name: PropertyName::new(Some("http://example.com/ns"), "colour"),
            value: DeadValue::Text("a < b".into()),
        })
        .await;

        assert!(got.contains(r#"<colour xmlns:D="DAV:" xmlns:V="urn:x-cairn:dav:values" xmlns="http://example.com/ns">a &lt; b</colour>"#));
    }

    #[tokio::test]
    async fn propstat_with_dead_properties() {
        let orig = dav::PropStat::<Repo> {
            prop: dav::AnyProp(vec![
                dead(Some("http://example.com/ns"), "colour", DeadValue::Text("blue".into())),
                dead(
                    Some("http://example.com/ns"),
                    "tags",
                    DeadValue::List(vec!["red".into(), "green".into()]),
                ),
                dead(None, "bare", DeadValue::Text("no namespace".into())),
                dead(
                    Some("http://example.com/ns"),
                    "author",
                    DeadValue::Xml(r#"<name xmlns="urn:y">Ann</name>"#.into()),
                ),
                dead(Some("DAV:"), "summary", DeadValue::Text(String::new())),
                dav::AnyProperty::Request(dav::PropertyRequest::Extension(PropertyName::new(
                    Some("http://example.com/ns"),
                    "missing",
                ))),
            ]),
            status: dav::Status(http::status::StatusCode::OK),
            error: None,
            responsedescription: None,
        };

        let got = serialize(&orig).await;
        assert_eq!(deserialize::<dav::PropStat<Repo>>(&got).await, orig);
    }

    #[tokio::test]
    async fn error_with_constraint() {
        let orig = dav::Error::<Repo>(vec![dav::Violation::Extension(
            Violation::ConstraintViolation("expected an integer".into()),
        )]);
        let got = serialize(&orig).await;
        assert!(got.contains("<V:constraint-violation>expected an integer</V:constraint-violation>"));
        assert_eq!(deserialize::<dav::Error<Repo>>(&got).await, orig);
    }
}
