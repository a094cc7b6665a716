use futures::Future;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use tokio::io::{AsyncBufRead, AsyncWrite};

use super::error::ParsingError;

// Constants
pub const DAV_URN: &[u8] = b"DAV:";
pub const CAIRN_URN: &[u8] = b"urn:x-cairn:dav:values";

// Async traits
pub trait IWrite: AsyncWrite + Unpin + Send {}
impl<T: AsyncWrite + Unpin + Send> IWrite for T {}

pub trait IRead: AsyncBufRead + Unpin {}
impl<T: AsyncBufRead + Unpin> IRead for T {}

// Serialization/Deserialization traits
pub trait QWrite {
    fn qwrite(
        &self,
        xml: &mut Writer<impl IWrite>,
    ) -> impl Future<Output = Result<(), quick_xml::Error>> + Send;
}
pub trait QRead<T> {
    fn qread(xml: &mut Reader<impl IRead>) -> impl Future<Output = Result<T, ParsingError>>;
}

// The representation of an XML node in Rust
pub trait Node<T>: QRead<T> + QWrite + std::fmt::Debug + PartialEq + Clone + Sync + Send {}
impl<T: QRead<T> + QWrite + std::fmt::Debug + PartialEq + Clone + Sync + Send> Node<T> for T {}

/// The namespace declarations every document we emit starts with
pub fn default_namespaces() -> Vec<(String, String)> {
    vec![
        ("xmlns:D".into(), "DAV:".into()),
        ("xmlns:V".into(), "urn:x-cairn:dav:values".into()),
    ]
}

// ---------------

/// Transform a Rust object into an XML stream of characters
pub struct Writer<T: IWrite> {
    pub q: quick_xml::writer::Writer<T>,
    pub ns_to_apply: Vec<(String, String)>,
}
impl<T: IWrite> Writer<T> {
    pub fn create_dav_element(&mut self, name: &str) -> BytesStart<'static> {
        self.create_ns_element("D", name)
    }
    pub fn create_cairn_element(&mut self, name: &str) -> BytesStart<'static> {
        self.create_ns_element("V", name)
    }

    /// An element from a vocabulary we don't have a prefix for.
    /// Known namespaces reuse their prefix, others are declared
    /// as the default namespace of the element.
    pub fn create_foreign_element(&mut self, ns: Option<&str>, name: &str) -> BytesStart<'static> {
        match ns.map(str::as_bytes) {
            Some(DAV_URN) => self.create_dav_element(name),
            Some(CAIRN_URN) => self.create_cairn_element(name),
            Some(uri) => {
                let mut start = self.apply_ns(BytesStart::new(name.to_string()));
                start.push_attribute(("xmlns".as_bytes(), uri));
                start
            }
            None => self.apply_ns(BytesStart::new(name.to_string())),
        }
    }

    fn create_ns_element(&mut self, ns: &str, name: &str) -> BytesStart<'static> {
        self.apply_ns(BytesStart::new(format!("{}:{}", ns, name)))
    }

    fn apply_ns(&mut self, mut start: BytesStart<'static>) -> BytesStart<'static> {
        if !self.ns_to_apply.is_empty() {
            start.extend_attributes(
                self.ns_to_apply
                    .iter()
                    .map(|(k, n)| (k.as_str(), n.as_str())),
            );
            self.ns_to_apply.clear()
        }
        start
    }
}

/// Content of an element we don't know the schema of
#[derive(Debug, PartialEq, Clone)]
pub enum Fragment {
    /// Only character data, unescaped
    Text(String),
    /// At least one child element, kept as escaped markup
    Markup(String),
}

/// Transform an XML stream of characters into a Rust object
pub struct Reader<T: IRead> {
    pub rdr: NsReader<T>,
    cur: Event<'static>,
    prev: Event<'static>,
    parents: Vec<Event<'static>>,
    buf: Vec<u8>,
}
impl<T: IRead> Reader<T> {
    pub async fn new(mut rdr: NsReader<T>) -> Result<Self, ParsingError> {
        let mut buf: Vec<u8> = vec![];
        let cur = rdr.read_event_into_async(&mut buf).await?.into_owned();
        let parents = vec![];
        let prev = Event::Eof;
        buf.clear();
        Ok(Self {
            cur,
            prev,
            parents,
            rdr,
            buf,
        })
    }

    /// read one more tag, private on purpose
    async fn next(&mut self) -> Result<Event<'static>, ParsingError> {
        let evt = self
            .rdr
            .read_event_into_async(&mut self.buf)
            .await?
            .into_owned();
        self.buf.clear();
        self.prev = std::mem::replace(&mut self.cur, evt);
        Ok(self.prev.clone())
    }

    /// skip a node at current level
    pub async fn skip(&mut self) -> Result<Event<'static>, ParsingError> {
        match &self.cur {
            Event::Start(b) => {
                let _span = self
                    .rdr
                    .read_to_end_into_async(b.to_end().name(), &mut self.buf)
                    .await?;
                self.next().await
            }
            Event::End(_) => Err(ParsingError::WrongToken),
            Event::Eof => Err(ParsingError::Eof),
            _ => self.next().await,
        }
    }

    /// skip character data made only of whitespaces
    pub async fn skip_blank(&mut self) -> Result<(), ParsingError> {
        loop {
            match self.peek() {
                Event::Text(t) if t.unescape()?.trim().is_empty() => self.next().await?,
                Event::Comment(_) | Event::PI(_) => self.next().await?,
                _ => return Ok(()),
            };
        }
    }

    /// check if this is the desired tag
    fn is_tag(&self, ns: &[u8], key: &str) -> bool {
        let qname = match self.peek() {
            Event::Start(bs) | Event::Empty(bs) => bs.name(),
            Event::End(be) => be.name(),
            _ => return false,
        };

        let (extr_ns, local) = self.rdr.resolve_element(qname);

        if local.into_inner() != key.as_bytes() {
            return false;
        }

        match extr_ns {
            ResolveResult::Bound(v) => v.into_inner() == ns,
            _ => false,
        }
    }

    /// Namespace and local name of the element under the cursor
    pub fn current_name(&self) -> Result<(Option<String>, String), ParsingError> {
        let qname = match self.peek() {
            Event::Start(bs) | Event::Empty(bs) => bs.name(),
            _ => return Err(ParsingError::Recoverable),
        };

        let (extr_ns, local) = self.rdr.resolve_element(qname);
        let local = std::str::from_utf8(local.into_inner())?.to_string();
        let ns = match extr_ns {
            ResolveResult::Bound(v) => Some(std::str::from_utf8(v.into_inner())?.to_string()),
            ResolveResult::Unbound => None,
            ResolveResult::Unknown(_) => return Err(ParsingError::InvalidValue),
        };

        Ok((ns, local))
    }

    /// Local name of the element under the cursor, when it lives in `ns`
    pub fn peek_name_in(&self, ns: &[u8]) -> Option<String> {
        match self.current_name() {
            Ok((Some(uri), local)) if uri.as_bytes() == ns => Some(local),
            _ => None,
        }
    }

    /// To call when no known child matched: the node under the cursor is
    /// skipped. Returns true once the current element has no more children.
    pub async fn skip_or_end(&mut self) -> Result<bool, ParsingError> {
        if !self.parent_has_child() {
            return Ok(true);
        }
        match self.peek() {
            Event::End(_) => Ok(true),
            _ => {
                self.skip().await?;
                Ok(false)
            }
        }
    }

    pub fn parent_has_child(&self) -> bool {
        matches!(self.parents.last(), Some(Event::Start(_)) | None)
    }

    fn ensure_parent_has_child(&self) -> Result<(), ParsingError> {
        match self.parent_has_child() {
            true => Ok(()),
            false => Err(ParsingError::Recoverable),
        }
    }

    pub fn peek(&self) -> &Event<'static> {
        &self.cur
    }

    pub fn previous(&self) -> &Event<'static> {
        &self.prev
    }

    pub async fn tag_string(&mut self) -> Result<String, ParsingError> {
        self.ensure_parent_has_child()?;

        let mut acc = String::new();
        loop {
            match self.peek() {
                Event::CData(unescaped) => {
                    acc.push_str(std::str::from_utf8(unescaped.as_ref())?);
                    self.next().await?
                }
                Event::Text(escaped) => {
                    acc.push_str(escaped.unescape()?.as_ref());
                    self.next().await?
                }
                Event::End(_) | Event::Start(_) | Event::Empty(_) => return Ok(acc),
                Event::Eof => return Err(ParsingError::Eof),
                _ => self.next().await?,
            };
        }
    }

    /// Same as `tag_string` but an empty element is an empty string
    pub async fn tag_string_or_empty(&mut self) -> Result<String, ParsingError> {
        match self.parent_has_child() {
            true => self.tag_string().await,
            false => Ok(String::new()),
        }
    }

    /// Consume the content of the current element, whatever it is.
    ///
    /// Nested elements are written back with their namespace declared
    /// explicitly, so the markup stays meaningful once detached from the
    /// document it comes from.
    pub async fn tag_fragment(&mut self) -> Result<Fragment, ParsingError> {
        if !self.parent_has_child() {
            return Ok(Fragment::Text(String::new()));
        }

        let (mut text, mut markup) = (String::new(), String::new());
        let mut has_markup = false;
        // namespace in scope at each depth of the fragment
        let mut scopes: Vec<Option<String>> = vec![];

        loop {
            match self.peek() {
                Event::Start(bs) | Event::Empty(bs) => {
                    has_markup = true;
                    let is_empty = matches!(self.peek(), Event::Empty(_));
                    let (ns, local) = self.current_name()?;
                    markup.push('<');
                    markup.push_str(&local);
                    if scopes.is_empty() || scopes.last() != Some(&ns) {
                        markup.push_str(&format!(
                            " xmlns=\"{}\"",
                            quick_xml::escape::escape(ns.as_deref().unwrap_or(""))
                        ));
                    }
                    for attr in bs.attributes() {
                        let attr = attr?;
                        let key = std::str::from_utf8(attr.key.into_inner())?;
                        if key.starts_with("xmlns") || key.contains(':') {
                            continue;
                        }
                        let value = attr.unescape_value()?;
                        markup.push_str(&format!(
                            " {}=\"{}\"",
                            key,
                            quick_xml::escape::escape(value.as_ref())
                        ));
                    }
                    match is_empty {
                        true => markup.push_str("/>"),
                        false => {
                            markup.push('>');
                            scopes.push(ns);
                        }
                    }
                }
                Event::End(be) => {
                    if scopes.pop().is_none() {
                        break;
                    }
                    let (_, local) = self.rdr.resolve_element(be.name());
                    markup.push_str("</");
                    markup.push_str(std::str::from_utf8(local.into_inner())?);
                    markup.push('>');
                }
                Event::Text(escaped) => {
                    markup.push_str(std::str::from_utf8(escaped)?);
                    text.push_str(escaped.unescape()?.as_ref());
                }
                Event::CData(unescaped) => {
                    let raw = std::str::from_utf8(unescaped.as_ref())?;
                    markup.push_str(quick_xml::escape::escape(raw).as_ref());
                    text.push_str(raw);
                }
                Event::Eof => return Err(ParsingError::Eof),
                _ => (),
            };
            self.next().await?;
        }

        match has_markup {
            true => Ok(Fragment::Markup(markup.trim().to_string())),
            false => Ok(Fragment::Text(text)),
        }
    }

    pub async fn maybe_read<N: Node<N>>(
        &mut self,
        t: &mut Option<N>,
        dirty: &mut bool,
    ) -> Result<(), ParsingError> {
        if !self.parent_has_child() {
            return Ok(());
        }

        match N::qread(self).await {
            Ok(v) => {
                *t = Some(v);
                *dirty = true;
                Ok(())
            }
            Err(ParsingError::Recoverable) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn maybe_push<N: Node<N>>(
        &mut self,
        t: &mut Vec<N>,
        dirty: &mut bool,
    ) -> Result<(), ParsingError> {
        if !self.parent_has_child() {
            return Ok(());
        }

        match N::qread(self).await {
            Ok(v) => {
                t.push(v);
                *dirty = true;
                Ok(())
            }
            Err(ParsingError::Recoverable) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn find<N: Node<N>>(&mut self) -> Result<N, ParsingError> {
        self.ensure_parent_has_child()?;

        loop {
            // Try parse
            match N::qread(self).await {
                Err(ParsingError::Recoverable) => (),
                otherwise => return otherwise,
            }

            // If recovered, skip the element
            self.skip().await?;
        }
    }

    pub async fn maybe_find<N: Node<N>>(&mut self) -> Result<Option<N>, ParsingError> {
        // We can't find anything inside a self-closed tag
        if !self.parent_has_child() {
            return Ok(None);
        }

        loop {
            // Try parse
            match N::qread(self).await {
                Err(ParsingError::Recoverable) => (),
                otherwise => return otherwise.map(Some),
            }

            // Skip or stop
            match self.peek() {
                Event::End(_) => return Ok(None),
                _ => self.skip().await?,
            };
        }
    }

    pub async fn collect<N: Node<N>>(&mut self) -> Result<Vec<N>, ParsingError> {
        let mut acc = Vec::new();
        if !self.parent_has_child() {
            return Ok(acc);
        }

        loop {
            match N::qread(self).await {
                Err(ParsingError::Recoverable) => match self.peek() {
                    Event::End(_) => return Ok(acc),
                    _ => {
                        self.skip().await?;
                    }
                },
                Ok(v) => acc.push(v),
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn open(&mut self, ns: &[u8], key: &str) -> Result<Event<'static>, ParsingError> {
        let evt = match self.peek() {
            Event::Empty(_) if self.is_tag(ns, key) => {
                // an empty node has no closing event: we duplicate the
                // current event to virtually move one token forward
                self.prev = self.cur.clone();
                self.cur.clone()
            }
            Event::Start(_) if self.is_tag(ns, key) => self.next().await?,
            _ => return Err(ParsingError::Recoverable),
        };

        self.parents.push(evt.clone());
        Ok(evt)
    }

    /// Open the element under the cursor, whatever its name
    pub async fn open_any(&mut self) -> Result<Event<'static>, ParsingError> {
        let evt = match self.peek() {
            Event::Empty(_) => {
                self.prev = self.cur.clone();
                self.cur.clone()
            }
            Event::Start(_) => self.next().await?,
            _ => return Err(ParsingError::Recoverable),
        };

        self.parents.push(evt.clone());
        Ok(evt)
    }

    pub async fn open_start(
        &mut self,
        ns: &[u8],
        key: &str,
    ) -> Result<Event<'static>, ParsingError> {
        let evt = match self.peek() {
            Event::Start(_) if self.is_tag(ns, key) => self.next().await?,
            _ => return Err(ParsingError::Recoverable),
        };

        self.parents.push(evt.clone());
        Ok(evt)
    }

    pub async fn maybe_open(
        &mut self,
        ns: &[u8],
        key: &str,
    ) -> Result<Option<Event<'static>>, ParsingError> {
        match self.open(ns, key).await {
            Ok(v) => Ok(Some(v)),
            Err(ParsingError::Recoverable) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn maybe_open_start(
        &mut self,
        ns: &[u8],
        key: &str,
    ) -> Result<Option<Event<'static>>, ParsingError> {
        match self.open_start(ns, key).await {
            Ok(v) => Ok(Some(v)),
            Err(ParsingError::Recoverable) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // find stop tag
    pub async fn close(&mut self) -> Result<Event<'static>, ParsingError> {
        // Handle the empty case
        if !self.parent_has_child() {
            self.parents.pop();
            return self.next().await;
        }

        // Handle the start/end case
        loop {
            match self.peek() {
                Event::End(_) => {
                    self.parents.pop();
                    return self.next().await;
                }
                _ => self.skip().await?,
            };
        }
    }
}
