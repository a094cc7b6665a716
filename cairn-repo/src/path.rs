use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters escaped when a path segment is written in an URL
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PathError {
    #[error("path is not valid utf-8 once decoded")]
    Encoding,
    #[error("path escapes the repository root")]
    Traversal,
}

/// Absolute path of a node in the repository: `/` or `/a/b`.
///
/// Segments are stored decoded, never empty, never `.` or `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(String);

impl Path {
    pub fn root() -> Self {
        Self("/".into())
    }

    /// Parse the path part of a request URL
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let decoded = percent_decode_str(raw)
            .decode_utf8()
            .or(Err(PathError::Encoding))?;

        let mut segments = Vec::new();
        for seg in decoded.split('/') {
            match seg {
                "" | "." => continue,
                ".." => return Err(PathError::Traversal),
                s => segments.push(s),
            }
        }

        Ok(Self::from_segments(segments))
    }

    fn from_segments<'a>(segments: impl IntoIterator<Item = &'a str>) -> Self {
        let mut p = String::new();
        for seg in segments {
            p.push('/');
            p.push_str(seg);
        }
        if p.is_empty() {
            p.push('/');
        }
        Self(p)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Last segment, empty for the root
    pub fn name(&self) -> &str {
        self.segments().last().unwrap_or("")
    }

    pub fn parent(&self) -> Option<Path> {
        if self.is_root() {
            return None;
        }
        let count = self.segments().count();
        Some(Self::from_segments(self.segments().take(count - 1)))
    }

    pub fn join(&self, name: &str) -> Path {
        Self::from_segments(self.segments().chain(std::iter::once(name)))
    }

    /// Strict ancestry: a path is not its own ancestor
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        if self == other {
            return false;
        }
        self.is_root() || other.0.starts_with(&format!("{}/", self.0))
    }

    /// Same path, moved from the `from` subtree to the `to` subtree
    pub fn rebase(&self, from: &Path, to: &Path) -> Option<Path> {
        if self == from {
            return Some(to.clone());
        }
        if !from.is_ancestor_of(self) {
            return None;
        }
        let skip = from.segments().count();
        Some(Self::from_segments(
            to.segments().chain(self.segments().skip(skip)),
        ))
    }

    /// Encoded form, as written in a `href` element
    pub fn to_href(&self, collection: bool) -> String {
        let mut href = String::new();
        for seg in self.segments() {
            href.push('/');
            href.extend(utf8_percent_encode(seg, SEGMENT));
        }
        if collection || href.is_empty() {
            href.push('/');
        }
        href
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes() {
        assert_eq!(Path::parse("").unwrap(), Path::root());
        assert_eq!(Path::parse("/").unwrap(), Path::root());
        assert_eq!(Path::parse("//a/./b/").unwrap().as_str(), "/a/b");
        assert_eq!(Path::parse("/a%20b/c%C3%A9").unwrap().as_str(), "/a b/cé");
        assert_eq!(Path::parse("/a/../b"), Err(PathError::Traversal));
        assert_eq!(Path::parse("/%ff"), Err(PathError::Encoding));
    }

    #[test]
    fn hierarchy() {
        let p = Path::parse("/docs/2024/report.txt").unwrap();
        assert_eq!(p.name(), "report.txt");
        assert_eq!(p.parent().unwrap().as_str(), "/docs/2024");
        assert_eq!(Path::parse("/docs").unwrap().parent(), Some(Path::root()));
        assert_eq!(Path::root().parent(), None);
        assert_eq!(Path::root().name(), "");
        assert_eq!(Path::root().join("x").as_str(), "/x");

        let docs = Path::parse("/docs").unwrap();
        assert!(docs.is_ancestor_of(&p));
        assert!(Path::root().is_ancestor_of(&docs));
        assert!(!docs.is_ancestor_of(&docs));
        assert!(!docs.is_ancestor_of(&Path::parse("/docs2/a").unwrap()));
    }

    #[test]
    fn rebase_subtree() {
        let from = Path::parse("/a").unwrap();
        let to = Path::parse("/z/y").unwrap();
        let p = Path::parse("/a/b/c").unwrap();
        assert_eq!(p.rebase(&from, &to).unwrap().as_str(), "/z/y/b/c");
        assert_eq!(from.rebase(&from, &to), Some(to.clone()));
        assert_eq!(Path::parse("/ab").unwrap().rebase(&from, &to), None);
    }

    #[test]
    fn href_encoding() {
        assert_eq!(Path::root().to_href(true), "/");
        assert_eq!(Path::root().to_href(false), "/");
        let p = Path::parse("/my docs/a#b").unwrap();
        assert_eq!(p.to_href(false), "/my%20docs/a%23b");
        assert_eq!(p.to_href(true), "/my%20docs/a%23b/");
    }
}
