//! Grammar of the conditional headers of RFC 4918 §10.4 (`If`)
//! and RFC 9110 §13.1 (`If-Match`, `If-None-Match`)

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, map, opt, recognize},
    multi::{many1, separated_list1},
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum HeaderError {
    #[error("malformed {0} header")]
    Malformed(&'static str),
}

/// The If header: the request proceeds when any list holds
#[derive(Debug, PartialEq, Clone)]
pub struct IfHeader(pub Vec<IfList>);

/// A parenthesized list, holding when all its conditions hold.
///
/// A tagged list (`<uri> (...)`) only applies to the resource
/// designated by `resource`.
#[derive(Debug, PartialEq, Clone)]
pub struct IfList {
    pub resource: Option<String>,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Condition {
    pub negated: bool,
    pub subject: Subject,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Subject {
    /// `<opaquelocktoken:...>`, a state token
    Token(String),
    /// `["etag"]`, kept with its quotes and weak prefix
    ETag(String),
}

/// Value of If-Match and If-None-Match
#[derive(Debug, PartialEq, Clone)]
pub enum ETagMatch {
    Any,
    Tags(Vec<String>),
}

impl ETagMatch {
    /// Weak comparison against the current entity tag of a resource
    pub fn matches(&self, current: Option<&str>) -> bool {
        match (self, current) {
            (_, None) => false,
            (Self::Any, Some(_)) => true,
            (Self::Tags(tags), Some(cur)) => tags.iter().any(|t| weak_eq(t, cur)),
        }
    }
}

/// Entity tags are equal when their opaque parts are,
/// ignoring the weak marker and the quotes
pub fn weak_eq(a: &str, b: &str) -> bool {
    opaque(a) == opaque(b)
}

fn opaque(etag: &str) -> &str {
    let etag = etag.trim();
    let etag = etag.strip_prefix("W/").unwrap_or(etag);
    etag.trim_matches('"')
}

pub fn parse_if(value: &str) -> Result<IfHeader, HeaderError> {
    all_consuming(terminated(if_header, multispace0))(value)
        .map(|(_, hdr)| hdr)
        .map_err(|_| HeaderError::Malformed("If"))
}

pub fn parse_etag_match(value: &str) -> Result<ETagMatch, HeaderError> {
    all_consuming(delimited(multispace0, etag_match, multispace0))(value)
        .map(|(_, m)| m)
        .map_err(|_| HeaderError::Malformed("If-Match"))
}

// ---------------------

fn if_header(input: &str) -> IResult<&str, IfHeader> {
    preceded(
        multispace0,
        alt((
            map(many1(terminated(tagged_lists, multispace0)), |groups| {
                IfHeader(groups.into_iter().flatten().collect())
            }),
            map(many1(terminated(list, multispace0)), |lists| {
                IfHeader(
                    lists
                        .into_iter()
                        .map(|conditions| IfList {
                            resource: None,
                            conditions,
                        })
                        .collect(),
                )
            }),
        )),
    )(input)
}

fn tagged_lists(input: &str) -> IResult<&str, Vec<IfList>> {
    let (input, resource) = terminated(coded_url, multispace0)(input)?;
    let (input, lists) = many1(terminated(list, multispace0))(input)?;
    let tagged = lists
        .into_iter()
        .map(|conditions| IfList {
            resource: Some(resource.to_string()),
            conditions,
        })
        .collect();
    Ok((input, tagged))
}

fn list(input: &str) -> IResult<&str, Vec<Condition>> {
    delimited(
        pair(char('('), multispace0),
        many1(terminated(condition, multispace0)),
        char(')'),
    )(input)
}

fn condition(input: &str) -> IResult<&str, Condition> {
    let (input, not) = opt(terminated(tag_no_case("Not"), multispace0))(input)?;
    let (input, subject) = alt((
        map(coded_url, |url| Subject::Token(url.trim().to_string())),
        map(bracketed_etag, |etag| Subject::ETag(etag.trim().to_string())),
    ))(input)?;
    Ok((
        input,
        Condition {
            negated: not.is_some(),
            subject,
        },
    ))
}

fn coded_url(input: &str) -> IResult<&str, &str> {
    delimited(char('<'), take_while1(|c: char| c != '>'), char('>'))(input)
}

fn bracketed_etag(input: &str) -> IResult<&str, &str> {
    delimited(char('['), take_while1(|c: char| c != ']'), char(']'))(input)
}

fn etag_match(input: &str) -> IResult<&str, ETagMatch> {
    alt((
        map(char('*'), |_| ETagMatch::Any),
        map(
            separated_list1(delimited(multispace0, char(','), multispace0), entity_tag),
            |tags| ETagMatch::Tags(tags.into_iter().map(str::to_string).collect()),
        ),
    ))(input)
}

fn entity_tag(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(pair(
            opt(tag("W/")),
            delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
        )),
        // some clients forget the quotes
        take_while1(|c: char| c != ',' && !c.is_whitespace()),
    ))(input)
}
