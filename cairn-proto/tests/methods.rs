use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::header::HeaderMap;
use hyper::{Request, StatusCode};

use cairn_dav::deadtypes::{DeadProperty, DeadValue, PropertyName};
use cairn_dav::realization::Repo;
use cairn_dav::types as dav;
use cairn_dav::xml::{Node, Reader};
use cairn_proto::dav::{dispatch, DavContext};
use cairn_repo::memory::MemRepository;
use cairn_repo::property::{
    Namespace, PropertyTypeDefinition, QualifiedName, StaticTypeRegistry, ValueType,
};
use cairn_user::config::WebdavConfig;
use cairn_user::login::{Principal, SecurityToken};

const NS: &str = "http://example.com/ns";

struct Exchange {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl Exchange {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    async fn decode<T: Node<T>>(&self) -> T {
        let mut rdr = Reader::new(quick_xml::NsReader::from_reader(self.body.as_bytes()))
            .await
            .unwrap();
        rdr.find().await.unwrap()
    }
}

struct Client {
    ctx: Arc<DavContext>,
    token: SecurityToken,
}

impl Client {
    fn as_user(&self, name: &str) -> Client {
        Client {
            ctx: self.ctx.clone(),
            token: SecurityToken::authenticated(Principal(name.into())),
        }
    }

    fn anonymous(&self) -> Client {
        Client {
            ctx: self.ctx.clone(),
            token: SecurityToken::anonymous(),
        }
    }

    async fn send(&self, method: &str, uri: &str, headers: &[(&str, &str)], body: &str) -> Exchange {
        let mut builder = Request::builder().method(method).uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let req = builder.body(Bytes::from(body.to_string())).unwrap();

        let res = dispatch(self.ctx.clone(), self.token.clone(), req)
            .await
            .unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let body = res.into_body().collect().await.unwrap().to_bytes();
        Exchange {
            status,
            headers,
            body: String::from_utf8(body.to_vec()).unwrap(),
        }
    }

    async fn put(&self, uri: &str, content: &str) -> Exchange {
        self.send("PUT", uri, &[("Content-Type", "text/plain")], content)
            .await
    }

    async fn mkcol(&self, uri: &str) -> Exchange {
        self.send("MKCOL", uri, &[], "").await
    }

    async fn lock(&self, uri: &str, headers: &[(&str, &str)]) -> Exchange {
        self.send("LOCK", uri, headers, LOCKINFO).await
    }
}

fn context(webdav: WebdavConfig) -> Arc<DavContext> {
    let registry = StaticTypeRegistry::new([
        PropertyTypeDefinition {
            name: QualifiedName::new(Namespace::Uri(NS.into()), "published"),
            value_type: ValueType::Timestamp,
            multiple: false,
            protected: false,
        },
        PropertyTypeDefinition {
            name: QualifiedName::new(Namespace::Uri(NS.into()), "tags"),
            value_type: ValueType::String,
            multiple: true,
            protected: false,
        },
        PropertyTypeDefinition {
            name: QualifiedName::new(Namespace::Uri(NS.into()), "revision"),
            value_type: ValueType::Integer,
            multiple: false,
            protected: true,
        },
    ]);

    Arc::new(DavContext {
        repository: Arc::new(MemRepository::new(false)),
        registry: Arc::new(registry),
        webdav,
    })
}

/// Alice, on a repository holding /docs/a.txt
async fn alice() -> Client {
    alice_with(WebdavConfig::default()).await
}

async fn alice_with(webdav: WebdavConfig) -> Client {
    let client = Client {
        ctx: context(webdav),
        token: SecurityToken::authenticated(Principal("alice".into())),
    };
    assert_eq!(client.mkcol("/docs").await.status, StatusCode::CREATED);
    assert_eq!(client.put("/docs/a.txt", "hello").await.status, StatusCode::CREATED);
    client
}

const LOCKINFO: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:lockinfo xmlns:D='DAV:'>
    <D:lockscope><D:exclusive/></D:lockscope>
    <D:locktype><D:write/></D:locktype>
    <D:owner>
        <D:href>http://example.org/~alice/contact.html</D:href>
    </D:owner>
</D:lockinfo>"#;

fn lock_token(ex: &Exchange) -> String {
    ex.header("Lock-Token")
        .unwrap()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}

fn if_token(token: &str) -> String {
    format!("(<{}>)", token)
}

fn propfind_prop(props: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:" xmlns:E="{}">
    <D:prop>{}</D:prop>
</D:propfind>"#,
        NS, props
    )
}

fn proppatch(instructions: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propertyupdate xmlns:D="DAV:" xmlns:E="{}">{}</D:propertyupdate>"#,
        NS, instructions
    )
}

/// Property names of the propstats of one resource, grouped by status
fn groups(ms: &dav::Multistatus<Repo>, href: &str) -> Vec<(StatusCode, Vec<dav::PropertyRequest<Repo>>)> {
    ms.responses
        .iter()
        .find_map(|r| match &r.status_or_propstat {
            dav::StatusOrPropstat::PropStat(h, stats) if h.0 == href => Some(stats),
            _ => None,
        })
        .unwrap()
        .iter()
        .map(|stat| {
            let names = stat
                .prop
                .0
                .iter()
                .map(|p| match p {
                    dav::AnyProperty::Request(r) => r.clone(),
                    dav::AnyProperty::Value(v) => v.request(),
                })
                .collect();
            (stat.status.0, names)
        })
        .collect()
}

/// Value of a property found on one resource
fn found(ms: &dav::Multistatus<Repo>, href: &str, name: &PropertyName) -> Option<DeadValue> {
    ms.responses
        .iter()
        .filter_map(|r| match &r.status_or_propstat {
            dav::StatusOrPropstat::PropStat(h, stats) if h.0 == href => Some(stats),
            _ => None,
        })
        .flatten()
        .filter(|stat| stat.status.0 == StatusCode::OK)
        .flat_map(|stat| stat.prop.0.iter())
        .find_map(|p| match p {
            dav::AnyProperty::Value(dav::Property::Extension(DeadProperty { name: n, value }))
                if n == name =>
            {
                Some(value.clone())
            }
            _ => None,
        })
}

// --- OPTIONS, GET, HEAD, PUT, MKCOL ---

#[tokio::test]
async fn options_advertise_locking() {
    let client = alice().await;
    let res = client.send("OPTIONS", "/", &[], "").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.header("DAV"), Some("1, 2"));
    assert_eq!(res.header("MS-Author-Via"), Some("DAV"));
    for method in ["PROPFIND", "PROPPATCH", "LOCK", "UNLOCK", "COPY", "MOVE"] {
        assert!(res.header("Allow").unwrap().contains(method));
    }
}

#[tokio::test]
async fn documents_are_written_and_read() {
    let client = alice().await;

    let get = client.send("GET", "/docs/a.txt", &[], "").await;
    assert_eq!(get.status, StatusCode::OK);
    assert_eq!(get.body, "hello");
    assert_eq!(get.header("Content-Type"), Some("text/plain"));
    let etag = get.header("ETag").unwrap().to_string();
    assert!(get.header("Last-Modified").unwrap().ends_with("GMT"));

    let head = client.send("HEAD", "/docs/a.txt", &[], "").await;
    assert_eq!(head.status, StatusCode::OK);
    assert_eq!(head.header("Content-Length"), Some("5"));
    assert!(head.body.is_empty());

    let cached = client
        .send("GET", "/docs/a.txt", &[("If-None-Match", etag.as_str())], "")
        .await;
    assert_eq!(cached.status, StatusCode::NOT_MODIFIED);

    let stale = client
        .send("PUT", "/docs/a.txt", &[("If-Match", "\"not-the-etag\"")], "bye")
        .await;
    assert_eq!(stale.status, StatusCode::PRECONDITION_FAILED);

    let updated = client
        .send(
            "PUT",
            "/docs/a.txt",
            &[("If-Match", etag.as_str()), ("Content-Language", "en")],
            "hello again",
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_ne!(updated.header("ETag"), Some(etag.as_str()));

    let get = client.send("GET", "/docs/a.txt", &[], "").await;
    assert_eq!(get.body, "hello again");
    assert_eq!(get.header("Content-Language"), Some("en"));

    let create_only = client
        .send("PUT", "/docs/a.txt", &[("If-None-Match", "*")], "nope")
        .await;
    assert_eq!(create_only.status, StatusCode::PRECONDITION_FAILED);

    let missing = client.send("GET", "/docs/nothing.txt", &[], "").await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn put_needs_a_parent_collection() {
    let client = alice().await;
    assert_eq!(
        client.put("/nowhere/a.txt", "x").await.status,
        StatusCode::CONFLICT
    );
    assert_eq!(
        client.put("/docs/a.txt/b.txt", "x").await.status,
        StatusCode::CONFLICT
    );
    assert_eq!(client.put("/docs", "x").await.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn put_refuses_forbidden_names() {
    let client = alice().await;
    assert_eq!(client.put("/docs/.DS_Store", "x").await.status, StatusCode::FORBIDDEN);
    assert_eq!(client.put("/docs/._a.txt", "x").await.status, StatusCode::FORBIDDEN);
    assert_eq!(client.put("/docs/b.txt", "x").await.status, StatusCode::CREATED);
}

#[tokio::test]
async fn anonymous_callers_read_only() {
    let client = alice().await;
    let anonymous = client.anonymous();

    assert_eq!(
        anonymous.send("GET", "/docs/a.txt", &[], "").await.status,
        StatusCode::OK
    );

    let res = anonymous.put("/docs/b.txt", "x").await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.header("WWW-Authenticate"), Some("Basic realm=\"cairn\""));
}

#[tokio::test]
async fn read_only_repository() {
    let ctx = Arc::new(DavContext {
        repository: Arc::new(MemRepository::new(true)),
        registry: Arc::new(StaticTypeRegistry::default()),
        webdav: WebdavConfig::default(),
    });
    let client = Client {
        ctx,
        token: SecurityToken::authenticated(Principal("alice".into())),
    };
    assert_eq!(client.put("/a.txt", "x").await.status, StatusCode::FORBIDDEN);
    assert_eq!(client.mkcol("/dir").await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn collections() {
    let client = alice().await;
    assert_eq!(client.mkcol("/docs").await.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(client.mkcol("/a/b").await.status, StatusCode::CONFLICT);
    assert_eq!(
        client.send("MKCOL", "/other", &[], "<x/>").await.status,
        StatusCode::UNSUPPORTED_MEDIA_TYPE
    );
    assert_eq!(client.mkcol("/docs/sub").await.status, StatusCode::CREATED);
    assert_eq!(
        client.send("GET", "/docs/sub", &[], "").await.status,
        StatusCode::METHOD_NOT_ALLOWED
    );
}

#[tokio::test]
async fn unknown_methods_and_bad_paths() {
    let client = alice().await;
    assert_eq!(
        client.send("REPORT", "/docs", &[], "").await.status,
        StatusCode::NOT_IMPLEMENTED
    );
    assert_eq!(
        client.send("GET", "/docs/../../etc", &[], "").await.status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        client
            .send("PUT", "/docs/a.txt", &[("If", "<nope>")], "x")
            .await
            .status,
        StatusCode::BAD_REQUEST
    );
}

// --- LOCK, UNLOCK ---

#[tokio::test]
async fn lock_then_unlock() {
    let client = alice().await;

    let locked = client
        .lock(
            "/docs/a.txt",
            &[("Depth", "infinity"), ("Timeout", "Second-600")],
        )
        .await;
    assert_eq!(locked.status, StatusCode::OK);
    let token = lock_token(&locked);
    assert!(token.starts_with("opaquelocktoken:"));

    let discovery = locked.decode::<dav::PropValue<Repo>>().await;
    let active = match &discovery.0[..] {
        [dav::Property::LockDiscovery(locks)] => locks[0].clone(),
        other => panic!("unexpected lock discovery {:?}", other),
    };
    assert_eq!(active.depth, dav::Depth::Infinity);
    assert_eq!(active.locktoken, Some(dav::LockToken(dav::Href(token.clone()))));
    assert_eq!(active.lockroot, dav::LockRoot(dav::Href("/docs/a.txt".into())));
    match active.timeout {
        Some(dav::Timeout::Seconds(s)) => assert!((590..=600).contains(&s), "{}", s),
        other => panic!("unexpected timeout {:?}", other),
    }

    // locked: reads go on, writes need the token
    assert_eq!(client.put("/docs/a.txt", "x").await.status, StatusCode::LOCKED);
    assert_eq!(
        client
            .send("PUT", "/docs/a.txt", &[("If", "(<opaquelocktoken:wrong>)")], "x")
            .await
            .status,
        StatusCode::LOCKED
    );
    assert_eq!(
        client.send("GET", "/docs/a.txt", &[], "").await.status,
        StatusCode::OK
    );
    assert_eq!(
        client
            .send("PUT", "/docs/a.txt", &[("If", if_token(&token).as_str())], "x")
            .await
            .status,
        StatusCode::OK
    );

    let lock_header = format!("<{}>", token);
    let unlocked = client
        .send("UNLOCK", "/docs/a.txt", &[("Lock-Token", lock_header.as_str())], "")
        .await;
    assert_eq!(unlocked.status, StatusCode::OK);

    assert_eq!(client.put("/docs/a.txt", "y").await.status, StatusCode::OK);
}

#[tokio::test]
async fn lock_creates_missing_resources() {
    let client = alice().await;
    let locked = client.lock("/docs/new.txt", &[("Depth", "0")]).await;
    assert_eq!(locked.status, StatusCode::CREATED);
    assert!(locked.header("Lock-Token").is_some());
    assert!(locked.body.contains("lockdiscovery"));

    let get = client.send("GET", "/docs/new.txt", &[], "").await;
    assert_eq!(get.status, StatusCode::OK);
    assert!(get.body.is_empty());
}

#[tokio::test]
async fn lock_requests_are_checked() {
    let client = alice().await;
    assert_eq!(
        client.send("LOCK", "/docs/a.txt", &[], "<D:nope xmlns:D=\"DAV:\"/>").await.status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        client.lock("/docs/a.txt", &[("Depth", "2")]).await.status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        client.anonymous().lock("/docs/a.txt", &[]).await.status,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn locks_are_exclusive() {
    let client = alice().await;
    let token = lock_token(&client.lock("/docs/a.txt", &[]).await);

    let bob = client.as_user("bob");
    let conflict = bob.lock("/docs/a.txt", &[]).await;
    assert_eq!(conflict.status, StatusCode::LOCKED);
    assert!(conflict.body.contains("no-conflicting-lock"));

    // knowing the token is not enough to write on somebody else's lock
    assert_eq!(
        bob.send("PUT", "/docs/a.txt", &[("If", if_token(&token).as_str())], "x")
            .await
            .status,
        StatusCode::LOCKED
    );
    assert_eq!(
        bob.send("GET", "/docs/a.txt", &[], "").await.status,
        StatusCode::OK
    );
}

#[tokio::test]
async fn infinite_lock_covers_members() {
    let client = alice().await;
    let token = lock_token(&client.lock("/docs", &[("Depth", "infinity")]).await);

    assert_eq!(client.put("/docs/a.txt", "x").await.status, StatusCode::LOCKED);
    assert_eq!(
        client
            .send("PUT", "/docs/a.txt", &[("If", if_token(&token).as_str())], "x")
            .await
            .status,
        StatusCode::OK
    );

    let discovery = client
        .send(
            "PROPFIND",
            "/docs/a.txt",
            &[("Depth", "0")],
            &propfind_prop("<D:lockdiscovery/>"),
        )
        .await;
    assert!(discovery.body.contains("<D:href>/docs/</D:href>"));
}

#[tokio::test]
async fn lock_refresh() {
    let client = alice().await;
    let token = lock_token(
        &client
            .lock("/docs/a.txt", &[("Timeout", "Second-60")])
            .await,
    );

    let refreshed = client
        .send(
            "LOCK",
            "/docs/a.txt",
            &[("If", if_token(&token).as_str()), ("Timeout", "Second-3600")],
            "",
        )
        .await;
    assert_eq!(refreshed.status, StatusCode::OK);
    let discovery = refreshed.decode::<dav::PropValue<Repo>>().await;
    match &discovery.0[..] {
        [dav::Property::LockDiscovery(locks)] => {
            assert_eq!(locks[0].locktoken, Some(dav::LockToken(dav::Href(token.clone()))));
            match locks[0].timeout {
                Some(dav::Timeout::Seconds(s)) => assert!(s > 60),
                ref other => panic!("unexpected timeout {:?}", other),
            }
        }
        other => panic!("unexpected lock discovery {:?}", other),
    }

    assert_eq!(
        client.send("LOCK", "/docs/a.txt", &[], "").await.status,
        StatusCode::PRECONDITION_FAILED
    );
    assert_eq!(
        client.send("LOCK", "/docs/none.txt", &[], "").await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn unlock_needs_the_lock_token() {
    let client = alice().await;
    client.lock("/docs/a.txt", &[]).await;

    let foreign = client
        .send(
            "UNLOCK",
            "/docs/a.txt",
            &[("Lock-Token", "<opaquelocktoken:e71d4fae-5dec-22d6-fea5-00a0c91e6be4>")],
            "",
        )
        .await;
    assert_eq!(foreign.status, StatusCode::PRECONDITION_FAILED);
    let error = foreign.decode::<dav::Error<Repo>>().await;
    assert_eq!(error.0, vec![dav::Violation::LockTokenMatchesRequestUri]);

    assert_eq!(
        client.send("UNLOCK", "/docs/a.txt", &[], "").await.status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        client
            .send("UNLOCK", "/docs/none.txt", &[("Lock-Token", "<opaquelocktoken:x>")], "")
            .await
            .status,
        StatusCode::NOT_FOUND
    );
}

// --- DELETE, COPY, MOVE ---

#[tokio::test]
async fn delete() {
    let client = alice().await;
    let token = lock_token(&client.lock("/docs/a.txt", &[]).await);

    assert_eq!(
        client.send("DELETE", "/docs/a.txt", &[], "").await.status,
        StatusCode::LOCKED
    );
    assert_eq!(
        client
            .send("DELETE", "/docs/a.txt", &[("If", if_token(&token).as_str())], "")
            .await
            .status,
        StatusCode::OK
    );
    assert_eq!(
        client.send("GET", "/docs/a.txt", &[], "").await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        client.send("DELETE", "/docs/a.txt", &[], "").await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn delete_reports_locked_members() {
    let client = alice().await;
    let bob = client.as_user("bob");
    assert_eq!(bob.put("/docs/b.txt", "bob's").await.status, StatusCode::CREATED);
    bob.lock("/docs/b.txt", &[("Depth", "0")]).await;

    let res = client.send("DELETE", "/docs", &[], "").await;
    assert_eq!(res.status, StatusCode::MULTI_STATUS);
    let ms = res.decode::<dav::Multistatus<Repo>>().await;
    assert_eq!(ms.responses.len(), 1);
    match &ms.responses[0].status_or_propstat {
        dav::StatusOrPropstat::Status(hrefs, status) => {
            assert_eq!(hrefs, &vec![dav::Href("/docs/b.txt".into())]);
            assert_eq!(status.0, StatusCode::LOCKED);
        }
        other => panic!("unexpected response {:?}", other),
    }

    assert_eq!(
        client.send("GET", "/docs/a.txt", &[], "").await.status,
        StatusCode::OK
    );
}

#[tokio::test]
async fn delete_needs_the_tokens_of_locked_members() {
    let client = alice().await;
    let token = lock_token(&client.lock("/docs/a.txt", &[("Depth", "0")]).await);

    let res = client.send("DELETE", "/docs", &[], "").await;
    assert_eq!(res.status, StatusCode::MULTI_STATUS);
    let ms = res.decode::<dav::Multistatus<Repo>>().await;
    match &ms.responses[..] {
        [dav::Response {
            status_or_propstat: dav::StatusOrPropstat::Status(hrefs, status),
            ..
        }] => {
            assert_eq!(hrefs, &vec![dav::Href("/docs/a.txt".into())]);
            assert_eq!(status.0, StatusCode::LOCKED);
        }
        other => panic!("unexpected responses {:?}", other),
    }
    assert_eq!(
        client.send("GET", "/docs/a.txt", &[], "").await.status,
        StatusCode::OK
    );

    let tagged = format!("</docs/a.txt> (<{}>)", token);
    assert_eq!(
        client
            .send("DELETE", "/docs", &[("If", tagged.as_str())], "")
            .await
            .status,
        StatusCode::OK
    );
    assert_eq!(
        client.send("GET", "/docs/a.txt", &[], "").await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn move_needs_the_tokens_of_locked_members() {
    let client = alice().await;
    let token = lock_token(&client.lock("/docs/a.txt", &[("Depth", "0")]).await);

    let dest = ("Destination", "/archive");
    let res = client.send("MOVE", "/docs", &[dest], "").await;
    assert_eq!(res.status, StatusCode::LOCKED);
    assert!(res.body.contains("lock-token-submitted"));
    assert!(res.body.contains("/docs/a.txt"));
    assert_eq!(
        client.send("GET", "/docs/a.txt", &[], "").await.status,
        StatusCode::OK
    );

    // overwriting a collection with a locked member is refused as well
    assert_eq!(client.mkcol("/other").await.status, StatusCode::CREATED);
    let res = client
        .send("COPY", "/other", &[("Destination", "/docs"), ("Overwrite", "T")], "")
        .await;
    assert_eq!(res.status, StatusCode::LOCKED);

    let tagged = format!("</docs/a.txt> (<{}>)", token);
    assert_eq!(
        client
            .send("MOVE", "/docs", &[dest, ("If", tagged.as_str())], "")
            .await
            .status,
        StatusCode::CREATED
    );
    assert_eq!(client.send("GET", "/archive/a.txt", &[], "").await.body, "hello");
}

#[tokio::test]
async fn locked_collections_keep_their_members() {
    let client = alice().await;
    let token = lock_token(&client.lock("/docs", &[("Depth", "infinity")]).await);

    assert_eq!(client.put("/docs/new.txt", "x").await.status, StatusCode::LOCKED);
    assert_eq!(client.mkcol("/docs/sub").await.status, StatusCode::LOCKED);
    let copy = client
        .send("COPY", "/docs/a.txt", &[("Destination", "/docs/copy.txt")], "")
        .await;
    assert_eq!(copy.status, StatusCode::LOCKED);
    assert!(copy.body.contains("<D:href>/docs/</D:href>"));
    assert_eq!(
        client.lock("/docs/other.txt", &[("Depth", "0")]).await.status,
        StatusCode::LOCKED
    );
    assert_eq!(
        client.send("GET", "/docs/new.txt", &[], "").await.status,
        StatusCode::NOT_FOUND
    );

    let submitted = if_token(&token);
    let with_token = [("If", submitted.as_str())];
    assert_eq!(
        client.send("PUT", "/docs/new.txt", &with_token, "x").await.status,
        StatusCode::CREATED
    );
    assert_eq!(
        client.send("MKCOL", "/docs/sub", &with_token, "").await.status,
        StatusCode::CREATED
    );
    assert_eq!(
        client
            .send(
                "COPY",
                "/docs/a.txt",
                &[("Destination", "/docs/copy.txt"), with_token[0]],
                ""
            )
            .await
            .status,
        StatusCode::CREATED
    );
}

#[tokio::test]
async fn depth_zero_collection_lock_covers_membership() {
    let client = alice().await;
    let token = lock_token(&client.lock("/docs", &[("Depth", "0")]).await);

    // members themselves are not locked
    assert_eq!(client.put("/docs/a.txt", "x").await.status, StatusCode::OK);

    assert_eq!(client.put("/docs/new.txt", "x").await.status, StatusCode::LOCKED);
    assert_eq!(
        client.send("DELETE", "/docs/a.txt", &[], "").await.status,
        StatusCode::LOCKED
    );

    let tagged = format!("</docs> (<{}>)", token);
    assert_eq!(
        client
            .send("DELETE", "/docs/a.txt", &[("If", tagged.as_str())], "")
            .await
            .status,
        StatusCode::OK
    );
}

#[tokio::test]
async fn copy() {
    let client = alice().await;
    client.put("/docs/b.txt", "other").await;

    let dest = [("Destination", "http://localhost/docs/b.txt")];
    let res = client
        .send("COPY", "/docs/a.txt", &[dest[0], ("Overwrite", "F")], "")
        .await;
    assert_eq!(res.status, StatusCode::PRECONDITION_FAILED);
    // COPY does not overwrite unless asked to
    assert_eq!(
        client.send("COPY", "/docs/a.txt", &dest, "").await.status,
        StatusCode::PRECONDITION_FAILED
    );

    let res = client
        .send("COPY", "/docs/a.txt", &[dest[0], ("Overwrite", "T")], "")
        .await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);
    assert_eq!(client.send("GET", "/docs/b.txt", &[], "").await.body, "hello");

    let res = client
        .send("COPY", "/docs", &[("Destination", "/copy")], "")
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(client.send("GET", "/copy/a.txt", &[], "").await.body, "hello");
    assert_eq!(client.send("GET", "/docs/a.txt", &[], "").await.body, "hello");

    let res = client
        .send("COPY", "/docs", &[("Destination", "/shallow"), ("Depth", "0")], "")
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(
        client.send("GET", "/shallow/a.txt", &[], "").await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn copy_requests_are_checked() {
    let client = alice().await;
    let cases: [(&[(&str, &str)], StatusCode); 4] = [
        (&[], StatusCode::BAD_REQUEST),
        (&[("Destination", "/docs/a.txt")], StatusCode::FORBIDDEN),
        (
            &[("Destination", "/docs/c.txt"), ("Depth", "1")],
            StatusCode::BAD_REQUEST,
        ),
        (&[("Destination", "/nowhere/c.txt")], StatusCode::CONFLICT),
    ];
    for (headers, expected) in cases {
        let res = client.send("COPY", "/docs/a.txt", headers, "").await;
        assert_eq!(res.status, expected, "{:?}", headers);
    }
}

#[tokio::test]
async fn copy_onto_a_locked_destination() {
    let client = alice().await;
    client.put("/docs/b.txt", "other").await;
    let token = lock_token(&client.lock("/docs/b.txt", &[]).await);

    let dest = ("Destination", "/docs/b.txt");
    let overwrite = ("Overwrite", "T");
    assert_eq!(
        client
            .send("COPY", "/docs/a.txt", &[dest, overwrite], "")
            .await
            .status,
        StatusCode::LOCKED
    );

    let tagged = format!("</docs/b.txt> (<{}>)", token);
    assert_eq!(
        client
            .send("COPY", "/docs/a.txt", &[dest, overwrite, ("If", tagged.as_str())], "")
            .await
            .status,
        StatusCode::NO_CONTENT
    );
}

#[tokio::test]
async fn move_resources() {
    let client = alice().await;

    let res = client
        .send("MOVE", "/docs/a.txt", &[("Destination", "/docs/b.txt")], "")
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(
        client.send("GET", "/docs/a.txt", &[], "").await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(client.send("GET", "/docs/b.txt", &[], "").await.body, "hello");

    // MOVE overwrites unless told otherwise
    client.put("/docs/c.txt", "c").await;
    let res = client
        .send("MOVE", "/docs/c.txt", &[("Destination", "/docs/b.txt")], "")
        .await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);
    assert_eq!(client.send("GET", "/docs/b.txt", &[], "").await.body, "c");

    let res = client
        .send("MOVE", "/docs", &[("Destination", "/docs/inner")], "")
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn move_needs_the_source_token() {
    let client = alice().await;
    let token = lock_token(&client.lock("/docs/a.txt", &[]).await);

    let dest = ("Destination", "/docs/b.txt");
    assert_eq!(
        client.send("MOVE", "/docs/a.txt", &[dest], "").await.status,
        StatusCode::LOCKED
    );
    assert_eq!(
        client
            .send("MOVE", "/docs/a.txt", &[dest, ("If", if_token(&token).as_str())], "")
            .await
            .status,
        StatusCode::CREATED
    );

    // locks stay where they were created
    assert_eq!(client.put("/docs/b.txt", "free").await.status, StatusCode::OK);
}

// --- PROPFIND ---

#[tokio::test]
async fn allprop_of_a_collection() {
    let client = alice().await;
    for body in ["", r#"<D:propfind xmlns:D="DAV:"><D:allprop/></D:propfind>"#] {
        let res = client.send("PROPFIND", "/", &[("Depth", "0")], body).await;
        assert_eq!(res.status, StatusCode::MULTI_STATUS);
        assert_eq!(res.header("Content-Type"), Some("text/xml; charset=\"utf-8\""));
        assert!(res.body.contains("<D:collection/>"));
        assert!(res.body.contains("HTTP/1.1 200 OK"));
        assert!(!res.body.contains("HTTP/1.1 404"));
        assert!(!res.body.contains("<D:href>/docs/</D:href>"));
    }
}

#[tokio::test]
async fn allprop_groups_names_once() {
    let client = alice().await;
    let res = client.send("PROPFIND", "/docs/a.txt", &[("Depth", "0")], "").await;
    assert_eq!(res.status, StatusCode::MULTI_STATUS);
    let ms = res.decode::<dav::Multistatus<Repo>>().await;

    let groups = groups(&ms, "/docs/a.txt");
    assert_eq!(groups.len(), 1);
    let (status, names) = &groups[0];
    assert_eq!(*status, StatusCode::OK);
    for expected in [
        dav::PropertyRequest::DisplayName,
        dav::PropertyRequest::GetContentLength,
        dav::PropertyRequest::GetEtag,
        dav::PropertyRequest::SupportedLock,
    ] {
        assert_eq!(names.iter().filter(|n| **n == expected).count(), 1);
    }
}

#[tokio::test]
async fn explicit_properties() {
    let client = alice().await;
    let body = propfind_prop("<D:displayname/><D:getcontentlength/><E:missing/>");
    let res = client.send("PROPFIND", "/docs/a.txt", &[("Depth", "0")], &body).await;
    assert_eq!(res.status, StatusCode::MULTI_STATUS);
    let ms = res.decode::<dav::Multistatus<Repo>>().await;

    let groups = groups(&ms, "/docs/a.txt");
    let found: Vec<_> = groups.iter().filter(|(s, _)| *s == StatusCode::OK).collect();
    let unknown: Vec<_> = groups
        .iter()
        .filter(|(s, _)| *s == StatusCode::NOT_FOUND)
        .collect();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].1.len(), 2);
    assert_eq!(unknown.len(), 1);
    assert_eq!(
        unknown[0].1,
        vec![dav::PropertyRequest::Extension(PropertyName::new(Some(NS), "missing"))]
    );
}

#[tokio::test]
async fn propname_lists_names() {
    let client = alice().await;
    let body = r#"<D:propfind xmlns:D="DAV:"><D:propname/></D:propfind>"#;
    let res = client.send("PROPFIND", "/docs/a.txt", &[("Depth", "0")], body).await;
    assert_eq!(res.status, StatusCode::MULTI_STATUS);
    assert!(res.body.contains("<D:getetag/>"));
    assert!(!res.body.contains("hello"));
    assert!(!res.body.contains("a.txt</D:displayname>"));
}

#[tokio::test]
async fn propfind_depth() {
    let client = alice().await;
    client.put("/docs/b.txt", "b").await;
    client.mkcol("/docs/sub").await;
    client.put("/docs/sub/c.txt", "c").await;

    let one = client.send("PROPFIND", "/docs", &[], "").await;
    assert_eq!(one.status, StatusCode::MULTI_STATUS);
    let ms = one.decode::<dav::Multistatus<Repo>>().await;
    assert_eq!(ms.responses.len(), 4);
    assert!(one.body.contains("<D:href>/docs/</D:href>"));
    assert!(one.body.contains("<D:href>/docs/sub/</D:href>"));
    assert!(!one.body.contains("/docs/sub/c.txt"));

    let zero = client.send("PROPFIND", "/docs", &[("Depth", "0")], "").await;
    let ms = zero.decode::<dav::Multistatus<Repo>>().await;
    assert_eq!(ms.responses.len(), 1);

    let all = client
        .send("PROPFIND", "/", &[("Depth", "infinity")], "")
        .await;
    assert_eq!(all.status, StatusCode::MULTI_STATUS);
    assert!(all.body.contains("<D:href>/docs/sub/c.txt</D:href>"));

    assert_eq!(
        client.send("PROPFIND", "/docs", &[("Depth", "2")], "").await.status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        client.send("PROPFIND", "/docs", &[], "<D:oops").await.status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        client.send("PROPFIND", "/nothing", &[], "").await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn infinite_propfind_is_bounded() {
    let webdav = WebdavConfig {
        propfind_max_resources: 2,
        ..WebdavConfig::default()
    };
    let client = alice_with(webdav).await;
    client.put("/docs/b.txt", "b").await;

    let res = client
        .send("PROPFIND", "/", &[("Depth", "infinity")], "")
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    let error = res.decode::<dav::Error<Repo>>().await;
    assert_eq!(error.0, vec![dav::Violation::PropfindFiniteDepth]);

    assert_eq!(
        client.send("PROPFIND", "/docs", &[("Depth", "0")], "").await.status,
        StatusCode::MULTI_STATUS
    );
}

#[tokio::test]
async fn large_xml_bodies_are_refused() {
    let webdav = WebdavConfig {
        max_xml_body: 64,
        ..WebdavConfig::default()
    };
    let client = alice_with(webdav).await;
    let body = propfind_prop("<D:displayname/><D:getcontentlength/><D:getetag/>");
    assert_eq!(
        client.send("PROPFIND", "/docs", &[], &body).await.status,
        StatusCode::PAYLOAD_TOO_LARGE
    );
    // content is not XML
    assert_eq!(
        client.put("/docs/big.txt", &"x".repeat(1024)).await.status,
        StatusCode::CREATED
    );
}

// --- PROPPATCH ---

#[tokio::test]
async fn proppatch_then_propfind() {
    let client = alice().await;
    let body = proppatch(
        r#"<D:set><D:prop>
            <E:published>2024-03-01T10:30:00Z</E:published>
            <E:tags>red, green</E:tags>
            <E:note>kept as is</E:note>
        </D:prop></D:set>
        <D:set><D:prop><D:getcontenttype>text/markdown</D:getcontenttype></D:prop></D:set>"#,
    );
    let res = client.send("PROPPATCH", "/docs/a.txt", &[], &body).await;
    assert_eq!(res.status, StatusCode::MULTI_STATUS);

    let ms = res.decode::<dav::Multistatus<Repo>>().await;
    let groups = groups(&ms, "/docs/a.txt");
    assert_eq!(groups.len(), 2);
    assert!(groups.iter().all(|(s, _)| *s == StatusCode::OK));
    assert_eq!(groups[0].1.len(), 3);
    assert_eq!(groups[1].1, vec![dav::PropertyRequest::GetContentType]);

    let res = client
        .send(
            "PROPFIND",
            "/docs/a.txt",
            &[("Depth", "0")],
            &propfind_prop("<E:published/><E:tags/><E:note/>"),
        )
        .await;
    let ms = res.decode::<dav::Multistatus<Repo>>().await;
    assert_eq!(
        found(&ms, "/docs/a.txt", &PropertyName::new(Some(NS), "published")),
        Some(DeadValue::Text("Fri, 01 Mar 2024 10:30:00 GMT".into()))
    );
    assert_eq!(
        found(&ms, "/docs/a.txt", &PropertyName::new(Some(NS), "tags")),
        Some(DeadValue::List(vec!["red".into(), "green".into()]))
    );
    assert_eq!(
        found(&ms, "/docs/a.txt", &PropertyName::new(Some(NS), "note")),
        Some(DeadValue::Text("kept as is".into()))
    );

    let get = client.send("GET", "/docs/a.txt", &[], "").await;
    assert_eq!(get.header("Content-Type"), Some("text/markdown"));

    // remove, then the property is unknown again
    let body = proppatch("<D:remove><D:prop><E:note/><E:never-set/></D:prop></D:remove>");
    assert_eq!(
        client.send("PROPPATCH", "/docs/a.txt", &[], &body).await.status,
        StatusCode::MULTI_STATUS
    );
    let res = client
        .send(
            "PROPFIND",
            "/docs/a.txt",
            &[("Depth", "0")],
            &propfind_prop("<E:note/>"),
        )
        .await;
    let ms = res.decode::<dav::Multistatus<Repo>>().await;
    assert_eq!(found(&ms, "/docs/a.txt", &PropertyName::new(Some(NS), "note")), None);
}

#[tokio::test]
async fn invalid_values_change_nothing() {
    let client = alice().await;
    let body = proppatch(
        r#"<D:set><D:prop><E:tags>a</E:tags></D:prop></D:set>
        <D:set><D:prop><E:published>sometime soon</E:published></D:prop></D:set>"#,
    );
    let res = client.send("PROPPATCH", "/docs/a.txt", &[], &body).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert!(res.body.contains("constraint-violation"));
    assert!(res.body.contains("sometime soon"));

    let res = client
        .send(
            "PROPFIND",
            "/docs/a.txt",
            &[("Depth", "0")],
            &propfind_prop("<E:published/><E:tags/>"),
        )
        .await;
    let ms = res.decode::<dav::Multistatus<Repo>>().await;
    assert_eq!(found(&ms, "/docs/a.txt", &PropertyName::new(Some(NS), "published")), None);
    assert_eq!(found(&ms, "/docs/a.txt", &PropertyName::new(Some(NS), "tags")), None);
}

#[tokio::test]
async fn protected_properties() {
    let client = alice().await;
    for instruction in [
        "<D:set><D:prop><E:revision>3</E:revision></D:prop></D:set>",
        "<D:remove><D:prop><E:revision/></D:prop></D:remove>",
        "<D:set><D:prop><D:getetag>\"forged\"</D:getetag></D:prop></D:set>",
    ] {
        let res = client
            .send("PROPPATCH", "/docs/a.txt", &[], &proppatch(instruction))
            .await;
        assert_eq!(res.status, StatusCode::FORBIDDEN, "{}", instruction);
        let error = res.decode::<dav::Error<Repo>>().await;
        assert_eq!(error.0, vec![dav::Violation::CannotModifyProtectedProperty]);
    }
}

#[tokio::test]
async fn proppatch_preconditions() {
    let client = alice().await;
    let body = proppatch("<D:set><D:prop><E:note>x</E:note></D:prop></D:set>");

    assert_eq!(
        client.send("PROPPATCH", "/docs/none.txt", &[], &body).await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        client.send("PROPPATCH", "/docs/a.txt", &[], "<nope/>").await.status,
        StatusCode::BAD_REQUEST
    );

    let token = lock_token(&client.lock("/docs/a.txt", &[]).await);
    assert_eq!(
        client.send("PROPPATCH", "/docs/a.txt", &[], &body).await.status,
        StatusCode::LOCKED
    );
    assert_eq!(
        client
            .send("PROPPATCH", "/docs/a.txt", &[("If", if_token(&token).as_str())], &body)
            .await
            .status,
        StatusCode::MULTI_STATUS
    );
}

#[tokio::test]
async fn lenient_clients_write_their_own_locks() {
    let client = alice().await;
    client.lock("/docs/a.txt", &[]).await;

    let agent = ("User-Agent", "Microsoft-WebDAV-MiniRedir/10.0.19045");
    assert_eq!(
        client.send("PUT", "/docs/a.txt", &[agent], "x").await.status,
        StatusCode::OK
    );
    assert_eq!(
        client.as_user("bob").send("PUT", "/docs/a.txt", &[agent], "x").await.status,
        StatusCode::LOCKED
    );
}
