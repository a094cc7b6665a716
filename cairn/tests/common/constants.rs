use std::time;

pub static SMALL_DELAY: time::Duration = time::Duration::from_millis(200);

pub static DAV_ROOT: &str = "http://localhost:8087";
pub static EXAMPLE_NS: &str = "http://example.com/ns";

pub static LOCKINFO: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:lockinfo xmlns:D="DAV:">
    <D:lockscope><D:exclusive/></D:lockscope>
    <D:locktype><D:write/></D:locktype>
    <D:owner><D:href>mailto:alice@example.com</D:href></D:owner>
</D:lockinfo>"#;
