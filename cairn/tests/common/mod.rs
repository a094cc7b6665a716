pub mod constants;

use anyhow::{bail, Result};
use std::net::TcpStream;
use std::process::Command;
use std::thread;

use cairn_dav::xml::{Node, Reader};

use crate::common::constants::*;

/// Run `fx` against a `cairn --dev daemon`, stopped afterwards
pub fn cairn_daemon_dev(mut fx: impl FnMut(&reqwest::blocking::Client) -> Result<()>) -> Result<()> {
    // Check port is not used (= free) before starting the test
    let mut max_retry = 20;
    loop {
        max_retry -= 1;
        match (TcpStream::connect("[::1]:8087"), max_retry) {
            (Ok(_), 0) => bail!("something is listening on [::1]:8087 and prevent the test from starting"),
            (Ok(_), _) => println!("something is listening on [::1]:8087, maybe a previous daemon quitting, retrying soon..."),
            (Err(_), _) => {
                println!("test ready to start, [::1]:8087 is free!");
                break
            }
        }
        thread::sleep(SMALL_DELAY);
    }

    // Start daemon
    let mut daemon = Command::new(env!("CARGO_BIN_EXE_cairn"))
        .arg("--dev")
        .arg("daemon")
        .spawn()?;

    // Check that our daemon is correctly listening on the free port
    let mut max_retry = 20;
    loop {
        max_retry -= 1;
        match (TcpStream::connect("[::1]:8087"), max_retry) {
            (Err(e), 0) => {
                daemon.kill()?;
                bail!("no more retry, last error is: {}", e)
            }
            (Err(e), _) => {
                println!("unable to connect: {} ; will retry soon...", e);
            }
            (Ok(_), _) => break,
        }
        thread::sleep(SMALL_DELAY);
    };

    let http = reqwest::blocking::Client::builder().build()?;

    println!("-- ready to test dav features --");
    let result = fx(&http);
    println!("-- test teardown --");

    daemon.kill()?;
    daemon.wait()?;

    result
}

pub fn dav_deserialize<T: Node<T>>(src: &str) -> T {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("a runtime to decode XML");
    rt.block_on(async {
        let mut rdr = Reader::new(quick_xml::NsReader::from_reader(src.as_bytes()))
            .await
            .expect("build a dav reader");
        rdr.find().await.expect("parse a dav response")
    })
}

pub fn lock_token(res: &reqwest::blocking::Response) -> String {
    res.headers()
        .get("Lock-Token")
        .and_then(|v| v.to_str().ok())
        .expect("a Lock-Token header")
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}
