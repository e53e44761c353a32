#![allow(dead_code)]
pub mod constants;
pub mod fragments;

use anyhow::{bail, Context, Result};
use std::io::Read;
use std::net::{Shutdown, TcpStream};
use std::process::Command;
use std::thread;

use constants::SMALL_DELAY;

pub const DAEMON_ADDR: &str = "[::1]:1143";

pub fn missive_dev_daemon(fx: impl FnMut(&mut TcpStream) -> Result<()>) -> Result<()> {
    missive_daemon(&["--dev", "daemon"], DAEMON_ADDR, fx)
}

pub fn missive_daemon(
    args: &[&str],
    addr: &str,
    mut fx: impl FnMut(&mut TcpStream) -> Result<()>,
) -> Result<()> {
    // Check the port is free before starting the test
    let mut max_retry = 20;
    loop {
        max_retry -= 1;
        match (TcpStream::connect(addr), max_retry) {
            (Ok(_), 0) => bail!(
                "something is listening on {} and prevents the test from starting",
                addr
            ),
            (Ok(_), _) => println!(
                "something is listening on {}, maybe a previous daemon quitting, retrying soon...",
                addr
            ),
            (Err(_), _) => {
                println!("test ready to start, {} is free!", addr);
                break;
            }
        }
        thread::sleep(SMALL_DELAY);
    }

    // Start the daemon
    let mut daemon = Command::new(env!("CARGO_BIN_EXE_missive")).args(args).spawn()?;

    // Check that the daemon is correctly listening
    let mut max_retry = 20;
    let mut imap_socket = loop {
        max_retry -= 1;
        match (TcpStream::connect(addr), max_retry) {
            (Err(e), 0) => bail!("no more retry, last error is: {}", e),
            (Err(e), _) => {
                println!("unable to connect: {} ; will retry soon...", e);
            }
            (Ok(v), _) => break v,
        }
        thread::sleep(SMALL_DELAY);
    };

    println!("-- ready to test features --");
    let result = fx(&mut imap_socket);
    println!("-- test teardown --");

    // The server may already have hung up (some scenarios end that way).
    let _ = imap_socket.shutdown(Shutdown::Both);
    daemon.kill().context("daemon should be killed")?;

    result.context("all tests passed")
}

/// A second connection to the same daemon, for cross-session scenarios.
pub fn another_connection() -> Result<TcpStream> {
    TcpStream::connect(DAEMON_ADDR).context("opening a second connection")
}

pub fn read_lines<'a, F: Read>(
    reader: &mut F,
    buffer: &'a mut [u8],
    stop_marker: Option<&[u8]>,
) -> Result<&'a [u8]> {
    let mut nbytes = 0;
    loop {
        nbytes += reader.read(&mut buffer[nbytes..])?;
        let pre_condition = match stop_marker {
            None => true,
            Some(mark) => buffer[..nbytes].windows(mark.len()).any(|w| w == mark),
        };
        if pre_condition && nbytes >= 2 && &buffer[nbytes - 2..nbytes] == &b"\r\n"[..] {
            break;
        }
    }
    println!("read: {}", String::from_utf8_lossy(&buffer[..nbytes]));
    Ok(&buffer[..nbytes])
}
