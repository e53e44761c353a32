//! Reusable wire exchanges for the behavior tests. Each helper owns its
//! tag so traces stay readable.

use anyhow::{bail, Result};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use super::constants::SMALL_DELAY;
use super::read_lines;

pub fn connect(imap: &mut TcpStream) -> Result<()> {
    let mut buffer: [u8; 1500] = [0; 1500];
    let read = read_lines(imap, &mut buffer, None)?;
    let srv_msg = std::str::from_utf8(read)?;
    assert!(srv_msg.contains("* OK"));
    assert!(srv_msg.contains("IMAP4rev1"));
    Ok(())
}

pub fn capability(imap: &mut TcpStream, expect: &str) -> Result<()> {
    imap.write_all(b"5 capability\r\n")?;

    let mut buffer: [u8; 6000] = [0; 6000];
    let read = read_lines(imap, &mut buffer, Some(&b"5 OK"[..]))?;
    let srv_msg = std::str::from_utf8(read)?;
    assert!(srv_msg.contains("* CAPABILITY"));
    assert!(srv_msg.contains(expect));
    Ok(())
}

pub fn login(imap: &mut TcpStream) -> Result<()> {
    imap.write_all(b"10 login alice hunter2\r\n")?;

    let mut buffer: [u8; 1500] = [0; 1500];
    let read = read_lines(imap, &mut buffer, Some(&b"10 "[..]))?;
    let srv_msg = std::str::from_utf8(read)?;
    assert!(srv_msg.contains("10 OK"));
    Ok(())
}

/// LITERAL+ (RFC 7888): no continuation requests at all.
pub fn login_with_literal_plus(imap: &mut TcpStream) -> Result<()> {
    imap.write_all(b"11 login {5+}\r\nalice {7+}\r\nhunter2\r\n")?;

    let mut buffer: [u8; 1500] = [0; 1500];
    let read = read_lines(imap, &mut buffer, Some(&b"11 "[..]))?;
    let srv_msg = std::str::from_utf8(read)?;
    assert!(srv_msg.contains("11 OK"));
    // The server must not have asked for a single continuation.
    assert!(!srv_msg.contains('+'));
    Ok(())
}

pub fn create_mailbox(imap: &mut TcpStream, mailbox: &str) -> Result<()> {
    let cmd = format!("15 create {}\r\n", mailbox);
    imap.write_all(cmd.as_bytes())?;

    let mut buffer: [u8; 1500] = [0; 1500];
    let read = read_lines(imap, &mut buffer, Some(&b"15 "[..]))?;
    assert!(std::str::from_utf8(read)?.contains("15 OK"));
    Ok(())
}

pub fn select(imap: &mut TcpStream, mailbox: &str) -> Result<String> {
    let cmd = format!("20 select {}\r\n", mailbox);
    imap.write_all(cmd.as_bytes())?;

    let mut buffer: [u8; 6000] = [0; 6000];
    let read = read_lines(imap, &mut buffer, Some(&b"20 OK"[..]))?;
    Ok(std::str::from_utf8(read)?.to_string())
}

pub fn unselect(imap: &mut TcpStream) -> Result<()> {
    imap.write_all(b"22 unselect\r\n")?;

    let mut buffer: [u8; 1500] = [0; 1500];
    let read = read_lines(imap, &mut buffer, Some(&b"22 "[..]))?;
    assert!(std::str::from_utf8(read)?.contains("22 OK"));
    Ok(())
}

pub fn close(imap: &mut TcpStream) -> Result<String> {
    imap.write_all(b"23 close\r\n")?;

    let mut buffer: [u8; 1500] = [0; 1500];
    let read = read_lines(imap, &mut buffer, Some(&b"23 "[..]))?;
    let srv_msg = std::str::from_utf8(read)?;
    assert!(srv_msg.contains("23 OK"));
    Ok(srv_msg.to_string())
}

pub fn status_uidnext(imap: &mut TcpStream, mailbox: &str) -> Result<String> {
    let cmd = format!("25 status {} (uidnext)\r\n", mailbox);
    imap.write_all(cmd.as_bytes())?;

    let mut buffer: [u8; 1500] = [0; 1500];
    let read = read_lines(imap, &mut buffer, Some(&b"25 OK"[..]))?;
    let srv_msg = std::str::from_utf8(read)?;
    assert!(srv_msg.contains("* STATUS"));
    assert!(srv_msg.contains("UIDNEXT"));
    Ok(srv_msg.to_string())
}

/// APPEND with a synchronizing literal; returns the full response.
pub fn append(imap: &mut TcpStream, content: &[u8]) -> Result<String> {
    let cmd = format!("30 append INBOX {{{}}}\r\n", content.len());
    imap.write_all(cmd.as_bytes())?;

    let mut buffer: [u8; 16536] = [0; 16536];
    let read = read_lines(imap, &mut buffer, None)?;
    assert!(std::str::from_utf8(read)?.starts_with('+'));

    imap.write_all(content)?;
    imap.write_all(b"\r\n")?;

    let read = read_lines(imap, &mut buffer, Some(&b"30 OK"[..]))?;
    Ok(std::str::from_utf8(read)?.to_string())
}

pub fn noop_exists(imap: &mut TcpStream, must_see: u32) -> Result<()> {
    let mut max_retry = 20;
    loop {
        max_retry -= 1;
        imap.write_all(b"45 noop\r\n")?;

        let mut buffer: [u8; 6000] = [0; 6000];
        let read = read_lines(imap, &mut buffer, Some(&b"45 OK"[..]))?;
        let srv_msg = std::str::from_utf8(read)?;

        if srv_msg.contains(&format!("* {} EXISTS", must_see)) {
            return Ok(());
        }
        if max_retry == 0 {
            bail!("expected '* {} EXISTS', never saw it", must_see);
        }
        thread::sleep(SMALL_DELAY);
    }
}

pub fn uid_fetch_flags(imap: &mut TcpStream, range: &str) -> Result<String> {
    let cmd = format!("31 uid fetch {} (flags)\r\n", range);
    imap.write_all(cmd.as_bytes())?;

    let mut buffer: [u8; 6000] = [0; 6000];
    let read = read_lines(imap, &mut buffer, Some(&b"31 OK"[..]))?;
    Ok(std::str::from_utf8(read)?.to_string())
}

pub fn fetch(imap: &mut TcpStream, range: &str, items: &str) -> Result<String> {
    let cmd = format!("35 fetch {} {}\r\n", range, items);
    imap.write_all(cmd.as_bytes())?;

    let mut buffer = vec![0; 128 * 1024];
    let read = read_lines(imap, &mut buffer, Some(&b"35 OK"[..]))?;
    Ok(std::str::from_utf8(read)?.to_string())
}

pub fn store_add_flag(imap: &mut TcpStream, range: &str, flag: &str) -> Result<String> {
    let cmd = format!("32 store {} +flags ({})\r\n", range, flag);
    imap.write_all(cmd.as_bytes())?;

    let mut buffer: [u8; 6000] = [0; 6000];
    let read = read_lines(imap, &mut buffer, Some(&b"32 OK"[..]))?;
    Ok(std::str::from_utf8(read)?.to_string())
}

pub fn uid_store_silent(imap: &mut TcpStream, range: &str, flag: &str) -> Result<()> {
    let cmd = format!("33 uid store {} +flags.silent ({})\r\n", range, flag);
    imap.write_all(cmd.as_bytes())?;

    let mut buffer: [u8; 6000] = [0; 6000];
    let read = read_lines(imap, &mut buffer, Some(&b"33 "[..]))?;
    assert!(std::str::from_utf8(read)?.contains("33 OK"));
    Ok(())
}

pub fn expunge(imap: &mut TcpStream) -> Result<String> {
    imap.write_all(b"34 expunge\r\n")?;

    let mut buffer: [u8; 6000] = [0; 6000];
    let read = read_lines(imap, &mut buffer, Some(&b"34 OK"[..]))?;
    Ok(std::str::from_utf8(read)?.to_string())
}

pub fn uid_expunge(imap: &mut TcpStream, range: &str) -> Result<String> {
    let cmd = format!("36 uid expunge {}\r\n", range);
    imap.write_all(cmd.as_bytes())?;

    let mut buffer: [u8; 6000] = [0; 6000];
    let read = read_lines(imap, &mut buffer, Some(&b"36 OK"[..]))?;
    Ok(std::str::from_utf8(read)?.to_string())
}

pub fn uid_copy(imap: &mut TcpStream, range: &str, mailbox: &str) -> Result<String> {
    let cmd = format!("37 uid copy {} {}\r\n", range, mailbox);
    imap.write_all(cmd.as_bytes())?;

    let mut buffer: [u8; 6000] = [0; 6000];
    let read = read_lines(imap, &mut buffer, Some(&b"37 OK"[..]))?;
    Ok(std::str::from_utf8(read)?.to_string())
}

pub fn r#move(imap: &mut TcpStream, range: &str, mailbox: &str) -> Result<String> {
    let cmd = format!("38 move {} {}\r\n", range, mailbox);
    imap.write_all(cmd.as_bytes())?;

    let mut buffer: [u8; 6000] = [0; 6000];
    let read = read_lines(imap, &mut buffer, Some(&b"38 OK"[..]))?;
    Ok(std::str::from_utf8(read)?.to_string())
}

pub fn search(imap: &mut TcpStream, query: &str) -> Result<String> {
    let cmd = format!("39 search {}\r\n", query);
    imap.write_all(cmd.as_bytes())?;

    let mut buffer: [u8; 6000] = [0; 6000];
    let read = read_lines(imap, &mut buffer, Some(&b"39 OK"[..]))?;
    Ok(std::str::from_utf8(read)?.to_string())
}

pub fn idle_start(imap: &mut TcpStream) -> Result<()> {
    imap.write_all(b"40 idle\r\n")?;

    let mut buffer: [u8; 1500] = [0; 1500];
    let read = read_lines(imap, &mut buffer, None)?;
    assert!(std::str::from_utf8(read)?.starts_with('+'));
    Ok(())
}

/// Read pushed updates until `marker` shows up.
pub fn idle_read_until(imap: &mut TcpStream, marker: &str) -> Result<String> {
    let mut buffer: [u8; 6000] = [0; 6000];
    let read = read_lines(imap, &mut buffer, Some(marker.as_bytes()))?;
    Ok(std::str::from_utf8(read)?.to_string())
}

pub fn idle_done(imap: &mut TcpStream) -> Result<()> {
    imap.write_all(b"DONE\r\n")?;

    let mut buffer: [u8; 1500] = [0; 1500];
    let read = read_lines(imap, &mut buffer, Some(&b"40 "[..]))?;
    assert!(std::str::from_utf8(read)?.contains("40 OK"));
    Ok(())
}

pub fn enable_utf8(imap: &mut TcpStream, expect_enabled: bool) -> Result<()> {
    imap.write_all(b"50 enable UTF8=ACCEPT\r\n")?;

    let mut buffer: [u8; 1500] = [0; 1500];
    let read = read_lines(imap, &mut buffer, Some(&b"50 "[..]))?;
    let srv_msg = std::str::from_utf8(read)?;
    assert!(srv_msg.contains("50 OK"));
    assert_eq!(
        srv_msg.contains("* ENABLED UTF8=ACCEPT"),
        expect_enabled
    );
    Ok(())
}

pub fn namespace(imap: &mut TcpStream) -> Result<()> {
    imap.write_all(b"55 namespace\r\n")?;

    let mut buffer: [u8; 1500] = [0; 1500];
    let read = read_lines(imap, &mut buffer, Some(&b"55 "[..]))?;
    let srv_msg = std::str::from_utf8(read)?;
    assert!(srv_msg.contains("* NAMESPACE ((\"\" \"/\")) NIL NIL"));
    assert!(srv_msg.contains("55 OK"));
    Ok(())
}

pub fn id(imap: &mut TcpStream) -> Result<()> {
    imap.write_all(b"56 id nil\r\n")?;

    let mut buffer: [u8; 1500] = [0; 1500];
    let read = read_lines(imap, &mut buffer, Some(&b"56 "[..]))?;
    let srv_msg = std::str::from_utf8(read)?;
    assert!(srv_msg.contains("* ID"));
    assert!(srv_msg.contains("Missive"));
    Ok(())
}

pub fn list_all(imap: &mut TcpStream) -> Result<String> {
    imap.write_all(b"60 list \"\" *\r\n")?;

    let mut buffer: [u8; 6000] = [0; 6000];
    let read = read_lines(imap, &mut buffer, Some(&b"60 OK"[..]))?;
    Ok(std::str::from_utf8(read)?.to_string())
}

/// Pipelining anything behind STARTTLS forfeits the session: the server
/// answers the tagged OK, then hangs up without touching the extra
/// bytes. Returns everything received until the close.
pub fn starttls_with_pipelined_noop(imap: &mut TcpStream) -> Result<String> {
    imap.write_all(b"s1 STARTTLS\r\ns2 NOOP\r\n")?;

    imap.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut transcript = Vec::new();
    let mut chunk = [0u8; 1500];
    loop {
        match imap.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => transcript.extend_from_slice(&chunk[..n]),
            Err(e) => bail!("server did not close the connection: {}", e),
        }
    }

    let transcript = String::from_utf8_lossy(&transcript).into_owned();
    println!("read until close: {}", transcript);
    Ok(transcript)
}

pub fn logout(imap: &mut TcpStream) -> Result<()> {
    imap.write_all(b"99 logout\r\n")?;

    let mut buffer: [u8; 1500] = [0; 1500];
    let read = read_lines(imap, &mut buffer, Some(&b"* BYE"[..]))?;
    assert!(std::str::from_utf8(read)?.contains("* BYE"));
    Ok(())
}
