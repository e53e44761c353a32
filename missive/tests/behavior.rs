use anyhow::Context;

mod common;
use crate::common::constants::*;
use crate::common::fragments::*;

fn main() {
    rfc3501_imap4rev1_base();
    rfc3501_sequence_sets();
    rfc3501_starttls_pipelining_rejected();
    rfc2177_imapext_idle();
    rfc7888_imapext_literal();
    rfc4315_imapext_uidplus();
    rfc6851_imapext_move();
    rfc5161_imapext_enable();
    rfc3691_imapext_unselect();
    rfc2971_id_and_rfc2342_namespace();
    modified_utf7_mailbox_names();
    println!("✅ SUCCESS");
}

fn rfc3501_imap4rev1_base() {
    println!("🧪 rfc3501_imap4rev1_base");
    common::missive_dev_daemon(|imap_socket| {
        connect(imap_socket).context("server says hello")?;
        capability(imap_socket, "IMAP4rev1").context("check server capabilities")?;
        login(imap_socket).context("login test")?;
        create_mailbox(imap_socket, "Archive").context("created mailbox archive")?;

        let select_res = select(imap_socket, "INBOX").context("select inbox")?;
        assert!(select_res.contains("* 0 EXISTS"));
        assert!(select_res.contains("* 0 RECENT"));
        assert!(select_res.contains("[UIDVALIDITY "));
        assert!(select_res.contains("[UIDNEXT 1]"));
        assert!(select_res.contains("* FLAGS ("));
        assert!(select_res.contains("[PERMANENTFLAGS ("));
        assert!(select_res.contains("\\*"));
        assert!(select_res.contains("20 OK [READ-WRITE]"));

        status_uidnext(imap_socket, "Archive").context("status of archive from inbox")?;

        // APPEND flushes the new state before its own tagged OK.
        let append_res = append(imap_socket, EMAIL1).context("insert email in INBOX")?;
        assert!(append_res.contains("* 1 EXISTS"));
        assert!(append_res.contains("[APPENDUID "));

        let fetch_res = uid_fetch_flags(imap_socket, "1").context("uid fetch 1")?;
        assert!(fetch_res.contains("UID 1"));
        assert!(fetch_res.contains("FLAGS (\\Recent)"));

        let srv_msg = fetch(imap_socket, "1", "rfc822").context("fetch rfc822")?;
        let orig_email = std::str::from_utf8(EMAIL1)?;
        assert!(srv_msg.contains(orig_email));

        let search_res = search(imap_socket, "text OoOoO").context("search by text")?;
        assert!(search_res.contains("* SEARCH 1"));

        let store_res =
            store_add_flag(imap_socket, "1", "\\Deleted").context("mark email as deleted")?;
        assert!(store_res.contains("FLAGS (\\Deleted \\Recent)"));

        let expunge_res = expunge(imap_socket).context("expunge emails")?;
        assert!(expunge_res.contains("* 1 EXPUNGE"));
        assert!(expunge_res.contains("* 0 EXISTS"));

        // Expunging an already-empty mailbox is a no-op, not an error.
        let expunge_res = expunge(imap_socket).context("expunge empty mailbox")?;
        assert!(!expunge_res.contains("EXPUNGE\r\n"));
        assert!(expunge_res.contains("34 OK"));

        logout(imap_socket).context("logout")?;
        Ok(())
    })
    .expect("test fully run");
}

/// UIDs {5, 7, 9} as seq 1..3, the resolution edge cases.
fn rfc3501_sequence_sets() {
    println!("🧪 rfc3501_sequence_sets");
    common::missive_dev_daemon(|imap_socket| {
        connect(imap_socket).context("server says hello")?;
        login(imap_socket).context("login test")?;
        select(imap_socket, "INBOX").context("select inbox")?;

        for _ in 0..9 {
            append(imap_socket, EMAIL2).context("insert email in INBOX")?;
        }
        // Keep only UIDs 5, 7 and 9.
        uid_store_silent(imap_socket, "1:4,6,8", "\\Deleted").context("mark for deletion")?;
        let expunge_res = expunge(imap_socket).context("expunge")?;
        assert!(expunge_res.contains("* 3 EXISTS"));

        let res = uid_fetch_flags(imap_socket, "1:6").context("uid fetch 1:6")?;
        assert_eq!(res.matches(" FETCH ").count(), 1);
        assert!(res.contains("UID 5"));

        let res = uid_fetch_flags(imap_socket, "8:*").context("uid fetch 8:*")?;
        assert_eq!(res.matches(" FETCH ").count(), 1);
        assert!(res.contains("UID 9"));

        let res = fetch(imap_socket, "2:*", "(uid)").context("fetch 2:* (uid)")?;
        assert!(res.contains("* 2 FETCH (UID 7)"));
        assert!(res.contains("* 3 FETCH (UID 9)"));
        assert_eq!(res.matches(" FETCH ").count(), 2);

        Ok(())
    })
    .expect("test fully run");
}

/// RFC 3501 §6.2.1: bytes pipelined behind STARTTLS are a protocol
/// violation; the server sends the tagged OK, then closes.
fn rfc3501_starttls_pipelining_rejected() {
    println!("🧪 rfc3501_starttls_pipelining_rejected");

    const STARTTLS_ADDR: &str = "[::1]:2143";

    // STARTTLS needs TLS material on the listener; generate a throwaway
    // self-signed certificate.
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .expect("generate self-signed cert");
    let dir = std::env::temp_dir().join(format!("missive-starttls-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    let certs_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");
    std::fs::write(&certs_path, cert.cert.pem()).expect("write certificate");
    std::fs::write(&key_path, cert.key_pair.serialize_pem()).expect("write key");

    let config_path = dir.join("missive.toml");
    let config = format!(
        "[[listeners]]\n\
         kind = \"tcp\"\n\
         bind_addr = \"{}\"\n\
         tls = {{ certs = {:?}, key = {:?} }}\n\
         \n\
         [users]\n\
         user_driver = \"dev\"\n",
        STARTTLS_ADDR, certs_path, key_path,
    );
    std::fs::write(&config_path, config).expect("write config");
    let config_arg = config_path.display().to_string();

    common::missive_daemon(
        &["--config-file", config_arg.as_str(), "daemon"],
        STARTTLS_ADDR,
        |imap_socket| {
            connect(imap_socket).context("server says hello")?;
            capability(imap_socket, "STARTTLS").context("STARTTLS is offered")?;

            let transcript =
                starttls_with_pipelined_noop(imap_socket).context("pipelined STARTTLS")?;
            assert!(transcript.contains("s1 OK Begin TLS"));
            // The pipelined NOOP must never be answered.
            assert!(!transcript.contains("s2"));

            Ok(())
        },
    )
    .expect("test fully run");

    let _ = std::fs::remove_dir_all(&dir);
}

/// A session in IDLE sees another session's expunge as it happens.
fn rfc2177_imapext_idle() {
    println!("🧪 rfc2177_imapext_idle");
    common::missive_dev_daemon(|imap_socket| {
        connect(imap_socket).context("server says hello")?;
        capability(imap_socket, "IDLE").context("check server capabilities")?;
        login(imap_socket).context("login session A")?;
        let select_res = select(imap_socket, "INBOX").context("select inbox")?;
        assert!(select_res.contains("* 0 EXISTS"));

        let mut other = common::another_connection()?;
        connect(&mut other).context("session B connects")?;
        login(&mut other).context("login session B")?;
        for _ in 0..3 {
            append(&mut other, EMAIL2).context("session B fills the mailbox")?;
        }
        noop_exists(imap_socket, 3).context("session A sees three messages")?;

        idle_start(imap_socket).context("session A starts idling")?;

        // Session B deletes the middle message.
        select(&mut other, "INBOX").context("session B selects inbox")?;
        uid_store_silent(&mut other, "2", "\\Deleted").context("session B flags uid 2")?;
        expunge(&mut other).context("session B expunges")?;

        let pushed = idle_read_until(imap_socket, "EXISTS").context("idle updates pushed")?;
        assert!(pushed.contains("* 2 EXPUNGE"));
        assert!(pushed.contains("* 2 EXISTS"));

        idle_done(imap_socket).context("session A terminates idle")?;
        Ok(())
    })
    .expect("test fully run");
}

fn rfc7888_imapext_literal() {
    println!("🧪 rfc7888_imapext_literal");
    common::missive_dev_daemon(|imap_socket| {
        connect(imap_socket).context("server says hello")?;
        capability(imap_socket, "LITERAL+").context("advertises LITERAL+")?;
        login_with_literal_plus(imap_socket).context("login without continuations")?;
        logout(imap_socket).context("logout")?;
        Ok(())
    })
    .expect("test fully run");
}

fn rfc4315_imapext_uidplus() {
    println!("🧪 rfc4315_imapext_uidplus");
    common::missive_dev_daemon(|imap_socket| {
        connect(imap_socket).context("server says hello")?;
        capability(imap_socket, "UIDPLUS").context("advertises UIDPLUS")?;
        login(imap_socket).context("login test")?;
        create_mailbox(imap_socket, "Archive").context("create archive")?;
        select(imap_socket, "INBOX").context("select inbox")?;

        append(imap_socket, EMAIL1).context("first email")?;
        append(imap_socket, EMAIL2).context("second email")?;

        // UID EXPUNGE only touches the given set.
        uid_store_silent(imap_socket, "1:2", "\\Deleted").context("flag both")?;
        let res = uid_expunge(imap_socket, "1").context("uid expunge 1")?;
        assert!(res.contains("* 1 EXPUNGE"));
        assert!(res.contains("* 1 EXISTS"));

        // COPYUID maps source to destination UIDs.
        let res = uid_copy(imap_socket, "2", "Archive").context("uid copy")?;
        assert!(res.contains("[COPYUID "));
        assert!(res.contains(" 2 1]"));

        Ok(())
    })
    .expect("test fully run");
}

fn rfc6851_imapext_move() {
    println!("🧪 rfc6851_imapext_move");
    common::missive_dev_daemon(|imap_socket| {
        connect(imap_socket).context("server says hello")?;
        capability(imap_socket, "MOVE").context("advertises MOVE")?;
        login(imap_socket).context("login test")?;
        create_mailbox(imap_socket, "Archive").context("create archive")?;
        select(imap_socket, "INBOX").context("select inbox")?;
        append(imap_socket, EMAIL1).context("insert email")?;

        let res = r#move(imap_socket, "1", "Archive").context("move to archive")?;
        assert!(res.contains("[COPYUID "));
        assert!(res.contains("* 1 EXPUNGE"));

        unselect(imap_socket).context("unselect inbox")?;
        let select_res = select(imap_socket, "Archive").context("select archive")?;
        assert!(select_res.contains("* 1 EXISTS"));

        Ok(())
    })
    .expect("test fully run");
}

fn rfc5161_imapext_enable() {
    println!("🧪 rfc5161_imapext_enable");
    common::missive_dev_daemon(|imap_socket| {
        connect(imap_socket).context("server says hello")?;
        login(imap_socket).context("login test")?;
        enable_utf8(imap_socket, true).context("first enable answers ENABLED")?;
        enable_utf8(imap_socket, false).context("second enable is silent")?;
        logout(imap_socket).context("logout")?;
        Ok(())
    })
    .expect("test fully run");
}

fn rfc3691_imapext_unselect() {
    println!("🧪 rfc3691_imapext_unselect");
    common::missive_dev_daemon(|imap_socket| {
        connect(imap_socket).context("server says hello")?;
        capability(imap_socket, "UNSELECT").context("advertises UNSELECT")?;
        login(imap_socket).context("login test")?;
        select(imap_socket, "INBOX").context("select inbox")?;
        append(imap_socket, EMAIL2).context("insert email")?;

        store_add_flag(imap_socket, "1", "\\Deleted").context("flag for deletion")?;
        unselect(imap_socket).context("unselect must not expunge")?;

        let select_res = select(imap_socket, "INBOX").context("select inbox again")?;
        assert!(select_res.contains("* 1 EXISTS"));

        // CLOSE does expunge, silently.
        let close_res = close(imap_socket).context("close inbox")?;
        assert!(!close_res.contains("EXPUNGE"));
        let select_res = select(imap_socket, "INBOX").context("select inbox once more")?;
        assert!(select_res.contains("* 0 EXISTS"));

        Ok(())
    })
    .expect("test fully run");
}

fn rfc2971_id_and_rfc2342_namespace() {
    println!("🧪 rfc2971_id_and_rfc2342_namespace");
    common::missive_dev_daemon(|imap_socket| {
        connect(imap_socket).context("server says hello")?;
        id(imap_socket).context("ID works before login")?;
        login(imap_socket).context("login test")?;
        namespace(imap_socket).context("namespace")?;
        Ok(())
    })
    .expect("test fully run");
}

fn modified_utf7_mailbox_names() {
    println!("🧪 modified_utf7_mailbox_names");
    common::missive_dev_daemon(|imap_socket| {
        connect(imap_socket).context("server says hello")?;
        login(imap_socket).context("login test")?;

        // "Entwürfe" in modified UTF-7.
        create_mailbox(imap_socket, "Entw&APw-rfe").context("create Entwürfe")?;
        let list_res = list_all(imap_socket).context("list")?;
        assert!(list_res.contains("Entw&APw-rfe"));

        let select_res = select(imap_socket, "Entw&APw-rfe").context("select Entwürfe")?;
        assert!(select_res.contains("20 OK"));

        Ok(())
    })
    .expect("test fully run");
}
