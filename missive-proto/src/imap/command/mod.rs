pub mod anonymous;
pub mod anystate;
pub mod authenticated;
pub mod selected;

use anyhow::{anyhow, Result};
use missive_imap::mailbox::Mailbox;

/// The backend-facing (UTF-8) name of a wire mailbox.
pub fn mailbox_name(mailbox: &Mailbox) -> Result<String> {
    mailbox
        .to_utf8()
        .map_err(|e| anyhow!("invalid mailbox name: {}", e))
}
