//! ENVELOPE structure of FETCH responses (RFC 3501 §7.4.2).

use crate::core::NString;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    pub date: NString,
    pub subject: NString,
    pub from: Vec<Address>,
    pub sender: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub in_reply_to: NString,
    pub message_id: NString,
}

/// `address = "(" addr-name SP addr-adl SP addr-mailbox SP addr-host ")"`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    pub name: NString,
    pub adl: NString,
    pub mailbox: NString,
    pub host: NString,
}
