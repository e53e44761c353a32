//! Internal decisions based on the attributes requested by FETCH.

use missive_imap::fetch::{
    MacroOrMessageDataItemNames, MessageDataItemName, Section,
};

pub struct AttributesProxy {
    pub attrs: Vec<MessageDataItemName>,
}

impl AttributesProxy {
    pub fn new(attrs: &MacroOrMessageDataItemNames, is_uid_fetch: bool) -> Self {
        // Expand macros
        let mut fetch_attrs = match attrs {
            MacroOrMessageDataItemNames::Macro(m) => m.expand(),
            MacroOrMessageDataItemNames::MessageDataItemNames(a) => a.clone(),
        };

        // A UID FETCH always reports the UID, requested or not.
        if is_uid_fetch && !fetch_attrs.contains(&MessageDataItemName::Uid) {
            fetch_attrs.push(MessageDataItemName::Uid);
        }

        Self { attrs: fetch_attrs }
    }

    pub fn need_body(&self) -> bool {
        self.attrs.iter().any(|attr| match attr {
            MessageDataItemName::Rfc822
            | MessageDataItemName::Rfc822Text => true,
            MessageDataItemName::BodyExt {
                section: Some(section),
                ..
            } => !matches!(
                section,
                Section::Header | Section::HeaderFields(_) | Section::HeaderFieldsNot(_)
            ),
            MessageDataItemName::BodyExt { section: None, .. } => true,
            _ => false,
        })
    }
}
