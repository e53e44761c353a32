use missive_imap::auth::AuthenticateData;
use missive_imap::command::Command;
use missive_imap::core::Tag;

#[derive(Debug)]
pub enum Request {
    ImapCommand(Command),
    IdleStart(Tag),
    IdlePoll,
    SaslAnswer(AuthenticateData),
}
