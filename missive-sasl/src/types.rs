#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    /// RFC 4616, `authzid NUL authcid NUL passwd`.
    Plain,
    /// RFC 4422 appendix A; identity established out of band.
    External,
}

/// What the mechanism extracted from the client response. Verification is
/// the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Password { username: String, password: String },
    External { identity: String },
}
