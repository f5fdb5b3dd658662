use thiserror::Error;

/// Errors of certificate handling and the wire handshake.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum P2pError {
    #[error("malformed certificate data")]
    MalformedCert,

    #[error("invalid field in certificate: {0}")]
    InvalidCertField(&'static str),

    #[error("invalid certificate version {0}")]
    InvalidCertVersion(u32),

    #[error("invalid key in certificate")]
    InvalidKey,

    #[error("invalid peer id in certificate")]
    InvalidPeerId,

    #[error("invalid agent address: {0}")]
    InvalidAddress(String),

    #[error("signature verification failed")]
    VerificationFailed,

    #[error("wrong handshake magic {0:#x}")]
    WrongMagic(u32),

    #[error("invalid version count: {0}")]
    InvalidVersionCount(u32),

    #[error("no matched p2p version for {0:?}")]
    NoMatchedVersion(Vec<u32>),

    #[error("handshake rejected by remote with code {0}")]
    Rejected(u32),

    #[error("handshake io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for P2pError {
    fn from(e: std::io::Error) -> Self {
        P2pError::Io(e.to_string())
    }
}
