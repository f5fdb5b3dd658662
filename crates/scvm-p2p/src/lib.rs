//! SCVM P2P - Peer identity, agent certificates and the wire handshake.
//!
//! Producers delegate relaying to agent nodes with a signed certificate.
//! Every connection starts with a version handshake before any
//! sub-protocol message is exchanged.

pub mod certificate;
pub mod error;
pub mod handshake;
pub mod peer_id;
pub mod subprotocol;

pub use certificate::{check_address, AgentCertificateV1, CertificateData, CERT_VERSION_0001, TIME_ERROR_TOLERANCE};
pub use error::P2pError;
pub use handshake::{
    accept_handshake, initiate_handshake, select_version, HsHeadReq, HsHeadResp, MAGIC_MAIN, MAGIC_TEST,
    SUPPORTED_VERSIONS,
};
pub use peer_id::PeerId;
pub use subprotocol::SubProtocol;
