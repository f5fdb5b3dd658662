//! Version negotiation that opens every peer connection.
//!
//! The dialing side sends a head request with a network magic and the
//! protocol versions it speaks, most preferred first. The listening side
//! answers with the version it picked, or with an error header carrying
//! a reason code. All integers are big-endian u32.

use crate::error::P2pError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

pub const MAGIC_MAIN: u32 = 0x4741_6841;
pub const MAGIC_TEST: u32 = 0x2e41_5429;

/// Magic of a response that reports failure.
pub const HS_ERROR: u32 = 0x0000_0000;
pub const WRONG_HS_REQ: u32 = 0x01;
pub const NO_MATCHED_VERSION: u32 = 0x02;

pub const HS_MAX_VERSION_COUNT: u32 = 16;

pub const P2P_VERSION_030: u32 = 0x0003_0000;
pub const P2P_VERSION_031: u32 = 0x0003_0100;
pub const P2P_VERSION_032: u32 = 0x0003_0200;
pub const P2P_VERSION_033: u32 = 0x0003_0300;
pub const P2P_VERSION_200: u32 = 0x0200_0000;

/// Versions this node speaks, most preferred first.
pub const SUPPORTED_VERSIONS: [u32; 2] = [P2P_VERSION_031, P2P_VERSION_030];

/// Head request sent by the dialing side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HsHeadReq {
    pub magic: u32,
    pub versions: Vec<u32>,
}

impl HsHeadReq {
    pub fn marshal(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.versions.len() * 4);
        buf.extend_from_slice(&self.magic.to_be_bytes());
        buf.extend_from_slice(&(self.versions.len() as u32).to_be_bytes());
        for v in &self.versions {
            buf.extend_from_slice(&v.to_be_bytes());
        }
        buf
    }

    pub async fn read_from<R: AsyncRead + Unpin>(r: &mut R) -> Result<Self, P2pError> {
        let magic = r.read_u32().await?;
        let count = r.read_u32().await?;
        if count == 0 || count > HS_MAX_VERSION_COUNT {
            return Err(P2pError::InvalidVersionCount(count));
        }
        let mut versions = Vec::with_capacity(count as usize);
        for _ in 0..count {
            versions.push(r.read_u32().await?);
        }
        Ok(Self { magic, versions })
    }
}

/// Response header: the chosen version, or `HS_ERROR` with a reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsHeadResp {
    pub magic: u32,
    pub resp_code: u32,
}

impl HsHeadResp {
    pub fn accept(magic: u32, version: u32) -> Self {
        Self { magic, resp_code: version }
    }

    pub fn reject(code: u32) -> Self {
        Self { magic: HS_ERROR, resp_code: code }
    }

    pub fn marshal(&self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[..4].copy_from_slice(&self.magic.to_be_bytes());
        buf[4..].copy_from_slice(&self.resp_code.to_be_bytes());
        buf
    }

    pub async fn read_from<R: AsyncRead + Unpin>(r: &mut R) -> Result<Self, P2pError> {
        let magic = r.read_u32().await?;
        let resp_code = r.read_u32().await?;
        Ok(Self { magic, resp_code })
    }
}

/// First local version the remote also speaks.
pub fn select_version(local: &[u32], remote: &[u32]) -> Option<u32> {
    local.iter().copied().find(|v| remote.contains(v))
}

/// Listening side. Reads the request, answers it and returns the agreed
/// version.
pub async fn accept_handshake<S>(stream: &mut S, magic: u32, supported: &[u32]) -> Result<u32, P2pError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let req = match HsHeadReq::read_from(stream).await {
        Ok(req) => req,
        Err(e @ P2pError::InvalidVersionCount(_)) => {
            stream.write_all(&HsHeadResp::reject(WRONG_HS_REQ).marshal()).await?;
            return Err(e);
        }
        Err(e) => return Err(e),
    };
    if req.magic != magic {
        warn!(magic = format_args!("{:#x}", req.magic), "handshake with wrong magic");
        stream.write_all(&HsHeadResp::reject(WRONG_HS_REQ).marshal()).await?;
        return Err(P2pError::WrongMagic(req.magic));
    }
    let Some(version) = select_version(supported, &req.versions) else {
        debug!(remote = ?req.versions, "no matched p2p version");
        stream.write_all(&HsHeadResp::reject(NO_MATCHED_VERSION).marshal()).await?;
        return Err(P2pError::NoMatchedVersion(req.versions));
    };
    stream.write_all(&HsHeadResp::accept(magic, version).marshal()).await?;
    stream.flush().await?;
    Ok(version)
}

/// Dialing side. Sends the supported versions and returns the one the
/// remote picked.
pub async fn initiate_handshake<S>(stream: &mut S, magic: u32, supported: &[u32]) -> Result<u32, P2pError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let req = HsHeadReq { magic, versions: supported.to_vec() };
    stream.write_all(&req.marshal()).await?;
    stream.flush().await?;

    let resp = HsHeadResp::read_from(stream).await?;
    if resp.magic == HS_ERROR {
        return Err(P2pError::Rejected(resp.resp_code));
    }
    if resp.magic != magic {
        return Err(P2pError::WrongMagic(resp.magic));
    }
    if !supported.contains(&resp.resp_code) {
        return Err(P2pError::NoMatchedVersion(vec![resp.resp_code]));
    }
    Ok(resp.resp_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn test_select_version_prefers_local_order() {
        let local = [P2P_VERSION_033, P2P_VERSION_031];
        assert_eq!(select_version(&local, &[P2P_VERSION_031, P2P_VERSION_033]), Some(P2P_VERSION_033));
        assert_eq!(select_version(&local, &[P2P_VERSION_030]), None);
        assert_eq!(select_version(&local, &[]), None);
    }

    #[test]
    fn test_head_req_layout() {
        let req = HsHeadReq { magic: MAGIC_MAIN, versions: vec![P2P_VERSION_031] };
        assert_eq!(req.marshal(), vec![0x47, 0x41, 0x68, 0x41, 0, 0, 0, 1, 0, 3, 1, 0]);
        assert_eq!(HsHeadResp::reject(NO_MATCHED_VERSION).marshal(), [0, 0, 0, 0, 0, 0, 0, 2]);
    }

    #[tokio::test]
    async fn test_handshake_agrees_on_version() {
        let (mut client, mut server) = duplex(64);
        let server_side =
            tokio::spawn(async move { accept_handshake(&mut server, MAGIC_MAIN, &[P2P_VERSION_033, P2P_VERSION_030]).await });

        let picked = initiate_handshake(&mut client, MAGIC_MAIN, &SUPPORTED_VERSIONS).await.unwrap();
        assert_eq!(picked, P2P_VERSION_030);
        assert_eq!(server_side.await.unwrap().unwrap(), P2P_VERSION_030);
    }

    #[tokio::test]
    async fn test_wrong_magic_is_rejected() {
        let (mut client, mut server) = duplex(64);
        let server_side = tokio::spawn(async move { accept_handshake(&mut server, MAGIC_MAIN, &SUPPORTED_VERSIONS).await });

        let err = initiate_handshake(&mut client, MAGIC_TEST, &SUPPORTED_VERSIONS).await.unwrap_err();
        assert_eq!(err, P2pError::Rejected(WRONG_HS_REQ));
        assert_eq!(server_side.await.unwrap(), Err(P2pError::WrongMagic(MAGIC_TEST)));
    }

    #[tokio::test]
    async fn test_no_common_version() {
        let (mut client, mut server) = duplex(64);
        let server_side = tokio::spawn(async move { accept_handshake(&mut server, MAGIC_MAIN, &[P2P_VERSION_200]).await });

        let err = initiate_handshake(&mut client, MAGIC_MAIN, &SUPPORTED_VERSIONS).await.unwrap_err();
        assert_eq!(err, P2pError::Rejected(NO_MATCHED_VERSION));
        assert_eq!(
            server_side.await.unwrap(),
            Err(P2pError::NoMatchedVersion(SUPPORTED_VERSIONS.to_vec()))
        );
    }

    #[tokio::test]
    async fn test_too_many_versions() {
        let (mut client, mut server) = duplex(256);
        let req = HsHeadReq { magic: MAGIC_MAIN, versions: vec![P2P_VERSION_030; 17] };
        client.write_all(&req.marshal()).await.unwrap();

        let err = accept_handshake(&mut server, MAGIC_MAIN, &SUPPORTED_VERSIONS).await.unwrap_err();
        assert_eq!(err, P2pError::InvalidVersionCount(17));
        let resp = HsHeadResp::read_from(&mut client).await.unwrap();
        assert_eq!(resp, HsHeadResp::reject(WRONG_HS_REQ));
    }
}
