use std::fmt;

/// Message kinds carried after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SubProtocol {
    StatusRequest = 0x001,
    PingRequest = 0x002,
    PingResponse = 0x003,
    GoAway = 0x004,
    AddressesRequest = 0x005,
    AddressesResponse = 0x006,

    GetBlocksRequest = 0x010,
    GetBlocksResponse = 0x011,
    GetBlockHeadersRequest = 0x012,
    GetBlockHeadersResponse = 0x013,
    GetMissingRequest = 0x014,
    GetMissingResponse = 0x015,
    NewBlockNotice = 0x016,
    GetAncestorRequest = 0x017,
    GetAncestorResponse = 0x018,
    GetHashesRequest = 0x019,
    GetHashesResponse = 0x01a,
    GetHashByNoRequest = 0x01b,
    GetHashByNoResponse = 0x01c,

    GetTxsRequest = 0x020,
    GetTxsResponse = 0x021,
    NewTxNotice = 0x022,

    BlockProducedNotice = 0x030,

    GetClusterRequest = 0x3100,
    GetClusterResponse = 0x3101,
    RaftWrapperMessage = 0x3102,
}

impl SubProtocol {
    const ALL: [SubProtocol; 26] = [
        Self::StatusRequest,
        Self::PingRequest,
        Self::PingResponse,
        Self::GoAway,
        Self::AddressesRequest,
        Self::AddressesResponse,
        Self::GetBlocksRequest,
        Self::GetBlocksResponse,
        Self::GetBlockHeadersRequest,
        Self::GetBlockHeadersResponse,
        Self::GetMissingRequest,
        Self::GetMissingResponse,
        Self::NewBlockNotice,
        Self::GetAncestorRequest,
        Self::GetAncestorResponse,
        Self::GetHashesRequest,
        Self::GetHashesResponse,
        Self::GetHashByNoRequest,
        Self::GetHashByNoResponse,
        Self::GetTxsRequest,
        Self::GetTxsResponse,
        Self::NewTxNotice,
        Self::BlockProducedNotice,
        Self::GetClusterRequest,
        Self::GetClusterResponse,
        Self::RaftWrapperMessage,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::StatusRequest => "StatusRequest",
            Self::PingRequest => "PingRequest",
            Self::PingResponse => "PingResponse",
            Self::GoAway => "GoAway",
            Self::AddressesRequest => "AddressesRequest",
            Self::AddressesResponse => "AddressesResponse",
            Self::GetBlocksRequest => "GetBlocksRequest",
            Self::GetBlocksResponse => "GetBlocksResponse",
            Self::GetBlockHeadersRequest => "GetBlockHeadersRequest",
            Self::GetBlockHeadersResponse => "GetBlockHeadersResponse",
            Self::GetMissingRequest => "GetMissingRequest",
            Self::GetMissingResponse => "GetMissingResponse",
            Self::NewBlockNotice => "NewBlockNotice",
            Self::GetAncestorRequest => "GetAncestorRequest",
            Self::GetAncestorResponse => "GetAncestorResponse",
            Self::GetHashesRequest => "GetHashesRequest",
            Self::GetHashesResponse => "GetHashesResponse",
            Self::GetHashByNoRequest => "GetHashByNoRequest",
            Self::GetHashByNoResponse => "GetHashByNoResponse",
            Self::GetTxsRequest => "GetTXsRequest",
            Self::GetTxsResponse => "GetTXsResponse",
            Self::NewTxNotice => "NewTxNotice",
            Self::BlockProducedNotice => "BlockProducedNotice",
            Self::GetClusterRequest => "GetClusterRequest",
            Self::GetClusterResponse => "GetClusterResponse",
            Self::RaftWrapperMessage => "RaftWrapperMessage",
        }
    }
}

impl fmt::Display for SubProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(SubProtocol::StatusRequest.code(), 0x001);
        assert_eq!(SubProtocol::NewTxNotice.code(), 0x022);
        assert_eq!(SubProtocol::from_code(0x3102), Some(SubProtocol::RaftWrapperMessage));
        assert_eq!(SubProtocol::from_code(0x999), None);
        assert_eq!(SubProtocol::GetTxsRequest.to_string(), "GetTXsRequest");
    }
}
