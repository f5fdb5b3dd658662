//! Certificates a block producer issues to the agent relaying for it.

use crate::error::P2pError;
use crate::peer_id::PeerId;
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

pub const CERT_VERSION_0001: u32 = 0x01;

/// Allowed clock skew when checking the creation time.
pub const TIME_ERROR_TOLERANCE: Duration = Duration::from_secs(60);

/// Nanoseconds since the unix epoch; saturates outside the i64 range.
pub fn unix_nanos(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_nanos()).unwrap_or(i64::MAX),
    }
}

fn duration_nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

/// Certificate that authorizes `agent_id` to act for the producer `bp_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCertificateV1 {
    pub version: u32,
    pub bp_id: PeerId,
    pub bp_pub_key: VerifyingKey,
    /// Unix nanoseconds
    pub create_time: i64,
    /// Unix nanoseconds
    pub expire_time: i64,
    pub agent_id: PeerId,
    pub agent_addresses: Vec<String>,
    pub signature: Option<Signature>,
}

impl AgentCertificateV1 {
    /// Issues a certificate valid for `ttl` from now, signed by `bp_key`.
    pub fn issue(
        bp_key: &SigningKey,
        agent_id: PeerId,
        addresses: Vec<String>,
        ttl: Duration,
    ) -> Result<Self, P2pError> {
        Self::issue_at(bp_key, agent_id, addresses, SystemTime::now(), ttl)
    }

    pub fn issue_at(
        bp_key: &SigningKey,
        agent_id: PeerId,
        addresses: Vec<String>,
        now: SystemTime,
        ttl: Duration,
    ) -> Result<Self, P2pError> {
        if addresses.is_empty() {
            return Err(P2pError::InvalidCertField("agent address"));
        }
        let bp_pub_key = bp_key.verifying_key().clone();
        let create_time = unix_nanos(now);
        let mut cert = Self {
            version: CERT_VERSION_0001,
            bp_id: PeerId::from_public_key(&bp_pub_key),
            bp_pub_key,
            create_time,
            expire_time: create_time.saturating_add(duration_nanos(ttl)),
            agent_id,
            agent_addresses: addresses,
            signature: None,
        };
        cert.sign(bp_key)?;
        Ok(cert)
    }

    /// sha256 over version, producer id, compressed key, times, agent id
    /// and addresses.
    pub fn hash(&self) -> [u8; 32] {
        let mut h = Sha256::new();
        h.update(self.version.to_le_bytes());
        h.update(self.bp_id.as_bytes());
        h.update(self.bp_pub_key.to_encoded_point(true).as_bytes());
        h.update(self.create_time.to_le_bytes());
        h.update(self.expire_time.to_le_bytes());
        h.update(self.agent_id.as_bytes());
        for addr in &self.agent_addresses {
            h.update(addr.as_bytes());
        }
        h.finalize().into()
    }

    pub fn sign(&mut self, key: &SigningKey) -> Result<(), P2pError> {
        let sig = PrehashSigner::<Signature>::sign_prehash(key, &self.hash())
            .map_err(|_| P2pError::InvalidCertField("signature"))?;
        self.bp_pub_key = key.verifying_key().clone();
        self.signature = Some(sig);
        Ok(())
    }

    pub fn verify(&self) -> bool {
        match &self.signature {
            Some(sig) => self.bp_pub_key.verify_prehash(&self.hash(), sig).is_ok(),
            None => false,
        }
    }

    /// Created no later than `tolerance` ahead of `now` and not yet expired.
    pub fn is_valid_in_time(&self, now: SystemTime, tolerance: Duration) -> bool {
        let now = unix_nanos(now);
        self.create_time.saturating_sub(now) < duration_nanos(tolerance) && now < self.expire_time
    }

    /// True when less than `buf_term` is left before expiry.
    pub fn is_need_renew(&self, now: SystemTime, buf_term: Duration) -> bool {
        self.expire_time.saturating_sub(unix_nanos(now)) < duration_nanos(buf_term)
    }

    pub fn to_data(&self) -> Result<CertificateData, P2pError> {
        let sig = self
            .signature
            .as_ref()
            .ok_or(P2pError::InvalidCertField("signature"))?;
        if self.agent_addresses.is_empty() {
            return Err(P2pError::InvalidCertField("agent address"));
        }
        Ok(CertificateData {
            cert_version: self.version,
            bp_id: self.bp_id.as_bytes().to_vec(),
            bp_pub_key: self.bp_pub_key.to_encoded_point(true).as_bytes().to_vec(),
            create_time: self.create_time,
            expire_time: self.expire_time,
            agent_id: self.agent_id.as_bytes().to_vec(),
            agent_address: self.agent_addresses.iter().map(|a| a.as_bytes().to_vec()).collect(),
            signature: sig.to_der().as_bytes().to_vec(),
        })
    }
}

/// Certificate fields as exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CertificateData {
    pub cert_version: u32,
    pub bp_id: Vec<u8>,
    pub bp_pub_key: Vec<u8>,
    pub create_time: i64,
    pub expire_time: i64,
    pub agent_id: Vec<u8>,
    pub agent_address: Vec<Vec<u8>>,
    pub signature: Vec<u8>,
}

impl CertificateData {
    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, P2pError> {
        serde_json::from_slice(bytes).map_err(|_| P2pError::MalformedCert)
    }

    /// Validates received data and returns the certificate it carries.
    pub fn check(&self, now: SystemTime) -> Result<AgentCertificateV1, P2pError> {
        match self.cert_version {
            CERT_VERSION_0001 => self.check_v1(now),
            v => Err(P2pError::InvalidCertVersion(v)),
        }
    }

    fn check_v1(&self, now: SystemTime) -> Result<AgentCertificateV1, P2pError> {
        let bp_id = PeerId::from_bytes(&self.bp_id)?;
        let bp_pub_key = VerifyingKey::from_sec1_bytes(&self.bp_pub_key).map_err(|_| P2pError::InvalidKey)?;
        if PeerId::from_public_key(&bp_pub_key) != bp_id {
            return Err(P2pError::InvalidKey);
        }

        let mut cert = AgentCertificateV1 {
            version: self.cert_version,
            bp_id,
            bp_pub_key,
            create_time: self.create_time,
            expire_time: self.expire_time,
            agent_id: PeerId::from_bytes(&self.agent_id)?,
            agent_addresses: Vec::with_capacity(self.agent_address.len()),
            signature: None,
        };
        if !cert.is_valid_in_time(now, TIME_ERROR_TOLERANCE) {
            return Err(P2pError::InvalidCertField("time"));
        }
        if self.agent_address.is_empty() {
            return Err(P2pError::InvalidCertField("agent address"));
        }
        for addr in &self.agent_address {
            cert.agent_addresses.push(check_address(&String::from_utf8_lossy(addr))?);
        }
        let sig = Signature::from_der(&self.signature).map_err(|_| P2pError::InvalidCertField("signature"))?;
        cert.signature = Some(sig);

        if !cert.verify() {
            debug!(bp = %cert.bp_id, agent = %cert.agent_id, "certificate signature mismatch");
            return Err(P2pError::VerificationFailed);
        }
        Ok(cert)
    }
}

/// Accepts an IP address or a DNS host name.
pub fn check_address(addr: &str) -> Result<String, P2pError> {
    let addr = addr.trim();
    if addr.parse::<IpAddr>().is_ok() {
        return Ok(addr.to_string());
    }
    let valid_label = |l: &str| {
        !l.is_empty()
            && l.len() <= 63
            && !l.starts_with('-')
            && !l.ends_with('-')
            && l.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    if !addr.is_empty() && addr.len() <= 253 && addr.split('.').all(valid_label) {
        return Ok(addr.to_string());
    }
    Err(P2pError::InvalidAddress(addr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn bp_key() -> SigningKey {
        SigningKey::from_slice(&[7u8; 32]).unwrap()
    }

    fn agent() -> PeerId {
        let key = SigningKey::from_slice(&[9u8; 32]).unwrap();
        PeerId::from_public_key(key.verifying_key())
    }

    fn issue(now: SystemTime) -> AgentCertificateV1 {
        AgentCertificateV1::issue_at(&bp_key(), agent(), vec!["192.168.0.2".into()], now, HOUR).unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let cert = issue(SystemTime::now());
        assert!(cert.verify());
        assert_eq!(cert.bp_id, PeerId::from_public_key(bp_key().verifying_key()));

        let mut tampered = cert.clone();
        tampered.agent_addresses = vec!["10.0.0.1".into()];
        assert!(!tampered.verify());
    }

    #[test]
    fn test_issue_requires_address() {
        let err = AgentCertificateV1::issue(&bp_key(), agent(), vec![], HOUR).unwrap_err();
        assert_eq!(err, P2pError::InvalidCertField("agent address"));
    }

    #[test]
    fn test_validity_window() {
        let now = SystemTime::now();
        let cert = issue(now);
        assert!(cert.is_valid_in_time(now, TIME_ERROR_TOLERANCE));
        assert!(!cert.is_valid_in_time(now + HOUR, TIME_ERROR_TOLERANCE));
        // created in the future beyond the tolerance
        assert!(!cert.is_valid_in_time(now - Duration::from_secs(120), TIME_ERROR_TOLERANCE));
        assert!(cert.is_valid_in_time(now - Duration::from_secs(30), TIME_ERROR_TOLERANCE));
    }

    #[test]
    fn test_need_renew() {
        let now = SystemTime::now();
        let cert = issue(now);
        assert!(!cert.is_need_renew(now, Duration::from_secs(600)));
        assert!(cert.is_need_renew(now + Duration::from_secs(3300), Duration::from_secs(600)));
    }

    #[test]
    fn test_data_check() {
        let now = SystemTime::now();
        let cert = issue(now);
        let data = cert.to_data().unwrap();
        assert_eq!(data.check(now).unwrap(), cert);

        let mut wrong_version = data.clone();
        wrong_version.cert_version = 2;
        assert_eq!(wrong_version.check(now), Err(P2pError::InvalidCertVersion(2)));

        let mut wrong_bp = data.clone();
        wrong_bp.bp_id = agent().as_bytes().to_vec();
        assert_eq!(wrong_bp.check(now), Err(P2pError::InvalidKey));

        let mut expired = data.clone();
        expired.expire_time = cert.create_time;
        assert_eq!(expired.check(now), Err(P2pError::InvalidCertField("time")));

        let mut no_addr = data.clone();
        no_addr.agent_address.clear();
        assert_eq!(no_addr.check(now), Err(P2pError::InvalidCertField("agent address")));

        let mut forged = data;
        forged.agent_address = vec![b"10.1.1.1".to_vec()];
        assert_eq!(forged.check(now), Err(P2pError::VerificationFailed));
    }

    #[test]
    fn test_json_transport() {
        let agent_key = SigningKey::random(&mut rand::rngs::OsRng);
        let agent_id = PeerId::from_public_key(agent_key.verifying_key());
        let cert = AgentCertificateV1::issue(&bp_key(), agent_id, vec!["agent.local".into()], HOUR).unwrap();

        let bytes = cert.to_data().unwrap().to_json();
        let received = CertificateData::from_json(&bytes).unwrap();
        assert_eq!(received.check(SystemTime::now()).unwrap().agent_id, cert.agent_id);
        assert_eq!(CertificateData::from_json(b"{"), Err(P2pError::MalformedCert));
    }

    #[test]
    fn test_check_address() {
        assert_eq!(check_address("::1").unwrap(), "::1");
        assert_eq!(check_address("node-1.example.com").unwrap(), "node-1.example.com");
        assert!(check_address("bad host").is_err());
        assert!(check_address("-bad.example").is_err());
        assert!(check_address("").is_err());
    }
}
