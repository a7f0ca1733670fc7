//! 네트워크 토폴로지 — 조직, 피어, 사용자, 오더러

use consortium_core::config::ConsortiumConfig;
use consortium_core::error::ConnectionError;
use consortium_core::types::{OrgRole, Peer, Principal};

/// 피어 조직
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgTopology {
    pub name: String,
    pub msp_id: String,
    pub admin: String,
    pub users: Vec<String>,
    /// 피어 엔드포인트 (선언 순서가 gossip 전파 순서)
    pub peers: Vec<String>,
}

impl OrgTopology {
    pub fn peer_set(&self) -> Vec<Peer> {
        self.peers
            .iter()
            .map(|url| Peer::new(url.clone(), self.msp_id.clone()))
            .collect()
    }

    fn knows(&self, principal: &Principal) -> bool {
        principal.msp_id == self.msp_id
            && (principal.user == self.admin || self.users.contains(&principal.user))
    }
}

/// 전체 네트워크 토폴로지
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub orderer_endpoint: String,
    pub orderer_org: String,
    pub orderer_msp_id: String,
    pub orderer_admin: String,
    pub orgs: Vec<OrgTopology>,
}

impl Topology {
    /// 설정의 `[network]`, `[orgs]` 섹션에서 토폴로지를 만듭니다.
    pub fn from_config(config: &ConsortiumConfig) -> Self {
        let orgs = OrgRole::ALL
            .iter()
            .map(|role| {
                let org = config.orgs.get(*role);
                OrgTopology {
                    name: org.name.clone(),
                    msp_id: org.msp_id.clone(),
                    admin: org.admin_user.clone(),
                    users: vec![org.user.clone()],
                    peers: org.peers.clone(),
                }
            })
            .collect();

        Self {
            orderer_endpoint: config.network.orderer_endpoint.clone(),
            orderer_org: config.network.orderer_org.clone(),
            orderer_msp_id: config.network.orderer_msp_id.clone(),
            orderer_admin: config.network.orderer_admin.clone(),
            orgs,
        }
    }

    pub fn org(&self, msp_id: &str) -> Option<&OrgTopology> {
        self.orgs.iter().find(|o| o.msp_id == msp_id)
    }

    /// 피어 URL이 속한 조직
    pub fn org_of_peer(&self, url: &str) -> Option<&OrgTopology> {
        self.orgs.iter().find(|o| o.peers.iter().any(|p| p == url))
    }

    pub fn is_orderer_admin(&self, principal: &Principal) -> bool {
        principal.msp_id == self.orderer_msp_id && principal.user == self.orderer_admin
    }

    /// 조직 관리자 또는 오더러 관리자인지 확인합니다.
    pub fn is_admin(&self, principal: &Principal) -> bool {
        self.is_orderer_admin(principal)
            || self
                .org(&principal.msp_id)
                .is_some_and(|o| o.admin == principal.user)
    }

    /// 토폴로지에 등록된 principal인지 확인합니다.
    pub fn ensure_known(&self, principal: &Principal) -> Result<(), ConnectionError> {
        let known = self.is_orderer_admin(principal)
            || self
                .org(&principal.msp_id)
                .is_some_and(|org| org.knows(principal));
        if known {
            Ok(())
        } else {
            Err(ConnectionError::Identity {
                org: principal.org.clone(),
                user: principal.user.clone(),
                reason: format!("user is not enrolled with {}", principal.msp_id),
            })
        }
    }

    /// 피어 조직 MSP ID 목록 (선언 순서)
    pub fn member_msp_ids(&self) -> Vec<String> {
        self.orgs.iter().map(|o| o.msp_id.clone()).collect()
    }
}
