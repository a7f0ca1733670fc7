//! Consortium 샌드박스 네트워크
//!
//! 오더러, 두 조직의 피어, 예제 체인코드를 메모리에서 흉내 내는 네트워크입니다.
//! 모든 협력자 trait을 구현하며, 주입된 시계 기준의 지연으로 최종 일관성을 재현합니다.
//!
//! # Module Structure
//!
//! - [`network`]: 공유 상태와 `ConnectionProvider` 구현 (`SandboxNetwork`)
//! - [`connections`]: principal별 연결 핸들
//! - [`chaincode`]: 예제 체인코드 (`init`, `invoke`)
//! - [`topology`]: 조직/피어 토폴로지
//! - [`settings`]: 가시성 지연 설정
//! - [`stats`]: 호출 카운터
//!
//! # 사용 예시
//!
//! ```ignore
//! let clock = Arc::new(VirtualClock::new());
//! let network = SandboxNetwork::from_config(&config, clock);
//! let admin = network.admin(&principal)?;
//! ```

pub mod chaincode;
pub mod connections;
mod ledger;
pub mod network;
pub mod settings;
pub mod stats;
pub mod topology;

pub use connections::{SandboxAdmin, SandboxChannel, SandboxDiscovery, SandboxLedger};
pub use network::SandboxNetwork;
pub use settings::SandboxSettings;
pub use stats::{SandboxStats, StatsSnapshot};
pub use topology::{OrgTopology, Topology};
