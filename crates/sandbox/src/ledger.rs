//! 채널 원장 — SHA-256 해시 체인 블록과 피어별 가시성
//!
//! 블록은 보증 피어에게 즉시, 나머지 피어에게는 `visible_at` 이후에 보입니다.
//! 피어의 원장 높이는 앞에서부터 연속으로 보이는 블록 수이며,
//! 월드 스테이트도 그 접두부의 쓰기만 적용해 계산합니다.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use bytes::Bytes;
use consortium_core::types::{Block, TransactionId};
use sha2::{Digest, Sha256};

use crate::chaincode::Write;

/// 블록 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockKind {
    /// 채널 설정 (생성, 앵커 피어)
    Config,
    /// 체인코드 트랜잭션 (인스턴스화, 업그레이드, 호출)
    Transaction,
}

/// 블록에 담긴 트랜잭션
#[derive(Debug, Clone)]
pub(crate) struct TxRecord {
    pub id: TransactionId,
    /// 쓰기가 속한 체인코드 (설정 트랜잭션은 `None`)
    pub chaincode: Option<String>,
    pub writes: Vec<Write>,
    pub envelope: Bytes,
}

#[derive(Debug, Clone)]
pub(crate) struct BlockRecord {
    pub number: u64,
    pub hash: Bytes,
    pub previous_hash: Bytes,
    pub kind: BlockKind,
    pub transactions: Vec<TxRecord>,
    /// 보증하지 않은 피어에게 보이기 시작하는 시각
    pub visible_at: Duration,
    /// 즉시 보이는 피어 URL
    pub endorsers: BTreeSet<String>,
}

impl BlockRecord {
    fn visible_to(&self, peer: &str, now: Duration) -> bool {
        self.visible_at <= now || self.endorsers.contains(peer)
    }

    pub fn to_block(&self) -> Block {
        Block {
            number: self.number,
            hash: self.hash.clone(),
            previous_hash: self.previous_hash.clone(),
            transactions: self.transactions.iter().map(|tx| tx.id.clone()).collect(),
        }
    }
}

/// 채널 원장
#[derive(Debug, Default)]
pub(crate) struct ChannelLedger {
    blocks: Vec<BlockRecord>,
    tx_index: HashMap<TransactionId, u64>,
}

impl ChannelLedger {
    /// 블록을 추가하고 블록 번호를 반환합니다.
    pub fn append(
        &mut self,
        kind: BlockKind,
        transactions: Vec<TxRecord>,
        visible_at: Duration,
        endorsers: BTreeSet<String>,
    ) -> u64 {
        let number = self.blocks.len() as u64;
        let previous_hash = self
            .blocks
            .last()
            .map(|b| b.hash.clone())
            .unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(number.to_be_bytes());
        hasher.update(&previous_hash);
        for tx in &transactions {
            hasher.update(tx.id.as_str().as_bytes());
            hasher.update(&tx.envelope);
        }
        let hash = Bytes::from(hasher.finalize().to_vec());

        for tx in &transactions {
            self.tx_index.insert(tx.id.clone(), number);
        }
        self.blocks.push(BlockRecord {
            number,
            hash,
            previous_hash,
            kind,
            transactions,
            visible_at,
            endorsers,
        });
        number
    }

    /// 피어에게 보이는 연속 접두부 길이
    pub fn height(&self, peer: &str, now: Duration) -> u64 {
        self.blocks
            .iter()
            .take_while(|b| b.visible_to(peer, now))
            .count() as u64
    }

    /// 오더러가 보고하는 최신 설정 블록 번호
    pub fn latest_config_block(&self, now: Duration) -> Option<u64> {
        self.blocks
            .iter()
            .take_while(|b| b.visible_at <= now)
            .filter(|b| b.kind == BlockKind::Config)
            .map(|b| b.number)
            .last()
    }

    /// 첫 블록이 오더러에서 보이는지 여부
    pub fn genesis_visible(&self, now: Duration) -> bool {
        self.blocks.first().is_some_and(|b| b.visible_at <= now)
    }

    pub fn block(&self, number: u64, peer: &str, now: Duration) -> Option<&BlockRecord> {
        if number < self.height(peer, now) {
            self.blocks.get(number as usize)
        } else {
            None
        }
    }

    pub fn block_by_hash(&self, hash: &[u8], peer: &str, now: Duration) -> Option<&BlockRecord> {
        let height = self.height(peer, now) as usize;
        self.blocks[..height].iter().find(|b| b.hash[..] == *hash)
    }

    pub fn transaction(
        &self,
        id: &TransactionId,
        peer: &str,
        now: Duration,
    ) -> Option<(&BlockRecord, &TxRecord)> {
        let number = *self.tx_index.get(id)?;
        let block = self.block(number, peer, now)?;
        let tx = block.transactions.iter().find(|tx| tx.id == *id)?;
        Some((block, tx))
    }

    /// 피어가 보는 체인코드 월드 스테이트
    pub fn world_state(&self, chaincode: &str, peer: &str, now: Duration) -> BTreeMap<String, Bytes> {
        let mut state = BTreeMap::new();
        let height = self.height(peer, now) as usize;
        let txs = self.blocks[..height]
            .iter()
            .flat_map(|b| b.transactions.iter())
            .filter(|tx| tx.chaincode.as_deref() == Some(chaincode));
        for tx in txs {
            for write in &tx.writes {
                match &write.value {
                    Some(value) => {
                        state.insert(write.key.clone(), value.clone());
                    }
                    None => {
                        state.remove(&write.key);
                    }
                }
            }
        }
        state
    }
}
